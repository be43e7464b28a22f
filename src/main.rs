use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use grading_assistant::catalog::CatalogField;
use grading_assistant::report;
use grading_assistant::schema::RosterField;
use grading_assistant::{GradingConfig, GradingSession, ImportOutcome, ProgressSnapshot, RuleId};

#[derive(Parser)]
#[command(name = "grading-assistant")]
#[command(about = "Apply reusable feedback deductions to a roster of submissions", long_about = None)]
struct Cli {
    /// JSON config; falls back to GRADING_ASSISTANT_CONFIG
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a roster export and print it
    Roster {
        #[arg(long)]
        csv: PathBuf,
        /// Column header clicks, applied in order
        #[arg(long, value_enum)]
        sort: Vec<RosterField>,
    },
    /// Maintain the feedback catalog
    Feedback {
        #[arg(long, default_value = "progress.json")]
        progress: PathBuf,
        #[command(subcommand)]
        action: FeedbackAction,
    },
    /// Toggle feedback rules for one student
    Toggle {
        #[arg(long)]
        csv: PathBuf,
        #[arg(long, default_value = "progress.json")]
        progress: PathBuf,
        #[arg(long)]
        student: String,
        #[arg(long, required = true)]
        rule: Vec<u64>,
    },
    /// Mark a student as graded with no deductions
    Perfect {
        #[arg(long)]
        csv: PathBuf,
        #[arg(long, default_value = "progress.json")]
        progress: PathBuf,
        #[arg(long)]
        student: String,
    },
    /// Forget a student's grading state
    Clear {
        #[arg(long)]
        csv: PathBuf,
        #[arg(long, default_value = "progress.json")]
        progress: PathBuf,
        #[arg(long)]
        student: String,
    },
    /// Print a student's deduction and final score
    Score {
        #[arg(long)]
        csv: PathBuf,
        #[arg(long, default_value = "progress.json")]
        progress: PathBuf,
        #[arg(long)]
        student: String,
    },
    /// Generate a markdown grading report
    Report {
        #[arg(long)]
        csv: PathBuf,
        #[arg(long, default_value = "progress.json")]
        progress: PathBuf,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

#[derive(Subcommand)]
enum FeedbackAction {
    /// List rules
    List {
        #[arg(long, value_enum)]
        sort: Vec<CatalogField>,
    },
    /// Add a rule
    Add {
        #[arg(long)]
        text: String,
        #[arg(long, default_value_t = 0.0)]
        deduction: f64,
    },
    /// Edit a rule's text and deduction
    Edit {
        #[arg(long)]
        id: u64,
        #[arg(long)]
        text: String,
        #[arg(long, default_value_t = 0.0)]
        deduction: f64,
    },
    /// Delete a rule
    Delete {
        #[arg(long)]
        id: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = GradingConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Roster { csv, sort } => {
            let mut session = GradingSession::new(config);
            import(&mut session, &csv).await?;
            for field in sort {
                session.toggle_roster_sort(field);
            }
            for record in session.roster_view() {
                println!(
                    "{} <{}> {} grade {} {}",
                    record.name, record.email, record.timestamp, record.grade, record.feedback
                );
            }
        }
        Commands::Feedback { progress, action } => {
            let mut session = GradingSession::new(config);
            load_progress(&mut session, &progress)?;
            let catalog = session.catalog_mut();
            match action {
                FeedbackAction::List { sort } => {
                    for field in sort {
                        catalog.toggle_sort(field);
                    }
                    for row in catalog.view() {
                        println!("[{}] -{} {}", row.id, row.deduction, row.text);
                    }
                    return Ok(());
                }
                FeedbackAction::Add { text, deduction } => {
                    let id = catalog.add(&text, deduction)?;
                    println!("Added rule {id}.");
                }
                FeedbackAction::Edit { id, text, deduction } => {
                    catalog.edit(RuleId(id), &text, deduction)?;
                    println!("Updated rule {id}.");
                }
                FeedbackAction::Delete { id } => {
                    if catalog.delete(RuleId(id)) {
                        println!("Deleted rule {id}.");
                    } else {
                        println!("Rule {id} was already gone.");
                    }
                }
            }
            save_progress(&session, &progress)?;
        }
        Commands::Toggle {
            csv,
            progress,
            student,
            rule,
        } => {
            let mut session = open_student(config, &csv, &progress, &student).await?;
            for id in rule {
                let applied = session.toggle_feedback(RuleId(id))?;
                println!(
                    "Rule {id} {} for {student}.",
                    if applied { "applied" } else { "removed" }
                );
            }
            save_progress(&session, &progress)?;
        }
        Commands::Perfect {
            csv,
            progress,
            student,
        } => {
            let mut session = open_student(config, &csv, &progress, &student).await?;
            session.perfect_score()?;
            save_progress(&session, &progress)?;
            println!("{student} marked with a perfect score.");
        }
        Commands::Clear {
            csv,
            progress,
            student,
        } => {
            let mut session = open_student(config, &csv, &progress, &student).await?;
            session.clear_score()?;
            save_progress(&session, &progress)?;
            println!("Cleared grading for {student}.");
        }
        Commands::Score {
            csv,
            progress,
            student,
        } => {
            let session = open_student(config, &csv, &progress, &student).await?;
            let score = session.score_for(&student);
            println!(
                "{student}: deduction {:.2}, score {:.2}/{:.2}",
                score.total_deduction, score.final_score, score.max_points
            );
        }
        Commands::Report { csv, progress, out } => {
            let mut session = GradingSession::new(config);
            load_progress(&mut session, &progress)?;
            import(&mut session, &csv).await?;
            std::fs::write(&out, report::build_report(&session))?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}

async fn import(session: &mut GradingSession, csv: &Path) -> anyhow::Result<()> {
    match session.import_file(csv).await {
        ImportOutcome::Replaced { records } => {
            tracing::info!("Imported {records} students from {}", csv.display());
            Ok(())
        }
        ImportOutcome::Rejected(err) => {
            Err(err).with_context(|| format!("failed to import {}", csv.display()))
        }
        ImportOutcome::Cancelled | ImportOutcome::Stale => {
            anyhow::bail!("import of {} did not complete", csv.display())
        }
    }
}

async fn open_student(
    config: GradingConfig,
    csv: &Path,
    progress: &Path,
    student: &str,
) -> anyhow::Result<GradingSession> {
    let mut session = GradingSession::new(config);
    load_progress(&mut session, progress)?;
    import(&mut session, csv).await?;
    session.activate(student)?;
    Ok(session)
}

fn load_progress(session: &mut GradingSession, path: &Path) -> anyhow::Result<()> {
    if !path.exists() {
        return Ok(());
    }
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read progress {}", path.display()))?;
    let progress = ProgressSnapshot::from_json(&text)
        .with_context(|| format!("invalid progress file {}", path.display()))?;
    session.restore_progress(progress);
    Ok(())
}

fn save_progress(session: &GradingSession, path: &Path) -> anyhow::Result<()> {
    let json = session.progress().to_json()?;
    std::fs::write(path, json)
        .with_context(|| format!("failed to write progress {}", path.display()))?;
    Ok(())
}
