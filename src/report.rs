use std::fmt::Write;

use crate::models::FeedbackRule;
use crate::session::{GradingSession, StudentGrade};

#[derive(Debug, Clone)]
pub struct RuleUsage {
    pub text: String,
    pub deduction: f64,
    pub count: usize,
}

pub fn summarize_rules(rules: &[FeedbackRule], grades: &[StudentGrade]) -> Vec<RuleUsage> {
    let mut usage: Vec<RuleUsage> = rules
        .iter()
        .map(|rule| RuleUsage {
            text: rule.text.clone(),
            deduction: rule.deduction,
            count: grades
                .iter()
                .filter(|grade| grade.applied.iter().any(|applied| applied.id == rule.id))
                .count(),
        })
        .collect();

    usage.sort_by(|a, b| b.count.cmp(&a.count));
    usage
}

pub fn build_report(session: &GradingSession) -> String {
    let config = session.config();
    let grades = session.grades();
    let usage = summarize_rules(session.catalog().rules(), &grades);
    let graded = grades.iter().filter(|grade| grade.graded).count();

    let mut output = String::new();

    let _ = writeln!(output, "# Grading Report: {}", config.assignment_name);
    let _ = writeln!(
        output,
        "Max points {:.2}; {} of {} students graded",
        config.max_points,
        graded,
        grades.len()
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Students");

    if grades.is_empty() {
        let _ = writeln!(output, "No students on the roster.");
    } else {
        for grade in grades.iter() {
            if !grade.graded {
                let _ = writeln!(
                    output,
                    "- {} ({}): ungraded (imported grade {})",
                    grade.name,
                    grade.key,
                    display_grade(&grade.imported_grade)
                );
                continue;
            }
            let feedback = if grade.applied.is_empty() {
                "no deductions".to_string()
            } else {
                grade
                    .applied
                    .iter()
                    .map(|rule| format!("{} (-{})", rule.text, rule.deduction))
                    .collect::<Vec<_>>()
                    .join("; ")
            };
            let _ = writeln!(
                output,
                "- {} ({}): {:.2}/{:.2}, {}",
                grade.name, grade.key, grade.score.final_score, grade.score.max_points, feedback
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Feedback Usage");

    if usage.is_empty() {
        let _ = writeln!(output, "No feedback rules defined.");
    } else {
        for rule in usage.iter() {
            let _ = writeln!(
                output,
                "- {} (-{}): applied to {} students",
                rule.text, rule.deduction, rule.count
            );
        }
    }

    output
}

fn display_grade(raw: &str) -> &str {
    if raw.is_empty() {
        "none"
    } else {
        raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GradingConfig;
    use crate::models::RuleId;

    fn session() -> GradingSession {
        let mut session = GradingSession::new(GradingConfig::default());
        let ticket = session.begin_import();
        session.finish_import(
            ticket,
            Some(
                "Name,Email,Timestamp,Grade,Feedback\nAbe,a@x,2024-10-01,,\nBea,b@x,2024-10-02,-2,\n"
                    .to_string(),
            ),
        );
        session
    }

    #[test]
    fn report_lists_graded_and_ungraded_students() {
        let mut session = session();
        session.activate("b@x").unwrap();
        session.toggle_feedback(RuleId(2)).unwrap();

        let report = build_report(&session);
        assert!(report.starts_with("# Grading Report: Assignment 1"));
        assert!(report.contains("1 of 2 students graded"));
        assert!(report.contains("- Abe (a@x): ungraded (imported grade none)"));
        assert!(report.contains("- Bea (b@x): 18.00/20.00, Poor indentation (-2)"));
        assert!(report.contains("- Poor indentation (-2): applied to 1 students"));
    }

    #[test]
    fn perfect_score_reports_no_deductions() {
        let mut session = session();
        session.activate("a@x").unwrap();
        session.perfect_score().unwrap();
        let report = build_report(&session);
        assert!(report.contains("- Abe (a@x): 20.00/20.00, no deductions"));
    }

    #[test]
    fn usage_orders_most_used_first() {
        let mut session = session();
        for key in ["a@x", "b@x"] {
            session.activate(key).unwrap();
            session.toggle_feedback(RuleId(3)).unwrap();
        }
        let usage = summarize_rules(session.catalog().rules(), &session.grades());
        assert_eq!(usage[0].text, "Looks good!");
        assert_eq!(usage[0].count, 2);
    }
}
