use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::catalog::{CatalogSnapshot, FeedbackCatalog};
use crate::config::GradingConfig;
use crate::error::{IngestError, SessionError};
use crate::ingest;
use crate::models::{FeedbackRule, RuleId, Score, StudentRecord};
use crate::roster::RosterStore;
use crate::schema::{RosterField, RosterSchema};
use crate::sort::SortSpec;

/// Issued when a file read starts. Only the most recently issued ticket may
/// change the roster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportTicket(u64);

#[derive(Debug, Clone, PartialEq)]
pub enum ImportOutcome {
    Replaced { records: usize },
    Rejected(IngestError),
    Cancelled,
    Stale,
}

/// The opaque "save progress" blob: catalog definitions and per-student ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub assignment_name: String,
    pub max_points: f64,
    pub catalog: CatalogSnapshot,
}

impl ProgressSnapshot {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

/// One roster row joined with its grading state, ready for an exporter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentGrade {
    pub key: String,
    pub name: String,
    pub imported_grade: String,
    pub graded: bool,
    pub applied: Vec<FeedbackRule>,
    pub score: Score,
}

pub struct GradingSession {
    config: GradingConfig,
    schema: RosterSchema,
    roster: RosterStore,
    catalog: FeedbackCatalog,
    last_error: Option<IngestError>,
    latest_ticket: u64,
}

impl GradingSession {
    pub fn new(config: GradingConfig) -> Self {
        Self::with_catalog(config, FeedbackCatalog::with_default_rules())
    }

    pub fn with_catalog(config: GradingConfig, catalog: FeedbackCatalog) -> Self {
        GradingSession {
            schema: config.schema(),
            roster: RosterStore::new(config.key_field, config.selection_mode),
            catalog,
            config,
            last_error: None,
            latest_ticket: 0,
        }
    }

    pub fn config(&self) -> &GradingConfig {
        &self.config
    }

    pub fn roster(&self) -> &RosterStore {
        &self.roster
    }

    pub fn catalog(&self) -> &FeedbackCatalog {
        &self.catalog
    }

    /// Rule definitions, drafts and catalog sort. The active student is set
    /// through the session.
    pub fn catalog_mut(&mut self) -> &mut FeedbackCatalog {
        &mut self.catalog
    }

    pub fn last_error(&self) -> Option<&IngestError> {
        self.last_error.as_ref()
    }

    /// Starts an import attempt. Clears the current error and supersedes any
    /// read still in flight.
    pub fn begin_import(&mut self) -> ImportTicket {
        self.latest_ticket += 1;
        self.last_error = None;
        ImportTicket(self.latest_ticket)
    }

    /// Applies the text of a finished read. `None` means the user cancelled.
    ///
    /// A successful import clears the selection and with it the active student.
    pub fn finish_import(
        &mut self,
        ticket: ImportTicket,
        contents: Option<String>,
    ) -> ImportOutcome {
        if ticket.0 != self.latest_ticket {
            warn!(ticket = ticket.0, latest = self.latest_ticket, "discarding stale import");
            return ImportOutcome::Stale;
        }
        let Some(text) = contents else {
            return ImportOutcome::Cancelled;
        };
        match ingest::validate(&text, &self.schema) {
            Ok(records) => {
                let count = records.len();
                self.roster.replace(records);
                self.catalog.set_active_student(None);
                self.last_error = None;
                info!(records = count, "roster replaced");
                ImportOutcome::Replaced { records: count }
            }
            Err(err) => self.reject(err),
        }
    }

    pub fn fail_import(&mut self, ticket: ImportTicket, err: IngestError) -> ImportOutcome {
        if ticket.0 != self.latest_ticket {
            warn!(
                ticket = ticket.0,
                latest = self.latest_ticket,
                "discarding stale import failure"
            );
            return ImportOutcome::Stale;
        }
        self.reject(err)
    }

    fn reject(&mut self, err: IngestError) -> ImportOutcome {
        warn!(error = %err, "roster import rejected");
        self.last_error = Some(err.clone());
        ImportOutcome::Rejected(err)
    }

    pub async fn import_file(&mut self, path: impl AsRef<Path>) -> ImportOutcome {
        let ticket = self.begin_import();
        match tokio::fs::read_to_string(path.as_ref()).await {
            Ok(text) => self.finish_import(ticket, Some(text)),
            Err(err) => self.fail_import(ticket, IngestError::Read(err.to_string())),
        }
    }

    pub fn toggle_roster_sort(&mut self, field: RosterField) -> SortSpec<RosterField> {
        self.roster.toggle_sort(field)
    }

    pub fn roster_view(&self) -> Vec<&StudentRecord> {
        self.roster.view()
    }

    /// Toggles `key` in the roster selection. A newly selected key becomes the
    /// active student; deselecting the active student leaves none active.
    pub fn toggle_selection(&mut self, key: &str) -> Result<bool, SessionError> {
        if !self.roster.contains(key) {
            return Err(SessionError::UnknownStudent(key.to_string()));
        }
        let now_selected = self.roster.toggle_selection(key);
        if now_selected {
            self.catalog.set_active_student(Some(key.to_string()));
        } else if self.catalog.active_student() == Some(key) {
            self.catalog.set_active_student(None);
        }
        Ok(now_selected)
    }

    /// Binds the catalog to `key` without touching the roster selection.
    pub fn activate(&mut self, key: &str) -> Result<(), SessionError> {
        if !self.roster.contains(key) {
            return Err(SessionError::UnknownStudent(key.to_string()));
        }
        self.catalog.set_active_student(Some(key.to_string()));
        Ok(())
    }

    pub fn active_student(&self) -> Option<&StudentRecord> {
        self.catalog
            .active_student()
            .and_then(|key| self.roster.find(key))
    }

    pub fn toggle_feedback(&mut self, id: RuleId) -> Result<bool, SessionError> {
        Ok(self.catalog.toggle_applied(id)?)
    }

    pub fn perfect_score(&mut self) -> Result<(), SessionError> {
        Ok(self.catalog.clear_applied()?)
    }

    pub fn clear_score(&mut self) -> Result<(), SessionError> {
        Ok(self.catalog.forget_active()?)
    }

    pub fn score_for(&self, key: &str) -> Score {
        Score::from_deductions(self.config.max_points, self.catalog.deductions_for(key))
    }

    /// Score of the active student, if any.
    pub fn score(&self) -> Option<Score> {
        self.catalog.active_student().map(|key| self.score_for(key))
    }

    /// Every roster row in import order with its grading state.
    pub fn grades(&self) -> Vec<StudentGrade> {
        self.roster
            .records()
            .iter()
            .map(|record| {
                let key = self.roster.key_of(record);
                StudentGrade {
                    name: record.name.clone(),
                    imported_grade: record.grade.clone(),
                    graded: self.catalog.is_graded(&key),
                    applied: self
                        .catalog
                        .applied_rules_for(&key)
                        .into_iter()
                        .cloned()
                        .collect(),
                    score: self.score_for(&key),
                    key,
                }
            })
            .collect()
    }

    pub fn progress(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            assignment_name: self.config.assignment_name.clone(),
            max_points: self.config.max_points,
            catalog: self.catalog.snapshot(),
        }
    }

    /// Loads saved rules and ledger. Assignment settings stay with the config.
    pub fn restore_progress(&mut self, progress: ProgressSnapshot) {
        if progress.assignment_name != self.config.assignment_name {
            warn!(
                saved = %progress.assignment_name,
                current = %self.config.assignment_name,
                "progress was saved for a different assignment"
            );
        }
        let active = self.catalog.active_student().map(str::to_string);
        self.catalog.restore(progress.catalog);
        self.catalog.set_active_student(active);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CatalogError;
    use crate::roster::SelectionMode;

    const ROSTER: &str = "Name,Email,Timestamp,Grade,Feedback\n\
                          John Doe,jd12,2024-10-31,-0,Looks good!\n\
                          Jane Smith,js34,2024-10-30,-2,Poor indentation\n";

    fn loaded_session() -> GradingSession {
        let mut session = GradingSession::new(GradingConfig::default());
        let ticket = session.begin_import();
        assert_eq!(
            session.finish_import(ticket, Some(ROSTER.to_string())),
            ImportOutcome::Replaced { records: 2 }
        );
        session
    }

    #[test]
    fn failed_import_keeps_previous_roster() {
        let mut session = loaded_session();
        let ticket = session.begin_import();
        let outcome = session.finish_import(ticket, Some("Name,Grade\nA,1\n".to_string()));
        assert!(matches!(outcome, ImportOutcome::Rejected(IngestError::MissingHeaders(_))));
        assert_eq!(session.roster().len(), 2);
        assert!(session.last_error().is_some());

        session.begin_import();
        assert!(session.last_error().is_none());
    }

    #[test]
    fn stale_reads_are_discarded() {
        let mut session = loaded_session();
        let first = session.begin_import();
        let second = session.begin_import();
        let newer = "Name,Email,Timestamp,Grade,Feedback\nA,a@x,2024-01-01,0,\n";
        assert_eq!(
            session.finish_import(second, Some(newer.to_string())),
            ImportOutcome::Replaced { records: 1 }
        );
        assert_eq!(session.finish_import(first, Some(ROSTER.to_string())), ImportOutcome::Stale);
        assert_eq!(
            session.fail_import(first, IngestError::Read("gone".to_string())),
            ImportOutcome::Stale
        );
        assert_eq!(session.roster().len(), 1);
        assert!(session.last_error().is_none());
    }

    #[test]
    fn cancelled_import_changes_nothing() {
        let mut session = loaded_session();
        let ticket = session.begin_import();
        assert_eq!(session.finish_import(ticket, None), ImportOutcome::Cancelled);
        assert_eq!(session.roster().len(), 2);
    }

    #[test]
    fn selection_drives_active_student_and_score() {
        let mut session = loaded_session();
        assert!(session.toggle_selection("js34").unwrap());
        assert_eq!(session.active_student().unwrap().name, "Jane Smith");

        session.toggle_feedback(RuleId(1)).unwrap();
        session.toggle_feedback(RuleId(2)).unwrap();
        let score = session.score().unwrap();
        assert_eq!(score.total_deduction, 5.0);
        assert_eq!(score.final_score, 15.0);

        assert!(!session.toggle_selection("js34").unwrap());
        assert!(session.active_student().is_none());
        assert!(session.score().is_none());
        assert_eq!(session.score_for("js34").final_score, 15.0);
    }

    #[test]
    fn applied_state_follows_active_student() {
        let mut session = loaded_session();
        session.activate("jd12").unwrap();
        session.toggle_feedback(RuleId(4)).unwrap();
        session.activate("js34").unwrap();
        assert!(!session.catalog().is_applied(RuleId(4)));
        session.activate("jd12").unwrap();
        assert!(session.catalog().is_applied(RuleId(4)));
        assert_eq!(session.score().unwrap().final_score, 0.0);
    }

    #[test]
    fn single_select_moves_active_student() {
        let config = GradingConfig {
            selection_mode: SelectionMode::Single,
            ..GradingConfig::default()
        };
        let mut session = GradingSession::new(config);
        let ticket = session.begin_import();
        session.finish_import(ticket, Some(ROSTER.to_string()));
        session.toggle_selection("jd12").unwrap();
        session.toggle_selection("js34").unwrap();
        assert_eq!(session.roster().selected().len(), 1);
        assert_eq!(session.catalog().active_student(), Some("js34"));
    }

    #[test]
    fn unknown_student_is_rejected() {
        let mut session = loaded_session();
        assert_eq!(
            session.activate("nobody"),
            Err(SessionError::UnknownStudent("nobody".to_string()))
        );
    }

    #[test]
    fn reimport_drops_missing_active_student() {
        let mut session = loaded_session();
        session.activate("jd12").unwrap();
        let ticket = session.begin_import();
        let other = "Name,Email,Timestamp,Grade,Feedback\nA,a@x,2024-01-01,0,\n";
        session.finish_import(ticket, Some(other.to_string()));
        assert!(session.catalog().active_student().is_none());
    }

    #[test]
    fn reimport_unbinds_active_student_even_when_still_listed() {
        let config = GradingConfig {
            selection_mode: SelectionMode::Single,
            ..GradingConfig::default()
        };
        let mut session = GradingSession::new(config);
        let ticket = session.begin_import();
        session.finish_import(ticket, Some(ROSTER.to_string()));
        session.toggle_selection("jd12").unwrap();
        session.toggle_feedback(RuleId(1)).unwrap();

        let ticket = session.begin_import();
        session.finish_import(ticket, Some(ROSTER.to_string()));
        assert!(session.roster().selected().is_empty());
        assert!(session.catalog().active_student().is_none());
        assert_eq!(
            session.toggle_feedback(RuleId(1)),
            Err(SessionError::Catalog(CatalogError::NoActiveStudent))
        );
        assert_eq!(session.score_for("jd12").total_deduction, 3.0);
    }

    #[test]
    fn progress_round_trips_through_json() {
        let mut session = loaded_session();
        session.activate("jd12").unwrap();
        session.toggle_feedback(RuleId(1)).unwrap();
        let json = session.progress().to_json().unwrap();

        let mut restored = loaded_session();
        restored.restore_progress(ProgressSnapshot::from_json(&json).unwrap());
        assert_eq!(restored.score_for("jd12").total_deduction, 3.0);
        let grades = restored.grades();
        assert!(grades[0].graded);
        assert!(!grades[1].graded);
        assert_eq!(grades[0].applied[0].text, "Add more comments");
    }
}
