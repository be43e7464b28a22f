//! Grading workbench engine: roster ingestion, feedback catalog and the
//! session that ties a student to the feedback applied to them.

pub mod catalog;
pub mod config;
pub mod error;
pub mod ingest;
pub mod models;
pub mod report;
pub mod roster;
pub mod schema;
pub mod session;
pub mod sort;

pub use catalog::{CatalogField, FeedbackCatalog};
pub use config::{GradingConfig, KeyField};
pub use error::{CatalogError, IngestError, SessionError};
pub use models::{FeedbackRow, FeedbackRule, RuleId, Score, StudentRecord};
pub use roster::{RosterStore, SelectionMode};
pub use session::{GradingSession, ImportOutcome, ProgressSnapshot};
