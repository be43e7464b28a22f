//! Error types for roster ingestion, catalog edits and session bookkeeping.
//!
//! Nothing here is fatal: an [`IngestError`] leaves the previous roster in place and
//! becomes the session's current error, a [`CatalogError`] rejects one action and
//! leaves the catalog untouched.

use crate::models::RuleId;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum IngestError {
    #[error("missing required headers: {}", .0.join(", "))]
    MissingHeaders(Vec<String>),

    #[error("{count} row(s) are missing required values (lines {})", join_lines(.lines))]
    InvalidRows { count: usize, lines: Vec<u64> },

    #[error("could not parse CSV: {0}")]
    Parse(String),

    #[error("could not read roster file: {0}")]
    Read(String),
}

fn join_lines(lines: &[u64]) -> String {
    lines
        .iter()
        .map(|line| line.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CatalogError {
    #[error("feedback text cannot be empty")]
    EmptyText,

    #[error("feedback rule {0} not found")]
    NotFound(RuleId),

    #[error("deduction must be a non-negative number, got {0}")]
    InvalidDeduction(f64),

    #[error("no student is active")]
    NoActiveStudent,

    #[error("no draft in progress")]
    NoDraft,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SessionError {
    #[error("student {0} is not on the roster")]
    UnknownStudent(String),

    #[error(transparent)]
    Catalog(#[from] CatalogError),
}
