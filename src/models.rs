use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Canonical identity of a roster row. Which column feeds it is decided by the
/// session's [`KeyField`](crate::config::KeyField).
pub type StudentKey = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleId(pub u64);

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentRecord {
    pub name: String,
    pub email: String,
    pub timestamp: String,
    /// `None` when the raw timestamp could not be parsed.
    pub submitted_at: Option<NaiveDateTime>,
    pub grade: String,
    pub feedback: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackRule {
    pub id: RuleId,
    pub text: String,
    pub deduction: f64,
}

/// A rule as seen by the active student.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedbackRow {
    pub id: RuleId,
    pub text: String,
    pub deduction: f64,
    pub applied: bool,
    pub draft: Option<RuleDraft>,
}

/// Uncommitted text and deduction for an add or an edit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleDraft {
    pub text: String,
    pub deduction: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Score {
    pub max_points: f64,
    pub total_deduction: f64,
    pub final_score: f64,
}

impl Score {
    pub fn from_deductions(max_points: f64, deductions: impl IntoIterator<Item = f64>) -> Self {
        let total_deduction: f64 = deductions.into_iter().sum();
        Score {
            max_points,
            total_deduction,
            final_score: (max_points - total_deduction).max(0.0),
        }
    }
}
