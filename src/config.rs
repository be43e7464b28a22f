use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::models::{StudentKey, StudentRecord};
use crate::roster::SelectionMode;
use crate::schema::{HeaderMap, HeaderPreset, RosterSchema};

pub const CONFIG_ENV: &str = "GRADING_ASSISTANT_CONFIG";

/// Which roster column identifies a student.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyField {
    #[default]
    Email,
    Name,
}

impl KeyField {
    pub fn key_of(self, record: &StudentRecord) -> StudentKey {
        match self {
            KeyField::Email => record.email.clone(),
            KeyField::Name => record.name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GradingConfig {
    pub assignment_name: String,
    pub max_points: f64,
    pub header_preset: HeaderPreset,
    /// Overrides `header_preset` when present.
    pub headers: Option<HeaderMap>,
    pub key_field: KeyField,
    pub selection_mode: SelectionMode,
}

impl Default for GradingConfig {
    fn default() -> Self {
        GradingConfig {
            assignment_name: "Assignment 1".to_string(),
            max_points: 20.0,
            header_preset: HeaderPreset::Simple,
            headers: None,
            key_field: KeyField::Email,
            selection_mode: SelectionMode::Multi,
        }
    }
}

impl GradingConfig {
    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn from_json(text: &str) -> anyhow::Result<Self> {
        let config: GradingConfig = serde_json::from_str(text)?;
        if !config.max_points.is_finite() || config.max_points < 0.0 {
            anyhow::bail!("max_points must be a non-negative number");
        }
        Ok(config)
    }

    /// Explicit path first, then `GRADING_ASSISTANT_CONFIG`, then defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        if let Some(path) = path {
            return Self::from_path(path);
        }
        match std::env::var(CONFIG_ENV) {
            Ok(value) if !value.trim().is_empty() => Self::from_path(Path::new(value.trim())),
            _ => Ok(Self::default()),
        }
    }

    pub fn header_map(&self) -> HeaderMap {
        self.headers
            .clone()
            .unwrap_or_else(|| HeaderMap::preset(self.header_preset))
    }

    pub fn schema(&self) -> RosterSchema {
        RosterSchema::new(self.header_map())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config = GradingConfig::from_json(r#"{"header_preset":"moodle","key_field":"name"}"#)
            .unwrap();
        assert_eq!(config.max_points, 20.0);
        assert_eq!(config.key_field, KeyField::Name);
        assert_eq!(config.header_map(), HeaderMap::moodle());
    }

    #[test]
    fn explicit_headers_override_preset() {
        let config = GradingConfig::from_json(
            r#"{"headers":{"name":"Student","email":"Mail","timestamp":"When","grade":"Grade","feedback":"Notes"}}"#,
        )
        .unwrap();
        assert_eq!(config.schema().required_headers[0], "Student");
    }

    #[test]
    fn rejects_negative_max_points() {
        assert!(GradingConfig::from_json(r#"{"max_points":-1}"#).is_err());
    }
}
