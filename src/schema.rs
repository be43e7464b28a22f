use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RosterField {
    Name,
    Email,
    Timestamp,
    Grade,
    Feedback,
}

impl RosterField {
    pub const ALL: [RosterField; 5] = [
        RosterField::Name,
        RosterField::Email,
        RosterField::Timestamp,
        RosterField::Grade,
        RosterField::Feedback,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeaderPreset {
    Simple,
    Moodle,
}

/// Source header spelling for each roster field. One deployment uses one map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderMap {
    pub name: String,
    pub email: String,
    pub timestamp: String,
    pub grade: String,
    pub feedback: String,
}

impl HeaderMap {
    pub fn simple() -> Self {
        HeaderMap {
            name: "Name".to_string(),
            email: "Email".to_string(),
            timestamp: "Timestamp".to_string(),
            grade: "Grade".to_string(),
            feedback: "Feedback".to_string(),
        }
    }

    pub fn moodle() -> Self {
        HeaderMap {
            name: "Full name".to_string(),
            email: "Email address".to_string(),
            timestamp: "Last modified (submission)".to_string(),
            grade: "Grade".to_string(),
            feedback: "Feedback comments".to_string(),
        }
    }

    pub fn preset(preset: HeaderPreset) -> Self {
        match preset {
            HeaderPreset::Simple => HeaderMap::simple(),
            HeaderPreset::Moodle => HeaderMap::moodle(),
        }
    }

    pub fn header(&self, field: RosterField) -> &str {
        match field {
            RosterField::Name => &self.name,
            RosterField::Email => &self.email,
            RosterField::Timestamp => &self.timestamp,
            RosterField::Grade => &self.grade,
            RosterField::Feedback => &self.feedback,
        }
    }
}

impl Default for HeaderMap {
    fn default() -> Self {
        HeaderMap::simple()
    }
}

/// What the validator checks: headers that must exist, where each field is read
/// from, and which fields may not be blank on any row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterSchema {
    pub required_headers: Vec<String>,
    pub fields: HeaderMap,
    pub required_fields: Vec<RosterField>,
}

impl RosterSchema {
    pub fn new(fields: HeaderMap) -> Self {
        let required_headers = RosterField::ALL
            .iter()
            .map(|field| fields.header(*field).to_string())
            .collect();
        RosterSchema {
            required_headers,
            fields,
            required_fields: vec![RosterField::Name, RosterField::Email, RosterField::Timestamp],
        }
    }
}

impl Default for RosterSchema {
    fn default() -> Self {
        RosterSchema::new(HeaderMap::default())
    }
}
