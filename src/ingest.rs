use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::error::IngestError;
use crate::models::StudentRecord;
use crate::schema::{RosterField, RosterSchema};

const TIMESTAMP_FORMATS: [&str; 4] = [
    "%A, %d %B %Y, %I:%M %p",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
];

/// Parses a roster export. Any missing header or any bad row rejects the whole file.
pub fn validate(raw: &str, schema: &RosterSchema) -> Result<Vec<StudentRecord>, IngestError> {
    let raw = raw.strip_prefix('\u{feff}').unwrap_or(raw);
    // The csv reader runs an unclosed quote to end of input instead of failing.
    if raw.matches('"').count() % 2 == 1 {
        return Err(IngestError::Parse("unterminated quoted field".to_string()));
    }
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(raw.as_bytes());

    let headers = reader
        .headers()
        .map_err(|err| IngestError::Parse(err.to_string()))?
        .clone();

    let mut positions: HashMap<&str, usize> = HashMap::new();
    for (index, header) in headers.iter().enumerate() {
        positions.entry(header.trim()).or_insert(index);
    }

    let missing: Vec<String> = schema
        .required_headers
        .iter()
        .filter(|header| !positions.contains_key(header.as_str()))
        .cloned()
        .collect();
    if !missing.is_empty() {
        return Err(IngestError::MissingHeaders(missing));
    }

    let column = |field: RosterField| positions.get(schema.fields.header(field)).copied();

    let mut records = Vec::new();
    let mut invalid_lines = Vec::new();

    for result in reader.records() {
        let row = result.map_err(|err| IngestError::Parse(err.to_string()))?;
        if row.iter().all(|value| value.trim().is_empty()) {
            continue;
        }

        let value = |field: RosterField| {
            column(field)
                .and_then(|index| row.get(index))
                .map(|v| v.trim().to_string())
                .unwrap_or_default()
        };

        let line = row.position().map(|pos| pos.line()).unwrap_or_default();
        if schema
            .required_fields
            .iter()
            .any(|field| value(*field).is_empty())
        {
            invalid_lines.push(line);
            continue;
        }

        let timestamp = value(RosterField::Timestamp);
        records.push(StudentRecord {
            name: value(RosterField::Name),
            email: value(RosterField::Email),
            submitted_at: parse_timestamp(&timestamp),
            timestamp,
            grade: value(RosterField::Grade),
            feedback: value(RosterField::Feedback),
        });
    }

    if !invalid_lines.is_empty() {
        return Err(IngestError::InvalidRows {
            count: invalid_lines.len(),
            lines: invalid_lines,
        });
    }

    Ok(records)
}

/// Accepts RFC 3339, ISO dates with or without a time, and Moodle's long form.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(value) = DateTime::parse_from_rfc3339(raw) {
        return Some(value.naive_utc());
    }
    for format in TIMESTAMP_FORMATS {
        if let Ok(value) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(value);
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

/// Integer value of a raw grade: the leading signed digits, or 0 when there are none.
pub fn parse_grade(raw: &str) -> i64 {
    let raw = raw.trim();
    let (sign, digits) = match raw.as_bytes().first() {
        Some(b'-') => (-1, &raw[1..]),
        Some(b'+') => (1, &raw[1..]),
        _ => (1, raw),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    digits[..end]
        .parse::<i64>()
        .map(|value| sign * value)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::HeaderMap;

    const HEADER: &str = "Name,Email,Timestamp,Grade,Feedback\n";

    #[test]
    fn parses_valid_rows_in_order() {
        let raw = format!(
            "{HEADER}John Doe,jd12,2024-10-31,-0,Looks good!\nJane Smith,js34,2024-10-30,-2,Poor indentation\n"
        );
        let records = validate(&raw, &RosterSchema::default()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].email, "jd12");
        assert_eq!(records[1].grade, "-2");
        assert!(records[0].submitted_at.is_some());
    }

    #[test]
    fn reports_every_missing_header() {
        let raw = "Name,Timestamp,Feedback\nJohn,2024-10-31,ok\n";
        let err = validate(raw, &RosterSchema::default()).unwrap_err();
        assert_eq!(
            err,
            IngestError::MissingHeaders(vec!["Email".to_string(), "Grade".to_string()])
        );
    }

    #[test]
    fn headers_are_case_sensitive() {
        let raw = "name,Email,Timestamp,Grade,Feedback\n";
        let err = validate(raw, &RosterSchema::default()).unwrap_err();
        assert_eq!(err, IngestError::MissingHeaders(vec!["Name".to_string()]));
    }

    #[test]
    fn one_bad_row_rejects_the_file() {
        let raw = format!(
            "{HEADER}A,a@x,2024-10-01,-1,\nB,b@x,2024-10-02,-2,\n,c@x,2024-10-03,-3,\nD,d@x,2024-10-04,-4,\nE,e@x,2024-10-05,-5,\n"
        );
        let err = validate(&raw, &RosterSchema::default()).unwrap_err();
        assert_eq!(
            err,
            IngestError::InvalidRows {
                count: 1,
                lines: vec![4]
            }
        );
    }

    #[test]
    fn short_rows_are_invalid_not_parse_errors() {
        let raw = format!("{HEADER}A,a@x\n");
        let err = validate(&raw, &RosterSchema::default()).unwrap_err();
        assert!(matches!(err, IngestError::InvalidRows { count: 1, .. }));
    }

    #[test]
    fn blank_rows_are_skipped() {
        let raw = format!("{HEADER}A,a@x,2024-10-01,-1,\n   \n,,,,\n\nB,b@x,2024-10-02,-2,\n");
        let records = validate(&raw, &RosterSchema::default()).unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn quoted_moodle_export_with_bom() {
        let raw = "\u{feff}Full name,Email address,Last modified (submission),Grade,Feedback comments\n\
                   \"Doe, John\",jd@uni.edu,\"Thursday, 31 October 2024, 11:59 PM\",-3,\"Add more comments, please\"\n";
        let schema = RosterSchema::new(HeaderMap::moodle());
        let records = validate(raw, &schema).unwrap();
        assert_eq!(records[0].name, "Doe, John");
        assert_eq!(records[0].feedback, "Add more comments, please");
        let expected = NaiveDate::from_ymd_opt(2024, 10, 31)
            .unwrap()
            .and_hms_opt(23, 59, 0)
            .unwrap();
        assert_eq!(records[0].submitted_at, Some(expected));
    }

    #[test]
    fn unterminated_quote_fails_instead_of_swallowing_rows() {
        let raw = format!(
            "{HEADER}A,a@x,2024-01-01,0,\"oops\nB,b@x,2024-01-02,0,\nC,c@x,2024-01-03,0,\n"
        );
        let err = validate(&raw, &RosterSchema::default()).unwrap_err();
        assert!(matches!(err, IngestError::Parse(_)));
    }

    #[test]
    fn escaped_quotes_are_accepted() {
        let raw = format!("{HEADER}A,a@x,2024-01-01,0,\"said \"\"hi\"\"\"\n");
        let records = validate(&raw, &RosterSchema::default()).unwrap();
        assert_eq!(records[0].feedback, "said \"hi\"");
    }

    #[test]
    fn header_cells_are_trimmed() {
        let raw = " Name , Email ,Timestamp,Grade,Feedback\nA,a@x,2024-10-01,-1,\n";
        let records = validate(raw, &RosterSchema::default()).unwrap();
        assert_eq!(records[0].name, "A");
    }

    #[test]
    fn empty_input_misses_all_headers() {
        let err = validate("", &RosterSchema::default()).unwrap_err();
        assert!(matches!(err, IngestError::MissingHeaders(ref h) if h.len() == 5));
    }

    #[test]
    fn grade_uses_integer_prefix() {
        assert_eq!(parse_grade("-20"), -20);
        assert_eq!(parse_grade("-20.00"), -20);
        assert_eq!(parse_grade("-0"), 0);
        assert_eq!(parse_grade(" 7 "), 7);
        assert_eq!(parse_grade("n/a"), 0);
        assert_eq!(parse_grade(""), 0);
    }

    #[test]
    fn unparseable_timestamp_is_none() {
        assert!(parse_timestamp("-").is_none());
        assert!(parse_timestamp("2024-10-31T10:00:00Z").is_some());
        assert!(parse_timestamp("2024-10-31 10:00").is_some());
    }
}
