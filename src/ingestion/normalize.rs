//! Value Normalization
//!
//! Turns raw cell values into the strings that get embedded. A column is
//! typed as a whole: all-numeric columns become canonical number strings,
//! all-date columns become `YYYY-MM-DD`, anything else is lowercased,
//! trimmed and stripped of punctuation. Missing or blank values become
//! [`EMPTY_VALUE`].

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use lazy_static::lazy_static;
use regex::Regex;

/// Placeholder for missing or blank values
pub const EMPTY_VALUE: &str = "__EMPTY__";

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d.%m.%Y"];
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y/%m/%d %H:%M:%S"];

lazy_static! {
    static ref PUNCTUATION: Regex = Regex::new(r"[^\w\s]").expect("punctuation pattern is valid");
}

/// Inferred type of a whole column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Integer,
    Float,
    Date,
    Text,
}

/// Normalize a column of raw values (`None` = missing cell)
pub fn normalize_column(values: &[Option<String>]) -> Vec<String> {
    let kind = infer_kind(values);
    values
        .iter()
        .map(|v| match v.as_deref().map(str::trim) {
            None | Some("") => EMPTY_VALUE.to_string(),
            Some(raw) => normalize_value(raw, kind),
        })
        .map(|v| if v.trim().is_empty() { EMPTY_VALUE.to_string() } else { v })
        .collect()
}

/// Lowercase, trim, drop punctuation
pub fn clean_text(value: &str) -> String {
    let lowered = value.to_lowercase();
    PUNCTUATION.replace_all(lowered.trim(), "").into_owned()
}

pub fn infer_kind(values: &[Option<String>]) -> ValueKind {
    let present: Vec<&str> = values
        .iter()
        .filter_map(|v| v.as_deref().map(str::trim))
        .filter(|v| !v.is_empty())
        .collect();
    if present.is_empty() {
        return ValueKind::Text;
    }

    let has_missing = present.len() < values.len();
    if present.iter().all(|v| v.parse::<i64>().is_ok()) {
        // A gap turns an integer column into floats ("1" -> "1.0")
        return if has_missing { ValueKind::Float } else { ValueKind::Integer };
    }
    if present.iter().all(|v| parse_float(v).is_some()) {
        return ValueKind::Float;
    }
    if present.iter().all(|v| parse_date(v).is_some()) {
        return ValueKind::Date;
    }
    ValueKind::Text
}

fn normalize_value(raw: &str, kind: ValueKind) -> String {
    match kind {
        ValueKind::Integer => raw
            .parse::<i64>()
            .map(|i| i.to_string())
            .unwrap_or_else(|_| clean_text(raw)),
        ValueKind::Float => parse_float(raw)
            .map(format_float)
            .unwrap_or_else(|| clean_text(raw)),
        ValueKind::Date => parse_date(raw)
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| clean_text(raw)),
        ValueKind::Text => clean_text(raw),
    }
}

fn parse_float(raw: &str) -> Option<f64> {
    raw.parse::<f64>().ok().filter(|f| f.is_finite())
}

/// Whole floats keep one decimal place ("3.0"), others print as-is
fn format_float(f: f64) -> String {
    if f.fract() == 0.0 && f.abs() < 1e16 {
        format!("{:.1}", f)
    } else {
        f.to_string()
    }
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
                .map(|dt| dt.date())
        })
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.date_naive()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(values: &[&str]) -> Vec<Option<String>> {
        values
            .iter()
            .map(|v| if v.is_empty() { None } else { Some(v.to_string()) })
            .collect()
    }

    #[test]
    fn test_text_is_cleaned() {
        let out = normalize_column(&column(&["  Hello, World! ", "O'Brien", "..."]));
        assert_eq!(out, vec!["hello world", "obrien", EMPTY_VALUE]);
    }

    #[test]
    fn test_missing_values_become_placeholder() {
        let out = normalize_column(&column(&["alice", "", "bob"]));
        assert_eq!(out, vec!["alice", EMPTY_VALUE, "bob"]);
    }

    #[test]
    fn test_integer_column() {
        let out = normalize_column(&column(&["1", " 42", "-7"]));
        assert_eq!(out, vec!["1", "42", "-7"]);
        assert_eq!(infer_kind(&column(&["1", "2"])), ValueKind::Integer);
    }

    #[test]
    fn test_integer_column_with_gap_becomes_float() {
        let out = normalize_column(&column(&["1", "", "3"]));
        assert_eq!(out, vec!["1.0", EMPTY_VALUE, "3.0"]);
    }

    #[test]
    fn test_float_column() {
        let out = normalize_column(&column(&["1.5", "2", "0.25"]));
        assert_eq!(out, vec!["1.5", "2.0", "0.25"]);
    }

    #[test]
    fn test_date_column() {
        let out = normalize_column(&column(&["2025-01-15", "2025/02/20", "2025-03-01 10:00:00"]));
        assert_eq!(out, vec!["2025-01-15", "2025-02-20", "2025-03-01"]);
    }

    #[test]
    fn test_mixed_column_is_text() {
        let values = column(&["2025-01-15", "n/a"]);
        assert_eq!(infer_kind(&values), ValueKind::Text);
        assert_eq!(normalize_column(&values), vec!["20250115", "na"]);
    }

    #[test]
    fn test_all_missing_column() {
        let out = normalize_column(&[None, None]);
        assert_eq!(out, vec![EMPTY_VALUE, EMPTY_VALUE]);
    }
}
