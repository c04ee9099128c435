use crate::error::{PipelineError, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, HashMap};

/// Two-letter jurisdiction codes mapped to full member-state names. `UK` and
/// `GB` intentionally map to the same name.
static COUNTRY_MAP: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("AT", "Austria"),
        ("BE", "Belgium"),
        ("BG", "Bulgaria"),
        ("HR", "Croatia"),
        ("CY", "Cyprus"),
        ("CZ", "Czech Republic"),
        ("DK", "Denmark"),
        ("EE", "Estonia"),
        ("FI", "Finland"),
        ("FR", "France"),
        ("DE", "Germany"),
        ("GR", "Greece"),
        ("HU", "Hungary"),
        ("IE", "Ireland"),
        ("IT", "Italy"),
        ("LV", "Latvia"),
        ("LT", "Lithuania"),
        ("LU", "Luxembourg"),
        ("MT", "Malta"),
        ("NL", "Netherlands"),
        ("PL", "Poland"),
        ("PT", "Portugal"),
        ("RO", "Romania"),
        ("SK", "Slovakia"),
        ("SI", "Slovenia"),
        ("ES", "Spain"),
        ("SE", "Sweden"),
        ("IS", "Iceland"),
        ("LI", "Liechtenstein"),
        ("NO", "Norway"),
        ("UK", "United Kingdom"),
        ("GB", "United Kingdom"),
    ])
});

/// Letter-coded crypto-asset service codes (`a.` through `j.`) to short labels.
static SERVICE_CODE_MAP: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("a", "custody"),
        ("b", "trading platform"),
        ("c", "exchange funds"),
        ("d", "exchange crypto"),
        ("e", "execution"),
        ("f", "placing"),
        ("g", "RTO"),
        ("h", "advice"),
        ("i", "portfolio mgmt"),
        ("j", "transfer"),
    ])
});

static SERVICE_CODE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^([a-j])\.").unwrap());

/// Fold an arbitrary source column label into lower-snake form: word
/// boundaries come from casing and spaces, repeated separators collapse.
pub fn to_snake_case(name: &str) -> String {
    let spaced = name.trim().replace(' ', "_");
    let mut snake = String::with_capacity(spaced.len() + 4);
    for (i, ch) in spaced.chars().enumerate() {
        if ch.is_uppercase() && i > 0 {
            snake.push('_');
        }
        for lower in ch.to_lowercase() {
            snake.push(lower);
        }
    }
    while snake.contains("__") {
        snake = snake.replace("__", "_");
    }
    snake
}

/// Fold one raw row into canonical field names, keeping a `raw_`-prefixed
/// shadow copy of every source column for audit.
pub fn fold_row(columns: &[String], row: &[String]) -> BTreeMap<String, String> {
    let mut fields = BTreeMap::new();
    for (i, column) in columns.iter().enumerate() {
        let value = row.get(i).map(String::as_str).unwrap_or("");
        let canonical = to_snake_case(column);
        fields.insert(format!("raw_{canonical}"), value.to_string());
        fields.insert(canonical, value.to_string());
    }
    fields
}

/// Map a two-letter jurisdiction code to its full name. Lookup is
/// case-insensitive; unmapped codes pass through unchanged.
pub fn map_country(code: &str) -> String {
    let trimmed = code.trim();
    match COUNTRY_MAP.get(trimmed.to_uppercase().as_str()) {
        Some(name) => (*name).to_string(),
        None => trimmed.to_string(),
    }
}

/// Like [`map_country`], but folds blanks and textual nulls to an empty value.
/// Used where the source mixes empty cells and `NULL`-ish strings into the
/// jurisdiction column.
pub fn map_country_or_blank(code: &str) -> String {
    let upper = code.trim().to_uppercase();
    if matches!(upper.as_str(), "" | "NAN" | "NONE" | "NULL") {
        return String::new();
    }
    match COUNTRY_MAP.get(upper.as_str()) {
        Some(name) => (*name).to_string(),
        None => code.trim().to_string(),
    }
}

/// Expand a pipe-delimited, letter-coded service field (`"a. Custody|j. ..."`)
/// into a pipe-joined list of short labels. Unrecognized parts pass through
/// as-is; duplicates are dropped, first-seen order is preserved.
pub fn expand_service_codes(value: &str) -> String {
    let mut labels: Vec<String> = Vec::new();
    for part in value.split('|') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let label = match SERVICE_CODE_RE.captures(part) {
            Some(caps) => {
                let code = caps[1].to_ascii_lowercase();
                match SERVICE_CODE_MAP.get(code.as_str()) {
                    Some(short) => (*short).to_string(),
                    None => part.to_string(),
                }
            }
            None => part.to_string(),
        };
        if !labels.contains(&label) {
            labels.push(label);
        }
    }
    labels.join(" | ")
}

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%d/%m/%Y",
    "%d-%m-%Y",
    "%d.%m.%Y",
    "%Y/%m/%d",
    "%d %b %Y",
    "%d %B %Y",
    "%b %d, %Y",
    "%B %d, %Y",
];

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"];

/// Parse a free-form date string to a calendar date. Empty or unparseable
/// input yields `None`, never an error.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(parsed.date_naive());
    }
    for format in DATE_FORMATS {
        if let Ok(parsed) = NaiveDate::parse_from_str(trimmed, format) {
            return Some(parsed);
        }
    }
    for format in DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(parsed.date());
        }
    }
    None
}

/// Parsed date as an ISO `YYYY-MM-DD` field value, empty when absent.
pub fn parse_date_field(value: &str) -> String {
    parse_date(value)
        .map(|date| date.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

/// Resolve a canonical field through an ordered list of candidate names.
/// Returns the first candidate present in the record.
pub fn pick_field<'a>(
    fields: &'a BTreeMap<String, String>,
    candidates: &[&str],
) -> Option<&'a str> {
    candidates
        .iter()
        .find_map(|candidate| fields.get(*candidate).map(String::as_str))
}

/// [`pick_field`] with an empty-string default, so minor schema drift does not
/// fail the run outright.
pub fn pick_field_or_default(fields: &BTreeMap<String, String>, candidates: &[&str]) -> String {
    pick_field(fields, candidates).unwrap_or("").to_string()
}

/// [`pick_field`] for required fields: every candidate exhausted is a schema
/// error that aborts the dataset run.
pub fn require_field(fields: &BTreeMap<String, String>, candidates: &[&str]) -> Result<String> {
    pick_field(fields, candidates)
        .map(str::to_string)
        .ok_or_else(|| {
            PipelineError::MissingColumn(candidates.iter().map(|c| (*c).to_string()).collect())
        })
}
