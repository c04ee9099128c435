use std::collections::BTreeMap;

/// One source table exactly as read: column labels and cell values untouched.
/// Lives only for the duration of a single pipeline run.
#[derive(Debug, Clone, Default)]
pub struct RawTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// A row after normalization: fixed canonical field names, a `raw_`-prefixed
/// shadow copy of every source column, plus the derived identity key and
/// content hash. Absent values are stored as empty strings.
#[derive(Debug, Clone, Default)]
pub struct CanonicalRecord {
    pub pk: String,
    pub hash: String,
    pub fields: BTreeMap<String, String>,
}

impl CanonicalRecord {
    /// Field value, empty when the field is absent.
    pub fn get(&self, field: &str) -> &str {
        self.fields.get(field).map(String::as_str).unwrap_or("")
    }

    pub fn set(&mut self, field: &str, value: impl Into<String>) {
        self.fields.insert(field.to_string(), value.into());
    }
}
