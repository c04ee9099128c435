use crate::error::Result;
use crate::table::{CanonicalRecord, RawTable};
use regex::Regex;

pub mod casps;
pub mod non_compliant;

/// One register dataset: knows how to find its CSV on the ESMA page and how
/// to turn raw rows into canonical, fingerprinted records.
pub trait Dataset: Send + Sync {
    /// Dataset id: output file stem, state table name, and metadata key.
    fn name(&self) -> &'static str;

    /// Environment variable that supplies the CSV URL directly, bypassing
    /// link discovery.
    fn url_env(&self) -> &'static str;

    /// Pattern a discovered CSV href must match.
    fn link_pattern(&self) -> &'static Regex;

    /// Map the raw table to canonical records carrying identity key and
    /// content hash.
    fn normalize(&self, table: &RawTable) -> Result<Vec<CanonicalRecord>>;

    /// Canonical-field to public-header pairs for the export view, `pk`
    /// first. Columns that depend on source presence (optional date columns)
    /// are included only when the table carries them.
    fn export_columns(&self, table: &RawTable) -> Vec<(&'static str, &'static str)>;

    /// Dataset-specific extras merged into the metadata entry.
    fn meta_extra(&self) -> Vec<(String, serde_json::Value)> {
        Vec::new()
    }
}

/// All supported datasets, in the order the `run` command refreshes them.
pub fn all_datasets() -> Vec<Box<dyn Dataset>> {
    vec![
        Box::new(casps::CaspDataset),
        Box::new(non_compliant::NonCompliantDataset),
    ]
}

/// Look a dataset up by name.
pub fn create_dataset(name: &str) -> Option<Box<dyn Dataset>> {
    match name {
        casps::DATASET_NAME => Some(Box::new(casps::CaspDataset)),
        non_compliant::DATASET_NAME => Some(Box::new(non_compliant::NonCompliantDataset)),
        _ => None,
    }
}

/// Names of all supported datasets, for CLI help and validation.
pub fn supported_names() -> Vec<&'static str> {
    vec![casps::DATASET_NAME, non_compliant::DATASET_NAME]
}
