use crate::error::Result;
use crate::publish::atomic_write;
use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

const COUNT_FIELDS: &[&str] = &["total_rows", "new_rows", "updated_rows", "removed_rows"];

/// One dataset's contribution to the cumulative metadata document.
#[derive(Debug, Clone)]
pub struct MetaEntry {
    pub total_rows: usize,
    pub new_rows: usize,
    pub updated_rows: usize,
    pub removed_rows: usize,
    pub source_url: String,
    pub extra: Vec<(String, Value)>,
}

/// Merge one dataset's metadata into the shared document, leaving every other
/// dataset's entry untouched, and write the result atomically.
///
/// The read-merge-write sequence is not safe under truly parallel runs;
/// sequential execution per process is the supported mode.
pub fn merge_dataset_meta(meta_path: &Path, dataset: &str, entry: &MetaEntry) -> Result<()> {
    let mut document = load_document(meta_path, dataset);

    let mut value = Map::new();
    value.insert(
        "generated_at".to_string(),
        Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)),
    );
    value.insert("source".to_string(), Value::String(dataset.to_string()));
    value.insert("total_rows".to_string(), Value::from(entry.total_rows));
    value.insert("new_rows".to_string(), Value::from(entry.new_rows));
    value.insert("updated_rows".to_string(), Value::from(entry.updated_rows));
    value.insert("removed_rows".to_string(), Value::from(entry.removed_rows));
    value.insert("source_url".to_string(), Value::String(entry.source_url.clone()));
    for (key, extra) in &entry.extra {
        value.insert(key.clone(), extra.clone());
    }

    document.insert(dataset.to_string(), Value::Object(value));
    atomic_write(meta_path, serde_json::to_string_pretty(&Value::Object(document))?.as_bytes())?;
    info!(dataset, "merged run metadata");
    Ok(())
}

fn load_document(path: &Path, dataset: &str) -> Map<String, Value> {
    let Ok(text) = fs::read_to_string(path) else {
        return Map::new();
    };
    match serde_json::from_str::<Value>(&text) {
        Ok(raw) => migrate_legacy(raw, dataset),
        Err(_) => {
            warn!(path = %path.display(), "metadata document unreadable, starting fresh");
            Map::new()
        }
    }
}

/// One-shot migration from the legacy flat layout, where a single dataset's
/// metadata fields sat at the document's top level, to the keyed per-dataset
/// document. A legacy entry whose declared `source` is missing, empty, or not
/// a string is kept under `fallback_source` rather than dropped.
/// Already-keyed entries pass through unchanged.
pub fn migrate_legacy(raw: Value, fallback_source: &str) -> Map<String, Value> {
    let Value::Object(raw) = raw else {
        return Map::new();
    };

    let mut document = Map::new();
    let is_legacy =
        raw.contains_key("source") && COUNT_FIELDS.iter().any(|field| raw.contains_key(*field));
    if is_legacy {
        let name = raw
            .get("source")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .unwrap_or(fallback_source);
        let mut entry: Map<String, Value> = raw
            .iter()
            .filter(|(key, value)| key.as_str() != "source" && !value.is_object())
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        entry.insert("source".to_string(), Value::String(name.to_string()));
        document.insert(name.to_string(), Value::Object(entry));
    }
    for (key, value) in raw {
        if value.get("source").is_some() {
            document.insert(key, value);
        }
    }
    document
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn entry(total: usize, url: &str) -> MetaEntry {
        MetaEntry {
            total_rows: total,
            new_rows: 1,
            updated_rows: 0,
            removed_rows: 0,
            source_url: url.to_string(),
            extra: Vec::new(),
        }
    }

    #[test]
    fn merging_two_datasets_keeps_both_entries() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("meta.json");

        merge_dataset_meta(&path, "casps", &entry(10, "https://a.example/casps.csv")).unwrap();
        merge_dataset_meta(&path, "non_compliant", &entry(3, "https://a.example/nc.csv")).unwrap();
        // second run for casps must not clobber non_compliant
        merge_dataset_meta(&path, "casps", &entry(11, "https://a.example/casps.csv")).unwrap();

        let doc: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(doc["casps"]["total_rows"], 11);
        assert_eq!(doc["casps"]["source"], "casps");
        assert_eq!(doc["non_compliant"]["total_rows"], 3);
        assert!(doc["casps"]["generated_at"].as_str().unwrap().ends_with('Z'));
    }

    #[test]
    fn legacy_flat_document_is_rekeyed_under_its_source() {
        let legacy = json!({
            "generated_at": "2024-01-01T00:00:00Z",
            "source": "casps",
            "total_rows": 5,
            "new_rows": 5,
            "updated_rows": 0,
            "removed_rows": 0
        });
        let migrated = migrate_legacy(legacy, "non_compliant");
        assert_eq!(migrated.len(), 1);
        assert_eq!(migrated["casps"]["total_rows"], 5);
        assert_eq!(migrated["casps"]["source"], "casps");
    }

    #[test]
    fn legacy_document_without_usable_source_keeps_the_entry_under_the_merging_dataset() {
        let legacy = json!({
            "generated_at": "2024-01-01T00:00:00Z",
            "source": 7,
            "total_rows": 5,
            "new_rows": 5,
            "updated_rows": 0,
            "removed_rows": 0
        });
        let migrated = migrate_legacy(legacy, "casps");
        assert_eq!(migrated.len(), 1);
        assert_eq!(migrated["casps"]["total_rows"], 5);
        assert_eq!(migrated["casps"]["source"], "casps");

        let empty = json!({ "source": "", "total_rows": 2 });
        let migrated = migrate_legacy(empty, "non_compliant");
        assert_eq!(migrated["non_compliant"]["total_rows"], 2);
        assert_eq!(migrated["non_compliant"]["source"], "non_compliant");
    }

    #[test]
    fn legacy_migration_applies_on_first_merge_after_upgrade() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("meta.json");
        fs::write(
            &path,
            json!({
                "generated_at": "2024-01-01T00:00:00Z",
                "source": "casps",
                "total_rows": 5,
                "new_rows": 5,
                "updated_rows": 0,
                "removed_rows": 0
            })
            .to_string(),
        )
        .unwrap();

        merge_dataset_meta(&path, "non_compliant", &entry(3, "https://a.example/nc.csv")).unwrap();

        let doc: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(doc["casps"]["total_rows"], 5);
        assert_eq!(doc["non_compliant"]["total_rows"], 3);
        assert!(doc.get("total_rows").is_none());
    }

    #[test]
    fn keyed_document_passes_through_migration_unchanged() {
        let keyed = json!({
            "casps": { "source": "casps", "total_rows": 5 },
            "non_compliant": { "source": "non_compliant", "total_rows": 2 }
        });
        let migrated = migrate_legacy(keyed, "casps");
        assert_eq!(migrated.len(), 2);
        assert_eq!(migrated["non_compliant"]["total_rows"], 2);
    }

    #[test]
    fn corrupt_document_starts_fresh_instead_of_failing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("meta.json");
        fs::write(&path, "{not json").unwrap();

        merge_dataset_meta(&path, "casps", &entry(10, "https://a.example/casps.csv")).unwrap();
        let doc: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(doc["casps"]["total_rows"], 10);
    }

    #[test]
    fn extras_are_carried_into_the_entry() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("meta.json");
        let mut with_extra = entry(1, "https://a.example/casps.csv");
        with_extra.extra.push(("register_version".to_string(), json!("interim")));

        merge_dataset_meta(&path, "casps", &with_extra).unwrap();
        let doc: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(doc["casps"]["register_version"], "interim");
    }
}
