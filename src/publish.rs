use crate::error::{PipelineError, Result};
use crate::state::DiffResult;
use crate::table::CanonicalRecord;
use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Public view of one dataset: renamed headers and row values in export
/// order. No `raw_` shadow columns, no hash plumbing, only `pk` itself.
#[derive(Debug, Clone)]
pub struct ExportTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Build the export view from canonical records. `columns` pairs each
/// canonical field with its public header; the `pk` field reads the identity
/// key.
pub fn build_export(records: &[CanonicalRecord], columns: &[(&str, &str)]) -> ExportTable {
    let headers = columns.iter().map(|(_, header)| (*header).to_string()).collect();
    let rows = records
        .iter()
        .map(|record| {
            columns
                .iter()
                .map(|(field, _)| {
                    if *field == "pk" {
                        record.pk.clone()
                    } else {
                        record.get(field).to_string()
                    }
                })
                .collect()
        })
        .collect();
    ExportTable { headers, rows }
}

/// The artifact file names published for a dataset.
pub fn artifact_names(dataset: &str) -> [String; 3] {
    [
        format!("{dataset}.csv"),
        format!("{dataset}.json"),
        format!("{dataset}_delta.csv"),
    ]
}

/// Write `data` fully to a temporary sibling, then move it into place in one
/// step, so a concurrent reader never observes a partial file.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut tmp_name = path.as_os_str().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);
    fs::write(&tmp_path, data)?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Copy every existing output file for the dataset into a fresh timestamped
/// backup directory. Skipped entirely when no prior artifact exists, so a
/// first publish leaves no empty backup folder behind.
fn backup_existing_outputs(out_dir: &Path, backup_dir: &Path, dataset: &str) -> Result<()> {
    let names = artifact_names(dataset);
    let existing: Vec<&String> = names
        .iter()
        .filter(|name| out_dir.join(name.as_str()).exists())
        .collect();
    if existing.is_empty() {
        debug!(dataset, "no prior outputs, skipping backup");
        return Ok(());
    }

    // Millisecond resolution keeps back-to-back runs from reusing a directory
    let timestamp = Utc::now().format("%Y%m%d%H%M%S%3fZ").to_string();
    let dest_dir = backup_dir.join(dataset).join(&timestamp);
    fs::create_dir_all(&dest_dir)?;
    for name in &existing {
        fs::copy(out_dir.join(name.as_str()), dest_dir.join(name.as_str()))?;
    }
    info!(dataset, %timestamp, files = existing.len(), "backed up prior outputs");
    Ok(())
}

/// Publish the three artifacts for a dataset: full export as CSV and JSON
/// record array, plus the delta manifest. Refuses to write anything when the
/// export view is empty, and backs up prior outputs first.
pub fn write_dataset(
    out_dir: &Path,
    backup_dir: &Path,
    dataset: &str,
    export: &ExportTable,
    diff: &DiffResult,
) -> Result<()> {
    if export.rows.is_empty() {
        return Err(PipelineError::EmptyDataset(dataset.to_string()));
    }
    backup_existing_outputs(out_dir, backup_dir, dataset)?;

    let mut table_writer = csv::Writer::from_writer(Vec::new());
    table_writer.write_record(&export.headers)?;
    for row in &export.rows {
        table_writer.write_record(row)?;
    }
    let table_bytes = table_writer
        .into_inner()
        .map_err(|e| PipelineError::Persistence(e.to_string()))?;
    atomic_write(&out_dir.join(format!("{dataset}.csv")), &table_bytes)?;

    let records: Vec<serde_json::Map<String, serde_json::Value>> = export
        .rows
        .iter()
        .map(|row| {
            export
                .headers
                .iter()
                .cloned()
                .zip(row.iter().map(|value| serde_json::Value::String(value.clone())))
                .collect()
        })
        .collect();
    let json_text = serde_json::to_string_pretty(&records)?;
    atomic_write(&out_dir.join(format!("{dataset}.json")), json_text.as_bytes())?;

    let mut delta_writer = csv::Writer::from_writer(Vec::new());
    delta_writer.write_record(["pk", "action"])?;
    for (keys, action) in [
        (&diff.new, "new"),
        (&diff.updated, "update"),
        (&diff.removed, "remove"),
    ] {
        for pk in keys {
            delta_writer.write_record([pk.as_str(), action])?;
        }
    }
    let delta_bytes = delta_writer
        .into_inner()
        .map_err(|e| PipelineError::Persistence(e.to_string()))?;
    atomic_write(&out_dir.join(format!("{dataset}_delta.csv")), &delta_bytes)?;

    info!(dataset, rows = export.rows.len(), "published dataset artifacts");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::CanonicalRecord;
    use tempfile::tempdir;

    fn sample_export() -> ExportTable {
        let mut record = CanonicalRecord {
            pk: "GERMANY|bafin|alphaco".to_string(),
            ..Default::default()
        };
        record.set("ae_lei_name", "AlphaCo");
        record.set("ae_website", "https://old.example");
        record.set("raw_ae_website", " https://old.example ");
        build_export(
            &[record],
            &[("pk", "pk"), ("ae_lei_name", "lei_name"), ("ae_website", "website")],
        )
    }

    fn sample_diff() -> DiffResult {
        DiffResult {
            new: vec!["GERMANY|bafin|alphaco".to_string()],
            updated: vec![],
            removed: vec!["FRANCE|amf|betaco".to_string()],
        }
    }

    #[test]
    fn export_view_excludes_raw_columns() {
        let export = sample_export();
        assert_eq!(export.headers, vec!["pk", "lei_name", "website"]);
        assert_eq!(export.rows.len(), 1);
        assert_eq!(export.rows[0][0], "GERMANY|bafin|alphaco");
        assert!(!export.rows[0].iter().any(|v| v.contains(" https://")));
    }

    #[test]
    fn artifacts_are_written_with_expected_content() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("out");
        let backups = dir.path().join("backups");

        write_dataset(&out, &backups, "casps", &sample_export(), &sample_diff()).unwrap();

        let table = fs::read_to_string(out.join("casps.csv")).unwrap();
        assert!(table.starts_with("pk,lei_name,website\n"));
        assert!(table.contains("GERMANY|bafin|alphaco"));

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(out.join("casps.json")).unwrap()).unwrap();
        assert_eq!(json[0]["lei_name"], "AlphaCo");

        let delta = fs::read_to_string(out.join("casps_delta.csv")).unwrap();
        let lines: Vec<&str> = delta.lines().collect();
        assert_eq!(lines[0], "pk,action");
        assert_eq!(lines[1], "GERMANY|bafin|alphaco,new");
        assert_eq!(lines[2], "FRANCE|amf|betaco,remove");

        // no stray temp files left behind
        assert!(!out.join("casps.csv.tmp").exists());
    }

    #[test]
    fn empty_export_refuses_and_leaves_outputs_untouched() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("out");
        let backups = dir.path().join("backups");

        write_dataset(&out, &backups, "casps", &sample_export(), &sample_diff()).unwrap();
        let before = fs::read(out.join("casps.csv")).unwrap();

        let empty = ExportTable { headers: vec!["pk".to_string()], rows: vec![] };
        let err = write_dataset(&out, &backups, "casps", &empty, &DiffResult::default()).unwrap_err();
        assert!(matches!(err, PipelineError::EmptyDataset(_)));

        assert_eq!(fs::read(out.join("casps.csv")).unwrap(), before);
    }

    #[test]
    fn backup_is_skipped_on_first_publish_and_taken_afterwards() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("out");
        let backups = dir.path().join("backups");

        write_dataset(&out, &backups, "casps", &sample_export(), &sample_diff()).unwrap();
        assert!(!backups.join("casps").exists());

        write_dataset(&out, &backups, "casps", &sample_export(), &sample_diff()).unwrap();
        let stamped: Vec<_> = fs::read_dir(backups.join("casps")).unwrap().collect();
        assert_eq!(stamped.len(), 1);
        let stamp_dir = stamped[0].as_ref().unwrap().path();
        assert!(stamp_dir.join("casps.csv").exists());
        assert!(stamp_dir.join("casps.json").exists());
        assert!(stamp_dir.join("casps_delta.csv").exists());
    }

    #[test]
    fn consecutive_backups_use_fresh_directories() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("out");
        let backups = dir.path().join("backups");

        write_dataset(&out, &backups, "casps", &sample_export(), &sample_diff()).unwrap();
        write_dataset(&out, &backups, "casps", &sample_export(), &sample_diff()).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        write_dataset(&out, &backups, "casps", &sample_export(), &sample_diff()).unwrap();

        let stamped: Vec<_> = fs::read_dir(backups.join("casps")).unwrap().collect();
        assert_eq!(stamped.len(), 2);
    }
}
