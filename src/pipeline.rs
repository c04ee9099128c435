use crate::config::Config;
use crate::datasets::Dataset;
use crate::error::Result;
use crate::meta::{self, MetaEntry};
use crate::publish;
use crate::source;
use crate::state::{ChangeStore, DiffResult};
use serde::Serialize;
use std::collections::HashMap;
use tracing::{error, info, instrument};

/// Outcome of one dataset refresh, also the printable run summary.
#[derive(Debug, Serialize)]
pub struct RunResult {
    pub dataset: String,
    pub url: String,
    pub rows: usize,
    pub diff: DiffResult,
}

/// Run the full refresh for one dataset: resolve the source URL, fetch and
/// normalize the snapshot, diff and persist against the previous one, publish
/// artifacts, and merge run metadata. Fully sequential; any failure aborts
/// this dataset's run with prior outputs untouched.
#[instrument(skip_all, fields(dataset = dataset.name()))]
pub async fn run_dataset(
    dataset: &dyn Dataset,
    config: &Config,
    client: &reqwest::Client,
) -> Result<RunResult> {
    let url = match std::env::var(dataset.url_env()) {
        Ok(value) if !value.trim().is_empty() => value,
        _ => {
            source::discover_csv_url(
                client,
                &config.base_page_url,
                &config.root_url,
                dataset.link_pattern(),
                config.page_timeout_secs,
            )
            .await?
        }
    };
    info!(url = %url, "resolved source URL");

    let table = source::fetch_table(client, &url, config.download_timeout_secs).await?;
    let records = dataset.normalize(&table)?;
    info!(rows = records.len(), "normalized batch");

    // refuse before touching the store, so a bad upstream snapshot neither
    // clobbers the persisted state nor the published outputs
    if records.is_empty() {
        return Err(crate::error::PipelineError::EmptyDataset(dataset.name().to_string()));
    }

    // When two rows collapse to one identity key, the later one wins in the
    // persisted state; classification runs over the deduplicated map.
    let mut order: Vec<&str> = Vec::with_capacity(records.len());
    let mut by_key: HashMap<&str, &str> = HashMap::with_capacity(records.len());
    for record in &records {
        if by_key.insert(record.pk.as_str(), record.hash.as_str()).is_none() {
            order.push(record.pk.as_str());
        }
    }
    let current: Vec<(String, String)> = order
        .iter()
        .map(|pk| ((*pk).to_string(), by_key.get(pk).copied().unwrap_or("").to_string()))
        .collect();

    let mut store = ChangeStore::open(&config.state_db)?;
    let diff = store.diff_and_commit(dataset.name(), &current)?;
    info!(
        new = diff.new.len(),
        updated = diff.updated.len(),
        removed = diff.removed.len(),
        "change detection committed"
    );

    let export = publish::build_export(&records, &dataset.export_columns(&table));
    publish::write_dataset(&config.out_dir, &config.backup_dir, dataset.name(), &export, &diff)?;

    let entry = MetaEntry {
        total_rows: export.rows.len(),
        new_rows: diff.new.len(),
        updated_rows: diff.updated.len(),
        removed_rows: diff.removed.len(),
        source_url: url.clone(),
        extra: dataset.meta_extra(),
    };
    meta::merge_dataset_meta(&config.meta_file(), dataset.name(), &entry)?;

    Ok(RunResult {
        dataset: dataset.name().to_string(),
        url,
        rows: export.rows.len(),
        diff,
    })
}

/// Refresh several datasets sequentially with one shared client. A failing
/// register is logged and reported in its slot but never blocks the datasets
/// that follow: one register's schema drift must not hold back the others.
pub async fn run_all(
    datasets: &[Box<dyn Dataset>],
    config: &Config,
    client: &reqwest::Client,
) -> Vec<(String, Result<RunResult>)> {
    let mut outcomes = Vec::with_capacity(datasets.len());
    for dataset in datasets {
        let outcome = run_dataset(dataset.as_ref(), config, client).await;
        match &outcome {
            Ok(result) => info!(dataset = dataset.name(), rows = result.rows, "run finished"),
            Err(e) => error!(dataset = dataset.name(), error = %e, "dataset run failed"),
        }
        outcomes.push((dataset.name().to_string(), outcome));
    }
    outcomes
}
