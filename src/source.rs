use crate::error::{PipelineError, Result};
use crate::table::RawTable;
use regex::Regex;
use scraper::{Html, Selector};
use std::time::Duration;
use tracing::{debug, info};

/// Find the dataset's CSV link on the register landing page. Scans every
/// `.csv` anchor and returns the first href matching `pattern`; relative
/// hrefs are resolved against `root_url`.
pub async fn discover_csv_url(
    client: &reqwest::Client,
    page_url: &str,
    root_url: &str,
    pattern: &Regex,
    timeout_secs: u64,
) -> Result<String> {
    let body = client
        .get(page_url)
        .timeout(Duration::from_secs(timeout_secs))
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;

    let document = Html::parse_document(&body);
    let selector = Selector::parse("a[href$='.csv']")
        .map_err(|e| PipelineError::Discovery(format!("bad selector: {e}")))?;
    for anchor in document.select(&selector) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        if pattern.is_match(href) {
            debug!(href, "matched CSV link");
            return Ok(if href.starts_with("http") {
                href.to_string()
            } else {
                format!("{root_url}{href}")
            });
        }
    }
    Err(PipelineError::Discovery(format!(
        "no CSV link matching {pattern} on {page_url}"
    )))
}

/// Download the dataset CSV and parse it into a raw table. Local paths and
/// `file://` URLs read from disk (useful for overrides and tests); remote
/// responses are decoded as UTF-8 with any BOM stripped.
pub async fn fetch_table(
    client: &reqwest::Client,
    url: &str,
    timeout_secs: u64,
) -> Result<RawTable> {
    let text = if let Some(path) = url.strip_prefix("file://") {
        std::fs::read_to_string(path)?
    } else if !url.starts_with("http") {
        std::fs::read_to_string(url)?
    } else {
        let response = client
            .get(url)
            .timeout(Duration::from_secs(timeout_secs))
            .send()
            .await?
            .error_for_status()?;
        let bytes = response.bytes().await?;
        String::from_utf8_lossy(&bytes).into_owned()
    };

    let table = parse_csv(text.trim_start_matches('\u{feff}'))?;
    info!(url, rows = table.rows.len(), columns = table.columns.len(), "fetched source table");
    Ok(table)
}

/// Parse CSV text into column labels and rows. Ragged rows are tolerated;
/// short rows read as empty cells downstream.
pub fn parse_csv(text: &str) -> Result<RawTable> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(text.as_bytes());
    let columns: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(|v| v.to_string()).collect());
    }
    Ok(RawTable { columns, rows })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_headers_and_rows() {
        let table = parse_csv("A,B\n1,2\n3,4\n").unwrap();
        assert_eq!(table.columns, vec!["A", "B"]);
        assert_eq!(table.rows, vec![vec!["1", "2"], vec!["3", "4"]]);
    }

    #[test]
    fn tolerates_ragged_rows_and_quoted_cells() {
        let table = parse_csv("A,B,C\n\"x,y\",2\n1,2,3,4\n").unwrap();
        assert_eq!(table.rows[0], vec!["x,y", "2"]);
        assert_eq!(table.rows[1], vec!["1", "2", "3", "4"]);
    }

    #[test]
    fn bom_is_stripped_before_parsing() {
        let text = "\u{feff}A,B\n1,2\n";
        let table = parse_csv(text.trim_start_matches('\u{feff}')).unwrap();
        assert_eq!(table.columns[0], "A");
    }

    #[tokio::test]
    async fn local_paths_read_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("register.csv");
        std::fs::write(&path, "A,B\n1,2\n").unwrap();

        let client = reqwest::Client::new();
        let direct = fetch_table(&client, path.to_str().unwrap(), 5).await.unwrap();
        assert_eq!(direct.rows.len(), 1);

        let url = format!("file://{}", path.display());
        let via_scheme = fetch_table(&client, &url, 5).await.unwrap();
        assert_eq!(via_scheme.columns, direct.columns);
    }
}
