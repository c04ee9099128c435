use crate::error::Result;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

const BASE_PAGE_URL: &str = "https://www.esma.europa.eu/esmas-activities/digital-finance-and-innovation/markets-crypto-assets-regulation-mica";
const ROOT_URL: &str = "https://www.esma.europa.eu";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory the published artifacts are written to.
    pub out_dir: PathBuf,
    /// SQLite file holding the per-dataset key-hash tables.
    pub state_db: PathBuf,
    /// Root directory for timestamped pre-overwrite backups.
    pub backup_dir: PathBuf,
    /// Register landing page scanned for dataset CSV links.
    pub base_page_url: String,
    /// Base URL relative CSV hrefs are resolved against.
    pub root_url: String,
    pub page_timeout_secs: u64,
    pub download_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            out_dir: PathBuf::from("out"),
            state_db: PathBuf::from("data/state.sqlite"),
            backup_dir: PathBuf::from("data/backups"),
            base_page_url: BASE_PAGE_URL.to_string(),
            root_url: ROOT_URL.to_string(),
            page_timeout_secs: 30,
            download_timeout_secs: 60,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, falling back to defaults when the
    /// file does not exist.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Path of the shared cumulative metadata document.
    pub fn meta_file(&self) -> PathBuf {
        self.out_dir.join("meta.json")
    }
}
