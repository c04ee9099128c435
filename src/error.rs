use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("CSV link discovery failed: {0}")]
    Discovery(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("dataset '{0}' normalized to zero rows; refusing to overwrite outputs")]
    EmptyDataset(String),

    #[error("required column missing, no candidate present: {0:?}")]
    MissingColumn(Vec<String>),

    #[error("state database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
