use thiserror::Error;
use vlscout_scanner::ScanError;

#[derive(Error, Debug)]
pub enum ScoutError {
    #[error("Scan error: {0}")]
    Scan(#[from] ScanError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Oracle error: {0}")]
    Oracle(String),
}

pub type Result<T> = std::result::Result<T, ScoutError>;
