use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("HTTP status {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Output root {path} could not be created: {reason}")]
    OutputRoot { path: String, reason: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Cache entry is corrupt: {0}")]
    CacheError(#[from] serde_json::Error),

    #[error("Task join error: {0}")]
    JoinError(#[from] tokio::task::JoinError),

    #[error("Other error: {0}")]
    Other(String),
}

impl ScanError {
    /// Whether the error stops the crawl before it starts rather than skipping one resource.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ScanError::InvalidUrl(_) | ScanError::OutputRoot { .. })
    }
}

pub type Result<T> = std::result::Result<T, ScanError>;
