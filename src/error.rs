use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DownloaderError {
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid listing url: {0}")]
    InvalidUrl(String),

    #[error("failed to parse config at {path}: {message}")]
    Config { path: PathBuf, message: String },

    #[error("external tool is missing: {tool}")]
    ExternalToolMissing { tool: String },

    #[error("external tool failed: {tool} (code={code:?}) {stderr}")]
    ExternalToolFailed {
        tool: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("external tool timed out: {tool} after {secs}s")]
    ExternalToolTimedOut { tool: String, secs: u64 },

    #[error("unexpected engine output: {0}")]
    UnexpectedOutput(String),
}

pub type Result<T> = std::result::Result<T, DownloaderError>;
