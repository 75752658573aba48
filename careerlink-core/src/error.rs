use careerlink_scanner::ScanError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error("invalid option `{name}`: {reason}")]
    InvalidOption { name: &'static str, reason: String },

    #[error("unknown engine mode '{0}' (expected auto, http-only or browser-only)")]
    UnknownMode(String),
}

#[derive(Debug, Error)]
pub enum BrowserError {
    /// The headless runtime could not be started; the browser stage is skipped.
    #[error("browser unavailable: {0}")]
    Unavailable(String),

    #[error("browser launch failed: {0}")]
    Launch(String),

    #[error("browser session error: {0}")]
    Session(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum TableError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("column '{0}' not found in input header")]
    MissingColumn(String),

    #[error("input table has no header row")]
    NoHeader,
}

pub type Result<T> = std::result::Result<T, EngineError>;
