use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Input not found: {path}: {source}")]
    InputNotFound {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed input at line {line}: {reason}")]
    MalformedInput { line: u64, reason: String },

    #[error("Empty dataset: {0}")]
    EmptyDataset(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Histogram error: {0}")]
    Histogram(#[from] hdrhistogram::CreationError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;
