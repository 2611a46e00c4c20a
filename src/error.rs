use thiserror::Error;

/// Errors raised outside the filter core: loading, config and the detail boundary.
/// Filtering itself never fails.
#[derive(Error, Debug)]
pub enum FilterError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Expected a JSON array of rows or a single row object, found {0}")]
    InvalidForest(&'static str),
    #[error("No node at pointer {0:?}")]
    NodeNotFound(String),
    #[error("Detail fetch failed for {identifier}: {reason}")]
    Fetch { identifier: String, reason: String },
    #[error("Could not determine a config directory")]
    ConfigDir,
}

pub type Result<T> = std::result::Result<T, FilterError>;
