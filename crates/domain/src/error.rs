/// Shared error type used across all ChatBridge crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Unknown session or message within the caller's scope.
    #[error("not found: {0}")]
    NotFound(String),

    /// The record exists but belongs to a different actor scope.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Request rejected before any write reached the store.
    #[error("validation: {field}: {message}")]
    Validation { field: String, message: String },

    #[error("storage: {0}")]
    Storage(String),

    #[error("upstream {provider}: {message}")]
    Upstream { provider: String, message: String },

    #[error("config: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
