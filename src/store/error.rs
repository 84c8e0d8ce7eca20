use thiserror::Error;

/// Typed upload errors enabling retry classification.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Bucket rejected {key}: {source}")]
    Backend {
        key: String,
        source: opendal::Error,
    },

    #[error("Invalid object key {0:?}")]
    InvalidKey(String),

    #[error("Invalid store endpoint {endpoint}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("Disk error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Whether this error is transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::Backend { source, .. } => {
                source.is_temporary() || source.kind() == opendal::ErrorKind::RateLimited
            }
            StoreError::InvalidKey(_) | StoreError::InvalidEndpoint { .. } | StoreError::Io(_) => {
                false
            }
        }
    }
}
