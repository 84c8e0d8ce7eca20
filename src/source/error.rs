use thiserror::Error;

/// Errors raised while listing albums or fetching item bytes.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Album '{0}' not found")]
    AlbumNotFound(String),

    #[error("HTTP error {status} from {url}")]
    HttpStatus { status: u16, url: String },

    #[error("HTTP request to {url} failed: {source}")]
    Http {
        url: String,
        source: reqwest::Error,
    },

    #[error("Unexpected response from photo source: {0}")]
    Protocol(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SourceError {
    /// Whether this error is transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            SourceError::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            SourceError::Http { .. } => true,
            SourceError::AlbumNotFound(_) | SourceError::Protocol(_) | SourceError::Io(_) => false,
        }
    }
}
