use thiserror::Error;

/// Error type for GitLab API operations.
///
/// - `Http` — any non-2xx response, with the best-effort server message
/// - `Parsing` — a body declared as JSON that could not be decoded
/// - `Index` — paginated list access past the last available item
/// - `Configuration` — invalid client setup, raised when the client is built
/// - `InvalidUrl` — a request URL that cannot be sent as written
/// - `Transport` — network/transport errors (wraps `reqwest::Error`)
/// - `Io` — failures of the default streaming chunk action
#[derive(Debug, Error)]
pub enum GitlabError {
    #[error("HTTP error {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Failed to parse the server response: {0}")]
    Parsing(String),

    #[error("List index {index} out of range ({available} items available)")]
    Index { index: usize, available: usize },

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Invalid request URL: {0}")]
    InvalidUrl(String),

    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl GitlabError {
    /// HTTP status code carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            GitlabError::Http { status, .. } => Some(*status),
            GitlabError::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

pub type Result<T> = std::result::Result<T, GitlabError>;
