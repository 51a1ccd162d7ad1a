use thiserror::Error;

/// Errors that can occur while choosing or caching attacker actions.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(String),

    /// Request timed out.
    #[error("backend request timed out after {0}s")]
    Timeout(u64),

    /// Failed to parse the backend's response.
    #[error("failed to parse attacker response: {0}")]
    Parse(String),

    /// The backend API returned an error response.
    #[error("attacker backend error: {0}")]
    Api(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The policy produced an action the validator rejected (strict mode).
    #[error("invalid attacker action: {0}")]
    InvalidAction(String),

    /// Replay cache failure.
    #[error("replay cache error: {0}")]
    Cache(#[from] rusqlite::Error),
}
