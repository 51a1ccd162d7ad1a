use thiserror::Error;

/// Errors returned by the Breachsim client.
#[derive(Debug, Error)]
pub enum Error {
    /// The HTTP request could not be sent or the response body could not
    /// be read.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The server returned a non-success status.
    #[error("server returned HTTP {status}: {message}")]
    Api { status: u16, message: String },

    /// Client configuration failed.
    #[error("configuration error: {0}")]
    Configuration(String),
}
