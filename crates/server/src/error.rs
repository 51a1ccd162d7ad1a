use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use breachsim_episode::EpisodeError;

/// Errors that can occur when running the Breachsim server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// A configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// An I/O error (e.g. binding the listener).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// An episode-level error surfaced through the API (seed load
    /// failures, strict-mode policy aborts).
    #[error("episode error: {0}")]
    Episode(#[from] EpisodeError),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::Config(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            Self::Io(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
            Self::Episode(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        };
        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}
