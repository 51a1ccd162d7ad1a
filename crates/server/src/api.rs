//! Axum router and handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use breachsim_core::{DefenderAction, EpisodeStatus, StepOutcome};
use breachsim_episode::Episode;

use crate::error::ServerError;

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    /// The hosted episode. One defender step at a time.
    pub episode: Arc<RwLock<Episode>>,
}

impl AppState {
    /// Wrap an episode for serving.
    #[must_use]
    pub fn new(episode: Episode) -> Self {
        Self {
            episode: Arc::new(RwLock::new(episode)),
        }
    }
}

/// Build the router with all routes and middleware.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/reset", post(reset))
        .route("/step", post(step))
        .route("/state", get(state_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// `GET /health` -- liveness probe.
async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// `POST /reset` -- begin a fresh episode and return the first observation.
async fn reset(State(state): State<AppState>) -> Result<Json<StepOutcome>, ServerError> {
    let mut episode = state.episode.write().await;
    let outcome = episode.reset()?;
    Ok(Json(outcome))
}

/// `POST /step` -- apply one defender action.
async fn step(
    State(state): State<AppState>,
    Json(action): Json<DefenderAction>,
) -> Result<Json<StepOutcome>, ServerError> {
    let mut episode = state.episode.write().await;
    let outcome = episode.step(action).await?;
    Ok(Json(outcome))
}

/// `GET /state` -- episode bookkeeping.
async fn state_handler(State(state): State<AppState>) -> Json<EpisodeStatus> {
    let episode = state.episode.read().await;
    Json(episode.status())
}
