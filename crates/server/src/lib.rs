//! HTTP surface for Breachsim.
//!
//! Three endpoints drive an episode: `POST /reset`, `POST /step`, and
//! `GET /state`, plus a conventional `GET /health`. The episode lives in
//! shared state behind a write lock; steps within an episode are strictly
//! sequential.

pub mod api;
pub mod error;

pub use api::{AppState, router};
pub use error::ServerError;
