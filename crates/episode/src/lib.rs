//! Episode orchestration for Breachsim.
//!
//! One [`Episode`] owns the evidence store, containment, and attacker
//! state for a single scripted incident. Each `step` applies the
//! defender's action, checks for injection violations, lets the attacker
//! move, emits evidence, and returns an observation; `submit_report`
//! triggers the oracle.

pub mod config;
pub mod controller;
pub mod error;

pub use config::EpisodeConfig;
pub use controller::Episode;
pub use error::EpisodeError;
