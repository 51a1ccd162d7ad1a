use thiserror::Error;

use breachsim_attacker::PolicyError;
use breachsim_core::SeedError;
use breachsim_evidence::EvidenceError;

/// Errors that end an episode (defender mistakes do not; they surface
/// through the observation instead).
#[derive(Debug, Error)]
pub enum EpisodeError {
    /// The scenario seed or ground truth could not be loaded.
    #[error(transparent)]
    Seed(#[from] SeedError),

    /// The evidence store failed outside a defender-supplied query.
    #[error(transparent)]
    Evidence(#[from] EvidenceError),

    /// The attacker policy failed in strict mode.
    #[error(transparent)]
    Policy(#[from] PolicyError),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),
}
