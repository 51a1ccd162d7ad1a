//! Environment-driven episode configuration.

use std::path::PathBuf;

use breachsim_attacker::{AttackerConfig, ReplayMode};

use crate::error::EpisodeError;

/// Configuration for constructing episodes.
#[derive(Debug, Clone)]
pub struct EpisodeConfig {
    /// Path to the scenario seed (ground truth resolves to the sibling
    /// `*_ground_truth.json`).
    pub seed_path: PathBuf,
    /// Directory for per-episode evidence stores; in-memory when unset.
    pub evidence_dir: Option<PathBuf>,
    /// Step cap, overridden by `scenario.metadata.max_steps`.
    pub max_steps: u32,
    /// Strip prompt-injection payloads on reset (ablations).
    pub mask_injections: bool,
    /// Replay cache participation.
    pub replay_mode: ReplayMode,
    /// Replay cache location; required for `record`/`replay` modes.
    pub replay_cache_path: Option<PathBuf>,
    /// Attacker policy backend.
    pub attacker: AttackerConfig,
}

impl Default for EpisodeConfig {
    fn default() -> Self {
        Self {
            seed_path: PathBuf::from("seeds/sample_seed.json"),
            evidence_dir: None,
            max_steps: 15,
            mask_injections: false,
            replay_mode: ReplayMode::Off,
            replay_cache_path: None,
            attacker: AttackerConfig::default(),
        }
    }
}

impl EpisodeConfig {
    /// Load configuration from the environment.
    ///
    /// Recognized variables: `SEED_PATH`, `EVIDENCE_STORE_DIR`,
    /// `MAX_STEPS`, `MASK_INJECTIONS`, `REPLAY_MODE`, `REPLAY_CACHE_PATH`,
    /// `ATTACKER_BACKEND`, `ATTACKER_MODEL`, `ATTACKER_TEMPERATURE`,
    /// `ATTACKER_ENDPOINT`, `ATTACKER_API_KEY`, `ATTACKER_STRICT`.
    pub fn from_env() -> Result<Self, EpisodeError> {
        let mut config = Self::default();

        if let Some(path) = env_var("SEED_PATH") {
            config.seed_path = PathBuf::from(path);
        }
        if let Some(dir) = env_var("EVIDENCE_STORE_DIR") {
            config.evidence_dir = Some(PathBuf::from(dir));
        }
        if let Some(max_steps) = env_var("MAX_STEPS") {
            config.max_steps = max_steps
                .parse()
                .map_err(|_| EpisodeError::Config(format!("invalid MAX_STEPS: {max_steps}")))?;
        }
        config.mask_injections = env_flag("MASK_INJECTIONS");

        config.replay_cache_path = env_var("REPLAY_CACHE_PATH").map(PathBuf::from);
        config.replay_mode = match env_var("REPLAY_MODE") {
            Some(mode) => mode
                .parse()
                .map_err(|_| EpisodeError::Config(format!("invalid REPLAY_MODE: {mode}")))?,
            // A cache path without an explicit mode means record.
            None if config.replay_cache_path.is_some() => ReplayMode::Record,
            None => ReplayMode::Off,
        };

        let mut attacker = AttackerConfig::default();
        if let Some(backend) = env_var("ATTACKER_BACKEND") {
            attacker.backend = backend
                .parse()
                .map_err(|_| EpisodeError::Config(format!("invalid ATTACKER_BACKEND: {backend}")))?;
        }
        if let Some(model) = env_var("ATTACKER_MODEL") {
            attacker.model = Some(model);
        }
        if let Some(temp) = env_var("ATTACKER_TEMPERATURE") {
            attacker.temperature = if temp == "null" {
                None
            } else {
                Some(temp.parse().map_err(|_| {
                    EpisodeError::Config(format!("invalid ATTACKER_TEMPERATURE: {temp}"))
                })?)
            };
        }
        if let Some(endpoint) = env_var("ATTACKER_ENDPOINT") {
            attacker.endpoint = Some(endpoint);
        }
        if let Some(api_key) = env_var("ATTACKER_API_KEY") {
            attacker.api_key = Some(api_key);
        }
        attacker.strict = env_flag("ATTACKER_STRICT");
        config.attacker = attacker;

        Ok(config)
    }

    /// Use the given seed path.
    #[must_use]
    pub fn with_seed_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.seed_path = path.into();
        self
    }

    /// Keep evidence stores on disk under the given directory.
    #[must_use]
    pub fn with_evidence_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.evidence_dir = Some(dir.into());
        self
    }

    /// Override the step cap.
    #[must_use]
    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Configure the replay cache.
    #[must_use]
    pub fn with_replay(mut self, mode: ReplayMode, path: impl Into<PathBuf>) -> Self {
        self.replay_mode = mode;
        self.replay_cache_path = Some(path.into());
        self
    }

    /// Configure the attacker backend.
    #[must_use]
    pub fn with_attacker(mut self, attacker: AttackerConfig) -> Self {
        self.attacker = attacker;
        self
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_flag(name: &str) -> bool {
    env_var(name).is_some_and(|v| {
        matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes")
    })
}
