//! Attacker backend configuration.

use std::str::FromStr;
use std::sync::Arc;

use crate::error::PolicyError;
use crate::local::LocalInferencePolicy;
use crate::mock::MockAttackerPolicy;
use crate::policy::AttackerPolicy;
use crate::remote::RemoteAttackerPolicy;

/// Which policy variant an episode runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AttackerBackend {
    /// Deterministic fallback policy.
    #[default]
    Mock,
    /// OpenAI-style chat-completions API.
    Remote,
    /// Local inference endpoint (OpenAI-compatible, JSON response format).
    Local,
}

impl FromStr for AttackerBackend {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mock" => Ok(Self::Mock),
            "remote" => Ok(Self::Remote),
            "local" => Ok(Self::Local),
            other => Err(PolicyError::Configuration(format!(
                "unknown attacker backend: {other}"
            ))),
        }
    }
}

/// Configuration for the attacker policy stack.
#[derive(Debug, Clone)]
pub struct AttackerConfig {
    pub backend: AttackerBackend,
    /// Model name; backend-specific default when unset.
    pub model: Option<String>,
    /// Sampling temperature; omitted from requests when unset.
    pub temperature: Option<f64>,
    /// Chat-completions endpoint; backend-specific default when unset.
    pub endpoint: Option<String>,
    /// Bearer key for the remote backend.
    pub api_key: Option<String>,
    /// Request timeout in seconds.
    pub timeout_seconds: u64,
    /// Maximum tokens in the response.
    pub max_tokens: u32,
    /// Abort the episode on unparseable or invalid attacker output.
    pub strict: bool,
}

impl Default for AttackerConfig {
    fn default() -> Self {
        Self {
            backend: AttackerBackend::Mock,
            model: None,
            temperature: None,
            endpoint: None,
            api_key: None,
            timeout_seconds: 30,
            max_tokens: 256,
            strict: false,
        }
    }
}

impl AttackerConfig {
    /// Mock-backend config (the test and offline default).
    #[must_use]
    pub fn mock() -> Self {
        Self::default()
    }

    /// Set the backend.
    #[must_use]
    pub fn with_backend(mut self, backend: AttackerBackend) -> Self {
        self.backend = backend;
        self
    }

    /// Set the model name.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the sampling temperature.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the endpoint URL.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Set the API key.
    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Enable strict mode.
    #[must_use]
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// The model name requests will carry.
    #[must_use]
    pub fn resolved_model(&self) -> String {
        if let Some(model) = &self.model {
            return model.clone();
        }
        match self.backend {
            AttackerBackend::Mock => "mock".to_owned(),
            AttackerBackend::Remote => "gpt-4o-mini".to_owned(),
            AttackerBackend::Local => "Qwen/Qwen3-1.7B".to_owned(),
        }
    }

    /// The endpoint requests will target.
    #[must_use]
    pub fn resolved_endpoint(&self) -> String {
        if let Some(endpoint) = &self.endpoint {
            return endpoint.clone();
        }
        match self.backend {
            AttackerBackend::Mock => String::new(),
            AttackerBackend::Remote => "https://api.openai.com/v1/chat/completions".to_owned(),
            AttackerBackend::Local => "http://localhost:30000/v1/chat/completions".to_owned(),
        }
    }

    /// The effective temperature for this backend.
    #[must_use]
    pub fn resolved_temperature(&self) -> Option<f64> {
        match self.backend {
            AttackerBackend::Local => Some(self.temperature.unwrap_or(0.3)),
            _ => self.temperature,
        }
    }

    /// Instantiate the configured policy variant.
    pub fn build_policy(&self) -> Result<Arc<dyn AttackerPolicy>, PolicyError> {
        match self.backend {
            AttackerBackend::Mock => Ok(Arc::new(MockAttackerPolicy::new())),
            AttackerBackend::Remote => Ok(Arc::new(RemoteAttackerPolicy::new(self)?)),
            AttackerBackend::Local => Ok(Arc::new(LocalInferencePolicy::new(self)?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_parses_from_str() {
        assert_eq!("mock".parse::<AttackerBackend>().unwrap(), AttackerBackend::Mock);
        assert_eq!("Remote".parse::<AttackerBackend>().unwrap(), AttackerBackend::Remote);
        assert_eq!("local".parse::<AttackerBackend>().unwrap(), AttackerBackend::Local);
        assert!("cloud".parse::<AttackerBackend>().is_err());
    }

    #[test]
    fn resolved_defaults_per_backend() {
        let mock = AttackerConfig::mock();
        assert_eq!(mock.resolved_model(), "mock");

        let remote = AttackerConfig::default().with_backend(AttackerBackend::Remote);
        assert_eq!(remote.resolved_model(), "gpt-4o-mini");
        assert!(remote.resolved_endpoint().contains("api.openai.com"));
        assert_eq!(remote.resolved_temperature(), None);

        let local = AttackerConfig::default().with_backend(AttackerBackend::Local);
        assert_eq!(local.resolved_temperature(), Some(0.3));
    }

    #[test]
    fn builder_overrides() {
        let config = AttackerConfig::default()
            .with_backend(AttackerBackend::Remote)
            .with_model("gpt-5")
            .with_temperature(0.4)
            .with_strict(true);
        assert_eq!(config.resolved_model(), "gpt-5");
        assert_eq!(config.resolved_temperature(), Some(0.4));
        assert!(config.strict);
    }
}
