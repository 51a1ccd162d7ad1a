//! Local-inference attacker policy.
//!
//! Targets an OpenAI-compatible inference server on the local network
//! (the fast path for RL training loops). Requests force a JSON response
//! format and a small token budget; in permissive mode a parse or
//! transport failure degrades to the deterministic per-state action.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{debug, warn};

use breachsim_core::{AttackerAction, DefenderAction, Scenario};

use crate::config::AttackerConfig;
use crate::error::PolicyError;
use crate::extract::parse_attacker_action;
use crate::mock::MockAttackerPolicy;
use crate::policy::{AttackerPolicy, PolicySnapshot};
use crate::remote::completion_content;
use crate::schema::{ATTACKER_SYSTEM_PROMPT, prompt_payload};

const LOCAL_MAX_TOKENS: u32 = 96;

/// Attacker policy backed by a local inference endpoint.
#[derive(Debug)]
pub struct LocalInferencePolicy {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    temperature: Option<f64>,
    timeout_seconds: u64,
    strict: bool,
}

impl LocalInferencePolicy {
    /// Create a policy from the backend configuration.
    pub fn new(config: &AttackerConfig) -> Result<Self, PolicyError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| PolicyError::Configuration(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: config.resolved_endpoint(),
            model: config.resolved_model(),
            temperature: config.resolved_temperature(),
            timeout_seconds: config.timeout_seconds,
            strict: config.strict,
        })
    }

    async fn generate(&self, user_payload: &Value) -> Result<AttackerAction, PolicyError> {
        let mut body = json!({
            "model": self.model,
            "max_tokens": LOCAL_MAX_TOKENS,
            "response_format": {"type": "json_object"},
            "messages": [
                {"role": "system", "content": ATTACKER_SYSTEM_PROMPT},
                {"role": "user", "content": user_payload.to_string()},
            ]
        });
        if let Some(temperature) = self.temperature {
            body["temperature"] = json!(temperature);
        }

        let response = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    PolicyError::Timeout(self.timeout_seconds)
                } else {
                    PolicyError::Http(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PolicyError::Api(format!("HTTP {status}: {body}")));
        }

        let response_json: Value = response
            .json()
            .await
            .map_err(|e| PolicyError::Parse(format!("failed to parse API response: {e}")))?;
        parse_attacker_action(completion_content(&response_json)?)
    }
}

#[async_trait]
impl AttackerPolicy for LocalInferencePolicy {
    async fn choose(
        &self,
        scenario: &Scenario,
        attacker_state: &str,
        defender_action: &DefenderAction,
        snapshot: &PolicySnapshot,
    ) -> Result<AttackerAction, PolicyError> {
        let payload = prompt_payload(
            scenario,
            attacker_state,
            &defender_action.to_value(),
            &snapshot.to_value(),
        );
        debug!(endpoint = %self.endpoint, model = %self.model, attacker_state, "requesting attacker action");

        match self.generate(&payload).await {
            Ok(action) => Ok(action),
            Err(e) if self.strict => Err(e),
            Err(e) => {
                warn!(error = %e, "local inference failed, using deterministic fallback");
                let action = MockAttackerPolicy::action_for_state(scenario, attacker_state, snapshot)
                    .with_rationale("fallback");
                Ok(action)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use breachsim_core::{AttackerContext, ContainmentState};

    fn scenario() -> Scenario {
        serde_json::from_value(json!({
            "scenario_id": "seed-001",
            "entities": {
                "hosts": [{"host_id": "h-001"}, {"host_id": "h-002"}],
                "users": [{"user_id": "u-001"}],
                "domains": [{"domain": "evil-mail.com", "domain_type": "attacker"}],
                "data_targets": [{"target_id": "t-001"}]
            },
            "patient_zero_host": "h-001",
            "compromised_user": "u-001",
            "attacker_domain": "evil-mail.com",
            "data_target": "t-001",
            "seed_artifacts": {"emails": [], "log_templates": []}
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn permissive_mode_falls_back_when_unreachable() {
        // Point at a port nothing listens on; the request fails fast and
        // the deterministic fallback takes over.
        let config = AttackerConfig::default()
            .with_backend(crate::config::AttackerBackend::Local)
            .with_endpoint("http://127.0.0.1:1/v1/chat/completions");
        let policy = LocalInferencePolicy::new(&config).unwrap();
        let s = scenario();
        let snap = PolicySnapshot::capture(&s, 0, &ContainmentState::new(), &AttackerContext::new());
        let action = policy
            .choose(&s, "phish_sent", &DefenderAction::new("query_logs"), &snap)
            .await
            .unwrap();
        assert_eq!(action.action_type, "reuse_credentials");
        assert_eq!(action.rationale.as_deref(), Some("fallback"));
    }

    #[tokio::test]
    async fn strict_mode_propagates_failure() {
        let config = AttackerConfig::default()
            .with_backend(crate::config::AttackerBackend::Local)
            .with_endpoint("http://127.0.0.1:1/v1/chat/completions")
            .with_strict(true);
        let policy = LocalInferencePolicy::new(&config).unwrap();
        let s = scenario();
        let snap = PolicySnapshot::capture(&s, 0, &ContainmentState::new(), &AttackerContext::new());
        let result = policy
            .choose(&s, "phish_sent", &DefenderAction::new("query_logs"), &snap)
            .await;
        assert!(result.is_err());
    }
}
