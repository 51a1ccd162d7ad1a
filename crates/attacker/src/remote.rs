//! Remote LLM attacker policy over an OpenAI-compatible chat API.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{debug, warn};

use breachsim_core::{AttackerAction, DefenderAction, Scenario};

use crate::config::AttackerConfig;
use crate::error::PolicyError;
use crate::extract::parse_attacker_action;
use crate::policy::{AttackerPolicy, PolicySnapshot};
use crate::schema::{ATTACKER_SYSTEM_PROMPT, prompt_payload};

/// Attacker policy backed by an OpenAI-style chat-completions endpoint.
#[derive(Debug)]
pub struct RemoteAttackerPolicy {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    temperature: Option<f64>,
    max_tokens: u32,
    timeout_seconds: u64,
}

impl RemoteAttackerPolicy {
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
            api_key: config.api_key.clone(),
            temperature: config.resolved_temperature(),
            max_tokens: config.max_tokens,
            timeout_seconds: config.timeout_seconds,
        })
    }

    fn request_body(&self, user_payload: &Value) -> Value {
        let mut body = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "messages": [
                {"role": "system", "content": ATTACKER_SYSTEM_PROMPT},
                {"role": "user", "content": user_payload.to_string()},
            ]
        });
        if let Some(temperature) = self.temperature {
            body["temperature"] = json!(temperature);
        }
        body
    }
}

#[async_trait]
impl AttackerPolicy for RemoteAttackerPolicy {
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

        let mut request = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .json(&self.request_body(&payload));
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                PolicyError::Timeout(self.timeout_seconds)
            } else {
                PolicyError::Http(e.to_string())
            }
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, "attacker backend returned error");
            return Err(PolicyError::Api(format!("HTTP {status}: {body}")));
        }

        let response_json: Value = response
            .json()
            .await
            .map_err(|e| PolicyError::Parse(format!("failed to parse API response: {e}")))?;
        let content = completion_content(&response_json)?;
        parse_attacker_action(content)
    }
}

/// Pull the assistant message text out of a chat-completions response.
pub(crate) fn completion_content(response: &Value) -> Result<&str, PolicyError> {
    response
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(Value::as_str)
        .ok_or_else(|| PolicyError::Parse(format!("unexpected response format: {response}")))
}
