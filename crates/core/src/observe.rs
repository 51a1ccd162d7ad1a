//! Observation and episode-state payloads returned to the defender.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::containment::ContainmentState;

/// Result of applying one defender action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResult {
    pub ok: bool,
    pub message: String,
    #[serde(default)]
    pub data: Value,
}

impl ActionResult {
    /// A successful result carrying data.
    #[must_use]
    pub fn ok(message: impl Into<String>, data: Value) -> Self {
        Self {
            ok: true,
            message: message.into(),
            data,
        }
    }

    /// A failed result. The step is still consumed.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
            data: Value::Object(serde_json::Map::new()),
        }
    }
}

/// What the defender observes after reset or a step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    pub scenario_id: String,
    pub step_index: u32,
    pub attacker_state: String,
    pub containment: ContainmentState,

    /// Email ids that surfaced this step.
    #[serde(default)]
    pub new_emails: Vec<String>,
    /// Alert ids that surfaced this step.
    #[serde(default)]
    pub new_alerts: Vec<String>,

    /// Every evidence id the defender has been told exists.
    #[serde(default)]
    pub evidence_seen_ids: Vec<String>,
    /// Evidence ids whose contents the defender has read.
    #[serde(default)]
    pub evidence_content_ids: Vec<String>,

    pub last_action_result: ActionResult,

    pub done: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reward: Option<f64>,

    /// Auxiliary payload: `{ "info": ..., "state": ... }`.
    #[serde(default)]
    pub metadata: Value,
}

/// Episode bookkeeping exposed through `GET /state`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodeStatus {
    pub episode_id: String,
    pub scenario_id: String,
    pub step_count: u32,
    pub max_steps: u32,
    pub terminated: bool,
    pub truncated: bool,
}

/// The full result of a reset or step call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepOutcome {
    pub observation: Observation,
    pub reward: f64,
    pub done: bool,
    #[serde(default)]
    pub info: Value,
    pub state: EpisodeStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_result_constructors() {
        let ok = ActionResult::ok("reset", serde_json::json!({"rows": []}));
        assert!(ok.ok);
        let err = ActionResult::error("only SELECT queries are allowed");
        assert!(!err.ok);
        assert!(err.data.as_object().is_some_and(serde_json::Map::is_empty));
    }

    #[test]
    fn observation_serde_roundtrip() {
        let obs = Observation {
            scenario_id: "seed-001".into(),
            step_index: 3,
            attacker_state: "creds_used".into(),
            containment: ContainmentState::new(),
            new_emails: vec!["email-001".into()],
            new_alerts: vec![],
            evidence_seen_ids: vec!["email-001".into()],
            evidence_content_ids: vec![],
            last_action_result: ActionResult::ok("query_logs", Value::Null),
            done: false,
            reward: None,
            metadata: serde_json::json!({"info": {}}),
        };
        let json = serde_json::to_string(&obs).unwrap();
        let back: Observation = serde_json::from_str(&json).unwrap();
        assert_eq!(back.step_index, 3);
        assert_eq!(back.new_emails, vec!["email-001"]);
        assert!(back.reward.is_none());
    }
}
