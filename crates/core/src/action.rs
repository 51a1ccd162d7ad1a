//! Defender and attacker action payloads.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Action type returned when the attacker makes no move.
pub const NO_OP_ACTION_TYPE: &str = "no_op";

/// The defender's seven action kinds, carried as an open
/// `action_type` + params payload so the wire format stays forward
/// compatible.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DefenderAction {
    pub action_type: String,
    #[serde(default)]
    pub params: BTreeMap<String, Value>,
}

impl DefenderAction {
    /// Create an action with no params.
    #[must_use]
    pub fn new(action_type: impl Into<String>) -> Self {
        Self {
            action_type: action_type.into(),
            params: BTreeMap::new(),
        }
    }

    /// Add a string param.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), Value::String(value.into()));
        self
    }

    /// Add an arbitrary JSON param.
    #[must_use]
    pub fn with_json_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    /// Fetch a string param.
    #[must_use]
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(Value::as_str)
    }

    /// Whether this is one of the three containment kinds.
    #[must_use]
    pub fn is_containment(&self) -> bool {
        matches!(
            self.action_type.as_str(),
            "isolate_host" | "block_domain" | "reset_user"
        )
    }

    /// The action as a JSON value (for hashing and trace records).
    #[must_use]
    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "action_type": self.action_type,
            "params": self.params,
        })
    }
}

/// The target param name for each containment action kind.
#[must_use]
pub fn containment_target(action_type: &str) -> Option<&'static str> {
    match action_type {
        "isolate_host" => Some("host_id"),
        "block_domain" => Some("domain"),
        "reset_user" => Some("user_id"),
        _ => None,
    }
}

/// One attacker move, as chosen by a policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttackerAction {
    pub action_type: String,
    #[serde(default)]
    pub params: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence_ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_tags: Option<Vec<String>>,
}

impl AttackerAction {
    /// Create an action with no params.
    #[must_use]
    pub fn new(action_type: impl Into<String>) -> Self {
        Self {
            action_type: action_type.into(),
            params: BTreeMap::new(),
            rationale: None,
            evidence_ids: None,
            policy_tags: None,
        }
    }

    /// The stall-everything action.
    #[must_use]
    pub fn no_op() -> Self {
        Self::new(NO_OP_ACTION_TYPE)
    }

    /// Add a string param.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), Value::String(value.into()));
        self
    }

    /// Set a rationale.
    #[must_use]
    pub fn with_rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = Some(rationale.into());
        self
    }

    /// Fetch a string param.
    #[must_use]
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(Value::as_str)
    }

    #[must_use]
    pub fn is_no_op(&self) -> bool {
        self.action_type == NO_OP_ACTION_TYPE
    }

    /// The action as a JSON value (cache payloads, trace records).
    #[must_use]
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defender_action_builders() {
        let action = DefenderAction::new("isolate_host").with_param("host_id", "h-001");
        assert!(action.is_containment());
        assert_eq!(action.param_str("host_id"), Some("h-001"));
        assert_eq!(containment_target("isolate_host"), Some("host_id"));
        assert_eq!(containment_target("query_logs"), None);
    }

    #[test]
    fn attacker_action_no_op() {
        let action = AttackerAction::no_op();
        assert!(action.is_no_op());
        let json = action.to_value();
        assert_eq!(json["action_type"], "no_op");
        assert!(json.get("rationale").is_none());
    }

    #[test]
    fn attacker_action_serde_roundtrip() {
        let action = AttackerAction::new("reuse_credentials")
            .with_param("user", "u-001")
            .with_param("host", "h-001")
            .with_rationale("creds harvested");
        let json = serde_json::to_string(&action).unwrap();
        let back: AttackerAction = serde_json::from_str(&json).unwrap();
        assert_eq!(back, action);
    }
}
