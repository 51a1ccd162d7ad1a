//! Per-state action enumeration and parameter schemas.
//!
//! LLM backends receive both the allowed action list for the current state
//! and a schema of valid parameter values derived from the scenario's
//! entities, so the model can only reference things that exist.

use serde_json::{Map, Value, json};

use breachsim_core::Scenario;

/// Every action type the attacker vocabulary admits.
pub const ALLOWED_ACTIONS: [&str; 15] = [
    "recon",
    "send_phish",
    "reuse_credentials",
    "lateral_move",
    "lateral_move_alt",
    "lateral_spread",
    "pivot",
    "access_data",
    "stage_data",
    "establish_persistence",
    "rephish",
    "retreat",
    "wait",
    "exfiltrate",
    "exfiltrate_alt",
];

/// System prompt for LLM-backed attacker policies.
pub const ATTACKER_SYSTEM_PROMPT: &str = "You are the attacker policy in a simulated environment. \
You must choose exactly one action from the allowed list. \
Some actions have an _alt suffix to select an alternate pre-seeded branch. \
You may receive attacker_context with containment and available assets; use it to avoid impossible moves. \
Do not execute code or call external tools. \
Use the action_schema to choose valid parameter values. \
Return ONLY valid JSON with keys: action_type, params. Do not include extra keys or long rationale.";

/// Hard-coded per-state allowance for graph-less scenarios.
fn legacy_state_allowed(state: &str) -> Option<&'static [&'static str]> {
    match state {
        "phish_sent" => Some(&["reuse_credentials"]),
        "creds_used" => Some(&["lateral_move", "lateral_move_alt"]),
        "lateral_move" => Some(&["access_data"]),
        "data_access" | "exfil_attempt" => Some(&["exfiltrate", "exfiltrate_alt"]),
        _ => None,
    }
}

/// Actions the attacker may take in a state: from the graph node when one
/// exists, otherwise the legacy table (or the full vocabulary for unknown
/// states).
#[must_use]
pub fn allowed_actions_for_state(scenario: &Scenario, attacker_state: &str) -> Vec<String> {
    if let Some(graph) = &scenario.attack_graph {
        if let Some(node) = graph.states.get(attacker_state) {
            if !node.actions.is_empty() {
                let mut actions: Vec<String> = node
                    .actions
                    .iter()
                    .map(|a| a.action_type.clone())
                    .collect();
                actions.sort();
                actions.dedup();
                return actions;
            }
        }
    }
    let mut actions: Vec<String> = legacy_state_allowed(attacker_state)
        .map_or_else(
            || ALLOWED_ACTIONS.iter().map(|s| (*s).to_owned()).collect(),
            |allowed| allowed.iter().map(|s| (*s).to_owned()).collect(),
        );
    actions.sort();
    actions
}

/// Valid parameter values per allowed action, derived from the scenario's
/// entity sets.
#[must_use]
pub fn action_schema_for_state(scenario: &Scenario, attacker_state: &str) -> Value {
    let users = sorted(scenario.user_ids());
    let hosts = sorted(scenario.host_ids());
    let targets = sorted(scenario.target_ids());
    let domains = sorted(scenario.domain_names());

    let mut schema = Map::new();
    for action in allowed_actions_for_state(scenario, attacker_state) {
        let params = match action.as_str() {
            "send_phish" | "rephish" => json!({"target_user": users}),
            "reuse_credentials" => json!({"user": users, "host": hosts}),
            "lateral_move" | "lateral_move_alt" | "lateral_spread" | "pivot" => {
                json!({"src": hosts, "dst": hosts})
            }
            "access_data" => json!({"target": targets}),
            "stage_data" => json!({"target": targets, "host": hosts}),
            "establish_persistence" => json!({"host": hosts}),
            "exfiltrate" | "exfiltrate_alt" => json!({"destination_domain": domains}),
            _ => json!({}),
        };
        schema.insert(action, json!({ "params": params }));
    }
    Value::Object(schema)
}

fn sorted(mut values: Vec<&str>) -> Vec<String> {
    values.sort_unstable();
    values.dedup();
    values.into_iter().map(str::to_owned).collect()
}

/// The structured user message LLM backends receive.
#[must_use]
pub fn prompt_payload(
    scenario: &Scenario,
    attacker_state: &str,
    defender_action: &Value,
    attacker_context: &Value,
) -> Value {
    json!({
        "attacker_state": attacker_state,
        "allowed_actions": allowed_actions_for_state(scenario, attacker_state),
        "action_schema": action_schema_for_state(scenario, attacker_state),
        "entities": scenario.entities,
        "recent_defender_action": defender_action,
        "attacker_context": attacker_context,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scenario(graph: bool) -> Scenario {
        let mut seed = json!({
            "scenario_id": "seed-001",
            "entities": {
                "hosts": [{"host_id": "h-002"}, {"host_id": "h-001"}],
                "users": [{"user_id": "u-001"}],
                "domains": [{"domain": "evil-mail.com", "domain_type": "attacker"}],
                "data_targets": [{"target_id": "t-001"}]
            },
            "patient_zero_host": "h-001",
            "compromised_user": "u-001",
            "attacker_domain": "evil-mail.com",
            "data_target": "t-001",
            "seed_artifacts": {"emails": [], "log_templates": []}
        });
        if graph {
            seed["attack_graph"] = json!({
                "start_state": "recon",
                "states": {
                    "recon": {"actions": [
                        {"action_type": "send_phish", "next_state": "access"},
                        {"action_type": "wait"}
                    ]}
                }
            });
        }
        serde_json::from_value(seed).unwrap()
    }

    #[test]
    fn graph_states_enumerate_graph_actions() {
        let s = scenario(true);
        assert_eq!(allowed_actions_for_state(&s, "recon"), vec!["send_phish", "wait"]);
    }

    #[test]
    fn legacy_states_use_fixed_table() {
        let s = scenario(false);
        assert_eq!(allowed_actions_for_state(&s, "phish_sent"), vec!["reuse_credentials"]);
        assert_eq!(
            allowed_actions_for_state(&s, "creds_used"),
            vec!["lateral_move", "lateral_move_alt"]
        );
        // Unknown states fall back to the full vocabulary.
        assert_eq!(
            allowed_actions_for_state(&s, "mystery").len(),
            ALLOWED_ACTIONS.len()
        );
    }

    #[test]
    fn schema_lists_entity_values() {
        let s = scenario(false);
        let schema = action_schema_for_state(&s, "creds_used");
        assert_eq!(
            schema["lateral_move"]["params"]["src"],
            json!(["h-001", "h-002"])
        );
        let exfil = action_schema_for_state(&s, "data_access");
        assert_eq!(
            exfil["exfiltrate"]["params"]["destination_domain"],
            json!(["evil-mail.com"])
        );
    }
}
