//! Attacker action validation.
//!
//! Every action a policy returns is validated before it reaches the state
//! machine: the type must be allowed in the current state and params must
//! reference entities that exist in the scenario. Invalid actions become
//! `no_op` in permissive mode and abort the episode in strict mode.

use std::collections::BTreeSet;

use breachsim_core::{AttackerAction, Scenario};

use crate::schema::allowed_actions_for_state;

/// Whether an attacker action is admissible in the given state.
#[must_use]
pub fn is_valid_action(action: &AttackerAction, scenario: &Scenario, attacker_state: &str) -> bool {
    if action.is_no_op() || action.action_type.is_empty() {
        return false;
    }
    let allowed = allowed_actions_for_state(scenario, attacker_state);
    if !allowed.iter().any(|a| a == &action.action_type) {
        return false;
    }

    let users: BTreeSet<&str> = scenario.user_ids().into_iter().collect();
    let hosts: BTreeSet<&str> = scenario.host_ids().into_iter().collect();
    let targets: BTreeSet<&str> = scenario.target_ids().into_iter().collect();
    let domains: BTreeSet<&str> = scenario.domain_names().into_iter().collect();

    let param_in = |key: &str, set: &BTreeSet<&str>| {
        action.param_str(key).is_some_and(|v| set.contains(v))
    };

    match action.action_type.as_str() {
        "send_phish" | "rephish" => param_in("target_user", &users),
        "recon" | "wait" | "retreat" => true,
        "reuse_credentials" => param_in("user", &users) && param_in("host", &hosts),
        "lateral_move" | "lateral_move_alt" | "lateral_spread" | "pivot" => {
            param_in("src", &hosts) && param_in("dst", &hosts)
        }
        "access_data" => param_in("target", &targets),
        "stage_data" => {
            // Both params are optional but must resolve when present.
            action.param_str("target").is_none_or(|t| targets.contains(t))
                && action.param_str("host").is_none_or(|h| hosts.contains(h))
        }
        "establish_persistence" => action.param_str("host").is_none_or(|h| hosts.contains(h)),
        "exfiltrate" | "exfiltrate_alt" => param_in("destination_domain", &domains),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

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

    #[test]
    fn valid_actions_pass() {
        let s = scenario();
        let reuse = AttackerAction::new("reuse_credentials")
            .with_param("user", "u-001")
            .with_param("host", "h-001");
        assert!(is_valid_action(&reuse, &s, "phish_sent"));

        let exfil = AttackerAction::new("exfiltrate")
            .with_param("destination_domain", "evil-mail.com");
        assert!(is_valid_action(&exfil, &s, "data_access"));
    }

    #[test]
    fn unknown_entities_fail() {
        let s = scenario();
        let reuse = AttackerAction::new("reuse_credentials")
            .with_param("user", "u-999")
            .with_param("host", "h-001");
        assert!(!is_valid_action(&reuse, &s, "phish_sent"));

        let lateral = AttackerAction::new("lateral_move")
            .with_param("src", "h-001")
            .with_param("dst", "h-999");
        assert!(!is_valid_action(&lateral, &s, "creds_used"));
    }

    #[test]
    fn state_allowance_is_enforced() {
        let s = scenario();
        // exfiltrate is not allowed from phish_sent in the legacy table.
        let exfil = AttackerAction::new("exfiltrate")
            .with_param("destination_domain", "evil-mail.com");
        assert!(!is_valid_action(&exfil, &s, "phish_sent"));
    }

    #[test]
    fn no_op_never_validates() {
        let s = scenario();
        assert!(!is_valid_action(&AttackerAction::no_op(), &s, "phish_sent"));
    }
}
