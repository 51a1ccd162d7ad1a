//! Deterministic attacker policy.
//!
//! Always valid, never blocks on the network; used for tests and whenever
//! no live backend is configured. Prefers assets the defender has not yet
//! contained, falling back to the scenario's entity order.

use async_trait::async_trait;

use breachsim_core::{AttackerAction, DefenderAction, Scenario};

use crate::error::PolicyError;
use crate::policy::{AttackerPolicy, PolicySnapshot};

/// The deterministic fallback policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct MockAttackerPolicy;

impl MockAttackerPolicy {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// The fixed per-state move, given the assets still available.
    #[must_use]
    pub fn action_for_state(
        scenario: &Scenario,
        attacker_state: &str,
        snapshot: &PolicySnapshot,
    ) -> AttackerAction {
        let user = snapshot
            .available_users
            .first()
            .map(String::as_str)
            .or_else(|| scenario.user_ids().first().copied())
            .unwrap_or("u-001")
            .to_owned();
        let host = snapshot
            .available_hosts
            .first()
            .map(String::as_str)
            .or_else(|| scenario.host_ids().first().copied())
            .unwrap_or("h-001")
            .to_owned();
        let dst_host = snapshot
            .available_hosts
            .get(1)
            .map(String::as_str)
            .or_else(|| scenario.host_ids().get(1).copied())
            .unwrap_or(host.as_str())
            .to_owned();
        let target = scenario.target_ids().first().copied().unwrap_or("t-001").to_owned();
        let domain = snapshot
            .available_attacker_domains
            .first()
            .map(String::as_str)
            .or_else(|| scenario.attacker_domains().first().copied())
            .unwrap_or("attacker.example")
            .to_owned();

        match attacker_state {
            "phish_sent" | "access" => AttackerAction::new("reuse_credentials")
                .with_param("user", user)
                .with_param("host", host),
            "recon" => AttackerAction::new("send_phish").with_param("target_user", user),
            "persistence" => AttackerAction::new("establish_persistence").with_param("host", host),
            "lateral_spread" | "creds_used" => AttackerAction::new("lateral_move")
                .with_param("src", host)
                .with_param("dst", dst_host),
            "staging" => AttackerAction::new("stage_data")
                .with_param("target", target)
                .with_param("host", host),
            "exfil" | "data_access" => AttackerAction::new("exfiltrate")
                .with_param("channel", "https")
                .with_param("destination_domain", domain),
            "lateral_move" => AttackerAction::new("access_data").with_param("target", target),
            _ => AttackerAction::no_op(),
        }
    }
}

#[async_trait]
impl AttackerPolicy for MockAttackerPolicy {
    async fn choose(
        &self,
        scenario: &Scenario,
        attacker_state: &str,
        _defender_action: &DefenderAction,
        snapshot: &PolicySnapshot,
    ) -> Result<AttackerAction, PolicyError> {
        Ok(Self::action_for_state(scenario, attacker_state, snapshot))
    }
}
