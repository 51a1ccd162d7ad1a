//! The attacker policy capability.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use breachsim_core::{AttackerAction, AttackerContext, ContainmentState, DefenderAction, Scenario};

use crate::error::PolicyError;

/// What a policy sees of the episode: a snapshot, never live references.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicySnapshot {
    pub step: u32,
    pub containment: ContainmentState,

    /// Hosts not currently isolated.
    pub available_hosts: Vec<String>,
    /// Users not currently reset.
    pub available_users: Vec<String>,
    /// Attacker-controlled domains not currently blocked.
    pub available_attacker_domains: Vec<String>,

    pub compromised_hosts: Vec<String>,
    pub compromised_users: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_exfil_domain: Option<String>,
    pub has_creds: bool,
    pub has_admin: bool,
    pub has_stage: bool,
    pub has_persistence: bool,
}

impl PolicySnapshot {
    /// Capture the attacker-visible view of the episode.
    #[must_use]
    pub fn capture(
        scenario: &Scenario,
        step: u32,
        containment: &ContainmentState,
        ctx: &AttackerContext,
    ) -> Self {
        let mut available_hosts: Vec<String> = scenario
            .host_ids()
            .into_iter()
            .filter(|h| !containment.is_host_isolated(h))
            .map(str::to_owned)
            .collect();
        available_hosts.sort();

        let mut available_users: Vec<String> = scenario
            .user_ids()
            .into_iter()
            .filter(|u| !containment.is_user_reset(u))
            .map(str::to_owned)
            .collect();
        available_users.sort();

        let mut available_attacker_domains: Vec<String> = scenario
            .attacker_domains()
            .into_iter()
            .filter(|d| !containment.is_domain_blocked(d))
            .map(str::to_owned)
            .collect();
        available_attacker_domains.sort();

        let mut compromised_hosts = ctx.compromised_hosts.clone();
        compromised_hosts.sort();
        let mut compromised_users = ctx.compromised_users.clone();
        compromised_users.sort();

        Self {
            step,
            containment: containment.clone(),
            available_hosts,
            available_users,
            available_attacker_domains,
            compromised_hosts,
            compromised_users,
            current_host: ctx.current_host.clone(),
            current_user: ctx.current_user.clone(),
            current_target: ctx.current_target.clone(),
            current_exfil_domain: ctx.current_exfil_domain.clone(),
            has_creds: ctx.has_creds,
            has_admin: ctx.has_admin,
            has_stage: ctx.has_stage,
            has_persistence: ctx.has_persistence,
        }
    }

    /// Snapshot as JSON, for hashing and backend prompts.
    #[must_use]
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Chooses one attacker action per step.
#[async_trait]
pub trait AttackerPolicy: Send + Sync + std::fmt::Debug {
    /// Pick an action for the current state. Implementations may be
    /// stochastic; reproducibility comes from the replay cache above them.
    async fn choose(
        &self,
        scenario: &Scenario,
        attacker_state: &str,
        defender_action: &DefenderAction,
        snapshot: &PolicySnapshot,
    ) -> Result<AttackerAction, PolicyError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn snapshot_filters_contained_assets() {
        let scenario: Scenario = serde_json::from_value(json!({
            "scenario_id": "seed-001",
            "entities": {
                "hosts": [{"host_id": "h-001"}, {"host_id": "h-002"}],
                "users": [{"user_id": "u-001"}],
                "domains": [
                    {"domain": "evil-mail.com", "domain_type": "attacker"},
                    {"domain": "corp.example", "domain_type": "corporate"}
                ],
                "data_targets": [{"target_id": "t-001"}]
            },
            "patient_zero_host": "h-001",
            "compromised_user": "u-001",
            "attacker_domain": "evil-mail.com",
            "data_target": "t-001",
            "seed_artifacts": {"emails": [], "log_templates": []}
        }))
        .unwrap();

        let mut containment = ContainmentState::new();
        containment.isolate_host("h-001");
        containment.block_domain("evil-mail.com");
        let mut ctx = AttackerContext::new();
        ctx.record_host("h-001");

        let snap = PolicySnapshot::capture(&scenario, 3, &containment, &ctx);
        assert_eq!(snap.step, 3);
        assert_eq!(snap.available_hosts, vec!["h-002"]);
        assert_eq!(snap.available_users, vec!["u-001"]);
        assert!(snap.available_attacker_domains.is_empty());
        assert_eq!(snap.compromised_hosts, vec!["h-001"]);
        assert_eq!(snap.current_host.as_deref(), Some("h-001"));
    }
}
