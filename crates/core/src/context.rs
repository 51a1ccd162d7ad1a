//! Attacker context: what the attacker currently holds.

use serde::{Deserialize, Serialize};

/// Mutable attacker-side state.
///
/// Mutated only by applying a matched graph action's effects, or by the
/// fixed per-action update table in legacy mode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttackerContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_exfil_domain: Option<String>,

    #[serde(default)]
    pub compromised_hosts: Vec<String>,
    #[serde(default)]
    pub compromised_users: Vec<String>,

    #[serde(default)]
    pub has_creds: bool,
    #[serde(default)]
    pub has_admin: bool,
    #[serde(default)]
    pub has_stage: bool,
    #[serde(default)]
    pub has_persistence: bool,
}

impl AttackerContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The attacker has at least one compromised host.
    #[must_use]
    pub fn has_foothold(&self) -> bool {
        !self.compromised_hosts.is_empty()
    }

    #[must_use]
    pub fn is_host_compromised(&self, host_id: &str) -> bool {
        self.compromised_hosts.iter().any(|h| h == host_id)
    }

    /// Record a compromised host and make it current.
    pub fn record_host(&mut self, host_id: &str) {
        if host_id.is_empty() {
            return;
        }
        if !self.compromised_hosts.iter().any(|h| h == host_id) {
            self.compromised_hosts.push(host_id.to_owned());
        }
        self.current_host = Some(host_id.to_owned());
    }

    /// Record a compromised user and make it current.
    pub fn record_user(&mut self, user_id: &str) {
        if user_id.is_empty() {
            return;
        }
        if !self.compromised_users.iter().any(|u| u == user_id) {
            self.compromised_users.push(user_id.to_owned());
        }
        self.current_user = Some(user_id.to_owned());
    }
}
