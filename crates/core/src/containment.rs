//! Defender containment state.

use serde::{Deserialize, Serialize};

/// The three containment sets an episode accumulates.
///
/// Sets are monotonic: entries are appended once and never removed.
/// Insertion order is preserved so traces stay readable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainmentState {
    #[serde(default)]
    pub isolated_hosts: Vec<String>,
    #[serde(default)]
    pub blocked_domains: Vec<String>,
    #[serde(default)]
    pub reset_users: Vec<String>,
}

impl ContainmentState {
    /// Create an empty containment state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Isolate a host. Returns `true` if the host was newly added.
    pub fn isolate_host(&mut self, host_id: impl Into<String>) -> bool {
        push_unique(&mut self.isolated_hosts, host_id.into())
    }

    /// Block a domain. Returns `true` if the domain was newly added.
    pub fn block_domain(&mut self, domain: impl Into<String>) -> bool {
        push_unique(&mut self.blocked_domains, domain.into())
    }

    /// Reset a user. Returns `true` if the user was newly added.
    pub fn reset_user(&mut self, user_id: impl Into<String>) -> bool {
        push_unique(&mut self.reset_users, user_id.into())
    }

    #[must_use]
    pub fn is_host_isolated(&self, host_id: &str) -> bool {
        self.isolated_hosts.iter().any(|h| h == host_id)
    }

    #[must_use]
    pub fn is_domain_blocked(&self, domain: &str) -> bool {
        self.blocked_domains.iter().any(|d| d == domain)
    }

    #[must_use]
    pub fn is_user_reset(&self, user_id: &str) -> bool {
        self.reset_users.iter().any(|u| u == user_id)
    }

    /// Total number of containment entries across all three sets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.isolated_hosts.len() + self.blocked_domains.len() + self.reset_users.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn push_unique(set: &mut Vec<String>, value: String) -> bool {
    if value.is_empty() || set.contains(&value) {
        return false;
    }
    set.push(value);
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn containment_appends_once() {
        let mut c = ContainmentState::new();
        assert!(c.isolate_host("h-001"));
        assert!(!c.isolate_host("h-001"));
        assert_eq!(c.isolated_hosts, vec!["h-001"]);
        assert!(c.is_host_isolated("h-001"));
        assert!(!c.is_host_isolated("h-002"));
    }

    #[test]
    fn containment_is_monotonic() {
        let mut c = ContainmentState::new();
        c.block_domain("evil-mail.com");
        c.reset_user("u-001");
        c.isolate_host("h-001");
        let before = c.len();
        c.block_domain("evil-mail.com");
        c.reset_user("u-001");
        assert_eq!(c.len(), before);
    }

    #[test]
    fn empty_targets_are_ignored() {
        let mut c = ContainmentState::new();
        assert!(!c.isolate_host(""));
        assert!(c.is_empty());
    }

    #[test]
    fn serde_roundtrip() {
        let mut c = ContainmentState::new();
        c.isolate_host("h-001");
        let json = serde_json::to_string(&c).unwrap();
        let back: ContainmentState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, c);
    }
}
