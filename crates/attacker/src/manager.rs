//! Policy manager: replay-aware, validated decision making.

use std::sync::Arc;

use tracing::{debug, warn};

use breachsim_core::{AttackerAction, DefenderAction, Scenario};

use crate::error::PolicyError;
use crate::policy::{AttackerPolicy, PolicySnapshot};
use crate::replay::{ReplayCache, ReplayMode, hash_attacker_context, hash_defender_action};
use crate::validate::is_valid_action;

/// Wraps a policy with the replay cache and the action validator.
#[derive(Debug)]
pub struct PolicyManager {
    cache: Option<Arc<ReplayCache>>,
    mode: ReplayMode,
    strict: bool,
    model: String,
    temperature: Option<f64>,
}

impl PolicyManager {
    /// Create a manager. `model` and `temperature` are recorded as
    /// provenance on cached decisions.
    #[must_use]
    pub fn new(
        cache: Option<Arc<ReplayCache>>,
        mode: ReplayMode,
        strict: bool,
        model: impl Into<String>,
        temperature: Option<f64>,
    ) -> Self {
        Self {
            cache,
            mode,
            strict,
            model: model.into(),
            temperature,
        }
    }

    /// A manager with no cache and permissive validation.
    #[must_use]
    pub fn passthrough() -> Self {
        Self::new(None, ReplayMode::Off, false, "mock", None)
    }

    /// Decide the attacker's move for this step.
    ///
    /// In `replay` mode a cache hit short-circuits the policy call; a miss
    /// falls through to the live policy and records the result.
    pub async fn decide(
        &self,
        policy: &dyn AttackerPolicy,
        scenario: &Scenario,
        step: u32,
        attacker_state: &str,
        defender_action: &DefenderAction,
        snapshot: &PolicySnapshot,
    ) -> Result<AttackerAction, PolicyError> {
        let action_hash = hash_defender_action(&defender_action.to_value());
        let context_hash = hash_attacker_context(Some(&snapshot.to_value()));

        if self.mode == ReplayMode::Replay {
            if let Some(cache) = &self.cache {
                if let Some(cached) = cache.get(
                    &scenario.scenario_id,
                    step,
                    attacker_state,
                    &action_hash,
                    &context_hash,
                )? {
                    debug!(step, attacker_state, "replayed cached attacker decision");
                    return serde_json::from_value(cached)
                        .map_err(|e| PolicyError::Parse(format!("corrupt cached decision: {e}")));
                }
            }
        }

        let decision = match policy
            .choose(scenario, attacker_state, defender_action, snapshot)
            .await
        {
            Ok(decision) => decision,
            Err(e) if self.strict => return Err(e),
            Err(e) => {
                warn!(error = %e, "attacker policy failed, substituting no_op");
                AttackerAction::no_op().with_rationale("invalid_json")
            }
        };

        let decision = if is_valid_action(&decision, scenario, attacker_state) {
            decision
        } else if self.strict {
            return Err(PolicyError::InvalidAction(decision.action_type));
        } else {
            AttackerAction::no_op()
        };

        if matches!(self.mode, ReplayMode::Record | ReplayMode::Replay) {
            if let Some(cache) = &self.cache {
                cache.put(
                    &scenario.scenario_id,
                    step,
                    attacker_state,
                    &action_hash,
                    &context_hash,
                    &decision.to_value(),
                    &self.model,
                    self.temperature,
                )?;
            }
        }

        Ok(decision)
    }
}
