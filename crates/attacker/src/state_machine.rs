//! Guarded attacker state transitions.
//!
//! The machine runs in two modes. Without an attack graph it walks the
//! fixed linear kill chain, gated by scenario-level containment. With a
//! graph, the attacker action is looked up at the current node and its
//! `requires` / `match_params` guards are evaluated before the transition
//! fires.

use std::collections::BTreeMap;

use serde_json::Value;

use breachsim_core::{AttackGraph, AttackerAction, AttackerContext, ContainmentState, GraphAction};

/// The linear kill chain used when no attack graph is present.
pub const LEGACY_STATES: [&str; 5] = [
    "phish_sent",
    "creds_used",
    "lateral_move",
    "data_access",
    "exfil_attempt",
];

/// Scenario fields the legacy guards need.
#[derive(Debug, Clone, Copy)]
pub struct ScenarioRefs<'a> {
    pub attacker_domain: &'a str,
    pub patient_zero_host: &'a str,
    pub compromised_user: &'a str,
}

/// Why a transition stalled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StallReason {
    NoOp,
    UserReset,
    NoFoothold,
    SrcHostIsolated,
    SrcHostUncompromised,
    NoCurrentHost,
    CurrentHostIsolated,
    DestinationBlocked,
    ActionRequiresUnsatisfied,
    ActionParamsMismatch,
    ActionNotAllowed,
    ObjectiveStateBlocked,
    ObjectiveNextStateBlocked,
    AttackerDomainBlocked,
    PatientZeroIsolated,
    CompromisedUserReset,
}

impl StallReason {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NoOp => "no_op",
            Self::UserReset => "user_reset",
            Self::NoFoothold => "no_foothold",
            Self::SrcHostIsolated => "src_host_isolated",
            Self::SrcHostUncompromised => "src_host_uncompromised",
            Self::NoCurrentHost => "no_current_host",
            Self::CurrentHostIsolated => "current_host_isolated",
            Self::DestinationBlocked => "destination_blocked",
            Self::ActionRequiresUnsatisfied => "action_requires_unsatisfied",
            Self::ActionParamsMismatch => "action_params_mismatch",
            Self::ActionNotAllowed => "action_not_allowed",
            Self::ObjectiveStateBlocked => "objective_state_blocked",
            Self::ObjectiveNextStateBlocked => "objective_next_state_blocked",
            Self::AttackerDomainBlocked => "attacker_domain_blocked",
            Self::PatientZeroIsolated => "patient_zero_isolated",
            Self::CompromisedUserReset => "compromised_user_reset",
        }
    }
}

/// Outcome of one transition attempt.
#[derive(Debug, Clone)]
pub enum AdvanceResult {
    /// The machine moved (or confirmed a terminal state).
    Advanced {
        next_state: String,
        reason: &'static str,
        matched: Option<GraphAction>,
    },
    /// Containment or guards held; the state is unchanged.
    Stalled { reason: StallReason },
}

impl AdvanceResult {
    #[must_use]
    pub fn is_stalled(&self) -> bool {
        matches!(self, Self::Stalled { .. })
    }

    /// The state after this transition; `current` when stalled.
    #[must_use]
    pub fn next_state<'a>(&'a self, current: &'a str) -> &'a str {
        match self {
            Self::Advanced { next_state, .. } => next_state,
            Self::Stalled { .. } => current,
        }
    }

    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Advanced { reason, .. } => reason,
            Self::Stalled { reason } => reason.as_str(),
        }
    }

    /// The graph action that fired, when one did.
    #[must_use]
    pub fn matched(&self) -> Option<&GraphAction> {
        match self {
            Self::Advanced { matched, .. } => matched.as_ref(),
            Self::Stalled { .. } => None,
        }
    }

    fn advanced(next_state: impl Into<String>, reason: &'static str) -> Self {
        Self::Advanced {
            next_state: next_state.into(),
            reason,
            matched: None,
        }
    }

    fn stalled(reason: StallReason) -> Self {
        Self::Stalled { reason }
    }
}

/// Fixed destination for each action kind when the graph omits
/// `next_state`, and for graph-less action-driven traces.
#[must_use]
pub fn action_fallback_state(action_type: &str) -> Option<&'static str> {
    match action_type {
        "reuse_credentials" => Some("creds_used"),
        "lateral_move" | "lateral_move_alt" => Some("lateral_move"),
        "access_data" => Some("data_access"),
        "exfiltrate" | "exfiltrate_alt" => Some("exfil_attempt"),
        "send_phish" => Some("phish_sent"),
        _ => None,
    }
}

/// Attempt one transition.
#[allow(clippy::too_many_lines)]
#[must_use]
pub fn advance(
    current: &str,
    containment: &ContainmentState,
    scenario: ScenarioRefs<'_>,
    action: Option<&AttackerAction>,
    ctx: &AttackerContext,
    graph: Option<&AttackGraph>,
) -> AdvanceResult {
    let Some(action) = action.filter(|a| !a.is_no_op()) else {
        // No action to evaluate. Graph mode stalls; legacy mode advances
        // linearly behind the scenario-level containment guards.
        if graph.is_some() {
            return AdvanceResult::stalled(StallReason::NoOp);
        }
        if containment.is_domain_blocked(scenario.attacker_domain) {
            return AdvanceResult::stalled(StallReason::AttackerDomainBlocked);
        }
        if containment.is_host_isolated(scenario.patient_zero_host) {
            return AdvanceResult::stalled(StallReason::PatientZeroIsolated);
        }
        if containment.is_user_reset(scenario.compromised_user) {
            return AdvanceResult::stalled(StallReason::CompromisedUserReset);
        }
        return legacy_advance(current);
    };

    let action_type = action.action_type.as_str();

    // Action-specific containment gating, applied before any graph lookup.
    match action_type {
        "reuse_credentials" => {
            if action.param_str("user").is_some_and(|u| containment.is_user_reset(u)) {
                return AdvanceResult::stalled(StallReason::UserReset);
            }
        }
        "lateral_move" | "lateral_move_alt" => {
            if !ctx.has_foothold() {
                return AdvanceResult::stalled(StallReason::NoFoothold);
            }
            let src = action.param_str("src");
            if src.is_some_and(|s| containment.is_host_isolated(s)) {
                return AdvanceResult::stalled(StallReason::SrcHostIsolated);
            }
            if !src.is_some_and(|s| ctx.is_host_compromised(s)) {
                return AdvanceResult::stalled(StallReason::SrcHostUncompromised);
            }
        }
        "access_data" => {
            let Some(host) = ctx.current_host.as_deref() else {
                return AdvanceResult::stalled(StallReason::NoCurrentHost);
            };
            if containment.is_host_isolated(host) {
                return AdvanceResult::stalled(StallReason::CurrentHostIsolated);
            }
        }
        "exfiltrate" | "exfiltrate_alt" => {
            let Some(host) = ctx.current_host.as_deref() else {
                return AdvanceResult::stalled(StallReason::NoCurrentHost);
            };
            if action
                .param_str("destination_domain")
                .is_some_and(|d| containment.is_domain_blocked(d))
            {
                return AdvanceResult::stalled(StallReason::DestinationBlocked);
            }
            if containment.is_host_isolated(host) {
                return AdvanceResult::stalled(StallReason::CurrentHostIsolated);
            }
        }
        _ => {}
    }

    if let Some(graph) = graph {
        if !graph.objectives.is_empty() && !graph.objectives.iter().any(|o| o == current) {
            return AdvanceResult::stalled(StallReason::ObjectiveStateBlocked);
        }
        let actions = graph.states.get(current).map(|node| node.actions.as_slice());
        if let Some(actions) = actions.filter(|a| !a.is_empty()) {
            let mut has_action = false;
            let mut requires_failed = false;
            let mut params_failed = false;
            let mut matched: Option<&GraphAction> = None;

            for graph_action in actions {
                if graph_action.action_type != action_type {
                    continue;
                }
                has_action = true;
                if !requires_satisfied(&graph_action.requires, ctx) {
                    requires_failed = true;
                    continue;
                }
                if !params_subset(&graph_action.match_params, &action.params) {
                    params_failed = true;
                    continue;
                }
                matched = Some(graph_action);
                break;
            }

            if let Some(matched) = matched {
                let next_state = matched
                    .next_state
                    .clone()
                    .or_else(|| action_fallback_state(action_type).map(str::to_owned))
                    .unwrap_or_else(|| current.to_owned());
                if !graph.objectives.is_empty()
                    && !graph.objectives.iter().any(|o| o == &next_state)
                {
                    return AdvanceResult::stalled(StallReason::ObjectiveNextStateBlocked);
                }
                return AdvanceResult::Advanced {
                    next_state,
                    reason: "advanced_graph",
                    matched: Some(matched.clone()),
                };
            }
            if has_action {
                if requires_failed {
                    return AdvanceResult::stalled(StallReason::ActionRequiresUnsatisfied);
                }
                if params_failed {
                    return AdvanceResult::stalled(StallReason::ActionParamsMismatch);
                }
            }
            return AdvanceResult::stalled(StallReason::ActionNotAllowed);
        }
    }

    // No graph coverage for this state: fall back to the per-action table,
    // then to the linear chain.
    if let Some(next) = action_fallback_state(action_type) {
        return AdvanceResult::advanced(next, "advanced_action");
    }
    legacy_advance(current)
}

fn legacy_advance(current: &str) -> AdvanceResult {
    let idx = LEGACY_STATES.iter().position(|s| *s == current).unwrap_or(0);
    if idx >= LEGACY_STATES.len() - 1 {
        return AdvanceResult::advanced(current, "terminal_state");
    }
    AdvanceResult::advanced(LEGACY_STATES[idx + 1], "advanced")
}

/// Apply a transition's effects (or the legacy per-action update) to the
/// attacker context.
pub fn apply_attacker_action(
    ctx: &mut AttackerContext,
    action: &AttackerAction,
    effects: Option<&BTreeMap<String, Value>>,
) {
    if let Some(effects) = effects {
        apply_effects(ctx, effects);
        // An exfil action's destination becomes the exfil domain when the
        // effects left it unset.
        if matches!(action.action_type.as_str(), "exfiltrate" | "exfiltrate_alt")
            && ctx.current_exfil_domain.is_none()
        {
            ctx.current_exfil_domain = action.param_str("destination_domain").map(str::to_owned);
        }
        return;
    }

    match action.action_type.as_str() {
        "reuse_credentials" => {
            if let Some(user) = action.param_str("user") {
                ctx.record_user(user);
            }
            if let Some(host) = action.param_str("host") {
                ctx.record_host(host);
            }
            ctx.has_creds = true;
        }
        "lateral_move" | "lateral_move_alt" => {
            if let Some(dst) = action.param_str("dst") {
                ctx.record_host(dst);
            }
            ctx.has_admin = true;
        }
        "access_data" => {
            ctx.current_target = action.param_str("target").map(str::to_owned);
            ctx.has_stage = true;
        }
        "exfiltrate" | "exfiltrate_alt" => {
            ctx.current_exfil_domain = action.param_str("destination_domain").map(str::to_owned);
        }
        "establish_persistence" => {
            ctx.has_persistence = true;
        }
        _ => {}
    }
}

fn apply_effects(ctx: &mut AttackerContext, effects: &BTreeMap<String, Value>) {
    if let Some(v) = effects.get("has_creds") {
        ctx.has_creds = truthy(v);
    }
    if let Some(v) = effects.get("has_admin") {
        ctx.has_admin = truthy(v);
    }
    if let Some(v) = effects.get("has_stage") {
        ctx.has_stage = truthy(v);
    }
    if let Some(v) = effects.get("has_persistence") {
        ctx.has_persistence = truthy(v);
    }

    let host = ["compromise_host", "current_host", "set_current_host"]
        .iter()
        .find_map(|k| effects.get(*k).and_then(Value::as_str));
    if let Some(host) = host {
        ctx.record_host(host);
    }

    let user = ["compromise_user", "current_user", "set_current_user"]
        .iter()
        .find_map(|k| effects.get(*k).and_then(Value::as_str));
    if let Some(user) = user {
        ctx.record_user(user);
    }

    if let Some(v) = effects.get("current_target") {
        ctx.current_target = v.as_str().map(str::to_owned);
    }
    if let Some(v) = effects.get("current_exfil_domain") {
        ctx.current_exfil_domain = v.as_str().map(str::to_owned);
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Null => false,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn params_subset(expected: &BTreeMap<String, Value>, actual: &BTreeMap<String, Value>) -> bool {
    expected.iter().all(|(k, v)| actual.get(k) == Some(v))
}

/// Evaluate a graph action's `requires` block against the attacker context.
fn requires_satisfied(requires: &BTreeMap<String, Value>, ctx: &AttackerContext) -> bool {
    requires.iter().all(|(key, expected)| {
        let actual = context_field(ctx, key);
        match expected {
            Value::Array(options) => options.contains(&actual),
            other => &actual == other,
        }
    })
}

fn context_field(ctx: &AttackerContext, key: &str) -> Value {
    match key {
        "foothold" => Value::Bool(ctx.has_foothold()),
        "has_creds" => Value::Bool(ctx.has_creds),
        "has_admin" => Value::Bool(ctx.has_admin),
        "has_stage" => Value::Bool(ctx.has_stage),
        "has_persistence" => Value::Bool(ctx.has_persistence),
        "current_host" => opt_value(ctx.current_host.as_deref()),
        "current_user" => opt_value(ctx.current_user.as_deref()),
        "current_target" => opt_value(ctx.current_target.as_deref()),
        "current_exfil_domain" => opt_value(ctx.current_exfil_domain.as_deref()),
        _ => Value::Null,
    }
}

fn opt_value(v: Option<&str>) -> Value {
    v.map_or(Value::Null, |s| Value::String(s.to_owned()))
}
