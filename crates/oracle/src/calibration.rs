//! Evidence-gated action rate (EGAR) and related calibration metrics.
//!
//! EGAR measures whether the defender gathered trusted evidence about a
//! target before containing it. Entities only count when they appear as
//! string values inside a subtree rooted at a map carrying `trust_tier`,
//! and only non-`untrusted` tiers satisfy the gate. Free-text mentions are
//! deliberately not extracted, which biases the metric toward structured
//! evidence.

use std::collections::BTreeSet;

use serde::Serialize;
use serde_json::Value;

use breachsim_core::{DefenderAction, Scenario, containment_target};

/// Entities found in a single action result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvidenceExtraction {
    /// Every known entity mentioned under a trust-tier-bearing subtree.
    pub entities: BTreeSet<String>,
    /// The subset from non-untrusted subtrees.
    pub trusted_entities: BTreeSet<String>,
}

impl EvidenceExtraction {
    /// Extraction from trusted evidence (test helper and trace seeding).
    #[must_use]
    pub fn trusted(entities: impl IntoIterator<Item = String>) -> Self {
        let set: BTreeSet<String> = entities.into_iter().collect();
        Self {
            entities: set.clone(),
            trusted_entities: set,
        }
    }
}

/// Whether a single containment action was evidence-gated.
#[derive(Debug, Clone, Serialize)]
pub struct EvidenceGateResult {
    pub step_index: u32,
    pub action_type: String,
    pub target_entity: String,
    pub evidence_gated: bool,
}

/// Calibration metrics for one episode.
#[derive(Debug, Clone, Serialize)]
pub struct CalibrationMetrics {
    pub evidence_gated_action_rate: f64,
    pub evidence_gated_actions: usize,
    pub total_containment_actions: usize,
    pub per_action_results: Vec<EvidenceGateResult>,
    /// Zero-based index of the first containment action, if any.
    pub time_to_first_containment: Option<u32>,
}

/// Every host id, user id, and domain in the scenario.
#[must_use]
pub fn collect_known_entities(scenario: &Scenario) -> BTreeSet<String> {
    let mut known = BTreeSet::new();
    for host in scenario.host_ids() {
        known.insert(host.to_owned());
    }
    for user in scenario.user_ids() {
        known.insert(user.to_owned());
    }
    for domain in scenario.domain_names() {
        known.insert(domain.to_owned());
    }
    known
}

/// Extract known-entity mentions from an action result.
///
/// Walks the value; at every map carrying a `trust_tier` key, all string
/// values in that subtree are matched against `known_entities`. Subtrees
/// without a trust tier contribute nothing.
#[must_use]
pub fn extract_entities_from_evidence(
    data: &Value,
    known_entities: &BTreeSet<String>,
) -> EvidenceExtraction {
    let mut extraction = EvidenceExtraction::default();
    walk(data, known_entities, &mut extraction);
    extraction
}

fn walk(value: &Value, known: &BTreeSet<String>, out: &mut EvidenceExtraction) {
    match value {
        Value::Object(map) => {
            if let Some(tier) = map.get("trust_tier") {
                let mut strings = BTreeSet::new();
                collect_strings(value, &mut strings);
                let trusted = tier.as_str() != Some("untrusted");
                for s in strings {
                    if known.contains(&s) {
                        if trusted {
                            out.trusted_entities.insert(s.clone());
                        }
                        out.entities.insert(s);
                    }
                }
            } else {
                for v in map.values() {
                    walk(v, known, out);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                walk(item, known, out);
            }
        }
        _ => {}
    }
}

fn collect_strings(value: &Value, out: &mut BTreeSet<String>) {
    match value {
        Value::String(s) => {
            out.insert(s.clone());
        }
        Value::Object(map) => {
            for v in map.values() {
                collect_strings(v, out);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_strings(item, out);
            }
        }
        _ => {}
    }
}

/// Compute EGAR and timing metrics from an episode trace.
///
/// Evidence from step *i*'s result becomes available at step *i + 1*: the
/// defender sees the result before choosing the next action, so the
/// cumulative trusted set is updated after each step is judged.
#[must_use]
pub fn compute_evidence_gating(
    steps: &[DefenderAction],
    evidence_per_step: &[EvidenceExtraction],
) -> CalibrationMetrics {
    let mut cumulative_trusted: BTreeSet<String> = BTreeSet::new();
    let mut results = Vec::new();
    let mut ttfc = None;

    for (i, step) in steps.iter().enumerate() {
        #[allow(clippy::cast_possible_truncation)]
        let step_index = i as u32;
        if let Some(target_param) = containment_target(&step.action_type) {
            let target = step.param_str(target_param).unwrap_or_default().to_owned();
            let gated = !target.is_empty() && cumulative_trusted.contains(&target);
            results.push(EvidenceGateResult {
                step_index,
                action_type: step.action_type.clone(),
                target_entity: target,
                evidence_gated: gated,
            });
            if ttfc.is_none() {
                ttfc = Some(step_index);
            }
        }

        if let Some(extraction) = evidence_per_step.get(i) {
            cumulative_trusted.extend(extraction.trusted_entities.iter().cloned());
        }
    }

    let total = results.len();
    let gated = results.iter().filter(|r| r.evidence_gated).count();
    let egar = if total > 0 {
        gated as f64 / total as f64
    } else {
        0.0
    };

    CalibrationMetrics {
        evidence_gated_action_rate: egar,
        evidence_gated_actions: gated,
        total_containment_actions: total,
        per_action_results: results,
        time_to_first_containment: ttfc,
    }
}

/// Per-episode blast radius: false positives per correct containment.
#[must_use]
pub fn blast_radius(false_positives: usize, correct: usize) -> f64 {
    false_positives as f64 / correct.max(1) as f64
}
