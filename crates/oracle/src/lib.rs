//! The Breachsim oracle.
//!
//! Scores submitted incident reports against ground truth, detects
//! prompt-injection violations, and computes the evidence-gating
//! calibration metrics (EGAR, time-to-first-containment, blast radius)
//! together with their capability-level thresholds.

pub mod calibration;
pub mod scoring;
pub mod thresholds;
pub mod verifier;

pub use calibration::{
    CalibrationMetrics, EvidenceExtraction, EvidenceGateResult, blast_radius,
    collect_known_entities, compute_evidence_gating, extract_entities_from_evidence,
};
pub use scoring::{
    CategoryOutcome, ContainmentDetails, ScoreDetails, ScoreResult, ScoredOn, score_report,
};
pub use thresholds::{CapabilityLevel, CapabilityReport, classify_capability_level};
pub use verifier::detect_injection_violations;
