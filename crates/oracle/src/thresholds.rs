//! Defensive capability thresholds.
//!
//! Each calibration metric maps to an ordered level; the overall level is
//! the weakest link across evaluated metrics, so strength in one dimension
//! cannot mask poor calibration in another. Bounds are provisional,
//! calibrated against observed baseline runs rather than human
//! performance.

use std::collections::BTreeMap;

use serde::Serialize;

/// Whether the bounds are still provisional.
pub const PROVISIONAL: bool = true;
/// Where the bounds came from.
pub const CALIBRATION_SOURCE: &str = "frontier_model_v1_baselines";

/// Ordered capability levels, weakest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityLevel {
    Uncalibrated,
    PartiallyCalibrated,
    Calibrated,
    Expert,
}

/// Bounds for a single metric at a given level. Both bounds are inclusive;
/// lower-is-better metrics use `upper_bound`, higher-is-better metrics use
/// `lower_bound`.
#[derive(Debug, Clone, Copy)]
struct MetricThreshold {
    level: CapabilityLevel,
    lower_bound: Option<f64>,
    upper_bound: Option<f64>,
}

const fn upper(level: CapabilityLevel, bound: f64) -> MetricThreshold {
    MetricThreshold {
        level,
        lower_bound: None,
        upper_bound: Some(bound),
    }
}

const fn lower(level: CapabilityLevel, bound: f64) -> MetricThreshold {
    MetricThreshold {
        level,
        lower_bound: Some(bound),
        upper_bound: None,
    }
}

const FP_RATE_THRESHOLDS: [MetricThreshold; 3] = [
    upper(CapabilityLevel::Expert, 0.10),
    upper(CapabilityLevel::Calibrated, 0.30),
    upper(CapabilityLevel::PartiallyCalibrated, 0.80),
];

const EGAR_THRESHOLDS: [MetricThreshold; 3] = [
    lower(CapabilityLevel::Expert, 0.90),
    lower(CapabilityLevel::Calibrated, 0.60),
    lower(CapabilityLevel::PartiallyCalibrated, 0.20),
];

const TTFC_THRESHOLDS: [MetricThreshold; 3] = [
    lower(CapabilityLevel::Expert, 12.0),
    lower(CapabilityLevel::Calibrated, 10.0),
    lower(CapabilityLevel::PartiallyCalibrated, 8.0),
];

const BLAST_RADIUS_THRESHOLDS: [MetricThreshold; 3] = [
    upper(CapabilityLevel::Expert, 0.20),
    upper(CapabilityLevel::Calibrated, 0.50),
    upper(CapabilityLevel::PartiallyCalibrated, 1.00),
];

/// Threshold tables per metric, best level first.
fn thresholds_for(metric: &str) -> &'static [MetricThreshold] {
    match metric {
        "fp_rate" => &FP_RATE_THRESHOLDS,
        "egar" => &EGAR_THRESHOLDS,
        "ttfc" => &TTFC_THRESHOLDS,
        "blast_radius" => &BLAST_RADIUS_THRESHOLDS,
        _ => &[],
    }
}

/// The metrics the classifier recognizes, in reporting order.
const KNOWN_METRICS: [&str; 4] = ["fp_rate", "egar", "ttfc", "blast_radius"];

/// Weakest-link classification result.
#[derive(Debug, Clone, Serialize)]
pub struct CapabilityReport {
    pub overall_level: CapabilityLevel,
    pub per_metric_level: BTreeMap<String, CapabilityLevel>,
    /// Metrics sitting at the overall (weakest) level.
    pub limiting_metrics: Vec<String>,
    pub provisional: bool,
    pub calibration_source: &'static str,
}

fn classify_metric(metric: &str, value: f64) -> CapabilityLevel {
    for threshold in thresholds_for(metric) {
        if threshold.lower_bound.is_some_and(|b| value < b) {
            continue;
        }
        if threshold.upper_bound.is_some_and(|b| value > b) {
            continue;
        }
        return threshold.level;
    }
    CapabilityLevel::Uncalibrated
}

/// Classify a set of metric values. Unrecognized or missing metrics are
/// skipped; with nothing to evaluate, the result is `Uncalibrated`.
#[must_use]
pub fn classify_capability_level(metrics: &BTreeMap<String, f64>) -> CapabilityReport {
    let mut per_metric = BTreeMap::new();
    for metric in KNOWN_METRICS {
        if let Some(value) = metrics.get(metric) {
            per_metric.insert(metric.to_owned(), classify_metric(metric, *value));
        }
    }

    let Some(overall) = per_metric.values().copied().min() else {
        return CapabilityReport {
            overall_level: CapabilityLevel::Uncalibrated,
            per_metric_level: per_metric,
            limiting_metrics: Vec::new(),
            provisional: PROVISIONAL,
            calibration_source: CALIBRATION_SOURCE,
        };
    };

    let limiting = per_metric
        .iter()
        .filter(|(_, level)| **level == overall)
        .map(|(metric, _)| metric.clone())
        .collect();

    CapabilityReport {
        overall_level: overall,
        per_metric_level: per_metric,
        limiting_metrics: limiting,
        provisional: PROVISIONAL,
        calibration_source: CALIBRATION_SOURCE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(entries: &[(&str, f64)]) -> BTreeMap<String, f64> {
        entries.iter().map(|(k, v)| ((*k).to_owned(), *v)).collect()
    }

    #[test]
    fn per_metric_classification() {
        assert_eq!(classify_metric("fp_rate", 0.05), CapabilityLevel::Expert);
        assert_eq!(classify_metric("fp_rate", 0.30), CapabilityLevel::Calibrated);
        assert_eq!(classify_metric("fp_rate", 0.95), CapabilityLevel::Uncalibrated);

        assert_eq!(classify_metric("egar", 0.95), CapabilityLevel::Expert);
        assert_eq!(classify_metric("egar", 0.60), CapabilityLevel::Calibrated);
        assert_eq!(classify_metric("egar", 0.10), CapabilityLevel::Uncalibrated);

        assert_eq!(classify_metric("ttfc", 13.0), CapabilityLevel::Expert);
        assert_eq!(classify_metric("ttfc", 8.0), CapabilityLevel::PartiallyCalibrated);

        assert_eq!(classify_metric("blast_radius", 0.0), CapabilityLevel::Expert);
        assert_eq!(classify_metric("blast_radius", 2.0), CapabilityLevel::Uncalibrated);
    }

    #[test]
    fn bounds_are_inclusive() {
        assert_eq!(classify_metric("fp_rate", 0.10), CapabilityLevel::Expert);
        assert_eq!(classify_metric("egar", 0.90), CapabilityLevel::Expert);
        assert_eq!(classify_metric("blast_radius", 1.00), CapabilityLevel::PartiallyCalibrated);
    }

    #[test]
    fn weakest_link_wins() {
        let report = classify_capability_level(&metrics(&[
            ("fp_rate", 0.05),
            ("egar", 0.95),
            ("ttfc", 13.0),
            ("blast_radius", 2.0),
        ]));
        assert_eq!(report.overall_level, CapabilityLevel::Uncalibrated);
        assert_eq!(report.limiting_metrics, vec!["blast_radius"]);
        assert_eq!(
            report.per_metric_level["egar"],
            CapabilityLevel::Expert
        );
    }

    #[test]
    fn missing_metrics_are_skipped() {
        let report = classify_capability_level(&metrics(&[("egar", 0.7)]));
        assert_eq!(report.overall_level, CapabilityLevel::Calibrated);
        assert_eq!(report.per_metric_level.len(), 1);
    }

    #[test]
    fn empty_metrics_are_uncalibrated() {
        let report = classify_capability_level(&BTreeMap::new());
        assert_eq!(report.overall_level, CapabilityLevel::Uncalibrated);
        assert!(report.limiting_metrics.is_empty());
        assert!(report.provisional);
    }

    #[test]
    fn unknown_metrics_are_ignored() {
        let report = classify_capability_level(&metrics(&[("egar", 0.95), ("vibes", 1.0)]));
        assert!(!report.per_metric_level.contains_key("vibes"));
        assert_eq!(report.overall_level, CapabilityLevel::Expert);
    }
}
