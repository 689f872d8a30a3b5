// SPDX-License-Identifier: MIT OR Apache-2.0

//! The regression gate.
//!
//! Compares current run metrics against a stored [`Baseline`] under a
//! list of declarative checks. Three policies exist: no worse than the
//! baseline, at least an absolute value, and zero breaking contract
//! changes.

use crate::baseline::Baseline;
use crate::drift::DriftReport;
use ccx_core::{Severity, ValidationErrorEnvelope};
use ccx_error::ErrorCode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Which direction is "better" for a metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricDirection {
    /// Larger values are healthier (scores).
    HigherIsBetter,
    /// Smaller values are healthier (failure counts).
    LowerIsBetter,
}

/// Threshold policy for one gate check.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum GatePolicy {
    /// The metric must not regress past the baseline value.
    NoWorseThanBaseline {
        /// Which direction counts as regression.
        direction: MetricDirection,
    },
    /// The metric must reach an absolute value.
    MinValue {
        /// The floor.
        min: f64,
    },
    /// The drift report must contain zero breaking changes.
    NoBreakingChanges,
}

/// One evaluated gate check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateCheck {
    /// Check identifier.
    pub check_id: String,
    /// Metric the check inspected (empty for drift checks).
    pub metric: String,
    /// Policy that was applied.
    pub policy: GatePolicy,
    /// Baseline value, NaN when not applicable.
    pub baseline_value: f64,
    /// Current value, NaN when the metric is absent.
    pub current_value: f64,
    /// Whether the check held.
    pub passed: bool,
    /// Human-readable detail with baseline vs current values.
    pub detail: String,
}

/// Aggregate gate verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateResult {
    /// `true` iff every check held.
    pub passed: bool,
    /// Identifiers of failed checks.
    pub failed_checks: Vec<String>,
    /// Every evaluated check.
    pub checks: Vec<GateCheck>,
}

impl GateResult {
    /// Every failed check as a structured error envelope.
    #[must_use]
    pub fn envelopes(&self) -> Vec<ValidationErrorEnvelope> {
        self.checks
            .iter()
            .filter(|c| !c.passed)
            .map(|c| {
                ValidationErrorEnvelope::new(
                    "regression_gate",
                    &c.check_id,
                    ErrorCode::RegressionFailed,
                    &c.detail,
                    Severity::Blocking,
                )
            })
            .collect()
    }
}

/// The default check list: overall score no worse, no new blocking
/// boundary failures, no breaking contract changes.
#[must_use]
pub fn default_checks() -> Vec<(String, String, GatePolicy)> {
    vec![
        (
            "overall_no_worse".to_string(),
            "overall_score".to_string(),
            GatePolicy::NoWorseThanBaseline {
                direction: MetricDirection::HigherIsBetter,
            },
        ),
        (
            "boundary_no_new_blocking".to_string(),
            "boundary_blocking_failures".to_string(),
            GatePolicy::NoWorseThanBaseline {
                direction: MetricDirection::LowerIsBetter,
            },
        ),
        (
            "no_breaking_changes".to_string(),
            String::new(),
            GatePolicy::NoBreakingChanges,
        ),
    ]
}

/// Evaluates gate checks against a baseline.
#[derive(Debug, Clone, Default)]
pub struct RegressionGate {
    checks: Vec<(String, String, GatePolicy)>,
}

impl RegressionGate {
    /// A gate with the default check list.
    #[must_use]
    pub fn new() -> Self {
        Self {
            checks: default_checks(),
        }
    }

    /// A gate with a caller-supplied check list of
    /// `(check_id, metric, policy)` triples.
    #[must_use]
    pub fn with_checks(checks: Vec<(String, String, GatePolicy)>) -> Self {
        Self { checks }
    }

    /// Evaluate every check.
    ///
    /// `drift` is only consulted by [`GatePolicy::NoBreakingChanges`];
    /// with no report supplied that check passes vacuously.
    #[must_use]
    pub fn evaluate(
        &self,
        baseline: &Baseline,
        current_metrics: &BTreeMap<String, f64>,
        drift: Option<&DriftReport>,
    ) -> GateResult {
        let checks: Vec<GateCheck> = self
            .checks
            .iter()
            .map(|(check_id, metric, policy)| {
                evaluate_check(check_id, metric, *policy, baseline, current_metrics, drift)
            })
            .collect();

        let failed_checks: Vec<String> = checks
            .iter()
            .filter(|c| !c.passed)
            .map(|c| c.check_id.clone())
            .collect();

        GateResult {
            passed: failed_checks.is_empty(),
            failed_checks,
            checks,
        }
    }
}

fn evaluate_check(
    check_id: &str,
    metric: &str,
    policy: GatePolicy,
    baseline: &Baseline,
    current_metrics: &BTreeMap<String, f64>,
    drift: Option<&DriftReport>,
) -> GateCheck {
    let baseline_value = if metric == "overall_score" {
        baseline.overall_score
    } else {
        baseline.metric(metric).unwrap_or(f64::NAN)
    };
    let current_value = current_metrics.get(metric).copied().unwrap_or(f64::NAN);

    let (passed, detail) = match policy {
        GatePolicy::NoWorseThanBaseline { direction } => {
            // A metric missing on either side cannot regress.
            if baseline_value.is_nan() || current_value.is_nan() {
                (true, format!("'{metric}' not tracked on both sides"))
            } else {
                let ok = match direction {
                    MetricDirection::HigherIsBetter => current_value >= baseline_value,
                    MetricDirection::LowerIsBetter => current_value <= baseline_value,
                };
                (
                    ok,
                    format!("'{metric}' baseline {baseline_value} vs current {current_value}"),
                )
            }
        }
        GatePolicy::MinValue { min } => {
            let ok = !current_value.is_nan() && current_value >= min;
            (
                ok,
                format!("'{metric}' current {current_value} against floor {min}"),
            )
        }
        GatePolicy::NoBreakingChanges => {
            let breaking = drift.map_or(0, DriftReport::breaking_count);
            (
                breaking == 0,
                format!("{breaking} breaking contract change(s)"),
            )
        }
    };

    GateCheck {
        check_id: check_id.to_string(),
        metric: metric.to_string(),
        policy,
        baseline_value,
        current_value,
        passed,
        detail,
    }
}

// ===========================================================================
// Tests
// ===========================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::drift::{DriftChange, DriftChangeKind};

    fn baseline(overall: f64, blocking: f64) -> Baseline {
        let mut metrics = BTreeMap::new();
        metrics.insert("boundary_blocking_failures".to_string(), blocking);
        Baseline::capture("artisan", overall, metrics)
    }

    fn metrics(overall: f64, blocking: f64) -> BTreeMap<String, f64> {
        let mut m = BTreeMap::new();
        m.insert("overall_score".to_string(), overall);
        m.insert("boundary_blocking_failures".to_string(), blocking);
        m
    }

    #[test]
    fn healthy_run_passes_default_checks() {
        let gate = RegressionGate::new();
        let result = gate.evaluate(&baseline(92.0, 0.0), &metrics(95.0, 0.0), None);
        assert!(result.passed);
        assert!(result.failed_checks.is_empty());
        assert_eq!(result.checks.len(), 3);
    }

    #[test]
    fn score_regression_and_new_blocking_fail_their_checks() {
        let gate = RegressionGate::new();
        let result = gate.evaluate(&baseline(92.0, 0.0), &metrics(78.0, 3.0), None);
        assert!(!result.passed);
        assert_eq!(
            result.failed_checks,
            vec!["overall_no_worse", "boundary_no_new_blocking"]
        );
        let overall = &result.checks[0];
        assert_eq!(overall.baseline_value, 92.0);
        assert_eq!(overall.current_value, 78.0);
        assert!(overall.detail.contains("92"));
        assert!(overall.detail.contains("78"));
    }

    #[test]
    fn equal_values_are_not_a_regression() {
        let gate = RegressionGate::new();
        let result = gate.evaluate(&baseline(92.0, 1.0), &metrics(92.0, 1.0), None);
        assert!(result.passed);
    }

    #[test]
    fn breaking_drift_fails_the_gate() {
        let gate = RegressionGate::new();
        let drift = DriftReport {
            changes: vec![DriftChange {
                kind: DriftChangeKind::FieldRemoved,
                phase: "plan".to_string(),
                field: Some("domain".to_string()),
                detail: "'domain' removed".to_string(),
                breaking: true,
            }],
        };
        let result = gate.evaluate(&baseline(92.0, 0.0), &metrics(95.0, 0.0), Some(&drift));
        assert!(!result.passed);
        assert_eq!(result.failed_checks, vec!["no_breaking_changes"]);
        let envelopes = result.envelopes();
        assert_eq!(envelopes[0].code, ErrorCode::RegressionFailed);
    }

    #[test]
    fn min_value_policy() {
        let gate = RegressionGate::with_checks(vec![(
            "floor".to_string(),
            "overall_score".to_string(),
            GatePolicy::MinValue { min: 80.0 },
        )]);
        assert!(
            gate.evaluate(&baseline(0.0, 0.0), &metrics(85.0, 0.0), None)
                .passed
        );
        assert!(
            !gate
                .evaluate(&baseline(0.0, 0.0), &metrics(75.0, 0.0), None)
                .passed
        );
    }

    #[test]
    fn untracked_metric_cannot_regress() {
        let gate = RegressionGate::with_checks(vec![(
            "ghost".to_string(),
            "not_tracked".to_string(),
            GatePolicy::NoWorseThanBaseline {
                direction: MetricDirection::HigherIsBetter,
            },
        )]);
        let result = gate.evaluate(&baseline(92.0, 0.0), &metrics(95.0, 0.0), None);
        assert!(result.passed);
    }
}
