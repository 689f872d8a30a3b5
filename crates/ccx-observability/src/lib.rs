// SPDX-License-Identifier: MIT OR Apache-2.0
//! Observability and alerting — Layer 6.
//!
//! Fuses per-layer results into a 0–100 health score and evaluates a
//! declarative alert rule list against the derived metric set. The default
//! rules cover low completeness, blocking boundary failures, critical
//! preflight violations, and late corruption.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use ccx_core::{CompareOp, Severity};
use ccx_postexec::{DiscrepancyKind, PostExecutionReport};
use ccx_preflight::PreflightResult;
use ccx_telemetry::{EventSink, attr, event_names};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// Boundary-level statistics the runtime guard accumulates during a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundaryStats {
    /// Phases that executed.
    pub total_phases: usize,
    /// Phases whose boundaries all passed.
    pub passed_phases: usize,
    /// Total blocking failures across all boundaries.
    pub blocking_failures: usize,
}

// ---------------------------------------------------------------------------
// Health scoring
// ---------------------------------------------------------------------------

/// The fused health score and its sub-scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthScore {
    /// `clamp(0, 100, 0.45·completeness + 0.35·boundary + 0.20·preflight −
    /// discrepancy_penalty)`.
    pub overall: f64,
    /// `100 · chains_intact / chains_total`.
    pub completeness_score: f64,
    /// `100 · passed_phases / total_phases`.
    pub boundary_score: f64,
    /// `100 − 10·critical − 2·warning`, floored at 0.
    pub preflight_score: f64,
    /// `5·late_corruption + 2·late_healing`.
    pub discrepancy_penalty: f64,
}

/// Computes [`HealthScore`]s from layer results.
#[derive(Debug, Clone, Copy, Default)]
pub struct HealthScorer;

impl HealthScorer {
    /// Create a scorer.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Fuse the three layer results into one score.
    #[must_use]
    pub fn score(
        &self,
        preflight: &PreflightResult,
        boundary: &BoundaryStats,
        postexec: &PostExecutionReport,
    ) -> HealthScore {
        let completeness_score = postexec.completeness_pct;
        let boundary_score = if boundary.total_phases == 0 {
            100.0
        } else {
            100.0 * boundary.passed_phases as f64 / boundary.total_phases as f64
        };
        let preflight_score = (100.0
            - 10.0 * preflight.critical_count() as f64
            - 2.0 * preflight.warning_count() as f64)
            .max(0.0);
        let discrepancy_penalty = 5.0
            * postexec.count_of(DiscrepancyKind::LateCorruption) as f64
            + 2.0 * postexec.count_of(DiscrepancyKind::LateHealing) as f64;

        let overall = (0.45 * completeness_score + 0.35 * boundary_score
            + 0.20 * preflight_score
            - discrepancy_penalty)
            .clamp(0.0, 100.0);

        HealthScore {
            overall,
            completeness_score,
            boundary_score,
            preflight_score,
            discrepancy_penalty,
        }
    }
}

/// Metric set derived from layer results, keyed by stable metric names.
///
/// Shared by the alert evaluator and the regression gate.
#[must_use]
pub fn metric_set(
    preflight: &PreflightResult,
    boundary: &BoundaryStats,
    postexec: &PostExecutionReport,
    health: &HealthScore,
) -> BTreeMap<String, f64> {
    let mut metrics = BTreeMap::new();
    metrics.insert("overall_score".to_string(), health.overall);
    metrics.insert("completeness_pct".to_string(), postexec.completeness_pct);
    metrics.insert("boundary_score".to_string(), health.boundary_score);
    metrics.insert("preflight_score".to_string(), health.preflight_score);
    metrics.insert(
        "boundary_blocking_failures".to_string(),
        boundary.blocking_failures as f64,
    );
    metrics.insert(
        "preflight_critical_count".to_string(),
        preflight.critical_count() as f64,
    );
    metrics.insert(
        "late_corruption_count".to_string(),
        postexec.count_of(DiscrepancyKind::LateCorruption) as f64,
    );
    metrics.insert(
        "late_healing_count".to_string(),
        postexec.count_of(DiscrepancyKind::LateHealing) as f64,
    );
    metrics
}

// ---------------------------------------------------------------------------
// Alerts
// ---------------------------------------------------------------------------

/// A declarative alert rule: fire when `metric <op> threshold`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRule {
    /// Unique rule identifier.
    pub rule_id: String,
    /// Metric name, as produced by [`metric_set`].
    pub metric: String,
    /// Firing condition.
    pub operator: CompareOp,
    /// Threshold the metric is compared against.
    pub threshold: f64,
    /// Severity of the alert when firing.
    pub severity: Severity,
    /// Message template for the fired alert.
    pub message: String,
}

/// One evaluated alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    /// Rule that produced the event.
    pub rule_id: String,
    /// Whether the rule's condition held.
    pub firing: bool,
    /// Severity of the rule.
    pub severity: Severity,
    /// Metric that was inspected.
    pub metric: String,
    /// The metric's actual value.
    pub actual_value: f64,
    /// The rule's threshold.
    pub threshold: f64,
    /// Human-readable message.
    pub message: String,
}

/// Aggregate outcome of one evaluation pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvaluationResult {
    /// Rules inspected.
    pub rules_evaluated: usize,
    /// Rules that fired.
    pub alerts_firing: usize,
    /// Every evaluated event, firing or not.
    pub events: Vec<AlertEvent>,
}

impl AlertEvaluationResult {
    /// Firing alerts at blocking severity.
    #[must_use]
    pub fn critical_alerts(&self) -> Vec<&AlertEvent> {
        self.events
            .iter()
            .filter(|e| e.firing && e.severity == Severity::Blocking)
            .collect()
    }

    /// Firing alerts at warning severity.
    #[must_use]
    pub fn warning_alerts(&self) -> Vec<&AlertEvent> {
        self.events
            .iter()
            .filter(|e| e.firing && e.severity == Severity::Warning)
            .collect()
    }

    /// Whether anything fired.
    #[must_use]
    pub fn has_firing_alerts(&self) -> bool {
        self.alerts_firing > 0
    }
}

/// The default rule list: low completeness, any blocking boundary failure,
/// any critical preflight violation, any late corruption.
#[must_use]
pub fn default_alert_rules() -> Vec<AlertRule> {
    vec![
        AlertRule {
            rule_id: "low_completeness".to_string(),
            metric: "completeness_pct".to_string(),
            operator: CompareOp::Lt,
            threshold: 80.0,
            severity: Severity::Warning,
            message: "propagation completeness below 80%".to_string(),
        },
        AlertRule {
            rule_id: "boundary_blocking_failure".to_string(),
            metric: "boundary_blocking_failures".to_string(),
            operator: CompareOp::Gt,
            threshold: 0.0,
            severity: Severity::Blocking,
            message: "at least one boundary failed at blocking severity".to_string(),
        },
        AlertRule {
            rule_id: "preflight_critical".to_string(),
            metric: "preflight_critical_count".to_string(),
            operator: CompareOp::Gt,
            threshold: 0.0,
            severity: Severity::Blocking,
            message: "preflight found critical violations".to_string(),
        },
        AlertRule {
            rule_id: "late_corruption".to_string(),
            metric: "late_corruption_count".to_string(),
            operator: CompareOp::Gt,
            threshold: 0.0,
            severity: Severity::Blocking,
            message: "post-execution reconciliation found late corruption".to_string(),
        },
        AlertRule {
            rule_id: "lineage_mutation".to_string(),
            metric: "lineage_unverified_count".to_string(),
            operator: CompareOp::Gt,
            threshold: 0.0,
            severity: Severity::Blocking,
            message: "lineage audit found unverified chains".to_string(),
        },
    ]
}

/// Evaluates alert rules against a metric set.
#[derive(Debug, Clone, Default)]
pub struct AlertEvaluator {
    rules: Vec<AlertRule>,
}

impl AlertEvaluator {
    /// An evaluator with the default rule list.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rules: default_alert_rules(),
        }
    }

    /// An evaluator with a caller-supplied rule list.
    #[must_use]
    pub fn with_rules(rules: Vec<AlertRule>) -> Self {
        Self { rules }
    }

    /// Evaluate every rule. Rules naming an absent metric do not fire.
    #[must_use]
    pub fn evaluate(&self, metrics: &BTreeMap<String, f64>) -> AlertEvaluationResult {
        let events: Vec<AlertEvent> = self
            .rules
            .iter()
            .map(|rule| {
                let actual_value = metrics.get(&rule.metric).copied();
                let firing = actual_value
                    .is_some_and(|value| rule.operator.compare(value, rule.threshold));
                AlertEvent {
                    rule_id: rule.rule_id.clone(),
                    firing,
                    severity: rule.severity,
                    metric: rule.metric.clone(),
                    actual_value: actual_value.unwrap_or(f64::NAN),
                    threshold: rule.threshold,
                    message: rule.message.clone(),
                }
            })
            .collect();
        let alerts_firing = events.iter().filter(|e| e.firing).count();

        AlertEvaluationResult {
            rules_evaluated: events.len(),
            alerts_firing,
            events,
        }
    }
}

// ---------------------------------------------------------------------------
// Emission
// ---------------------------------------------------------------------------

/// Emit the health score as a span event.
///
/// Event name: `context.observability.health`.
pub fn emit_health_score(sink: &dyn EventSink, score: &HealthScore) {
    info!(overall = format!("{:.1}", score.overall), "propagation health score");
    sink.emit(
        event_names::CONTEXT_OBSERVABILITY_HEALTH,
        &[
            attr("observability.health.overall", score.overall),
            attr("observability.health.completeness", score.completeness_score),
            attr("observability.health.boundary", score.boundary_score),
            attr("observability.health.preflight", score.preflight_score),
            attr(
                "observability.health.discrepancy_penalty",
                score.discrepancy_penalty,
            ),
        ],
    );
}

/// Emit one alert as a span event.
///
/// Event name: `context.observability.alert`.
pub fn emit_alert_event(sink: &dyn EventSink, event: &AlertEvent) {
    if event.firing {
        if event.severity == Severity::Blocking {
            warn!(
                rule = %event.rule_id,
                severity = event.severity.as_str(),
                message = %event.message,
                "alert FIRING"
            );
        } else {
            info!(rule = %event.rule_id, message = %event.message, "alert firing");
        }
    }
    sink.emit(
        event_names::CONTEXT_OBSERVABILITY_ALERT,
        &[
            attr("observability.alert.rule_id", event.rule_id.as_str()),
            attr("observability.alert.firing", event.firing),
            attr("observability.alert.severity", event.severity.as_str()),
            attr("observability.alert.metric", event.metric.as_str()),
            attr("observability.alert.actual_value", event.actual_value),
            attr("observability.alert.threshold", event.threshold),
            attr("observability.alert.message", event.message.as_str()),
        ],
    );
}

/// Emit the evaluation summary as a span event.
///
/// Event name: `context.observability.alert_evaluation`.
pub fn emit_alert_evaluation(sink: &dyn EventSink, result: &AlertEvaluationResult) {
    let critical = result.critical_alerts().len();
    let warning = result.warning_alerts().len();
    if result.has_firing_alerts() {
        warn!(
            firing = result.alerts_firing,
            evaluated = result.rules_evaluated,
            critical,
            warning,
            "alert evaluation"
        );
    } else {
        info!(evaluated = result.rules_evaluated, "alert evaluation: quiet");
    }
    sink.emit(
        event_names::CONTEXT_OBSERVABILITY_ALERT_EVALUATION,
        &[
            attr("observability.alert.rules_evaluated", result.rules_evaluated),
            attr("observability.alert.alerts_firing", result.alerts_firing),
            attr("observability.alert.has_critical", critical > 0),
            attr("observability.alert.critical_count", critical),
            attr("observability.alert.warning_count", warning),
        ],
    );
}

// ===========================================================================
// Tests
// ===========================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn preflight(critical: usize, warning: usize) -> PreflightResult {
        let mut violations = Vec::new();
        for i in 0..critical {
            violations.push(ccx_preflight::PreflightViolation {
                check_type: "field_readiness".to_string(),
                phase: "plan".to_string(),
                field: Some(format!("f{i}")),
                severity: Severity::Blocking,
                message: "missing".to_string(),
            });
        }
        for i in 0..warning {
            violations.push(ccx_preflight::PreflightViolation {
                check_type: "field_readiness".to_string(),
                phase: "plan".to_string(),
                field: Some(format!("w{i}")),
                severity: Severity::Warning,
                message: "iffy".to_string(),
            });
        }
        PreflightResult {
            passed: critical == 0,
            phases_checked: 2,
            fields_checked: critical + warning,
            violations,
            graph_issues: Vec::new(),
            readiness: Vec::new(),
        }
    }

    fn postexec(intact: usize, total: usize, corruption: usize, healing: usize) -> PostExecutionReport {
        let mut discrepancies = Vec::new();
        for i in 0..corruption {
            discrepancies.push(ccx_postexec::RuntimeDiscrepancy {
                kind: DiscrepancyKind::LateCorruption,
                chain_id: None,
                field: format!("c{i}"),
                detail: "corrupted".to_string(),
            });
        }
        for i in 0..healing {
            discrepancies.push(ccx_postexec::RuntimeDiscrepancy {
                kind: DiscrepancyKind::LateHealing,
                chain_id: None,
                field: format!("h{i}"),
                detail: "healed".to_string(),
            });
        }
        PostExecutionReport {
            passed: intact == total && corruption == 0,
            chains_total: total,
            chains_intact: intact,
            chains_broken: total - intact,
            chains_degraded: 0,
            completeness_pct: if total == 0 {
                100.0
            } else {
                100.0 * intact as f64 / total as f64
            },
            discrepancies,
        }
    }

    // ---- scorer -----------------------------------------------------------

    #[test]
    fn perfect_run_scores_one_hundred() {
        let scorer = HealthScorer::new();
        let score = scorer.score(
            &preflight(0, 0),
            &BoundaryStats {
                total_phases: 2,
                passed_phases: 2,
                blocking_failures: 0,
            },
            &postexec(5, 5, 0, 0),
        );
        assert_eq!(score.overall, 100.0);
        assert_eq!(score.completeness_score, 100.0);
        assert_eq!(score.boundary_score, 100.0);
        assert_eq!(score.preflight_score, 100.0);
    }

    #[test]
    fn preflight_warnings_cost_two_points_each() {
        let scorer = HealthScorer::new();
        let score = scorer.score(
            &preflight(0, 1),
            &BoundaryStats {
                total_phases: 1,
                passed_phases: 1,
                blocking_failures: 0,
            },
            &postexec(1, 1, 0, 0),
        );
        assert_eq!(score.preflight_score, 98.0);
        // 0.45·100 + 0.35·100 + 0.20·98 = 99.6
        assert!((score.overall - 99.6).abs() < 1e-9);
    }

    #[test]
    fn discrepancy_penalty_subtracts_from_overall() {
        let scorer = HealthScorer::new();
        let score = scorer.score(
            &preflight(0, 0),
            &BoundaryStats {
                total_phases: 1,
                passed_phases: 1,
                blocking_failures: 0,
            },
            &postexec(1, 1, 1, 1),
        );
        assert_eq!(score.discrepancy_penalty, 7.0);
        assert_eq!(score.overall, 93.0);
    }

    #[test]
    fn preflight_score_floors_at_zero() {
        let scorer = HealthScorer::new();
        let score = scorer.score(
            &preflight(11, 0),
            &BoundaryStats::default(),
            &postexec(0, 0, 0, 0),
        );
        assert_eq!(score.preflight_score, 0.0);
    }

    #[test]
    fn zero_phases_scores_boundary_full() {
        let scorer = HealthScorer::new();
        let score = scorer.score(
            &preflight(0, 0),
            &BoundaryStats::default(),
            &postexec(0, 0, 0, 0),
        );
        assert_eq!(score.boundary_score, 100.0);
    }

    proptest! {
        /// The overall score is always within [0, 100].
        #[test]
        fn overall_is_clamped(
            critical in 0usize..20,
            warning in 0usize..20,
            intact in 0usize..10,
            extra in 0usize..10,
            corruption in 0usize..10,
            healing in 0usize..10,
            passed in 0usize..10,
            failed in 0usize..10,
        ) {
            let scorer = HealthScorer::new();
            let score = scorer.score(
                &preflight(critical, warning),
                &BoundaryStats {
                    total_phases: passed + failed,
                    passed_phases: passed,
                    blocking_failures: failed,
                },
                &postexec(intact, intact + extra, corruption, healing),
            );
            prop_assert!(score.overall >= 0.0);
            prop_assert!(score.overall <= 100.0);
        }
    }

    // ---- metric set -------------------------------------------------------

    #[test]
    fn metric_set_carries_stable_keys() {
        let scorer = HealthScorer::new();
        let pf = preflight(1, 2);
        let stats = BoundaryStats {
            total_phases: 2,
            passed_phases: 1,
            blocking_failures: 3,
        };
        let pe = postexec(1, 2, 1, 0);
        let health = scorer.score(&pf, &stats, &pe);
        let metrics = metric_set(&pf, &stats, &pe, &health);
        assert_eq!(metrics["boundary_blocking_failures"], 3.0);
        assert_eq!(metrics["preflight_critical_count"], 1.0);
        assert_eq!(metrics["late_corruption_count"], 1.0);
        assert_eq!(metrics["completeness_pct"], 50.0);
        assert!(metrics.contains_key("overall_score"));
    }

    // ---- alerts -----------------------------------------------------------

    #[test]
    fn quiet_run_fires_nothing() {
        let scorer = HealthScorer::new();
        let pf = preflight(0, 0);
        let stats = BoundaryStats {
            total_phases: 2,
            passed_phases: 2,
            blocking_failures: 0,
        };
        let pe = postexec(3, 3, 0, 0);
        let health = scorer.score(&pf, &stats, &pe);
        let result = AlertEvaluator::new().evaluate(&metric_set(&pf, &stats, &pe, &health));
        assert!(!result.has_firing_alerts());
        // The lineage rule is evaluated but cannot fire without its metric.
        assert_eq!(result.rules_evaluated, 5);
    }

    #[test]
    fn low_completeness_fires_warning() {
        let scorer = HealthScorer::new();
        let pf = preflight(0, 0);
        let stats = BoundaryStats {
            total_phases: 1,
            passed_phases: 1,
            blocking_failures: 0,
        };
        let pe = postexec(1, 3, 0, 0);
        let health = scorer.score(&pf, &stats, &pe);
        let result = AlertEvaluator::new().evaluate(&metric_set(&pf, &stats, &pe, &health));
        assert_eq!(result.alerts_firing, 1);
        assert_eq!(result.warning_alerts()[0].rule_id, "low_completeness");
    }

    #[test]
    fn blocking_boundary_failure_fires_critical() {
        let scorer = HealthScorer::new();
        let pf = preflight(0, 0);
        let stats = BoundaryStats {
            total_phases: 2,
            passed_phases: 1,
            blocking_failures: 2,
        };
        let pe = postexec(3, 3, 0, 0);
        let health = scorer.score(&pf, &stats, &pe);
        let result = AlertEvaluator::new().evaluate(&metric_set(&pf, &stats, &pe, &health));
        let critical = result.critical_alerts();
        assert_eq!(critical.len(), 1);
        assert_eq!(critical[0].rule_id, "boundary_blocking_failure");
        assert_eq!(critical[0].actual_value, 2.0);
    }

    #[test]
    fn late_corruption_fires() {
        let scorer = HealthScorer::new();
        let pf = preflight(0, 0);
        let stats = BoundaryStats {
            total_phases: 1,
            passed_phases: 1,
            blocking_failures: 0,
        };
        let pe = postexec(3, 3, 1, 0);
        let health = scorer.score(&pf, &stats, &pe);
        let result = AlertEvaluator::new().evaluate(&metric_set(&pf, &stats, &pe, &health));
        assert!(
            result
                .critical_alerts()
                .iter()
                .any(|e| e.rule_id == "late_corruption")
        );
    }

    #[test]
    fn absent_metric_does_not_fire() {
        let evaluator = AlertEvaluator::with_rules(vec![AlertRule {
            rule_id: "ghost".to_string(),
            metric: "does_not_exist".to_string(),
            operator: CompareOp::Gt,
            threshold: 0.0,
            severity: Severity::Blocking,
            message: "never".to_string(),
        }]);
        let result = evaluator.evaluate(&BTreeMap::new());
        assert!(!result.has_firing_alerts());
        assert!(result.events[0].actual_value.is_nan());
    }

    #[test]
    fn emission_produces_score_alerts_and_summary() {
        let sink = ccx_telemetry::MemorySink::new();
        let scorer = HealthScorer::new();
        let pf = preflight(1, 0);
        let stats = BoundaryStats {
            total_phases: 1,
            passed_phases: 0,
            blocking_failures: 1,
        };
        let pe = postexec(0, 1, 0, 0);
        let health = scorer.score(&pf, &stats, &pe);
        let result = AlertEvaluator::new().evaluate(&metric_set(&pf, &stats, &pe, &health));

        emit_health_score(&sink, &health);
        for event in &result.events {
            if event.firing {
                emit_alert_event(&sink, event);
            }
        }
        emit_alert_evaluation(&sink, &result);

        assert_eq!(sink.count_of(event_names::CONTEXT_OBSERVABILITY_HEALTH), 1);
        assert!(sink.count_of(event_names::CONTEXT_OBSERVABILITY_ALERT) >= 2);
        assert_eq!(
            sink.count_of(event_names::CONTEXT_OBSERVABILITY_ALERT_EVALUATION),
            1
        );
    }
}
