// SPDX-License-Identifier: MIT OR Apache-2.0
//! Causal ordering validation — Layer 4.
//!
//! Checks declared happens-before dependencies against the envelope's
//! event log. A dependency is satisfied iff both endpoints were recorded
//! and the earliest matching `before` event carries a strictly lower
//! Lamport timestamp than the latest matching `after` event. Missing
//! events are violations at the dependency's declared severity.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use ccx_contract::{CausalDependency, OrderingContract};
use ccx_core::{EventRecord, Severity, ValidationErrorEnvelope};
use ccx_error::ErrorCode;
use ccx_telemetry::{EventSink, attr, event_names};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

// ---------------------------------------------------------------------------
// Result models
// ---------------------------------------------------------------------------

/// Verdict for one declared dependency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderingCheckResult {
    /// The dependency that was checked.
    pub dependency: CausalDependency,
    /// Whether the happens-before relation held.
    pub satisfied: bool,
    /// Timestamp of the earliest matching `before` event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before_ts: Option<u64>,
    /// Timestamp of the latest matching `after` event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after_ts: Option<u64>,
    /// Human-readable detail, timestamps included to localise the fault.
    pub message: String,
}

/// Aggregate verdict for one validation pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderingValidationResult {
    /// `true` iff no blocking dependency is violated.
    pub passed: bool,
    /// Number of dependencies checked.
    pub total_checked: usize,
    /// Number of unsatisfied dependencies, any severity.
    pub violations: usize,
    /// Per-dependency verdicts.
    pub results: Vec<OrderingCheckResult>,
}

impl OrderingValidationResult {
    /// Every violation as a structured error envelope.
    #[must_use]
    pub fn envelopes(&self) -> Vec<ValidationErrorEnvelope> {
        let contract_type = ccx_contract::ContractKind::CausalOrdering.as_str();
        self.results
            .iter()
            .filter(|check| !check.satisfied)
            .map(|check| {
                ValidationErrorEnvelope::new(
                    contract_type,
                    format!(
                        "{}->{}",
                        check.dependency.before.tag(),
                        check.dependency.after.tag()
                    ),
                    ErrorCode::OrderingViolation,
                    &check.message,
                    check.dependency.severity,
                )
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Validator
// ---------------------------------------------------------------------------

/// Validates an event log against an ordering contract.
#[derive(Debug, Clone, Copy, Default)]
pub struct CausalValidator;

impl CausalValidator {
    /// Create a validator.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Check one dependency against the event log.
    #[must_use]
    pub fn check_dependency(
        &self,
        events: &[EventRecord],
        dependency: &CausalDependency,
    ) -> OrderingCheckResult {
        let before_ts = events
            .iter()
            .filter(|e| e.phase == dependency.before.phase && e.event == dependency.before.event)
            .map(|e| e.logical_ts)
            .min();
        let after_ts = events
            .iter()
            .filter(|e| e.phase == dependency.after.phase && e.event == dependency.after.event)
            .map(|e| e.logical_ts)
            .max();

        let (satisfied, message) = match (before_ts, after_ts) {
            (None, _) => (
                false,
                format!("event {} was never recorded", dependency.before.tag()),
            ),
            (_, None) => (
                false,
                format!("event {} was never recorded", dependency.after.tag()),
            ),
            (Some(before), Some(after)) if before < after => (
                true,
                format!(
                    "{} (ts={before}) happens before {} (ts={after})",
                    dependency.before.tag(),
                    dependency.after.tag()
                ),
            ),
            (Some(before), Some(after)) => (
                false,
                format!(
                    "{} (ts={before}) does not precede {} (ts={after})",
                    dependency.before.tag(),
                    dependency.after.tag()
                ),
            ),
        };

        OrderingCheckResult {
            dependency: dependency.clone(),
            satisfied,
            before_ts,
            after_ts,
            message,
        }
    }

    /// Check every declared dependency.
    #[must_use]
    pub fn validate(
        &self,
        events: &[EventRecord],
        contract: &OrderingContract,
    ) -> OrderingValidationResult {
        let results: Vec<OrderingCheckResult> = contract
            .dependencies
            .iter()
            .map(|dependency| self.check_dependency(events, dependency))
            .collect();

        let violations = results.iter().filter(|r| !r.satisfied).count();
        let passed = results
            .iter()
            .all(|r| r.satisfied || r.dependency.severity != Severity::Blocking);

        OrderingValidationResult {
            passed,
            total_checked: results.len(),
            violations,
            results,
        }
    }
}

// ---------------------------------------------------------------------------
// Emission
// ---------------------------------------------------------------------------

/// Emit the validation summary span event.
///
/// Event name: `causal.ordering.complete`.
pub fn emit_ordering_result(sink: &dyn EventSink, result: &OrderingValidationResult) {
    let attrs = vec![
        attr("ordering.passed", result.passed),
        attr("ordering.total_checked", result.total_checked),
        attr("ordering.violations", result.violations),
    ];

    if result.passed {
        debug!(
            satisfied = result.total_checked - result.violations,
            total = result.total_checked,
            "ordering validation complete"
        );
    } else {
        warn!(
            violations = result.violations,
            total = result.total_checked,
            "ordering validation FAILED"
        );
    }

    sink.emit(event_names::CAUSAL_ORDERING_COMPLETE, &attrs);
}

/// Emit one violation as a span event. Only call for unsatisfied checks.
///
/// Event name: `causal.ordering.violation`.
pub fn emit_ordering_violation(sink: &dyn EventSink, check: &OrderingCheckResult) {
    let mut attrs = vec![
        attr("ordering.before_phase", check.dependency.before.phase.as_str()),
        attr("ordering.before_event", check.dependency.before.event.as_str()),
        attr("ordering.after_phase", check.dependency.after.phase.as_str()),
        attr("ordering.after_event", check.dependency.after.event.as_str()),
        attr("ordering.severity", check.dependency.severity.as_str()),
        attr("ordering.message", check.message.as_str()),
    ];
    if let Some(ts) = check.before_ts {
        attrs.push(attr("ordering.before_ts", ts as i64));
    }
    if let Some(ts) = check.after_ts {
        attrs.push(attr("ordering.after_ts", ts as i64));
    }

    warn!(
        before = %check.dependency.before.tag(),
        after = %check.dependency.after.tag(),
        severity = check.dependency.severity.as_str(),
        message = %check.message,
        "ordering violation"
    );

    sink.emit(event_names::CAUSAL_ORDERING_VIOLATION, &attrs);
}
