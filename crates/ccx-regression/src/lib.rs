// SPDX-License-Identifier: MIT OR Apache-2.0
//! Regression prevention — Layer 7.
//!
//! Detects drift between two revisions of a propagation contract and gates
//! changes in CI: current metrics are compared against a stored JSON
//! baseline under declarative threshold policies.

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// JSON baseline documents.
pub mod baseline;
/// Contract drift detection.
pub mod drift;
/// The regression gate.
pub mod gate;

pub use baseline::{Baseline, BaselineError};
pub use drift::{ContractDriftDetector, DriftChange, DriftChangeKind, DriftReport};
pub use gate::{GateCheck, GatePolicy, GateResult, MetricDirection, RegressionGate, default_checks};

use ccx_telemetry::{EventSink, attr, event_names};
use tracing::{debug, info, warn};

/// Emit a drift report as a span event.
///
/// Event name: `context.regression.drift`.
pub fn emit_drift_report(sink: &dyn EventSink, report: &DriftReport) {
    if report.breaking_count() > 0 {
        warn!(
            changes = report.changes.len(),
            breaking = report.breaking_count(),
            "contract drift with breaking changes"
        );
    } else {
        debug!(changes = report.changes.len(), "contract drift");
    }
    sink.emit(
        event_names::CONTEXT_REGRESSION_DRIFT,
        &[
            attr("regression.drift.changes", report.changes.len()),
            attr("regression.drift.breaking_count", report.breaking_count()),
        ],
    );
}

/// Emit a gate verdict as a span event.
///
/// Event name: `context.regression.gate`.
pub fn emit_gate_result(sink: &dyn EventSink, result: &GateResult) {
    if result.passed {
        info!(checks = result.checks.len(), "regression gate passed");
    } else {
        warn!(
            failed = ?result.failed_checks,
            "regression gate FAILED"
        );
    }
    sink.emit(
        event_names::CONTEXT_REGRESSION_GATE,
        &[
            attr("regression.gate.passed", result.passed),
            attr("regression.gate.checks", result.checks.len()),
            attr("regression.gate.failed_count", result.failed_checks.len()),
        ],
    );
}

/// Emit one gate check as a span event.
///
/// Event name: `context.regression.gate_check`.
pub fn emit_gate_check(sink: &dyn EventSink, check: &GateCheck) {
    sink.emit(
        event_names::CONTEXT_REGRESSION_GATE_CHECK,
        &[
            attr("regression.check.id", check.check_id.as_str()),
            attr("regression.check.metric", check.metric.as_str()),
            attr("regression.check.passed", check.passed),
            attr("regression.check.baseline", check.baseline_value),
            attr("regression.check.current", check.current_value),
            attr("regression.check.detail", check.detail.as_str()),
        ],
    );
}
