// SPDX-License-Identifier: MIT OR Apache-2.0
//! Schema compatibility checking — Layer 2.
//!
//! Evaluates declared field/value mappings between service pairs (unmapped
//! values, unknown targets, type drift, value collapse) and walks schema
//! version pairs against evolution rules (`additive_only`,
//! `breaking_allowed`, `major_version_required`).

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Field mapping compatibility checks.
pub mod checker;
/// Schema evolution rule engine.
pub mod evolution;

pub use checker::{
    CompatibilityChecker, CompatibilityLevel, CompatibilityResult, DriftDetail, DriftKind,
    FieldCompatResult,
};
pub use evolution::{BreakingChange, BreakingChangeKind, EvolutionCheckResult, EvolutionTracker};

use ccx_telemetry::{EventSink, attr, event_names};
use tracing::{debug, warn};

/// Emit the compatibility summary span event.
///
/// Event name: `schema.compatibility.check`.
pub fn emit_compatibility_check(sink: &dyn EventSink, result: &CompatibilityResult) {
    let attrs = vec![
        attr("schema.source_service", result.source_service.as_str()),
        attr("schema.target_service", result.target_service.as_str()),
        attr("schema.level", result.level.as_str()),
        attr("schema.compatible", result.compatible),
        attr("schema.fields_checked", result.field_results.len()),
        attr("schema.drift_count", result.drift_details.len()),
        attr("schema.message", result.message.as_str()),
    ];

    if result.compatible {
        debug!(
            source = %result.source_service,
            target = %result.target_service,
            level = result.level.as_str(),
            "schema compatibility check passed"
        );
    } else {
        warn!(
            source = %result.source_service,
            target = %result.target_service,
            drifts = result.drift_details.len(),
            "schema compatibility check FAILED"
        );
    }

    sink.emit(event_names::SCHEMA_COMPATIBILITY_CHECK, &attrs);
}

/// Emit one drift detail as a span event.
///
/// Event name: `schema.compatibility.drift`.
pub fn emit_compatibility_drift(sink: &dyn EventSink, result: &CompatibilityResult, drift: &DriftDetail) {
    warn!(
        source = %result.source_service,
        target = %result.target_service,
        field = %drift.field,
        kind = drift.kind.as_str(),
        detail = %drift.detail,
        "schema compatibility drift"
    );
    sink.emit(
        event_names::SCHEMA_COMPATIBILITY_DRIFT,
        &[
            attr("schema.source_service", result.source_service.as_str()),
            attr("schema.target_service", result.target_service.as_str()),
            attr("schema.field", drift.field.as_str()),
            attr("schema.drift_kind", drift.kind.as_str()),
            attr("schema.severity", drift.severity.as_str()),
            attr("schema.detail", drift.detail.as_str()),
        ],
    );
}

/// Emit one breaking evolution change as a span event.
///
/// Event name: `schema.compatibility.breaking`.
pub fn emit_compatibility_breaking(
    sink: &dyn EventSink,
    result: &EvolutionCheckResult,
    change: &BreakingChange,
) {
    warn!(
        service = %result.service,
        from = %result.from_version,
        to = %result.to_version,
        field = %change.field,
        kind = change.kind.as_str(),
        "breaking schema change"
    );
    sink.emit(
        event_names::SCHEMA_COMPATIBILITY_BREAKING,
        &[
            attr("schema.service", result.service.as_str()),
            attr("schema.from_version", result.from_version.as_str()),
            attr("schema.to_version", result.to_version.as_str()),
            attr("schema.field", change.field.as_str()),
            attr("schema.change_kind", change.kind.as_str()),
            attr("schema.detail", change.detail.as_str()),
        ],
    );
}
