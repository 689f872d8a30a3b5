// SPDX-License-Identifier: MIT OR Apache-2.0
//! Span-event emission for the context contract runtime.
//!
//! Every validation layer reports through one pluggable sink: a single
//! `emit(event, attrs)` call with a namespaced event name and flat scalar
//! attributes. When a span-event backend is unavailable the sink degrades
//! to structured logs, and the default sink is a no-op — emission is a
//! best-effort side channel with no back-pressure.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Mutex;
use tracing::info;

// ---------------------------------------------------------------------------
// Attribute values
// ---------------------------------------------------------------------------

/// A flat scalar attribute value. Span events carry no nesting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    /// String attribute.
    Str(String),
    /// Integer attribute.
    Int(i64),
    /// Float attribute.
    Float(f64),
    /// Boolean attribute.
    Bool(bool),
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => f.write_str(s),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<&str> for AttrValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<i64> for AttrValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<usize> for AttrValue {
    fn from(v: usize) -> Self {
        Self::Int(v as i64)
    }
}

impl From<f64> for AttrValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for AttrValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

/// Ordered attribute list attached to an event.
pub type Attrs = Vec<(String, AttrValue)>;

/// Build one attribute pair; keeps emit call sites compact.
pub fn attr(key: &str, value: impl Into<AttrValue>) -> (String, AttrValue) {
    (key.to_string(), value.into())
}

// ---------------------------------------------------------------------------
// Sinks
// ---------------------------------------------------------------------------

/// Destination for span events.
///
/// Implementations must be cheap and infallible; emission never affects
/// validation verdicts.
pub trait EventSink: Send + Sync {
    /// Record one event with its attributes.
    fn emit(&self, name: &str, attrs: &[(String, AttrValue)]);
}

/// Discards every event. The default when no provider is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn emit(&self, _name: &str, _attrs: &[(String, AttrValue)]) {}
}

/// Emits events as structured `tracing` log lines.
///
/// Used when span events are wanted but no OTel provider is attached; the
/// attribute list is rendered as a single JSON object field.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, name: &str, attrs: &[(String, AttrValue)]) {
        let rendered = serde_json::to_string(
            &attrs
                .iter()
                .map(|(k, v)| (k.as_str(), v))
                .collect::<std::collections::BTreeMap<_, _>>(),
        )
        .unwrap_or_default();
        info!(event = name, attrs = %rendered, "span event");
    }
}

/// A recorded event, as captured by [`MemorySink`].
#[derive(Debug, Clone, PartialEq)]
pub struct EmittedEvent {
    /// Event name.
    pub name: String,
    /// Attribute list in emission order.
    pub attrs: Attrs,
}

/// Captures events in memory. Test helper.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<EmittedEvent>>,
}

impl MemorySink {
    /// Create an empty capture sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything emitted so far.
    #[must_use]
    pub fn events(&self) -> Vec<EmittedEvent> {
        self.events.lock().expect("sink poisoned").clone()
    }

    /// Names of everything emitted so far.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .map(|e| e.name)
            .collect()
    }

    /// Number of events whose name equals `name`.
    #[must_use]
    pub fn count_of(&self, name: &str) -> usize {
        self.events().iter().filter(|e| e.name == name).count()
    }
}

impl EventSink for MemorySink {
    fn emit(&self, name: &str, attrs: &[(String, AttrValue)]) {
        self.events.lock().expect("sink poisoned").push(EmittedEvent {
            name: name.to_string(),
            attrs: attrs.to_vec(),
        });
    }
}

// ---------------------------------------------------------------------------
// Event names
// ---------------------------------------------------------------------------

/// Namespaced span-event names, pinned in one place so layers cannot drift.
pub mod event_names {
    /// Semantic convention validation summary.
    pub const CONVENTION_VALIDATION_COMPLETE: &str = "convention.validation.complete";

    /// Schema compatibility check summary.
    pub const SCHEMA_COMPATIBILITY_CHECK: &str = "schema.compatibility.check";
    /// Single schema compatibility drift detail.
    pub const SCHEMA_COMPATIBILITY_DRIFT: &str = "schema.compatibility.drift";
    /// Breaking schema evolution detail.
    pub const SCHEMA_COMPATIBILITY_BREAKING: &str = "schema.compatibility.breaking";

    /// Capability validation at phase entry.
    pub const CAPABILITY_BOUNDARY_ENTRY: &str = "capability.boundary.entry";
    /// Capability validation at phase exit.
    pub const CAPABILITY_BOUNDARY_EXIT: &str = "capability.boundary.exit";

    /// Causal ordering validation summary.
    pub const CAUSAL_ORDERING_COMPLETE: &str = "causal.ordering.complete";
    /// Single causal ordering violation.
    pub const CAUSAL_ORDERING_VIOLATION: &str = "causal.ordering.violation";

    /// Preflight check summary.
    pub const CONTEXT_PREFLIGHT_RESULT: &str = "context.preflight.result";
    /// Single preflight violation.
    pub const CONTEXT_PREFLIGHT_VIOLATION: &str = "context.preflight.violation";

    /// Post-execution reconciliation report.
    pub const CONTEXT_POSTEXEC_REPORT: &str = "context.postexec.report";
    /// Single runtime discrepancy.
    pub const CONTEXT_POSTEXEC_DISCREPANCY: &str = "context.postexec.discrepancy";

    /// Overall health score.
    pub const CONTEXT_OBSERVABILITY_HEALTH: &str = "context.observability.health";
    /// Single alert.
    pub const CONTEXT_OBSERVABILITY_ALERT: &str = "context.observability.alert";
    /// Alert evaluation summary.
    pub const CONTEXT_OBSERVABILITY_ALERT_EVALUATION: &str =
        "context.observability.alert_evaluation";

    /// Contract drift report.
    pub const CONTEXT_REGRESSION_DRIFT: &str = "context.regression.drift";
    /// Regression gate verdict.
    pub const CONTEXT_REGRESSION_GATE: &str = "context.regression.gate";
    /// Single regression gate check.
    pub const CONTEXT_REGRESSION_GATE_CHECK: &str = "context.regression.gate_check";

    /// Single lineage stage recording.
    pub const LINEAGE_STAGE_RECORDED: &str = "lineage.stage.recorded";
    /// Lineage audit summary.
    pub const LINEAGE_AUDIT_COMPLETE: &str = "lineage.audit.complete";

    /// Budget validation summary.
    pub const BUDGET_SUMMARY: &str = "budget.summary";

    /// Boundary guard record (entry or exit of one phase).
    pub const CONTEXT_BOUNDARY_ENTRY: &str = "context.boundary.entry";
    /// Boundary guard record at phase exit.
    pub const CONTEXT_BOUNDARY_EXIT: &str = "context.boundary.exit";
    /// Workflow run summary from the boundary guard.
    pub const CONTEXT_WORKFLOW_SUMMARY: &str = "context.workflow.summary";

    /// `capability.chain.{status}` event name for a chain status string.
    #[must_use]
    pub fn capability_chain(status: &str) -> String {
        format!("capability.chain.{status}")
    }

    /// `lineage.chain.{status}` event name for an audit status string.
    #[must_use]
    pub fn lineage_chain(status: &str) -> String {
        format!("lineage.chain.{status}")
    }

    /// `budget.check.{health}` event name for a health string.
    #[must_use]
    pub fn budget_check(health: &str) -> String {
        format!("budget.check.{health}")
    }
}
