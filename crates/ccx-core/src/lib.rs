// SPDX-License-Identifier: MIT OR Apache-2.0
//! Core data model for the context contract runtime.
//!
//! This crate defines the vocabulary shared by every validation layer:
//! severities, coarse type tags, propagation statuses, the Lamport clock,
//! and the provenance envelope that travels with a workflow context.
//!
//! If you only take one dependency, take this one.

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Lamport logical clock.
pub mod clock;
/// Provenance envelope and workflow context.
pub mod envelope;

pub use clock::LamportClock;
pub use envelope::{
    EventRecord, FieldProvenance, PROPAGATION_KEY, PropagationEnvelope, TransformationRecord,
    WorkflowContext,
};

use ccx_error::ErrorCode;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Current contract schema version.
///
/// # Examples
///
/// ```
/// assert_eq!(ccx_core::SCHEMA_VERSION, "0.1.0");
/// ```
pub const SCHEMA_VERSION: &str = "0.1.0";

// ---------------------------------------------------------------------------
// Severity
// ---------------------------------------------------------------------------

/// How seriously a violation is treated.
///
/// Ordering is significant: `Blocking > Warning > Advisory`, so `max()` over
/// a set of violations yields the one that decides the overall verdict.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Worth noting; never affects the verdict.
    Advisory,
    /// Logged and recorded; does not fail the run.
    Warning,
    /// Fails the boundary (and, in strict mode, the run).
    Blocking,
}

impl Severity {
    /// Stable lowercase string form (matches the contract YAML literals).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Advisory => "advisory",
            Self::Warning => "warning",
            Self::Blocking => "blocking",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// TypeTag
// ---------------------------------------------------------------------------

/// Coarse type tag for declared context fields.
///
/// The source pipelines are dynamically typed; contracts only pin down the
/// broad shape. A field with no tag is `Any` and accepts every value —
/// presence and quality checks still apply.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum TypeTag {
    /// UTF-8 string.
    Str,
    /// Integer (JSON number without a fractional part).
    Int,
    /// Any JSON number.
    Float,
    /// Boolean.
    Bool,
    /// Sequence.
    List,
    /// Mapping.
    Dict,
    /// Anything. The default when no tag is declared.
    #[default]
    Any,
}

impl TypeTag {
    /// Whether `value` satisfies this tag. Coercion never happens silently:
    /// an `Int` tag rejects `"3"` and a `Str` tag rejects `3`.
    pub fn matches(&self, value: &serde_json::Value) -> bool {
        match self {
            Self::Str => value.is_string(),
            Self::Int => value.is_i64() || value.is_u64(),
            Self::Float => value.is_number(),
            Self::Bool => value.is_boolean(),
            Self::List => value.is_array(),
            Self::Dict => value.is_object(),
            Self::Any => true,
        }
    }

    /// Stable lowercase string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Str => "str",
            Self::Int => "int",
            Self::Float => "float",
            Self::Bool => "bool",
            Self::List => "list",
            Self::Dict => "dict",
            Self::Any => "any",
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// PropagationStatus
// ---------------------------------------------------------------------------

/// Per-field propagation status recorded on the envelope.
///
/// Defaulting strictly downgrades: a field is `Propagated` only if a phase
/// wrote it without applying a default, and no later defaulting can restore
/// `Propagated` for the same origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum PropagationStatus {
    /// Written by a phase as a real value.
    Propagated,
    /// Filled in from a contract default.
    Defaulted,
    /// Present but degraded (e.g. partially populated composite).
    Partial,
    /// Declared but never usable.
    Failed,
}

impl PropagationStatus {
    /// Stable lowercase string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Propagated => "propagated",
            Self::Defaulted => "defaulted",
            Self::Partial => "partial",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for PropagationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// TransformOp
// ---------------------------------------------------------------------------

/// Kind of transformation a lineage stage applies to a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TransformOp {
    /// First materialisation of the field.
    Ingest,
    /// Value rewritten in place.
    Transform,
    /// Combined with other fields or records.
    Aggregate,
    /// Computed from other fields.
    Derive,
    /// Forwarded unchanged.
    Passthrough,
}

impl TransformOp {
    /// Stable lowercase string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ingest => "ingest",
            Self::Transform => "transform",
            Self::Aggregate => "aggregate",
            Self::Derive => "derive",
            Self::Passthrough => "passthrough",
        }
    }
}

impl fmt::Display for TransformOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// BudgetHealth
// ---------------------------------------------------------------------------

/// Health classification of a single budget allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum BudgetHealth {
    /// Consumption below 80 % of the allocation.
    WithinBudget,
    /// Consumption at or above 80 % of the allocation.
    AtRisk,
    /// Consumption at or above 100 % of the allocation.
    Exhausted,
    /// The contract allocates more across phases than the budget total.
    OverAllocated,
}

impl BudgetHealth {
    /// Stable lowercase string form (used in `budget.check.{health}` events).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WithinBudget => "within_budget",
            Self::AtRisk => "at_risk",
            Self::Exhausted => "exhausted",
            Self::OverAllocated => "over_allocated",
        }
    }
}

impl fmt::Display for BudgetHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// CapabilityChainStatus
// ---------------------------------------------------------------------------

/// Outcome of checking a declared capability chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityChainStatus {
    /// Destination snapshot equals the source snapshot.
    Intact,
    /// Destination snapshot is a strict subset of the source snapshot.
    Attenuated,
    /// Destination holds a capability absent at the source, with no declared
    /// escalation authority.
    EscalationBlocked,
    /// Source or destination snapshot is missing entirely.
    Broken,
}

impl CapabilityChainStatus {
    /// Stable lowercase string form (used in `capability.chain.{status}`
    /// events).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Intact => "intact",
            Self::Attenuated => "attenuated",
            Self::EscalationBlocked => "escalation_blocked",
            Self::Broken => "broken",
        }
    }
}

impl fmt::Display for CapabilityChainStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// EnforcementMode
// ---------------------------------------------------------------------------

/// How the runtime boundary guard reacts to violations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum EnforcementMode {
    /// Blocking violations raise; defaults are applied and recorded.
    Strict,
    /// Everything is logged and recorded; execution continues; defaults are
    /// applied.
    Permissive,
    /// Record only. The context is never altered, defaults included.
    Audit,
}

impl EnforcementMode {
    /// Stable lowercase string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Strict => "strict",
            Self::Permissive => "permissive",
            Self::Audit => "audit",
        }
    }
}

impl fmt::Display for EnforcementMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Direction
// ---------------------------------------------------------------------------

/// Which side of a phase boundary a validation runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Before the phase body runs.
    Entry,
    /// After the phase body returns.
    Exit,
}

impl Direction {
    /// Stable lowercase string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Entry => "entry",
            Self::Exit => "exit",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// CompareOp
// ---------------------------------------------------------------------------

/// Comparison operator used by evaluation specs, alert rules, and gate
/// checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    /// Strictly greater than.
    Gt,
    /// Greater than or equal.
    Gte,
    /// Strictly less than.
    Lt,
    /// Less than or equal.
    Lte,
    /// Equal (exact `f64` comparison; thresholds are caller-chosen).
    Eq,
}

impl CompareOp {
    /// Apply the operator: `value <op> threshold`.
    pub fn compare(&self, value: f64, threshold: f64) -> bool {
        match self {
            Self::Gt => value > threshold,
            Self::Gte => value >= threshold,
            Self::Lt => value < threshold,
            Self::Lte => value <= threshold,
            Self::Eq => value == threshold,
        }
    }

    /// Stable lowercase string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::Eq => "eq",
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ValidationErrorEnvelope
// ---------------------------------------------------------------------------

/// Structured description of a single violation, surfaced by every validator.
///
/// Aggregate results embed these by reference (first three blocking
/// envelopes appear in strict-mode guard errors).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationErrorEnvelope {
    /// Contract type discriminator the violation belongs to
    /// (e.g. `context_propagation`).
    pub contract_type: String,
    /// Dot-path locating the offending element (field name, chain id, ...).
    pub path: String,
    /// Stable machine-readable code.
    pub code: ccx_error::ErrorCode,
    /// Human-readable message.
    pub message: String,
    /// Severity of this violation.
    pub severity: Severity,
}

impl ValidationErrorEnvelope {
    /// Construct an envelope.
    pub fn new(
        contract_type: impl Into<String>,
        path: impl Into<String>,
        code: ErrorCode,
        message: impl Into<String>,
        severity: Severity,
    ) -> Self {
        Self {
            contract_type: contract_type.into(),
            path: path.into(),
            code,
            message: message.into(),
            severity,
        }
    }

    /// Whether this envelope is at blocking severity.
    pub fn is_blocking(&self) -> bool {
        self.severity == Severity::Blocking
    }
}

/// The first `n` blocking envelopes from a slice, cloned.
pub fn first_blocking(envelopes: &[ValidationErrorEnvelope], n: usize) -> Vec<ValidationErrorEnvelope> {
    envelopes
        .iter()
        .filter(|e| e.is_blocking())
        .take(n)
        .cloned()
        .collect()
}

impl fmt::Display for ValidationErrorEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} at {}/{}: {}",
            self.severity, self.code, self.contract_type, self.path, self.message
        )
    }
}
