// SPDX-License-Identifier: MIT OR Apache-2.0
//! Unified error taxonomy with stable error codes for the context contract
//! runtime.
//!
//! Every violation surfaced by a validation layer carries an [`ErrorCode`]
//! (a machine-readable, stable string tag). Operational failures are wrapped
//! in a [`ContractError`], which adds a human-readable message, an optional
//! cause chain, and arbitrary key-value context. Use the builder returned by
//! [`ContractError::new`] to construct errors fluently.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// ErrorCategory
// ---------------------------------------------------------------------------

/// Broad family that an [`ErrorCode`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Contract parsing and shape errors.
    Contract,
    /// Field propagation errors (Layer 1).
    Propagation,
    /// Cross-service schema compatibility errors (Layer 2).
    Compatibility,
    /// Semantic convention errors (Layer 3).
    Convention,
    /// Capability propagation errors (Layer 5).
    Capability,
    /// Causal ordering errors (Layer 4).
    Ordering,
    /// Budget propagation errors (Layer 6).
    Budget,
    /// Data lineage errors (Layer 7).
    Lineage,
    /// Runtime boundary guard errors.
    Runtime,
    /// Regression gate errors.
    Regression,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Contract => "contract",
            Self::Propagation => "propagation",
            Self::Compatibility => "compatibility",
            Self::Convention => "convention",
            Self::Capability => "capability",
            Self::Ordering => "ordering",
            Self::Budget => "budget",
            Self::Lineage => "lineage",
            Self::Runtime => "runtime",
            Self::Regression => "regression",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// ErrorCode
// ---------------------------------------------------------------------------

/// Machine-readable, stable error code.
///
/// Each variant serialises to a `SCREAMING_SNAKE_CASE` string that is
/// guaranteed not to change across patch releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // -- Contract --
    /// Contract file is not parseable YAML.
    SchemaParse,
    /// Contract YAML is well-formed but does not match the declared schema.
    ContractShape,

    // -- Propagation --
    /// A required field is absent at a phase boundary.
    FieldMissing,
    /// A field value does not match its declared type tag.
    TypeMismatch,
    /// A quality or evaluation check failed.
    QualityFail,
    /// A declared default was applied to an absent enrichment field.
    /// Non-fatal signal.
    DefaultApplied,

    // -- Compatibility --
    /// A declared source value has no entry in the field mapping.
    Unmapped,

    // -- Convention --
    /// The same alias resolves to two different canonical names.
    AliasConflict,

    // -- Capability --
    /// A phase attempted to add a capability absent from its source snapshot.
    Escalation,

    // -- Ordering --
    /// A declared happens-before dependency is violated or unverifiable.
    OrderingViolation,

    // -- Budget --
    /// Consumption reached or exceeded the phase allocation.
    Exhausted,
    /// Sum of per-phase allocations exceeds the declared total.
    OverAllocated,

    // -- Lineage --
    /// Adjacent transformation hashes do not chain.
    HashBreak,
    /// Recorded stages do not match the declared chain.
    StageMismatch,

    // -- Runtime --
    /// A strict-mode boundary rejected the phase on a blocking violation.
    BoundaryBlocked,
    /// The declared phase graph contains a cycle.
    PhaseGraphCycle,

    // -- Regression --
    /// One or more regression gate checks failed.
    RegressionFailed,
}

impl ErrorCode {
    /// Returns the broad [`ErrorCategory`] this code belongs to.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::SchemaParse | Self::ContractShape => ErrorCategory::Contract,

            Self::FieldMissing
            | Self::TypeMismatch
            | Self::QualityFail
            | Self::DefaultApplied => ErrorCategory::Propagation,

            Self::Unmapped => ErrorCategory::Compatibility,

            Self::AliasConflict => ErrorCategory::Convention,

            Self::Escalation => ErrorCategory::Capability,

            Self::OrderingViolation => ErrorCategory::Ordering,

            Self::Exhausted | Self::OverAllocated => ErrorCategory::Budget,

            Self::HashBreak | Self::StageMismatch => ErrorCategory::Lineage,

            Self::BoundaryBlocked | Self::PhaseGraphCycle => ErrorCategory::Runtime,

            Self::RegressionFailed => ErrorCategory::Regression,
        }
    }

    /// Stable `&'static str` representation of the code
    /// (e.g. `"FIELD_MISSING"`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SchemaParse => "SCHEMA_PARSE",
            Self::ContractShape => "CONTRACT_SHAPE",
            Self::FieldMissing => "FIELD_MISSING",
            Self::TypeMismatch => "TYPE_MISMATCH",
            Self::QualityFail => "QUALITY_FAIL",
            Self::DefaultApplied => "DEFAULT_APPLIED",
            Self::Unmapped => "UNMAPPED",
            Self::AliasConflict => "ALIAS_CONFLICT",
            Self::Escalation => "ESCALATION",
            Self::OrderingViolation => "ORDERING_VIOLATION",
            Self::Exhausted => "EXHAUSTED",
            Self::OverAllocated => "OVER_ALLOCATED",
            Self::HashBreak => "HASH_BREAK",
            Self::StageMismatch => "STAGE_MISMATCH",
            Self::BoundaryBlocked => "BOUNDARY_BLOCKED",
            Self::PhaseGraphCycle => "PHASE_GRAPH_CYCLE",
            Self::RegressionFailed => "REGRESSION_FAILED",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ContractError
// ---------------------------------------------------------------------------

/// Unified runtime error.
///
/// Carries a stable [`ErrorCode`], a human-readable message, an optional
/// source error for cause-chaining, and arbitrary structured context.
///
/// # Builder usage
///
/// ```
/// use ccx_error::{ContractError, ErrorCode};
///
/// let err = ContractError::new(ErrorCode::FieldMissing, "field 'domain' absent")
///     .with_context("phase", "plan")
///     .with_context("direction", "exit");
/// ```
pub struct ContractError {
    /// Machine-readable error code.
    pub code: ErrorCode,
    /// Human-readable description.
    pub message: String,
    /// Optional underlying cause.
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
    /// Arbitrary structured context for diagnostics.
    pub context: BTreeMap<String, serde_json::Value>,
}

impl ContractError {
    /// Create a new error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
            context: BTreeMap::new(),
        }
    }

    /// Attach a key-value pair to the diagnostic context.
    ///
    /// The value is converted via [`serde_json::to_value`]; if serialisation
    /// fails, the entry is silently skipped.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }

    /// Attach an underlying cause.
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Shorthand for `self.code.category()`.
    pub fn category(&self) -> ErrorCategory {
        self.code.category()
    }
}

impl fmt::Debug for ContractError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("ContractError");
        d.field("code", &self.code);
        d.field("message", &self.message);
        if let Some(ref src) = self.source {
            d.field("source", &src.to_string());
        }
        if !self.context.is_empty() {
            d.field("context", &self.context);
        }
        d.finish()
    }
}

impl fmt::Display for ContractError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.message)?;
        if !self.context.is_empty() {
            // Deterministic output thanks to BTreeMap.
            if let Ok(ctx) = serde_json::to_string(&self.context) {
                write!(f, " {ctx}")?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for ContractError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
