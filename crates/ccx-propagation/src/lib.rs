// SPDX-License-Identifier: MIT OR Apache-2.0
//! Context propagation validation — Layer 1.
//!
//! Treats context propagation like a type system for workflow pipelines:
//! the [`BoundaryValidator`] checks required, enrichment, and quality field
//! specs at each phase boundary, and the [`PropagationTracker`] reconciles
//! declared propagation chains against the envelope's per-field provenance.

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Built-in quality policy registry.
pub mod policy;
/// Chain reconciliation against envelope provenance.
pub mod tracker;
/// Boundary validation.
pub mod validator;

pub use policy::{PolicyOutcome, QualityPolicyRegistry};
pub use tracker::{ChainStatus, PropagationChainResult, PropagationTracker};
pub use validator::{
    AppliedDefault, BoundaryValidator, ContractValidationResult, FieldIssue,
    FieldValidationResult, QualityViolation,
};

use tracing::{debug, warn};

/// Log a boundary validation result.
///
/// The guard owns the per-boundary span event (`context.boundary.entry` /
/// `context.boundary.exit`); this layer contributes structured logs only.
pub fn log_boundary_result(result: &ContractValidationResult) {
    if result.passed {
        debug!(
            phase = %result.phase,
            direction = %result.direction,
            fields = result.field_results.len(),
            defaults = result.defaults_applied.len(),
            "boundary validation passed"
        );
    } else {
        warn!(
            phase = %result.phase,
            direction = %result.direction,
            failed = result.field_results.iter().filter(|f| !f.satisfied).count(),
            quality_violations = result.quality_violations.len(),
            "boundary validation FAILED"
        );
    }
}

/// Log a chain reconciliation result.
///
/// Chain results ride on the post-execution summary's span attributes, so
/// this layer contributes structured logs only.
pub fn log_chain_result(result: &PropagationChainResult) {
    match result.status {
        ChainStatus::Intact => {
            debug!(chain = %result.chain_id, "propagation chain intact");
        }
        ChainStatus::Degraded | ChainStatus::Broken => {
            warn!(
                chain = %result.chain_id,
                status = %result.status,
                detail = %result.detail,
                "propagation chain not intact"
            );
        }
    }
}
