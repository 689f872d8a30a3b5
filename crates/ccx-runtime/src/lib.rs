// SPDX-License-Identifier: MIT OR Apache-2.0
//! Runtime boundary guard.
//!
//! The guard wraps the validation layers and invokes them at each phase
//! boundary in a fixed, load-bearing order — convention, compatibility,
//! capability, ordering, propagation on entry; propagation, lineage on
//! exit — records per-phase results, emits span events, and enforces the
//! configured [`EnforcementMode`](ccx_core::EnforcementMode). At run end
//! it closes the loop: post-execution reconciliation, lineage audit,
//! budget checks, health scoring, and alert evaluation fuse into one
//! [`WorkflowRunSummary`].

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// The boundary guard itself.
pub mod guard;

pub use guard::{
    BoundaryReport, BoundaryViolationError, ContractSet, GuardConfig, GuardError,
    PhaseExecutionRecord, RuntimeBoundaryGuard, WorkflowRunSummary,
};
