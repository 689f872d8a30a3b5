// SPDX-License-Identifier: MIT OR Apache-2.0
//! Post-execution validation — Layer 5 of the defence stack.
//!
//! After the last phase completes, re-runs every declared propagation chain
//! against the envelope's final field states and cross-references the
//! per-phase boundary results recorded during the run. Two shapes of
//! mismatch are surfaced as [`RuntimeDiscrepancy`]s:
//!
//! - **late corruption** — a field that was defaulted at a boundary ends
//!   the run `propagated` with no recorded transformation to account for
//!   the upgrade;
//! - **late healing** — a chain ends intact although one of its phases
//!   failed its boundary mid-run.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use ccx_contract::PropagationContract;
use ccx_core::{PropagationStatus, WorkflowContext};
use ccx_propagation::{ChainStatus, ContractValidationResult, PropagationTracker};
use ccx_telemetry::{EventSink, attr, event_names};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use tracing::{debug, warn};

// ---------------------------------------------------------------------------
// Result models
// ---------------------------------------------------------------------------

/// What kind of runtime discrepancy was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscrepancyKind {
    /// A defaulted field ended `propagated` with nothing recording the
    /// upgrade.
    LateCorruption,
    /// A chain ended intact despite a mid-run blocking failure.
    LateHealing,
}

impl DiscrepancyKind {
    /// Stable lowercase string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LateCorruption => "late_corruption",
            Self::LateHealing => "late_healing",
        }
    }
}

impl fmt::Display for DiscrepancyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One reconciliation mismatch between runtime records and final state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeDiscrepancy {
    /// What kind of mismatch.
    pub kind: DiscrepancyKind,
    /// Chain the mismatch belongs to, when chain-scoped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<String>,
    /// Field the mismatch concerns.
    pub field: String,
    /// Human-readable detail.
    pub detail: String,
}

/// Aggregate post-execution verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostExecutionReport {
    /// `true` iff no chain broke and no late corruption was found.
    pub passed: bool,
    /// Declared chains.
    pub chains_total: usize,
    /// Chains that arrived intact.
    pub chains_intact: usize,
    /// Chains that broke outright.
    pub chains_broken: usize,
    /// Chains that arrived degraded (defaulted or partial).
    pub chains_degraded: usize,
    /// `100 · intact / total`, or 100 with no chains declared.
    pub completeness_pct: f64,
    /// Reconciliation mismatches.
    pub discrepancies: Vec<RuntimeDiscrepancy>,
}

impl PostExecutionReport {
    /// Discrepancies of one kind.
    #[must_use]
    pub fn count_of(&self, kind: DiscrepancyKind) -> usize {
        self.discrepancies.iter().filter(|d| d.kind == kind).count()
    }
}

// ---------------------------------------------------------------------------
// Validator
// ---------------------------------------------------------------------------

/// Reconciles final context state against declared chains and recorded
/// boundary results.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostExecutionValidator;

impl PostExecutionValidator {
    /// Create a validator.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Run the reconciliation.
    ///
    /// `boundary_results` are the per-phase validation results the guard
    /// recorded during the run, in execution order.
    #[must_use]
    pub fn validate(
        &self,
        ctx: &WorkflowContext,
        contract: &PropagationContract,
        boundary_results: &[ContractValidationResult],
    ) -> PostExecutionReport {
        let tracker = PropagationTracker::new();
        let chain_results = tracker.check_all(ctx, contract);
        for result in &chain_results {
            ccx_propagation::log_chain_result(result);
        }

        let chains_total = chain_results.len();
        let chains_intact = chain_results
            .iter()
            .filter(|c| c.status == ChainStatus::Intact)
            .count();
        let chains_broken = chain_results
            .iter()
            .filter(|c| c.status == ChainStatus::Broken)
            .count();
        let chains_degraded = chains_total - chains_intact - chains_broken;
        let completeness_pct = if chains_total == 0 {
            100.0
        } else {
            100.0 * chains_intact as f64 / chains_total as f64
        };

        let mut discrepancies = Vec::new();

        // Late corruption: defaulted at a boundary, ends propagated, and
        // nothing recorded the upgrade.
        let defaulted_fields: BTreeSet<&str> = boundary_results
            .iter()
            .flat_map(|r| r.defaults_applied.iter().map(|d| d.field.as_str()))
            .collect();
        for field in defaulted_fields {
            let ends_propagated =
                ctx.envelope.status_of(field) == Some(PropagationStatus::Propagated);
            let recorded = !ctx.envelope.transformations_of(field).is_empty();
            if ends_propagated && !recorded {
                discrepancies.push(RuntimeDiscrepancy {
                    kind: DiscrepancyKind::LateCorruption,
                    chain_id: None,
                    field: field.to_string(),
                    detail: format!(
                        "'{field}' was defaulted at a boundary but ends the run \
                         propagated with no transformation recorded"
                    ),
                });
            }
        }

        // Late healing: a chain ends intact although one of its endpoint
        // phases failed its boundary mid-run.
        let failed_phases: BTreeSet<&str> = boundary_results
            .iter()
            .filter(|r| !r.passed)
            .map(|r| r.phase.as_str())
            .collect();
        for (chain, result) in contract.propagation_chains.iter().zip(&chain_results) {
            if result.status != ChainStatus::Intact {
                continue;
            }
            let touched_failed_phase = failed_phases.contains(chain.source.phase.as_str())
                || failed_phases.contains(chain.destination.phase.as_str());
            if touched_failed_phase {
                discrepancies.push(RuntimeDiscrepancy {
                    kind: DiscrepancyKind::LateHealing,
                    chain_id: Some(chain.chain_id.clone()),
                    field: chain.destination.field.clone(),
                    detail: format!(
                        "chain '{}' ends intact although a boundary of one of \
                         its phases failed mid-run",
                        chain.chain_id
                    ),
                });
            }
        }

        let has_late_corruption = discrepancies
            .iter()
            .any(|d| d.kind == DiscrepancyKind::LateCorruption);

        PostExecutionReport {
            passed: chains_broken == 0 && !has_late_corruption,
            chains_total,
            chains_intact,
            chains_broken,
            chains_degraded,
            completeness_pct,
            discrepancies,
        }
    }
}

// ---------------------------------------------------------------------------
// Emission
// ---------------------------------------------------------------------------

/// Emit the reconciliation report as a span event.
///
/// Event name: `context.postexec.report`.
pub fn emit_postexec_report(sink: &dyn EventSink, report: &PostExecutionReport) {
    let attrs = vec![
        attr("postexec.passed", report.passed),
        attr("postexec.chains_total", report.chains_total),
        attr("postexec.chains_intact", report.chains_intact),
        attr("postexec.chains_broken", report.chains_broken),
        attr("postexec.chains_degraded", report.chains_degraded),
        attr("postexec.completeness_pct", report.completeness_pct),
        attr("postexec.discrepancies", report.discrepancies.len()),
    ];

    if report.passed {
        debug!(
            intact = report.chains_intact,
            total = report.chains_total,
            "post-execution reconciliation passed"
        );
    } else {
        warn!(
            broken = report.chains_broken,
            discrepancies = report.discrepancies.len(),
            "post-execution reconciliation FAILED"
        );
    }

    sink.emit(event_names::CONTEXT_POSTEXEC_REPORT, &attrs);
}

/// Emit one discrepancy as a span event.
///
/// Event name: `context.postexec.discrepancy`.
pub fn emit_postexec_discrepancy(sink: &dyn EventSink, discrepancy: &RuntimeDiscrepancy) {
    let mut attrs = vec![
        attr("postexec.kind", discrepancy.kind.as_str()),
        attr("postexec.field", discrepancy.field.as_str()),
        attr("postexec.detail", discrepancy.detail.as_str()),
    ];
    if let Some(chain_id) = &discrepancy.chain_id {
        attrs.push(attr("postexec.chain_id", chain_id.as_str()));
    }

    warn!(
        kind = discrepancy.kind.as_str(),
        field = %discrepancy.field,
        detail = %discrepancy.detail,
        "runtime discrepancy"
    );

    sink.emit(event_names::CONTEXT_POSTEXEC_DISCREPANCY, &attrs);
}
