// SPDX-License-Identifier: MIT OR Apache-2.0

//! The runtime boundary guard.

use ccx_budget::{BudgetCheckResult, BudgetSummaryResult, BudgetTracker};
use ccx_capability::{CapabilityChainResult, CapabilityValidationResult, CapabilityValidator};
use ccx_compat::{CompatibilityChecker, CompatibilityResult, EvolutionCheckResult, EvolutionTracker};
use ccx_contract::{
    BudgetContract, CapabilityContract, CompatibilityContract, ConventionContract,
    LineageContract, OrderingContract, PropagationContract,
};
use ccx_core::{
    Direction, EnforcementMode, PropagationStatus, ValidationErrorEnvelope, WorkflowContext,
    first_blocking,
};
use ccx_lineage::{LineageAuditSummary, ProvenanceAuditor};
use ccx_observability::{
    AlertEvaluationResult, AlertEvaluator, BoundaryStats, HealthScore, HealthScorer, metric_set,
};
use ccx_ordering::{CausalValidator, OrderingValidationResult};
use ccx_postexec::{PostExecutionReport, PostExecutionValidator};
use ccx_preflight::{PreflightChecker, PreflightResult};
use ccx_propagation::{BoundaryValidator, ContractValidationResult};
use ccx_semconv::{ConventionValidationResult, ConventionValidator};
use ccx_telemetry::{EventSink, NoopSink, attr, event_names};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A strict-mode boundary rejection.
///
/// Carries the phase, the direction, and the first three blocking
/// envelopes so logs stay readable on wide failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("boundary {direction} of phase '{phase}' blocked: {}", summarise(.envelopes))]
pub struct BoundaryViolationError {
    /// Phase that was rejected.
    pub phase: String,
    /// Which side of the boundary.
    pub direction: Direction,
    /// Up to three blocking envelopes.
    pub envelopes: Vec<ValidationErrorEnvelope>,
}

fn summarise(envelopes: &[ValidationErrorEnvelope]) -> String {
    envelopes
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors the guard can return at a boundary.
#[derive(Debug, thiserror::Error)]
pub enum GuardError {
    /// The run was cancelled between phases.
    #[error("run cancelled before boundary of phase '{phase}'")]
    Cancelled {
        /// Phase whose boundary was about to run.
        phase: String,
    },

    /// A strict-mode blocking violation.
    #[error(transparent)]
    Violation(#[from] BoundaryViolationError),
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Static guard settings.
#[derive(Debug, Clone)]
pub struct GuardConfig {
    /// Pipeline the guard protects.
    pub pipeline_id: String,
    /// Enforcement mode.
    pub mode: EnforcementMode,
}

/// The contracts a guard runs with. Layers without a contract are
/// skipped entirely.
#[derive(Debug, Clone, Default)]
pub struct ContractSet {
    /// Layer 1 — propagation (also drives preflight and postexec).
    pub propagation: Option<Arc<PropagationContract>>,
    /// Layer 2 — schema compatibility.
    pub compatibility: Option<Arc<CompatibilityContract>>,
    /// Layer 3 — semantic conventions.
    pub conventions: Option<Arc<ConventionContract>>,
    /// Layer 5 — capability propagation.
    pub capability: Option<Arc<CapabilityContract>>,
    /// Layer 4 — causal ordering.
    pub ordering: Option<Arc<OrderingContract>>,
    /// Layer 6 — budgets.
    pub budget: Option<Arc<BudgetContract>>,
    /// Layer 7 — data lineage.
    pub lineage: Option<Arc<LineageContract>>,
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Everything one boundary invocation produced.
#[derive(Debug, Clone, Default)]
pub struct BoundaryReport {
    /// Propagation result, when a propagation contract is loaded.
    pub propagation: Option<ContractValidationResult>,
    /// Convention result, when a convention contract is loaded.
    pub convention: Option<ConventionValidationResult>,
    /// Compatibility results, one per declared mapping.
    pub compatibility: Vec<CompatibilityResult>,
    /// Schema evolution results, one per ruled version pair.
    pub evolution: Vec<EvolutionCheckResult>,
    /// Capability result, when a capability contract is loaded.
    pub capability: Option<CapabilityValidationResult>,
    /// Ordering result, when an ordering contract is loaded.
    pub ordering: Option<OrderingValidationResult>,
    /// Every blocking envelope across the layers.
    pub blocking_envelopes: Vec<ValidationErrorEnvelope>,
    /// `true` iff every layer passed.
    pub passed: bool,
}

/// Per-phase execution record accumulated by the guard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseExecutionRecord {
    /// Phase name.
    pub phase: String,
    /// Entry-side propagation result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry: Option<ContractValidationResult>,
    /// Exit-side propagation result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit: Option<ContractValidationResult>,
    /// Whether every boundary layer of the phase passed.
    pub passed: bool,
    /// Blocking failures across the phase's boundaries.
    pub blocking_failures: usize,
    /// Fields defaulted at this phase's entry.
    pub defaults_applied: Vec<String>,
    /// Logical timestamp of the entry boundary.
    pub started_ts: u64,
    /// Logical timestamp of the exit boundary, once exited.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_ts: Option<u64>,
}

/// Final fused verdict for one workflow run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRunSummary {
    /// Unique run identifier.
    pub run_id: Uuid,
    /// Pipeline the run belonged to.
    pub pipeline_id: String,
    /// Enforcement mode the run used.
    pub mode: EnforcementMode,
    /// Phases that entered.
    pub total_phases: usize,
    /// Phases whose boundaries all passed.
    pub passed_phases: usize,
    /// Phases with at least one failed boundary.
    pub failed_phases: usize,
    /// Blocking failures across all boundaries.
    pub total_blocking_failures: usize,
    /// Defaults applied across all boundaries.
    pub total_defaults_applied: usize,
    /// The single pass/fail verdict.
    pub overall_passed: bool,
    /// Coarse status of the run's context.
    pub overall_status: PropagationStatus,
    /// Fused health score.
    pub health: HealthScore,
    /// Alert evaluation outcome.
    pub alerts: AlertEvaluationResult,
    /// Post-execution reconciliation report.
    pub postexec: PostExecutionReport,
    /// Lineage audit, when a lineage contract is loaded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lineage_audit: Option<LineageAuditSummary>,
    /// Budget checks, when a budget contract is loaded.
    pub budget_checks: Vec<BudgetCheckResult>,
    /// Budget summary, when a budget contract is loaded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget_summary: Option<BudgetSummaryResult>,
    /// Capability chain results, when a capability contract is loaded.
    pub capability_chains: Vec<CapabilityChainResult>,
    /// Per-phase records in execution order.
    pub records: Vec<PhaseExecutionRecord>,
}

// ---------------------------------------------------------------------------
// Guard
// ---------------------------------------------------------------------------

/// Wraps the validation layers around phase boundaries.
///
/// The guard is driven synchronously by the workflow engine: entry-check,
/// phase body (owned by the engine), exit-check, and a final
/// [`finish_run`](Self::finish_run). One guard serves one run.
pub struct RuntimeBoundaryGuard {
    config: GuardConfig,
    contracts: ContractSet,
    sink: Arc<dyn EventSink>,
    run_id: Uuid,
    validator: BoundaryValidator,
    records: Vec<PhaseExecutionRecord>,
    boundary_results: Vec<ContractValidationResult>,
    preflight_result: Option<PreflightResult>,
    previous_phase: Option<String>,
    compat_checked: bool,
    cancelled: bool,
}

impl std::fmt::Debug for RuntimeBoundaryGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeBoundaryGuard")
            .field("pipeline_id", &self.config.pipeline_id)
            .field("mode", &self.config.mode)
            .field("run_id", &self.run_id)
            .field("phases", &self.records.len())
            .finish()
    }
}

impl RuntimeBoundaryGuard {
    /// Create a guard with a no-op event sink.
    #[must_use]
    pub fn new(config: GuardConfig, contracts: ContractSet) -> Self {
        Self {
            config,
            contracts,
            sink: Arc::new(NoopSink),
            run_id: Uuid::new_v4(),
            validator: BoundaryValidator::new(),
            records: Vec::new(),
            boundary_results: Vec::new(),
            preflight_result: None,
            previous_phase: None,
            compat_checked: false,
            cancelled: false,
        }
    }

    /// Replace the event sink.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Replace the boundary validator (e.g. to register quality policies).
    #[must_use]
    pub fn with_validator(mut self, validator: BoundaryValidator) -> Self {
        self.validator = validator;
        self
    }

    /// This run's identifier.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Request cancellation; honoured at the next boundary.
    pub fn cancel(&mut self) {
        self.cancelled = true;
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Run the static preflight checks against the seed context.
    ///
    /// A no-op returning a trivially-passing result when no propagation
    /// contract is loaded.
    pub fn preflight(&mut self, ctx: &WorkflowContext) -> &PreflightResult {
        let result = match &self.contracts.propagation {
            None => PreflightResult {
                passed: true,
                phases_checked: 0,
                fields_checked: 0,
                violations: Vec::new(),
                graph_issues: Vec::new(),
                readiness: Vec::new(),
            },
            Some(contract) => {
                let checker = PreflightChecker::new();
                let result = checker.check(contract, &ctx.fields);
                ccx_preflight::emit_preflight_result(self.sink.as_ref(), &result);
                for violation in &result.violations {
                    ccx_preflight::emit_preflight_violation(self.sink.as_ref(), violation);
                }
                result
            }
        };
        self.preflight_result = Some(result);
        self.preflight_result.as_ref().expect("just stored")
    }

    /// Run the entry-side layers for `phase`.
    ///
    /// # Errors
    ///
    /// [`GuardError::Cancelled`] when cancellation was requested, and in
    /// strict mode [`GuardError::Violation`] on any blocking failure.
    pub fn enter_phase(
        &mut self,
        ctx: &mut WorkflowContext,
        phase: &str,
    ) -> Result<BoundaryReport, GuardError> {
        self.check_cancelled(phase)?;
        let started_ts = ctx.envelope.record_event(phase, "boundary.entry", vec![]);

        let mut report = BoundaryReport {
            passed: true,
            ..BoundaryReport::default()
        };

        // Layer order is load-bearing: capability must precede propagation
        // so snapshots are current when field ownership is decided.
        if let Some(contract) = &self.contracts.conventions {
            let attributes: BTreeMap<String, Value> = ctx
                .fields
                .iter()
                .filter(|(_, v)| !v.is_array() && !v.is_object())
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            let result = ConventionValidator::new().validate(contract, &attributes);
            ccx_semconv::emit_convention_result(self.sink.as_ref(), &result);
            report.passed &= result.passed;
            report
                .blocking_envelopes
                .extend(result.envelopes().into_iter().filter(|e| e.is_blocking()));
            report.convention = Some(result);
        }

        // The compatibility contract is context-independent: check it once
        // per run so its violations are not counted at every boundary.
        if let Some(contract) = &self.contracts.compatibility
            && !self.compat_checked
        {
            let results = CompatibilityChecker::new().check_all(contract);
            for result in &results {
                ccx_compat::emit_compatibility_check(self.sink.as_ref(), result);
                for drift in &result.drift_details {
                    ccx_compat::emit_compatibility_drift(self.sink.as_ref(), result, drift);
                }
                report.passed &= result.compatible;
                report
                    .blocking_envelopes
                    .extend(result.envelopes().into_iter().filter(|e| e.is_blocking()));
            }
            report.compatibility = results;

            let evolution = EvolutionTracker::new().check_contract(contract);
            for check in &evolution {
                for change in &check.breaking_changes {
                    ccx_compat::emit_compatibility_breaking(self.sink.as_ref(), check, change);
                }
                if !check.passed {
                    report.passed = false;
                    report.blocking_envelopes.push(ValidationErrorEnvelope::new(
                        ccx_contract::ContractKind::SchemaCompatibility.as_str(),
                        format!("{}@{}", check.service, check.to_version),
                        ccx_error::ErrorCode::Unmapped,
                        format!(
                            "schema evolution from {} to {} violates the {} policy",
                            check.from_version,
                            check.to_version,
                            check.policy.as_str()
                        ),
                        ccx_core::Severity::Blocking,
                    ));
                }
            }
            report.evolution = evolution;
            self.compat_checked = true;
        }

        if let Some(contract) = &self.contracts.capability {
            let result = CapabilityValidator::new().enter_boundary(
                &mut ctx.envelope,
                contract,
                phase,
                self.previous_phase.as_deref(),
            );
            ccx_capability::emit_capability_result(self.sink.as_ref(), &result);
            report.passed &= result.passed;
            report.blocking_envelopes.extend(result.envelopes());
            report.capability = Some(result);
        }

        if let Some(contract) = &self.contracts.ordering {
            let result = CausalValidator::new().validate(&ctx.envelope.event_log, contract);
            ccx_ordering::emit_ordering_result(self.sink.as_ref(), &result);
            for check in &result.results {
                if !check.satisfied {
                    ccx_ordering::emit_ordering_violation(self.sink.as_ref(), check);
                }
            }
            report.passed &= result.passed;
            report
                .blocking_envelopes
                .extend(result.envelopes().into_iter().filter(|e| e.is_blocking()));
            report.ordering = Some(result);
        }

        let mut defaults_applied = Vec::new();
        if let Some(contract) = &self.contracts.propagation {
            let result = self
                .validator
                .validate(ctx, phase, Direction::Entry, contract);
            if self.config.mode != EnforcementMode::Audit {
                for default in &result.defaults_applied {
                    ctx.insert(default.field.clone(), default.value.clone());
                    ctx.envelope.apply_default(&default.field, phase);
                }
            }
            defaults_applied = result
                .defaults_applied
                .iter()
                .map(|d| d.field.clone())
                .collect();
            ccx_propagation::log_boundary_result(&result);
            report.passed &= result.passed;
            report
                .blocking_envelopes
                .extend(result.envelopes().into_iter().filter(|e| e.is_blocking()));
            self.boundary_results.push(result.clone());
            report.propagation = Some(result);
        }

        self.records.push(PhaseExecutionRecord {
            phase: phase.to_string(),
            entry: report.propagation.clone(),
            exit: None,
            passed: report.passed,
            blocking_failures: report.blocking_envelopes.len(),
            defaults_applied,
            started_ts,
            finished_ts: None,
        });

        self.finish_boundary(phase, Direction::Entry, report)
    }

    /// Run the exit-side layers for `phase`.
    ///
    /// # Errors
    ///
    /// [`GuardError::Cancelled`] when cancellation was requested, and in
    /// strict mode [`GuardError::Violation`] on any blocking failure.
    pub fn exit_phase(
        &mut self,
        ctx: &mut WorkflowContext,
        phase: &str,
    ) -> Result<BoundaryReport, GuardError> {
        self.check_cancelled(phase)?;

        let mut report = BoundaryReport {
            passed: true,
            ..BoundaryReport::default()
        };

        if let Some(contract) = &self.contracts.propagation {
            let result = self
                .validator
                .validate(ctx, phase, Direction::Exit, contract);
            ccx_propagation::log_boundary_result(&result);
            report.passed &= result.passed;
            report
                .blocking_envelopes
                .extend(result.envelopes().into_iter().filter(|e| e.is_blocking()));
            self.boundary_results.push(result.clone());
            report.propagation = Some(result);
        }

        if let Some(contract) = &self.contracts.capability {
            let result =
                CapabilityValidator::new().exit_boundary(&ctx.envelope, contract, phase);
            ccx_capability::emit_capability_result(self.sink.as_ref(), &result);
            report.passed &= result.passed;
            report.blocking_envelopes.extend(result.envelopes());
            report.capability = Some(result);
        }

        let finished_ts = ctx.envelope.record_event(phase, "boundary.exit", vec![]);
        if let Some(record) = self.records.iter_mut().rev().find(|r| r.phase == phase) {
            record.exit = report.propagation.clone();
            record.passed &= report.passed;
            record.blocking_failures += report.blocking_envelopes.len();
            record.finished_ts = Some(finished_ts);
        }
        self.previous_phase = Some(phase.to_string());

        self.finish_boundary(phase, Direction::Exit, report)
    }

    /// Common tail of both boundaries: emit, then enforce the mode.
    fn finish_boundary(
        &self,
        phase: &str,
        direction: Direction,
        report: BoundaryReport,
    ) -> Result<BoundaryReport, GuardError> {
        let name = match direction {
            Direction::Entry => event_names::CONTEXT_BOUNDARY_ENTRY,
            Direction::Exit => event_names::CONTEXT_BOUNDARY_EXIT,
        };
        self.sink.emit(
            name,
            &[
                attr("guard.phase", phase),
                attr("guard.direction", direction.as_str()),
                attr("guard.mode", self.config.mode.as_str()),
                attr("guard.passed", report.passed),
                attr(
                    "guard.blocking_count",
                    report.blocking_envelopes.len(),
                ),
            ],
        );

        if report.passed {
            debug!(phase, direction = direction.as_str(), "boundary passed");
            return Ok(report);
        }

        match self.config.mode {
            EnforcementMode::Strict => Err(BoundaryViolationError {
                phase: phase.to_string(),
                direction,
                envelopes: first_blocking(&report.blocking_envelopes, 3),
            }
            .into()),
            EnforcementMode::Permissive => {
                warn!(
                    phase,
                    direction = direction.as_str(),
                    blocking = report.blocking_envelopes.len(),
                    "boundary failed; continuing in permissive mode"
                );
                Ok(report)
            }
            EnforcementMode::Audit => Ok(report),
        }
    }

    fn check_cancelled(&self, phase: &str) -> Result<(), GuardError> {
        if self.cancelled {
            return Err(GuardError::Cancelled {
                phase: phase.to_string(),
            });
        }
        Ok(())
    }

    /// Close the run: reconcile, audit, score, alert, and summarise.
    pub fn finish_run(&mut self, ctx: &WorkflowContext) -> WorkflowRunSummary {
        let postexec = match &self.contracts.propagation {
            Some(contract) => {
                let report = PostExecutionValidator::new().validate(
                    ctx,
                    contract,
                    &self.boundary_results,
                );
                ccx_postexec::emit_postexec_report(self.sink.as_ref(), &report);
                for discrepancy in &report.discrepancies {
                    ccx_postexec::emit_postexec_discrepancy(self.sink.as_ref(), discrepancy);
                }
                report
            }
            None => PostExecutionReport {
                passed: true,
                chains_total: 0,
                chains_intact: 0,
                chains_broken: 0,
                chains_degraded: 0,
                completeness_pct: 100.0,
                discrepancies: Vec::new(),
            },
        };

        let lineage_audit = self.contracts.lineage.as_ref().map(|contract| {
            let summary = ProvenanceAuditor::new().audit(&ctx.envelope, contract);
            for result in &summary.results {
                ccx_lineage::emit_audit_result(self.sink.as_ref(), result);
            }
            ccx_lineage::emit_audit_summary(self.sink.as_ref(), &summary);
            summary
        });

        let (budget_checks, budget_summary) = match &self.contracts.budget {
            Some(contract) => {
                let (checks, summary) = BudgetTracker::new().check_all(&ctx.envelope, contract);
                for check in &checks {
                    ccx_budget::emit_budget_check(self.sink.as_ref(), check);
                }
                ccx_budget::emit_budget_summary(self.sink.as_ref(), &summary);
                (checks, Some(summary))
            }
            None => (Vec::new(), None),
        };

        let capability_chains = match &self.contracts.capability {
            Some(contract) => {
                let chains = CapabilityValidator::new().check_all(&ctx.envelope, contract);
                for chain in &chains {
                    ccx_capability::emit_capability_chain_result(self.sink.as_ref(), chain);
                }
                chains
            }
            None => Vec::new(),
        };

        let preflight = self.preflight_result.take().unwrap_or(PreflightResult {
            passed: true,
            phases_checked: 0,
            fields_checked: 0,
            violations: Vec::new(),
            graph_issues: Vec::new(),
            readiness: Vec::new(),
        });

        let total_phases = self.records.len();
        let passed_phases = self.records.iter().filter(|r| r.passed).count();
        let total_blocking_failures: usize =
            self.records.iter().map(|r| r.blocking_failures).sum();
        let total_defaults_applied: usize =
            self.records.iter().map(|r| r.defaults_applied.len()).sum();

        let boundary_stats = BoundaryStats {
            total_phases,
            passed_phases,
            blocking_failures: total_blocking_failures,
        };
        let health = HealthScorer::new().score(&preflight, &boundary_stats, &postexec);
        ccx_observability::emit_health_score(self.sink.as_ref(), &health);

        let mut metrics = metric_set(&preflight, &boundary_stats, &postexec, &health);
        if let Some(audit) = &lineage_audit {
            metrics.insert(
                "lineage_unverified_count".to_string(),
                (audit.chains_total - audit.verified_count) as f64,
            );
        }
        let alerts = AlertEvaluator::new().evaluate(&metrics);
        for event in &alerts.events {
            if event.firing {
                ccx_observability::emit_alert_event(self.sink.as_ref(), event);
            }
        }
        ccx_observability::emit_alert_evaluation(self.sink.as_ref(), &alerts);

        let overall_passed = total_blocking_failures == 0
            && preflight.passed
            && postexec.passed
            && lineage_audit.as_ref().is_none_or(|a| a.passed)
            && budget_summary.as_ref().is_none_or(|s| s.passed);
        let overall_status = if !overall_passed {
            PropagationStatus::Failed
        } else if total_defaults_applied > 0 {
            PropagationStatus::Defaulted
        } else if postexec.chains_degraded > 0 {
            PropagationStatus::Partial
        } else {
            PropagationStatus::Propagated
        };

        let summary = WorkflowRunSummary {
            run_id: self.run_id,
            pipeline_id: self.config.pipeline_id.clone(),
            mode: self.config.mode,
            total_phases,
            passed_phases,
            failed_phases: total_phases - passed_phases,
            total_blocking_failures,
            total_defaults_applied,
            overall_passed,
            overall_status,
            health,
            alerts,
            postexec,
            lineage_audit,
            budget_checks,
            budget_summary,
            capability_chains,
            records: std::mem::take(&mut self.records),
        };

        self.sink.emit(
            event_names::CONTEXT_WORKFLOW_SUMMARY,
            &[
                attr("workflow.run_id", summary.run_id.to_string()),
                attr("workflow.pipeline_id", summary.pipeline_id.as_str()),
                attr("workflow.mode", summary.mode.as_str()),
                attr("workflow.total_phases", summary.total_phases),
                attr("workflow.passed_phases", summary.passed_phases),
                attr(
                    "workflow.blocking_failures",
                    summary.total_blocking_failures,
                ),
                attr("workflow.overall_passed", summary.overall_passed),
                attr(
                    "workflow.overall_status",
                    summary.overall_status.as_str(),
                ),
                attr("workflow.health_overall", summary.health.overall),
                attr("workflow.alerts_firing", summary.alerts.alerts_firing),
            ],
        );

        summary
    }
}
