// SPDX-License-Identifier: MIT OR Apache-2.0
//! Budget tracking and health classification — Layer 6.
//!
//! Allocations are declared per phase in the budget contract; actuals are
//! accumulated on the envelope through [`BudgetTracker::consume`]. At check
//! time every allocation is classified: `within_budget` below 80 %,
//! `at_risk` at or above 80 %, `exhausted` at or above 100 %, and
//! `over_allocated` when the contract reserves more across phases than the
//! budget total — detected at check time, not at contract load.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use ccx_contract::{BudgetContract, BudgetSpec};
use ccx_core::{BudgetHealth, PropagationEnvelope, Severity, ValidationErrorEnvelope};
use ccx_error::ErrorCode;
use ccx_telemetry::{EventSink, attr, event_names};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Consumption ratio at which an allocation becomes `at_risk`.
pub const AT_RISK_RATIO: f64 = 0.8;

// ---------------------------------------------------------------------------
// Result models
// ---------------------------------------------------------------------------

/// Verdict for one `(budget, phase)` allocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetCheckResult {
    /// Budget identifier.
    pub budget_id: String,
    /// Phase the allocation belongs to.
    pub phase: String,
    /// Amount reserved for the phase.
    pub allocated: f64,
    /// Amount consumed so far.
    pub consumed: f64,
    /// Amount left (never negative).
    pub remaining: f64,
    /// Health classification.
    pub health: BudgetHealth,
    /// Human-readable detail.
    pub message: String,
}

/// Roll-up over every allocation of every budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetSummaryResult {
    /// Number of budgets checked.
    pub total_budgets: usize,
    /// `true` iff nothing is exhausted or over-allocated.
    pub passed: bool,
    /// Allocations at or past 100 %.
    pub exhausted_count: usize,
    /// Budgets whose allocations exceed their total.
    pub over_allocated_count: usize,
}

// ---------------------------------------------------------------------------
// Tracker
// ---------------------------------------------------------------------------

/// Accumulates consumption on the envelope and classifies allocations.
#[derive(Debug, Clone, Copy, Default)]
pub struct BudgetTracker;

impl BudgetTracker {
    /// Create a tracker.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Record `amount` of consumption for `(budget_id, phase)`.
    ///
    /// Consumption is monotonic: negative amounts are clamped to zero.
    /// Returns the new consumed total for the pair.
    pub fn consume(
        &self,
        env: &mut PropagationEnvelope,
        budget_id: &str,
        phase: &str,
        amount: f64,
    ) -> f64 {
        env.consume_budget(budget_id, phase, amount)
    }

    /// Classify one budget's allocations against recorded consumption.
    #[must_use]
    pub fn check_budget(
        &self,
        env: &PropagationEnvelope,
        budget: &BudgetSpec,
    ) -> Vec<BudgetCheckResult> {
        let over_allocated = budget.allocated_total() > budget.total;

        budget
            .allocations
            .iter()
            .map(|allocation| {
                let consumed = env.consumed(&budget.id, &allocation.phase);
                let remaining = (allocation.amount - consumed).max(0.0);
                let ratio = if allocation.amount > 0.0 {
                    consumed / allocation.amount
                } else if consumed > 0.0 {
                    f64::INFINITY
                } else {
                    0.0
                };

                let health = if over_allocated {
                    BudgetHealth::OverAllocated
                } else if ratio >= 1.0 {
                    BudgetHealth::Exhausted
                } else if ratio >= AT_RISK_RATIO {
                    BudgetHealth::AtRisk
                } else {
                    BudgetHealth::WithinBudget
                };

                let message = match health {
                    BudgetHealth::OverAllocated => format!(
                        "budget '{}' reserves {} across phases against a total of {}",
                        budget.id,
                        budget.allocated_total(),
                        budget.total
                    ),
                    BudgetHealth::Exhausted => format!(
                        "phase '{}' consumed {consumed} of {} ({:.0}%)",
                        allocation.phase,
                        allocation.amount,
                        ratio * 100.0
                    ),
                    BudgetHealth::AtRisk => format!(
                        "phase '{}' at {:.0}% of its allocation",
                        allocation.phase,
                        ratio * 100.0
                    ),
                    BudgetHealth::WithinBudget => format!(
                        "phase '{}' within budget ({consumed}/{})",
                        allocation.phase, allocation.amount
                    ),
                };

                BudgetCheckResult {
                    budget_id: budget.id.clone(),
                    phase: allocation.phase.clone(),
                    allocated: allocation.amount,
                    consumed,
                    remaining,
                    health,
                    message,
                }
            })
            .collect()
    }

    /// Classify every budget in the contract and roll up a summary.
    #[must_use]
    pub fn check_all(
        &self,
        env: &PropagationEnvelope,
        contract: &BudgetContract,
    ) -> (Vec<BudgetCheckResult>, BudgetSummaryResult) {
        let mut checks = Vec::new();
        let mut over_allocated_count = 0;
        for budget in &contract.budgets {
            if budget.allocated_total() > budget.total {
                over_allocated_count += 1;
            }
            checks.extend(self.check_budget(env, budget));
        }

        let exhausted_count = checks
            .iter()
            .filter(|c| c.health == BudgetHealth::Exhausted)
            .count();

        let summary = BudgetSummaryResult {
            total_budgets: contract.budgets.len(),
            passed: exhausted_count == 0 && over_allocated_count == 0,
            exhausted_count,
            over_allocated_count,
        };
        (checks, summary)
    }
}

/// Structured error envelopes for unhealthy checks.
#[must_use]
pub fn envelopes(checks: &[BudgetCheckResult]) -> Vec<ValidationErrorEnvelope> {
    let contract_type = ccx_contract::ContractKind::BudgetPropagation.as_str();
    checks
        .iter()
        .filter_map(|check| match check.health {
            BudgetHealth::WithinBudget | BudgetHealth::AtRisk => None,
            BudgetHealth::Exhausted => Some(ValidationErrorEnvelope::new(
                contract_type,
                format!("{}/{}", check.budget_id, check.phase),
                ErrorCode::Exhausted,
                &check.message,
                Severity::Blocking,
            )),
            BudgetHealth::OverAllocated => Some(ValidationErrorEnvelope::new(
                contract_type,
                format!("{}/{}", check.budget_id, check.phase),
                ErrorCode::OverAllocated,
                &check.message,
                Severity::Warning,
            )),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Emission
// ---------------------------------------------------------------------------

/// Emit one allocation check as a span event.
///
/// Event name: `budget.check.{health}`.
pub fn emit_budget_check(sink: &dyn EventSink, result: &BudgetCheckResult) {
    let name = event_names::budget_check(result.health.as_str());
    let attrs = vec![
        attr("budget.id", result.budget_id.as_str()),
        attr("budget.phase", result.phase.as_str()),
        attr("budget.health", result.health.as_str()),
        attr("budget.allocated", result.allocated),
        attr("budget.consumed", result.consumed),
        attr("budget.remaining", result.remaining),
        attr("budget.message", result.message.as_str()),
    ];

    if result.health == BudgetHealth::WithinBudget {
        debug!(
            budget = %result.budget_id,
            phase = %result.phase,
            "budget check within budget"
        );
    } else {
        warn!(
            budget = %result.budget_id,
            phase = %result.phase,
            health = result.health.as_str(),
            consumed = result.consumed,
            allocated = result.allocated,
            "budget check unhealthy"
        );
    }

    sink.emit(&name, &attrs);
}

/// Emit the budget roll-up as a span event.
///
/// Event name: `budget.summary`.
pub fn emit_budget_summary(sink: &dyn EventSink, result: &BudgetSummaryResult) {
    let attrs = vec![
        attr("budget.total_budgets", result.total_budgets),
        attr("budget.passed", result.passed),
        attr("budget.exhausted_count", result.exhausted_count),
        attr("budget.over_allocated_count", result.over_allocated_count),
    ];

    if result.passed {
        info!(budgets = result.total_budgets, "budget summary: all healthy");
    } else {
        warn!(
            budgets = result.total_budgets,
            exhausted = result.exhausted_count,
            over_allocated = result.over_allocated_count,
            "budget summary: unhealthy"
        );
    }

    sink.emit(event_names::BUDGET_SUMMARY, &attrs);
}
