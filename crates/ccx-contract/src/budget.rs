// SPDX-License-Identifier: MIT OR Apache-2.0

//! Budget propagation contract — Layer 6.
//!
//! Declares resource budgets (latency, cost, tokens, error rate) and how
//! each budget total is allocated across phases.

use crate::{ContractDocument, ContractKind};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// What a budget measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum BudgetKind {
    /// Wall-clock latency in milliseconds.
    LatencyMs,
    /// Spend in US dollars.
    CostUsd,
    /// Token count.
    Tokens,
    /// Error rate (0.0 – 1.0).
    ErrorRate,
}

impl BudgetKind {
    /// Stable lowercase string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LatencyMs => "latency_ms",
            Self::CostUsd => "cost_usd",
            Self::Tokens => "tokens",
            Self::ErrorRate => "error_rate",
        }
    }
}

/// Share of a budget reserved for one phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct PhaseAllocation {
    /// Phase name.
    pub phase: String,
    /// Amount reserved, in the budget's unit.
    pub amount: f64,
}

/// One declared budget with its per-phase allocations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct BudgetSpec {
    /// Unique budget identifier.
    pub id: String,
    /// What the budget measures.
    pub kind: BudgetKind,
    /// Total available for the run.
    pub total: f64,
    /// Per-phase reservations.
    #[serde(default)]
    pub allocations: Vec<PhaseAllocation>,
    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl BudgetSpec {
    /// Sum of the declared per-phase allocations.
    #[must_use]
    pub fn allocated_total(&self) -> f64 {
        self.allocations.iter().map(|a| a.amount).sum()
    }

    /// Allocation for `phase`, if declared.
    #[must_use]
    pub fn allocation_for(&self, phase: &str) -> Option<&PhaseAllocation> {
        self.allocations.iter().find(|a| a.phase == phase)
    }
}

/// Discriminator for budget contracts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum BudgetDiscriminator {
    /// The only accepted literal: `budget_propagation`.
    #[default]
    BudgetPropagation,
}

/// Root model of a budget propagation contract YAML file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct BudgetContract {
    /// Contract schema version.
    pub schema_version: String,
    /// Discriminator; wrong literals are rejected at parse time.
    #[serde(default)]
    pub contract_type: BudgetDiscriminator,
    /// Pipeline this contract governs.
    pub pipeline_id: String,
    /// Declared budgets.
    #[serde(default)]
    pub budgets: Vec<BudgetSpec>,
    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ContractDocument for BudgetContract {
    const KIND: ContractKind = ContractKind::BudgetPropagation;

    fn schema_version(&self) -> &str {
        &self.schema_version
    }

    fn scope_id(&self) -> &str {
        &self.pipeline_id
    }
}
