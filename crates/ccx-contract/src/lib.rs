// SPDX-License-Identifier: MIT OR Apache-2.0
//! Declarative contract models and the memoising YAML loader.
//!
//! Each of the seven validation layers has its own root schema, all sharing
//! the same conventions: a `schema_version` string, a `contract_type`
//! discriminator, a `pipeline_id` (or `namespace`) binding, and unknown keys
//! rejected at every level. Contracts are immutable once loaded; the loader
//! caches per absolute path and is only cleared explicitly.

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Budget propagation contract (Layer 6).
pub mod budget;
/// Capability propagation contract (Layer 5).
pub mod capability;
/// Schema compatibility contract (Layer 2).
pub mod compat;
/// Data lineage contract (Layer 7).
pub mod lineage;
/// Memoising YAML loader.
pub mod loader;
/// Causal ordering contract (Layer 4).
pub mod ordering;
/// Context propagation contract (Layer 1).
pub mod propagation;
/// Semantic convention contract (Layer 3).
pub mod semconv;

pub use budget::{BudgetContract, BudgetKind, BudgetSpec, PhaseAllocation};
pub use capability::{
    AttenuationSpec, CapabilityChainSpec, CapabilityContract, CapabilityDefinition,
    PhaseCapabilityContract,
};
pub use compat::{CompatibilityContract, EvolutionPolicy, EvolutionRule, FieldMapping, SchemaVersion};
pub use lineage::{LineageChainSpec, LineageContract, StageSpec};
pub use loader::{ContractLoader, LoadError, MAX_CONTRACT_BYTES};
pub use ordering::{CausalDependency, CausalEndpoint, OrderingContract};
pub use propagation::{
    ChainEndpoint, EvaluationSpec, FieldSpec, PhaseContract, PhaseEntrySpec, PhaseExitSpec,
    PropagationChainSpec, PropagationContract, QualitySpec,
};
pub use semconv::{AttributeConvention, ConventionContract, EnumConvention, RequirementLevel};

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;

// ---------------------------------------------------------------------------
// ContractKind
// ---------------------------------------------------------------------------

/// The seven contract type discriminators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractKind {
    /// Layer 1 — field propagation across phase boundaries.
    ContextPropagation,
    /// Layer 2 — cross-service schema compatibility.
    SchemaCompatibility,
    /// Layer 3 — semantic naming conventions.
    SemanticConventions,
    /// Layer 5 — capability attenuation.
    CapabilityPropagation,
    /// Layer 4 — happens-before ordering.
    CausalOrdering,
    /// Layer 6 — per-phase resource budgets.
    BudgetPropagation,
    /// Layer 7 — per-field transformation lineage.
    DataLineage,
}

impl ContractKind {
    /// The YAML discriminator literal.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ContextPropagation => "context_propagation",
            Self::SchemaCompatibility => "schema_compatibility",
            Self::SemanticConventions => "semantic_conventions",
            Self::CapabilityPropagation => "capability_propagation",
            Self::CausalOrdering => "causal_ordering",
            Self::BudgetPropagation => "budget_propagation",
            Self::DataLineage => "data_lineage",
        }
    }
}

impl fmt::Display for ContractKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ContractDocument
// ---------------------------------------------------------------------------

/// A loadable root contract model.
///
/// Implemented by the seven contract roots; the [`ContractLoader`] is generic
/// over this trait.
pub trait ContractDocument: DeserializeOwned + Serialize + Send + Sync + 'static {
    /// The discriminator this document type answers to.
    const KIND: ContractKind;

    /// Declared schema version string.
    fn schema_version(&self) -> &str;

    /// The `pipeline_id` (or `namespace`, for conventions) binding.
    fn scope_id(&self) -> &str;

    /// Semantic checks serde cannot express (non-empty ids, and similar).
    ///
    /// Returns a list of problems; an empty list means the document is
    /// well-formed.
    fn integrity_problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.schema_version().is_empty() {
            problems.push("schema_version must be non-empty".to_string());
        }
        if self.scope_id().is_empty() {
            problems.push("pipeline binding must be non-empty".to_string());
        }
        problems
    }
}
