// SPDX-License-Identifier: MIT OR Apache-2.0

//! Data lineage contract — Layer 7.
//!
//! Declares transformation chains: the exact sequence of operations each
//! tracked field undergoes as it flows through pipeline phases. The auditor
//! verifies recorded transformations against these chains.

use crate::{ContractDocument, ContractKind};
use ccx_core::TransformOp;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A single declared transformation stage within a lineage chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct StageSpec {
    /// Pipeline phase name.
    pub phase: String,
    /// Transformation applied in this stage.
    pub operation: TransformOp,
    /// What this stage does.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// The full declared transformation chain for a single field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct LineageChainSpec {
    /// Unique chain identifier.
    pub chain_id: String,
    /// Dot-path field name being tracked.
    pub field: String,
    /// Ordered sequence of declared stages.
    pub stages: Vec<StageSpec>,
    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Discriminator for lineage contracts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum LineageDiscriminator {
    /// The only accepted literal: `data_lineage`.
    #[default]
    DataLineage,
}

/// Root model of a data lineage contract YAML file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct LineageContract {
    /// Contract schema version.
    pub schema_version: String,
    /// Discriminator; wrong literals are rejected at parse time.
    #[serde(default)]
    pub contract_type: LineageDiscriminator,
    /// Pipeline this contract governs.
    pub pipeline_id: String,
    /// Declared transformation chains for tracked fields.
    #[serde(default)]
    pub chains: Vec<LineageChainSpec>,
    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ContractDocument for LineageContract {
    const KIND: ContractKind = ContractKind::DataLineage;

    fn schema_version(&self) -> &str {
        &self.schema_version
    }

    fn scope_id(&self) -> &str {
        &self.pipeline_id
    }
}
