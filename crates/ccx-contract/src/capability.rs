// SPDX-License-Identifier: MIT OR Apache-2.0

//! Capability propagation contract — Layer 5.
//!
//! Declares the capability vocabulary, what each phase is granted, consumes,
//! and produces, the chains whose attenuation is checked, and the few
//! escalations that are explicitly authorised.

use crate::{ContractDocument, ContractKind};
use ccx_core::Severity;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Definitions
// ---------------------------------------------------------------------------

/// A capability the pipeline knows about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct CapabilityDefinition {
    /// Capability identifier (e.g. `write:artifacts`).
    pub id: String,
    /// Operations the capability permits.
    #[serde(default)]
    pub declared_operations: Vec<String>,
    /// Resources the capability reaches.
    #[serde(default)]
    pub declared_resources: Vec<String>,
    /// Whether the capability may be narrowed across phases.
    #[serde(default = "default_true")]
    pub attenuable: bool,
    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

fn default_true() -> bool {
    true
}

/// Capability movements declared for one phase.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct PhaseCapabilityContract {
    /// Capabilities the phase runs with.
    #[serde(default)]
    pub granted: Vec<String>,
    /// Capabilities the phase must hold to do its work.
    #[serde(default)]
    pub consumed: Vec<String>,
    /// Capabilities the phase mints for downstream phases.
    #[serde(default)]
    pub produced: Vec<String>,
}

/// A declared source → destination pair whose attenuation is checked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct CapabilityChainSpec {
    /// Unique chain identifier.
    pub chain_id: String,
    /// Source phase.
    pub source: String,
    /// Destination phase.
    pub destination: String,
    /// Severity when the chain is not intact.
    #[serde(default = "default_blocking")]
    pub severity: Severity,
}

fn default_blocking() -> Severity {
    Severity::Blocking
}

/// An explicitly authorised escalation path for one capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct AttenuationSpec {
    /// Capability id the escalation applies to.
    pub capability: String,
    /// Authority that may grant the escalation; absent means never.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub can_escalate_via: Option<String>,
}

// ---------------------------------------------------------------------------
// Root contract
// ---------------------------------------------------------------------------

/// Discriminator for capability contracts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityDiscriminator {
    /// The only accepted literal: `capability_propagation`.
    #[default]
    CapabilityPropagation,
}

/// Root model of a capability propagation contract YAML file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct CapabilityContract {
    /// Contract schema version.
    pub schema_version: String,
    /// Discriminator; wrong literals are rejected at parse time.
    #[serde(default)]
    pub contract_type: CapabilityDiscriminator,
    /// Pipeline this contract governs.
    pub pipeline_id: String,
    /// Known capability definitions.
    #[serde(default)]
    pub capabilities: Vec<CapabilityDefinition>,
    /// Phase name → capability movements.
    #[serde(default)]
    pub phases: BTreeMap<String, PhaseCapabilityContract>,
    /// Chains whose attenuation is checked.
    #[serde(default)]
    pub chains: Vec<CapabilityChainSpec>,
    /// Authorised escalation paths.
    #[serde(default)]
    pub attenuations: Vec<AttenuationSpec>,
    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ContractDocument for CapabilityContract {
    const KIND: ContractKind = ContractKind::CapabilityPropagation;

    fn schema_version(&self) -> &str {
        &self.schema_version
    }

    fn scope_id(&self) -> &str {
        &self.pipeline_id
    }
}

impl CapabilityContract {
    /// Movements declared for `phase`, if any.
    #[must_use]
    pub fn phase(&self, phase: &str) -> Option<&PhaseCapabilityContract> {
        self.phases.get(phase)
    }

    /// Escalation authority for `capability`, when one is declared.
    #[must_use]
    pub fn escalation_authority(&self, capability: &str) -> Option<&str> {
        self.attenuations
            .iter()
            .find(|a| a.capability == capability)
            .and_then(|a| a.can_escalate_via.as_deref())
    }
}
