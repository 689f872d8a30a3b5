// SPDX-License-Identifier: MIT OR Apache-2.0

//! Schema compatibility contract — Layer 2.
//!
//! Declares field/value mappings between services and the evolution policy
//! each service's schema must follow across versions.

use crate::{ContractDocument, ContractKind};
use ccx_core::{Severity, TypeTag};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Field mappings
// ---------------------------------------------------------------------------

/// A declared value mapping between a source and a target service field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct FieldMapping {
    /// Service the values originate from.
    pub source_service: String,
    /// Dot-path field on the source side.
    pub source_field: String,
    /// Values the source may emit.
    #[serde(default)]
    pub source_values: Vec<String>,
    /// Service the values flow into.
    pub target_service: String,
    /// Dot-path field on the target side.
    pub target_field: String,
    /// Values the target accepts; empty means unchecked.
    #[serde(default)]
    pub target_values: Vec<String>,
    /// Source value → target value translation table.
    #[serde(default)]
    pub mapping: BTreeMap<String, String>,
    /// Severity of mapping drift.
    #[serde(default = "default_blocking")]
    pub severity: Severity,
    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

fn default_blocking() -> Severity {
    Severity::Blocking
}

// ---------------------------------------------------------------------------
// Evolution rules
// ---------------------------------------------------------------------------

/// How a service schema may change between versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum EvolutionPolicy {
    /// Only additions are allowed; any breaking change fails.
    AdditiveOnly,
    /// Breaking changes are tolerated (reported, never failed).
    BreakingAllowed,
    /// Breaking changes require a major version increment.
    MajorVersionRequired,
}

impl EvolutionPolicy {
    /// Stable lowercase string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AdditiveOnly => "additive_only",
            Self::BreakingAllowed => "breaking_allowed",
            Self::MajorVersionRequired => "major_version_required",
        }
    }
}

/// An evolution policy bound to a service scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct EvolutionRule {
    /// Unique rule identifier.
    pub rule_id: String,
    /// Service name this rule governs.
    pub scope: String,
    /// Allowed kind of change.
    pub policy: EvolutionPolicy,
    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A snapshot of one service schema at one version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct SchemaVersion {
    /// Service name.
    pub service: String,
    /// Version string (semver expected for `major_version_required`).
    pub version: String,
    /// Field name → coarse type tag.
    #[serde(default)]
    pub fields: BTreeMap<String, TypeTag>,
    /// Field name → closed value set, for enum-carrying fields.
    #[serde(default)]
    pub value_sets: BTreeMap<String, Vec<String>>,
}

// ---------------------------------------------------------------------------
// Root contract
// ---------------------------------------------------------------------------

/// Discriminator for compatibility contracts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CompatDiscriminator {
    /// The only accepted literal: `schema_compatibility`.
    #[default]
    SchemaCompatibility,
}

/// Root model of a schema compatibility contract YAML file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct CompatibilityContract {
    /// Contract schema version.
    pub schema_version: String,
    /// Discriminator; wrong literals are rejected at parse time.
    #[serde(default)]
    pub contract_type: CompatDiscriminator,
    /// Pipeline this contract governs.
    pub pipeline_id: String,
    /// Declared field/value mappings.
    #[serde(default)]
    pub mappings: Vec<FieldMapping>,
    /// Evolution policies per service.
    #[serde(default)]
    pub evolution_rules: Vec<EvolutionRule>,
    /// Known schema versions, oldest first per service.
    #[serde(default)]
    pub versions: Vec<SchemaVersion>,
    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ContractDocument for CompatibilityContract {
    const KIND: ContractKind = ContractKind::SchemaCompatibility;

    fn schema_version(&self) -> &str {
        &self.schema_version
    }

    fn scope_id(&self) -> &str {
        &self.pipeline_id
    }
}

impl CompatibilityContract {
    /// Versions declared for `service`, in declaration order.
    #[must_use]
    pub fn versions_of(&self, service: &str) -> Vec<&SchemaVersion> {
        self.versions
            .iter()
            .filter(|v| v.service == service)
            .collect()
    }

    /// The evolution rule scoped to `service`, if declared.
    #[must_use]
    pub fn rule_for(&self, service: &str) -> Option<&EvolutionRule> {
        self.evolution_rules.iter().find(|r| r.scope == service)
    }
}

// ===========================================================================
// Tests
// ===========================================================================
#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = "\
schema_version: \"0.1.0\"
contract_type: schema_compatibility
pipeline_id: cross-service
description: Cross-service schema compat
mappings:
  - source_service: tracker
    source_field: task.status
    source_values: [todo, in_progress, done]
    target_service: exporter
    target_field: status
    target_values: [pending, active, complete]
    mapping:
      todo: pending
      in_progress: active
      done: complete
    severity: blocking
evolution_rules:
  - rule_id: tracker-additive
    scope: tracker
    policy: additive_only
versions:
  - service: tracker
    version: \"1.0.0\"
    fields:
      task_id: str
      status: str
    value_sets:
      status: [todo, in_progress, done]
";

    #[test]
    fn full_contract_parses() {
        let spec: CompatibilityContract = serde_yaml::from_str(FULL).unwrap();
        assert_eq!(spec.mappings.len(), 1);
        assert_eq!(spec.mappings[0].source_service, "tracker");
        assert_eq!(spec.mappings[0].mapping["done"], "complete");
        assert_eq!(spec.evolution_rules[0].policy, EvolutionPolicy::AdditiveOnly);
        assert_eq!(spec.versions[0].fields["task_id"], TypeTag::Str);
        assert_eq!(spec.versions[0].value_sets["status"].len(), 3);
    }

    #[test]
    fn minimal_contract_parses_empty() {
        let yaml = "schema_version: \"0.1.0\"\npipeline_id: p\n";
        let spec: CompatibilityContract = serde_yaml::from_str(yaml).unwrap();
        assert!(spec.mappings.is_empty());
        assert!(spec.versions.is_empty());
    }

    #[test]
    fn wrong_discriminator_rejected() {
        let yaml = "schema_version: \"0.1.0\"\npipeline_id: p\ncontract_type: wrong\n";
        assert!(serde_yaml::from_str::<CompatibilityContract>(yaml).is_err());
    }

    #[test]
    fn versions_of_filters_by_service() {
        let spec: CompatibilityContract = serde_yaml::from_str(FULL).unwrap();
        assert_eq!(spec.versions_of("tracker").len(), 1);
        assert!(spec.versions_of("exporter").is_empty());
        assert!(spec.rule_for("tracker").is_some());
        assert!(spec.rule_for("exporter").is_none());
    }
}
