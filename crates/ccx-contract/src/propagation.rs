// SPDX-License-Identifier: MIT OR Apache-2.0

//! Context propagation contract — Layer 1.
//!
//! Declares, per phase, which fields must be present at entry and exit,
//! which may be enriched with defaults, and what quality bars apply; plus
//! the propagation chains the run must preserve end to end.

use crate::{ContractDocument, ContractKind};
use ccx_core::{CompareOp, Severity, TypeTag};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Field specs
// ---------------------------------------------------------------------------

/// Value-shape checks applied to a present field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct QualitySpec {
    /// Minimum length (string chars, list/dict entries).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    /// Maximum length (string chars, list/dict entries).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    /// Regular expression the string value must match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    /// Minimum numeric value, inclusive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_value: Option<f64>,
    /// Maximum numeric value, inclusive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_value: Option<f64>,
    /// Named policy looked up in the validator's policy registry.
    /// Unknown names degrade to an advisory finding.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<String>,
}

impl QualitySpec {
    /// Whether any check is declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.min_length.is_none()
            && self.max_length.is_none()
            && self.pattern.is_none()
            && self.min_value.is_none()
            && self.max_value.is_none()
            && self.policy.is_none()
    }
}

/// Threshold comparison against a field value or a derived metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct EvaluationSpec {
    /// Derived metric name (`length`, `word_count`, `line_count`); when
    /// absent the field's numeric value is compared directly.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric: Option<String>,
    /// Comparison operator.
    pub operator: CompareOp,
    /// Threshold the metric is compared against.
    pub threshold: f64,
    /// Severity when the comparison fails.
    #[serde(default = "default_warning")]
    pub severity: Severity,
}

/// Declaration of a single context field at a phase boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct FieldSpec {
    /// Dot-path field name.
    pub name: String,
    /// Coarse expected type; absent means any.
    #[serde(default, rename = "type")]
    pub field_type: TypeTag,
    /// Severity when the field is missing or mistyped.
    #[serde(default = "default_blocking")]
    pub severity: Severity,
    /// Default value applied to an absent enrichment field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
    /// Value-shape checks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<QualitySpec>,
    /// Threshold evaluation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<EvaluationSpec>,
    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

fn default_blocking() -> Severity {
    Severity::Blocking
}

fn default_warning() -> Severity {
    Severity::Warning
}

// ---------------------------------------------------------------------------
// Phase contracts
// ---------------------------------------------------------------------------

/// Field requirements at phase entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct PhaseEntrySpec {
    /// Fields that must be present.
    #[serde(default)]
    pub required: Vec<FieldSpec>,
    /// Fields that may be filled from a default when absent.
    #[serde(default)]
    pub enrichment: Vec<FieldSpec>,
    /// Optional fields that are quality-checked when present.
    #[serde(default)]
    pub quality: Vec<FieldSpec>,
}

/// Field requirements at phase exit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct PhaseExitSpec {
    /// Fields the phase must have produced.
    #[serde(default)]
    pub required: Vec<FieldSpec>,
    /// Optional fields that are quality-checked when present.
    #[serde(default)]
    pub quality: Vec<FieldSpec>,
}

/// Entry and exit requirements for one phase.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct PhaseContract {
    /// Entry-side requirements.
    #[serde(default)]
    pub entry: PhaseEntrySpec,
    /// Exit-side requirements.
    #[serde(default)]
    pub exit: PhaseExitSpec,
}

// ---------------------------------------------------------------------------
// Chains
// ---------------------------------------------------------------------------

/// A phase + field pair identifying one end of a propagation chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ChainEndpoint {
    /// Phase name.
    pub phase: String,
    /// Dot-path field name.
    pub field: String,
}

/// A declared source → destination flow the run must preserve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct PropagationChainSpec {
    /// Unique chain identifier.
    pub chain_id: String,
    /// Where the field originates.
    pub source: ChainEndpoint,
    /// Where the field must arrive.
    pub destination: ChainEndpoint,
    /// Severity when the chain degrades or breaks.
    #[serde(default = "default_warning")]
    pub severity: Severity,
    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

// ---------------------------------------------------------------------------
// Root contract
// ---------------------------------------------------------------------------

/// Discriminator for propagation contracts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum PropagationDiscriminator {
    /// The only accepted literal: `context_propagation`.
    #[default]
    ContextPropagation,
}

/// Root model of a context propagation contract YAML file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct PropagationContract {
    /// Contract schema version (e.g. `0.1.0`).
    pub schema_version: String,
    /// Discriminator; defaults to `context_propagation`, other literals are
    /// rejected at parse time.
    #[serde(default)]
    pub contract_type: PropagationDiscriminator,
    /// Pipeline this contract governs.
    pub pipeline_id: String,
    /// Phase name → boundary requirements.
    #[serde(default)]
    pub phases: BTreeMap<String, PhaseContract>,
    /// Chains the run must preserve.
    #[serde(default)]
    pub propagation_chains: Vec<PropagationChainSpec>,
    /// Explicit phase execution order; used by preflight when present.
    #[serde(default)]
    pub phase_order: Vec<String>,
    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ContractDocument for PropagationContract {
    const KIND: ContractKind = ContractKind::ContextPropagation;

    fn schema_version(&self) -> &str {
        &self.schema_version
    }

    fn scope_id(&self) -> &str {
        &self.pipeline_id
    }

    fn integrity_problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.schema_version.is_empty() {
            problems.push("schema_version must be non-empty".to_string());
        }
        if self.pipeline_id.is_empty() {
            problems.push("pipeline_id must be non-empty".to_string());
        }
        for chain in &self.propagation_chains {
            if chain.chain_id.is_empty() {
                problems.push("propagation chain with empty chain_id".to_string());
            }
        }
        problems
    }
}

impl PropagationContract {
    /// The contract for `phase`, if declared.
    #[must_use]
    pub fn phase(&self, phase: &str) -> Option<&PhaseContract> {
        self.phases.get(phase)
    }
}

// ===========================================================================
// Tests
// ===========================================================================
#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = "\
schema_version: \"0.1.0\"
pipeline_id: test-pipeline
phases:
  plan:
    entry:
      required:
        - name: project_root
          type: str
          severity: blocking
    exit:
      required:
        - name: tasks
          type: list
          severity: blocking
";

    #[test]
    fn minimal_contract_parses() {
        let contract: PropagationContract = serde_yaml::from_str(MINIMAL).unwrap();
        assert_eq!(contract.pipeline_id, "test-pipeline");
        let plan = contract.phase("plan").unwrap();
        assert_eq!(plan.entry.required.len(), 1);
        assert_eq!(plan.entry.required[0].field_type, TypeTag::Str);
        assert_eq!(plan.exit.required[0].name, "tasks");
        assert!(contract.integrity_problems().is_empty());
    }

    #[test]
    fn contract_type_defaults_and_rejects_wrong_literal() {
        let contract: PropagationContract = serde_yaml::from_str(MINIMAL).unwrap();
        assert_eq!(
            contract.contract_type,
            PropagationDiscriminator::ContextPropagation
        );

        let wrong = MINIMAL.to_string() + "contract_type: data_lineage\n";
        assert!(serde_yaml::from_str::<PropagationContract>(&wrong).is_err());
    }

    #[test]
    fn unknown_keys_rejected() {
        let bad = MINIMAL.to_string() + "surprise: true\n";
        assert!(serde_yaml::from_str::<PropagationContract>(&bad).is_err());

        let bad_nested = "\
schema_version: \"0.1.0\"
pipeline_id: p
phases:
  plan:
    entry:
      required:
        - name: x
          wat: 1
";
        assert!(serde_yaml::from_str::<PropagationContract>(bad_nested).is_err());
    }

    #[test]
    fn chains_parse_with_defaults() {
        let yaml = "\
schema_version: \"0.1.0\"
pipeline_id: chain-test
phases:
  plan:
    exit:
      required:
        - name: domain
          type: str
  build:
    entry:
      enrichment:
        - name: domain
          type: str
          severity: warning
          default: unknown
propagation_chains:
  - chain_id: domain_flow
    source: {phase: plan, field: domain}
    destination: {phase: build, field: domain}
";
        let contract: PropagationContract = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(contract.propagation_chains.len(), 1);
        let chain = &contract.propagation_chains[0];
        assert_eq!(chain.chain_id, "domain_flow");
        assert_eq!(chain.severity, Severity::Warning);
        let enrich = &contract.phases["build"].entry.enrichment[0];
        assert_eq!(enrich.default, Some(serde_json::json!("unknown")));
    }

    #[test]
    fn field_without_type_tag_is_any() {
        let yaml = "\
schema_version: \"0.1.0\"
pipeline_id: p
phases:
  plan:
    entry:
      required:
        - name: anything
";
        let contract: PropagationContract = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            contract.phases["plan"].entry.required[0].field_type,
            TypeTag::Any
        );
    }

    #[test]
    fn quality_and_evaluation_parse() {
        let yaml = "\
schema_version: \"0.1.0\"
pipeline_id: p
phases:
  review:
    entry:
      quality:
        - name: design_doc
          type: str
          severity: warning
          quality:
            min_length: 100
            pattern: \"^#\"
            policy: non_empty
          evaluation:
            metric: line_count
            operator: gte
            threshold: 10
            severity: advisory
";
        let contract: PropagationContract = serde_yaml::from_str(yaml).unwrap();
        let field = &contract.phases["review"].entry.quality[0];
        let quality = field.quality.as_ref().unwrap();
        assert_eq!(quality.min_length, Some(100));
        assert_eq!(quality.policy.as_deref(), Some("non_empty"));
        let eval = field.evaluation.as_ref().unwrap();
        assert_eq!(eval.operator, CompareOp::Gte);
        assert_eq!(eval.severity, Severity::Advisory);
    }

    #[test]
    fn empty_ids_reported_as_integrity_problems() {
        let yaml = "\
schema_version: \"\"
pipeline_id: \"\"
";
        let contract: PropagationContract = serde_yaml::from_str(yaml).unwrap();
        let problems = contract.integrity_problems();
        assert_eq!(problems.len(), 2);
    }
}
