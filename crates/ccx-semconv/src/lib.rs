// SPDX-License-Identifier: MIT OR Apache-2.0
//! Semantic convention validation — Layer 3.
//!
//! Canonicalises attribute names through the convention's alias map,
//! validates values against closed sets, and detects conflicting aliases.
//! An alias resolving to two different canonical names is a blocking
//! conflict: the namespace itself is ambiguous and no bag of attributes
//! can be trusted against it.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use ccx_contract::{ConventionContract, EnumConvention};
use ccx_core::{Severity, ValidationErrorEnvelope};
use ccx_error::ErrorCode;
use ccx_telemetry::{EventSink, attr, event_names};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, warn};

// ---------------------------------------------------------------------------
// Result models
// ---------------------------------------------------------------------------

/// Verdict for one input attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeValidationResult {
    /// The name as it appeared in the input bag.
    pub attribute: String,
    /// The canonical name it resolves to, when it does.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canonical: Option<String>,
    /// Whether the attribute is canonical, well-typed, and within its
    /// allowed values.
    pub satisfied: bool,
    /// Severity of the finding when unsatisfied.
    pub severity: Severity,
    /// Human-readable reason.
    pub reason: String,
}

/// A single alias bound to two different canonical names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasConflict {
    /// The ambiguous alias.
    pub alias: String,
    /// The canonical names competing for it.
    pub canonicals: Vec<String>,
}

/// Aggregate verdict for one attribute bag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConventionValidationResult {
    /// Namespace that was validated against.
    pub namespace: String,
    /// `true` iff no blocking finding (conflicts included) was made.
    pub passed: bool,
    /// Per-attribute verdicts.
    pub results: Vec<AttributeValidationResult>,
    /// Conflicting aliases found in the contract itself.
    pub alias_conflicts: Vec<AliasConflict>,
}

impl ConventionValidationResult {
    /// Every finding as a structured error envelope.
    #[must_use]
    pub fn envelopes(&self) -> Vec<ValidationErrorEnvelope> {
        let contract_type = ccx_contract::ContractKind::SemanticConventions.as_str();
        let mut envelopes = Vec::new();
        for conflict in &self.alias_conflicts {
            envelopes.push(ValidationErrorEnvelope::new(
                contract_type,
                &conflict.alias,
                ErrorCode::AliasConflict,
                format!(
                    "alias '{}' resolves to {}",
                    conflict.alias,
                    conflict.canonicals.join(" and ")
                ),
                Severity::Blocking,
            ));
        }
        for result in &self.results {
            if !result.satisfied {
                envelopes.push(ValidationErrorEnvelope::new(
                    contract_type,
                    &result.attribute,
                    ErrorCode::QualityFail,
                    &result.reason,
                    result.severity,
                ));
            }
        }
        envelopes
    }
}

// ---------------------------------------------------------------------------
// Validator
// ---------------------------------------------------------------------------

/// Validates attribute bags against a convention contract.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConventionValidator;

impl ConventionValidator {
    /// Create a validator.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Conflicting aliases declared by the contract, independent of any
    /// input bag.
    #[must_use]
    pub fn alias_conflicts(&self, contract: &ConventionContract) -> Vec<AliasConflict> {
        let mut owners: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for convention in &contract.attributes {
            for alias in &convention.aliases {
                owners.entry(alias.as_str()).or_default().push(&convention.name);
            }
        }
        owners
            .into_iter()
            .filter(|(_, canonicals)| canonicals.len() > 1)
            .map(|(alias, canonicals)| AliasConflict {
                alias: alias.to_string(),
                canonicals: canonicals.into_iter().map(str::to_string).collect(),
            })
            .collect()
    }

    /// Validate an attribute bag against the convention.
    #[must_use]
    pub fn validate(
        &self,
        contract: &ConventionContract,
        attributes: &BTreeMap<String, Value>,
    ) -> ConventionValidationResult {
        let alias_conflicts = self.alias_conflicts(contract);
        let conflicted: Vec<&str> = alias_conflicts
            .iter()
            .map(|c| c.alias.as_str())
            .collect();

        // alias → canonical, excluding conflicted aliases.
        let mut alias_map: BTreeMap<&str, &str> = BTreeMap::new();
        for convention in &contract.attributes {
            for alias in &convention.aliases {
                if !conflicted.contains(&alias.as_str()) {
                    alias_map.insert(alias, &convention.name);
                }
            }
        }

        let mut results = Vec::new();
        for (name, value) in attributes {
            if let Some(convention) = contract.attribute(name) {
                results.push(check_value(name, Some(name), convention, value));
            } else if let Some(&canonical) = alias_map.get(name.as_str()) {
                let convention = contract
                    .attribute(canonical)
                    .expect("alias map points at declared attribute");
                let mut result = check_value(name, Some(canonical), convention, value);
                if result.satisfied {
                    result.satisfied = false;
                    result.severity = Severity::Warning;
                    result.reason =
                        format!("non-canonical name '{name}'; use '{canonical}'");
                }
                results.push(result);
            } else if conflicted.contains(&name.as_str()) {
                // The alias is unusable until the contract is fixed; the
                // conflict itself is reported separately.
                results.push(AttributeValidationResult {
                    attribute: name.clone(),
                    canonical: None,
                    satisfied: false,
                    severity: Severity::Blocking,
                    reason: format!("alias '{name}' is ambiguous in this namespace"),
                });
            } else {
                results.push(AttributeValidationResult {
                    attribute: name.clone(),
                    canonical: None,
                    satisfied: false,
                    severity: Severity::Advisory,
                    reason: format!(
                        "'{name}' is not declared in namespace '{}'",
                        contract.namespace
                    ),
                });
            }
        }

        let passed = alias_conflicts.is_empty()
            && results
                .iter()
                .all(|r| r.satisfied || r.severity != Severity::Blocking);

        ConventionValidationResult {
            namespace: contract.namespace.clone(),
            passed,
            results,
            alias_conflicts,
        }
    }

    /// Validate a single value against a named enum convention.
    ///
    /// Closed enums block on unknown values; extensible enums warn.
    /// Returns `None` when the value is declared.
    #[must_use]
    pub fn check_enum(
        &self,
        convention: &EnumConvention,
        value: &str,
    ) -> Option<AttributeValidationResult> {
        if convention.values.iter().any(|v| v == value) {
            return None;
        }
        let severity = if convention.extensible {
            Severity::Warning
        } else {
            Severity::Blocking
        };
        Some(AttributeValidationResult {
            attribute: convention.name.clone(),
            canonical: Some(convention.name.clone()),
            satisfied: false,
            severity,
            reason: format!(
                "'{value}' is not a declared value of enum '{}'",
                convention.name
            ),
        })
    }
}

fn check_value(
    input_name: &str,
    canonical: Option<&str>,
    convention: &ccx_contract::AttributeConvention,
    value: &Value,
) -> AttributeValidationResult {
    if !convention.value_type.matches(value) {
        return AttributeValidationResult {
            attribute: input_name.to_string(),
            canonical: canonical.map(str::to_string),
            satisfied: false,
            severity: Severity::Warning,
            reason: format!(
                "'{input_name}' is not of type {}",
                convention.value_type
            ),
        };
    }

    if let Some(allowed) = &convention.allowed_values {
        let matches = value
            .as_str()
            .is_some_and(|s| allowed.iter().any(|v| v == s));
        if !matches {
            return AttributeValidationResult {
                attribute: input_name.to_string(),
                canonical: canonical.map(str::to_string),
                satisfied: false,
                severity: Severity::Blocking,
                reason: format!(
                    "value {value} is outside the allowed set of '{}'",
                    convention.name
                ),
            };
        }
    }

    AttributeValidationResult {
        attribute: input_name.to_string(),
        canonical: canonical.map(str::to_string),
        satisfied: true,
        severity: Severity::Advisory,
        reason: String::new(),
    }
}

// ---------------------------------------------------------------------------
// Emission
// ---------------------------------------------------------------------------

/// Emit the validation summary span event.
///
/// Event name: `convention.validation.complete`.
pub fn emit_convention_result(sink: &dyn EventSink, result: &ConventionValidationResult) {
    let unsatisfied = result.results.iter().filter(|r| !r.satisfied).count();
    let attrs = vec![
        attr("convention.namespace", result.namespace.as_str()),
        attr("convention.passed", result.passed),
        attr("convention.attributes_checked", result.results.len()),
        attr("convention.unsatisfied", unsatisfied),
        attr("convention.alias_conflicts", result.alias_conflicts.len()),
    ];

    if result.passed {
        debug!(
            namespace = %result.namespace,
            checked = result.results.len(),
            "convention validation complete"
        );
    } else {
        warn!(
            namespace = %result.namespace,
            unsatisfied,
            conflicts = result.alias_conflicts.len(),
            "convention validation FAILED"
        );
    }

    sink.emit(event_names::CONVENTION_VALIDATION_COMPLETE, &attrs);
}

// ===========================================================================
// Tests
// ===========================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn contract(yaml: &str) -> ConventionContract {
        serde_yaml::from_str(yaml).unwrap()
    }

    const CONTRACT: &str = "\
schema_version: \"0.1.0\"
namespace: pipeline.resource
attributes:
  - name: service.name
    type: str
    aliases: [svc, service_name]
  - name: task.status
    allowed_values: [todo, in_progress, done]
enums:
  - name: task_status
    values: [todo, in_progress, done]
  - name: agent_type
    values: [planner, builder]
    extensible: true
";

    fn bag(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn canonical_names_pass() {
        let validator = ConventionValidator::new();
        let result = validator.validate(
            &contract(CONTRACT),
            &bag(&[
                ("service.name", json!("tracker")),
                ("task.status", json!("done")),
            ]),
        );
        assert!(result.passed);
        assert!(result.results.iter().all(|r| r.satisfied));
    }

    #[test]
    fn alias_resolves_with_warning() {
        let validator = ConventionValidator::new();
        let result = validator.validate(
            &contract(CONTRACT),
            &bag(&[("svc", json!("tracker"))]),
        );
        assert!(result.passed);
        let r = &result.results[0];
        assert!(!r.satisfied);
        assert_eq!(r.severity, Severity::Warning);
        assert_eq!(r.canonical.as_deref(), Some("service.name"));
    }

    #[test]
    fn closed_value_set_blocks_unknown_values() {
        let validator = ConventionValidator::new();
        let result = validator.validate(
            &contract(CONTRACT),
            &bag(&[("task.status", json!("paused"))]),
        );
        assert!(!result.passed);
        assert_eq!(result.results[0].severity, Severity::Blocking);
    }

    #[test]
    fn undeclared_attribute_is_advisory() {
        let validator = ConventionValidator::new();
        let result = validator.validate(
            &contract(CONTRACT),
            &bag(&[("totally.new", json!("x"))]),
        );
        assert!(result.passed);
        assert_eq!(result.results[0].severity, Severity::Advisory);
    }

    #[test]
    fn type_mismatch_warns() {
        let validator = ConventionValidator::new();
        let result = validator.validate(
            &contract(CONTRACT),
            &bag(&[("service.name", json!(42))]),
        );
        assert!(result.passed);
        let r = &result.results[0];
        assert!(!r.satisfied);
        assert_eq!(r.severity, Severity::Warning);
    }

    // ---- alias conflicts --------------------------------------------------

    const CONFLICTED: &str = "\
schema_version: \"0.1.0\"
namespace: pipeline.resource
attributes:
  - name: service.name
    aliases: [svc]
  - name: service.namespace
    aliases: [svc]
";

    #[test]
    fn conflicting_alias_is_blocking() {
        let validator = ConventionValidator::new();
        let conflicts = validator.alias_conflicts(&contract(CONFLICTED));
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].alias, "svc");
        assert_eq!(conflicts[0].canonicals.len(), 2);

        let result = validator.validate(&contract(CONFLICTED), &bag(&[]));
        assert!(!result.passed);
        let envelopes = result.envelopes();
        assert_eq!(envelopes[0].code, ErrorCode::AliasConflict);
        assert!(envelopes[0].is_blocking());
    }

    #[test]
    fn conflicted_alias_in_bag_is_unusable() {
        let validator = ConventionValidator::new();
        let result = validator.validate(
            &contract(CONFLICTED),
            &bag(&[("svc", json!("tracker"))]),
        );
        assert!(!result.passed);
        assert!(result.results[0].reason.contains("ambiguous"));
    }

    // ---- enums ------------------------------------------------------------

    #[test]
    fn closed_enum_blocks_unknown_value() {
        let validator = ConventionValidator::new();
        let c = contract(CONTRACT);
        let status = c.enum_named("task_status").unwrap();
        let finding = validator.check_enum(status, "paused").unwrap();
        assert_eq!(finding.severity, Severity::Blocking);
        assert!(validator.check_enum(status, "done").is_none());
    }

    #[test]
    fn extensible_enum_warns_on_unknown_value() {
        let validator = ConventionValidator::new();
        let c = contract(CONTRACT);
        let agents = c.enum_named("agent_type").unwrap();
        let finding = validator.check_enum(agents, "reviewer").unwrap();
        assert_eq!(finding.severity, Severity::Warning);
    }

    // ---- emission ---------------------------------------------------------

    #[test]
    fn emits_single_summary_event() {
        let sink = ccx_telemetry::MemorySink::new();
        let validator = ConventionValidator::new();
        let result = validator.validate(
            &contract(CONTRACT),
            &bag(&[("service.name", json!("tracker"))]),
        );
        emit_convention_result(&sink, &result);
        assert_eq!(
            sink.names(),
            vec![event_names::CONVENTION_VALIDATION_COMPLETE]
        );
    }
}
