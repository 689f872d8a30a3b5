// SPDX-License-Identifier: MIT OR Apache-2.0

//! Field mapping compatibility checks.

use ccx_contract::{CompatibilityContract, FieldMapping, SchemaVersion};
use ccx_core::{Severity, ValidationErrorEnvelope};
use ccx_error::ErrorCode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// Result models
// ---------------------------------------------------------------------------

/// Overall compatibility classification for a mapping check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompatibilityLevel {
    /// No drift at all.
    Compatible,
    /// Only sub-blocking drift.
    Degraded,
    /// At least one blocking drift.
    Incompatible,
}

impl CompatibilityLevel {
    /// Stable lowercase string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Compatible => "compatible",
            Self::Degraded => "degraded",
            Self::Incompatible => "incompatible",
        }
    }
}

impl fmt::Display for CompatibilityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What kind of drift was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftKind {
    /// A declared source value has no mapping entry.
    UnmappedValue,
    /// A mapping produces a value outside the target's declared set.
    UnknownTargetValue,
    /// Source and target field types disagree.
    TypeMismatch,
    /// Two distinct source values map to the same target value.
    ValueCollapse,
}

impl DriftKind {
    /// Stable lowercase string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnmappedValue => "unmapped_value",
            Self::UnknownTargetValue => "unknown_target_value",
            Self::TypeMismatch => "type_mismatch",
            Self::ValueCollapse => "value_collapse",
        }
    }
}

/// One drift finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftDetail {
    /// Source field the drift concerns.
    pub field: String,
    /// What drifted.
    pub kind: DriftKind,
    /// Severity of the finding.
    pub severity: Severity,
    /// Human-readable detail.
    pub detail: String,
}

/// Per-source-value verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldCompatResult {
    /// The source value that was checked.
    pub source_value: String,
    /// The target value it maps to, when mapped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_value: Option<String>,
    /// Whether the value is mapped and lands in the target set.
    pub satisfied: bool,
}

/// Aggregate verdict for one field mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompatibilityResult {
    /// Source service name.
    pub source_service: String,
    /// Target service name.
    pub target_service: String,
    /// `true` iff no blocking drift was found.
    pub compatible: bool,
    /// Classification of the result.
    pub level: CompatibilityLevel,
    /// Per-value verdicts.
    pub field_results: Vec<FieldCompatResult>,
    /// Drift findings.
    pub drift_details: Vec<DriftDetail>,
    /// One-line summary.
    pub message: String,
}

impl CompatibilityResult {
    /// Every drift as a structured error envelope.
    #[must_use]
    pub fn envelopes(&self) -> Vec<ValidationErrorEnvelope> {
        let contract_type = ccx_contract::ContractKind::SchemaCompatibility.as_str();
        self.drift_details
            .iter()
            .map(|drift| {
                ValidationErrorEnvelope::new(
                    contract_type,
                    &drift.field,
                    ErrorCode::Unmapped,
                    format!("{}: {}", drift.kind.as_str(), drift.detail),
                    drift.severity,
                )
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Checker
// ---------------------------------------------------------------------------

/// Evaluates field mappings for a pair of service schemas.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompatibilityChecker;

impl CompatibilityChecker {
    /// Create a checker.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Check a single declared mapping against the latest declared versions
    /// of its two services.
    #[must_use]
    pub fn check_mapping(
        &self,
        mapping: &FieldMapping,
        versions: &[SchemaVersion],
    ) -> CompatibilityResult {
        let mut drift_details = Vec::new();
        let mut field_results = Vec::new();

        // Unmapped source values.
        for source_value in &mapping.source_values {
            match mapping.mapping.get(source_value) {
                None => {
                    field_results.push(FieldCompatResult {
                        source_value: source_value.clone(),
                        target_value: None,
                        satisfied: false,
                    });
                    drift_details.push(DriftDetail {
                        field: mapping.source_field.clone(),
                        kind: DriftKind::UnmappedValue,
                        severity: mapping.severity,
                        detail: format!("source value '{source_value}' has no mapping entry"),
                    });
                }
                Some(target_value) => {
                    let in_target_set = mapping.target_values.is_empty()
                        || mapping.target_values.contains(target_value);
                    if !in_target_set {
                        drift_details.push(DriftDetail {
                            field: mapping.source_field.clone(),
                            kind: DriftKind::UnknownTargetValue,
                            severity: mapping.severity,
                            detail: format!(
                                "'{source_value}' maps to '{target_value}', which '{}' does not declare",
                                mapping.target_field
                            ),
                        });
                    }
                    field_results.push(FieldCompatResult {
                        source_value: source_value.clone(),
                        target_value: Some(target_value.clone()),
                        satisfied: in_target_set,
                    });
                }
            }
        }

        // Value collapse: two distinct sources landing on one target.
        let mut owners: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for (source, target) in &mapping.mapping {
            owners.entry(target.as_str()).or_default().push(source);
        }
        for (target, sources) in owners {
            if sources.len() > 1 {
                drift_details.push(DriftDetail {
                    field: mapping.source_field.clone(),
                    kind: DriftKind::ValueCollapse,
                    severity: Severity::Warning,
                    detail: format!(
                        "distinct sources [{}] collapse into '{target}'",
                        sources.join(", ")
                    ),
                });
            }
        }

        // Field type drift between the latest declared versions.
        let source_type = latest_version(versions, &mapping.source_service)
            .and_then(|v| v.fields.get(&mapping.source_field));
        let target_type = latest_version(versions, &mapping.target_service)
            .and_then(|v| v.fields.get(&mapping.target_field));
        if let (Some(src), Some(dst)) = (source_type, target_type)
            && src != dst
        {
            drift_details.push(DriftDetail {
                field: mapping.source_field.clone(),
                kind: DriftKind::TypeMismatch,
                severity: mapping.severity,
                detail: format!(
                    "source declares {} but target '{}' declares {}",
                    src, mapping.target_field, dst
                ),
            });
        }

        let has_blocking = drift_details
            .iter()
            .any(|d| d.severity == Severity::Blocking);
        let level = if drift_details.is_empty() {
            CompatibilityLevel::Compatible
        } else if has_blocking {
            CompatibilityLevel::Incompatible
        } else {
            CompatibilityLevel::Degraded
        };

        let message = format!(
            "{} -> {}: {} value(s) checked, {} drift(s)",
            mapping.source_service,
            mapping.target_service,
            field_results.len(),
            drift_details.len()
        );

        CompatibilityResult {
            source_service: mapping.source_service.clone(),
            target_service: mapping.target_service.clone(),
            compatible: !has_blocking,
            level,
            field_results,
            drift_details,
            message,
        }
    }

    /// Check every mapping declared by the contract.
    #[must_use]
    pub fn check_all(&self, contract: &CompatibilityContract) -> Vec<CompatibilityResult> {
        contract
            .mappings
            .iter()
            .map(|mapping| self.check_mapping(mapping, &contract.versions))
            .collect()
    }
}

/// The last declared version of `service`, i.e. the newest by declaration
/// order.
fn latest_version<'a>(versions: &'a [SchemaVersion], service: &str) -> Option<&'a SchemaVersion> {
    versions.iter().rev().find(|v| v.service == service)
}

// ===========================================================================
// Tests
// ===========================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn contract(yaml: &str) -> CompatibilityContract {
        serde_yaml::from_str(yaml).unwrap()
    }

    const CLEAN: &str = "\
schema_version: \"0.1.0\"
pipeline_id: x
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
versions:
  - service: tracker
    version: \"1.0.0\"
    fields: {task.status: str}
  - service: exporter
    version: \"1.0.0\"
    fields: {status: str}
";

    #[test]
    fn clean_mapping_is_compatible() {
        let checker = CompatibilityChecker::new();
        let results = checker.check_all(&contract(CLEAN));
        assert_eq!(results.len(), 1);
        let r = &results[0];
        assert!(r.compatible);
        assert_eq!(r.level, CompatibilityLevel::Compatible);
        assert!(r.field_results.iter().all(|f| f.satisfied));
        assert!(r.drift_details.is_empty());
    }

    #[test]
    fn unmapped_source_value_is_drift() {
        let yaml = CLEAN.replace("source_values: [todo, in_progress, done]",
                                 "source_values: [todo, in_progress, done, archived]");
        let checker = CompatibilityChecker::new();
        let r = &checker.check_all(&contract(&yaml))[0];
        assert!(!r.compatible);
        assert_eq!(r.level, CompatibilityLevel::Incompatible);
        let drift = &r.drift_details[0];
        assert_eq!(drift.kind, DriftKind::UnmappedValue);
        assert!(drift.detail.contains("archived"));
        assert_eq!(r.envelopes()[0].code, ErrorCode::Unmapped);
    }

    #[test]
    fn target_value_outside_declared_set_is_drift() {
        let yaml = CLEAN.replace("done: complete", "done: finished");
        let checker = CompatibilityChecker::new();
        let r = &checker.check_all(&contract(&yaml))[0];
        assert!(!r.compatible);
        assert!(
            r.drift_details
                .iter()
                .any(|d| d.kind == DriftKind::UnknownTargetValue)
        );
    }

    #[test]
    fn empty_target_set_is_unchecked() {
        let yaml = CLEAN.replace("target_values: [pending, active, complete]", "target_values: []");
        let checker = CompatibilityChecker::new();
        let r = &checker.check_all(&contract(&yaml))[0];
        assert!(r.compatible);
    }

    #[test]
    fn value_collapse_warns() {
        let yaml = CLEAN.replace("in_progress: active", "in_progress: pending");
        let checker = CompatibilityChecker::new();
        let r = &checker.check_all(&contract(&yaml))[0];
        // Collapse is a warning: degraded but still compatible.
        assert!(r.compatible);
        assert_eq!(r.level, CompatibilityLevel::Degraded);
        let drift = r
            .drift_details
            .iter()
            .find(|d| d.kind == DriftKind::ValueCollapse)
            .unwrap();
        assert!(drift.detail.contains("pending"));
    }

    #[test]
    fn field_type_mismatch_is_drift() {
        let yaml = CLEAN.replace("fields: {status: str}", "fields: {status: int}");
        let checker = CompatibilityChecker::new();
        let r = &checker.check_all(&contract(&yaml))[0];
        assert!(!r.compatible);
        assert!(
            r.drift_details
                .iter()
                .any(|d| d.kind == DriftKind::TypeMismatch)
        );
    }

    #[test]
    fn missing_version_info_skips_type_check() {
        let yaml = "\
schema_version: \"0.1.0\"
pipeline_id: x
mappings:
  - source_service: a
    source_field: f
    source_values: [v]
    target_service: b
    target_field: g
    mapping: {v: w}
";
        let checker = CompatibilityChecker::new();
        let r = &checker.check_all(&contract(yaml))[0];
        assert!(r.compatible);
    }

    #[test]
    fn latest_version_wins_for_type_check() {
        let yaml = CLEAN.to_string()
            + "  - service: exporter\n    version: \"2.0.0\"\n    fields: {status: int}\n";
        let checker = CompatibilityChecker::new();
        let r = &checker.check_all(&contract(&yaml))[0];
        assert!(
            r.drift_details
                .iter()
                .any(|d| d.kind == DriftKind::TypeMismatch)
        );
    }
}
