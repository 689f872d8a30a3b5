// SPDX-License-Identifier: MIT OR Apache-2.0

//! Boundary validation against a propagation contract.

use crate::policy::{PolicyOutcome, QualityPolicyRegistry};
use ccx_contract::{EvaluationSpec, FieldSpec, PropagationContract, QualitySpec};
use ccx_core::{
    Direction, Severity, TypeTag, ValidationErrorEnvelope, WorkflowContext,
};
use ccx_error::ErrorCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Result models
// ---------------------------------------------------------------------------

/// Why a field failed its presence/type check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldIssue {
    /// The field is absent from the context.
    Missing,
    /// The field is present but its value does not match the declared tag.
    TypeMismatch {
        /// The declared tag.
        expected: TypeTag,
    },
}

/// Per-field verdict at a boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldValidationResult {
    /// Dot-path field name.
    pub field: String,
    /// Whether presence and type both held.
    pub satisfied: bool,
    /// Declared severity of the field spec.
    pub severity: Severity,
    /// What went wrong, when unsatisfied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue: Option<FieldIssue>,
    /// Human-readable reason.
    pub reason: String,
}

/// A failed quality or evaluation check on a present field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityViolation {
    /// Dot-path field name.
    pub field: String,
    /// Which rule failed (`min_length`, `pattern`, `policy:<name>`,
    /// `evaluation`, ...).
    pub rule: String,
    /// Severity of the violation.
    pub severity: Severity,
    /// Human-readable detail.
    pub detail: String,
}

/// A default the validator decided to fill in.
///
/// The validator never mutates the context itself; the guard applies these
/// according to its enforcement mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedDefault {
    /// Dot-path field name.
    pub field: String,
    /// The declared default value.
    pub value: Value,
}

/// Aggregate verdict for one boundary validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractValidationResult {
    /// Phase that was validated.
    pub phase: String,
    /// Which side of the boundary.
    pub direction: Direction,
    /// `true` iff no blocking failure was found.
    pub passed: bool,
    /// Per-field verdicts.
    pub field_results: Vec<FieldValidationResult>,
    /// Failed quality and evaluation checks.
    pub quality_violations: Vec<QualityViolation>,
    /// Defaults to fill in for absent enrichment fields.
    pub defaults_applied: Vec<AppliedDefault>,
}

impl ContractValidationResult {
    /// Number of blocking failures across fields and quality checks.
    #[must_use]
    pub fn blocking_failures(&self) -> usize {
        let fields = self
            .field_results
            .iter()
            .filter(|f| !f.satisfied && f.severity == Severity::Blocking)
            .count();
        let quality = self
            .quality_violations
            .iter()
            .filter(|q| q.severity == Severity::Blocking)
            .count();
        fields + quality
    }

    /// Every violation as a structured error envelope, blocking first.
    #[must_use]
    pub fn envelopes(&self) -> Vec<ValidationErrorEnvelope> {
        let contract_type = ccx_contract::ContractKind::ContextPropagation.as_str();
        let mut envelopes = Vec::new();
        for field in &self.field_results {
            if field.satisfied {
                continue;
            }
            let code = match field.issue {
                Some(FieldIssue::TypeMismatch { .. }) => ErrorCode::TypeMismatch,
                _ => ErrorCode::FieldMissing,
            };
            envelopes.push(ValidationErrorEnvelope::new(
                contract_type,
                &field.field,
                code,
                &field.reason,
                field.severity,
            ));
        }
        for violation in &self.quality_violations {
            envelopes.push(ValidationErrorEnvelope::new(
                contract_type,
                &violation.field,
                ErrorCode::QualityFail,
                format!("{}: {}", violation.rule, violation.detail),
                violation.severity,
            ));
        }
        for default in &self.defaults_applied {
            envelopes.push(ValidationErrorEnvelope::new(
                contract_type,
                &default.field,
                ErrorCode::DefaultApplied,
                format!("default {} filled in", default.value),
                Severity::Advisory,
            ));
        }
        envelopes.sort_by(|a, b| b.severity.cmp(&a.severity));
        envelopes
    }
}

// ---------------------------------------------------------------------------
// Validator
// ---------------------------------------------------------------------------

/// Checks field specs at phase boundaries.
///
/// Pure and CPU-bound: the validator never mutates the context or the
/// envelope, and never terminates the run — it returns result objects and
/// the guard decides.
#[derive(Debug, Default)]
pub struct BoundaryValidator {
    policies: QualityPolicyRegistry,
}

impl BoundaryValidator {
    /// A validator with the built-in policy registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A validator with a caller-supplied policy registry.
    #[must_use]
    pub fn with_policies(policies: QualityPolicyRegistry) -> Self {
        Self { policies }
    }

    /// Mutable access to the policy registry, for registration.
    pub fn policies_mut(&mut self) -> &mut QualityPolicyRegistry {
        &mut self.policies
    }

    /// Validate `phase`'s boundary in the given direction.
    ///
    /// A phase absent from the contract (or an empty contract) validates
    /// trivially.
    #[must_use]
    pub fn validate(
        &self,
        ctx: &WorkflowContext,
        phase: &str,
        direction: Direction,
        contract: &PropagationContract,
    ) -> ContractValidationResult {
        let mut result = ContractValidationResult {
            phase: phase.to_string(),
            direction,
            passed: true,
            field_results: Vec::new(),
            quality_violations: Vec::new(),
            defaults_applied: Vec::new(),
        };

        let Some(phase_contract) = contract.phase(phase) else {
            return result;
        };

        let (required, quality_only, enrichment): (&[FieldSpec], &[FieldSpec], &[FieldSpec]) =
            match direction {
                Direction::Entry => (
                    &phase_contract.entry.required,
                    &phase_contract.entry.quality,
                    &phase_contract.entry.enrichment,
                ),
                Direction::Exit => (&phase_contract.exit.required, &phase_contract.exit.quality, &[]),
            };

        for spec in required {
            self.check_required(ctx, spec, &mut result);
        }
        for spec in quality_only {
            // Optional fields: absent is fine, present values must hold.
            if let Some(value) = ctx.get(&spec.name) {
                self.check_value(spec, value, &mut result);
            }
        }
        for spec in enrichment {
            self.check_enrichment(ctx, spec, &mut result);
        }

        result.passed = result.blocking_failures() == 0;
        result
    }

    fn check_required(
        &self,
        ctx: &WorkflowContext,
        spec: &FieldSpec,
        result: &mut ContractValidationResult,
    ) {
        match ctx.get(&spec.name) {
            None => result.field_results.push(FieldValidationResult {
                field: spec.name.clone(),
                satisfied: false,
                severity: spec.severity,
                issue: Some(FieldIssue::Missing),
                reason: format!("required field '{}' is missing", spec.name),
            }),
            Some(value) => self.check_value(spec, value, result),
        }
    }

    fn check_enrichment(
        &self,
        ctx: &WorkflowContext,
        spec: &FieldSpec,
        result: &mut ContractValidationResult,
    ) {
        match ctx.get(&spec.name) {
            Some(value) => self.check_value(spec, value, result),
            None => match &spec.default {
                Some(default) => result.defaults_applied.push(AppliedDefault {
                    field: spec.name.clone(),
                    value: default.clone(),
                }),
                None => result.field_results.push(FieldValidationResult {
                    field: spec.name.clone(),
                    satisfied: false,
                    severity: spec.severity,
                    issue: Some(FieldIssue::Missing),
                    reason: format!(
                        "enrichment field '{}' is missing and declares no default",
                        spec.name
                    ),
                }),
            },
        }
    }

    /// Type, quality, and evaluation checks for a present field.
    fn check_value(
        &self,
        spec: &FieldSpec,
        value: &Value,
        result: &mut ContractValidationResult,
    ) {
        if !spec.field_type.matches(value) {
            result.field_results.push(FieldValidationResult {
                field: spec.name.clone(),
                satisfied: false,
                severity: spec.severity,
                issue: Some(FieldIssue::TypeMismatch {
                    expected: spec.field_type,
                }),
                reason: format!(
                    "field '{}' is not of type {}",
                    spec.name, spec.field_type
                ),
            });
            return;
        }

        result.field_results.push(FieldValidationResult {
            field: spec.name.clone(),
            satisfied: true,
            severity: spec.severity,
            issue: None,
            reason: String::new(),
        });

        if let Some(quality) = &spec.quality {
            self.check_quality(spec, quality, value, result);
        }
        if let Some(evaluation) = &spec.evaluation {
            check_evaluation(spec, evaluation, value, result);
        }
    }

    fn check_quality(
        &self,
        spec: &FieldSpec,
        quality: &QualitySpec,
        value: &Value,
        result: &mut ContractValidationResult,
    ) {
        let violation = |rule: &str, severity: Severity, detail: String| QualityViolation {
            field: spec.name.clone(),
            rule: rule.to_string(),
            severity,
            detail,
        };

        if let Some(len) = value_length(value) {
            if let Some(min) = quality.min_length
                && len < min
            {
                result.quality_violations.push(violation(
                    "min_length",
                    spec.severity,
                    format!("length {len} < {min}"),
                ));
            }
            if let Some(max) = quality.max_length
                && len > max
            {
                result.quality_violations.push(violation(
                    "max_length",
                    spec.severity,
                    format!("length {len} > {max}"),
                ));
            }
        }

        if let Some(pattern) = &quality.pattern {
            match regex::Regex::new(pattern) {
                Err(e) => result.quality_violations.push(violation(
                    "pattern",
                    Severity::Advisory,
                    format!("pattern '{pattern}' does not compile: {e}"),
                )),
                Ok(re) => match value.as_str() {
                    None => result.quality_violations.push(violation(
                        "pattern",
                        spec.severity,
                        "pattern declared on a non-string value".to_string(),
                    )),
                    Some(s) if !re.is_match(s) => result.quality_violations.push(violation(
                        "pattern",
                        spec.severity,
                        format!("'{s}' does not match '{pattern}'"),
                    )),
                    Some(_) => {}
                },
            }
        }

        if quality.min_value.is_some() || quality.max_value.is_some() {
            match value.as_f64() {
                None => result.quality_violations.push(violation(
                    "range",
                    spec.severity,
                    "range declared on a non-numeric value".to_string(),
                )),
                Some(n) => {
                    if let Some(min) = quality.min_value
                        && n < min
                    {
                        result.quality_violations.push(violation(
                            "min_value",
                            spec.severity,
                            format!("{n} < {min}"),
                        ));
                    }
                    if let Some(max) = quality.max_value
                        && n > max
                    {
                        result.quality_violations.push(violation(
                            "max_value",
                            spec.severity,
                            format!("{n} > {max}"),
                        ));
                    }
                }
            }
        }

        if let Some(policy) = &quality.policy {
            match self.policies.evaluate(policy, value) {
                PolicyOutcome::Pass => {}
                PolicyOutcome::Fail(reason) => result.quality_violations.push(violation(
                    &format!("policy:{policy}"),
                    spec.severity,
                    reason,
                )),
                PolicyOutcome::Unknown => result.quality_violations.push(violation(
                    &format!("policy:{policy}"),
                    Severity::Advisory,
                    format!("policy '{policy}' is not registered"),
                )),
            }
        }
    }
}

/// Threshold comparison against the value or a derived metric.
fn check_evaluation(
    spec: &FieldSpec,
    evaluation: &EvaluationSpec,
    value: &Value,
    result: &mut ContractValidationResult,
) {
    let metric_value = match evaluation.metric.as_deref() {
        None => value.as_f64(),
        Some("length") => value_length(value).map(|l| l as f64),
        Some("word_count") => value
            .as_str()
            .map(|s| s.split_whitespace().count() as f64),
        Some("line_count") => value.as_str().map(|s| s.lines().count() as f64),
        Some(other) => {
            result.quality_violations.push(QualityViolation {
                field: spec.name.clone(),
                rule: "evaluation".to_string(),
                severity: Severity::Advisory,
                detail: format!("unknown metric '{other}'"),
            });
            return;
        }
    };

    let Some(metric_value) = metric_value else {
        result.quality_violations.push(QualityViolation {
            field: spec.name.clone(),
            rule: "evaluation".to_string(),
            severity: Severity::Advisory,
            detail: "metric is not derivable from the value".to_string(),
        });
        return;
    };

    if !evaluation.operator.compare(metric_value, evaluation.threshold) {
        result.quality_violations.push(QualityViolation {
            field: spec.name.clone(),
            rule: "evaluation".to_string(),
            severity: evaluation.severity,
            detail: format!(
                "{} {} {} does not hold (actual {metric_value})",
                evaluation.metric.as_deref().unwrap_or("value"),
                evaluation.operator,
                evaluation.threshold
            ),
        });
    }
}

/// Length of a string (chars), list, or mapping. `None` for other shapes.
fn value_length(value: &Value) -> Option<usize> {
    match value {
        Value::String(s) => Some(s.chars().count()),
        Value::Array(items) => Some(items.len()),
        Value::Object(map) => Some(map.len()),
        _ => None,
    }
}
