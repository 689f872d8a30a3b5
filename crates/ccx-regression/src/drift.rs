// SPDX-License-Identifier: MIT OR Apache-2.0

//! Drift detection between two revisions of a propagation contract.
//!
//! Removals and weakenings are breaking: a deleted phase or field, a
//! severity downgraded from blocking, a changed type tag, or a deleted
//! chain. Additions and strengthenings are reported but not breaking.

use ccx_contract::{FieldSpec, PhaseContract, PropagationContract};
use ccx_core::Severity;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What changed between the two contract revisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftChangeKind {
    /// A phase was added.
    PhaseAdded,
    /// A phase was removed.
    PhaseRemoved,
    /// A field spec was added to a phase boundary.
    FieldAdded,
    /// A field spec was removed from a phase boundary.
    FieldRemoved,
    /// A field's severity changed.
    SeverityChanged,
    /// A field's type tag changed.
    TypeChanged,
    /// A propagation chain was added.
    ChainAdded,
    /// A propagation chain was removed.
    ChainRemoved,
}

impl DriftChangeKind {
    /// Stable lowercase string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PhaseAdded => "phase_added",
            Self::PhaseRemoved => "phase_removed",
            Self::FieldAdded => "field_added",
            Self::FieldRemoved => "field_removed",
            Self::SeverityChanged => "severity_changed",
            Self::TypeChanged => "type_changed",
            Self::ChainAdded => "chain_added",
            Self::ChainRemoved => "chain_removed",
        }
    }
}

/// One detected change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftChange {
    /// What changed.
    pub kind: DriftChangeKind,
    /// Phase concerned (empty for chain changes).
    pub phase: String,
    /// Field concerned, when field-scoped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// Human-readable detail.
    pub detail: String,
    /// Whether the change weakens the contract.
    pub breaking: bool,
}

/// Every change between two contract revisions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftReport {
    /// Detected changes, stable order.
    pub changes: Vec<DriftChange>,
}

impl DriftReport {
    /// Number of breaking changes.
    #[must_use]
    pub fn breaking_count(&self) -> usize {
        self.changes.iter().filter(|c| c.breaking).count()
    }
}

/// Diffs two revisions of a propagation contract.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContractDriftDetector;

impl ContractDriftDetector {
    /// Create a detector.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Diff `baseline` against `current`.
    #[must_use]
    pub fn diff(
        &self,
        baseline: &PropagationContract,
        current: &PropagationContract,
    ) -> DriftReport {
        let mut changes = Vec::new();

        for (name, old_phase) in &baseline.phases {
            match current.phases.get(name) {
                None => changes.push(DriftChange {
                    kind: DriftChangeKind::PhaseRemoved,
                    phase: name.clone(),
                    field: None,
                    detail: format!("phase '{name}' removed"),
                    breaking: true,
                }),
                Some(new_phase) => diff_phase(name, old_phase, new_phase, &mut changes),
            }
        }
        for name in current.phases.keys() {
            if !baseline.phases.contains_key(name) {
                changes.push(DriftChange {
                    kind: DriftChangeKind::PhaseAdded,
                    phase: name.clone(),
                    field: None,
                    detail: format!("phase '{name}' added"),
                    breaking: false,
                });
            }
        }

        let old_chains: BTreeMap<&str, ()> = baseline
            .propagation_chains
            .iter()
            .map(|c| (c.chain_id.as_str(), ()))
            .collect();
        let new_chains: BTreeMap<&str, ()> = current
            .propagation_chains
            .iter()
            .map(|c| (c.chain_id.as_str(), ()))
            .collect();
        for chain_id in old_chains.keys() {
            if !new_chains.contains_key(chain_id) {
                changes.push(DriftChange {
                    kind: DriftChangeKind::ChainRemoved,
                    phase: String::new(),
                    field: None,
                    detail: format!("chain '{chain_id}' removed"),
                    breaking: true,
                });
            }
        }
        for chain_id in new_chains.keys() {
            if !old_chains.contains_key(chain_id) {
                changes.push(DriftChange {
                    kind: DriftChangeKind::ChainAdded,
                    phase: String::new(),
                    field: None,
                    detail: format!("chain '{chain_id}' added"),
                    breaking: false,
                });
            }
        }

        DriftReport { changes }
    }
}

fn diff_phase(
    phase: &str,
    old: &PhaseContract,
    new: &PhaseContract,
    changes: &mut Vec<DriftChange>,
) {
    let sections: [(&str, &[FieldSpec], &[FieldSpec]); 3] = [
        ("entry.required", &old.entry.required, &new.entry.required),
        ("entry.enrichment", &old.entry.enrichment, &new.entry.enrichment),
        ("exit.required", &old.exit.required, &new.exit.required),
    ];

    for (section, old_fields, new_fields) in sections {
        for old_field in old_fields {
            match new_fields.iter().find(|f| f.name == old_field.name) {
                None => changes.push(DriftChange {
                    kind: DriftChangeKind::FieldRemoved,
                    phase: phase.to_string(),
                    field: Some(old_field.name.clone()),
                    detail: format!("'{}' removed from {phase} {section}", old_field.name),
                    breaking: true,
                }),
                Some(new_field) => {
                    if new_field.severity != old_field.severity {
                        // Weakening away from blocking is the breaking
                        // direction.
                        let breaking = old_field.severity == Severity::Blocking
                            && new_field.severity != Severity::Blocking;
                        changes.push(DriftChange {
                            kind: DriftChangeKind::SeverityChanged,
                            phase: phase.to_string(),
                            field: Some(old_field.name.clone()),
                            detail: format!(
                                "'{}' severity changed from {} to {} in {phase} {section}",
                                old_field.name, old_field.severity, new_field.severity
                            ),
                            breaking,
                        });
                    }
                    if new_field.field_type != old_field.field_type {
                        changes.push(DriftChange {
                            kind: DriftChangeKind::TypeChanged,
                            phase: phase.to_string(),
                            field: Some(old_field.name.clone()),
                            detail: format!(
                                "'{}' type changed from {} to {} in {phase} {section}",
                                old_field.name, old_field.field_type, new_field.field_type
                            ),
                            breaking: true,
                        });
                    }
                }
            }
        }
        for new_field in new_fields {
            if !old_fields.iter().any(|f| f.name == new_field.name) {
                changes.push(DriftChange {
                    kind: DriftChangeKind::FieldAdded,
                    phase: phase.to_string(),
                    field: Some(new_field.name.clone()),
                    detail: format!("'{}' added to {phase} {section}", new_field.name),
                    breaking: false,
                });
            }
        }
    }
}
