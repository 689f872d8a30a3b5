// SPDX-License-Identifier: MIT OR Apache-2.0

//! Schema evolution rule engine.
//!
//! Walks consecutive version pairs of a service schema and classifies the
//! changes. Breaking changes are field removal, type change (narrowing
//! included), and enum-value removal; whether a breaking change fails the
//! check depends on the governing rule's policy.

use ccx_contract::{CompatibilityContract, EvolutionPolicy, EvolutionRule, SchemaVersion};
use serde::{Deserialize, Serialize};

/// What kind of breaking change was found between two versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakingChangeKind {
    /// A field present in the older version is gone.
    FieldRemoved,
    /// A field's type tag changed.
    TypeChanged,
    /// A value disappeared from a field's closed value set.
    EnumValueRemoved,
}

impl BreakingChangeKind {
    /// Stable lowercase string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FieldRemoved => "field_removed",
            Self::TypeChanged => "type_changed",
            Self::EnumValueRemoved => "enum_value_removed",
        }
    }
}

/// One breaking change between two schema versions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakingChange {
    /// The affected field.
    pub field: String,
    /// What broke.
    pub kind: BreakingChangeKind,
    /// Human-readable detail.
    pub detail: String,
}

/// Verdict for one version pair under one rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvolutionCheckResult {
    /// Service the versions belong to.
    pub service: String,
    /// Older version string.
    pub from_version: String,
    /// Newer version string.
    pub to_version: String,
    /// Policy that was applied.
    pub policy: EvolutionPolicy,
    /// `true` iff the change set is allowed under the policy.
    pub passed: bool,
    /// Breaking changes found, regardless of verdict.
    pub breaking_changes: Vec<BreakingChange>,
}

/// Applies evolution rules to declared schema versions.
#[derive(Debug, Clone, Copy, Default)]
pub struct EvolutionTracker;

impl EvolutionTracker {
    /// Create a tracker.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Diff two versions of a schema for breaking changes.
    #[must_use]
    pub fn breaking_changes(from: &SchemaVersion, to: &SchemaVersion) -> Vec<BreakingChange> {
        let mut changes = Vec::new();

        for (field, old_type) in &from.fields {
            match to.fields.get(field) {
                None => changes.push(BreakingChange {
                    field: field.clone(),
                    kind: BreakingChangeKind::FieldRemoved,
                    detail: format!("'{field}' removed in {}", to.version),
                }),
                Some(new_type) if new_type != old_type => changes.push(BreakingChange {
                    field: field.clone(),
                    kind: BreakingChangeKind::TypeChanged,
                    detail: format!("'{field}' changed from {old_type} to {new_type}"),
                }),
                Some(_) => {}
            }
        }

        for (field, old_values) in &from.value_sets {
            let new_values = to.value_sets.get(field);
            for value in old_values {
                let still_there = new_values.is_some_and(|vs| vs.contains(value));
                // A vanished value set only breaks when the field survived.
                if !still_there && to.fields.contains_key(field) {
                    changes.push(BreakingChange {
                        field: field.clone(),
                        kind: BreakingChangeKind::EnumValueRemoved,
                        detail: format!("value '{value}' removed from '{field}'"),
                    });
                }
            }
        }

        changes
    }

    /// Check one version pair under a rule.
    #[must_use]
    pub fn check_pair(
        &self,
        rule: &EvolutionRule,
        from: &SchemaVersion,
        to: &SchemaVersion,
    ) -> EvolutionCheckResult {
        let breaking_changes = Self::breaking_changes(from, to);
        let passed = match rule.policy {
            EvolutionPolicy::AdditiveOnly => breaking_changes.is_empty(),
            EvolutionPolicy::BreakingAllowed => true,
            EvolutionPolicy::MajorVersionRequired => {
                breaking_changes.is_empty() || major_of(&to.version) > major_of(&from.version)
            }
        };

        EvolutionCheckResult {
            service: from.service.clone(),
            from_version: from.version.clone(),
            to_version: to.version.clone(),
            policy: rule.policy,
            passed,
            breaking_changes,
        }
    }

    /// Walk every consecutive version pair of every ruled service in the
    /// contract.
    #[must_use]
    pub fn check_contract(&self, contract: &CompatibilityContract) -> Vec<EvolutionCheckResult> {
        let mut results = Vec::new();
        for rule in &contract.evolution_rules {
            let versions = contract.versions_of(&rule.scope);
            for pair in versions.windows(2) {
                results.push(self.check_pair(rule, pair[0], pair[1]));
            }
        }
        results
    }
}

/// Leading major component of a version string; unparseable strings are
/// treated as major 0.
fn major_of(version: &str) -> u64 {
    version
        .split('.')
        .next()
        .and_then(|major| major.parse().ok())
        .unwrap_or(0)
}
