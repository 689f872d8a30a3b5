// SPDX-License-Identifier: MIT OR Apache-2.0

//! Causal ordering contract — Layer 4.
//!
//! Declares happens-before dependencies between pipeline events. Each
//! dependency requires the `before` event to carry a strictly lower logical
//! timestamp than the `after` event.

use crate::{ContractDocument, ContractKind};
use ccx_core::Severity;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A phase + event pair identifying a point in the pipeline timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct CausalEndpoint {
    /// Pipeline phase name.
    pub phase: String,
    /// Event name within the phase.
    pub event: String,
}

impl CausalEndpoint {
    /// `phase.event` tag used in logs and span attributes.
    #[must_use]
    pub fn tag(&self) -> String {
        format!("{}.{}", self.phase, self.event)
    }
}

/// A happens-before relationship between two pipeline events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct CausalDependency {
    /// Event that must happen first.
    pub before: CausalEndpoint,
    /// Event that must happen second.
    pub after: CausalEndpoint,
    /// Severity when the ordering is violated or unverifiable.
    #[serde(default = "default_warning")]
    pub severity: Severity,
    /// Why this ordering matters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

fn default_warning() -> Severity {
    Severity::Warning
}

/// Discriminator for ordering contracts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum OrderingDiscriminator {
    /// The only accepted literal: `causal_ordering`.
    #[default]
    CausalOrdering,
}

/// Root model of a causal ordering contract YAML file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct OrderingContract {
    /// Contract schema version.
    pub schema_version: String,
    /// Discriminator; wrong literals are rejected at parse time.
    #[serde(default)]
    pub contract_type: OrderingDiscriminator,
    /// Pipeline this contract governs.
    pub pipeline_id: String,
    /// Declared happens-before dependencies.
    #[serde(default)]
    pub dependencies: Vec<CausalDependency>,
    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ContractDocument for OrderingContract {
    const KIND: ContractKind = ContractKind::CausalOrdering;

    fn schema_version(&self) -> &str {
        &self.schema_version
    }

    fn scope_id(&self) -> &str {
        &self.pipeline_id
    }
}

// ===========================================================================
// Tests
// ===========================================================================
#[cfg(test)]
mod tests {
    use super::*;

    const CONTRACT: &str = "\
schema_version: \"0.1.0\"
contract_type: causal_ordering
pipeline_id: artisan
dependencies:
  - before: {phase: plan, event: committed}
    after: {phase: build, event: started}
    severity: blocking
  - before: {phase: build, event: finished}
    after: {phase: ship, event: started}
";

    #[test]
    fn contract_parses() {
        let c: OrderingContract = serde_yaml::from_str(CONTRACT).unwrap();
        assert_eq!(c.dependencies.len(), 2);
        assert_eq!(c.dependencies[0].severity, Severity::Blocking);
        // Unspecified severity defaults to warning.
        assert_eq!(c.dependencies[1].severity, Severity::Warning);
    }

    #[test]
    fn endpoint_tag_joins_phase_and_event() {
        let ep = CausalEndpoint {
            phase: "plan".into(),
            event: "committed".into(),
        };
        assert_eq!(ep.tag(), "plan.committed");
    }

    #[test]
    fn missing_endpoint_key_rejected() {
        let bad = "\
schema_version: \"0.1.0\"
pipeline_id: p
dependencies:
  - before: {phase: plan}
    after: {phase: build, event: started}
";
        assert!(serde_yaml::from_str::<OrderingContract>(bad).is_err());
    }
}
