// SPDX-License-Identifier: MIT OR Apache-2.0

//! Propagation chain reconciliation against envelope provenance.

use ccx_contract::{PropagationChainSpec, PropagationContract};
use ccx_core::{PropagationEnvelope, PropagationStatus, Severity, WorkflowContext};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of reconciling one declared propagation chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainStatus {
    /// The destination field is present with `propagated` status.
    Intact,
    /// The destination field is present but `defaulted` or `partial`.
    Degraded,
    /// The destination field is absent or `failed`.
    Broken,
}

impl ChainStatus {
    /// Stable lowercase string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Intact => "intact",
            Self::Degraded => "degraded",
            Self::Broken => "broken",
        }
    }
}

impl fmt::Display for ChainStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verdict for one chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropagationChainResult {
    /// Declared chain identifier.
    pub chain_id: String,
    /// Reconciliation status.
    pub status: ChainStatus,
    /// Declared severity of the chain.
    pub severity: Severity,
    /// Human-readable detail.
    pub detail: String,
}

/// Records field writes on the envelope and reconciles declared chains.
#[derive(Debug, Clone, Copy, Default)]
pub struct PropagationTracker;

impl PropagationTracker {
    /// Create a tracker.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Record that `phase` wrote `field` as a real (non-default) value.
    pub fn mark_propagated(&self, env: &mut PropagationEnvelope, field: &str, phase: &str) -> u64 {
        env.set_provenance(field, phase, PropagationStatus::Propagated)
    }

    /// Record that `phase` produced `field` only partially.
    pub fn mark_partial(&self, env: &mut PropagationEnvelope, field: &str, phase: &str) -> u64 {
        env.set_provenance(field, phase, PropagationStatus::Partial)
    }

    /// Record that `field` could not be produced by `phase`.
    pub fn mark_failed(&self, env: &mut PropagationEnvelope, field: &str, phase: &str) -> u64 {
        env.set_provenance(field, phase, PropagationStatus::Failed)
    }

    /// Reconcile a single declared chain against the context and envelope.
    #[must_use]
    pub fn check_chain(
        &self,
        ctx: &WorkflowContext,
        chain: &PropagationChainSpec,
    ) -> PropagationChainResult {
        let field = &chain.destination.field;
        let status = match (ctx.contains_field(field), ctx.envelope.status_of(field)) {
            (false, _) => ChainStatus::Broken,
            (true, Some(PropagationStatus::Failed)) => ChainStatus::Broken,
            (true, Some(PropagationStatus::Defaulted | PropagationStatus::Partial)) => {
                ChainStatus::Degraded
            }
            // Present with propagated provenance, or present with no record
            // (seeded before the run started).
            (true, Some(PropagationStatus::Propagated) | None) => ChainStatus::Intact,
        };

        let detail = match status {
            ChainStatus::Intact => format!(
                "'{}' arrived at {} intact",
                field, chain.destination.phase
            ),
            ChainStatus::Degraded => format!(
                "'{}' arrived at {} with status {}",
                field,
                chain.destination.phase,
                ctx.envelope
                    .status_of(field)
                    .map(|s| s.as_str())
                    .unwrap_or("unknown")
            ),
            ChainStatus::Broken => format!(
                "'{}' never arrived at {}",
                field, chain.destination.phase
            ),
        };

        PropagationChainResult {
            chain_id: chain.chain_id.clone(),
            status,
            severity: chain.severity,
            detail,
        }
    }

    /// Reconcile every declared chain.
    #[must_use]
    pub fn check_all(
        &self,
        ctx: &WorkflowContext,
        contract: &PropagationContract,
    ) -> Vec<PropagationChainResult> {
        contract
            .propagation_chains
            .iter()
            .map(|chain| self.check_chain(ctx, chain))
            .collect()
    }
}

// ===========================================================================
// Tests
// ===========================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use ccx_contract::ChainEndpoint;
    use serde_json::json;

    fn chain(field: &str) -> PropagationChainSpec {
        PropagationChainSpec {
            chain_id: format!("{field}-flow"),
            source: ChainEndpoint {
                phase: "plan".into(),
                field: field.into(),
            },
            destination: ChainEndpoint {
                phase: "build".into(),
                field: field.into(),
            },
            severity: Severity::Warning,
            description: None,
        }
    }

    #[test]
    fn propagated_field_is_intact() {
        let tracker = PropagationTracker::new();
        let mut ctx = WorkflowContext::new();
        ctx.insert("domain", json!("payments"));
        tracker.mark_propagated(&mut ctx.envelope, "domain", "plan");

        let result = tracker.check_chain(&ctx, &chain("domain"));
        assert_eq!(result.status, ChainStatus::Intact);
    }

    #[test]
    fn defaulted_field_is_degraded() {
        let tracker = PropagationTracker::new();
        let mut ctx = WorkflowContext::new();
        ctx.insert("domain", json!("unknown"));
        ctx.envelope.apply_default("domain", "build");

        let result = tracker.check_chain(&ctx, &chain("domain"));
        assert_eq!(result.status, ChainStatus::Degraded);
        assert!(result.detail.contains("defaulted"));
    }

    #[test]
    fn missing_field_is_broken() {
        let tracker = PropagationTracker::new();
        let ctx = WorkflowContext::new();
        let result = tracker.check_chain(&ctx, &chain("domain"));
        assert_eq!(result.status, ChainStatus::Broken);
    }

    #[test]
    fn failed_provenance_is_broken_even_if_present() {
        let tracker = PropagationTracker::new();
        let mut ctx = WorkflowContext::new();
        ctx.insert("domain", json!("junk"));
        tracker.mark_failed(&mut ctx.envelope, "domain", "plan");

        let result = tracker.check_chain(&ctx, &chain("domain"));
        assert_eq!(result.status, ChainStatus::Broken);
    }

    #[test]
    fn seeded_field_without_provenance_is_intact() {
        let tracker = PropagationTracker::new();
        let mut ctx = WorkflowContext::new();
        ctx.insert("domain", json!("payments"));

        let result = tracker.check_chain(&ctx, &chain("domain"));
        assert_eq!(result.status, ChainStatus::Intact);
    }

    #[test]
    fn check_all_covers_every_declared_chain() {
        let yaml = "\
schema_version: \"0.1.0\"
pipeline_id: p
phases: {}
propagation_chains:
  - chain_id: a
    source: {phase: plan, field: x}
    destination: {phase: build, field: x}
  - chain_id: b
    source: {phase: plan, field: y}
    destination: {phase: build, field: y}
";
        let contract: PropagationContract = serde_yaml::from_str(yaml).unwrap();
        let tracker = PropagationTracker::new();
        let mut ctx = WorkflowContext::new();
        ctx.insert("x", json!(1));
        tracker.mark_propagated(&mut ctx.envelope, "x", "plan");

        let results = tracker.check_all(&ctx, &contract);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].status, ChainStatus::Intact);
        assert_eq!(results[1].status, ChainStatus::Broken);
    }
}
