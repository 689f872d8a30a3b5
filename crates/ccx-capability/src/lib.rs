// SPDX-License-Identifier: MIT OR Apache-2.0
//! Capability attenuation validation — Layer 5.
//!
//! Enforces the monotone attenuation invariant: capabilities only narrow
//! across phase boundaries. For an edge A → B, every capability B runs
//! with must already be in A's snapshot; adding one is an escalation,
//! blocked unless the contract declares an escalation authority for that
//! specific capability — and authorised escalations are still logged.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use ccx_contract::{CapabilityChainSpec, CapabilityContract};
use ccx_core::{
    CapabilityChainStatus, Direction, PropagationEnvelope, Severity, ValidationErrorEnvelope,
};
use ccx_error::ErrorCode;
use ccx_telemetry::{EventSink, attr, event_names};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, warn};

// ---------------------------------------------------------------------------
// Result models
// ---------------------------------------------------------------------------

/// One escalation attempt found at a boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationAttempt {
    /// The capability that widened.
    pub capability: String,
    /// The authority that allowed it, when one is declared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorised_via: Option<String>,
}

impl EscalationAttempt {
    /// Whether the escalation was authorised by a declared authority.
    #[must_use]
    pub fn authorised(&self) -> bool {
        self.authorised_via.is_some()
    }
}

/// Verdict of validating one phase boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityValidationResult {
    /// Phase that was validated.
    pub phase: String,
    /// Which side of the boundary.
    pub direction: Direction,
    /// `true` iff no unauthorised escalation and nothing consumed is
    /// missing.
    pub passed: bool,
    /// Consumed capabilities absent from the phase snapshot.
    pub missing_capabilities: Vec<String>,
    /// Every escalation found, authorised ones included.
    pub escalation_attempts: Vec<EscalationAttempt>,
    /// The snapshot the phase ends up holding.
    pub snapshot: BTreeSet<String>,
}

impl CapabilityValidationResult {
    /// Every violation as a structured error envelope.
    #[must_use]
    pub fn envelopes(&self) -> Vec<ValidationErrorEnvelope> {
        let contract_type = ccx_contract::ContractKind::CapabilityPropagation.as_str();
        let mut envelopes = Vec::new();
        for escalation in &self.escalation_attempts {
            if escalation.authorised() {
                continue;
            }
            envelopes.push(ValidationErrorEnvelope::new(
                contract_type,
                &escalation.capability,
                ErrorCode::Escalation,
                format!(
                    "phase '{}' adds capability '{}' absent from its source snapshot",
                    self.phase, escalation.capability
                ),
                Severity::Blocking,
            ));
        }
        for capability in &self.missing_capabilities {
            envelopes.push(ValidationErrorEnvelope::new(
                contract_type,
                capability,
                ErrorCode::FieldMissing,
                format!(
                    "phase '{}' consumes capability '{}' it does not hold",
                    self.phase, capability
                ),
                Severity::Blocking,
            ));
        }
        envelopes
    }
}

/// Verdict of checking one declared capability chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityChainResult {
    /// Declared chain identifier.
    pub chain_id: String,
    /// Outcome of the check.
    pub status: CapabilityChainStatus,
    /// Whether the source phase has a snapshot.
    pub source_present: bool,
    /// Whether the destination phase has a snapshot.
    pub destination_present: bool,
    /// Human-readable detail.
    pub message: String,
}

// ---------------------------------------------------------------------------
// Validator
// ---------------------------------------------------------------------------

/// Validates capability movement at phase boundaries and maintains
/// snapshots on the envelope.
#[derive(Debug, Clone, Copy, Default)]
pub struct CapabilityValidator;

impl CapabilityValidator {
    /// Create a validator.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Validate the entry boundary of `phase` against the edge from
    /// `previous_phase`, and record the resulting snapshot on the envelope.
    ///
    /// With no previous phase (the first phase of a run), the snapshot is
    /// exactly what the contract grants — there is no source to escalate
    /// against.
    pub fn enter_boundary(
        &self,
        env: &mut PropagationEnvelope,
        contract: &CapabilityContract,
        phase: &str,
        previous_phase: Option<&str>,
    ) -> CapabilityValidationResult {
        let declared = contract.phase(phase).cloned().unwrap_or_default();
        let wanted: BTreeSet<String> = declared
            .granted
            .iter()
            .chain(&declared.produced)
            .cloned()
            .collect();

        // The snapshot records what the phase declares it runs with, even
        // when that widens the source set: enforcement is the verdict's
        // job, and the chain check must be able to see the widening.
        let mut escalation_attempts = Vec::new();
        if let Some(prev) = previous_phase {
            let source = env.capability_snapshots.get(prev).cloned().unwrap_or_default();
            for capability in &wanted {
                if !source.contains(capability) {
                    escalation_attempts.push(EscalationAttempt {
                        capability: capability.clone(),
                        authorised_via: contract
                            .escalation_authority(capability)
                            .map(str::to_string),
                    });
                }
            }
        }
        let snapshot = wanted;

        let missing_capabilities: Vec<String> = declared
            .consumed
            .iter()
            .filter(|c| !snapshot.contains(*c))
            .cloned()
            .collect();

        env.snapshot_capabilities(phase, snapshot.clone());

        let passed = missing_capabilities.is_empty()
            && escalation_attempts.iter().all(EscalationAttempt::authorised);

        CapabilityValidationResult {
            phase: phase.to_string(),
            direction: Direction::Entry,
            passed,
            missing_capabilities,
            escalation_attempts,
            snapshot,
        }
    }

    /// Validate the exit boundary: the snapshot must not have widened while
    /// the phase ran.
    pub fn exit_boundary(
        &self,
        env: &PropagationEnvelope,
        contract: &CapabilityContract,
        phase: &str,
    ) -> CapabilityValidationResult {
        let declared = contract.phase(phase).cloned().unwrap_or_default();
        let snapshot = env
            .capability_snapshots
            .get(phase)
            .cloned()
            .unwrap_or_default();
        let allowed: BTreeSet<&String> =
            declared.granted.iter().chain(&declared.produced).collect();

        let escalation_attempts: Vec<EscalationAttempt> = snapshot
            .iter()
            .filter(|c| !allowed.contains(*c))
            .map(|c| EscalationAttempt {
                capability: c.clone(),
                authorised_via: contract.escalation_authority(c).map(str::to_string),
            })
            .collect();

        let passed = escalation_attempts.iter().all(EscalationAttempt::authorised);

        CapabilityValidationResult {
            phase: phase.to_string(),
            direction: Direction::Exit,
            passed,
            missing_capabilities: Vec::new(),
            escalation_attempts,
            snapshot,
        }
    }

    /// Check one declared chain against the envelope's snapshots.
    #[must_use]
    pub fn check_chain(
        &self,
        env: &PropagationEnvelope,
        contract: &CapabilityContract,
        chain: &CapabilityChainSpec,
    ) -> CapabilityChainResult {
        let source = env.capability_snapshots.get(&chain.source);
        let destination = env.capability_snapshots.get(&chain.destination);

        let (status, message) = match (source, destination) {
            (None, _) | (_, None) => (
                CapabilityChainStatus::Broken,
                format!(
                    "chain '{}' has no snapshot for {}",
                    chain.chain_id,
                    if source.is_none() {
                        &chain.source
                    } else {
                        &chain.destination
                    }
                ),
            ),
            (Some(src), Some(dst)) => {
                let escalated: Vec<&String> = dst.difference(src).collect();
                if escalated.is_empty() {
                    if dst.len() == src.len() {
                        (
                            CapabilityChainStatus::Intact,
                            format!("'{}' holds the full source snapshot", chain.destination),
                        )
                    } else {
                        (
                            CapabilityChainStatus::Attenuated,
                            format!(
                                "'{}' narrowed from {} to {} capabilities",
                                chain.destination,
                                src.len(),
                                dst.len()
                            ),
                        )
                    }
                } else {
                    let unauthorised: Vec<&str> = escalated
                        .iter()
                        .filter(|c| contract.escalation_authority(c).is_none())
                        .map(|c| c.as_str())
                        .collect();
                    if unauthorised.is_empty() {
                        (
                            CapabilityChainStatus::Intact,
                            format!(
                                "escalation(s) [{}] authorised by declared authorities",
                                escalated
                                    .iter()
                                    .map(|c| c.as_str())
                                    .collect::<Vec<_>>()
                                    .join(", ")
                            ),
                        )
                    } else {
                        (
                            CapabilityChainStatus::EscalationBlocked,
                            format!(
                                "'{}' escalates [{}] without authority",
                                chain.destination,
                                unauthorised.join(", ")
                            ),
                        )
                    }
                }
            }
        };

        CapabilityChainResult {
            chain_id: chain.chain_id.clone(),
            status,
            source_present: source.is_some(),
            destination_present: destination.is_some(),
            message,
        }
    }

    /// Check every declared chain.
    #[must_use]
    pub fn check_all(
        &self,
        env: &PropagationEnvelope,
        contract: &CapabilityContract,
    ) -> Vec<CapabilityChainResult> {
        contract
            .chains
            .iter()
            .map(|chain| self.check_chain(env, contract, chain))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Emission
// ---------------------------------------------------------------------------

/// Emit a boundary validation result.
///
/// Event name: `capability.boundary.entry` or `capability.boundary.exit`.
pub fn emit_capability_result(sink: &dyn EventSink, result: &CapabilityValidationResult) {
    let name = match result.direction {
        Direction::Entry => event_names::CAPABILITY_BOUNDARY_ENTRY,
        Direction::Exit => event_names::CAPABILITY_BOUNDARY_EXIT,
    };
    let mut attrs = vec![
        attr("capability.phase", result.phase.as_str()),
        attr("capability.direction", result.direction.as_str()),
        attr("capability.passed", result.passed),
        attr("capability.missing_count", result.missing_capabilities.len()),
        attr("capability.escalation_count", result.escalation_attempts.len()),
    ];
    // First three of each, for quick filtering.
    for (i, capability) in result.missing_capabilities.iter().take(3).enumerate() {
        attrs.push(attr(&format!("capability.missing.{i}"), capability.as_str()));
    }
    for (i, escalation) in result.escalation_attempts.iter().take(3).enumerate() {
        attrs.push(attr(
            &format!("capability.escalation.{i}"),
            escalation.capability.as_str(),
        ));
    }

    if result.passed {
        debug!(
            phase = %result.phase,
            direction = %result.direction,
            "capability boundary passed"
        );
    } else {
        warn!(
            phase = %result.phase,
            direction = %result.direction,
            missing = ?result.missing_capabilities,
            escalations = ?result.escalation_attempts,
            "capability boundary FAILED"
        );
    }

    sink.emit(name, &attrs);
}

/// Emit a chain check result.
///
/// Event name: `capability.chain.{status}`.
pub fn emit_capability_chain_result(sink: &dyn EventSink, result: &CapabilityChainResult) {
    let name = event_names::capability_chain(result.status.as_str());
    let attrs = vec![
        attr("capability.chain_id", result.chain_id.as_str()),
        attr("capability.chain_status", result.status.as_str()),
        attr("capability.source_present", result.source_present),
        attr("capability.destination_present", result.destination_present),
        attr("capability.message", result.message.as_str()),
    ];

    match result.status {
        CapabilityChainStatus::Intact | CapabilityChainStatus::Attenuated => {
            debug!(chain = %result.chain_id, status = result.status.as_str(), "capability chain ok");
        }
        CapabilityChainStatus::EscalationBlocked | CapabilityChainStatus::Broken => {
            warn!(
                chain = %result.chain_id,
                status = result.status.as_str(),
                message = %result.message,
                "capability chain violation"
            );
        }
    }

    sink.emit(&name, &attrs);
}

// ===========================================================================
// Tests
// ===========================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn contract(yaml: &str) -> CapabilityContract {
        serde_yaml::from_str(yaml).unwrap()
    }

    const CONTRACT: &str = "\
schema_version: \"0.1.0\"
pipeline_id: artisan
capabilities:
  - id: read:repo
  - id: write:artifacts
phases:
  plan:
    granted: [read:repo, write:artifacts]
  build:
    granted: [read:repo]
    consumed: [read:repo]
  ship:
    granted: [read:repo, deploy:prod]
chains:
  - chain_id: plan-to-build
    source: plan
    destination: build
  - chain_id: build-to-ship
    source: build
    destination: ship
attenuations:
  - capability: deploy:prod
    can_escalate_via: release-manager
";

    #[test]
    fn first_phase_snapshot_is_the_grant() {
        let validator = CapabilityValidator::new();
        let mut env = PropagationEnvelope::new();
        let result = validator.enter_boundary(&mut env, &contract(CONTRACT), "plan", None);
        assert!(result.passed);
        assert_eq!(result.snapshot.len(), 2);
        assert_eq!(env.capability_snapshots["plan"].len(), 2);
    }

    #[test]
    fn narrowing_passes_and_attenuates() {
        let validator = CapabilityValidator::new();
        let mut env = PropagationEnvelope::new();
        let c = contract(CONTRACT);
        validator.enter_boundary(&mut env, &c, "plan", None);
        let result = validator.enter_boundary(&mut env, &c, "build", Some("plan"));
        assert!(result.passed);
        assert!(result.escalation_attempts.is_empty());

        let chain = validator.check_chain(&env, &c, &c.chains[0]);
        assert_eq!(chain.status, CapabilityChainStatus::Attenuated);
    }

    #[test]
    fn authorised_escalation_passes_but_is_recorded() {
        let validator = CapabilityValidator::new();
        let mut env = PropagationEnvelope::new();
        let c = contract(CONTRACT);
        validator.enter_boundary(&mut env, &c, "plan", None);
        validator.enter_boundary(&mut env, &c, "build", Some("plan"));
        let result = validator.enter_boundary(&mut env, &c, "ship", Some("build"));

        // deploy:prod is not in build's snapshot but has a declared
        // authority: the escalation is allowed yet still listed.
        assert!(result.passed);
        assert_eq!(result.escalation_attempts.len(), 1);
        assert_eq!(
            result.escalation_attempts[0].authorised_via.as_deref(),
            Some("release-manager")
        );
        assert!(result.snapshot.contains("deploy:prod"));
    }

    #[test]
    fn unauthorised_escalation_blocks() {
        let yaml = CONTRACT.replace(
            "attenuations:\n  - capability: deploy:prod\n    can_escalate_via: release-manager\n",
            "",
        );
        let validator = CapabilityValidator::new();
        let mut env = PropagationEnvelope::new();
        let c = contract(&yaml);
        validator.enter_boundary(&mut env, &c, "plan", None);
        validator.enter_boundary(&mut env, &c, "build", Some("plan"));
        let result = validator.enter_boundary(&mut env, &c, "ship", Some("build"));

        assert!(!result.passed);
        assert!(!result.escalation_attempts[0].authorised());
        // The snapshot records the declared (widened) reality.
        assert!(result.snapshot.contains("deploy:prod"));
        let envelopes = result.envelopes();
        assert_eq!(envelopes[0].code, ErrorCode::Escalation);

        // The chain check sees the widening and blocks it.
        let chain = validator.check_chain(&env, &c, &c.chains[1]);
        assert_eq!(chain.status, CapabilityChainStatus::EscalationBlocked);
    }

    #[test]
    fn consuming_an_unheld_capability_fails() {
        let yaml = "\
schema_version: \"0.1.0\"
pipeline_id: p
phases:
  build:
    granted: []
    consumed: [read:repo]
";
        let validator = CapabilityValidator::new();
        let mut env = PropagationEnvelope::new();
        let result = validator.enter_boundary(&mut env, &contract(yaml), "build", None);
        assert!(!result.passed);
        assert_eq!(result.missing_capabilities, vec!["read:repo"]);
    }

    #[test]
    fn chain_with_missing_destination_is_broken_not_blocked() {
        let validator = CapabilityValidator::new();
        let mut env = PropagationEnvelope::new();
        let c = contract(CONTRACT);
        validator.enter_boundary(&mut env, &c, "plan", None);
        // build never entered: destination snapshot missing.
        let chain = validator.check_chain(&env, &c, &c.chains[0]);
        assert_eq!(chain.status, CapabilityChainStatus::Broken);
        assert!(chain.source_present);
        assert!(!chain.destination_present);
    }

    #[test]
    fn identical_snapshots_are_intact() {
        let yaml = "\
schema_version: \"0.1.0\"
pipeline_id: p
phases:
  a:
    granted: [read:repo]
  b:
    granted: [read:repo]
chains:
  - chain_id: a-b
    source: a
    destination: b
";
        let validator = CapabilityValidator::new();
        let mut env = PropagationEnvelope::new();
        let c = contract(yaml);
        validator.enter_boundary(&mut env, &c, "a", None);
        validator.enter_boundary(&mut env, &c, "b", Some("a"));
        let chain = validator.check_chain(&env, &c, &c.chains[0]);
        assert_eq!(chain.status, CapabilityChainStatus::Intact);
    }

    #[test]
    fn escalated_chain_is_escalation_blocked() {
        let yaml = "\
schema_version: \"0.1.0\"
pipeline_id: p
phases:
  a:
    granted: [read:repo]
  b:
    granted: [read:repo]
chains:
  - chain_id: a-b
    source: a
    destination: b
";
        let validator = CapabilityValidator::new();
        let mut env = PropagationEnvelope::new();
        let c = contract(yaml);
        validator.enter_boundary(&mut env, &c, "a", None);
        validator.enter_boundary(&mut env, &c, "b", Some("a"));
        // Simulate a snapshot widened behind the validator's back.
        env.capability_snapshots
            .get_mut("b")
            .unwrap()
            .insert("write:all".to_string());

        let chain = validator.check_chain(&env, &c, &c.chains[0]);
        assert_eq!(chain.status, CapabilityChainStatus::EscalationBlocked);
        assert!(chain.message.contains("write:all"));
    }

    #[test]
    fn exit_boundary_detects_widened_snapshot() {
        let validator = CapabilityValidator::new();
        let mut env = PropagationEnvelope::new();
        let c = contract(CONTRACT);
        validator.enter_boundary(&mut env, &c, "plan", None);
        env.capability_snapshots
            .get_mut("plan")
            .unwrap()
            .insert("write:all".to_string());

        let result = validator.exit_boundary(&env, &c, "plan");
        assert!(!result.passed);
        assert_eq!(result.escalation_attempts[0].capability, "write:all");
    }

    #[test]
    fn emits_status_named_chain_events() {
        let sink = ccx_telemetry::MemorySink::new();
        let validator = CapabilityValidator::new();
        let mut env = PropagationEnvelope::new();
        let c = contract(CONTRACT);
        validator.enter_boundary(&mut env, &c, "plan", None);
        let chain = validator.check_chain(&env, &c, &c.chains[0]);
        emit_capability_chain_result(&sink, &chain);
        assert_eq!(sink.names(), vec!["capability.chain.broken"]);
    }
}
