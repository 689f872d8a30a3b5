// SPDX-License-Identifier: MIT OR Apache-2.0
//! Pre-flight verification — Layer 3.
//!
//! Before any phase runs, builds a static view of the declared phase graph
//! (edges implied by propagation chains plus explicit `phase_order`
//! metadata), checks it for cycles, self-edges, unreachable and undeclared
//! phases, and checks the seed context: every `entry.required` field must
//! be provided by the seed or by a preceding phase's exit.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use ccx_contract::PropagationContract;
use ccx_core::{Severity, ValidationErrorEnvelope};
use ccx_error::ErrorCode;
use ccx_telemetry::{EventSink, attr, event_names};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

// ---------------------------------------------------------------------------
// Result models
// ---------------------------------------------------------------------------

/// What is wrong with the declared phase graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseGraphIssueKind {
    /// The graph contains a cycle (a self-edge counts).
    Cycle,
    /// A declared phase cannot be reached from any root.
    Unreachable,
    /// A chain endpoint names a phase the contract does not declare.
    UnknownPhase,
}

impl PhaseGraphIssueKind {
    /// Stable lowercase string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cycle => "cycle",
            Self::Unreachable => "unreachable",
            Self::UnknownPhase => "unknown_phase",
        }
    }
}

/// One phase graph problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseGraphIssue {
    /// What kind of problem.
    pub kind: PhaseGraphIssueKind,
    /// The phase at fault.
    pub phase: String,
    /// Human-readable detail.
    pub detail: String,
}

/// One required field that nothing is declared to provide.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldReadinessDetail {
    /// The field in question.
    pub field: String,
    /// The phase whose entry requires it.
    pub phase: String,
    /// Why the field is not ready.
    pub reason: String,
}

/// One preflight finding at its declared severity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreflightViolation {
    /// Which check produced the finding (`field_readiness` or
    /// `phase_graph`).
    pub check_type: String,
    /// The phase concerned.
    pub phase: String,
    /// The field concerned, for readiness findings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// Severity of the finding.
    pub severity: Severity,
    /// Human-readable message.
    pub message: String,
}

/// Aggregate preflight verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreflightResult {
    /// `true` iff no blocking finding was made.
    pub passed: bool,
    /// Number of phases examined.
    pub phases_checked: usize,
    /// Number of entry-required fields examined.
    pub fields_checked: usize,
    /// Every finding.
    pub violations: Vec<PreflightViolation>,
    /// Graph problems, also reflected in `violations`.
    pub graph_issues: Vec<PhaseGraphIssue>,
    /// Readiness details, also reflected in `violations`.
    pub readiness: Vec<FieldReadinessDetail>,
}

impl PreflightResult {
    /// Number of blocking findings.
    #[must_use]
    pub fn critical_count(&self) -> usize {
        self.violations
            .iter()
            .filter(|v| v.severity == Severity::Blocking)
            .count()
    }

    /// Number of warning findings.
    #[must_use]
    pub fn warning_count(&self) -> usize {
        self.violations
            .iter()
            .filter(|v| v.severity == Severity::Warning)
            .count()
    }

    /// Every finding as a structured error envelope.
    #[must_use]
    pub fn envelopes(&self) -> Vec<ValidationErrorEnvelope> {
        let contract_type = ccx_contract::ContractKind::ContextPropagation.as_str();
        self.violations
            .iter()
            .map(|v| {
                let code = if v.check_type == "phase_graph" {
                    ErrorCode::PhaseGraphCycle
                } else {
                    ErrorCode::FieldMissing
                };
                ValidationErrorEnvelope::new(
                    contract_type,
                    v.field.as_deref().unwrap_or(&v.phase),
                    code,
                    &v.message,
                    v.severity,
                )
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Checker
// ---------------------------------------------------------------------------

/// Static checker for seed context and phase graph.
#[derive(Debug, Clone, Copy, Default)]
pub struct PreflightChecker;

impl PreflightChecker {
    /// Create a checker.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Run every static check.
    #[must_use]
    pub fn check(
        &self,
        contract: &PropagationContract,
        seed: &BTreeMap<String, Value>,
    ) -> PreflightResult {
        let graph = PhaseGraph::build(contract);
        let mut violations = Vec::new();

        let graph_issues = graph.issues(contract);
        for issue in &graph_issues {
            let severity = match issue.kind {
                PhaseGraphIssueKind::Cycle => Severity::Blocking,
                PhaseGraphIssueKind::Unreachable | PhaseGraphIssueKind::UnknownPhase => {
                    Severity::Warning
                }
            };
            violations.push(PreflightViolation {
                check_type: "phase_graph".to_string(),
                phase: issue.phase.clone(),
                field: None,
                severity,
                message: issue.detail.clone(),
            });
        }

        // Which phases export which fields at exit.
        let mut exporters: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for (phase, spec) in &contract.phases {
            for field in &spec.exit.required {
                exporters.entry(field.name.as_str()).or_default().push(phase);
            }
        }

        let mut readiness = Vec::new();
        let mut fields_checked = 0;
        for (phase, spec) in &contract.phases {
            for field in &spec.entry.required {
                fields_checked += 1;
                if seed.contains_key(&field.name) {
                    continue;
                }
                let provided = exporters
                    .get(field.name.as_str())
                    .is_some_and(|phases| phases.iter().any(|q| graph.precedes(q, phase)));
                if provided {
                    continue;
                }
                let reason = format!(
                    "'{}' is not in the seed context and no prior phase exit provides it",
                    field.name
                );
                readiness.push(FieldReadinessDetail {
                    field: field.name.clone(),
                    phase: phase.clone(),
                    reason: reason.clone(),
                });
                violations.push(PreflightViolation {
                    check_type: "field_readiness".to_string(),
                    phase: phase.clone(),
                    field: Some(field.name.clone()),
                    severity: field.severity,
                    message: reason,
                });
            }

            // Seed enrichment gaps: an enrichment field nothing provides
            // will fall back to its default at runtime (a warning), or
            // behave like a missing required field when it has none.
            for field in &spec.entry.enrichment {
                fields_checked += 1;
                if seed.contains_key(&field.name) {
                    continue;
                }
                let provided = exporters
                    .get(field.name.as_str())
                    .is_some_and(|phases| phases.iter().any(|q| graph.precedes(q, phase)));
                if provided {
                    continue;
                }
                if field.default.is_some() {
                    violations.push(PreflightViolation {
                        check_type: "seed_enrichment".to_string(),
                        phase: phase.clone(),
                        field: Some(field.name.clone()),
                        severity: Severity::Warning,
                        message: format!(
                            "'{}' is neither seeded nor provided; it will fall back to its default",
                            field.name
                        ),
                    });
                } else {
                    let reason = format!(
                        "enrichment field '{}' has no default and nothing provides it",
                        field.name
                    );
                    readiness.push(FieldReadinessDetail {
                        field: field.name.clone(),
                        phase: phase.clone(),
                        reason: reason.clone(),
                    });
                    violations.push(PreflightViolation {
                        check_type: "field_readiness".to_string(),
                        phase: phase.clone(),
                        field: Some(field.name.clone()),
                        severity: field.severity,
                        message: reason,
                    });
                }
            }
        }

        let passed = violations
            .iter()
            .all(|v| v.severity != Severity::Blocking);

        PreflightResult {
            passed,
            phases_checked: contract.phases.len(),
            fields_checked,
            violations,
            graph_issues,
            readiness,
        }
    }
}

// ---------------------------------------------------------------------------
// Phase graph
// ---------------------------------------------------------------------------

/// Static view of the declared phase graph.
struct PhaseGraph {
    nodes: BTreeSet<String>,
    edges: BTreeMap<String, BTreeSet<String>>,
    order: Vec<String>,
}

impl PhaseGraph {
    fn build(contract: &PropagationContract) -> Self {
        let mut nodes: BTreeSet<String> = contract.phases.keys().cloned().collect();
        let mut edges: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

        for pair in contract.phase_order.windows(2) {
            nodes.insert(pair[0].clone());
            nodes.insert(pair[1].clone());
            edges
                .entry(pair[0].clone())
                .or_default()
                .insert(pair[1].clone());
        }
        for chain in &contract.propagation_chains {
            nodes.insert(chain.source.phase.clone());
            nodes.insert(chain.destination.phase.clone());
            edges
                .entry(chain.source.phase.clone())
                .or_default()
                .insert(chain.destination.phase.clone());
        }

        Self {
            nodes,
            edges,
            order: contract.phase_order.clone(),
        }
    }

    /// Whether `from` precedes `to`: by explicit order when both are
    /// listed, otherwise by graph reachability.
    fn precedes(&self, from: &str, to: &str) -> bool {
        if from == to {
            return false;
        }
        let from_idx = self.order.iter().position(|p| p == from);
        let to_idx = self.order.iter().position(|p| p == to);
        if let (Some(f), Some(t)) = (from_idx, to_idx) {
            return f < t;
        }
        self.reachable_from(from).contains(to)
    }

    fn reachable_from(&self, start: &str) -> BTreeSet<String> {
        let mut seen = BTreeSet::new();
        let mut stack = vec![start.to_string()];
        while let Some(node) = stack.pop() {
            if let Some(next) = self.edges.get(&node) {
                for n in next {
                    if seen.insert(n.clone()) {
                        stack.push(n.clone());
                    }
                }
            }
        }
        seen
    }

    fn issues(&self, contract: &PropagationContract) -> Vec<PhaseGraphIssue> {
        let mut issues = Vec::new();

        // Cycles: a node reaching itself, self-edges included.
        for node in &self.nodes {
            if self.reachable_from(node).contains(node) {
                issues.push(PhaseGraphIssue {
                    kind: PhaseGraphIssueKind::Cycle,
                    phase: node.clone(),
                    detail: format!("phase '{node}' participates in a cycle"),
                });
            }
        }

        // Unreachable: nodes with incoming edges exist, roots exist, and
        // the node is not reachable from any root.
        let mut has_incoming: BTreeSet<&String> = BTreeSet::new();
        for targets in self.edges.values() {
            has_incoming.extend(targets);
        }
        let roots: Vec<&String> = self
            .nodes
            .iter()
            .filter(|n| !has_incoming.contains(*n))
            .collect();
        if !roots.is_empty() {
            let mut reachable: BTreeSet<String> =
                roots.iter().map(|r| (*r).clone()).collect();
            for root in &roots {
                reachable.extend(self.reachable_from(root));
            }
            for node in &self.nodes {
                // Isolated phases (no edges at all) are roots themselves,
                // so only connected-but-orphaned nodes land here.
                if !reachable.contains(node) {
                    issues.push(PhaseGraphIssue {
                        kind: PhaseGraphIssueKind::Unreachable,
                        phase: node.clone(),
                        detail: format!("phase '{node}' is unreachable from any root phase"),
                    });
                }
            }
        }

        // Chain endpoints pointing at undeclared phases.
        for chain in &contract.propagation_chains {
            for phase in [&chain.source.phase, &chain.destination.phase] {
                if !contract.phases.contains_key(phase)
                    && !contract.phase_order.contains(phase)
                {
                    issues.push(PhaseGraphIssue {
                        kind: PhaseGraphIssueKind::UnknownPhase,
                        phase: phase.clone(),
                        detail: format!(
                            "chain '{}' references undeclared phase '{phase}'",
                            chain.chain_id
                        ),
                    });
                }
            }
        }

        issues
    }
}

// ---------------------------------------------------------------------------
// Emission
// ---------------------------------------------------------------------------

/// Emit the preflight summary span event.
///
/// Event name: `context.preflight.result`.
pub fn emit_preflight_result(sink: &dyn EventSink, result: &PreflightResult) {
    let attrs = vec![
        attr("preflight.passed", result.passed),
        attr("preflight.phases_checked", result.phases_checked),
        attr("preflight.fields_checked", result.fields_checked),
        attr("preflight.violations", result.violations.len()),
        attr("preflight.critical_count", result.critical_count()),
        attr("preflight.warning_count", result.warning_count()),
    ];

    if result.passed {
        debug!(
            phases = result.phases_checked,
            fields = result.fields_checked,
            "preflight passed"
        );
    } else {
        warn!(
            critical = result.critical_count(),
            warnings = result.warning_count(),
            "preflight FAILED"
        );
    }

    sink.emit(event_names::CONTEXT_PREFLIGHT_RESULT, &attrs);
}

/// Emit one preflight violation as a span event.
///
/// Event name: `context.preflight.violation`.
pub fn emit_preflight_violation(sink: &dyn EventSink, violation: &PreflightViolation) {
    let mut attrs = vec![
        attr("preflight.check_type", violation.check_type.as_str()),
        attr("preflight.phase", violation.phase.as_str()),
        attr("preflight.severity", violation.severity.as_str()),
        attr("preflight.message", violation.message.as_str()),
    ];
    if let Some(field) = &violation.field {
        attrs.push(attr("preflight.field", field.as_str()));
    }

    warn!(
        check = %violation.check_type,
        phase = %violation.phase,
        severity = violation.severity.as_str(),
        message = %violation.message,
        "preflight violation"
    );

    sink.emit(event_names::CONTEXT_PREFLIGHT_VIOLATION, &attrs);
}
