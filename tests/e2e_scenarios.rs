// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end workflow scenarios exercising the full layer stack through
//! the runtime boundary guard.

use std::sync::Arc;

use ccx_contract::{
    CapabilityContract, ContractLoader, LineageContract, OrderingContract, PropagationContract,
};
use ccx_core::{EnforcementMode, PropagationStatus, TransformOp, WorkflowContext};
use ccx_lineage::LineageTracker;
use ccx_regression::{Baseline, RegressionGate};
use ccx_runtime::{ContractSet, GuardConfig, GuardError, RuntimeBoundaryGuard};
use ccx_telemetry::{MemorySink, event_names};
use serde_json::json;

fn propagation(yaml: &str) -> Arc<PropagationContract> {
    let loader: ContractLoader<PropagationContract> = ContractLoader::new();
    Arc::new(loader.load_from_string(yaml).unwrap())
}

fn guard_with(
    mode: EnforcementMode,
    contracts: ContractSet,
) -> (RuntimeBoundaryGuard, Arc<MemorySink>) {
    let sink = Arc::new(MemorySink::new());
    let guard = RuntimeBoundaryGuard::new(
        GuardConfig {
            pipeline_id: "artisan".to_string(),
            mode,
        },
        contracts,
    )
    .with_sink(sink.clone());
    (guard, sink)
}

// ---------------------------------------------------------------------------
// Scenario 1 — happy path
// ---------------------------------------------------------------------------

const HAPPY: &str = "\
schema_version: \"0.1.0\"
contract_type: context_propagation
pipeline_id: artisan
phases:
  plan:
    exit:
      required:
        - name: domain
          type: str
          severity: blocking
  build:
    entry:
      enrichment:
        - name: domain
          type: str
          severity: warning
          default: unknown
propagation_chains:
  - chain_id: d
    source: {phase: plan, field: domain}
    destination: {phase: build, field: domain}
    severity: warning
";

#[test]
fn happy_path_scores_one_hundred() {
    let (mut guard, sink) = guard_with(
        EnforcementMode::Strict,
        ContractSet {
            propagation: Some(propagation(HAPPY)),
            ..ContractSet::default()
        },
    );
    let mut ctx = WorkflowContext::new();
    guard.preflight(&ctx);

    guard.enter_phase(&mut ctx, "plan").unwrap();
    ctx.insert("domain", json!("payments"));
    ctx.envelope
        .set_provenance("domain", "plan", PropagationStatus::Propagated);
    guard.exit_phase(&mut ctx, "plan").unwrap();
    guard.enter_phase(&mut ctx, "build").unwrap();
    guard.exit_phase(&mut ctx, "build").unwrap();

    let summary = guard.finish_run(&ctx);
    assert!(summary.overall_passed);
    assert_eq!(summary.overall_status, PropagationStatus::Propagated);
    assert_eq!(summary.health.overall, 100.0);
    assert_eq!(summary.total_blocking_failures, 0);
    assert_eq!(
        ctx.envelope.status_of("domain"),
        Some(PropagationStatus::Propagated)
    );

    // No alert fired; nothing blocking was emitted.
    assert!(!summary.alerts.has_firing_alerts());
    assert_eq!(sink.count_of(event_names::CONTEXT_OBSERVABILITY_ALERT), 0);
}

// ---------------------------------------------------------------------------
// Scenario 2 — silent default
// ---------------------------------------------------------------------------

/// Nine fields flow cleanly; `domain` is enriched from its default. One
/// degraded chain out of ten puts completeness at 90, and the seed
/// enrichment gap costs preflight two points: overall lands near 95.
fn silent_default_contract() -> String {
    let mut yaml = String::from(
        "schema_version: \"0.1.0\"
contract_type: context_propagation
pipeline_id: artisan
phase_order: [plan, build]
phases:
  plan:
    exit:
      required:
",
    );
    for i in 0..9 {
        yaml.push_str(&format!(
            "        - name: f{i}\n          type: str\n          severity: blocking\n"
        ));
    }
    yaml.push_str(
        "  build:
    entry:
      enrichment:
        - name: domain
          type: str
          severity: warning
          default: unknown
propagation_chains:
  - chain_id: domain-flow
    source: {phase: plan, field: domain}
    destination: {phase: build, field: domain}
    severity: warning
",
    );
    for i in 0..9 {
        yaml.push_str(&format!(
            "  - chain_id: c{i}\n    source: {{phase: plan, field: f{i}}}\n    destination: {{phase: build, field: f{i}}}\n"
        ));
    }
    yaml
}

#[test]
fn silent_default_degrades_the_chain_and_the_score() {
    let (mut guard, sink) = guard_with(
        EnforcementMode::Permissive,
        ContractSet {
            propagation: Some(propagation(&silent_default_contract())),
            ..ContractSet::default()
        },
    );
    let mut ctx = WorkflowContext::new();
    let preflight = guard.preflight(&ctx).clone();
    assert!(preflight.passed);
    assert_eq!(preflight.warning_count(), 1);

    guard.enter_phase(&mut ctx, "plan").unwrap();
    for i in 0..9 {
        let field = format!("f{i}");
        ctx.insert(field.clone(), json!("value"));
        ctx.envelope
            .set_provenance(&field, "plan", PropagationStatus::Propagated);
    }
    // plan never writes 'domain'.
    guard.exit_phase(&mut ctx, "plan").unwrap();
    guard.enter_phase(&mut ctx, "build").unwrap();
    guard.exit_phase(&mut ctx, "build").unwrap();

    assert_eq!(ctx.get("domain"), Some(&json!("unknown")));
    assert_eq!(
        ctx.envelope.status_of("domain"),
        Some(PropagationStatus::Defaulted)
    );

    let summary = guard.finish_run(&ctx);
    assert_eq!(summary.overall_status, PropagationStatus::Defaulted);
    assert_eq!(summary.total_defaults_applied, 1);
    assert_eq!(summary.postexec.chains_degraded, 1);
    assert_eq!(summary.postexec.chains_intact, 9);
    assert!(
        (summary.health.overall - 95.1).abs() < 0.5,
        "overall {} not near 95",
        summary.health.overall
    );
    assert_eq!(sink.count_of(event_names::CONTEXT_PREFLIGHT_VIOLATION), 1);
}

// ---------------------------------------------------------------------------
// Scenario 3 — escalation
// ---------------------------------------------------------------------------

const ESCALATION: &str = "\
schema_version: \"0.1.0\"
contract_type: capability_propagation
pipeline_id: artisan
capabilities:
  - id: read:repo
  - id: write:all
phases:
  plan:
    granted: [read:repo]
  build:
    granted: [read:repo, write:all]
chains:
  - chain_id: plan-to-build
    source: plan
    destination: build
";

fn escalation_contracts() -> ContractSet {
    let loader: ContractLoader<CapabilityContract> = ContractLoader::new();
    ContractSet {
        capability: Some(Arc::new(loader.load_from_string(ESCALATION).unwrap())),
        ..ContractSet::default()
    }
}

#[test]
fn unauthorised_escalation_throws_in_strict_mode() {
    let (mut guard, _sink) = guard_with(EnforcementMode::Strict, escalation_contracts());
    let mut ctx = WorkflowContext::new();
    guard.enter_phase(&mut ctx, "plan").unwrap();
    guard.exit_phase(&mut ctx, "plan").unwrap();

    let err = guard.enter_phase(&mut ctx, "build").unwrap_err();
    match err {
        GuardError::Violation(violation) => {
            assert_eq!(violation.phase, "build");
            assert!(violation.to_string().contains("ESCALATION"));
        }
        other => panic!("expected violation, got {other:?}"),
    }
}

#[test]
fn unauthorised_escalation_continues_in_audit_mode() {
    let (mut guard, sink) = guard_with(EnforcementMode::Audit, escalation_contracts());
    let mut ctx = WorkflowContext::new();
    guard.enter_phase(&mut ctx, "plan").unwrap();
    guard.exit_phase(&mut ctx, "plan").unwrap();
    let report = guard.enter_phase(&mut ctx, "build").unwrap();
    assert!(!report.passed);
    guard.exit_phase(&mut ctx, "build").unwrap();

    let summary = guard.finish_run(&ctx);
    assert!(!summary.overall_passed);
    assert_eq!(
        summary.capability_chains[0].status,
        ccx_core::CapabilityChainStatus::EscalationBlocked
    );
    assert_eq!(sink.count_of("capability.chain.escalation_blocked"), 1);
}

// ---------------------------------------------------------------------------
// Scenario 4 — ordering violation
// ---------------------------------------------------------------------------

const ORDERING: &str = "\
schema_version: \"0.1.0\"
contract_type: causal_ordering
pipeline_id: artisan
dependencies:
  - before: {phase: plan, event: committed}
    after: {phase: build, event: started}
    severity: blocking
";

#[test]
fn misordered_events_violate_and_drag_the_score() {
    let loader: ContractLoader<OrderingContract> = ContractLoader::new();
    let (mut guard, sink) = guard_with(
        EnforcementMode::Permissive,
        ContractSet {
            ordering: Some(Arc::new(loader.load_from_string(ORDERING).unwrap())),
            ..ContractSet::default()
        },
    );

    let mut ctx = WorkflowContext::new();
    ctx.envelope.record_event("plan", "started", vec![]); // ts=1
    ctx.envelope.record_event("build", "started", vec![]); // ts=2
    ctx.envelope.record_event("plan", "committed", vec![]); // ts=3

    let report = guard.enter_phase(&mut ctx, "ship").unwrap();
    let ordering = report.ordering.unwrap();
    assert!(!ordering.passed);
    assert_eq!(ordering.results[0].before_ts, Some(3));
    assert_eq!(ordering.results[0].after_ts, Some(2));
    guard.exit_phase(&mut ctx, "ship").unwrap();

    let summary = guard.finish_run(&ctx);
    assert!(summary.health.overall < 100.0);
    assert!(!summary.overall_passed);
    assert_eq!(sink.count_of(event_names::CAUSAL_ORDERING_VIOLATION), 1);
    assert!(
        summary
            .alerts
            .critical_alerts()
            .iter()
            .any(|a| a.rule_id == "boundary_blocking_failure")
    );
}

// ---------------------------------------------------------------------------
// Scenario 5 — lineage mutation
// ---------------------------------------------------------------------------

const LINEAGE: &str = "\
schema_version: \"0.1.0\"
contract_type: data_lineage
pipeline_id: artisan
chains:
  - chain_id: domain-lineage
    field: domain
    stages:
      - {phase: plan, operation: ingest}
      - {phase: build, operation: transform}
";

#[test]
fn lineage_mutation_fires_an_alert_without_touching_completeness() {
    let loader: ContractLoader<LineageContract> = ContractLoader::new();
    let (mut guard, sink) = guard_with(
        EnforcementMode::Permissive,
        ContractSet {
            lineage: Some(Arc::new(loader.load_from_string(LINEAGE).unwrap())),
            ..ContractSet::default()
        },
    );

    let tracker = LineageTracker::new();
    let mut ctx = WorkflowContext::new();
    tracker.record(
        &mut ctx.envelope,
        "domain",
        "plan",
        TransformOp::Ingest,
        &json!(null),
        &json!("payments"),
    );
    // The build stage reads something other than what plan produced.
    tracker.record(
        &mut ctx.envelope,
        "domain",
        "build",
        TransformOp::Transform,
        &json!("tampered"),
        &json!("payments-normalized"),
    );

    let summary = guard.finish_run(&ctx);
    let audit = summary.lineage_audit.as_ref().unwrap();
    assert_eq!(
        audit.results[0].status,
        ccx_lineage::LineageAuditStatus::MutationDetected
    );
    // Completeness measures propagation chains, not lineage.
    assert_eq!(summary.health.completeness_score, 100.0);
    assert!(!summary.overall_passed);
    assert!(
        summary
            .alerts
            .critical_alerts()
            .iter()
            .any(|a| a.rule_id == "lineage_mutation")
    );
    assert_eq!(sink.count_of("lineage.chain.mutation_detected"), 1);
}

// ---------------------------------------------------------------------------
// Scenario 6 — regression
// ---------------------------------------------------------------------------

#[test]
fn regression_gate_fails_on_score_drop_and_new_blocking() {
    let mut baseline_metrics = std::collections::BTreeMap::new();
    baseline_metrics.insert("boundary_blocking_failures".to_string(), 0.0);
    let baseline = Baseline::capture("artisan", 92.0, baseline_metrics);

    let mut current = std::collections::BTreeMap::new();
    current.insert("overall_score".to_string(), 78.0);
    current.insert("boundary_blocking_failures".to_string(), 3.0);

    let gate = RegressionGate::new();
    let result = gate.evaluate(&baseline, &current, None);
    assert!(!result.passed);
    assert_eq!(
        result.failed_checks,
        vec!["overall_no_worse", "boundary_no_new_blocking"]
    );

    // Failure detail lists baseline vs current for each failing check.
    let overall = result
        .checks
        .iter()
        .find(|c| c.check_id == "overall_no_worse")
        .unwrap();
    assert!(overall.detail.contains("92"));
    assert!(overall.detail.contains("78"));

    let sink = MemorySink::new();
    ccx_regression::emit_gate_result(&sink, &result);
    for check in &result.checks {
        ccx_regression::emit_gate_check(&sink, check);
    }
    assert_eq!(sink.count_of(event_names::CONTEXT_REGRESSION_GATE), 1);
    assert_eq!(sink.count_of(event_names::CONTEXT_REGRESSION_GATE_CHECK), 3);
}
