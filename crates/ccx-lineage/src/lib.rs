// SPDX-License-Identifier: MIT OR Apache-2.0
//! Data lineage tracking and auditing — Layer 7.
//!
//! The tracker hashes every transformation's input and output values and
//! appends a [`TransformationRecord`](ccx_core::TransformationRecord) to the
//! envelope with a fresh logical timestamp. The auditor compares recorded
//! stages with the declared chain: a chain verifies iff recorded stages
//! equal declared stages in order AND every adjacent record pair links
//! (`stage[i+1].input_hash == stage[i].output_hash`).

#![deny(unsafe_code)]
#![warn(missing_docs)]

use ccx_contract::{LineageChainSpec, LineageContract};
use ccx_core::{
    PropagationEnvelope, Severity, TransformOp, TransformationRecord, ValidationErrorEnvelope,
};
use ccx_error::ErrorCode;
use ccx_telemetry::{EventSink, attr, event_names};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;
use tracing::{debug, warn};

// ---------------------------------------------------------------------------
// Content hashing
// ---------------------------------------------------------------------------

/// Hex-encoded SHA-256 content hash of a JSON value.
///
/// Strings hash their raw UTF-8 bytes; other scalars hash their compact
/// JSON text; lists and mappings hash their compact JSON with keys sorted
/// (the default map representation is already ordered). Two structurally
/// equal values therefore always hash identically.
#[must_use]
pub fn content_hash(value: &Value) -> String {
    let mut hasher = Sha256::new();
    match value {
        Value::String(s) => hasher.update(s.as_bytes()),
        other => hasher.update(other.to_string().as_bytes()),
    }
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

// ---------------------------------------------------------------------------
// Tracker
// ---------------------------------------------------------------------------

/// Records transformations of tracked fields onto the envelope.
#[derive(Debug, Clone, Copy, Default)]
pub struct LineageTracker;

impl LineageTracker {
    /// Create a tracker.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Record one transformation of `field` by `phase`.
    ///
    /// Hashes both values and appends a [`TransformationRecord`] with a
    /// fresh logical timestamp. Returns the record.
    pub fn record(
        &self,
        env: &mut PropagationEnvelope,
        field: &str,
        phase: &str,
        op: TransformOp,
        input: &Value,
        output: &Value,
    ) -> TransformationRecord {
        env.record_transformation(field, phase, op, content_hash(input), content_hash(output))
    }
}

/// Emit a span event for one recorded stage.
///
/// Event name: `lineage.stage.recorded`.
pub fn emit_stage_recorded(sink: &dyn EventSink, field: &str, record: &TransformationRecord) {
    debug!(
        field,
        phase = %record.phase,
        op = record.op.as_str(),
        ts = record.logical_ts,
        "lineage stage recorded"
    );
    sink.emit(
        event_names::LINEAGE_STAGE_RECORDED,
        &[
            attr("lineage.field", field),
            attr("lineage.phase", record.phase.as_str()),
            attr("lineage.op", record.op.as_str()),
            attr("lineage.logical_ts", record.logical_ts as i64),
            attr("lineage.input_hash", record.input_hash.as_str()),
            attr("lineage.output_hash", record.output_hash.as_str()),
        ],
    );
}

// ---------------------------------------------------------------------------
// Auditor
// ---------------------------------------------------------------------------

/// Verdict for one audited chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineageAuditStatus {
    /// Stages match and every adjacent hash pair links.
    Verified,
    /// Stages match but a hash pair does not link.
    MutationDetected,
    /// Recorded stages diverge from the declared chain.
    ChainBroken,
    /// Fewer stages recorded than declared.
    Incomplete,
}

impl LineageAuditStatus {
    /// Stable lowercase string form (used in `lineage.chain.{status}`
    /// events).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Verified => "verified",
            Self::MutationDetected => "mutation_detected",
            Self::ChainBroken => "chain_broken",
            Self::Incomplete => "incomplete",
        }
    }
}

impl fmt::Display for LineageAuditStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audit outcome for one declared chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineageAuditResult {
    /// Declared chain identifier.
    pub chain_id: String,
    /// Tracked field.
    pub field: String,
    /// Outcome of the audit.
    pub status: LineageAuditStatus,
    /// Number of declared stages.
    pub declared_stages: usize,
    /// Number of recorded stages.
    pub recorded_stages: usize,
    /// Human-readable detail.
    pub detail: String,
}

/// Roll-up over every audited chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineageAuditSummary {
    /// `true` iff every chain verified.
    pub passed: bool,
    /// Number of chains audited.
    pub chains_total: usize,
    /// Chains that verified.
    pub verified_count: usize,
    /// Per-chain results.
    pub results: Vec<LineageAuditResult>,
}

impl LineageAuditSummary {
    /// Every non-verified chain as a structured error envelope.
    #[must_use]
    pub fn envelopes(&self) -> Vec<ValidationErrorEnvelope> {
        let contract_type = ccx_contract::ContractKind::DataLineage.as_str();
        self.results
            .iter()
            .filter(|r| r.status != LineageAuditStatus::Verified)
            .map(|r| {
                let code = match r.status {
                    LineageAuditStatus::MutationDetected => ErrorCode::HashBreak,
                    _ => ErrorCode::StageMismatch,
                };
                ValidationErrorEnvelope::new(
                    contract_type,
                    &r.chain_id,
                    code,
                    &r.detail,
                    Severity::Blocking,
                )
            })
            .collect()
    }
}

/// Verifies recorded lineage against declared chains.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProvenanceAuditor;

impl ProvenanceAuditor {
    /// Create an auditor.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Audit one declared chain against the envelope's records.
    #[must_use]
    pub fn audit_chain(
        &self,
        env: &PropagationEnvelope,
        chain: &LineageChainSpec,
    ) -> LineageAuditResult {
        let records = env.transformations_of(&chain.field);
        let declared = chain.stages.len();
        let recorded = records.len();

        let result = |status: LineageAuditStatus, detail: String| LineageAuditResult {
            chain_id: chain.chain_id.clone(),
            field: chain.field.clone(),
            status,
            declared_stages: declared,
            recorded_stages: recorded,
            detail,
        };

        if recorded < declared {
            return result(
                LineageAuditStatus::Incomplete,
                format!("{recorded} of {declared} declared stage(s) recorded"),
            );
        }
        if recorded > declared {
            return result(
                LineageAuditStatus::ChainBroken,
                format!("{recorded} stage(s) recorded against {declared} declared"),
            );
        }
        for (i, (record, stage)) in records.iter().zip(&chain.stages).enumerate() {
            if record.phase != stage.phase || record.op != stage.operation {
                return result(
                    LineageAuditStatus::ChainBroken,
                    format!(
                        "stage {i} recorded as {}:{} but declared as {}:{}",
                        record.phase, record.op, stage.phase, stage.operation
                    ),
                );
            }
        }
        for (i, pair) in records.windows(2).enumerate() {
            if pair[1].input_hash != pair[0].output_hash {
                return result(
                    LineageAuditStatus::MutationDetected,
                    format!(
                        "hash chain breaks between stage {i} ({}) and stage {} ({})",
                        pair[0].phase,
                        i + 1,
                        pair[1].phase
                    ),
                );
            }
        }

        result(
            LineageAuditStatus::Verified,
            format!("{declared} stage(s) verified"),
        )
    }

    /// Audit every declared chain and roll up a summary.
    #[must_use]
    pub fn audit(
        &self,
        env: &PropagationEnvelope,
        contract: &LineageContract,
    ) -> LineageAuditSummary {
        let results: Vec<LineageAuditResult> = contract
            .chains
            .iter()
            .map(|chain| self.audit_chain(env, chain))
            .collect();
        let verified_count = results
            .iter()
            .filter(|r| r.status == LineageAuditStatus::Verified)
            .count();
        LineageAuditSummary {
            passed: verified_count == results.len(),
            chains_total: results.len(),
            verified_count,
            results,
        }
    }
}

// ---------------------------------------------------------------------------
// Emission
// ---------------------------------------------------------------------------

/// Emit one chain audit result as a span event.
///
/// Event name: `lineage.chain.{status}`.
pub fn emit_audit_result(sink: &dyn EventSink, result: &LineageAuditResult) {
    let name = event_names::lineage_chain(result.status.as_str());
    let attrs = vec![
        attr("lineage.chain_id", result.chain_id.as_str()),
        attr("lineage.field", result.field.as_str()),
        attr("lineage.status", result.status.as_str()),
        attr("lineage.declared_stages", result.declared_stages),
        attr("lineage.recorded_stages", result.recorded_stages),
        attr("lineage.detail", result.detail.as_str()),
    ];

    if result.status == LineageAuditStatus::Verified {
        debug!(chain = %result.chain_id, "lineage chain verified");
    } else {
        warn!(
            chain = %result.chain_id,
            status = result.status.as_str(),
            detail = %result.detail,
            "lineage chain not verified"
        );
    }

    sink.emit(&name, &attrs);
}

/// Emit the audit roll-up as a span event.
///
/// Event name: `lineage.audit.complete`.
pub fn emit_audit_summary(sink: &dyn EventSink, summary: &LineageAuditSummary) {
    sink.emit(
        event_names::LINEAGE_AUDIT_COMPLETE,
        &[
            attr("lineage.passed", summary.passed),
            attr("lineage.chains_total", summary.chains_total),
            attr("lineage.verified_count", summary.verified_count),
        ],
    );
}

// ===========================================================================
// Tests
// ===========================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn contract(yaml: &str) -> LineageContract {
        serde_yaml::from_str(yaml).unwrap()
    }

    const CONTRACT: &str = "\
schema_version: \"0.1.0\"
pipeline_id: artisan
chains:
  - chain_id: domain-lineage
    field: domain
    stages:
      - {phase: plan, operation: ingest}
      - {phase: build, operation: transform}
";

    // ---- content hashing --------------------------------------------------

    #[test]
    fn string_hash_is_over_raw_bytes() {
        // Same bytes as hashing the unquoted string.
        assert_eq!(
            content_hash(&json!("payments")),
            content_hash(&json!("payments"))
        );
        assert_ne!(content_hash(&json!("payments")), content_hash(&json!("PAYMENTS")));
    }

    #[test]
    fn composite_hash_is_structural() {
        let a = serde_json::from_str::<Value>(r#"{"b": 2, "a": 1}"#).unwrap();
        let b = serde_json::from_str::<Value>(r#"{"a": 1, "b": 2}"#).unwrap();
        assert_eq!(content_hash(&a), content_hash(&b));
    }

    #[test]
    fn scalar_kinds_hash_distinctly() {
        // "1" the string and 1 the number are different content.
        assert_ne!(content_hash(&json!("1")), content_hash(&json!(1)));
        assert_ne!(content_hash(&json!(true)), content_hash(&json!("true")));
    }

    #[test]
    fn hash_is_hex_sha256_sized() {
        let h = content_hash(&json!("x"));
        assert_eq!(h.len(), 64);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit()));
    }

    proptest! {
        /// Structurally equal values hash identically, and hashing is
        /// deterministic across calls.
        #[test]
        fn hash_deterministic(s in ".*", n in proptest::num::i64::ANY) {
            let v = json!({"s": s, "n": n});
            prop_assert_eq!(content_hash(&v), content_hash(&v.clone()));
        }
    }

    // ---- tracker ----------------------------------------------------------

    #[test]
    fn record_appends_with_fresh_timestamps() {
        let tracker = LineageTracker::new();
        let mut env = PropagationEnvelope::new();
        let r1 = tracker.record(
            &mut env,
            "domain",
            "plan",
            TransformOp::Ingest,
            &json!(null),
            &json!("payments"),
        );
        let r2 = tracker.record(
            &mut env,
            "domain",
            "build",
            TransformOp::Transform,
            &json!("payments"),
            &json!("payments-v2"),
        );
        assert!(r2.logical_ts > r1.logical_ts);
        assert_eq!(env.transformations_of("domain").len(), 2);
        // Output of stage 0 links to input of stage 1.
        assert_eq!(r1.output_hash, r2.input_hash);
    }

    // ---- auditor ----------------------------------------------------------

    fn run_clean_chain(env: &mut PropagationEnvelope) {
        let tracker = LineageTracker::new();
        tracker.record(
            env,
            "domain",
            "plan",
            TransformOp::Ingest,
            &json!(null),
            &json!("payments"),
        );
        tracker.record(
            env,
            "domain",
            "build",
            TransformOp::Transform,
            &json!("payments"),
            &json!("payments-normalized"),
        );
    }

    #[test]
    fn clean_chain_verifies() {
        let auditor = ProvenanceAuditor::new();
        let mut env = PropagationEnvelope::new();
        run_clean_chain(&mut env);
        let summary = auditor.audit(&env, &contract(CONTRACT));
        assert!(summary.passed);
        assert_eq!(summary.results[0].status, LineageAuditStatus::Verified);
    }

    #[test]
    fn hash_break_is_mutation_detected() {
        let tracker = LineageTracker::new();
        let auditor = ProvenanceAuditor::new();
        let mut env = PropagationEnvelope::new();
        tracker.record(
            &mut env,
            "domain",
            "plan",
            TransformOp::Ingest,
            &json!(null),
            &json!("payments"),
        );
        // The build stage claims a different input than plan produced.
        tracker.record(
            &mut env,
            "domain",
            "build",
            TransformOp::Transform,
            &json!("tampered"),
            &json!("payments-normalized"),
        );
        let result = auditor.audit_chain(&env, &contract(CONTRACT).chains[0]);
        assert_eq!(result.status, LineageAuditStatus::MutationDetected);
        assert!(result.detail.contains("hash chain breaks"));
    }

    #[test]
    fn fewer_stages_is_incomplete() {
        let tracker = LineageTracker::new();
        let auditor = ProvenanceAuditor::new();
        let mut env = PropagationEnvelope::new();
        tracker.record(
            &mut env,
            "domain",
            "plan",
            TransformOp::Ingest,
            &json!(null),
            &json!("payments"),
        );
        let result = auditor.audit_chain(&env, &contract(CONTRACT).chains[0]);
        assert_eq!(result.status, LineageAuditStatus::Incomplete);
        assert_eq!(result.recorded_stages, 1);
    }

    #[test]
    fn extra_stage_is_chain_broken() {
        let auditor = ProvenanceAuditor::new();
        let mut env = PropagationEnvelope::new();
        run_clean_chain(&mut env);
        LineageTracker::new().record(
            &mut env,
            "domain",
            "ship",
            TransformOp::Passthrough,
            &json!("payments-normalized"),
            &json!("payments-normalized"),
        );
        let result = auditor.audit_chain(&env, &contract(CONTRACT).chains[0]);
        assert_eq!(result.status, LineageAuditStatus::ChainBroken);
    }

    #[test]
    fn wrong_operation_is_chain_broken() {
        let tracker = LineageTracker::new();
        let auditor = ProvenanceAuditor::new();
        let mut env = PropagationEnvelope::new();
        tracker.record(
            &mut env,
            "domain",
            "plan",
            TransformOp::Ingest,
            &json!(null),
            &json!("payments"),
        );
        tracker.record(
            &mut env,
            "domain",
            "build",
            TransformOp::Aggregate, // declared: transform
            &json!("payments"),
            &json!("payments-2"),
        );
        let result = auditor.audit_chain(&env, &contract(CONTRACT).chains[0]);
        assert_eq!(result.status, LineageAuditStatus::ChainBroken);
    }

    #[test]
    fn mutation_envelope_is_hash_break() {
        let tracker = LineageTracker::new();
        let auditor = ProvenanceAuditor::new();
        let mut env = PropagationEnvelope::new();
        tracker.record(
            &mut env,
            "domain",
            "plan",
            TransformOp::Ingest,
            &json!(null),
            &json!("a"),
        );
        tracker.record(
            &mut env,
            "domain",
            "build",
            TransformOp::Transform,
            &json!("b"),
            &json!("c"),
        );
        let summary = auditor.audit(&env, &contract(CONTRACT));
        let envelopes = summary.envelopes();
        assert_eq!(envelopes[0].code, ErrorCode::HashBreak);
    }

    #[test]
    fn stage_recording_emits_one_event_per_stage() {
        let sink = ccx_telemetry::MemorySink::new();
        let tracker = LineageTracker::new();
        let mut env = PropagationEnvelope::new();
        let record = tracker.record(
            &mut env,
            "domain",
            "plan",
            TransformOp::Ingest,
            &json!(null),
            &json!("payments"),
        );
        emit_stage_recorded(&sink, "domain", &record);
        assert_eq!(sink.names(), vec![event_names::LINEAGE_STAGE_RECORDED]);
    }

    #[test]
    fn audit_events_carry_status_in_name() {
        let sink = ccx_telemetry::MemorySink::new();
        let auditor = ProvenanceAuditor::new();
        let mut env = PropagationEnvelope::new();
        run_clean_chain(&mut env);
        let summary = auditor.audit(&env, &contract(CONTRACT));
        for result in &summary.results {
            emit_audit_result(&sink, result);
        }
        emit_audit_summary(&sink, &summary);
        assert_eq!(
            sink.names(),
            vec!["lineage.chain.verified", event_names::LINEAGE_AUDIT_COMPLETE]
        );
    }
}
