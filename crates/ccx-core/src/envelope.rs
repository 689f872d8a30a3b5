// SPDX-License-Identifier: MIT OR Apache-2.0

//! Provenance envelope and the workflow context it travels on.
//!
//! The envelope is the single sink for all cross-layer metadata: per-field
//! provenance, the logical clock, the event log, capability snapshots,
//! budget consumption, and lineage records. Every layer reads and writes
//! through it.
//!
//! Historically the envelope was hidden inside the user's context mapping
//! under the [`PROPAGATION_KEY`] sentinel. Hiding metadata in the user's
//! data space is fragile, so here it is an explicit sibling of the field
//! map; the sentinel survives only as the serialisation key, keeping
//! post-mortem dumps compatible.

use crate::clock::LamportClock;
use crate::{PropagationStatus, TransformOp};
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Reserved context key under which the envelope serialises.
pub const PROPAGATION_KEY: &str = "__propagation__";

// ---------------------------------------------------------------------------
// Per-field provenance
// ---------------------------------------------------------------------------

/// Origin and status of a single context field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FieldProvenance {
    /// Phase that last wrote the field.
    pub origin_phase: String,
    /// Logical timestamp of the write.
    pub logical_ts: u64,
    /// Current propagation status.
    pub status: PropagationStatus,
    /// `phase:op` tags of transformations applied so far, in order.
    #[serde(default)]
    pub transformations: Vec<String>,
}

// ---------------------------------------------------------------------------
// Event log
// ---------------------------------------------------------------------------

/// A single logged pipeline event with causal metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EventRecord {
    /// Phase the event belongs to.
    pub phase: String,
    /// Event name within the phase (e.g. `started`, `committed`).
    pub event: String,
    /// Lamport timestamp assigned when the event was recorded.
    pub logical_ts: u64,
    /// Wall-clock time for human-readable diagnostics.
    pub wall_clock: DateTime<Utc>,
    /// `phase.event` tags of events whose effects this one consumes.
    #[serde(default)]
    pub causal_deps: Vec<String>,
}

// ---------------------------------------------------------------------------
// Lineage records
// ---------------------------------------------------------------------------

/// One recorded transformation of a tracked field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TransformationRecord {
    /// Phase that applied the transformation.
    pub phase: String,
    /// Kind of transformation.
    pub op: TransformOp,
    /// Content hash of the input value.
    pub input_hash: String,
    /// Content hash of the output value.
    pub output_hash: String,
    /// Wall-clock time of the recording.
    pub wall_clock: DateTime<Utc>,
    /// Lamport timestamp of the recording.
    pub logical_ts: u64,
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// Per-run provenance store. Created by the runtime guard on first access
/// and owned by the [`WorkflowContext`]; destroyed when the run ends.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PropagationEnvelope {
    /// Field name → provenance record.
    #[serde(default)]
    pub field_provenance: BTreeMap<String, FieldProvenance>,
    /// Current Lamport counter.
    #[serde(default)]
    pub logical_clock: LamportClock,
    /// Ordered event log.
    #[serde(default)]
    pub event_log: Vec<EventRecord>,
    /// Phase → capability ids currently held.
    #[serde(default)]
    pub capability_snapshots: BTreeMap<String, BTreeSet<String>>,
    /// Budget id → phase → consumed amount.
    #[serde(default)]
    pub budget_consumption: BTreeMap<String, BTreeMap<String, f64>>,
    /// Field name → ordered transformation records.
    #[serde(default)]
    pub lineage_records: BTreeMap<String, Vec<TransformationRecord>>,
}

impl PropagationEnvelope {
    /// Create an empty envelope.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a pipeline event, ticking the clock. Returns the assigned
    /// logical timestamp.
    pub fn record_event(
        &mut self,
        phase: impl Into<String>,
        event: impl Into<String>,
        causal_deps: Vec<String>,
    ) -> u64 {
        let ts = self.logical_clock.tick();
        self.event_log.push(EventRecord {
            phase: phase.into(),
            event: event.into(),
            logical_ts: ts,
            wall_clock: Utc::now(),
            causal_deps,
        });
        ts
    }

    /// Record a write of `field` by `phase` with the given status, ticking
    /// the clock. Returns the assigned logical timestamp.
    pub fn set_provenance(
        &mut self,
        field: impl Into<String>,
        phase: impl Into<String>,
        status: PropagationStatus,
    ) -> u64 {
        let ts = self.logical_clock.tick();
        self.field_provenance.insert(
            field.into(),
            FieldProvenance {
                origin_phase: phase.into(),
                logical_ts: ts,
                status,
                transformations: Vec::new(),
            },
        );
        ts
    }

    /// Mark `field` as defaulted by `phase`.
    ///
    /// Returns `true` when the status changed. Defaults are not re-applied:
    /// if the field is already `Defaulted` with the same origin phase this
    /// is a no-op, which makes boundary re-validation idempotent.
    pub fn apply_default(&mut self, field: &str, phase: &str) -> bool {
        if let Some(prov) = self.field_provenance.get(field)
            && prov.status == PropagationStatus::Defaulted
            && prov.origin_phase == phase
        {
            return false;
        }
        self.set_provenance(field, phase, PropagationStatus::Defaulted);
        true
    }

    /// Provenance status of a field, if recorded.
    #[must_use]
    pub fn status_of(&self, field: &str) -> Option<PropagationStatus> {
        self.field_provenance.get(field).map(|p| p.status)
    }

    /// Replace the capability snapshot for `phase`.
    pub fn snapshot_capabilities(
        &mut self,
        phase: impl Into<String>,
        capabilities: BTreeSet<String>,
    ) {
        self.capability_snapshots.insert(phase.into(), capabilities);
    }

    /// Accumulate budget consumption for `(budget_id, phase)`.
    ///
    /// Negative amounts are clamped to zero so that consumption is monotonic
    /// non-decreasing within a run. Returns the new consumed total.
    pub fn consume_budget(&mut self, budget_id: &str, phase: &str, amount: f64) -> f64 {
        let entry = self
            .budget_consumption
            .entry(budget_id.to_string())
            .or_default()
            .entry(phase.to_string())
            .or_insert(0.0);
        *entry += amount.max(0.0);
        *entry
    }

    /// Consumed amount for `(budget_id, phase)`, zero when never touched.
    #[must_use]
    pub fn consumed(&self, budget_id: &str, phase: &str) -> f64 {
        self.budget_consumption
            .get(budget_id)
            .and_then(|phases| phases.get(phase))
            .copied()
            .unwrap_or(0.0)
    }

    /// Append a transformation record for `field`, ticking the clock and
    /// stamping the field's provenance with a `phase:op` tag.
    pub fn record_transformation(
        &mut self,
        field: &str,
        phase: &str,
        op: TransformOp,
        input_hash: String,
        output_hash: String,
    ) -> TransformationRecord {
        let ts = self.logical_clock.tick();
        let record = TransformationRecord {
            phase: phase.to_string(),
            op,
            input_hash,
            output_hash,
            wall_clock: Utc::now(),
            logical_ts: ts,
        };
        self.lineage_records
            .entry(field.to_string())
            .or_default()
            .push(record.clone());
        if let Some(prov) = self.field_provenance.get_mut(field) {
            prov.transformations.push(format!("{phase}:{op}"));
        }
        record
    }

    /// Recorded transformations for a field (empty slice when untracked).
    #[must_use]
    pub fn transformations_of(&self, field: &str) -> &[TransformationRecord] {
        self.lineage_records
            .get(field)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

// ---------------------------------------------------------------------------
// WorkflowContext
// ---------------------------------------------------------------------------

/// The mapping a pipeline passes from phase to phase, plus the envelope.
///
/// Field names are dot paths; values are arbitrary JSON. The context is
/// owned by the workflow engine; the guard treats it as a shared mutable
/// mapping. Serialisation flattens the fields into one JSON map with the
/// envelope under [`PROPAGATION_KEY`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowContext {
    /// The provenance envelope, keyed by the legacy sentinel on the wire.
    #[serde(rename = "__propagation__", default)]
    pub envelope: PropagationEnvelope,
    /// User data fields.
    #[serde(flatten)]
    pub fields: BTreeMap<String, Value>,
}

impl WorkflowContext {
    /// Create an empty context with a fresh envelope.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context seeded with the given fields.
    #[must_use]
    pub fn from_fields(fields: BTreeMap<String, Value>) -> Self {
        Self {
            envelope: PropagationEnvelope::new(),
            fields,
        }
    }

    /// Insert or replace a field value.
    pub fn insert(&mut self, field: impl Into<String>, value: Value) {
        self.fields.insert(field.into(), value);
    }

    /// Fetch a field value.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Whether a field is present.
    #[must_use]
    pub fn contains_field(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Remove a field, returning its value.
    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.fields.remove(field)
    }
}

// ===========================================================================
// Tests
// ===========================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    // ---- provenance -------------------------------------------------------

    #[test]
    fn set_provenance_ticks_clock() {
        let mut env = PropagationEnvelope::new();
        let t1 = env.set_provenance("domain", "plan", PropagationStatus::Propagated);
        let t2 = env.set_provenance("tasks", "plan", PropagationStatus::Propagated);
        assert!(t2 > t1);
        assert_eq!(env.status_of("domain"), Some(PropagationStatus::Propagated));
    }

    #[test]
    fn apply_default_downgrades_status() {
        let mut env = PropagationEnvelope::new();
        env.set_provenance("domain", "plan", PropagationStatus::Propagated);
        assert!(env.apply_default("domain", "build"));
        assert_eq!(env.status_of("domain"), Some(PropagationStatus::Defaulted));
    }

    #[test]
    fn apply_default_is_idempotent_per_origin() {
        let mut env = PropagationEnvelope::new();
        assert!(env.apply_default("domain", "build"));
        let ts = env.field_provenance["domain"].logical_ts;
        // Same origin: no-op, clock untouched for this field.
        assert!(!env.apply_default("domain", "build"));
        assert_eq!(env.field_provenance["domain"].logical_ts, ts);
        // Different origin re-records.
        assert!(env.apply_default("domain", "ship"));
    }

    // ---- events -----------------------------------------------------------

    #[test]
    fn record_event_appends_in_clock_order() {
        let mut env = PropagationEnvelope::new();
        let t1 = env.record_event("plan", "started", vec![]);
        let t2 = env.record_event("plan", "committed", vec!["plan.started".into()]);
        assert!(t1 < t2);
        assert_eq!(env.event_log.len(), 2);
        assert_eq!(env.event_log[1].causal_deps, vec!["plan.started"]);
    }

    // ---- budget -----------------------------------------------------------

    #[test]
    fn consume_budget_accumulates() {
        let mut env = PropagationEnvelope::new();
        assert_eq!(env.consume_budget("latency", "plan", 100.0), 100.0);
        assert_eq!(env.consume_budget("latency", "plan", 50.0), 150.0);
        assert_eq!(env.consumed("latency", "plan"), 150.0);
        assert_eq!(env.consumed("latency", "build"), 0.0);
    }

    #[test]
    fn consume_budget_clamps_negative() {
        let mut env = PropagationEnvelope::new();
        env.consume_budget("cost", "plan", 10.0);
        env.consume_budget("cost", "plan", -5.0);
        assert_eq!(env.consumed("cost", "plan"), 10.0);
    }

    proptest! {
        /// Consumption is monotonic non-decreasing over any call sequence.
        #[test]
        fn budget_monotonic(amounts in proptest::collection::vec(-100.0f64..100.0, 1..50)) {
            let mut env = PropagationEnvelope::new();
            let mut last = 0.0;
            for a in amounts {
                let now = env.consume_budget("tokens", "plan", a);
                prop_assert!(now >= last);
                last = now;
            }
        }
    }

    // ---- lineage ----------------------------------------------------------

    #[test]
    fn record_transformation_tags_provenance() {
        let mut env = PropagationEnvelope::new();
        env.set_provenance("domain", "plan", PropagationStatus::Propagated);
        let rec = env.record_transformation(
            "domain",
            "plan",
            TransformOp::Ingest,
            "h0".into(),
            "h1".into(),
        );
        assert_eq!(rec.op, TransformOp::Ingest);
        assert_eq!(env.transformations_of("domain").len(), 1);
        assert_eq!(
            env.field_provenance["domain"].transformations,
            vec!["plan:ingest"]
        );
    }

    #[test]
    fn transformations_of_untracked_field_is_empty() {
        let env = PropagationEnvelope::new();
        assert!(env.transformations_of("nope").is_empty());
    }

    // ---- context serialisation --------------------------------------------

    #[test]
    fn context_serialises_with_sentinel_key() {
        let mut ctx = WorkflowContext::new();
        ctx.insert("domain", json!("payments"));
        ctx.envelope
            .set_provenance("domain", "plan", PropagationStatus::Propagated);

        let v = serde_json::to_value(&ctx).unwrap();
        assert!(v.get(PROPAGATION_KEY).is_some());
        assert_eq!(v["domain"], json!("payments"));

        let back: WorkflowContext = serde_json::from_value(v).unwrap();
        assert_eq!(back, ctx);
    }

    #[test]
    fn context_field_ops() {
        let mut ctx = WorkflowContext::new();
        assert!(!ctx.contains_field("domain"));
        ctx.insert("domain", json!("payments"));
        assert_eq!(ctx.get("domain"), Some(&json!("payments")));
        assert_eq!(ctx.remove("domain"), Some(json!("payments")));
        assert!(ctx.get("domain").is_none());
    }
}
