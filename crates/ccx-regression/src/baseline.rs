// SPDX-License-Identifier: MIT OR Apache-2.0

//! Stored baselines for the regression gate.
//!
//! A baseline is a small JSON document capturing one known-good run:
//! overall score plus per-layer metrics. Where it lives is the caller's
//! choice; the core only reads and writes the documents.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Errors from baseline persistence.
#[derive(Debug, thiserror::Error)]
pub enum BaselineError {
    /// The baseline file could not be read or written.
    #[error("baseline I/O failed for {path}: {source}")]
    Io {
        /// Path involved.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The baseline file is not a valid baseline document.
    #[error("baseline at {path} is not parseable: {detail}")]
    Parse {
        /// Path involved.
        path: PathBuf,
        /// Parser diagnostic.
        detail: String,
    },
}

/// A known-good snapshot of pipeline health.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Baseline {
    /// Pipeline the baseline belongs to.
    pub pipeline_id: String,
    /// When the snapshot was captured.
    pub captured_at: DateTime<Utc>,
    /// Overall health score at capture time.
    pub overall_score: f64,
    /// Per-layer metric values at capture time, keyed by the metric names
    /// the observability layer produces.
    #[serde(default)]
    pub per_layer_metrics: BTreeMap<String, f64>,
}

impl Baseline {
    /// Capture a baseline from current metrics.
    #[must_use]
    pub fn capture(
        pipeline_id: impl Into<String>,
        overall_score: f64,
        per_layer_metrics: BTreeMap<String, f64>,
    ) -> Self {
        Self {
            pipeline_id: pipeline_id.into(),
            captured_at: Utc::now(),
            overall_score,
            per_layer_metrics,
        }
    }

    /// Load a baseline from a JSON file.
    ///
    /// # Errors
    ///
    /// [`BaselineError::Io`] when the file cannot be read,
    /// [`BaselineError::Parse`] when it is not a baseline document.
    pub fn load(path: &Path) -> Result<Self, BaselineError> {
        let raw = std::fs::read_to_string(path).map_err(|source| BaselineError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|e| BaselineError::Parse {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })
    }

    /// Write the baseline to a JSON file (pretty-printed, trailing
    /// newline).
    ///
    /// # Errors
    ///
    /// [`BaselineError::Io`] when the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<(), BaselineError> {
        let mut rendered =
            serde_json::to_string_pretty(self).expect("baseline always serialises");
        rendered.push('\n');
        std::fs::write(path, rendered).map_err(|source| BaselineError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// A metric value, when present.
    #[must_use]
    pub fn metric(&self, name: &str) -> Option<f64> {
        self.per_layer_metrics.get(name).copied()
    }
}
