// SPDX-License-Identifier: MIT OR Apache-2.0

//! Memoising YAML contract loader.
//!
//! One loader instance per contract type, held by whoever owns the run
//! (there is no module-level cache). Results are memoised per canonical
//! path and shared via `Arc`; the cache is cleared only explicitly and
//! nothing is ever hot-reloaded.

use crate::ContractDocument;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Contracts larger than this are refused outright.
pub const MAX_CONTRACT_BYTES: u64 = 1024 * 1024;

/// Errors from contract loading.
///
/// Parse errors, missing files, and schema violations are distinct so that
/// callers can tell a corrupt file from a wrong one.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// The requested contract file does not exist.
    #[error("contract file not found: {path}")]
    FileNotFound {
        /// Path that was requested.
        path: PathBuf,
    },

    /// The file exists but could not be read.
    #[error("failed to read contract {path}: {source}")]
    Io {
        /// Path that was being read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The file exceeds [`MAX_CONTRACT_BYTES`].
    #[error("contract {path} is {size} bytes, over the {limit} byte limit")]
    TooLarge {
        /// Path that was refused.
        path: PathBuf,
        /// Actual size in bytes.
        size: u64,
        /// The enforced limit.
        limit: u64,
    },

    /// The content is not parseable YAML.
    #[error("contract is not valid YAML: {detail}")]
    SchemaParse {
        /// Parser diagnostic.
        detail: String,
    },

    /// The YAML is well-formed but does not match the contract schema.
    #[error("contract does not match the {kind} schema: {detail}")]
    ContractShape {
        /// Expected contract type literal.
        kind: &'static str,
        /// Validation diagnostic.
        detail: String,
    },
}

/// Loads and caches one type of contract from YAML files.
///
/// # Examples
///
/// ```
/// use ccx_contract::{ContractLoader, PropagationContract};
///
/// let loader: ContractLoader<PropagationContract> = ContractLoader::new();
/// let contract = loader
///     .load_from_string("schema_version: \"0.1.0\"\npipeline_id: demo\n")
///     .unwrap();
/// assert_eq!(contract.pipeline_id, "demo");
/// ```
#[derive(Debug)]
pub struct ContractLoader<C: ContractDocument> {
    cache: HashMap<PathBuf, Arc<C>>,
}

impl<C: ContractDocument> Default for ContractLoader<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: ContractDocument> ContractLoader<C> {
    /// Create a loader with an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self {
            cache: HashMap::new(),
        }
    }

    /// Load a contract from a YAML file, memoised per canonical path.
    ///
    /// Repeated loads of the same path return the same `Arc` until
    /// [`clear_cache`](Self::clear_cache) is called.
    ///
    /// # Errors
    ///
    /// See [`LoadError`] for the distinct failure modes.
    pub fn load(&mut self, path: &Path) -> Result<Arc<C>, LoadError> {
        if !path.exists() {
            return Err(LoadError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let key = path.canonicalize().map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        if let Some(cached) = self.cache.get(&key) {
            debug!(path = %key.display(), kind = C::KIND.as_str(), "contract cache hit");
            return Ok(Arc::clone(cached));
        }

        let size = std::fs::metadata(&key)
            .map_err(|source| LoadError::Io {
                path: key.clone(),
                source,
            })?
            .len();
        if size > MAX_CONTRACT_BYTES {
            return Err(LoadError::TooLarge {
                path: key,
                size,
                limit: MAX_CONTRACT_BYTES,
            });
        }

        let raw = std::fs::read_to_string(&key).map_err(|source| LoadError::Io {
            path: key.clone(),
            source,
        })?;
        let contract = Arc::new(self.load_from_string(&raw)?);
        self.cache.insert(key.clone(), Arc::clone(&contract));

        debug!(
            path = %key.display(),
            kind = C::KIND.as_str(),
            scope = contract.scope_id(),
            "loaded contract"
        );
        Ok(contract)
    }

    /// Parse a contract from a YAML string (uncached; convenience for
    /// tests and embedded contracts).
    ///
    /// # Errors
    ///
    /// [`LoadError::SchemaParse`] for malformed YAML,
    /// [`LoadError::ContractShape`] for well-formed YAML that does not
    /// match this contract type.
    pub fn load_from_string(&self, yaml: &str) -> Result<C, LoadError> {
        let value: serde_yaml::Value =
            serde_yaml::from_str(yaml).map_err(|e| LoadError::SchemaParse {
                detail: e.to_string(),
            })?;
        let contract: C =
            serde_yaml::from_value(value).map_err(|e| LoadError::ContractShape {
                kind: C::KIND.as_str(),
                detail: e.to_string(),
            })?;
        let problems = contract.integrity_problems();
        if !problems.is_empty() {
            return Err(LoadError::ContractShape {
                kind: C::KIND.as_str(),
                detail: problems.join("; "),
            });
        }
        Ok(contract)
    }

    /// Drop every cached contract. The only way entries leave the cache.
    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    /// Number of cached contracts.
    #[must_use]
    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }
}
