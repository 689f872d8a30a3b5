// SPDX-License-Identifier: MIT OR Apache-2.0

//! Named quality policies.
//!
//! A [`QualitySpec`](ccx_contract::QualitySpec) may reference a policy by
//! name. Policies live in a registry owned by the validator: a small
//! built-in set plus a registration point for pipeline-specific ones.
//! Unknown policy names degrade to an advisory finding rather than failing
//! the boundary — a contract must not be able to invent enforcement the
//! runtime does not carry.

use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Outcome of evaluating one named policy against a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyOutcome {
    /// The value satisfies the policy.
    Pass,
    /// The value violates the policy.
    Fail(String),
    /// No policy with that name is registered.
    Unknown,
}

impl fmt::Display for PolicyOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pass => f.write_str("pass"),
            Self::Fail(reason) => write!(f, "fail: {reason}"),
            Self::Unknown => f.write_str("unknown policy"),
        }
    }
}

type PolicyFn = Box<dyn Fn(&Value) -> Result<(), String> + Send + Sync>;

/// Registry of named quality policies.
pub struct QualityPolicyRegistry {
    policies: BTreeMap<String, PolicyFn>,
}

impl fmt::Debug for QualityPolicyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QualityPolicyRegistry")
            .field("policies", &self.names())
            .finish()
    }
}

impl Default for QualityPolicyRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl QualityPolicyRegistry {
    /// An empty registry with no policies at all.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            policies: BTreeMap::new(),
        }
    }

    /// The built-in policy set: `non_empty`, `kebab_case`, `iso_timestamp`,
    /// and `absolute_path`.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register("non_empty", |value| match value {
            Value::String(s) if s.trim().is_empty() => Err("string is blank".to_string()),
            Value::Array(items) if items.is_empty() => Err("list is empty".to_string()),
            Value::Object(map) if map.is_empty() => Err("mapping is empty".to_string()),
            Value::Null => Err("value is null".to_string()),
            _ => Ok(()),
        });
        registry.register("kebab_case", |value| {
            let Some(s) = value.as_str() else {
                return Err("not a string".to_string());
            };
            if !s.is_empty()
                && s.chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
                && !s.starts_with('-')
                && !s.ends_with('-')
            {
                Ok(())
            } else {
                Err(format!("'{s}' is not kebab-case"))
            }
        });
        registry.register("iso_timestamp", |value| {
            let Some(s) = value.as_str() else {
                return Err("not a string".to_string());
            };
            chrono::DateTime::parse_from_rfc3339(s)
                .map(|_| ())
                .map_err(|e| format!("'{s}' is not an RFC 3339 timestamp: {e}"))
        });
        registry.register("absolute_path", |value| {
            let Some(s) = value.as_str() else {
                return Err("not a string".to_string());
            };
            if std::path::Path::new(s).is_absolute() {
                Ok(())
            } else {
                Err(format!("'{s}' is not an absolute path"))
            }
        });
        registry
    }

    /// Register (or replace) a policy under `name`.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        policy: impl Fn(&Value) -> Result<(), String> + Send + Sync + 'static,
    ) {
        self.policies.insert(name.into(), Box::new(policy));
    }

    /// Evaluate the policy named `name` against `value`.
    #[must_use]
    pub fn evaluate(&self, name: &str, value: &Value) -> PolicyOutcome {
        match self.policies.get(name) {
            None => PolicyOutcome::Unknown,
            Some(policy) => match policy(value) {
                Ok(()) => PolicyOutcome::Pass,
                Err(reason) => PolicyOutcome::Fail(reason),
            },
        }
    }

    /// Registered policy names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.policies.keys().map(String::as_str).collect()
    }
}
