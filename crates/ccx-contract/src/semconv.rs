// SPDX-License-Identifier: MIT OR Apache-2.0

//! Semantic convention contract — Layer 3.
//!
//! Declares canonical attribute names, their aliases, allowed values, and
//! named enums for a namespace.

use crate::{ContractDocument, ContractKind};
use ccx_core::TypeTag;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Attribute conventions
// ---------------------------------------------------------------------------

/// Whether an attribute must appear.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RequirementLevel {
    /// Must be present.
    Required,
    /// Should be present.
    #[default]
    Recommended,
    /// Present only when explicitly enabled.
    OptIn,
}

/// Declares a single canonical attribute and its conventions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct AttributeConvention {
    /// Canonical attribute name.
    pub name: String,
    /// Expected value type.
    #[serde(default = "default_str", rename = "type")]
    pub value_type: TypeTag,
    /// Whether the attribute is required, recommended, or opt-in.
    #[serde(default)]
    pub requirement_level: RequirementLevel,
    /// Non-canonical names that resolve to this attribute.
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Closed set of allowed values; absent means any value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_values: Option<Vec<String>>,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
}

fn default_str() -> TypeTag {
    TypeTag::Str
}

// ---------------------------------------------------------------------------
// Enum conventions
// ---------------------------------------------------------------------------

/// A named enum with a fixed or extensible value set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct EnumConvention {
    /// Enum name.
    pub name: String,
    /// Declared values.
    pub values: Vec<String>,
    /// When `true`, unknown values warn instead of block.
    #[serde(default)]
    pub extensible: bool,
}

// ---------------------------------------------------------------------------
// Root contract
// ---------------------------------------------------------------------------

/// Discriminator for convention contracts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ConventionDiscriminator {
    /// The only accepted literal: `semantic_conventions`.
    #[default]
    SemanticConventions,
}

/// Root model of a semantic convention contract YAML file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ConventionContract {
    /// Contract schema version.
    pub schema_version: String,
    /// Discriminator; wrong literals are rejected at parse time.
    #[serde(default)]
    pub contract_type: ConventionDiscriminator,
    /// Convention namespace (e.g. `pipeline.resource`).
    pub namespace: String,
    /// Canonical attribute conventions.
    #[serde(default)]
    pub attributes: Vec<AttributeConvention>,
    /// Named enum conventions.
    #[serde(default)]
    pub enums: Vec<EnumConvention>,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
}

impl ContractDocument for ConventionContract {
    const KIND: ContractKind = ContractKind::SemanticConventions;

    fn schema_version(&self) -> &str {
        &self.schema_version
    }

    fn scope_id(&self) -> &str {
        &self.namespace
    }
}

impl ConventionContract {
    /// The convention declaring `name` as canonical, if any.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&AttributeConvention> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// The enum convention named `name`, if any.
    #[must_use]
    pub fn enum_named(&self, name: &str) -> Option<&EnumConvention> {
        self.enums.iter().find(|e| e.name == name)
    }
}
