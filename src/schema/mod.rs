//! Schema collaborator: relationship declarations per record type.

pub mod memory;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Declared cardinality of a relationship field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RelationshipKind {
    /// To-one.
    BelongsTo,
    /// To-many.
    HasMany,
}

/// How a field names its inverse.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum InverseOption {
    /// Nothing declared: infer from the related type.
    #[default]
    Inferred,
    /// Declared `inverse: null`.
    None,
    /// Declared inverse field name.
    Field(String),
}

impl InverseOption {
    /// The declared field name, if any.
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::Field(name) => Some(name),
            Self::Inferred | Self::None => None,
        }
    }
}

impl Serialize for InverseOption {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Field(name) => serializer.serialize_some(name),
            Self::Inferred | Self::None => serializer.serialize_none(),
        }
    }
}

impl<'de> Deserialize<'de> for InverseOption {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match Option::<String>::deserialize(deserializer)? {
            Some(name) => Self::Field(name),
            None => Self::None,
        })
    }
}

fn default_async() -> bool {
    true
}

/// Options attached to a relationship declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipOptions {
    /// Whether the related records load lazily.
    #[serde(rename = "async", default = "default_async")]
    pub is_async: bool,
    /// Inverse declaration. A JSON `null` means "no inverse", an absent
    /// member means "infer".
    #[serde(default, skip_serializing_if = "is_inferred")]
    pub inverse: InverseOption,
    /// Whether the declared type is an abstract base.
    #[serde(default)]
    pub polymorphic: bool,
    /// Whether a remote update discards unsaved local changes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reset_on_remote_update: Option<bool>,
}

fn is_inferred(inverse: &InverseOption) -> bool {
    matches!(inverse, InverseOption::Inferred)
}

impl Default for RelationshipOptions {
    fn default() -> Self {
        Self {
            is_async: true,
            inverse: InverseOption::Inferred,
            polymorphic: false,
            reset_on_remote_update: None,
        }
    }
}

impl RelationshipOptions {
    /// Set the async flag.
    pub fn with_async(mut self, is_async: bool) -> Self {
        self.is_async = is_async;
        self
    }

    /// Declare the inverse field.
    pub fn with_inverse(mut self, field: impl Into<String>) -> Self {
        self.inverse = InverseOption::Field(field.into());
        self
    }

    /// Declare `inverse: null`.
    pub fn without_inverse(mut self) -> Self {
        self.inverse = InverseOption::None;
        self
    }

    /// Mark the field polymorphic.
    pub fn polymorphic(mut self) -> Self {
        self.polymorphic = true;
        self
    }

    /// Set `resetOnRemoteUpdate`.
    pub fn with_reset_on_remote_update(mut self, reset: bool) -> Self {
        self.reset_on_remote_update = Some(reset);
        self
    }
}

/// One relationship declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipMeta {
    /// Cardinality.
    pub kind: RelationshipKind,
    /// Declared related type.
    #[serde(rename = "type")]
    pub related_type: String,
    /// Options.
    #[serde(default)]
    pub options: RelationshipOptions,
}

/// Relationship declarations of one type, by field name.
pub type Relationships = BTreeMap<String, RelationshipMeta>;

/// Source of relationship declarations.
///
/// Implementations must be deterministic: the graph queries each
/// `(type, field)` pair at most a handful of times and caches the answer.
pub trait SchemaService {
    /// Relationship declarations for a type, `None` if the type is unknown.
    fn relationships_definition_for(&self, type_name: &str) -> Option<&Relationships>;

    /// Whether the type is known to the schema.
    fn does_type_exist(&self, type_name: &str) -> bool;
}

pub use memory::InMemorySchema;
