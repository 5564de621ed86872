//! In-memory schema for hosts and tests.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{RelationshipKind, RelationshipMeta, RelationshipOptions, Relationships, SchemaService};

/// In-memory schema.
///
/// Uses BTreeMap for deterministic iteration order, which keeps inverse
/// inference and its error messages stable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InMemorySchema {
    types: BTreeMap<String, Relationships>,
}

impl InMemorySchema {
    /// Create an empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a schema from JSON (`{ type: { field: meta } }`).
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Declare a type with no relationships yet.
    pub fn define_type(&mut self, type_name: impl Into<String>) -> &mut Self {
        self.types.entry(type_name.into()).or_default();
        self
    }

    /// Declare a relationship field.
    pub fn add_relationship(
        &mut self,
        type_name: impl Into<String>,
        field: impl Into<String>,
        meta: RelationshipMeta,
    ) -> &mut Self {
        self.types
            .entry(type_name.into())
            .or_default()
            .insert(field.into(), meta);
        self
    }

    /// Declare a to-one field.
    pub fn belongs_to(
        &mut self,
        type_name: impl Into<String>,
        field: impl Into<String>,
        related_type: impl Into<String>,
        options: RelationshipOptions,
    ) -> &mut Self {
        let meta = RelationshipMeta {
            kind: RelationshipKind::BelongsTo,
            related_type: related_type.into(),
            options,
        };
        self.add_relationship(type_name, field, meta)
    }

    /// Declare a to-many field.
    pub fn has_many(
        &mut self,
        type_name: impl Into<String>,
        field: impl Into<String>,
        related_type: impl Into<String>,
        options: RelationshipOptions,
    ) -> &mut Self {
        let meta = RelationshipMeta {
            kind: RelationshipKind::HasMany,
            related_type: related_type.into(),
            options,
        };
        self.add_relationship(type_name, field, meta)
    }

    /// Number of declared types.
    pub fn num_types(&self) -> usize {
        self.types.len()
    }
}

impl SchemaService for InMemorySchema {
    fn relationships_definition_for(&self, type_name: &str) -> Option<&Relationships> {
        self.types.get(type_name)
    }

    fn does_type_exist(&self, type_name: &str) -> bool {
        self.types.contains_key(type_name)
    }
}
