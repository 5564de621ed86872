//! Edge definitions and their resolution.
//!
//! An [`EdgeDefinition`] describes one side of a relationship pair together
//! with what it knows about the other side. Resolution is two-phase: the side
//! being resolved is built from its schema declaration, then paired with its
//! inverse. Pairing data lives in a `OnceLock`, so a definition is frozen the
//! moment both sides are known. The only definitions that stay unpaired for a
//! while are polymorphic fields whose abstract related type has no schema
//! entry; they run on placeholder inverse data until the first concrete
//! inverse is resolved and backfills them.
//!
//! ## Caches
//!
//! | Table | Key | Purpose |
//! |-------|-----|---------|
//! | definitions | `(type, field)` | O(1) lookup from either side |
//! | implicit | synthesized key | implicit inverses, valid on any type |
//! | polymorphic | type | symmetric abstract/concrete compatibility |
//!
//! All three are owned by the cache instance, so separate graphs never share
//! resolution state.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::schema::{InverseOption, RelationshipKind, RelationshipMeta, SchemaService};

/// Prefix of synthesized implicit inverse keys.
pub const IMPLICIT_KEY_PREFIX: &str = "implicit-";

/// Storage shape of an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    /// Single nullable value (belongs-to).
    Resource,
    /// Ordered members (has-many).
    Collection,
    /// Unordered membership kept for an undeclared inverse.
    Implicit,
}

impl From<RelationshipKind> for EdgeKind {
    fn from(kind: RelationshipKind) -> Self {
        match kind {
            RelationshipKind::BelongsTo => Self::Resource,
            RelationshipKind::HasMany => Self::Collection,
        }
    }
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resource => write!(f, "resource"),
            Self::Collection => write!(f, "collection"),
            Self::Implicit => write!(f, "implicit"),
        }
    }
}

/// Configuration errors found while resolving a definition.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DefinitionError {
    /// The schema has no declaration for the field.
    #[error("no relationship schema for '{type_name}.{field}'")]
    MissingRelationship {
        /// Record type.
        type_name: String,
        /// Field name.
        field: String,
    },
    /// The related type is unknown and the field is not polymorphic.
    #[error("'{type_name}.{field}' targets unknown type '{related_type}'")]
    UnknownType {
        /// Record type.
        type_name: String,
        /// Field name.
        field: String,
        /// Declared related type.
        related_type: String,
    },
    /// The named inverse does not exist on the related type.
    #[error("'{type_name}.{field}' declares inverse '{inverse_type}.{inverse_key}', which does not exist")]
    MissingInverse {
        /// Record type.
        type_name: String,
        /// Field name.
        field: String,
        /// Related type.
        inverse_type: String,
        /// Inverse field name.
        inverse_key: String,
    },
    /// Both sides disagree about the pairing.
    #[error("'{type_name}.{field}' resolves to inverse '{inverse_type}.{inverse_key}', which declares inverse {declared:?}")]
    ConflictingInverse {
        /// Record type.
        type_name: String,
        /// Field name.
        field: String,
        /// Related type.
        inverse_type: String,
        /// Inverse field name.
        inverse_key: String,
        /// What the inverse declares (`None` for `inverse: null`).
        declared: Option<String>,
    },
    /// Inference found several candidate inverses.
    #[error("'{type_name}.{field}' has ambiguous inverses {candidates:?}; declare one explicitly")]
    AmbiguousInverse {
        /// Record type.
        type_name: String,
        /// Field name.
        field: String,
        /// Candidate fields on the related type.
        candidates: Vec<String>,
    },
    /// A record of another type was placed in a non-polymorphic field.
    #[error("'{type_name}.{field}' expects '{expected}' but got '{actual}' and is not polymorphic")]
    NotPolymorphic {
        /// Record type.
        type_name: String,
        /// Field name.
        field: String,
        /// Declared related type.
        expected: String,
        /// Offending type.
        actual: String,
    },
    /// A concrete type does not implement the inverse of a polymorphic field.
    #[error("'{actual}' cannot be used in polymorphic '{type_name}.{field}': it has no '{inverse_key}' relationship")]
    IncompatiblePolymorphicType {
        /// Record type.
        type_name: String,
        /// Field name.
        field: String,
        /// Offending type.
        actual: String,
        /// Inverse field the concrete type must declare.
        inverse_key: String,
    },
}

/// What one side knows about its inverse once paired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pairing {
    /// Inverse field name (synthesized for implicit inverses).
    pub inverse_key: Arc<str>,
    /// Inverse storage shape.
    pub inverse_kind: EdgeKind,
    /// Inverse async flag.
    pub inverse_is_async: bool,
    /// Inverse polymorphic flag.
    pub inverse_is_polymorphic: bool,
    /// Shared `resetOnRemoteUpdate` of the pair.
    pub reset_on_remote_update: bool,
    /// Owning type equals inverse type.
    pub is_self_referential: bool,
    /// Self-referential and the inverse is this very field.
    pub is_reflexive: bool,
}

/// One side of a relationship pair.
#[derive(Debug)]
pub struct EdgeDefinition {
    field: Arc<str>,
    kind: EdgeKind,
    owner_type: Arc<str>,
    related_type: Arc<str>,
    is_async: bool,
    is_polymorphic: bool,
    declared_reset: Option<bool>,
    pairing: OnceLock<Pairing>,
    placeholder: Pairing,
}

impl EdgeDefinition {
    fn from_meta(
        owner_type: &str,
        field: &str,
        meta: &RelationshipMeta,
        inverse_hint: Option<&str>,
        reset_default: bool,
    ) -> Self {
        let owner_type: Arc<str> = Arc::from(owner_type);
        let related_type: Arc<str> = Arc::from(meta.related_type.as_str());
        let declared_reset = meta.options.reset_on_remote_update;
        let placeholder = Pairing {
            inverse_key: Arc::from(inverse_hint.unwrap_or_default()),
            inverse_kind: EdgeKind::Resource,
            inverse_is_async: false,
            inverse_is_polymorphic: false,
            reset_on_remote_update: declared_reset.unwrap_or(reset_default),
            is_self_referential: owner_type == related_type,
            is_reflexive: false,
        };
        Self {
            field: Arc::from(field),
            kind: meta.kind.into(),
            owner_type,
            related_type,
            is_async: meta.options.is_async,
            is_polymorphic: meta.options.polymorphic,
            declared_reset,
            pairing: OnceLock::new(),
            placeholder,
        }
    }

    fn implicit(key: Arc<str>, owner_type: Arc<str>, related_type: Arc<str>, reset_default: bool) -> Self {
        let placeholder = Pairing {
            inverse_key: Arc::from(""),
            inverse_kind: EdgeKind::Resource,
            inverse_is_async: false,
            inverse_is_polymorphic: false,
            reset_on_remote_update: reset_default,
            is_self_referential: owner_type == related_type,
            is_reflexive: false,
        };
        Self {
            field: key,
            kind: EdgeKind::Implicit,
            owner_type,
            related_type,
            is_async: false,
            is_polymorphic: false,
            declared_reset: None,
            pairing: OnceLock::new(),
            placeholder,
        }
    }

    fn pairing_for(&self, inverse: &EdgeDefinition, reset: bool) -> Pairing {
        let is_self_referential = self.owner_type == self.related_type;
        Pairing {
            inverse_key: Arc::clone(&inverse.field),
            inverse_kind: inverse.kind,
            inverse_is_async: inverse.is_async,
            inverse_is_polymorphic: inverse.is_polymorphic,
            reset_on_remote_update: reset,
            is_self_referential,
            is_reflexive: is_self_referential && self.field == inverse.field,
        }
    }

    fn pairing(&self) -> &Pairing {
        self.pairing.get().unwrap_or(&self.placeholder)
    }

    /// Field name.
    pub fn field(&self) -> &Arc<str> {
        &self.field
    }

    /// Storage shape.
    pub fn kind(&self) -> EdgeKind {
        self.kind
    }

    /// Type that declares the field (the abstract base for shared
    /// polymorphic definitions).
    pub fn owner_type(&self) -> &Arc<str> {
        &self.owner_type
    }

    /// Declared type of the related records, which is the inverse type.
    pub fn related_type(&self) -> &Arc<str> {
        &self.related_type
    }

    /// Async flag.
    pub fn is_async(&self) -> bool {
        self.is_async
    }

    /// Polymorphic flag.
    pub fn is_polymorphic(&self) -> bool {
        self.is_polymorphic
    }

    /// True for has-many and implicit edges.
    pub fn is_collection(&self) -> bool {
        self.kind != EdgeKind::Resource
    }

    /// True for synthesized inverses.
    pub fn is_implicit(&self) -> bool {
        self.kind == EdgeKind::Implicit
    }

    /// Inverse field name.
    pub fn inverse_key(&self) -> &Arc<str> {
        &self.pairing().inverse_key
    }

    /// Inverse storage shape.
    pub fn inverse_kind(&self) -> EdgeKind {
        self.pairing().inverse_kind
    }

    /// Inverse async flag.
    pub fn inverse_is_async(&self) -> bool {
        self.pairing().inverse_is_async
    }

    /// Inverse polymorphic flag.
    pub fn inverse_is_polymorphic(&self) -> bool {
        self.pairing().inverse_is_polymorphic
    }

    /// True when the inverse is synthesized.
    pub fn inverse_is_implicit(&self) -> bool {
        self.pairing().inverse_kind == EdgeKind::Implicit
    }

    /// Whether remote updates discard unsaved local changes.
    pub fn reset_on_remote_update(&self) -> bool {
        self.pairing().reset_on_remote_update
    }

    /// Owning type equals inverse type.
    pub fn is_self_referential(&self) -> bool {
        self.pairing().is_self_referential
    }

    /// The field is its own inverse.
    pub fn is_reflexive(&self) -> bool {
        self.pairing().is_reflexive
    }

    /// False while running on placeholder inverse data.
    pub fn is_paired(&self) -> bool {
        self.pairing.get().is_some()
    }
}

fn shared_reset(a: &EdgeDefinition, b: &EdgeDefinition, reset_default: bool) -> bool {
    match (a.declared_reset, b.declared_reset) {
        (Some(false), _) | (_, Some(false)) => false,
        (Some(true), _) | (_, Some(true)) => true,
        (None, None) => reset_default,
    }
}

/// Freeze both sides of a pair. A side that is already paired keeps its data.
fn pair(a: &EdgeDefinition, b: &EdgeDefinition, reset_default: bool) {
    let reset = shared_reset(a, b, reset_default);
    let _ = a.pairing.set(a.pairing_for(b, reset));
    let _ = b.pairing.set(b.pairing_for(a, reset));
}

/// Resolves and caches edge definitions for one graph.
#[derive(Debug)]
pub struct DefinitionCache {
    definitions: HashMap<Arc<str>, HashMap<Arc<str>, Arc<EdgeDefinition>>>,
    implicit: HashMap<Arc<str>, Arc<EdgeDefinition>>,
    polymorphic: HashMap<Arc<str>, BTreeSet<Arc<str>>>,
    reset_default: bool,
}

impl DefinitionCache {
    /// Create an empty cache. `reset_default` applies when neither side of a
    /// pair declares `resetOnRemoteUpdate`.
    pub fn new(reset_default: bool) -> Self {
        Self {
            definitions: HashMap::new(),
            implicit: HashMap::new(),
            polymorphic: HashMap::new(),
            reset_default,
        }
    }

    /// Cached definition for `(type, field)`, without resolving.
    pub fn cached(&self, type_name: &str, field: &str) -> Option<Arc<EdgeDefinition>> {
        self.definitions
            .get(type_name)
            .and_then(|fields| fields.get(field))
            .cloned()
    }

    /// Number of cached `(type, field)` entries.
    pub fn len(&self) -> usize {
        self.definitions.values().map(HashMap::len).sum()
    }

    /// True if nothing has been resolved yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn store(&mut self, type_name: &str, field: &str, definition: Arc<EdgeDefinition>) {
        self.definitions
            .entry(Arc::from(type_name))
            .or_default()
            .insert(Arc::from(field), definition);
    }

    /// Record that `a` and `b` are compatible for polymorphic membership.
    pub fn register_polymorphic_type(&mut self, a: &str, b: &str) {
        if a == b || self.is_polymorphic_pair(a, b) {
            return;
        }
        tracing::trace!(abstract_type = a, concrete_type = b, "registering polymorphic type");
        self.polymorphic
            .entry(Arc::from(a))
            .or_default()
            .insert(Arc::from(b));
        self.polymorphic
            .entry(Arc::from(b))
            .or_default()
            .insert(Arc::from(a));
    }

    /// Whether `a` and `b` were registered as compatible.
    pub fn is_polymorphic_pair(&self, a: &str, b: &str) -> bool {
        self.polymorphic
            .get(a)
            .map(|set| set.contains(b))
            .unwrap_or(false)
    }

    /// Resolve the definition of `type_name.field`.
    pub fn resolve(
        &mut self,
        schema: &dyn SchemaService,
        type_name: &str,
        field: &str,
    ) -> Result<Arc<EdgeDefinition>, DefinitionError> {
        if let Some(found) = self.cached(type_name, field) {
            return Ok(found);
        }
        if let Some(implicit) = self.implicit.get(field).cloned() {
            self.store(type_name, field, Arc::clone(&implicit));
            return Ok(implicit);
        }

        let meta = match schema
            .relationships_definition_for(type_name)
            .and_then(|fields| fields.get(field))
        {
            Some(meta) => meta.clone(),
            None => return self.resolve_via_polymorphic(type_name, field),
        };
        tracing::trace!(type_name, field, "resolving relationship definition");

        let related_type = meta.related_type.clone();
        let related_exists = schema.does_type_exist(&related_type);
        let inverse_key = match &meta.options.inverse {
            InverseOption::None => None,
            InverseOption::Field(name) => Some(name.clone()),
            InverseOption::Inferred if related_exists => {
                infer_inverse(schema, type_name, field, &related_type)?
            }
            InverseOption::Inferred => None,
        };
        let definition = Arc::new(EdgeDefinition::from_meta(
            type_name,
            field,
            &meta,
            inverse_key.as_deref(),
            self.reset_default,
        ));

        if !related_exists {
            if !meta.options.polymorphic {
                return Err(DefinitionError::UnknownType {
                    type_name: type_name.to_string(),
                    field: field.to_string(),
                    related_type,
                });
            }
            // Abstract base without declarations: wait for a concrete inverse.
            if inverse_key.is_some() {
                self.store(type_name, field, Arc::clone(&definition));
                return Ok(definition);
            }
            return Ok(self.install_implicit(type_name, field, definition));
        }

        let Some(inverse_key) = inverse_key else {
            return Ok(self.install_implicit(type_name, field, definition));
        };

        // Reflexive: the field is its own inverse.
        if related_type == type_name && inverse_key == field {
            pair(&definition, &definition, self.reset_default);
            self.store(type_name, field, Arc::clone(&definition));
            return Ok(definition);
        }

        let inverse_meta = schema
            .relationships_definition_for(&related_type)
            .and_then(|fields| fields.get(&inverse_key))
            .cloned()
            .ok_or_else(|| DefinitionError::MissingInverse {
                type_name: type_name.to_string(),
                field: field.to_string(),
                inverse_type: related_type.clone(),
                inverse_key: inverse_key.clone(),
            })?;

        let conflict = match &inverse_meta.options.inverse {
            InverseOption::Field(name) if name != field => Some(Some(name.clone())),
            InverseOption::None => Some(None),
            _ => None,
        };
        if let Some(declared) = conflict {
            return Err(DefinitionError::ConflictingInverse {
                type_name: type_name.to_string(),
                field: field.to_string(),
                inverse_type: related_type,
                inverse_key,
                declared,
            });
        }

        if inverse_meta.related_type != type_name {
            if !inverse_meta.options.polymorphic
                && !self.is_polymorphic_pair(&inverse_meta.related_type, type_name)
            {
                return Err(DefinitionError::NotPolymorphic {
                    type_name: related_type,
                    field: inverse_key,
                    expected: inverse_meta.related_type,
                    actual: type_name.to_string(),
                });
            }
            self.register_polymorphic_type(&inverse_meta.related_type, type_name);
        }

        if let Some(existing) = self.cached(&related_type, &inverse_key) {
            if existing.is_paired() && existing.inverse_is_implicit() {
                return Err(DefinitionError::ConflictingInverse {
                    type_name: type_name.to_string(),
                    field: field.to_string(),
                    inverse_type: related_type,
                    inverse_key,
                    declared: None,
                });
            }
            // Second pass: backfill a placeholder side, then pair ourselves.
            if !existing.is_paired() {
                tracing::trace!(
                    type_name = %existing.owner_type(),
                    field = %existing.field(),
                    "backfilling placeholder inverse"
                );
            }
            pair(&existing, &definition, self.reset_default);
            self.store(type_name, field, Arc::clone(&definition));
            return Ok(definition);
        }

        let inverse = Arc::new(EdgeDefinition::from_meta(
            &related_type,
            &inverse_key,
            &inverse_meta,
            Some(field),
            self.reset_default,
        ));
        pair(&definition, &inverse, self.reset_default);
        self.store(&related_type, &inverse_key, inverse);
        self.store(type_name, field, Arc::clone(&definition));
        Ok(definition)
    }

    fn resolve_via_polymorphic(
        &mut self,
        type_name: &str,
        field: &str,
    ) -> Result<Arc<EdgeDefinition>, DefinitionError> {
        let alternatives: Vec<Arc<str>> = self
            .polymorphic
            .get(type_name)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        for alternative in alternatives {
            if let Some(found) = self.cached(&alternative, field) {
                self.store(type_name, field, Arc::clone(&found));
                return Ok(found);
            }
        }
        Err(DefinitionError::MissingRelationship {
            type_name: type_name.to_string(),
            field: field.to_string(),
        })
    }

    fn install_implicit(
        &mut self,
        type_name: &str,
        field: &str,
        definition: Arc<EdgeDefinition>,
    ) -> Arc<EdgeDefinition> {
        let key: Arc<str> = Arc::from(format!("{}{}:{}", IMPLICIT_KEY_PREFIX, type_name, field));
        let implicit = Arc::new(EdgeDefinition::implicit(
            Arc::clone(&key),
            Arc::clone(definition.related_type()),
            Arc::clone(definition.owner_type()),
            self.reset_default,
        ));
        pair(&definition, &implicit, self.reset_default);
        tracing::trace!(type_name, field, implicit_key = %key, "synthesized implicit inverse");

        let related_type = Arc::clone(definition.related_type());
        self.implicit.insert(Arc::clone(&key), Arc::clone(&implicit));
        self.store(&related_type, &key, implicit);
        self.store(type_name, field, Arc::clone(&definition));
        definition
    }
}

fn infer_inverse(
    schema: &dyn SchemaService,
    type_name: &str,
    field: &str,
    related_type: &str,
) -> Result<Option<String>, DefinitionError> {
    let Some(candidates) = schema.relationships_definition_for(related_type) else {
        return Ok(None);
    };
    let mut named = Vec::new();
    let mut open = Vec::new();
    for (name, meta) in candidates {
        if related_type == type_name && name == field {
            continue;
        }
        if meta.related_type != type_name {
            continue;
        }
        match &meta.options.inverse {
            InverseOption::Field(inverse) if inverse == field => named.push(name.clone()),
            InverseOption::Inferred => open.push(name.clone()),
            _ => {}
        }
    }
    let matches = if named.is_empty() { open } else { named };
    match matches.len() {
        0 => Ok(None),
        1 => Ok(matches.into_iter().next()),
        _ => Err(DefinitionError::AmbiguousInverse {
            type_name: type_name.to_string(),
            field: field.to_string(),
            candidates: matches,
        }),
    }
}
