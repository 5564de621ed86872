//! Record identity for the relationship graph.
//!
//! Identities live in an arena owned by the [`IdentifierCache`]. The graph
//! only ever holds [`Identifier`] handles, which are `Copy` and compare by
//! handle, so edges can reference records without reference cycles.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable handle for a record identity.
///
/// Two handles are equal iff they address the same arena slot.
/// Implements `Ord` (arena order) for deterministic iteration. The handle is
/// the arena index itself, so it is as wide as the arena can grow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identifier(usize);

impl Identifier {
    /// Raw arena index.
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "identifier#{}", self.0)
    }
}

/// Resolved `{type, id, lid}` triple for an identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceKey {
    /// Record type.
    #[serde(rename = "type")]
    pub type_name: String,
    /// Server-assigned id, `None` while the record is new.
    pub id: Option<String>,
    /// Client-side local id, always present.
    pub lid: String,
}

/// Result of assigning a server id to a client-created identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOutcome {
    /// The id was recorded on the identifier.
    Assigned,
    /// The identifier already carried this id.
    Unchanged,
    /// Another identifier already owns `(type, id)`; the host should merge
    /// the two in the graph.
    Conflict(Identifier),
}

#[derive(Debug)]
struct IdentifierRecord {
    type_name: Arc<str>,
    id: Option<String>,
    lid: String,
}

#[derive(Debug, Default)]
struct Arena {
    records: Vec<IdentifierRecord>,
    by_id: HashMap<(Arc<str>, String), Identifier>,
    by_lid: HashMap<String, Identifier>,
    types: HashMap<String, Arc<str>>,
}

impl Arena {
    fn intern(&mut self, type_name: &str) -> Arc<str> {
        if let Some(existing) = self.types.get(type_name) {
            return Arc::clone(existing);
        }
        let interned: Arc<str> = Arc::from(type_name);
        self.types.insert(type_name.to_string(), Arc::clone(&interned));
        interned
    }

    fn insert(&mut self, type_name: &str, id: Option<String>, lid: String) -> Identifier {
        let type_name = self.intern(type_name);
        let handle = Identifier(self.records.len());
        if let Some(id) = &id {
            self.by_id.insert((Arc::clone(&type_name), id.clone()), handle);
        }
        self.by_lid.insert(lid.clone(), handle);
        self.records.push(IdentifierRecord { type_name, id, lid });
        handle
    }

    fn record(&self, identifier: Identifier) -> Option<&IdentifierRecord> {
        self.records.get(identifier.0)
    }
}

/// Arena of record identities shared between a host store and its graph.
///
/// Identifiers are never destroyed; a merged-away identifier simply stops
/// being referenced by the graph.
#[derive(Debug, Default)]
pub struct IdentifierCache {
    arena: RwLock<Arena>,
}

impl IdentifierCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up `(type, id)`, creating the identity on first sight.
    pub fn get_or_create(&self, type_name: &str, id: &str) -> Identifier {
        if let Some(found) = self.find(type_name, id) {
            return found;
        }
        let mut arena = self.arena.write();
        // Re-check under the write lock.
        if let Some(found) = arena.by_id.get(&(Arc::from(type_name), id.to_string())) {
            return *found;
        }
        let lid = format!("@lid:{}-{}", type_name, id);
        arena.insert(type_name, Some(id.to_string()), lid)
    }

    /// Create the identity of a record that exists only on the client.
    pub fn create_local(&self, type_name: &str) -> Identifier {
        let lid = format!("@lid:{}", Uuid::new_v4());
        self.arena.write().insert(type_name, None, lid)
    }

    /// Find an existing identity by `(type, id)`.
    pub fn find(&self, type_name: &str, id: &str) -> Option<Identifier> {
        let arena = self.arena.read();
        arena.by_id.get(&(Arc::from(type_name), id.to_string())).copied()
    }

    /// Find an existing identity by local id.
    pub fn find_by_lid(&self, lid: &str) -> Option<Identifier> {
        self.arena.read().by_lid.get(lid).copied()
    }

    /// Resolve a resource linkage object to an identifier.
    ///
    /// A known `lid` wins; otherwise `(type, id)` is looked up or created.
    /// An unknown `lid` without an id registers a new client-side identity.
    /// Returns `None` when neither `id` nor `lid` is given.
    pub fn upgrade(&self, type_name: &str, id: Option<&str>, lid: Option<&str>) -> Option<Identifier> {
        if let Some(lid) = lid {
            if let Some(found) = self.find_by_lid(lid) {
                return Some(found);
            }
        }
        match (id, lid) {
            (Some(id), _) => Some(self.get_or_create(type_name, id)),
            (None, Some(lid)) => Some(self.arena.write().insert(type_name, None, lid.to_string())),
            (None, None) => None,
        }
    }

    /// Record type of an identifier.
    pub fn type_of(&self, identifier: Identifier) -> Option<Arc<str>> {
        self.arena
            .read()
            .record(identifier)
            .map(|r| Arc::clone(&r.type_name))
    }

    /// True while the record has no server-assigned id.
    ///
    /// Unknown handles are reported as not new.
    pub fn is_new(&self, identifier: Identifier) -> bool {
        self.arena
            .read()
            .record(identifier)
            .map(|r| r.id.is_none())
            .unwrap_or(false)
    }

    /// Full `{type, id, lid}` of an identifier.
    pub fn resource_key(&self, identifier: Identifier) -> Option<ResourceKey> {
        self.arena.read().record(identifier).map(|r| ResourceKey {
            type_name: r.type_name.to_string(),
            id: r.id.clone(),
            lid: r.lid.clone(),
        })
    }

    /// Record the server id for a client-created identity.
    pub fn assign_id(&self, identifier: Identifier, id: &str) -> Option<AssignOutcome> {
        let mut arena = self.arena.write();
        let type_name = Arc::clone(&arena.record(identifier)?.type_name);
        let key = (Arc::clone(&type_name), id.to_string());
        if let Some(existing) = arena.by_id.get(&key).copied() {
            return Some(if existing == identifier {
                AssignOutcome::Unchanged
            } else {
                AssignOutcome::Conflict(existing)
            });
        }
        arena.by_id.insert(key, identifier);
        let record = arena.records.get_mut(identifier.0)?;
        record.id = Some(id.to_string());
        Some(AssignOutcome::Assigned)
    }

    /// Number of identities ever created.
    pub fn len(&self) -> usize {
        self.arena.read().records.len()
    }

    /// True if no identity was created yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
