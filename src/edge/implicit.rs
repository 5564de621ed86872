//! Implicit edge: the undeclared side of a one-sided relationship.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::definition::EdgeDefinition;
use crate::types::Identifier;

use super::{EdgeState, Side};

/// Unordered membership kept so deletions and unloads can reach records
/// that reference this one through a field without a declared inverse.
#[derive(Debug, Clone)]
pub struct ImplicitEdge {
    pub(crate) definition: Arc<EdgeDefinition>,
    pub(crate) identifier: Identifier,
    pub(crate) state: EdgeState,
    local_members: BTreeSet<Identifier>,
    remote_members: BTreeSet<Identifier>,
}

impl ImplicitEdge {
    /// Create an empty edge.
    pub fn new(definition: Arc<EdgeDefinition>, identifier: Identifier) -> Self {
        Self {
            definition,
            identifier,
            state: EdgeState::default(),
            local_members: BTreeSet::new(),
            remote_members: BTreeSet::new(),
        }
    }

    /// Local members.
    pub fn local_members(&self) -> &BTreeSet<Identifier> {
        &self.local_members
    }

    /// Remote members.
    pub fn remote_members(&self) -> &BTreeSet<Identifier> {
        &self.remote_members
    }

    /// Add a member. A remote add also adds locally.
    pub fn add(&mut self, value: Identifier, side: Side) -> bool {
        let added = self.local_members.insert(value);
        if side == Side::Remote {
            return self.remote_members.insert(value) || added;
        }
        added
    }

    /// Remove a member. A remote removal also removes locally.
    pub fn remove(&mut self, value: Identifier, side: Side) -> bool {
        let removed = self.local_members.remove(&value);
        if side == Side::Remote {
            return self.remote_members.remove(&value) || removed;
        }
        removed
    }

    pub(crate) fn related_identifiers(&self) -> Vec<Identifier> {
        self.remote_members
            .union(&self.local_members)
            .copied()
            .collect()
    }

    pub(crate) fn remove_completely(&mut self, value: Identifier) -> bool {
        self.remove(value, Side::Remote)
    }

    pub(crate) fn replace_member(&mut self, old: Identifier, new: Identifier) -> bool {
        let mut touched = false;
        if self.remote_members.remove(&old) {
            self.remote_members.insert(new);
            touched = true;
        }
        if self.local_members.remove(&old) {
            self.local_members.insert(new);
            touched = true;
        }
        touched
    }

    /// Drop every member.
    pub fn clear(&mut self) {
        self.local_members.clear();
        self.remote_members.clear();
    }

    pub(crate) fn destroy(&mut self) {
        self.clear();
        self.state = EdgeState::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::DefinitionCache;
    use crate::schema::{InMemorySchema, RelationshipOptions};
    use crate::types::IdentifierCache;

    #[test]
    fn test_remote_and_local_membership() {
        let mut schema = InMemorySchema::new();
        schema
            .belongs_to("post", "editor", "user", RelationshipOptions::default().without_inverse())
            .define_type("user");
        let mut cache = DefinitionCache::new(true);
        let editor = cache.resolve(&schema, "post", "editor").unwrap();
        let implicit = cache.resolve(&schema, "user", editor.inverse_key()).unwrap();

        let identifiers = IdentifierCache::new();
        let user = identifiers.get_or_create("user", "1");
        let p1 = identifiers.get_or_create("post", "1");
        let p2 = identifiers.get_or_create("post", "2");
        let mut edge = ImplicitEdge::new(implicit, user);

        assert!(edge.add(p1, Side::Remote));
        assert!(edge.add(p2, Side::Local));
        assert!(!edge.add(p2, Side::Local));
        assert_eq!(edge.related_identifiers(), vec![p1, p2]);

        assert!(edge.remove(p1, Side::Local));
        assert!(edge.remote_members().contains(&p1));
        assert!(edge.remove_completely(p1));
        assert_eq!(edge.related_identifiers(), vec![p2]);
    }
}
