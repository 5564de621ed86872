//! Belongs-to edge.

use std::sync::Arc;

use crate::definition::EdgeDefinition;
use crate::types::{Identifier, RelationshipLinks};

use super::EdgeState;

/// Single-valued relationship state.
///
/// "Changed" is plain inequality between the old and new value, so this
/// variant needs no diffing.
#[derive(Debug, Clone)]
pub struct ResourceEdge {
    pub(crate) definition: Arc<EdgeDefinition>,
    pub(crate) identifier: Identifier,
    pub(crate) state: EdgeState,
    pub(crate) local_state: Option<Identifier>,
    pub(crate) remote_state: Option<Identifier>,
    pub(crate) links: Option<RelationshipLinks>,
    pub(crate) meta: Option<serde_json::Value>,
    pub(crate) transaction_ref: u64,
}

impl ResourceEdge {
    /// Create an empty edge.
    pub fn new(definition: Arc<EdgeDefinition>, identifier: Identifier) -> Self {
        Self {
            definition,
            identifier,
            state: EdgeState::default(),
            local_state: None,
            remote_state: None,
            links: None,
            meta: None,
            transaction_ref: 0,
        }
    }

    /// Current (local) value.
    pub fn compute_local_state(&self) -> Option<Identifier> {
        self.local_state
    }

    /// Last remote value.
    pub fn remote_state(&self) -> Option<Identifier> {
        self.remote_state
    }

    /// True while the local value differs from the remote one.
    pub fn is_dirty(&self) -> bool {
        self.local_state != self.remote_state
    }

    /// Set the local value, returning the previous one.
    pub fn replace_local(&mut self, value: Option<Identifier>) -> Option<Identifier> {
        std::mem::replace(&mut self.local_state, value)
    }

    /// Set the remote value, returning the previous one.
    pub fn push_remote(&mut self, value: Option<Identifier>) -> Option<Identifier> {
        self.state.has_received_data = true;
        self.state.is_empty = value.is_none();
        std::mem::replace(&mut self.remote_state, value)
    }

    /// Clear `value` from the chosen views. Returns true if the local view
    /// changed.
    pub fn remove_value(&mut self, value: Identifier, remote: bool) -> bool {
        if remote && self.remote_state == Some(value) {
            self.remote_state = None;
            self.state.is_empty = true;
        }
        if self.local_state == Some(value) {
            self.local_state = None;
            return true;
        }
        false
    }

    pub(crate) fn related_identifiers(&self) -> Vec<Identifier> {
        let mut related = Vec::with_capacity(2);
        related.extend(self.remote_state);
        if let Some(local) = self.local_state {
            if self.remote_state != Some(local) {
                related.push(local);
            }
        }
        related
    }

    pub(crate) fn remove_completely(&mut self, value: Identifier) -> bool {
        self.remove_value(value, true)
    }

    pub(crate) fn replace_member(&mut self, old: Identifier, new: Identifier) -> bool {
        if self.remote_state == Some(old) {
            self.remote_state = Some(new);
        }
        if self.local_state == Some(old) {
            self.local_state = Some(new);
            return true;
        }
        false
    }

    /// Reset both values.
    pub fn clear(&mut self) {
        self.local_state = None;
        self.remote_state = None;
    }

    pub(crate) fn destroy(&mut self) {
        self.clear();
        self.links = None;
        self.meta = None;
        self.state = EdgeState::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::DefinitionCache;
    use crate::schema::{InMemorySchema, RelationshipOptions};
    use crate::types::IdentifierCache;

    fn author_edge(identifiers: &IdentifierCache) -> ResourceEdge {
        let mut schema = InMemorySchema::new();
        schema
            .belongs_to("post", "author", "user", RelationshipOptions::default())
            .has_many("user", "posts", "post", RelationshipOptions::default());
        let definition = DefinitionCache::new(true)
            .resolve(&schema, "post", "author")
            .unwrap();
        ResourceEdge::new(definition, identifiers.get_or_create("post", "1"))
    }

    #[test]
    fn test_local_and_remote_are_independent() {
        let identifiers = IdentifierCache::new();
        let mut edge = author_edge(&identifiers);
        let u7 = identifiers.get_or_create("user", "7");
        let u9 = identifiers.get_or_create("user", "9");

        assert_eq!(edge.push_remote(Some(u7)), None);
        edge.replace_local(Some(u7));
        assert!(!edge.is_dirty());

        assert_eq!(edge.replace_local(Some(u9)), Some(u7));
        assert!(edge.is_dirty());
        assert_eq!(edge.remote_state(), Some(u7));
        assert_eq!(edge.related_identifiers(), vec![u7, u9]);
    }

    #[test]
    fn test_remove_value() {
        let identifiers = IdentifierCache::new();
        let mut edge = author_edge(&identifiers);
        let u7 = identifiers.get_or_create("user", "7");

        edge.push_remote(Some(u7));
        edge.replace_local(Some(u7));
        assert!(edge.remove_value(u7, false));
        assert_eq!(edge.remote_state(), Some(u7));
        assert!(!edge.remove_value(u7, true));
        assert_eq!(edge.remote_state(), None);
        assert!(edge.state.is_empty);
    }
}
