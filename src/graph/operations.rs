//! Operation handlers.
//!
//! Every handler leaves both sides of each touched relationship consistent
//! before returning. Notifications are only queued here; delivery happens
//! in the `sync` phase.

use std::collections::HashSet;
use std::sync::Arc;

use crate::definition::{EdgeDefinition, EdgeKind};
use crate::diff::{diff_collection, CollectionDiff};
use crate::edge::{EdgeState, GraphEdge, Side};
use crate::types::{Identifier, RelatedData, RelationshipLinks};

use super::{payload_error, Graph, GraphError, PayloadKind, RemoteUpdate};

/// Store links and meta from a payload. Returns true when the related link
/// changed on a payload without data, which marks the edge stale.
fn apply_links(
    links_slot: &mut Option<RelationshipLinks>,
    meta_slot: &mut Option<serde_json::Value>,
    state: &mut EdgeState,
    links: Option<RelationshipLinks>,
    meta: Option<serde_json::Value>,
    has_data: bool,
) -> bool {
    if let Some(meta) = meta {
        *meta_slot = Some(meta);
    }
    if has_data {
        state.is_stale = false;
    }
    let Some(links) = links else {
        return false;
    };
    let previous = links_slot
        .as_ref()
        .and_then(|links| links.related.as_ref())
        .map(|link| link.href().to_string());
    let incoming = links.related.as_ref().map(|link| link.href().to_string());
    *links_slot = Some(links);
    if !has_data && incoming.is_some() && incoming != previous {
        state.is_stale = true;
        return true;
    }
    false
}

fn tag_transaction(slot: &mut u64, transaction: Option<u64>, identifier: Identifier, field: &str) {
    let Some(transaction) = transaction else {
        return;
    };
    if *slot == transaction {
        tracing::debug!(
            transaction,
            identifier = %identifier,
            field,
            "edge received more than one remote update in a single transaction"
        );
    }
    *slot = transaction;
}

impl Graph {
    // ─────────────────────────────────────────────────────────────────────────
    // Remote updates
    // ─────────────────────────────────────────────────────────────────────────

    pub(crate) fn apply_remote_update(&mut self, update: RemoteUpdate) -> Result<(), GraphError> {
        let RemoteUpdate { record, definition, data, links, meta } = update;
        let field = Arc::clone(definition.field());
        let transaction = self.transaction;
        let has_data = data.is_some();

        let (stale_changed, has_received_data) = match self.ensure_edge(record, &field)? {
            GraphEdge::Resource(edge) => {
                tag_transaction(&mut edge.transaction_ref, transaction, record, &field);
                let stale = apply_links(&mut edge.links, &mut edge.meta, &mut edge.state, links, meta, has_data);
                (stale, edge.state.has_received_data)
            }
            GraphEdge::Collection(edge) => {
                tag_transaction(&mut edge.transaction_ref, transaction, record, &field);
                let stale = apply_links(&mut edge.links, &mut edge.meta, &mut edge.state, links, meta, has_data);
                (stale, edge.state.has_received_data)
            }
            GraphEdge::Implicit(_) => {
                return Err(GraphError::ImplicitEdgeMutation { field: field.to_string() });
            }
        };

        // Without data and without anything received before, the
        // relationship is known to be empty.
        let data = match data {
            Some(data) => data,
            None if !has_received_data => match definition.kind() {
                EdgeKind::Collection => RelatedData::Many(Vec::new()),
                _ => RelatedData::One(None),
            },
            None => {
                if stale_changed {
                    self.notify_change(record, &field);
                }
                return Ok(());
            }
        };

        match (definition.kind(), data) {
            (EdgeKind::Collection, RelatedData::Many(members)) => {
                self.replace_related_records_remote(record, &definition, members)?;
            }
            (EdgeKind::Resource, RelatedData::One(value)) => {
                self.replace_related_record(record, &definition, value, Side::Remote, true)?;
            }
            (EdgeKind::Resource, RelatedData::Many(_)) => {
                return Err(payload_error(&definition, PayloadKind::ExpectedSingle).into());
            }
            (_, _) => {
                return Err(payload_error(&definition, PayloadKind::ExpectedCollection).into());
            }
        }
        if stale_changed {
            self.notify_change(record, &field);
        }
        Ok(())
    }

    /// Replace a belongs-to value on one side, keeping the inverse in step.
    ///
    /// `link_new` is false when the caller is the inverse side itself, which
    /// already holds `record`.
    pub(crate) fn replace_related_record(
        &mut self,
        record: Identifier,
        definition: &EdgeDefinition,
        value: Option<Identifier>,
        side: Side,
        link_new: bool,
    ) -> Result<(), GraphError> {
        let field = Arc::clone(definition.field());
        let inverse_key = Arc::clone(definition.inverse_key());
        let reset = definition.reset_on_remote_update();
        let edge = self.resource_mut(record, &field)?;

        match side {
            Side::Remote => {
                let prev_remote = edge.push_remote(value);
                let prev_local = edge.local_state;
                let local_reset = prev_local != value && (reset || prev_local == prev_remote);
                if local_reset {
                    edge.replace_local(value);
                } else if prev_local != value {
                    tracing::debug!(
                        identifier = %record,
                        field = %field,
                        "keeping local change over remote update"
                    );
                }

                let keeps_local = !local_reset && prev_local != value;

                if prev_remote != value {
                    if let Some(old) = prev_remote {
                        self.remove_from_inverse(old, &inverse_key, record, Side::Remote);
                    }
                    if link_new {
                        if let Some(new) = value {
                            self.add_to_inverse(new, &inverse_key, record, Side::Remote)?;
                        }
                    }
                    // The kept local value points elsewhere, so the new remote
                    // value must not hold `record` locally. A belongs-to caller
                    // settles its own local side afterwards.
                    if keeps_local && (link_new || definition.inverse_kind() == EdgeKind::Collection) {
                        if let Some(new) = value {
                            self.remove_from_inverse(new, &inverse_key, record, Side::Local);
                        }
                    }
                }
                if local_reset {
                    if let Some(discarded) = prev_local.filter(|local| Some(*local) != prev_remote) {
                        tracing::debug!(
                            identifier = %record,
                            field = %field,
                            discarded = %discarded,
                            "remote update discarded local change"
                        );
                        self.remove_from_inverse(discarded, &inverse_key, record, Side::Local);
                    }
                    if link_new {
                        if let Some(new) = value {
                            self.add_to_inverse(new, &inverse_key, record, Side::Local)?;
                        }
                    }
                    self.notify_change(record, &field);
                }
            }
            Side::Local => {
                let prev_local = edge.replace_local(value);
                if prev_local == value {
                    return Ok(());
                }
                if let Some(old) = prev_local {
                    self.remove_from_inverse(old, &inverse_key, record, Side::Local);
                }
                if link_new {
                    if let Some(new) = value {
                        self.add_to_inverse(new, &inverse_key, record, Side::Local)?;
                    }
                }
                self.notify_change(record, &field);
            }
        }
        Ok(())
    }

    /// Replace a has-many field's remote state.
    pub(crate) fn replace_related_records_remote(
        &mut self,
        record: Identifier,
        definition: &EdgeDefinition,
        members: Vec<Identifier>,
    ) -> Result<(), GraphError> {
        let field = Arc::clone(definition.field());
        let inverse_key = Arc::clone(definition.inverse_key());
        let reset = definition.reset_on_remote_update();
        let edge = self.collection_mut(record, &field)?;

        let prev_local = edge.compute_local_state().to_vec();
        let diff = diff_collection(&members, edge.remote_state(), edge.remote_members(), &prev_local);
        if diff.has_duplicates() {
            tracing::warn!(
                identifier = %record,
                field = %field,
                duplicates = diff.duplicates.len(),
                "remote payload lists members more than once; keeping first occurrences"
            );
        }
        let CollectionDiff {
            added,
            removed,
            final_state,
            final_set,
            changed,
            remote_order_changed,
            ..
        } = diff;

        edge.push_remote(final_state, final_set);
        let (reverted_additions, reverted_removals) = if reset {
            edge.take_pending()
        } else {
            (Vec::new(), Vec::new())
        };
        if reset || remote_order_changed {
            edge.mark_dirty();
        }
        let local_changed = if reset {
            changed
        } else {
            edge.compute_local_state() != prev_local.as_slice()
        };
        if !reverted_additions.is_empty() || !reverted_removals.is_empty() {
            tracing::debug!(
                identifier = %record,
                field = %field,
                additions = reverted_additions.len(),
                removals = reverted_removals.len(),
                "remote update discarded local changes"
            );
        }

        for member in removed {
            self.remove_from_inverse(member, &inverse_key, record, Side::Remote);
        }
        for member in added {
            self.add_to_inverse(member, &inverse_key, record, Side::Remote)?;
        }
        for member in reverted_additions {
            self.remove_from_inverse(member, &inverse_key, record, Side::Local);
        }
        for member in reverted_removals {
            self.add_to_inverse(member, &inverse_key, record, Side::Local)?;
        }
        if local_changed {
            self.notify_change(record, &field);
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Local mutations
    // ─────────────────────────────────────────────────────────────────────────

    /// Replace a has-many field's local state wholesale.
    pub(crate) fn replace_related_records_local(
        &mut self,
        record: Identifier,
        definition: &EdgeDefinition,
        members: Vec<Identifier>,
    ) -> Result<(), GraphError> {
        let field = Arc::clone(definition.field());
        let inverse_key = Arc::clone(definition.inverse_key());
        let edge = self.collection_mut(record, &field)?;

        let prev_local = edge.compute_local_state().to_vec();
        let prev_set: HashSet<Identifier> = prev_local.iter().copied().collect();
        let diff = diff_collection(&members, &prev_local, &prev_set, &prev_local);
        if diff.has_duplicates() {
            tracing::warn!(
                identifier = %record,
                field = %field,
                duplicates = diff.duplicates.len(),
                "local replacement lists members more than once; keeping first occurrences"
            );
        }
        edge.replace_local(diff.final_state);

        for member in diff.removed {
            self.remove_from_inverse(member, &inverse_key, record, Side::Local);
        }
        for member in diff.added {
            self.add_to_inverse(member, &inverse_key, record, Side::Local)?;
        }
        if diff.changed {
            self.notify_change(record, &field);
        }
        Ok(())
    }

    pub(crate) fn add_to_related_records(
        &mut self,
        record: Identifier,
        definition: &EdgeDefinition,
        members: Vec<Identifier>,
        index: Option<usize>,
    ) -> Result<(), GraphError> {
        let field = Arc::clone(definition.field());
        let inverse_key = Arc::clone(definition.inverse_key());

        if self.config.strict {
            let edge = self.collection_mut(record, &field)?;
            let mut seen = HashSet::with_capacity(members.len());
            // A member listed twice would fail on its second copy after the
            // first one was already applied.
            if let Some(member) = members
                .iter()
                .copied()
                .find(|member| edge.contains_local(*member) || !seen.insert(*member))
            {
                return Err(GraphError::AlreadyPresent {
                    identifier: record,
                    field: field.to_string(),
                    member,
                });
            }
        }

        let mut index = index;
        let mut changed = false;
        for member in members {
            if !self.collection_mut(record, &field)?.add_local(member, index) {
                self.violation(GraphError::AlreadyPresent {
                    identifier: record,
                    field: field.to_string(),
                    member,
                })?;
                continue;
            }
            if let Some(index) = index.as_mut() {
                *index += 1;
            }
            self.add_to_inverse(member, &inverse_key, record, Side::Local)?;
            changed = true;
        }
        if changed {
            self.notify_change(record, &field);
        }
        Ok(())
    }

    pub(crate) fn remove_from_related_records(
        &mut self,
        record: Identifier,
        definition: &EdgeDefinition,
        members: Vec<Identifier>,
    ) -> Result<(), GraphError> {
        let field = Arc::clone(definition.field());
        let inverse_key = Arc::clone(definition.inverse_key());

        if self.config.strict {
            let edge = self.collection_mut(record, &field)?;
            let mut seen = HashSet::with_capacity(members.len());
            if let Some(member) = members
                .iter()
                .copied()
                .find(|member| !edge.contains_local(*member) || !seen.insert(*member))
            {
                return Err(GraphError::NotPresent {
                    identifier: record,
                    field: field.to_string(),
                    member,
                });
            }
        }

        let mut changed = false;
        for member in members {
            if !self.collection_mut(record, &field)?.remove_local(member) {
                self.violation(GraphError::NotPresent {
                    identifier: record,
                    field: field.to_string(),
                    member,
                })?;
                continue;
            }
            self.remove_from_inverse(member, &inverse_key, record, Side::Local);
            changed = true;
        }
        if changed {
            self.notify_change(record, &field);
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    /// Destroy a record: drop its edges and purge it from every inverse.
    pub(crate) fn delete_record(&mut self, identifier: Identifier) {
        let Some(edges) = self.edges.remove(&identifier) else {
            return;
        };
        tracing::debug!(identifier = %identifier, edges = edges.len(), "deleting record");

        let mut edges: Vec<(Arc<str>, GraphEdge)> = edges.into_iter().collect();
        edges.sort_by(|a, b| a.0.cmp(&b.0));
        for (_, edge) in edges {
            let inverse_key = Arc::clone(edge.definition().inverse_key());
            for related in edge.related_identifiers() {
                if related != identifier {
                    self.remove_completely_from(related, &inverse_key, identifier);
                }
            }
        }
        self.notifications.discard(identifier);
    }

    /// Rekey every edge of `old` to `new` without changing membership.
    ///
    /// Fields that `new` already has keep `new`'s state; the matching edges
    /// of `old` are dropped and `old` is purged from their inverses.
    pub(crate) fn merge_identifiers(&mut self, old: Identifier, new: Identifier) {
        if old == new {
            return;
        }
        let Some(edges) = self.edges.remove(&old) else {
            return;
        };
        tracing::debug!(from = %old, into = %new, edges = edges.len(), "merging identifiers");

        let mut edges: Vec<(Arc<str>, GraphEdge)> = edges.into_iter().collect();
        edges.sort_by(|a, b| a.0.cmp(&b.0));
        for (field, mut edge) in edges {
            let inverse_key = Arc::clone(edge.definition().inverse_key());
            let related = edge.related_identifiers();
            if self.has(new, &field) {
                for member in related.into_iter().filter(|member| *member != old) {
                    self.remove_completely_from(member, &inverse_key, old);
                }
                continue;
            }
            edge.set_identifier(new);
            self.edges.entry(new).or_default().insert(Arc::clone(&field), edge);
            for member in related {
                let member = if member == old { new } else { member };
                self.merge_in_edge(member, &inverse_key, old, new);
            }
        }
        self.notifications.discard(old);
    }

    /// Reset the local state of every field of `identifier` to its remote
    /// state, inverses included. Returns the fields that changed.
    pub fn rollback(&mut self, identifier: Identifier) -> Result<Vec<Arc<str>>, GraphError> {
        let mut dirty = Vec::new();
        if let Some(edges) = self.edges.get(&identifier) {
            for (field, edge) in edges {
                let is_dirty = match edge {
                    GraphEdge::Resource(edge) => edge.is_dirty(),
                    GraphEdge::Collection(edge) => {
                        edge.has_pending_changes() || edge.local_view().as_ref() != edge.remote_state()
                    }
                    GraphEdge::Implicit(_) => false,
                };
                if is_dirty {
                    dirty.push(Arc::clone(field));
                }
            }
        }
        dirty.sort();

        for field in &dirty {
            let Some(edge) = self.edge(identifier, field) else {
                continue;
            };
            let definition = Arc::clone(edge.definition());
            match edge {
                GraphEdge::Resource(edge) => {
                    let remote = edge.remote_state;
                    self.replace_related_record(identifier, &definition, remote, Side::Local, true)?;
                }
                GraphEdge::Collection(edge) => {
                    let remote = edge.remote_state().to_vec();
                    self.replace_related_records_local(identifier, &definition, remote)?;
                }
                GraphEdge::Implicit(_) => {}
            }
        }
        Ok(dirty)
    }

    /// Dematerialize a record that may come back later.
    ///
    /// Inverses of sync relationships forget the record; inverses of async
    /// relationships only remember that it was unloaded. Implicit edges are
    /// dropped, and also purged from their inverses when the record is
    /// releasable.
    pub fn unload(&mut self, identifier: Identifier, silence: bool) {
        let fields = self.fields(identifier);
        for field in fields {
            let Some(edge) = self.edge(identifier, &field) else {
                continue;
            };
            let definition = Arc::clone(edge.definition());
            let related = edge.related_identifiers();
            let inverse_key = Arc::clone(definition.inverse_key());

            if definition.is_implicit() {
                if self.is_releasable(identifier) {
                    for member in related {
                        self.remove_completely_from(member, &inverse_key, identifier);
                    }
                }
                if let Some(edges) = self.edges.get_mut(&identifier) {
                    edges.remove(&field);
                }
                continue;
            }

            if !definition.inverse_is_implicit() {
                for member in related {
                    self.notify_inverse_of_dematerialization(member, &inverse_key, identifier, silence);
                }
            }
            if !definition.inverse_is_implicit() && !definition.inverse_is_async() {
                if let Some(edge) = self.edge_mut(identifier, &field) {
                    edge.state_mut().is_stale = true;
                    edge.clear();
                }
                if !definition.is_async() && !silence {
                    self.notify_change(identifier, &field);
                }
            }
        }
    }

    /// Unload a record and drop its entry. Notifications addressed to it are
    /// suppressed.
    pub fn remove(&mut self, identifier: Identifier) {
        self.removing = Some(identifier);
        self.unload(identifier, false);
        self.edges.remove(&identifier);
        self.notifications.discard(identifier);
        self.removing = None;
    }

    /// Tear the graph down: silence notifications and drop all state.
    pub fn destroy(&mut self) {
        self.silence_notifications();
        for edge in self.edges.values_mut().flat_map(|edges| edges.values_mut()) {
            edge.destroy();
        }
        self.edges.clear();
        self.pending = Default::default();
        self.will_sync_remote = false;
        self.will_sync_local = false;
    }
}
