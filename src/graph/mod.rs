//! The relationship graph.
//!
//! [`Graph`] owns every edge of every identifier. All mutation flows through
//! it so that both sides of a relationship stay consistent and so that
//! change notifications can be coalesced.
//!
//! ## Operation classes
//!
//! - **Remote** (`push`): queued, validated synchronously, applied in one
//!   transaction when the host runs the `coalesce` phase. Deletions go first,
//!   then merges, then collection and resource updates grouped by inverse
//!   type and field.
//! - **Local** (`update`): applied immediately, inverses included.
//!
//! ## Notifications
//!
//! Every observable change of an edge's local view queues `(identifier,
//! field)` once. The queue is delivered to the [`NotificationSink`] when the
//! host runs the `sync` phase, after any pending `coalesce`.

mod error;
mod inverse;
mod operations;

pub use error::{GraphError, PayloadError};

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::GraphConfig;
use crate::definition::{DefinitionCache, DefinitionError, EdgeDefinition, EdgeKind};
use crate::edge::{CollectionEdge, GraphEdge, ResourceEdge, Side};
use crate::runtime::{FlushPhase, ManualScheduler, NoOpSink, NotificationSink, Scheduler};
use crate::schema::SchemaService;
use crate::snapshot::{EdgeSnapshot, GraphSnapshot};
use crate::types::{
    Identifier, IdentifierCache, Linkage, Operation, RelatedData, RelationshipData,
    RelationshipLinks, RelationshipPayload, ResourceIdentifierObject,
};

/// A remote update validated at push time.
#[derive(Debug, Clone)]
pub(crate) struct RemoteUpdate {
    pub(crate) record: Identifier,
    pub(crate) definition: Arc<EdgeDefinition>,
    /// `None` when the payload had no `data` member.
    pub(crate) data: Option<RelatedData>,
    pub(crate) links: Option<RelationshipLinks>,
    pub(crate) meta: Option<serde_json::Value>,
}

/// inverse type -> field -> updates, in push order.
type UpdateQueue = BTreeMap<Arc<str>, BTreeMap<Arc<str>, Vec<RemoteUpdate>>>;

#[derive(Debug, Default)]
struct PendingRemote {
    deletions: Vec<Identifier>,
    merges: Vec<(Identifier, Identifier)>,
    collections: UpdateQueue,
    resources: UpdateQueue,
}

impl PendingRemote {
    fn update_count(queue: &UpdateQueue) -> usize {
        queue.values().flat_map(|fields| fields.values()).map(Vec::len).sum()
    }

    fn len(&self) -> usize {
        self.deletions.len()
            + self.merges.len()
            + Self::update_count(&self.collections)
            + Self::update_count(&self.resources)
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Default)]
struct NotificationQueue {
    order: Vec<(Identifier, Arc<str>)>,
    seen: HashSet<(Identifier, Arc<str>)>,
}

impl NotificationQueue {
    fn insert(&mut self, identifier: Identifier, field: &Arc<str>) {
        if self.seen.insert((identifier, Arc::clone(field))) {
            self.order.push((identifier, Arc::clone(field)));
        }
    }

    fn discard(&mut self, identifier: Identifier) {
        self.order.retain(|(id, _)| *id != identifier);
        self.seen.retain(|(id, _)| *id != identifier);
    }

    fn take(&mut self) -> Vec<(Identifier, Arc<str>)> {
        self.seen.clear();
        std::mem::take(&mut self.order)
    }

    fn len(&self) -> usize {
        self.order.len()
    }
}

/// Unsaved difference between local and remote state of one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RelationshipChange {
    /// Belongs-to field.
    Resource {
        /// Remote value.
        remote: Option<Identifier>,
        /// Local value.
        local: Option<Identifier>,
    },
    /// Has-many field.
    Collection {
        /// Local members missing remotely, in insertion order.
        additions: Vec<Identifier>,
        /// Remote members missing locally.
        removals: Vec<Identifier>,
        /// The shared members appear in a different order.
        reordered: bool,
    },
}

/// Builder for [`Graph`].
pub struct GraphBuilder {
    identifiers: Arc<IdentifierCache>,
    schema: Arc<dyn SchemaService>,
    sink: Arc<dyn NotificationSink>,
    scheduler: Arc<dyn Scheduler>,
    config: GraphConfig,
}

impl GraphBuilder {
    /// Deliver notifications to `sink`.
    pub fn sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Request flush phases from `scheduler`.
    pub fn scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// Use `config`.
    pub fn config(mut self, config: GraphConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the graph.
    pub fn build(self) -> Graph {
        Graph {
            identifiers: self.identifiers,
            schema: self.schema,
            sink: self.sink,
            scheduler: self.scheduler,
            definitions: DefinitionCache::new(self.config.reset_on_remote_update),
            config: self.config,
            edges: HashMap::new(),
            pending: PendingRemote::default(),
            notifications: NotificationQueue::default(),
            transaction: None,
            transaction_counter: 0,
            will_sync_remote: false,
            will_sync_local: false,
            silenced: false,
            removing: None,
        }
    }
}

/// In-memory relationship graph.
pub struct Graph {
    identifiers: Arc<IdentifierCache>,
    schema: Arc<dyn SchemaService>,
    sink: Arc<dyn NotificationSink>,
    scheduler: Arc<dyn Scheduler>,
    config: GraphConfig,
    definitions: DefinitionCache,
    edges: HashMap<Identifier, HashMap<Arc<str>, GraphEdge>>,
    pending: PendingRemote,
    notifications: NotificationQueue,
    transaction: Option<u64>,
    transaction_counter: u64,
    will_sync_remote: bool,
    will_sync_local: bool,
    silenced: bool,
    removing: Option<Identifier>,
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field("identifiers", &self.edges.len())
            .field("pending_remote", &self.pending.len())
            .field("pending_notifications", &self.notifications.len())
            .field("transaction", &self.transaction)
            .field("config", &self.config)
            .finish()
    }
}

impl Graph {
    /// Start building a graph over an identifier cache and a schema.
    ///
    /// Defaults: [`NoOpSink`], [`ManualScheduler`], [`GraphConfig::default`].
    pub fn builder(identifiers: Arc<IdentifierCache>, schema: Arc<dyn SchemaService>) -> GraphBuilder {
        GraphBuilder {
            identifiers,
            schema,
            sink: Arc::new(NoOpSink),
            scheduler: Arc::new(ManualScheduler::new()),
            config: GraphConfig::default(),
        }
    }

    /// Shared identifier cache.
    pub fn identifiers(&self) -> &Arc<IdentifierCache> {
        &self.identifiers
    }

    /// Active configuration.
    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    /// Number of the transaction being flushed, if any.
    pub fn transaction(&self) -> Option<u64> {
        self.transaction
    }

    /// Resolve the definition of `identifier.field`.
    pub fn get_definition(
        &mut self,
        identifier: Identifier,
        field: &str,
    ) -> Result<Arc<EdgeDefinition>, GraphError> {
        let type_name = self
            .identifiers
            .type_of(identifier)
            .ok_or(GraphError::UnknownIdentifier(identifier))?;
        let schema = Arc::clone(&self.schema);
        Ok(self.definitions.resolve(schema.as_ref(), &type_name, field)?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Dispatch
    // ─────────────────────────────────────────────────────────────────────────

    /// Queue a remote operation for the next `coalesce` flush.
    ///
    /// Payload shape, edge kinds and polymorphic membership are validated
    /// now, so a malformed payload fails here rather than during the flush.
    pub fn push(&mut self, op: Operation) -> Result<(), GraphError> {
        match op {
            Operation::DeleteRecord { record } => self.pending.deletions.push(record),
            Operation::MergeIdentifiers { record, value } => self.pending.merges.push((record, value)),
            Operation::UpdateRelationship { record, field, value } => {
                let update = self.ingest(record, &field, &value)?;
                self.enqueue(update);
            }
            Operation::ReplaceRelatedRecord { record, field, value } => {
                let update = self.ingest_resolved(record, &field, RelatedData::One(value))?;
                self.enqueue(update);
            }
            Operation::ReplaceRelatedRecords { record, field, value } => {
                let update = self.ingest_resolved(record, &field, RelatedData::Many(value))?;
                self.enqueue(update);
            }
            op @ (Operation::AddToRelatedRecords { .. } | Operation::RemoveFromRelatedRecords { .. }) => {
                return Err(GraphError::LocalOnlyOperation { operation: op.name() });
            }
        }
        if !self.will_sync_remote {
            self.will_sync_remote = true;
            self.scheduler.schedule(FlushPhase::Coalesce);
        }
        Ok(())
    }

    /// Apply an operation immediately.
    ///
    /// Replace, add and remove operations act on local state.
    /// `UpdateRelationship`, `DeleteRecord` and `MergeIdentifiers` act on
    /// remote state without waiting for a flush.
    pub fn update(&mut self, op: Operation) -> Result<(), GraphError> {
        match op {
            Operation::UpdateRelationship { record, field, value } => {
                let update = self.ingest(record, &field, &value)?;
                self.apply_remote_update(update)
            }
            Operation::DeleteRecord { record } => {
                self.delete_record(record);
                Ok(())
            }
            Operation::MergeIdentifiers { record, value } => {
                self.merge_identifiers(record, value);
                Ok(())
            }
            Operation::ReplaceRelatedRecord { record, field, value } => {
                let definition = self.expect_kind(record, &field, EdgeKind::Resource)?;
                if let Some(value) = value {
                    self.validate_member(&definition, value)?;
                }
                self.replace_related_record(record, &definition, value, Side::Local, true)
            }
            Operation::ReplaceRelatedRecords { record, field, value } => {
                let definition = self.expect_kind(record, &field, EdgeKind::Collection)?;
                self.validate_members(&definition, &value)?;
                self.replace_related_records_local(record, &definition, value)
            }
            Operation::AddToRelatedRecords { record, field, value, index } => {
                let definition = self.expect_kind(record, &field, EdgeKind::Collection)?;
                self.validate_members(&definition, &value)?;
                self.add_to_related_records(record, &definition, value, index)
            }
            Operation::RemoveFromRelatedRecords { record, field, value } => {
                let definition = self.expect_kind(record, &field, EdgeKind::Collection)?;
                self.remove_from_related_records(record, &definition, value)
            }
        }
    }

    /// Run one deferred phase.
    pub fn flush(&mut self, phase: FlushPhase) -> Result<(), GraphError> {
        match phase {
            FlushPhase::Coalesce => self.flush_remote_queue(),
            FlushPhase::Sync => {
                self.flush_local_queue();
                Ok(())
            }
        }
    }

    /// Run `coalesce` then `sync`. Notifications are delivered even if a
    /// queued remote operation failed; the first failure is returned.
    pub fn settle(&mut self) -> Result<(), GraphError> {
        let remote = self.flush(FlushPhase::Coalesce);
        self.flush_local_queue();
        remote
    }

    /// True if remote operations are waiting for a `coalesce` flush.
    pub fn has_pending_remote(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Number of queued `(identifier, field)` notifications.
    pub fn pending_notifications(&self) -> usize {
        self.notifications.len()
    }

    /// Drop queued notifications and stop delivering new ones.
    pub fn silence_notifications(&mut self) {
        self.silenced = true;
        self.notifications.take();
    }

    fn flush_remote_queue(&mut self) -> Result<(), GraphError> {
        self.will_sync_remote = false;
        let pending = std::mem::take(&mut self.pending);
        if pending.is_empty() {
            return Ok(());
        }

        self.transaction_counter += 1;
        let transaction = self.transaction_counter;
        self.transaction = Some(transaction);
        tracing::debug!(
            transaction,
            deletions = pending.deletions.len(),
            merges = pending.merges.len(),
            collections = PendingRemote::update_count(&pending.collections),
            resources = PendingRemote::update_count(&pending.resources),
            "flushing remote operations"
        );

        let deleted: HashSet<Identifier> = pending.deletions.iter().copied().collect();
        for record in pending.deletions {
            self.delete_record(record);
        }
        for (record, value) in pending.merges {
            self.merge_identifiers(record, value);
        }

        let mut first_error = None;
        let updates = pending
            .collections
            .into_values()
            .chain(pending.resources.into_values())
            .flat_map(BTreeMap::into_values)
            .flatten();
        for mut update in updates {
            if deleted.contains(&update.record) {
                continue;
            }
            if !deleted.is_empty() {
                strip_deleted(&mut update.data, &deleted);
            }
            let (record, field) = (update.record, Arc::clone(update.definition.field()));
            if let Err(error) = self.apply_remote_update(update) {
                tracing::error!(
                    transaction,
                    identifier = %record,
                    field = %field,
                    error = %error,
                    "remote update failed"
                );
                first_error.get_or_insert(error);
            }
        }

        self.transaction = None;
        tracing::debug!(transaction, "remote operations flushed");
        first_error.map_or(Ok(()), Err)
    }

    fn flush_local_queue(&mut self) {
        self.will_sync_local = false;
        let queued = self.notifications.take();
        if self.silenced {
            return;
        }
        for (identifier, field) in queued {
            self.sink.notify_change(identifier, &field);
        }
    }

    pub(crate) fn notify_change(&mut self, identifier: Identifier, field: &Arc<str>) {
        if self.silenced || self.removing == Some(identifier) {
            return;
        }
        self.notifications.insert(identifier, field);
        if !self.will_sync_local {
            self.will_sync_local = true;
            self.scheduler.schedule(FlushPhase::Sync);
        }
    }

    fn enqueue(&mut self, update: RemoteUpdate) {
        let queue = match update.definition.kind() {
            EdgeKind::Collection => &mut self.pending.collections,
            EdgeKind::Resource | EdgeKind::Implicit => &mut self.pending.resources,
        };
        queue
            .entry(Arc::clone(update.definition.related_type()))
            .or_default()
            .entry(Arc::clone(update.definition.field()))
            .or_default()
            .push(update);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Ingestion
    // ─────────────────────────────────────────────────────────────────────────

    fn ingest(
        &mut self,
        record: Identifier,
        field: &str,
        payload: &RelationshipPayload,
    ) -> Result<RemoteUpdate, GraphError> {
        let definition = self.get_definition(record, field)?;
        if definition.is_implicit() {
            return Err(GraphError::ImplicitEdgeMutation { field: field.to_string() });
        }
        let data = match &payload.data {
            None => None,
            Some(linkage) => Some(self.resolve_linkage(&definition, linkage)?),
        };
        if let Some(data) = &data {
            self.validate_data(&definition, data)?;
        }
        Ok(RemoteUpdate {
            record,
            definition,
            data,
            links: payload.links.clone(),
            meta: payload.meta.clone(),
        })
    }

    fn ingest_resolved(
        &mut self,
        record: Identifier,
        field: &str,
        data: RelatedData,
    ) -> Result<RemoteUpdate, GraphError> {
        let definition = self.get_definition(record, field)?;
        if definition.is_implicit() {
            return Err(GraphError::ImplicitEdgeMutation { field: field.to_string() });
        }
        match (&data, definition.kind()) {
            (RelatedData::One(_), EdgeKind::Collection) => {
                return Err(payload_error(&definition, PayloadKind::ExpectedCollection).into())
            }
            (RelatedData::Many(_), EdgeKind::Resource) => {
                return Err(payload_error(&definition, PayloadKind::ExpectedSingle).into())
            }
            _ => {}
        }
        self.validate_data(&definition, &data)?;
        Ok(RemoteUpdate {
            record,
            definition,
            data: Some(data),
            links: None,
            meta: None,
        })
    }

    fn resolve_linkage(
        &mut self,
        definition: &EdgeDefinition,
        linkage: &Linkage,
    ) -> Result<RelatedData, GraphError> {
        match (definition.kind(), linkage) {
            (EdgeKind::Resource, Linkage::Empty(())) => Ok(RelatedData::One(None)),
            (EdgeKind::Resource, Linkage::One(object)) => {
                Ok(RelatedData::One(Some(self.resolve_object(definition, object)?)))
            }
            (EdgeKind::Resource, Linkage::Many(_)) => {
                Err(payload_error(definition, PayloadKind::ExpectedSingle).into())
            }
            (_, Linkage::Empty(())) => Ok(RelatedData::Many(Vec::new())),
            (_, Linkage::One(_)) => Err(payload_error(definition, PayloadKind::ExpectedCollection).into()),
            (_, Linkage::Many(objects)) => {
                let members = objects
                    .iter()
                    .map(|object| self.resolve_object(definition, object))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(RelatedData::Many(members))
            }
        }
    }

    fn resolve_object(
        &self,
        definition: &EdgeDefinition,
        object: &ResourceIdentifierObject,
    ) -> Result<Identifier, GraphError> {
        if object.type_name.is_empty() {
            return Err(payload_error(definition, PayloadKind::MissingIdentity).into());
        }
        self.identifiers
            .upgrade(&object.type_name, object.id.as_deref(), object.lid.as_deref())
            .ok_or_else(|| payload_error(definition, PayloadKind::MissingIdentity).into())
    }

    fn validate_data(&mut self, definition: &EdgeDefinition, data: &RelatedData) -> Result<(), GraphError> {
        match data {
            RelatedData::One(None) => Ok(()),
            RelatedData::One(Some(member)) => self.validate_member(definition, *member),
            RelatedData::Many(members) => {
                if !self.config.allow_duplicate_members {
                    let mut seen = HashSet::with_capacity(members.len());
                    let mut duplicates: Vec<Identifier> = members
                        .iter()
                        .copied()
                        .filter(|member| !seen.insert(*member))
                        .collect();
                    if !duplicates.is_empty() {
                        duplicates.sort();
                        duplicates.dedup();
                        return Err(PayloadError::DuplicateMembers {
                            type_name: definition.owner_type().to_string(),
                            field: definition.field().to_string(),
                            duplicates,
                        }
                        .into());
                    }
                }
                self.validate_members(definition, members)
            }
        }
    }

    fn validate_members(&mut self, definition: &EdgeDefinition, members: &[Identifier]) -> Result<(), GraphError> {
        members
            .iter()
            .try_for_each(|member| self.validate_member(definition, *member))
    }

    /// Check that `member` may appear in the field, registering a new
    /// concrete type of a polymorphic field along the way.
    pub(crate) fn validate_member(
        &mut self,
        definition: &EdgeDefinition,
        member: Identifier,
    ) -> Result<(), GraphError> {
        let member_type = self
            .identifiers
            .type_of(member)
            .ok_or(GraphError::UnknownIdentifier(member))?;
        let related_type = definition.related_type();
        if member_type == *related_type || self.definitions.is_polymorphic_pair(related_type, &member_type) {
            return Ok(());
        }
        if !definition.is_polymorphic() {
            return Err(DefinitionError::NotPolymorphic {
                type_name: definition.owner_type().to_string(),
                field: definition.field().to_string(),
                expected: related_type.to_string(),
                actual: member_type.to_string(),
            }
            .into());
        }
        if !definition.inverse_is_implicit() {
            let schema = Arc::clone(&self.schema);
            match self
                .definitions
                .resolve(schema.as_ref(), &member_type, definition.inverse_key())
            {
                Ok(_) => {}
                Err(DefinitionError::MissingRelationship { .. }) => {
                    return Err(DefinitionError::IncompatiblePolymorphicType {
                        type_name: definition.owner_type().to_string(),
                        field: definition.field().to_string(),
                        actual: member_type.to_string(),
                        inverse_key: definition.inverse_key().to_string(),
                    }
                    .into());
                }
                Err(other) => return Err(other.into()),
            }
        }
        self.definitions.register_polymorphic_type(related_type, &member_type);
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Edge access
    // ─────────────────────────────────────────────────────────────────────────

    pub(crate) fn ensure_edge(&mut self, identifier: Identifier, field: &str) -> Result<&mut GraphEdge, GraphError> {
        let definition = self.get_definition(identifier, field)?;
        let key = Arc::clone(definition.field());
        Ok(self
            .edges
            .entry(identifier)
            .or_default()
            .entry(key)
            .or_insert_with(|| GraphEdge::new(definition, identifier)))
    }

    pub(crate) fn edge_mut(&mut self, identifier: Identifier, field: &str) -> Option<&mut GraphEdge> {
        self.edges.get_mut(&identifier)?.get_mut(field)
    }

    pub(crate) fn resource_mut(&mut self, identifier: Identifier, field: &str) -> Result<&mut ResourceEdge, GraphError> {
        match self.ensure_edge(identifier, field)? {
            GraphEdge::Resource(edge) => Ok(edge),
            other => Err(wrong_kind(other, EdgeKind::Resource)),
        }
    }

    pub(crate) fn collection_mut(
        &mut self,
        identifier: Identifier,
        field: &str,
    ) -> Result<&mut CollectionEdge, GraphError> {
        match self.ensure_edge(identifier, field)? {
            GraphEdge::Collection(edge) => Ok(edge),
            other => Err(wrong_kind(other, EdgeKind::Collection)),
        }
    }

    fn expect_kind(
        &mut self,
        identifier: Identifier,
        field: &str,
        expected: EdgeKind,
    ) -> Result<Arc<EdgeDefinition>, GraphError> {
        let definition = self.get_definition(identifier, field)?;
        if definition.is_implicit() {
            return Err(GraphError::ImplicitEdgeMutation { field: field.to_string() });
        }
        if definition.kind() != expected {
            return Err(GraphError::WrongEdgeKind {
                type_name: definition.owner_type().to_string(),
                field: field.to_string(),
                expected,
                actual: definition.kind(),
            });
        }
        Ok(definition)
    }

    /// Report a consistency violation: an error in strict mode, a warning
    /// otherwise.
    pub(crate) fn violation(&self, error: GraphError) -> Result<(), GraphError> {
        if self.config.strict {
            return Err(error);
        }
        tracing::warn!(error = %error, "ignoring inconsistent relationship mutation");
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────────

    /// Whether the edge `identifier.field` exists.
    pub fn has(&self, identifier: Identifier, field: &str) -> bool {
        self.edges
            .get(&identifier)
            .map(|fields| fields.contains_key(field))
            .unwrap_or(false)
    }

    /// The edge `identifier.field`, if it exists.
    pub fn edge(&self, identifier: Identifier, field: &str) -> Option<&GraphEdge> {
        self.edges.get(&identifier)?.get(field)
    }

    /// Fields with an edge on `identifier`, sorted.
    pub fn fields(&self, identifier: Identifier) -> Vec<Arc<str>> {
        let mut fields: Vec<Arc<str>> = self
            .edges
            .get(&identifier)
            .map(|edges| edges.keys().cloned().collect())
            .unwrap_or_default();
        fields.sort();
        fields
    }

    /// Every identifier referenced by `identifier.field` from either view.
    pub fn related_identifiers(&self, identifier: Identifier, field: &str) -> Vec<Identifier> {
        self.edge(identifier, field)
            .map(GraphEdge::related_identifiers)
            .unwrap_or_default()
    }

    /// Consumer view of a relationship (local state), creating the edge on
    /// first access.
    pub fn get_data(&mut self, identifier: Identifier, field: &str) -> Result<RelationshipData, GraphError> {
        match self.ensure_edge(identifier, field)? {
            GraphEdge::Resource(edge) => {
                let known = edge.state.has_received_data || edge.local_state.is_some();
                Ok(RelationshipData {
                    data: known.then_some(RelatedData::One(edge.local_state)),
                    links: edge.links.clone(),
                    meta: edge.meta.clone(),
                })
            }
            GraphEdge::Collection(edge) => {
                let known = edge.state.has_received_data || edge.has_pending_changes();
                let local = edge.compute_local_state().to_vec();
                Ok(RelationshipData {
                    data: (known || !local.is_empty()).then_some(RelatedData::Many(local)),
                    links: edge.links.clone(),
                    meta: edge.meta.clone(),
                })
            }
            GraphEdge::Implicit(_) => Err(GraphError::ImplicitEdgeMutation { field: field.to_string() }),
        }
    }

    /// Remote view of a relationship.
    pub fn get_remote_data(&mut self, identifier: Identifier, field: &str) -> Result<RelationshipData, GraphError> {
        match self.ensure_edge(identifier, field)? {
            GraphEdge::Resource(edge) => Ok(RelationshipData {
                data: edge
                    .state
                    .has_received_data
                    .then_some(RelatedData::One(edge.remote_state)),
                links: edge.links.clone(),
                meta: edge.meta.clone(),
            }),
            GraphEdge::Collection(edge) => Ok(RelationshipData {
                data: edge
                    .state
                    .has_received_data
                    .then(|| RelatedData::Many(edge.remote_state().to_vec())),
                links: edge.links.clone(),
                meta: edge.meta.clone(),
            }),
            GraphEdge::Implicit(_) => Err(GraphError::ImplicitEdgeMutation { field: field.to_string() }),
        }
    }

    /// Unsaved changes of every declared field of `identifier`.
    pub fn changed_relationships(&self, identifier: Identifier) -> BTreeMap<String, RelationshipChange> {
        let mut changes = BTreeMap::new();
        let Some(edges) = self.edges.get(&identifier) else {
            return changes;
        };
        for (field, edge) in edges {
            match edge {
                GraphEdge::Resource(edge) if edge.is_dirty() => {
                    changes.insert(
                        field.to_string(),
                        RelationshipChange::Resource {
                            remote: edge.remote_state,
                            local: edge.local_state,
                        },
                    );
                }
                GraphEdge::Collection(edge) => {
                    let local = edge.local_view();
                    let kept_local: Vec<Identifier> = local
                        .iter()
                        .copied()
                        .filter(|member| !edge.additions().contains(*member))
                        .collect();
                    let kept_remote: Vec<Identifier> = edge
                        .remote_state()
                        .iter()
                        .copied()
                        .filter(|member| !edge.removals().contains(*member))
                        .collect();
                    let reordered = kept_local != kept_remote;
                    if reordered || edge.has_pending_changes() {
                        changes.insert(
                            field.to_string(),
                            RelationshipChange::Collection {
                                additions: edge.additions().iter().collect(),
                                removals: edge.removals().iter().collect(),
                                reordered,
                            },
                        );
                    }
                }
                _ => {}
            }
        }
        changes
    }

    /// Whether the identifier's entry may be evicted.
    ///
    /// False while any of its edges has an async inverse and the record is
    /// persisted: a record that is not loaded yet may still reference it.
    pub fn is_releasable(&self, identifier: Identifier) -> bool {
        let Some(edges) = self.edges.get(&identifier) else {
            return true;
        };
        if self.identifiers.is_new(identifier) {
            return true;
        }
        !edges
            .values()
            .any(|edge| edge.definition().inverse_is_async())
    }

    /// Deterministic snapshot of every edge.
    pub fn snapshot(&self) -> Result<GraphSnapshot, GraphError> {
        let edges = self
            .edges
            .values()
            .flat_map(HashMap::values)
            .map(EdgeSnapshot::capture)
            .collect();
        Ok(GraphSnapshot::compute(self.edges.len(), edges)?)
    }

    /// Fingerprint of [`Graph::snapshot`].
    pub fn fingerprint(&self) -> Result<String, GraphError> {
        Ok(self.snapshot()?.fingerprint)
    }
}

fn strip_deleted(data: &mut Option<RelatedData>, deleted: &HashSet<Identifier>) {
    match data {
        Some(RelatedData::Many(members)) => members.retain(|member| !deleted.contains(member)),
        Some(RelatedData::One(value)) => {
            if value.map_or(false, |member| deleted.contains(&member)) {
                *value = None;
            }
        }
        None => {}
    }
}

fn wrong_kind(edge: &GraphEdge, expected: EdgeKind) -> GraphError {
    if edge.kind() == EdgeKind::Implicit {
        return GraphError::ImplicitEdgeMutation {
            field: edge.definition().field().to_string(),
        };
    }
    GraphError::WrongEdgeKind {
        type_name: edge.definition().owner_type().to_string(),
        field: edge.definition().field().to_string(),
        expected,
        actual: edge.kind(),
    }
}

enum PayloadKind {
    ExpectedSingle,
    ExpectedCollection,
    MissingIdentity,
}

fn payload_error(definition: &EdgeDefinition, kind: PayloadKind) -> PayloadError {
    let type_name = definition.owner_type().to_string();
    let field = definition.field().to_string();
    match kind {
        PayloadKind::ExpectedSingle => PayloadError::ExpectedSingle { type_name, field },
        PayloadKind::ExpectedCollection => PayloadError::ExpectedCollection { type_name, field },
        PayloadKind::MissingIdentity => PayloadError::MissingIdentity { type_name, field },
    }
}

#[cfg(test)]
mod tests;
