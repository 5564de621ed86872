//! # record-graph
//!
//! In-memory relationship graph for client-side record stores.
//!
//! The graph answers one question:
//!
//! > Given a record and a relationship field, which records does it point at,
//! > **as the server last said** and **as the user currently sees it**?
//!
//! ## Core Contract
//!
//! 1. Every belongs-to/has-many field of every record is an edge keyed by
//!    `(identifier, field)`, holding a remote view and a local view
//! 2. Mutating one side of a relationship updates its inverse before the
//!    call returns
//! 3. Remote pushes are batched into transactions; change notifications are
//!    coalesced so each `(identifier, field)` is reported once per turn
//!
//! ## Architecture
//!
//! ```text
//! Operation → Graph ─→ DefinitionCache ← SchemaService
//!               │            ↓
//!               ├──→ GraphEdge (resource | collection | implicit)
//!               │            ↓
//!               ├──→ diff_collection
//!               ↓
//!   Scheduler (coalesce → sync) → NotificationSink
//! ```
//!
//! ## Determinism Guarantees
//!
//! - Same schema + same operations → identical snapshot fingerprint
//! - Queued remote updates apply in (related type, field, push order)
//! - Notifications are delivered in first-change order

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod types;
pub mod schema;
pub mod definition;
pub mod edge;
pub mod diff;
pub mod graph;
pub mod runtime;
pub mod config;
pub mod canonical;
pub mod snapshot;

// Re-exports
pub use types::{
    Identifier, IdentifierCache, ResourceKey, AssignOutcome, Operation,
    ResourceIdentifierObject, Linkage, Link, RelationshipLinks, RelationshipPayload,
    RelatedData, RelationshipData,
};
pub use schema::{
    InMemorySchema, InverseOption, RelationshipKind, RelationshipMeta, RelationshipOptions,
    Relationships, SchemaService,
};
pub use definition::{DefinitionCache, DefinitionError, EdgeDefinition, EdgeKind, IMPLICIT_KEY_PREFIX};
pub use edge::{CollectionEdge, EdgeState, GraphEdge, ImplicitEdge, ResourceEdge};
pub use diff::{diff_collection, CollectionDiff};
pub use graph::{Graph, GraphBuilder, GraphError, PayloadError, RelationshipChange};
pub use runtime::{FlushPhase, ManualScheduler, NoOpSink, NotificationSink, RecordingSink, Scheduler};
pub use config::GraphConfig;
pub use canonical::{to_canonical_bytes, canonical_hash, canonical_hash_hex};
pub use snapshot::{EdgeSnapshot, GraphSnapshot};

/// Schema version of [`GraphSnapshot`].
/// Increment on breaking changes to any snapshot type.
pub const SNAPSHOT_SCHEMA_VERSION: &str = "1.0.0";
