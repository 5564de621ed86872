//! Graph snapshots.
//!
//! A [`GraphSnapshot`] captures every edge of a graph in a deterministic
//! order, together with a fingerprint that changes iff an edge's members,
//! order or status flags change. Tests use it to assert that an operation
//! had no observable effect, or that two graphs converged.

use serde::{Deserialize, Serialize};

use crate::canonical::canonical_hash_hex;
use crate::definition::EdgeKind;
use crate::edge::{EdgeState, GraphEdge};
use crate::types::Identifier;
use crate::SNAPSHOT_SCHEMA_VERSION;

/// One edge as seen by a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeSnapshot {
    /// Owning identifier.
    pub identifier: Identifier,
    /// Field name (synthesized for implicit edges).
    pub field: String,
    /// Storage shape.
    pub kind: EdgeKind,
    /// Remote members, in order (sorted for implicit edges).
    pub remote: Vec<Identifier>,
    /// Local members, in order (sorted for implicit edges).
    pub local: Vec<Identifier>,
    /// Status flags.
    pub state: EdgeState,
}

impl EdgeSnapshot {
    /// Capture one edge.
    pub fn capture(edge: &GraphEdge) -> Self {
        let (remote, local) = match edge {
            GraphEdge::Resource(edge) => (
                edge.remote_state().into_iter().collect(),
                edge.compute_local_state().into_iter().collect(),
            ),
            GraphEdge::Collection(edge) => (edge.remote_state().to_vec(), edge.local_view().into_owned()),
            GraphEdge::Implicit(edge) => (
                edge.remote_members().iter().copied().collect(),
                edge.local_members().iter().copied().collect(),
            ),
        };
        Self {
            identifier: edge.identifier(),
            field: edge.definition().field().to_string(),
            kind: edge.kind(),
            remote,
            local,
            state: *edge.state(),
        }
    }
}

/// Deterministic picture of a whole graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    /// xxh64 over the counts, schema version and edge hash.
    pub fingerprint: String,
    /// Identifiers with at least one edge entry.
    pub identifier_count: u64,
    /// Total edges.
    pub edge_count: u64,
    /// Snapshot schema version.
    pub schema_version: String,
    /// Hash of the sorted edges.
    pub edge_hash: String,
    /// Every edge, sorted by identifier then field.
    pub edges: Vec<EdgeSnapshot>,
}

#[derive(Serialize)]
struct FingerprintInput<'a> {
    identifier_count: u64,
    edge_count: u64,
    schema_version: &'a str,
    edge_hash: &'a str,
}

impl GraphSnapshot {
    /// Build a snapshot from captured edges in any order.
    pub fn compute(identifier_count: usize, mut edges: Vec<EdgeSnapshot>) -> Result<Self, serde_json::Error> {
        edges.sort_by(|a, b| (a.identifier, &a.field).cmp(&(b.identifier, &b.field)));
        let identifier_count = identifier_count as u64;
        let edge_count = edges.len() as u64;
        let edge_hash = canonical_hash_hex(&edges)?;
        let fingerprint = canonical_hash_hex(&FingerprintInput {
            identifier_count,
            edge_count,
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            edge_hash: &edge_hash,
        })?;
        Ok(Self {
            fingerprint,
            identifier_count,
            edge_count,
            schema_version: SNAPSHOT_SCHEMA_VERSION.to_string(),
            edge_hash,
            edges,
        })
    }

    /// Recompute the fingerprint from the stored edges and compare.
    pub fn verify(&self) -> Result<bool, serde_json::Error> {
        let recomputed = Self::compute(self.identifier_count as usize, self.edges.clone())?;
        Ok(recomputed.fingerprint == self.fingerprint)
    }

    /// Edges owned by one identifier.
    pub fn edges_of(&self, identifier: Identifier) -> impl Iterator<Item = &EdgeSnapshot> {
        self.edges.iter().filter(move |edge| edge.identifier == identifier)
    }
}
