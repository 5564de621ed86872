//! Per-(identifier, field) relationship state.
//!
//! ## Variants
//!
//! - [`ResourceEdge`]: belongs-to, one nullable value on each side
//! - [`CollectionEdge`]: has-many, ordered remote members plus local deltas
//! - [`ImplicitEdge`]: unordered membership kept for an undeclared inverse
//!
//! Edges are plain state containers. They never reach into other edges;
//! inverse propagation and notification belong to the graph, which is the
//! sole owner of every edge.

pub mod members;
pub mod resource;
pub mod collection;
pub mod implicit;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::definition::{EdgeDefinition, EdgeKind};
use crate::types::Identifier;

pub use collection::CollectionEdge;
pub use implicit::ImplicitEdge;
pub use members::MemberSet;
pub use resource::ResourceEdge;

/// Which view of an edge a mutation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// Unsaved client state.
    Local,
    /// Last state confirmed by the server.
    Remote,
}

/// Status flags shared by every edge variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeState {
    /// A remote payload (or an inferred empty one) was applied.
    pub has_received_data: bool,
    /// The last remote payload was empty.
    pub is_empty: bool,
    /// An async inverse record was unloaded while still referenced.
    pub has_dematerialized_inverse: bool,
    /// Remote data is known to be out of date.
    pub is_stale: bool,
}

impl Default for EdgeState {
    fn default() -> Self {
        Self {
            has_received_data: false,
            is_empty: true,
            has_dematerialized_inverse: false,
            is_stale: false,
        }
    }
}

/// An edge of any kind.
#[derive(Debug, Clone)]
pub enum GraphEdge {
    /// Belongs-to.
    Resource(ResourceEdge),
    /// Has-many.
    Collection(CollectionEdge),
    /// Synthesized inverse.
    Implicit(ImplicitEdge),
}

impl GraphEdge {
    /// Create an empty edge of the shape the definition asks for.
    pub fn new(definition: Arc<EdgeDefinition>, identifier: Identifier) -> Self {
        match definition.kind() {
            EdgeKind::Resource => Self::Resource(ResourceEdge::new(definition, identifier)),
            EdgeKind::Collection => Self::Collection(CollectionEdge::new(definition, identifier)),
            EdgeKind::Implicit => Self::Implicit(ImplicitEdge::new(definition, identifier)),
        }
    }

    /// Shared definition.
    pub fn definition(&self) -> &Arc<EdgeDefinition> {
        match self {
            Self::Resource(edge) => &edge.definition,
            Self::Collection(edge) => &edge.definition,
            Self::Implicit(edge) => &edge.definition,
        }
    }

    /// Owning identifier.
    pub fn identifier(&self) -> Identifier {
        match self {
            Self::Resource(edge) => edge.identifier,
            Self::Collection(edge) => edge.identifier,
            Self::Implicit(edge) => edge.identifier,
        }
    }

    pub(crate) fn set_identifier(&mut self, identifier: Identifier) {
        match self {
            Self::Resource(edge) => edge.identifier = identifier,
            Self::Collection(edge) => edge.identifier = identifier,
            Self::Implicit(edge) => edge.identifier = identifier,
        }
    }

    /// Storage shape.
    pub fn kind(&self) -> EdgeKind {
        match self {
            Self::Resource(_) => EdgeKind::Resource,
            Self::Collection(_) => EdgeKind::Collection,
            Self::Implicit(_) => EdgeKind::Implicit,
        }
    }

    /// Status flags.
    pub fn state(&self) -> &EdgeState {
        match self {
            Self::Resource(edge) => &edge.state,
            Self::Collection(edge) => &edge.state,
            Self::Implicit(edge) => &edge.state,
        }
    }

    /// Mutable status flags.
    pub fn state_mut(&mut self) -> &mut EdgeState {
        match self {
            Self::Resource(edge) => &mut edge.state,
            Self::Collection(edge) => &mut edge.state,
            Self::Implicit(edge) => &mut edge.state,
        }
    }

    /// Every identifier referenced from either view, without duplicates.
    pub fn related_identifiers(&self) -> Vec<Identifier> {
        match self {
            Self::Resource(edge) => edge.related_identifiers(),
            Self::Collection(edge) => edge.related_identifiers(),
            Self::Implicit(edge) => edge.related_identifiers(),
        }
    }

    /// Drop `value` from every view. Returns true if the local view changed.
    pub fn remove_completely(&mut self, value: Identifier) -> bool {
        match self {
            Self::Resource(edge) => edge.remove_completely(value),
            Self::Collection(edge) => edge.remove_completely(value),
            Self::Implicit(edge) => edge.remove_completely(value),
        }
    }

    /// Rekey `old` to `new` in every view. Returns true if the local view
    /// changed.
    pub fn replace_member(&mut self, old: Identifier, new: Identifier) -> bool {
        match self {
            Self::Resource(edge) => edge.replace_member(old, new),
            Self::Collection(edge) => edge.replace_member(old, new),
            Self::Implicit(edge) => edge.replace_member(old, new),
        }
    }

    /// Reset membership, keeping links and meta.
    pub fn clear(&mut self) {
        match self {
            Self::Resource(edge) => edge.clear(),
            Self::Collection(edge) => edge.clear(),
            Self::Implicit(edge) => edge.clear(),
        }
    }

    /// Reset everything, including links, meta and status flags.
    pub fn destroy(&mut self) {
        match self {
            Self::Resource(edge) => edge.destroy(),
            Self::Collection(edge) => edge.destroy(),
            Self::Implicit(edge) => edge.destroy(),
        }
    }
}
