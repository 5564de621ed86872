//! Core types shared by the graph and its collaborators.

pub mod identifier;
pub mod payload;
pub mod operation;

pub use identifier::{Identifier, IdentifierCache, ResourceKey, AssignOutcome};
pub use payload::{
    ResourceIdentifierObject, Linkage, Link, RelationshipLinks, RelationshipPayload,
    RelatedData, RelationshipData,
};
pub use operation::Operation;
