//! Graph error types.

use crate::definition::{DefinitionError, EdgeKind};
use crate::types::Identifier;

/// Malformed relationship payloads, reported at ingestion.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PayloadError {
    /// An array was given for a belongs-to field.
    #[error("'{type_name}.{field}' is a belongs-to field but the payload holds an array")]
    ExpectedSingle {
        /// Record type.
        type_name: String,
        /// Field name.
        field: String,
    },
    /// A single object was given for a has-many field.
    #[error("'{type_name}.{field}' is a has-many field but the payload holds a single object")]
    ExpectedCollection {
        /// Record type.
        type_name: String,
        /// Field name.
        field: String,
    },
    /// A resource linkage object lacks `type` or both `id` and `lid`.
    #[error("resource linkage in '{type_name}.{field}' has no type or identity")]
    MissingIdentity {
        /// Record type.
        type_name: String,
        /// Field name.
        field: String,
    },
    /// The payload lists members more than once and duplicates are disabled.
    #[error("'{type_name}.{field}' payload lists {} member(s) more than once", .duplicates.len())]
    DuplicateMembers {
        /// Record type.
        type_name: String,
        /// Field name.
        field: String,
        /// Offending members.
        duplicates: Vec<Identifier>,
    },
}

/// Errors returned by graph operations.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// Schema misconfiguration.
    #[error(transparent)]
    Definition(#[from] DefinitionError),
    /// Malformed payload.
    #[error(transparent)]
    Payload(#[from] PayloadError),
    /// The identifier is not known to the identifier cache.
    #[error("unknown identifier {0}")]
    UnknownIdentifier(Identifier),
    /// The operation does not fit the edge's shape.
    #[error("'{type_name}.{field}' is a {actual} edge, expected {expected}")]
    WrongEdgeKind {
        /// Record type.
        type_name: String,
        /// Field name.
        field: String,
        /// Shape the operation needs.
        expected: EdgeKind,
        /// Shape of the edge.
        actual: EdgeKind,
    },
    /// Implicit edges are internal and cannot be read or mutated directly.
    #[error("implicit edge '{field}' has no public API")]
    ImplicitEdgeMutation {
        /// Synthesized field key.
        field: String,
    },
    /// The operation only makes sense against local state.
    #[error("{operation} is a local-only operation and cannot be pushed")]
    LocalOnlyOperation {
        /// Operation tag.
        operation: &'static str,
    },
    /// Adding a member that is already present (strict mode only).
    #[error("{member} is already a member of {identifier}.{field}")]
    AlreadyPresent {
        /// Owning record.
        identifier: Identifier,
        /// Field name.
        field: String,
        /// Offending member.
        member: Identifier,
    },
    /// Removing a member that is not present (strict mode only).
    #[error("{member} is not a member of {identifier}.{field}")]
    NotPresent {
        /// Owning record.
        identifier: Identifier,
        /// Field name.
        field: String,
        /// Offending member.
        member: Identifier,
    },
    /// Snapshot serialization failed.
    #[error("snapshot serialization failed: {0}")]
    Snapshot(#[from] serde_json::Error),
}
