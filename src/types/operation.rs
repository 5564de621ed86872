//! Graph operations.
//!
//! Every mutation of the graph is expressed as one [`Operation`] and routed
//! through a single exhaustive `match` in the dispatcher.

use std::fmt;

use super::identifier::Identifier;
use super::payload::RelationshipPayload;

/// A remote or local mutation of the relationship graph.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Replace one edge's remote state from a resource linkage payload.
    UpdateRelationship {
        /// Record owning the edge.
        record: Identifier,
        /// Relationship field.
        field: String,
        /// Relationship object from the server.
        value: RelationshipPayload,
    },
    /// Destroy a record and purge every reference to it.
    DeleteRecord {
        /// Record being destroyed.
        record: Identifier,
    },
    /// Rekey every edge referencing `record` to `value`.
    MergeIdentifiers {
        /// Identity being merged away.
        record: Identifier,
        /// Identity that remains.
        value: Identifier,
    },
    /// Replace a to-one value.
    ReplaceRelatedRecord {
        /// Record owning the edge.
        record: Identifier,
        /// Relationship field.
        field: String,
        /// New value.
        value: Option<Identifier>,
    },
    /// Replace a to-many value wholesale.
    ReplaceRelatedRecords {
        /// Record owning the edge.
        record: Identifier,
        /// Relationship field.
        field: String,
        /// New ordered members.
        value: Vec<Identifier>,
    },
    /// Add members to a to-many value (local only).
    AddToRelatedRecords {
        /// Record owning the edge.
        record: Identifier,
        /// Relationship field.
        field: String,
        /// Members to add, in order.
        value: Vec<Identifier>,
        /// Insertion index of the first member; appended when `None`.
        index: Option<usize>,
    },
    /// Remove members from a to-many value (local only).
    RemoveFromRelatedRecords {
        /// Record owning the edge.
        record: Identifier,
        /// Relationship field.
        field: String,
        /// Members to remove.
        value: Vec<Identifier>,
    },
}

impl Operation {
    /// Operation tag, as used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::UpdateRelationship { .. } => "updateRelationship",
            Self::DeleteRecord { .. } => "deleteRecord",
            Self::MergeIdentifiers { .. } => "mergeIdentifiers",
            Self::ReplaceRelatedRecord { .. } => "replaceRelatedRecord",
            Self::ReplaceRelatedRecords { .. } => "replaceRelatedRecords",
            Self::AddToRelatedRecords { .. } => "addToRelatedRecords",
            Self::RemoveFromRelatedRecords { .. } => "removeFromRelatedRecords",
        }
    }

    /// Record the operation targets.
    pub fn record(&self) -> Identifier {
        match self {
            Self::UpdateRelationship { record, .. }
            | Self::DeleteRecord { record }
            | Self::MergeIdentifiers { record, .. }
            | Self::ReplaceRelatedRecord { record, .. }
            | Self::ReplaceRelatedRecords { record, .. }
            | Self::AddToRelatedRecords { record, .. }
            | Self::RemoveFromRelatedRecords { record, .. } => *record,
        }
    }

    /// True for operations that only make sense against local state.
    pub fn is_local_only(&self) -> bool {
        matches!(
            self,
            Self::AddToRelatedRecords { .. } | Self::RemoveFromRelatedRecords { .. }
        )
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), self.record())
    }
}
