//! Inverse propagation.
//!
//! These helpers update the *other* side of a relationship after the graph
//! changed one side. They never call back into the originating edge, except
//! through the belongs-to path, where a displaced previous value must in
//! turn release its own inverse.

use std::sync::Arc;

use crate::edge::{GraphEdge, Side};
use crate::types::Identifier;

use super::{Graph, GraphError};

impl Graph {
    /// Make `target.inverse_key` include `value`.
    pub(crate) fn add_to_inverse(
        &mut self,
        target: Identifier,
        inverse_key: &str,
        value: Identifier,
        side: Side,
    ) -> Result<(), GraphError> {
        match self.ensure_edge(target, inverse_key)? {
            GraphEdge::Collection(edge) => {
                let changed = match side {
                    Side::Local => edge.add_local(value, None),
                    Side::Remote => edge.add_remote(value),
                };
                let field = Arc::clone(edge.definition.field());
                if changed {
                    self.notify_change(target, &field);
                }
            }
            GraphEdge::Resource(edge) => {
                let definition = Arc::clone(&edge.definition);
                self.replace_related_record(target, &definition, Some(value), side, false)?;
            }
            GraphEdge::Implicit(edge) => {
                edge.add(value, side);
            }
        }
        Ok(())
    }

    /// Make `target.inverse_key` stop including `value`. Missing edges are
    /// left alone.
    pub(crate) fn remove_from_inverse(
        &mut self,
        target: Identifier,
        inverse_key: &str,
        value: Identifier,
        side: Side,
    ) {
        let Some(edge) = self.edge_mut(target, inverse_key) else {
            return;
        };
        let changed = match edge {
            GraphEdge::Collection(edge) => match side {
                Side::Local => edge.remove_local(value),
                Side::Remote => edge.remove_remote(value),
            },
            GraphEdge::Resource(edge) => edge.remove_value(value, side == Side::Remote),
            GraphEdge::Implicit(edge) => {
                edge.remove(value, side);
                false
            }
        };
        if changed {
            let field = Arc::clone(edge.definition().field());
            self.notify_change(target, &field);
        }
    }

    /// Drop `value` from every view of `target.key`.
    pub(crate) fn remove_completely_from(&mut self, target: Identifier, key: &str, value: Identifier) {
        let Some(edge) = self.edge_mut(target, key) else {
            return;
        };
        let changed = edge.remove_completely(value) && edge.kind() != crate::definition::EdgeKind::Implicit;
        if changed {
            let field = Arc::clone(edge.definition().field());
            self.notify_change(target, &field);
        }
    }

    /// Rekey `old` to `new` inside `target.key`.
    pub(crate) fn merge_in_edge(&mut self, target: Identifier, key: &str, old: Identifier, new: Identifier) {
        let Some(edge) = self.edge_mut(target, key) else {
            return;
        };
        let changed = edge.replace_member(old, new) && edge.kind() != crate::definition::EdgeKind::Implicit;
        if changed {
            let field = Arc::clone(edge.definition().field());
            self.notify_change(target, &field);
        }
    }

    /// Tell `target.inverse_key` that `identifier` was unloaded.
    ///
    /// A sync inverse (or a new record on either end) treats the unload as a
    /// client-side delete; an async inverse keeps the reference and flags
    /// the dematerialization.
    pub(crate) fn notify_inverse_of_dematerialization(
        &mut self,
        target: Identifier,
        inverse_key: &str,
        identifier: Identifier,
        silence: bool,
    ) {
        let identifier_is_new = self.identifiers.is_new(identifier);
        let Some(edge) = self.edge_mut(target, inverse_key) else {
            return;
        };
        let changed = match edge {
            GraphEdge::Resource(edge) => {
                // Already pointing at another record locally.
                if edge.local_state.is_some_and(|local| local != identifier) {
                    return;
                }
                if edge.local_state.is_some() && (!edge.definition.is_async() || identifier_is_new) {
                    edge.local_state = None;
                    if edge.remote_state == Some(identifier) {
                        edge.remote_state = None;
                        edge.state.has_received_data = true;
                        edge.state.is_empty = true;
                    }
                    true
                } else if edge.definition.is_async() && !identifier_is_new {
                    !std::mem::replace(&mut edge.state.has_dematerialized_inverse, true)
                } else {
                    false
                }
            }
            GraphEdge::Collection(edge) => {
                if !edge.definition.is_async() || identifier_is_new {
                    edge.remove_completely(identifier)
                } else {
                    !std::mem::replace(&mut edge.state.has_dematerialized_inverse, true)
                }
            }
            GraphEdge::Implicit(_) => return,
        };
        if changed && !silence {
            let field = Arc::clone(edge.definition().field());
            self.notify_change(target, &field);
        }
    }
}
