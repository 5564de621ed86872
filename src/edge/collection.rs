//! Has-many edge.
//!
//! Remote state is an ordered array mirrored by a membership set. Local
//! state is expressed as two deltas against remote (`additions` and
//! `removals`), plus a cached local array that is rebuilt lazily once it has
//! been invalidated.
//!
//! ## Invariants
//!
//! - `remote_members` is exactly the set of `remote_state`
//! - `additions` and `removals` are disjoint
//! - `removals` only holds remote members, `additions` only non-members
//! - a valid cached local array equals remote minus removals plus additions
//!   (up to the position of locally inserted members)

use std::borrow::Cow;
use std::collections::HashSet;
use std::sync::Arc;

use crate::definition::EdgeDefinition;
use crate::types::{Identifier, RelationshipLinks};

use super::{EdgeState, MemberSet};

/// Ordered multi-valued relationship state.
#[derive(Debug, Clone)]
pub struct CollectionEdge {
    pub(crate) definition: Arc<EdgeDefinition>,
    pub(crate) identifier: Identifier,
    pub(crate) state: EdgeState,
    remote_state: Vec<Identifier>,
    remote_members: HashSet<Identifier>,
    /// `None` while dirty.
    local_state: Option<Vec<Identifier>>,
    additions: MemberSet,
    removals: MemberSet,
    pub(crate) links: Option<RelationshipLinks>,
    pub(crate) meta: Option<serde_json::Value>,
    pub(crate) transaction_ref: u64,
}

fn rebuild(remote: &[Identifier], removals: &MemberSet, additions: &MemberSet) -> Vec<Identifier> {
    let mut local: Vec<Identifier> = remote
        .iter()
        .copied()
        .filter(|member| !removals.contains(*member))
        .collect();
    local.extend(additions.iter());
    local
}

impl CollectionEdge {
    /// Create an empty edge.
    pub fn new(definition: Arc<EdgeDefinition>, identifier: Identifier) -> Self {
        Self {
            definition,
            identifier,
            state: EdgeState::default(),
            remote_state: Vec::new(),
            remote_members: HashSet::new(),
            local_state: Some(Vec::new()),
            additions: MemberSet::new(),
            removals: MemberSet::new(),
            links: None,
            meta: None,
            transaction_ref: 0,
        }
    }

    /// Last remote members, in order.
    pub fn remote_state(&self) -> &[Identifier] {
        &self.remote_state
    }

    /// Set view of the remote members.
    pub fn remote_members(&self) -> &HashSet<Identifier> {
        &self.remote_members
    }

    /// Pending local additions.
    pub fn additions(&self) -> &MemberSet {
        &self.additions
    }

    /// Pending local removals.
    pub fn removals(&self) -> &MemberSet {
        &self.removals
    }

    /// True while the cached local array must be rebuilt.
    pub fn is_dirty(&self) -> bool {
        self.local_state.is_none()
    }

    /// Invalidate the cached local array.
    pub fn mark_dirty(&mut self) {
        self.local_state = None;
    }

    /// True if there are unsaved membership changes.
    pub fn has_pending_changes(&self) -> bool {
        !self.additions.is_empty() || !self.removals.is_empty()
    }

    /// Current local members, rebuilding the cache if needed.
    pub fn compute_local_state(&mut self) -> &[Identifier] {
        let (remote, removals, additions) = (&self.remote_state, &self.removals, &self.additions);
        self.local_state
            .get_or_insert_with(|| rebuild(remote, removals, additions))
    }

    /// Current local members without touching the cache.
    pub fn local_view(&self) -> Cow<'_, [Identifier]> {
        match &self.local_state {
            Some(local) => Cow::Borrowed(local),
            None => Cow::Owned(rebuild(&self.remote_state, &self.removals, &self.additions)),
        }
    }

    /// Whether `value` is a local member.
    pub fn contains_local(&self, value: Identifier) -> bool {
        self.additions.contains(value)
            || (self.remote_members.contains(&value) && !self.removals.contains(value))
    }

    /// Add a local member at `index` (appended when `None`).
    ///
    /// A pending removal of `value` is cancelled instead of recording an
    /// addition. Returns false if `value` already is a local member.
    pub fn add_local(&mut self, value: Identifier, index: Option<usize>) -> bool {
        // A positional insert needs a materialized local array.
        if index.is_some() {
            self.compute_local_state();
        }
        if !self.removals.remove(value) {
            if self.additions.contains(value) || self.remote_members.contains(&value) {
                return false;
            }
            self.additions.insert(value);
        }
        if let Some(local) = self.local_state.as_mut() {
            match index {
                Some(index) => local.insert(index.min(local.len()), value),
                None => local.push(value),
            }
        }
        true
    }

    /// Remove a local member.
    ///
    /// A pending addition of `value` is cancelled instead of recording a
    /// removal. Returns false if `value` is not a local member.
    pub fn remove_local(&mut self, value: Identifier) -> bool {
        let removed = self.additions.remove(value)
            || (self.remote_members.contains(&value) && self.removals.insert(value));
        if removed {
            if let Some(local) = self.local_state.as_mut() {
                local.retain(|member| *member != value);
            }
        }
        removed
    }

    /// Append a remote member. Returns true if the local view changed.
    pub fn add_remote(&mut self, value: Identifier) -> bool {
        if !self.remote_members.insert(value) {
            return false;
        }
        self.remote_state.push(value);
        if self.additions.remove(value) {
            return false;
        }
        if let Some(local) = self.local_state.as_mut() {
            local.push(value);
        }
        true
    }

    /// Drop a remote member. Returns true if the local view changed.
    pub fn remove_remote(&mut self, value: Identifier) -> bool {
        if !self.remote_members.remove(&value) {
            return false;
        }
        self.remote_state.retain(|member| *member != value);
        if self.removals.remove(value) {
            return false;
        }
        if let Some(local) = self.local_state.as_mut() {
            local.retain(|member| *member != value);
        }
        true
    }

    /// Replace remote state wholesale.
    ///
    /// Pending additions that are now remote members and pending removals
    /// that no longer are become committed. The cached local array is kept;
    /// callers invalidate it when the remote order changed.
    pub fn push_remote(&mut self, final_state: Vec<Identifier>, final_set: HashSet<Identifier>) {
        self.remote_state = final_state;
        self.remote_members = final_set;
        self.state.has_received_data = true;
        self.state.is_empty = self.remote_state.is_empty();
        let members = &self.remote_members;
        self.additions.retain(|member| !members.contains(&member));
        self.removals.retain(|member| members.contains(&member));
    }

    /// Discard every pending local change, returning `(additions, removals)`.
    pub fn take_pending(&mut self) -> (Vec<Identifier>, Vec<Identifier>) {
        let pending = (self.additions.drain(), self.removals.drain());
        if !pending.0.is_empty() || !pending.1.is_empty() {
            self.mark_dirty();
        }
        pending
    }

    /// Set the local view wholesale, deriving the deltas from remote.
    pub fn replace_local(&mut self, final_state: Vec<Identifier>) {
        let final_set: HashSet<Identifier> = final_state.iter().copied().collect();
        self.additions = final_state
            .iter()
            .copied()
            .filter(|member| !self.remote_members.contains(member))
            .collect();
        self.removals = self
            .remote_state
            .iter()
            .copied()
            .filter(|member| !final_set.contains(member))
            .collect();
        self.local_state = Some(final_state);
    }

    pub(crate) fn related_identifiers(&self) -> Vec<Identifier> {
        let mut related = self.remote_state.clone();
        related.extend(self.additions.iter());
        related
    }

    pub(crate) fn remove_completely(&mut self, value: Identifier) -> bool {
        let was_local = self.contains_local(value);
        if self.remote_members.remove(&value) {
            self.remote_state.retain(|member| *member != value);
        }
        self.additions.remove(value);
        self.removals.remove(value);
        if let Some(local) = self.local_state.as_mut() {
            local.retain(|member| *member != value);
        }
        was_local
    }

    pub(crate) fn replace_member(&mut self, old: Identifier, new: Identifier) -> bool {
        let mut touched = false;
        if self.remote_members.remove(&old) {
            if self.remote_members.insert(new) {
                for member in self.remote_state.iter_mut() {
                    if *member == old {
                        *member = new;
                    }
                }
            } else {
                self.remote_state.retain(|member| *member != old);
            }
            touched = true;
        }
        touched |= self.additions.replace(old, new);
        touched |= self.removals.replace(old, new);
        if touched {
            self.mark_dirty();
        }
        touched
    }

    /// Reset remote state and pending changes.
    pub fn clear(&mut self) {
        self.remote_state.clear();
        self.remote_members.clear();
        self.additions.clear();
        self.removals.clear();
        self.mark_dirty();
    }

    pub(crate) fn destroy(&mut self) {
        self.clear();
        self.links = None;
        self.meta = None;
        self.state = EdgeState::default();
    }
}
