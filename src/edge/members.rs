//! Insertion-ordered identifier set.

use std::collections::HashSet;

use crate::types::Identifier;

/// A set of identifiers that remembers insertion order.
///
/// Used for pending additions and removals, where the order in which the
/// user made changes decides where members land in the local view.
#[derive(Debug, Clone, Default)]
pub struct MemberSet {
    order: Vec<Identifier>,
    index: HashSet<Identifier>,
}

impl MemberSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert at the end. Returns false if already present.
    pub fn insert(&mut self, value: Identifier) -> bool {
        if !self.index.insert(value) {
            return false;
        }
        self.order.push(value);
        true
    }

    /// Remove a member. Returns false if it was absent.
    pub fn remove(&mut self, value: Identifier) -> bool {
        if !self.index.remove(&value) {
            return false;
        }
        self.order.retain(|member| *member != value);
        true
    }

    /// Swap `old` for `new` in place, keeping its position.
    ///
    /// If `new` is already a member, `old` is simply dropped.
    pub fn replace(&mut self, old: Identifier, new: Identifier) -> bool {
        if !self.index.contains(&old) {
            return false;
        }
        if self.index.contains(&new) {
            return self.remove(old);
        }
        self.index.remove(&old);
        self.index.insert(new);
        for member in self.order.iter_mut() {
            if *member == old {
                *member = new;
            }
        }
        true
    }

    /// Membership test.
    pub fn contains(&self, value: Identifier) -> bool {
        self.index.contains(&value)
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// True when there are no members.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Members in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = Identifier> + '_ {
        self.order.iter().copied()
    }

    /// Members in insertion order, as a slice.
    pub fn as_slice(&self) -> &[Identifier] {
        &self.order
    }

    /// Keep only the members matching `keep`.
    pub fn retain(&mut self, mut keep: impl FnMut(Identifier) -> bool) {
        let index = &mut self.index;
        self.order.retain(|member| {
            let kept = keep(*member);
            if !kept {
                index.remove(member);
            }
            kept
        });
    }

    /// Remove everything, returning the members in insertion order.
    pub fn drain(&mut self) -> Vec<Identifier> {
        self.index.clear();
        std::mem::take(&mut self.order)
    }

    /// Remove everything.
    pub fn clear(&mut self) {
        self.index.clear();
        self.order.clear();
    }
}

impl PartialEq for MemberSet {
    fn eq(&self, other: &Self) -> bool {
        self.order == other.order
    }
}

impl Eq for MemberSet {}

impl FromIterator<Identifier> for MemberSet {
    fn from_iter<I: IntoIterator<Item = Identifier>>(iter: I) -> Self {
        let mut set = Self::new();
        for value in iter {
            set.insert(value);
        }
        set
    }
}
