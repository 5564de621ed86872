//! Collection diffing.
//!
//! Reconciles an incoming array of members against an edge's previous remote
//! and local views in a single pass. The result classifies membership
//! additions and removals, detects pure reordering of the remote array, and
//! decides whether the change is observable to consumers.
//!
//! ## Observability
//!
//! `changed` compares the incoming array against the *previous local* array,
//! index by index. A remote push that confirms an order the user already
//! produced locally therefore reports `changed == false`, even though remote
//! membership moved.
//!
//! ## Duplicates
//!
//! Legacy payloads may list a member more than once. The diff keeps the
//! first occurrence, records every index of each duplicated member, and
//! still produces a usable result. Whether that is acceptable is the
//! caller's decision.

use std::collections::{BTreeMap, HashSet};

use crate::types::Identifier;

/// Outcome of [`diff_collection`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CollectionDiff {
    /// Members of the final array that were not remote members, in final order.
    pub added: Vec<Identifier>,
    /// Previous remote members missing from the final array, in previous order.
    pub removed: Vec<Identifier>,
    /// The final array without duplicates.
    pub final_state: Vec<Identifier>,
    /// Set view of `final_state`.
    pub final_set: HashSet<Identifier>,
    /// Every index of each member listed more than once.
    pub duplicates: BTreeMap<Identifier, Vec<usize>>,
    /// The final array differs from the previous local array.
    pub changed: bool,
    /// Remote membership or order differs from the previous remote array.
    pub remote_order_changed: bool,
}

impl CollectionDiff {
    /// True when the input contained duplicate members.
    pub fn has_duplicates(&self) -> bool {
        !self.duplicates.is_empty()
    }
}

fn dedupe(incoming: &[Identifier]) -> (Vec<Identifier>, HashSet<Identifier>, BTreeMap<Identifier, Vec<usize>>) {
    let mut final_state = Vec::with_capacity(incoming.len());
    let mut final_set = HashSet::with_capacity(incoming.len());
    let mut first_seen: BTreeMap<Identifier, usize> = BTreeMap::new();
    let mut duplicates: BTreeMap<Identifier, Vec<usize>> = BTreeMap::new();

    for (index, member) in incoming.iter().copied().enumerate() {
        if final_set.insert(member) {
            final_state.push(member);
            first_seen.insert(member, index);
            continue;
        }
        duplicates
            .entry(member)
            .or_insert_with(|| first_seen.get(&member).copied().into_iter().collect())
            .push(index);
    }
    (final_state, final_set, duplicates)
}

/// Diff an incoming member array against an edge's previous views.
///
/// `prev_members` must be the set of `prev_remote`. Pure: nothing is mutated.
pub fn diff_collection(
    incoming: &[Identifier],
    prev_remote: &[Identifier],
    prev_members: &HashSet<Identifier>,
    prev_local: &[Identifier],
) -> CollectionDiff {
    let (final_state, final_set, duplicates) = dedupe(incoming);

    let final_len = final_state.len();
    let remote_len = prev_remote.len();
    let mut added = Vec::new();
    let mut removed = Vec::new();
    let mut changed = final_len != prev_local.len();
    let mut remote_order_changed = final_set.len() != prev_members.len();

    for index in 0..final_len.max(remote_len) {
        if let Some(&member) = final_state.get(index) {
            if !prev_members.contains(&member) {
                added.push(member);
                remote_order_changed = true;
            }
            if !changed && prev_local.get(index) != Some(&member) {
                changed = true;
            }
        }
        if let Some(&member) = prev_remote.get(index) {
            if !final_set.contains(&member) {
                removed.push(member);
                remote_order_changed = true;
            } else if !remote_order_changed && final_state.get(index) != Some(&member) {
                remote_order_changed = true;
            }
        }
    }

    CollectionDiff {
        added,
        removed,
        final_state,
        final_set,
        duplicates,
        changed,
        remote_order_changed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::IdentifierCache;

    // ─────────────────────────────────────────────────────────────────────────
    // Test Helpers
    // ─────────────────────────────────────────────────────────────────────────

    fn ids(cache: &IdentifierCache, names: &[&str]) -> Vec<Identifier> {
        names.iter().map(|n| cache.get_or_create("comment", n)).collect()
    }

    fn diff(incoming: &[Identifier], remote: &[Identifier], local: &[Identifier]) -> CollectionDiff {
        let members: HashSet<Identifier> = remote.iter().copied().collect();
        diff_collection(incoming, remote, &members, local)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Tests
    // ─────────────────────────────────────────────────────────────────────────

    #[test]
    fn test_additions_and_removals() {
        let cache = IdentifierCache::new();
        let [a, b, c, d] = ids(&cache, &["a", "b", "c", "d"])[..] else { unreachable!() };

        let result = diff(&[a, c, d], &[a, b, c], &[a, b, c]);
        assert_eq!(result.added, vec![d]);
        assert_eq!(result.removed, vec![b]);
        assert!(result.changed);
        assert!(result.remote_order_changed);
    }

    #[test]
    fn test_pure_reorder() {
        let cache = IdentifierCache::new();
        let [a, b, c] = ids(&cache, &["a", "b", "c"])[..] else { unreachable!() };

        let result = diff(&[c, a, b], &[a, b, c], &[a, b, c]);
        assert!(result.added.is_empty());
        assert!(result.removed.is_empty());
        assert!(result.remote_order_changed);
        assert!(result.changed);
    }

    #[test]
    fn test_order_confirming_push_is_not_a_change() {
        let cache = IdentifierCache::new();
        let [c1, c2, c3] = ids(&cache, &["1", "2", "3"])[..] else { unreachable!() };

        // Local already shows c3 appended; the server confirms it.
        let result = diff(&[c1, c2, c3], &[c1, c2], &[c1, c2, c3]);
        assert_eq!(result.added, vec![c3]);
        assert!(result.remote_order_changed);
        assert!(!result.changed);
    }

    #[test]
    fn test_identical_push() {
        let cache = IdentifierCache::new();
        let members = ids(&cache, &["a", "b"]);

        let result = diff(&members, &members, &members);
        assert!(!result.changed);
        assert!(!result.remote_order_changed);
        assert_eq!(result.final_state, members);
    }

    #[test]
    fn test_duplicates_keep_first_occurrence() {
        let cache = IdentifierCache::new();
        let [a, b] = ids(&cache, &["a", "b"])[..] else { unreachable!() };

        let result = diff(&[a, b, a, a], &[], &[]);
        assert_eq!(result.final_state, vec![a, b]);
        assert_eq!(result.added, vec![a, b]);
        assert_eq!(result.duplicates.get(&a), Some(&vec![0, 2, 3]));
        assert!(result.has_duplicates());
    }

    #[test]
    fn test_empty_to_empty() {
        let result = diff(&[], &[], &[]);
        assert_eq!(result, CollectionDiff::default());
    }
}
