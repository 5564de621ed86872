use std::sync::Arc;

use super::*;
use crate::definition::IMPLICIT_KEY_PREFIX;
use crate::runtime::RecordingSink;
use crate::schema::{InMemorySchema, RelationshipOptions};

// ─────────────────────────────────────────────────────────────────────────────
// Test Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn blog_schema() -> InMemorySchema {
    let mut schema = InMemorySchema::new();
    schema
        .has_many(
            "post",
            "comments",
            "comment",
            RelationshipOptions::default().with_async(false).with_inverse("post"),
        )
        .belongs_to(
            "comment",
            "post",
            "post",
            RelationshipOptions::default().with_async(false).with_inverse("comments"),
        )
        .belongs_to("post", "author", "user", RelationshipOptions::default().with_inverse("posts"))
        .has_many("user", "posts", "post", RelationshipOptions::default().with_inverse("author"))
        .belongs_to("post", "editor", "user", RelationshipOptions::default().without_inverse());
    schema
}

struct Fixture {
    graph: Graph,
    ids: Arc<IdentifierCache>,
    sink: Arc<RecordingSink>,
    scheduler: Arc<ManualScheduler>,
}

fn fixture_with(config: GraphConfig) -> Fixture {
    let ids = Arc::new(IdentifierCache::new());
    let sink = Arc::new(RecordingSink::new());
    let scheduler = Arc::new(ManualScheduler::new());
    let graph = Graph::builder(Arc::clone(&ids), Arc::new(blog_schema()))
        .sink(sink.clone())
        .scheduler(scheduler.clone())
        .config(config)
        .build();
    Fixture { graph, ids, sink, scheduler }
}

fn fixture() -> Fixture {
    fixture_with(GraphConfig::strict())
}

fn comments(ids: &[&str]) -> RelationshipPayload {
    RelationshipPayload::many(ids.iter().map(|id| ResourceIdentifierObject::new("comment", *id)).collect())
}

fn push_comments(f: &mut Fixture, post: Identifier, ids: &[&str]) {
    f.graph
        .push(Operation::UpdateRelationship {
            record: post,
            field: "comments".into(),
            value: comments(ids),
        })
        .unwrap();
    f.graph.settle().unwrap();
}

fn local_comments(f: &mut Fixture, post: Identifier) -> Vec<Identifier> {
    match f.graph.get_data(post, "comments").unwrap().data {
        Some(RelatedData::Many(members)) => members,
        other => panic!("unexpected data: {:?}", other),
    }
}

fn local_post(f: &mut Fixture, comment: Identifier) -> Option<Identifier> {
    match f.graph.get_data(comment, "post").unwrap().data {
        Some(RelatedData::One(value)) => value,
        None => None,
        other => panic!("unexpected data: {:?}", other),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Remote updates
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_push_is_deferred_until_coalesce() {
    let mut f = fixture();
    let post = f.ids.get_or_create("post", "1");
    let c1 = f.ids.get_or_create("comment", "1");

    f.graph
        .push(Operation::UpdateRelationship {
            record: post,
            field: "comments".into(),
            value: comments(&["1"]),
        })
        .unwrap();
    assert!(f.graph.has_pending_remote());
    assert_eq!(f.scheduler.take(), vec![FlushPhase::Coalesce]);
    assert!(!f.graph.has(post, "comments"));

    f.graph.flush(FlushPhase::Coalesce).unwrap();
    assert!(!f.graph.has_pending_remote());
    assert_eq!(f.scheduler.take(), vec![FlushPhase::Sync]);
    assert_eq!(local_comments(&mut f, post), vec![c1]);
    assert_eq!(local_post(&mut f, c1), Some(post));

    // Nothing reaches the sink before the sync phase.
    assert!(f.sink.is_empty());
    f.graph.flush(FlushPhase::Sync).unwrap();
    assert_eq!(f.sink.count(post, "comments"), 1);
    assert_eq!(f.sink.count(c1, "post"), 1);
}

#[test]
fn test_scheduler_asked_once_per_phase() {
    let mut f = fixture();
    let post = f.ids.get_or_create("post", "1");
    let other = f.ids.get_or_create("post", "2");

    for record in [post, other] {
        f.graph
            .push(Operation::UpdateRelationship {
                record,
                field: "comments".into(),
                value: comments(&[]),
            })
            .unwrap();
    }
    assert_eq!(f.scheduler.take(), vec![FlushPhase::Coalesce]);
}

#[test]
fn test_remote_confirmation_of_local_add_is_silent() {
    let mut f = fixture();
    let post = f.ids.get_or_create("post", "1");
    let c3 = f.ids.get_or_create("comment", "3");
    push_comments(&mut f, post, &["1", "2"]);

    f.graph
        .update(Operation::AddToRelatedRecords {
            record: post,
            field: "comments".into(),
            value: vec![c3],
            index: None,
        })
        .unwrap();
    f.graph.settle().unwrap();
    f.sink.take();

    push_comments(&mut f, post, &["1", "2", "3"]);
    assert!(f.sink.is_empty());
    assert!(f.graph.changed_relationships(post).is_empty());
    assert_eq!(local_post(&mut f, c3), Some(post));
}

#[test]
fn test_remote_update_resets_local_changes() {
    let mut f = fixture();
    let post = f.ids.get_or_create("post", "1");
    let c1 = f.ids.get_or_create("comment", "1");
    let c2 = f.ids.get_or_create("comment", "2");
    let c3 = f.ids.get_or_create("comment", "3");
    push_comments(&mut f, post, &["1", "2"]);

    f.graph
        .update(Operation::AddToRelatedRecords {
            record: post,
            field: "comments".into(),
            value: vec![c3],
            index: Some(0),
        })
        .unwrap();
    assert_eq!(local_comments(&mut f, post), vec![c3, c1, c2]);

    push_comments(&mut f, post, &["2"]);
    assert_eq!(local_comments(&mut f, post), vec![c2]);
    assert_eq!(local_post(&mut f, c3), None);
    assert_eq!(local_post(&mut f, c1), None);
}

#[test]
fn test_links_only_payload_means_empty() {
    let mut f = fixture();
    let post = f.ids.get_or_create("post", "1");

    f.graph
        .update(Operation::UpdateRelationship {
            record: post,
            field: "comments".into(),
            value: RelationshipPayload::related_link("/posts/1/comments"),
        })
        .unwrap();

    let data = f.graph.get_data(post, "comments").unwrap();
    assert_eq!(data.data, Some(RelatedData::Many(Vec::new())));
    assert_eq!(data.links.unwrap().related.unwrap().href(), "/posts/1/comments");
    assert!(f.graph.edge(post, "comments").unwrap().state().is_stale);
}

#[test]
fn test_payload_shape_rejected_at_push() {
    let mut f = fixture();
    let post = f.ids.get_or_create("post", "1");

    let result = f.graph.push(Operation::UpdateRelationship {
        record: post,
        field: "comments".into(),
        value: RelationshipPayload::one(Some(ResourceIdentifierObject::new("comment", "1"))),
    });
    assert!(matches!(
        result,
        Err(GraphError::Payload(PayloadError::ExpectedCollection { .. }))
    ));
    assert!(!f.graph.has_pending_remote());
}

#[test]
fn test_duplicate_members_rejected_when_disallowed() {
    let mut f = fixture_with(GraphConfig {
        allow_duplicate_members: false,
        ..GraphConfig::strict()
    });
    let post = f.ids.get_or_create("post", "1");

    let result = f.graph.push(Operation::UpdateRelationship {
        record: post,
        field: "comments".into(),
        value: comments(&["1", "1"]),
    });
    match result {
        Err(GraphError::Payload(PayloadError::DuplicateMembers { duplicates, .. })) => {
            assert_eq!(duplicates.len(), 1);
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn test_duplicate_members_deduplicated_when_allowed() {
    let mut f = fixture();
    let post = f.ids.get_or_create("post", "1");
    let c1 = f.ids.get_or_create("comment", "1");
    let c2 = f.ids.get_or_create("comment", "2");

    push_comments(&mut f, post, &["1", "2", "1"]);
    assert_eq!(local_comments(&mut f, post), vec![c1, c2]);
}

// ─────────────────────────────────────────────────────────────────────────────
// Local updates
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_local_only_operations_cannot_be_pushed() {
    let mut f = fixture();
    let post = f.ids.get_or_create("post", "1");

    let result = f.graph.push(Operation::RemoveFromRelatedRecords {
        record: post,
        field: "comments".into(),
        value: Vec::new(),
    });
    assert!(matches!(
        result,
        Err(GraphError::LocalOnlyOperation { operation: "removeFromRelatedRecords" })
    ));
}

#[test]
fn test_wrong_edge_kind() {
    let mut f = fixture();
    let post = f.ids.get_or_create("post", "1");

    let result = f.graph.update(Operation::ReplaceRelatedRecord {
        record: post,
        field: "comments".into(),
        value: None,
    });
    assert!(matches!(
        result,
        Err(GraphError::WrongEdgeKind {
            expected: EdgeKind::Resource,
            actual: EdgeKind::Collection,
            ..
        })
    ));
}

#[test]
fn test_strict_rejects_duplicate_add() {
    let mut f = fixture();
    let post = f.ids.get_or_create("post", "1");
    let c1 = f.ids.get_or_create("comment", "1");
    push_comments(&mut f, post, &["1"]);
    let before = f.graph.fingerprint().unwrap();

    let result = f.graph.update(Operation::AddToRelatedRecords {
        record: post,
        field: "comments".into(),
        value: vec![c1],
        index: None,
    });
    assert!(matches!(result, Err(GraphError::AlreadyPresent { member, .. }) if member == c1));
    assert_eq!(f.graph.fingerprint().unwrap(), before);
}

#[test]
fn test_strict_rejects_member_listed_twice() {
    let mut f = fixture();
    let post = f.ids.get_or_create("post", "1");
    let c1 = f.ids.get_or_create("comment", "1");
    let c2 = f.ids.get_or_create("comment", "2");
    push_comments(&mut f, post, &["1"]);
    let before = f.graph.fingerprint().unwrap();

    let added = f.graph.update(Operation::AddToRelatedRecords {
        record: post,
        field: "comments".into(),
        value: vec![c2, c2],
        index: None,
    });
    assert!(matches!(added, Err(GraphError::AlreadyPresent { member, .. }) if member == c2));

    let removed = f.graph.update(Operation::RemoveFromRelatedRecords {
        record: post,
        field: "comments".into(),
        value: vec![c1, c1],
    });
    assert!(matches!(removed, Err(GraphError::NotPresent { member, .. }) if member == c1));

    assert_eq!(f.graph.fingerprint().unwrap(), before);
    assert_eq!(f.graph.pending_notifications(), 0);
    assert_eq!(local_comments(&mut f, post), vec![c1]);
    assert_eq!(local_post(&mut f, c2), None);
}

#[test]
fn test_lenient_ignores_missing_remove() {
    let mut f = fixture_with(GraphConfig::lenient());
    let post = f.ids.get_or_create("post", "1");
    let c9 = f.ids.get_or_create("comment", "9");
    push_comments(&mut f, post, &["1"]);
    f.sink.take();

    f.graph
        .update(Operation::RemoveFromRelatedRecords {
            record: post,
            field: "comments".into(),
            value: vec![c9],
        })
        .unwrap();
    assert_eq!(f.graph.pending_notifications(), 0);
    f.graph.settle().unwrap();
    assert!(f.sink.is_empty());
}

#[test]
fn test_notifications_coalesce_per_field() {
    let mut f = fixture();
    let post = f.ids.get_or_create("post", "1");
    let c1 = f.ids.get_or_create("comment", "1");
    let c2 = f.ids.get_or_create("comment", "2");

    for member in [c1, c2] {
        f.graph
            .update(Operation::AddToRelatedRecords {
                record: post,
                field: "comments".into(),
                value: vec![member],
                index: None,
            })
            .unwrap();
    }
    f.graph
        .update(Operation::RemoveFromRelatedRecords {
            record: post,
            field: "comments".into(),
            value: vec![c1],
        })
        .unwrap();

    assert_eq!(f.scheduler.take(), vec![FlushPhase::Sync]);
    f.graph.flush(FlushPhase::Sync).unwrap();
    assert_eq!(f.sink.count(post, "comments"), 1);
    assert_eq!(local_comments(&mut f, post), vec![c2]);
    assert_eq!(local_post(&mut f, c1), None);
}

#[test]
fn test_belongs_to_replacement_moves_between_inverses() {
    let mut f = fixture();
    let p1 = f.ids.get_or_create("post", "1");
    let p2 = f.ids.get_or_create("post", "2");
    let c1 = f.ids.get_or_create("comment", "1");
    push_comments(&mut f, p1, &["1"]);

    f.graph
        .update(Operation::ReplaceRelatedRecord {
            record: c1,
            field: "post".into(),
            value: Some(p2),
        })
        .unwrap();

    assert!(local_comments(&mut f, p1).is_empty());
    assert_eq!(local_comments(&mut f, p2), vec![c1]);
    let changes = f.graph.changed_relationships(c1);
    assert_eq!(
        changes.get("post"),
        Some(&RelationshipChange::Resource { remote: Some(p1), local: Some(p2) })
    );
}

#[test]
fn test_changed_relationships_reports_deltas() {
    let mut f = fixture();
    let post = f.ids.get_or_create("post", "1");
    let c1 = f.ids.get_or_create("comment", "1");
    let c3 = f.ids.get_or_create("comment", "3");
    push_comments(&mut f, post, &["1", "2"]);

    f.graph
        .update(Operation::AddToRelatedRecords {
            record: post,
            field: "comments".into(),
            value: vec![c3],
            index: None,
        })
        .unwrap();
    f.graph
        .update(Operation::RemoveFromRelatedRecords {
            record: post,
            field: "comments".into(),
            value: vec![c1],
        })
        .unwrap();

    let changes = f.graph.changed_relationships(post);
    assert_eq!(
        changes.get("comments"),
        Some(&RelationshipChange::Collection {
            additions: vec![c3],
            removals: vec![c1],
            reordered: false,
        })
    );
}

#[test]
fn test_rollback_restores_remote_state() {
    let mut f = fixture();
    let post = f.ids.get_or_create("post", "1");
    let c1 = f.ids.get_or_create("comment", "1");
    let c2 = f.ids.get_or_create("comment", "2");
    push_comments(&mut f, post, &["1", "2"]);

    f.graph
        .update(Operation::RemoveFromRelatedRecords {
            record: post,
            field: "comments".into(),
            value: vec![c1],
        })
        .unwrap();
    let rolled_back = f.graph.rollback(post).unwrap();

    assert_eq!(rolled_back, vec![Arc::<str>::from("comments")]);
    assert_eq!(local_comments(&mut f, post), vec![c1, c2]);
    assert_eq!(local_post(&mut f, c1), Some(post));
    assert!(f.graph.changed_relationships(post).is_empty());
}

// ─────────────────────────────────────────────────────────────────────────────
// Lifecycle
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_delete_purges_inverses() {
    let mut f = fixture();
    let post = f.ids.get_or_create("post", "1");
    let c1 = f.ids.get_or_create("comment", "1");
    let c2 = f.ids.get_or_create("comment", "2");
    push_comments(&mut f, post, &["1", "2"]);
    f.sink.take();

    f.graph.push(Operation::DeleteRecord { record: c1 }).unwrap();
    f.graph.settle().unwrap();

    assert!(!f.graph.has(c1, "post"));
    assert_eq!(local_comments(&mut f, post), vec![c2]);
    assert_eq!(f.sink.count(post, "comments"), 1);
    assert_eq!(f.sink.count(c1, "post"), 0);
}

#[test]
fn test_deleted_member_stripped_from_same_transaction() {
    let mut f = fixture();
    let post = f.ids.get_or_create("post", "1");
    let c1 = f.ids.get_or_create("comment", "1");
    let c2 = f.ids.get_or_create("comment", "2");

    f.graph
        .push(Operation::UpdateRelationship {
            record: post,
            field: "comments".into(),
            value: comments(&["1", "2"]),
        })
        .unwrap();
    f.graph.push(Operation::DeleteRecord { record: c1 }).unwrap();
    f.graph.settle().unwrap();

    assert_eq!(local_comments(&mut f, post), vec![c2]);
    assert!(!f.graph.has(c1, "post"));
}

#[test]
fn test_unload_sync_relationship_forgets_record() {
    let mut f = fixture();
    let post = f.ids.get_or_create("post", "1");
    let c1 = f.ids.get_or_create("comment", "1");
    let c2 = f.ids.get_or_create("comment", "2");
    push_comments(&mut f, post, &["1", "2"]);

    f.graph.unload(c1, false);

    assert_eq!(local_comments(&mut f, post), vec![c2]);
    let edge = f.graph.edge(c1, "post").unwrap();
    assert!(edge.state().is_stale);
    assert!(edge.related_identifiers().is_empty());
}

#[test]
fn test_unload_async_relationship_keeps_reference() {
    let mut f = fixture();
    let post = f.ids.get_or_create("post", "1");
    let user = f.ids.get_or_create("user", "1");

    f.graph
        .update(Operation::UpdateRelationship {
            record: post,
            field: "author".into(),
            value: RelationshipPayload::one(Some(ResourceIdentifierObject::new("user", "1"))),
        })
        .unwrap();
    assert!(!f.graph.is_releasable(user));

    f.graph.unload(user, false);

    let author = f.graph.get_data(post, "author").unwrap();
    assert_eq!(author.data, Some(RelatedData::One(Some(user))));
    assert!(f.graph.edge(post, "author").unwrap().state().has_dematerialized_inverse);
}

#[test]
fn test_unload_skips_inverse_already_cleared() {
    let mut f = fixture();
    let post = f.ids.get_or_create("post", "1");
    let c1 = f.ids.get_or_create("comment", "1");
    push_comments(&mut f, post, &["1"]);
    f.graph
        .update(Operation::ReplaceRelatedRecord {
            record: c1,
            field: "post".into(),
            value: None,
        })
        .unwrap();
    f.graph.settle().unwrap();
    f.sink.take();

    f.graph.unload(post, false);
    f.graph.settle().unwrap();

    assert_eq!(f.sink.count(post, "comments"), 1);
    assert_eq!(f.sink.count(c1, "post"), 0);
}

#[test]
fn test_async_unload_notifies_once() {
    let mut f = fixture();
    let post = f.ids.get_or_create("post", "1");
    let user = f.ids.get_or_create("user", "1");
    f.graph
        .update(Operation::UpdateRelationship {
            record: post,
            field: "author".into(),
            value: RelationshipPayload::one(Some(ResourceIdentifierObject::new("user", "1"))),
        })
        .unwrap();
    f.graph.settle().unwrap();
    f.sink.take();

    f.graph.unload(user, false);
    f.graph.unload(user, false);
    f.graph.settle().unwrap();

    assert_eq!(f.sink.count(post, "author"), 1);
}

#[test]
fn test_releasable_records() {
    let mut f = fixture();
    let post = f.ids.get_or_create("post", "1");
    let c1 = f.ids.get_or_create("comment", "1");
    let server_user = f.ids.get_or_create("user", "1");
    let fresh_user = f.ids.create_local("user");
    push_comments(&mut f, post, &["1"]);

    for (user, id) in [(server_user, "2"), (fresh_user, "3")] {
        f.graph
            .update(Operation::AddToRelatedRecords {
                record: user,
                field: "posts".into(),
                value: vec![f.ids.get_or_create("post", id)],
                index: None,
            })
            .unwrap();
    }

    // Only sync inverses.
    assert!(f.graph.is_releasable(c1));
    // No edges at all.
    assert!(f.graph.is_releasable(f.ids.get_or_create("comment", "9")));
    // New records are releasable even behind an async inverse.
    assert!(f.graph.has(fresh_user, "posts"));
    assert!(f.graph.is_releasable(fresh_user));
    assert!(!f.graph.is_releasable(server_user));
}

#[test]
fn test_merge_rekeys_local_member() {
    let mut f = fixture();
    let post = f.ids.get_or_create("post", "1");
    let c1 = f.ids.get_or_create("comment", "1");
    let fresh = f.ids.create_local("comment");
    let server = f.ids.get_or_create("comment", "9");
    push_comments(&mut f, post, &["1"]);

    f.graph
        .update(Operation::AddToRelatedRecords {
            record: post,
            field: "comments".into(),
            value: vec![fresh],
            index: None,
        })
        .unwrap();
    f.graph
        .update(Operation::MergeIdentifiers { record: fresh, value: server })
        .unwrap();

    assert_eq!(local_comments(&mut f, post), vec![c1, server]);
    assert_eq!(local_post(&mut f, server), Some(post));
    assert!(f.graph.fields(fresh).is_empty());
}

#[test]
fn test_implicit_inverse_reaches_deleted_record() {
    let mut f = fixture();
    let post = f.ids.get_or_create("post", "1");
    let user = f.ids.get_or_create("user", "1");

    f.graph
        .update(Operation::UpdateRelationship {
            record: post,
            field: "editor".into(),
            value: RelationshipPayload::one(Some(ResourceIdentifierObject::new("user", "1"))),
        })
        .unwrap();
    let fields = f.graph.fields(user);
    assert_eq!(fields.len(), 1);
    assert!(fields[0].starts_with(IMPLICIT_KEY_PREFIX));
    assert!(matches!(
        f.graph.get_data(user, &fields[0]),
        Err(GraphError::ImplicitEdgeMutation { .. })
    ));

    f.graph.update(Operation::DeleteRecord { record: user }).unwrap();
    let editor = f.graph.get_data(post, "editor").unwrap();
    assert_eq!(editor.data, Some(RelatedData::One(None)));
}

#[test]
fn test_remove_suppresses_own_notifications() {
    let mut f = fixture();
    let post = f.ids.get_or_create("post", "1");
    let c1 = f.ids.get_or_create("comment", "1");
    push_comments(&mut f, post, &["1"]);
    f.sink.take();

    f.graph.remove(c1);
    f.graph.settle().unwrap();

    assert!(!f.graph.has(c1, "post"));
    assert_eq!(f.sink.count(c1, "post"), 0);
    assert_eq!(f.sink.count(post, "comments"), 1);
}

#[test]
fn test_destroy_silences_graph() {
    let mut f = fixture();
    let post = f.ids.get_or_create("post", "1");
    let c1 = f.ids.get_or_create("comment", "1");
    push_comments(&mut f, post, &["1"]);
    f.sink.take();

    f.graph.destroy();
    f.graph
        .update(Operation::AddToRelatedRecords {
            record: post,
            field: "comments".into(),
            value: vec![c1],
            index: None,
        })
        .unwrap();
    f.graph.settle().unwrap();
    assert!(f.sink.is_empty());
}

// ─────────────────────────────────────────────────────────────────────────────
// Snapshots
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_identical_remote_push_keeps_fingerprint() {
    let mut f = fixture();
    let post = f.ids.get_or_create("post", "1");
    push_comments(&mut f, post, &["1", "2"]);
    let before = f.graph.snapshot().unwrap();
    f.sink.take();

    push_comments(&mut f, post, &["1", "2"]);
    let after = f.graph.snapshot().unwrap();

    assert_eq!(before.fingerprint, after.fingerprint);
    assert_eq!(after.identifier_count, 3);
    assert!(after.verify().unwrap());
    assert!(f.sink.is_empty());
}
