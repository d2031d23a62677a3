//! Event handling through the controller with held backend responses:
//! coalescing, stale drops, deferred relationships and out-of-order completion.

use std::sync::Arc;

use neomap_core::{
    data::entities::RelationshipKey,
    services::{
        controller::{BegunEvent, GraphController, PendingCommit},
        messages::{EventOutcome, UiEvent},
        transactions::TransactionBuilder,
    },
    test_utils::fakes::{
        node_row, triple_row, FakeGraphBackend, RecordingFormPresenter, RecordingRenderer,
    },
    BackendError, Coordinates, CoreError, EntityId, InteractionMode, NodeRef, NoticeLevel, Properties,
};
use pretty_assertions::assert_eq;

struct Harness {
    backend: Arc<FakeGraphBackend>,
    renderer: Arc<RecordingRenderer>,
    controller: GraphController,
}

fn harness() -> Harness {
    let backend = Arc::new(FakeGraphBackend::new());
    let renderer = Arc::new(RecordingRenderer::new());
    let controller = GraphController::new(
        backend.clone(),
        renderer.clone(),
        Arc::new(RecordingFormPresenter::new()),
        TransactionBuilder::default(),
    );
    Harness {
        backend,
        renderer,
        controller,
    }
}

fn pending(begun: BegunEvent) -> PendingCommit {
    match begun {
        BegunEvent::Commit(pending) => pending,
        BegunEvent::Done(outcome) => panic!("expected a commit, got {:?}", outcome),
    }
}

#[test_log::test(tokio::test)]
async fn test_duplicate_expansion_commits_once() {
    let h = harness();
    let gate = h.backend.hold_responses();
    h.backend.push_rows(vec![triple_row(5, "KNOWS", 6, 5)]);

    let first = pending(h.controller.begin(UiEvent::NodeDoubleClick(EntityId(5))).unwrap());
    let second = pending(h.controller.begin(UiEvent::NodeDoubleClick(EntityId(5))).unwrap());
    assert!(!first.coalesced());
    assert!(second.coalesced());

    gate.release();
    let (a, b) = tokio::join!(h.controller.finish(first), h.controller.finish(second));
    a.unwrap();
    b.unwrap();

    assert_eq!(h.backend.commit_count(), 1);
    assert_eq!(h.controller.with_model(|m| m.relationship_count()), 1);
    assert_eq!(h.controller.executor().in_flight_count(), 0);
}

#[test_log::test(tokio::test)]
async fn test_create_result_after_mode_switch_is_dropped() {
    let h = harness();
    h.controller.handle(UiEvent::CreateModeToggle).await.unwrap();
    let gate = h.backend.hold_responses();
    h.backend.push_rows(vec![node_row(40, &[], &[])]);

    let create = pending(
        h.controller
            .begin(UiEvent::NodeCreateGesture {
                at: Coordinates { x: 10.0, y: 10.0 },
            })
            .unwrap(),
    );
    assert_eq!(h.controller.with_model(|m| m.placeholder_count()), 1);

    h.controller.handle(UiEvent::CreateModeToggle).await.unwrap();
    assert_eq!(h.controller.mode(), InteractionMode::Browse);

    gate.release();
    let err = h.controller.finish(create).await.unwrap_err();

    assert!(matches!(err, CoreError::StaleResultDiscarded { .. }));
    assert_eq!(h.controller.with_model(|m| m.node_count()), 0);
    assert_eq!(h.controller.with_model(|m| m.placeholder_count()), 0);
    assert!(h.renderer.notices().is_empty(), "stale drops are silent");
}

#[test_log::test(tokio::test)]
async fn test_placeholder_visible_until_promoted() {
    let h = harness();
    h.controller.handle(UiEvent::CreateModeToggle).await.unwrap();
    let gate = h.backend.hold_responses();
    h.backend.push_rows(vec![node_row(40, &[], &[])]);

    let create = pending(
        h.controller
            .begin(UiEvent::NodeCreateGesture {
                at: Coordinates { x: 0.0, y: 0.0 },
            })
            .unwrap(),
    );
    let placeholder = create.intent().origin.unwrap();
    assert_eq!(h.renderer.diffs()[0].added_nodes[0].id, NodeRef::Pending(placeholder));
    assert_eq!(h.controller.with_model(|m| m.node_count()), 0);

    gate.release();
    h.controller.finish(create).await.unwrap();

    h.controller.with_model(|m| {
        assert_eq!(m.node_count(), 1);
        assert!(m.placeholder(placeholder).is_none());
    });
}

#[test_log::test(tokio::test)]
async fn test_relationship_to_pending_node_waits_for_promotion() {
    let h = harness();
    h.backend.push_rows(vec![node_row(1, &[], &[])]);
    h.controller.handle(UiEvent::NodeClick(EntityId(1))).await.unwrap();
    h.controller.handle(UiEvent::CreateModeToggle).await.unwrap();

    let gate = h.backend.hold_responses();
    h.backend.push_rows(vec![node_row(2, &[], &[])]);
    let create = pending(
        h.controller
            .begin(UiEvent::NodeCreateGesture {
                at: Coordinates { x: 5.0, y: 5.0 },
            })
            .unwrap(),
    );
    let placeholder = create.intent().origin.unwrap();
    gate.wait_for_held(1).await;

    let staged = h
        .controller
        .handle(UiEvent::RelationshipCreateGesture {
            source: NodeRef::Real(EntityId(1)),
            target: NodeRef::Pending(placeholder),
            rel_type: Some("KNOWS".into()),
            properties: Properties::new(),
        })
        .await
        .unwrap();
    assert_eq!(staged, EventOutcome::Staged);
    assert_eq!(h.controller.with_model(|m| m.relationship_count()), 0);
    assert_eq!(h.backend.commit_count(), 2, "nothing is sent for a staged relationship");

    h.backend.push_rows(vec![triple_row(1, "KNOWS", 2, 1)]);
    gate.release();
    let outcome = h.controller.finish(create).await.unwrap();

    let EventOutcome::Merged(diff) = outcome else {
        panic!("expected a merge");
    };
    assert_eq!(diff.added_relationships.len(), 1);
    assert_eq!(h.backend.commit_count(), 3);
    h.controller.with_model(|m| {
        assert_eq!(m.relationship_count(), 1);
        assert!(m
            .relationship(&RelationshipKey {
                rel_type: "KNOWS".into(),
                source: EntityId(1),
                target: EntityId(2),
            })
            .is_some());
        assert!(m.deferred().is_empty());
    });
}

#[test_log::test(tokio::test)]
async fn test_out_of_order_responses_reach_same_model() {
    let in_order = harness();
    in_order.backend.push_rows(vec![triple_row(1, "KNOWS", 2, 1)]);
    in_order.backend.push_rows(vec![triple_row(2, "KNOWS", 3, 2)]);
    in_order.controller.handle(UiEvent::NodeDoubleClick(EntityId(1))).await.unwrap();
    in_order.controller.handle(UiEvent::NodeDoubleClick(EntityId(2))).await.unwrap();

    let reversed = harness();
    let gate = reversed.backend.hold_responses();
    reversed.backend.push_rows(vec![triple_row(1, "KNOWS", 2, 1)]);
    reversed.backend.push_rows(vec![triple_row(2, "KNOWS", 3, 2)]);
    let first = pending(reversed.controller.begin(UiEvent::NodeDoubleClick(EntityId(1))).unwrap());
    let second = pending(reversed.controller.begin(UiEvent::NodeDoubleClick(EntityId(2))).unwrap());
    gate.wait_for_held(2).await;

    assert!(gate.release_call(1));
    reversed.controller.finish(second).await.unwrap();
    assert!(gate.release_call(0));
    reversed.controller.finish(first).await.unwrap();

    assert_eq!(in_order.controller.snapshot(), reversed.controller.snapshot());
}

#[test_log::test(tokio::test)]
async fn test_edit_rejected_while_same_intent_in_flight() {
    let h = harness();
    h.backend.push_rows(vec![node_row(1, &["Person"], &[])]);
    h.controller.handle(UiEvent::NodeClick(EntityId(1))).await.unwrap();
    let node = h.controller.with_model(|m| m.node(EntityId(1)).cloned()).unwrap();

    let gate = h.backend.hold_responses();
    let edit = pending(h.controller.begin(UiEvent::NodeFormSubmit(node.clone())).unwrap());
    let err = h.controller.begin(UiEvent::NodeFormSubmit(node)).unwrap_err();
    assert!(matches!(err, CoreError::IntentInFlight { .. }));

    gate.release();
    h.controller.finish(edit).await.unwrap();
    assert_eq!(h.renderer.notices().len(), 1);
}

#[test_log::test(tokio::test)]
async fn test_gesture_naming_promoted_placeholder_commits_relationship() {
    let h = harness();
    h.backend.push_rows(vec![node_row(1, &[], &[])]);
    h.controller.handle(UiEvent::NodeClick(EntityId(1))).await.unwrap();
    h.controller.handle(UiEvent::CreateModeToggle).await.unwrap();

    h.backend.push_rows(vec![node_row(2, &[], &[])]);
    let create = pending(
        h.controller
            .begin(UiEvent::NodeCreateGesture {
                at: Coordinates { x: 5.0, y: 5.0 },
            })
            .unwrap(),
    );
    let placeholder = create.intent().origin.unwrap();
    h.controller.finish(create).await.unwrap();
    assert_eq!(h.controller.with_model(|m| m.promoted(placeholder)), Some(EntityId(2)));

    // The drag started on the placeholder and ended after the create resolved.
    h.backend.push_rows(vec![triple_row(1, "KNOWS", 2, 1)]);
    let outcome = h
        .controller
        .handle(UiEvent::RelationshipCreateGesture {
            source: NodeRef::Real(EntityId(1)),
            target: NodeRef::Pending(placeholder),
            rel_type: Some("KNOWS".into()),
            properties: Properties::new(),
        })
        .await
        .unwrap();

    assert!(matches!(outcome, EventOutcome::Merged(_)));
    assert_eq!(h.backend.commit_count(), 3);
    assert!(h.backend.cypher_log()[2].contains("[r:`KNOWS`]"));
    h.controller.with_model(|m| {
        assert_eq!(m.relationship_count(), 1);
        assert!(m
            .relationship(&RelationshipKey {
                rel_type: "KNOWS".into(),
                source: EntityId(1),
                target: EntityId(2),
            })
            .is_some());
        assert!(m.deferred().is_empty());
    });
}

#[test_log::test(tokio::test)]
async fn test_failed_release_commit_tells_user_relationship_was_discarded() {
    let h = harness();
    h.backend.push_rows(vec![node_row(1, &[], &[])]);
    h.controller.handle(UiEvent::NodeClick(EntityId(1))).await.unwrap();
    h.controller.handle(UiEvent::CreateModeToggle).await.unwrap();

    let gate = h.backend.hold_responses();
    h.backend.push_rows(vec![node_row(2, &[], &[])]);
    let create = pending(
        h.controller
            .begin(UiEvent::NodeCreateGesture {
                at: Coordinates { x: 5.0, y: 5.0 },
            })
            .unwrap(),
    );
    let placeholder = create.intent().origin.unwrap();
    gate.wait_for_held(1).await;

    let staged = h
        .controller
        .handle(UiEvent::RelationshipCreateGesture {
            source: NodeRef::Real(EntityId(1)),
            target: NodeRef::Pending(placeholder),
            rel_type: Some("KNOWS".into()),
            properties: Properties::new(),
        })
        .await
        .unwrap();
    assert_eq!(staged, EventOutcome::Staged);

    h.backend.push_error(BackendError::Query {
        code: "Neo.ClientError.Schema.ConstraintValidationFailed".into(),
        message: "constraint".into(),
    });
    gate.release();
    let outcome = h.controller.finish(create).await.unwrap();

    assert!(matches!(outcome, EventOutcome::Merged(_)));
    assert_eq!(h.backend.commit_count(), 3);
    assert_eq!(h.controller.with_model(|m| m.relationship_count()), 0);
    let last = h.renderer.notices().last().cloned().unwrap();
    assert_eq!(last.level, NoticeLevel::Warning);
    assert!(last.message.contains("KNOWS from 1 to 2 was discarded"), "{}", last.message);
}

#[test_log::test(tokio::test)]
async fn test_form_opened_after_create_asks_for_browse_mode_on_submit() {
    let h = harness();
    h.controller.handle(UiEvent::CreateModeToggle).await.unwrap();
    h.backend.push_rows(vec![node_row(7, &[], &[])]);
    h.controller
        .handle(UiEvent::NodeCreateGesture {
            at: Coordinates { x: 1.0, y: 1.0 },
        })
        .await
        .unwrap();
    let created = h.controller.with_model(|m| m.node(EntityId(7)).cloned()).unwrap();

    let err = h.controller.handle(UiEvent::NodeFormSubmit(created)).await.unwrap_err();

    assert!(matches!(
        err,
        CoreError::ModeViolation {
            mode: InteractionMode::Create,
            ..
        }
    ));
    let notice = h.renderer.notices().last().cloned().unwrap();
    assert!(notice.message.contains("switch to browse mode"), "{}", notice.message);
    assert_eq!(h.backend.commit_count(), 1);
}
