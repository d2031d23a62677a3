//! The channel client and controller service loop

use std::sync::Arc;

use neomap_core::{
    services::{
        client::ControllerService,
        controller::GraphController,
        messages::EventOutcome,
        transactions::{SearchQuery, TransactionBuilder},
    },
    test_utils::fakes::{node_row, FakeGraphBackend, RecordingFormPresenter, RecordingRenderer},
    CoreError, CreateDefaults, EntityId, InteractionMode, NodeRef, Properties, RowShape,
};

fn service(
    backend: Arc<FakeGraphBackend>,
    defaults: CreateDefaults,
) -> (ControllerService, neomap_core::GraphClient, Arc<RecordingRenderer>, Arc<RecordingFormPresenter>) {
    let renderer = Arc::new(RecordingRenderer::new());
    let forms = Arc::new(RecordingFormPresenter::new());
    let controller = GraphController::new(
        backend,
        renderer.clone(),
        forms.clone(),
        TransactionBuilder::new(defaults),
    );
    let (service, client) = ControllerService::channel(controller, 16);
    (service, client, renderer, forms)
}

#[tokio::test]
async fn test_client_round_trip() {
    let backend = Arc::new(FakeGraphBackend::new());
    backend.push_rows(vec![node_row(9, &["Person"], &[("name", "Cy")])]);
    let (service, client, _renderer, forms) = service(backend.clone(), CreateDefaults::default());
    let handle = tokio::spawn(service.run());

    let outcome = client.click_node(EntityId(9)).await.unwrap();
    let EventOutcome::Merged(diff) = outcome else {
        panic!("expected a merge");
    };
    assert_eq!(diff.added_nodes.len(), 1);
    assert_eq!(forms.presented_nodes().len(), 1);

    drop(client);
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_mode_violation_comes_back_as_error() {
    let backend = Arc::new(FakeGraphBackend::new());
    let (service, client, renderer, _forms) = service(backend.clone(), CreateDefaults::default());
    tokio::spawn(service.run());

    let err = client.create_node_at(1.0, 1.0).await.unwrap_err();
    assert!(matches!(
        err,
        CoreError::ModeViolation {
            mode: InteractionMode::Browse,
            ..
        }
    ));
    assert_eq!(backend.commit_count(), 0);
    assert_eq!(renderer.notices().len(), 1);

    let toggled = client.toggle_create_mode().await.unwrap();
    assert!(matches!(toggled, EventOutcome::ModeChanged(t) if t.to == InteractionMode::Create));

    let err = client
        .search(
            vec![SearchQuery {
                cypher: "MATCH (n) RETURN n, ID(n) AS _id, labels(n) AS _labels".into(),
                parameters: Properties::new(),
            }],
            RowShape::Node,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::ModeViolation { .. }));
}

#[tokio::test]
async fn test_create_uses_configured_defaults() {
    let backend = Arc::new(FakeGraphBackend::new());
    backend.push_rows(vec![node_row(21, &["Draft"], &[])]);
    backend.push_rows(vec![neomap_core::test_utils::triple_row(21, "LINKS_TO", 21, 21)]);
    let defaults = CreateDefaults {
        labels: vec!["Draft".to_string()],
        relationship_type: "LINKS_TO".to_string(),
        ..CreateDefaults::default()
    };
    let (service, client, _renderer, _forms) = service(backend.clone(), defaults);
    tokio::spawn(service.run());

    client.toggle_create_mode().await.unwrap();
    client.create_node_at(3.0, 4.0).await.unwrap();
    client
        .create_relationship(NodeRef::Real(EntityId(21)), NodeRef::Real(EntityId(21)), None, Properties::new())
        .await
        .unwrap();

    let cypher = backend.cypher_log();
    assert!(cypher[0].starts_with("CREATE (n:`Draft`)"), "{}", cypher[0]);
    assert!(cypher[1].contains("[r:`LINKS_TO`]"), "{}", cypher[1]);
}

#[tokio::test]
async fn test_closed_service_is_internal_error() {
    let backend = Arc::new(FakeGraphBackend::new());
    let (service, client, _renderer, _forms) = service(backend, CreateDefaults::default());
    drop(service);

    let err = client.toggle_create_mode().await.unwrap_err();
    assert!(matches!(err, CoreError::Internal(_)));
}
