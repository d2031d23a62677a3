use std::sync::Arc;

use anyhow::Context;

use neomap_core::{
    config::NeomapConfig,
    services::{ControllerService, EventOutcome, GraphController, TransactionBuilder},
    test_utils::fakes::{node_row, triple_row, FakeGraphBackend, RecordingFormPresenter, RecordingRenderer},
    traits::GraphBackend,
    EntityId, NodeRef, Properties,
};

/// Walks through browse and create interactions against a scripted backend, or
/// against the configured Neo4j endpoint when started with `--live`.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    neomap_core::init_tracing();

    let config = NeomapConfig::from_env().context("loading configuration")?;
    let live = std::env::args().any(|arg| arg == "--live");

    let backend: Arc<dyn GraphBackend> = if live {
        live_backend(&config)?
    } else {
        let fake = FakeGraphBackend::new();
        fake.push_rows(vec![triple_row(5, "KNOWS", 6, 5), triple_row(5, "WORKS_AT", 7, 5)]);
        fake.push_rows(vec![node_row(100, &config.defaults.labels.iter().map(String::as_str).collect::<Vec<_>>(), &[])]);
        fake.push_rows(vec![triple_row(100, &config.defaults.relationship_type, 5, 100)]);
        Arc::new(fake)
    };

    let renderer = Arc::new(RecordingRenderer::new());
    let forms = Arc::new(RecordingFormPresenter::new());
    let controller = GraphController::new(
        backend,
        renderer.clone(),
        forms.clone(),
        TransactionBuilder::new(config.defaults.clone()),
    );

    let (service, client) = ControllerService::channel(controller, 100);
    let service_handle = tokio::spawn(async move {
        if let Err(e) = service.run().await {
            tracing::error!("Controller service error: {:?}", e);
        }
    });

    tracing::info!(live, "Neomap core started");

    match client.expand_node(EntityId(5)).await {
        Ok(EventOutcome::Merged(diff)) => tracing::info!(
            added_nodes = diff.added_nodes.len(),
            added_relationships = diff.added_relationships.len(),
            "Expanded node 5"
        ),
        Ok(other) => tracing::info!(outcome = ?other, "Unexpected expand outcome"),
        Err(e) => tracing::error!("Expand failed: {}", e),
    }

    client.toggle_create_mode().await?;
    let created = match client.create_node_at(120.0, 80.0).await {
        Ok(EventOutcome::Merged(diff)) => diff.added_nodes.first().and_then(|n| n.real_id()),
        Ok(_) => None,
        Err(e) => {
            tracing::error!("Create failed: {}", e);
            None
        }
    };

    if let Some(id) = created {
        let result = client
            .create_relationship(NodeRef::Real(id), NodeRef::Real(EntityId(5)), None, Properties::new())
            .await;
        match result {
            Ok(_) => tracing::info!(source = %id, "Linked created node to node 5"),
            Err(e) => tracing::error!("Relationship create failed: {}", e),
        }
    }
    client.toggle_create_mode().await?;

    tracing::info!(
        render_calls = renderer.calls().len(),
        forms_opened = forms.presented_nodes().len(),
        "Demo finished"
    );

    drop(client);
    let _ = service_handle.await;
    Ok(())
}

#[cfg(feature = "adapters")]
fn live_backend(config: &NeomapConfig) -> anyhow::Result<Arc<dyn GraphBackend>> {
    let backend = neomap_core::adapters::Neo4jHttpBackend::new(config.backend.clone())
        .context("creating the Neo4j HTTP backend")?;
    Ok(Arc::new(backend))
}

#[cfg(not(feature = "adapters"))]
fn live_backend(_config: &NeomapConfig) -> anyhow::Result<Arc<dyn GraphBackend>> {
    anyhow::bail!("--live needs the `adapters` feature")
}
