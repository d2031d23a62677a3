//! Channel client for UI events and the service loop that drives the controller

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, info_span, Instrument};

use crate::data::{
    entities::{Coordinates, Node, Relationship, RelationshipKey},
    errors::CoreError,
    identifiers::{EntityId, NodeRef},
    rows::RowShape,
    types::Properties,
};
use crate::services::controller::{BegunEvent, GraphController};
use crate::services::messages::{EventOutcome, EventResponse, EventResultSender, UiEvent};
use crate::services::transactions::SearchQuery;

/// Client side of the UI event channel.
///
/// Events are handled in the order they are sent; their results may arrive in any order.
#[derive(Clone)]
pub struct GraphClient {
    event_tx: mpsc::Sender<(UiEvent, EventResultSender)>,
}

impl GraphClient {
    pub fn new(event_tx: mpsc::Sender<(UiEvent, EventResultSender)>) -> Self {
        GraphClient { event_tx }
    }

    /// Sends an event and awaits its outcome.
    pub async fn dispatch(&self, event: UiEvent) -> Result<EventOutcome, CoreError> {
        let (response_tx, response_rx) = oneshot::channel();

        self.event_tx
            .send((event, EventResultSender { sender: response_tx }))
            .await
            .map_err(|_| CoreError::Internal("Event channel closed".to_string()))?;

        let response = response_rx
            .await
            .map_err(|_| CoreError::Internal("Event response channel closed by service".to_string()))?;

        match response {
            EventResponse::Success(outcome) => Ok(outcome),
            EventResponse::Error(err) => Err(err),
        }
    }

    pub async fn click_node(&self, id: EntityId) -> Result<EventOutcome, CoreError> {
        self.dispatch(UiEvent::NodeClick(id)).await
    }

    pub async fn expand_node(&self, id: EntityId) -> Result<EventOutcome, CoreError> {
        self.dispatch(UiEvent::NodeDoubleClick(id)).await
    }

    pub async fn click_relationship(&self, key: RelationshipKey) -> Result<EventOutcome, CoreError> {
        self.dispatch(UiEvent::RelationshipClick(key)).await
    }

    pub async fn toggle_create_mode(&self) -> Result<EventOutcome, CoreError> {
        self.dispatch(UiEvent::CreateModeToggle).await
    }

    pub async fn create_node_at(&self, x: f64, y: f64) -> Result<EventOutcome, CoreError> {
        self.dispatch(UiEvent::NodeCreateGesture {
            at: Coordinates { x, y },
        })
        .await
    }

    pub async fn create_relationship(
        &self,
        source: NodeRef,
        target: NodeRef,
        rel_type: Option<String>,
        properties: Properties,
    ) -> Result<EventOutcome, CoreError> {
        self.dispatch(UiEvent::RelationshipCreateGesture {
            source,
            target,
            rel_type,
            properties,
        })
        .await
    }

    pub async fn search(&self, queries: Vec<SearchQuery>, shape: RowShape) -> Result<EventOutcome, CoreError> {
        self.dispatch(UiEvent::SearchSubmit { queries, shape }).await
    }

    pub async fn submit_node_form(&self, node: Node) -> Result<EventOutcome, CoreError> {
        self.dispatch(UiEvent::NodeFormSubmit(node)).await
    }

    pub async fn submit_relationship_form(&self, relationship: Relationship) -> Result<EventOutcome, CoreError> {
        self.dispatch(UiEvent::RelationshipFormSubmit(relationship)).await
    }
}

/// Service loop feeding the channel's events to a [`GraphController`].
pub struct ControllerService {
    controller: GraphController,
    event_rx: mpsc::Receiver<(UiEvent, EventResultSender)>,
}

impl ControllerService {
    pub fn new(controller: GraphController, event_rx: mpsc::Receiver<(UiEvent, EventResultSender)>) -> Self {
        Self { controller, event_rx }
    }

    /// Creates a service and a client connected to it.
    pub fn channel(controller: GraphController, buffer: usize) -> (Self, GraphClient) {
        let (event_tx, event_rx) = mpsc::channel(buffer);
        (Self::new(controller, event_rx), GraphClient::new(event_tx))
    }

    /// Processes events until every client is dropped.
    ///
    /// `begin` runs inline so registration order follows arrival order; the
    /// awaiting half of each event runs in its own task.
    pub async fn run(mut self) -> Result<(), CoreError> {
        info!("ControllerService started");
        while let Some((event, sender)) = self.event_rx.recv().await {
            let event_name = event.name();
            match self.controller.begin(event) {
                Ok(BegunEvent::Done(outcome)) => {
                    let _ = sender.sender.send(EventResponse::Success(outcome));
                }
                Ok(BegunEvent::Commit(pending)) => {
                    let controller = self.controller.clone();
                    let span = info_span!("event", event = event_name, key = %pending.intent().key);
                    tokio::spawn(
                        async move {
                            let result = controller.finish(pending).await;
                            // The client may have stopped waiting.
                            let _ = sender.sender.send(result.into());
                        }
                        .instrument(span),
                    );
                }
                Err(e) => {
                    debug!(event = event_name, error = %e, "Event rejected");
                    let _ = sender.sender.send(EventResponse::Error(e));
                }
            }
        }

        info!("ControllerService channel closed, shutting down");
        Ok(())
    }
}
