//! UI events and the outcomes sent back over the event channel

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::data::{
    entities::{Coordinates, Node, Relationship, RelationshipKey},
    errors::CoreError,
    identifiers::{EntityId, NodeRef},
    rows::RowShape,
    types::Properties,
};
use crate::services::mode::ModeTransition;
use crate::services::reconciler::Diff;
use crate::services::transactions::SearchQuery;

/// User interactions the controller reacts to.
#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    /// Single click: load the node and open its edit form.
    NodeClick(EntityId),
    /// Double click: expand the node's neighbourhood.
    NodeDoubleClick(EntityId),
    /// Click on an edge: open its edit form from the model.
    RelationshipClick(RelationshipKey),
    CreateModeToggle,
    /// Canvas gesture in create mode.
    NodeCreateGesture { at: Coordinates },
    /// Drag from one node to another in create mode.
    RelationshipCreateGesture {
        source: NodeRef,
        target: NodeRef,
        rel_type: Option<String>,
        properties: Properties,
    },
    SearchSubmit {
        queries: Vec<SearchQuery>,
        shape: RowShape,
    },
    NodeFormSubmit(Node),
    RelationshipFormSubmit(Relationship),
}

impl UiEvent {
    pub fn name(&self) -> &'static str {
        match self {
            UiEvent::NodeClick(_) => "node_click",
            UiEvent::NodeDoubleClick(_) => "node_double_click",
            UiEvent::RelationshipClick(_) => "relationship_click",
            UiEvent::CreateModeToggle => "create_mode_toggle",
            UiEvent::NodeCreateGesture { .. } => "node_create_gesture",
            UiEvent::RelationshipCreateGesture { .. } => "relationship_create_gesture",
            UiEvent::SearchSubmit { .. } => "search_submit",
            UiEvent::NodeFormSubmit(_) => "node_form_submit",
            UiEvent::RelationshipFormSubmit(_) => "relationship_form_submit",
        }
    }
}

/// What handling an event did to the diagram.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventOutcome {
    /// A result was merged; the diff has already been rendered.
    Merged(Diff),
    ModeChanged(ModeTransition),
    /// An edit form was opened; nothing was sent.
    Presented,
    /// The relationship waits for a pending endpoint and commits once it resolves.
    Staged,
}

#[derive(Debug)]
pub enum EventResponse {
    Success(EventOutcome),
    Error(CoreError),
}

impl From<Result<EventOutcome, CoreError>> for EventResponse {
    fn from(result: Result<EventOutcome, CoreError>) -> Self {
        match result {
            Ok(outcome) => EventResponse::Success(outcome),
            Err(e) => EventResponse::Error(e),
        }
    }
}

#[derive(Debug)]
pub struct EventResultSender {
    pub sender: oneshot::Sender<EventResponse>,
}
