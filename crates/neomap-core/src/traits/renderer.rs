//! Renderer and form collaborator traits

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::data::{
    entities::{Coordinates, Node, Relationship},
    errors::CoreError,
    identifiers::NodeRef,
};
use crate::services::mode::InteractionMode;
use crate::services::reconciler::Diff;

/// Placement hint accompanying a diff.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum RenderHint {
    CenterOn(NodeRef),
    PlaceAt { node: NodeRef, at: Coordinates },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// Non-fatal notification shown to the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl Notice {
    pub fn new(level: NoticeLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            at: Utc::now(),
        }
    }

    pub fn from_error(error: &CoreError) -> Self {
        let level = match error {
            CoreError::ModeViolation { .. } | CoreError::IntentInFlight { .. } => NoticeLevel::Warning,
            _ => NoticeLevel::Error,
        };
        Self::new(level, error.to_string())
    }
}

/// Draws the diagram. Receives only deltas.
pub trait DiagramRenderer: Send + Sync {
    fn apply(&self, diff: &Diff, hint: Option<RenderHint>);

    /// Create mode shows the defaults panel, browse mode hides it.
    fn mode_changed(&self, mode: InteractionMode);

    fn notify(&self, notice: &Notice);
}

/// Shows edit forms. Submissions come back to the controller as UI events.
pub trait NodeFormPresenter: Send + Sync {
    fn present_node(&self, node: &Node);

    fn present_relationship(&self, relationship: &Relationship);
}
