//! Error types for the graph explorer core

use thiserror::Error;

use crate::data::identifiers::{IntentKey, NodeRef};
use crate::services::mode::InteractionMode;
use crate::services::transactions::IntentKind;

/// Classified failure reported by a graph backend.
///
/// A backend either returns a complete row-set or one of these; partial row-sets
/// are never surfaced.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    #[error("Graph backend connection error: {0}")]
    Connection(String),
    #[error("Graph backend request timed out: {0}")]
    Timeout(String),
    #[error("Graph query rejected [{code}]: {message}")]
    Query { code: String, message: String },
    #[error("Malformed backend response: {0}")]
    Malformed(String),
}

/// Base error type for core operations.
///
/// `Clone` because a single commit outcome is fanned out to every coalesced caller.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    #[error("Commit failed for intent {key}: {source}")]
    CommitFailure {
        key: IntentKey,
        #[source]
        source: BackendError,
    },

    #[error("Stale result discarded for intent {key}")]
    StaleResultDiscarded { key: IntentKey },

    #[error("Relationship endpoint {endpoint} has not been persisted yet")]
    UnresolvedEndpoint { endpoint: NodeRef },

    #[error("Invalid intent: {0}")]
    InvalidIntent(String),

    #[error("Intent {key} is already in flight")]
    IntentInFlight { key: IntentKey },

    #[error("{kind} is not permitted in {mode} mode, switch to {} mode first", .kind.required_mode())]
    ModeViolation {
        kind: IntentKind,
        mode: InteractionMode,
    },

    #[error("Row {row} does not match the {shape} shape: {message}")]
    ShapeMismatch {
        shape: &'static str,
        row: usize,
        message: String,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal system error: {0}")]
    Internal(String),
}

impl CoreError {
    pub fn commit_failure(key: &IntentKey, source: BackendError) -> Self {
        CoreError::CommitFailure {
            key: key.clone(),
            source,
        }
    }

    pub fn shape_mismatch(shape: &'static str, row: usize, message: impl Into<String>) -> Self {
        CoreError::ShapeMismatch {
            shape,
            row,
            message: message.into(),
        }
    }

    /// Stale drops are expected during mode switches and are not shown to the user.
    pub fn is_user_visible(&self) -> bool {
        !matches!(self, CoreError::StaleResultDiscarded { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::identifiers::PendingId;

    #[test]
    fn test_commit_failure_display() {
        let error = CoreError::commit_failure(
            &IntentKey("ExpandNode:5".to_string()),
            BackendError::Connection("refused".into()),
        );
        assert_eq!(
            format!("{}", error),
            "Commit failed for intent ExpandNode:5: Graph backend connection error: refused"
        );
        assert!(error.is_user_visible());
    }

    #[test]
    fn test_error_source_chain() {
        use std::error::Error as _;

        let error = CoreError::commit_failure(
            &IntentKey("FetchNode:1".to_string()),
            BackendError::Query {
                code: "Neo.ClientError.Statement.SyntaxError".into(),
                message: "bad".into(),
            },
        );
        let source = error.source().expect("commit failures carry their backend cause");
        assert!(source.to_string().contains("SyntaxError"));
    }

    #[test]
    fn test_stale_is_silent() {
        let error = CoreError::StaleResultDiscarded {
            key: IntentKey("CreateNode:x".to_string()),
        };
        assert!(!error.is_user_visible());
    }

    #[test]
    fn test_unresolved_endpoint_display() {
        let error = CoreError::UnresolvedEndpoint {
            endpoint: NodeRef::Pending(PendingId(4)),
        };
        assert_eq!(
            error.to_string(),
            "Relationship endpoint pending-4 has not been persisted yet"
        );
    }
}
