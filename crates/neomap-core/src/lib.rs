//! Neomap: the consistency core of an interactive Neo4j graph explorer.
//!
//! UI events become keyed Cypher batches, batches are committed with at most one
//! in flight per key, and the returned rows are reconciled into an in-memory graph
//! model that emits minimal diffs for a renderer.

// Core modules
pub mod config;
pub mod data;
pub mod factory;
pub mod traits;
pub mod services;

// Implementation adapters (optional, can be provided externally)
#[cfg(feature = "adapters")]
pub mod adapters;

// Fakes for tests and the demo binary
#[cfg(any(test, feature = "mocks"))]
pub mod test_utils;

// Re-export key types for convenient usage
pub use config::{BackendConfig, CreateDefaults, NeomapConfig};
pub use data::errors::{BackendError, CoreError};
pub use data::identifiers::{EntityId, IntentKey, NodeRef, PendingId};
pub use data::types::{DataPacket, Properties};
pub use data::entities::{Coordinates, Node, Relationship, RelationshipKey};
pub use data::rows::{Row, RowSet, RowShape, ShapedRow};
pub use factory::EntityFactory;

// Re-export core traits
pub use traits::{DiagramRenderer, GraphBackend, NodeFormPresenter, Notice, NoticeLevel, RenderHint};

// Re-export core services
pub use services::{
    ControllerService, Diff, EventOutcome, GraphClient, GraphController, GraphReconciler,
    InteractionMode, ModeStateMachine, QueryExecutor, TransactionBuilder, UiEvent,
};

#[cfg(feature = "adapters")]
pub use adapters::Neo4jHttpBackend;

/// Initialize tracing for the explorer core
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();
}
