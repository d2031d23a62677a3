//! Core services: intent building, commit pipeline, reconciliation, mode gating

pub mod transactions;
pub mod executor;
pub mod reconciler;
pub mod mode;
pub mod messages;
pub mod controller;
pub mod client;

// Re-exports
pub use transactions::{
    DuplicatePolicy, Intent, IntentKind, SearchQuery, Statement, TransactionBuilder,
    TransactionIntent,
};
pub use executor::{CommitTicket, QueryExecutor};
pub use reconciler::{DeferredOrigin, DeferredRelationship, Diff, GraphReconciler, GraphSnapshot, MergeOutcome};
pub use mode::{InteractionMode, ModeContext, ModeStateMachine, ModeTransition};
pub use messages::{EventOutcome, EventResponse, EventResultSender, UiEvent};
pub use controller::{BegunEvent, GraphController, PendingCommit};
pub use client::{ControllerService, GraphClient};
