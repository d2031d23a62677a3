//! Core data structures for the graph explorer

pub mod types;
pub mod identifiers;
pub mod entities;
pub mod rows;
pub mod errors;

// Re-export all common types
pub use types::{DataPacket, Properties};
pub use identifiers::{EntityId, PendingId, NodeRef, IntentKey};
pub use entities::{Node, Relationship, RelationshipKey, Coordinates};
pub use rows::{Row, RowSet, RowShape, ShapedRow};
pub use errors::{CoreError, BackendError};
