//! Identifier types for graph entities and intents

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Backend-assigned node identifier (Neo4j `ID(n)`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub i64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for EntityId {
    fn from(id: i64) -> Self {
        EntityId(id)
    }
}

/// Locally minted placeholder identifier for a node the backend has not confirmed yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PendingId(pub u64);

impl fmt::Display for PendingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pending-{}", self.0)
    }
}

/// Reference to a node that is either persisted or still pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeRef {
    Real(EntityId),
    Pending(PendingId),
}

impl NodeRef {
    pub fn real(&self) -> Option<EntityId> {
        match self {
            NodeRef::Real(id) => Some(*id),
            NodeRef::Pending(_) => None,
        }
    }

    pub fn pending(&self) -> Option<PendingId> {
        match self {
            NodeRef::Real(_) => None,
            NodeRef::Pending(id) => Some(*id),
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, NodeRef::Pending(_))
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeRef::Real(id) => write!(f, "{}", id),
            NodeRef::Pending(id) => write!(f, "{}", id),
        }
    }
}

impl From<EntityId> for NodeRef {
    fn from(id: EntityId) -> Self {
        NodeRef::Real(id)
    }
}

impl From<PendingId> for NodeRef {
    fn from(id: PendingId) -> Self {
        NodeRef::Pending(id)
    }
}

/// Key used by the commit pipeline to detect duplicate in-flight intents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IntentKey(pub String);

impl IntentKey {
    /// Key for an intent aimed at an existing target, e.g. `ExpandNode:5`.
    pub fn targeted(kind: impl fmt::Display, target: impl fmt::Display) -> Self {
        IntentKey(format!("{}:{}", kind, target))
    }

    /// Key for an intent without a persisted target yet.
    pub fn fresh(kind: impl fmt::Display) -> Self {
        IntentKey(format!("{}:{}", kind, Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IntentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
