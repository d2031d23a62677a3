//! Entity Factory: builds nodes and relationships from raw row data

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::data::{
    entities::{Node, Relationship},
    identifiers::{EntityId, NodeRef, PendingId},
    types::{DataPacket, Properties},
};

/// Builds entity values from whatever the backend or a form handed over.
///
/// Normalization is total: malformed labels or properties collapse to empty
/// values instead of failing. Clones share the pending-id counter, so
/// placeholders minted anywhere in the session never collide.
#[derive(Debug, Clone, Default)]
pub struct EntityFactory {
    next_pending: Arc<AtomicU64>,
}

impl EntityFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mints a placeholder id that is unique for this factory and its clones.
    pub fn mint_pending_id(&self) -> PendingId {
        PendingId(self.next_pending.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Creates a node. An absent or unusable `raw_id` yields a fresh pending node.
    pub fn create_node(
        &self,
        raw_id: Option<&DataPacket>,
        raw_labels: Option<&DataPacket>,
        raw_properties: Option<&DataPacket>,
    ) -> Node {
        let id = match raw_id.and_then(DataPacket::as_i64) {
            Some(id) => NodeRef::Real(EntityId(id)),
            None => NodeRef::Pending(self.mint_pending_id()),
        };
        Node {
            id,
            labels: Self::normalize_labels(raw_labels),
            properties: Self::normalize_properties(raw_properties),
        }
    }

    /// Creates a placeholder node from plain labels and properties.
    pub fn create_placeholder<I, S>(&self, labels: I, properties: Properties) -> Node
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Node {
            id: NodeRef::Pending(self.mint_pending_id()),
            labels: clean_labels(labels),
            properties,
        }
    }

    pub fn create_relationship(
        &self,
        rel_type: &str,
        raw_properties: Option<&DataPacket>,
        source: &Node,
        target: &Node,
    ) -> Relationship {
        Relationship {
            rel_type: rel_type.trim().to_string(),
            properties: Self::normalize_properties(raw_properties),
            source: source.id,
            target: target.id,
        }
    }

    pub fn normalize_labels(raw: Option<&DataPacket>) -> BTreeSet<String> {
        match raw {
            Some(DataPacket::Array(items)) => {
                clean_labels(items.iter().filter_map(DataPacket::as_str))
            }
            Some(DataPacket::String(single)) => clean_labels([single.as_str()]),
            _ => BTreeSet::new(),
        }
    }

    pub fn normalize_properties(raw: Option<&DataPacket>) -> Properties {
        match raw {
            Some(DataPacket::Object(obj)) => obj.clone(),
            _ => Properties::new(),
        }
    }
}

fn clean_labels<I, S>(labels: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    labels
        .into_iter()
        .map(|l| l.as_ref().trim().to_string())
        .filter(|l| !l.is_empty())
        .collect()
}
