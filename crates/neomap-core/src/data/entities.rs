//! Graph entities held by the model and handed to collaborators

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::data::identifiers::{EntityId, NodeRef, PendingId};
use crate::data::types::Properties;

/// A node of the property graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeRef,
    pub labels: BTreeSet<String>,
    pub properties: Properties,
}

impl Node {
    pub fn is_pending(&self) -> bool {
        self.id.is_pending()
    }

    pub fn real_id(&self) -> Option<EntityId> {
        self.id.real()
    }

    /// Folds `incoming` into `self`: labels are unioned, properties overlaid.
    /// Returns whether anything changed.
    pub fn absorb(&mut self, incoming: &Node) -> bool {
        let mut changed = false;
        for label in &incoming.labels {
            changed |= self.labels.insert(label.clone());
        }
        for (key, value) in &incoming.properties {
            if self.properties.get(key) != Some(value) {
                self.properties.insert(key.clone(), value.clone());
                changed = true;
            }
        }
        changed
    }

    /// Takes labels and properties wholesale from `incoming`.
    /// Returns whether anything changed.
    pub fn overwrite(&mut self, incoming: &Node) -> bool {
        if self.labels == incoming.labels && self.properties == incoming.properties {
            return false;
        }
        self.labels = incoming.labels.clone();
        self.properties = incoming.properties.clone();
        true
    }
}

/// Identity of a materialized relationship: `(type, source, target)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RelationshipKey {
    pub rel_type: String,
    pub source: EntityId,
    pub target: EntityId,
}

impl fmt::Display for RelationshipKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})-[:{}]->({})", self.source, self.rel_type, self.target)
    }
}

/// A directed, typed relationship between two nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub rel_type: String,
    pub properties: Properties,
    pub source: NodeRef,
    pub target: NodeRef,
}

impl Relationship {
    /// Dedup key, available once both endpoints are real.
    pub fn key(&self) -> Option<RelationshipKey> {
        Some(RelationshipKey {
            rel_type: self.rel_type.clone(),
            source: self.source.real()?,
            target: self.target.real()?,
        })
    }

    pub fn references(&self, pending: PendingId) -> bool {
        self.source == NodeRef::Pending(pending) || self.target == NodeRef::Pending(pending)
    }

    /// Points every endpoint that names `pending` at `real` instead.
    pub fn rekey(&mut self, pending: PendingId, real: EntityId) -> bool {
        let mut touched = false;
        for end in [&mut self.source, &mut self.target] {
            if *end == NodeRef::Pending(pending) {
                *end = NodeRef::Real(real);
                touched = true;
            }
        }
        touched
    }

    /// Overlays properties from `incoming`. Returns whether anything changed.
    pub fn absorb(&mut self, incoming: &Relationship) -> bool {
        let mut changed = false;
        for (key, value) in &incoming.properties {
            if self.properties.get(key) != Some(value) {
                self.properties.insert(key.clone(), value.clone());
                changed = true;
            }
        }
        changed
    }
}

/// Diagram coordinates of a create gesture.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub x: f64,
    pub y: f64,
}
