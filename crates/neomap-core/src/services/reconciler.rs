//! Graph Model Reconciler
//!
//! Owns the canonical in-memory graph and is the only place it is mutated.
//! Row-sets coming back from the commit pipeline are decoded against the shape
//! their intent declared, merged with identity resolution, and turned into a
//! [`Diff`] that carries only what changed.
//!
//! Merges are all-or-nothing: the stale check and the decoding of every row
//! happen before the model is touched, so a rejected row-set leaves the model
//! exactly as it was.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, info, instrument};

use crate::data::{
    entities::{Node, Relationship, RelationshipKey},
    errors::CoreError,
    identifiers::{EntityId, NodeRef, PendingId},
    rows::{RowSet, ShapedRow},
};
use crate::factory::EntityFactory;
use crate::services::mode::ModeContext;
use crate::services::transactions::{IntentKind, TransactionIntent};

/// Delta for the renderer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Diff {
    pub added_nodes: Vec<Node>,
    pub updated_nodes: Vec<Node>,
    pub added_relationships: Vec<Relationship>,
    pub updated_relationships: Vec<Relationship>,
    pub removed_pending_ids: Vec<PendingId>,
}

impl Diff {
    pub fn is_empty(&self) -> bool {
        self.added_nodes.is_empty()
            && self.updated_nodes.is_empty()
            && self.added_relationships.is_empty()
            && self.updated_relationships.is_empty()
            && self.removed_pending_ids.is_empty()
    }

    pub fn extend(&mut self, other: Diff) {
        self.added_nodes.extend(other.added_nodes);
        self.updated_nodes.extend(other.updated_nodes);
        self.added_relationships.extend(other.added_relationships);
        self.updated_relationships.extend(other.updated_relationships);
        self.removed_pending_ids.extend(other.removed_pending_ids);
    }
}

/// Where a deferred relationship came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeferredOrigin {
    /// Returned by the backend; it exists in the store and materializes once its
    /// endpoints are in the model.
    Observed,
    /// Drawn by the user against a placeholder; it must be committed once both
    /// endpoints are persisted.
    Staged,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeferredRelationship {
    pub relationship: Relationship,
    pub origin: DeferredOrigin,
}

/// Result of a successful merge.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeOutcome {
    pub diff: Diff,
    /// Staged relationships whose endpoints all became real; the caller commits them.
    pub released: Vec<Relationship>,
    /// Real id that replaced the intent's placeholder, for CreateNode results.
    pub promoted: Option<EntityId>,
}

/// Order-independent view of the persisted part of the model, for comparisons.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphSnapshot {
    pub nodes: BTreeMap<EntityId, Node>,
    pub relationships: BTreeMap<RelationshipKey, Relationship>,
}

/// Observed relationships kept waiting for endpoints before the oldest is dropped.
pub const DEFAULT_OBSERVED_LIMIT: usize = 1024;

#[derive(Debug, Default)]
struct GraphModel {
    nodes: HashMap<EntityId, Node>,
    placeholders: HashMap<PendingId, Node>,
    /// Placeholders already replaced by their persisted node.
    promotions: HashMap<PendingId, EntityId>,
    relationships: HashMap<RelationshipKey, Relationship>,
    deferred: Vec<DeferredRelationship>,
}

impl GraphModel {
    fn contains(&self, node: &NodeRef) -> bool {
        match node {
            NodeRef::Real(id) => self.nodes.contains_key(id),
            NodeRef::Pending(id) => {
                self.placeholders.contains_key(id)
                    || self
                        .promotions
                        .get(id)
                        .map_or(false, |real| self.nodes.contains_key(real))
            }
        }
    }

    /// Rewrites endpoints that name an already promoted placeholder.
    fn follow_promotions(&self, relationship: &mut Relationship) {
        for end in [relationship.source, relationship.target] {
            let Some(pending) = end.pending() else {
                continue;
            };
            if let Some(real) = self.promotions.get(&pending) {
                relationship.rekey(pending, *real);
            }
        }
    }

    /// Key of `relationship` if both endpoints are real and present.
    fn materializable(&self, relationship: &Relationship) -> Option<RelationshipKey> {
        relationship
            .key()
            .filter(|key| self.nodes.contains_key(&key.source) && self.nodes.contains_key(&key.target))
    }
}

/// Records which entities a merge touched, in first-touch order.
#[derive(Default)]
struct ChangeTracker {
    added_nodes: Vec<EntityId>,
    updated_nodes: Vec<EntityId>,
    added_relationships: Vec<RelationshipKey>,
    updated_relationships: Vec<RelationshipKey>,
    seen_nodes: HashSet<EntityId>,
    seen_relationships: HashSet<RelationshipKey>,
    removed_pending_ids: Vec<PendingId>,
}

impl ChangeTracker {
    fn node_added(&mut self, id: EntityId) {
        if self.seen_nodes.insert(id) {
            self.added_nodes.push(id);
        }
    }

    fn node_updated(&mut self, id: EntityId) {
        if self.seen_nodes.insert(id) {
            self.updated_nodes.push(id);
        }
    }

    fn relationship_added(&mut self, key: RelationshipKey) {
        if self.seen_relationships.insert(key.clone()) {
            self.added_relationships.push(key);
        }
    }

    fn relationship_updated(&mut self, key: RelationshipKey) {
        if self.seen_relationships.insert(key.clone()) {
            self.updated_relationships.push(key);
        }
    }

    fn into_diff(self, model: &GraphModel) -> Diff {
        let node = |id: &EntityId| model.nodes.get(id).cloned();
        let rel = |key: &RelationshipKey| model.relationships.get(key).cloned();
        Diff {
            added_nodes: self.added_nodes.iter().filter_map(node).collect(),
            updated_nodes: self.updated_nodes.iter().filter_map(node).collect(),
            added_relationships: self.added_relationships.iter().filter_map(rel).collect(),
            updated_relationships: self.updated_relationships.iter().filter_map(rel).collect(),
            removed_pending_ids: self.removed_pending_ids,
        }
    }
}

/// Owner of the graph model.
#[derive(Debug)]
pub struct GraphReconciler {
    model: GraphModel,
    factory: EntityFactory,
    observed_limit: usize,
}

impl Default for GraphReconciler {
    fn default() -> Self {
        Self::new(EntityFactory::default())
    }
}

impl GraphReconciler {
    pub fn new(factory: EntityFactory) -> Self {
        Self {
            model: GraphModel::default(),
            factory,
            observed_limit: DEFAULT_OBSERVED_LIMIT,
        }
    }

    /// Caps how many observed relationships may wait for their endpoints.
    pub fn with_observed_limit(mut self, limit: usize) -> Self {
        self.observed_limit = limit;
        self
    }

    pub fn factory(&self) -> &EntityFactory {
        &self.factory
    }

    /// Merges the rows returned for `intent`.
    ///
    /// Rows for an intent issued under a mode context other than `current` are
    /// discarded with `StaleResultDiscarded`.
    #[instrument(skip(self, rows, intent), fields(key = %intent.key, kind = %intent.kind, rows = rows.len()))]
    pub fn merge(
        &mut self,
        rows: &RowSet,
        intent: &TransactionIntent,
        current: ModeContext,
    ) -> Result<MergeOutcome, CoreError> {
        if intent.context != current {
            debug!(issued = ?intent.context, current = ?current, "Discarding stale result");
            return Err(CoreError::StaleResultDiscarded {
                key: intent.key.clone(),
            });
        }

        let shaped = intent.shape.decode_all(rows, &self.factory)?;

        let promotion = match (intent.kind, intent.origin) {
            (IntentKind::CreateNode, Some(pending)) => {
                let created = shaped
                    .iter()
                    .find_map(|row| match row {
                        ShapedRow::Node(node) => node.real_id(),
                        _ => None,
                    })
                    .ok_or_else(|| {
                        CoreError::shape_mismatch(intent.shape.name(), 0, "create returned no node")
                    })?;
                Some((pending, created))
            }
            _ => None,
        };

        let authoritative = matches!(
            intent.kind,
            IntentKind::MergeNodeEdit | IntentKind::MergeRelationshipEdit
        );
        let mut tracker = ChangeTracker::default();

        for row in shaped {
            match row {
                ShapedRow::Node(node) => self.upsert_node(node, authoritative, &mut tracker),
                ShapedRow::Triple {
                    source,
                    relationship,
                    target,
                } => {
                    self.upsert_node(source, false, &mut tracker);
                    self.upsert_node(target, false, &mut tracker);
                    self.admit_observed(relationship, authoritative, &mut tracker);
                }
                ShapedRow::Relationship(relationship) => {
                    self.admit_observed(relationship, authoritative, &mut tracker)
                }
            }
        }

        if let Some((pending, real)) = promotion {
            self.promote(pending, real, &mut tracker);
        }

        let released = self.resolve_deferred(&mut tracker);
        let diff = tracker.into_diff(&self.model);

        info!(
            added_nodes = diff.added_nodes.len(),
            updated_nodes = diff.updated_nodes.len(),
            added_relationships = diff.added_relationships.len(),
            removed_pending = diff.removed_pending_ids.len(),
            released = released.len(),
            "Merged row-set"
        );

        Ok(MergeOutcome {
            diff,
            released,
            promoted: promotion.map(|(_, real)| real),
        })
    }

    /// Shows an optimistic placeholder before its CreateNode commit resolves.
    pub fn insert_placeholder(&mut self, node: Node) -> Result<Diff, CoreError> {
        let pending = node.id.pending().ok_or_else(|| {
            CoreError::InvalidIntent(format!("node {} is not a placeholder", node.id))
        })?;
        debug!(pending = %pending, "Inserting placeholder");
        self.model.placeholders.insert(pending, node.clone());
        Ok(Diff {
            added_nodes: vec![node],
            ..Diff::default()
        })
    }

    /// Holds a user-drawn relationship until its pending endpoints are persisted.
    ///
    /// Endpoints naming a placeholder that was promoted in the meantime are
    /// rewritten to the real node. If that leaves nothing pending, the
    /// relationship is handed back for an immediate commit instead of staged.
    pub fn stage_relationship(&mut self, mut relationship: Relationship) -> Result<Option<Relationship>, CoreError> {
        self.model.follow_promotions(&mut relationship);
        if relationship.key().is_some() {
            debug!(rel_type = %relationship.rel_type, "Endpoints already persisted, not staging");
            return Ok(Some(relationship));
        }
        for end in [relationship.source, relationship.target] {
            if !self.model.contains(&end) {
                return Err(CoreError::InvalidIntent(format!(
                    "relationship endpoint {} is not on the diagram",
                    end
                )));
            }
        }
        debug!(
            rel_type = %relationship.rel_type,
            source = %relationship.source,
            target = %relationship.target,
            "Staging relationship behind pending endpoint"
        );
        self.model.deferred.push(DeferredRelationship {
            relationship,
            origin: DeferredOrigin::Staged,
        });
        Ok(None)
    }

    /// Undoes the optimistic part of an intent whose commit failed or went stale.
    pub fn rollback(&mut self, intent: &TransactionIntent) -> Diff {
        match intent.origin {
            Some(pending) => self.discard_placeholder(pending),
            None => Diff::default(),
        }
    }

    /// Removes a placeholder and every staged relationship that depended on it.
    pub fn discard_placeholder(&mut self, pending: PendingId) -> Diff {
        let mut diff = Diff::default();
        if self.model.placeholders.remove(&pending).is_some() {
            debug!(pending = %pending, "Discarded placeholder");
            diff.removed_pending_ids.push(pending);
        }
        self.model
            .deferred
            .retain(|entry| !entry.relationship.references(pending));
        diff
    }

    /// Clears the whole model.
    pub fn reset(&mut self) {
        info!("Resetting graph model");
        self.model = GraphModel::default();
    }

    pub fn node(&self, id: EntityId) -> Option<&Node> {
        self.model.nodes.get(&id)
    }

    pub fn placeholder(&self, id: PendingId) -> Option<&Node> {
        self.model.placeholders.get(&id)
    }

    /// Looks a node up by either kind of reference. A promoted placeholder
    /// resolves to the node that replaced it.
    pub fn resolve(&self, node: &NodeRef) -> Option<&Node> {
        match node {
            NodeRef::Real(id) => self.node(*id),
            NodeRef::Pending(id) => self
                .placeholder(*id)
                .or_else(|| self.promoted(*id).and_then(|real| self.node(real))),
        }
    }

    /// Real id that replaced the placeholder `pending`, once its create resolved.
    pub fn promoted(&self, pending: PendingId) -> Option<EntityId> {
        self.model.promotions.get(&pending).copied()
    }

    pub fn relationship(&self, key: &RelationshipKey) -> Option<&Relationship> {
        self.model.relationships.get(key)
    }

    pub fn node_count(&self) -> usize {
        self.model.nodes.len()
    }

    pub fn placeholder_count(&self) -> usize {
        self.model.placeholders.len()
    }

    pub fn relationship_count(&self) -> usize {
        self.model.relationships.len()
    }

    pub fn deferred(&self) -> &[DeferredRelationship] {
        &self.model.deferred
    }

    pub fn snapshot(&self) -> GraphSnapshot {
        GraphSnapshot {
            nodes: self.model.nodes.iter().map(|(k, v)| (*k, v.clone())).collect(),
            relationships: self
                .model
                .relationships
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }

    fn upsert_node(&mut self, node: Node, authoritative: bool, tracker: &mut ChangeTracker) {
        let Some(id) = node.real_id() else {
            return;
        };
        match self.model.nodes.get_mut(&id) {
            Some(existing) => {
                let changed = if authoritative {
                    existing.overwrite(&node)
                } else {
                    existing.absorb(&node)
                };
                if changed {
                    tracker.node_updated(id);
                }
            }
            None => {
                self.model.nodes.insert(id, node);
                tracker.node_added(id);
            }
        }
    }

    fn admit_observed(&mut self, relationship: Relationship, authoritative: bool, tracker: &mut ChangeTracker) {
        match self.model.materializable(&relationship) {
            Some(key) => self.materialize(key, relationship, authoritative, tracker),
            None => {
                let duplicate = self.model.deferred.iter_mut().find(|entry| {
                    entry.origin == DeferredOrigin::Observed
                        && entry.relationship.rel_type == relationship.rel_type
                        && entry.relationship.source == relationship.source
                        && entry.relationship.target == relationship.target
                });
                match duplicate {
                    Some(entry) => {
                        entry.relationship.absorb(&relationship);
                    }
                    None => {
                        self.model.deferred.push(DeferredRelationship {
                            relationship,
                            origin: DeferredOrigin::Observed,
                        });
                        self.prune_observed();
                    }
                }
            }
        }
    }

    /// Drops the oldest observed entries beyond the limit. Staged entries are
    /// user edits and are never pruned.
    fn prune_observed(&mut self) {
        let observed = self
            .model
            .deferred
            .iter()
            .filter(|entry| entry.origin == DeferredOrigin::Observed)
            .count();
        let mut excess = observed.saturating_sub(self.observed_limit);
        if excess == 0 {
            return;
        }
        debug!(excess, limit = self.observed_limit, "Pruning observed relationships");
        self.model.deferred.retain(|entry| {
            if excess > 0 && entry.origin == DeferredOrigin::Observed {
                excess -= 1;
                false
            } else {
                true
            }
        });
    }

    fn materialize(
        &mut self,
        key: RelationshipKey,
        relationship: Relationship,
        authoritative: bool,
        tracker: &mut ChangeTracker,
    ) {
        match self.model.relationships.get_mut(&key) {
            Some(existing) => {
                let changed = if authoritative {
                    let changed = existing.properties != relationship.properties;
                    existing.properties = relationship.properties;
                    changed
                } else {
                    existing.absorb(&relationship)
                };
                if changed {
                    tracker.relationship_updated(key);
                }
            }
            None => {
                self.model.relationships.insert(key.clone(), relationship);
                tracker.relationship_added(key);
            }
        }
    }

    /// Replaces the placeholder `pending` by the persisted node `real` and re-keys
    /// deferred relationships that pointed at it.
    fn promote(&mut self, pending: PendingId, real: EntityId, tracker: &mut ChangeTracker) {
        if self.model.placeholders.remove(&pending).is_some() {
            tracker.removed_pending_ids.push(pending);
        }
        self.model.promotions.insert(pending, real);
        let mut rekeyed = 0;
        for entry in &mut self.model.deferred {
            if entry.relationship.rekey(pending, real) {
                rekeyed += 1;
            }
        }
        debug!(pending = %pending, real = %real, rekeyed, "Promoted placeholder");
    }

    /// Re-evaluates the deferred queue: observed relationships whose endpoints are
    /// now present materialize, staged ones whose endpoints are now real are released.
    fn resolve_deferred(&mut self, tracker: &mut ChangeTracker) -> Vec<Relationship> {
        let mut released = Vec::new();
        let pending = std::mem::take(&mut self.model.deferred);

        for entry in pending {
            let Some(key) = self.model.materializable(&entry.relationship) else {
                self.model.deferred.push(entry);
                continue;
            };
            match entry.origin {
                DeferredOrigin::Observed => {
                    self.materialize(key, entry.relationship, false, tracker)
                }
                DeferredOrigin::Staged if self.model.relationships.contains_key(&key) => {
                    debug!(key = %key, "Staged relationship already exists, dropping");
                }
                DeferredOrigin::Staged => released.push(entry.relationship),
            }
        }
        released
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::types::Properties;
    use crate::services::mode::ModeStateMachine;
    use crate::services::transactions::{Intent, TransactionBuilder};
    use crate::test_utils::fakes::{node_row, relationship_row, triple_row};
    use pretty_assertions::assert_eq;

    fn build(intent: Intent, context: ModeContext) -> TransactionIntent {
        TransactionBuilder::default().build(intent, context).unwrap()
    }

    #[test]
    fn test_merge_adds_then_updates_only_on_change() {
        let modes = ModeStateMachine::new();
        let mut reconciler = GraphReconciler::default();
        let fetch = build(Intent::FetchNode(EntityId(1)), modes.context());

        let first = reconciler
            .merge(&vec![node_row(1, &["Person"], &[("name", "Ann")])], &fetch, modes.context())
            .unwrap();
        assert_eq!(first.diff.added_nodes.len(), 1);

        let same = reconciler
            .merge(&vec![node_row(1, &["Person"], &[("name", "Ann")])], &fetch, modes.context())
            .unwrap();
        assert!(same.diff.is_empty());

        let changed = reconciler
            .merge(&vec![node_row(1, &["Person"], &[("name", "Anna")])], &fetch, modes.context())
            .unwrap();
        assert_eq!(changed.diff.updated_nodes.len(), 1);
        assert_eq!(reconciler.node_count(), 1);
    }

    #[test]
    fn test_node_seen_in_many_rows_is_reported_once() {
        let modes = ModeStateMachine::new();
        let mut reconciler = GraphReconciler::default();
        let expand = build(Intent::ExpandNode(EntityId(1)), modes.context());

        let outcome = reconciler
            .merge(
                &vec![triple_row(1, "KNOWS", 2, 1), triple_row(1, "KNOWS", 3, 1)],
                &expand,
                modes.context(),
            )
            .unwrap();

        let mut ids: Vec<_> = outcome.diff.added_nodes.iter().filter_map(Node::real_id).collect();
        ids.sort();
        assert_eq!(ids, vec![EntityId(1), EntityId(2), EntityId(3)]);
        assert_eq!(outcome.diff.added_relationships.len(), 2);
    }

    #[test]
    fn test_shape_mismatch_leaves_model_untouched() {
        let modes = ModeStateMachine::new();
        let mut reconciler = GraphReconciler::default();
        let fetch = build(Intent::FetchNode(EntityId(1)), modes.context());

        let mut broken = node_row(2, &[], &[]);
        broken.remove("_id");
        let err = reconciler
            .merge(&vec![node_row(1, &[], &[]), broken], &fetch, modes.context())
            .unwrap_err();

        assert!(matches!(err, CoreError::ShapeMismatch { row: 1, .. }));
        assert_eq!(reconciler.node_count(), 0);
    }

    #[test]
    fn test_stale_context_is_discarded() {
        let mut modes = ModeStateMachine::new();
        let mut reconciler = GraphReconciler::default();
        let fetch = build(Intent::FetchNode(EntityId(1)), modes.context());
        modes.toggle();

        let err = reconciler
            .merge(&vec![node_row(1, &[], &[])], &fetch, modes.context())
            .unwrap_err();
        assert!(matches!(err, CoreError::StaleResultDiscarded { .. }));
        assert_eq!(reconciler.node_count(), 0);
    }

    #[test]
    fn test_merge_edit_is_authoritative() {
        let modes = ModeStateMachine::new();
        let mut reconciler = GraphReconciler::default();
        let fetch = build(Intent::FetchNode(EntityId(1)), modes.context());
        reconciler
            .merge(&vec![node_row(1, &["Person"], &[("name", "Ann"), ("city", "Oslo")])], &fetch, modes.context())
            .unwrap();

        let edited = reconciler.node(EntityId(1)).cloned().unwrap();
        let edit = build(Intent::MergeNodeEdit { node: edited }, modes.context());
        let outcome = reconciler
            .merge(&vec![node_row(1, &["Person"], &[("name", "Ann")])], &edit, modes.context())
            .unwrap();

        assert_eq!(outcome.diff.updated_nodes.len(), 1);
        assert!(!reconciler.node(EntityId(1)).unwrap().properties.contains_key("city"));
    }

    #[test]
    fn test_observed_relationship_waits_for_its_nodes() {
        let modes = ModeStateMachine::new();
        let mut reconciler = GraphReconciler::default();
        let search = build(
            Intent::Search {
                queries: vec![crate::services::transactions::SearchQuery {
                    cypher: "MATCH (a)-[r]->(b) RETURN r, type(r) AS _rtype, ID(a) AS _rstart, ID(b) AS _rend".into(),
                    parameters: Properties::new(),
                }],
                shape: crate::data::rows::RowShape::Relationship,
            },
            modes.context(),
        );

        let outcome = reconciler
            .merge(&vec![relationship_row(1, "OWNS", 2)], &search, modes.context())
            .unwrap();
        assert!(outcome.diff.added_relationships.is_empty());
        assert_eq!(reconciler.deferred().len(), 1);

        let fetch_1 = build(Intent::FetchNode(EntityId(1)), modes.context());
        reconciler.merge(&vec![node_row(1, &[], &[])], &fetch_1, modes.context()).unwrap();
        assert_eq!(reconciler.relationship_count(), 0);

        let fetch_2 = build(Intent::FetchNode(EntityId(2)), modes.context());
        let outcome = reconciler
            .merge(&vec![node_row(2, &[], &[])], &fetch_2, modes.context())
            .unwrap();
        assert_eq!(outcome.diff.added_relationships.len(), 1);
        assert!(reconciler.deferred().is_empty());
        assert!(outcome.released.is_empty(), "Observed relationships are never re-committed");
    }

    #[test]
    fn test_stage_requires_endpoints_on_diagram() {
        let mut reconciler = GraphReconciler::default();
        let factory = reconciler.factory().clone();
        let ghost = factory.create_placeholder(["Ghost"], Properties::new());
        let other = factory.create_placeholder(["Other"], Properties::new());
        let rel = factory.create_relationship("KNOWS", None, &ghost, &other);

        assert!(matches!(
            reconciler.stage_relationship(rel),
            Err(CoreError::InvalidIntent(_))
        ));
    }

    #[test]
    fn test_discard_placeholder_drops_staged_relationships() {
        let modes = ModeStateMachine::new();
        let mut reconciler = GraphReconciler::default();
        let fetch = build(Intent::FetchNode(EntityId(1)), modes.context());
        reconciler.merge(&vec![node_row(1, &[], &[])], &fetch, modes.context()).unwrap();

        let factory = reconciler.factory().clone();
        let placeholder = factory.create_placeholder(["Draft"], Properties::new());
        let pending = placeholder.id.pending().unwrap();
        let existing = reconciler.node(EntityId(1)).cloned().unwrap();
        reconciler.insert_placeholder(placeholder.clone()).unwrap();
        reconciler
            .stage_relationship(factory.create_relationship("KNOWS", None, &existing, &placeholder))
            .unwrap();

        let diff = reconciler.discard_placeholder(pending);
        assert_eq!(diff.removed_pending_ids, vec![pending]);
        assert!(reconciler.deferred().is_empty());
        assert_eq!(reconciler.placeholder_count(), 0);
    }

    #[test]
    fn test_promoted_placeholder_still_resolves() {
        let mut modes = ModeStateMachine::new();
        let mut reconciler = GraphReconciler::default();
        let fetch = build(Intent::FetchNode(EntityId(1)), modes.context());
        reconciler.merge(&vec![node_row(1, &[], &[])], &fetch, modes.context()).unwrap();

        modes.toggle();
        let factory = reconciler.factory().clone();
        let placeholder = factory.create_placeholder(["Draft"], Properties::new());
        let pending = placeholder.id.pending().unwrap();
        reconciler.insert_placeholder(placeholder.clone()).unwrap();
        let create = build(Intent::CreateNode { placeholder: placeholder.clone() }, modes.context());
        reconciler.merge(&vec![node_row(2, &["Draft"], &[])], &create, modes.context()).unwrap();

        assert!(reconciler.placeholder(pending).is_none());
        assert_eq!(reconciler.promoted(pending), Some(EntityId(2)));
        let resolved = reconciler.resolve(&NodeRef::Pending(pending)).unwrap();
        assert_eq!(resolved.real_id(), Some(EntityId(2)));

        // A relationship drawn against the old placeholder is handed back, not staged.
        let existing = reconciler.node(EntityId(1)).cloned().unwrap();
        let ready = reconciler
            .stage_relationship(factory.create_relationship("KNOWS", None, &existing, &placeholder))
            .unwrap()
            .unwrap();
        assert_eq!(ready.target, NodeRef::Real(EntityId(2)));
        assert!(reconciler.deferred().is_empty());

        reconciler.reset();
        assert_eq!(reconciler.promoted(pending), None);
    }

    #[test]
    fn test_observed_queue_drops_oldest_beyond_limit() {
        let modes = ModeStateMachine::new();
        let mut reconciler = GraphReconciler::default().with_observed_limit(2);
        let search = build(
            Intent::Search {
                queries: vec![crate::services::transactions::SearchQuery {
                    cypher: "MATCH (a)-[r]->(b) RETURN r, type(r) AS _rtype, ID(a) AS _rstart, ID(b) AS _rend".into(),
                    parameters: Properties::new(),
                }],
                shape: crate::data::rows::RowShape::Relationship,
            },
            modes.context(),
        );

        reconciler
            .merge(
                &vec![
                    relationship_row(1, "OWNS", 2),
                    relationship_row(3, "OWNS", 4),
                    relationship_row(5, "OWNS", 6),
                ],
                &search,
                modes.context(),
            )
            .unwrap();

        let sources: Vec<NodeRef> = reconciler
            .deferred()
            .iter()
            .map(|entry| entry.relationship.source)
            .collect();
        assert_eq!(sources, vec![NodeRef::Real(EntityId(3)), NodeRef::Real(EntityId(5))]);
    }

    #[test]
    fn test_reset_clears_everything() {
        let modes = ModeStateMachine::new();
        let mut reconciler = GraphReconciler::default();
        let expand = build(Intent::ExpandNode(EntityId(1)), modes.context());
        reconciler.merge(&vec![triple_row(1, "KNOWS", 2, 1)], &expand, modes.context()).unwrap();

        reconciler.reset();
        assert_eq!(reconciler.snapshot(), GraphSnapshot::default());
    }
}
