//! Transaction Builder: turns user intents into keyed Cypher statement batches

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::config::CreateDefaults;
use crate::data::{
    entities::{Node, Relationship},
    errors::CoreError,
    identifiers::{EntityId, IntentKey, NodeRef, PendingId},
    rows::{RowShape, node_columns, triple_columns},
    types::{DataPacket, Properties},
};
use crate::factory::EntityFactory;
use crate::services::mode::{InteractionMode, ModeContext};

/// The kinds of backend round trips the explorer issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IntentKind {
    FetchNode,
    ExpandNode,
    CreateNode,
    CreateRelationship,
    MergeNodeEdit,
    MergeRelationshipEdit,
    Search,
}

impl IntentKind {
    pub fn name(&self) -> &'static str {
        match self {
            IntentKind::FetchNode => "FetchNode",
            IntentKind::ExpandNode => "ExpandNode",
            IntentKind::CreateNode => "CreateNode",
            IntentKind::CreateRelationship => "CreateRelationship",
            IntentKind::MergeNodeEdit => "MergeNodeEdit",
            IntentKind::MergeRelationshipEdit => "MergeRelationshipEdit",
            IntentKind::Search => "Search",
        }
    }

    /// The only mode in which this kind may be issued.
    pub fn required_mode(&self) -> InteractionMode {
        match self {
            IntentKind::CreateNode | IntentKind::CreateRelationship => InteractionMode::Create,
            _ => InteractionMode::Browse,
        }
    }

    /// Reads can share one in-flight commit; writes must not be folded together.
    pub fn duplicate_policy(&self) -> DuplicatePolicy {
        match self {
            IntentKind::FetchNode | IntentKind::ExpandNode | IntentKind::Search => {
                DuplicatePolicy::Coalesce
            }
            _ => DuplicatePolicy::Reject,
        }
    }
}

impl fmt::Display for IntentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What the commit pipeline does with a second request for a key already in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DuplicatePolicy {
    Coalesce,
    Reject,
}

/// One parameterized Cypher statement, tagged with the intent that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    pub cypher: String,
    pub parameters: Properties,
    pub kind: IntentKind,
}

impl Statement {
    fn new(kind: IntentKind, cypher: impl Into<String>) -> Self {
        Self {
            cypher: cypher.into(),
            parameters: Properties::new(),
            kind,
        }
    }

    fn param(mut self, name: &str, value: impl Into<DataPacket>) -> Self {
        self.parameters.insert(name.to_string(), value.into());
        self
    }
}

/// A statement prepared by the search form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub cypher: String,
    #[serde(default)]
    pub parameters: Properties,
}

/// A user or system action that needs a backend round trip.
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    FetchNode(EntityId),
    ExpandNode(EntityId),
    /// Persist an optimistic placeholder.
    CreateNode { placeholder: Node },
    CreateRelationship { relationship: Relationship },
    MergeNodeEdit { node: Node },
    MergeRelationshipEdit { relationship: Relationship },
    Search { queries: Vec<SearchQuery>, shape: RowShape },
}

impl Intent {
    pub fn kind(&self) -> IntentKind {
        match self {
            Intent::FetchNode(_) => IntentKind::FetchNode,
            Intent::ExpandNode(_) => IntentKind::ExpandNode,
            Intent::CreateNode { .. } => IntentKind::CreateNode,
            Intent::CreateRelationship { .. } => IntentKind::CreateRelationship,
            Intent::MergeNodeEdit { .. } => IntentKind::MergeNodeEdit,
            Intent::MergeRelationshipEdit { .. } => IntentKind::MergeRelationshipEdit,
            Intent::Search { .. } => IntentKind::Search,
        }
    }
}

/// A keyed, atomic batch ready for the commit pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionIntent {
    pub key: IntentKey,
    pub kind: IntentKind,
    pub statements: Vec<Statement>,
    /// How the returned columns map to entity roles.
    pub shape: RowShape,
    pub policy: DuplicatePolicy,
    /// Placeholder this intent resolves (CreateNode only).
    pub origin: Option<PendingId>,
    /// Mode the intent was issued under; results are dropped once it is no longer current.
    pub context: ModeContext,
}

/// Builds transaction batches for intents.
#[derive(Debug, Clone, Default)]
pub struct TransactionBuilder {
    defaults: CreateDefaults,
}

impl TransactionBuilder {
    pub fn new(defaults: CreateDefaults) -> Self {
        Self { defaults }
    }

    pub fn defaults(&self) -> &CreateDefaults {
        &self.defaults
    }

    /// Optimistic placeholder for a create gesture, carrying the configured defaults.
    pub fn placeholder(&self, factory: &EntityFactory) -> Node {
        factory.create_placeholder(&self.defaults.labels, self.defaults.properties.clone())
    }

    /// Relationship type to use for a gesture, falling back to the configured default.
    pub fn relationship_type(&self, requested: Option<&str>) -> String {
        requested
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(self.defaults.relationship_type.as_str())
            .to_string()
    }

    pub fn build(&self, intent: Intent, context: ModeContext) -> Result<TransactionIntent, CoreError> {
        let kind = intent.kind();
        let mut origin = None;

        let (key, statements, shape) = match intent {
            Intent::FetchNode(id) => {
                let stmt = Statement::new(kind, format!(
                    "MATCH (n) WHERE ID(n) = $id RETURN {}",
                    node_return("n")
                ))
                .param("id", id.0);
                (IntentKey::targeted(kind, id), vec![stmt], RowShape::Node)
            }
            Intent::ExpandNode(id) => {
                let stmt = Statement::new(kind, format!(
                    "MATCH (a)-[r]-(b) WHERE ID(a) = $id RETURN {}",
                    triple_return("ID(startNode(r))")
                ))
                .param("id", id.0);
                (IntentKey::targeted(kind, id), vec![stmt], RowShape::Triple)
            }
            Intent::CreateNode { placeholder } => {
                let pending = placeholder.id.pending().ok_or_else(|| {
                    CoreError::InvalidIntent(format!(
                        "node {} is already persisted and cannot be created again",
                        placeholder.id
                    ))
                })?;
                origin = Some(pending);
                let stmt = Statement::new(kind, format!(
                    "CREATE (n{}) SET n = $props RETURN {}",
                    label_clause(placeholder.labels.iter()),
                    node_return("n")
                ))
                .param("props", placeholder.properties);
                (IntentKey::fresh(kind), vec![stmt], RowShape::Node)
            }
            Intent::CreateRelationship { relationship } => {
                let (source, target) = persisted_endpoints(&relationship)?;
                let rel_type = self.relationship_type(Some(relationship.rel_type.as_str()));
                let stmt = Statement::new(kind, format!(
                    "MATCH (a), (b) WHERE ID(a) = $source AND ID(b) = $target \
                     MERGE (a)-[r:{}]->(b) SET r += $props RETURN {}",
                    quote_identifier(&rel_type),
                    triple_return("ID(a)")
                ))
                .param("source", source.0)
                .param("target", target.0)
                .param("props", relationship.properties);
                (IntentKey::fresh(kind), vec![stmt], RowShape::Triple)
            }
            Intent::MergeNodeEdit { node } => {
                let id = node.id.real().ok_or_else(|| {
                    CoreError::InvalidIntent(format!(
                        "node {} must be persisted before it can be edited",
                        node.id
                    ))
                })?;
                let set_labels = if node.labels.is_empty() {
                    String::new()
                } else {
                    format!(" SET n{}", label_clause(node.labels.iter()))
                };
                let stmt = Statement::new(kind, format!(
                    "MATCH (n) WHERE ID(n) = $id SET n = $props{} RETURN {}",
                    set_labels,
                    node_return("n")
                ))
                .param("id", id.0)
                .param("props", node.properties);
                (IntentKey::targeted(kind, id), vec![stmt], RowShape::Node)
            }
            Intent::MergeRelationshipEdit { relationship } => {
                let key = relationship.key().ok_or_else(|| {
                    let endpoint = if relationship.source.is_pending() {
                        relationship.source
                    } else {
                        relationship.target
                    };
                    CoreError::UnresolvedEndpoint { endpoint }
                })?;
                let stmt = Statement::new(kind, format!(
                    "MATCH (a)-[r:{}]->(b) WHERE ID(a) = $source AND ID(b) = $target \
                     SET r = $props RETURN {}",
                    quote_identifier(&key.rel_type),
                    triple_return("ID(a)")
                ))
                .param("source", key.source.0)
                .param("target", key.target.0)
                .param("props", relationship.properties);
                (IntentKey::targeted(kind, &key), vec![stmt], RowShape::Triple)
            }
            Intent::Search { queries, shape } => {
                if queries.is_empty() {
                    return Err(CoreError::InvalidIntent(
                        "search submitted without statements".to_string(),
                    ));
                }
                let statements = queries
                    .into_iter()
                    .map(|q| Statement {
                        cypher: q.cypher,
                        parameters: q.parameters,
                        kind,
                    })
                    .collect();
                (IntentKey::fresh(kind), statements, shape)
            }
        };

        debug!(key = %key, kind = %kind, statements = statements.len(), "Built transaction intent");

        Ok(TransactionIntent {
            key,
            kind,
            statements,
            shape,
            policy: kind.duplicate_policy(),
            origin,
            context,
        })
    }
}

fn persisted_endpoints(relationship: &Relationship) -> Result<(EntityId, EntityId), CoreError> {
    let resolve = |end: NodeRef| end.real().ok_or(CoreError::UnresolvedEndpoint { endpoint: end });
    Ok((resolve(relationship.source)?, resolve(relationship.target)?))
}

/// Backtick-quotes a label or relationship type; those cannot be parameterized in Cypher.
pub fn quote_identifier(raw: &str) -> String {
    format!("`{}`", raw.replace('`', "``"))
}

fn label_clause<'a>(labels: impl Iterator<Item = &'a String>) -> String {
    labels.map(|l| format!(":{}", quote_identifier(l))).collect()
}

fn node_return(var: &str) -> String {
    format!(
        "{var} AS {}, ID({var}) AS {}, labels({var}) AS {}",
        node_columns::NODE,
        node_columns::ID,
        node_columns::LABELS,
    )
}

fn triple_return(start_expr: &str) -> String {
    use triple_columns::*;
    format!(
        "a AS {SOURCE}, ID(a) AS {SOURCE_ID}, labels(a) AS {SOURCE_LABELS}, \
         r AS {REL}, type(r) AS {REL_TYPE}, {start_expr} AS {REL_START}, \
         b AS {TARGET}, ID(b) AS {TARGET_ID}, labels(b) AS {TARGET_LABELS}"
    )
}
