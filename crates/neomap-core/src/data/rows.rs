//! Backend rows and the typed shapes they are decoded into

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::data::entities::{Node, Relationship};
use crate::data::errors::CoreError;
use crate::data::identifiers::NodeRef;
use crate::data::types::DataPacket;
use crate::factory::EntityFactory;

/// One backend row: declared column name to value.
pub type Row = HashMap<String, DataPacket>;

/// Rows returned by one committed batch.
pub type RowSet = Vec<Row>;

/// Columns of the node shape: `RETURN n, ID(n) AS _id, labels(n) AS _labels`.
pub mod node_columns {
    pub const NODE: &str = "n";
    pub const ID: &str = "_id";
    pub const LABELS: &str = "_labels";
}

/// Columns of the triple shape returned by expansion and relationship writes.
pub mod triple_columns {
    pub const SOURCE: &str = "a";
    pub const SOURCE_ID: &str = "_aid";
    pub const SOURCE_LABELS: &str = "_alabels";
    pub const REL: &str = "r";
    pub const REL_TYPE: &str = "_rtype";
    pub const REL_START: &str = "_rstart";
    pub const TARGET: &str = "b";
    pub const TARGET_ID: &str = "_bid";
    pub const TARGET_LABELS: &str = "_blabels";
}

/// Columns of the bare relationship shape.
pub mod relationship_columns {
    pub const REL: &str = "r";
    pub const REL_TYPE: &str = "_rtype";
    pub const START: &str = "_rstart";
    pub const END: &str = "_rend";
}

/// Which columns of a row map to which entity roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RowShape {
    /// A single node per row.
    Node,
    /// `(a)-[r]-(b)` per row; `_rstart` says which side the relationship leaves from.
    Triple,
    /// A relationship given by endpoint ids only; the nodes may arrive later.
    Relationship,
}

/// A row decoded against its declared shape.
#[derive(Debug, Clone, PartialEq)]
pub enum ShapedRow {
    Node(Node),
    Triple {
        source: Node,
        relationship: Relationship,
        target: Node,
    },
    Relationship(Relationship),
}

impl RowShape {
    pub fn name(&self) -> &'static str {
        match self {
            RowShape::Node => "node",
            RowShape::Triple => "triple",
            RowShape::Relationship => "relationship",
        }
    }

    /// Decodes every row or none: the first mismatch aborts the whole set.
    pub fn decode_all(&self, rows: &[Row], factory: &EntityFactory) -> Result<Vec<ShapedRow>, CoreError> {
        rows.iter()
            .enumerate()
            .map(|(index, row)| self.decode(index, row, factory))
            .collect()
    }

    pub fn decode(&self, index: usize, row: &Row, factory: &EntityFactory) -> Result<ShapedRow, CoreError> {
        match self {
            RowShape::Node => {
                use node_columns::*;
                let node = self.persisted_node(index, row, factory, ID, LABELS, NODE)?;
                Ok(ShapedRow::Node(node))
            }
            RowShape::Triple => {
                use triple_columns::*;
                let a = self.persisted_node(index, row, factory, SOURCE_ID, SOURCE_LABELS, SOURCE)?;
                let b = self.persisted_node(index, row, factory, TARGET_ID, TARGET_LABELS, TARGET)?;
                let rel_type = self.rel_type(index, row, REL_TYPE)?;

                // Undirected matches report the pair from the expanded node's side;
                // `_rstart` restores the stored direction.
                let starts_at_b = match row.get(REL_START) {
                    None | Some(DataPacket::Null) => false,
                    Some(start) => {
                        let start = start.as_i64().ok_or_else(|| {
                            CoreError::shape_mismatch(self.name(), index, "`_rstart` is not an id")
                        })?;
                        if Some(start) == a.id.real().map(|id| id.0) {
                            false
                        } else if Some(start) == b.id.real().map(|id| id.0) {
                            true
                        } else {
                            return Err(CoreError::shape_mismatch(
                                self.name(),
                                index,
                                format!("`_rstart` {} matches neither endpoint", start),
                            ));
                        }
                    }
                };

                let (source, target) = if starts_at_b { (b, a) } else { (a, b) };
                let relationship =
                    factory.create_relationship(&rel_type, row.get(REL), &source, &target);
                Ok(ShapedRow::Triple {
                    source,
                    relationship,
                    target,
                })
            }
            RowShape::Relationship => {
                use relationship_columns::*;
                let rel_type = self.rel_type(index, row, REL_TYPE)?;
                let start = self.endpoint(index, row, START)?;
                let end = self.endpoint(index, row, END)?;
                let properties = EntityFactory::normalize_properties(row.get(REL));
                Ok(ShapedRow::Relationship(Relationship {
                    rel_type,
                    properties,
                    source: start,
                    target: end,
                }))
            }
        }
    }

    fn persisted_node(
        &self,
        index: usize,
        row: &Row,
        factory: &EntityFactory,
        id_col: &str,
        labels_col: &str,
        node_col: &str,
    ) -> Result<Node, CoreError> {
        let raw_id = row.get(id_col).filter(|v| !v.is_null()).ok_or_else(|| {
            CoreError::shape_mismatch(self.name(), index, format!("missing `{}` column", id_col))
        })?;
        let node = factory.create_node(Some(raw_id), row.get(labels_col), row.get(node_col));
        if node.is_pending() {
            return Err(CoreError::shape_mismatch(
                self.name(),
                index,
                format!("`{}` is not a backend id", id_col),
            ));
        }
        Ok(node)
    }

    fn rel_type(&self, index: usize, row: &Row, col: &str) -> Result<String, CoreError> {
        row.get(col)
            .and_then(DataPacket::as_str)
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .ok_or_else(|| {
                CoreError::shape_mismatch(self.name(), index, format!("missing `{}` column", col))
            })
    }

    fn endpoint(&self, index: usize, row: &Row, col: &str) -> Result<NodeRef, CoreError> {
        row.get(col)
            .and_then(DataPacket::as_i64)
            .map(|id| NodeRef::Real(id.into()))
            .ok_or_else(|| {
                CoreError::shape_mismatch(self.name(), index, format!("`{}` is not an id", col))
            })
    }
}
