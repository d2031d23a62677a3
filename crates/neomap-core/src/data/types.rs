//! Property values exchanged with the graph backend

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Property map of a node or relationship.
pub type Properties = HashMap<String, DataPacket>;

/// Generic value carried in rows, parameters and entity properties.
///
/// Serialized untagged so that it maps one-to-one onto JSON, which is what the
/// Neo4j transactional endpoint speaks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DataPacket {
    Null,
    Bool(bool),
    Integer(i64),
    Number(f64),
    String(String),
    Array(Vec<DataPacket>),
    Object(HashMap<String, DataPacket>),
}

impl Default for DataPacket {
    fn default() -> Self {
        DataPacket::Null
    }
}

impl DataPacket {
    pub fn is_null(&self) -> bool {
        matches!(self, DataPacket::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            DataPacket::String(s) => Some(s),
            _ => None,
        }
    }

    /// Integer view of the value. Whole floats and numeric strings are accepted
    /// because some transports hand ids back in those forms.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            DataPacket::Integer(i) => Some(*i),
            DataPacket::Number(n) if n.fract() == 0.0 && n.is_finite() => Some(*n as i64),
            DataPacket::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Vec<DataPacket>> {
        match self {
            DataPacket::Array(arr) => Some(arr),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&HashMap<String, DataPacket>> {
        match self {
            DataPacket::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            DataPacket::Null => serde_json::Value::Null,
            DataPacket::Bool(b) => serde_json::Value::Bool(*b),
            DataPacket::Integer(i) => serde_json::json!(i),
            DataPacket::Number(n) => serde_json::json!(n),
            DataPacket::String(s) => serde_json::Value::String(s.clone()),
            DataPacket::Array(arr) => {
                serde_json::Value::Array(arr.iter().map(DataPacket::to_json).collect())
            }
            DataPacket::Object(obj) => {
                let mut json_obj = serde_json::Map::new();
                for (k, v) in obj {
                    json_obj.insert(k.clone(), v.to_json());
                }
                serde_json::Value::Object(json_obj)
            }
        }
    }
}

impl From<&str> for DataPacket {
    fn from(s: &str) -> Self {
        DataPacket::String(s.to_string())
    }
}

impl From<String> for DataPacket {
    fn from(s: String) -> Self {
        DataPacket::String(s)
    }
}

impl From<i64> for DataPacket {
    fn from(i: i64) -> Self {
        DataPacket::Integer(i)
    }
}

impl From<f64> for DataPacket {
    fn from(n: f64) -> Self {
        DataPacket::Number(n)
    }
}

impl From<bool> for DataPacket {
    fn from(b: bool) -> Self {
        DataPacket::Bool(b)
    }
}

impl From<Properties> for DataPacket {
    fn from(obj: Properties) -> Self {
        DataPacket::Object(obj)
    }
}

impl From<serde_json::Value> for DataPacket {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => DataPacket::Null,
            serde_json::Value::Bool(b) => DataPacket::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => DataPacket::Integer(i),
                None => DataPacket::Number(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => DataPacket::String(s),
            serde_json::Value::Array(arr) => {
                DataPacket::Array(arr.into_iter().map(DataPacket::from).collect())
            }
            serde_json::Value::Object(obj) => DataPacket::Object(
                obj.into_iter().map(|(k, v)| (k, DataPacket::from(v))).collect(),
            ),
        }
    }
}

impl From<DataPacket> for serde_json::Value {
    fn from(packet: DataPacket) -> Self {
        packet.to_json()
    }
}
