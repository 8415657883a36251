use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Scalar element of a list-valued attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

/// Attribute value as reported by the collector. Anything that does not fit
/// one of the named shapes lands in `Other` and is dropped by the encoder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<Scalar>),
    Map(BTreeMap<String, String>),
    Other(serde_json::Value),
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::Text(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::Text(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        PropertyValue::Int(value)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Bool(value)
    }
}

/// A live cluster resource, stored as one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub kind: String,
    pub uid: String,
    #[serde(default)]
    pub hash: String,
    #[serde(default)]
    pub properties: BTreeMap<String, PropertyValue>,
}

impl Resource {
    pub fn new(kind: impl Into<String>, uid: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            uid: uid.into(),
            hash: String::new(),
            properties: BTreeMap::new(),
        }
    }

    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        self.hash = hash.into();
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

/// A relationship between two resources. Edges carry no properties.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub source_uid: String,
    pub dest_uid: String,
    pub edge_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dest_kind: Option<String>,
}

impl Edge {
    pub fn new(
        source_uid: impl Into<String>,
        edge_type: impl Into<String>,
        dest_uid: impl Into<String>,
    ) -> Self {
        Self {
            source_uid: source_uid.into(),
            dest_uid: dest_uid.into(),
            edge_type: edge_type.into(),
            source_kind: None,
            dest_kind: None,
        }
    }

    pub fn with_kinds(mut self, source_kind: impl Into<String>, dest_kind: impl Into<String>) -> Self {
        self.source_kind = Some(source_kind.into());
        self.dest_kind = Some(dest_kind.into());
        self
    }

    /// Identity of the edge, `source-type->dest`.
    pub fn key(&self) -> String {
        edge_key(&self.source_uid, &self.edge_type, &self.dest_uid)
    }
}

pub fn edge_key(source_uid: &str, edge_type: &str, dest_uid: &str) -> String {
    format!("{}-{}->{}", source_uid, edge_type, dest_uid)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteResourceEvent {
    pub uid: String,
}

/// Incremental report pushed by a cluster collector.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncRequest {
    pub clear_all: bool,
    pub add_resources: Vec<Resource>,
    pub update_resources: Vec<Resource>,
    pub delete_resources: Vec<DeleteResourceEvent>,
    pub add_edges: Vec<Edge>,
    pub delete_edges: Vec<Edge>,
}

/// Complete inventory of a cluster, reconciled against the stored state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileRequest {
    pub resources: Vec<Resource>,
    pub edges: Vec<Edge>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemError {
    pub id: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncResponse {
    pub total_added: usize,
    pub total_updated: usize,
    pub total_deleted: usize,
    pub total_edges_added: usize,
    pub total_edges_deleted: usize,
    pub total_resources: usize,
    pub add_errors: Vec<ItemError>,
    pub update_errors: Vec<ItemError>,
    pub delete_errors: Vec<ItemError>,
    pub add_edge_errors: Vec<ItemError>,
    pub delete_edge_errors: Vec<ItemError>,
    pub hash: String,
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_error: Option<String>,
}

/// Per-cluster summary, overwritten after every sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterStatus {
    pub cluster: String,
    pub hash: String,
    pub last_updated: DateTime<Utc>,
    pub total_resources: usize,
    pub max_queue_time_ms: u64,
}
