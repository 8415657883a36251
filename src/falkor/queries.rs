//! Cypher statement rendering for FalkorDB.
//!
//! Every statement is a plain string: values are inlined as literals after
//! passing through [`escape_value`], identifiers are back-quoted through
//! [`quote_identifier`]. Batch builders expect a non-empty slice.

use std::collections::BTreeMap;

use crate::encoding::{
    EncodedResource, StoreValue, CLUSTER_PROPERTY, HASH_PROPERTY, KIND_PROPERTY, UID_PROPERTY,
};
use crate::models::{ClusterStatus, Edge};

pub const CLUSTER_STATUS_LABEL: &str = "ClusterStatus";

/// Escape a value for use inside a single-quoted literal.
pub fn escape_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\\' => escaped.push_str("\\\\"),
            '\'' => escaped.push_str("\\'"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            c if c.is_control() => {}
            c => escaped.push(c),
        }
    }
    escaped
}

pub fn quote_literal(value: &str) -> String {
    format!("'{}'", escape_value(value))
}

/// Back-quote a label, relationship type or property key.
pub fn quote_identifier(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| *c != '`' && !c.is_control())
        .collect();
    format!("`{}`", cleaned)
}

pub fn render_value(value: &StoreValue) -> String {
    match value {
        StoreValue::Text(s) => quote_literal(s),
        StoreValue::Int(i) => i.to_string(),
    }
}

pub fn render_properties(properties: &BTreeMap<String, StoreValue>) -> String {
    let body = properties
        .iter()
        .map(|(k, v)| format!("{}: {}", quote_identifier(k), render_value(v)))
        .collect::<Vec<_>>()
        .join(", ");
    format!("{{{}}}", body)
}

fn uid_pattern(var: &str, kind: Option<&str>, uid: &str) -> String {
    let label = kind
        .filter(|k| !k.is_empty())
        .map(|k| format!(":{}", quote_identifier(k)))
        .unwrap_or_default();
    format!(
        "({}{} {{{}: {}}})",
        var,
        label,
        quote_identifier(UID_PROPERTY),
        quote_literal(uid)
    )
}

fn cluster_pattern(var: &str, cluster: &str) -> String {
    format!(
        "({} {{{}: {}}})",
        var,
        quote_identifier(CLUSTER_PROPERTY),
        quote_literal(cluster)
    )
}

/// `CREATE (:Kind {...}), (:Kind {...})`
pub fn insert_resources(resources: &[EncodedResource]) -> String {
    let patterns = resources
        .iter()
        .map(|r| {
            format!(
                "(:{} {})",
                quote_identifier(&r.kind),
                render_properties(&r.properties)
            )
        })
        .collect::<Vec<_>>()
        .join(", ");
    format!("CREATE {}", patterns)
}

/// Additive update matched by label and uid. The statement returns the
/// number of rows the MATCH produced, 1 only when every resource was found.
pub fn update_resources(resources: &[EncodedResource]) -> String {
    let mut matches = Vec::with_capacity(resources.len());
    let mut assignments = Vec::new();

    for (i, r) in resources.iter().enumerate() {
        let var = format!("n{}", i);
        matches.push(uid_pattern(&var, Some(&r.kind), &r.uid));
        assignments.extend(
            r.properties
                .iter()
                .filter(|(k, _)| k.as_str() != UID_PROPERTY)
                .map(|(k, v)| format!("{}.{} = {}", var, quote_identifier(k), render_value(v))),
        );
    }

    format!(
        "MATCH {} SET {} RETURN count(*) AS matched",
        matches.join(", "),
        assignments.join(", ")
    )
}

/// Label-agnostic delete by uid.
pub fn delete_resources<S: AsRef<str>>(uids: &[S]) -> String {
    let list = uids
        .iter()
        .map(|u| quote_literal(u.as_ref()))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "MATCH (n) WHERE n.{} IN [{}] DELETE n",
        quote_identifier(UID_PROPERTY),
        list
    )
}

pub fn insert_edges(edges: &[Edge]) -> String {
    let mut matches = Vec::with_capacity(edges.len() * 2);
    let mut creates = Vec::with_capacity(edges.len());

    for (i, e) in edges.iter().enumerate() {
        let (src, dst) = (format!("s{}", i), format!("d{}", i));
        matches.push(uid_pattern(&src, e.source_kind.as_deref(), &e.source_uid));
        matches.push(uid_pattern(&dst, e.dest_kind.as_deref(), &e.dest_uid));
        creates.push(format!(
            "({})-[:{}]->({})",
            src,
            quote_identifier(&e.edge_type),
            dst
        ));
    }

    format!("MATCH {} CREATE {}", matches.join(", "), creates.join(", "))
}

pub fn delete_edges(edges: &[Edge]) -> String {
    let mut matches = Vec::with_capacity(edges.len());
    let mut vars = Vec::with_capacity(edges.len());

    for (i, e) in edges.iter().enumerate() {
        let rel = format!("r{}", i);
        let src = uid_pattern(&format!("s{}", i), e.source_kind.as_deref(), &e.source_uid);
        let dst = uid_pattern(&format!("d{}", i), e.dest_kind.as_deref(), &e.dest_uid);
        matches.push(format!(
            "{}-[{}:{}]->{}",
            src,
            rel,
            quote_identifier(&e.edge_type),
            dst
        ));
        vars.push(rel);
    }

    format!("MATCH {} DELETE {}", matches.join(", "), vars.join(", "))
}

pub fn fetch_cluster_nodes(cluster: &str) -> String {
    format!("MATCH {} RETURN n", cluster_pattern("n", cluster))
}

pub fn fetch_cluster_edges(cluster: &str) -> String {
    format!(
        "MATCH {}-[r]->(d) RETURN s.{uid} AS source, type(r) AS type, d.{uid} AS dest, s.{kind} AS source_kind, d.{kind} AS dest_kind",
        cluster_pattern("s", cluster),
        uid = quote_identifier(UID_PROPERTY),
        kind = quote_identifier(KIND_PROPERTY),
    )
}

pub fn fetch_cluster_hashes(cluster: &str) -> String {
    format!(
        "MATCH {} RETURN n.{} AS hash",
        cluster_pattern("n", cluster),
        quote_identifier(HASH_PROPERTY)
    )
}

pub fn delete_cluster_nodes(cluster: &str) -> String {
    format!("MATCH {} DELETE n", cluster_pattern("n", cluster))
}

pub fn create_uid_index(kind: &str) -> String {
    format!(
        "CREATE INDEX FOR (n:{}) ON (n.{})",
        quote_identifier(kind),
        quote_identifier(UID_PROPERTY)
    )
}

pub fn save_cluster_status(status: &ClusterStatus) -> String {
    format!(
        "MERGE (c:{} {{`name`: {}}}) SET c.`hash` = {}, c.`last_updated` = {}, c.`total_resources` = {}, c.`max_queue_time_ms` = {}",
        quote_identifier(CLUSTER_STATUS_LABEL),
        quote_literal(&status.cluster),
        quote_literal(&status.hash),
        quote_literal(&status.last_updated.to_rfc3339()),
        status.total_resources,
        status.max_queue_time_ms,
    )
}

pub fn load_cluster_status(cluster: &str) -> String {
    format!(
        "MATCH (c:{} {{`name`: {}}}) RETURN c.`hash` AS hash, c.`last_updated` AS last_updated, c.`total_resources` AS total_resources, c.`max_queue_time_ms` AS max_queue_time_ms",
        quote_identifier(CLUSTER_STATUS_LABEL),
        quote_literal(cluster),
    )
}

pub const PING: &str = "RETURN 1";
