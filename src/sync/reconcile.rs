//! Full-state reconciliation of one cluster.
//!
//! The stored nodes and edges of the cluster are read back, diffed against
//! the reported inventory and only the difference is written.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::time::Instant;
use tracing::{info, warn};

use crate::encoding::{encode_resource, EncodeContext, UID_PROPERTY};
use crate::error::StoreError;
use crate::falkor::{queries, GraphStore, ResultTable};
use crate::models::{edge_key, Edge, Resource};
use crate::sync::cache::WriteCache;
use crate::sync::chunked::ChunkedOperationResult;
use crate::sync::writer::GraphWriter;

/// Alias the cluster node fetch binds its nodes to.
const NODE_ALIAS: &str = "n";

#[derive(Debug, Default)]
pub struct NodeDiff {
    pub to_add: Vec<Resource>,
    pub to_update: Vec<Resource>,
    pub to_delete: Vec<String>,
    /// UIDs stored more than once. Every copy is removed before writing.
    pub duplicates: Vec<String>,
}

#[derive(Debug, Default)]
pub struct EdgeDiff {
    pub to_add: Vec<Edge>,
    pub to_delete: Vec<Edge>,
}

/// Per-phase results of one reconciliation.
#[derive(Debug, Default)]
pub struct ReconcileOutcome {
    pub added: ChunkedOperationResult,
    pub updated: ChunkedOperationResult,
    pub deleted: ChunkedOperationResult,
    pub edges_added: ChunkedOperationResult,
    pub edges_deleted: ChunkedOperationResult,
    /// First connection error seen in any phase.
    pub connection_error: Option<StoreError>,
}

impl ReconcileOutcome {
    fn record(&mut self, error: Option<&StoreError>) {
        if self.connection_error.is_none() {
            self.connection_error = error.cloned();
        }
    }
}

/// Keep the last report of each uid, in first-seen order.
fn dedup_resources(resources: &[Resource]) -> Vec<Resource> {
    let mut last: HashMap<&str, usize> = HashMap::new();
    for (i, r) in resources.iter().enumerate() {
        last.insert(r.uid.as_str(), i);
    }
    let mut seen = HashSet::new();
    resources
        .iter()
        .filter(|r| seen.insert(r.uid.as_str()))
        .map(|r| resources[last[r.uid.as_str()]].clone())
        .collect()
}

/// Diff the stored nodes of a cluster against the reported resources.
///
/// A stored node is left alone only when every encoded attribute of the
/// incoming resource reads back identically. Attributes missing from the
/// stored node count as different. Resources that fail to encode are routed
/// to the update set, which reports the encoding error.
pub fn diff_nodes(existing: &ResultTable, incoming: &[Resource], ctx: &EncodeContext<'_>) -> NodeDiff {
    let columns = existing.column_index();
    let uid_column = format!("{}.{}", NODE_ALIAS, UID_PROPERTY);

    let mut stored: HashMap<String, usize> = HashMap::new();
    let mut duplicates = BTreeSet::new();
    if let Some(&uid_idx) = columns.get(uid_column.as_str()) {
        for (row_idx, row) in existing.rows.iter().enumerate() {
            let Some(Some(uid)) = row.get(uid_idx) else {
                continue;
            };
            if stored.insert(uid.clone(), row_idx).is_some() {
                duplicates.insert(uid.clone());
            }
        }
    }
    for uid in &duplicates {
        stored.remove(uid);
    }

    let mut diff = NodeDiff {
        duplicates: duplicates.into_iter().collect(),
        ..Default::default()
    };

    for resource in dedup_resources(incoming) {
        let Some(row_idx) = stored.remove(&resource.uid) else {
            diff.to_add.push(resource);
            continue;
        };

        let unchanged = match encode_resource(&resource, ctx) {
            Ok(encoded) => encoded.properties.iter().all(|(key, value)| {
                columns
                    .get(format!("{}.{}", NODE_ALIAS, key).as_str())
                    .and_then(|&i| existing.rows[row_idx].get(i))
                    .and_then(|cell| cell.as_deref())
                    == Some(value.as_text().as_str())
            }),
            Err(_) => false,
        };
        if !unchanged {
            diff.to_update.push(resource);
        }
    }

    let mut remaining: Vec<String> = stored.into_keys().collect();
    remaining.sort();
    diff.to_delete = remaining;
    diff
}

/// Stored edges of a cluster keyed by `source-type->dest`.
pub fn stored_edges(existing: &ResultTable) -> HashMap<String, Edge> {
    let columns = existing.column_index();
    let (Some(&src), Some(&ty), Some(&dst)) = (columns.get("source"), columns.get("type"), columns.get("dest")) else {
        return HashMap::new();
    };
    let source_kind = columns.get("source_kind").copied();
    let dest_kind = columns.get("dest_kind").copied();

    let mut edges = HashMap::new();
    for row in &existing.rows {
        let cell = |i: usize| row.get(i).cloned().flatten();
        let (Some(source_uid), Some(edge_type), Some(dest_uid)) = (cell(src), cell(ty), cell(dst)) else {
            continue;
        };
        let edge = Edge {
            source_kind: source_kind.and_then(cell),
            dest_kind: dest_kind.and_then(cell),
            ..Edge::new(source_uid, edge_type, dest_uid)
        };
        edges.insert(edge_key(&edge.source_uid, &edge.edge_type, &edge.dest_uid), edge);
    }
    edges
}

pub fn diff_edges(existing: &ResultTable, incoming: &[Edge]) -> EdgeDiff {
    let mut stored = stored_edges(existing);
    let mut diff = EdgeDiff::default();
    let mut seen = HashSet::new();

    for edge in incoming {
        let key = edge.key();
        if !seen.insert(key.clone()) {
            continue;
        }
        if stored.remove(&key).is_none() {
            diff.to_add.push(edge.clone());
        }
    }

    let mut remaining: Vec<(String, Edge)> = stored.into_iter().collect();
    remaining.sort_by(|a, b| a.0.cmp(&b.0));
    diff.to_delete = remaining.into_iter().map(|(_, e)| e).collect();
    diff
}

/// Bring the stored state of `ctx.cluster` in line with `resources` and
/// `edges`. Every phase is attempted even after a connection error; the
/// first such error is kept in the outcome.
pub async fn reconcile(
    store: &dyn GraphStore,
    cache: &WriteCache,
    ctx: EncodeContext<'_>,
    resources: &[Resource],
    edges: &[Edge],
) -> ReconcileOutcome {
    let writer = GraphWriter::new(store, cache, ctx);
    let mut outcome = ReconcileOutcome::default();
    let cluster = ctx.cluster;

    let start = Instant::now();
    match store.query(&queries::fetch_cluster_nodes(cluster)).await {
        Ok(existing) => {
            let diff = diff_nodes(&existing, resources, &ctx);
            info!(
                "Reconciling {}: {} stored nodes, {} to add, {} to update, {} to delete ({}ms)",
                cluster,
                existing.rows.len(),
                diff.to_add.len(),
                diff.to_update.len(),
                diff.to_delete.len(),
                start.elapsed().as_millis()
            );

            if !diff.duplicates.is_empty() {
                // Every copy goes; the diff already schedules them for re-adding.
                warn!("Removing {} duplicated uids in {}", diff.duplicates.len(), cluster);
                let removed = writer.delete_resources(&diff.duplicates).await;
                outcome.record(removed.connection_error.as_ref());
            }

            let added = timed("add", writer.insert_resources(&diff.to_add)).await;
            outcome.record(added.connection_error.as_ref());
            outcome.added = added;

            let updated = timed("update", async {
                writer.update_resources(&diff.to_update, false).await.result
            })
            .await;
            outcome.record(updated.connection_error.as_ref());
            outcome.updated = updated;

            let deleted = timed("delete", writer.delete_resources(&diff.to_delete)).await;
            outcome.record(deleted.connection_error.as_ref());
            outcome.deleted = deleted;
        }
        Err(e) => {
            warn!("Failed to read stored nodes of {}: {}", cluster, e);
            if e.is_connection() {
                cache.clear().await;
                outcome.record(Some(&e));
            }
        }
    }

    let start = Instant::now();
    match store.query(&queries::fetch_cluster_edges(cluster)).await {
        Ok(existing) => {
            let diff = diff_edges(&existing, edges);
            info!(
                "Reconciling {} edges: {} stored, {} to add, {} to delete ({}ms)",
                cluster,
                existing.rows.len(),
                diff.to_add.len(),
                diff.to_delete.len(),
                start.elapsed().as_millis()
            );

            let added = timed("edge add", writer.insert_edges(&diff.to_add)).await;
            outcome.record(added.connection_error.as_ref());
            outcome.edges_added = added;

            let deleted = timed("edge delete", writer.delete_edges(&diff.to_delete)).await;
            outcome.record(deleted.connection_error.as_ref());
            outcome.edges_deleted = deleted;
        }
        Err(e) => {
            warn!("Failed to read stored edges of {}: {}", cluster, e);
            if e.is_connection() {
                cache.clear().await;
                outcome.record(Some(&e));
            }
        }
    }

    outcome
}

async fn timed<F>(phase: &str, fut: F) -> ChunkedOperationResult
where
    F: std::future::Future<Output = ChunkedOperationResult>,
{
    let start = Instant::now();
    let result = fut.await;
    info!(
        "{} phase: {} ok, {} failed in {}ms",
        phase,
        result.successful_resources,
        result.resource_errors.len(),
        start.elapsed().as_millis()
    );
    result
}
