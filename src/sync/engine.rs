use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, instrument, warn};

use crate::encoding::{validate_cluster_name, EncodeContext};
use crate::error::{StoreError, SyncError, SyncResult};
use crate::falkor::GraphStore;
use crate::models::{ClusterStatus, ItemError, ReconcileRequest, SyncRequest, SyncResponse};
use crate::sync::cache::WriteCache;
use crate::sync::chunked::ChunkedOperationResult;
use crate::sync::reconcile::reconcile;
use crate::sync::status::{cluster_hash, load_cluster_status, save_cluster_status};
use crate::sync::writer::GraphWriter;

/// Result of one sync. The response is filled in as far as the store allowed;
/// `connection_error` is the first transport failure hit along the way.
#[derive(Debug)]
pub struct SyncOutcome {
    pub response: SyncResponse,
    pub connection_error: Option<StoreError>,
}

impl SyncOutcome {
    fn new() -> Self {
        Self {
            response: SyncResponse::default(),
            connection_error: None,
        }
    }

    fn record(&mut self, error: Option<&StoreError>) {
        if self.connection_error.is_none() {
            if let Some(e) = error {
                self.response.connection_error = Some(e.to_string());
                self.connection_error = Some(e.clone());
            }
        }
    }
}

/// Writes cluster reports into the graph store.
#[derive(Clone)]
pub struct SyncEngine {
    store: Arc<dyn GraphStore>,
    cache: WriteCache,
    hub_cluster: String,
}

impl SyncEngine {
    pub fn new(store: Arc<dyn GraphStore>, cache: WriteCache, hub_cluster: impl Into<String>) -> Self {
        Self {
            store,
            cache,
            hub_cluster: hub_cluster.into(),
        }
    }

    pub fn cache(&self) -> &WriteCache {
        &self.cache
    }

    /// Apply an incremental report. Phases run in order: clear, add, update,
    /// delete, edge add, edge delete. Each is attempted even when an earlier
    /// one lost the connection.
    #[instrument(skip(self, request, queue_wait))]
    pub async fn sync(&self, cluster: &str, request: SyncRequest, queue_wait: Duration) -> SyncResult<SyncOutcome> {
        validate_cluster_name(cluster).map_err(|e| SyncError::InvalidRequest(e.to_string()))?;
        let start = Instant::now();
        let ctx = EncodeContext::new(cluster, &self.hub_cluster);
        let writer = GraphWriter::new(self.store.as_ref(), &self.cache, ctx);
        let mut outcome = SyncOutcome::new();

        if request.clear_all {
            match writer.delete_cluster().await {
                Ok(deleted) => {
                    info!("Cleared {} nodes of {}", deleted, cluster);
                    outcome.response.total_deleted += deleted;
                }
                Err(e) => {
                    warn!("Failed to clear {}: {}", cluster, e);
                    if e.is_connection() {
                        outcome.record(Some(&e));
                    }
                }
            }
        }

        let added = writer.insert_resources(&request.add_resources).await;
        outcome.record(added.connection_error.as_ref());
        outcome.response.total_added += added.successful_resources;
        outcome.response.add_errors = item_errors(&added);

        let updated = writer.update_resources(&request.update_resources, true).await;
        outcome.record(updated.result.connection_error.as_ref());
        outcome.response.total_updated += updated.result.successful_resources;
        outcome.response.update_errors = item_errors(&updated.result);

        let uids: Vec<String> = request.delete_resources.into_iter().map(|e| e.uid).collect();
        let deleted = writer.delete_resources(&uids).await;
        outcome.record(deleted.connection_error.as_ref());
        outcome.response.total_deleted += deleted.successful_resources;
        outcome.response.delete_errors = item_errors(&deleted);

        let edges_added = writer.insert_edges(&request.add_edges).await;
        outcome.record(edges_added.connection_error.as_ref());
        outcome.response.total_edges_added += edges_added.successful_resources;
        outcome.response.add_edge_errors = item_errors(&edges_added);

        let edges_deleted = writer.delete_edges(&request.delete_edges).await;
        outcome.record(edges_deleted.connection_error.as_ref());
        outcome.response.total_edges_deleted += edges_deleted.successful_resources;
        outcome.response.delete_edge_errors = item_errors(&edges_deleted);

        self.finish(cluster, &mut outcome, queue_wait).await;
        info!(
            "Synced {} in {}ms: +{} ~{} -{} edges +{} -{}",
            cluster,
            start.elapsed().as_millis(),
            outcome.response.total_added,
            outcome.response.total_updated,
            outcome.response.total_deleted,
            outcome.response.total_edges_added,
            outcome.response.total_edges_deleted
        );
        Ok(outcome)
    }

    /// Reconcile the stored cluster against a complete inventory.
    #[instrument(skip(self, request, queue_wait))]
    pub async fn resync(&self, cluster: &str, request: ReconcileRequest, queue_wait: Duration) -> SyncResult<SyncOutcome> {
        validate_cluster_name(cluster).map_err(|e| SyncError::InvalidRequest(e.to_string()))?;
        let start = Instant::now();
        let ctx = EncodeContext::new(cluster, &self.hub_cluster);

        let result = reconcile(
            self.store.as_ref(),
            &self.cache,
            ctx,
            &request.resources,
            &request.edges,
        )
        .await;

        let mut outcome = SyncOutcome::new();
        outcome.record(result.connection_error.as_ref());
        let response = &mut outcome.response;
        response.total_added = result.added.successful_resources;
        response.add_errors = item_errors(&result.added);
        response.total_updated = result.updated.successful_resources;
        response.update_errors = item_errors(&result.updated);
        response.total_deleted = result.deleted.successful_resources;
        response.delete_errors = item_errors(&result.deleted);
        response.total_edges_added = result.edges_added.successful_resources;
        response.add_edge_errors = item_errors(&result.edges_added);
        response.total_edges_deleted = result.edges_deleted.successful_resources;
        response.delete_edge_errors = item_errors(&result.edges_deleted);

        self.finish(cluster, &mut outcome, queue_wait).await;
        info!("Resynced {} in {}ms", cluster, start.elapsed().as_millis());
        Ok(outcome)
    }

    pub async fn status(&self, cluster: &str) -> SyncResult<ClusterStatus> {
        validate_cluster_name(cluster).map_err(|e| SyncError::InvalidRequest(e.to_string()))?;
        load_cluster_status(self.store.as_ref(), cluster)
            .await?
            .ok_or_else(|| SyncError::NotFound(format!("No status recorded for cluster {}", cluster)))
    }

    /// Recompute the cluster digest and persist the status.
    async fn finish(&self, cluster: &str, outcome: &mut SyncOutcome, queue_wait: Duration) {
        let (total, hash) = match cluster_hash(self.store.as_ref(), cluster).await {
            Ok(summary) => summary,
            Err(e) => {
                error!("Failed to compute hash of {}: {}", cluster, e);
                if e.is_connection() {
                    self.cache.clear().await;
                    outcome.record(Some(&e));
                }
                return;
            }
        };

        let status = ClusterStatus {
            cluster: cluster.to_string(),
            hash: hash.clone(),
            last_updated: Utc::now(),
            total_resources: total,
            max_queue_time_ms: queue_wait.as_millis() as u64,
        };
        if let Err(e) = save_cluster_status(self.store.as_ref(), &status).await {
            error!("Failed to save status of {}: {}", cluster, e);
            if e.is_connection() {
                self.cache.clear().await;
                outcome.record(Some(&e));
            }
        }

        outcome.response.total_resources = total;
        outcome.response.hash = hash;
        outcome.response.last_updated = Some(status.last_updated);
    }
}

/// Per-item errors sorted by id.
fn item_errors(result: &ChunkedOperationResult) -> Vec<ItemError> {
    let mut errors: Vec<ItemError> = result
        .resource_errors
        .iter()
        .map(|(id, e)| ItemError {
            id: id.clone(),
            message: e.to_string(),
        })
        .collect();
    errors.sort_by(|a, b| a.id.cmp(&b.id));
    errors
}
