use async_trait::async_trait;
use std::collections::HashSet;
use tracing::{debug, instrument, warn};

use crate::encoding::{encode_resource, EncodeContext, EncodedResource};
use crate::error::StoreError;
use crate::falkor::{queries, GraphStore};
use crate::models::{Edge, Resource};
use crate::sync::cache::{fingerprint, WriteCache};
use crate::sync::chunked::{apply_chunked, BatchOperation, ChunkedOperationResult};

struct NodeInsert<'a> {
    store: &'a dyn GraphStore,
}

#[async_trait]
impl<'a> BatchOperation<EncodedResource> for NodeInsert<'a> {
    async fn apply(&self, batch: &[EncodedResource]) -> Result<(), StoreError> {
        self.store
            .query(&queries::insert_resources(batch))
            .await
            .map(|_| ())
    }
}

struct NodeUpdate<'a> {
    store: &'a dyn GraphStore,
}

#[async_trait]
impl<'a> BatchOperation<EncodedResource> for NodeUpdate<'a> {
    async fn apply(&self, batch: &[EncodedResource]) -> Result<(), StoreError> {
        let table = self.store.query(&queries::update_resources(batch)).await?;
        let matched = table
            .cell(0, "matched")
            .and_then(|m| m.parse::<usize>().ok())
            .unwrap_or(0);
        if matched == 0 {
            return Err(StoreError::Query(
                "resource to update not found in store".to_string(),
            ));
        }
        Ok(())
    }
}

struct NodeDelete<'a> {
    store: &'a dyn GraphStore,
}

#[async_trait]
impl<'a> BatchOperation<String> for NodeDelete<'a> {
    async fn apply(&self, batch: &[String]) -> Result<(), StoreError> {
        self.store
            .query(&queries::delete_resources(batch))
            .await
            .map(|_| ())
    }
}

struct EdgeInsert<'a> {
    store: &'a dyn GraphStore,
}

#[async_trait]
impl<'a> BatchOperation<Edge> for EdgeInsert<'a> {
    async fn apply(&self, batch: &[Edge]) -> Result<(), StoreError> {
        let table = self.store.query(&queries::insert_edges(batch)).await?;
        // A missing endpoint makes the MATCH empty and nothing is created.
        if table.stats.relationships_created < batch.len() {
            return Err(StoreError::Query(format!(
                "{} of {} relationships created, an endpoint does not exist",
                table.stats.relationships_created,
                batch.len()
            )));
        }
        Ok(())
    }
}

struct EdgeDelete<'a> {
    store: &'a dyn GraphStore,
}

#[async_trait]
impl<'a> BatchOperation<Edge> for EdgeDelete<'a> {
    async fn apply(&self, batch: &[Edge]) -> Result<(), StoreError> {
        let table = self.store.query(&queries::delete_edges(batch)).await?;
        if table.stats.relationships_deleted >= batch.len() {
            return Ok(());
        }
        // One absent relationship empties the whole MATCH, so a batch must
        // be split until each edge is deleted on its own.
        if batch.len() > 1 {
            return Err(StoreError::Query(format!(
                "{} of {} relationships deleted",
                table.stats.relationships_deleted,
                batch.len()
            )));
        }
        // Already gone, typically with an endpoint deleted earlier.
        debug!("Relationship {} already absent", batch[0].key());
        Ok(())
    }
}

/// Applies resource and edge changes for one cluster, keeping the write cache
/// in step with what the store accepted.
pub struct GraphWriter<'a> {
    store: &'a dyn GraphStore,
    cache: &'a WriteCache,
    ctx: EncodeContext<'a>,
}

/// Outcome of an update phase. `skipped` counts resources whose encoding
/// matched the last write and were not sent.
#[derive(Debug, Default)]
pub struct UpdateOutcome {
    pub result: ChunkedOperationResult,
    pub skipped: usize,
}

impl<'a> GraphWriter<'a> {
    pub fn new(store: &'a dyn GraphStore, cache: &'a WriteCache, ctx: EncodeContext<'a>) -> Self {
        Self { store, cache, ctx }
    }

    /// Encode every resource; failures are reported under the resource uid.
    fn encode_all(&self, resources: &[Resource]) -> (Vec<EncodedResource>, ChunkedOperationResult) {
        let mut encoded = Vec::with_capacity(resources.len());
        let mut rejected = ChunkedOperationResult::default();
        for resource in resources {
            match encode_resource(resource, &self.ctx) {
                Ok(e) => encoded.push(e),
                Err(e) => {
                    warn!("Rejecting resource {:?}: {}", resource.uid, e);
                    rejected.resource_errors.insert(resource.uid.clone(), e.into());
                }
            }
        }
        (encoded, rejected)
    }

    async fn finish(&self, result: &ChunkedOperationResult) {
        if result.is_connection_failure() {
            self.cache.clear().await;
        }
    }

    async fn remember(&self, written: &[EncodedResource], result: &ChunkedOperationResult) {
        if result.is_connection_failure() {
            return;
        }
        for r in written {
            if !result.resource_errors.contains_key(&r.uid) {
                self.cache.set(r.uid.clone(), fingerprint(&r.properties)).await;
            }
        }
    }

    /// Make sure every kind about to be created has a uid index.
    async fn ensure_indexes(&self, resources: &[EncodedResource]) -> Result<(), StoreError> {
        let kinds = self
            .cache
            .unindexed_kinds(resources.iter().map(|r| r.kind.as_str()))
            .await;
        for kind in kinds {
            match self.store.query(&queries::create_uid_index(&kind)).await {
                Ok(_) => debug!("Created uid index for {}", kind),
                // Typically "already indexed".
                Err(StoreError::Query(msg)) => debug!("Index for {} not created: {}", kind, msg),
                Err(e) => return Err(e),
            }
            self.cache.mark_indexed(kind).await;
        }
        Ok(())
    }

    #[instrument(skip(self, resources), fields(cluster = self.ctx.cluster, count = resources.len()))]
    pub async fn insert_resources(&self, resources: &[Resource]) -> ChunkedOperationResult {
        let (encoded, rejected) = self.encode_all(resources);
        if encoded.is_empty() {
            return rejected;
        }

        if let Err(e) = self.ensure_indexes(&encoded).await {
            let result = ChunkedOperationResult::connection_failure(e);
            self.finish(&result).await;
            return result;
        }

        let result = apply_chunked(&encoded, &NodeInsert { store: self.store }).await;
        self.remember(&encoded, &result).await;
        self.finish(&result).await;
        result.merge(rejected)
    }

    /// Additive update. With `skip_unchanged`, resources whose encoding is
    /// identical to the cached last write are not sent.
    #[instrument(skip(self, resources), fields(cluster = self.ctx.cluster, count = resources.len()))]
    pub async fn update_resources(&self, resources: &[Resource], skip_unchanged: bool) -> UpdateOutcome {
        let (encoded, rejected) = self.encode_all(resources);

        let mut pending = Vec::with_capacity(encoded.len());
        let mut skipped = 0;
        for r in encoded {
            if skip_unchanged && self.cache.is_unchanged(&r.uid, &r.properties).await {
                skipped += 1;
            } else {
                pending.push(r);
            }
        }
        if skipped > 0 {
            debug!("Skipped {} unchanged updates", skipped);
        }
        if pending.is_empty() {
            return UpdateOutcome {
                result: rejected,
                skipped,
            };
        }

        let result = apply_chunked(&pending, &NodeUpdate { store: self.store }).await;
        self.remember(&pending, &result).await;
        self.finish(&result).await;
        UpdateOutcome {
            result: result.merge(rejected),
            skipped,
        }
    }

    #[instrument(skip(self, uids), fields(cluster = self.ctx.cluster, count = uids.len()))]
    pub async fn delete_resources(&self, uids: &[String]) -> ChunkedOperationResult {
        let mut seen = HashSet::new();
        let unique: Vec<String> = uids
            .iter()
            .filter(|u| !u.is_empty() && seen.insert(u.as_str()))
            .cloned()
            .collect();
        if unique.is_empty() {
            return ChunkedOperationResult::default();
        }

        let result = apply_chunked(&unique, &NodeDelete { store: self.store }).await;
        if !result.is_connection_failure() {
            for uid in &unique {
                self.cache.delete(uid).await;
            }
        }
        self.finish(&result).await;
        result
    }

    #[instrument(skip(self, edges), fields(cluster = self.ctx.cluster, count = edges.len()))]
    pub async fn insert_edges(&self, edges: &[Edge]) -> ChunkedOperationResult {
        let unique = dedup_edges(edges);
        let result = apply_chunked(&unique, &EdgeInsert { store: self.store }).await;
        self.finish(&result).await;
        result
    }

    #[instrument(skip(self, edges), fields(cluster = self.ctx.cluster, count = edges.len()))]
    pub async fn delete_edges(&self, edges: &[Edge]) -> ChunkedOperationResult {
        let unique = dedup_edges(edges);
        let result = apply_chunked(&unique, &EdgeDelete { store: self.store }).await;
        self.finish(&result).await;
        result
    }

    /// Remove every node of the cluster, bypassing any diffing.
    pub async fn delete_cluster(&self) -> Result<usize, StoreError> {
        let result = self
            .store
            .query(&queries::delete_cluster_nodes(self.ctx.cluster))
            .await;
        // Cached fingerprints for this cluster no longer describe the store.
        self.cache.clear().await;
        result.map(|table| table.stats.nodes_deleted)
    }
}

/// Edges are identified by `source-type->dest`; the same relationship twice
/// in one MATCH would never bind.
fn dedup_edges(edges: &[Edge]) -> Vec<Edge> {
    let mut seen = HashSet::new();
    edges
        .iter()
        .filter(|e| seen.insert(e.key()))
        .cloned()
        .collect()
}
