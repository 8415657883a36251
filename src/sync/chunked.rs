//! Batched writes with bisection on failure.
//!
//! Items are applied in chunks of [`CHUNK_SIZE`], one round trip per chunk.
//! When a chunk is rejected for a non-transport reason it is split in half and
//! each half retried, down to single items, so only the offending items are
//! reported and everything else still lands. A transport failure stops the
//! whole operation: nothing can be said about what committed.

use async_trait::async_trait;
use futures::future::BoxFuture;
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::encoding::EncodedResource;
use crate::error::{ResourceError, StoreError};
use crate::models::Edge;

pub const CHUNK_SIZE: usize = 40;

/// Identifier an item's failure is reported under.
pub trait Identifiable {
    fn identifier(&self) -> String;
}

impl Identifiable for EncodedResource {
    fn identifier(&self) -> String {
        self.uid.clone()
    }
}

impl Identifiable for Edge {
    fn identifier(&self) -> String {
        self.key()
    }
}

impl Identifiable for String {
    fn identifier(&self) -> String {
        self.clone()
    }
}

/// One store round trip covering every item in `batch`.
#[async_trait]
pub trait BatchOperation<T>: Send + Sync {
    async fn apply(&self, batch: &[T]) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, Default)]
pub struct ChunkedOperationResult {
    pub successful_resources: usize,
    pub resource_errors: HashMap<String, ResourceError>,
    /// When set, the other fields say nothing about what was written.
    pub connection_error: Option<StoreError>,
}

impl ChunkedOperationResult {
    pub fn succeeded(count: usize) -> Self {
        Self {
            successful_resources: count,
            ..Default::default()
        }
    }

    pub fn failed(id: String, error: impl Into<ResourceError>) -> Self {
        let mut resource_errors = HashMap::new();
        resource_errors.insert(id, error.into());
        Self {
            resource_errors,
            ..Default::default()
        }
    }

    pub fn connection_failure(error: StoreError) -> Self {
        Self {
            connection_error: Some(error),
            ..Default::default()
        }
    }

    pub fn is_connection_failure(&self) -> bool {
        self.connection_error.is_some()
    }

    /// Combine two disjoint results. A connection error on either side wins.
    pub fn merge(mut self, other: ChunkedOperationResult) -> Self {
        if let Some(e) = self.connection_error.take().or(other.connection_error) {
            return Self::connection_failure(e);
        }
        self.successful_resources += other.successful_resources;
        self.resource_errors.extend(other.resource_errors);
        self
    }
}

/// Apply `op` to `items` chunk by chunk, stopping at the first chunk that
/// hits a connection error.
pub async fn apply_chunked<T, O>(items: &[T], op: &O) -> ChunkedOperationResult
where
    T: Identifiable + Sync,
    O: BatchOperation<T> + ?Sized,
{
    let mut total = ChunkedOperationResult::default();

    for (i, chunk) in items.chunks(CHUNK_SIZE).enumerate() {
        let result = bisect(chunk, op).await;
        if let Some(e) = result.connection_error {
            warn!("Chunk {} aborted on connection error: {}", i, e);
            return ChunkedOperationResult::connection_failure(e);
        }
        total = total.merge(result);
    }

    total
}

fn bisect<'a, T, O>(items: &'a [T], op: &'a O) -> BoxFuture<'a, ChunkedOperationResult>
where
    T: Identifiable + Sync,
    O: BatchOperation<T> + ?Sized,
{
    Box::pin(async move {
        if items.is_empty() {
            return ChunkedOperationResult::default();
        }

        let error = match op.apply(items).await {
            Ok(()) => return ChunkedOperationResult::succeeded(items.len()),
            Err(e) if e.is_connection() => return ChunkedOperationResult::connection_failure(e),
            Err(e) => e,
        };

        if items.len() == 1 {
            let id = items[0].identifier();
            warn!("Item {} rejected: {}", id, error);
            return ChunkedOperationResult::failed(id, error);
        }

        debug!("Batch of {} failed, bisecting: {}", items.len(), error);
        let (left, right) = items.split_at(items.len() / 2);

        let left = bisect(left, op).await;
        if left.is_connection_failure() {
            return left;
        }
        let right = bisect(right, op).await;
        left.merge(right)
    })
}
