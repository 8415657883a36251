use chrono::{DateTime, Utc};
use sha1::{Digest, Sha1};
use tracing::debug;

use crate::error::StoreError;
use crate::falkor::{queries, GraphStore, ResultTable};
use crate::models::ClusterStatus;

/// Digest of a set of resource hashes, independent of the order they were
/// read in. Missing hashes count as empty strings.
pub fn digest_hashes<I>(hashes: I) -> String
where
    I: IntoIterator<Item = String>,
{
    let mut hashes: Vec<String> = hashes.into_iter().collect();
    hashes.sort();

    let mut hasher = Sha1::new();
    for h in &hashes {
        hasher.update(h.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Resource count and digest from a `hash` column result.
pub fn summarize_hashes(table: &ResultTable) -> (usize, String) {
    let column = table.column_index().get("hash").copied();
    let hashes = table.rows.iter().map(|row| {
        column
            .and_then(|i| row.get(i).cloned().flatten())
            .unwrap_or_default()
    });
    (table.rows.len(), digest_hashes(hashes))
}

/// Number of resources stored for `cluster` and the digest of their hashes.
pub async fn cluster_hash(store: &dyn GraphStore, cluster: &str) -> Result<(usize, String), StoreError> {
    let table = store.query(&queries::fetch_cluster_hashes(cluster)).await?;
    let (total, digest) = summarize_hashes(&table);
    debug!("Cluster {} holds {} resources, digest {}", cluster, total, digest);
    Ok((total, digest))
}

pub async fn save_cluster_status(store: &dyn GraphStore, status: &ClusterStatus) -> Result<(), StoreError> {
    store
        .query(&queries::save_cluster_status(status))
        .await
        .map(|_| ())
}

/// Last status recorded for `cluster`, if any.
pub async fn load_cluster_status(
    store: &dyn GraphStore,
    cluster: &str,
) -> Result<Option<ClusterStatus>, StoreError> {
    let table = store.query(&queries::load_cluster_status(cluster)).await?;
    if table.is_empty() {
        return Ok(None);
    }
    parse_status(&table, cluster).map(Some)
}

fn parse_status(table: &ResultTable, cluster: &str) -> Result<ClusterStatus, StoreError> {
    let malformed = |field: &str| StoreError::Query(format!("Malformed status for {}: {}", cluster, field));

    let last_updated = table
        .cell(0, "last_updated")
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
        .ok_or_else(|| malformed("last_updated"))?;
    let total_resources = table
        .cell(0, "total_resources")
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| malformed("total_resources"))?;

    Ok(ClusterStatus {
        cluster: cluster.to_string(),
        hash: table.cell(0, "hash").unwrap_or_default().to_string(),
        last_updated,
        total_resources,
        max_queue_time_ms: table
            .cell(0, "max_queue_time_ms")
            .and_then(|s| s.parse().ok())
            .unwrap_or(0),
    })
}
