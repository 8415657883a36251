use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

use search_sync::config::Config;
use search_sync::falkor::{FalkorStore, GraphStore};
use search_sync::models::{Edge, ReconcileRequest, Resource};
use search_sync::sync::{SyncEngine, WriteCache};

const CLUSTER: &str = "live-test-cluster";

fn live_config() -> Config {
    Config {
        graph_name: "search-sync-live-test".to_string(),
        max_connections: 4,
        ..Config::default()
    }
}

fn inventory() -> ReconcileRequest {
    ReconcileRequest {
        resources: vec![
            Resource::new("Pod", "live/pod-a")
                .with_hash("ha")
                .with_property("name", "web-0")
                .with_property("namespace", "default")
                .with_property("restarts", 1i64),
            Resource::new("ReplicaSet", "live/rs-b")
                .with_hash("hb")
                .with_property("name", "web")
                .with_property("namespace", "default"),
        ],
        edges: vec![Edge::new("live/pod-a", "ownedBy", "live/rs-b").with_kinds("Pod", "ReplicaSet")],
    }
}

#[tokio::test]
#[ignore = "Requires FalkorDB instance running on localhost:6379"]
async fn test_resync_converges_against_falkordb() -> Result<()> {
    let config = live_config();
    let cache = WriteCache::new();
    let store = Arc::new(FalkorStore::connect(&config, cache.clone()).await?);
    store.ping().await?;

    let engine = SyncEngine::new(store.clone(), cache, "local-cluster");

    let first = engine.resync(CLUSTER, inventory(), Duration::ZERO).await?;
    println!("First resync: {:?}", first.response);
    assert!(first.connection_error.is_none());
    assert_eq!(first.response.total_resources, 2);

    let second = engine.resync(CLUSTER, inventory(), Duration::ZERO).await?;
    assert_eq!(second.response.total_added, 0);
    assert_eq!(second.response.total_updated, 0);
    assert_eq!(second.response.total_deleted, 0);
    assert_eq!(second.response.total_edges_added, 0);
    assert_eq!(second.response.hash, first.response.hash);

    let status = engine.status(CLUSTER).await?;
    assert_eq!(status.total_resources, 2);

    // Leave the graph empty for the next run.
    let emptied = engine
        .resync(CLUSTER, ReconcileRequest::default(), Duration::ZERO)
        .await?;
    assert_eq!(emptied.response.total_resources, 0);
    Ok(())
}
