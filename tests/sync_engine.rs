mod support;

use std::sync::Arc;
use std::time::Duration;

use search_sync::encoding::{encode_resource, EncodeContext};
use search_sync::error::{StoreError, SyncError};
use search_sync::falkor::{QueryStats, ResultTable};
use search_sync::models::{DeleteResourceEvent, Edge, ReconcileRequest, Resource, SyncRequest};
use search_sync::sync::{SyncEngine, WriteCache};
use support::{accept, edge_table, hash_table, MockStore};

const CLUSTER: &str = "edge-01";
const HUB: &str = "local-cluster";

fn pod(uid: &str, name: &str) -> Resource {
    Resource::new("Pod", uid)
        .with_hash(format!("hash-{}", uid))
        .with_property("name", name)
        .with_property("namespace", "default")
}

/// Nodes as the store returns them after `resources` were written.
fn stored_nodes(resources: &[Resource]) -> ResultTable {
    let ctx = EncodeContext::new(CLUSTER, HUB);
    let encoded: Vec<Vec<(String, String)>> = resources
        .iter()
        .map(|r| {
            encode_resource(r, &ctx)
                .unwrap()
                .properties
                .iter()
                .map(|(k, v)| (k.clone(), v.as_text()))
                .collect()
        })
        .collect();
    let borrowed: Vec<Vec<(&str, &str)>> = encoded
        .iter()
        .map(|props| props.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect())
        .collect();
    support::node_table(&borrowed)
}

fn store_with(nodes: ResultTable, edges: ResultTable, hashes: ResultTable) -> Arc<MockStore> {
    Arc::new(MockStore::new(move |stmt| {
        if stmt.ends_with("RETURN n") {
            Ok(nodes.clone())
        } else if stmt.contains("AS source") {
            Ok(edges.clone())
        } else if stmt.ends_with("AS hash") {
            Ok(hashes.clone())
        } else {
            Ok(accept(stmt))
        }
    }))
}

fn engine(store: &Arc<MockStore>) -> SyncEngine {
    SyncEngine::new(store.clone(), WriteCache::new(), HUB)
}

fn writes(store: &MockStore) -> Vec<String> {
    store
        .statements()
        .into_iter()
        .filter(|s| s.contains("CREATE (") || s.contains(" DELETE ") || s.contains("AS matched"))
        .collect()
}

#[tokio::test]
async fn resync_only_adds_new_resources() {
    let a = pod("a", "web");
    let b = pod("b", "api");
    let store = store_with(
        stored_nodes(&[a.clone()]),
        ResultTable::default(),
        hash_table(&["hash-a", "hash-b"]),
    );

    let request = ReconcileRequest {
        resources: vec![a, b],
        edges: vec![],
    };
    let outcome = engine(&store)
        .resync(CLUSTER, request, Duration::ZERO)
        .await
        .unwrap();

    let creates = store.matching("CREATE (:");
    assert_eq!(creates.len(), 1);
    assert!(creates[0].contains("'b'"));
    assert!(!creates[0].contains("'a'"));
    assert!(store.matching("AS matched").is_empty());
    assert!(store.matching("IN [").is_empty());

    assert_eq!(outcome.response.total_added, 1);
    assert_eq!(outcome.response.total_updated, 0);
    assert_eq!(outcome.response.total_deleted, 0);
    assert_eq!(outcome.response.total_resources, 2);
    assert!(outcome.connection_error.is_none());
}

#[tokio::test]
async fn resync_updates_changed_and_deletes_missing() {
    let store = store_with(
        stored_nodes(&[pod("a", "web"), pod("c", "db")]),
        ResultTable::default(),
        hash_table(&["hash-a"]),
    );

    let request = ReconcileRequest {
        resources: vec![pod("a", "web-v2")],
        edges: vec![],
    };
    let outcome = engine(&store)
        .resync(CLUSTER, request, Duration::ZERO)
        .await
        .unwrap();

    let updates = store.matching("AS matched");
    assert_eq!(updates.len(), 1);
    assert!(updates[0].contains("'web-v2'"));
    let deletes = store.matching("IN [");
    assert_eq!(deletes.len(), 1);
    assert!(deletes[0].contains("['c']"));

    assert_eq!(outcome.response.total_updated, 1);
    assert_eq!(outcome.response.total_deleted, 1);
}

#[tokio::test]
async fn resync_diffs_edges() {
    let store = store_with(
        ResultTable::default(),
        edge_table(&[("x", "ownedBy", "y"), ("x", "runsOn", "z")]),
        hash_table(&[]),
    );

    let request = ReconcileRequest {
        resources: vec![],
        edges: vec![Edge::new("x", "ownedBy", "y"), Edge::new("y", "ownedBy", "w")],
    };
    let outcome = engine(&store)
        .resync(CLUSTER, request, Duration::ZERO)
        .await
        .unwrap();

    let deleted = store.matching("-[r0:");
    assert_eq!(deleted.len(), 1);
    assert!(deleted[0].contains("`runsOn`"));
    assert!(deleted[0].contains("'z'"));

    let created: Vec<_> = store
        .matching(" CREATE ")
        .into_iter()
        .filter(|s| s.starts_with("MATCH (s0"))
        .collect();
    assert_eq!(created.len(), 1);
    assert!(created[0].contains("'w'"));

    assert_eq!(outcome.response.total_edges_added, 1);
    assert_eq!(outcome.response.total_edges_deleted, 1);

    // New relationships land before stale ones are removed.
    let statements = store.statements();
    let create_at = statements
        .iter()
        .position(|s| s.starts_with("MATCH (s0") && s.contains(" CREATE "))
        .unwrap();
    let delete_at = statements.iter().position(|s| s.contains("-[r0:")).unwrap();
    assert!(create_at < delete_at);
}

#[tokio::test]
async fn resync_of_converged_state_writes_nothing() {
    let resources = vec![pod("a", "web"), pod("b", "api")];
    let edges = vec![Edge::new("a", "ownedBy", "b")];
    let store = store_with(
        stored_nodes(&resources),
        edge_table(&[("a", "ownedBy", "b")]),
        hash_table(&["hash-a", "hash-b"]),
    );

    let outcome = engine(&store)
        .resync(CLUSTER, ReconcileRequest { resources, edges }, Duration::ZERO)
        .await
        .unwrap();

    assert!(writes(&store).is_empty(), "unexpected writes: {:?}", writes(&store));
    assert_eq!(outcome.response.total_added, 0);
    assert_eq!(outcome.response.total_updated, 0);
    assert_eq!(outcome.response.total_deleted, 0);
}

#[tokio::test]
async fn resync_removes_duplicated_uids_and_recreates() {
    let a = pod("a", "web");
    let mut nodes = stored_nodes(&[a.clone()]);
    let copy = nodes.rows[0].clone();
    nodes.rows.push(copy);
    let store = store_with(nodes, ResultTable::default(), hash_table(&["hash-a"]));

    let outcome = engine(&store)
        .resync(CLUSTER, ReconcileRequest { resources: vec![a], edges: vec![] }, Duration::ZERO)
        .await
        .unwrap();

    let statements = store.statements();
    let delete_at = statements.iter().position(|s| s.contains("IN ['a']")).unwrap();
    let create_at = statements.iter().position(|s| s.starts_with("CREATE (:")).unwrap();
    assert!(delete_at < create_at);
    assert_eq!(outcome.response.total_added, 1);
}

#[tokio::test]
async fn resync_reports_unreachable_store() {
    let store = Arc::new(MockStore::unreachable());
    let engine = engine(&store);
    engine.cache().set("a", 1).await;

    let outcome = engine
        .resync(
            CLUSTER,
            ReconcileRequest {
                resources: vec![pod("a", "web")],
                edges: vec![],
            },
            Duration::ZERO,
        )
        .await
        .unwrap();

    assert!(matches!(outcome.connection_error, Some(StoreError::Connection(_))));
    assert!(outcome.response.connection_error.is_some());
    assert!(engine.cache().is_empty().await);
}

#[tokio::test]
async fn sync_applies_every_phase() {
    let store = store_with(ResultTable::default(), ResultTable::default(), hash_table(&["h1"]));

    let request = SyncRequest {
        add_resources: vec![pod("a", "web")],
        update_resources: vec![pod("b", "api")],
        delete_resources: vec![DeleteResourceEvent { uid: "c".to_string() }],
        add_edges: vec![Edge::new("a", "ownedBy", "b")],
        delete_edges: vec![Edge::new("c", "ownedBy", "b")],
        ..Default::default()
    };
    let outcome = engine(&store)
        .sync(CLUSTER, request, Duration::from_millis(12))
        .await
        .unwrap();

    let response = &outcome.response;
    assert_eq!(response.total_added, 1);
    assert_eq!(response.total_updated, 1);
    assert_eq!(response.total_deleted, 1);
    assert_eq!(response.total_edges_added, 1);
    assert_eq!(response.total_edges_deleted, 1);
    assert_eq!(response.total_resources, 1);
    assert!(response.last_updated.is_some());

    let status = store.matching("MERGE");
    assert_eq!(status.len(), 1);
    assert!(status[0].contains("`max_queue_time_ms` = 12"));
    assert!(status[0].contains(&format!("'{}'", response.hash)));
}

#[tokio::test]
async fn sync_skips_unchanged_updates() {
    let store = store_with(ResultTable::default(), ResultTable::default(), hash_table(&[]));
    let engine = engine(&store);

    for _ in 0..2 {
        let request = SyncRequest {
            update_resources: vec![pod("a", "web")],
            ..Default::default()
        };
        engine.sync(CLUSTER, request, Duration::ZERO).await.unwrap();
    }
    assert_eq!(store.matching("AS matched").len(), 1);

    let request = SyncRequest {
        update_resources: vec![pod("a", "web-v2")],
        ..Default::default()
    };
    engine.sync(CLUSTER, request, Duration::ZERO).await.unwrap();
    assert_eq!(store.matching("AS matched").len(), 2);
}

#[tokio::test]
async fn sync_reports_update_of_missing_resource() {
    let store = Arc::new(MockStore::new(|stmt| {
        if stmt.ends_with("AS matched") && stmt.contains("'ghost'") {
            Ok(ResultTable::new(
                vec!["matched".to_string()],
                vec![vec![Some("0".to_string())]],
            ))
        } else {
            Ok(accept(stmt))
        }
    }));

    let request = SyncRequest {
        update_resources: vec![pod("a", "web"), pod("ghost", "gone"), pod("c", "db")],
        ..Default::default()
    };
    let outcome = engine(&store).sync(CLUSTER, request, Duration::ZERO).await.unwrap();

    assert_eq!(outcome.response.total_updated, 2);
    assert_eq!(outcome.response.update_errors.len(), 1);
    assert_eq!(outcome.response.update_errors[0].id, "ghost");
}

#[tokio::test]
async fn sync_isolates_edge_with_missing_endpoint() {
    let store = Arc::new(MockStore::new(|stmt| {
        if stmt.contains(" CREATE ") && stmt.contains("'ghost'") {
            Ok(ResultTable::default())
        } else {
            Ok(accept(stmt))
        }
    }));

    let request = SyncRequest {
        add_edges: vec![
            Edge::new("a", "ownedBy", "b"),
            Edge::new("ghost", "ownedBy", "b"),
            Edge::new("c", "ownedBy", "d"),
        ],
        ..Default::default()
    };
    let outcome = engine(&store).sync(CLUSTER, request, Duration::ZERO).await.unwrap();

    assert_eq!(outcome.response.total_edges_added, 2);
    assert_eq!(outcome.response.add_edge_errors.len(), 1);
    assert_eq!(outcome.response.add_edge_errors[0].id, "ghost-ownedBy->b");
}

#[tokio::test]
async fn sync_deletes_resource_together_with_its_edges() {
    // Deleting `c` drops its relationships too, so the later edge delete
    // finds nothing to match.
    let store = Arc::new(MockStore::new(|stmt| {
        if stmt.contains("-[r0:") && stmt.contains("'c'") {
            Ok(ResultTable::default())
        } else {
            Ok(accept(stmt))
        }
    }));

    let request = SyncRequest {
        delete_resources: vec![DeleteResourceEvent { uid: "c".to_string() }],
        delete_edges: vec![Edge::new("c", "ownedBy", "b"), Edge::new("x", "ownedBy", "y")],
        ..Default::default()
    };
    let outcome = engine(&store).sync(CLUSTER, request, Duration::ZERO).await.unwrap();

    assert_eq!(outcome.response.total_deleted, 1);
    assert_eq!(outcome.response.total_edges_deleted, 2);
    assert!(outcome.response.delete_edge_errors.is_empty());
    assert!(outcome.connection_error.is_none());
    // Whole batch, then each edge on its own.
    assert_eq!(store.matching("-[r0:").len(), 3);
}

#[tokio::test]
async fn sync_reports_unencodable_resources() {
    let store = Arc::new(MockStore::healthy());
    let request = SyncRequest {
        add_resources: vec![
            pod("a", "web"),
            Resource::new("Pod", "bad").with_property("name", "o'neil"),
        ],
        ..Default::default()
    };
    let outcome = engine(&store).sync(CLUSTER, request, Duration::ZERO).await.unwrap();

    assert_eq!(outcome.response.total_added, 1);
    assert_eq!(outcome.response.add_errors.len(), 1);
    assert_eq!(outcome.response.add_errors[0].id, "bad");
}

#[tokio::test]
async fn sync_clear_all_removes_cluster_first() {
    let store = Arc::new(MockStore::new(|stmt| {
        if stmt.ends_with("DELETE n") && stmt.starts_with("MATCH (n {") {
            let stats = QueryStats {
                nodes_deleted: 5,
                ..Default::default()
            };
            Ok(ResultTable::default().with_stats(stats))
        } else {
            Ok(accept(stmt))
        }
    }));

    let request = SyncRequest {
        clear_all: true,
        add_resources: vec![pod("a", "web")],
        ..Default::default()
    };
    let outcome = engine(&store).sync(CLUSTER, request, Duration::ZERO).await.unwrap();

    let statements = store.statements();
    assert!(statements[0].contains("'edge-01'") && statements[0].ends_with("DELETE n"));
    assert_eq!(outcome.response.total_deleted, 5);
    assert_eq!(outcome.response.total_added, 1);
}

#[tokio::test]
async fn sync_keeps_going_after_connection_loss() {
    let store = Arc::new(MockStore::unreachable());
    let request = SyncRequest {
        add_resources: vec![pod("a", "web")],
        add_edges: vec![Edge::new("a", "ownedBy", "b")],
        ..Default::default()
    };
    let outcome = engine(&store).sync(CLUSTER, request, Duration::ZERO).await.unwrap();

    assert!(outcome.connection_error.is_some());
    assert_eq!(outcome.response.total_added, 0);
    // Index creation, edge insert, hash fetch all attempted.
    assert!(store.statements().len() >= 3);
}

#[tokio::test]
async fn sync_rejects_invalid_cluster_name() {
    let store = Arc::new(MockStore::healthy());
    let result = engine(&store)
        .sync("bad'cluster", SyncRequest::default(), Duration::ZERO)
        .await;
    assert!(matches!(result, Err(SyncError::InvalidRequest(_))));
    assert!(store.statements().is_empty());
}
