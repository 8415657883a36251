#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::Mutex;

use search_sync::error::StoreError;
use search_sync::falkor::{GraphStore, QueryStats, ResultTable};

type Responder = Box<dyn Fn(&str) -> Result<ResultTable, StoreError> + Send + Sync>;

/// Scripted store: records every statement and answers through a closure.
pub struct MockStore {
    responder: Responder,
    statements: Mutex<Vec<String>>,
}

impl MockStore {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&str) -> Result<ResultTable, StoreError> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            statements: Mutex::new(Vec::new()),
        }
    }

    /// Store that accepts every write and holds nothing.
    pub fn healthy() -> Self {
        Self::new(|stmt| Ok(accept(stmt)))
    }

    /// Store whose transport is gone.
    pub fn unreachable() -> Self {
        Self::new(|_| Err(StoreError::Connection("Connection refused".to_string())))
    }

    pub fn statements(&self) -> Vec<String> {
        self.statements.lock().unwrap().clone()
    }

    /// Statements containing `needle`.
    pub fn matching(&self, needle: &str) -> Vec<String> {
        self.statements()
            .into_iter()
            .filter(|s| s.contains(needle))
            .collect()
    }
}

#[async_trait]
impl GraphStore for MockStore {
    async fn query(&self, statement: &str) -> Result<ResultTable, StoreError> {
        self.statements.lock().unwrap().push(statement.to_string());
        (self.responder)(statement)
    }
}

/// Plausible reply of a store where every referenced node exists.
pub fn accept(statement: &str) -> ResultTable {
    if statement.ends_with("RETURN count(*) AS matched") {
        return ResultTable::new(vec!["matched".to_string()], vec![vec![Some("1".to_string())]]);
    }
    let mut stats = QueryStats::default();
    if statement.starts_with("MATCH (s0") && statement.contains(" CREATE ") {
        stats.relationships_created = statement.matches("]->(d").count();
    } else if statement.contains("-[r0:") {
        stats.relationships_deleted = statement.matches("]->(d").count();
    }
    ResultTable::default().with_stats(stats)
}

/// Table shaped like the result of `RETURN n` over nodes with these
/// properties.
pub fn node_table(nodes: &[Vec<(&str, &str)>]) -> ResultTable {
    let mut keys: Vec<&str> = nodes.iter().flatten().map(|(k, _)| *k).collect();
    keys.sort();
    keys.dedup();

    let header = keys.iter().map(|k| format!("n.{}", k)).collect();
    let rows = nodes
        .iter()
        .map(|props| {
            keys.iter()
                .map(|k| props.iter().find(|(pk, _)| pk == k).map(|(_, v)| v.to_string()))
                .collect()
        })
        .collect();
    ResultTable::new(header, rows)
}

pub fn edge_table(edges: &[(&str, &str, &str)]) -> ResultTable {
    ResultTable::new(
        vec!["source".to_string(), "type".to_string(), "dest".to_string()],
        edges
            .iter()
            .map(|(s, t, d)| vec![Some(s.to_string()), Some(t.to_string()), Some(d.to_string())])
            .collect(),
    )
}

pub fn hash_table(hashes: &[&str]) -> ResultTable {
    ResultTable::new(
        vec!["hash".to_string()],
        hashes.iter().map(|h| vec![Some(h.to_string())]).collect(),
    )
}
