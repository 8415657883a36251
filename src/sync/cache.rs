use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::encoding::StoreValue;

#[derive(Default)]
struct CacheState {
    fingerprints: HashMap<String, u64>,
    indexed_kinds: HashSet<String>,
}

/// Process-wide record of what was last written, used to skip identical
/// writes and repeated index creation. Losing it only costs redundant writes,
/// so it is cleared wholesale whenever the store connection is in doubt.
#[derive(Clone, Default)]
pub struct WriteCache {
    inner: Arc<RwLock<CacheState>>,
}

pub fn fingerprint(properties: &BTreeMap<String, StoreValue>) -> u64 {
    let mut hasher = DefaultHasher::new();
    properties.hash(&mut hasher);
    hasher.finish()
}

impl WriteCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, uid: &str) -> Option<u64> {
        self.inner.read().await.fingerprints.get(uid).copied()
    }

    pub async fn set(&self, uid: impl Into<String>, fingerprint: u64) {
        self.inner
            .write()
            .await
            .fingerprints
            .insert(uid.into(), fingerprint);
    }

    pub async fn delete(&self, uid: &str) {
        self.inner.write().await.fingerprints.remove(uid);
    }

    /// True when `properties` is exactly what was last written for `uid`.
    pub async fn is_unchanged(&self, uid: &str, properties: &BTreeMap<String, StoreValue>) -> bool {
        self.get(uid).await == Some(fingerprint(properties))
    }

    pub async fn clear(&self) {
        let mut state = self.inner.write().await;
        debug!(
            "Clearing write cache ({} entries, {} indexed kinds)",
            state.fingerprints.len(),
            state.indexed_kinds.len()
        );
        state.fingerprints.clear();
        state.indexed_kinds.clear();
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.fingerprints.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Kinds from `kinds` that have no known uid index yet.
    pub async fn unindexed_kinds<'a, I>(&self, kinds: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let state = self.inner.read().await;
        let mut missing: Vec<String> = kinds
            .into_iter()
            .filter(|k| !state.indexed_kinds.contains(*k))
            .map(str::to_string)
            .collect();
        missing.sort();
        missing.dedup();
        missing
    }

    pub async fn mark_indexed(&self, kind: impl Into<String>) {
        self.inner.write().await.indexed_kinds.insert(kind.into());
    }
}
