use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Serializes syncs of the same cluster while letting different clusters
/// proceed in parallel.
#[derive(Clone, Default)]
pub struct ClusterLocks {
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

/// Held for the duration of one cluster sync.
pub struct ClusterGuard {
    _guard: OwnedMutexGuard<()>,
    pub waited: Duration,
}

impl ClusterLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, cluster: &str) -> ClusterGuard {
        let start = Instant::now();
        let mutex = self
            .locks
            .entry(cluster.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        // The dashmap shard lock is released before awaiting.
        let guard = mutex.lock_owned().await;
        ClusterGuard {
            _guard: guard,
            waited: start.elapsed(),
        }
    }

    /// True while some task holds the lock for `cluster`.
    pub fn is_busy(&self, cluster: &str) -> bool {
        self.locks
            .get(cluster)
            .map(|m| m.try_lock().is_err())
            .unwrap_or(false)
    }
}
