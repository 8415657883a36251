pub mod config;
pub mod encoding;
pub mod error;
pub mod falkor;
pub mod handlers;
pub mod models;
pub mod sync;

use std::sync::Arc;

use crate::falkor::GraphStore;
use crate::sync::{ClusterLocks, SyncEngine};

#[derive(Clone)]
pub struct AppState {
    pub engine: SyncEngine,
    pub locks: ClusterLocks,
    pub store: Arc<dyn GraphStore>,
}

impl AppState {
    pub fn new(store: Arc<dyn GraphStore>, engine: SyncEngine) -> Self {
        Self {
            engine,
            locks: ClusterLocks::new(),
            store,
        }
    }
}
