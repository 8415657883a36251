use async_trait::async_trait;
use deadpool::managed::{Manager, Metrics, Object, Pool, PoolError, RecycleResult};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::StoreError;
use crate::sync::cache::WriteCache;

pub mod client;
pub mod parser;
pub mod queries;

pub use self::client::FalkorConnection;
pub use self::parser::{QueryStats, ResultTable};

/// Anything that can execute a rendered statement against the graph.
#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn query(&self, statement: &str) -> Result<ResultTable, StoreError>;

    async fn ping(&self) -> Result<(), StoreError> {
        self.query(queries::PING).await.map(|_| ())
    }
}

pub type FalkorPool = Pool<FalkorManager>;
pub type PooledConnection = Object<FalkorManager>;

pub struct FalkorManager {
    config: Arc<Config>,
    cache: WriteCache,
}

impl FalkorManager {
    pub fn new(config: &Config, cache: WriteCache) -> Self {
        Self {
            config: Arc::new(config.clone()),
            cache,
        }
    }
}

#[async_trait]
impl Manager for FalkorManager {
    type Type = FalkorConnection;
    type Error = StoreError;

    async fn create(&self) -> Result<FalkorConnection, Self::Error> {
        debug!("Creating new FalkorDB connection");
        FalkorConnection::connect(&self.config).await
    }

    async fn recycle(
        &self,
        conn: &mut FalkorConnection,
        metrics: &Metrics,
    ) -> RecycleResult<Self::Error> {
        check_liveness(
            conn,
            metrics.last_used(),
            self.config.idle_ping_threshold(),
            &self.cache,
        )
        .await?;
        Ok(())
    }
}

/// A single connection that can prove it is still alive.
#[async_trait]
pub trait Ping: Send {
    async fn ping(&mut self) -> Result<(), StoreError>;
}

/// Connections idle for less than `threshold` are trusted without a round
/// trip. A failed ping invalidates the write cache.
pub async fn check_liveness<C: Ping>(
    conn: &mut C,
    idle: Duration,
    threshold: Duration,
    cache: &WriteCache,
) -> Result<(), StoreError> {
    if idle < threshold {
        return Ok(());
    }

    if let Err(e) = conn.ping().await {
        warn!("Idle connection failed liveness check, dropping write cache: {}", e);
        cache.clear().await;
        return Err(e);
    }
    Ok(())
}

pub async fn create_falkor_pool(config: &Config, cache: WriteCache) -> Result<FalkorPool, StoreError> {
    let manager = FalkorManager::new(config, cache);

    let pool = Pool::builder(manager)
        .max_size(config.max_connections)
        .build()
        .map_err(|e| StoreError::Connection(format!("Failed to create pool: {e}")))?;

    // Test connection
    let conn = pool.get().await.map_err(pool_error)?;
    drop(conn);

    info!(
        "FalkorDB connection pool created with up to {} connections",
        config.max_connections
    );
    Ok(pool)
}

fn pool_error(e: PoolError<StoreError>) -> StoreError {
    match e {
        // Checkout only creates or recycles, so any backend failure means
        // no usable transport.
        PoolError::Backend(StoreError::Query(msg)) => StoreError::Connection(msg),
        PoolError::Backend(e) => e,
        other => StoreError::Connection(format!("Failed to get connection: {other}")),
    }
}

/// Pool-backed store. Each query checks out one connection, which returns to
/// the pool when dropped on every exit path.
#[derive(Clone)]
pub struct FalkorStore {
    pool: FalkorPool,
}

impl FalkorStore {
    pub fn new(pool: FalkorPool) -> Self {
        Self { pool }
    }

    pub async fn connect(config: &Config, cache: WriteCache) -> Result<Self, StoreError> {
        Ok(Self::new(create_falkor_pool(config, cache).await?))
    }
}

#[async_trait]
impl GraphStore for FalkorStore {
    async fn query(&self, statement: &str) -> Result<ResultTable, StoreError> {
        let mut conn = self.pool.get().await.map_err(pool_error)?;
        conn.query(statement).await
    }
}
