use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{filter::EnvFilter, FmtSubscriber};

use search_sync::config::Config;
use search_sync::falkor::FalkorStore;
use search_sync::handlers::create_router;
use search_sync::sync::{SyncEngine, WriteCache};
use search_sync::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("search_sync=debug,info"));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting search sync service");

    let config = Config::from_env()?;
    info!(
        "Configuration loaded: graph {} on {}:{}",
        config.graph_name, config.falkor_host, config.falkor_port
    );

    // The pool clears the cache when an idle connection turns out dead.
    let cache = WriteCache::new();
    let store = Arc::new(FalkorStore::connect(&config, cache.clone()).await?);
    info!("FalkorDB connection pool initialized");

    let engine = SyncEngine::new(store.clone(), cache, config.hub_cluster_name.clone());
    let app = create_router(AppState::new(store, engine));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Server starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
