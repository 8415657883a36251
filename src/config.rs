use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub port: u16,
    pub falkor_host: String,
    pub falkor_port: u16,
    pub falkor_password: Option<String>,
    pub graph_name: String,
    pub max_connections: usize,
    pub idle_ping_secs: u64,
    pub hub_cluster_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3010,
            falkor_host: "localhost".to_string(),
            falkor_port: 6379,
            falkor_password: None,
            graph_name: "search-db".to_string(),
            max_connections: 20,
            idle_ping_secs: 60,
            hub_cluster_name: "local-cluster".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Config {
            port: env::var("PORT")
                .unwrap_or_else(|_| "3010".to_string())
                .parse()?,
            falkor_host: env::var("FALKORDB_HOST").unwrap_or_else(|_| "localhost".to_string()),
            falkor_port: env::var("FALKORDB_PORT")
                .unwrap_or_else(|_| "6379".to_string())
                .parse()?,
            falkor_password: env::var("FALKORDB_PASSWORD").ok().filter(|p| !p.is_empty()),
            graph_name: env::var("GRAPH_NAME").unwrap_or_else(|_| "search-db".to_string()),
            max_connections: env::var("MAX_CONNECTIONS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()?,
            idle_ping_secs: env::var("IDLE_PING_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()?,
            hub_cluster_name: env::var("HUB_CLUSTER_NAME")
                .unwrap_or_else(|_| "local-cluster".to_string()),
        })
    }

    /// Connection URL understood by the FalkorDB client.
    pub fn connection_url(&self) -> String {
        match &self.falkor_password {
            Some(password) => format!(
                "redis://:{}@{}:{}",
                password, self.falkor_host, self.falkor_port
            ),
            None => format!("redis://{}:{}", self.falkor_host, self.falkor_port),
        }
    }

    pub fn idle_ping_threshold(&self) -> Duration {
        Duration::from_secs(self.idle_ping_secs)
    }
}
