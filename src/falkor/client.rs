use async_trait::async_trait;
use falkordb::{AsyncGraph, FalkorAsyncClient, FalkorClientBuilder, FalkorConnectionInfo};
use tracing::{debug, instrument};

use crate::config::Config;
use crate::error::StoreError;
use crate::falkor::parser::{tabulate, value_to_cell, QueryStats, ResultTable};
use crate::falkor::queries;
use crate::falkor::Ping;

/// One pooled connection to the graph.
pub struct FalkorConnection {
    _client: FalkorAsyncClient,
    graph: AsyncGraph,
}

impl FalkorConnection {
    pub async fn connect(config: &Config) -> Result<Self, StoreError> {
        let conn_info: FalkorConnectionInfo = config
            .connection_url()
            .as_str()
            .try_into()
            .map_err(|e| StoreError::Connection(format!("Invalid connection info: {}", e)))?;

        let client = FalkorClientBuilder::new_async()
            .with_connection_info(conn_info)
            .build()
            .await
            .map_err(connect_error)?;

        let graph = client.select_graph(&config.graph_name);

        Ok(Self {
            _client: client,
            graph,
        })
    }


    #[instrument(skip(self, statement))]
    pub async fn query(&mut self, statement: &str) -> Result<ResultTable, StoreError> {
        debug!("Executing query: {}", statement);

        let result = self
            .graph
            .query(statement)
            .execute()
            .await
            .map_err(|e| StoreError::classify(e.to_string()))?;

        let stats = QueryStats::parse(&result.stats);
        let header = result.header;
        let rows = result
            .data
            .map(|row| row.into_iter().map(value_to_cell).collect())
            .collect::<Vec<Vec<_>>>();

        let (header, rows) = tabulate(&header, rows);
        debug!("Query returned {} rows", rows.len());

        Ok(ResultTable {
            header,
            rows,
            stats,
        })
    }
}

#[async_trait]
impl Ping for FalkorConnection {
    async fn ping(&mut self) -> Result<(), StoreError> {
        self.query(queries::PING).await.map(|_| ())
    }
}

/// Without a built client there is no transport, whatever the driver says.
fn connect_error(e: impl std::fmt::Display) -> StoreError {
    StoreError::Connection(format!("Failed to connect: {}", e))
}
