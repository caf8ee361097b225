use async_trait::async_trait;
use futures::TryStreamExt;
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::{Connection, Executor, Statement};
use tracing::{debug, info, instrument};

use crate::config::ConnectionParams;
use crate::dataset::Dataset;
use crate::errors::{Pg2ParquetError, Result};

pub mod arrow;

use self::arrow::BatchBuilder;

/// Opens the single database session of an invocation.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, params: &ConnectionParams) -> Result<Box<dyn Session>>;
}

/// One live connection. The caller must `close` it exactly once.
#[async_trait]
pub trait Session: Send {
    /// Run `sql` once and materialize every row.
    async fn query(&mut self, sql: &str) -> Result<Dataset>;

    async fn close(self: Box<Self>) -> Result<()>;
}

//=============== PostgreSQL ==================================================//

#[derive(Debug, Clone, Default)]
pub struct PgConnector;

impl PgConnector {
    pub fn new() -> Self {
        Self
    }

    pub fn connect_options(params: &ConnectionParams) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&params.host)
            .port(params.port)
            .username(&params.user)
            .password(&params.password)
            .database(&params.database)
            .application_name("pg2parquet")
    }
}

#[async_trait]
impl Connector for PgConnector {
    #[instrument(skip_all, fields(host = %params.host, port = params.port, db = %params.database))]
    async fn connect(&self, params: &ConnectionParams) -> Result<Box<dyn Session>> {
        info!("connecting to database");
        let conn = PgConnection::connect_with(&Self::connect_options(params))
            .await
            .map_err(Pg2ParquetError::Connection)?;
        info!("connected to database");

        Ok(Box::new(PgSession { conn }))
    }
}

pub struct PgSession {
    conn: PgConnection,
}

fn query_err(e: sqlx::Error) -> Pg2ParquetError {
    Pg2ParquetError::Query(e.to_string())
}

#[async_trait]
impl Session for PgSession {
    #[instrument(skip_all)]
    async fn query(&mut self, sql: &str) -> Result<Dataset> {
        info!("executing query");

        // Prepare first so the column list is known even for an empty result.
        let stmt = (&mut self.conn).prepare(sql).await.map_err(query_err)?;
        let mut builder = BatchBuilder::for_columns(stmt.columns())?;
        debug!(columns = stmt.columns().len(), "statement prepared");

        let mut rows = stmt.query().fetch(&mut self.conn);
        while let Some(row) = rows.try_next().await.map_err(query_err)? {
            builder.push(&row)?;
        }

        let dataset = builder.finish()?;
        info!(
            rows = dataset.num_rows(),
            columns = dataset.num_columns(),
            "query result materialized"
        );
        Ok(dataset)
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.conn.close().await.map_err(Pg2ParquetError::Connection)?;
        info!("database connection closed");
        Ok(())
    }
}
