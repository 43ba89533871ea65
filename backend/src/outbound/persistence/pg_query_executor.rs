//! PostgreSQL-backed [`QueryExecutor`].

use async_trait::async_trait;
use sqlx::postgres::{PgArguments, PgConnection};
use sqlx::query::Query;
use sqlx::Postgres;
use tracing::{debug, warn};

use crate::domain::ports::{QueryExecutor, ResultRow, SqlParam, Statement, StoreError};

use super::connection::{ConnectionConfig, close, connect};
use super::pg_error_mapping::map_sqlx_error;
use super::row_decoding::decode_row;

/// Attach positional parameters to a prepared query.
pub(crate) fn bind_params<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    params: &'q [SqlParam],
) -> Query<'q, Postgres, PgArguments> {
    for param in params {
        query = match param {
            SqlParam::Text(value) => query.bind(value.as_str()),
            SqlParam::Uuid(value) => query.bind(*value),
            SqlParam::Decimal(value) => query.bind(*value),
        };
    }
    query
}

/// Run one statement on an already open connection.
pub(crate) async fn fetch_rows(
    connection: &mut PgConnection,
    statement: &Statement,
) -> Result<Vec<sqlx::postgres::PgRow>, StoreError> {
    bind_params(sqlx::query(statement.sql()), statement.params())
        .fetch_all(connection)
        .await
        .map_err(map_sqlx_error)
}

/// Executes each statement on its own short-lived connection.
#[derive(Debug, Clone)]
pub struct PgQueryExecutor {
    config: ConnectionConfig,
}

impl PgQueryExecutor {
    /// Create an executor connecting with `config`.
    pub fn new(config: ConnectionConfig) -> Self {
        Self { config }
    }

    async fn execute_once(&self, statement: &Statement) -> Result<Vec<ResultRow>, StoreError> {
        let mut connection = connect(&self.config).await?;
        let rows = fetch_rows(&mut connection, statement).await;
        close(connection).await;

        let rows = rows?;
        debug!(rows = rows.len(), "statement executed");
        rows.iter().map(decode_row).collect()
    }
}

#[async_trait]
impl QueryExecutor for PgQueryExecutor {
    async fn execute(&self, statement: &Statement) -> Result<Vec<ResultRow>, StoreError> {
        let result = self.execute_once(statement).await;
        if let Err(error) = &result {
            warn!(sql = statement.sql(), %error, "statement failed");
        }
        result
    }
}
