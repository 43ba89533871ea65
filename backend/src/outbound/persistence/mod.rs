//! PostgreSQL adapters using `sqlx`.
//!
//! The persistence layer follows these principles:
//!
//! - **No pooling**: every operation opens and closes its own connection,
//!   so session state never carries over between operations.
//! - **Shared-transaction elevation**: caller claims and the procedure call
//!   share one connection and one transaction.
//! - **Classified errors**: driver errors are mapped to `StoreError` kinds.
//!
//! # Example
//!
//! ```ignore
//! use backend_validator::outbound::persistence::{ConnectionConfig, PgQueryExecutor};
//!
//! let executor = PgQueryExecutor::new(config);
//! let rows = executor.execute(&statement).await?;
//! ```

mod connection;
mod pg_error_mapping;
mod pg_identity_elevator;
mod pg_query_executor;
mod row_decoding;

pub use connection::{ConnectionConfig, TlsMode};
pub use pg_error_mapping::{classify_database_error, map_sqlx_error};
pub use pg_identity_elevator::{
    PgIdentityElevator, SET_CLAIMS_SQL, SET_ROLE_SQL, elevation_statements,
};
pub use pg_query_executor::PgQueryExecutor;
