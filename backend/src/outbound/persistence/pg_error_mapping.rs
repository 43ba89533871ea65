//! Map `sqlx` failures onto [`StoreError`] kinds.

use tracing::debug;

use crate::domain::ports::{StoreError, mentions_authorization_failure};

/// SQLSTATE raised when the executing role lacks a privilege.
const INSUFFICIENT_PRIVILEGE: &str = "42501";
/// SQLSTATE of a plain `RAISE EXCEPTION` inside a procedure.
const RAISE_EXCEPTION: &str = "P0001";
/// SQLSTATE classes for connection exceptions and invalid authorization.
const CONNECTION_CLASSES: [&str; 2] = ["08", "28"];

/// Classify a database-reported failure by SQLSTATE and message.
///
/// Procedures raise a plain exception (`P0001`) for a refused caller, so the
/// message is consulted for that code and for errors without one. Any other
/// SQLSTATE names a SQL failure whatever its message mentions.
pub fn classify_database_error(code: Option<&str>, message: &str) -> StoreError {
    match code {
        Some(INSUFFICIENT_PRIVILEGE) => StoreError::authorization(message),
        Some(code) if CONNECTION_CLASSES.iter().any(|class| code.starts_with(class)) => {
            StoreError::connection(message)
        }
        Some(RAISE_EXCEPTION) | None if mentions_authorization_failure(message) => {
            StoreError::authorization(message)
        }
        _ => StoreError::query(message),
    }
}

/// Map a driver error into the port error.
pub fn map_sqlx_error(error: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_error) = &error {
        let code = db_error.code();
        debug!(code = code.as_deref(), message = db_error.message(), "database error");
        return classify_database_error(code.as_deref(), db_error.message());
    }

    let message = error.to_string();
    if matches!(
        error,
        sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Protocol(_)
            | sqlx::Error::Configuration(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
    ) {
        StoreError::connection(message)
    } else {
        StoreError::query(message)
    }
}
