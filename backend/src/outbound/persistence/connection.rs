//! Single-use PostgreSQL connections.
//!
//! Adapters open one connection per operation and close it before
//! returning. Nothing is pooled, so no session state survives between
//! operations.

use std::fmt;

use sqlx::postgres::{PgConnectOptions, PgConnection, PgSslMode};
use sqlx::Connection;
use tracing::debug;

use crate::domain::ports::StoreError;

use super::pg_error_mapping::map_sqlx_error;

/// Transport encryption policy for store connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsMode {
    /// Refuse unencrypted connections.
    Require,
    /// Encrypt when the server supports it.
    Prefer,
    /// Never encrypt; local stores only.
    Disable,
}

impl TlsMode {
    /// Parse a configured label, ignoring case.
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "require" => Some(Self::Require),
            "prefer" => Some(Self::Prefer),
            "disable" => Some(Self::Disable),
            _ => None,
        }
    }

    fn ssl_mode(self) -> PgSslMode {
        match self {
            Self::Require => PgSslMode::Require,
            Self::Prefer => PgSslMode::Prefer,
            Self::Disable => PgSslMode::Disable,
        }
    }
}

/// Parameters for reaching the data store.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Host name or address of the store.
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
    pub tls: TlsMode,
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("tls", &self.tls)
            .finish()
    }
}

impl ConnectionConfig {
    /// Driver options for this configuration.
    pub fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .database(&self.database)
            .username(&self.username)
            .password(&self.password)
            .ssl_mode(self.tls.ssl_mode())
    }
}

/// Open a fresh connection.
pub(crate) async fn connect(config: &ConnectionConfig) -> Result<PgConnection, StoreError> {
    PgConnection::connect_with(&config.connect_options())
        .await
        .map_err(map_sqlx_error)
}

/// Close a connection, logging rather than raising close failures.
pub(crate) async fn close(connection: PgConnection) {
    if let Err(error) = connection.close().await {
        debug!(%error, "closing data store connection failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn config() -> ConnectionConfig {
        ConnectionConfig {
            host: "db.internal".to_owned(),
            port: 6543,
            database: "postgres".to_owned(),
            username: "validator".to_owned(),
            password: "hunter2".to_owned(),
            tls: TlsMode::Require,
        }
    }

    #[rstest]
    #[case("require", Some(TlsMode::Require))]
    #[case("Prefer", Some(TlsMode::Prefer))]
    #[case(" disable ", Some(TlsMode::Disable))]
    #[case("verify-full", None)]
    fn parses_tls_labels(#[case] label: &str, #[case] expected: Option<TlsMode>) {
        assert_eq!(TlsMode::parse(label), expected);
    }

    #[rstest]
    fn debug_output_hides_the_password() {
        let rendered = format!("{:?}", config());
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("db.internal"));
    }

    #[rstest]
    fn options_carry_host_port_and_database() {
        let options = config().connect_options();
        assert_eq!(options.get_host(), "db.internal");
        assert_eq!(options.get_port(), 6543);
        assert_eq!(options.get_database(), Some("postgres"));
        assert_eq!(options.get_username(), "validator");
    }
}
