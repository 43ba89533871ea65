//! Port for issuing one ad-hoc statement against the data store.

use async_trait::async_trait;

use super::{ResultRow, Statement, StoreError};

/// Executes a single statement on a connection scoped to that call.
///
/// Implementations must:
/// - acquire a fresh connection per call and release it on every path;
/// - return an empty vector when the statement yields no rows;
/// - classify failures into [`StoreError`] kinds rather than hiding them.
///
/// No session state survives between calls, so anything that must share a
/// transaction belongs to [`super::IdentityElevator`] instead.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Run `statement` and collect every returned row.
    async fn execute(&self, statement: &Statement) -> Result<Vec<ResultRow>, StoreError>;
}
