//! Domain ports for the data store boundary.
//!
//! Probes talk to the store only through these traits, which keeps them
//! testable against mocks and the in-memory store.

mod macros;
pub(crate) use macros::define_port_error;

mod identity_elevator;
mod query_executor;
mod statement;
mod store_error;

#[cfg(test)]
pub use identity_elevator::MockIdentityElevator;
pub use identity_elevator::{
    CallerContext, DEFAULT_CALLER_ROLE, DepositRequest, ElevationClaims, IdentityElevator,
    ProcedureCall, ProcedureResponse, REQUEST_NEW_DEPOSIT_SQL, SETTLE_BINARY_ORDER_SQL,
    SettlementRequest, TransactionMode,
};
#[cfg(test)]
pub use query_executor::MockQueryExecutor;
pub use query_executor::QueryExecutor;
pub use statement::{ResultRow, RowError, SqlParam, SqlValue, Statement, nullable};
pub use store_error::{StoreError, StoreErrorKind, mentions_authorization_failure};
