//! Classified failures raised by data store adapters.
//!
//! Probes need to tell a transport problem apart from a procedure refusing
//! the caller, so every adapter reports one of these kinds instead of an
//! absent result.

use super::define_port_error;

define_port_error! {
    /// Errors raised by the query executor and identity elevator adapters.
    pub enum StoreError {
        /// The store could not be reached or the session could not be opened.
        Connection { message: String } => "data store connection failed: {message}",
        /// A procedure or the store refused the caller's privileges.
        Authorization { message: String } => "caller not authorized: {message}",
        /// A procedure reported a business-level refusal.
        Rejected { message: String } => "procedure rejected the call: {message}",
        /// Statement execution or result decoding failed.
        Query { message: String } => "statement failed: {message}",
    }
}

impl StoreError {
    /// Whether the failure is an authorization refusal.
    pub fn is_authorization(&self) -> bool {
        self.kind() == StoreErrorKind::Authorization
    }
}

const AUTHORIZATION_MARKERS: [&str; 7] = [
    "unauthorized",
    "not authorized",
    "permission denied",
    "access denied",
    "admin access required",
    "admin privileges required",
    "only admins",
];

/// Whether a procedure's error text describes an authorization failure.
///
/// Procedures raise plain exceptions (`RAISE EXCEPTION 'Unauthorized'`)
/// rather than a dedicated SQLSTATE, so the message is the only signal.
pub fn mentions_authorization_failure(message: &str) -> bool {
    let lower = message.to_lowercase();
    AUTHORIZATION_MARKERS
        .iter()
        .any(|marker| lower.contains(marker))
}
