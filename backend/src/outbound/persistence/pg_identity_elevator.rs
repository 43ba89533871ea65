//! PostgreSQL-backed [`IdentityElevator`].
//!
//! Every invocation runs on a dedicated connection inside one transaction:
//!
//! ```text
//! BEGIN;
//! SELECT set_config('request.jwt.claims', '{"sub":..,"role":..}', true),
//!        set_config('request.jwt.claim.sub', '<sub>', true);
//! SELECT set_config('role', '<role>', true);   -- only with a session role
//! SELECT public.<procedure>(...)::text AS result;
//! COMMIT;                                      -- or ROLLBACK
//! ```
//!
//! `is_local = true` scopes every setting to the transaction.

use async_trait::async_trait;
use sqlx::postgres::PgConnection;
use sqlx::Connection;
use tracing::{debug, warn};

use crate::domain::ports::{
    CallerContext, ElevationClaims, IdentityElevator, ProcedureCall, ProcedureResponse,
    Statement, StoreError, TransactionMode,
};

use super::connection::{ConnectionConfig, close, connect};
use super::pg_error_mapping::map_sqlx_error;
use super::pg_query_executor::fetch_rows;
use super::row_decoding::first_value;

/// Installs the JWT claims read by `auth.uid()` for the current transaction.
pub const SET_CLAIMS_SQL: &str = concat!(
    "SELECT set_config('request.jwt.claims', $1, true), ",
    "set_config('request.jwt.claim.sub', $2, true)"
);

/// Switches the current transaction to another role.
pub const SET_ROLE_SQL: &str = "SELECT set_config('role', $1, true)";

/// Statements establishing `caller` inside the current transaction.
pub fn elevation_statements(
    caller: &CallerContext,
    claim_role: &str,
    session_role: Option<&str>,
) -> Vec<Statement> {
    let mut statements = Vec::with_capacity(2);
    if let Some(subject) = caller.subject() {
        let claims = ElevationClaims::for_subject(subject, claim_role);
        statements.push(
            Statement::new(SET_CLAIMS_SQL)
                .bind(claims.to_json())
                .bind(claims.subject()),
        );
    }
    if let Some(role) = session_role {
        statements.push(Statement::new(SET_ROLE_SQL).bind(role));
    }
    statements
}

/// Invokes procedures with transaction-local caller claims.
#[derive(Debug, Clone)]
pub struct PgIdentityElevator {
    config: ConnectionConfig,
    claim_role: String,
    session_role: Option<String>,
}

impl PgIdentityElevator {
    /// Create an elevator claiming `claim_role` for elevated subjects.
    pub fn new(config: ConnectionConfig, claim_role: impl Into<String>) -> Self {
        Self {
            config,
            claim_role: claim_role.into(),
            session_role: None,
        }
    }

    /// Also switch the transaction to `role` before calling procedures.
    #[must_use]
    pub fn with_session_role(mut self, role: Option<String>) -> Self {
        self.session_role = role;
        self
    }

    async fn invoke_on(
        &self,
        connection: &mut PgConnection,
        caller: &CallerContext,
        call: &ProcedureCall,
        mode: TransactionMode,
    ) -> Result<ProcedureResponse, StoreError> {
        let mut transaction = connection.begin().await.map_err(map_sqlx_error)?;

        let outcome = self
            .call_in_transaction(&mut transaction, caller, call)
            .await;

        match (outcome, mode) {
            (Ok(response), TransactionMode::Commit) => {
                transaction.commit().await.map_err(map_sqlx_error)?;
                Ok(response)
            }
            (Ok(response), TransactionMode::RollBack) => {
                transaction.rollback().await.map_err(map_sqlx_error)?;
                Ok(response)
            }
            (Err(error), _) => {
                if let Err(rollback_error) = transaction.rollback().await {
                    debug!(error = %rollback_error, "rollback after failed call failed");
                }
                Err(error)
            }
        }
    }

    async fn call_in_transaction(
        &self,
        connection: &mut PgConnection,
        caller: &CallerContext,
        call: &ProcedureCall,
    ) -> Result<ProcedureResponse, StoreError> {
        for statement in
            elevation_statements(caller, &self.claim_role, self.session_role.as_deref())
        {
            fetch_rows(connection, &statement).await?;
        }
        let rows = fetch_rows(connection, &call.statement()).await?;
        ProcedureResponse::from_result_value(first_value(&rows)?)
    }
}

#[async_trait]
impl IdentityElevator for PgIdentityElevator {
    async fn invoke(
        &self,
        caller: &CallerContext,
        call: &ProcedureCall,
        mode: TransactionMode,
    ) -> Result<ProcedureResponse, StoreError> {
        let mut connection = connect(&self.config).await?;
        let result = self.invoke_on(&mut connection, caller, call, mode).await;
        close(connection).await;

        match &result {
            Ok(_) => debug!(procedure = call.name(), ?mode, "procedure accepted the call"),
            Err(error) => warn!(
                procedure = call.name(),
                caller = ?caller.subject().map(ToString::to_string),
                %error,
                "procedure call failed"
            ),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::UserId;
    use crate::domain::ports::SqlParam;
    use rstest::rstest;

    fn subject() -> UserId {
        UserId::new("3fa85f64-5717-4562-b3fc-2c963f66afa6").expect("id")
    }

    #[rstest]
    fn elevated_callers_get_both_claims() {
        let statements =
            elevation_statements(&CallerContext::Elevated(subject()), "authenticated", None);

        assert_eq!(statements.len(), 1);
        let claims = &statements[0];
        assert_eq!(claims.sql(), SET_CLAIMS_SQL);
        let [SqlParam::Text(json), SqlParam::Text(sub)] = claims.params() else {
            panic!("unexpected params {:?}", claims.params());
        };
        let parsed: serde_json::Value = serde_json::from_str(json).expect("claims json");
        assert_eq!(parsed["sub"], "3fa85f64-5717-4562-b3fc-2c963f66afa6");
        assert_eq!(parsed["role"], "authenticated");
        assert_eq!(sub, "3fa85f64-5717-4562-b3fc-2c963f66afa6");
    }

    #[rstest]
    fn anonymous_callers_install_no_claims() {
        assert!(elevation_statements(&CallerContext::Anonymous, "authenticated", None).is_empty());
    }

    #[rstest]
    #[case(CallerContext::Anonymous, 1)]
    #[case(CallerContext::Elevated(subject()), 2)]
    fn session_role_switch_follows_claims(#[case] caller: CallerContext, #[case] count: usize) {
        let statements = elevation_statements(&caller, "authenticated", Some("authenticated"));

        assert_eq!(statements.len(), count);
        let last = statements.last().expect("role statement");
        assert_eq!(last.sql(), SET_ROLE_SQL);
        assert_eq!(last.params(), [SqlParam::Text("authenticated".to_owned())]);
    }
}
