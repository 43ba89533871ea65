//! Verifies an operator's admin membership and grants it when absent.

use std::sync::Arc;

use tracing::{info, warn};

use super::UserId;
use super::ports::{QueryExecutor, StoreError};
use super::queries;

/// Membership state of the operator account after bootstrapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminStatus {
    pub user_id: UserId,
    pub email: String,
    /// False only when this run inserted the membership row.
    pub was_already_admin: bool,
}

/// Result of [`AdminBootstrapper::ensure_admin`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminOutcome {
    /// The user exists and now holds admin membership.
    Verified(AdminStatus),
    /// No user is registered under the email.
    NotFound { email: String },
    /// The store could not answer.
    Failed(StoreError),
}

impl AdminOutcome {
    /// Identifier handed to later steps, when one was established.
    pub fn admin_id(&self) -> Option<&UserId> {
        match self {
            Self::Verified(status) => Some(&status.user_id),
            Self::NotFound { .. } | Self::Failed(_) => None,
        }
    }
}

/// Ensures an operator account is listed in `admin_users`.
#[derive(Clone)]
pub struct AdminBootstrapper {
    executor: Arc<dyn QueryExecutor>,
}

impl AdminBootstrapper {
    /// Create a bootstrapper issuing statements through `executor`.
    pub fn new(executor: Arc<dyn QueryExecutor>) -> Self {
        Self { executor }
    }

    /// Look the operator up by email and grant admin membership if missing.
    ///
    /// The grant is an insert-if-absent, so repeated runs never create a
    /// second membership row.
    pub async fn ensure_admin(&self, email: &str) -> AdminOutcome {
        match self.try_ensure_admin(email).await {
            Ok(Some(status)) => AdminOutcome::Verified(status),
            Ok(None) => {
                info!(%email, "operator account not found");
                AdminOutcome::NotFound {
                    email: email.to_owned(),
                }
            }
            Err(error) => {
                warn!(%email, %error, "admin bootstrap failed");
                AdminOutcome::Failed(error)
            }
        }
    }

    async fn try_ensure_admin(&self, email: &str) -> Result<Option<AdminStatus>, StoreError> {
        let rows = self
            .executor
            .execute(&queries::find_user_with_admin_flag(email))
            .await?;
        let Some(row) = rows.first() else {
            return Ok(None);
        };

        let user_id = UserId::from(row.uuid("id")?);
        let stored_email = row.text("email")?.to_owned();
        if row.bool("is_admin")? {
            info!(%user_id, "operator already holds admin membership");
            return Ok(Some(AdminStatus {
                user_id,
                email: stored_email,
                was_already_admin: true,
            }));
        }

        let inserted = self.executor.execute(&queries::grant_admin(&user_id)).await?;
        // An empty RETURNING set means a concurrent grant got there first.
        let was_already_admin = inserted.is_empty();
        if was_already_admin {
            info!(%user_id, "admin membership appeared before the grant");
        } else {
            info!(%user_id, "granted admin membership");
        }

        Ok(Some(AdminStatus {
            user_id,
            email: stored_email,
            was_already_admin,
        }))
    }
}

#[cfg(test)]
mod tests {
    //! Behavioural coverage for the admin bootstrap sequence.
    use mockall::Sequence;
    use rstest::rstest;

    use super::*;
    use crate::domain::ports::{MockQueryExecutor, ResultRow, SqlParam, SqlValue};
    use crate::domain::queries::{FIND_USER_WITH_ADMIN_FLAG_SQL, GRANT_ADMIN_SQL};

    const EMAIL: &str = "admin88@binapex.my";

    fn operator_id() -> UserId {
        UserId::new("11111111-1111-1111-1111-111111111111").expect("valid id")
    }

    fn lookup_row(is_admin: bool) -> ResultRow {
        ResultRow::new()
            .with("id", SqlValue::Uuid(*operator_id().as_uuid()))
            .with("email", SqlValue::Text(EMAIL.to_owned()))
            .with("is_admin", SqlValue::Bool(is_admin))
    }

    fn bootstrapper(executor: MockQueryExecutor) -> AdminBootstrapper {
        AdminBootstrapper::new(Arc::new(executor))
    }

    #[rstest]
    #[tokio::test]
    async fn existing_admin_is_verified_without_insert() {
        let mut executor = MockQueryExecutor::new();
        executor
            .expect_execute()
            .withf(|statement| {
                statement.sql() == FIND_USER_WITH_ADMIN_FLAG_SQL
                    && statement.params() == [SqlParam::Text(EMAIL.to_owned())]
            })
            .times(1)
            .returning(|_| Ok(vec![lookup_row(true)]));
        executor
            .expect_execute()
            .withf(|statement| statement.sql() == GRANT_ADMIN_SQL)
            .times(0);

        let outcome = bootstrapper(executor).ensure_admin(EMAIL).await;

        assert_eq!(
            outcome,
            AdminOutcome::Verified(AdminStatus {
                user_id: operator_id(),
                email: EMAIL.to_owned(),
                was_already_admin: true,
            })
        );
    }

    #[rstest]
    #[tokio::test]
    async fn missing_membership_is_granted() {
        let mut seq = Sequence::new();
        let mut executor = MockQueryExecutor::new();
        executor
            .expect_execute()
            .withf(|statement| statement.sql() == FIND_USER_WITH_ADMIN_FLAG_SQL)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(vec![lookup_row(false)]));
        executor
            .expect_execute()
            .withf(|statement| {
                statement.sql() == GRANT_ADMIN_SQL
                    && statement.params() == [SqlParam::Uuid(*operator_id().as_uuid())]
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| {
                Ok(vec![
                    ResultRow::new().with("user_id", SqlValue::Uuid(*operator_id().as_uuid())),
                ])
            });

        let outcome = bootstrapper(executor).ensure_admin(EMAIL).await;

        let AdminOutcome::Verified(status) = &outcome else {
            panic!("expected verified outcome, got {outcome:?}");
        };
        assert!(!status.was_already_admin);
        assert_eq!(status.user_id, operator_id());
    }

    #[rstest]
    #[tokio::test]
    async fn conflicting_grant_reports_existing_membership() {
        let mut executor = MockQueryExecutor::new();
        executor
            .expect_execute()
            .withf(|statement| statement.sql() == FIND_USER_WITH_ADMIN_FLAG_SQL)
            .returning(|_| Ok(vec![lookup_row(false)]));
        executor
            .expect_execute()
            .withf(|statement| statement.sql() == GRANT_ADMIN_SQL)
            .returning(|_| Ok(Vec::new()));

        let outcome = bootstrapper(executor).ensure_admin(EMAIL).await;

        assert!(matches!(
            outcome,
            AdminOutcome::Verified(AdminStatus {
                was_already_admin: true,
                ..
            })
        ));
    }

    #[rstest]
    #[tokio::test]
    async fn unknown_email_is_not_found() {
        let mut executor = MockQueryExecutor::new();
        executor.expect_execute().times(1).returning(|_| Ok(Vec::new()));

        let outcome = bootstrapper(executor).ensure_admin(EMAIL).await;

        assert_eq!(
            outcome,
            AdminOutcome::NotFound {
                email: EMAIL.to_owned()
            }
        );
        assert!(outcome.admin_id().is_none());
    }

    #[rstest]
    #[tokio::test]
    async fn store_failures_are_reported_not_raised() {
        let mut executor = MockQueryExecutor::new();
        executor
            .expect_execute()
            .returning(|_| Err(StoreError::connection("connection refused")));

        let outcome = bootstrapper(executor).ensure_admin(EMAIL).await;

        assert_eq!(
            outcome,
            AdminOutcome::Failed(StoreError::connection("connection refused"))
        );
    }

    #[rstest]
    #[tokio::test]
    async fn malformed_lookup_rows_fail_as_query_errors() {
        let mut executor = MockQueryExecutor::new();
        executor.expect_execute().returning(|_| {
            Ok(vec![
                ResultRow::new().with("id", SqlValue::Text("not-a-uuid".to_owned())),
            ])
        });

        let outcome = bootstrapper(executor).ensure_admin(EMAIL).await;

        assert!(matches!(
            outcome,
            AdminOutcome::Failed(StoreError::Query { .. })
        ));
    }
}
