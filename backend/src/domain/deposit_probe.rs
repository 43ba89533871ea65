//! Exercises `request_new_deposit` as a self-service caller.
//!
//! A deposit request is filed by the depositor, so the caller identity is
//! the subject user itself and no admin membership is involved.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{info, warn};
use url::Url;

use super::UserId;
use super::ports::{
    CallerContext, DepositRequest, IdentityElevator, ProcedureCall, ProcedureResponse,
    QueryExecutor, StoreError, TransactionMode,
};
use super::queries;

/// Arguments the probe files the deposit with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositPlan {
    /// Amount requested; must be positive.
    pub amount: Decimal,
    pub receipt_url: Url,
}

/// Result of [`DepositProbe::probe_deposit`].
#[derive(Debug, Clone, PartialEq)]
pub enum DepositOutcome {
    /// The procedure accepted the request on behalf of `user_id`.
    Requested {
        user_id: UserId,
        response: ProcedureResponse,
    },
    /// The store holds no users to act as the depositor.
    NoUsers,
    /// Subject lookup failed, or the procedure refused the request.
    Failed {
        user_id: Option<UserId>,
        error: StoreError,
    },
}

/// Files one deposit request as an arbitrary existing user.
#[derive(Clone)]
pub struct DepositProbe {
    executor: Arc<dyn QueryExecutor>,
    elevator: Arc<dyn IdentityElevator>,
    plan: DepositPlan,
}

impl DepositProbe {
    /// Create a probe using the given ports and deposit arguments.
    pub fn new(
        executor: Arc<dyn QueryExecutor>,
        elevator: Arc<dyn IdentityElevator>,
        plan: DepositPlan,
    ) -> Self {
        Self {
            executor,
            elevator,
            plan,
        }
    }

    /// Select a subject user and request a deposit as that user.
    pub async fn probe_deposit(&self) -> DepositOutcome {
        let subject = match self.find_subject().await {
            Ok(Some(subject)) => subject,
            Ok(None) => {
                info!("no users available for the deposit probe");
                return DepositOutcome::NoUsers;
            }
            Err(error) => {
                warn!(%error, "deposit subject lookup failed");
                return DepositOutcome::Failed {
                    user_id: None,
                    error,
                };
            }
        };

        let call = ProcedureCall::RequestNewDeposit(DepositRequest {
            amount: self.plan.amount,
            receipt_url: self.plan.receipt_url.clone(),
        });
        match self
            .elevator
            .invoke(&CallerContext::Elevated(subject), &call, TransactionMode::Commit)
            .await
        {
            Ok(response) => {
                info!(user_id = %subject, amount = %self.plan.amount, "deposit request accepted");
                DepositOutcome::Requested {
                    user_id: subject,
                    response,
                }
            }
            Err(error) => {
                warn!(user_id = %subject, %error, "deposit request refused");
                DepositOutcome::Failed {
                    user_id: Some(subject),
                    error,
                }
            }
        }
    }

    async fn find_subject(&self) -> Result<Option<UserId>, StoreError> {
        let rows = self.executor.execute(&queries::any_user()).await?;
        match rows.first() {
            Some(row) => Ok(Some(UserId::from(row.uuid("id")?))),
            None => Ok(None),
        }
    }
}
