//! Exercises `settle_binary_order` against a live open order.
//!
//! The probe picks one OPEN order with a USD wallet, optionally proves the
//! procedure refuses an anonymous caller (inside a rolled-back transaction),
//! settles the order as the admin, then reads the wallet, the order, and the
//! settlement audit trail back to check the effect.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{debug, info, warn};
use url::Url;

use super::order::{OpenOrderCandidate, OrderStatus, OutcomeCode};
use super::ports::{
    CallerContext, IdentityElevator, ProcedureCall, ProcedureResponse, QueryExecutor, ResultRow,
    RowError, SettlementRequest, StoreError, TransactionMode, nullable,
};
use super::queries;
use super::{OrderId, UserId};

/// Arguments the probe settles with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementPlan {
    /// Outcome code passed to the procedure.
    pub outcome: OutcomeCode,
    /// Payout amount; credited to the owner only on a win.
    pub payout: Decimal,
    pub note: String,
    pub evidence_url: Url,
    /// Also check that an anonymous caller is refused.
    pub verify_authorization: bool,
}

/// Result of invoking the procedure without any caller claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationCheck {
    /// Not attempted.
    Skipped,
    /// The procedure refused the anonymous caller.
    Enforced,
    /// The procedure accepted the anonymous caller; its effects were rolled back.
    NotEnforced,
    /// The call failed for a reason other than authorization.
    Inconclusive(StoreError),
}

impl AuthorizationCheck {
    /// Whether the check leaves the step in good standing.
    pub fn is_acceptable(&self) -> bool {
        matches!(self, Self::Skipped | Self::Enforced)
    }
}

/// Which part of the probe failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementStage {
    /// Finding an open order to settle.
    Lookup,
    /// The elevated settlement call itself.
    Settle,
    /// Reading the wallet, order, and audit trail afterwards.
    ReadBack,
}

/// Settlement trail the procedure left behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementAudit {
    /// `orders.profit_loss` after settlement, when the store records one.
    pub profit_loss: Option<Decimal>,
    /// Whether `trade_settlement_audit_logs` holds an entry for the order.
    pub logged: bool,
    /// Admin named by the newest audit entry.
    pub logged_by: Option<UserId>,
}

/// Observations from a completed settlement.
#[derive(Debug, Clone, PartialEq)]
pub struct SettlementReport {
    /// The order as it was before settlement.
    pub candidate: OpenOrderCandidate,
    pub authorization: AuthorizationCheck,
    pub response: ProcedureResponse,
    /// Credit the outcome should produce.
    pub expected_credit: Decimal,
    pub balance_after: Decimal,
    pub status_after: OrderStatus,
    pub audit: SettlementAudit,
}

impl SettlementReport {
    /// Change in the owner's USD balance.
    pub fn balance_delta(&self) -> Decimal {
        self.balance_after - self.candidate.available_balance
    }

    /// Whether the balance moved by exactly the expected credit.
    pub fn balance_matches(&self) -> bool {
        self.balance_delta() == self.expected_credit
    }

    /// Whether the order left the OPEN state.
    pub fn status_transitioned(&self) -> bool {
        !self.status_after.is_open()
    }

    /// Whether every observation matches the contract.
    pub fn passed(&self) -> bool {
        self.authorization.is_acceptable()
            && self.balance_matches()
            && self.status_transitioned()
            && self.audit.logged
    }
}

/// Result of [`SettlementProbe::probe_settlement`].
#[derive(Debug, Clone, PartialEq)]
pub enum SettlementOutcome {
    /// The procedure accepted the call; the report holds the verdict.
    Settled(Box<SettlementReport>),
    /// No OPEN order with a USD wallet exists; nothing was invoked.
    NoOpenOrders,
    /// An order exists but no admin identity is available to settle it.
    MissingAdmin { candidate: OpenOrderCandidate },
    /// A store call failed at `stage`.
    Failed {
        candidate: Option<OpenOrderCandidate>,
        stage: SettlementStage,
        error: StoreError,
    },
}

/// Drives the settlement procedure under an elevated identity.
#[derive(Clone)]
pub struct SettlementProbe {
    executor: Arc<dyn QueryExecutor>,
    elevator: Arc<dyn IdentityElevator>,
    plan: SettlementPlan,
}

impl SettlementProbe {
    /// Create a probe using the given ports and settlement arguments.
    pub fn new(
        executor: Arc<dyn QueryExecutor>,
        elevator: Arc<dyn IdentityElevator>,
        plan: SettlementPlan,
    ) -> Self {
        Self {
            executor,
            elevator,
            plan,
        }
    }

    /// Settle one open order as `admin_id` and verify the wallet effect.
    pub async fn probe_settlement(&self, admin_id: Option<&UserId>) -> SettlementOutcome {
        let candidate = match self.find_candidate().await {
            Ok(Some(candidate)) => candidate,
            Ok(None) => {
                info!("no open orders available for settlement");
                return SettlementOutcome::NoOpenOrders;
            }
            Err(error) => {
                warn!(%error, "open order lookup failed");
                return SettlementOutcome::Failed {
                    candidate: None,
                    stage: SettlementStage::Lookup,
                    error,
                };
            }
        };

        let Some(admin_id) = admin_id else {
            warn!(order_id = %candidate.order_id, "no admin identity; settlement not invoked");
            return SettlementOutcome::MissingAdmin { candidate };
        };

        let call = self.settlement_call(candidate.order_id);
        let authorization = if self.plan.verify_authorization {
            self.check_anonymous_refused(&call).await
        } else {
            AuthorizationCheck::Skipped
        };

        let response = match self
            .elevator
            .invoke(
                &CallerContext::Elevated(*admin_id),
                &call,
                TransactionMode::Commit,
            )
            .await
        {
            Ok(response) => response,
            Err(error) => {
                warn!(order_id = %candidate.order_id, %error, "elevated settlement failed");
                return SettlementOutcome::Failed {
                    candidate: Some(candidate),
                    stage: SettlementStage::Settle,
                    error,
                };
            }
        };

        match self.read_back(&candidate).await {
            Ok((balance_after, status_after, audit)) => {
                let report = SettlementReport {
                    expected_credit: self.plan.outcome.expected_credit(self.plan.payout),
                    candidate,
                    authorization,
                    response,
                    balance_after,
                    status_after,
                    audit,
                };
                info!(
                    order_id = %report.candidate.order_id,
                    delta = %report.balance_delta(),
                    audit_logged = report.audit.logged,
                    passed = report.passed(),
                    "settlement probe complete"
                );
                SettlementOutcome::Settled(Box::new(report))
            }
            Err(error) => SettlementOutcome::Failed {
                candidate: Some(candidate),
                stage: SettlementStage::ReadBack,
                error,
            },
        }
    }

    fn settlement_call(&self, order_id: OrderId) -> ProcedureCall {
        ProcedureCall::SettleBinaryOrder(SettlementRequest {
            order_id,
            outcome: self.plan.outcome.clone(),
            payout: self.plan.payout,
            note: self.plan.note.clone(),
            evidence_url: self.plan.evidence_url.clone(),
        })
    }

    async fn find_candidate(&self) -> Result<Option<OpenOrderCandidate>, StoreError> {
        let rows = self.executor.execute(&queries::find_open_order()).await?;
        rows.first()
            .map(candidate_from_row)
            .transpose()
            .map_err(StoreError::from)
    }

    async fn check_anonymous_refused(&self, call: &ProcedureCall) -> AuthorizationCheck {
        let result = self
            .elevator
            .invoke(&CallerContext::Anonymous, call, TransactionMode::RollBack)
            .await;
        match result {
            Err(error) if error.is_authorization() => {
                debug!(%error, "anonymous settlement refused");
                AuthorizationCheck::Enforced
            }
            Err(error) => {
                warn!(%error, "anonymous settlement failed for a non-authorization reason");
                AuthorizationCheck::Inconclusive(error)
            }
            Ok(_) => {
                warn!("anonymous settlement was accepted; effects rolled back");
                AuthorizationCheck::NotEnforced
            }
        }
    }

    async fn read_back(
        &self,
        candidate: &OpenOrderCandidate,
    ) -> Result<(Decimal, OrderStatus, SettlementAudit), StoreError> {
        let balance_rows = self
            .executor
            .execute(&queries::usd_balance(&candidate.owner_id))
            .await?;
        let balance = balance_rows
            .first()
            .ok_or_else(|| StoreError::query("USD wallet disappeared after settlement"))?
            .decimal("available_balance")?;

        let status_rows = self
            .executor
            .execute(&queries::order_status(&candidate.order_id))
            .await?;
        let status = status_rows
            .first()
            .ok_or_else(|| StoreError::query("order disappeared after settlement"))?
            .text("status")?;

        let audit_rows = self
            .executor
            .execute(&queries::settlement_audit(&candidate.order_id))
            .await?;
        let audit = audit_rows
            .first()
            .ok_or_else(|| StoreError::query("order disappeared after settlement"))
            .and_then(|row| audit_from_row(row).map_err(StoreError::from))?;

        Ok((balance, OrderStatus::new(status), audit))
    }
}

fn audit_from_row(row: &ResultRow) -> Result<SettlementAudit, RowError> {
    Ok(SettlementAudit {
        profit_loss: nullable(row.decimal("profit_loss"))?,
        logged: row.bool("audit_logged")?,
        logged_by: nullable(row.uuid("audit_admin_id"))?.map(UserId::from),
    })
}

fn candidate_from_row(row: &ResultRow) -> Result<OpenOrderCandidate, RowError> {
    Ok(OpenOrderCandidate {
        order_id: OrderId::from(row.uuid("id")?),
        owner_id: UserId::from(row.uuid("user_id")?),
        amount: row.decimal("amount")?,
        status: OrderStatus::new(row.text("status")?),
        available_balance: row.decimal("available_balance")?,
    })
}

#[cfg(test)]
mod tests {
    //! Behavioural coverage for the settlement probe sequence.
    use std::str::FromStr;

    use mockall::Sequence;
    use rstest::{fixture, rstest};

    use super::*;
    use crate::domain::ports::{MockIdentityElevator, MockQueryExecutor, SqlValue};
    use crate::domain::queries::{
        FIND_OPEN_ORDER_SQL, ORDER_STATUS_SQL, SETTLEMENT_AUDIT_SQL, WALLET_BALANCE_SQL,
    };

    fn dec(raw: &str) -> Decimal {
        Decimal::from_str(raw).expect("decimal literal")
    }

    fn admin() -> UserId {
        UserId::new("11111111-1111-1111-1111-111111111111").expect("admin id")
    }

    fn owner() -> UserId {
        UserId::new("22222222-2222-2222-2222-222222222222").expect("owner id")
    }

    fn order() -> OrderId {
        OrderId::new("33333333-3333-3333-3333-333333333333").expect("order id")
    }

    #[fixture]
    fn plan() -> SettlementPlan {
        SettlementPlan {
            outcome: OutcomeCode::Win,
            payout: dec("50000.0"),
            note: "Test settlement".to_owned(),
            evidence_url: Url::parse("http://test.url").expect("url"),
            verify_authorization: true,
        }
    }

    fn open_order_row() -> ResultRow {
        ResultRow::new()
            .with("id", SqlValue::Uuid(*order().as_uuid()))
            .with("user_id", SqlValue::Uuid(*owner().as_uuid()))
            .with("amount", SqlValue::Decimal(dec("200.00")))
            .with("status", SqlValue::Text("OPEN".to_owned()))
            .with("available_balance", SqlValue::Decimal(dec("1000.00")))
    }

    fn audit_row(logged: bool) -> ResultRow {
        let admin_id = if logged {
            SqlValue::Uuid(*admin().as_uuid())
        } else {
            SqlValue::Null
        };
        ResultRow::new()
            .with("profit_loss", SqlValue::Decimal(dec("50000.0")))
            .with("audit_logged", SqlValue::Bool(logged))
            .with("audit_admin_id", admin_id)
    }

    fn executor_with_order(balance_after: &'static str, status_after: &'static str) -> MockQueryExecutor {
        executor_with_audit(balance_after, status_after, true)
    }

    fn executor_with_audit(
        balance_after: &'static str,
        status_after: &'static str,
        audit_logged: bool,
    ) -> MockQueryExecutor {
        let mut executor = MockQueryExecutor::new();
        executor
            .expect_execute()
            .withf(|statement| statement.sql() == FIND_OPEN_ORDER_SQL)
            .times(1)
            .returning(|_| Ok(vec![open_order_row()]));
        executor
            .expect_execute()
            .withf(|statement| statement.sql() == WALLET_BALANCE_SQL)
            .returning(move |_| {
                Ok(vec![
                    ResultRow::new().with("available_balance", SqlValue::Decimal(dec(balance_after))),
                ])
            });
        executor
            .expect_execute()
            .withf(|statement| statement.sql() == ORDER_STATUS_SQL)
            .returning(move |_| {
                Ok(vec![
                    ResultRow::new().with("status", SqlValue::Text(status_after.to_owned())),
                ])
            });
        executor
            .expect_execute()
            .withf(|statement| statement.sql() == SETTLEMENT_AUDIT_SQL)
            .returning(move |_| Ok(vec![audit_row(audit_logged)]));
        executor
    }

    fn probe(
        executor: MockQueryExecutor,
        elevator: MockIdentityElevator,
        plan: SettlementPlan,
    ) -> SettlementProbe {
        SettlementProbe::new(Arc::new(executor), Arc::new(elevator), plan)
    }

    #[rstest]
    #[tokio::test]
    async fn winning_settlement_credits_payout(plan: SettlementPlan) {
        let executor = executor_with_order("51000.00", "WIN");
        let mut seq = Sequence::new();
        let mut elevator = MockIdentityElevator::new();
        elevator
            .expect_invoke()
            .withf(|caller, call, mode| {
                *caller == CallerContext::Anonymous
                    && call.name() == "settle_binary_order"
                    && *mode == TransactionMode::RollBack
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Err(StoreError::authorization("Unauthorized")));
        elevator
            .expect_invoke()
            .withf(|caller, _, mode| {
                *caller == CallerContext::Elevated(admin()) && *mode == TransactionMode::Commit
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(ProcedureResponse::from_result_value(SqlValue::Null).expect("void")));

        let outcome = probe(executor, elevator, plan)
            .probe_settlement(Some(&admin()))
            .await;

        let SettlementOutcome::Settled(report) = &outcome else {
            panic!("expected settlement, got {outcome:?}");
        };
        assert_eq!(report.authorization, AuthorizationCheck::Enforced);
        assert_eq!(report.balance_delta(), dec("50000.0"));
        assert!(report.balance_matches());
        assert!(report.status_transitioned());
        assert!(report.audit.logged);
        assert_eq!(report.audit.logged_by, Some(admin()));
        assert_eq!(report.audit.profit_loss, Some(dec("50000.0")));
        assert!(report.passed());
    }

    #[rstest]
    #[tokio::test]
    async fn missing_audit_entry_fails_verification(plan: SettlementPlan) {
        let executor = executor_with_audit("51000.00", "WIN", false);
        let mut elevator = MockIdentityElevator::new();
        elevator.expect_invoke().returning(|caller, _, _| match caller {
            CallerContext::Anonymous => Err(StoreError::authorization("Unauthorized")),
            CallerContext::Elevated(_) => {
                Ok(ProcedureResponse::from_result_value(SqlValue::Null).expect("void"))
            }
        });

        let outcome = probe(executor, elevator, plan)
            .probe_settlement(Some(&admin()))
            .await;

        let SettlementOutcome::Settled(report) = &outcome else {
            panic!("expected settlement, got {outcome:?}");
        };
        assert!(report.balance_matches());
        assert!(!report.audit.logged);
        assert_eq!(report.audit.logged_by, None);
        assert!(!report.passed());
    }

    #[rstest]
    #[tokio::test]
    async fn constraint_failures_under_an_anonymous_caller_are_inconclusive(
        plan: SettlementPlan,
    ) {
        let executor = executor_with_order("51000.00", "WIN");
        let mut elevator = MockIdentityElevator::new();
        elevator.expect_invoke().returning(|caller, _, _| match caller {
            CallerContext::Anonymous => Err(StoreError::query(
                "null value in column \"admin_id\" of relation \"trade_settlement_audit_logs\" violates not-null constraint",
            )),
            CallerContext::Elevated(_) => {
                Ok(ProcedureResponse::from_result_value(SqlValue::Null).expect("void"))
            }
        });

        let outcome = probe(executor, elevator, plan)
            .probe_settlement(Some(&admin()))
            .await;

        let SettlementOutcome::Settled(report) = &outcome else {
            panic!("expected settlement, got {outcome:?}");
        };
        assert!(matches!(
            report.authorization,
            AuthorizationCheck::Inconclusive(StoreError::Query { .. })
        ));
        assert!(!report.passed());
    }

    #[rstest]
    #[tokio::test]
    async fn no_open_orders_invokes_nothing(plan: SettlementPlan) {
        let mut executor = MockQueryExecutor::new();
        executor
            .expect_execute()
            .withf(|statement| statement.sql() == FIND_OPEN_ORDER_SQL)
            .times(1)
            .returning(|_| Ok(Vec::new()));
        let mut elevator = MockIdentityElevator::new();
        elevator.expect_invoke().times(0);

        let outcome = probe(executor, elevator, plan)
            .probe_settlement(Some(&admin()))
            .await;

        assert_eq!(outcome, SettlementOutcome::NoOpenOrders);
    }

    #[rstest]
    #[tokio::test]
    async fn missing_admin_is_reported_before_invocation(plan: SettlementPlan) {
        let mut executor = MockQueryExecutor::new();
        executor
            .expect_execute()
            .times(1)
            .returning(|_| Ok(vec![open_order_row()]));
        let mut elevator = MockIdentityElevator::new();
        elevator.expect_invoke().times(0);

        let outcome = probe(executor, elevator, plan).probe_settlement(None).await;

        let SettlementOutcome::MissingAdmin { candidate } = &outcome else {
            panic!("expected missing admin, got {outcome:?}");
        };
        assert_eq!(candidate.order_id, order());
        assert_eq!(candidate.available_balance, dec("1000.00"));
    }

    #[rstest]
    #[tokio::test]
    async fn accepted_anonymous_call_fails_the_probe(plan: SettlementPlan) {
        let executor = executor_with_order("51000.00", "WIN");
        let mut elevator = MockIdentityElevator::new();
        elevator.expect_invoke().times(2).returning(|_, _, _| {
            Ok(ProcedureResponse::from_result_value(SqlValue::Null).expect("void"))
        });

        let outcome = probe(executor, elevator, plan)
            .probe_settlement(Some(&admin()))
            .await;

        let SettlementOutcome::Settled(report) = &outcome else {
            panic!("expected settlement, got {outcome:?}");
        };
        assert_eq!(report.authorization, AuthorizationCheck::NotEnforced);
        assert!(!report.passed());
    }

    #[rstest]
    #[tokio::test]
    async fn authorization_check_can_be_disabled(mut plan: SettlementPlan) {
        plan.verify_authorization = false;
        let executor = executor_with_order("51000.00", "WIN");
        let mut elevator = MockIdentityElevator::new();
        elevator
            .expect_invoke()
            .withf(|caller, _, _| *caller == CallerContext::Anonymous)
            .times(0);
        elevator
            .expect_invoke()
            .withf(|caller, _, _| caller.subject().is_some())
            .times(1)
            .returning(|_, _, _| Ok(ProcedureResponse::from_result_value(SqlValue::Null).expect("void")));

        let outcome = probe(executor, elevator, plan)
            .probe_settlement(Some(&admin()))
            .await;

        let SettlementOutcome::Settled(report) = &outcome else {
            panic!("expected settlement, got {outcome:?}");
        };
        assert_eq!(report.authorization, AuthorizationCheck::Skipped);
        assert!(report.passed());
    }

    #[rstest]
    #[case("1000.00", "OPEN")]
    #[case("50000.00", "WIN")]
    #[tokio::test]
    async fn unexpected_effects_fail_verification(
        plan: SettlementPlan,
        #[case] balance_after: &'static str,
        #[case] status_after: &'static str,
    ) {
        let executor = executor_with_order(balance_after, status_after);
        let mut elevator = MockIdentityElevator::new();
        elevator.expect_invoke().returning(|caller, _, _| match caller {
            CallerContext::Anonymous => Err(StoreError::authorization("Unauthorized")),
            CallerContext::Elevated(_) => {
                Ok(ProcedureResponse::from_result_value(SqlValue::Null).expect("void"))
            }
        });

        let outcome = probe(executor, elevator, plan)
            .probe_settlement(Some(&admin()))
            .await;

        let SettlementOutcome::Settled(report) = &outcome else {
            panic!("expected settlement, got {outcome:?}");
        };
        assert!(!report.passed());
    }

    #[rstest]
    #[tokio::test]
    async fn elevated_rejection_is_a_settle_stage_failure(plan: SettlementPlan) {
        let mut executor = MockQueryExecutor::new();
        executor
            .expect_execute()
            .withf(|statement| statement.sql() == FIND_OPEN_ORDER_SQL)
            .returning(|_| Ok(vec![open_order_row()]));
        executor
            .expect_execute()
            .withf(|statement| statement.sql() != FIND_OPEN_ORDER_SQL)
            .times(0);
        let mut elevator = MockIdentityElevator::new();
        elevator.expect_invoke().returning(|caller, _, _| match caller {
            CallerContext::Anonymous => Err(StoreError::authorization("Unauthorized")),
            CallerContext::Elevated(_) => Err(StoreError::authorization("Admin access required")),
        });

        let outcome = probe(executor, elevator, plan)
            .probe_settlement(Some(&admin()))
            .await;

        let SettlementOutcome::Failed { stage, error, candidate } = &outcome else {
            panic!("expected failure, got {outcome:?}");
        };
        assert_eq!(*stage, SettlementStage::Settle);
        assert!(error.is_authorization());
        assert!(candidate.is_some());
    }

    #[rstest]
    #[tokio::test]
    async fn lookup_failures_are_reported(plan: SettlementPlan) {
        let mut executor = MockQueryExecutor::new();
        executor
            .expect_execute()
            .returning(|_| Err(StoreError::connection("timeout")));
        let mut elevator = MockIdentityElevator::new();
        elevator.expect_invoke().times(0);

        let outcome = probe(executor, elevator, plan)
            .probe_settlement(Some(&admin()))
            .await;

        assert_eq!(
            outcome,
            SettlementOutcome::Failed {
                candidate: None,
                stage: SettlementStage::Lookup,
                error: StoreError::connection("timeout"),
            }
        );
    }
}
