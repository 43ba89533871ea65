//! Test utilities for the validator crate.
//!
//! [`InMemoryStore`] stands in for the platform's data store in unit and
//! integration tests. It answers the statements in `domain::queries` and
//! models both privileged procedures, including their caller checks, so
//! whole validation runs can be exercised without a database.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::json;
use uuid::Uuid;

use crate::domain::ports::{
    CallerContext, DepositRequest, IdentityElevator, ProcedureCall, ProcedureResponse,
    QueryExecutor, ResultRow, SettlementRequest, SqlParam, SqlValue, Statement, StoreError,
    TransactionMode,
};
use crate::domain::queries::{
    ANY_USER_SQL, FIND_OPEN_ORDER_SQL, FIND_USER_WITH_ADMIN_FLAG_SQL, GRANT_ADMIN_SQL,
    ORDER_STATUS_SQL, SETTLEMENT_AUDIT_SQL, WALLET_BALANCE_SQL,
};
use crate::domain::{OrderId, OrderStatus, OutcomeCode, USD_ASSET, UserId};

/// A deposit request accepted by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositRecord {
    /// Caller the deposit was filed for.
    pub user_id: UserId,
    pub amount: Decimal,
    pub receipt_url: String,
}

/// One procedure invocation as the store saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationRecord {
    pub procedure: &'static str,
    pub caller: CallerContext,
    pub mode: TransactionMode,
    /// Whether the procedure returned without error.
    pub accepted: bool,
}

/// A settlement audit log entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditRecord {
    pub order_id: OrderId,
    /// Caller that settled the order; absent when nobody was claimed.
    pub admin_id: Option<UserId>,
    pub outcome: String,
}

#[derive(Debug, Clone)]
struct StoredUser {
    id: UserId,
    email: String,
}

#[derive(Debug, Clone)]
struct StoredOrder {
    id: OrderId,
    user_id: UserId,
    amount: Decimal,
    status: String,
    profit_loss: Option<Decimal>,
}

#[derive(Debug, Clone, Default)]
struct Tables {
    users: Vec<StoredUser>,
    admin_users: Vec<UserId>,
    wallets: HashMap<(UserId, String), Decimal>,
    orders: Vec<StoredOrder>,
    deposits: Vec<DepositRecord>,
    audit_logs: Vec<AuditRecord>,
    writes: usize,
}

#[derive(Debug)]
struct StoreState {
    tables: Tables,
    invocations: Vec<InvocationRecord>,
    enforce_admin_check: bool,
    audit_logging: bool,
    outage: Option<StoreError>,
}

/// In-memory implementation of both data store ports.
#[derive(Debug)]
pub struct InMemoryStore {
    state: Mutex<StoreState>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    /// An empty store that enforces admin membership for settlement.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(StoreState {
                tables: Tables::default(),
                invocations: Vec::new(),
                enforce_admin_check: true,
                audit_logging: true,
                outage: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a user and return its identifier.
    pub fn add_user(&self, email: &str) -> UserId {
        let id = UserId::random();
        self.lock().tables.users.push(StoredUser {
            id,
            email: email.to_owned(),
        });
        id
    }

    /// Seed an admin membership row.
    pub fn add_admin(&self, user_id: &UserId) {
        self.lock().tables.admin_users.push(*user_id);
    }

    /// Seed or replace a wallet balance.
    pub fn set_wallet(&self, user_id: &UserId, asset: &str, balance: Decimal) {
        self.lock()
            .tables
            .wallets
            .insert((*user_id, asset.to_owned()), balance);
    }

    /// Seed an order and return its identifier.
    pub fn add_order(&self, user_id: &UserId, amount: Decimal, status: &str) -> OrderId {
        let id = OrderId::random();
        self.lock().tables.orders.push(StoredOrder {
            id,
            user_id: *user_id,
            amount,
            status: status.to_owned(),
            profit_loss: None,
        });
        id
    }

    /// Let the settlement procedure accept callers without admin membership.
    pub fn disable_admin_check(&self) {
        self.lock().enforce_admin_check = false;
    }

    /// Let the settlement procedure skip its audit log entry.
    pub fn disable_audit_log(&self) {
        self.lock().audit_logging = false;
    }

    /// Fail every statement and invocation with `error` until cleared.
    pub fn set_outage(&self, error: Option<StoreError>) {
        self.lock().outage = error;
    }

    /// Number of membership rows held for `user_id`.
    pub fn admin_rows(&self, user_id: &UserId) -> usize {
        self.lock()
            .tables
            .admin_users
            .iter()
            .filter(|id| *id == user_id)
            .count()
    }

    /// Current balance of a wallet, if it exists.
    pub fn wallet_balance(&self, user_id: &UserId, asset: &str) -> Option<Decimal> {
        self.lock()
            .tables
            .wallets
            .get(&(*user_id, asset.to_owned()))
            .copied()
    }

    /// Current status label of an order, if it exists.
    pub fn order_status(&self, order_id: &OrderId) -> Option<String> {
        self.lock()
            .tables
            .orders
            .iter()
            .find(|order| order.id == *order_id)
            .map(|order| order.status.clone())
    }

    /// Audit log entries for `order_id`, oldest first.
    pub fn audit_entries(&self, order_id: &OrderId) -> Vec<AuditRecord> {
        self.lock()
            .tables
            .audit_logs
            .iter()
            .filter(|entry| entry.order_id == *order_id)
            .cloned()
            .collect()
    }

    /// Accepted deposit requests, oldest first.
    pub fn deposits(&self) -> Vec<DepositRecord> {
        self.lock().tables.deposits.clone()
    }

    /// Every procedure invocation, oldest first.
    pub fn invocations(&self) -> Vec<InvocationRecord> {
        self.lock().invocations.clone()
    }

    /// Committed mutations of any table.
    pub fn writes(&self) -> usize {
        self.lock().tables.writes
    }
}

fn param<'a>(statement: &'a Statement, index: usize) -> Result<&'a SqlParam, StoreError> {
    statement
        .params()
        .get(index)
        .ok_or_else(|| StoreError::query(format!("missing parameter ${}", index + 1)))
}

fn text_param(statement: &Statement, index: usize) -> Result<&str, StoreError> {
    match param(statement, index)? {
        SqlParam::Text(value) => Ok(value.as_str()),
        other => Err(StoreError::query(format!("expected text, got {other:?}"))),
    }
}

fn uuid_param(statement: &Statement, index: usize) -> Result<Uuid, StoreError> {
    match param(statement, index)? {
        SqlParam::Uuid(value) => Ok(*value),
        other => Err(StoreError::query(format!("expected uuid, got {other:?}"))),
    }
}

impl Tables {
    fn is_admin(&self, user_id: &UserId) -> bool {
        self.admin_users.contains(user_id)
    }

    fn user_with_admin_flag(&self, email: &str) -> Vec<ResultRow> {
        self.users
            .iter()
            .filter(|user| user.email == email)
            .take(1)
            .map(|user| {
                ResultRow::new()
                    .with("id", SqlValue::Uuid(*user.id.as_uuid()))
                    .with("email", SqlValue::Text(user.email.clone()))
                    .with("is_admin", SqlValue::Bool(self.is_admin(&user.id)))
            })
            .collect()
    }

    fn grant_admin(&mut self, user_id: UserId) -> Vec<ResultRow> {
        if self.is_admin(&user_id) {
            return Vec::new();
        }
        self.admin_users.push(user_id);
        self.writes += 1;
        vec![ResultRow::new().with("user_id", SqlValue::Uuid(*user_id.as_uuid()))]
    }

    fn open_order(&self, asset: &str, status: &str) -> Vec<ResultRow> {
        self.orders
            .iter()
            .filter(|order| order.status == status)
            .find_map(|order| {
                let balance = self.wallets.get(&(order.user_id, asset.to_owned()))?;
                Some(
                    ResultRow::new()
                        .with("id", SqlValue::Uuid(*order.id.as_uuid()))
                        .with("user_id", SqlValue::Uuid(*order.user_id.as_uuid()))
                        .with("amount", SqlValue::Decimal(order.amount))
                        .with("status", SqlValue::Text(order.status.clone()))
                        .with("available_balance", SqlValue::Decimal(*balance)),
                )
            })
            .into_iter()
            .collect()
    }

    fn balance(&self, user_id: UserId, asset: &str) -> Vec<ResultRow> {
        self.wallets
            .get(&(user_id, asset.to_owned()))
            .map(|balance| ResultRow::new().with("available_balance", SqlValue::Decimal(*balance)))
            .into_iter()
            .collect()
    }

    fn status(&self, order_id: OrderId) -> Vec<ResultRow> {
        self.orders
            .iter()
            .filter(|order| order.id == order_id)
            .map(|order| ResultRow::new().with("status", SqlValue::Text(order.status.clone())))
            .collect()
    }

    fn settlement_audit(&self, order_id: OrderId) -> Vec<ResultRow> {
        self.orders
            .iter()
            .filter(|order| order.id == order_id)
            .map(|order| {
                let newest = self
                    .audit_logs
                    .iter()
                    .rev()
                    .find(|entry| entry.order_id == order_id);
                let admin_id = newest
                    .and_then(|entry| entry.admin_id)
                    .map_or(SqlValue::Null, |id| SqlValue::Uuid(*id.as_uuid()));
                ResultRow::new()
                    .with(
                        "profit_loss",
                        order.profit_loss.map_or(SqlValue::Null, SqlValue::Decimal),
                    )
                    .with("audit_logged", SqlValue::Bool(newest.is_some()))
                    .with("audit_admin_id", admin_id)
            })
            .collect()
    }

    fn any_user(&self) -> Vec<ResultRow> {
        self.users
            .first()
            .map(|user| ResultRow::new().with("id", SqlValue::Uuid(*user.id.as_uuid())))
            .into_iter()
            .collect()
    }

    fn settle(
        &mut self,
        caller: Option<&UserId>,
        request: &SettlementRequest,
        state: &StoreState,
    ) -> Result<ProcedureResponse, StoreError> {
        if state.enforce_admin_check && !caller.is_some_and(|id| self.is_admin(id)) {
            return Err(StoreError::authorization("Unauthorized: Admin access required"));
        }
        let order = self
            .orders
            .iter_mut()
            .find(|order| order.id == request.order_id && OrderStatus::new(&order.status).is_open())
            .ok_or_else(|| StoreError::query("Order not found or already settled"))?;
        order.status = request.outcome.as_str().to_owned();
        order.profit_loss = Some(if request.outcome == OutcomeCode::Win {
            request.payout
        } else {
            -order.amount
        });
        let owner = order.user_id;

        if request.outcome == OutcomeCode::Win {
            let wallet = self
                .wallets
                .entry((owner, USD_ASSET.to_owned()))
                .or_insert(Decimal::ZERO);
            *wallet += request.payout;
        }
        if state.audit_logging {
            self.audit_logs.push(AuditRecord {
                order_id: request.order_id,
                admin_id: caller.copied(),
                outcome: request.outcome.as_str().to_owned(),
            });
        }
        self.writes += 1;
        ProcedureResponse::from_result_value(SqlValue::Json(json!({
            "success": true,
            "order_id": request.order_id.to_string(),
        })))
    }

    fn request_deposit(
        &mut self,
        caller: Option<&UserId>,
        request: &DepositRequest,
    ) -> Result<ProcedureResponse, StoreError> {
        let Some(user_id) = caller.filter(|id| self.users.iter().any(|user| user.id == **id))
        else {
            return Err(StoreError::authorization("Not authorized: no authenticated user"));
        };
        self.deposits.push(DepositRecord {
            user_id: *user_id,
            amount: request.amount,
            receipt_url: request.receipt_url.to_string(),
        });
        self.writes += 1;
        ProcedureResponse::from_result_value(SqlValue::Json(json!({
            "success": true,
            "deposit_id": self.deposits.len(),
        })))
    }
}

#[async_trait]
impl QueryExecutor for InMemoryStore {
    async fn execute(&self, statement: &Statement) -> Result<Vec<ResultRow>, StoreError> {
        let mut state = self.lock();
        if let Some(error) = &state.outage {
            return Err(error.clone());
        }
        let tables = &mut state.tables;
        match statement.sql() {
            FIND_USER_WITH_ADMIN_FLAG_SQL => {
                Ok(tables.user_with_admin_flag(text_param(statement, 0)?))
            }
            GRANT_ADMIN_SQL => Ok(tables.grant_admin(UserId::from(uuid_param(statement, 0)?))),
            FIND_OPEN_ORDER_SQL => Ok(tables.open_order(
                text_param(statement, 0)?,
                text_param(statement, 1)?,
            )),
            WALLET_BALANCE_SQL => Ok(tables.balance(
                UserId::from(uuid_param(statement, 0)?),
                text_param(statement, 1)?,
            )),
            ORDER_STATUS_SQL => Ok(tables.status(OrderId::from(uuid_param(statement, 0)?))),
            SETTLEMENT_AUDIT_SQL => {
                Ok(tables.settlement_audit(OrderId::from(uuid_param(statement, 0)?)))
            }
            ANY_USER_SQL => Ok(tables.any_user()),
            other => Err(StoreError::query(format!("unsupported statement: {other}"))),
        }
    }
}

#[async_trait]
impl IdentityElevator for InMemoryStore {
    async fn invoke(
        &self,
        caller: &CallerContext,
        call: &ProcedureCall,
        mode: TransactionMode,
    ) -> Result<ProcedureResponse, StoreError> {
        let mut state = self.lock();
        if let Some(error) = &state.outage {
            return Err(error.clone());
        }

        let mut draft = state.tables.clone();
        let result = match call {
            ProcedureCall::SettleBinaryOrder(request) => {
                draft.settle(caller.subject(), request, &state)
            }
            ProcedureCall::RequestNewDeposit(request) => {
                draft.request_deposit(caller.subject(), request)
            }
        };
        if result.is_ok() && mode == TransactionMode::Commit {
            state.tables = draft;
        }
        state.invocations.push(InvocationRecord {
            procedure: call.name(),
            caller: caller.clone(),
            mode,
            accepted: result.is_ok(),
        });
        result
    }
}
