//! Port for invoking privileged procedures under an established caller.
//!
//! Procedures on the platform derive the caller from the session-scoped JWT
//! claim (`auth.uid()`), not from the login role. Setting that claim and
//! calling the procedure therefore has to happen on one connection inside
//! one transaction; a claim set on a different connection is invisible to
//! the procedure and the authorization check silently evaluates against no
//! caller at all.

use async_trait::async_trait;
use rust_decimal::Decimal;
use url::Url;

use crate::domain::{OrderId, OutcomeCode, UserId};

use super::{SqlValue, Statement, StoreError, mentions_authorization_failure};

/// Role claimed by elevated callers unless configured otherwise.
pub const DEFAULT_CALLER_ROLE: &str = "authenticated";

/// SQL invoking the settlement procedure.
///
/// Results are cast to `text` so `void`, JSON, and composite returns all
/// arrive in one decodable form.
pub const SETTLE_BINARY_ORDER_SQL: &str = concat!(
    "SELECT public.settle_binary_order(",
    "$1::uuid, $2::text, $3::numeric, $4::text, $5::text",
    ")::text AS result"
);

/// SQL invoking the deposit request procedure.
pub const REQUEST_NEW_DEPOSIT_SQL: &str =
    "SELECT public.request_new_deposit($1::numeric, $2::text)::text AS result";

/// Identity the procedure should observe as its caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallerContext {
    /// Establish the user as the effective caller for one transaction.
    Elevated(UserId),
    /// Invoke with no caller claim at all.
    Anonymous,
}

impl CallerContext {
    /// The claimed subject, if any.
    pub fn subject(&self) -> Option<&UserId> {
        match self {
            Self::Elevated(user_id) => Some(user_id),
            Self::Anonymous => None,
        }
    }
}

/// How the invocation transaction ends when the procedure succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionMode {
    /// Keep the procedure's effects.
    Commit,
    /// Discard every effect; used for negative authorization checks.
    RollBack,
}

/// JWT claims installed for an elevated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElevationClaims {
    sub: String,
    role: String,
}

impl ElevationClaims {
    /// Claims naming `subject` with the given role.
    pub fn for_subject(subject: &UserId, role: &str) -> Self {
        Self {
            sub: subject.to_string(),
            role: role.to_owned(),
        }
    }

    /// Subject claim.
    pub fn subject(&self) -> &str {
        &self.sub
    }

    /// Serialise into the JSON document read by `auth.uid()`.
    pub fn to_json(&self) -> String {
        serde_json::json!({ "sub": self.sub, "role": self.role }).to_string()
    }
}

/// Parameters for `settle_binary_order`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementRequest {
    pub order_id: OrderId,
    pub outcome: OutcomeCode,
    pub payout: Decimal,
    /// Free-text rationale stored with the settlement.
    pub note: String,
    /// Supporting document stored with the settlement.
    pub evidence_url: Url,
}

/// Parameters for `request_new_deposit`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositRequest {
    pub amount: Decimal,
    /// Proof-of-payment upload.
    pub receipt_url: Url,
}

/// A privileged procedure together with its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcedureCall {
    /// `public.settle_binary_order`, admin only.
    SettleBinaryOrder(SettlementRequest),
    /// `public.request_new_deposit`, filed for the caller.
    RequestNewDeposit(DepositRequest),
}

impl ProcedureCall {
    /// Procedure name for logs and transcripts.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SettleBinaryOrder(_) => "settle_binary_order",
            Self::RequestNewDeposit(_) => "request_new_deposit",
        }
    }

    /// Statement performing the call.
    pub fn statement(&self) -> Statement {
        match self {
            Self::SettleBinaryOrder(request) => Statement::new(SETTLE_BINARY_ORDER_SQL)
                .bind(*request.order_id.as_uuid())
                .bind(request.outcome.as_str())
                .bind(request.payout)
                .bind(request.note.as_str())
                .bind(request.evidence_url.as_str()),
            Self::RequestNewDeposit(request) => Statement::new(REQUEST_NEW_DEPOSIT_SQL)
                .bind(request.amount)
                .bind(request.receipt_url.as_str()),
        }
    }
}

/// Value returned by a procedure that accepted the call.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcedureResponse {
    value: SqlValue,
}

impl ProcedureResponse {
    /// Interpret a procedure's `result` column.
    ///
    /// The column holds the result's text form: `void` renders as an empty
    /// string and becomes [`SqlValue::Null`], and a JSON object or array
    /// becomes [`SqlValue::Json`]. Procedures returning a JSON envelope signal
    /// refusal with `"success": false`; that envelope becomes an error,
    /// classified as an authorization failure when its message says so.
    pub fn from_result_value(value: SqlValue) -> Result<Self, StoreError> {
        let value = normalise_result(value);
        if let SqlValue::Json(document) = &value
            && document.get("success").and_then(serde_json::Value::as_bool) == Some(false)
        {
            let message = document
                .get("error")
                .or_else(|| document.get("message"))
                .and_then(serde_json::Value::as_str)
                .unwrap_or("procedure reported failure without a message")
                .to_owned();
            return Err(if mentions_authorization_failure(&message) {
                StoreError::authorization(message)
            } else {
                StoreError::rejected(message)
            });
        }
        Ok(Self { value })
    }

    /// The raw result value.
    pub fn value(&self) -> &SqlValue {
        &self.value
    }

    /// Short description for transcripts.
    pub fn summary(&self) -> String {
        match &self.value {
            SqlValue::Null => "no result (void)".to_owned(),
            SqlValue::Json(document) => document.to_string(),
            SqlValue::Text(text) => text.clone(),
            other => format!("{other:?}"),
        }
    }
}

fn normalise_result(value: SqlValue) -> SqlValue {
    let SqlValue::Text(text) = value else {
        return value;
    };
    if text.is_empty() {
        return SqlValue::Null;
    }
    match serde_json::from_str::<serde_json::Value>(&text) {
        Ok(document) if document.is_object() || document.is_array() => SqlValue::Json(document),
        _ => SqlValue::Text(text),
    }
}

/// Invokes procedures with a caller identity established in the same
/// transaction.
///
/// Implementations must:
/// - open one connection and one transaction per invocation;
/// - install the caller claim transaction-locally before the call;
/// - commit or roll back according to [`TransactionMode`], rolling back on
///   any failure;
/// - never leave the claim visible outside the transaction.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdentityElevator: Send + Sync {
    /// Run `call` as `caller` and report how the procedure answered.
    async fn invoke(
        &self,
        caller: &CallerContext,
        call: &ProcedureCall,
        mode: TransactionMode,
    ) -> Result<ProcedureResponse, StoreError>;
}
