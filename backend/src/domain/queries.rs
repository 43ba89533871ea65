//! Statements issued by the probes.
//!
//! Enumerated columns are cast to text, both when selected and when
//! compared with a bound parameter, so the executor can work without
//! knowing the store's custom types.

use super::order::{OrderStatus, USD_ASSET};
use super::ports::Statement;
use super::{OrderId, UserId};

/// User by email plus whether an `admin_users` row exists for them.
pub const FIND_USER_WITH_ADMIN_FLAG_SQL: &str = concat!(
    "SELECT u.id, u.email::text AS email, ",
    "EXISTS (SELECT 1 FROM public.admin_users a WHERE a.user_id = u.id) AS is_admin ",
    "FROM auth.users u ",
    "WHERE u.email = $1 ",
    "LIMIT 1"
);

/// Insert-if-absent membership grant; returns no row when already present.
pub const GRANT_ADMIN_SQL: &str = concat!(
    "INSERT INTO public.admin_users (user_id) VALUES ($1) ",
    "ON CONFLICT (user_id) DO NOTHING ",
    "RETURNING user_id"
);

/// One order in the given status whose owner holds a wallet in the asset.
pub const FIND_OPEN_ORDER_SQL: &str = concat!(
    "SELECT o.id, o.user_id, o.amount, o.status::text AS status, w.available_balance ",
    "FROM public.orders o ",
    "JOIN public.wallets w ON w.user_id = o.user_id AND w.asset_symbol::text = $1 ",
    "WHERE o.status::text = $2 ",
    "LIMIT 1"
);

/// Available balance of one wallet.
pub const WALLET_BALANCE_SQL: &str = concat!(
    "SELECT available_balance FROM public.wallets ",
    "WHERE user_id = $1 AND asset_symbol::text = $2"
);

/// Current status of one order.
pub const ORDER_STATUS_SQL: &str = "SELECT status::text AS status FROM public.orders WHERE id = $1";

/// Recorded profit or loss of an order and its newest settlement audit entry.
///
/// `audit_logged` is false and `audit_admin_id` null when no entry exists.
pub const SETTLEMENT_AUDIT_SQL: &str = concat!(
    "SELECT o.profit_loss, ",
    "(l.order_id IS NOT NULL) AS audit_logged, ",
    "l.admin_id AS audit_admin_id ",
    "FROM public.orders o ",
    "LEFT JOIN LATERAL (",
    "SELECT a.order_id, a.admin_id FROM public.trade_settlement_audit_logs a ",
    "WHERE a.order_id = o.id ORDER BY a.created_at DESC LIMIT 1",
    ") l ON true ",
    "WHERE o.id = $1"
);

/// Any registered user.
pub const ANY_USER_SQL: &str = "SELECT id FROM auth.users LIMIT 1";

/// Operator lookup for [`FIND_USER_WITH_ADMIN_FLAG_SQL`].
pub fn find_user_with_admin_flag(email: &str) -> Statement {
    Statement::new(FIND_USER_WITH_ADMIN_FLAG_SQL).bind(email)
}

/// Membership grant for [`GRANT_ADMIN_SQL`].
pub fn grant_admin(user_id: &UserId) -> Statement {
    Statement::new(GRANT_ADMIN_SQL).bind(*user_id.as_uuid())
}

/// First `OPEN` order with a USD wallet.
pub fn find_open_order() -> Statement {
    Statement::new(FIND_OPEN_ORDER_SQL)
        .bind(USD_ASSET)
        .bind(OrderStatus::OPEN)
}

/// USD wallet balance of `user_id`.
pub fn usd_balance(user_id: &UserId) -> Statement {
    Statement::new(WALLET_BALANCE_SQL)
        .bind(*user_id.as_uuid())
        .bind(USD_ASSET)
}

/// Status of `order_id`.
pub fn order_status(order_id: &OrderId) -> Statement {
    Statement::new(ORDER_STATUS_SQL).bind(*order_id.as_uuid())
}

/// Settlement trail of `order_id`.
pub fn settlement_audit(order_id: &OrderId) -> Statement {
    Statement::new(SETTLEMENT_AUDIT_SQL).bind(*order_id.as_uuid())
}

/// Deposit subject lookup.
pub fn any_user() -> Statement {
    Statement::new(ANY_USER_SQL)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::SqlParam;
    use rstest::rstest;

    #[rstest]
    #[case(FIND_OPEN_ORDER_SQL, "w.asset_symbol::text = $1")]
    #[case(WALLET_BALANCE_SQL, "asset_symbol::text = $2")]
    fn asset_symbols_compare_as_text(#[case] sql: &str, #[case] comparison: &str) {
        assert!(sql.contains(comparison), "{sql}");
    }

    #[rstest]
    fn audit_lookup_binds_the_order() {
        let order_id = OrderId::random();
        let statement = settlement_audit(&order_id);
        assert_eq!(statement.sql(), SETTLEMENT_AUDIT_SQL);
        assert_eq!(statement.params(), [SqlParam::Uuid(*order_id.as_uuid())]);
    }
}
