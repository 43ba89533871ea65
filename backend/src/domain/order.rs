//! Order and wallet views read by the settlement probe.

use std::fmt;

use rust_decimal::Decimal;

use super::{OrderId, UserId};

/// Asset symbol of the cash wallet inspected around settlement.
pub const USD_ASSET: &str = "USD";

/// Order lifecycle status as stored by the platform.
///
/// The store owns the enumeration, so the value is kept as text and only
/// the `OPEN` state is interpreted here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderStatus(String);

impl OrderStatus {
    /// Status of an order awaiting settlement.
    pub const OPEN: &'static str = "OPEN";

    /// Wrap a raw status label.
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    /// Whether the order is still awaiting settlement.
    pub fn is_open(&self) -> bool {
        self.0.eq_ignore_ascii_case(Self::OPEN)
    }

    /// Raw status label.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome code passed to the settlement procedure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutcomeCode {
    /// The owner won; the payout is credited.
    Win,
    /// The owner lost the stake.
    Loss,
    /// Any other label the store accepts, upper-cased.
    Other(String),
}

impl OutcomeCode {
    /// Parse a configured outcome label, normalising case.
    pub fn parse(label: &str) -> Self {
        let normalised = label.trim().to_ascii_uppercase();
        match normalised.as_str() {
            "WIN" => Self::Win,
            "LOSS" => Self::Loss,
            _ => Self::Other(normalised),
        }
    }

    /// Label sent to the procedure.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Win => "WIN",
            Self::Loss => "LOSS",
            Self::Other(label) => label,
        }
    }

    /// Amount the owner's cash balance should grow by for a given payout.
    ///
    /// Only a win credits the wallet; every other outcome leaves it untouched.
    pub fn expected_credit(&self, payout: Decimal) -> Decimal {
        match self {
            Self::Win => payout,
            Self::Loss | Self::Other(_) => Decimal::ZERO,
        }
    }
}

impl fmt::Display for OutcomeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An open order joined with its owner's USD wallet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenOrderCandidate {
    pub order_id: OrderId,
    pub owner_id: UserId,
    /// Stake placed on the order.
    pub amount: Decimal,
    pub status: OrderStatus,
    /// Owner's USD balance before settlement.
    pub available_balance: Decimal,
}
