//! Harness configuration loaded via OrthoConfig.
//!
//! Connection values have no defaults: the harness must never fall back to
//! a built-in host or credential. Probe arguments default to the values the
//! platform's test fixtures expect.

use std::str::FromStr;

use ortho_config::OrthoConfig;
use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::domain::ports::DEFAULT_CALLER_ROLE;
use crate::domain::{DepositPlan, OutcomeCode, SettlementPlan};
use crate::outbound::persistence::{ConnectionConfig, TlsMode};

const DEFAULT_PORT: u16 = 5432;
const DEFAULT_OUTCOME: &str = "WIN";
const DEFAULT_PAYOUT: &str = "50000.0";
const DEFAULT_NOTE: &str = "Test settlement";
const DEFAULT_EVIDENCE_URL: &str = "http://test.url";
const DEFAULT_DEPOSIT_AMOUNT: &str = "100.0";
const DEFAULT_RECEIPT_URL: &str = "http://test-receipt.url";

/// Errors raised while turning raw settings into validated plans.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettingsError {
    #[error("missing required setting {0}")]
    Missing(&'static str),
    #[error("setting {name} is not a valid URL: {reason}")]
    InvalidUrl { name: &'static str, reason: String },
    #[error("setting {name} must be a positive decimal, got {value:?}")]
    InvalidAmount { name: &'static str, value: String },
    #[error("setting PROBE_DB_TLS must be one of require, prefer, disable; got {0:?}")]
    InvalidTlsMode(String),
}

/// Values controlling the data store connection and the probes.
#[derive(Debug, Clone, Deserialize, OrthoConfig)]
#[ortho_config(prefix = "PROBE")]
pub struct HarnessSettings {
    /// Data store host name.
    pub db_host: Option<String>,
    /// Data store port.
    pub db_port: Option<u16>,
    /// Database name.
    pub db_name: Option<String>,
    /// Login role.
    pub db_user: Option<String>,
    /// Login password.
    pub db_password: Option<String>,
    /// Transport encryption: `require` (default), `prefer`, or `disable`.
    pub db_tls: Option<String>,
    /// Operator account granted admin membership.
    pub admin_email: Option<String>,
    /// Role claimed alongside the elevated subject.
    pub caller_role: Option<String>,
    /// Outcome code passed to the settlement procedure.
    pub settlement_outcome: Option<String>,
    /// Payout passed to the settlement procedure.
    pub settlement_payout: Option<String>,
    /// Free-text settlement note.
    pub settlement_note: Option<String>,
    /// Evidence reference attached to the settlement.
    pub evidence_url: Option<String>,
    /// Amount requested by the deposit probe.
    pub deposit_amount: Option<String>,
    /// Receipt reference attached to the deposit request.
    pub receipt_url: Option<String>,
    /// Invoke the settlement procedure anonymously first and expect refusal.
    #[ortho_config(default = true)]
    pub verify_authorization: bool,
}

impl HarnessSettings {
    /// Validated connection parameters.
    pub fn connection(&self) -> Result<ConnectionConfig, SettingsError> {
        Ok(ConnectionConfig {
            host: required(&self.db_host, "PROBE_DB_HOST")?,
            port: self.db_port.unwrap_or(DEFAULT_PORT),
            database: required(&self.db_name, "PROBE_DB_NAME")?,
            username: required(&self.db_user, "PROBE_DB_USER")?,
            password: required(&self.db_password, "PROBE_DB_PASSWORD")?,
            tls: self.tls_mode()?,
        })
    }

    /// Configured TLS mode, `require` unless overridden.
    pub fn tls_mode(&self) -> Result<TlsMode, SettingsError> {
        match self.db_tls.as_deref() {
            None => Ok(TlsMode::Require),
            Some(label) => {
                TlsMode::parse(label).ok_or_else(|| SettingsError::InvalidTlsMode(label.to_owned()))
            }
        }
    }

    /// Operator email handed to the admin bootstrapper.
    pub fn admin_email(&self) -> Result<String, SettingsError> {
        required(&self.admin_email, "PROBE_ADMIN_EMAIL")
    }

    /// Role claimed by elevated callers.
    pub fn caller_role(&self) -> &str {
        self.caller_role
            .as_deref()
            .filter(|role| !role.trim().is_empty())
            .unwrap_or(DEFAULT_CALLER_ROLE)
    }

    /// Arguments for the settlement probe.
    pub fn settlement_plan(&self) -> Result<SettlementPlan, SettingsError> {
        Ok(SettlementPlan {
            outcome: OutcomeCode::parse(
                self.settlement_outcome.as_deref().unwrap_or(DEFAULT_OUTCOME),
            ),
            payout: positive_amount(
                self.settlement_payout.as_deref().unwrap_or(DEFAULT_PAYOUT),
                "PROBE_SETTLEMENT_PAYOUT",
            )?,
            note: self
                .settlement_note
                .clone()
                .unwrap_or_else(|| DEFAULT_NOTE.to_owned()),
            evidence_url: parse_url(
                self.evidence_url.as_deref().unwrap_or(DEFAULT_EVIDENCE_URL),
                "PROBE_EVIDENCE_URL",
            )?,
            verify_authorization: self.verify_authorization,
        })
    }

    /// Arguments for the deposit probe.
    pub fn deposit_plan(&self) -> Result<DepositPlan, SettingsError> {
        Ok(DepositPlan {
            amount: positive_amount(
                self.deposit_amount
                    .as_deref()
                    .unwrap_or(DEFAULT_DEPOSIT_AMOUNT),
                "PROBE_DEPOSIT_AMOUNT",
            )?,
            receipt_url: parse_url(
                self.receipt_url.as_deref().unwrap_or(DEFAULT_RECEIPT_URL),
                "PROBE_RECEIPT_URL",
            )?,
        })
    }
}

fn required(value: &Option<String>, name: &'static str) -> Result<String, SettingsError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
        .ok_or(SettingsError::Missing(name))
}

fn positive_amount(raw: &str, name: &'static str) -> Result<Decimal, SettingsError> {
    let invalid = || SettingsError::InvalidAmount {
        name,
        value: raw.to_owned(),
    };
    let amount = Decimal::from_str(raw.trim()).map_err(|_| invalid())?;
    if amount > Decimal::ZERO {
        Ok(amount)
    } else {
        Err(invalid())
    }
}

fn parse_url(raw: &str, name: &'static str) -> Result<Url, SettingsError> {
    Url::parse(raw.trim()).map_err(|error| SettingsError::InvalidUrl {
        name,
        reason: error.to_string(),
    })
}
