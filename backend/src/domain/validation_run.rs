//! Sequential validation run over the bootstrapper and both probes.
//!
//! Steps always run in the same order and every step is attempted. The only
//! value carried forward is the admin identifier established by the first
//! step. Findings are written as a human-readable transcript while the
//! structured outcomes are returned for programmatic checks.

use std::fmt;
use std::io::{self, Write};

use tracing::info;

use super::admin_bootstrap::{AdminBootstrapper, AdminOutcome};
use super::deposit_probe::{DepositOutcome, DepositProbe};
use super::settlement_probe::{
    AuthorizationCheck, SettlementAudit, SettlementOutcome, SettlementProbe,
};

/// First line of every transcript.
pub const TRANSCRIPT_START: &str = "--- VALIDATION START ---";
/// Last line of every transcript.
pub const TRANSCRIPT_END: &str = "--- VALIDATION END ---";

/// Classification of a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    /// Exercised and every observation matched.
    Passed,
    /// A precondition was missing; nothing was exercised.
    Skipped,
    /// A store call failed or an observation contradicted the contract.
    Failed,
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Passed => "PASSED",
            Self::Skipped => "SKIPPED",
            Self::Failed => "FAILED",
        })
    }
}

/// Transcript entry for one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepReport {
    pub title: &'static str,
    pub status: StepStatus,
    /// One line per observation, in the order made.
    pub findings: Vec<String>,
}

impl StepReport {
    fn new(title: &'static str, status: StepStatus, findings: Vec<String>) -> Self {
        Self {
            title,
            status,
            findings,
        }
    }
}

/// Everything a run observed.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationReport {
    pub admin: AdminOutcome,
    pub settlement: SettlementOutcome,
    pub deposit: DepositOutcome,
    /// Step classifications in run order.
    pub steps: Vec<StepReport>,
}

impl ValidationReport {
    /// True when no step failed. Skipped steps do not count as failures.
    pub fn is_success(&self) -> bool {
        self.steps
            .iter()
            .all(|step| step.status != StepStatus::Failed)
    }

    /// Titles of failed steps, in run order.
    pub fn failed_steps(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.steps
            .iter()
            .filter(|step| step.status == StepStatus::Failed)
            .map(|step| step.title)
    }
}

/// Runs admin bootstrap, settlement and deposit probes in order.
pub struct ValidationRun {
    bootstrapper: AdminBootstrapper,
    settlement: SettlementProbe,
    deposit: DepositProbe,
    admin_email: String,
}

impl ValidationRun {
    /// Assemble a run that bootstraps `admin_email` before probing.
    pub fn new(
        bootstrapper: AdminBootstrapper,
        settlement: SettlementProbe,
        deposit: DepositProbe,
        admin_email: impl Into<String>,
    ) -> Self {
        Self {
            bootstrapper,
            settlement,
            deposit,
            admin_email: admin_email.into(),
        }
    }

    /// Run every step and write the transcript to `out`.
    ///
    /// # Errors
    ///
    /// Only transcript write failures are returned; store failures are
    /// recorded in the report.
    pub async fn run<W: Write>(&self, out: &mut W) -> io::Result<ValidationReport> {
        writeln!(out, "{TRANSCRIPT_START}")?;

        let admin = self.bootstrapper.ensure_admin(&self.admin_email).await;
        let admin_step = describe_admin(&admin);
        write_step(out, 1, &admin_step)?;

        let settlement = self.settlement.probe_settlement(admin.admin_id()).await;
        let settlement_step = describe_settlement(&settlement);
        write_step(out, 2, &settlement_step)?;

        let deposit = self.deposit.probe_deposit().await;
        let deposit_step = describe_deposit(&deposit);
        write_step(out, 3, &deposit_step)?;

        let report = ValidationReport {
            admin,
            settlement,
            deposit,
            steps: vec![admin_step, settlement_step, deposit_step],
        };
        let verdict = if report.is_success() { "PASSED" } else { "FAILED" };
        writeln!(out, "Overall: {verdict}")?;
        writeln!(out, "{TRANSCRIPT_END}")?;
        out.flush()?;

        info!(success = report.is_success(), "validation run finished");
        Ok(report)
    }
}

const STEP_COUNT: usize = 3;

fn write_step<W: Write>(out: &mut W, index: usize, step: &StepReport) -> io::Result<()> {
    writeln!(out)?;
    writeln!(out, "[{index}/{STEP_COUNT}] {}", step.title)?;
    for finding in &step.findings {
        writeln!(out, "  - {finding}")?;
    }
    writeln!(out, "  => {}", step.status)
}

fn describe_admin(outcome: &AdminOutcome) -> StepReport {
    const TITLE: &str = "Admin bootstrap";
    match outcome {
        AdminOutcome::Verified(status) => {
            let membership = if status.was_already_admin {
                "already held admin membership"
            } else {
                "granted admin membership"
            };
            StepReport::new(
                TITLE,
                StepStatus::Passed,
                vec![format!("{} ({}) {membership}", status.email, status.user_id)],
            )
        }
        AdminOutcome::NotFound { email } => StepReport::new(
            TITLE,
            StepStatus::Skipped,
            vec![format!("no user registered under {email}")],
        ),
        AdminOutcome::Failed(error) => {
            StepReport::new(TITLE, StepStatus::Failed, vec![error.to_string()])
        }
    }
}

fn describe_authorization(check: &AuthorizationCheck) -> String {
    match check {
        AuthorizationCheck::Skipped => "anonymous invocation check disabled".to_owned(),
        AuthorizationCheck::Enforced => "anonymous invocation refused as expected".to_owned(),
        AuthorizationCheck::NotEnforced => {
            "anonymous invocation was ACCEPTED (effects rolled back)".to_owned()
        }
        AuthorizationCheck::Inconclusive(error) => {
            format!("anonymous invocation failed for another reason: {error}")
        }
    }
}

fn describe_audit(audit: &SettlementAudit) -> String {
    if !audit.logged {
        return "settlement audit entry NOT FOUND".to_owned();
    }
    let admin = audit
        .logged_by
        .map_or_else(|| "unknown admin".to_owned(), |id| id.to_string());
    let profit_loss = audit
        .profit_loss
        .map_or_else(|| "not recorded".to_owned(), |value| value.to_string());
    format!("settlement audit entry found (admin {admin}, profit/loss {profit_loss})")
}

fn describe_settlement(outcome: &SettlementOutcome) -> StepReport {
    const TITLE: &str = "Settlement probe";
    match outcome {
        SettlementOutcome::Settled(report) => {
            let candidate = &report.candidate;
            let findings = vec![
                format!(
                    "order {} owned by {} (amount {}, status {})",
                    candidate.order_id, candidate.owner_id, candidate.amount, candidate.status
                ),
                describe_authorization(&report.authorization),
                format!("settlement response: {}", report.response.summary()),
                format!(
                    "USD balance {} -> {} (delta {}, expected {})",
                    candidate.available_balance,
                    report.balance_after,
                    report.balance_delta(),
                    report.expected_credit
                ),
                format!("order status after settlement: {}", report.status_after),
                describe_audit(&report.audit),
            ];
            let status = if report.passed() {
                StepStatus::Passed
            } else {
                StepStatus::Failed
            };
            StepReport::new(TITLE, status, findings)
        }
        SettlementOutcome::NoOpenOrders => StepReport::new(
            TITLE,
            StepStatus::Skipped,
            vec!["no open orders with a USD wallet".to_owned()],
        ),
        SettlementOutcome::MissingAdmin { candidate } => StepReport::new(
            TITLE,
            StepStatus::Skipped,
            vec![format!(
                "order {} found but no admin identity is available; settlement not invoked",
                candidate.order_id
            )],
        ),
        SettlementOutcome::Failed {
            candidate,
            stage,
            error,
        } => {
            let mut findings = Vec::with_capacity(2);
            if let Some(candidate) = candidate {
                findings.push(format!("order {}", candidate.order_id));
            }
            findings.push(format!("{stage:?} stage failed: {error}"));
            StepReport::new(TITLE, StepStatus::Failed, findings)
        }
    }
}

fn describe_deposit(outcome: &DepositOutcome) -> StepReport {
    const TITLE: &str = "Deposit probe";
    match outcome {
        DepositOutcome::Requested { user_id, response } => StepReport::new(
            TITLE,
            StepStatus::Passed,
            vec![
                format!("deposit requested as {user_id}"),
                format!("deposit response: {}", response.summary()),
            ],
        ),
        DepositOutcome::NoUsers => StepReport::new(
            TITLE,
            StepStatus::Skipped,
            vec!["no users available to request a deposit".to_owned()],
        ),
        DepositOutcome::Failed { user_id, error } => {
            let mut findings = Vec::with_capacity(2);
            if let Some(user_id) = user_id {
                findings.push(format!("deposit requested as {user_id}"));
            }
            findings.push(error.to_string());
            StepReport::new(TITLE, StepStatus::Failed, findings)
        }
    }
}
