//! Domain primitives, ports, and the validation steps built on them.
//!
//! Purpose: Describe what the harness checks against the platform's data
//! store without depending on a concrete driver. Adapters live under
//! `crate::outbound`; this module only sees the ports.
//!
//! Public surface:
//! - UserId / OrderId - validated UUID identifiers.
//! - OrderStatus / OutcomeCode / OpenOrderCandidate - order views.
//! - AdminBootstrapper - grants admin membership idempotently.
//! - SettlementProbe / DepositProbe - exercise privileged procedures.
//! - ValidationRun - runs every step and writes the transcript.

pub mod admin_bootstrap;
pub mod deposit_probe;
pub mod order;
pub mod ports;
pub mod queries;
pub mod settlement_probe;
pub mod user;
pub mod validation_run;

pub use self::admin_bootstrap::{AdminBootstrapper, AdminOutcome, AdminStatus};
pub use self::deposit_probe::{DepositOutcome, DepositPlan, DepositProbe};
pub use self::order::{OpenOrderCandidate, OrderStatus, OutcomeCode, USD_ASSET};
pub use self::settlement_probe::{
    AuthorizationCheck, SettlementAudit, SettlementOutcome, SettlementPlan, SettlementProbe,
    SettlementReport, SettlementStage,
};
pub use self::user::{IdValidationError, OrderId, UserId};
pub use self::validation_run::{
    StepReport, StepStatus, TRANSCRIPT_END, TRANSCRIPT_START, ValidationReport, ValidationRun,
};
