//! Validator entry-point: bootstraps the operator's admin membership, then
//! probes settlement and deposit procedures against the configured store.
#![cfg_attr(not(any(test, doctest)), deny(clippy::unwrap_used))]
#![cfg_attr(not(any(test, doctest)), deny(clippy::expect_used))]

use std::ffi::OsString;
use std::io;
use std::process::ExitCode;
use std::sync::Arc;

use color_eyre::eyre::{Context, Result};
use ortho_config::OrthoConfig;
use tokio::runtime::Builder;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use backend_validator::config::HarnessSettings;
use backend_validator::domain::{
    AdminBootstrapper, DepositProbe, SettlementProbe, ValidationRun,
};
use backend_validator::outbound::persistence::{PgIdentityElevator, PgQueryExecutor};

/// Exit status for configuration or runtime failures, distinct from failed
/// validation steps.
const SETUP_FAILURE: u8 = 2;

fn main() -> ExitCode {
    match try_main() {
        Ok(code) => code,
        Err(report) => {
            eprintln!("Error: {report:?}");
            ExitCode::from(SETUP_FAILURE)
        }
    }
}

fn try_main() -> Result<ExitCode> {
    color_eyre::install()?;
    if let Err(e) = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .json()
        .try_init()
    {
        warn!(error = %e, "tracing init failed");
    }

    let runtime = Builder::new_current_thread()
        .enable_all()
        .build()
        .wrap_err("failed to build validator runtime")?;
    runtime.block_on(async_main())
}

async fn async_main() -> Result<ExitCode> {
    let settings = HarnessSettings::load_from_iter([OsString::from("validate-backend")])
        .wrap_err("failed to load PROBE_* settings")?;
    let run = build_run(&settings)?;

    let mut stdout = io::stdout().lock();
    let report = run
        .run(&mut stdout)
        .await
        .wrap_err("failed to write validation transcript")?;

    let failed: Vec<_> = report.failed_steps().collect();
    if failed.is_empty() {
        info!("all validation steps passed or were skipped");
        Ok(ExitCode::SUCCESS)
    } else {
        warn!(?failed, "validation steps failed");
        Ok(ExitCode::FAILURE)
    }
}

fn build_run(settings: &HarnessSettings) -> Result<ValidationRun> {
    let connection = settings
        .connection()
        .wrap_err("invalid connection settings")?;
    let executor = Arc::new(PgQueryExecutor::new(connection.clone()));
    let elevator = Arc::new(
        PgIdentityElevator::new(connection, settings.caller_role())
            .with_session_role(settings.caller_role.clone()),
    );

    let settlement_plan = settings
        .settlement_plan()
        .wrap_err("invalid settlement settings")?;
    let deposit_plan = settings
        .deposit_plan()
        .wrap_err("invalid deposit settings")?;
    let admin_email = settings.admin_email().wrap_err("invalid admin settings")?;

    Ok(ValidationRun::new(
        AdminBootstrapper::new(executor.clone()),
        SettlementProbe::new(executor.clone(), elevator.clone(), settlement_plan),
        DepositProbe::new(executor, elevator, deposit_plan),
        admin_email,
    ))
}
