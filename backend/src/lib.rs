//! Backend verification harness library modules.
//!
//! The harness checks that the platform's privileged procedures enforce
//! caller identity and produce the expected wallet effects. `domain` holds
//! the steps and ports, `outbound` the PostgreSQL adapters, and `config` the
//! OrthoConfig-backed settings.
#![cfg_attr(not(any(test, doctest)), deny(clippy::unwrap_used))]
#![cfg_attr(not(any(test, doctest)), deny(clippy::expect_used))]

pub mod config;
pub mod domain;
pub mod outbound;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
