//! Outbound adapters implementing domain ports for external infrastructure.
//!
//! - **persistence**: PostgreSQL-backed executor and identity elevator
//!   using `sqlx`
//!
//! Adapters are thin translators between driver types and domain types.
//! They contain no validation logic.

pub mod persistence;
