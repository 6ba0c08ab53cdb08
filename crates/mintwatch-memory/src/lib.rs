//! # mintwatch-memory
//!
//! Durable launch state for mintwatch (SQLite-backed).

pub mod audit;
pub mod store;

pub use audit::AuditLogger;
pub use store::{ClaimOutcome, Store};
