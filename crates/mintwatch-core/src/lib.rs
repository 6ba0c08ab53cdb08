//! # mintwatch-core
//!
//! Core types, traits, configuration, and error handling for mintwatch.

pub mod command;
pub mod config;
pub mod error;
pub mod launch;
pub mod mention;
pub mod retry;
pub mod traits;

pub use config::shellexpand;
