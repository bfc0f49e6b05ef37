//! STX worker: a session orchestrator for the STX exchange.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod engine;
pub mod error;
pub mod strategy;
pub mod types;
pub mod venue;
