//! RGS HTTP API
//!
//! Thin adapter over [`crate::orchestrator::SettlementOrchestrator`]. Wallet
//! debits and credits stay with the caller.

pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod server;

pub use server::{create_app, init_tracing, ApiServer};
