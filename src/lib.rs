//! RGS - Remote Game Server settlement core
//!
//! Draws weighted prize tiers from registered math models, settles instant
//! rounds exactly once per round id, and runs two-phase crash rounds whose
//! multiplier grows with wall-clock time. Every settlement is made durable in
//! RocksDB before it is acknowledged. The caller owns the wallet: it applies
//! each returned `balance_delta` exactly once.

pub mod api;
pub mod config;
pub mod errors;
pub mod games;
pub mod ledger;
pub mod math;
pub mod metrics;
pub mod orchestrator;
pub mod storage;

pub use config::{ConfigLoader, RgsConfig};
pub use errors::{RgsError, RgsResult};
pub use games::types::{GameKind, RoundOutcome, Settlement, SettlementResult};
pub use math::{MathModel, PrizeTier};
pub use metrics::RgsMetrics;
pub use orchestrator::SettlementOrchestrator;
pub use storage::{KvStore, MemoryStorage, RocksStorage};
