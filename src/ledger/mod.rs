//! Round ledger: settled-round log plus the instant, crash and Hi/Lo round
//! flows.
//!
//! All flows share one [`KeyedLocks`] so an id is never settled by two flows
//! at once.

pub mod crash;
pub mod hilo;
pub mod instant;
pub mod locks;
pub mod results;

pub use crash::{close_round, Closure, CrashLedger, CrashRound, CrashRoundHandle, CrashStatus};
pub use hilo::{HiLoLedger, HiLoRound};
pub use instant::InstantLedger;
pub use locks::KeyedLocks;
pub use results::{load_audit_log, load_settled};

use crate::errors::RgsResult;
use crate::storage::KvStore;

/// Whether `round_id` is an open two-phase round of any game
pub(crate) fn round_is_open(storage: &dyn KvStore, round_id: &str) -> RgsResult<bool> {
    Ok(crash::is_active(storage, round_id)? || hilo::is_active(storage, round_id)?)
}
