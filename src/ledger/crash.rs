//! Two-phase crash rounds: start, then cash out, crash, or expire.
//!
//! Open rounds live under `crash:active:{id}` until one closure moves them to
//! the settled log. The delete and the settled entries share one batch, so a
//! round is never both open and settled on disk.

use super::locks::KeyedLocks;
use super::results::{load_settled, record_settlement};
use super::round_is_open;
use crate::errors::{ConflictError, NotFoundError, RgsResult, StorageError, ValidationError};
use crate::games::crash::{CrashSchedule, CrashTimer};
use crate::games::types::{
    CrashDetail, GameKind, RoundOutcome, RoundStatus, Settlement, SettlementResult, CASHOUT_LABEL,
    CRASHED_LABEL,
};
use crate::storage::{KvStore, StorageBatch};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

const ACTIVE_PREFIX: &str = "crash:active:";

fn active_key(round_id: &str) -> Vec<u8> {
    format!("{}{}", ACTIVE_PREFIX, round_id).into_bytes()
}

/// Whether `round_id` is an open crash round
pub fn is_active(storage: &dyn KvStore, round_id: &str) -> RgsResult<bool> {
    Ok(storage.get(&active_key(round_id))?.is_some())
}

fn load_active(storage: &dyn KvStore, round_id: &str) -> RgsResult<Option<CrashRound>> {
    let Some(bytes) = storage.get(&active_key(round_id))? else {
        return Ok(None);
    };
    let round = serde_json::from_slice(&bytes).map_err(|e| {
        StorageError::CorruptedData(format!("Failed to decode crash round {}: {}", round_id, e))
    })?;
    Ok(Some(round))
}

/// An open crash round. The crash step never leaves the core while open.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CrashRound {
    pub round_id: String,
    pub stake: f64,
    pub currency: String,
    pub crash_step: i64,
    pub started_at: DateTime<Utc>,
}

/// What a caller learns when a round starts
#[derive(Debug, Clone, PartialEq)]
pub struct CrashRoundHandle {
    pub round_id: String,
    pub stake: f64,
    pub currency: String,
    pub started_at: DateTime<Utc>,
    pub step_duration: Duration,
}

/// Snapshot returned by a status query
#[derive(Debug, Clone, PartialEq)]
pub struct CrashStatus {
    pub round_id: String,
    pub status: RoundStatus,
    pub current_step: i64,
    pub multiplier: f64,
    pub crashed: bool,
    /// Only revealed once the round has crashed
    pub crash_step: Option<i64>,
    pub started_at: DateTime<Utc>,
    pub result: Option<SettlementResult>,
    /// True when this query performed the expiry transition
    pub expired_now: bool,
}

/// The ways an open round can close
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Closure {
    /// Player cashed out strictly before the crash step
    CashOut { step: i64 },
    /// Player claimed a step at or past the crash step
    Crashed { claimed_step: i64 },
    /// A status query observed the round past its crash step
    Expired { observed_step: i64 },
}

/// Settlement for `round` closed by `closure` at `now`
pub fn close_round(
    round: &CrashRound,
    closure: Closure,
    schedule: &CrashSchedule,
    now: DateTime<Utc>,
) -> SettlementResult {
    let (label, outcome, payout, cashout_step, multiplier) = match closure {
        Closure::CashOut { step } => {
            let multiplier = schedule.multiplier(step);
            (
                CASHOUT_LABEL,
                RoundOutcome::Win,
                round.stake * multiplier,
                Some(step.max(0)),
                multiplier,
            )
        }
        Closure::Crashed { .. } | Closure::Expired { .. } => (
            CRASHED_LABEL,
            RoundOutcome::Loss,
            0.0,
            None,
            schedule.multiplier(round.crash_step),
        ),
    };

    SettlementResult {
        round_id: round.round_id.clone(),
        game: GameKind::Crash,
        label: label.to_string(),
        outcome,
        stake: round.stake,
        currency: round.currency.clone(),
        payout,
        balance_delta: payout - round.stake,
        settled_at: now,
        model_id: None,
        symbols: None,
        crash: Some(CrashDetail {
            crash_step: round.crash_step,
            cashout_step,
            multiplier,
            started_at: round.started_at,
        }),
        hilo: None,
    }
}

pub struct CrashLedger {
    storage: Arc<dyn KvStore>,
    locks: Arc<KeyedLocks>,
    schedule: CrashSchedule,
    timer: CrashTimer,
}

impl CrashLedger {
    pub fn new(
        storage: Arc<dyn KvStore>,
        locks: Arc<KeyedLocks>,
        schedule: CrashSchedule,
        timer: CrashTimer,
    ) -> Self {
        Self {
            storage,
            locks,
            schedule,
            timer,
        }
    }

    pub fn schedule(&self) -> &CrashSchedule {
        &self.schedule
    }

    /// Open a round and draw its hidden crash step
    pub fn start(&self, round_id: &str, stake: f64, currency: &str) -> RgsResult<CrashRoundHandle> {
        self.locks.with_lock(round_id, || {
            if round_is_open(self.storage.as_ref(), round_id)?
                || load_settled(self.storage.as_ref(), round_id)?.is_some()
            {
                return Err(ConflictError::RoundExists(round_id.to_string()).into());
            }

            let round = CrashRound {
                round_id: round_id.to_string(),
                stake,
                currency: currency.to_string(),
                crash_step: self.schedule.draw_crash_step(),
                started_at: self.timer.now(),
            };
            let bytes = serde_json::to_vec(&round).map_err(|e| {
                StorageError::WriteFailed(format!("Failed to encode crash round {}: {}", round_id, e))
            })?;

            let mut batch = StorageBatch::new();
            batch.put(active_key(round_id), bytes);
            self.storage.write(batch)?;

            tracing::info!(round_id, stake, currency, "crash round started");

            Ok(CrashRoundHandle {
                round_id: round.round_id,
                stake,
                currency: round.currency,
                started_at: round.started_at,
                step_duration: self.timer.step_duration(),
            })
        })
    }

    /// Cash out at `claimed_step`, which must not be ahead of the clock
    pub fn cashout(&self, round_id: &str, claimed_step: i64) -> RgsResult<Settlement> {
        self.locks.with_lock(round_id, || {
            if let Some(result) = load_settled(self.storage.as_ref(), round_id)? {
                return Err(settled_conflict(round_id, result));
            }
            let Some(round) = load_active(self.storage.as_ref(), round_id)? else {
                return Err(NotFoundError::Round(round_id.to_string()).into());
            };

            let current = self.timer.elapsed_step(round.started_at);
            if claimed_step > current {
                return Err(ValidationError::FutureStep {
                    claimed: claimed_step,
                    current,
                }
                .into());
            }

            let step = claimed_step.max(0);
            let closure = if step >= round.crash_step {
                Closure::Crashed { claimed_step: step }
            } else {
                Closure::CashOut { step }
            };
            let result = self.close(&round, closure)?;

            Ok(Settlement {
                result,
                replayed: false,
            })
        })
    }

    /// Current view of a round; closes it as a loss once past its crash step
    pub fn status(&self, round_id: &str) -> RgsResult<CrashStatus> {
        self.locks.with_lock(round_id, || {
            if let Some(result) = load_settled(self.storage.as_ref(), round_id)? {
                let Some(detail) = result.crash.clone() else {
                    return Err(NotFoundError::Round(round_id.to_string()).into());
                };
                return Ok(self.settled_status(result, detail, false));
            }
            let Some(round) = load_active(self.storage.as_ref(), round_id)? else {
                return Err(NotFoundError::Round(round_id.to_string()).into());
            };

            let current = self.timer.elapsed_step(round.started_at);
            if current >= round.crash_step {
                let result = self.close(
                    &round,
                    Closure::Expired {
                        observed_step: current,
                    },
                )?;
                let detail = result.crash.clone().ok_or_else(|| {
                    StorageError::CorruptedData(format!("crash round {} lost its detail", round_id))
                })?;
                return Ok(self.settled_status(result, detail, true));
            }

            Ok(CrashStatus {
                round_id: round.round_id,
                status: RoundStatus::Open,
                current_step: current,
                multiplier: self.schedule.multiplier(current),
                crashed: false,
                crash_step: None,
                started_at: round.started_at,
                result: None,
                expired_now: false,
            })
        })
    }

    fn close(&self, round: &CrashRound, closure: Closure) -> RgsResult<SettlementResult> {
        let result = close_round(round, closure, &self.schedule, self.timer.now());

        let mut batch = StorageBatch::new();
        batch.delete(active_key(&round.round_id));
        record_settlement(&mut batch, &result)?;
        self.storage.write(batch)?;

        tracing::info!(
            round_id = %round.round_id,
            closure = ?closure,
            outcome = %result.outcome,
            payout = result.payout,
            "crash round closed"
        );
        Ok(result)
    }

    fn settled_status(&self, result: SettlementResult, detail: CrashDetail, expired_now: bool) -> CrashStatus {
        let crashed = !result.is_win();
        let current_step = detail.cashout_step.unwrap_or(detail.crash_step);
        CrashStatus {
            round_id: result.round_id.clone(),
            status: RoundStatus::Settled,
            current_step,
            multiplier: self.schedule.multiplier(current_step),
            crashed,
            crash_step: crashed.then_some(detail.crash_step),
            started_at: detail.started_at,
            result: Some(result),
            expired_now,
        }
    }
}

fn settled_conflict(round_id: &str, result: SettlementResult) -> crate::errors::RgsError {
    if result.game == GameKind::Crash {
        ConflictError::AlreadySettled {
            round_id: round_id.to_string(),
            result: Box::new(result),
        }
        .into()
    } else {
        ConflictError::RoundExists(round_id.to_string()).into()
    }
}
