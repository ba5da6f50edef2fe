//! Two-phase Hi/Lo rounds: start shows a number, end settles the guess.
//!
//! Open rounds live under `hilo:active:{id}`. Ending a round deletes that
//! entry and records the settlement in one batch.

use super::locks::KeyedLocks;
use super::results::{load_settled, record_settlement};
use super::round_is_open;
use crate::errors::{ConflictError, NotFoundError, RgsError, RgsResult, StorageError};
use crate::games::hilo::{self, HiLoChoice};
use crate::games::types::{GameKind, HiLoDetail, Settlement, SettlementResult};
use crate::storage::{KvStore, StorageBatch};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const ACTIVE_PREFIX: &str = "hilo:active:";

fn active_key(round_id: &str) -> Vec<u8> {
    format!("{}{}", ACTIVE_PREFIX, round_id).into_bytes()
}

/// Whether `round_id` is an open Hi/Lo round
pub fn is_active(storage: &dyn KvStore, round_id: &str) -> RgsResult<bool> {
    Ok(storage.get(&active_key(round_id))?.is_some())
}

/// An open Hi/Lo round
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HiLoRound {
    pub round_id: String,
    pub stake: f64,
    pub currency: String,
    pub current_number: u8,
    pub started_at: DateTime<Utc>,
}

pub struct HiLoLedger {
    storage: Arc<dyn KvStore>,
    locks: Arc<KeyedLocks>,
}

impl HiLoLedger {
    pub fn new(storage: Arc<dyn KvStore>, locks: Arc<KeyedLocks>) -> Self {
        Self { storage, locks }
    }

    /// Open a round and draw the number shown to the player
    pub fn start(&self, round_id: &str, stake: f64, currency: &str) -> RgsResult<HiLoRound> {
        self.start_with(round_id, stake, currency, hilo::draw_number)
    }

    fn start_with<F>(&self, round_id: &str, stake: f64, currency: &str, draw: F) -> RgsResult<HiLoRound>
    where
        F: FnOnce() -> u8,
    {
        self.locks.with_lock(round_id, || {
            if round_is_open(self.storage.as_ref(), round_id)?
                || load_settled(self.storage.as_ref(), round_id)?.is_some()
            {
                return Err(ConflictError::RoundExists(round_id.to_string()).into());
            }

            let round = HiLoRound {
                round_id: round_id.to_string(),
                stake,
                currency: currency.to_string(),
                current_number: draw(),
                started_at: Utc::now(),
            };
            let bytes = serde_json::to_vec(&round).map_err(|e| {
                StorageError::WriteFailed(format!("Failed to encode hilo round {}: {}", round_id, e))
            })?;

            let mut batch = StorageBatch::new();
            batch.put(active_key(round_id), bytes);
            self.storage.write(batch)?;

            tracing::info!(
                round_id,
                stake,
                currency,
                current_number = round.current_number,
                "hilo round started"
            );
            Ok(round)
        })
    }

    /// Settle the player's guess against a freshly drawn number
    pub fn end(&self, round_id: &str, choice: HiLoChoice) -> RgsResult<Settlement> {
        self.end_with(round_id, choice, hilo::draw_number)
    }

    fn end_with<F>(&self, round_id: &str, choice: HiLoChoice, draw: F) -> RgsResult<Settlement>
    where
        F: FnOnce() -> u8,
    {
        self.locks.with_lock(round_id, || {
            if let Some(result) = load_settled(self.storage.as_ref(), round_id)? {
                return Err(settled_conflict(round_id, result));
            }
            let Some(bytes) = self.storage.get(&active_key(round_id))? else {
                return Err(NotFoundError::Round(round_id.to_string()).into());
            };
            let round: HiLoRound = serde_json::from_slice(&bytes).map_err(|e| {
                StorageError::CorruptedData(format!("Failed to decode hilo round {}: {}", round_id, e))
            })?;

            let next_number = draw();
            let outcome = hilo::resolve(round.current_number, next_number, choice);
            let payout = hilo::payout(round.stake, outcome);
            let result = SettlementResult {
                round_id: round.round_id.clone(),
                game: GameKind::HiLo,
                label: choice.to_string().to_ascii_uppercase(),
                outcome,
                stake: round.stake,
                currency: round.currency.clone(),
                payout,
                balance_delta: payout - round.stake,
                settled_at: Utc::now(),
                model_id: None,
                symbols: None,
                crash: None,
                hilo: Some(HiLoDetail {
                    current_number: round.current_number,
                    next_number,
                    choice,
                    started_at: round.started_at,
                }),
            };

            let mut batch = StorageBatch::new();
            batch.delete(active_key(round_id));
            record_settlement(&mut batch, &result)?;
            self.storage.write(batch)?;

            tracing::info!(
                round_id,
                current_number = round.current_number,
                next_number,
                %choice,
                outcome = %result.outcome,
                payout,
                "hilo round settled"
            );
            Ok(Settlement {
                result,
                replayed: false,
            })
        })
    }
}

fn settled_conflict(round_id: &str, result: SettlementResult) -> RgsError {
    if result.game == GameKind::HiLo {
        ConflictError::AlreadySettled {
            round_id: round_id.to_string(),
            result: Box::new(result),
        }
        .into()
    } else {
        ConflictError::RoundExists(round_id.to_string()).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::types::RoundOutcome;
    use crate::storage::MemoryStorage;

    fn ledger() -> (Arc<MemoryStorage>, HiLoLedger) {
        let storage = Arc::new(MemoryStorage::new());
        let ledger = HiLoLedger::new(storage.clone(), Arc::new(KeyedLocks::new()));
        (storage, ledger)
    }

    #[test]
    fn test_start_draws_number_and_rejects_reuse() {
        let (storage, ledger) = ledger();
        let round = ledger.start("h1", 5.0, "USD").unwrap();
        assert!((hilo::MIN_NUMBER..=hilo::MAX_NUMBER).contains(&round.current_number));
        assert!(is_active(storage.as_ref(), "h1").unwrap());

        let err = ledger.start("h1", 5.0, "USD").unwrap_err();
        assert!(matches!(err, RgsError::Conflict(ConflictError::RoundExists(_))));
    }

    #[test]
    fn test_end_settles_win_loss_and_push() {
        let (storage, ledger) = ledger();
        let cases = [
            ("win", 7, HiLoChoice::Higher, RoundOutcome::Win, 10.0, 5.0),
            ("loss", 7, HiLoChoice::Lower, RoundOutcome::Loss, 0.0, -5.0),
            ("push", 4, HiLoChoice::Higher, RoundOutcome::Push, 5.0, 0.0),
        ];
        for (id, next, choice, outcome, payout, delta) in cases {
            ledger.start_with(id, 5.0, "USD", || 4).unwrap();
            let result = ledger.end_with(id, choice, || next).unwrap().result;

            assert_eq!(result.outcome, outcome, "round {id}");
            assert_eq!(result.payout, payout);
            assert_eq!(result.balance_delta, delta);
            let detail = result.hilo.unwrap();
            assert_eq!((detail.current_number, detail.next_number), (4, next));
            assert!(!is_active(storage.as_ref(), id).unwrap());
        }
    }

    #[test]
    fn test_second_end_conflicts_with_recorded_result() {
        let (_, ledger) = ledger();
        ledger.start_with("h1", 2.0, "USD", || 3).unwrap();
        let first = ledger.end_with("h1", HiLoChoice::Higher, || 9).unwrap().result;

        match ledger.end("h1", HiLoChoice::Lower).unwrap_err() {
            RgsError::Conflict(ConflictError::AlreadySettled { result, .. }) => {
                assert_eq!(*result, first)
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unknown_round_is_not_found() {
        let (_, ledger) = ledger();
        assert!(matches!(
            ledger.end("missing", HiLoChoice::Higher).unwrap_err(),
            RgsError::NotFound(_)
        ));
    }

    #[test]
    fn test_failed_end_keeps_round_open() {
        let (storage, ledger) = ledger();
        ledger.start_with("h1", 1.0, "USD", || 5).unwrap();

        storage.fail_writes(true);
        assert!(matches!(
            ledger.end("h1", HiLoChoice::Higher).unwrap_err(),
            RgsError::Persistence(_)
        ));
        storage.fail_writes(false);

        assert!(is_active(storage.as_ref(), "h1").unwrap());
        assert!(ledger.end("h1", HiLoChoice::Higher).is_ok());
    }

    #[test]
    fn test_concurrent_ends_settle_once() {
        let (_, ledger) = ledger();
        ledger.start("h1", 1.0, "USD").unwrap();

        let outcomes: Vec<RgsResult<Settlement>> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| s.spawn(|| ledger.end("h1", HiLoChoice::Higher)))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let winners: Vec<&Settlement> = outcomes.iter().filter_map(|o| o.as_ref().ok()).collect();
        assert_eq!(winners.len(), 1);
        for outcome in &outcomes {
            if let Err(RgsError::Conflict(ConflictError::AlreadySettled { result, .. })) = outcome {
                assert_eq!(**result, winners[0].result);
            } else {
                assert!(outcome.is_ok());
            }
        }
    }
}
