//! Single-request settlement for instant games.

use super::locks::KeyedLocks;
use super::results::{load_settled, record_settlement};
use super::round_is_open;
use crate::errors::{ConfigurationError, ConflictError, RgsResult};
use crate::games::outcome_engine::OutcomeEngine;
use crate::games::scratch::render_symbols;
use crate::games::types::{GameKind, RoundOutcome, Settlement, SettlementResult};
use crate::math::MathModel;
use crate::storage::{KvStore, StorageBatch};
use chrono::Utc;
use std::sync::Arc;

/// Settles instant rounds exactly once per round id.
pub struct InstantLedger {
    storage: Arc<dyn KvStore>,
    locks: Arc<KeyedLocks>,
}

impl InstantLedger {
    pub fn new(storage: Arc<dyn KvStore>, locks: Arc<KeyedLocks>) -> Self {
        Self { storage, locks }
    }

    /// Settle `round_id`, or replay its recorded result.
    ///
    /// `resolve_model` is only called when the round has no recorded result,
    /// so a replay never depends on the model still being registered.
    pub fn settle<F>(
        &self,
        round_id: &str,
        stake: f64,
        currency: &str,
        resolve_model: F,
    ) -> RgsResult<Settlement>
    where
        F: FnOnce() -> RgsResult<Arc<MathModel>>,
    {
        self.locks.with_lock(round_id, || {
            if let Some(result) = load_settled(self.storage.as_ref(), round_id)? {
                if result.game != GameKind::Scratch {
                    return Err(ConflictError::RoundExists(round_id.to_string()).into());
                }
                tracing::debug!(round_id, label = %result.label, "replaying settled round");
                return Ok(Settlement {
                    result,
                    replayed: true,
                });
            }

            if round_is_open(self.storage.as_ref(), round_id)? {
                return Err(ConflictError::RoundExists(round_id.to_string()).into());
            }

            let model = resolve_model()?;
            let tier = OutcomeEngine::draw(&model)
                .ok_or_else(|| ConfigurationError::ModelUnusable(model.model_id.clone()))?;

            let payout = stake * tier.multiplier;
            let outcome = if tier.is_losing() {
                RoundOutcome::Loss
            } else {
                RoundOutcome::Win
            };
            let result = SettlementResult {
                round_id: round_id.to_string(),
                game: GameKind::Scratch,
                label: tier.tier.clone(),
                outcome,
                stake,
                currency: currency.to_string(),
                payout,
                balance_delta: payout - stake,
                settled_at: Utc::now(),
                model_id: Some(model.model_id.clone()),
                symbols: Some(render_symbols(&tier)),
                crash: None,
                hilo: None,
            };

            let mut batch = StorageBatch::new();
            record_settlement(&mut batch, &result)?;
            self.storage.write(batch)?;

            tracing::info!(
                round_id,
                model_id = %model.model_id,
                tier = %result.label,
                stake,
                payout,
                "instant round settled"
            );

            Ok(Settlement {
                result,
                replayed: false,
            })
        })
    }

    /// Recorded result for `round_id`, if any
    pub fn lookup(&self, round_id: &str) -> RgsResult<Option<SettlementResult>> {
        load_settled(self.storage.as_ref(), round_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::RgsError;
    use crate::games::scratch::is_full_match;
    use crate::math::{fixtures, PrizeTier};
    use crate::storage::MemoryStorage;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn ledger() -> (Arc<MemoryStorage>, InstantLedger) {
        let storage = Arc::new(MemoryStorage::new());
        let ledger = InstantLedger::new(storage.clone(), Arc::new(KeyedLocks::new()));
        (storage, ledger)
    }

    fn model(table: Vec<PrizeTier>) -> impl Fn() -> RgsResult<Arc<MathModel>> {
        let model = Arc::new(MathModel::new("m1", table));
        move || Ok(model.clone())
    }

    #[test]
    fn test_settle_computes_payout_and_delta() {
        let (_, ledger) = ledger();
        let settlement = ledger
            .settle("r1", 10.0, "USD", model(vec![PrizeTier::new("T1", 2.0, 1)]))
            .unwrap();

        let result = settlement.result;
        assert!(!settlement.replayed);
        assert_eq!(result.label, "T1");
        assert_eq!(result.outcome, RoundOutcome::Win);
        assert!((result.payout - 20.0).abs() < 1e-9);
        assert!((result.balance_delta - 10.0).abs() < 1e-9);
        assert_eq!(result.model_id.as_deref(), Some("m1"));
        assert!(is_full_match(&result.symbols.unwrap()));
    }

    #[test]
    fn test_losing_tier_costs_the_stake() {
        let (_, ledger) = ledger();
        let result = ledger
            .settle("r1", 4.0, "EUR", model(vec![PrizeTier::new("LOSE", 0.0, 1)]))
            .unwrap()
            .result;

        assert_eq!(result.outcome, RoundOutcome::Loss);
        assert_eq!(result.payout, 0.0);
        assert!((result.balance_delta + 4.0).abs() < 1e-9);
        assert_eq!(result.currency, "EUR");
        assert!(!is_full_match(&result.symbols.unwrap()));
    }

    #[test]
    fn test_replay_returns_recorded_result() {
        let (_, ledger) = ledger();
        let first = ledger
            .settle("r1", 1.0, "USD", || Ok(Arc::new(fixtures::scratch_match3())))
            .unwrap();

        // Different stake, and a model that would fail to resolve
        let second = ledger
            .settle("r1", 500.0, "USD", || {
                Err(ConfigurationError::ModelNotFound("gone".to_string()).into())
            })
            .unwrap();

        assert!(second.replayed);
        assert_eq!(second.result, first.result);
        assert_eq!(second.result.stake, 1.0);
    }

    #[test]
    fn test_unusable_model_records_nothing() {
        let (storage, ledger) = ledger();
        let err = ledger
            .settle("r1", 1.0, "USD", model(vec![PrizeTier::new("T1", 2.0, 0)]))
            .unwrap_err();

        assert!(matches!(
            err,
            RgsError::Configuration(ConfigurationError::ModelUnusable(_))
        ));
        assert!(storage.is_empty());
        assert!(ledger.lookup("r1").unwrap().is_none());
    }

    #[test]
    fn test_failed_write_leaves_round_unsettled() {
        let (storage, ledger) = ledger();
        storage.fail_writes(true);
        let err = ledger
            .settle("r1", 1.0, "USD", model(vec![PrizeTier::new("T1", 2.0, 1)]))
            .unwrap_err();
        assert!(matches!(err, RgsError::Persistence(_)));

        storage.fail_writes(false);
        let retry = ledger
            .settle("r1", 1.0, "USD", model(vec![PrizeTier::new("T1", 2.0, 1)]))
            .unwrap();
        assert!(!retry.replayed);
    }

    #[test]
    fn test_concurrent_settles_draw_once() {
        let (_, ledger) = ledger();
        let draws = AtomicUsize::new(0);
        let fixture = Arc::new(fixtures::scratch_match3());

        let results: Vec<Settlement> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..16)
                .map(|_| {
                    s.spawn(|| {
                        ledger
                            .settle("shared", 1.0, "USD", || {
                                draws.fetch_add(1, Ordering::SeqCst);
                                Ok(fixture.clone())
                            })
                            .unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(draws.load(Ordering::SeqCst), 1);
        assert_eq!(results.iter().filter(|s| !s.replayed).count(), 1);
        assert!(results.iter().all(|s| s.result == results[0].result));
    }
}
