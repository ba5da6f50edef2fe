//! Settlement orchestrator
//!
//! Validates requests, then sequences registry lookups and ledger calls. It
//! holds no round state of its own; every caller-facing operation of the
//! settlement core is a method here.

use crate::config::{LimitsConfig, RgsConfig};
use crate::errors::{ConfigurationError, RgsError, RgsResult, ValidationError};
use crate::games::crash::{Clock, CrashSchedule, CrashTimer, SystemClock};
use crate::games::hilo::HiLoChoice;
use crate::games::types::{Settlement, SettlementResult};
use crate::ledger::{
    load_audit_log, CrashLedger, CrashRoundHandle, CrashStatus, HiLoLedger, HiLoRound,
    InstantLedger, KeyedLocks,
};
use crate::math::{MathModel, MathModelRegistry};
use crate::metrics::RgsMetrics;
use crate::storage::KvStore;
use std::sync::Arc;

pub struct SettlementOrchestrator {
    storage: Arc<dyn KvStore>,
    registry: MathModelRegistry,
    instant: InstantLedger,
    crash: CrashLedger,
    hilo: HiLoLedger,
    limits: LimitsConfig,
    metrics: Arc<RgsMetrics>,
}

impl SettlementOrchestrator {
    /// Build on top of `storage`, loading persisted math models
    pub fn open(storage: Arc<dyn KvStore>, config: &RgsConfig, metrics: Arc<RgsMetrics>) -> RgsResult<Self> {
        Self::open_with_clock(storage, config, metrics, Arc::new(SystemClock))
    }

    pub fn open_with_clock(
        storage: Arc<dyn KvStore>,
        config: &RgsConfig,
        metrics: Arc<RgsMetrics>,
        clock: Arc<dyn Clock>,
    ) -> RgsResult<Self> {
        config.validate()?;
        let registry = MathModelRegistry::open(storage.clone())?;
        let locks = Arc::new(KeyedLocks::new());
        let instant = InstantLedger::new(storage.clone(), locks.clone());
        let hilo = HiLoLedger::new(storage.clone(), locks.clone());
        let crash = CrashLedger::new(
            storage.clone(),
            locks,
            CrashSchedule::from_config(&config.crash),
            CrashTimer::new(config.crash.step_duration(), clock),
        );

        Ok(Self {
            storage,
            registry,
            instant,
            crash,
            hilo,
            limits: config.limits.clone(),
            metrics,
        })
    }

    pub fn metrics(&self) -> &RgsMetrics {
        &self.metrics
    }

    pub fn crash_schedule(&self) -> &CrashSchedule {
        self.crash.schedule()
    }

    /// Register or replace a math model. An empty model id is ignored.
    pub fn register_math_model(&self, model: MathModel) -> RgsResult<()> {
        if model.model_id.is_empty() {
            tracing::debug!("ignoring math model without an id");
            return Ok(());
        }
        self.observe(model.validate().map_err(RgsError::from))?;
        self.observe(self.registry.register(model))
    }

    pub fn get_math_model(&self, model_id: &str) -> Option<Arc<MathModel>> {
        self.registry.get(model_id)
    }

    pub fn math_model_ids(&self) -> Vec<String> {
        self.registry.model_ids()
    }

    /// Settle an instant round drawn from `model_id`, or replay it
    pub fn settle_instant_round(
        &self,
        round_id: &str,
        stake: f64,
        currency: Option<&str>,
        model_id: &str,
    ) -> RgsResult<Settlement> {
        let outcome = self.validate_round_id(round_id).and_then(|round_id| {
            self.validate_stake(stake)?;
            let currency = self.currency(currency);
            self.instant.settle(round_id, stake, &currency, || {
                self.registry
                    .get(model_id)
                    .ok_or_else(|| ConfigurationError::ModelNotFound(model_id.to_string()).into())
            })
        });

        let settlement = self.observe(outcome)?;
        self.record_settlement(&settlement);
        Ok(settlement)
    }

    pub fn start_crash_round(
        &self,
        round_id: &str,
        stake: f64,
        currency: Option<&str>,
    ) -> RgsResult<CrashRoundHandle> {
        let outcome = self.validate_round_id(round_id).and_then(|round_id| {
            self.validate_stake(stake)?;
            self.crash.start(round_id, stake, &self.currency(currency))
        });

        let handle = self.observe(outcome)?;
        self.metrics.record_crash_start();
        Ok(handle)
    }

    pub fn cashout_crash_round(&self, round_id: &str, claimed_step: i64) -> RgsResult<Settlement> {
        let outcome = self
            .validate_round_id(round_id)
            .and_then(|round_id| self.crash.cashout(round_id, claimed_step));

        let settlement = self.observe(outcome)?;
        self.record_settlement(&settlement);
        Ok(settlement)
    }

    pub fn crash_round_status(&self, round_id: &str) -> RgsResult<CrashStatus> {
        let outcome = self
            .validate_round_id(round_id)
            .and_then(|round_id| self.crash.status(round_id));

        let status = self.observe(outcome)?;
        if status.expired_now {
            if let Some(result) = &status.result {
                self.metrics.record_settled(result);
            }
        }
        Ok(status)
    }

    /// Open a Hi/Lo round; the returned round carries the number to guess from
    pub fn start_hilo_round(
        &self,
        round_id: &str,
        stake: f64,
        currency: Option<&str>,
    ) -> RgsResult<HiLoRound> {
        let outcome = self.validate_round_id(round_id).and_then(|round_id| {
            self.validate_stake(stake)?;
            self.hilo.start(round_id, stake, &self.currency(currency))
        });
        self.observe(outcome)
    }

    /// Settle a Hi/Lo round on `choice` (`higher` or `lower`)
    pub fn end_hilo_round(&self, round_id: &str, choice: &str) -> RgsResult<Settlement> {
        let outcome = self.validate_round_id(round_id).and_then(|round_id| {
            let choice: HiLoChoice = choice.parse()?;
            self.hilo.end(round_id, choice)
        });

        let settlement = self.observe(outcome)?;
        self.record_settlement(&settlement);
        Ok(settlement)
    }

    /// Most recent `limit` settlements, oldest first
    pub fn audit_log(&self, limit: usize) -> RgsResult<Vec<SettlementResult>> {
        load_audit_log(self.storage.as_ref(), limit)
    }

    fn validate_round_id<'a>(&self, round_id: &'a str) -> RgsResult<&'a str> {
        let round_id = round_id.trim();
        if round_id.is_empty() {
            return Err(ValidationError::MissingRoundId.into());
        }
        if round_id.chars().count() > self.limits.max_round_id_len {
            return Err(ValidationError::TooLong {
                field: "round id",
                max: self.limits.max_round_id_len,
            }
            .into());
        }
        Ok(round_id)
    }

    fn validate_stake(&self, stake: f64) -> RgsResult<()> {
        if !stake.is_finite() || stake <= 0.0 {
            return Err(ValidationError::InvalidStake(stake).into());
        }
        if stake > self.limits.max_stake {
            return Err(ValidationError::StakeAboveLimit {
                stake,
                max: self.limits.max_stake,
            }
            .into());
        }
        Ok(())
    }

    fn currency(&self, currency: Option<&str>) -> String {
        match currency.map(str::trim) {
            Some(c) if !c.is_empty() => c.to_string(),
            _ => self.limits.default_currency.clone(),
        }
    }

    fn record_settlement(&self, settlement: &Settlement) {
        if settlement.replayed {
            self.metrics.record_replay(settlement.result.game);
        } else {
            self.metrics.record_settled(&settlement.result);
        }
    }

    fn observe<T>(&self, outcome: RgsResult<T>) -> RgsResult<T> {
        if let Err(e) = &outcome {
            self.metrics.record_error(e);
            match e {
                RgsError::Persistence(_) => {
                    tracing::error!(code = e.code(), error = %e, "settlement operation failed")
                }
                RgsError::Configuration(_) | RgsError::Validation(ValidationError::FutureStep { .. }) => {
                    tracing::warn!(code = e.code(), error = %e, "settlement request rejected")
                }
                _ => tracing::debug!(code = e.code(), error = %e, "settlement request rejected"),
            }
        }
        outcome
    }
}
