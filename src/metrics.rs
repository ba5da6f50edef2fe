//! Settlement counters exposed in the Prometheus text format

use crate::errors::{ConfigurationError, RgsError, RgsResult};
use crate::games::types::{GameKind, SettlementResult};
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

pub struct RgsMetrics {
    registry: Registry,
    rounds_settled: IntCounterVec,
    round_replays: IntCounterVec,
    round_errors: IntCounterVec,
    crash_rounds_started: IntCounter,
}

fn metrics_error(e: prometheus::Error) -> RgsError {
    ConfigurationError::LoadFailed(format!("metrics registry: {}", e)).into()
}

impl RgsMetrics {
    pub fn new() -> RgsResult<Self> {
        let registry = Registry::new();

        let rounds_settled = IntCounterVec::new(
            Opts::new("rgs_rounds_settled_total", "Rounds settled, by game and outcome"),
            &["game", "outcome"],
        )
        .map_err(metrics_error)?;
        let round_replays = IntCounterVec::new(
            Opts::new("rgs_round_replays_total", "Settlement requests answered from the log"),
            &["game"],
        )
        .map_err(metrics_error)?;
        let round_errors = IntCounterVec::new(
            Opts::new("rgs_round_errors_total", "Failed settlement operations, by category"),
            &["kind"],
        )
        .map_err(metrics_error)?;
        let crash_rounds_started =
            IntCounter::new("rgs_crash_rounds_started_total", "Crash rounds opened")
                .map_err(metrics_error)?;

        registry
            .register(Box::new(rounds_settled.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(round_replays.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(round_errors.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(crash_rounds_started.clone()))
            .map_err(metrics_error)?;

        Ok(Self {
            registry,
            rounds_settled,
            round_replays,
            round_errors,
            crash_rounds_started,
        })
    }

    pub fn record_settled(&self, result: &SettlementResult) {
        let game = result.game.to_string();
        let outcome = result.outcome.to_string();
        self.rounds_settled
            .with_label_values(&[game.as_str(), outcome.as_str()])
            .inc();
    }

    pub fn record_replay(&self, game: GameKind) {
        let game = game.to_string();
        self.round_replays.with_label_values(&[game.as_str()]).inc();
    }

    pub fn record_error(&self, error: &RgsError) {
        self.round_errors.with_label_values(&[error.kind()]).inc();
    }

    pub fn record_crash_start(&self) {
        self.crash_rounds_started.inc();
    }

    /// Render every counter in the Prometheus text exposition format
    pub fn render(&self) -> RgsResult<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(metrics_error)?;
        String::from_utf8(buffer)
            .map_err(|e| ConfigurationError::LoadFailed(format!("metrics encoding: {}", e)).into())
    }
}
