use crate::games::hilo::HiLoChoice;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome label recorded for a crash round cashed out before the crash
pub const CASHOUT_LABEL: &str = "CASHOUT";
/// Outcome label recorded for a crash round that reached its crash step
pub const CRASHED_LABEL: &str = "CRASHED";

/// Supported game mechanics
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum GameKind {
    /// One request resolves the whole round
    Scratch,
    /// Start, then cash out or crash
    Crash,
    /// Start with a shown number, then guess higher or lower
    HiLo,
}

impl fmt::Display for GameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameKind::Scratch => write!(f, "scratch"),
            GameKind::Crash => write!(f, "crash"),
            GameKind::HiLo => write!(f, "hilo"),
        }
    }
}

/// Game outcome
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RoundOutcome {
    Win,
    Loss,
    /// Stake returned, no win or loss
    Push,
}

impl fmt::Display for RoundOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoundOutcome::Win => write!(f, "win"),
            RoundOutcome::Loss => write!(f, "loss"),
            RoundOutcome::Push => write!(f, "push"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RoundStatus {
    Open,
    Settled,
}

/// Scratch card symbol
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Symbol {
    Cherry,
    Lemon,
    Star,
    Seven,
}

impl Symbol {
    pub const ALL: [Symbol; 4] = [Symbol::Cherry, Symbol::Lemon, Symbol::Star, Symbol::Seven];
}

/// Crash-specific part of a settled round
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CrashDetail {
    pub crash_step: i64,
    /// Step the player cashed out at, `None` when the round crashed
    pub cashout_step: Option<i64>,
    /// Multiplier applied to the stake (crash multiplier on a loss)
    pub multiplier: f64,
    pub started_at: DateTime<Utc>,
}

/// Hi/Lo part of a settled round
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HiLoDetail {
    pub current_number: u8,
    pub next_number: u8,
    pub choice: HiLoChoice,
    pub started_at: DateTime<Utc>,
}

/// Recorded outcome of a round, persisted for replay and audit.
///
/// The caller applies `balance_delta` to the player's wallet exactly once per
/// result it receives.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SettlementResult {
    pub round_id: String,
    pub game: GameKind,
    /// Prize tier label, `CASHOUT` / `CRASHED`, or the Hi/Lo choice
    pub label: String,
    pub outcome: RoundOutcome,
    pub stake: f64,
    pub currency: String,
    pub payout: f64,
    pub balance_delta: f64,
    pub settled_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbols: Option<[Symbol; 3]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crash: Option<CrashDetail>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hilo: Option<HiLoDetail>,
}

impl SettlementResult {
    pub fn is_win(&self) -> bool {
        self.outcome == RoundOutcome::Win
    }
}

/// A settlement handed back by the ledger
#[derive(Debug, Clone, PartialEq)]
pub struct Settlement {
    pub result: SettlementResult,
    /// True when the result was recorded by an earlier request
    pub replayed: bool,
}
