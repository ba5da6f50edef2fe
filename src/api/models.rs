//! API Request and Response Models
//!
//! Wire names are camelCase; request bodies also accept the snake_case names
//! older launchers send.

use crate::games::types::{RoundOutcome, SettlementResult, Symbol};
use crate::ledger::{CrashRoundHandle, CrashStatus, HiLoRound};
use crate::orchestrator::SettlementOrchestrator;
use serde::{Deserialize, Serialize};

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// POST /rgs/games/:game_id/round/start, POST /rgs/crash/round/start and
/// POST /rgs/round/start
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRoundRequest {
    /// Generated when absent
    #[serde(default, alias = "round_id")]
    pub round_id: Option<String>,
    #[serde(alias = "bet_amount", alias = "betAmount")]
    pub amount: f64,
    #[serde(default)]
    pub currency: Option<String>,
}

/// POST /rgs/crash/round/cashout
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CashoutRequest {
    #[serde(alias = "round_id")]
    pub round_id: String,
    pub step: i64,
}

/// POST /rgs/round/end
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HiLoEndRequest {
    #[serde(alias = "round_id")]
    pub round_id: String,
    /// `higher` or `lower`
    pub choice: String,
}

/// GET /rgs/crash/round/status
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusQuery {
    #[serde(default, alias = "round_id")]
    pub round_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterMathResponse {
    pub model_id: String,
    pub content_hash: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstantRoundResponse {
    pub round_id: String,
    pub symbols: [Symbol; 3],
    pub tier: String,
    pub win_amount: f64,
    pub balance_delta: f64,
    pub currency: String,
    pub replayed: bool,
}

impl InstantRoundResponse {
    pub fn new(result: &SettlementResult, replayed: bool) -> Self {
        Self {
            round_id: result.round_id.clone(),
            // Every instant result carries symbols; the fallback never renders
            symbols: result.symbols.unwrap_or([Symbol::Cherry, Symbol::Lemon, Symbol::Star]),
            tier: result.label.clone(),
            win_amount: result.payout,
            balance_delta: result.balance_delta,
            currency: result.currency.clone(),
            replayed,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrashStartResponse {
    pub round_id: String,
    pub started_at_ms: i64,
    pub step_duration_ms: u64,
    pub currency: String,
}

impl From<&CrashRoundHandle> for CrashStartResponse {
    fn from(handle: &CrashRoundHandle) -> Self {
        Self {
            round_id: handle.round_id.clone(),
            started_at_ms: handle.started_at.timestamp_millis(),
            step_duration_ms: handle.step_duration.as_millis() as u64,
            currency: handle.currency.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrashCashoutResponse {
    pub round_id: String,
    pub cashed_out: bool,
    pub crashed: bool,
    pub win_amount: f64,
    pub balance_delta: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multiplier: Option<f64>,
    /// Only present for crashed rounds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crash_step: Option<i64>,
}

impl From<&SettlementResult> for CrashCashoutResponse {
    fn from(result: &SettlementResult) -> Self {
        let crashed = !result.is_win();
        let detail = result.crash.as_ref();
        Self {
            round_id: result.round_id.clone(),
            cashed_out: !crashed,
            crashed,
            win_amount: result.payout,
            balance_delta: result.balance_delta,
            multiplier: detail.filter(|_| !crashed).map(|d| d.multiplier),
            crash_step: detail.filter(|_| crashed).map(|d| d.crash_step),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrashStatusResponse {
    pub round_id: String,
    pub current_step: i64,
    pub multiplier: f64,
    pub crashed: bool,
    pub settled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crash_step: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crash_multiplier: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<CrashCashoutResponse>,
}

impl CrashStatusResponse {
    pub fn new(status: &CrashStatus, orchestrator: &SettlementOrchestrator) -> Self {
        Self {
            round_id: status.round_id.clone(),
            current_step: status.current_step,
            multiplier: status.multiplier,
            crashed: status.crashed,
            settled: status.result.is_some(),
            crash_step: status.crash_step,
            crash_multiplier: status
                .crash_step
                .map(|step| orchestrator.crash_schedule().multiplier(step)),
            result: status.result.as_ref().map(CrashCashoutResponse::from),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HiLoStartResponse {
    pub round_id: String,
    pub current_number: u8,
    pub currency: String,
}

impl From<&HiLoRound> for HiLoStartResponse {
    fn from(round: &HiLoRound) -> Self {
        Self {
            round_id: round.round_id.clone(),
            current_number: round.current_number,
            currency: round.currency.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HiLoEndResponse {
    pub round_id: String,
    pub outcome: RoundOutcome,
    pub current_number: Option<u8>,
    pub next_number: Option<u8>,
    pub win_amount: f64,
    pub balance_delta: f64,
}

impl From<&SettlementResult> for HiLoEndResponse {
    fn from(result: &SettlementResult) -> Self {
        let detail = result.hilo.as_ref();
        Self {
            round_id: result.round_id.clone(),
            outcome: result.outcome,
            current_number: detail.map(|d| d.current_number),
            next_number: detail.map(|d| d.next_number),
            win_amount: result.payout,
            balance_delta: result.balance_delta,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_request_accepts_both_spellings() {
        let camel: StartRoundRequest =
            serde_json::from_str(r#"{"roundId":"r1","amount":2.5,"currency":"EUR"}"#).unwrap();
        let snake: StartRoundRequest =
            serde_json::from_str(r#"{"round_id":"r1","bet_amount":2.5}"#).unwrap();

        assert_eq!(camel.round_id.as_deref(), Some("r1"));
        assert_eq!(snake.round_id.as_deref(), Some("r1"));
        assert_eq!(snake.amount, 2.5);
        assert!(snake.currency.is_none());
    }

    #[test]
    fn test_hilo_end_response_shape() {
        use crate::games::hilo::HiLoChoice;
        use crate::games::types::{GameKind, HiLoDetail};

        let result = SettlementResult {
            round_id: "h1".to_string(),
            game: GameKind::HiLo,
            label: "HIGHER".to_string(),
            outcome: RoundOutcome::Push,
            stake: 3.0,
            currency: "USD".to_string(),
            payout: 3.0,
            balance_delta: 0.0,
            settled_at: chrono::Utc::now(),
            model_id: None,
            symbols: None,
            crash: None,
            hilo: Some(HiLoDetail {
                current_number: 6,
                next_number: 6,
                choice: HiLoChoice::Higher,
                started_at: chrono::Utc::now(),
            }),
        };

        let json = serde_json::to_value(HiLoEndResponse::from(&result)).unwrap();
        assert_eq!(json["outcome"], "push");
        assert_eq!(json["currentNumber"], 6);
        assert_eq!(json["nextNumber"], 6);
        assert_eq!(json["balanceDelta"], 0.0);
    }

    #[test]
    fn test_round_id_is_optional() {
        let req: StartRoundRequest = serde_json::from_str(r#"{"amount":1}"#).unwrap();
        assert!(req.round_id.is_none());
    }
}
