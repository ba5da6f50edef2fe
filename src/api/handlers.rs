//! Request Handlers
//!
//! Every settlement call runs on the blocking pool: it takes a per-round lock
//! and waits on a synchronous RocksDB write.

use super::{errors::ApiError, middleware::RequestId, models::*};
use crate::errors::RgsResult;
use crate::math::MathModel;
use crate::orchestrator::SettlementOrchestrator;
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::header,
    response::IntoResponse,
    Extension, Json,
};
use std::sync::Arc;
use uuid::Uuid;

/// Shared application state
pub struct AppState {
    pub orchestrator: Arc<SettlementOrchestrator>,
    pub version: String,
}

/// Run `f` against the orchestrator off the async runtime
async fn run_blocking<T, F>(state: &AppState, request_id: &RequestId, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&SettlementOrchestrator) -> RgsResult<T> + Send + 'static,
    T: Send + 'static,
{
    let orchestrator = state.orchestrator.clone();
    tokio::task::spawn_blocking(move || f(&orchestrator))
        .await
        .map_err(|e| {
            ApiError::internal_error(request_id.0.clone(), format!("settlement task failed: {}", e))
        })?
        .map_err(|e| ApiError::settlement(request_id.0.clone(), e))
}

fn read_body<T>(request_id: &RequestId, body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    body.map(|Json(value)| value)
        .map_err(|e| ApiError::bad_request(request_id.0.clone(), e.body_text()))
}

/// GET /health
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: state.version.clone(),
    })
}

/// GET /metrics
pub async fn metrics_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let text = state
        .orchestrator
        .metrics()
        .render()
        .map_err(|e| ApiError::settlement(request_id.0.clone(), e))?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        text,
    ))
}

/// POST /rgs/games/:game_id/math
pub async fn register_math_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(game_id): Path<String>,
    body: Result<Json<MathModel>, JsonRejection>,
) -> Result<Json<RegisterMathResponse>, ApiError> {
    let model = read_body(&request_id, body)?;
    if model.model_id.trim().is_empty() {
        return Err(ApiError::bad_request(request_id.0, "model_id required".to_string()));
    }
    if model.prize_table.is_empty() {
        return Err(ApiError::bad_request(request_id.0, "prize_table required".to_string()));
    }

    let model_id = model.model_id.clone();
    tracing::debug!(%game_id, %model_id, "registering math model");

    let lookup_id = model_id.clone();
    let content_hash = run_blocking(&state, &request_id, move |orch| {
        orch.register_math_model(model)?;
        Ok(orch
            .get_math_model(&lookup_id)
            .and_then(|m| m.integrity.as_ref().map(|i| i.content_hash.clone())))
    })
    .await?;

    Ok(Json(RegisterMathResponse {
        model_id,
        content_hash,
        message: "game math registered".to_string(),
    }))
}

/// GET /rgs/math/:model_id
pub async fn get_math_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(model_id): Path<String>,
) -> Result<Json<MathModel>, ApiError> {
    state
        .orchestrator
        .get_math_model(&model_id)
        .map(|model| Json(model.as_ref().clone()))
        .ok_or_else(|| {
            ApiError::not_found(request_id.0, format!("no math model registered for '{}'", model_id))
        })
}

/// POST /rgs/games/:game_id/round/start
///
/// The game id names the math model the round is drawn from.
pub async fn instant_round_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(game_id): Path<String>,
    body: Result<Json<StartRoundRequest>, JsonRejection>,
) -> Result<Json<InstantRoundResponse>, ApiError> {
    let req = read_body(&request_id, body)?;
    let round_id = round_id_or_new(req.round_id);

    let settlement = run_blocking(&state, &request_id, move |orch| {
        orch.settle_instant_round(&round_id, req.amount, req.currency.as_deref(), &game_id)
    })
    .await?;

    Ok(Json(InstantRoundResponse::new(
        &settlement.result,
        settlement.replayed,
    )))
}

/// POST /rgs/crash/round/start
pub async fn crash_start_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    body: Result<Json<StartRoundRequest>, JsonRejection>,
) -> Result<Json<CrashStartResponse>, ApiError> {
    let req = read_body(&request_id, body)?;
    let round_id = round_id_or_new(req.round_id);

    let handle = run_blocking(&state, &request_id, move |orch| {
        orch.start_crash_round(&round_id, req.amount, req.currency.as_deref())
    })
    .await?;

    Ok(Json(CrashStartResponse::from(&handle)))
}

/// POST /rgs/crash/round/cashout
pub async fn crash_cashout_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    body: Result<Json<CashoutRequest>, JsonRejection>,
) -> Result<Json<CrashCashoutResponse>, ApiError> {
    let req = read_body(&request_id, body)?;

    let settlement = run_blocking(&state, &request_id, move |orch| {
        orch.cashout_crash_round(&req.round_id, req.step)
    })
    .await?;

    Ok(Json(CrashCashoutResponse::from(&settlement.result)))
}

/// GET /rgs/crash/round/status?roundId=
pub async fn crash_status_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<CrashStatusResponse>, ApiError> {
    let response = run_blocking(&state, &request_id, move |orch| {
        let status = orch.crash_round_status(&query.round_id)?;
        Ok(CrashStatusResponse::new(&status, orch))
    })
    .await?;

    Ok(Json(response))
}

/// POST /rgs/round/start
pub async fn hilo_start_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    body: Result<Json<StartRoundRequest>, JsonRejection>,
) -> Result<Json<HiLoStartResponse>, ApiError> {
    let req = read_body(&request_id, body)?;
    let round_id = round_id_or_new(req.round_id);

    let round = run_blocking(&state, &request_id, move |orch| {
        orch.start_hilo_round(&round_id, req.amount, req.currency.as_deref())
    })
    .await?;

    Ok(Json(HiLoStartResponse::from(&round)))
}

/// POST /rgs/round/end
pub async fn hilo_end_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    body: Result<Json<HiLoEndRequest>, JsonRejection>,
) -> Result<Json<HiLoEndResponse>, ApiError> {
    let req = read_body(&request_id, body)?;

    let settlement = run_blocking(&state, &request_id, move |orch| {
        orch.end_hilo_round(&req.round_id, &req.choice)
    })
    .await?;

    Ok(Json(HiLoEndResponse::from(&settlement.result)))
}

fn round_id_or_new(round_id: Option<String>) -> String {
    round_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}
