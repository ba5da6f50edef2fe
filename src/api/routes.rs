//! Route Definitions

use super::handlers::*;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

/// Build the API router with all endpoints
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        // Math models
        .route("/rgs/games/:game_id/math", post(register_math_handler))
        .route("/rgs/math/:model_id", get(get_math_handler))
        // Instant games
        .route("/rgs/games/:game_id/round/start", post(instant_round_handler))
        // Crash
        .route("/rgs/crash/round/start", post(crash_start_handler))
        .route("/rgs/crash/round/cashout", post(crash_cashout_handler))
        .route("/rgs/crash/round/status", get(crash_status_handler))
        // Hi/Lo
        .route("/rgs/round/start", post(hilo_start_handler))
        .route("/rgs/round/end", post(hilo_end_handler))
        .with_state(state)
}
