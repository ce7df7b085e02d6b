use crate::{handlers::AppState, models::HealthStatus};
use axum::{extract::State, Json};
use chrono::Utc;

pub async fn health_check(State(state): State<AppState>) -> Json<HealthStatus> {
    let store_ok = state.store.ping().await;
    let redis_ok = store_ok && state.store.backend() == "redis";
    let chain_ok = state.chain.block_number().await.is_ok();

    let status = if redis_ok && chain_ok {
        "healthy"
    } else if chain_ok && store_ok {
        "degraded"
    } else {
        "unhealthy"
    };

    Json(HealthStatus {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        store: state.store.backend().to_string(),
        redis: redis_ok,
        chain_rpc: chain_ok,
        uptime_seconds: state.started_at.elapsed().as_secs(),
        timestamp: Utc::now(),
    })
}
