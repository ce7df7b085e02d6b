use crate::{
    error::FacilitatorError,
    handlers::AppState,
    models::{ApiResponse, FacilitatorView, NetworkStats, PaymentDetails},
};
use axum::{extract::State, Extension, Json};
use serde::Serialize;

pub async fn get_stats(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<NetworkStats>>, FacilitatorError> {
    let stats = state.facilitators.stats().await?;
    Ok(Json(ApiResponse::ok(stats)))
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct NetworkReport {
    pub stats: NetworkStats,
    pub active_facilitators: Vec<FacilitatorView>,
    pub paid_by: String,
    pub payment_tx: String,
}

/// Paid endpoint; the paywall has already verified the payment.
pub async fn premium_network(
    State(state): State<AppState>,
    Extension(payment): Extension<PaymentDetails>,
) -> Result<Json<ApiResponse<NetworkReport>>, FacilitatorError> {
    let stats = state.facilitators.stats().await?;
    let active_facilitators = state
        .facilitators
        .list()
        .await?
        .iter()
        .filter(|f| f.status == crate::models::FacilitatorStatus::Active)
        .map(FacilitatorView::from)
        .collect();

    Ok(Json(ApiResponse::ok(NetworkReport {
        stats,
        active_facilitators,
        paid_by: payment.from,
        payment_tx: payment.tx_hash,
    })))
}
