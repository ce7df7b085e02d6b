use crate::{
    error::FacilitatorError,
    handlers::AppState,
    models::{SettleRequest, SettleResponse},
};
use axum::{extract::State, Json};

pub async fn settle_payment(
    State(state): State<AppState>,
    Json(request): Json<SettleRequest>,
) -> Result<Json<SettleResponse>, FacilitatorError> {
    let response = state.settlement.settle(request).await?;
    Ok(Json(response))
}
