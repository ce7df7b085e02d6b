use crate::{
    error::FacilitatorError,
    handlers::AppState,
    models::{
        ApiResponse, CallerRequest, CreateFacilitatorRequest, ExportKeyRequest, FacilitatorView, GasBalance,
        StatusReport,
    },
};
use axum::{
    extract::{Path, State},
    Json,
};
use ethers::types::Address;
use serde::Serialize;

pub async fn create_facilitator(
    State(state): State<AppState>,
    Json(request): Json<CreateFacilitatorRequest>,
) -> Result<Json<ApiResponse<FacilitatorView>>, FacilitatorError> {
    let facilitator = state.facilitators.create(request).await?;
    Ok(Json(ApiResponse::ok(FacilitatorView::from(&facilitator))))
}

pub async fn list_facilitators(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<FacilitatorView>>>, FacilitatorError> {
    let facilitators = state.facilitators.list().await?;
    Ok(Json(ApiResponse::ok(
        facilitators.iter().map(FacilitatorView::from).collect(),
    )))
}

pub async fn get_facilitator(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<FacilitatorView>>, FacilitatorError> {
    let facilitator = state.facilitators.get(&id).await?;
    Ok(Json(ApiResponse::ok(FacilitatorView::from(&facilitator))))
}

pub async fn activate_facilitator(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<CallerRequest>,
) -> Result<Json<ApiResponse<FacilitatorView>>, FacilitatorError> {
    let facilitator = state.facilitators.activate(&id, &request.created_by).await?;
    Ok(Json(ApiResponse::ok(FacilitatorView::from(&facilitator))))
}

pub async fn deactivate_facilitator(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<CallerRequest>,
) -> Result<Json<ApiResponse<FacilitatorView>>, FacilitatorError> {
    let facilitator = state.facilitators.deactivate(&id, &request.created_by).await?;
    Ok(Json(ApiResponse::ok(FacilitatorView::from(&facilitator))))
}

pub async fn facilitator_balance(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<GasBalance>>, FacilitatorError> {
    let balance = state.facilitators.balance(&id).await?;
    Ok(Json(ApiResponse::ok(balance)))
}

pub async fn facilitator_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<StatusReport>>, FacilitatorError> {
    let report = state.facilitators.check_status(&id).await?;
    Ok(Json(ApiResponse::ok(report)))
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ExportedKey {
    pub id: String,
    pub wallet_address: Address,
    pub private_key: String,
}

pub async fn export_facilitator_key(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<ExportKeyRequest>,
) -> Result<Json<ApiResponse<ExportedKey>>, FacilitatorError> {
    let private_key = state
        .facilitators
        .export_key(&id, &request.password, &request.created_by)
        .await?;
    let facilitator = state.facilitators.get(&id).await?;

    tracing::warn!("Private key exported for facilitator {}", id);

    Ok(Json(ApiResponse::ok(ExportedKey {
        id,
        wallet_address: facilitator.wallet_address,
        private_key,
    })))
}

#[derive(Serialize, Debug)]
pub struct Deleted {
    pub id: String,
    pub deleted: bool,
}

pub async fn delete_facilitator(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<CallerRequest>,
) -> Result<Json<ApiResponse<Deleted>>, FacilitatorError> {
    state.facilitators.delete(&id, &request.created_by).await?;
    Ok(Json(ApiResponse::ok(Deleted { id, deleted: true })))
}
