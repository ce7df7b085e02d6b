use crate::{
    handlers::AppState,
    models::{PaymentStatusQuery, PaymentStatusResponse, VerificationOutcome, VerifyPaymentRequest},
};
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    Json,
};

/// Always 200; the result is in `verified`.
pub async fn verify_payment(
    State(state): State<AppState>,
    request: Result<Json<VerifyPaymentRequest>, JsonRejection>,
) -> Json<PaymentStatusResponse> {
    let Json(request) = match request {
        Ok(request) => request,
        Err(rejection) => return rejected(rejection.body_text()),
    };
    let outcome = state.verifier.verify(&request).await;
    Json(PaymentStatusResponse::from_outcome(request.tx_hash, outcome))
}

/// Always 200; the result is in `verified`.
pub async fn payment_status(
    State(state): State<AppState>,
    query: Result<Query<PaymentStatusQuery>, QueryRejection>,
) -> Json<PaymentStatusResponse> {
    let Query(query) = match query {
        Ok(query) => query,
        Err(rejection) => return rejected(rejection.body_text()),
    };
    let request = VerifyPaymentRequest::from(query);
    let outcome = state.verifier.verify(&request).await;
    Json(PaymentStatusResponse::from_outcome(request.tx_hash, outcome))
}

fn rejected(reason: String) -> Json<PaymentStatusResponse> {
    tracing::warn!("Rejected payment status request: {}", reason);
    Json(PaymentStatusResponse::from_outcome(
        String::new(),
        VerificationOutcome::invalid(format!("Invalid request: {}", reason)),
    ))
}
