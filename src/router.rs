use crate::{
    handlers::*,
    middleware::{paywall_layer, Paywall},
};
use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, TraceLayer},
};

pub fn build_router(state: AppState, paywall: Option<Arc<Paywall>>) -> Router {
    let mut app = Router::new()
        // Public endpoints
        .route("/health", get(health_check))
        .route("/api/stats", get(get_stats))
        // Facilitator management
        .route("/api/facilitator/create", post(create_facilitator))
        .route("/api/facilitators", get(list_facilitators))
        .route(
            "/api/facilitator/:id",
            get(get_facilitator).delete(delete_facilitator),
        )
        .route("/api/facilitator/:id/activate", post(activate_facilitator))
        .route("/api/facilitator/:id/deactivate", post(deactivate_facilitator))
        .route("/api/facilitator/:id/balance", get(facilitator_balance))
        .route("/api/facilitator/:id/status", get(facilitator_status))
        .route("/api/facilitator/:id/export-key", post(export_facilitator_key))
        // Payments
        .route("/api/verify-payment", post(verify_payment))
        .route("/api/payment/status", get(payment_status))
        .route("/api/settle", post(settle_payment));

    // Paid endpoints exist only when there is someone to pay
    if let Some(paywall) = paywall {
        app = app.route(
            "/api/premium/network",
            get(premium_network).layer(axum_middleware::from_fn_with_state(paywall, paywall_layer)),
        );
    }

    app.with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(true)),
        )
        .layer(CorsLayer::permissive())
}
