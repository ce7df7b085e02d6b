mod common;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use common::*;
use ethers::types::U256;
use fuji_facilitator::{
    handlers::AppState,
    middleware::Paywall,
    router::build_router,
    services::{FacilitatorService, SettlementService},
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tower::ServiceExt;

struct App {
    chain: Arc<MockChain>,
    router: Router,
}

fn app(with_paywall: bool) -> App {
    let chain = MockChain::new();
    let store = store();
    let verifier = Arc::new(verifier(chain.clone(), store.clone()));
    let facilitators: Arc<FacilitatorService> = Arc::new(facilitator_service(chain.clone(), store.clone()));
    let settlement = Arc::new(SettlementService::new(
        facilitators.clone(),
        chain.clone(),
        fuji_facilitator::models::TokenDomain {
            name: "USD Coin".to_string(),
            version: "2".to_string(),
            chain_id: 43113,
            verifying_contract: token(),
        },
    ));

    let paywall = with_paywall.then(|| {
        Arc::new(Paywall::new(
            verifier.clone(),
            addr(0xbb),
            "1000000".to_string(),
            token(),
            43113,
        ))
    });

    let state = AppState {
        store,
        chain: chain.clone(),
        facilitators,
        verifier,
        settlement,
        started_at: Instant::now(),
    };

    App {
        chain,
        router: build_router(state, paywall),
    }
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn creator() -> String {
    format!("{:?}", addr(0xc0))
}

async fn create(router: &Router) -> Value {
    let (status, body) = send(
        router,
        post(
            "/api/facilitator/create",
            json!({
                "name": "api",
                "password": PASSWORD,
                "paymentRecipient": format!("{:?}", addr(0xbb)),
                "createdBy": creator(),
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    body["data"].clone()
}

#[tokio::test]
async fn test_health() {
    let app = app(false);
    let (status, body) = send(&app.router, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["store"], "memory");
    assert_eq!(body["chain_rpc"], true);
    assert_eq!(body["status"], "degraded");
}

#[tokio::test]
async fn test_create_hides_key_material() {
    let app = app(false);
    let data = create(&app.router).await;

    assert_eq!(data["status"], "needs_funding");
    assert!(data.get("encryptedPrivateKey").is_none());
    assert!(data.get("systemEncryptedKey").is_none());

    let id = data["id"].as_str().unwrap();
    let (status, body) = send(&app.router, get(&format!("/api/facilitator/{}", id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["id"], id);

    let (status, body) = send(&app.router, get("/api/facilitators")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_error_envelope() {
    let app = app(false);

    let (status, body) = send(&app.router, get("/api/facilitator/unknown")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert_eq!(body["error_code"], "NOT_FOUND");
    assert_eq!(body["error"], "Facilitator unknown not found");

    let id = create(&app.router).await["id"].as_str().unwrap().to_string();
    let (status, body) = send(
        &app.router,
        post(
            &format!("/api/facilitator/{}/activate", id),
            json!({ "createdBy": format!("{:?}", addr(0x51)) }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error_code"], "FORBIDDEN");

    let (status, body) = send(
        &app.router,
        post(
            &format!("/api/facilitator/{}/activate", id),
            json!({ "createdBy": creator() }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "INSUFFICIENT_GAS");
}

#[tokio::test]
async fn test_activate_and_status() {
    let app = app(false);
    let data = create(&app.router).await;
    let id = data["id"].as_str().unwrap();
    let wallet = data["walletAddress"].as_str().unwrap().parse().unwrap();
    app.chain.set_balance(wallet, one_avax());

    let (status, body) = send(&app.router, get(&format!("/api/facilitator/{}/balance", id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["funded"], true);

    let (status, body) = send(&app.router, get(&format!("/api/facilitator/{}/status", id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "active");
    assert_eq!(body["data"]["changed"], true);

    let (_, body) = send(&app.router, get("/api/stats")).await;
    assert_eq!(body["data"]["activeFacilitators"], 1);
}

#[tokio::test]
async fn test_export_and_delete() {
    let app = app(false);
    let id = create(&app.router).await["id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app.router,
        post(
            &format!("/api/facilitator/{}/export-key", id),
            json!({ "createdBy": creator(), "password": "not the password" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "Forbidden: Invalid password");

    let (status, body) = send(
        &app.router,
        post(
            &format!("/api/facilitator/{}/export-key", id),
            json!({ "createdBy": creator(), "password": PASSWORD }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["privateKey"].as_str().unwrap().len(), 66);

    let delete = Request::builder()
        .method("DELETE")
        .uri(format!("/api/facilitator/{}", id))
        .header("content-type", "application/json")
        .body(Body::from(json!({ "createdBy": creator() }).to_string()))
        .unwrap();
    let (status, _) = send(&app.router, delete).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app.router, get(&format!("/api/facilitator/{}", id))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_verify_payment_always_200() {
    let app = app(false);
    app.chain
        .add_transfer(hash(7), addr(0xaa), addr(0xbb), U256::from(1_000_000u64), now());

    let body = json!({
        "txHash": hex_hash(8),
        "expectedFrom": format!("{:?}", addr(0xaa)),
        "expectedTo": format!("{:?}", addr(0xbb)),
    });
    let (status, body) = send(&app.router, post("/api/verify-payment", body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["verified"], false);
    assert_eq!(body["error"], "Transaction not found");

    let uri = format!(
        "/api/payment/status?txHash={}&from={:?}&to={:?}&amount=1000000",
        hex_hash(7),
        addr(0xaa),
        addr(0xbb)
    );
    let (status, body) = send(&app.router, get(&uri)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["verified"], true, "{}", body);
    assert_eq!(body["details"]["value"], "1000000");

    let (status, body) = send(&app.router, get(&uri)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["verified"], false);
    assert_eq!(body["error"], "Transaction hash has already been used");
}

#[tokio::test]
async fn test_paywall() {
    let app = app(true);

    let (status, body) = send(&app.router, get("/api/premium/network")).await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["error_code"], "PAYMENT_REQUIRED");
    assert_eq!(body["payment_instructions"]["payment"]["amount"], "1000000");
    assert_eq!(body["payment_instructions"]["instructions"]["header"], "X-Payment");

    app.chain
        .add_transfer(hash(9), addr(0xaa), addr(0xbb), U256::from(1_000_000u64), now());
    let paid = || {
        Request::builder()
            .uri("/api/premium/network")
            .header("X-Payment", hex_hash(9))
            .header("X-Payer", format!("{:?}", addr(0xaa)))
            .body(Body::empty())
            .unwrap()
    };

    let (status, body) = send(&app.router, paid()).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["paymentTx"], hex_hash(9));

    let (status, body) = send(&app.router, paid()).await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["error_code"], "PAYMENT_VERIFICATION_FAILED");
}

#[tokio::test]
async fn test_paywall_not_mounted_without_recipient() {
    let app = app(false);
    let (status, _) = send(&app.router, get("/api/premium/network")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

fn now() -> u64 {
    chrono::Utc::now().timestamp() as u64
}

#[tokio::test]
async fn test_malformed_verify_requests_stay_200() {
    let app = app(false);

    let body = json!({
        "txHash": hex_hash(1),
        "expectedFrom": format!("{:?}", addr(0xaa)),
    });
    let (status, body) = send(&app.router, post("/api/verify-payment", body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["verified"], false);
    let error = body["error"].as_str().unwrap();
    assert!(error.starts_with("Invalid request:"), "{}", error);
    assert!(error.contains("expectedTo"), "{}", error);

    let uri = format!("/api/payment/status?txHash={}&from={:?}", hex_hash(1), addr(0xaa));
    let (status, body) = send(&app.router, get(&uri)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["verified"], false);
    assert!(body["error"].as_str().unwrap().contains("missing field"));
}
