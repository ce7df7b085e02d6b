use anyhow::Result;
use fuji_facilitator::{
    config::Config,
    crypto::KeyCipher,
    handlers::AppState,
    middleware::Paywall,
    router::build_router,
    services::*,
};
use std::sync::Arc;
use std::time::Instant;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;

    tracing::info!("Starting Fuji facilitator v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Environment: {:?}", config.environment);

    // Initialize services
    let store = store::connect(&config.redis_url).await;

    let mut ethereum = EthereumService::connect(&config.rpc_url, config.chain_id, config.usdc_address).await?;
    if let Some((registry, signer)) = config.identity_registrar()? {
        ethereum = ethereum.with_identity_registry(registry, signer);
    }
    let chain: Arc<dyn ChainClient> = Arc::new(ethereum);

    let replay_guard = Arc::new(ReplayGuard::new(store.clone(), config.replay_ttl));

    let verifier_config = VerifierConfig {
        token_address: config.usdc_address,
        max_tx_age_secs: config.max_tx_age_secs,
        default_amount: config.payment_amount.clone(),
    };
    let verifier = Arc::new(PaymentVerifier::new(chain.clone(), replay_guard, verifier_config));

    let facilitators = Arc::new(FacilitatorService::new(
        store.clone(),
        chain.clone(),
        KeyCipher::new(config.kdf_iterations),
        config.master_key.clone(),
        config.min_gas_balance,
    ));

    let settlement = Arc::new(SettlementService::new(
        facilitators.clone(),
        chain.clone(),
        config.token_domain(),
    ));

    // x402 paywall for paid endpoints
    let paywall = config.payment_recipient.map(|recipient| {
        tracing::info!("Paywall enabled, payments to {:?}", recipient);
        Arc::new(Paywall::new(
            verifier.clone(),
            recipient,
            config.payment_amount.clone(),
            config.usdc_address,
            config.chain_id,
        ))
    });

    // Build application state
    let app_state = AppState {
        store,
        chain,
        facilitators,
        verifier,
        settlement,
        started_at: Instant::now(),
    };

    let app = build_router(app_state, paywall);

    // Start server
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on http://{}", addr);
    tracing::info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for ctrl+c: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down gracefully...");
}
