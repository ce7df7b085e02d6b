use anyhow::{Context, Result};
use ethers::types::{Address, U256};
use fuji_facilitator::{
    client::AgentClient,
    config::FUJI_CHAIN_ID,
    contracts::FUJI_USDC_ADDRESS,
    models::{TokenDomain, DEFAULT_PAYMENT_AMOUNT},
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    // Load configuration
    dotenvy::dotenv().ok();

    let base_url = std::env::var("FACILITATOR_URL").unwrap_or_else(|_| "http://localhost:8080".to_string());
    let rpc_url = std::env::var("FUJI_RPC_URL")
        .unwrap_or_else(|_| "https://api.avax-test.network/ext/bc/C/rpc".to_string());
    let private_key = std::env::var("AGENT_PRIVATE_KEY").context("AGENT_PRIVATE_KEY required")?;
    let facilitator_id = std::env::var("FACILITATOR_ID").context("FACILITATOR_ID required")?;
    let amount = std::env::var("PAYMENT_AMOUNT").unwrap_or_else(|_| DEFAULT_PAYMENT_AMOUNT.to_string());
    let amount = U256::from_dec_str(&amount).context("Invalid PAYMENT_AMOUNT")?;
    let token = std::env::var("USDC_ADDRESS").unwrap_or_else(|_| FUJI_USDC_ADDRESS.to_string());

    let domain = TokenDomain {
        name: std::env::var("USDC_DOMAIN_NAME").unwrap_or_else(|_| "USD Coin".to_string()),
        version: std::env::var("USDC_DOMAIN_VERSION").unwrap_or_else(|_| "2".to_string()),
        chain_id: FUJI_CHAIN_ID,
        verifying_contract: token.parse::<Address>().context("Invalid USDC_ADDRESS")?,
    };

    let client = AgentClient::new(&base_url, &rpc_url, &private_key, domain)?;

    println!("Fuji Pay Agent");
    println!("==============");
    println!("Facilitator: {} ({})", facilitator_id, base_url);
    println!("Agent: {:?}", client.address());

    let balance = client.usdc_balance().await?;
    println!("USDC balance: {} atomic units", balance);
    println!();

    println!("Paying {} atomic units...", amount);
    let settled = client.pay(&facilitator_id, amount).await?;
    println!("Settled: {}", settled.tx_hash);

    let status = client.confirm(&settled.tx_hash, settled.recipient, amount).await?;
    if status.verified {
        println!("Payment verified");
    } else {
        println!(
            "Payment not verified: {}",
            status.error.unwrap_or_else(|| "unknown".to_string())
        );
    }

    Ok(())
}
