use crate::{
    contracts::FiatToken,
    error::ErrorResponse,
    models::{
        ApiResponse, FacilitatorView, PaymentStatusResponse, SettleRequest, SettleResponse, TokenDomain,
        TransferAuthorization, VerifyPaymentRequest,
    },
};
use anyhow::{bail, Context, Result};
use ethers::{
    providers::{Http, Provider},
    signers::{LocalWallet, Signer},
    types::{Address, Signature, H256, U256},
};
use rand::RngCore;
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// Pays for x402 resources by signing ERC-3009 authorizations that a
/// facilitator relays on-chain.
pub struct AgentClient {
    http: reqwest::Client,
    base_url: String,
    wallet: LocalWallet,
    provider: Arc<Provider<Http>>,
    domain: TokenDomain,
}

impl AgentClient {
    pub fn new(base_url: &str, rpc_url: &str, private_key: &str, domain: TokenDomain) -> Result<Self> {
        let provider = Provider::<Http>::try_from(rpc_url)?;
        let wallet = private_key
            .parse::<LocalWallet>()
            .context("Invalid agent private key")?
            .with_chain_id(domain.chain_id);

        Ok(Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            wallet,
            provider: Arc::new(provider),
            domain,
        })
    }

    pub fn address(&self) -> Address {
        self.wallet.address()
    }

    /// USDC balance in atomic units.
    pub async fn usdc_balance(&self) -> Result<U256> {
        let usdc = FiatToken::new(self.domain.verifying_contract, self.provider.clone());
        let balance = usdc.balance_of(self.address()).call().await?;
        Ok(balance)
    }

    pub async fn facilitator(&self, id: &str) -> Result<FacilitatorView> {
        let response = self
            .http
            .get(format!("{}/api/facilitator/{}", self.base_url, id))
            .send()
            .await?;
        let body: ApiResponse<FacilitatorView> = Self::read(response).await?;
        Ok(body.data)
    }

    /// Signs an authorization valid from now for `validity_secs`.
    pub async fn sign_authorization(
        &self,
        to: Address,
        value: U256,
        now: u64,
        validity_secs: u64,
    ) -> Result<(TransferAuthorization, Signature)> {
        let mut nonce = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut nonce);

        let authorization = TransferAuthorization {
            from: self.address(),
            to,
            value,
            valid_after: now.saturating_sub(1),
            valid_before: now + validity_secs,
            nonce: H256::from(nonce),
        };

        let typed = authorization.typed_data(&self.domain)?;
        let signature = self.wallet.sign_typed_data(&typed).await?;
        Ok((authorization, signature))
    }

    /// Signs and submits a payment of `value` to the facilitator's recipient.
    pub async fn pay(&self, facilitator_id: &str, value: U256) -> Result<SettleResponse> {
        let facilitator = self.facilitator(facilitator_id).await?;

        let balance = self.usdc_balance().await?;
        if balance < value {
            bail!("Insufficient USDC balance: {} < {}", balance, value);
        }

        let now = chrono::Utc::now().timestamp().max(0) as u64;
        let (authorization, signature) = self
            .sign_authorization(facilitator.payment_recipient, value, now, 3600)
            .await?;

        tracing::info!(
            "Submitting authorization for {} atomic units to {:?} via {}",
            value,
            facilitator.payment_recipient,
            facilitator_id
        );

        let request = SettleRequest {
            facilitator_id: facilitator_id.to_string(),
            authorization,
            signature: format!("0x{}", signature),
        };
        let response = self
            .http
            .post(format!("{}/api/settle", self.base_url))
            .json(&request)
            .send()
            .await?;
        Self::read(response).await
    }

    /// Asks the facilitator to verify a settled transfer.
    pub async fn confirm(&self, tx_hash: &str, to: Address, value: U256) -> Result<PaymentStatusResponse> {
        let request = VerifyPaymentRequest {
            tx_hash: tx_hash.to_string(),
            expected_from: format!("{:?}", self.address()),
            expected_to: format!("{:?}", to),
            expected_amount: Some(value.to_string()),
        };
        let response = self
            .http
            .post(format!("{}/api/verify-payment", self.base_url))
            .json(&request)
            .send()
            .await?;
        Self::read(response).await
    }

    async fn read<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        if status.is_success() {
            return response.json().await.context("Unexpected response body");
        }

        match response.json::<ErrorResponse>().await {
            Ok(err) => bail!("{} ({}): {}", status, err.error_code, err.error),
            Err(_) => bail!("Request failed with {}", status),
        }
    }
}
