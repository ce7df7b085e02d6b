use crate::{
    contracts::{FiatToken, IdentityRegistry},
    error::FacilitatorError,
    models::{SignatureParts, TransferAuthorization},
};
use anyhow::Result;
use async_trait::async_trait;
use ethers::{
    middleware::SignerMiddleware,
    providers::{Http, Middleware, Provider},
    signers::{LocalWallet, Signer},
    types::{Address, Transaction, TransactionReceipt, H256, U256},
};
use std::sync::Arc;

/// Everything the service needs from the chain.
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn get_transaction(&self, hash: H256) -> Result<Option<Transaction>, FacilitatorError>;

    async fn get_receipt(&self, hash: H256) -> Result<Option<TransactionReceipt>, FacilitatorError>;

    async fn get_block_timestamp(&self, number: u64) -> Result<Option<u64>, FacilitatorError>;

    async fn native_balance(&self, address: Address) -> Result<U256, FacilitatorError>;

    async fn block_number(&self) -> Result<u64, FacilitatorError>;

    /// Whether the token contract has already consumed this authorization nonce.
    async fn authorization_used(&self, authorizer: Address, nonce: H256) -> Result<bool, FacilitatorError>;

    /// Submits `transferWithAuthorization` paid for by `wallet` and waits for the receipt.
    async fn relay_authorization(
        &self,
        wallet: LocalWallet,
        authorization: &TransferAuthorization,
        signature: SignatureParts,
    ) -> Result<H256, FacilitatorError>;

    /// `Ok(None)` when no identity registry is configured.
    async fn register_identity(&self, domain: &str, agent: Address) -> Result<Option<H256>, FacilitatorError>;
}

#[derive(Clone)]
struct IdentityRegistrar {
    registry: Address,
    signer: LocalWallet,
}

pub struct EthereumService {
    provider: Provider<Http>,
    chain_id: u64,
    token_address: Address,
    registrar: Option<IdentityRegistrar>,
}

impl EthereumService {
    pub fn new(rpc_url: &str, chain_id: u64, token_address: Address) -> Result<Self> {
        let provider = Provider::<Http>::try_from(rpc_url)?;

        Ok(Self {
            provider,
            chain_id,
            token_address,
            registrar: None,
        })
    }

    pub fn with_identity_registry(mut self, registry: Address, signer: LocalWallet) -> Self {
        tracing::info!(
            "Identity registration enabled (registry: {:?}, registrar: {:?})",
            registry,
            signer.address()
        );
        self.registrar = Some(IdentityRegistrar {
            registry,
            signer: signer.with_chain_id(self.chain_id),
        });
        self
    }

    /// Builds the service and checks the endpoint serves the configured chain.
    pub async fn connect(rpc_url: &str, chain_id: u64, token_address: Address) -> Result<Self> {
        let service = Self::new(rpc_url, chain_id, token_address)?;

        let remote_chain_id = service.provider.get_chainid().await?;
        if remote_chain_id != U256::from(chain_id) {
            tracing::warn!(
                "RPC endpoint reports chain id {}, configured {}",
                remote_chain_id,
                chain_id
            );
        }

        let block_number = service.provider.get_block_number().await?;
        tracing::info!("Chain RPC connected (chain {}), current block: {}", chain_id, block_number);

        Ok(service)
    }

    fn signer_client(&self, wallet: LocalWallet) -> Arc<SignerMiddleware<Provider<Http>, LocalWallet>> {
        Arc::new(SignerMiddleware::new(
            self.provider.clone(),
            wallet.with_chain_id(self.chain_id),
        ))
    }
}

#[async_trait]
impl ChainClient for EthereumService {
    async fn get_transaction(&self, hash: H256) -> Result<Option<Transaction>, FacilitatorError> {
        Ok(self.provider.get_transaction(hash).await?)
    }

    async fn get_receipt(&self, hash: H256) -> Result<Option<TransactionReceipt>, FacilitatorError> {
        Ok(self.provider.get_transaction_receipt(hash).await?)
    }

    async fn get_block_timestamp(&self, number: u64) -> Result<Option<u64>, FacilitatorError> {
        let block = self.provider.get_block(number).await?;
        Ok(block.map(|b| b.timestamp.as_u64()))
    }

    async fn native_balance(&self, address: Address) -> Result<U256, FacilitatorError> {
        Ok(self.provider.get_balance(address, None).await?)
    }

    async fn block_number(&self) -> Result<u64, FacilitatorError> {
        Ok(self.provider.get_block_number().await?.as_u64())
    }

    async fn authorization_used(&self, authorizer: Address, nonce: H256) -> Result<bool, FacilitatorError> {
        let token = FiatToken::new(self.token_address, Arc::new(self.provider.clone()));
        token
            .authorization_state(authorizer, nonce.to_fixed_bytes())
            .call()
            .await
            .map_err(|e| FacilitatorError::ContractError(e.to_string()))
    }

    async fn relay_authorization(
        &self,
        wallet: LocalWallet,
        authorization: &TransferAuthorization,
        signature: SignatureParts,
    ) -> Result<H256, FacilitatorError> {
        let relayer = wallet.address();
        let token = FiatToken::new(self.token_address, self.signer_client(wallet));

        let call = token.transfer_with_authorization(
            authorization.from,
            authorization.to,
            authorization.value,
            U256::from(authorization.valid_after),
            U256::from(authorization.valid_before),
            authorization.nonce.to_fixed_bytes(),
            signature.v,
            signature.r,
            signature.s,
        );

        let pending = call
            .send()
            .await
            .map_err(|e| FacilitatorError::ContractError(e.to_string()))?;

        tracing::info!("Authorization relayed by {:?}, waiting for confirmation...", relayer);

        let receipt = pending
            .await?
            .ok_or_else(|| FacilitatorError::ContractError("Transaction dropped".to_string()))?;

        if receipt.status != Some(1.into()) {
            return Err(FacilitatorError::ContractError(format!(
                "transferWithAuthorization reverted (tx: {:?})",
                receipt.transaction_hash
            )));
        }

        Ok(receipt.transaction_hash)
    }

    async fn register_identity(&self, domain: &str, agent: Address) -> Result<Option<H256>, FacilitatorError> {
        let Some(registrar) = self.registrar.clone() else {
            tracing::debug!("No identity registry configured, skipping registration of {:?}", agent);
            return Ok(None);
        };

        let client = Arc::new(SignerMiddleware::new(self.provider.clone(), registrar.signer));
        let registry = IdentityRegistry::new(registrar.registry, client);

        let call = registry.new_agent(domain.to_string(), agent);
        let pending = call
            .send()
            .await
            .map_err(|e| FacilitatorError::ContractError(e.to_string()))?;

        let tx_hash = *pending;
        tracing::info!("Identity registration submitted for {:?}: {:?}", agent, tx_hash);
        Ok(Some(tx_hash))
    }
}
