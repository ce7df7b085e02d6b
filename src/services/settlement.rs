use crate::{
    error::FacilitatorError,
    models::{parse_signature, FacilitatorStatus, SettleRequest, SettleResponse, SignatureParts, TokenDomain},
    services::{ChainClient, FacilitatorService},
};
use chrono::Utc;
use std::sync::Arc;

/// Relays signed ERC-3009 authorizations through a facilitator's wallet.
pub struct SettlementService {
    facilitators: Arc<FacilitatorService>,
    chain: Arc<dyn ChainClient>,
    domain: TokenDomain,
}

impl SettlementService {
    pub fn new(facilitators: Arc<FacilitatorService>, chain: Arc<dyn ChainClient>, domain: TokenDomain) -> Self {
        Self {
            facilitators,
            chain,
            domain,
        }
    }

    pub async fn settle(&self, request: SettleRequest) -> Result<SettleResponse, FacilitatorError> {
        self.settle_at(request, Utc::now().timestamp().max(0) as u64).await
    }

    pub async fn settle_at(&self, request: SettleRequest, now: u64) -> Result<SettleResponse, FacilitatorError> {
        let facilitator = self.facilitators.get(&request.facilitator_id).await?;
        if facilitator.status != FacilitatorStatus::Active {
            return Err(FacilitatorError::InvalidRequest(format!(
                "facilitator {} is {}, not active",
                facilitator.id, facilitator.status
            )));
        }

        let authorization = &request.authorization;
        if authorization.to != facilitator.payment_recipient {
            return Err(FacilitatorError::InvalidRequest(format!(
                "authorization pays {:?}, facilitator recipient is {:?}",
                authorization.to, facilitator.payment_recipient
            )));
        }
        if authorization.value.is_zero() {
            return Err(FacilitatorError::InvalidRequest("authorization value is zero".to_string()));
        }
        if !authorization.is_within_window(now) {
            return Err(FacilitatorError::InvalidRequest(format!(
                "authorization not valid at {} (validAfter {}, validBefore {})",
                now, authorization.valid_after, authorization.valid_before
            )));
        }

        let signature = parse_signature(&request.signature)
            .ok_or_else(|| FacilitatorError::InvalidRequest("malformed signature".to_string()))?;
        match authorization.recover_signer(&self.domain, &signature) {
            Some(signer) if signer == authorization.from => {}
            _ => {
                return Err(FacilitatorError::InvalidRequest(
                    "signature does not match authorization.from".to_string(),
                ));
            }
        }

        if self
            .chain
            .authorization_used(authorization.from, authorization.nonce)
            .await?
        {
            return Err(FacilitatorError::InvalidRequest(
                "authorization nonce already used".to_string(),
            ));
        }

        let wallet = self.facilitators.operational_wallet(&facilitator).await?;
        let tx_hash = self
            .chain
            .relay_authorization(wallet, authorization, SignatureParts::from(&signature))
            .await?;

        tracing::info!(
            "Settled {} atomic units from {:?} to {:?} via facilitator {} (tx: {:?})",
            authorization.value,
            authorization.from,
            authorization.to,
            facilitator.id,
            tx_hash
        );

        if let Err(e) = self
            .facilitators
            .record_payment(&facilitator.id, authorization.value)
            .await
        {
            // The transfer is final on-chain; counters are advisory.
            tracing::warn!("Settled tx {:?} but could not update counters: {}", tx_hash, e);
        }

        Ok(SettleResponse {
            success: true,
            tx_hash: format!("{:?}", tx_hash),
            facilitator_id: facilitator.id,
            payer: authorization.from,
            recipient: authorization.to,
            amount: authorization.value.to_string(),
        })
    }
}
