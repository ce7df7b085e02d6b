use crate::{
    error::{FacilitatorError, PaymentFormat, PaymentInstructions, PaymentTerms},
    models::{PaymentDetails, VerifyPaymentRequest},
    services::PaymentVerifier,
};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use ethers::{types::Address, utils::to_checksum};
use std::sync::Arc;

pub const PAYMENT_HEADER: &str = "X-Payment";
pub const PAYER_HEADER: &str = "X-Payer";

/// Gates a route behind a verified USDC payment on Fuji.
#[derive(Clone)]
pub struct Paywall {
    verifier: Arc<PaymentVerifier>,
    recipient: Address,
    amount: String,
    token_address: Address,
    chain_id: u64,
}

impl Paywall {
    pub fn new(
        verifier: Arc<PaymentVerifier>,
        recipient: Address,
        amount: String,
        token_address: Address,
        chain_id: u64,
    ) -> Self {
        Self {
            verifier,
            recipient,
            amount,
            token_address,
            chain_id,
        }
    }

    pub fn instructions(&self) -> PaymentInstructions {
        PaymentInstructions {
            type_: "x402".to_string(),
            version: "1".to_string(),
            payment: PaymentTerms {
                chain: "avalanche-fuji".to_string(),
                chain_id: self.chain_id,
                asset: "USDC".to_string(),
                asset_address: to_checksum(&self.token_address, None),
                amount: self.amount.clone(),
                recipient: to_checksum(&self.recipient, None),
            },
            instructions: PaymentFormat {
                header: PAYMENT_HEADER.to_string(),
                payer_header: PAYER_HEADER.to_string(),
                format: "transferWithAuthorization tx hash (0x-prefixed hex)".to_string(),
            },
        }
    }

    /// Checks the payment headers, returning the verified request.
    pub async fn check(
        &self,
        payment_header: Option<&str>,
        payer_header: Option<&str>,
    ) -> Result<PaymentDetails, FacilitatorError> {
        let (Some(tx_hash), Some(payer)) = (payment_header, payer_header) else {
            return Err(FacilitatorError::PaymentRequired(Box::new(self.instructions())));
        };

        let request = VerifyPaymentRequest {
            tx_hash: tx_hash.trim().to_string(),
            expected_from: payer.trim().to_string(),
            expected_to: format!("{:?}", self.recipient),
            expected_amount: Some(self.amount.clone()),
        };

        let outcome = self.verifier.verify(&request).await;
        match (outcome.valid, outcome.details) {
            (true, Some(details)) => Ok(details),
            _ => Err(FacilitatorError::PaymentVerificationFailed(
                outcome
                    .error
                    .unwrap_or_else(|| "Verification failed".to_string()),
            )),
        }
    }
}

pub async fn paywall_layer(
    State(paywall): State<Arc<Paywall>>,
    mut request: Request,
    next: Next,
) -> Result<Response, FacilitatorError> {
    // Owned copies; the request must not be borrowed across the verification await.
    let (payment, payer) = {
        let header = |name: &str| {
            request
                .headers()
                .get(name)
                .and_then(|h| h.to_str().ok())
                .map(str::to_string)
        };
        (header(PAYMENT_HEADER), header(PAYER_HEADER))
    };

    let details = paywall.check(payment.as_deref(), payer.as_deref()).await?;
    tracing::debug!("Paywall passed for {} (tx: {})", details.from, details.tx_hash);

    request.extensions_mut().insert(details);
    Ok(next.run(request).await)
}
