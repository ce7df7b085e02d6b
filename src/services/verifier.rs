//! On-chain verification of ERC-3009 `transferWithAuthorization` payments.
//!
//! The chain is the only authority: the transaction input is decoded and
//! compared against what the caller expects, never against a client-supplied
//! payload. A hash that passes every check is claimed in the replay guard with
//! an atomic set-if-absent, so concurrent requests for the same hash cannot
//! both succeed.

use crate::{
    contracts::FiatTokenCalls,
    error::FacilitatorError,
    models::{PaymentDetails, VerificationOutcome, VerifyPaymentRequest, DEFAULT_PAYMENT_AMOUNT},
    services::{ChainClient, ReplayGuard},
};
use chrono::Utc;
use ethers::{
    abi::AbiDecode,
    types::{Address, H256, U256},
    utils::to_checksum,
};
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

/// One hour.
pub const DEFAULT_MAX_TX_AGE_SECS: u64 = 3600;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VerificationError {
    #[error("Invalid {field}: {value}")]
    InvalidInput { field: &'static str, value: String },

    #[error("Transaction hash has already been used")]
    AlreadyUsed,

    #[error("Transaction not found")]
    TransactionNotFound,

    #[error("Transaction receipt not found")]
    ReceiptNotFound,

    #[error("Transaction failed on-chain")]
    TransactionFailed,

    #[error("Transaction is not to the USDC contract. Expected {expected}, got {actual}")]
    WrongContract { expected: String, actual: String },

    #[error("Transaction is not a valid transferWithAuthorization call")]
    NotAuthorizationTransfer,

    #[error("{field} mismatch. Expected {expected}, got {actual}")]
    FieldMismatch {
        field: &'static str,
        expected: String,
        actual: String,
    },

    #[error("Block not found")]
    BlockNotFound,

    #[error("Transaction too old: {age} seconds (max: {max} seconds)")]
    TooOld { age: u64, max: u64 },

    #[error("Verification failed: {0}")]
    Unexpected(String),
}

impl From<FacilitatorError> for VerificationError {
    fn from(e: FacilitatorError) -> Self {
        VerificationError::Unexpected(e.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct VerifierConfig {
    pub token_address: Address,
    pub max_tx_age_secs: u64,
    pub default_amount: String,
}

impl VerifierConfig {
    pub fn new(token_address: Address) -> Self {
        Self {
            token_address,
            max_tx_age_secs: DEFAULT_MAX_TX_AGE_SECS,
            default_amount: DEFAULT_PAYMENT_AMOUNT.to_string(),
        }
    }
}

struct Expected {
    tx_hash: H256,
    from: Address,
    to: Address,
    amount: U256,
}

pub struct PaymentVerifier {
    chain: Arc<dyn ChainClient>,
    replay_guard: Arc<ReplayGuard>,
    config: VerifierConfig,
}

impl PaymentVerifier {
    pub fn new(chain: Arc<dyn ChainClient>, replay_guard: Arc<ReplayGuard>, config: VerifierConfig) -> Self {
        Self {
            chain,
            replay_guard,
            config,
        }
    }

    /// Never fails; every problem becomes `{valid: false, error}`.
    pub async fn verify(&self, request: &VerifyPaymentRequest) -> VerificationOutcome {
        self.verify_at(request, Utc::now().timestamp().max(0) as u64).await
    }

    /// Same as [`PaymentVerifier::verify`] with an explicit clock reading (unix seconds).
    pub async fn verify_at(&self, request: &VerifyPaymentRequest, now: u64) -> VerificationOutcome {
        match self.check(request, now).await {
            Ok(details) => {
                tracing::info!(
                    "Payment verified: {} atomic units from {} to {} (tx: {})",
                    details.value,
                    details.from,
                    details.to,
                    details.tx_hash
                );
                VerificationOutcome::valid(details)
            }
            Err(e) => {
                tracing::warn!(tx_hash = %request.tx_hash, "Payment verification failed: {}", e);
                VerificationOutcome::invalid(e.to_string())
            }
        }
    }

    async fn check(&self, request: &VerifyPaymentRequest, now: u64) -> Result<PaymentDetails, VerificationError> {
        let tx_hash = parse_tx_hash(&request.tx_hash)?;

        // Fast path; the authoritative check is the claim at the end.
        // A spent hash is reported as such whatever the other fields say.
        if self.replay_guard.is_used(&tx_hash).await? {
            return Err(VerificationError::AlreadyUsed);
        }

        let expected = self.parse_expectations(tx_hash, request)?;

        let tx = self
            .chain
            .get_transaction(expected.tx_hash)
            .await?
            .ok_or(VerificationError::TransactionNotFound)?;

        let receipt = self
            .chain
            .get_receipt(expected.tx_hash)
            .await?
            .ok_or(VerificationError::ReceiptNotFound)?;

        if receipt.status != Some(1.into()) {
            return Err(VerificationError::TransactionFailed);
        }

        match tx.to {
            Some(to) if to == self.config.token_address => {}
            other => {
                return Err(VerificationError::WrongContract {
                    expected: to_checksum(&self.config.token_address, None),
                    actual: other
                        .map(|a| to_checksum(&a, None))
                        .unwrap_or_else(|| "contract creation".to_string()),
                });
            }
        }

        let call = match FiatTokenCalls::decode(&tx.input) {
            Ok(FiatTokenCalls::TransferWithAuthorization(call)) => call,
            _ => return Err(VerificationError::NotAuthorizationTransfer),
        };

        if call.from != expected.from {
            return Err(mismatch("From address", &expected.from, &call.from));
        }
        if call.to != expected.to {
            return Err(mismatch("To address", &expected.to, &call.to));
        }
        if call.value != expected.amount {
            return Err(VerificationError::FieldMismatch {
                field: "Amount",
                expected: expected.amount.to_string(),
                actual: call.value.to_string(),
            });
        }

        let block_number = receipt
            .block_number
            .or(tx.block_number)
            .ok_or(VerificationError::BlockNotFound)?;
        let block_timestamp = self
            .chain
            .get_block_timestamp(block_number.as_u64())
            .await?
            .ok_or(VerificationError::BlockNotFound)?;

        let age = now.saturating_sub(block_timestamp);
        if age > self.config.max_tx_age_secs {
            return Err(VerificationError::TooOld {
                age,
                max: self.config.max_tx_age_secs,
            });
        }

        if !self.replay_guard.claim(&expected.tx_hash).await? {
            return Err(VerificationError::AlreadyUsed);
        }

        Ok(PaymentDetails {
            from: to_checksum(&call.from, None),
            to: to_checksum(&call.to, None),
            value: call.value.to_string(),
            block_timestamp,
            tx_hash: format!("{:?}", expected.tx_hash),
        })
    }

    fn parse_expectations(&self, tx_hash: H256, request: &VerifyPaymentRequest) -> Result<Expected, VerificationError> {
        let from = parse_address("expected sender", &request.expected_from)?;
        let to = parse_address("expected recipient", &request.expected_to)?;

        let amount_str = request
            .expected_amount
            .as_deref()
            .unwrap_or(&self.config.default_amount)
            .trim();
        let amount = U256::from_dec_str(amount_str).map_err(|_| VerificationError::InvalidInput {
            field: "expected amount",
            value: amount_str.to_string(),
        })?;

        Ok(Expected {
            tx_hash,
            from,
            to,
            amount,
        })
    }
}

fn parse_tx_hash(raw: &str) -> Result<H256, VerificationError> {
    let trimmed = raw.trim();
    let body = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    let invalid = || VerificationError::InvalidInput {
        field: "transaction hash",
        value: raw.to_string(),
    };
    if body.len() != 64 || !body.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid());
    }
    H256::from_str(body).map_err(|_| invalid())
}

fn parse_address(field: &'static str, raw: &str) -> Result<Address, VerificationError> {
    // Parsed, so comparison is case-insensitive and checksum casing is not enforced.
    Address::from_str(raw.trim()).map_err(|_| VerificationError::InvalidInput {
        field,
        value: raw.to_string(),
    })
}

fn mismatch(field: &'static str, expected: &Address, actual: &Address) -> VerificationError {
    VerificationError::FieldMismatch {
        field,
        expected: to_checksum(expected, None),
        actual: to_checksum(actual, None),
    }
}
