use serde::{Deserialize, Serialize};

/// One whole USDC at 6 decimals.
pub const DEFAULT_PAYMENT_AMOUNT: &str = "1000000";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPaymentRequest {
    pub tx_hash: String,
    pub expected_from: String,
    pub expected_to: String,
    #[serde(default)]
    pub expected_amount: Option<String>,
}

/// Query string of `GET /api/payment/status`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentStatusQuery {
    pub tx_hash: String,
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub amount: Option<String>,
}

impl From<PaymentStatusQuery> for VerifyPaymentRequest {
    fn from(q: PaymentStatusQuery) -> Self {
        Self {
            tx_hash: q.tx_hash,
            expected_from: q.from,
            expected_to: q.to,
            expected_amount: q.amount,
        }
    }
}

/// Facts read back from a verified transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentDetails {
    pub from: String,
    pub to: String,
    pub value: String,
    pub block_timestamp: u64,
    pub tx_hash: String,
}

/// `{valid: true, details}` or `{valid: false, error}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationOutcome {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<PaymentDetails>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl VerificationOutcome {
    pub fn valid(details: PaymentDetails) -> Self {
        Self {
            valid: true,
            details: Some(details),
            error: None,
        }
    }

    pub fn invalid(error: impl Into<String>) -> Self {
        Self {
            valid: false,
            details: None,
            error: Some(error.into()),
        }
    }
}

/// Payment-status responses are always HTTP 200; failure is `verified: false`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentStatusResponse {
    pub verified: bool,
    pub tx_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<PaymentDetails>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PaymentStatusResponse {
    pub fn from_outcome(tx_hash: String, outcome: VerificationOutcome) -> Self {
        Self {
            verified: outcome.valid,
            tx_hash,
            details: outcome.details,
            error: outcome.error,
        }
    }
}
