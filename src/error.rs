use crate::crypto::CryptoError;
use crate::models::FacilitatorStatus;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum FacilitatorError {
    #[error("Payment required")]
    PaymentRequired(Box<PaymentInstructions>),

    #[error("Payment verification failed: {0}")]
    PaymentVerificationFailed(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition {
        from: FacilitatorStatus,
        to: FacilitatorStatus,
    },

    #[error("Insufficient gas balance: {balance} AVAX < {required} AVAX")]
    InsufficientGas { balance: String, required: String },

    #[error("Key encryption error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("RPC error: {0}")]
    RpcError(#[from] ethers::providers::ProviderError),

    #[error("Contract error: {0}")]
    ContractError(String),

    #[error("Store error: {0}")]
    StoreError(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Internal server error: {0}")]
    InternalError(String),
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub error_code: String,
    pub timestamp: chrono::DateTime<Utc>,
    pub request_id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_instructions: Option<PaymentInstructions>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PaymentInstructions {
    #[serde(rename = "type")]
    pub type_: String,
    pub version: String,
    pub payment: PaymentTerms,
    pub instructions: PaymentFormat,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PaymentTerms {
    pub chain: String,
    pub chain_id: u64,
    pub asset: String,
    pub asset_address: String,
    pub amount: String,
    pub recipient: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PaymentFormat {
    pub header: String,
    pub payer_header: String,
    pub format: String,
}

impl FacilitatorError {
    pub fn status_code(&self) -> StatusCode {
        self.classify().0
    }

    fn classify(&self) -> (StatusCode, &'static str) {
        match self {
            FacilitatorError::PaymentRequired(_) => (StatusCode::PAYMENT_REQUIRED, "PAYMENT_REQUIRED"),
            FacilitatorError::PaymentVerificationFailed(_) => {
                (StatusCode::PAYMENT_REQUIRED, "PAYMENT_VERIFICATION_FAILED")
            }
            FacilitatorError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
            FacilitatorError::InvalidTransition { .. } => {
                (StatusCode::BAD_REQUEST, "INVALID_STATUS_TRANSITION")
            }
            FacilitatorError::InsufficientGas { .. } => {
                (StatusCode::BAD_REQUEST, "INSUFFICIENT_GAS")
            }
            FacilitatorError::Crypto(CryptoError::InvalidSecret) => {
                (StatusCode::BAD_REQUEST, "INVALID_SECRET")
            }
            FacilitatorError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            FacilitatorError::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            FacilitatorError::RpcError(_) | FacilitatorError::ContractError(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "UPSTREAM_ERROR")
            }
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl IntoResponse for FacilitatorError {
    fn into_response(self) -> Response {
        let request_id = Uuid::new_v4().to_string();
        let (status, error_code) = self.classify();

        let payment_instructions = match &self {
            FacilitatorError::PaymentRequired(instructions) => Some((**instructions).clone()),
            _ => None,
        };

        let body = ErrorResponse {
            success: false,
            error: self.to_string(),
            error_code: error_code.to_string(),
            timestamp: Utc::now(),
            request_id,
            payment_instructions,
        };

        if status.is_server_error() {
            tracing::error!(error = ?self, error_code = error_code, "Request failed");
        } else {
            tracing::warn!(error = %self, error_code = error_code, "Request rejected");
        }

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            FacilitatorError::NotFound("Facilitator".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            FacilitatorError::Forbidden("not the creator".into()).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            FacilitatorError::InvalidTransition {
                from: FacilitatorStatus::Inactive,
                to: FacilitatorStatus::Active,
            }
            .status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            FacilitatorError::Crypto(CryptoError::Decryption).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_transition_message() {
        let err = FacilitatorError::InvalidTransition {
            from: FacilitatorStatus::Inactive,
            to: FacilitatorStatus::Active,
        };
        assert_eq!(err.to_string(), "Invalid status transition: inactive -> active");
    }
}
