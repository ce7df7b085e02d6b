use chrono::{DateTime, Utc};
use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FacilitatorStatus {
    NeedsFunding,
    Active,
    Inactive,
}

impl FacilitatorStatus {
    /// Allowed moves. `Inactive` is terminal.
    pub fn can_transition_to(self, next: FacilitatorStatus) -> bool {
        use FacilitatorStatus::*;
        matches!(
            (self, next),
            (NeedsFunding, Active)
                | (Active, NeedsFunding)
                | (NeedsFunding, Inactive)
                | (Active, Inactive)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FacilitatorStatus::NeedsFunding => "needs_funding",
            FacilitatorStatus::Active => "active",
            FacilitatorStatus::Inactive => "inactive",
        }
    }
}

impl fmt::Display for FacilitatorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stored as JSON under `facilitator:<id>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Facilitator {
    pub id: String,
    pub name: String,
    pub wallet_address: Address,
    pub payment_recipient: Address,
    pub created_by: Address,
    pub status: FacilitatorStatus,

    /// Wallet key under the creator's password.
    pub encrypted_private_key: String,
    /// Wallet key under the service master key.
    pub system_encrypted_key: String,

    pub total_payments: u64,
    /// Atomic USDC units, decimal.
    pub total_volume: String,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_payment_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration_tx: Option<String>,
}

impl Facilitator {
    pub fn is_owned_by(&self, caller: Address) -> bool {
        self.created_by == caller
    }

    pub fn volume(&self) -> U256 {
        U256::from_dec_str(&self.total_volume).unwrap_or_default()
    }
}

/// What the API returns; never carries key material.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FacilitatorView {
    pub id: String,
    pub name: String,
    pub wallet_address: Address,
    pub payment_recipient: Address,
    pub created_by: Address,
    pub status: FacilitatorStatus,
    pub total_payments: u64,
    pub total_volume: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_payment_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registration_tx: Option<String>,
}

impl From<&Facilitator> for FacilitatorView {
    fn from(f: &Facilitator) -> Self {
        Self {
            id: f.id.clone(),
            name: f.name.clone(),
            wallet_address: f.wallet_address,
            payment_recipient: f.payment_recipient,
            created_by: f.created_by,
            status: f.status,
            total_payments: f.total_payments,
            total_volume: f.total_volume.clone(),
            created_at: f.created_at,
            updated_at: f.updated_at,
            last_payment_at: f.last_payment_at,
            registration_tx: f.registration_tx.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFacilitatorRequest {
    pub name: String,
    pub password: String,
    pub payment_recipient: String,
    pub created_by: String,
}

/// Body of the creator-only mutations (activate, deactivate, delete).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallerRequest {
    pub created_by: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportKeyRequest {
    pub created_by: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GasBalance {
    pub wallet_address: Address,
    pub balance_wei: String,
    pub balance_avax: String,
    pub minimum_avax: String,
    pub funded: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub id: String,
    pub previous_status: FacilitatorStatus,
    pub status: FacilitatorStatus,
    pub changed: bool,
    pub balance: GasBalance,
}
