use crate::error::FacilitatorError;
use crate::services::KeyValueStore;
use chrono::Utc;
use ethers::types::H256;
use std::sync::Arc;
use std::time::Duration;

pub const REPLAY_KEY_PREFIX: &str = "tx_used:";

/// Ninety days.
pub const DEFAULT_REPLAY_TTL: Duration = Duration::from_secs(90 * 24 * 60 * 60);

/// Marks transaction hashes that have already been accepted as payment.
pub struct ReplayGuard {
    store: Arc<dyn KeyValueStore>,
    ttl: Duration,
}

impl ReplayGuard {
    pub fn new(store: Arc<dyn KeyValueStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub fn key(tx_hash: &H256) -> String {
        format!("{}0x{}", REPLAY_KEY_PREFIX, hex::encode(tx_hash.as_bytes()))
    }

    pub async fn is_used(&self, tx_hash: &H256) -> Result<bool, FacilitatorError> {
        Ok(self.store.get(&Self::key(tx_hash)).await?.is_some())
    }

    /// Atomically marks the hash as used. `false` means someone else got there first.
    pub async fn claim(&self, tx_hash: &H256) -> Result<bool, FacilitatorError> {
        let marked_at = Utc::now().timestamp().to_string();
        let claimed = self
            .store
            .set_nx_ex(&Self::key(tx_hash), &marked_at, self.ttl)
            .await?;

        if claimed {
            tracing::debug!("Replay guard set for {:?}", tx_hash);
        }
        Ok(claimed)
    }

    pub async fn release(&self, tx_hash: &H256) -> Result<bool, FacilitatorError> {
        self.store.delete(&Self::key(tx_hash)).await
    }
}
