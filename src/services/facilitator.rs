use crate::{
    crypto::{CryptoError, KeyCipher},
    error::FacilitatorError,
    models::{
        CreateFacilitatorRequest, Facilitator, FacilitatorStatus, GasBalance, NetworkStats, StatusReport,
    },
    services::{store, ChainClient, KeyValueStore},
};
use chrono::Utc;
use ethers::{
    signers::{LocalWallet, Signer},
    types::{Address, U256},
    utils::format_ether,
};
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;
use zeroize::Zeroizing;

pub const FACILITATOR_KEY_PREFIX: &str = "facilitator:";
pub const ALL_FACILITATORS_SET: &str = "facilitators:all";
pub const ACTIVE_FACILITATORS_SET: &str = "facilitators:active";

const MIN_PASSWORD_LEN: usize = 8;

pub struct FacilitatorService {
    store: Arc<dyn KeyValueStore>,
    chain: Arc<dyn ChainClient>,
    cipher: KeyCipher,
    master_key: Zeroizing<String>,
    min_gas_balance: U256,
}

impl FacilitatorService {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        chain: Arc<dyn ChainClient>,
        cipher: KeyCipher,
        master_key: String,
        min_gas_balance: U256,
    ) -> Self {
        Self {
            store,
            chain,
            cipher,
            master_key: Zeroizing::new(master_key),
            min_gas_balance,
        }
    }

    pub fn key(id: &str) -> String {
        format!("{}{}", FACILITATOR_KEY_PREFIX, id)
    }

    /// Persists a new facilitator, then registers it on-chain best-effort.
    ///
    /// The record is the source of truth. A failed registration is logged and
    /// left for an operator; the record is not rolled back.
    pub async fn create(&self, request: CreateFacilitatorRequest) -> Result<Facilitator, FacilitatorError> {
        let name = request.name.trim().to_string();
        if name.is_empty() {
            return Err(FacilitatorError::InvalidRequest("name is required".to_string()));
        }
        if request.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(FacilitatorError::InvalidRequest(format!(
                "password must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }
        let payment_recipient = parse_address("paymentRecipient", &request.payment_recipient)?;
        let created_by = parse_address("createdBy", &request.created_by)?;

        let wallet = LocalWallet::new(&mut rand::thread_rng());
        let private_key = Zeroizing::new(format!("0x{}", hex::encode(wallet.signer().to_bytes())));

        let (encrypted_private_key, system_encrypted_key) = {
            let cipher = self.cipher.clone();
            let password = Zeroizing::new(request.password);
            let master_key = self.master_key.clone();
            run_blocking(move || {
                Ok((
                    cipher.encrypt(&private_key, &password)?,
                    cipher.encrypt(&private_key, &master_key)?,
                ))
            })
            .await?
        };

        let now = Utc::now();
        let mut facilitator = Facilitator {
            id: Uuid::new_v4().to_string(),
            name,
            wallet_address: wallet.address(),
            payment_recipient,
            created_by,
            status: FacilitatorStatus::NeedsFunding,
            encrypted_private_key,
            system_encrypted_key,
            total_payments: 0,
            total_volume: "0".to_string(),
            created_at: now,
            updated_at: now,
            last_payment_at: None,
            registration_tx: None,
        };

        self.save(&facilitator).await?;
        self.store.set_add(ALL_FACILITATORS_SET, &facilitator.id).await?;

        tracing::info!(
            "Facilitator {} created (wallet: {:?}, recipient: {:?})",
            facilitator.id,
            facilitator.wallet_address,
            facilitator.payment_recipient
        );

        let domain = format!("{}.facilitator", facilitator.id);
        match self.chain.register_identity(&domain, facilitator.wallet_address).await {
            Ok(Some(tx_hash)) => {
                facilitator.registration_tx = Some(format!("{:?}", tx_hash));
                if let Err(e) = self.save(&facilitator).await {
                    tracing::warn!("Could not record registration tx for {}: {}", facilitator.id, e);
                }
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(
                    "On-chain registration failed for facilitator {}: {} (record kept)",
                    facilitator.id,
                    e
                );
            }
        }

        Ok(facilitator)
    }

    pub async fn get(&self, id: &str) -> Result<Facilitator, FacilitatorError> {
        store::get_json(self.store.as_ref(), &Self::key(id))
            .await?
            .ok_or_else(|| FacilitatorError::NotFound(format!("Facilitator {}", id)))
    }

    pub async fn list(&self) -> Result<Vec<Facilitator>, FacilitatorError> {
        let ids = self.store.set_members(ALL_FACILITATORS_SET).await?;
        let loads = ids.iter().map(|id| {
            let key = Self::key(id);
            async move { store::get_json::<Facilitator>(self.store.as_ref(), &key).await }
        });

        let mut facilitators: Vec<Facilitator> = futures::future::try_join_all(loads)
            .await?
            .into_iter()
            .flatten()
            .collect();
        facilitators.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(facilitators)
    }

    pub async fn activate(&self, id: &str, caller: &str) -> Result<Facilitator, FacilitatorError> {
        let facilitator = self.get(id).await?;
        authorize(&facilitator, caller, "activate")?;

        if facilitator.status == FacilitatorStatus::Active {
            return Ok(facilitator);
        }
        ensure_transition(facilitator.status, FacilitatorStatus::Active)?;

        let balance = self.gas_balance(facilitator.wallet_address).await?;
        if !balance.funded {
            return Err(FacilitatorError::InsufficientGas {
                balance: balance.balance_avax,
                required: balance.minimum_avax,
            });
        }

        self.transition(facilitator, FacilitatorStatus::Active).await
    }

    pub async fn deactivate(&self, id: &str, caller: &str) -> Result<Facilitator, FacilitatorError> {
        let facilitator = self.get(id).await?;
        authorize(&facilitator, caller, "deactivate")?;

        if facilitator.status == FacilitatorStatus::Inactive {
            return Ok(facilitator);
        }
        self.transition(facilitator, FacilitatorStatus::Inactive).await
    }

    /// Re-reads the gas balance and moves between `active` and `needs_funding`.
    pub async fn check_status(&self, id: &str) -> Result<StatusReport, FacilitatorError> {
        let facilitator = self.get(id).await?;
        let balance = self.gas_balance(facilitator.wallet_address).await?;
        let previous_status = facilitator.status;

        let next = match (previous_status, balance.funded) {
            (FacilitatorStatus::Active, false) => Some(FacilitatorStatus::NeedsFunding),
            (FacilitatorStatus::NeedsFunding, true) => Some(FacilitatorStatus::Active),
            _ => None,
        };

        let status = match next {
            Some(next) => {
                tracing::info!("Facilitator {} balance check: {} -> {}", id, previous_status, next);
                self.transition(facilitator, next).await?.status
            }
            None => previous_status,
        };

        Ok(StatusReport {
            id: id.to_string(),
            previous_status,
            status,
            changed: status != previous_status,
            balance,
        })
    }

    pub async fn balance(&self, id: &str) -> Result<GasBalance, FacilitatorError> {
        let facilitator = self.get(id).await?;
        self.gas_balance(facilitator.wallet_address).await
    }

    pub async fn record_payment(&self, id: &str, amount: U256) -> Result<Facilitator, FacilitatorError> {
        let mut facilitator = self.get(id).await?;
        let now = Utc::now();

        facilitator.total_payments += 1;
        facilitator.total_volume = facilitator.volume().saturating_add(amount).to_string();
        facilitator.last_payment_at = Some(now);
        facilitator.updated_at = now;

        self.save(&facilitator).await?;
        tracing::info!(
            "Facilitator {} recorded payment of {} (total payments: {})",
            id,
            amount,
            facilitator.total_payments
        );
        Ok(facilitator)
    }

    pub async fn delete(&self, id: &str, caller: &str) -> Result<(), FacilitatorError> {
        let facilitator = self.get(id).await?;
        authorize(&facilitator, caller, "delete")?;

        self.store.delete(&Self::key(id)).await?;
        self.store.set_remove(ALL_FACILITATORS_SET, id).await?;
        self.store.set_remove(ACTIVE_FACILITATORS_SET, id).await?;

        tracing::info!("Facilitator {} deleted by {:?}", id, facilitator.created_by);
        Ok(())
    }

    /// Decrypts the password-protected recovery copy of the wallet key.
    pub async fn export_key(&self, id: &str, password: &str, caller: &str) -> Result<String, FacilitatorError> {
        let facilitator = self.get(id).await?;
        authorize(&facilitator, caller, "export the key of")?;

        let cipher = self.cipher.clone();
        let blob = facilitator.encrypted_private_key.clone();
        let password = Zeroizing::new(password.to_string());
        run_blocking(move || cipher.decrypt(&blob, &password))
            .await
            .map_err(|e| match e {
                FacilitatorError::Crypto(CryptoError::Decryption) => {
                    FacilitatorError::Forbidden("Invalid password".to_string())
                }
                other => other,
            })
    }

    /// The gas-paying wallet, unlocked with the master key.
    pub async fn operational_wallet(&self, facilitator: &Facilitator) -> Result<LocalWallet, FacilitatorError> {
        let cipher = self.cipher.clone();
        let blob = facilitator.system_encrypted_key.clone();
        let master_key = self.master_key.clone();
        let private_key = Zeroizing::new(run_blocking(move || cipher.decrypt(&blob, &master_key)).await?);

        let wallet = LocalWallet::from_str(&private_key)
            .map_err(|e| FacilitatorError::InternalError(format!("stored key is unusable: {}", e)))?;

        if wallet.address() != facilitator.wallet_address {
            return Err(FacilitatorError::InternalError(format!(
                "stored key does not match wallet {:?}",
                facilitator.wallet_address
            )));
        }
        Ok(wallet)
    }

    pub async fn active_ids(&self) -> Result<Vec<String>, FacilitatorError> {
        self.store.set_members(ACTIVE_FACILITATORS_SET).await
    }

    pub async fn stats(&self) -> Result<NetworkStats, FacilitatorError> {
        let facilitators = self.list().await?;

        let mut stats = NetworkStats {
            total_facilitators: facilitators.len() as u64,
            ..NetworkStats::default()
        };
        let mut volume = U256::zero();
        for f in &facilitators {
            match f.status {
                FacilitatorStatus::Active => stats.active_facilitators += 1,
                FacilitatorStatus::NeedsFunding => stats.needs_funding += 1,
                FacilitatorStatus::Inactive => {}
            }
            stats.total_payments += f.total_payments;
            volume = volume.saturating_add(f.volume());
        }
        stats.total_volume = volume.to_string();
        Ok(stats)
    }

    async fn gas_balance(&self, wallet: Address) -> Result<GasBalance, FacilitatorError> {
        let balance = self.chain.native_balance(wallet).await?;
        Ok(GasBalance {
            wallet_address: wallet,
            balance_wei: balance.to_string(),
            balance_avax: format_ether(balance),
            minimum_avax: format_ether(self.min_gas_balance),
            funded: balance >= self.min_gas_balance,
        })
    }

    async fn transition(
        &self,
        mut facilitator: Facilitator,
        next: FacilitatorStatus,
    ) -> Result<Facilitator, FacilitatorError> {
        ensure_transition(facilitator.status, next)?;

        facilitator.status = next;
        facilitator.updated_at = Utc::now();
        self.save(&facilitator).await?;

        if next == FacilitatorStatus::Active {
            self.store.set_add(ACTIVE_FACILITATORS_SET, &facilitator.id).await?;
        } else {
            self.store.set_remove(ACTIVE_FACILITATORS_SET, &facilitator.id).await?;
        }

        Ok(facilitator)
    }

    async fn save(&self, facilitator: &Facilitator) -> Result<(), FacilitatorError> {
        store::set_json(self.store.as_ref(), &Self::key(&facilitator.id), facilitator).await
    }
}

fn ensure_transition(from: FacilitatorStatus, to: FacilitatorStatus) -> Result<(), FacilitatorError> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(FacilitatorError::InvalidTransition { from, to })
    }
}

fn authorize(facilitator: &Facilitator, caller: &str, action: &str) -> Result<(), FacilitatorError> {
    let caller = parse_address("createdBy", caller)?;
    if facilitator.is_owned_by(caller) {
        Ok(())
    } else {
        Err(FacilitatorError::Forbidden(format!(
            "only the creator can {} this facilitator",
            action
        )))
    }
}

pub(crate) fn parse_address(field: &str, raw: &str) -> Result<Address, FacilitatorError> {
    Address::from_str(raw.trim())
        .map_err(|_| FacilitatorError::InvalidRequest(format!("invalid {}: {}", field, raw)))
}

/// Runs key derivation on the blocking pool.
async fn run_blocking<T, F>(f: F) -> Result<T, FacilitatorError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, CryptoError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| FacilitatorError::InternalError(e.to_string()))?
        .map_err(FacilitatorError::from)
}
