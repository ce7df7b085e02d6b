#![allow(dead_code)]

use async_trait::async_trait;
use ethers::{
    abi::AbiEncode,
    signers::{LocalWallet, Signer},
    types::{Address, Bytes, Transaction, TransactionReceipt, H256, U256, U64},
    utils::parse_ether,
};
use fuji_facilitator::{
    contracts::{FiatTokenCalls, ReceiveWithAuthorizationCall, TransferWithAuthorizationCall, FUJI_USDC_ADDRESS},
    crypto::KeyCipher,
    error::FacilitatorError,
    models::{SignatureParts, TransferAuthorization},
    services::{ChainClient, FacilitatorService, KeyValueStore, MemoryStore, PaymentVerifier, ReplayGuard, VerifierConfig},
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const MASTER_KEY: &str = "test-master-key-0123456789abcdef0123";
pub const PASSWORD: &str = "correct horse battery";
pub const NOW: u64 = 1_700_000_000;
pub const BLOCK: u64 = 1_000;

pub fn token() -> Address {
    FUJI_USDC_ADDRESS.parse().unwrap()
}

pub fn addr(byte: u8) -> Address {
    Address::repeat_byte(byte)
}

pub fn hash(n: u64) -> H256 {
    H256::from_low_u64_be(n)
}

pub fn hex_hash(n: u64) -> String {
    format!("{:?}", hash(n))
}

fn call_fields(from: Address, to: Address, value: U256) -> TransferWithAuthorizationCall {
    TransferWithAuthorizationCall {
        from,
        to,
        value,
        valid_after: U256::zero(),
        valid_before: U256::from(u64::MAX),
        nonce: [7u8; 32],
        v: 27,
        r: [1u8; 32],
        s: [2u8; 32],
    }
}

pub fn transfer_input(from: Address, to: Address, value: U256) -> Bytes {
    FiatTokenCalls::TransferWithAuthorization(call_fields(from, to, value))
        .encode()
        .into()
}

pub fn receive_input(from: Address, to: Address, value: U256) -> Bytes {
    let c = call_fields(from, to, value);
    FiatTokenCalls::ReceiveWithAuthorization(ReceiveWithAuthorizationCall {
        from: c.from,
        to: c.to,
        value: c.value,
        valid_after: c.valid_after,
        valid_before: c.valid_before,
        nonce: c.nonce,
        v: c.v,
        r: c.r,
        s: c.s,
    })
    .encode()
    .into()
}

/// In-memory chain for service and API tests.
#[derive(Default)]
pub struct MockChain {
    transactions: Mutex<HashMap<H256, Transaction>>,
    receipts: Mutex<HashMap<H256, TransactionReceipt>>,
    blocks: Mutex<HashMap<u64, u64>>,
    balances: Mutex<HashMap<Address, U256>>,
    used_nonces: Mutex<HashSet<(Address, H256)>>,
    pub relayed: Mutex<Vec<(Address, TransferAuthorization, SignatureParts)>>,
    pub registrations: Mutex<Vec<(String, Address)>>,
    pub registry_enabled: AtomicBool,
    pub fail_registration: AtomicBool,
    pub rpc_down: AtomicBool,
    pub tx_lookups: AtomicUsize,
}

impl MockChain {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A mined, successful `transferWithAuthorization` on the token contract.
    pub fn add_transfer(&self, tx_hash: H256, from: Address, to: Address, value: U256, timestamp: u64) {
        self.add_raw(tx_hash, Some(token()), transfer_input(from, to, value), Some(1), timestamp);
    }

    pub fn add_raw(&self, tx_hash: H256, to: Option<Address>, input: Bytes, status: Option<u64>, timestamp: u64) {
        let block = BLOCK + self.transactions.lock().unwrap().len() as u64;
        let tx = Transaction {
            hash: tx_hash,
            to,
            input,
            block_number: Some(U64::from(block)),
            ..Default::default()
        };
        let receipt = TransactionReceipt {
            transaction_hash: tx_hash,
            status: status.map(U64::from),
            block_number: Some(U64::from(block)),
            ..Default::default()
        };
        self.transactions.lock().unwrap().insert(tx_hash, tx);
        self.receipts.lock().unwrap().insert(tx_hash, receipt);
        self.blocks.lock().unwrap().insert(block, timestamp);
    }

    pub fn drop_receipt(&self, tx_hash: H256) {
        self.receipts.lock().unwrap().remove(&tx_hash);
    }

    /// Forgets the block a transaction was mined in.
    pub fn drop_block_of(&self, tx_hash: H256) {
        let block = self
            .receipts
            .lock()
            .unwrap()
            .get(&tx_hash)
            .and_then(|r| r.block_number)
            .map(|n| n.as_u64());
        if let Some(block) = block {
            self.blocks.lock().unwrap().remove(&block);
        }
    }

    pub fn set_balance(&self, address: Address, balance: U256) {
        self.balances.lock().unwrap().insert(address, balance);
    }

    pub fn mark_nonce_used(&self, authorizer: Address, nonce: H256) {
        self.used_nonces.lock().unwrap().insert((authorizer, nonce));
    }

    fn rpc(&self) -> Result<(), FacilitatorError> {
        if self.rpc_down.load(Ordering::SeqCst) {
            Err(FacilitatorError::ContractError("connection refused".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn get_transaction(&self, hash: H256) -> Result<Option<Transaction>, FacilitatorError> {
        self.rpc()?;
        self.tx_lookups.fetch_add(1, Ordering::SeqCst);
        // Widen the window between the replay check and the claim.
        tokio::task::yield_now().await;
        Ok(self.transactions.lock().unwrap().get(&hash).cloned())
    }

    async fn get_receipt(&self, hash: H256) -> Result<Option<TransactionReceipt>, FacilitatorError> {
        self.rpc()?;
        Ok(self.receipts.lock().unwrap().get(&hash).cloned())
    }

    async fn get_block_timestamp(&self, number: u64) -> Result<Option<u64>, FacilitatorError> {
        self.rpc()?;
        Ok(self.blocks.lock().unwrap().get(&number).copied())
    }

    async fn native_balance(&self, address: Address) -> Result<U256, FacilitatorError> {
        self.rpc()?;
        Ok(self.balances.lock().unwrap().get(&address).copied().unwrap_or_default())
    }

    async fn block_number(&self) -> Result<u64, FacilitatorError> {
        self.rpc()?;
        Ok(BLOCK)
    }

    async fn authorization_used(&self, authorizer: Address, nonce: H256) -> Result<bool, FacilitatorError> {
        self.rpc()?;
        Ok(self.used_nonces.lock().unwrap().contains(&(authorizer, nonce)))
    }

    async fn relay_authorization(
        &self,
        wallet: LocalWallet,
        authorization: &TransferAuthorization,
        signature: SignatureParts,
    ) -> Result<H256, FacilitatorError> {
        self.rpc()?;
        self.mark_nonce_used(authorization.from, authorization.nonce);
        let mut relayed = self.relayed.lock().unwrap();
        relayed.push((wallet.address(), authorization.clone(), signature));
        Ok(H256::from_low_u64_be(0xfeed_0000 + relayed.len() as u64))
    }

    async fn register_identity(&self, domain: &str, agent: Address) -> Result<Option<H256>, FacilitatorError> {
        if !self.registry_enabled.load(Ordering::SeqCst) {
            return Ok(None);
        }
        if self.fail_registration.load(Ordering::SeqCst) {
            return Err(FacilitatorError::ContractError("registry reverted".to_string()));
        }
        self.registrations.lock().unwrap().push((domain.to_string(), agent));
        Ok(Some(H256::repeat_byte(0xee)))
    }
}

pub fn store() -> Arc<dyn KeyValueStore> {
    Arc::new(MemoryStore::new())
}

pub fn verifier(chain: Arc<MockChain>, store: Arc<dyn KeyValueStore>) -> PaymentVerifier {
    let guard = Arc::new(ReplayGuard::new(store, Duration::from_secs(3600)));
    PaymentVerifier::new(chain, guard, VerifierConfig::new(token()))
}

pub fn facilitator_service(chain: Arc<MockChain>, store: Arc<dyn KeyValueStore>) -> FacilitatorService {
    // Low KDF cost keeps the tests fast; the format is the same.
    FacilitatorService::new(
        store,
        chain,
        KeyCipher::new(1_000),
        MASTER_KEY.to_string(),
        parse_ether("0.1").unwrap(),
    )
}

pub fn one_avax() -> U256 {
    parse_ether("1").unwrap()
}
