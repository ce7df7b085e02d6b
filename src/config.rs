use crate::{
    contracts::FUJI_USDC_ADDRESS,
    crypto::DEFAULT_KDF_ITERATIONS,
    models::{TokenDomain, DEFAULT_PAYMENT_AMOUNT},
    services::{replay_guard::DEFAULT_REPLAY_TTL, verifier::DEFAULT_MAX_TX_AGE_SECS},
};
use anyhow::{bail, Context, Result};
use ethers::{
    signers::LocalWallet,
    types::{Address, U256},
    utils::parse_ether,
};
use std::str::FromStr;
use std::time::Duration;

pub const FUJI_CHAIN_ID: u64 = 43113;
const MIN_MASTER_KEY_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Testnet,
    Production,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub environment: Environment,
    pub host: String,
    pub port: u16,

    // Avalanche Fuji (payment network)
    pub rpc_url: String,
    pub chain_id: u64,
    pub usdc_address: Address,
    pub usdc_domain_name: String,
    pub usdc_domain_version: String,

    // Redis
    pub redis_url: String,

    // Key encryption
    pub master_key: String,
    pub kdf_iterations: u32,

    // Facilitators
    pub min_gas_balance: U256,
    pub identity_registry: Option<Address>,
    pub registrar_private_key: Option<String>,

    // Payment verification
    pub max_tx_age_secs: u64,
    pub replay_ttl: Duration,
    pub payment_amount: String,
    pub payment_recipient: Option<Address>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let environment = Self::parse_environment(&var("ENVIRONMENT", "development"))?;

        let config = Self {
            environment,
            host: var("HOST", "0.0.0.0"),
            port: var("PORT", "8080").parse().context("Invalid PORT")?,

            rpc_url: var("FUJI_RPC_URL", "https://api.avax-test.network/ext/bc/C/rpc"),
            chain_id: var("CHAIN_ID", &FUJI_CHAIN_ID.to_string())
                .parse()
                .context("Invalid CHAIN_ID")?,
            usdc_address: Self::parse_address("USDC_ADDRESS", &var("USDC_ADDRESS", FUJI_USDC_ADDRESS))?,
            usdc_domain_name: var("USDC_DOMAIN_NAME", "USD Coin"),
            usdc_domain_version: var("USDC_DOMAIN_VERSION", "2"),

            redis_url: var("REDIS_URL", "redis://localhost:6379"),

            master_key: lookup("MASTER_KEY").context("MASTER_KEY required")?,
            kdf_iterations: var("KDF_ITERATIONS", &DEFAULT_KDF_ITERATIONS.to_string())
                .parse()
                .context("Invalid KDF_ITERATIONS")?,

            min_gas_balance: parse_ether(var("MIN_GAS_BALANCE", "0.1"))
                .context("Invalid MIN_GAS_BALANCE")?,
            identity_registry: lookup("IDENTITY_REGISTRY_ADDRESS")
                .map(|raw| Self::parse_address("IDENTITY_REGISTRY_ADDRESS", &raw))
                .transpose()?,
            registrar_private_key: lookup("REGISTRAR_PRIVATE_KEY"),

            max_tx_age_secs: var("MAX_TX_AGE_SECS", &DEFAULT_MAX_TX_AGE_SECS.to_string())
                .parse()
                .context("Invalid MAX_TX_AGE_SECS")?,
            replay_ttl: Duration::from_secs(
                var("REPLAY_TTL_SECS", &DEFAULT_REPLAY_TTL.as_secs().to_string())
                    .parse()
                    .context("Invalid REPLAY_TTL_SECS")?,
            ),
            payment_amount: var("PAYMENT_AMOUNT", DEFAULT_PAYMENT_AMOUNT),
            payment_recipient: lookup("PAYMENT_RECIPIENT")
                .map(|raw| Self::parse_address("PAYMENT_RECIPIENT", &raw))
                .transpose()?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn token_domain(&self) -> TokenDomain {
        TokenDomain {
            name: self.usdc_domain_name.clone(),
            version: self.usdc_domain_version.clone(),
            chain_id: self.chain_id,
            verifying_contract: self.usdc_address,
        }
    }

    /// Registry address and signer, when both are configured.
    pub fn identity_registrar(&self) -> Result<Option<(Address, LocalWallet)>> {
        match (self.identity_registry, &self.registrar_private_key) {
            (Some(registry), Some(key)) => {
                let wallet = LocalWallet::from_str(key).context("Invalid REGISTRAR_PRIVATE_KEY")?;
                Ok(Some((registry, wallet)))
            }
            (Some(_), None) => {
                tracing::warn!("IDENTITY_REGISTRY_ADDRESS set without REGISTRAR_PRIVATE_KEY, registration disabled");
                Ok(None)
            }
            _ => Ok(None),
        }
    }

    fn parse_environment(env: &str) -> Result<Environment> {
        match env.to_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "testnet" | "test" => Ok(Environment::Testnet),
            "production" | "prod" => Ok(Environment::Production),
            _ => bail!("Unknown environment: {}", env),
        }
    }

    fn parse_address(var: &str, raw: &str) -> Result<Address> {
        Address::from_str(raw.trim()).with_context(|| format!("Invalid address for {}", var))
    }

    fn validate(&self) -> Result<()> {
        if !self.rpc_url.starts_with("http") {
            bail!("FUJI_RPC_URL must be HTTP(S) URL");
        }

        if self.master_key.len() < MIN_MASTER_KEY_LEN {
            bail!("MASTER_KEY must be at least {} characters", MIN_MASTER_KEY_LEN);
        }

        if self.kdf_iterations == 0 {
            bail!("KDF_ITERATIONS must be positive");
        }

        if U256::from_dec_str(&self.payment_amount).is_err() {
            bail!("PAYMENT_AMOUNT must be an integer amount of atomic units");
        }

        if let Some(key) = &self.registrar_private_key {
            if !crate::crypto::is_private_key_hex(key) {
                bail!("REGISTRAR_PRIVATE_KEY must be 64 hex characters");
            }
        }

        tracing::info!(
            "Configuration validated for {:?} environment",
            self.environment
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_with(vars: &[(&str, &str)]) -> Result<Config> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    const MASTER: &str = "0123456789abcdef0123456789abcdef";

    #[test]
    fn test_defaults() {
        let config = config_with(&[("MASTER_KEY", MASTER)]).unwrap();
        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.port, 8080);
        assert_eq!(config.chain_id, FUJI_CHAIN_ID);
        assert_eq!(config.usdc_address, FUJI_USDC_ADDRESS.parse::<Address>().unwrap());
        assert_eq!(config.max_tx_age_secs, 3600);
        assert_eq!(config.replay_ttl, Duration::from_secs(90 * 24 * 3600));
        assert_eq!(config.payment_amount, "1000000");
        assert_eq!(config.min_gas_balance, parse_ether("0.1").unwrap());
        assert!(config.payment_recipient.is_none());
        assert!(config.identity_registrar().unwrap().is_none());
    }

    #[test]
    fn test_master_key_required() {
        let err = config_with(&[]).unwrap_err();
        assert!(err.to_string().contains("MASTER_KEY"));

        let err = config_with(&[("MASTER_KEY", "short")]).unwrap_err();
        assert!(err.to_string().contains("at least 32"));
    }

    #[test]
    fn test_overrides() {
        let config = config_with(&[
            ("MASTER_KEY", MASTER),
            ("ENVIRONMENT", "prod"),
            ("PORT", "9000"),
            ("MAX_TX_AGE_SECS", "600"),
            ("PAYMENT_RECIPIENT", "0x00000000000000000000000000000000000000bb"),
            ("MIN_GAS_BALANCE", "0.5"),
        ])
        .unwrap();
        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.port, 9000);
        assert_eq!(config.max_tx_age_secs, 600);
        assert_eq!(config.payment_recipient, Some(Address::from_low_u64_be(0xbb)));
        assert_eq!(config.min_gas_balance, parse_ether("0.5").unwrap());
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(config_with(&[("MASTER_KEY", MASTER), ("ENVIRONMENT", "staging")]).is_err());
        assert!(config_with(&[("MASTER_KEY", MASTER), ("USDC_ADDRESS", "0x12")]).is_err());
        assert!(config_with(&[("MASTER_KEY", MASTER), ("PAYMENT_AMOUNT", "1.5")]).is_err());
        assert!(config_with(&[("MASTER_KEY", MASTER), ("FUJI_RPC_URL", "ws://node")]).is_err());
    }

    #[test]
    fn test_identity_registrar() {
        let config = config_with(&[
            ("MASTER_KEY", MASTER),
            ("IDENTITY_REGISTRY_ADDRESS", "0x00000000000000000000000000000000000000aa"),
            (
                "REGISTRAR_PRIVATE_KEY",
                "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318",
            ),
        ])
        .unwrap();
        let (registry, _wallet) = config.identity_registrar().unwrap().unwrap();
        assert_eq!(registry, Address::from_low_u64_be(0xaa));
    }
}
