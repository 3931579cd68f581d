//! Configuration management
//!
//! Layered: built-in defaults, then an optional `kyc.toml`, then environment
//! variables (`PORT`, `CHAIN_ID`, `REGISTRY_ADDRESS`, `OWNER_ADDRESS`,
//! `KYC_FIELD_MODE`, `RELAYER_URL`, `IPFS_GATEWAY`,
//! `DECRYPTION_MAX_DURATION_DAYS`).

use ::config::{builder::DefaultState, ConfigBuilder, Environment, File, FileFormat};
use alloy::primitives::Address;
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

use crate::registry::FieldMode;

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub chain_id: u64,
    pub registry_address: Address,
    pub owner_address: Address,
    pub field_mode: FieldMode,
    /// External relayer; the in-process local relayer is used when unset
    pub relayer_url: Option<String>,
    pub ipfs_gateway: String,
    pub decryption_max_duration_days: u64,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    port: u16,
    chain_id: u64,
    registry_address: String,
    owner_address: String,
    kyc_field_mode: String,
    relayer_url: Option<String>,
    ipfs_gateway: String,
    decryption_max_duration_days: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let builder = defaults()?
            .add_source(File::with_name("kyc").required(false))
            .add_source(Environment::default());
        Self::from_builder(builder)
    }

    /// Defaults overridden by a TOML document
    pub fn from_toml(toml: &str) -> Result<Self> {
        Self::from_builder(defaults()?.add_source(File::from_str(toml, FileFormat::Toml)))
    }

    fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
        let raw: RawConfig = builder
            .build()
            .context("Failed to load configuration")?
            .try_deserialize()
            .context("Invalid configuration")?;

        let registry_address: Address = raw
            .registry_address
            .parse()
            .context("Invalid REGISTRY_ADDRESS")?;
        let owner_address: Address = raw.owner_address.parse().context("Invalid OWNER_ADDRESS")?;
        if owner_address == Address::ZERO {
            return Err(anyhow!("OWNER_ADDRESS cannot be the zero address"));
        }

        let field_mode: FieldMode = raw
            .kyc_field_mode
            .parse()
            .map_err(|e: String| anyhow!("Invalid KYC_FIELD_MODE: {}", e))?;

        if raw.decryption_max_duration_days == 0 {
            return Err(anyhow!("DECRYPTION_MAX_DURATION_DAYS must be at least 1"));
        }

        Ok(Self {
            port: raw.port,
            chain_id: raw.chain_id,
            registry_address,
            owner_address,
            field_mode,
            relayer_url: raw.relayer_url.filter(|url| !url.trim().is_empty()),
            ipfs_gateway: raw.ipfs_gateway,
            decryption_max_duration_days: raw.decryption_max_duration_days,
        })
    }
}

fn defaults() -> Result<ConfigBuilder<DefaultState>> {
    Ok(::config::Config::builder()
        .set_default("port", 8080_i64)?
        .set_default("chain_id", 31337_i64)? // Local hardhat node
        .set_default("registry_address", "0x2a25912F7570Db983d7881BEF6BF71E8b2810c31")?
        .set_default("owner_address", "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266")?
        .set_default("kyc_field_mode", "encrypted")?
        .set_default("ipfs_gateway", "https://gateway.pinata.cloud")?
        .set_default("decryption_max_duration_days", 365_i64)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.chain_id, 31337);
        assert_eq!(config.field_mode, FieldMode::Encrypted);
        assert_eq!(config.relayer_url, None);
        assert_eq!(config.decryption_max_duration_days, 365);
        assert_ne!(config.owner_address, Address::ZERO);
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_toml(
            r#"
            port = 9090
            kyc_field_mode = "plaintext"
            relayer_url = "https://relayer.testnet.zama.cloud"
            owner_address = "0x70997970C51812dc3A010C7d01b50e0d17dc79C8"
            "#,
        )
        .unwrap();

        assert_eq!(config.port, 9090);
        assert_eq!(config.field_mode, FieldMode::Plaintext);
        assert_eq!(
            config.relayer_url.as_deref(),
            Some("https://relayer.testnet.zama.cloud")
        );
        assert_eq!(
            config.owner_address,
            "0x70997970C51812dc3A010C7d01b50e0d17dc79C8".parse::<Address>().unwrap()
        );
    }

    #[test]
    fn test_invalid_values() {
        assert!(Config::from_toml(r#"kyc_field_mode = "mixed""#).is_err());
        assert!(Config::from_toml(r#"owner_address = "0x0000000000000000000000000000000000000000""#).is_err());
        assert!(Config::from_toml(r#"registry_address = "not-an-address""#).is_err());
        assert!(Config::from_toml("relayer_url = \"\"").unwrap().relayer_url.is_none());
    }
}
