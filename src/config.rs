//! Environment configuration with validation

use crate::assets::AssetKey;
use serde::{Deserialize, Serialize};
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;
use std::collections::BTreeMap;
use std::env;
use std::str::FromStr;

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Solana connection configuration
    pub solana: SolanaConfig,

    /// Custody account addresses per asset
    pub custody: CustodyConfig,

    /// Log filter directive
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolanaConfig {
    pub rpc_url: String,
    pub ws_url: String,
    pub commitment: String,
}

/// Base58 custody account addresses. Defaults point at the reference
/// mainnet deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustodyConfig {
    pub sol: String,
    pub eth: String,
    pub wbtc: String,
    pub jup: String,
    pub usdc: String,
}

impl Config {
    /// Load configuration from environment
    pub fn from_env() -> Self {
        Config {
            solana: SolanaConfig {
                rpc_url: env::var("SOLANA_RPC_URL")
                    .unwrap_or_else(|_| "https://api.mainnet-beta.solana.com".to_string()),
                ws_url: env::var("SOLANA_WS_URL")
                    .unwrap_or_else(|_| "wss://api.mainnet-beta.solana.com".to_string()),
                commitment: env::var("SOLANA_COMMITMENT")
                    .unwrap_or_else(|_| "confirmed".to_string()),
            },
            custody: CustodyConfig {
                sol: env::var("CUSTODY_SOL_ADDRESS")
                    .unwrap_or_else(|_| "7xS2gz2bTp3fwCC7knJvUWTEU9Tycczu6VhJYKgi1wdz".to_string()),
                eth: env::var("CUSTODY_ETH_ADDRESS")
                    .unwrap_or_else(|_| "AQCGyheWPLeo6Qp9WpYS9m3Qj479t7R636N9ey1rEjEn".to_string()),
                wbtc: env::var("CUSTODY_WBTC_ADDRESS")
                    .unwrap_or_else(|_| "5Pv3gM9JrFFH883SWAhvJC9RPYmo8UNxuFtv5bMMALkm".to_string()),
                jup: env::var("CUSTODY_JUP_ADDRESS")
                    .unwrap_or_else(|_| "JUPyiwrYJFskUPiHa7hkeR8VUtAeFoSYbKedZNsDvCN".to_string()),
                usdc: env::var("CUSTODY_USDC_ADDRESS")
                    .unwrap_or_else(|_| "G18jKKXQwBbrHeiK3C9MRXhkHsLHf7XgCSisykV46EZa".to_string()),
            },
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.solana.rpc_url.starts_with("http") {
            return Err(ConfigError::InvalidConfig(
                "SOLANA_RPC_URL must be an http(s) endpoint".to_string(),
            ));
        }
        if !self.solana.ws_url.starts_with("ws") {
            return Err(ConfigError::InvalidConfig(
                "SOLANA_WS_URL must be a ws(s) endpoint".to_string(),
            ));
        }
        self.solana.commitment_config()?;
        self.custody.addresses()?;
        Ok(())
    }
}

impl SolanaConfig {
    pub fn commitment_config(&self) -> Result<CommitmentConfig, ConfigError> {
        match self.commitment.as_str() {
            "processed" => Ok(CommitmentConfig::processed()),
            "confirmed" => Ok(CommitmentConfig::confirmed()),
            "finalized" => Ok(CommitmentConfig::finalized()),
            other => Err(ConfigError::InvalidCommitment(other.to_string())),
        }
    }
}

impl CustodyConfig {
    /// Parse the per-asset address table.
    pub fn addresses(&self) -> Result<BTreeMap<AssetKey, Pubkey>, ConfigError> {
        let entries = [
            (AssetKey::Sol, &self.sol),
            (AssetKey::Eth, &self.eth),
            (AssetKey::Wbtc, &self.wbtc),
            (AssetKey::Jup, &self.jup),
            (AssetKey::Usdc, &self.usdc),
        ];
        let mut table = BTreeMap::new();
        for (asset, address) in entries {
            let parsed = Pubkey::from_str(address).map_err(|_| ConfigError::InvalidAddress {
                asset: asset.to_string(),
                value: address.clone(),
            })?;
            table.insert(asset, parsed);
        }
        Ok(table)
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid commitment level: {0}")]
    InvalidCommitment(String),

    #[error("invalid custody address for {asset}: {value}")]
    InvalidAddress { asset: String, value: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
