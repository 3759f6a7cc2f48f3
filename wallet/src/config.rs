//! Wallet configuration: network, API bind address, node endpoint.
//!
//! Loaded from a TOML file with environment overrides
//! (`CLOAK_NETWORK`, `CLOAK_NODE_ENDPOINT`, `CLOAK_NODE_PUBLIC_KEY`).
//! Missing or malformed settings are fatal at startup.

use std::path::{Path, PathBuf};

use cloak_crypto::Network;
use serde::{Deserialize, Serialize};

use crate::WalletError;

/// Runtime settings.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Config {
    /// `Mainnet` or `TestNet`.
    pub network: Network,

    /// Address the wallet API binds to.
    pub wallet_bind: String,

    /// Node endpoint, `host:port` or full URL.
    pub node_endpoint: String,

    /// The node's public key, hex.
    pub node_public_key: String,

    /// Where wallet files live; defaults to `~/.cloak-wallet`.
    pub data_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            network: Network::Mainnet,
            wallet_bind: "127.0.0.1:8001".to_string(),
            node_endpoint: String::new(),
            node_public_key: String::new(),
            data_dir: None,
        }
    }
}

impl Config {
    /// Load settings from `path` (or defaults when absent), apply
    /// environment overrides, and validate.
    pub fn load(path: Option<&Path>) -> Result<Self, WalletError> {
        let mut config = match path {
            Some(path) if path.exists() => {
                let text = std::fs::read_to_string(path)
                    .map_err(|e| WalletError::Config(format!("cannot read config: {e}")))?;
                toml::from_str(&text)
                    .map_err(|e| WalletError::Config(format!("malformed config: {e}")))?
            }
            Some(path) => {
                return Err(WalletError::Config(format!(
                    "config file not found: {}",
                    path.display()
                )))
            }
            None => Self::default(),
        };

        if let Ok(network) = std::env::var("CLOAK_NETWORK") {
            config.network = match network.to_ascii_lowercase().as_str() {
                "mainnet" => Network::Mainnet,
                "testnet" => Network::TestNet,
                other => {
                    return Err(WalletError::Config(format!("unknown network: {other}")))
                }
            };
        }
        if let Ok(endpoint) = std::env::var("CLOAK_NODE_ENDPOINT") {
            config.node_endpoint = endpoint;
        }
        if let Ok(key) = std::env::var("CLOAK_NODE_PUBLIC_KEY") {
            config.node_public_key = key;
        }

        config.validate()?;
        Ok(config)
    }

    // The node endpoint is enforced where it is used (`HttpNodeClient::new`),
    // so offline commands keep working without one.
    fn validate(&self) -> Result<(), WalletError> {
        if !self.node_public_key.is_empty() {
            let bytes = hex::decode(&self.node_public_key)
                .map_err(|_e| WalletError::Config("node public key is not hex".into()))?;
            if bytes.len() != 32 {
                return Err(WalletError::Config(
                    "node public key must be 32 bytes".into(),
                ));
            }
        }
        Ok(())
    }

    /// Directory holding wallet files.
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".cloak-wallet")
        })
    }
}
