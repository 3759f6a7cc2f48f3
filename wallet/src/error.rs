//! Wallet error taxonomy.
//!
//! Lower layers never raise past their module; everything surfaces through
//! these kinds, and each failure is also recorded on the owning session as a
//! structured `{success: false, message}` object.

use thiserror::Error;

use crate::ring::RingError;

/// Failures surfaced by wallet operations.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum WalletError {
    /// Self-verification after commit-sum, Bulletproof or MLSAG failed.
    /// Fatal for the current build; never retried.
    #[error("crypto self-verification failed: {0}")]
    CryptoVerify(String),

    /// Balance does not cover payment plus fee.
    #[error("insufficient funds: available {available}, required {required}")]
    InsufficientFunds { available: u64, required: u64 },

    /// The payment id was already received.
    #[error("payment {0} has already been received")]
    DuplicatePayment(String),

    /// A malformed or undecodable address.
    #[error("invalid address: {0}")]
    Address(String),

    /// Persistence failure.
    #[error("store failure: {0}")]
    Store(String),

    /// Transport, timeout or decode failure talking to the node.
    #[error("rpc failure: {0}")]
    Rpc(String),

    /// Missing or malformed settings; fatal at startup.
    #[error("configuration error: {0}")]
    Config(String),

    /// Cooperative cancellation; no state was changed.
    #[error("operation cancelled")]
    Cancelled,

    /// Ring assembly could not produce a valid decoy set.
    #[error(transparent)]
    Ring(#[from] RingError),
}

impl From<cloak_crypto::Error> for WalletError {
    fn from(src: cloak_crypto::Error) -> Self {
        match src {
            cloak_crypto::Error::InvalidAddress => Self::Address(src.to_string()),
            _ => Self::CryptoVerify(src.to_string()),
        }
    }
}

impl From<std::io::Error> for WalletError {
    fn from(src: std::io::Error) -> Self {
        Self::Store(src.to_string())
    }
}

impl From<serde_json::Error> for WalletError {
    fn from(src: serde_json::Error) -> Self {
        Self::Store(src.to_string())
    }
}

impl From<bincode::Error> for WalletError {
    fn from(src: bincode::Error) -> Self {
        Self::Store(src.to_string())
    }
}

impl From<reqwest::Error> for WalletError {
    fn from(src: reqwest::Error) -> Self {
        Self::Rpc(src.to_string())
    }
}
