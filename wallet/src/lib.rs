//! Cloak Confidential Wallet
//!
//! A hierarchical-deterministic wallet for a confidential-payments network.
//! Amounts and recipients are hidden behind Pedersen commitments, Bulletproof
//! range proofs, MLSAG ring signatures and dual-key stealth addresses.
//!
//! ## Security Model
//!
//! - Private keys are derived from a BIP-39 mnemonic and never leave the
//!   wallet; all signing happens locally.
//! - The node is untrusted: it only ever sees finished transactions and
//!   opaque payment ids.
//! - Secret material lives in locked, zero-on-drop buffers on every path,
//!   including error paths.

pub mod balance;
pub mod builder;
pub mod config;
pub mod keys;
pub mod ring;
pub mod rpc;
pub mod scanner;
pub mod secmem;
pub mod session;
pub mod storage;
pub mod types;
pub mod wallet;

mod error;

pub use error::WalletError;
pub use ring::{DecoyProvider, MemoryDecoyPool};
pub use rpc::{HttpNodeClient, NodeClient};
pub use session::{CancelFlag, Session, SessionStore};
pub use storage::EncryptedStore;
pub use types::{
    BalanceSheet, CoinType, EntityId, OutputMemo, SessionId, SessionType, Transaction, Vout,
    WalletTx, WalletType,
};
pub use wallet::{create_mnemonic, create_wallet, open_store, wallet_list, WalletFacade};
