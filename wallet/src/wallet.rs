//! The user-facing wallet API.
//!
//! Glues the key ledger, session store, scanner, balance engine and
//! transaction builder together and talks to the node. Every operation
//! returns a `Result`; failures are also recorded on the owning session
//! as a structured last-error object.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use cloak_crypto::Network;
use rand::rngs::OsRng;

use crate::{
    balance, builder::TransactionBuilder, keys, keys::KeySet, ring::DecoyProvider,
    rpc::NodeClient, scanner, session::{CancelFlag, Session, SessionStore},
    storage::EncryptedStore,
    types::{BalanceSheet, EntityId, SessionId, SessionType, Transaction, WalletTx, WalletType},
    WalletError,
};

/// File extension of wallet stores.
const WALLET_EXT: &str = "cloak";

/// The wallet facade: one open wallet, many concurrent sessions.
pub struct WalletFacade<N, D> {
    store: Arc<EncryptedStore>,
    sessions: Arc<SessionStore>,
    builder: TransactionBuilder<D>,
    node: N,
    network: Network,
    cancel: CancelFlag,
}

impl<N: NodeClient, D: DecoyProvider> WalletFacade<N, D> {
    /// Wrap an open store with a node client and decoy feed.
    pub fn new(
        store: Arc<EncryptedStore>,
        node: N,
        decoys: Arc<D>,
        network: Network,
        cancel: CancelFlag,
    ) -> Self {
        let sessions = Arc::new(SessionStore::new());
        let builder =
            TransactionBuilder::new(sessions.clone(), decoys, network, cancel.clone());
        Self {
            store,
            sessions,
            builder,
            node,
            network,
            cancel,
        }
    }

    /// Start a session over this wallet.
    pub fn open_session(&self, session_type: SessionType) -> Session {
        let session = Session::new(
            EntityId::random(&mut OsRng),
            session_type,
            self.store.clone(),
        );
        self.sessions.add_or_update(session)
    }

    /// Snapshot of a session.
    pub fn session(&self, id: SessionId) -> Option<Session> {
        self.sessions.get(id)
    }

    /// The last failure recorded on a session.
    pub fn last_error(&self, id: SessionId) -> Option<serde_json::Value> {
        self.sessions.last_error(id)
    }

    /// Stage the user-facing fields of a payment on the session's draft.
    pub fn stage_payment(
        &self,
        id: SessionId,
        recipient: &str,
        amount: u64,
        memo: &str,
    ) -> Result<Session, WalletError> {
        let mut session = self.sessions.expect(id)?;
        session.draft.wallet_type = WalletType::Send;
        session.draft.payment = amount;
        session.draft.recipient_address = recipient.to_string();
        session.draft.memo = memo.to_string();
        Ok(self.sessions.add_or_update(session))
    }

    /// Every stealth address of this wallet.
    pub fn addresses(&self) -> Result<Vec<String>, WalletError> {
        Ok(keys::key_sets(&self.store)?
            .into_iter()
            .map(|ks| ks.stealth_address.clone())
            .collect())
    }

    /// All persisted key sets.
    pub fn key_sets(&self) -> Result<Vec<KeySet>, WalletError> {
        keys::key_sets(&self.store)
    }

    /// The most recent key set.
    pub fn last_key_set(&self) -> Result<KeySet, WalletError> {
        keys::last_key_set(&self.store)
    }

    /// Advance the receive address, once the wallet has history.
    pub fn next_key_set(&self) -> Result<KeySet, WalletError> {
        keys::next_key_set(&self.store, self.network)
    }

    /// Add a key set at the next account index.
    pub fn add_key_set(&self) -> Result<KeySet, WalletError> {
        keys::add_key_set(&self.store, self.network, &mut OsRng)
    }

    /// The spendable balance.
    pub fn available_balance(&self) -> Result<u64, WalletError> {
        let (_spend, scan) = keys::unlock(&self.store)?;
        balance::available_balance(&self.store, &scan)
    }

    /// Display history with running balances.
    pub fn history(&self) -> Result<Vec<BalanceSheet>, WalletError> {
        let (_spend, scan) = keys::unlock(&self.store)?;
        balance::history(&self.store, &scan)
    }

    /// Number of stored wallet transactions.
    pub fn count(&self) -> Result<usize, WalletError> {
        balance::count(&self.store)
    }

    /// Fetch, scan and store the outputs paid under `payment_id`.
    pub async fn receive_payment(
        &self,
        session_id: SessionId,
        payment_id: &str,
    ) -> Result<WalletTx, WalletError> {
        let result = self.receive_payment_inner(session_id, payment_id).await;
        self.record(session_id, result)
    }

    async fn receive_payment_inner(
        &self,
        session_id: SessionId,
        payment_id: &str,
    ) -> Result<WalletTx, WalletError> {
        if self.cancel.is_cancelled() {
            return Err(WalletError::Cancelled);
        }
        let session = self.sessions.expect(session_id)?;

        let tx_id = hex::decode(payment_id)
            .map_err(|_e| WalletError::Rpc(format!("malformed payment id: {payment_id}")))?;

        let stored: Vec<WalletTx> = session.store.query()?;
        if stored
            .iter()
            .any(|t| t.wallet_type == WalletType::Receive && t.tx_id == tx_id)
        {
            return Err(WalletError::DuplicatePayment(payment_id.to_string()));
        }

        let candidates = self.node.outputs_by_payment_id(payment_id).await?;

        let (spend, scan) = keys::unlock(&session.store)?;
        let retained = scanner::scan_outputs(&candidates, &scan, &spend);
        if retained.is_empty() {
            return Err(WalletError::Rpc(format!(
                "payment {payment_id} carries no outputs for this wallet"
            )));
        }

        let mut total: u64 = 0;
        let mut memo = String::new();
        for vout in &retained {
            let note = scanner::decrypt_note(vout, &scan)?;
            total = total.saturating_add(note.amount);
            if memo.is_empty() && !note.memo.is_empty() {
                memo = note.memo;
            }
        }

        let mut record = WalletTx::new(session_id, WalletType::Receive);
        record.tx_id = tx_id;
        record.balance = total;
        record.memo = memo;
        record.recipient_address = keys::own_stealth_address(&spend, &scan).encode(self.network);
        record.vout = retained;

        session.store.insert(&record)?;

        let mut updated = session;
        updated.draft = record.clone();
        self.sessions.add_or_update(updated);

        tracing::debug!(payment = %payment_id, amount = total, "payment received");
        Ok(record)
    }

    /// Build the payment staged on the session.
    pub async fn create_payment(
        &self,
        session_id: SessionId,
    ) -> Result<Transaction, WalletError> {
        let result = async {
            self.builder.calculate_change(session_id)?;
            self.builder.build(session_id).await
        }
        .await;
        self.record(session_id, result)
    }

    /// Submit the session's built transaction.
    pub async fn send(&self, session_id: SessionId) -> Result<[u8; 32], WalletError> {
        let result = self.builder.send(session_id, &self.node).await;
        self.record(session_id, result)
    }

    fn record<T>(
        &self,
        id: SessionId,
        result: Result<T, WalletError>,
    ) -> Result<T, WalletError> {
        if let Err(e) = &result {
            self.sessions.set_last_error(id, e);
        }
        result
    }
}

/// Create a new wallet on disk and return its id (`id_<hex>`).
///
/// The mnemonic and seed are zeroed before this returns.
pub fn create_wallet(
    data_dir: &Path,
    mnemonic: &str,
    passphrase: &str,
    network: Network,
) -> Result<String, WalletError> {
    let mut rng = OsRng;
    let wallet_id = keys::generate_wallet_id(&mut rng);
    let store = EncryptedStore::create(&wallet_file(data_dir, &wallet_id), passphrase)?;
    keys::create_wallet(&store, mnemonic, passphrase, network, &mut rng)?;
    Ok(wallet_id)
}

/// Generate a fresh mnemonic.
pub fn create_mnemonic(language: &str, word_count: usize) -> Result<String, WalletError> {
    keys::create_mnemonic(language, word_count)
}

/// Ids of the wallets under `data_dir`.
pub fn wallet_list(data_dir: &Path) -> Result<Vec<String>, WalletError> {
    if !data_dir.exists() {
        return Ok(Vec::new());
    }
    let mut ids = Vec::new();
    for entry in std::fs::read_dir(data_dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) == Some(WALLET_EXT) {
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if stem.starts_with("id_") {
                    ids.push(stem.to_string());
                }
            }
        }
    }
    ids.sort();
    Ok(ids)
}

/// Open an existing wallet store.
pub fn open_store(
    data_dir: &Path,
    wallet_id: &str,
    passphrase: &str,
) -> Result<Arc<EncryptedStore>, WalletError> {
    Ok(Arc::new(EncryptedStore::open(
        &wallet_file(data_dir, wallet_id),
        passphrase,
    )?))
}

fn wallet_file(data_dir: &Path, wallet_id: &str) -> PathBuf {
    data_dir.join(format!("{wallet_id}.{WALLET_EXT}"))
}
