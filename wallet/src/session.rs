//! In-flight build state, one session per draft.
//!
//! The [`SessionStore`] is the only shared mutable state in the wallet.
//! Sessions are value-typed: readers get a snapshot clone, and writers go
//! through [`SessionStore::add_or_update`], which merges the incoming draft
//! field-by-field into the incumbent and stores the merged value.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use dashmap::DashMap;
use serde_json::json;

use crate::{
    storage::EncryptedStore,
    types::{SessionId, SessionType, WalletTx},
    WalletError,
};

/// A cooperative cancellation flag shared across RPC calls and waits.
///
/// Cancellation never leaves partial state behind: paths that observe the
/// flag return [`WalletError::Cancelled`] before persisting anything.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// A fresh, unset flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// One user flow: a database handle plus the draft being built.
#[derive(Clone)]
pub struct Session {
    /// The session's identity; also the draft's row key.
    pub session_id: SessionId,

    /// What kind of spend this session builds.
    pub session_type: SessionType,

    /// Handle to the wallet's persistent store.
    pub store: Arc<EncryptedStore>,

    /// The in-flight draft.
    pub draft: WalletTx,

    /// Structured record of the last failure, if any.
    pub last_error: Option<serde_json::Value>,
}

impl Session {
    /// A fresh session with a blank send draft.
    pub fn new(
        session_id: SessionId,
        session_type: SessionType,
        store: Arc<EncryptedStore>,
    ) -> Self {
        Self {
            session_id,
            session_type,
            store,
            draft: WalletTx::new(session_id, crate::types::WalletType::Send),
            last_error: None,
        }
    }
}

/// Merge an incoming draft into the incumbent, returning the new value.
///
/// The draft's identity always tracks the session; every user-settable
/// field comes from the patch.
pub fn merge_draft(session_id: SessionId, old: &WalletTx, patch: &WalletTx) -> WalletTx {
    let mut merged = old.clone();
    merged.id = session_id;
    merged.balance = patch.balance;
    merged.change = patch.change;
    merged.date_time = patch.date_time;
    merged.fee = patch.fee;
    merged.memo = patch.memo.clone();
    merged.payment = patch.payment;
    merged.recipient_address = patch.recipient_address.clone();
    merged.reward = patch.reward;
    merged.sender_address = patch.sender_address.clone();
    merged.spending = patch.spending.clone();
    merged.spent = patch.spent;
    merged.tx_id = patch.tx_id.clone();
    merged.vout = patch.vout.clone();
    merged.wallet_type = patch.wallet_type;
    merged
}

/// Process-wide map from session id to session.
#[derive(Default)]
pub struct SessionStore {
    sessions: DashMap<SessionId, Session>,
}

impl SessionStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the session with `id`.
    pub fn get(&self, id: SessionId) -> Option<Session> {
        self.sessions.get(&id).map(|entry| entry.clone())
    }

    /// Insert the session, or merge its draft into the incumbent.
    ///
    /// Returns the stored value.
    pub fn add_or_update(&self, session: Session) -> Session {
        let id = session.session_id;
        let merged = match self.sessions.get(&id) {
            Some(existing) => {
                let mut updated = existing.clone();
                drop(existing);
                updated.session_type = session.session_type;
                updated.draft = merge_draft(id, &updated.draft, &session.draft);
                updated.last_error = session.last_error.clone();
                updated
            }
            None => session,
        };
        self.sessions.insert(id, merged.clone());
        merged
    }

    /// Look up a session, failing with a store error when absent.
    pub fn expect(&self, id: SessionId) -> Result<Session, WalletError> {
        self.get(id)
            .ok_or_else(|| WalletError::Store(format!("unknown session {id}")))
    }

    /// Record a structured failure on the session.
    pub fn set_last_error(&self, id: SessionId, error: &WalletError) {
        if let Some(mut entry) = self.sessions.get_mut(&id) {
            entry.last_error = Some(json!({
                "success": false,
                "message": error.to_string(),
            }));
        }
        tracing::warn!(session = %id, "operation failed: {error}");
    }

    /// The last recorded failure for `id`.
    pub fn last_error(&self, id: SessionId) -> Option<serde_json::Value> {
        self.sessions.get(&id).and_then(|entry| entry.last_error.clone())
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether any sessions exist.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
