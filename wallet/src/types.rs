//! Wire and wallet record types.

use chrono::{DateTime, Utc};
use cloak_crypto::{CompressedCommitment, CompressedRistretto};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::WalletError;

/// A 128-bit identifier for stored entities and sessions.
#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
pub struct EntityId(pub [u8; 16]);

impl EntityId {
    /// A fresh random id.
    pub fn random(rng: &mut dyn RngCore) -> Self {
        let mut bytes = [0u8; 16];
        rng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Parse from the hex form produced by `Display`.
    pub fn from_hex(src: &str) -> Result<Self, WalletError> {
        let bytes = hex::decode(src).map_err(|e| WalletError::Store(e.to_string()))?;
        if bytes.len() != 16 {
            return Err(WalletError::Store(format!(
                "entity id must be 16 bytes, got {}",
                bytes.len()
            )));
        }
        let mut out = [0u8; 16];
        out.copy_from_slice(&bytes);
        Ok(Self(out))
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Sessions are identified the same way as stored rows.
pub type SessionId = EntityId;

/// What a confidential output carries.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum CoinType {
    /// An ordinary payment or change output.
    Coin,
    /// A staking output.
    Coinstake,
    /// The fee output of a transaction.
    Fee,
    /// A block reward output.
    Coinbase,
}

/// Direction of a wallet transaction.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum WalletType {
    /// Money in.
    Receive,
    /// Money out.
    Send,
}

/// What kind of spend a session builds.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub enum SessionType {
    /// An ordinary payment.
    #[default]
    Coin,
    /// A coinstake transaction.
    Coinstake,
}

/// A single confidential output.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Vout {
    /// Plain amount. Zero unless policy exposes it (fee and coinbase
    /// outputs); payment amounts travel encrypted inside `note`.
    pub amount: u64,

    /// Pedersen commitment to the amount.
    pub commitment: CompressedCommitment,

    /// Ephemeral transaction public key of the stealth payment.
    pub ephemeral_key: CompressedRistretto,

    /// Unix locktime, or 0 when the output is immediately spendable.
    pub locktime: u32,

    /// Sealed amount ‖ blind ‖ memo payload for the recipient's scan key.
    pub note: Vec<u8>,

    /// One-time output public key.
    pub onetime_key: CompressedRistretto,

    /// Locktime script, when a locktime is set.
    pub script: Option<String>,

    /// Output kind.
    pub coin_type: CoinType,
}

/// The decrypted contents of a [`Vout::note`].
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct OutputMemo {
    /// Amount in atomic units.
    pub amount: u64,
    /// The commitment's blinding factor.
    pub blind: [u8; 32],
    /// Free-form sender memo.
    pub memo: String,
}

/// The ring-signature record of a transaction.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Rct {
    /// Message bound into every MLSAG challenge.
    pub preimage: [u8; 32],

    /// Row-major ring matrix, `n_rows * n_cols * 32` bytes.
    pub matrix: Vec<u8>,

    /// The signature's initial challenge scalar.
    pub challenge: [u8; 32],

    /// Response scalars, `n_cols * n_rows * 32` bytes.
    pub responses: Vec<u8>,
}

/// The input record of a transaction.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Vin {
    /// Key image of the spent one-time key.
    pub key_image: [u8; 32],

    /// Column-major interleave of input commitments and one-time keys,
    /// `n_rows * n_cols * 32` bytes.
    pub offsets: Vec<u8>,
}

/// A finished confidential transaction, as submitted to the node.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Transaction {
    /// Content hash of every other field.
    pub txn_id: [u8; 32],

    /// Format version.
    pub ver: u16,

    /// Ring width used by the signature.
    pub mix: u32,

    /// Bulletproof over the change output.
    pub bp: Vec<u8>,

    /// Ring signature record.
    pub rct: Rct,

    /// Input record.
    pub vin: Vin,

    /// Exactly three outputs, in order fee, payment, change.
    pub vout: Vec<Vout>,

    /// Session id of the builder that produced this transaction.
    pub id: EntityId,
}

impl Transaction {
    /// Hash of every field except `txn_id` itself.
    pub fn content_hash(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(b"cloak-txn-v1");
        hasher.update(self.ver.to_le_bytes());
        hasher.update(self.mix.to_le_bytes());
        hasher.update(&self.bp);
        hasher.update(self.rct.preimage);
        hasher.update(&self.rct.matrix);
        hasher.update(self.rct.challenge);
        hasher.update(&self.rct.responses);
        hasher.update(self.vin.key_image);
        hasher.update(&self.vin.offsets);
        for v in &self.vout {
            hasher.update(v.amount.to_le_bytes());
            hasher.update(v.commitment.as_bytes());
            hasher.update(v.ephemeral_key.as_bytes());
            hasher.update(v.locktime.to_le_bytes());
            hasher.update(&v.note);
            hasher.update(v.onetime_key.as_bytes());
            if let Some(script) = &v.script {
                hasher.update(script.as_bytes());
            }
            hasher.update([v.coin_type as u8]);
        }
        hasher.update(self.id.0);
        hasher.finalize().into()
    }
}

/// A wallet-side transaction record.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct WalletTx {
    /// Owning session id; one draft per session.
    pub id: EntityId,

    /// On-chain transaction hash; empty until known.
    pub tx_id: Vec<u8>,

    /// When the record was created or last updated.
    pub date_time: DateTime<Utc>,

    /// Direction.
    pub wallet_type: WalletType,

    /// Balance available when the record was made.
    pub balance: u64,

    /// Payment amount of a send.
    pub payment: u64,

    /// Change amount of a send.
    pub change: u64,

    /// Fee paid by a send.
    pub fee: u64,

    /// Coinstake reward, when applicable.
    pub reward: u64,

    /// Free-form memo.
    pub memo: String,

    /// Sender stealth address.
    pub sender_address: String,

    /// Recipient stealth address.
    pub recipient_address: String,

    /// The output being consumed by a send.
    pub spending: Option<Vout>,

    /// Whether the balance was fully consumed.
    pub spent: bool,

    /// Outputs: the three send outputs, or the received outputs.
    pub vout: Vec<Vout>,
}

impl WalletTx {
    /// A blank draft owned by `id`.
    pub fn new(id: EntityId, wallet_type: WalletType) -> Self {
        Self {
            id,
            tx_id: Vec::new(),
            date_time: Utc::now(),
            wallet_type,
            balance: 0,
            payment: 0,
            change: 0,
            fee: 0,
            reward: 0,
            memo: String::new(),
            sender_address: String::new(),
            recipient_address: String::new(),
            spending: None,
            spent: false,
            vout: Vec::new(),
        }
    }
}

/// One line of the display history.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct BalanceSheet {
    /// When the entry happened.
    pub date_time: DateTime<Utc>,
    /// Memo carried by the transaction.
    pub memo: String,
    /// Money in, atomic units.
    pub money_in: u64,
    /// Money out, atomic units.
    pub money_out: u64,
    /// Running balance after this entry.
    pub balance: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn entity_id_hex_roundtrip() {
        let id = EntityId::random(&mut OsRng);
        let parsed = EntityId::from_hex(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn entity_id_rejects_bad_hex() {
        assert!(EntityId::from_hex("zz").is_err());
        assert!(EntityId::from_hex("abcd").is_err());
    }

    #[test]
    fn content_hash_ignores_txn_id() {
        let mut tx = Transaction {
            txn_id: [0u8; 32],
            ver: 1,
            mix: 22,
            bp: vec![1, 2, 3],
            rct: Rct::default(),
            vin: Vin::default(),
            vout: Vec::new(),
            id: EntityId::default(),
        };
        let h1 = tx.content_hash();
        tx.txn_id = [9u8; 32];
        assert_eq!(h1, tx.content_hash());

        tx.mix = 11;
        assert_ne!(h1, tx.content_hash());
    }
}
