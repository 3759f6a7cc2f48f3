//! The HD key ledger.
//!
//! The wallet's key material is a BIP-39 mnemonic. A master node is taken
//! from the mnemonic seed with HMAC-SHA512 and children follow the textual
//! path `m/44'/847177'/<account>'/0/<index>`; the spend key lives at the
//! path's index, the scan key one index above it. Node keys become
//! Ristretto scalars through HKDF-SHA512, and every intermediate secret is
//! zeroed when its scope ends.

use bip39::{Language, Mnemonic, MnemonicType, Seed};
use cloak_crypto::{Network, Scalar, StealthAddress};
use curve25519_dalek::constants::RISTRETTO_BASEPOINT_POINT;
use curve25519_dalek::ristretto::RistrettoPoint;
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha512;
use zeroize::{Zeroize, Zeroizing};

use crate::{
    secmem::SecretBuffer,
    storage::{EncryptedStore, Entity},
    types::{EntityId, WalletTx},
    WalletError,
};

/// Derivation prefix of the wallet's first account.
pub const HD_PATH: &str = "m/44'/847177'/0'/0/";

/// Hardened-derivation flag of a path segment.
const HARDENED: u32 = 0x8000_0000;

const MASTER_HMAC_KEY: &[u8] = b"cloak seed";
const SCALAR_KDF_SALT: &[u8] = b"cloak-ristretto255-key";

/// A persisted key set: the master secret plus one derivation path.
#[derive(Clone, Deserialize, Serialize, Zeroize, zeroize::ZeroizeOnDrop)]
pub struct KeySet {
    /// Row key.
    #[zeroize(skip)]
    pub id: EntityId,

    /// Master chain code, hex.
    pub chain_code: String,

    /// Master secret key, hex.
    pub root_key: String,

    /// Spend-key derivation path; the scan key sits one index above.
    pub key_path: String,

    /// The base58 stealth address derived at `key_path`.
    pub stealth_address: String,
}

impl Entity for KeySet {
    const COLLECTION: &'static str = "key_sets";

    fn entity_id(&self) -> EntityId {
        self.id
    }
}

/// One node of the HD tree.
#[derive(Zeroize, zeroize::ZeroizeOnDrop)]
struct HdNode {
    key: [u8; 32],
    chain_code: [u8; 32],
}

impl HdNode {
    fn master(seed: &[u8]) -> Self {
        let mut mac = Hmac::<Sha512>::new_from_slice(MASTER_HMAC_KEY)
            .expect("HMAC accepts any key length");
        mac.update(seed);
        let mut digest = Zeroizing::new([0u8; 64]);
        digest.copy_from_slice(&mac.finalize().into_bytes());

        let mut node = Self {
            key: [0u8; 32],
            chain_code: [0u8; 32],
        };
        node.key.copy_from_slice(&digest[..32]);
        node.chain_code.copy_from_slice(&digest[32..]);
        node
    }

    fn from_key_set(key_set: &KeySet) -> Result<Self, WalletError> {
        let key = decode_key32(&key_set.root_key)?;
        let chain_code = decode_key32(&key_set.chain_code)?;
        Ok(Self { key, chain_code })
    }

    /// Child at `index`; the hardened flag is part of the index.
    fn child(&self, index: u32) -> Self {
        let mut mac = Hmac::<Sha512>::new_from_slice(&self.chain_code)
            .expect("HMAC accepts any key length");
        mac.update(&[0u8]);
        mac.update(&self.key);
        mac.update(&index.to_be_bytes());
        let mut digest = Zeroizing::new([0u8; 64]);
        digest.copy_from_slice(&mac.finalize().into_bytes());

        let mut node = Self {
            key: [0u8; 32],
            chain_code: [0u8; 32],
        };
        node.key.copy_from_slice(&digest[..32]);
        node.chain_code.copy_from_slice(&digest[32..]);
        node
    }

    fn derive(&self, path: &[u32]) -> Self {
        let mut node = Self {
            key: self.key,
            chain_code: self.chain_code,
        };
        for index in path {
            node = node.child(*index);
        }
        node
    }

    /// The node's private scalar.
    fn secret_scalar(&self) -> Zeroizing<Scalar> {
        let kdf = Hkdf::<Sha512>::new(Some(SCALAR_KDF_SALT), &self.key);
        let mut okm = Zeroizing::new([0u8; 64]);
        kdf.expand(b"", okm.as_mut_slice())
            .expect("64 is a valid HKDF-SHA512 output length");
        Zeroizing::new(Scalar::from_bytes_mod_order_wide(&okm))
    }

    fn public(&self) -> RistrettoPoint {
        *self.secret_scalar() * RISTRETTO_BASEPOINT_POINT
    }
}

/// Parse a BIP-32 textual path into indices with hardened flags applied.
fn parse_path(path: &str) -> Result<Vec<u32>, WalletError> {
    let mut segments = path.trim().trim_end_matches('/').split('/');
    if segments.next() != Some("m") {
        return Err(WalletError::Store(format!("malformed key path: {path}")));
    }

    let mut out = Vec::new();
    for segment in segments {
        let (digits, hardened) = match segment.strip_suffix('\'') {
            Some(rest) => (rest, true),
            None => (segment, false),
        };
        let index: u32 = digits
            .parse()
            .map_err(|_e| WalletError::Store(format!("malformed key path: {path}")))?;
        if index >= HARDENED {
            return Err(WalletError::Store(format!("path index too large: {path}")));
        }
        out.push(if hardened { index | HARDENED } else { index });
    }
    if out.is_empty() {
        return Err(WalletError::Store(format!("malformed key path: {path}")));
    }
    Ok(out)
}

/// Increment one segment of a textual path, keeping hardened markers.
fn bump_segment(path: &str, segment: usize) -> Result<String, WalletError> {
    let trimmed = path.trim().trim_end_matches('/');
    let mut parts: Vec<String> = trimmed.split('/').map(str::to_string).collect();
    // parts[0] is "m"; segment indices count from the first real segment.
    let slot = segment + 1;
    if parts.first().map(String::as_str) != Some("m") || slot >= parts.len() {
        return Err(WalletError::Store(format!("malformed key path: {path}")));
    }
    let (digits, hardened) = match parts[slot].strip_suffix('\'') {
        Some(rest) => (rest, true),
        None => (parts[slot].as_str(), false),
    };
    let index: u32 = digits
        .parse()
        .map_err(|_e| WalletError::Store(format!("malformed key path: {path}")))?;
    parts[slot] = if hardened {
        format!("{}'", index + 1)
    } else {
        format!("{}", index + 1)
    };
    Ok(parts.join("/"))
}

fn bump_last(path: &str) -> Result<String, WalletError> {
    let trimmed = path.trim().trim_end_matches('/');
    let segments = trimmed.split('/').count();
    bump_segment(path, segments - 2)
}

fn decode_key32(src: &str) -> Result<[u8; 32], WalletError> {
    let bytes = Zeroizing::new(
        hex::decode(src).map_err(|_e| WalletError::Store("malformed stored key".into()))?,
    );
    if bytes.len() != 32 {
        return Err(WalletError::Store("malformed stored key".into()));
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(&bytes);
    Ok(out)
}

/// The stealth address at `key_path`: spend key at the path, scan key one
/// index above it.
fn stealth_address_at(
    master: &HdNode,
    key_path: &str,
    network: Network,
) -> Result<String, WalletError> {
    let spend = master.derive(&parse_path(key_path)?);
    let scan = master.derive(&parse_path(&bump_last(key_path)?)?);
    Ok(StealthAddress::new(spend.public().compress(), scan.public().compress()).encode(network))
}

fn build_key_set(
    master: &HdNode,
    key_path: &str,
    network: Network,
    rng: &mut dyn RngCore,
) -> Result<KeySet, WalletError> {
    Ok(KeySet {
        id: EntityId::random(rng),
        chain_code: hex::encode(master.chain_code),
        root_key: hex::encode(master.key),
        key_path: key_path.to_string(),
        stealth_address: stealth_address_at(master, key_path, network)?,
    })
}

/// Generate a fresh mnemonic phrase.
pub fn create_mnemonic(language: &str, word_count: usize) -> Result<String, WalletError> {
    let language = parse_language(language)?;
    let mnemonic_type = MnemonicType::for_word_count(word_count)
        .map_err(|e| WalletError::Config(format!("unsupported word count: {e}")))?;
    Ok(Mnemonic::new(mnemonic_type, language).into_phrase())
}

fn parse_language(language: &str) -> Result<Language, WalletError> {
    match language.to_ascii_lowercase().as_str() {
        "english" | "en" => Ok(Language::English),
        "french" | "fr" => Ok(Language::French),
        "italian" | "it" => Ok(Language::Italian),
        "japanese" | "ja" => Ok(Language::Japanese),
        "korean" | "ko" => Ok(Language::Korean),
        "spanish" | "es" => Ok(Language::Spanish),
        other => Err(WalletError::Config(format!("unsupported language: {other}"))),
    }
}

/// Derive the wallet's initial key set from a mnemonic and insert it.
///
/// The seed material is page-locked while in use and zeroed before return,
/// on success and failure alike.
pub fn create_wallet(
    store: &EncryptedStore,
    mnemonic_phrase: &str,
    passphrase: &str,
    network: Network,
    rng: &mut dyn RngCore,
) -> Result<KeySet, WalletError> {
    let mnemonic = Mnemonic::from_phrase(mnemonic_phrase, Language::English)
        .map_err(|e| WalletError::Config(format!("invalid mnemonic: {e}")))?;

    let seed = SecretBuffer::new(Seed::new(&mnemonic, passphrase).as_bytes().to_vec());
    drop(mnemonic);

    let master = HdNode::master(seed.as_bytes());
    let key_path = format!("{HD_PATH}0");
    let key_set = build_key_set(&master, &key_path, network, rng)?;
    store.insert(&key_set)?;
    Ok(key_set)
}

/// A fresh wallet id: `id_` plus a hex-encoded 16-byte identifier.
pub fn generate_wallet_id(rng: &mut dyn RngCore) -> String {
    format!("id_{}", EntityId::random(rng))
}

/// Derive the current spend and scan secrets.
///
/// Reads the first persisted key set; the returned scalars are zero-on-drop
/// and must stay confined to the caller's scope.
pub fn unlock(
    store: &EncryptedStore,
) -> Result<(Zeroizing<Scalar>, Zeroizing<Scalar>), WalletError> {
    let sets: Vec<KeySet> = store.query()?;
    let first = sets
        .first()
        .ok_or_else(|| WalletError::Store("wallet has no key sets".into()))?;

    let master = HdNode::from_key_set(first)?;
    let spend = master.derive(&parse_path(&format!("{HD_PATH}0"))?).secret_scalar();
    let scan = master.derive(&parse_path(&format!("{HD_PATH}1"))?).secret_scalar();
    Ok((spend, scan))
}

/// The wallet's own stealth address, from the unlocked secrets.
pub fn own_stealth_address(spend: &Scalar, scan: &Scalar) -> StealthAddress {
    StealthAddress::new(
        (spend * RISTRETTO_BASEPOINT_POINT).compress(),
        (scan * RISTRETTO_BASEPOINT_POINT).compress(),
    )
}

/// All persisted key sets, oldest first.
pub fn key_sets(store: &EncryptedStore) -> Result<Vec<KeySet>, WalletError> {
    store.query()
}

/// The most recently inserted key set.
pub fn last_key_set(store: &EncryptedStore) -> Result<KeySet, WalletError> {
    let mut sets: Vec<KeySet> = store.query()?;
    sets.pop()
        .ok_or_else(|| WalletError::Store("wallet has no key sets".into()))
}

/// Insert a new key set at the next account index.
pub fn add_key_set(
    store: &EncryptedStore,
    network: Network,
    rng: &mut dyn RngCore,
) -> Result<KeySet, WalletError> {
    let last = last_key_set(store)?;
    let master = HdNode::from_key_set(&last)?;
    let next_path = bump_segment(&last.key_path, 2)?;
    let key_set = build_key_set(&master, &next_path, network, rng)?;
    store.insert(&key_set)?;
    Ok(key_set)
}

/// Advance the last key set's address index, once any transaction exists.
///
/// A no-op on a wallet with no transactions, so repeated calls before first
/// use keep returning the same address.
pub fn next_key_set(store: &EncryptedStore, network: Network) -> Result<KeySet, WalletError> {
    let last = last_key_set(store)?;
    let transactions: Vec<WalletTx> = store.query()?;
    if transactions.is_empty() {
        return Ok(last);
    }

    let master = HdNode::from_key_set(&last)?;
    let mut updated = last.clone();
    updated.key_path = bump_last(&last.key_path)?;
    updated.stealth_address = stealth_address_at(&master, &updated.key_path, network)?;
    store.update(&updated)?;
    Ok(updated)
}
