//! Encrypted single-file document store.
//!
//! Wallet records live in typed collections inside one file, encrypted with
//! a key derived from the wallet passphrase:
//! - Argon2id for password-based key derivation
//! - ChaCha20-Poly1305 for authenticated encryption
//!
//! Writes are serialised behind an `RwLock` and land on disk atomically
//! (write to a sibling temp file, then rename).

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    sync::RwLock,
};

use argon2::{
    password_hash::{rand_core::OsRng, SaltString},
    Argon2, PasswordHasher,
};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use rand::Rng;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::{types::EntityId, WalletError};

/// Current store file format version.
const STORE_VERSION: u32 = 1;

/// Argon2 parameters (tuned for security vs. usability).
const ARGON2_MEMORY_KB: u32 = 65536; // 64 MB
const ARGON2_ITERATIONS: u32 = 3;
const ARGON2_PARALLELISM: u32 = 4;

/// A storable record: lives in a named collection, keyed by an [`EntityId`].
pub trait Entity: Clone + Serialize + DeserializeOwned {
    /// Collection name inside the store file.
    const COLLECTION: &'static str;

    /// The row key.
    fn entity_id(&self) -> EntityId;
}

impl Entity for crate::types::WalletTx {
    const COLLECTION: &'static str = "wallet_transactions";

    fn entity_id(&self) -> EntityId {
        self.id
    }
}

impl Entity for crate::types::Transaction {
    const COLLECTION: &'static str = "transactions";

    fn entity_id(&self) -> EntityId {
        self.id
    }
}

/// On-disk envelope of the store.
#[derive(Deserialize, Serialize)]
struct StoreFile {
    version: u32,
    /// Argon2 salt, base64.
    salt: String,
    /// ChaCha20-Poly1305 nonce, hex.
    nonce: String,
    /// Encrypted JSON collections, hex.
    ciphertext: String,
}

type Collections = BTreeMap<String, Vec<serde_json::Value>>;

/// The wallet's document store. One instance per wallet file.
pub struct EncryptedStore {
    path: PathBuf,
    salt: String,
    key: Zeroizing<[u8; 32]>,
    collections: RwLock<Collections>,
}

impl EncryptedStore {
    /// Create a fresh store at `path`, keyed to `passphrase`.
    pub fn create(path: &Path, passphrase: &str) -> Result<Self, WalletError> {
        if path.exists() {
            return Err(WalletError::Store(format!(
                "wallet file already exists: {}",
                path.display()
            )));
        }
        let salt = SaltString::generate(&mut OsRng);
        let key = derive_key(passphrase, salt.as_str())?;
        let store = Self {
            path: path.to_path_buf(),
            salt: salt.to_string(),
            key,
            collections: RwLock::new(Collections::new()),
        };
        store.save()?;
        Ok(store)
    }

    /// Open an existing store, decrypting it with `passphrase`.
    pub fn open(path: &Path, passphrase: &str) -> Result<Self, WalletError> {
        let json = fs::read_to_string(path)
            .map_err(|e| WalletError::Store(format!("failed to read wallet file: {e}")))?;
        let file: StoreFile = serde_json::from_str(&json)
            .map_err(|e| WalletError::Store(format!("failed to parse wallet file: {e}")))?;

        if file.version != STORE_VERSION {
            return Err(WalletError::Store(format!(
                "unsupported wallet version: {} (expected {})",
                file.version, STORE_VERSION
            )));
        }

        let key = derive_key(passphrase, &file.salt)?;

        let nonce_bytes = hex::decode(&file.nonce)
            .map_err(|_e| WalletError::Store("invalid nonce format".into()))?;
        let ciphertext = hex::decode(&file.ciphertext)
            .map_err(|_e| WalletError::Store("invalid ciphertext format".into()))?;
        if nonce_bytes.len() != 12 {
            return Err(WalletError::Store("invalid nonce length".into()));
        }

        let cipher = ChaCha20Poly1305::new_from_slice(key.as_slice())
            .map_err(|_e| WalletError::Store("failed to create cipher".into()))?;
        let plaintext = cipher
            .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_slice())
            .map_err(|_e| WalletError::Store("decryption failed - wrong passphrase?".into()))?;

        let collections: Collections = serde_json::from_slice(&plaintext)?;

        Ok(Self {
            path: path.to_path_buf(),
            salt: file.salt,
            key,
            collections: RwLock::new(collections),
        })
    }

    /// Whether a wallet file exists at `path`.
    pub fn exists(path: &Path) -> bool {
        path.exists()
    }

    /// Insert a new row.
    pub fn insert<T: Entity>(&self, row: &T) -> Result<(), WalletError> {
        {
            let mut collections = self.write_lock()?;
            let rows = collections.entry(T::COLLECTION.to_string()).or_default();
            rows.push(serde_json::to_value(row)?);
        }
        self.save()
    }

    /// Replace the row with the same id, or insert when absent.
    pub fn update<T: Entity>(&self, row: &T) -> Result<(), WalletError> {
        {
            let mut collections = self.write_lock()?;
            let rows = collections.entry(T::COLLECTION.to_string()).or_default();
            let id = row.entity_id();
            let value = serde_json::to_value(row)?;
            match rows
                .iter_mut()
                .find(|v| entity_id_of::<T>(v) == Some(id))
            {
                Some(slot) => *slot = value,
                None => rows.push(value),
            }
        }
        self.save()
    }

    /// All rows of a collection, in insertion order.
    pub fn query<T: Entity>(&self) -> Result<Vec<T>, WalletError> {
        let collections = self.read_lock()?;
        collections
            .get(T::COLLECTION)
            .map(|rows| {
                rows.iter()
                    .map(|v| serde_json::from_value(v.clone()).map_err(WalletError::from))
                    .collect()
            })
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    /// Delete the row with `id`. Returns whether a row was removed.
    pub fn delete<T: Entity>(&self, id: EntityId) -> Result<bool, WalletError> {
        let removed = {
            let mut collections = self.write_lock()?;
            let rows = collections.entry(T::COLLECTION.to_string()).or_default();
            let before = rows.len();
            rows.retain(|v| entity_id_of::<T>(v) != Some(id));
            before != rows.len()
        };
        if removed {
            self.save()?;
        }
        Ok(removed)
    }

    fn read_lock(&self) -> Result<std::sync::RwLockReadGuard<'_, Collections>, WalletError> {
        self.collections
            .read()
            .map_err(|_e| WalletError::Store("store lock poisoned".into()))
    }

    fn write_lock(&self) -> Result<std::sync::RwLockWriteGuard<'_, Collections>, WalletError> {
        self.collections
            .write()
            .map_err(|_e| WalletError::Store("store lock poisoned".into()))
    }

    /// Encrypt the collections and atomically rewrite the store file.
    fn save(&self) -> Result<(), WalletError> {
        let plaintext = {
            let collections = self.read_lock()?;
            serde_json::to_vec(&*collections)?
        };

        let mut nonce_bytes = [0u8; 12];
        rand::thread_rng().fill(&mut nonce_bytes);

        let cipher = ChaCha20Poly1305::new_from_slice(self.key.as_slice())
            .map_err(|_e| WalletError::Store("failed to create cipher".into()))?;
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_slice())
            .map_err(|_e| WalletError::Store("encryption failed".into()))?;

        let file = StoreFile {
            version: STORE_VERSION,
            salt: self.salt.clone(),
            nonce: hex::encode(nonce_bytes),
            ciphertext: hex::encode(ciphertext),
        };
        let json = serde_json::to_string_pretty(&file)?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp = self.path.with_extension("tmp");
        write_restricted(&tmp, json.as_bytes())?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[cfg(unix)]
fn write_restricted(path: &Path, bytes: &[u8]) -> Result<(), WalletError> {
    use std::{io::Write, os::unix::fs::OpenOptionsExt};
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(bytes)?;
    Ok(())
}

#[cfg(not(unix))]
fn write_restricted(path: &Path, bytes: &[u8]) -> Result<(), WalletError> {
    fs::write(path, bytes)?;
    Ok(())
}

fn entity_id_of<T: Entity>(value: &serde_json::Value) -> Option<EntityId> {
    serde_json::from_value::<T>(value.clone())
        .ok()
        .map(|row| row.entity_id())
}

/// Derive a 32-byte encryption key from the passphrase using Argon2id.
fn derive_key(passphrase: &str, salt: &str) -> Result<Zeroizing<[u8; 32]>, WalletError> {
    let salt = SaltString::from_b64(salt)
        .map_err(|_e| WalletError::Store("invalid salt format".into()))?;

    let argon2 = Argon2::new(
        argon2::Algorithm::Argon2id,
        argon2::Version::V0x13,
        argon2::Params::new(
            ARGON2_MEMORY_KB,
            ARGON2_ITERATIONS,
            ARGON2_PARALLELISM,
            Some(32),
        )
        .map_err(|_e| WalletError::Store("invalid argon2 parameters".into()))?,
    );

    let hash = argon2
        .hash_password(passphrase.as_bytes(), &salt)
        .map_err(|_e| WalletError::Store("key derivation failed".into()))?;
    let output = hash
        .hash
        .ok_or_else(|| WalletError::Store("no hash output".into()))?;

    let mut key = Zeroizing::new([0u8; 32]);
    key.copy_from_slice(&output.as_bytes()[..32]);
    Ok(key)
}
