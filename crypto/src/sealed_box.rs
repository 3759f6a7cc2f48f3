// Copyright (c) 2019-2025 The Cloak Foundation

//! An authenticated sealed box for output payloads.
//!
//! Anyone can seal bytes to a scan public key; only the scan secret opens
//! them. A fresh ephemeral key per box derives the cipher key and nonce via
//! HKDF-SHA512, so nonces are never reused across boxes.
//!
//! Wire layout: `ephemeral_public(32) ‖ ciphertext ‖ tag(16)`.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use curve25519_dalek::{
    constants::RISTRETTO_BASEPOINT_POINT, ristretto::RistrettoPoint, scalar::Scalar,
};
use hkdf::Hkdf;
use rand_core::CryptoRngCore;
use sha2::Sha512;
use zeroize::Zeroizing;

use crate::{
    domain_separators::{SEALED_BOX_KEY_DOMAIN_TAG, SEALED_BOX_NONCE_DOMAIN_TAG},
    Error,
};

const EPHEMERAL_LEN: usize = 32;
const TAG_LEN: usize = 16;

/// Seal `plaintext` to the holder of `scan_public`'s secret.
pub fn box_encrypt(
    scan_public: &RistrettoPoint,
    plaintext: &[u8],
    rng: &mut dyn CryptoRngCore,
) -> Result<Vec<u8>, Error> {
    let ephemeral = Zeroizing::new(Scalar::random(rng));
    let ephemeral_public = *ephemeral * RISTRETTO_BASEPOINT_POINT;
    let shared = *ephemeral * scan_public;

    let (key, nonce) = derive_key_nonce(&shared, &ephemeral_public);

    let cipher =
        ChaCha20Poly1305::new_from_slice(key.as_slice()).map_err(|_e| Error::DecryptFailed)?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|_e| Error::DecryptFailed)?;

    let mut out = Vec::with_capacity(EPHEMERAL_LEN + ciphertext.len());
    out.extend_from_slice(ephemeral_public.compress().as_bytes());
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Open a sealed box with the scan secret.
pub fn box_decrypt(scan_private: &Scalar, data: &[u8]) -> Result<Vec<u8>, Error> {
    if data.len() < EPHEMERAL_LEN + TAG_LEN {
        return Err(Error::LengthMismatch(data.len(), EPHEMERAL_LEN + TAG_LEN));
    }

    let ephemeral_public = curve25519_dalek::ristretto::CompressedRistretto::from_slice(
        &data[..EPHEMERAL_LEN],
    )
    .map_err(|_e| Error::InvalidCurvePoint)?
    .decompress()
    .ok_or(Error::InvalidCurvePoint)?;

    let shared = scan_private * ephemeral_public;
    let (key, nonce) = derive_key_nonce(&shared, &ephemeral_public);

    let cipher =
        ChaCha20Poly1305::new_from_slice(key.as_slice()).map_err(|_e| Error::DecryptFailed)?;
    cipher
        .decrypt(Nonce::from_slice(&nonce), &data[EPHEMERAL_LEN..])
        .map_err(|_e| Error::DecryptFailed)
}

fn derive_key_nonce(
    shared: &RistrettoPoint,
    ephemeral_public: &RistrettoPoint,
) -> (Zeroizing<[u8; 32]>, [u8; 12]) {
    let mut ikm = Zeroizing::new([0u8; 64]);
    ikm[..32].copy_from_slice(shared.compress().as_bytes());
    ikm[32..].copy_from_slice(ephemeral_public.compress().as_bytes());

    let kdf = Hkdf::<Sha512>::new(None, ikm.as_slice());

    let mut key = Zeroizing::new([0u8; 32]);
    kdf.expand(SEALED_BOX_KEY_DOMAIN_TAG, key.as_mut_slice())
        .expect("32 is a valid HKDF-SHA512 output length");

    let mut nonce = [0u8; 12];
    kdf.expand(SEALED_BOX_NONCE_DOMAIN_TAG, &mut nonce)
        .expect("12 is a valid HKDF-SHA512 output length");

    (key, nonce)
}
