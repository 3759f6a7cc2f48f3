// Copyright (c) 2019-2025 The Cloak Foundation

//! One-time output keys for dual-key stealth addresses.
//!
//! Each payment samples a fresh ephemeral key `r`, publishes `E = r*G`, and
//! pays to `P = Hs(r*A)*G + B`, where `(B, A)` are the recipient's spend and
//! scan public keys. Only the holder of the scan secret `a` can recognise
//! the output, and only the holder of both secrets can spend it with
//! `x = Hs(a*E) + b`.

use blake2::{Blake2b512, Digest};
use curve25519_dalek::{
    constants::RISTRETTO_BASEPOINT_POINT,
    ristretto::{CompressedRistretto, RistrettoPoint},
    scalar::Scalar,
};
use serde::{Deserialize, Serialize};

use crate::{
    domain_separators::ONETIME_SHARED_SECRET_DOMAIN_TAG, stealth_address::StealthAddress, Error,
};

/// The public half of a single stealth payment.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct StealthPayment {
    /// The one-time output key `P`.
    pub onetime_public: CompressedRistretto,

    /// The ephemeral transaction key `E = r*G`.
    pub tx_public: CompressedRistretto,
}

/// `E = r*G` for an ephemeral private key `r`.
pub fn create_tx_public_key(ephemeral_private: &Scalar) -> RistrettoPoint {
    ephemeral_private * RISTRETTO_BASEPOINT_POINT
}

/// Derive the one-time key pair for paying `address` with ephemeral `r`.
pub fn create_stealth_payment(
    address: &StealthAddress,
    ephemeral_private: &Scalar,
) -> Result<StealthPayment, Error> {
    let scan_public = address
        .scan_public
        .decompress()
        .ok_or(Error::InvalidCurvePoint)?;
    let spend_public = address
        .spend_public
        .decompress()
        .ok_or(Error::InvalidCurvePoint)?;

    let hs = shared_secret_scalar(&(ephemeral_private * scan_public));
    let onetime = hs * RISTRETTO_BASEPOINT_POINT + spend_public;

    Ok(StealthPayment {
        onetime_public: onetime.compress(),
        tx_public: create_tx_public_key(ephemeral_private).compress(),
    })
}

/// Recover the one-time private key `x = Hs(a*E) + b` of an output.
///
/// The result spends the output whose key is `x*G`; callers must compare
/// that against the output's `P` before treating the output as theirs.
pub fn recover_onetime_private_key(
    tx_public: &RistrettoPoint,
    scan_private: &Scalar,
    spend_private: &Scalar,
) -> Scalar {
    let hs = shared_secret_scalar(&(scan_private * tx_public));
    hs + spend_private
}

/// `Hs`: hash a Diffie-Hellman point to a scalar.
fn shared_secret_scalar(point: &RistrettoPoint) -> Scalar {
    let mut digest = Blake2b512::new();
    digest.update(ONETIME_SHARED_SECRET_DOMAIN_TAG);
    digest.update(point.compress().as_bytes());
    Scalar::from_hash(digest)
}
