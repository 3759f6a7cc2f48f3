// Copyright (c) 2019-2025 The Cloak Foundation

//! The Pedersen generator pair used by every commitment in Cloak.

use blake2::{Blake2b512, Digest};
use bulletproofs::PedersenGens;
use curve25519_dalek::{constants::RISTRETTO_BASEPOINT_POINT, ristretto::RistrettoPoint};
use once_cell::sync::Lazy;

use crate::domain_separators::VALUE_GENERATOR_DOMAIN_TAG;

/// The blinding generator `G`: the Ristretto basepoint.
pub const B_BLINDING: RistrettoPoint = RISTRETTO_BASEPOINT_POINT;

/// The value generator `H`, obtained by hashing a fixed tag to a point so
/// that its discrete log with respect to `G` is unknown.
static B_VALUE: Lazy<RistrettoPoint> = Lazy::new(|| {
    let mut hasher = Blake2b512::new();
    hasher.update(VALUE_GENERATOR_DOMAIN_TAG);
    RistrettoPoint::from_hash(hasher)
});

/// The generator pair, in the shape the bulletproofs prover expects:
/// `commit(v, b) = v*B + b*B_blinding` with `B = H` and `B_blinding = G`.
pub fn generators() -> PedersenGens {
    PedersenGens {
        B: *B_VALUE,
        B_blinding: B_BLINDING,
    }
}
