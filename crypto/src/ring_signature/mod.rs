// Copyright (c) 2019-2025 The Cloak Foundation

//! MLSAG ring signatures over a two-row matrix of one-time keys and
//! commitment differences.

mod key_image;
mod mlsag;

pub use key_image::KeyImage;
pub use mlsag::{prepare_ring, RingMatrix, RingMlsag, RING_ROWS};

use blake2::{Blake2b512, Digest};
use curve25519_dalek::ristretto::RistrettoPoint;

use crate::domain_separators::HASH_TO_POINT_DOMAIN_TAG;

/// Map a public key to a second group element with unknown discrete log.
pub fn hash_to_point(public_key: &RistrettoPoint) -> RistrettoPoint {
    let mut hasher = Blake2b512::new();
    hasher.update(HASH_TO_POINT_DOMAIN_TAG);
    hasher.update(public_key.compress().as_bytes());
    RistrettoPoint::from_hash(hasher)
}
