// Copyright (c) 2019-2025 The Cloak Foundation

//! Pedersen commitments `C = v*H + b*G` and their homomorphic sums.

use blake2::{Blake2b512, Digest};
use curve25519_dalek::{
    ristretto::{CompressedRistretto, RistrettoPoint},
    scalar::Scalar,
    traits::Identity,
};
use serde::{Deserialize, Serialize};

use crate::{domain_separators::BLIND_SWITCH_DOMAIN_TAG, generators::generators, Error};

/// A Pedersen commitment to a value, as a curve point.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Commitment {
    /// The point `v*H + b*G`.
    pub point: RistrettoPoint,
}

impl Commitment {
    /// Commit to `value` with blinding factor `blinding`.
    pub fn new(value: u64, blinding: Scalar) -> Self {
        Self {
            point: generators().commit(Scalar::from(value), blinding),
        }
    }

    /// Compress to the 32-byte wire encoding.
    pub fn compress(&self) -> CompressedCommitment {
        CompressedCommitment {
            point: self.point.compress(),
        }
    }
}

impl TryFrom<&CompressedCommitment> for Commitment {
    type Error = Error;

    fn try_from(src: &CompressedCommitment) -> Result<Self, Error> {
        let point = src.point.decompress().ok_or(Error::InvalidCurvePoint)?;
        Ok(Self { point })
    }
}

/// A compressed Pedersen commitment: 32 bytes on the wire.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct CompressedCommitment {
    /// The compressed Ristretto encoding of the commitment point.
    pub point: CompressedRistretto,
}

impl CompressedCommitment {
    /// Commit and compress in one step.
    pub fn new(value: u64, blinding: Scalar) -> Self {
        Commitment::new(value, blinding).compress()
    }

    /// View the encoding as bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        self.point.as_bytes()
    }
}

impl From<CompressedRistretto> for CompressedCommitment {
    fn from(point: CompressedRistretto) -> Self {
        Self { point }
    }
}

impl TryFrom<&[u8]> for CompressedCommitment {
    type Error = Error;

    fn try_from(src: &[u8]) -> Result<Self, Error> {
        if src.len() != 32 {
            return Err(Error::LengthMismatch(src.len(), 32));
        }
        let point =
            CompressedRistretto::from_slice(src).map_err(|_e| Error::InvalidCurvePoint)?;
        Ok(Self { point })
    }
}

/// Re-scale a user blind into the output-side blind space.
///
/// Output blinds are always passed through this hash so that input and
/// output blind spaces cannot be correlated, even when a caller reuses
/// randomness across the two.
pub fn blind_switch(value: u64, blind: Scalar) -> Scalar {
    let mut digest = Blake2b512::new();
    digest.update(BLIND_SWITCH_DOMAIN_TAG);
    digest.update(value.to_le_bytes());
    digest.update(blind.as_bytes());
    Scalar::from_hash(digest)
}

/// Homomorphic sum `Σ pos − Σ neg` of compressed commitments.
pub fn commit_sum(
    pos: &[CompressedCommitment],
    neg: &[CompressedCommitment],
) -> Result<CompressedCommitment, Error> {
    let mut sum = RistrettoPoint::identity();
    for c in pos {
        sum += Commitment::try_from(c)?.point;
    }
    for c in neg {
        sum -= Commitment::try_from(c)?.point;
    }
    Ok(CompressedCommitment {
        point: sum.compress(),
    })
}

/// Check that `Σ lhs == Σ rhs`.
///
/// Undecodable points fail the check rather than erroring: a malformed
/// commitment can never balance.
pub fn verify_commit_sum(lhs: &[CompressedCommitment], rhs: &[CompressedCommitment]) -> bool {
    match (commit_sum(lhs, &[]), commit_sum(rhs, &[])) {
        (Ok(l), Ok(r)) => l == r,
        _ => false,
    }
}
