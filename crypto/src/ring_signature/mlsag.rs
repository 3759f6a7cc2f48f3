// Copyright (c) 2019-2025 The Cloak Foundation

//! MLSAG (Multi-layered Linkable Spontaneous Anonymous Group) signatures.
//!
//! The ring is a 2×n matrix. Row 0 holds one-time public keys; row 1 holds
//! commitment differences `C_in[i] − ΣC_out`, whose discrete log at the
//! real column is the aggregate blind when the transaction balances. The
//! signer proves knowledge of one column's secrets without revealing which,
//! and row 0 is linkable through the key image.
//!
//! Reference: "Ring Confidential Transactions"
//! https://eprint.iacr.org/2015/1098

use blake2::{Blake2b512, Digest};
use curve25519_dalek::{
    ristretto::{CompressedRistretto, RistrettoPoint},
    scalar::Scalar,
};
use rand_core::CryptoRngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use super::{hash_to_point, KeyImage};
use crate::{
    commitment::{commit_sum, Commitment, CompressedCommitment},
    domain_separators::MLSAG_ROUND_HASH_DOMAIN_TAG,
    generators::B_BLINDING,
    Error,
};

/// Number of rows in the ring matrix: one-time keys + commitment deltas.
pub const RING_ROWS: usize = 2;

/// The public ring matrix an MLSAG is made over.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct RingMatrix {
    /// Row 0: one-time public keys, one per column.
    pub keys: Vec<CompressedRistretto>,

    /// Row 1: `C_in[i] − ΣC_out`, one per column.
    pub deltas: Vec<CompressedRistretto>,
}

impl RingMatrix {
    /// Ring width.
    pub fn n_cols(&self) -> usize {
        self.keys.len()
    }

    /// Row-major wire encoding: all of row 0, then all of row 1.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(RING_ROWS * self.keys.len() * 32);
        for key in &self.keys {
            out.extend_from_slice(key.as_bytes());
        }
        for delta in &self.deltas {
            out.extend_from_slice(delta.as_bytes());
        }
        out
    }
}

/// Build the ring matrix and derive the aggregate blind.
///
/// Row 1 is filled with `pcm_in[i] − Σ pcm_out` per column; the returned
/// scalar is `blinds[0] − Σ blinds[1..]`, the discrete log of the real
/// column's delta when inputs and outputs commit to the same total.
pub fn prepare_ring(
    pk_in: &[CompressedRistretto],
    pcm_in: &[CompressedCommitment],
    pcm_out: &[CompressedCommitment],
    blinds: &[Scalar],
) -> Result<(RingMatrix, Scalar), Error> {
    if pk_in.len() != pcm_in.len() {
        return Err(Error::LengthMismatch(pcm_in.len(), pk_in.len()));
    }
    if blinds.len() != pcm_out.len() + 1 {
        return Err(Error::LengthMismatch(blinds.len(), pcm_out.len() + 1));
    }

    let output_sum = Commitment::try_from(&commit_sum(pcm_out, &[])?)?.point;

    let mut deltas = Vec::with_capacity(pcm_in.len());
    for pcm in pcm_in {
        let input = Commitment::try_from(pcm)?.point;
        deltas.push((input - output_sum).compress());
    }

    let blind_sum = blinds[1..]
        .iter()
        .fold(blinds[0], |acc, blind| acc - blind);

    Ok((
        RingMatrix {
            keys: pk_in.to_vec(),
            deltas,
        },
        blind_sum,
    ))
}

/// An MLSAG signature over a [`RingMatrix`].
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize, Zeroize)]
pub struct RingMlsag {
    /// Key image "spent" by this signature.
    pub key_image: KeyImage,

    /// The initial challenge `c[0]`.
    pub challenge: Scalar,

    /// Responses, column-major: `s[2i]` for row 0, `s[2i+1]` for row 1.
    pub responses: Vec<Scalar>,
}

impl RingMlsag {
    /// Sign a ring matrix.
    ///
    /// # Arguments
    /// * `preimage` - The 32-byte message bound into every challenge.
    /// * `matrix` - The public ring.
    /// * `onetime_private` - Row-0 secret of the real column.
    /// * `blind_sum` - Row-1 secret: aggregate blind from [`prepare_ring`].
    /// * `real_index` - Column of the real input.
    /// * `rng` - Cryptographic RNG.
    pub fn sign(
        preimage: &[u8; 32],
        matrix: &RingMatrix,
        onetime_private: &Scalar,
        blind_sum: &Scalar,
        real_index: usize,
        rng: &mut dyn CryptoRngCore,
    ) -> Result<Self, Error> {
        let n_cols = matrix.n_cols();

        if n_cols == 0 || real_index >= n_cols {
            return Err(Error::IndexOutOfBounds);
        }
        if matrix.deltas.len() != n_cols {
            return Err(Error::LengthMismatch(matrix.deltas.len(), n_cols));
        }

        let g = B_BLINDING;

        let keys = decompress_row(&matrix.keys)?;
        let deltas = decompress_row(&matrix.deltas)?;

        // The real column's delta must open to the aggregate blind, or the
        // transaction does not balance and the signature would be junk.
        if deltas[real_index] != blind_sum * g {
            return Err(Error::ValueNotConserved);
        }

        let x: Scalar = *onetime_private;
        let z: Scalar = *blind_sum;

        let key_image = KeyImage::new(onetime_private);
        let image_point = key_image
            .point
            .decompress()
            .ok_or(Error::InvalidKeyImage)?;

        let hp_real = hash_to_point(&keys[real_index]);

        // Random responses everywhere except the real column.
        let mut responses = vec![Scalar::ZERO; RING_ROWS * n_cols];
        for (i, response) in responses.iter_mut().enumerate() {
            if i / RING_ROWS != real_index {
                *response = Scalar::random(rng);
            }
        }

        // Nonces for the real column.
        let alpha_0 = Scalar::random(rng);
        let alpha_1 = Scalar::random(rng);

        let mut challenges = vec![Scalar::ZERO; n_cols];
        challenges[(real_index + 1) % n_cols] = round_hash(
            preimage,
            &key_image,
            &(alpha_0 * g),
            &(alpha_0 * hp_real),
            &(alpha_1 * g),
        );

        // Walk the ring from real_index + 1 back around to real_index.
        for step in 1..n_cols {
            let i = (real_index + step) % n_cols;
            let next = (i + 1) % n_cols;

            let c_i = challenges[i];
            let s_0 = responses[RING_ROWS * i];
            let s_1 = responses[RING_ROWS * i + 1];

            let hp_i = hash_to_point(&keys[i]);

            // Row 0 (linkable): L = s*G + c*P, R = s*Hp(P) + c*I
            let l_0 = s_0 * g + c_i * keys[i];
            let r_0 = s_0 * hp_i + c_i * image_point;

            // Row 1 (commitment delta, not linkable): L = s*G + c*D
            let l_1 = s_1 * g + c_i * deltas[i];

            challenges[next] = round_hash(preimage, &key_image, &l_0, &r_0, &l_1);
        }

        // Close the loop at the real column.
        let c_real = challenges[real_index];
        responses[RING_ROWS * real_index] = alpha_0 - c_real * x;
        responses[RING_ROWS * real_index + 1] = alpha_1 - c_real * z;

        Ok(RingMlsag {
            key_image,
            challenge: challenges[0],
            responses,
        })
    }

    /// Verify this signature over `matrix` and `preimage`.
    pub fn verify(&self, preimage: &[u8; 32], matrix: &RingMatrix) -> Result<(), Error> {
        let n_cols = matrix.n_cols();

        if n_cols == 0 {
            return Err(Error::IndexOutOfBounds);
        }
        if matrix.deltas.len() != n_cols {
            return Err(Error::LengthMismatch(matrix.deltas.len(), n_cols));
        }
        if self.responses.len() != RING_ROWS * n_cols {
            return Err(Error::LengthMismatch(
                self.responses.len(),
                RING_ROWS * n_cols,
            ));
        }

        let g = B_BLINDING;

        let keys = decompress_row(&matrix.keys)?;
        let deltas = decompress_row(&matrix.deltas)?;
        let image_point = self
            .key_image
            .point
            .decompress()
            .ok_or(Error::InvalidKeyImage)?;

        let mut c = self.challenge;

        for i in 0..n_cols {
            let s_0 = self.responses[RING_ROWS * i];
            let s_1 = self.responses[RING_ROWS * i + 1];

            let hp_i = hash_to_point(&keys[i]);

            let l_0 = s_0 * g + c * keys[i];
            let r_0 = s_0 * hp_i + c * image_point;
            let l_1 = s_1 * g + c * deltas[i];

            c = round_hash(preimage, &self.key_image, &l_0, &r_0, &l_1);
        }

        if c == self.challenge {
            Ok(())
        } else {
            Err(Error::InvalidSignature)
        }
    }

    /// Flat wire encoding of the responses: `n_cols * RING_ROWS * 32` bytes.
    pub fn responses_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.responses.len() * 32);
        for s in &self.responses {
            out.extend_from_slice(s.as_bytes());
        }
        out
    }
}

fn decompress_row(row: &[CompressedRistretto]) -> Result<Vec<RistrettoPoint>, Error> {
    row.iter()
        .map(|p| p.decompress().ok_or(Error::InvalidCurvePoint))
        .collect()
}

fn round_hash(
    preimage: &[u8; 32],
    key_image: &KeyImage,
    l_0: &RistrettoPoint,
    r_0: &RistrettoPoint,
    l_1: &RistrettoPoint,
) -> Scalar {
    let mut hasher = Blake2b512::new();
    hasher.update(MLSAG_ROUND_HASH_DOMAIN_TAG);
    hasher.update(preimage);
    hasher.update(key_image.as_bytes());
    hasher.update(l_0.compress().as_bytes());
    hasher.update(r_0.compress().as_bytes());
    hasher.update(l_1.compress().as_bytes());
    Scalar::from_hash(hasher)
}
