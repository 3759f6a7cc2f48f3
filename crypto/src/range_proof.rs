// Copyright (c) 2019-2025 The Cloak Foundation

//! Bulletproof range proofs over single Pedersen commitments.

use bulletproofs::{BulletproofGens, RangeProof};
use curve25519_dalek::scalar::Scalar;
use merlin::Transcript;
use once_cell::sync::Lazy;

use crate::{
    commitment::CompressedCommitment, domain_separators::RANGE_PROOF_DOMAIN_TAG,
    generators::generators, Error,
};

/// Committed values must lie in `[0, 2^64)`.
pub const RANGE_PROOF_BITS: usize = 64;

static BP_GENS: Lazy<BulletproofGens> = Lazy::new(|| BulletproofGens::new(RANGE_PROOF_BITS, 1));

/// Prove that `value` lies in `[0, 2^64)` under blinding `blinding`.
///
/// Returns the serialised proof and the commitment it opens, which equals
/// `commit(value, blinding)` under the crate generators.
pub fn prove_range(value: u64, blinding: &Scalar) -> Result<(Vec<u8>, CompressedCommitment), Error> {
    let mut transcript = Transcript::new(RANGE_PROOF_DOMAIN_TAG);
    let (proof, committed) = RangeProof::prove_single(
        &BP_GENS,
        &generators(),
        &mut transcript,
        value,
        blinding,
        RANGE_PROOF_BITS,
    )
    .map_err(|_e| Error::RangeProofFailed)?;

    Ok((proof.to_bytes(), CompressedCommitment::from(committed)))
}

/// Verify a serialised range proof against a commitment.
pub fn verify_range(commitment: &CompressedCommitment, proof: &[u8]) -> Result<(), Error> {
    let proof = RangeProof::from_bytes(proof).map_err(|_e| Error::RangeProofFailed)?;
    let mut transcript = Transcript::new(RANGE_PROOF_DOMAIN_TAG);
    proof
        .verify_single(
            &BP_GENS,
            &generators(),
            &mut transcript,
            &commitment.point,
            RANGE_PROOF_BITS,
        )
        .map_err(|_e| Error::RangeProofFailed)
}
