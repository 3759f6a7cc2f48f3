// Copyright (c) 2019-2025 The Cloak Foundation

//! Cryptographic primitives for confidential Cloak transactions.
//!
//! Everything here is stateless: Pedersen commitments over Ristretto255,
//! Bulletproof range proofs, MLSAG ring signatures, dual-key stealth
//! addresses with one-time output keys, and the sealed box that carries an
//! output's amount, blinding factor and memo to its recipient.
//!
//! No operation panics on untrusted input; every fallible primitive returns
//! [`Error`].

pub mod domain_separators;
pub mod onetime_keys;
pub mod ring_signature;

mod commitment;
mod error;
mod generators;
mod range_proof;
mod sealed_box;
mod stealth_address;

pub use commitment::{
    blind_switch, commit_sum, verify_commit_sum, Commitment, CompressedCommitment,
};
pub use error::Error;
pub use generators::{generators, B_BLINDING};
pub use range_proof::{prove_range, verify_range, RANGE_PROOF_BITS};
pub use sealed_box::{box_decrypt, box_encrypt};
pub use stealth_address::{Network, StealthAddress};

pub use curve25519_dalek::{
    ristretto::{CompressedRistretto, RistrettoPoint},
    scalar::Scalar,
};
