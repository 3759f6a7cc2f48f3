// Copyright (c) 2019-2025 The Cloak Foundation

//! Domain separation tags for the hash functions used in this crate.
//!
//! Every hash invocation is prefixed with one of these tags so that values
//! produced in one context can never be replayed in another.

/// Derives the Pedersen value generator `H` from nothing up its sleeve.
pub const VALUE_GENERATOR_DOMAIN_TAG: &str = "cloak_value_generator";

/// Hashing a public key to a second-group element (key images, ring rounds).
pub const HASH_TO_POINT_DOMAIN_TAG: &str = "cloak_hash_to_point";

/// The MLSAG per-column challenge hash.
pub const MLSAG_ROUND_HASH_DOMAIN_TAG: &str = "cloak_mlsag_round_hash";

/// Re-scaling a user blind into the output-side blind space.
pub const BLIND_SWITCH_DOMAIN_TAG: &str = "cloak_blind_switch";

/// The Diffie-Hellman shared-secret scalar of the stealth protocol.
pub const ONETIME_SHARED_SECRET_DOMAIN_TAG: &str = "cloak_onetime_shared_secret";

/// Stealth-address checksum bytes.
pub const STEALTH_CHECKSUM_DOMAIN_TAG: &str = "cloak_stealth_checksum";

/// HKDF info string for the sealed-box cipher key.
pub const SEALED_BOX_KEY_DOMAIN_TAG: &[u8] = b"cloak_sealed_box_key";

/// HKDF info string for the sealed-box nonce.
pub const SEALED_BOX_NONCE_DOMAIN_TAG: &[u8] = b"cloak_sealed_box_nonce";

/// Merlin transcript label for range proofs.
pub const RANGE_PROOF_DOMAIN_TAG: &[u8] = b"cloak_range_proof";
