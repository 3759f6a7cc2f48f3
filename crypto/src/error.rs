// Copyright (c) 2019-2025 The Cloak Foundation

//! Errors which can occur in the Cloak cryptographic primitives.

use displaydoc::Display;
use serde::{Deserialize, Serialize};

/// An error from a commitment, signature, stealth or sealed-box primitive.
#[derive(Clone, Debug, Deserialize, Display, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum Error {
    /// Incorrect length for array copy, provided `{0}`, required `{1}`.
    LengthMismatch(usize, usize),

    /// Index out of bounds
    IndexOutOfBounds,

    /// Invalid curve point
    InvalidCurvePoint,

    /// The signature was not able to be validated
    InvalidSignature,

    /// Failed to compress/decompress a KeyImage
    InvalidKeyImage,

    /// Value not conserved
    ValueNotConserved,

    /// Range proof generation or verification failed
    RangeProofFailed,

    /// Authenticated decryption failed
    DecryptFailed,

    /// Malformed stealth address
    InvalidAddress,
}

impl std::error::Error for Error {}
