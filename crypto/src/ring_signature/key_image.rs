// Copyright (c) 2019-2025 The Cloak Foundation

use curve25519_dalek::{
    constants::RISTRETTO_BASEPOINT_POINT, ristretto::CompressedRistretto, scalar::Scalar,
};
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use super::hash_to_point;
use crate::Error;

/// The "image" of a one-time private key `x`: `I = x * Hp(x * G)`.
///
/// The image is deterministic in the key, so a second spend of the same
/// output produces the same image and is caught, without revealing which
/// ring column was real.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize, Zeroize)]
pub struct KeyImage {
    /// The curve point corresponding to the key image.
    pub point: CompressedRistretto,
}

impl KeyImage {
    /// Compute the key image of a one-time private key.
    pub fn new(onetime_private: &Scalar) -> Self {
        let public = onetime_private * RISTRETTO_BASEPOINT_POINT;
        let hp = hash_to_point(&public);
        KeyImage {
            point: (onetime_private * hp).compress(),
        }
    }

    /// View the underlying encoding as an array of bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        self.point.as_bytes()
    }
}

impl TryFrom<&[u8]> for KeyImage {
    type Error = Error;

    fn try_from(src: &[u8]) -> Result<Self, Error> {
        if src.len() != 32 {
            return Err(Error::LengthMismatch(src.len(), 32));
        }
        let point = CompressedRistretto::from_slice(src).map_err(|_e| Error::InvalidKeyImage)?;
        Ok(Self { point })
    }
}

impl AsRef<[u8]> for KeyImage {
    fn as_ref(&self) -> &[u8] {
        &self.as_bytes()[..]
    }
}
