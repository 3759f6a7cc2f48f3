// Copyright (c) 2019-2025 The Cloak Foundation

//! The dual-key stealth address: a spend public key and a scan public key,
//! base58-encoded with a network version byte and a checksum.

use blake2::{Blake2b512, Digest};
use curve25519_dalek::ristretto::CompressedRistretto;
use serde::{Deserialize, Serialize};

use crate::{domain_separators::STEALTH_CHECKSUM_DOMAIN_TAG, Error};

/// Length of the checksum appended to the address payload.
const CHECKSUM_LEN: usize = 4;

/// spend(32) + scan(32) + version(1) + checksum(4)
const ADDRESS_LEN: usize = 32 + 32 + 1 + CHECKSUM_LEN;

/// The network an address belongs to, encoded in its version byte.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub enum Network {
    /// The production network.
    #[default]
    Mainnet,
    /// The public test network.
    TestNet,
}

impl Network {
    fn version_byte(self) -> u8 {
        match self {
            Network::Mainnet => 0x2b,
            Network::TestNet => 0x74,
        }
    }

    fn from_version_byte(byte: u8) -> Result<Self, Error> {
        match byte {
            0x2b => Ok(Network::Mainnet),
            0x74 => Ok(Network::TestNet),
            _ => Err(Error::InvalidAddress),
        }
    }
}

/// A two-key stealth address.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct StealthAddress {
    /// The spend public key `B`.
    pub spend_public: CompressedRistretto,

    /// The scan public key `A`.
    pub scan_public: CompressedRistretto,
}

impl StealthAddress {
    /// Build an address from its two public keys.
    pub fn new(spend_public: CompressedRistretto, scan_public: CompressedRistretto) -> Self {
        Self {
            spend_public,
            scan_public,
        }
    }

    /// Encode as base58: `spend ‖ scan ‖ version ‖ checksum`.
    pub fn encode(&self, network: Network) -> String {
        let mut payload = Vec::with_capacity(ADDRESS_LEN);
        payload.extend_from_slice(self.spend_public.as_bytes());
        payload.extend_from_slice(self.scan_public.as_bytes());
        payload.push(network.version_byte());
        let check = checksum(&payload);
        payload.extend_from_slice(&check);
        bs58::encode(payload).into_string()
    }

    /// Decode a base58 address, validating length, checksum and version.
    pub fn decode(encoded: &str) -> Result<(Self, Network), Error> {
        let payload = bs58::decode(encoded)
            .into_vec()
            .map_err(|_e| Error::InvalidAddress)?;
        if payload.len() != ADDRESS_LEN {
            return Err(Error::LengthMismatch(payload.len(), ADDRESS_LEN));
        }

        let (body, check) = payload.split_at(ADDRESS_LEN - CHECKSUM_LEN);
        if checksum(body) != *check {
            return Err(Error::InvalidAddress);
        }

        let network = Network::from_version_byte(body[64])?;
        let spend_public =
            CompressedRistretto::from_slice(&body[..32]).map_err(|_e| Error::InvalidAddress)?;
        let scan_public =
            CompressedRistretto::from_slice(&body[32..64]).map_err(|_e| Error::InvalidAddress)?;

        // Both keys must decode to actual group elements.
        if spend_public.decompress().is_none() || scan_public.decompress().is_none() {
            return Err(Error::InvalidCurvePoint);
        }

        Ok((Self::new(spend_public, scan_public), network))
    }
}

fn checksum(payload: &[u8]) -> [u8; CHECKSUM_LEN] {
    let mut digest = Blake2b512::new();
    digest.update(STEALTH_CHECKSUM_DOMAIN_TAG);
    digest.update(payload);
    let hash = digest.finalize();
    let mut out = [0u8; CHECKSUM_LEN];
    out.copy_from_slice(&hash[..CHECKSUM_LEN]);
    out
}
