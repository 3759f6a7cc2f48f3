//! Output scanning: which outputs are ours, and what do they hold.
//!
//! An output belongs to this wallet when the one-time key recovered from
//! its ephemeral key matches the output's `P`. The sealed note then opens
//! under the scan secret to reveal amount, blinding factor and memo.

use cloak_crypto::{box_decrypt, onetime_keys::recover_onetime_private_key, Scalar};
use curve25519_dalek::constants::RISTRETTO_BASEPOINT_POINT;
use zeroize::Zeroizing;

use crate::{
    types::{OutputMemo, Vout},
    WalletError,
};

/// Recover the spend key of `vout` if it belongs to this wallet.
pub fn uncover_output(
    vout: &Vout,
    scan: &Scalar,
    spend: &Scalar,
) -> Option<Zeroizing<Scalar>> {
    let ephemeral = vout.ephemeral_key.decompress()?;
    let onetime_private = Zeroizing::new(recover_onetime_private_key(&ephemeral, scan, spend));
    let candidate = (*onetime_private * RISTRETTO_BASEPOINT_POINT).compress();
    if candidate == vout.onetime_key {
        Some(onetime_private)
    } else {
        None
    }
}

/// Keep only the outputs whose one-time key this wallet controls.
pub fn scan_outputs(vouts: &[Vout], scan: &Scalar, spend: &Scalar) -> Vec<Vout> {
    vouts
        .iter()
        .filter(|v| uncover_output(v, scan, spend).is_some())
        .cloned()
        .collect()
}

/// Open an output's sealed note with the scan secret.
pub fn decrypt_note(vout: &Vout, scan: &Scalar) -> Result<OutputMemo, WalletError> {
    let plaintext = Zeroizing::new(box_decrypt(scan, &vout.note)?);
    Ok(bincode::deserialize(&plaintext)?)
}

/// The note's blinding factor as a scalar.
pub fn note_blind(memo: &OutputMemo) -> Result<Zeroizing<Scalar>, WalletError> {
    let scalar: Option<Scalar> = Scalar::from_canonical_bytes(memo.blind).into();
    scalar
        .map(Zeroizing::new)
        .ok_or_else(|| WalletError::CryptoVerify("note blind is not a canonical scalar".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CoinType;
    use cloak_crypto::{
        box_encrypt, onetime_keys::create_stealth_payment, CompressedCommitment, StealthAddress,
    };
    use rand::{rngs::StdRng, SeedableRng};

    fn make_output(
        amount: u64,
        memo: &str,
        address: &StealthAddress,
        rng: &mut StdRng,
    ) -> (Vout, Scalar) {
        let blind = Scalar::random(rng);
        let ephemeral = Scalar::random(rng);
        let payment = create_stealth_payment(address, &ephemeral).unwrap();
        let scan_public = address.scan_public.decompress().unwrap();

        let note = OutputMemo {
            amount,
            blind: blind.to_bytes(),
            memo: memo.to_string(),
        };
        let sealed = box_encrypt(&scan_public, &bincode::serialize(&note).unwrap(), rng).unwrap();

        (
            Vout {
                amount: 0,
                commitment: CompressedCommitment::new(amount, blind),
                ephemeral_key: payment.tx_public,
                locktime: 0,
                note: sealed,
                onetime_key: payment.onetime_public,
                script: None,
                coin_type: CoinType::Coin,
            },
            blind,
        )
    }

    fn wallet_keys(rng: &mut StdRng) -> (Scalar, Scalar, StealthAddress) {
        let spend = Scalar::random(rng);
        let scan = Scalar::random(rng);
        let address = StealthAddress::new(
            (spend * RISTRETTO_BASEPOINT_POINT).compress(),
            (scan * RISTRETTO_BASEPOINT_POINT).compress(),
        );
        (spend, scan, address)
    }

    #[test]
    fn scan_retains_only_our_outputs() {
        let mut rng = StdRng::seed_from_u64(61);
        let (spend, scan, address) = wallet_keys(&mut rng);
        let (_spend2, _scan2, other_address) = wallet_keys(&mut rng);

        let (ours, _) = make_output(1_000_000_000, "hi", &address, &mut rng);
        let (theirs, _) = make_output(5, "", &other_address, &mut rng);

        let retained = scan_outputs(&[ours.clone(), theirs], &scan, &spend);
        assert_eq!(retained.len(), 1);
        assert_eq!(retained[0].onetime_key, ours.onetime_key);
    }

    #[test]
    fn note_decrypts_to_amount_blind_memo() {
        let mut rng = StdRng::seed_from_u64(62);
        let (_spend, scan, address) = wallet_keys(&mut rng);
        let (vout, blind) = make_output(1_000_000_000, "hi", &address, &mut rng);

        let memo = decrypt_note(&vout, &scan).unwrap();
        assert_eq!(memo.amount, 1_000_000_000);
        assert_eq!(memo.memo, "hi");
        assert_eq!(*note_blind(&memo).unwrap(), blind);

        // The decrypted blind re-opens the commitment.
        assert_eq!(
            vout.commitment,
            CompressedCommitment::new(memo.amount, blind)
        );
    }

    #[test]
    fn wrong_scan_key_cannot_decrypt() {
        let mut rng = StdRng::seed_from_u64(63);
        let (_spend, _scan, address) = wallet_keys(&mut rng);
        let (vout, _) = make_output(7, "", &address, &mut rng);

        let stranger = Scalar::random(&mut rng);
        assert!(decrypt_note(&vout, &stranger).is_err());
    }

    #[test]
    fn uncovered_key_spends_the_output() {
        let mut rng = StdRng::seed_from_u64(64);
        let (spend, scan, address) = wallet_keys(&mut rng);
        let (vout, _) = make_output(9, "", &address, &mut rng);

        let onetime = uncover_output(&vout, &scan, &spend).unwrap();
        assert_eq!(
            (*onetime * RISTRETTO_BASEPOINT_POINT).compress(),
            vout.onetime_key
        );
    }
}
