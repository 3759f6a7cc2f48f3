//! The confidential-transaction builder.
//!
//! Orchestrates a send: pick the spendable change output, assemble the
//! MLSAG ring, commit to fee, payment and change with blinds that balance,
//! prove the change in range, sign, self-verify everything, and persist
//! the finished transaction. Any failed self-check aborts the build.

use std::sync::Arc;

use chrono::{Duration, Utc};
use cloak_crypto::{
    blind_switch, box_encrypt, commit_sum,
    onetime_keys::create_stealth_payment,
    prove_range,
    ring_signature::{prepare_ring, RingMlsag, RING_ROWS},
    verify_commit_sum, verify_range, CompressedCommitment, Network, RistrettoPoint, Scalar,
    StealthAddress,
};
use curve25519_dalek::constants::RISTRETTO_BASEPOINT_POINT;
use rand::{rngs::OsRng, rngs::StdRng, RngCore, SeedableRng};
use zeroize::Zeroizing;

use crate::{
    balance,
    keys,
    ring::{assemble_ring, DecoyProvider},
    scanner::decrypt_note,
    session::{CancelFlag, Session, SessionStore},
    types::{
        CoinType, OutputMemo, Rct, SessionId, SessionType, Transaction, Vin, Vout, WalletTx,
        WalletType,
    },
    WalletError,
};

/// Ring width: anonymity-set size of every spend.
pub const N_COLS: usize = 22;

/// Ring matrix rows: one-time keys and commitment deltas.
pub const N_ROWS: usize = RING_ROWS;

/// Every transaction carries exactly fee, payment and change.
pub const N_OUTPUTS: usize = 3;

/// Nominal transaction size used for the flat fee.
pub const FEE_N_BYTE: u64 = 6000;

/// Atomic units per coin.
pub const ATOMIC_UNITS_PER_COIN: u64 = 1_000_000_000;

/// Fee rate: 1.2e-8 coin per byte, i.e. 12 atomic units per byte.
pub const FEE_ATOMIC_PER_BYTE: u64 = 12;

/// Fee outputs unlock 21 hours after the build.
const FEE_LOCK_HOURS: i64 = 21;

/// Change outputs unlock 5 minutes after the build.
const CHANGE_LOCK_MINUTES: i64 = 5;

/// Cadence of the pre-build wait on the decoy feed.
const READY_POLL_MS: u64 = 100;

/// The flat fee for a transaction of `n_bytes`.
pub fn fee_for_bytes(n_bytes: u64) -> u64 {
    n_bytes * FEE_ATOMIC_PER_BYTE
}

/// Builds, signs and submits confidential transactions for sessions.
pub struct TransactionBuilder<D> {
    sessions: Arc<SessionStore>,
    decoys: Arc<D>,
    network: Network,
    cancel: CancelFlag,
}

impl<D: DecoyProvider> TransactionBuilder<D> {
    /// A builder over the given session store and decoy feed.
    pub fn new(
        sessions: Arc<SessionStore>,
        decoys: Arc<D>,
        network: Network,
        cancel: CancelFlag,
    ) -> Self {
        Self {
            sessions,
            decoys,
            network,
            cancel,
        }
    }

    /// Stage the spend: select the output to consume and fill the draft's
    /// balance, fee, change and spending fields.
    ///
    /// Selection policy: among cached change slots that still cover
    /// payment plus fee, take the smallest.
    pub fn calculate_change(&self, session_id: SessionId) -> Result<Session, WalletError> {
        let session = self.sessions.expect(session_id)?;
        let store = session.store.clone();
        let (spend, scan) = keys::unlock(&store)?;
        let own_address = keys::own_stealth_address(&spend, &scan).encode(self.network);
        drop(spend);

        let payment = session.draft.payment;
        let fee = match session.session_type {
            SessionType::Coin => fee_for_bytes(FEE_N_BYTE),
            SessionType::Coinstake => 0,
        };
        let reward = match session.session_type {
            SessionType::Coinstake => session.draft.reward,
            SessionType::Coin => 0,
        };

        let required = payment
            .checked_add(fee)
            .ok_or_else(|| WalletError::Store("payment amount overflows".into()))?;

        let available = balance::available_balance(&store, &scan)?;
        if available < required {
            return Err(WalletError::InsufficientFunds {
                available,
                required,
            });
        }

        // Each stored transaction exposes one spendable slot: its first
        // output until a change amount is cached, its change output after.
        let transactions: Vec<WalletTx> = store.query()?;
        let mut candidates: Vec<(u64, Vout, Vec<Vout>)> = Vec::new();
        for tx in &transactions {
            let slot = if tx.change == 0 { 0 } else { balance::CHANGE_INDEX };
            if let Some(vout) = tx.vout.get(slot) {
                if let Ok(memo) = decrypt_note(vout, &scan) {
                    if memo.amount >= required {
                        candidates.push((memo.amount, vout.clone(), tx.vout.clone()));
                    }
                }
            }
        }

        let (_slot_amount, spending, source_vout) = candidates
            .into_iter()
            .min_by_key(|(amount, _, _)| *amount)
            .ok_or(WalletError::InsufficientFunds {
                available,
                required,
            })?;

        let mut updated = session;
        updated.draft.wallet_type = WalletType::Send;
        updated.draft.balance = available;
        updated.draft.fee = fee;
        updated.draft.reward = reward;
        updated.draft.change = available - payment - fee;
        updated.draft.spending = Some(spending);
        updated.draft.vout = source_vout;
        updated.draft.spent = available == payment;
        updated.draft.date_time = Utc::now();
        if updated.draft.sender_address.is_empty() {
            updated.draft.sender_address = own_address;
        }

        Ok(self.sessions.add_or_update(updated))
    }

    /// Build and self-verify the transaction for a staged session.
    pub async fn build(&self, session_id: SessionId) -> Result<Transaction, WalletError> {
        // The decoy feed must finish downloading first; only explicit
        // cancellation breaks the wait.
        while !self.decoys.is_ready() {
            if self.cancel.is_cancelled() {
                return Err(WalletError::Cancelled);
            }
            tokio::time::sleep(std::time::Duration::from_millis(READY_POLL_MS)).await;
        }

        let session = self.sessions.expect(session_id)?;
        let draft = session.draft.clone();
        let spending = draft.spending.clone().ok_or_else(|| {
            WalletError::Store("no spending output staged; calculate change first".into())
        })?;

        let (spend, scan) = keys::unlock(&session.store)?;

        let pool = self.decoys.snapshot();
        let ring = assemble_ring(&spending, &scan, &spend, &pool, N_COLS, &mut OsRng)?;

        let (fee, payment, change) = (draft.fee, draft.payment, draft.change);
        let outputs_total = fee
            .checked_add(payment)
            .and_then(|sum| sum.checked_add(change))
            .ok_or_else(|| WalletError::Store("output amounts overflow".into()))?;
        if ring.input_amount != outputs_total {
            return Err(WalletError::CryptoVerify(
                "input amount does not equal fee + payment + change".into(),
            ));
        }

        // Fresh blinds, re-scaled into the output blind space.
        let blind_fee = Zeroizing::new(blind_switch(fee, Scalar::random(&mut OsRng)));
        let blind_payment = Zeroizing::new(blind_switch(payment, Scalar::random(&mut OsRng)));
        let blind_change = Zeroizing::new(blind_switch(change, Scalar::random(&mut OsRng)));

        let pcm_out = vec![
            CompressedCommitment::new(fee, *blind_fee),
            CompressedCommitment::new(payment, *blind_payment),
            CompressedCommitment::new(change, *blind_change),
        ];

        let total = commit_sum(&pcm_out, &[])?;
        if !verify_commit_sum(&[total], &pcm_out) {
            return Err(WalletError::CryptoVerify(
                "output commitments do not sum".into(),
            ));
        }

        // Range-prove the change and check the proof before using it.
        let (bp, bp_commitment) = prove_range(change, &blind_change)?;
        if bp_commitment != pcm_out[2] {
            return Err(WalletError::CryptoVerify(
                "range proof commits to a different change output".into(),
            ));
        }
        verify_range(&pcm_out[2], &bp)?;

        let blinds = vec![
            *ring.input_blind,
            *blind_fee,
            *blind_payment,
            *blind_change,
        ];
        let (matrix, blind_sum) = prepare_ring(&ring.pk_in, &ring.pcm_in, &pcm_out, &blinds)?;
        let blind_sum = Zeroizing::new(blind_sum);

        let mut preimage = [0u8; 32];
        OsRng.fill_bytes(&mut preimage);
        let mut rand_seed = Zeroizing::new([0u8; 32]);
        OsRng.fill_bytes(rand_seed.as_mut_slice());
        let mut sign_rng = StdRng::from_seed(*rand_seed);

        let signature = RingMlsag::sign(
            &preimage,
            &matrix,
            &ring.onetime_private,
            &blind_sum,
            ring.index,
            &mut sign_rng,
        )?;
        signature.verify(&preimage, &matrix)?;

        // Column-major interleave of input commitments and one-time keys.
        let mut offsets = Vec::with_capacity(N_ROWS * N_COLS * 32);
        for i in 0..N_COLS {
            offsets.extend_from_slice(ring.pcm_in[i].as_bytes());
            offsets.extend_from_slice(ring.pk_in[i].as_bytes());
        }

        let own_address = keys::own_stealth_address(&spend, &scan);
        let own_scan_public: RistrettoPoint = *scan * RISTRETTO_BASEPOINT_POINT;

        let (recipient, recipient_network) = StealthAddress::decode(&draft.recipient_address)
            .map_err(|e| WalletError::Address(format!("recipient: {e}")))?;
        if recipient_network != self.network {
            return Err(WalletError::Address(
                "recipient address belongs to a different network".into(),
            ));
        }
        let recipient_scan_public = recipient
            .scan_public
            .decompress()
            .ok_or_else(|| WalletError::Address("recipient scan key is invalid".into()))?;

        let now = Utc::now();
        let fee_lock = (now + Duration::hours(FEE_LOCK_HOURS)).timestamp() as u32;
        let change_lock = (now + Duration::minutes(CHANGE_LOCK_MINUTES)).timestamp() as u32;

        // Fee output: amount in the clear for ordinary sends, reward in the
        // clear for coinstake.
        let (fee_exposed, fee_type) = match session.session_type {
            SessionType::Coin => (fee, CoinType::Fee),
            SessionType::Coinstake => (draft.reward, CoinType::Coinbase),
        };
        let fee_vout = seal_output(
            &own_address,
            &own_scan_public,
            fee_exposed,
            fee,
            &blind_fee,
            "",
            fee_lock,
            pcm_out[0],
            fee_type,
        )?;

        let (payment_exposed, payment_type) = match session.session_type {
            SessionType::Coin => (0, CoinType::Coin),
            SessionType::Coinstake => (payment, CoinType::Coinstake),
        };
        let payment_vout = seal_output(
            &recipient,
            &recipient_scan_public,
            payment_exposed,
            payment,
            &blind_payment,
            &draft.memo,
            0,
            pcm_out[1],
            payment_type,
        )?;

        let change_vout = seal_output(
            &own_address,
            &own_scan_public,
            0,
            change,
            &blind_change,
            "",
            change_lock,
            pcm_out[2],
            CoinType::Coin,
        )?;

        let rct = Rct {
            preimage,
            matrix: matrix.to_bytes(),
            challenge: signature.challenge.to_bytes(),
            responses: signature.responses_bytes(),
        };
        let vin = Vin {
            key_image: *signature.key_image.as_bytes(),
            offsets,
        };

        let mut tx = Transaction {
            txn_id: [0u8; 32],
            ver: 1,
            mix: N_COLS as u32,
            bp,
            rct,
            vin,
            vout: vec![fee_vout, payment_vout, change_vout],
            id: session_id,
        };
        tx.txn_id = tx.content_hash();

        session.store.insert(&tx)?;

        let mut updated = session;
        updated.draft.tx_id = tx.txn_id.to_vec();
        updated.draft.vout = tx.vout.clone();
        updated.draft.date_time = now;
        updated.store.update(&updated.draft)?;
        self.sessions.add_or_update(updated);

        tracing::debug!(txn_id = %hex::encode(tx.txn_id), "transaction built");
        Ok(tx)
    }

    /// Submit the session's built transaction to the node.
    ///
    /// On any failure the persisted transaction and wallet record are
    /// rolled back and the error is recorded on the session.
    pub async fn send<N: crate::rpc::NodeClient>(
        &self,
        session_id: SessionId,
        node: &N,
    ) -> Result<[u8; 32], WalletError> {
        let session = self.sessions.expect(session_id)?;
        let transactions: Vec<Transaction> = session.store.query()?;
        let tx = transactions
            .into_iter()
            .find(|t| t.id == session_id)
            .ok_or_else(|| WalletError::Store("no built transaction for session".into()))?;

        let outcome = match node.submit(&tx).await {
            Ok(true) => return Ok(tx.txn_id),
            Ok(false) => WalletError::Rpc("node rejected the transaction".into()),
            Err(e) => e,
        };

        self.roll_back_one(&session);
        self.sessions.set_last_error(session_id, &outcome);
        Err(outcome)
    }

    /// Delete the transaction and wallet record persisted for the session.
    fn roll_back_one(&self, session: &Session) {
        if let Err(e) = session.store.delete::<Transaction>(session.session_id) {
            tracing::warn!("rollback failed to delete transaction row: {e}");
        }
        if let Err(e) = session.store.delete::<WalletTx>(session.session_id) {
            tracing::warn!("rollback failed to delete wallet record: {e}");
        }
    }
}

/// Make one confidential output: fresh stealth keys, sealed note, script.
#[allow(clippy::too_many_arguments)]
fn seal_output(
    address: &StealthAddress,
    scan_public: &RistrettoPoint,
    exposed_amount: u64,
    note_amount: u64,
    blind: &Scalar,
    memo: &str,
    locktime: u32,
    commitment: CompressedCommitment,
    coin_type: CoinType,
) -> Result<Vout, WalletError> {
    let ephemeral = Zeroizing::new(Scalar::random(&mut OsRng));
    let payment = create_stealth_payment(address, &ephemeral)?;

    let note = OutputMemo {
        amount: note_amount,
        blind: blind.to_bytes(),
        memo: memo.to_string(),
    };
    let sealed = box_encrypt(scan_public, &bincode::serialize(&note)?, &mut OsRng)?;

    let script = if locktime > 0 {
        Some(format!("OP_PUSH {locktime} OP_CHECKLOCKTIMEVERIFY"))
    } else {
        None
    };

    Ok(Vout {
        amount: exposed_amount,
        commitment,
        ephemeral_key: payment.tx_public,
        locktime,
        note: sealed,
        onetime_key: payment.onetime_public,
        script,
        coin_type,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_fee_matches_rate() {
        // 1.2e-8 coin/byte at 10^9 atomic units per coin.
        assert_eq!(fee_for_bytes(FEE_N_BYTE), 72_000);
        assert_eq!(fee_for_bytes(0), 0);
        assert_eq!(fee_for_bytes(1), 12);
    }

    #[test]
    fn ring_shape_constants() {
        assert_eq!(N_COLS, 22);
        assert_eq!(N_ROWS, 2);
        assert_eq!(N_OUTPUTS, 3);
    }
}
