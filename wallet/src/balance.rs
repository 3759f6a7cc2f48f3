//! Balance computation over the stored transaction history.
//!
//! The wallet runs a single-UTXO chain of change: after any send, the only
//! spendable input is that send's change output. Before the first send,
//! everything received is spendable. This is a deliberate model choice,
//! not a general UTXO balance.

use cloak_crypto::Scalar;

use crate::{
    scanner::decrypt_note,
    storage::EncryptedStore,
    types::{BalanceSheet, WalletTx, WalletType},
    WalletError,
};

/// Index of the change output in a send's three outputs.
pub const CHANGE_INDEX: usize = 2;

/// The spendable balance.
///
/// Sum of decrypted receives, unless a send exists; then the last send's
/// change output is the whole balance.
pub fn available_balance(store: &EncryptedStore, scan: &Scalar) -> Result<u64, WalletError> {
    let transactions: Vec<WalletTx> = store.query()?;

    let mut received: u64 = 0;
    let mut last_change: Option<u64> = None;

    for tx in &transactions {
        match tx.wallet_type {
            WalletType::Receive => {
                received = received.saturating_add(decrypted_total(tx, scan));
            }
            WalletType::Send => {
                if let Some(change_out) = tx.vout.get(CHANGE_INDEX) {
                    if let Ok(memo) = decrypt_note(change_out, scan) {
                        last_change = Some(memo.amount);
                    }
                }
            }
        }
    }

    Ok(last_change.unwrap_or(received))
}

/// Sum of `Change` over records sent from `address`.
pub fn total_amount(store: &EncryptedStore, address: &str) -> Result<u64, WalletError> {
    let transactions: Vec<WalletTx> = store.query()?;
    Ok(transactions
        .iter()
        .filter(|tx| tx.sender_address == address)
        .map(|tx| tx.change)
        .fold(0u64, u64::saturating_add))
}

/// Number of stored wallet transactions.
pub fn count(store: &EncryptedStore) -> Result<usize, WalletError> {
    Ok(store.query::<WalletTx>()?.len())
}

/// Fold the history into display rows with a running balance.
pub fn history(store: &EncryptedStore, scan: &Scalar) -> Result<Vec<BalanceSheet>, WalletError> {
    let transactions: Vec<WalletTx> = store.query()?;
    let mut sheet = Vec::with_capacity(transactions.len());
    let mut balance: u64 = 0;

    for tx in &transactions {
        match tx.wallet_type {
            WalletType::Receive => {
                let money_in = decrypted_total(tx, scan);
                balance = balance.saturating_add(money_in);
                sheet.push(BalanceSheet {
                    date_time: tx.date_time,
                    memo: tx.memo.clone(),
                    money_in,
                    money_out: 0,
                    balance,
                });
            }
            WalletType::Send => {
                let money_out = balance.saturating_sub(tx.change).saturating_sub(tx.fee);
                balance = balance
                    .saturating_sub(money_out)
                    .saturating_sub(tx.fee);
                sheet.push(BalanceSheet {
                    date_time: tx.date_time,
                    memo: tx.memo.clone(),
                    money_in: 0,
                    money_out,
                    balance,
                });
            }
        }
    }

    Ok(sheet)
}

fn decrypted_total(tx: &WalletTx, scan: &Scalar) -> u64 {
    tx.vout
        .iter()
        .filter_map(|v| decrypt_note(v, scan).ok())
        .map(|memo| memo.amount)
        .fold(0u64, u64::saturating_add)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CoinType, EntityId, OutputMemo, Vout};
    use cloak_crypto::{box_encrypt, CompressedCommitment, CompressedRistretto};
    use curve25519_dalek::constants::RISTRETTO_BASEPOINT_POINT;
    use rand::{rngs::StdRng, SeedableRng};
    use tempfile::TempDir;

    fn sealed_vout(amount: u64, scan: &Scalar, rng: &mut StdRng) -> Vout {
        let blind = Scalar::random(rng);
        let note = OutputMemo {
            amount,
            blind: blind.to_bytes(),
            memo: String::new(),
        };
        Vout {
            amount: 0,
            commitment: CompressedCommitment::new(amount, blind),
            ephemeral_key: CompressedRistretto::default(),
            locktime: 0,
            note: box_encrypt(
                &(scan * RISTRETTO_BASEPOINT_POINT),
                &bincode::serialize(&note).unwrap(),
                rng,
            )
            .unwrap(),
            onetime_key: CompressedRistretto::default(),
            script: None,
            coin_type: CoinType::Coin,
        }
    }

    fn receive(amount: u64, scan: &Scalar, rng: &mut StdRng) -> WalletTx {
        let mut tx = WalletTx::new(EntityId::random(rng), WalletType::Receive);
        tx.balance = amount;
        tx.vout = vec![sealed_vout(amount, scan, rng)];
        tx
    }

    fn send(change: u64, fee: u64, scan: &Scalar, rng: &mut StdRng) -> WalletTx {
        let mut tx = WalletTx::new(EntityId::random(rng), WalletType::Send);
        tx.change = change;
        tx.fee = fee;
        tx.sender_address = "sender".into();
        tx.vout = vec![
            sealed_vout(fee, scan, rng),
            sealed_vout(0, scan, rng),
            sealed_vout(change, scan, rng),
        ];
        tx
    }

    fn test_store() -> (TempDir, EncryptedStore) {
        let dir = TempDir::new().unwrap();
        let store = EncryptedStore::create(&dir.path().join("w.cloak"), "pw").unwrap();
        (dir, store)
    }

    #[test]
    fn balance_is_received_before_any_send() {
        let mut rng = StdRng::seed_from_u64(81);
        let scan = Scalar::random(&mut rng);
        let (_dir, store) = test_store();

        store.insert(&receive(1_000_000_000, &scan, &mut rng)).unwrap();
        store.insert(&receive(500, &scan, &mut rng)).unwrap();

        assert_eq!(available_balance(&store, &scan).unwrap(), 1_000_000_500);
    }

    #[test]
    fn balance_is_last_change_after_send() {
        let mut rng = StdRng::seed_from_u64(82);
        let scan = Scalar::random(&mut rng);
        let (_dir, store) = test_store();

        store.insert(&receive(10_000_000_000, &scan, &mut rng)).unwrap();
        store
            .insert(&send(6_999_928_000, 72_000, &scan, &mut rng))
            .unwrap();

        assert_eq!(available_balance(&store, &scan).unwrap(), 6_999_928_000);
    }

    #[test]
    fn history_folds_in_and_out() {
        let mut rng = StdRng::seed_from_u64(83);
        let scan = Scalar::random(&mut rng);
        let (_dir, store) = test_store();

        store.insert(&receive(10_000_000_000, &scan, &mut rng)).unwrap();
        store
            .insert(&send(6_999_928_000, 72_000, &scan, &mut rng))
            .unwrap();

        let sheet = history(&store, &scan).unwrap();
        assert_eq!(sheet.len(), 2);
        assert_eq!(sheet[0].money_in, 10_000_000_000);
        assert_eq!(sheet[0].balance, 10_000_000_000);
        // money out = previous balance - change - fee = the payment.
        assert_eq!(sheet[1].money_out, 3_000_000_000);
        assert_eq!(sheet[1].balance, 6_999_928_000);
    }

    #[test]
    fn total_amount_sums_change_per_sender() {
        let mut rng = StdRng::seed_from_u64(84);
        let scan = Scalar::random(&mut rng);
        let (_dir, store) = test_store();

        store.insert(&send(100, 1, &scan, &mut rng)).unwrap();
        store.insert(&send(250, 1, &scan, &mut rng)).unwrap();

        assert_eq!(total_amount(&store, "sender").unwrap(), 350);
        assert_eq!(total_amount(&store, "other").unwrap(), 0);
        assert_eq!(count(&store).unwrap(), 2);
    }

    #[test]
    fn empty_wallet_has_zero_balance() {
        let mut rng = StdRng::seed_from_u64(85);
        let scan = Scalar::random(&mut rng);
        let (_dir, store) = test_store();
        assert_eq!(available_balance(&store, &scan).unwrap(), 0);
        assert!(history(&store, &scan).unwrap().is_empty());
    }
}
