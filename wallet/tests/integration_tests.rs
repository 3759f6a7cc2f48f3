//! End-to-end wallet flows against a fake node.

use std::{
    collections::HashMap,
    path::Path,
    sync::{Arc, Mutex},
};

use cloak_crypto::{
    box_encrypt, commit_sum,
    onetime_keys::create_stealth_payment,
    ring_signature::{KeyImage, RingMatrix, RingMlsag},
    verify_commit_sum, verify_range, CompressedCommitment, CompressedRistretto, Network, Scalar,
    StealthAddress,
};
use cloak_wallet::{
    builder::{fee_for_bytes, FEE_N_BYTE, N_COLS, N_ROWS},
    keys,
    ring::{MemoryDecoyPool, RingError},
    rpc::{NodeClient, PeerInfo},
    types::{CoinType, OutputMemo, Rct, SessionType, Vin},
    CancelFlag, EntityId, Transaction, Vout, WalletError, WalletFacade, WalletTx, WalletType,
};
use rand::{rngs::StdRng, RngCore, SeedableRng};
use tempfile::TempDir;

const TEST_MNEMONIC: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";
const TEST_PASSPHRASE: &str = "TREZOR";

/// A fake node: serves scripted outputs, records submissions.
#[derive(Clone, Default)]
struct MockNode {
    outputs: Arc<Mutex<HashMap<String, Vec<Vout>>>>,
    accept: Arc<Mutex<bool>>,
    submitted: Arc<Mutex<Vec<Transaction>>>,
}

impl MockNode {
    fn new() -> Self {
        let node = Self::default();
        *node.accept.lock().unwrap() = true;
        node
    }

    fn stage_outputs(&self, payment_id: &str, outputs: Vec<Vout>) {
        self.outputs
            .lock()
            .unwrap()
            .insert(payment_id.to_string(), outputs);
    }

    fn reject_submissions(&self) {
        *self.accept.lock().unwrap() = false;
    }

    fn submissions(&self) -> usize {
        self.submitted.lock().unwrap().len()
    }
}

impl NodeClient for MockNode {
    async fn peer_info(&self) -> Result<PeerInfo, WalletError> {
        Ok(PeerInfo {
            advertise: "127.0.0.1:7946".into(),
            block_height: 1,
            listening: "127.0.0.1:7946".into(),
            name: "mock".into(),
            version: "0".into(),
            client_id: "0".into(),
            public_key: String::new(),
            http_end_point: "127.0.0.1:7946".into(),
        })
    }

    async fn outputs_by_payment_id(&self, payment_id: &str) -> Result<Vec<Vout>, WalletError> {
        self.outputs
            .lock()
            .unwrap()
            .get(payment_id)
            .cloned()
            .ok_or_else(|| WalletError::Rpc("unknown payment id".into()))
    }

    async fn submit(&self, tx: &Transaction) -> Result<bool, WalletError> {
        self.submitted.lock().unwrap().push(tx.clone());
        Ok(*self.accept.lock().unwrap())
    }
}

/// Craft an on-chain output paying `amount` to `address`.
fn craft_output(
    address: &StealthAddress,
    amount: u64,
    memo: &str,
    rng: &mut StdRng,
) -> Vout {
    let blind = Scalar::random(rng);
    let payment = create_stealth_payment(address, &Scalar::random(rng)).unwrap();
    let note = OutputMemo {
        amount,
        blind: blind.to_bytes(),
        memo: memo.to_string(),
    };
    let sealed = box_encrypt(
        &address.scan_public.decompress().unwrap(),
        &bincode::serialize(&note).unwrap(),
        rng,
    )
    .unwrap();

    Vout {
        amount: 0,
        commitment: CompressedCommitment::new(amount, blind),
        ephemeral_key: payment.tx_public,
        locktime: 0,
        note: sealed,
        onetime_key: payment.onetime_public,
        script: None,
        coin_type: CoinType::Coin,
    }
}

fn decoy_pool(rng: &mut StdRng, count: usize) -> Vec<Transaction> {
    use curve25519_dalek::constants::RISTRETTO_BASEPOINT_POINT;
    (0..count)
        .map(|_| {
            let vout = (0..3)
                .map(|_| Vout {
                    amount: 0,
                    commitment: CompressedCommitment::new(rng.next_u64(), Scalar::random(rng)),
                    ephemeral_key: (Scalar::random(rng) * RISTRETTO_BASEPOINT_POINT).compress(),
                    locktime: 0,
                    note: Vec::new(),
                    onetime_key: (Scalar::random(rng) * RISTRETTO_BASEPOINT_POINT).compress(),
                    script: None,
                    coin_type: CoinType::Coin,
                })
                .collect();
            Transaction {
                txn_id: [0u8; 32],
                ver: 1,
                mix: N_COLS as u32,
                bp: Vec::new(),
                rct: Rct::default(),
                vin: Vin::default(),
                vout,
                id: EntityId::default(),
            }
        })
        .collect()
}

fn open_facade(
    data_dir: &Path,
    wallet_id: &str,
    node: MockNode,
    pool: Arc<MemoryDecoyPool>,
    cancel: CancelFlag,
) -> WalletFacade<MockNode, MemoryDecoyPool> {
    let store = cloak_wallet::open_store(data_dir, wallet_id, TEST_PASSPHRASE).unwrap();
    WalletFacade::new(store, node, pool, Network::Mainnet, cancel)
}

fn wallet_address(data_dir: &Path, wallet_id: &str) -> StealthAddress {
    let store = cloak_wallet::open_store(data_dir, wallet_id, TEST_PASSPHRASE).unwrap();
    let encoded = keys::last_key_set(&store).unwrap().stealth_address.clone();
    StealthAddress::decode(&encoded).unwrap().0
}

/// Receive `amount` into the wallet through the mock node.
async fn receive_into(
    facade: &WalletFacade<MockNode, MemoryDecoyPool>,
    node: &MockNode,
    address: &StealthAddress,
    amount: u64,
    payment_id: &str,
    rng: &mut StdRng,
) -> WalletTx {
    node.stage_outputs(payment_id, vec![craft_output(address, amount, "hi", rng)]);
    let session = facade.open_session(SessionType::Coin);
    facade
        .receive_payment(session.session_id, payment_id)
        .await
        .unwrap()
}

#[tokio::test]
async fn wallet_round_trip_is_deterministic() {
    let dir_a = TempDir::new().unwrap();
    let dir_b = TempDir::new().unwrap();

    let id_a =
        cloak_wallet::create_wallet(dir_a.path(), TEST_MNEMONIC, TEST_PASSPHRASE, Network::Mainnet)
            .unwrap();
    let id_b =
        cloak_wallet::create_wallet(dir_b.path(), TEST_MNEMONIC, TEST_PASSPHRASE, Network::Mainnet)
            .unwrap();

    // id_<hex> shape; ids themselves are random.
    for id in [&id_a, &id_b] {
        assert!(id.starts_with("id_"));
        assert!(id[3..].chars().all(|c| c.is_ascii_hexdigit()));
    }
    assert_ne!(id_a, id_b);

    // One address, derived deterministically from the mnemonic.
    let node = MockNode::new();
    let pool = Arc::new(MemoryDecoyPool::with_transactions(Vec::new()));
    let facade_a = open_facade(dir_a.path(), &id_a, node.clone(), pool.clone(), CancelFlag::new());
    let facade_b = open_facade(dir_b.path(), &id_b, node, pool, CancelFlag::new());

    let addrs_a = facade_a.addresses().unwrap();
    let addrs_b = facade_b.addresses().unwrap();
    assert_eq!(addrs_a.len(), 1);
    assert_eq!(addrs_a, addrs_b);
}

#[tokio::test]
async fn receive_decrypts_and_updates_balance() {
    let mut rng = StdRng::seed_from_u64(101);
    let dir = TempDir::new().unwrap();
    let id =
        cloak_wallet::create_wallet(dir.path(), TEST_MNEMONIC, TEST_PASSPHRASE, Network::Mainnet)
            .unwrap();
    let address = wallet_address(dir.path(), &id);

    let node = MockNode::new();
    let pool = Arc::new(MemoryDecoyPool::with_transactions(Vec::new()));
    let facade = open_facade(dir.path(), &id, node.clone(), pool, CancelFlag::new());

    let payment_id = hex::encode([7u8; 32]);
    let record = receive_into(&facade, &node, &address, 1_000_000_000, &payment_id, &mut rng).await;

    assert_eq!(record.wallet_type, WalletType::Receive);
    assert_eq!(record.balance, 1_000_000_000);
    assert_eq!(record.memo, "hi");
    assert_eq!(record.vout.len(), 1);
    assert_eq!(facade.available_balance().unwrap(), 1_000_000_000);
    assert_eq!(facade.count().unwrap(), 1);

    // A second receive of the same payment id is rejected.
    let session = facade.open_session(SessionType::Coin);
    let duplicate = facade.receive_payment(session.session_id, &payment_id).await;
    assert_eq!(
        duplicate,
        Err(WalletError::DuplicatePayment(payment_id.clone()))
    );
    assert!(facade.last_error(session.session_id).is_some());
}

#[tokio::test]
async fn payment_balances_and_self_verifies() {
    let mut rng = StdRng::seed_from_u64(102);
    let dir = TempDir::new().unwrap();
    let id =
        cloak_wallet::create_wallet(dir.path(), TEST_MNEMONIC, TEST_PASSPHRASE, Network::Mainnet)
            .unwrap();
    let address = wallet_address(dir.path(), &id);

    let node = MockNode::new();
    let pool = Arc::new(MemoryDecoyPool::with_transactions(decoy_pool(&mut rng, 40)));
    let facade = open_facade(dir.path(), &id, node.clone(), pool, CancelFlag::new());

    receive_into(&facade, &node, &address, 10_000_000_000, &hex::encode([1u8; 32]), &mut rng)
        .await;

    let recipient = address.encode(Network::Mainnet);
    let session = facade.open_session(SessionType::Coin);
    facade
        .stage_payment(session.session_id, &recipient, 3_000_000_000, "rent")
        .unwrap();

    let tx = facade.create_payment(session.session_id).await.unwrap();

    // Fee is the flat 6000-byte rate, exposed on the fee output.
    let fee = fee_for_bytes(FEE_N_BYTE);
    assert_eq!(fee, 72_000);
    assert_eq!(tx.vout.len(), 3);
    assert_eq!(tx.vout[0].amount, fee);
    assert_eq!(tx.vout[0].coin_type, CoinType::Fee);
    assert_eq!(tx.vout[1].amount, 0);
    assert_eq!(tx.vout[2].amount, 0);
    assert_eq!(tx.mix as usize, N_COLS);

    // The draft records change = balance - payment - fee.
    let draft = facade.session(session.session_id).unwrap().draft;
    assert_eq!(draft.balance, 10_000_000_000);
    assert_eq!(draft.change, 6_999_928_000);
    assert_eq!(draft.fee, fee);
    assert_eq!(draft.tx_id, tx.txn_id.to_vec());

    // Output commitments sum.
    let pcm_out: Vec<CompressedCommitment> = tx.vout.iter().map(|v| v.commitment).collect();
    let total = commit_sum(&pcm_out, &[]).unwrap();
    assert!(verify_commit_sum(&[total], &pcm_out));

    // The bulletproof covers the change commitment.
    verify_range(&tx.vout[2].commitment, &tx.bp).unwrap();

    // The persisted MLSAG verifies against the persisted matrix.
    let matrix = parse_matrix(&tx.rct.matrix);
    let signature = parse_signature(&tx);
    signature.verify(&tx.rct.preimage, &matrix).unwrap();

    // Locktime policy: fee locked ~21h, payment unlocked, change ~5min.
    assert!(tx.vout[0].locktime > tx.vout[2].locktime);
    assert_eq!(tx.vout[1].locktime, 0);
    assert!(tx.vout[0].script.as_deref().unwrap().contains("OP_CHECKLOCKTIMEVERIFY"));

    // Offsets interleave C and P per column.
    assert_eq!(tx.vin.offsets.len(), N_ROWS * N_COLS * 32);

    // Submit, then the new change is the whole balance.
    facade.send(session.session_id).await.unwrap();
    assert_eq!(node.submissions(), 1);
    assert_eq!(facade.available_balance().unwrap(), 6_999_928_000);
}

#[tokio::test]
async fn insufficient_funds_persists_nothing() {
    let mut rng = StdRng::seed_from_u64(103);
    let dir = TempDir::new().unwrap();
    let id =
        cloak_wallet::create_wallet(dir.path(), TEST_MNEMONIC, TEST_PASSPHRASE, Network::Mainnet)
            .unwrap();
    let address = wallet_address(dir.path(), &id);

    let node = MockNode::new();
    let pool = Arc::new(MemoryDecoyPool::with_transactions(decoy_pool(&mut rng, 10)));
    let facade = open_facade(dir.path(), &id, node.clone(), pool, CancelFlag::new());

    receive_into(&facade, &node, &address, 1_000_000_000, &hex::encode([2u8; 32]), &mut rng)
        .await;

    let recipient = address.encode(Network::Mainnet);
    let session = facade.open_session(SessionType::Coin);
    facade
        .stage_payment(session.session_id, &recipient, 2_000_000_000, "")
        .unwrap();

    let result = facade.create_payment(session.session_id).await;
    match result {
        Err(WalletError::InsufficientFunds {
            available,
            required,
        }) => {
            assert_eq!(available, 1_000_000_000);
            assert_eq!(required, 2_000_000_000 + fee_for_bytes(FEE_N_BYTE));
        }
        other => panic!("expected insufficient funds, got {other:?}"),
    }

    // The failure is recorded and nothing was persisted.
    let error = facade.last_error(session.session_id).unwrap();
    assert_eq!(error["success"], false);

    let store = cloak_wallet::open_store(dir.path(), &id, TEST_PASSPHRASE).unwrap();
    assert!(store.query::<Transaction>().unwrap().is_empty());
}

#[tokio::test]
async fn all_duplicate_decoys_fail_cleanly() {
    let mut rng = StdRng::seed_from_u64(104);
    let dir = TempDir::new().unwrap();
    let id =
        cloak_wallet::create_wallet(dir.path(), TEST_MNEMONIC, TEST_PASSPHRASE, Network::Mainnet)
            .unwrap();
    let address = wallet_address(dir.path(), &id);

    let node = MockNode::new();
    // Pool filled after the receive so every candidate equals the true input.
    let pool = Arc::new(MemoryDecoyPool::with_transactions(Vec::new()));
    let facade = open_facade(dir.path(), &id, node.clone(), pool.clone(), CancelFlag::new());

    let record = receive_into(
        &facade,
        &node,
        &address,
        5_000_000_000,
        &hex::encode([3u8; 32]),
        &mut rng,
    )
    .await;

    let mut poisoned = decoy_pool(&mut rng, 1);
    for v in poisoned[0].vout.iter_mut() {
        v.commitment = record.vout[0].commitment;
        v.onetime_key = record.vout[0].onetime_key;
    }
    pool.replace(poisoned);

    let recipient = address.encode(Network::Mainnet);
    let session = facade.open_session(SessionType::Coin);
    facade
        .stage_payment(session.session_id, &recipient, 1_000_000_000, "")
        .unwrap();

    let result = facade.create_payment(session.session_id).await;
    assert!(matches!(
        result,
        Err(WalletError::Ring(RingError::RetriesExhausted(_)))
    ));
    let store = cloak_wallet::open_store(dir.path(), &id, TEST_PASSPHRASE).unwrap();
    assert!(store.query::<Transaction>().unwrap().is_empty());
}

#[tokio::test]
async fn failed_send_rolls_back_both_rows() {
    let mut rng = StdRng::seed_from_u64(105);
    let dir = TempDir::new().unwrap();
    let id =
        cloak_wallet::create_wallet(dir.path(), TEST_MNEMONIC, TEST_PASSPHRASE, Network::Mainnet)
            .unwrap();
    let address = wallet_address(dir.path(), &id);

    let node = MockNode::new();
    let pool = Arc::new(MemoryDecoyPool::with_transactions(decoy_pool(&mut rng, 40)));
    let facade = open_facade(dir.path(), &id, node.clone(), pool, CancelFlag::new());

    receive_into(&facade, &node, &address, 10_000_000_000, &hex::encode([4u8; 32]), &mut rng)
        .await;

    let recipient = address.encode(Network::Mainnet);
    let session = facade.open_session(SessionType::Coin);
    facade
        .stage_payment(session.session_id, &recipient, 3_000_000_000, "")
        .unwrap();
    facade.create_payment(session.session_id).await.unwrap();

    node.reject_submissions();
    let result = facade.send(session.session_id).await;
    assert!(matches!(result, Err(WalletError::Rpc(_))));
    assert!(facade.last_error(session.session_id).is_some());

    // No Transaction or WalletTx row remains for the send session.
    let store = cloak_wallet::open_store(dir.path(), &id, TEST_PASSPHRASE).unwrap();
    assert!(store
        .query::<Transaction>()
        .unwrap()
        .iter()
        .all(|t| t.id != session.session_id));
    assert!(store
        .query::<WalletTx>()
        .unwrap()
        .iter()
        .all(|t| t.id != session.session_id));

    // The receive record is untouched.
    assert_eq!(store.query::<WalletTx>().unwrap().len(), 1);
}

#[tokio::test]
async fn cancellation_interrupts_the_readiness_wait() {
    let mut rng = StdRng::seed_from_u64(106);
    let dir = TempDir::new().unwrap();
    let id =
        cloak_wallet::create_wallet(dir.path(), TEST_MNEMONIC, TEST_PASSPHRASE, Network::Mainnet)
            .unwrap();
    let address = wallet_address(dir.path(), &id);

    let node = MockNode::new();
    let pool = Arc::new(MemoryDecoyPool::new());
    pool.set_downloading();
    let cancel = CancelFlag::new();
    let facade = open_facade(dir.path(), &id, node.clone(), pool, cancel.clone());

    receive_into(&facade, &node, &address, 1_000_000_000, &hex::encode([5u8; 32]), &mut rng)
        .await;

    let recipient = address.encode(Network::Mainnet);
    let session = facade.open_session(SessionType::Coin);
    facade
        .stage_payment(session.session_id, &recipient, 100, "")
        .unwrap();

    cancel.cancel();
    let result = facade.create_payment(session.session_id).await;
    assert_eq!(result, Err(WalletError::Cancelled));
}

fn parse_matrix(bytes: &[u8]) -> RingMatrix {
    assert_eq!(bytes.len(), N_ROWS * N_COLS * 32);
    let point = |i: usize| {
        CompressedRistretto::from_slice(&bytes[i * 32..(i + 1) * 32]).expect("32-byte chunk")
    };
    RingMatrix {
        keys: (0..N_COLS).map(point).collect(),
        deltas: (N_COLS..2 * N_COLS).map(point).collect(),
    }
}

fn parse_signature(tx: &Transaction) -> RingMlsag {
    let challenge: Option<Scalar> = Scalar::from_canonical_bytes(tx.rct.challenge).into();
    RingMlsag {
        key_image: KeyImage::try_from(&tx.vin.key_image[..]).unwrap(),
        challenge: challenge.unwrap(),
        responses: tx
            .rct
            .responses
            .chunks(32)
            .map(|chunk| {
                let mut bytes = [0u8; 32];
                bytes.copy_from_slice(chunk);
                let scalar: Option<Scalar> = Scalar::from_canonical_bytes(bytes).into();
                scalar.unwrap()
            })
            .collect(),
    }
}
