//! End-to-end integration tests for the Airlock protocol.
//!
//! These tests carry a transaction across the air gap the way the two
//! devices would: composed on the hot side, shown as QR text, scanned by
//! the cold side, reviewed, signed, shown back, scanned by the hot side and
//! broadcast. Along the way they poke at the things that must never happen:
//! a damaged frame being trusted, a key being used twice at once, a
//! cancelled signature leaving the key in memory.
//!
//! Each test builds its own storage and custodian. No shared state.

use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc as std_mpsc, Arc};
use std::time::Duration;

use alloy_primitives::{keccak256, Address, B256, U256};
use bip32::{DerivationPath, XPrv};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use zeroize::Zeroizing;

use airlock_protocol::codec::{self, DecodeError, QrPayload};
use airlock_protocol::config::{ProtocolConfig, STORAGE_KEY_PRIVATE_KEY};
use airlock_protocol::crypto::frame_checksum;
use airlock_protocol::device::{Device, ScanStatus};
use airlock_protocol::presenter::{summarize, ReviewPolicy, Warning};
use airlock_protocol::transaction::{
    signing_hash, SigningEngine, Transaction, TransactionBuilder, UnsignedTransaction,
};
use airlock_protocol::transfer::{
    drive_cold, drive_hot, scan_channel, ColdSession, HotSession, RecordingBroadcaster,
    ScanEvent, StateKind, TransferError,
};
use airlock_protocol::vault::{
    EncryptedFileStorage, KeyCustodian, KeyError, MemoryStorage, SecureStorage, StorageError,
};

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

const ONE_ETHER: u128 = 1_000_000_000_000_000_000;

fn recipient() -> Address {
    Address::repeat_byte(0x35)
}

fn one_ether_transfer() -> UnsignedTransaction {
    TransactionBuilder::legacy(1)
        .to(recipient())
        .value(U256::from(ONE_ETHER))
        .nonce(0)
        .gas_price(20_000_000_000)
        .build()
        .expect("valid transfer")
}

fn provisioned(storage: Arc<dyn SecureStorage>) -> Arc<KeyCustodian> {
    let custodian = KeyCustodian::init(storage);
    let wallet = custodian.generate().expect("entropy");
    custodian
        .store(&wallet.key_ref, &wallet.mnemonic)
        .expect("store wallet");
    custodian
}

fn qr_texts(tx: Transaction, capacity: usize) -> Vec<String> {
    codec::encode(&tx, capacity)
        .expect("encode")
        .iter()
        .map(QrPayload::to_qr_string)
        .collect()
}

/// Storage whose private-key reads block until the test lets them through.
/// Lets a test hold a `sign` call in the middle of its critical section.
struct SlowStorage {
    inner: MemoryStorage,
    armed: AtomicBool,
    entered: mpsc::UnboundedSender<()>,
    release: Mutex<std_mpsc::Receiver<()>>,
}

impl SlowStorage {
    fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<()>, std_mpsc::Sender<()>) {
        let (entered_tx, entered_rx) = mpsc::unbounded_channel();
        let (release_tx, release_rx) = std_mpsc::channel();
        let storage = Arc::new(Self {
            inner: MemoryStorage::new(),
            armed: AtomicBool::new(false),
            entered: entered_tx,
            release: Mutex::new(release_rx),
        });
        (storage, entered_rx, release_tx)
    }

    fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }

    fn disarm(&self) {
        self.armed.store(false, Ordering::SeqCst);
    }
}

impl SecureStorage for SlowStorage {
    fn put(&self, name: &str, value: &[u8]) -> Result<(), StorageError> {
        self.inner.put(name, value)
    }

    fn get(&self, name: &str) -> Result<Option<Zeroizing<Vec<u8>>>, StorageError> {
        if name == STORAGE_KEY_PRIVATE_KEY && self.armed.load(Ordering::SeqCst) {
            let _ = self.entered.send(());
            let _ = self.release.lock().recv();
        }
        self.inner.get(name)
    }

    fn delete(&self, name: &str) -> Result<(), StorageError> {
        self.inner.delete(name)
    }

    fn contains(&self, name: &str) -> Result<bool, StorageError> {
        self.inner.contains(name)
    }
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn one_ether_transfer_reviews_clean() {
    let tx = one_ether_transfer();
    let decoded = codec::decode_strings(&qr_texts(Transaction::Unsigned(tx.clone()), 512))
        .expect("decode");
    let Transaction::Unsigned(decoded) = decoded else {
        panic!("expected an unsigned request");
    };

    let summary = summarize(&decoded, &ReviewPolicy::default());
    assert!(summary.warnings.is_empty(), "{:?}", summary.warnings);
    assert_eq!(summary.amount, U256::from(ONE_ETHER));
    assert_eq!(summary.amount_ether, "1");
    assert_eq!(decoded, tx);
}

#[test]
fn fifty_bytes_of_calldata_warns() {
    let mut tx = one_ether_transfer();
    tx.data = (0..50).collect();
    tx.gas_limit = 60_000;

    let decoded = codec::decode_strings(&qr_texts(Transaction::Unsigned(tx), 512)).unwrap();
    let summary = summarize(decoded.unsigned(), &ReviewPolicy::default());
    assert!(summary
        .warnings
        .contains(&Warning::NonEmptyData { len: 50 }));
}

#[test]
fn unknown_version_sends_cold_session_to_error() {
    let custodian = provisioned(Arc::new(MemoryStorage::new()));
    let mut session = ColdSession::new(SigningEngine::new(custodian), ProtocolConfig::default());

    // A well-formed frame with a correct checksum, from a future protocol.
    let body = b"from the future";
    let mut frame = vec![0x09];
    frame.extend_from_slice(&[0x11; 16]);
    frame.extend_from_slice(&0u16.to_be_bytes());
    frame.extend_from_slice(&1u16.to_be_bytes());
    frame.extend_from_slice(&(body.len() as u16).to_be_bytes());
    let checksum = frame_checksum(&frame, body);
    frame.extend_from_slice(body);
    frame.extend_from_slice(&checksum);

    let err = session.feed_frame(&hex::encode_upper(frame)).unwrap_err();
    assert_eq!(err, TransferError::Decode(DecodeError::UnsupportedVersion(0x09)));
    assert_eq!(session.kind(), StateKind::Error);
    assert!(session.summary().is_none());
}

#[test]
fn generated_mnemonic_rederives_the_same_wallet() {
    let custodian = KeyCustodian::init(Arc::new(MemoryStorage::new()));
    let wallet = custodian.generate().unwrap();
    assert_eq!(wallet.mnemonic.split_whitespace().count(), 24);

    // Standard derivation, without going through the crate.
    let mnemonic = bip39::Mnemonic::parse(wallet.mnemonic.as_str()).unwrap();
    let seed = mnemonic.to_seed("");
    let path = DerivationPath::from_str("m/44'/60'/0'/0/0").unwrap();
    let child = XPrv::derive_from_path(seed, &path).unwrap();
    let verifying_key = child.private_key().verifying_key();

    let compressed = verifying_key.to_encoded_point(true);
    assert_eq!(compressed.as_bytes(), &wallet.key_ref.key_id()[..]);

    let uncompressed = verifying_key.to_encoded_point(false);
    let address = Address::from_slice(&keccak256(&uncompressed.as_bytes()[1..])[12..]);
    assert_eq!(address, wallet.address);
}

// ---------------------------------------------------------------------------
// Full round trips
// ---------------------------------------------------------------------------

#[tokio::test]
async fn hot_to_cold_to_hot_round_trip() {
    let custodian = provisioned(Arc::new(MemoryStorage::new()));
    let signer = custodian.load_address().unwrap().unwrap();
    let config = ProtocolConfig {
        chunk_capacity: 24,
        ..ProtocolConfig::default()
    };

    // Hot: compose and display.
    let mut hot = HotSession::new(config.clone()).with_expected_signer(signer);
    hot.begin_compose().unwrap();
    let mut request = one_ether_transfer();
    request.data = vec![0xde, 0xad, 0xbe, 0xef];
    request.gas_limit = 30_000;
    let shown: Vec<String> = hot
        .submit(request.clone())
        .unwrap()
        .iter()
        .map(QrPayload::to_qr_string)
        .collect();
    assert!(shown.len() > 1, "request should need several frames");

    // Cold: scan (out of order, with repeats), review, approve.
    let mut cold = ColdSession::new(SigningEngine::new(custodian), config);
    let (cold_tx, mut cold_rx) = scan_channel();
    for text in shown.iter().rev().chain(shown.iter()) {
        cold_tx.send(ScanEvent::Frame(text.clone())).await.unwrap();
    }
    cold_tx.send(ScanEvent::Approve).await.unwrap();
    let signed = drive_cold(&mut cold, &mut cold_rx).await.unwrap();
    assert_eq!(
        cold.summary(),
        None,
        "summary is gone once the request is signed"
    );
    let reply: Vec<String> = cold
        .frames()
        .unwrap()
        .iter()
        .map(QrPayload::to_qr_string)
        .collect();

    // Hot: scan the reply, verify, broadcast.
    let (hot_tx, mut hot_rx) = scan_channel();
    for text in &reply {
        hot_tx.send(ScanEvent::Frame(text.clone())).await.unwrap();
    }
    let broadcaster = RecordingBroadcaster::new();
    let tx_hash = drive_hot(&mut hot, &mut hot_rx, &broadcaster).await.unwrap();

    assert_eq!(tx_hash, signed.tx_hash());
    assert_eq!(broadcaster.sent(), vec![signed.raw_hex()]);
    assert_eq!(signed.unsigned(), &request);
    assert_eq!(hot.kind(), StateKind::Done);
    cold.complete().unwrap();
}

#[tokio::test]
async fn device_round_trip_over_encrypted_files() {
    let dir = tempfile::tempdir().unwrap();
    let storage = Arc::new(EncryptedFileStorage::open(dir.path(), [0x42; 32]).unwrap());
    let mut device = Device::new(storage, ProtocolConfig::default()).unwrap();

    let wallet = device.generate_wallet().unwrap();
    device
        .store_wallet(&wallet.mnemonic, &wallet.key_ref)
        .unwrap();
    drop(wallet);

    // A second device over the same directory sees the same wallet.
    let reopened = Arc::new(EncryptedFileStorage::open(dir.path(), [0x42; 32]).unwrap());
    let other = Device::new(reopened, ProtocolConfig::default()).unwrap();
    let address = device.load_address().unwrap().unwrap();
    assert_eq!(other.load_address().unwrap(), Some(address));

    let tx = one_ether_transfer();
    let mut last = ScanStatus::Ignored;
    for text in device
        .encode_for_display(&Transaction::Unsigned(tx.clone()))
        .unwrap()
    {
        last = device.feed_scan_frame(&text).unwrap();
    }
    assert!(matches!(last, ScanStatus::Decoded { .. }));

    let signed = device.approve_and_sign(&tx).await.unwrap();
    let recovered = signed
        .signature()
        .recover(&signing_hash(&tx))
        .unwrap()
        .address();
    assert_eq!(recovered, address);

    // Same key, same request, same bytes.
    let again = SigningEngine::new(other.custodian().clone()).sign(&tx).unwrap();
    assert_eq!(again.raw(), signed.raw());
}

#[test]
fn wrong_device_key_cannot_open_the_wallet() {
    let dir = tempfile::tempdir().unwrap();
    provisioned(Arc::new(
        EncryptedFileStorage::open(dir.path(), [0x01; 32]).unwrap(),
    ));

    let wrong = KeyCustodian::init(Arc::new(
        EncryptedFileStorage::open(dir.path(), [0x02; 32]).unwrap(),
    ));
    assert_eq!(
        wrong.sign(&B256::repeat_byte(7)).unwrap_err(),
        KeyError::AuthenticationFailed
    );
}

// ---------------------------------------------------------------------------
// Tamper detection
// ---------------------------------------------------------------------------

#[tokio::test]
async fn tampered_signed_reply_is_never_broadcast() {
    let custodian = provisioned(Arc::new(MemoryStorage::new()));
    let engine = SigningEngine::new(custodian);

    let mut hot = HotSession::new(ProtocolConfig::default());
    hot.submit(one_ether_transfer()).unwrap();
    hot.await_signed().unwrap();

    let signed = engine.sign(&one_ether_transfer()).unwrap();
    let mut bytes = codec::encode(&Transaction::Signed(signed), 512).unwrap()[0].to_bytes();
    // Flip one bit of the recipient inside the body.
    bytes[23 + 5] ^= 0x80;

    let (tx, mut rx) = scan_channel();
    tx.send(ScanEvent::Frame(hex::encode_upper(&bytes)))
        .await
        .unwrap();
    let broadcaster = RecordingBroadcaster::new();
    let err = drive_hot(&mut hot, &mut rx, &broadcaster).await.unwrap_err();

    assert_eq!(err, TransferError::Decode(DecodeError::ChecksumMismatch));
    assert!(broadcaster.sent().is_empty());
    assert_eq!(hot.kind(), StateKind::Error);
}

#[test]
fn every_single_byte_flip_of_a_multi_frame_transfer_is_caught() {
    let mut tx = one_ether_transfer();
    tx.data = vec![0x33; 300];
    tx.gas_limit = 90_000;
    let frames = codec::encode(&Transaction::Unsigned(tx), 128).unwrap();
    assert!(frames.len() >= 3);

    for (which, frame) in frames.iter().enumerate() {
        let bytes = frame.to_bytes();
        for pos in 0..bytes.len() {
            let mut damaged = bytes.clone();
            damaged[pos] ^= 0x01;
            // Header damage such as an index pushed past the count is
            // refused at parse time; everything else at reassembly.
            let result = QrPayload::from_bytes(&damaged).and_then(|bad| {
                let mut set = frames.clone();
                set[which] = bad;
                codec::decode(&set)
            });
            assert_eq!(
                result,
                Err(DecodeError::ChecksumMismatch),
                "frame {which} byte {pos}"
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Concurrency
// ---------------------------------------------------------------------------

#[test]
fn second_sign_while_first_is_pending_is_busy() {
    let (storage, mut entered, release) = SlowStorage::new();
    let custodian = provisioned(storage.clone());
    let public_key = custodian.public_key().unwrap();
    storage.arm();

    let digest = B256::repeat_byte(0xab);
    let first = {
        let custodian = custodian.clone();
        std::thread::spawn(move || custodian.sign(&digest))
    };
    entered.blocking_recv().unwrap();

    assert!(matches!(custodian.sign(&digest), Err(KeyError::Busy)));
    assert!(matches!(custodian.delete(), Err(KeyError::Busy)));

    release.send(()).unwrap();
    let signature = first.join().unwrap().unwrap();
    assert_eq!(signature.recover(&digest).unwrap(), public_key);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancel_while_signing_waits_for_the_key_to_be_released() {
    let (storage, mut entered, release) = SlowStorage::new();
    let custodian = provisioned(storage.clone());
    storage.arm();

    let mut cold = ColdSession::new(
        SigningEngine::new(custodian.clone()),
        ProtocolConfig::default(),
    );
    let (tx, mut rx) = scan_channel();
    for text in qr_texts(Transaction::Unsigned(one_ether_transfer()), 512) {
        tx.send(ScanEvent::Frame(text)).await.unwrap();
    }
    tx.send(ScanEvent::Approve).await.unwrap();

    let driver = tokio::spawn(async move {
        let result = drive_cold(&mut cold, &mut rx).await;
        (result, cold.kind())
    });

    entered.recv().await.unwrap();
    tx.send(ScanEvent::Frame("ignored while signing".into()))
        .await
        .unwrap();
    tx.send(ScanEvent::Cancel).await.unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(
        !driver.is_finished(),
        "driver must wait for the signing task before returning"
    );

    release.send(()).unwrap();
    let (result, kind) = driver.await.unwrap();
    assert_eq!(result.unwrap_err(), TransferError::UserCancelled);
    assert_eq!(kind, StateKind::Error);

    // The key lock was released with the task.
    storage.disarm();
    assert!(custodian.sign(&B256::repeat_byte(1)).is_ok());
}
