//! # Vault: Key Custody
//!
//! The cold device's safe. Everything that touches a private key lives
//! behind this module's narrow API, and the key itself never leaves.
//!
//! ## Architecture
//!
//! ```text
//! storage.rs    SecureStorage capability: memory and AES-GCM file backends
//! wallet.rs     WalletRecord, PrivateKeyRef, GeneratedWallet
//! custodian.rs  KeyCustodian: generate, store, sign, delete
//! ```
//!
//! ## Rules of the house
//!
//! 1. **Raw key bytes never cross the public API.** Callers get addresses,
//!    public keys and signatures. [`PrivateKeyRef`] is opaque on purpose.
//! 2. **Secrets are zeroized.** Every buffer holding a key or phrase is a
//!    `Zeroizing` wrapper, so it is wiped on drop, including on error paths.
//! 3. **One signer at a time.** Concurrent `sign` calls fail fast with
//!    [`KeyError::Busy`].
//! 4. **The address is derived, never stored.**

pub mod custodian;
pub mod storage;
pub mod wallet;

pub use custodian::{KeyCustodian, KeyError};
pub use storage::{AuthGate, EncryptedFileStorage, MemoryStorage, SecureStorage, StaticGate, StorageError};
pub use wallet::{GeneratedWallet, PrivateKeyRef, WalletRecord};
