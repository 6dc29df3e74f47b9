//! # Secure Storage Capability
//!
//! The platform's encrypted-at-rest key/value store, reduced to the four
//! operations the custodian needs. Phones have a keychain or keystore for
//! this; a laptop acting as the cold device gets [`EncryptedFileStorage`].
//!
//! Entry names are a small fixed set (see `STORAGE_KEY_*` in
//! [`crate::config`]), so the trait is name-keyed rather than generic.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

use parking_lot::RwLock;
use thiserror::Error;
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::config::AES_KEY_LENGTH;
use crate::crypto::encryption::{open, seal, EncryptionError};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// The backing store could not be reached, read or written.
    #[error("secure storage unavailable: {0}")]
    Unavailable(String),

    /// The device refused to unlock the store: wrong passphrase, failed
    /// biometric, or a sealed entry that does not open under this device key.
    #[error("device authentication failed")]
    AuthenticationFailed,
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        Self::Unavailable(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Encrypted put/get/delete keyed by name.
pub trait SecureStorage: Send + Sync {
    fn put(&self, name: &str, value: &[u8]) -> Result<(), StorageError>;

    /// `Ok(None)` when the entry does not exist.
    fn get(&self, name: &str) -> Result<Option<Zeroizing<Vec<u8>>>, StorageError>;

    /// Removes the entry. Deleting a missing entry is not an error.
    fn delete(&self, name: &str) -> Result<(), StorageError>;

    fn contains(&self, name: &str) -> Result<bool, StorageError>;
}

/// Device authentication consulted before secrets are read.
///
/// Implementations map to whatever the platform offers: a PIN prompt, a
/// biometric check, or nothing at all.
pub trait AuthGate: Send + Sync {
    fn authenticate(&self, entry: &str) -> Result<(), StorageError>;
}

/// An [`AuthGate`] that says yes or no as told. Handy in tests and for
/// wiring a UI toggle.
#[derive(Debug, Default)]
pub struct StaticGate {
    deny: AtomicBool,
}

impl StaticGate {
    pub fn allowing() -> Self {
        Self::default()
    }

    pub fn set_denied(&self, denied: bool) {
        self.deny.store(denied, Ordering::SeqCst);
    }
}

impl AuthGate for StaticGate {
    fn authenticate(&self, _entry: &str) -> Result<(), StorageError> {
        if self.deny.load(Ordering::SeqCst) {
            Err(StorageError::AuthenticationFailed)
        } else {
            Ok(())
        }
    }
}

fn validate_name(name: &str) -> Result<(), StorageError> {
    let ok = !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'));
    if ok {
        Ok(())
    } else {
        Err(StorageError::Unavailable(format!(
            "invalid entry name {name:?}"
        )))
    }
}

// ---------------------------------------------------------------------------
// MemoryStorage
// ---------------------------------------------------------------------------

/// In-process storage. Values are held in zeroizing buffers and wiped when
/// overwritten, deleted or dropped.
///
/// Supports an optional [`AuthGate`] and an offline switch so that tests
/// can exercise the custodian's storage and authentication failure paths.
#[derive(Default)]
pub struct MemoryStorage {
    entries: RwLock<HashMap<String, Zeroizing<Vec<u8>>>>,
    gate: Option<Arc<dyn AuthGate>>,
    offline: AtomicBool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_gate(gate: Arc<dyn AuthGate>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::default()
        }
    }

    /// Makes every operation fail with [`StorageError::Unavailable`].
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<(), StorageError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(StorageError::Unavailable("storage offline".into()))
        } else {
            Ok(())
        }
    }
}

impl SecureStorage for MemoryStorage {
    fn put(&self, name: &str, value: &[u8]) -> Result<(), StorageError> {
        validate_name(name)?;
        self.check_online()?;
        self.entries
            .write()
            .insert(name.to_string(), Zeroizing::new(value.to_vec()));
        Ok(())
    }

    fn get(&self, name: &str) -> Result<Option<Zeroizing<Vec<u8>>>, StorageError> {
        validate_name(name)?;
        self.check_online()?;
        if let Some(gate) = &self.gate {
            gate.authenticate(name)?;
        }
        Ok(self.entries.read().get(name).cloned())
    }

    fn delete(&self, name: &str) -> Result<(), StorageError> {
        validate_name(name)?;
        self.check_online()?;
        self.entries.write().remove(name);
        Ok(())
    }

    fn contains(&self, name: &str) -> Result<bool, StorageError> {
        validate_name(name)?;
        self.check_online()?;
        Ok(self.entries.read().contains_key(name))
    }
}

// ---------------------------------------------------------------------------
// EncryptedFileStorage
// ---------------------------------------------------------------------------

/// One AES-256-GCM sealed file per entry, in a directory only the owner can
/// read.
///
/// The entry name is bound as associated data, so a file renamed onto
/// another entry's path does not open. A ciphertext that fails to open is
/// reported as [`StorageError::AuthenticationFailed`]: with a
/// passphrase-derived device key, that is what a wrong passphrase looks
/// like.
pub struct EncryptedFileStorage {
    dir: PathBuf,
    device_key: Zeroizing<[u8; AES_KEY_LENGTH]>,
    gate: Option<Arc<dyn AuthGate>>,
}

impl EncryptedFileStorage {
    /// Opens (creating if needed) a store in `dir`.
    pub fn open(dir: impl AsRef<Path>, device_key: [u8; AES_KEY_LENGTH]) -> Result<Self, StorageError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        #[cfg(unix)]
        {
            let mut perms = fs::metadata(&dir)?.permissions();
            perms.set_mode(0o700);
            fs::set_permissions(&dir, perms)?;
        }

        Ok(Self {
            dir,
            device_key: Zeroizing::new(device_key),
            gate: None,
        })
    }

    pub fn with_gate(mut self, gate: Arc<dyn AuthGate>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.sealed"))
    }
}

impl SecureStorage for EncryptedFileStorage {
    fn put(&self, name: &str, value: &[u8]) -> Result<(), StorageError> {
        validate_name(name)?;
        let sealed = seal(&self.device_key, value, name.as_bytes())
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;

        // Write-then-rename so a crash never leaves half an entry behind.
        let tmp = self.dir.join(format!(".{name}.tmp"));
        {
            let mut file = File::create(&tmp)?;
            file.write_all(&sealed)?;
            file.sync_all()?;
        }
        #[cfg(unix)]
        {
            let mut perms = fs::metadata(&tmp)?.permissions();
            perms.set_mode(0o600);
            fs::set_permissions(&tmp, perms)?;
        }
        fs::rename(&tmp, self.path(name))?;

        debug!(entry = name, "secure storage entry written");
        Ok(())
    }

    fn get(&self, name: &str) -> Result<Option<Zeroizing<Vec<u8>>>, StorageError> {
        validate_name(name)?;
        let sealed = match fs::read(self.path(name)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if let Some(gate) = &self.gate {
            gate.authenticate(name)?;
        }

        match open(&self.device_key, &sealed, name.as_bytes()) {
            Ok(plain) => Ok(Some(plain)),
            Err(EncryptionError::DecryptFailed) => {
                warn!(entry = name, "sealed entry did not open under this device key");
                Err(StorageError::AuthenticationFailed)
            }
            Err(e) => Err(StorageError::Unavailable(e.to_string())),
        }
    }

    fn delete(&self, name: &str) -> Result<(), StorageError> {
        validate_name(name)?;
        let path = self.path(name);
        let len = match fs::metadata(&path) {
            Ok(meta) => meta.len() as usize,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        // Overwrite in place before unlinking. Journaling filesystems and
        // SSD wear levelling may keep old blocks around regardless; the
        // ciphertext is useless without the device key either way.
        {
            let mut file = OpenOptions::new().write(true).open(&path)?;
            file.write_all(&vec![0u8; len])?;
            file.sync_all()?;
        }
        fs::remove_file(&path)?;

        debug!(entry = name, "secure storage entry wiped");
        Ok(())
    }

    fn contains(&self, name: &str) -> Result<bool, StorageError> {
        validate_name(name)?;
        Ok(self.path(name).exists())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn file_store() -> (EncryptedFileStorage, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = EncryptedFileStorage::open(dir.path().join("vault"), [7u8; 32]).unwrap();
        (store, dir)
    }

    #[test]
    fn memory_put_get_delete() {
        let store = MemoryStorage::new();
        assert_eq!(store.get("a.b").unwrap(), None);
        store.put("a.b", b"secret").unwrap();
        assert!(store.contains("a.b").unwrap());
        assert_eq!(&store.get("a.b").unwrap().unwrap()[..], b"secret");
        store.delete("a.b").unwrap();
        assert!(!store.contains("a.b").unwrap());
        store.delete("a.b").unwrap();
    }

    #[test]
    fn memory_offline_and_gate() {
        let gate = Arc::new(StaticGate::allowing());
        let store = MemoryStorage::with_gate(gate.clone());
        store.put("k", b"v").unwrap();

        gate.set_denied(true);
        assert_eq!(store.get("k").unwrap_err(), StorageError::AuthenticationFailed);
        gate.set_denied(false);
        assert!(store.get("k").unwrap().is_some());

        store.set_offline(true);
        assert!(matches!(store.put("k", b"v"), Err(StorageError::Unavailable(_))));
    }

    #[test]
    fn rejects_path_like_names() {
        let store = MemoryStorage::new();
        for bad in ["", ".hidden", "../escape", "a/b"] {
            assert!(store.put(bad, b"x").is_err(), "{bad:?}");
        }
    }

    #[test]
    fn file_roundtrip_is_encrypted_on_disk() {
        let (store, _dir) = file_store();
        store.put("airlock.wallet.mnemonic", b"abandon art").unwrap();

        let raw = fs::read(store.dir().join("airlock.wallet.mnemonic.sealed")).unwrap();
        assert!(!raw.windows(7).any(|w| w == b"abandon"));
        assert_eq!(
            &store.get("airlock.wallet.mnemonic").unwrap().unwrap()[..],
            b"abandon art"
        );
    }

    #[test]
    fn wrong_device_key_is_authentication_failure() {
        let (store, dir) = file_store();
        store.put("entry", b"value").unwrap();

        let other = EncryptedFileStorage::open(dir.path().join("vault"), [8u8; 32]).unwrap();
        assert_eq!(other.get("entry").unwrap_err(), StorageError::AuthenticationFailed);
    }

    #[test]
    fn swapped_entries_do_not_open() {
        let (store, _dir) = file_store();
        store.put("first", b"one").unwrap();
        fs::copy(store.dir().join("first.sealed"), store.dir().join("second.sealed")).unwrap();
        assert_eq!(store.get("second").unwrap_err(), StorageError::AuthenticationFailed);
    }

    #[test]
    fn file_delete_removes_entry() {
        let (store, _dir) = file_store();
        store.put("gone", b"soon").unwrap();
        store.delete("gone").unwrap();
        assert!(!store.contains("gone").unwrap());
        assert_eq!(store.get("gone").unwrap(), None);
        store.delete("gone").unwrap();
    }

    #[test]
    fn file_gate_is_consulted() {
        let (store, _dir) = file_store();
        let gate = Arc::new(StaticGate::allowing());
        let store = store.with_gate(gate.clone());
        store.put("x", b"y").unwrap();
        gate.set_denied(true);
        assert_eq!(store.get("x").unwrap_err(), StorageError::AuthenticationFailed);
    }
}
