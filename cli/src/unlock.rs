//! Passphrase to device key.
//!
//! The sealed storage wants 32 bytes of key material. We stretch the
//! operator's passphrase with Argon2id (default parameters: 19 MiB, two
//! passes) over a random salt kept next to the sealed files. Losing the
//! salt file is as bad as losing the passphrase.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use argon2::Argon2;
use rand::RngCore;
use zeroize::Zeroizing;

use airlock_protocol::config::AES_KEY_LENGTH;
use airlock_protocol::vault::{EncryptedFileStorage, SecureStorage};

pub const SALT_FILE: &str = "device.salt";
pub const SALT_LENGTH: usize = 16;

/// Subdirectory for the sealed entries.
const VAULT_DIR: &str = "vault";

fn salt_path(data_dir: &Path) -> PathBuf {
    data_dir.join(SALT_FILE)
}

/// Reads the device salt, creating it on first use.
pub fn load_or_create_salt(data_dir: &Path) -> Result<[u8; SALT_LENGTH]> {
    let path = salt_path(data_dir);
    if path.exists() {
        let raw = fs::read(&path).with_context(|| format!("failed to read {}", path.display()))?;
        let salt: [u8; SALT_LENGTH] = raw.as_slice().try_into().map_err(|_| {
            anyhow::anyhow!("{} is {} bytes, expected {SALT_LENGTH}", path.display(), raw.len())
        })?;
        return Ok(salt);
    }

    fs::create_dir_all(data_dir)
        .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;
    let mut salt = [0u8; SALT_LENGTH];
    rand::thread_rng().fill_bytes(&mut salt);
    fs::write(&path, salt).with_context(|| format!("failed to write {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o600))?;
    }

    tracing::info!(path = %path.display(), "device salt created");
    Ok(salt)
}

/// Argon2id over `passphrase` and `salt`.
pub fn derive_device_key(
    passphrase: &str,
    salt: &[u8; SALT_LENGTH],
) -> Result<Zeroizing<[u8; AES_KEY_LENGTH]>> {
    if passphrase.is_empty() {
        bail!("AIRLOCK_PASSPHRASE is empty");
    }
    let mut key = Zeroizing::new([0u8; AES_KEY_LENGTH]);
    Argon2::default()
        .hash_password_into(passphrase.as_bytes(), salt, key.as_mut())
        .map_err(|e| anyhow::anyhow!("argon2: {e}"))?;
    Ok(key)
}

/// Opens the sealed storage in `data_dir` with a key stretched from
/// `passphrase`.
pub fn open_storage(data_dir: &Path, passphrase: &str) -> Result<Arc<dyn SecureStorage>> {
    let salt = load_or_create_salt(data_dir)?;
    let key = derive_device_key(passphrase, &salt)?;
    let vault_dir = data_dir.join(VAULT_DIR);
    let storage = EncryptedFileStorage::open(&vault_dir, *key)
        .with_context(|| format!("failed to open sealed storage at {}", vault_dir.display()))?;
    Ok(Arc::new(storage))
}
