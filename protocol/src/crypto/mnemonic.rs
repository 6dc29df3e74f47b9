//! BIP-39 mnemonics and BIP-32/44 derivation of the wallet key.
//!
//! 256 bits of entropy -> 24 English words -> PBKDF2 seed (empty
//! passphrase) -> `m/44'/60'/0'/0/0` -> secp256k1 scalar. Any standard
//! Ethereum wallet given the same 24 words lands on the same address,
//! which is the whole point: the words are the backup.
//!
//! Derivation is crate-private. A phrase only ever becomes a usable key
//! inside [`KeyCustodian`](crate::vault::KeyCustodian), under its lock:
//!
//! ```compile_fail
//! use airlock_protocol::crypto::mnemonic;
//! let derived = mnemonic::from_phrase("abandon abandon art").unwrap();
//! let _ = derived.key().sign_digest(&Default::default());
//! ```

use std::fmt;
use std::str::FromStr;

use bip32::{DerivationPath, XPrv};
use bip39::Mnemonic;
use thiserror::Error;
use zeroize::Zeroizing;

use crate::config::{DERIVATION_PATH, ENTROPY_LENGTH};
use crate::crypto::keys::{KeyMaterialError, WalletKey};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MnemonicError {
    #[error("mnemonic is not a valid BIP-39 English phrase")]
    InvalidPhrase,

    #[error("mnemonic must be 24 words, got {0}")]
    WrongWordCount(usize),

    #[error("key derivation failed")]
    Derivation,

    #[error(transparent)]
    Key(#[from] KeyMaterialError),
}

/// The output of one derivation: the phrase and the key it produced.
///
/// Both halves are secret. The phrase buffer is wiped on drop and the key
/// zeroizes itself.
pub struct DerivedKey {
    pub(crate) phrase: Zeroizing<String>,
    pub(crate) secret: Zeroizing<[u8; 32]>,
    pub(crate) key: WalletKey,
}

impl fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivedKey")
            .field("phrase", &"<redacted>")
            .field("secret", &"<redacted>")
            .field("key", &self.key)
            .finish()
    }
}

impl DerivedKey {
    pub(crate) fn phrase(&self) -> &str {
        &self.phrase
    }

    pub(crate) fn key(&self) -> &WalletKey {
        &self.key
    }
}

/// Encodes 256 bits of entropy as a 24-word phrase and derives its key.
pub(crate) fn from_entropy(entropy: &[u8; ENTROPY_LENGTH]) -> Result<DerivedKey, MnemonicError> {
    let mnemonic = Mnemonic::from_entropy(entropy).map_err(|_| MnemonicError::InvalidPhrase)?;
    derive(&mnemonic)
}

/// Validates a user-supplied phrase and derives its key.
///
/// Whitespace is normalized and case is folded before validation, since
/// phrases typed back from paper rarely match byte-for-byte.
pub(crate) fn from_phrase(phrase: &str) -> Result<DerivedKey, MnemonicError> {
    let normalized = Zeroizing::new(
        phrase
            .split_whitespace()
            .map(str::to_lowercase)
            .collect::<Vec<_>>()
            .join(" "),
    );
    let mnemonic = Mnemonic::parse(normalized.as_str()).map_err(|_| MnemonicError::InvalidPhrase)?;
    let words = mnemonic.word_count();
    if words != 24 {
        return Err(MnemonicError::WrongWordCount(words));
    }
    derive(&mnemonic)
}

fn derive(mnemonic: &Mnemonic) -> Result<DerivedKey, MnemonicError> {
    let seed = Zeroizing::new(mnemonic.to_seed(""));
    let path = DerivationPath::from_str(DERIVATION_PATH).map_err(|_| MnemonicError::Derivation)?;
    let child = XPrv::derive_from_path(&seed[..], &path).map_err(|_| MnemonicError::Derivation)?;

    let secret = Zeroizing::new(child.to_bytes());
    let key = WalletKey::from_bytes(&secret)?;

    Ok(DerivedKey {
        phrase: Zeroizing::new(mnemonic.to_string()),
        secret,
        key,
    })
}
