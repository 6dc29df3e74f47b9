//! # Protocol Configuration & Constants
//!
//! Every number that ends up on the wire, in secure storage, or in a
//! derivation path lives here. The frame layout constants are part of the
//! optical wire contract: a hot device and a cold device built from
//! different revisions must agree on all of them, so treat edits in the
//! "Wire Format" section as a protocol version bump.
//!
//! Runtime-tunable knobs (chain id, fee ceiling, chunk capacity, timeouts)
//! live in [`ProtocolConfig`], which loads from TOML.

use std::path::Path;
use std::time::Duration;

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Wire Format
// ---------------------------------------------------------------------------

/// Frame version tag for an unsigned-transaction body (hot -> cold).
pub const WIRE_VERSION_UNSIGNED: u8 = 0x01;

/// Frame version tag for a signed-transaction body (cold -> hot).
pub const WIRE_VERSION_SIGNED: u8 = 0x02;

/// Length of the random transfer token carried by every chunk.
pub const GROUP_ID_LENGTH: usize = 16;

/// `version:u8 | groupId:16 | chunkIndex:u16 | chunkCount:u16 | bodyLen:u16`
pub const FRAME_HEADER_LENGTH: usize = 1 + GROUP_ID_LENGTH + 2 + 2 + 2;

/// Truncated SHA-256 checksum appended to every frame.
pub const CHECKSUM_LENGTH: usize = 8;

/// Default number of body bytes per optical frame.
///
/// 512 body bytes become a 543-byte frame, i.e. 1086 uppercase hex
/// characters. That fits a version-22 QR code at error-correction level L
/// in alphanumeric mode, which phone cameras still read reliably at arm's
/// length.
pub const DEFAULT_CHUNK_CAPACITY: usize = 512;

/// Smallest chunk capacity accepted by [`ProtocolConfig::validate`].
pub const MIN_CHUNK_CAPACITY: usize = 16;

/// Upper bound on `chunkCount` imposed by its u16 field.
pub const MAX_CHUNK_COUNT: usize = u16::MAX as usize;

/// Largest calldata payload accepted by the codec and the builder.
pub const MAX_DATA_LENGTH: usize = 128 * 1024;

/// Number of incomplete chunk groups the assembler keeps at once.
pub const DEFAULT_MAX_PENDING_GROUPS: usize = 8;

// ---------------------------------------------------------------------------
// Transaction Shapes
// ---------------------------------------------------------------------------

/// EIP-2718 type byte of a legacy (EIP-155) transaction.
pub const TX_TYPE_LEGACY: u8 = 0x00;

/// EIP-2718 type byte of a fee-market (EIP-1559) transaction.
pub const TX_TYPE_EIP1559: u8 = 0x02;

/// Intrinsic gas of a plain value transfer. Anything lower can never be mined.
pub const MIN_GAS_LIMIT: u64 = 21_000;

/// Length of an account identifier.
pub const ADDRESS_LENGTH: usize = 20;

/// `r:32 | s:32 | recoveryId:1`
pub const SIGNATURE_LENGTH: usize = 65;

// ---------------------------------------------------------------------------
// Key Derivation & Storage
// ---------------------------------------------------------------------------

/// BIP-44 path of the first Ethereum account.
pub const DERIVATION_PATH: &str = "m/44'/60'/0'/0/0";

/// Entropy drawn for a new wallet. 256 bits -> 24 mnemonic words.
pub const ENTROPY_LENGTH: usize = 32;

/// AES-256 key length in bytes.
pub const AES_KEY_LENGTH: usize = 32;

/// AES-GCM nonce length in bytes.
pub const AES_NONCE_LENGTH: usize = 12;

/// Secure-storage entry holding the encrypted private key.
pub const STORAGE_KEY_PRIVATE_KEY: &str = "airlock.wallet.private_key";

/// Secure-storage entry holding the encrypted mnemonic.
pub const STORAGE_KEY_MNEMONIC: &str = "airlock.wallet.mnemonic";

/// Secure-storage entry holding the public wallet record.
pub const STORAGE_KEY_RECORD: &str = "airlock.wallet.record";

/// Format revision of the persisted wallet record.
pub const WALLET_RECORD_FORMAT: u16 = 1;

// ---------------------------------------------------------------------------
// Review Policy Defaults
// ---------------------------------------------------------------------------

/// Ethereum mainnet.
pub const DEFAULT_CHAIN_ID: u64 = 1;

/// Default fee ceiling: 0.05 ETH. A plain transfer at 100 gwei costs
/// 0.0021 ETH, so anything above this deserves a second look.
pub const DEFAULT_FEE_CEILING_WEI: u128 = 50_000_000_000_000_000;

/// Wei per ether, used when formatting amounts for review.
pub const WEI_PER_ETHER: u128 = 1_000_000_000_000_000_000;

// ---------------------------------------------------------------------------
// Session Timing
// ---------------------------------------------------------------------------

/// How long a scan session may sit without a new frame.
pub const DEFAULT_SCAN_TIMEOUT_SECS: u64 = 120;

/// How long the signing task may take, storage unlock included.
pub const DEFAULT_SIGN_TIMEOUT_SECS: u64 = 60;

/// Capacity of the bounded scan-event channel feeding a session driver.
pub const SCAN_EVENT_CHANNEL_CAPACITY: usize = 32;

// ---------------------------------------------------------------------------
// Runtime Configuration
// ---------------------------------------------------------------------------

/// Errors raised while loading or validating a [`ProtocolConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Device-level settings shared by both roles.
///
/// Every field has a default, so a TOML file only needs the keys it
/// overrides:
///
/// ```toml
/// chain_id = 11155111
/// fee_ceiling_wei = "10000000000000000"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Chain the wallet is configured for. Requests for any other chain
    /// are flagged during review.
    pub chain_id: u64,

    /// Maximum plausible fee in wei. Kept as a decimal string in TOML
    /// because the value routinely exceeds what TOML integers can hold.
    #[serde(with = "u256_decimal")]
    pub fee_ceiling_wei: U256,

    /// Body bytes per optical frame.
    pub chunk_capacity: usize,

    /// Incomplete chunk groups buffered concurrently.
    pub max_pending_groups: usize,

    /// Idle timeout of a scan session, in seconds.
    pub scan_timeout_secs: u64,

    /// Timeout of the background signing task, in seconds.
    pub sign_timeout_secs: u64,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            chain_id: DEFAULT_CHAIN_ID,
            fee_ceiling_wei: U256::from(DEFAULT_FEE_CEILING_WEI),
            chunk_capacity: DEFAULT_CHUNK_CAPACITY,
            max_pending_groups: DEFAULT_MAX_PENDING_GROUPS,
            scan_timeout_secs: DEFAULT_SCAN_TIMEOUT_SECS,
            sign_timeout_secs: DEFAULT_SIGN_TIMEOUT_SECS,
        }
    }
}

impl ProtocolConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Rejects values that would break the wire contract or stall a session.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chain_id == 0 {
            return Err(ConfigError::Invalid {
                field: "chain_id",
                reason: "must be non-zero".into(),
            });
        }
        if self.chunk_capacity < MIN_CHUNK_CAPACITY || self.chunk_capacity > u16::MAX as usize {
            return Err(ConfigError::Invalid {
                field: "chunk_capacity",
                reason: format!(
                    "must be between {MIN_CHUNK_CAPACITY} and {}, got {}",
                    u16::MAX,
                    self.chunk_capacity
                ),
            });
        }
        if self.max_pending_groups == 0 {
            return Err(ConfigError::Invalid {
                field: "max_pending_groups",
                reason: "must be at least 1".into(),
            });
        }
        if self.scan_timeout_secs == 0 || self.sign_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "timeouts",
                reason: "timeouts must be at least one second".into(),
            });
        }
        Ok(())
    }

    pub fn scan_timeout(&self) -> Duration {
        Duration::from_secs(self.scan_timeout_secs)
    }

    pub fn sign_timeout(&self) -> Duration {
        Duration::from_secs(self.sign_timeout_secs)
    }
}

/// Serializes a `U256` as a base-10 string.
mod u256_decimal {
    use alloy_primitives::U256;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        let raw = String::deserialize(deserializer)?;
        U256::from_str_radix(raw.trim(), 10).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_overhead_matches_layout() {
        assert_eq!(FRAME_HEADER_LENGTH, 23);
        assert_eq!(FRAME_HEADER_LENGTH + CHECKSUM_LENGTH, 31);
    }

    #[test]
    fn defaults_are_valid() {
        ProtocolConfig::default().validate().unwrap();
    }

    #[test]
    fn toml_overrides_only_given_fields() {
        let cfg = ProtocolConfig::from_toml_str(
            r#"
            chain_id = 11155111
            fee_ceiling_wei = "10000000000000000"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.chain_id, 11_155_111);
        assert_eq!(cfg.fee_ceiling_wei, U256::from(10_000_000_000_000_000u128));
        assert_eq!(cfg.chunk_capacity, DEFAULT_CHUNK_CAPACITY);
    }

    #[test]
    fn rejects_tiny_chunk_capacity() {
        let err = ProtocolConfig::from_toml_str("chunk_capacity = 4").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "chunk_capacity",
                ..
            }
        ));
    }

    #[test]
    fn rejects_garbage_fee_ceiling() {
        assert!(ProtocolConfig::from_toml_str(r#"fee_ceiling_wei = "lots""#).is_err());
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("airlock.toml");
        std::fs::write(&path, "chain_id = 5\nscan_timeout_secs = 30\n").unwrap();
        let cfg = ProtocolConfig::load(&path).unwrap();
        assert_eq!(cfg.chain_id, 5);
        assert_eq!(cfg.scan_timeout(), Duration::from_secs(30));
    }
}
