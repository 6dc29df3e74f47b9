//! # Transaction Module
//!
//! The Ethereum transactions that cross the air gap: what they are, how the
//! hot side composes them, and how the cold side turns them into the exact
//! bytes the chain will accept.
//!
//! ## Architecture
//!
//! ```text
//! types.rs        Data model: UnsignedTransaction, SignedTransaction, FeeFields
//! builder.rs      Fluent TransactionBuilder and UI-facing ComposeParams
//! verification.rs Structural validation and recipient parsing
//! canonical.rs    RLP signing payloads, signed envelopes, hashes
//! signing.rs      SigningEngine: custodian signature plus self-check
//! ```
//!
//! ## Lifecycle
//!
//! 1. **Compose** on the hot side with [`TransactionBuilder`].
//! 2. **Encode** into frames ([`crate::codec`]) and display.
//! 3. **Review** on the cold side ([`crate::presenter`]).
//! 4. **Sign** with [`SigningEngine`], which binds to the reviewed hash.
//! 5. **Encode** the [`SignedTransaction`] back and broadcast it from the
//!    hot side.
//!
//! Neither kind of transaction is ever written to disk.

pub mod builder;
pub mod canonical;
pub mod signing;
pub mod types;
pub mod verification;

pub use builder::{ComposeParams, TransactionBuilder};
pub use canonical::{signing_hash, signing_payload};
pub use signing::{SigningEngine, SigningError};
pub use types::{FeeFields, SignedTransaction, Transaction, TxType, UnsignedTransaction};
pub use verification::{parse_address, validate_unsigned, TransactionError};
