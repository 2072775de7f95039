//! SecretHub Crypto — the primitive layer under the control plane.
//!
//! This crate provides:
//! - AEAD encryption into a self-describing blob (version, nonce, tag,
//!   ciphertext) via AES-256-GCM
//! - Symmetric key generation from the OS CSPRNG and HKDF derivation
//! - HMAC-SHA-256 signing and constant-time verification
//! - Threshold secret sharing: any `t` of `n` shares reconstruct the
//!   input, fewer than `t` reveal nothing
//!
//! # Key handling
//!
//! Key material lives in [`SymmetricKey`]/[`MasterKey`] buffers that are
//! zeroized on drop and never printed by `Debug`. No function in this
//! crate logs key bytes or intermediate state, at any level.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod aead;
pub mod error;
pub mod keys;
pub mod mac;
pub mod prelude;
pub mod shamir;

pub use aead::{BLOB_VERSION, EncryptedBlob, decrypt, encrypt};
pub use error::{CryptoError, CryptoResult};
pub use keys::{KEY_LEN, MasterKey, SymmetricKey};
pub use mac::{hmac_sha256, hmac_verify};
pub use shamir::{ShamirConfig, UnsealShare, combine, split};
