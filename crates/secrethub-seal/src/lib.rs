//! SecretHub Seal — the master-key lifecycle.
//!
//! The master encryption key protecting every secret ciphertext exists
//! in memory only, on nodes in the `unsealed` state. This crate owns
//! that lifecycle:
//!
//! - **Initialize**: generate the key, split it into `n` threshold
//!   shares, persist only the wrapped form, hand the shares to the
//!   operator exactly once.
//! - **Unseal**: collect shares (deduplicated by id) until the threshold
//!   is reached, combine, verify against the key check value, and hold
//!   the key in a zeroize-on-drop buffer.
//! - **Seal / auto-seal**: zeroize on demand, and automatically after an
//!   inactivity window measured on the monotonic clock.
//! - **Auto-unseal**: replay KMS-encrypted shares at startup.
//!
//! The state machine runs as a single-owner actor ([`actor::spawn`]);
//! every public operation goes through a [`SealHandle`].

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod actor;
pub mod auto_unseal;
pub mod error;
pub mod kms;
pub mod prelude;

pub use actor::{SealConfig, SealHandle, SealStatus, UnsealProgress, spawn};
pub use auto_unseal::AutoUnseal;
pub use error::{SealError, SealResult};
pub use kms::{KmsClient, StaticKms};
