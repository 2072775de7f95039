//! SecretHub Secrets — encrypted CRUD over the version chain.
//!
//! Secret data never touches storage in the clear: it is canonical JSON
//! AEAD-encrypted under the in-memory master key, so a sealed node can
//! serve nothing. Every write materializes an immutable version row in
//! the same transaction as the live-row change; rollback moves forward
//! (a new version with old data), so version numbers are never reused.
//!
//! Policy-gated reads go through [`SecretsManager::read_for_entity`],
//! which evaluates the entity's policies and records every outcome in
//! the audit chain before any data is returned.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod error;
pub mod manager;
pub mod prelude;

pub use error::{SecretsError, SecretsResult};
pub use manager::{
    AccessRequest, CreateSecret, SecretMetadata, SecretsManager, SecretsStats, UpdateSecret,
    VersionDiff, VersionInfo,
};
