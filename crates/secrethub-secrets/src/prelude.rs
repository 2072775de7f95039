//! Convenience re-exports.

pub use crate::error::{SecretsError, SecretsResult};
pub use crate::manager::{
    AccessRequest, CreateSecret, SecretMetadata, SecretsManager, SecretsStats, UpdateSecret,
    VersionDiff, VersionInfo,
};
