//! KMS client abstraction for auto-unseal.
//!
//! Auto-unseal stores the unseal shares each independently encrypted by
//! an external KMS. Cloud connectors live outside the core; the in-tree
//! [`StaticKms`] derives its key from configured material
//! (`ENCRYPTION_KEY`) and exists for single-trust-domain deployments and
//! tests.

use async_trait::async_trait;
use secrethub_crypto::SymmetricKey;

use crate::error::{SealError, SealResult};

/// An external key-management service that can wrap and unwrap small
/// payloads (unseal shares).
#[async_trait]
pub trait KmsClient: Send + Sync {
    /// Provider tag recorded in the auto-unseal record.
    fn provider(&self) -> &str;

    /// Encrypt one share.
    ///
    /// # Errors
    ///
    /// Returns [`SealError::Kms`] if the provider call fails.
    async fn encrypt(&self, plaintext: &[u8]) -> SealResult<Vec<u8>>;

    /// Decrypt one share.
    ///
    /// # Errors
    ///
    /// Returns [`SealError::Kms`] if the provider call fails or the
    /// ciphertext does not authenticate.
    async fn decrypt(&self, ciphertext: &[u8]) -> SealResult<Vec<u8>>;
}

/// KMS provider backed by a locally configured key.
pub struct StaticKms {
    key: SymmetricKey,
}

impl StaticKms {
    /// Derive the provider key from configured material.
    ///
    /// # Errors
    ///
    /// Returns [`SealError::Kms`] if derivation fails.
    pub fn from_material(material: &str) -> SealResult<Self> {
        let key = SymmetricKey::derive(material.as_bytes(), b"secrethub/kms/static/v1")
            .map_err(|e| SealError::Kms(e.to_string()))?;
        Ok(Self { key })
    }
}

impl std::fmt::Debug for StaticKms {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticKms").finish_non_exhaustive()
    }
}

#[async_trait]
impl KmsClient for StaticKms {
    fn provider(&self) -> &str {
        "static"
    }

    async fn encrypt(&self, plaintext: &[u8]) -> SealResult<Vec<u8>> {
        secrethub_crypto::encrypt(&self.key, plaintext).map_err(|e| SealError::Kms(e.to_string()))
    }

    async fn decrypt(&self, ciphertext: &[u8]) -> SealResult<Vec<u8>> {
        secrethub_crypto::decrypt(&self.key, ciphertext).map_err(|e| SealError::Kms(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_roundtrip() {
        let kms = StaticKms::from_material("configured-key-material").unwrap();
        let wrapped = kms.encrypt(b"share bytes").await.unwrap();
        assert_eq!(kms.decrypt(&wrapped).await.unwrap(), b"share bytes");
    }

    #[tokio::test]
    async fn test_material_matters() {
        let a = StaticKms::from_material("material-a").unwrap();
        let b = StaticKms::from_material("material-b").unwrap();
        let wrapped = a.encrypt(b"share").await.unwrap();
        assert!(b.decrypt(&wrapped).await.is_err());
    }
}
