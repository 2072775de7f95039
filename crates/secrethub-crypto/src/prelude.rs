//! Convenience re-exports.

pub use crate::aead::{EncryptedBlob, decrypt, encrypt};
pub use crate::error::{CryptoError, CryptoResult};
pub use crate::keys::{MasterKey, SymmetricKey};
pub use crate::mac::{hmac_sha256, hmac_verify};
pub use crate::shamir::{ShamirConfig, UnsealShare, combine, split};
