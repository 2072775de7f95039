//! Convenience re-exports.

pub use crate::actor::{SealConfig, SealHandle, SealStatus, UnsealProgress, spawn};
pub use crate::auto_unseal::AutoUnseal;
pub use crate::error::{SealError, SealResult};
pub use crate::kms::{KmsClient, StaticKms};
