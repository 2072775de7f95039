//! Convenience re-exports.

pub use crate::chain::{AuditChain, AuditMode, ChainVerification};
pub use crate::error::{AuditError, AuditResult};
pub use crate::event::{AuditActor, AuditEventDraft, AuditEventType};
