//! SecretHub Audit — the tamper-evident event log.
//!
//! Every security-relevant action in the control plane is recorded as an
//! event in a single global chain:
//!
//! - **Sequenced**: sequence numbers are unique and strictly increasing
//!   from 1, with no gaps — a deleted row is detectable.
//! - **Hash-chained**: each event carries the SHA-256 of the previous
//!   event's canonical serialization — a mutated row breaks its
//!   successor's link.
//! - **Signed**: each event carries an HMAC-SHA-256 over
//!   `event_id || sequence || current_hash` under the audit key.
//!
//! [`AuditChain::verify_chain`] walks the whole log and reports the first
//! violation. [`AuditChain::search`] and [`AuditChain::export_csv`] serve
//! the operator surface.
//!
//! Append failures fail the operation that produced the event: if the
//! access cannot be recorded, the access does not happen.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod chain;
pub mod error;
pub mod event;
pub mod export;
pub mod prelude;

pub use chain::{AuditChain, AuditMode, ChainVerification, GENESIS_HASH};
pub use error::{AuditError, AuditResult};
pub use event::{AuditActor, AuditEventDraft, AuditEventType};
pub use export::{CSV_HEADER, to_csv};
