//! SecretHub Core — shared domain types.
//!
//! This crate holds the vocabulary every control-plane subsystem speaks:
//! typed identifiers, the reverse-domain [`SecretPath`], the shared domain
//! enums (secret type, node status, operations, actor kinds), and the
//! [`CoreConfig`] struct carrying every tunable passed down at startup.
//!
//! Nothing here performs I/O; the crate exists so that the storage, seal,
//! policy, audit, and secrets crates agree on types without depending on
//! each other.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod config;
pub mod ids;
pub mod path;
pub mod prelude;
pub mod types;

pub use config::CoreConfig;
pub use ids::{CorrelationId, EntityId, EventId, LeaseId, NodeId, PolicyId, SecretId};
pub use path::{PathError, SecretPath};
pub use types::{ActorType, NodeStatus, Operation, SecretType};
