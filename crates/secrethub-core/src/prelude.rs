//! Convenience re-exports for downstream crates.

pub use crate::config::CoreConfig;
pub use crate::ids::{CorrelationId, EntityId, EventId, LeaseId, NodeId, PolicyId, SecretId};
pub use crate::path::SecretPath;
pub use crate::types::{ActorType, NodeStatus, Operation, SecretType};
