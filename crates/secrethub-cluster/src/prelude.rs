//! Convenience re-exports.

pub use crate::coordinator::{ClusterConfig, ClusterCoordinator, InitOutcome};
pub use crate::error::{ClusterError, ClusterResult};
pub use crate::node::NodeIdentity;
