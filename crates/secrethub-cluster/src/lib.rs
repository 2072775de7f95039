//! SecretHub Cluster — coordination across active-active replicas.
//!
//! Each node registers itself under a stable identity, heartbeats its
//! liveness and health, and participates in two cluster-wide protocols
//! built on the advisory lock:
//!
//! - **Coordinated init**: the `init` lock serializes initialization so
//!   it happens exactly once per cluster lifetime; losers observe
//!   `already_initialized` and proceed to unseal.
//! - **Leader election**: a session-mode `leader` lock guarantees at most
//!   one leader at any instant. A node that believed itself leader but
//!   whose lock is no longer held demotes itself on the next check.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod coordinator;
pub mod error;
pub mod node;
pub mod prelude;

pub use coordinator::{ClusterConfig, ClusterCoordinator, InitOutcome};
pub use error::{ClusterError, ClusterResult};
pub use node::{HostMetrics, HostSampler, NodeIdentity};
