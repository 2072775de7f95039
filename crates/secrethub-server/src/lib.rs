//! SecretHub Server — the control-plane node process.
//!
//! Wires the storage backend, audit chain, seal actor, and cluster
//! coordinator together and exposes the `/sys/*` and `/cluster/info`
//! REST surface to the web layer.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod api;
pub mod wiring;

pub use api::{ApiError, AppState, router};
pub use wiring::Node;
