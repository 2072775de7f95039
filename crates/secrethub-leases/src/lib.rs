//! SecretHub Leases — the hooks the lease manager and rotation
//! scheduler consume.
//!
//! Dynamic-credential lifecycles live with the lease manager and cron
//! parsing with the scheduler; the core owes them exactly this:
//! transactional CRUD over opaque credential ciphertexts, a registry of
//! [`Rotation`] capabilities keyed by engine type string, persisted
//! rotation history rows, and archival of the pre-rotation secret
//! version through the secrets manager.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod error;
pub mod lease;
pub mod prelude;
pub mod rotation;

pub use error::{LeaseError, LeaseResult};
pub use lease::{IssueLease, LeaseService};
pub use rotation::{
    EngineRegistry, RotatedCredentials, Rotation, RotationOptions, RotationOutcome,
    RotationRunner, RotationSchedule,
};
