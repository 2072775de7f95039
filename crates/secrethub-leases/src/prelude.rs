//! Convenience re-exports.

pub use crate::error::{LeaseError, LeaseResult};
pub use crate::lease::{IssueLease, LeaseService};
pub use crate::rotation::{
    EngineRegistry, RotatedCredentials, Rotation, RotationOptions, RotationOutcome,
    RotationRunner, RotationSchedule,
};
