//! Convenience re-exports.

pub use crate::document::{Conditions, Policy, PolicyDocument};
pub use crate::error::{PolicyError, PolicyResult};
pub use crate::evaluator::{AccessDecision, EvaluationContext, PolicyEvaluator, Verdict};
pub use crate::service::{PolicyAttrs, PolicyService};
