//! SecretHub Policy — the deterministic gate in front of every secret.
//!
//! A policy names the secrets it covers with dot-globs, the operations it
//! allows, and the conditions (time of day, weekdays, date range, source
//! CIDRs, TTL caps) under which it applies. Evaluation is a fixed
//! pipeline of checks; given identical inputs it always returns the same
//! verdict, and explicit-deny policies override allows across a policy
//! set.
//!
//! The evaluator memoizes verdicts with a short TTL, keyed by everything
//! that can change the outcome, and exposes a simulation mode returning
//! every `(check, pass/fail, reason)` step for operator debugging.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod cidr;
pub mod document;
pub mod error;
pub mod evaluator;
pub mod glob;
pub mod prelude;
pub mod service;

pub use cidr::Cidr;
pub use document::{Conditions, DateRange, Policy, PolicyDocument};
pub use error::{PolicyError, PolicyResult};
pub use evaluator::{
    AccessDecision, CheckKind, CheckStep, EvaluationContext, PolicyEvaluator, Verdict,
};
pub use service::{PolicyAttrs, PolicyService};
