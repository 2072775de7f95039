//! The deterministic evaluation pipeline.
//!
//! Every decision runs the same fixed sequence of checks:
//!
//! 1. Entity binding — empty bindings apply to everyone
//! 2. Path match — at least one glob covers the secret path
//! 3. Operation — the requested operation is allowed
//! 4. Time — time-of-day window, weekdays, date range (all UTC)
//! 5. IP — source address inside some configured CIDR
//! 6. TTL — requested TTL within the policy cap
//!
//! A policy **matches** when every check passes. For a normal policy a
//! match allows; for a `deny = true` policy a match denies, and explicit
//! denies override allows across the policy set. Verdicts are memoized
//! with a short TTL, keyed by everything that can change the outcome.

use chrono::{Datelike, Utc};
use dashmap::DashMap;
use regex::Regex;
use secrethub_core::{EntityId, Operation, SecretPath};
use std::fmt;
use std::net::IpAddr;
use std::time::{Duration, Instant};
use tracing::warn;

use crate::cidr;
use crate::document::{Policy, parse_time_window, parse_weekday, time_in_window};
use crate::glob;

/// Inputs to one access decision.
#[derive(Debug, Clone)]
pub struct EvaluationContext {
    /// Requesting entity.
    pub entity_id: EntityId,
    /// Secret path being accessed.
    pub secret_path: SecretPath,
    /// Requested operation.
    pub operation: Operation,
    /// Request source address, if known.
    pub ip_address: Option<IpAddr>,
    /// Evaluation instant; `None` means now. Conditions evaluate in UTC.
    pub timestamp: Option<chrono::DateTime<Utc>>,
    /// Requested credential TTL, if any.
    pub requested_ttl: Option<Duration>,
}

impl EvaluationContext {
    /// A context with only the mandatory fields.
    #[must_use]
    pub fn new(entity_id: EntityId, secret_path: SecretPath, operation: Operation) -> Self {
        Self {
            entity_id,
            secret_path,
            operation,
            ip_address: None,
            timestamp: None,
            requested_ttl: None,
        }
    }
}

/// Outcome of evaluating one policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Access allowed.
    Allow {
        /// Why.
        reason: String,
    },
    /// Access denied.
    Deny {
        /// Why.
        reason: String,
    },
}

impl Verdict {
    /// Whether this verdict allows access.
    #[must_use]
    pub fn is_allow(&self) -> bool {
        matches!(self, Self::Allow { .. })
    }

    /// The reason string.
    #[must_use]
    pub fn reason(&self) -> &str {
        match self {
            Self::Allow { reason } | Self::Deny { reason } => reason,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allow { reason } => write!(f, "allow: {reason}"),
            Self::Deny { reason } => write!(f, "deny: {reason}"),
        }
    }
}

/// One step of the pipeline, as reported by simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckKind {
    /// Entity binding check.
    EntityBinding,
    /// Path glob check.
    PathMatch,
    /// Operation check.
    Operation,
    /// Time conditions check.
    Time,
    /// IP conditions check.
    Ip,
    /// TTL cap check.
    Ttl,
}

impl fmt::Display for CheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EntityBinding => write!(f, "entity_binding"),
            Self::PathMatch => write!(f, "path_match"),
            Self::Operation => write!(f, "operation"),
            Self::Time => write!(f, "time"),
            Self::Ip => write!(f, "ip"),
            Self::Ttl => write!(f, "ttl"),
        }
    }
}

/// A `(check, pass/fail, reason)` triple from simulation.
#[derive(Debug, Clone)]
pub struct CheckStep {
    /// Which check ran.
    pub check: CheckKind,
    /// Whether it passed.
    pub passed: bool,
    /// Human-readable explanation.
    pub reason: String,
}

/// Final decision across an entity's whole policy set.
#[derive(Debug, Clone)]
pub struct AccessDecision {
    /// Whether access is granted.
    pub allowed: bool,
    /// Why.
    pub reason: String,
    /// The policy that decided the outcome, if any matched.
    pub matched_policy: Option<String>,
}

struct CachedVerdict {
    matched: bool,
    failure: Option<String>,
    expires_at: Instant,
}

/// The policy evaluator with its memoization and compiled-glob caches.
pub struct PolicyEvaluator {
    cache: DashMap<String, CachedVerdict>,
    cache_ttl: Duration,
    globs: DashMap<String, Regex>,
}

impl PolicyEvaluator {
    /// Create an evaluator whose memoized verdicts live for `cache_ttl`.
    #[must_use]
    pub fn new(cache_ttl: Duration) -> Self {
        Self {
            cache: DashMap::new(),
            cache_ttl,
            globs: DashMap::new(),
        }
    }

    /// Evaluate one policy against a context.
    ///
    /// A `deny = true` policy inverts the final verdict: a full match
    /// becomes a deny, anything else an allow. Callers composing multiple
    /// policies should use [`PolicyEvaluator::evaluate_access`], which
    /// applies explicit-deny-overrides-allow across the set.
    #[must_use]
    pub fn evaluate(&self, policy: &Policy, ctx: &EvaluationContext) -> Verdict {
        let (matched, failure) = self.matches_cached(policy, ctx);
        match (policy.deny, matched) {
            (false, true) => Verdict::Allow {
                reason: format!("allowed by policy {}", policy.name),
            },
            (false, false) => Verdict::Deny {
                reason: failure.unwrap_or_else(|| "policy did not match".to_string()),
            },
            (true, true) => Verdict::Deny {
                reason: format!("explicitly denied by policy {}", policy.name),
            },
            (true, false) => Verdict::Allow {
                reason: format!("deny policy {} did not match", policy.name),
            },
        }
    }

    /// Run every check without short-circuiting and report each step.
    /// Used by operator tooling to debug a policy.
    #[must_use]
    pub fn simulate(&self, policy: &Policy, ctx: &EvaluationContext) -> (Verdict, Vec<CheckStep>) {
        let steps = self.run_checks(policy, ctx);
        let matched = steps.iter().all(|step| step.passed);
        let verdict = match (policy.deny, matched) {
            (false, true) => Verdict::Allow {
                reason: format!("allowed by policy {}", policy.name),
            },
            (false, false) => Verdict::Deny {
                reason: steps
                    .iter()
                    .find(|step| !step.passed)
                    .map(|step| step.reason.clone())
                    .unwrap_or_else(|| "policy did not match".to_string()),
            },
            (true, true) => Verdict::Deny {
                reason: format!("explicitly denied by policy {}", policy.name),
            },
            (true, false) => Verdict::Allow {
                reason: format!("deny policy {} did not match", policy.name),
            },
        };
        (verdict, steps)
    }

    /// Decide access across an entity's policy set: any matching normal
    /// policy allows; any matching `deny = true` policy overrides to
    /// deny; nothing matching denies.
    #[must_use]
    pub fn evaluate_access(&self, policies: &[Policy], ctx: &EvaluationContext) -> AccessDecision {
        let mut allowed_by: Option<String> = None;
        let mut denied_by: Option<String> = None;

        for policy in policies {
            let (matched, _) = self.matches_cached(policy, ctx);
            if !matched {
                continue;
            }
            if policy.deny {
                if denied_by.is_none() {
                    denied_by = Some(policy.name.clone());
                }
            } else if allowed_by.is_none() {
                allowed_by = Some(policy.name.clone());
            }
        }

        // Explicit deny overrides allow.
        if let Some(name) = denied_by {
            return AccessDecision {
                allowed: false,
                reason: format!("explicitly denied by policy {name}"),
                matched_policy: Some(name),
            };
        }
        if let Some(name) = allowed_by {
            return AccessDecision {
                allowed: true,
                reason: format!("allowed by policy {name}"),
                matched_policy: Some(name),
            };
        }
        AccessDecision {
            allowed: false,
            reason: "no policy allows access".to_string(),
            matched_policy: None,
        }
    }

    /// Drop every memoized verdict (call after policy mutations).
    pub fn invalidate(&self) {
        self.cache.clear();
    }

    fn matches_cached(&self, policy: &Policy, ctx: &EvaluationContext) -> (bool, Option<String>) {
        let key = self.cache_key(policy, ctx);
        if let Some(entry) = self.cache.get(&key)
            && entry.expires_at > Instant::now()
        {
            return (entry.matched, entry.failure.clone());
        }

        let steps = self.run_checks(policy, ctx);
        let failure = steps
            .iter()
            .find(|step| !step.passed)
            .map(|step| step.reason.clone());
        let matched = failure.is_none();

        self.cache.insert(
            key,
            CachedVerdict {
                matched,
                failure: failure.clone(),
                expires_at: Instant::now() + self.cache_ttl,
            },
        );
        (matched, failure)
    }

    /// Cache key over everything that can change the outcome. Timestamp
    /// and IP enter the key only when the policy actually conditions on
    /// them, so unconditioned policies cache across requests.
    fn cache_key(&self, policy: &Policy, ctx: &EvaluationContext) -> String {
        let mut key = format!(
            "{}|{}|{}|{}",
            policy.id, ctx.entity_id, ctx.secret_path, ctx.operation
        );
        if !policy.document.conditions.ip_ranges.is_empty() {
            key.push('|');
            if let Some(ip) = ctx.ip_address {
                key.push_str(&ip.to_string());
            }
        }
        if policy.document.conditions.time_dependent() {
            let at = ctx.timestamp.unwrap_or_else(Utc::now);
            key.push('|');
            key.push_str(&at.format("%Y-%m-%d %H:%M").to_string());
        }
        if policy.max_ttl.is_some() {
            key.push('|');
            if let Some(ttl) = ctx.requested_ttl {
                key.push_str(&ttl.as_secs().to_string());
            }
        }
        key
    }

    fn run_checks(&self, policy: &Policy, ctx: &EvaluationContext) -> Vec<CheckStep> {
        let mut steps = Vec::with_capacity(6);
        steps.push(self.check_entity(policy, ctx));
        steps.push(self.check_path(policy, ctx));
        steps.push(self.check_operation(policy, ctx));
        steps.push(self.check_time(policy, ctx));
        steps.push(self.check_ip(policy, ctx));
        steps.push(self.check_ttl(policy, ctx));
        steps
    }

    fn check_entity(&self, policy: &Policy, ctx: &EvaluationContext) -> CheckStep {
        let (passed, reason) = if policy.entity_bindings.is_empty() {
            (true, "policy applies to all entities".to_string())
        } else if policy.entity_bindings.contains(&ctx.entity_id) {
            (true, format!("entity {} is bound", ctx.entity_id))
        } else {
            (false, format!("entity {} is not bound", ctx.entity_id))
        };
        CheckStep {
            check: CheckKind::EntityBinding,
            passed,
            reason,
        }
    }

    fn check_path(&self, policy: &Policy, ctx: &EvaluationContext) -> CheckStep {
        let path = ctx.secret_path.as_str();
        let matched = policy
            .document
            .allowed_secrets
            .iter()
            .any(|pattern| self.glob_matches(pattern, path));
        CheckStep {
            check: CheckKind::PathMatch,
            passed: matched,
            reason: if matched {
                format!("path {path} matches an allowed pattern")
            } else {
                format!("path {path} matches no allowed pattern")
            },
        }
    }

    fn check_operation(&self, policy: &Policy, ctx: &EvaluationContext) -> CheckStep {
        let allowed = policy.document.allowed_operations.contains(&ctx.operation);
        CheckStep {
            check: CheckKind::Operation,
            passed: allowed,
            reason: if allowed {
                format!("operation {} is allowed", ctx.operation)
            } else {
                format!("operation {} is not allowed", ctx.operation)
            },
        }
    }

    fn check_time(&self, policy: &Policy, ctx: &EvaluationContext) -> CheckStep {
        let conditions = &policy.document.conditions;
        let at = ctx.timestamp.unwrap_or_else(Utc::now);

        for key in conditions.extra.keys() {
            warn!(policy = %policy.name, condition = %key, "unknown condition key treated as satisfied");
        }

        if let Some(window) = &conditions.time_of_day {
            match parse_time_window(window) {
                Ok((start, end)) => {
                    if !time_in_window(at.time(), start, end) {
                        return CheckStep {
                            check: CheckKind::Time,
                            passed: false,
                            reason: format!("time {} outside window {window}", at.format("%H:%M")),
                        };
                    }
                },
                Err(_) => {
                    return CheckStep {
                        check: CheckKind::Time,
                        passed: false,
                        reason: format!("unparseable time window {window:?}"),
                    };
                },
            }
        }

        if let Some(days) = &conditions.days_of_week {
            let today = at.weekday();
            let allowed = days
                .iter()
                .filter_map(|day| parse_weekday(day).ok())
                .any(|day| day == today);
            if !allowed {
                return CheckStep {
                    check: CheckKind::Time,
                    passed: false,
                    reason: format!("{today} is not an allowed weekday"),
                };
            }
        }

        if let Some(range) = &conditions.date_range
            && (at < range.from || at > range.to)
        {
            return CheckStep {
                check: CheckKind::Time,
                passed: false,
                reason: format!("{at} outside date range"),
            };
        }

        CheckStep {
            check: CheckKind::Time,
            passed: true,
            reason: "time conditions satisfied".to_string(),
        }
    }

    fn check_ip(&self, policy: &Policy, ctx: &EvaluationContext) -> CheckStep {
        let ranges = &policy.document.conditions.ip_ranges;
        let (passed, reason) = if ranges.is_empty() {
            (true, "no IP restriction".to_string())
        } else {
            match ctx.ip_address {
                Some(ip) if cidr::in_any_range(ranges, ip) => {
                    (true, format!("{ip} is inside an allowed range"))
                },
                Some(ip) => (false, format!("{ip} is outside the allowed ranges")),
                None => (
                    false,
                    "source IP required by policy but not provided".to_string(),
                ),
            }
        };
        CheckStep {
            check: CheckKind::Ip,
            passed,
            reason,
        }
    }

    fn check_ttl(&self, policy: &Policy, ctx: &EvaluationContext) -> CheckStep {
        let (passed, reason) = match (ctx.requested_ttl, policy.max_ttl) {
            (Some(requested), Some(max)) if requested > max => (
                false,
                format!(
                    "requested TTL {}s exceeds maximum {}s",
                    requested.as_secs(),
                    max.as_secs()
                ),
            ),
            (Some(requested), Some(_)) => {
                (true, format!("TTL {}s within limit", requested.as_secs()))
            },
            _ => (true, "no TTL constraint".to_string()),
        };
        CheckStep {
            check: CheckKind::Ttl,
            passed,
            reason,
        }
    }

    fn glob_matches(&self, pattern: &str, path: &str) -> bool {
        if let Some(regex) = self.globs.get(pattern) {
            return regex.is_match(path);
        }
        match glob::compile(pattern) {
            Ok(regex) => {
                let matched = regex.is_match(path);
                self.globs.insert(pattern.to_string(), regex);
                matched
            },
            // Validated at write time; an unparseable stored pattern
            // matches nothing.
            Err(_) => false,
        }
    }
}

impl fmt::Debug for PolicyEvaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyEvaluator")
            .field("cache_ttl", &self.cache_ttl)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Conditions, PolicyDocument};
    use chrono::TimeZone;
    use secrethub_core::PolicyId;
    use std::collections::HashSet;

    fn evaluator() -> PolicyEvaluator {
        PolicyEvaluator::new(Duration::from_secs(300))
    }

    fn policy(name: &str, deny: bool, document: PolicyDocument) -> Policy {
        Policy {
            id: PolicyId::new(),
            name: name.to_string(),
            deny,
            document,
            entity_bindings: vec![],
            max_ttl: None,
        }
    }

    fn ctx(path: &str, operation: Operation) -> EvaluationContext {
        EvaluationContext::new(
            EntityId::new("app-1"),
            SecretPath::parse(path).unwrap(),
            operation,
        )
    }

    // -----------------------------------------------------------------------
    // Single-policy pipeline
    // -----------------------------------------------------------------------

    #[test]
    fn test_simple_allow() {
        let policy = policy(
            "readers",
            false,
            PolicyDocument::read_only(vec!["prod.db.*".to_string()]),
        );
        let verdict = evaluator().evaluate(&policy, &ctx("prod.db.password", Operation::Read));
        assert!(verdict.is_allow());
    }

    #[test]
    fn test_path_mismatch_denies() {
        let policy = policy(
            "readers",
            false,
            PolicyDocument::read_only(vec!["prod.db.*".to_string()]),
        );
        let verdict = evaluator().evaluate(&policy, &ctx("staging.db.password", Operation::Read));
        assert!(!verdict.is_allow());
    }

    #[test]
    fn test_operation_outside_set_denies() {
        let policy = policy(
            "readers",
            false,
            PolicyDocument::read_only(vec!["prod.**".to_string()]),
        );
        let verdict = evaluator().evaluate(&policy, &ctx("prod.db.password", Operation::Write));
        assert!(!verdict.is_allow());
    }

    #[test]
    fn test_entity_binding() {
        let mut bound = policy(
            "bound",
            false,
            PolicyDocument::read_only(vec!["**".to_string()]),
        );
        bound.entity_bindings = vec![EntityId::new("app-2")];

        let verdict = evaluator().evaluate(&bound, &ctx("prod.db.password", Operation::Read));
        assert!(!verdict.is_allow());

        bound.entity_bindings = vec![EntityId::new("app-1")];
        let verdict = evaluator().evaluate(&bound, &ctx("prod.db.password", Operation::Read));
        assert!(verdict.is_allow());
    }

    #[test]
    fn test_time_and_ip_conditions() {
        // Business hours from the corporate range; anything outside the
        // window or the CIDR is refused.
        let document = PolicyDocument {
            allowed_secrets: vec!["prod.db.*".to_string()],
            allowed_operations: HashSet::from([Operation::Read]),
            conditions: Conditions {
                time_of_day: Some("09:00-17:00".to_string()),
                ip_ranges: vec!["10.0.0.0/8".to_string()],
                ..Conditions::default()
            },
        };
        let policy = policy("business-hours", false, document);
        let evaluator = evaluator();

        let noon = Utc.with_ymd_and_hms(2024, 5, 15, 12, 0, 0).unwrap();
        let night = Utc.with_ymd_and_hms(2024, 5, 15, 22, 0, 0).unwrap();

        let mut context = ctx("prod.db.postgres.password", Operation::Read);
        context.timestamp = Some(noon);
        context.ip_address = Some("10.1.2.3".parse().unwrap());
        assert!(evaluator.evaluate(&policy, &context).is_allow());

        context.timestamp = Some(night);
        assert!(!evaluator.evaluate(&policy, &context).is_allow());

        context.timestamp = Some(noon);
        context.ip_address = Some("192.168.0.1".parse().unwrap());
        assert!(!evaluator.evaluate(&policy, &context).is_allow());
    }

    #[test]
    fn test_ip_required_but_missing_denies() {
        let document = PolicyDocument {
            allowed_secrets: vec!["**".to_string()],
            allowed_operations: HashSet::from([Operation::Read]),
            conditions: Conditions {
                ip_ranges: vec!["10.0.0.0/8".to_string()],
                ..Conditions::default()
            },
        };
        let policy = policy("ip-bound", false, document);
        let verdict = evaluator().evaluate(&policy, &ctx("prod.db", Operation::Read));
        assert!(!verdict.is_allow());
    }

    #[test]
    fn test_ttl_cap() {
        let mut capped = policy(
            "capped",
            false,
            PolicyDocument::read_only(vec!["**".to_string()]),
        );
        capped.max_ttl = Some(Duration::from_secs(3600));
        let evaluator = evaluator();

        let mut context = ctx("prod.db", Operation::Read);
        context.requested_ttl = Some(Duration::from_secs(600));
        assert!(evaluator.evaluate(&capped, &context).is_allow());

        context.requested_ttl = Some(Duration::from_secs(86_400));
        assert!(!evaluator.evaluate(&capped, &context).is_allow());
    }

    #[test]
    fn test_unknown_conditions_fail_open() {
        let document = PolicyDocument {
            allowed_secrets: vec!["**".to_string()],
            allowed_operations: HashSet::from([Operation::Read]),
            conditions: Conditions {
                extra: [("device_posture".to_string(), serde_json::json!("managed"))]
                    .into_iter()
                    .collect(),
                ..Conditions::default()
            },
        };
        let policy = policy("extended", false, document);
        assert!(
            evaluator()
                .evaluate(&policy, &ctx("prod.db", Operation::Read))
                .is_allow()
        );
    }

    // -----------------------------------------------------------------------
    // Explicit deny and multi-policy evaluation
    // -----------------------------------------------------------------------

    #[test]
    fn test_deny_policy_inverts() {
        let deny = policy(
            "no-prod",
            true,
            PolicyDocument::read_only(vec!["prod.**".to_string()]),
        );
        let evaluator = evaluator();

        // Match => deny.
        let verdict = evaluator.evaluate(&deny, &ctx("prod.db.password", Operation::Read));
        assert!(!verdict.is_allow());

        // No match => allow (inversion).
        let verdict = evaluator.evaluate(&deny, &ctx("dev.db.password", Operation::Read));
        assert!(verdict.is_allow());
    }

    #[test]
    fn test_explicit_deny_overrides_allow() {
        let allow = policy(
            "readers",
            false,
            PolicyDocument::read_only(vec!["prod.**".to_string()]),
        );
        let deny = policy(
            "no-passwords",
            true,
            PolicyDocument::read_only(vec!["prod.**.password".to_string()]),
        );
        let evaluator = evaluator();

        let decision = evaluator.evaluate_access(
            &[allow.clone(), deny.clone()],
            &ctx("prod.db.password", Operation::Read),
        );
        assert!(!decision.allowed);
        assert_eq!(decision.matched_policy.as_deref(), Some("no-passwords"));

        // Order does not change the outcome.
        let decision = evaluator.evaluate_access(
            &[deny, allow],
            &ctx("prod.db.password", Operation::Read),
        );
        assert!(!decision.allowed);
    }

    #[test]
    fn test_no_matching_policy_denies() {
        let allow = policy(
            "readers",
            false,
            PolicyDocument::read_only(vec!["dev.**".to_string()]),
        );
        let decision =
            evaluator().evaluate_access(&[allow], &ctx("prod.db.password", Operation::Read));
        assert!(!decision.allowed);
        assert_eq!(decision.reason, "no policy allows access");
        assert!(decision.matched_policy.is_none());
    }

    #[test]
    fn test_non_matching_deny_policy_grants_nothing() {
        // A deny policy that does not match must not allow by inversion
        // at the access level.
        let deny = policy(
            "no-staging",
            true,
            PolicyDocument::read_only(vec!["staging.**".to_string()]),
        );
        let decision =
            evaluator().evaluate_access(&[deny], &ctx("prod.db.password", Operation::Read));
        assert!(!decision.allowed);
        assert_eq!(decision.reason, "no policy allows access");
    }

    #[test]
    fn test_simulation_reports_every_check() {
        let policy = policy(
            "readers",
            false,
            PolicyDocument::read_only(vec!["prod.db.*".to_string()]),
        );
        let (verdict, steps) =
            evaluator().simulate(&policy, &ctx("staging.db.password", Operation::Read));

        assert!(!verdict.is_allow());
        assert_eq!(steps.len(), 6);
        assert!(steps.iter().any(|s| s.check == CheckKind::PathMatch && !s.passed));
        // Later checks still ran.
        assert!(steps.iter().any(|s| s.check == CheckKind::Ttl));
    }

    #[test]
    fn test_determinism() {
        let policy = policy(
            "readers",
            false,
            PolicyDocument::read_only(vec!["prod.**".to_string()]),
        );
        let evaluator = evaluator();
        let context = ctx("prod.db", Operation::Read);

        let first = evaluator.evaluate(&policy, &context);
        for _ in 0..10 {
            assert_eq!(evaluator.evaluate(&policy, &context), first);
        }
    }

    #[test]
    fn test_cache_respects_ip_context() {
        let document = PolicyDocument {
            allowed_secrets: vec!["**".to_string()],
            allowed_operations: HashSet::from([Operation::Read]),
            conditions: Conditions {
                ip_ranges: vec!["10.0.0.0/8".to_string()],
                ..Conditions::default()
            },
        };
        let policy = policy("ip-bound", false, document);
        let evaluator = evaluator();

        let mut context = ctx("prod.db", Operation::Read);
        context.ip_address = Some("10.1.1.1".parse().unwrap());
        assert!(evaluator.evaluate(&policy, &context).is_allow());

        // A different source IP must not hit the cached allow.
        context.ip_address = Some("192.168.1.1".parse().unwrap());
        assert!(!evaluator.evaluate(&policy, &context).is_allow());
    }
}
