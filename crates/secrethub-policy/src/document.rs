//! Policy model and document validation.
//!
//! A policy document names the secrets it covers (dot-globs), the
//! operations it allows, and the conditions under which it applies.
//! Documents are validated when written, never when evaluated: a stored
//! policy is guaranteed well-formed.

use chrono::{DateTime, NaiveTime, Utc, Weekday};
use secrethub_core::{EntityId, Operation, PolicyId};
use secrethub_storage::PolicyRecord;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::Duration;

use crate::cidr::Cidr;
use crate::error::{PolicyError, PolicyResult};
use crate::glob;

/// A fully validated policy ready for evaluation.
#[derive(Debug, Clone)]
pub struct Policy {
    /// Record identity.
    pub id: PolicyId,
    /// Unique name.
    pub name: String,
    /// Explicit-deny flag: a matching policy denies instead of allows.
    pub deny: bool,
    /// The document.
    pub document: PolicyDocument,
    /// Entities the policy applies to; empty means all.
    pub entity_bindings: Vec<EntityId>,
    /// Cap on requested TTLs.
    pub max_ttl: Option<Duration>,
}

impl Policy {
    /// Decode and validate a stored record.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::InvalidDocument`] if the stored JSON does
    /// not deserialize or fails validation, which indicates the record
    /// bypassed the service layer.
    pub fn from_record(record: &PolicyRecord) -> PolicyResult<Self> {
        let document: PolicyDocument = serde_json::from_value(record.document.clone())
            .map_err(|e| PolicyError::InvalidDocument(e.to_string()))?;
        document.validate()?;
        Ok(Self {
            id: record.id,
            name: record.name.clone(),
            deny: record.deny,
            document,
            entity_bindings: record.entity_bindings.clone(),
            max_ttl: record
                .max_ttl_secs
                .and_then(|secs| u64::try_from(secs).ok())
                .map(Duration::from_secs),
        })
    }
}

fn default_operations() -> HashSet<Operation> {
    HashSet::from([Operation::Read])
}

/// The allow/deny document: globs, operations, conditions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyDocument {
    /// Dot-glob patterns over secret paths. At least one is required.
    pub allowed_secrets: Vec<String>,
    /// Operations the policy covers. Defaults to `{read}`.
    #[serde(default = "default_operations")]
    pub allowed_operations: HashSet<Operation>,
    /// Conditions narrowing when the policy applies.
    #[serde(default)]
    pub conditions: Conditions,
}

impl PolicyDocument {
    /// A document covering `patterns` for reading.
    #[must_use]
    pub fn read_only(patterns: Vec<String>) -> Self {
        Self {
            allowed_secrets: patterns,
            allowed_operations: default_operations(),
            conditions: Conditions::default(),
        }
    }

    /// Validate the document schema: glob syntax, condition formats,
    /// CIDR ranges.
    ///
    /// # Errors
    ///
    /// Returns the first structural problem found.
    pub fn validate(&self) -> PolicyResult<()> {
        if self.allowed_secrets.is_empty() {
            return Err(PolicyError::InvalidDocument(
                "allowed_secrets must contain at least one pattern".to_string(),
            ));
        }
        for pattern in &self.allowed_secrets {
            glob::compile(pattern)?;
        }
        if self.allowed_operations.is_empty() {
            return Err(PolicyError::InvalidDocument(
                "allowed_operations must not be empty".to_string(),
            ));
        }
        self.conditions.validate()
    }
}

/// Conditions narrowing when a policy applies. All configured conditions
/// must hold; absent conditions hold trivially.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Conditions {
    /// Daily window `"HH:MM-HH:MM"` in UTC. Windows may wrap midnight.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_of_day: Option<String>,
    /// Weekday names (`"monday"`, `"tue"`, ...), evaluated in UTC.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub days_of_week: Option<Vec<String>>,
    /// Absolute validity window.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_range: Option<DateRange>,
    /// CIDR ranges the request source must fall in. Empty means any.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ip_ranges: Vec<String>,
    /// Unrecognized condition keys. Evaluated as satisfied (fail-open)
    /// with a warning, matching the recorded source behavior.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl Conditions {
    /// Validate condition formats.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::InvalidCondition`] or
    /// [`PolicyError::InvalidCidr`] for malformed values.
    pub fn validate(&self) -> PolicyResult<()> {
        if let Some(window) = &self.time_of_day {
            parse_time_window(window)?;
        }
        if let Some(days) = &self.days_of_week {
            for day in days {
                parse_weekday(day)?;
            }
        }
        if let Some(range) = &self.date_range
            && range.from > range.to
        {
            return Err(PolicyError::InvalidCondition(format!(
                "date_range from {} is after to {}",
                range.from, range.to
            )));
        }
        for range in &self.ip_ranges {
            Cidr::parse(range)?;
        }
        Ok(())
    }

    /// Whether any condition is configured at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.time_of_day.is_none()
            && self.days_of_week.is_none()
            && self.date_range.is_none()
            && self.ip_ranges.is_empty()
            && self.extra.is_empty()
    }

    /// Whether the policy constrains request time.
    #[must_use]
    pub fn time_dependent(&self) -> bool {
        self.time_of_day.is_some() || self.days_of_week.is_some() || self.date_range.is_some()
    }
}

/// An absolute validity window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    /// Inclusive start.
    pub from: DateTime<Utc>,
    /// Inclusive end.
    pub to: DateTime<Utc>,
}

/// Parse `"HH:MM-HH:MM"`.
///
/// # Errors
///
/// Returns [`PolicyError::InvalidCondition`] for malformed windows.
pub fn parse_time_window(window: &str) -> PolicyResult<(NaiveTime, NaiveTime)> {
    let invalid =
        || PolicyError::InvalidCondition(format!("time_of_day {window:?} is not HH:MM-HH:MM"));
    let (start, end) = window.split_once('-').ok_or_else(invalid)?;
    let start = NaiveTime::parse_from_str(start.trim(), "%H:%M").map_err(|_| invalid())?;
    let end = NaiveTime::parse_from_str(end.trim(), "%H:%M").map_err(|_| invalid())?;
    Ok((start, end))
}

/// Whether `at` falls inside the (possibly midnight-wrapping) window.
#[must_use]
pub fn time_in_window(at: NaiveTime, start: NaiveTime, end: NaiveTime) -> bool {
    if start <= end {
        at >= start && at <= end
    } else {
        // Overnight window, e.g. 22:00-06:00.
        at >= start || at <= end
    }
}

/// Parse a weekday name (full or abbreviated, any case).
///
/// # Errors
///
/// Returns [`PolicyError::InvalidCondition`] for unknown names.
pub fn parse_weekday(day: &str) -> PolicyResult<Weekday> {
    day.trim()
        .parse::<Weekday>()
        .map_err(|_| PolicyError::InvalidCondition(format!("unknown weekday {day:?}")))
}
