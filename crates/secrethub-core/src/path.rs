//! Reverse-domain secret paths.
//!
//! A secret path is a dot-separated sequence of labels in reverse-domain
//! order, e.g. `prod.db.postgres.password`. Labels are limited to
//! `[a-zA-Z0-9_-]+` and the whole path to 512 characters. Paths are unique
//! per cluster.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Maximum length of a secret path in characters.
pub const MAX_PATH_LEN: usize = 512;

/// Errors from secret path validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    /// The path was empty.
    #[error("secret path is empty")]
    Empty,

    /// The path exceeded [`MAX_PATH_LEN`].
    #[error("secret path exceeds {MAX_PATH_LEN} characters (got {0})")]
    TooLong(usize),

    /// A label was empty (leading, trailing, or doubled dot).
    #[error("secret path has an empty label: {0:?}")]
    EmptyLabel(String),

    /// A label contained a character outside `[a-zA-Z0-9_-]`.
    #[error("secret path label {label:?} contains invalid character {ch:?}")]
    InvalidCharacter {
        /// The offending label.
        label: String,
        /// The first invalid character in it.
        ch: char,
    },
}

/// A validated reverse-domain secret path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SecretPath(String);

impl SecretPath {
    /// Validate and construct a path.
    ///
    /// # Errors
    ///
    /// Returns a [`PathError`] describing the first violated rule.
    pub fn parse(raw: impl Into<String>) -> Result<Self, PathError> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(PathError::Empty);
        }
        if raw.len() > MAX_PATH_LEN {
            return Err(PathError::TooLong(raw.len()));
        }
        for label in raw.split('.') {
            if label.is_empty() {
                return Err(PathError::EmptyLabel(raw));
            }
            if let Some(ch) = label
                .chars()
                .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
            {
                return Err(PathError::InvalidCharacter {
                    label: label.to_string(),
                    ch,
                });
            }
        }
        Ok(Self(raw))
    }

    /// The path as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Iterate over the dot-separated labels.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.0.split('.')
    }
}

impl fmt::Display for SecretPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SecretPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl<'de> Deserialize<'de> for SecretPath {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Self::parse(raw).map_err(serde::de::Error::custom)
    }
}

impl AsRef<str> for SecretPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_paths() {
        for p in [
            "prod.db.postgres.password",
            "dev.x",
            "a",
            "svc_name.api-key",
            "A1.B2.c3",
        ] {
            assert!(SecretPath::parse(p).is_ok(), "{p} should be valid");
        }
    }

    #[test]
    fn test_empty_rejected() {
        assert_eq!(SecretPath::parse(""), Err(PathError::Empty));
    }

    #[test]
    fn test_empty_label_rejected() {
        assert!(matches!(
            SecretPath::parse("prod..db"),
            Err(PathError::EmptyLabel(_))
        ));
        assert!(matches!(
            SecretPath::parse(".prod"),
            Err(PathError::EmptyLabel(_))
        ));
        assert!(matches!(
            SecretPath::parse("prod."),
            Err(PathError::EmptyLabel(_))
        ));
    }

    #[test]
    fn test_invalid_character_rejected() {
        assert!(matches!(
            SecretPath::parse("prod.db/postgres"),
            Err(PathError::InvalidCharacter { ch: '/', .. })
        ));
        assert!(matches!(
            SecretPath::parse("prod.db postgres"),
            Err(PathError::InvalidCharacter { ch: ' ', .. })
        ));
    }

    #[test]
    fn test_length_limit() {
        let long = "a".repeat(MAX_PATH_LEN);
        assert!(SecretPath::parse(long.as_str()).is_ok());

        let too_long = "a".repeat(MAX_PATH_LEN + 1);
        assert!(matches!(
            SecretPath::parse(too_long.as_str()),
            Err(PathError::TooLong(_))
        ));
    }

    #[test]
    fn test_labels() {
        let path = SecretPath::parse("prod.db.postgres").unwrap();
        let labels: Vec<_> = path.labels().collect();
        assert_eq!(labels, vec!["prod", "db", "postgres"]);
    }

    #[test]
    fn test_deserialize_validates() {
        let ok: Result<SecretPath, _> = serde_json::from_str("\"prod.db\"");
        assert!(ok.is_ok());

        let bad: Result<SecretPath, _> = serde_json::from_str("\"prod..db\"");
        assert!(bad.is_err());
    }
}
