//! Dot-glob matching for secret paths.
//!
//! Patterns are dot-separated like the paths they match. `.` is a literal
//! separator; `*` matches exactly one label (`[^.]+`); `**` matches any
//! number of labels, including zero. Patterns are anchored at both ends:
//!
//! | Pattern | `prod.db` | `prod.db.postgres` | `prod` |
//! |---------|-----------|--------------------|--------|
//! | `prod.*` | yes | no | no |
//! | `prod.**` | yes | yes | yes |
//! | `prod.*.password` | — matches `prod.db.password` only | | |

use regex::Regex;

use crate::error::{PolicyError, PolicyResult};

/// Compile a dot-glob into an anchored regex.
///
/// Wildcards must stand alone as a whole label: `prod.*` is valid,
/// `prod.db*` is not.
///
/// # Errors
///
/// Returns [`PolicyError::InvalidGlob`] for empty patterns, empty labels,
/// partial wildcards, or labels outside `[a-zA-Z0-9_-]`.
pub fn compile(pattern: &str) -> PolicyResult<Regex> {
    let invalid = |reason: &str| PolicyError::InvalidGlob {
        pattern: pattern.to_string(),
        reason: reason.to_string(),
    };

    if pattern.is_empty() {
        return Err(invalid("empty pattern"));
    }

    let segments: Vec<&str> = pattern.split('.').collect();
    let mut out = String::from("^");
    let mut need_sep = false;

    for (index, segment) in segments.iter().enumerate() {
        let last = index == segments.len() - 1;
        match *segment {
            "" => return Err(invalid("empty label")),
            "**" if need_sep => out.push_str("(\\.[^.]+)*"),
            "**" if last => out.push_str("[^.]+(\\.[^.]+)*"),
            "**" => out.push_str("([^.]+\\.)*"),
            "*" => {
                if need_sep {
                    out.push_str("\\.");
                }
                out.push_str("[^.]+");
                need_sep = true;
            },
            label => {
                if label.contains('*') {
                    return Err(invalid("wildcards must be whole labels"));
                }
                if !label
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
                {
                    return Err(invalid("label contains invalid characters"));
                }
                if need_sep {
                    out.push_str("\\.");
                }
                out.push_str(&regex::escape(label));
                need_sep = true;
            },
        }
    }
    out.push('$');

    Regex::new(&out).map_err(|e| invalid(&e.to_string()))
}

/// Whether `path` matches the dot-glob `pattern`.
///
/// # Errors
///
/// Returns [`PolicyError::InvalidGlob`] if the pattern fails to compile.
pub fn matches(pattern: &str, path: &str) -> PolicyResult<bool> {
    Ok(compile(pattern)?.is_match(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(pattern: &str, path: &str) -> bool {
        matches(pattern, path).unwrap()
    }

    #[test]
    fn test_single_star_matches_one_segment() {
        assert!(check("prod.*", "prod.db"));
        assert!(!check("prod.*", "prod.db.postgres"));
        assert!(!check("prod.*", "prod"));
        assert!(!check("prod.*", "staging.db"));
    }

    #[test]
    fn test_double_star_matches_any_depth() {
        assert!(check("prod.**", "prod.db"));
        assert!(check("prod.**", "prod.db.postgres"));
        assert!(check("prod.**", "prod.db.postgres.password"));
        // Zero segments.
        assert!(check("prod.**", "prod"));
        assert!(!check("prod.**", "staging.db"));
    }

    #[test]
    fn test_star_in_the_middle() {
        assert!(check("prod.*.password", "prod.db.password"));
        assert!(!check("prod.*.password", "prod.password"));
        assert!(!check("prod.*.password", "prod.db.postgres.password"));
    }

    #[test]
    fn test_double_star_in_the_middle() {
        assert!(check("prod.**.password", "prod.password"));
        assert!(check("prod.**.password", "prod.db.password"));
        assert!(check("prod.**.password", "prod.db.postgres.password"));
        assert!(!check("prod.**.password", "prod.db.secret"));
    }

    #[test]
    fn test_leading_double_star() {
        assert!(check("**.password", "password"));
        assert!(check("**.password", "db.password"));
        assert!(check("**.password", "prod.db.password"));
        assert!(!check("**.password", "prod.db.secret"));
    }

    #[test]
    fn test_bare_double_star() {
        assert!(check("**", "anything"));
        assert!(check("**", "a.b.c"));
    }

    #[test]
    fn test_literal_match_is_anchored() {
        assert!(check("prod.db", "prod.db"));
        assert!(!check("prod.db", "prod.db.postgres"));
        assert!(!check("prod.db", "xprod.db"));
    }

    #[test]
    fn test_dot_is_literal() {
        // A dot in the pattern never matches a non-dot character.
        assert!(!check("prod.db", "prodxdb"));
    }

    #[test]
    fn test_invalid_patterns() {
        assert!(matches("", "x").is_err());
        assert!(matches("prod..db", "x").is_err());
        assert!(matches("prod.db*", "x").is_err());
        assert!(matches("prod.d/b", "x").is_err());
    }
}
