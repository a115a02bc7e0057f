//! Key patterns used by rules, exclusion lists and key enumeration

use std::fmt;

use regex::Regex;

use crate::{CacheError, Result};

/// A pattern matched against cache keys
///
/// `Glob` patterns are literals where `*` matches any run of characters
/// and `?` matches exactly one. `Regex` patterns are compiled expressions
/// and are compared by their source text.
#[derive(Debug, Clone)]
pub enum KeyPattern {
    /// Literal with `*` / `?` wildcards
    Glob(String),
    /// Compiled regular expression
    Regex(Regex),
}

impl KeyPattern {
    /// Create a wildcard pattern
    pub fn glob(pattern: impl Into<String>) -> Self {
        KeyPattern::Glob(pattern.into())
    }

    /// Compile a regular expression pattern
    pub fn regex(expr: &str) -> Result<Self> {
        Regex::new(expr)
            .map(KeyPattern::Regex)
            .map_err(|e| CacheError::InvalidPattern(e.to_string()))
    }

    /// Check whether the key matches this pattern
    pub fn matches(&self, key: &str) -> bool {
        match self {
            KeyPattern::Glob(pattern) => glob_match(pattern, key),
            KeyPattern::Regex(regex) => regex.is_match(key),
        }
    }

    /// The pattern's source text
    pub fn as_str(&self) -> &str {
        match self {
            KeyPattern::Glob(pattern) => pattern,
            KeyPattern::Regex(regex) => regex.as_str(),
        }
    }
}

impl PartialEq for KeyPattern {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (KeyPattern::Glob(a), KeyPattern::Glob(b)) => a == b,
            (KeyPattern::Regex(a), KeyPattern::Regex(b)) => a.as_str() == b.as_str(),
            _ => false,
        }
    }
}

impl Eq for KeyPattern {}

impl fmt::Display for KeyPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPattern::Glob(pattern) => write!(f, "{}", pattern),
            KeyPattern::Regex(regex) => write!(f, "/{}/", regex.as_str()),
        }
    }
}

impl From<&str> for KeyPattern {
    fn from(pattern: &str) -> Self {
        KeyPattern::glob(pattern)
    }
}

impl From<String> for KeyPattern {
    fn from(pattern: String) -> Self {
        KeyPattern::Glob(pattern)
    }
}

impl From<Regex> for KeyPattern {
    fn from(regex: Regex) -> Self {
        KeyPattern::Regex(regex)
    }
}

/// Wildcard match with backtracking on the last `*`
fn glob_match(pattern: &str, key: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let key: Vec<char> = key.chars().collect();

    let (mut p, mut k) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while k < key.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == key[k]) {
            p += 1;
            k += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            star = Some((p, k));
            p += 1;
        } else if let Some((star_p, star_k)) = star {
            p = star_p + 1;
            k = star_k + 1;
            star = Some((star_p, star_k + 1));
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|c| *c == '*')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_literal() {
        let pattern = KeyPattern::glob("product:1");
        assert!(pattern.matches("product:1"));
        assert!(!pattern.matches("product:10"));
    }

    #[test]
    fn test_glob_wildcards() {
        let pattern = KeyPattern::glob("product:*");
        assert!(pattern.matches("product:1"));
        assert!(pattern.matches("product:"));
        assert!(!pattern.matches("order:1"));

        let pattern = KeyPattern::glob("*:inventory:*");
        assert!(pattern.matches("warehouse:inventory:42"));
        assert!(!pattern.matches("warehouse:orders:42"));

        let pattern = KeyPattern::glob("user:?");
        assert!(pattern.matches("user:7"));
        assert!(!pattern.matches("user:77"));
    }

    #[test]
    fn test_match_all() {
        assert!(KeyPattern::glob("*").matches(""));
        assert!(KeyPattern::glob("*").matches("anything"));
    }

    #[test]
    fn test_regex_pattern() {
        let pattern = KeyPattern::regex(r"^order:\d+$").unwrap();
        assert!(pattern.matches("order:123"));
        assert!(!pattern.matches("order:abc"));
    }

    #[test]
    fn test_invalid_regex() {
        let err = KeyPattern::regex("order:(").unwrap_err();
        assert!(matches!(err, CacheError::InvalidPattern(_)));
    }

    #[test]
    fn test_structural_equality() {
        assert_eq!(KeyPattern::glob("a:*"), KeyPattern::glob("a:*"));
        assert_eq!(
            KeyPattern::regex("^a").unwrap(),
            KeyPattern::regex("^a").unwrap()
        );
        assert_ne!(KeyPattern::glob("^a"), KeyPattern::regex("^a").unwrap());
    }
}
