//! Pattern filtering of discovered units

use crate::error::ConfigError;
use crate::test_discovery::TestUnit;

/// Keep the units whose path contains `pattern` as a literal,
/// case-sensitive substring. An absent or empty pattern keeps everything.
/// Input order is preserved.
pub fn filter_units(units: &[TestUnit], pattern: Option<&str>) -> Vec<TestUnit> {
    match pattern {
        Some(pattern) if !pattern.is_empty() => units
            .iter()
            .filter(|unit| unit.path.to_string_lossy().contains(pattern))
            .cloned()
            .collect(),
        _ => units.to_vec(),
    }
}

/// Reject patterns that can never match a path.
pub fn validate_pattern(pattern: &str) -> Result<(), ConfigError> {
    if let Some(bad) = pattern.chars().find(|c| matches!(c, '\0' | '\n' | '\r')) {
        return Err(ConfigError::InvalidPattern {
            pattern: pattern.to_string(),
            message: format!("contains control character {:?}", bad),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use std::path::Path;
    use std::time::UNIX_EPOCH;

    fn units() -> Vec<TestUnit> {
        let root = Path::new("tests");
        ["tests/test_math.c", "tests/net/test_socket.c", "tests/Test_Upper.c"]
            .iter()
            .map(|p| TestUnit::new(*p, root, DateTime::<Utc>::from(UNIX_EPOCH)))
            .collect()
    }

    fn names(units: &[TestUnit]) -> Vec<&str> {
        units.iter().map(|u| u.name.as_str()).collect()
    }

    #[test]
    fn test_substring_match_preserves_order() {
        let filtered = filter_units(&units(), Some("test_"));
        assert_eq!(names(&filtered), vec!["test_math", "net/test_socket"]);
    }

    #[test]
    fn test_match_is_case_sensitive_and_literal() {
        assert_eq!(names(&filter_units(&units(), Some("Test_"))), vec!["Test_Upper"]);
        assert!(filter_units(&units(), Some("test_*.c")).is_empty());
        assert_eq!(names(&filter_units(&units(), Some("net/"))), vec!["net/test_socket"]);
    }

    #[test]
    fn test_empty_or_absent_pattern_is_identity() {
        assert_eq!(filter_units(&units(), None), units());
        assert_eq!(filter_units(&units(), Some("")), units());
    }

    #[test]
    fn test_filter_is_idempotent() {
        for pattern in ["math", "test", "zzz", ""] {
            let once = filter_units(&units(), Some(pattern));
            let twice = filter_units(&once, Some(pattern));
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_validate_pattern() {
        assert!(validate_pattern("net/test_").is_ok());
        assert!(validate_pattern("").is_ok());
        assert!(matches!(
            validate_pattern("a\0b"),
            Err(ConfigError::InvalidPattern { .. })
        ));
        assert!(validate_pattern("line\nbreak").is_err());
    }
}
