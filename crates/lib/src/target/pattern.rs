use std::fmt;

use super::{BuildTarget, MalformedTarget, validate_base_path};

/// Selects a set of targets.
///
/// - `Single`: `//pkg:name`
/// - `Package`: every target of one package, `//pkg:`
/// - `Recursive`: every target at or below a directory, `//pkg/...`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BuildTargetPattern {
  Single(BuildTarget),
  Package(String),
  Recursive(String),
}

impl BuildTargetPattern {
  /// Parse a pattern. `PUBLIC` is accepted as a synonym for `//...` so that
  /// visibility lists can use it.
  pub fn parse(pattern: &str, current_package: Option<&str>) -> Result<Self, MalformedTarget> {
    if pattern == "PUBLIC" {
      return Ok(BuildTargetPattern::Recursive(String::new()));
    }

    if let Some(rest) = pattern.strip_prefix("//") {
      if rest == "..." {
        return Ok(BuildTargetPattern::Recursive(String::new()));
      }
      if let Some(base) = rest.strip_suffix("/...") {
        validate_base_path(base).map_err(|reason| MalformedTarget {
          target: pattern.to_string(),
          reason,
        })?;
        return Ok(BuildTargetPattern::Recursive(base.to_string()));
      }
      if let Some(base) = rest.strip_suffix(':') {
        validate_base_path(base).map_err(|reason| MalformedTarget {
          target: pattern.to_string(),
          reason,
        })?;
        return Ok(BuildTargetPattern::Package(base.to_string()));
      }
    }

    BuildTarget::parse(pattern, current_package).map(BuildTargetPattern::Single)
  }

  pub fn matches(&self, target: &BuildTarget) -> bool {
    match self {
      BuildTargetPattern::Single(t) => t == target,
      BuildTargetPattern::Package(base) => target.base_path() == base,
      BuildTargetPattern::Recursive(base) => {
        base.is_empty()
          || target.base_path() == base
          || target
            .base_path()
            .strip_prefix(base.as_str())
            .is_some_and(|rest| rest.starts_with('/'))
      }
    }
  }

  /// Whether a package directory may contain matching targets.
  pub fn covers_package(&self, base_path: &str) -> bool {
    match self {
      BuildTargetPattern::Single(t) => t.base_path() == base_path,
      BuildTargetPattern::Package(base) => base == base_path,
      BuildTargetPattern::Recursive(base) => {
        base.is_empty()
          || base == base_path
          || base_path
            .strip_prefix(base.as_str())
            .is_some_and(|rest| rest.starts_with('/'))
      }
    }
  }
}

impl fmt::Display for BuildTargetPattern {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      BuildTargetPattern::Single(t) => write!(f, "{}", t),
      BuildTargetPattern::Package(base) => write!(f, "//{}:", base),
      BuildTargetPattern::Recursive(base) if base.is_empty() => write!(f, "//..."),
      BuildTargetPattern::Recursive(base) => write!(f, "//{}/...", base),
    }
  }
}

/// Visibility check: may `consumer` depend on `dep`?
///
/// A rule is always visible inside its own package. Otherwise one of the
/// dependee's visibility patterns has to match the consumer; an empty list
/// keeps the rule private to its package.
pub fn allowed(dep: &BuildTarget, visibility: &[BuildTargetPattern], consumer: &BuildTarget) -> bool {
  dep.base_path() == consumer.base_path() || visibility.iter().any(|p| p.matches(consumer))
}

#[cfg(test)]
mod tests {
  use super::*;

  fn target(name: &str) -> BuildTarget {
    BuildTarget::parse(name, None).unwrap()
  }

  #[test]
  fn parses_each_form() {
    assert_eq!(
      BuildTargetPattern::parse("//a/b:c", None).unwrap(),
      BuildTargetPattern::Single(target("//a/b:c"))
    );
    assert_eq!(
      BuildTargetPattern::parse("//a/b:", None).unwrap(),
      BuildTargetPattern::Package("a/b".to_string())
    );
    assert_eq!(
      BuildTargetPattern::parse("//a/...", None).unwrap(),
      BuildTargetPattern::Recursive("a".to_string())
    );
    assert_eq!(
      BuildTargetPattern::parse("//...", None).unwrap(),
      BuildTargetPattern::Recursive(String::new())
    );
    assert_eq!(
      BuildTargetPattern::parse("PUBLIC", None).unwrap(),
      BuildTargetPattern::Recursive(String::new())
    );
  }

  #[test]
  fn display_round_trips_through_parse() {
    for text in ["//a/b:c", "//a/b:", "//a/...", "//..."] {
      let pattern = BuildTargetPattern::parse(text, None).unwrap();
      assert_eq!(pattern.to_string(), text);
    }
  }

  #[test]
  fn rejects_malformed_patterns() {
    assert!(BuildTargetPattern::parse("//a//b/...", None).is_err());
    assert!(BuildTargetPattern::parse("a/...", None).is_err());
    assert!(BuildTargetPattern::parse("//a/b", None).is_err());
  }

  #[test]
  fn package_pattern_matches_only_that_package() {
    let pattern = BuildTargetPattern::Package("a".to_string());
    assert!(pattern.matches(&target("//a:x")));
    assert!(!pattern.matches(&target("//a/b:x")));
  }

  #[test]
  fn recursive_pattern_respects_component_boundaries() {
    let pattern = BuildTargetPattern::Recursive("a".to_string());
    assert!(pattern.matches(&target("//a:x")));
    assert!(pattern.matches(&target("//a/b/c:x")));
    assert!(!pattern.matches(&target("//ab:x")));
    assert!(!pattern.matches(&target("//:x")));
  }

  #[test]
  fn empty_recursive_pattern_matches_everything() {
    let pattern = BuildTargetPattern::Recursive(String::new());
    assert!(pattern.matches(&target("//:x")));
    assert!(pattern.matches(&target("//deep/down:x")));
  }

  #[test]
  fn covers_package_for_discovery() {
    let pattern = BuildTargetPattern::Recursive("java".to_string());
    assert!(pattern.covers_package("java/com"));
    assert!(!pattern.covers_package("javascript"));
  }

  mod visibility {
    use super::*;

    #[test]
    fn empty_means_same_package_only() {
      let dep = target("//lib:util");
      assert!(allowed(&dep, &[], &target("//lib:app")));
      assert!(!allowed(&dep, &[], &target("//app:main")));
    }

    #[test]
    fn admits_matching_consumers() {
      let dep = target("//lib:util");
      let visibility = vec![BuildTargetPattern::parse("//app/...", None).unwrap()];
      assert!(allowed(&dep, &visibility, &target("//app/cli:main")));
      assert!(!allowed(&dep, &visibility, &target("//other:main")));
    }

    #[test]
    fn public_admits_everyone() {
      let dep = target("//lib:util");
      let visibility = vec![BuildTargetPattern::parse("PUBLIC", None).unwrap()];
      assert!(allowed(&dep, &visibility, &target("//anything/at/all:x")));
    }
  }
}
