//! Runtime version selection against npm-style engine constraints

use modsmith_errors::{Error, VersionError};
use semver::{Version, VersionReq};
use serde_json::Value;

/// Picks the highest candidate runtime satisfying a package's constraint
#[derive(Debug, Clone)]
pub struct VersionResolver {
    candidates: Vec<Version>,
    default_engine: String,
}

impl VersionResolver {
    /// Create a resolver over `candidates`.
    ///
    /// # Errors
    ///
    /// Returns an error if any candidate is not a valid version.
    pub fn new<I, S>(candidates: I, default_engine: impl Into<String>) -> Result<Self, Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let candidates = candidates
            .into_iter()
            .map(|v| {
                let v = v.as_ref();
                parse_version(v).ok_or_else(|| VersionError::InvalidVersion {
                    input: v.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            candidates,
            default_engine: default_engine.into(),
        })
    }

    #[must_use]
    pub fn candidates(&self) -> &[Version] {
        &self.candidates
    }

    #[must_use]
    pub fn default_engine(&self) -> &str {
        &self.default_engine
    }

    /// Highest candidate satisfying `constraint`.
    ///
    /// An unparseable constraint matches nothing.
    #[must_use]
    pub fn max_satisfying(&self, constraint: &str) -> Option<Version> {
        max_satisfying(&self.candidates, constraint)
    }

    /// Resolve for a manifest's `engines` (or legacy `engine`) field.
    ///
    /// A string is the constraint itself; otherwise `engines.node` is used
    /// when present, falling back to the default engine.
    #[must_use]
    pub fn resolve_for_manifest(&self, manifest: &Value) -> Option<Version> {
        self.max_satisfying(&self.constraint_for(manifest))
    }

    /// The constraint `resolve_for_manifest` would apply
    #[must_use]
    pub fn constraint_for(&self, manifest: &Value) -> String {
        let engines = manifest.get("engine").or_else(|| manifest.get("engines"));
        match engines {
            Some(Value::String(constraint)) => constraint.clone(),
            Some(engines) => engines
                .get("node")
                .and_then(Value::as_str)
                .unwrap_or(&self.default_engine)
                .to_string(),
            None => self.default_engine.clone(),
        }
    }
}

/// Parse a version, tolerating a leading `v` and surrounding whitespace
#[must_use]
pub fn parse_version(input: &str) -> Option<Version> {
    let trimmed = input.trim();
    Version::parse(trimmed.strip_prefix('v').unwrap_or(trimmed)).ok()
}

/// Highest of `versions` satisfying an npm range
#[must_use]
pub fn max_satisfying(versions: &[Version], constraint: &str) -> Option<Version> {
    let alternatives = parse_constraint(constraint).ok()?;
    versions
        .iter()
        .filter(|v| alternatives.iter().any(|req| req.matches(v)))
        .max()
        .cloned()
}

/// Parse an npm range into its `||` alternatives.
///
/// Handles hyphen ranges (`1.0.0 - 2.0.0`), x-ranges (`1.x`, `*`),
/// space-separated comparators (`>= 2.1.2 < 3`) and bare exact versions.
///
/// # Errors
///
/// Returns an error if no alternative parses.
pub fn parse_constraint(constraint: &str) -> Result<Vec<VersionReq>, Error> {
    let alternatives: Vec<VersionReq> = constraint
        .split("||")
        .map(str::trim)
        .filter_map(|alt| parse_range(alt).ok())
        .collect();

    if alternatives.is_empty() {
        return Err(VersionError::InvalidConstraint {
            input: constraint.to_string(),
        }
        .into());
    }
    Ok(alternatives)
}

fn parse_range(range: &str) -> Result<VersionReq, VersionError> {
    let range = range.trim();
    let invalid = || VersionError::InvalidConstraint {
        input: range.to_string(),
    };

    if range.is_empty() || matches!(range, "*" | "x" | "X" | "latest") {
        return Ok(VersionReq::STAR);
    }

    let converted = if let Some((start, end)) = parse_hyphen_range(range) {
        format!(">={start}, <={end}")
    } else {
        convert_space_separated_comparators(range)
            .split(',')
            .map(|comparator| normalize_comparator(comparator.trim()))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(invalid)?
            .join(", ")
    };

    VersionReq::parse(&converted).map_err(|_| invalid())
}

fn parse_hyphen_range(range: &str) -> Option<(String, String)> {
    let (start, end) = range.split_once(" - ")?;
    let (start, end) = (start.trim(), end.trim());
    if start.is_empty() || end.is_empty() {
        return None;
    }
    Some((strip_v(start).to_string(), strip_v(end).to_string()))
}

fn strip_v(version: &str) -> &str {
    version.strip_prefix('v').unwrap_or(version)
}

/// A bare version is exact in npm but caret in Cargo; x-ranges become
/// explicit bounds. `None` when a bound cannot be represented.
fn normalize_comparator(comparator: &str) -> Option<String> {
    let op_len = comparator
        .find(|c: char| !matches!(c, '<' | '>' | '=' | '~' | '^'))
        .unwrap_or(comparator.len());
    let (op, version) = comparator.split_at(op_len);
    let version = strip_v(version.trim());

    if has_wildcard(version) {
        return convert_x_range(op, version);
    }
    if op.is_empty() {
        // Partial versions (`18`, `18.2`) keep their implied range
        return Some(if Version::parse(version).is_ok() {
            format!("={version}")
        } else {
            format!("{version}.*")
        });
    }
    Some(format!("{op}{version}"))
}

fn has_wildcard(version: &str) -> bool {
    version
        .split('.')
        .any(|part| matches!(part, "x" | "X" | "*"))
}

fn convert_x_range(op: &str, version: &str) -> Option<String> {
    let parts: Vec<&str> = version.split('.').collect();
    let numbers: Vec<u64> = parts
        .iter()
        .take_while(|p| !matches!(**p, "x" | "X" | "*"))
        .map(|p| p.parse().ok())
        .collect::<Option<_>>()?;

    match (op, numbers.as_slice()) {
        ("", []) | ("=", []) => Some(">=0.0.0".to_string()),
        ("", [major]) | ("=", [major]) => {
            let next = major.checked_add(1)?;
            Some(format!(">={major}.0.0, <{next}.0.0"))
        }
        ("", [major, minor, ..]) | ("=", [major, minor, ..]) => {
            let next = minor.checked_add(1)?;
            Some(format!(">={major}.{minor}.0, <{major}.{next}.0"))
        }
        (op, nums) => {
            let padded: Vec<String> = nums
                .iter()
                .map(u64::to_string)
                .chain(std::iter::repeat("0".to_string()))
                .take(3)
                .collect();
            Some(format!("{op}{}", padded.join(".")))
        }
    }
}

/// npm allows `>= 2.1.2 < 3.0.0` to mean `>=2.1.2, <3.0.0`.
fn convert_space_separated_comparators(range: &str) -> String {
    let mut comparators: Vec<String> = Vec::new();
    let mut pending_op = String::new();

    for token in range.split([' ', ',']).filter(|t| !t.is_empty()) {
        if token.chars().any(|c| c.is_ascii_digit() || matches!(c, 'x' | 'X' | '*')) {
            comparators.push(format!("{pending_op}{token}"));
            pending_op.clear();
        } else {
            pending_op.push_str(token);
        }
    }

    if comparators.is_empty() {
        range.to_string()
    } else {
        comparators.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn resolver(versions: &[&str], default_engine: &str) -> VersionResolver {
        VersionResolver::new(versions.iter().copied(), default_engine).unwrap()
    }

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn bare_version_is_exact() {
        let r = resolver(&["5.0.0", "5.1.0"], "*");
        assert_eq!(r.max_satisfying("5.0.0"), Some(v("5.0.0")));
        assert_eq!(r.max_satisfying("v5.1.0"), Some(v("5.1.0")));
        assert_eq!(r.max_satisfying("5.0.1"), None);
    }

    #[test]
    fn caret_tilde_and_comparators() {
        let r = resolver(&["0.8.25", "0.10.48", "4.9.1", "5.0.0", "6.2.0"], "*");
        assert_eq!(r.max_satisfying("^4.0.0"), Some(v("4.9.1")));
        assert_eq!(r.max_satisfying("~0.8.0"), Some(v("0.8.25")));
        assert_eq!(r.max_satisfying(">=0.10 <5"), Some(v("4.9.1")));
        assert_eq!(r.max_satisfying(">= 0.8.0 < 0.11.0"), Some(v("0.10.48")));
        assert_eq!(r.max_satisfying(">=99.0.0"), None);
    }

    #[test]
    fn x_ranges_and_partials() {
        let r = resolver(&["0.8.25", "0.10.48", "4.9.1", "5.0.0"], "*");
        assert_eq!(r.max_satisfying("0.8.x"), Some(v("0.8.25")));
        assert_eq!(r.max_satisfying("4.x"), Some(v("4.9.1")));
        assert_eq!(r.max_satisfying("4"), Some(v("4.9.1")));
        assert_eq!(r.max_satisfying("*"), Some(v("5.0.0")));
        assert_eq!(r.max_satisfying(""), Some(v("5.0.0")));
    }

    #[test]
    fn hyphen_and_or_ranges() {
        let r = resolver(&["0.8.25", "0.10.48", "4.9.1", "5.0.0"], "*");
        assert_eq!(r.max_satisfying("0.8.0 - 0.10.48"), Some(v("0.10.48")));
        assert_eq!(r.max_satisfying("0.8.x || 4.x"), Some(v("4.9.1")));
        assert_eq!(r.max_satisfying("1.x || >=5"), Some(v("5.0.0")));
        assert_eq!(r.max_satisfying("garbage || 0.10.x"), Some(v("0.10.48")));
    }

    #[test]
    fn invalid_constraint_matches_nothing() {
        let r = resolver(&["5.0.0"], "*");
        assert_eq!(r.max_satisfying("not a range"), None);
        assert!(parse_constraint("???").is_err());
    }

    #[test]
    fn unbounded_x_range_matches_nothing() {
        let r = resolver(&["5.0.0"], "*");
        assert_eq!(r.max_satisfying("18446744073709551615.x"), None);
        assert_eq!(r.max_satisfying("5.18446744073709551615.x"), None);
        assert_eq!(r.max_satisfying("99999999999999999999.x"), None);
        assert_eq!(r.max_satisfying("18446744073709551615.x || 5.x"), Some(v("5.0.0")));
    }

    #[test]
    fn invalid_candidate_is_rejected() {
        let err = VersionResolver::new(["5.0"], "*").unwrap_err();
        assert!(matches!(
            err,
            Error::Version(VersionError::InvalidVersion { .. })
        ));
    }

    #[test]
    fn manifest_engines_selection() {
        let r = resolver(&["4.9.1", "5.0.0"], "4.9.1");

        assert_eq!(r.resolve_for_manifest(&json!({})), Some(v("4.9.1")));
        assert_eq!(
            r.resolve_for_manifest(&json!({"engines": {"node": ">=5"}})),
            Some(v("5.0.0"))
        );
        assert_eq!(
            r.resolve_for_manifest(&json!({"engines": "^4.0.0"})),
            Some(v("4.9.1"))
        );
        assert_eq!(
            r.resolve_for_manifest(&json!({"engine": ">=5"})),
            Some(v("5.0.0"))
        );
        assert_eq!(
            r.resolve_for_manifest(&json!({"engines": {"npm": ">=3"}})),
            Some(v("4.9.1"))
        );
        assert_eq!(
            r.resolve_for_manifest(&json!({"engines": {"node": ">=99.0.0"}})),
            None
        );
    }

    proptest! {
        #[test]
        fn result_is_always_a_candidate(
            versions in prop::collection::vec((0u64..20, 0u64..20, 0u64..20), 0..8),
            op in prop::sample::select(vec!["", ">=", "<", "^", "~", "<="]),
            target in (0u64..20, 0u64..20, 0u64..20),
        ) {
            let candidates: Vec<String> = versions
                .iter()
                .map(|(a, b, c)| format!("{a}.{b}.{c}"))
                .collect();
            let r = VersionResolver::new(&candidates, "*").unwrap();
            let constraint = format!("{op}{}.{}.{}", target.0, target.1, target.2);
            if let Some(found) = r.max_satisfying(&constraint) {
                prop_assert!(r.candidates().contains(&found));
            }
        }
    }
}
