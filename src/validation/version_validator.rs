//! Version Validator - semantic version utilities for revisions and bumps
//!
//! Every version comparison in the crate goes through this module; there is
//! no string-based fallback. It also owns the produced-version format
//! `{base}-depup.{index}`.
//!
//! # Example
//!
//! ```
//! use depup::validation::version_validator::{produce_version, VersionValidator};
//!
//! assert_eq!(produce_version("1.2.3", 4), "1.2.3-depup.4");
//!
//! let validator = VersionValidator::new();
//! assert_eq!(validator.is_newer("4.17.21", "^4.17.15"), Some(true));
//! ```

use semver::Version;

/// Historical separator written by older releases (`1.0.0-depup_3`)
const LEGACY_SEPARATOR: &str = "-depup_";
const SEPARATOR: &str = "-depup.";

/// Version string of revision `index` of `base_version`
pub fn produce_version(base_version: &str, index: u64) -> String {
    format!("{}{}{}", base_version, SEPARATOR, index)
}

/// Rewrite the legacy `_` separator into the current `.` form
///
/// Versions that do not carry the legacy marker are returned unchanged.
pub fn repair_legacy_version(version: &str) -> String {
    match version.rfind(LEGACY_SEPARATOR) {
        Some(at) => format!(
            "{}{}{}",
            &version[..at],
            SEPARATOR,
            &version[at + LEGACY_SEPARATOR.len()..]
        ),
        None => version.to_string(),
    }
}

/// Split a produced version back into `(base_version, index)`
///
/// Accepts the legacy `_` separator as well.
pub fn parse_produced_version(version: &str) -> Option<(String, u64)> {
    let repaired = repair_legacy_version(version);
    let at = repaired.rfind(SEPARATOR)?;
    let base = &repaired[..at];
    let index = &repaired[at + SEPARATOR.len()..];

    if base.is_empty() || index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((base.to_string(), index.parse().ok()?))
}

/// Range anchoring and comparison for dependency bumps
pub struct VersionValidator;

impl Default for VersionValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl VersionValidator {
    pub fn new() -> Self {
        Self
    }

    /// Parse a declared dependency range into the version it is anchored at
    ///
    /// Strips one leading operator (`^`, `~`, `>=`, `=`) and a `v` prefix,
    /// then pads partial versions (`1` → `1.0.0`, `1.2` → `1.2.0`;
    /// `x`/`*` components count as `0`). Returns `None` for anything that is
    /// still not a plain semver version afterwards.
    pub fn strip_range(&self, declared: &str) -> Option<Version> {
        let mut s = declared.trim();
        for operator in [">=", "^", "~", "="] {
            if let Some(rest) = s.strip_prefix(operator) {
                s = rest.trim_start();
                break;
            }
        }
        s = s
            .strip_prefix('v')
            .or_else(|| s.strip_prefix('V'))
            .unwrap_or(s);

        let core_end = s.find(['-', '+']).unwrap_or(s.len());
        let (core, suffix) = s.split_at(core_end);
        // a wildcard major (`*`, `x`) anchors nothing
        let mut parts: Vec<&str> = core
            .split('.')
            .enumerate()
            .map(|(i, p)| match p {
                "x" | "X" | "*" if i > 0 => "0",
                _ => p,
            })
            .collect();
        if parts.is_empty() || parts.len() > 3 || parts.iter().any(|p| p.is_empty()) {
            return None;
        }
        while parts.len() < 3 {
            parts.push("0");
        }

        Version::parse(&format!("{}{}", parts.join("."), suffix)).ok()
    }

    /// Whether `latest` is strictly greater than the version `declared`
    /// is anchored at
    ///
    /// # Examples
    ///
    /// ```
    /// use depup::validation::version_validator::VersionValidator;
    ///
    /// let validator = VersionValidator::new();
    /// assert_eq!(validator.is_newer("1.10.0", "~1.9.0"), Some(true));
    /// assert_eq!(validator.is_newer("1.2.0", "^1.2"), Some(false));
    /// assert_eq!(validator.is_newer("2.0.0", "latest"), None);
    /// ```
    pub fn is_newer(&self, latest: &str, declared: &str) -> Option<bool> {
        let latest = Version::parse(latest.trim()).ok()?;
        let declared = self.strip_range(declared)?;
        Some(latest > declared)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_produce_version() {
        assert_eq!(produce_version("1.0.0", 0), "1.0.0-depup.0");
        assert_eq!(produce_version("4.17.21", 12), "4.17.21-depup.12");
    }

    #[test]
    fn test_produced_version_is_valid_semver() {
        let version = Version::parse(&produce_version("2.3.4", 7)).unwrap();

        assert_eq!(version.pre.as_str(), "depup.7");
        assert!(version > Version::new(2, 3, 3));
        // revision 10 sorts after revision 9
        assert!(
            Version::parse(&produce_version("1.0.0", 10)).unwrap()
                > Version::parse(&produce_version("1.0.0", 9)).unwrap()
        );
    }

    #[test]
    fn test_parse_produced_version() {
        for (base, index) in [("1.0.0", 0), ("0.0.1-beta.2", 3), ("10.2.0", 41)] {
            let produced = produce_version(base, index);
            assert_eq!(
                parse_produced_version(&produced),
                Some((base.to_string(), index))
            );
        }
    }

    #[test]
    fn test_parse_legacy_version() {
        assert_eq!(
            parse_produced_version("1.0.0-depup_3"),
            Some(("1.0.0".to_string(), 3))
        );
        assert_eq!(repair_legacy_version("1.0.0-depup_3"), "1.0.0-depup.3");
        assert_eq!(repair_legacy_version("1.0.0-depup.3"), "1.0.0-depup.3");
    }

    #[test]
    fn test_parse_produced_version_rejects_malformed() {
        assert_eq!(parse_produced_version("1.0.0"), None);
        assert_eq!(parse_produced_version("1.0.0-depup."), None);
        assert_eq!(parse_produced_version("1.0.0-depup.x"), None);
        assert_eq!(parse_produced_version("-depup.1"), None);
    }

    #[test]
    fn test_strip_range_operators() {
        let validator = VersionValidator::new();
        let expected = Version::new(1, 2, 3);

        for declared in ["1.2.3", "^1.2.3", "~1.2.3", ">=1.2.3", "=1.2.3", "v1.2.3", "^ 1.2.3"] {
            assert_eq!(validator.strip_range(declared), Some(expected.clone()), "{}", declared);
        }
    }

    #[test]
    fn test_strip_range_pads_partial_versions() {
        let validator = VersionValidator::new();
        assert_eq!(validator.strip_range("^1"), Some(Version::new(1, 0, 0)));
        assert_eq!(validator.strip_range("~1.2"), Some(Version::new(1, 2, 0)));
        assert_eq!(validator.strip_range("1.x"), Some(Version::new(1, 0, 0)));
    }

    #[test]
    fn test_strip_range_rejects_non_semver() {
        let validator = VersionValidator::new();
        for declared in ["latest", "*", "", ">=1.0.0 <2.0.0", "1 || 2", "git+https://x", "1.2.3.4"] {
            assert_eq!(validator.strip_range(declared), None, "{}", declared);
        }
    }

    #[test]
    fn test_is_newer_uses_semver_ordering() {
        let validator = VersionValidator::new();
        // string ordering would say "1.10.0" < "1.9.0"
        assert_eq!(validator.is_newer("1.10.0", "^1.9.0"), Some(true));
        assert_eq!(validator.is_newer("1.9.0", "^1.10.0"), Some(false));
        assert_eq!(validator.is_newer("1.2.3", "^1.2.3"), Some(false));
        assert_eq!(validator.is_newer("2.0.0-rc.1", "^2.0.0"), Some(false));
    }
}
