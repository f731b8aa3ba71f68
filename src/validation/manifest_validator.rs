//! Manifest Validator - checks a rewritten manifest before it is published
//!
//! A republished manifest must carry the reserved scope, must be a valid
//! npm package name and must not declare install or uninstall lifecycle
//! hooks.
//!
//! # Example
//!
//! ```
//! use depup::validation::manifest_validator::{scoped_name, ManifestValidator};
//!
//! assert_eq!(scoped_name("lodash", "@depup"), "@depup/lodash");
//! assert_eq!(scoped_name("@babel/core", "@depup"), "@depup/babel__core");
//!
//! let validator = ManifestValidator::new("@depup");
//! assert!(validator.validate_name("@depup/lodash").is_empty());
//! ```

use crate::core::error::{DepupError, Result};
use crate::core::manifest::PackageManifest;
use crate::core::types::package_dir_name;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Lifecycle hooks that would run on the consumer's machine
pub const DISALLOWED_SCRIPTS: &[&str] = &[
    "preinstall",
    "install",
    "postinstall",
    "preuninstall",
    "uninstall",
    "postuninstall",
];

/// npm's limit on the full (scoped) name
const MAX_NAME_LENGTH: usize = 214;

lazy_static! {
    static ref NAME_CHARS_REGEX: Regex = Regex::new(r"^[a-z0-9._-]+$").unwrap();
    static ref URL_SAFE_REGEX: Regex = Regex::new(r"^[@a-z0-9._/-]+$").unwrap();
}

/// Name the package is republished under
///
/// `lodash` becomes `@depup/lodash`; a scoped `@org/pkg` is flattened to
/// `@depup/org__pkg` since npm names carry a single scope.
pub fn scoped_name(original: &str, scope: &str) -> String {
    format!("{}/{}", scope.trim_end_matches('/'), package_dir_name(original))
}

/// Result of manifest validation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// Convert into the publish validation error carrying every message
    pub fn into_result(self, package: &str) -> Result<Vec<String>> {
        if self.is_valid {
            Ok(self.warnings)
        } else {
            Err(DepupError::PublishValidation {
                package: package.to_string(),
                message: self.errors.join("; "),
            })
        }
    }
}

/// Validator for manifests about to be published under a scope
pub struct ManifestValidator {
    scope: String,
}

impl ManifestValidator {
    pub fn new(scope: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
        }
    }

    /// Validate a rewritten manifest
    pub fn validate(&self, manifest: &PackageManifest) -> ValidationResult {
        let mut errors = self.validate_name(&manifest.name);
        let mut warnings = Vec::new();

        let prefix = format!("{}/", self.scope);
        if !manifest.name.starts_with(&prefix) {
            errors.push(format!(
                "name \"{}\" does not carry the reserved scope {}",
                manifest.name, self.scope
            ));
        }

        let hooks: Vec<&str> = DISALLOWED_SCRIPTS
            .iter()
            .copied()
            .filter(|hook| manifest.scripts.contains_key(*hook))
            .collect();
        if !hooks.is_empty() {
            errors.push(format!("disallowed lifecycle scripts: {}", hooks.join(", ")));
        }

        if manifest.version.is_empty() {
            errors.push("missing required field: version".to_string());
        } else if semver::Version::parse(&manifest.version).is_err() {
            errors.push(format!("version \"{}\" is not valid semver", manifest.version));
        }

        if manifest.extra.get("private").and_then(|v| v.as_bool()) == Some(true) {
            warnings.push("manifest is marked private; npm will refuse to publish it".to_string());
        }

        ValidationResult {
            is_valid: errors.is_empty(),
            errors,
            warnings,
        }
    }

    /// npm package-name rules
    pub fn validate_name(&self, name: &str) -> Vec<String> {
        let mut errors = Vec::new();

        if name.is_empty() {
            errors.push("missing required field: name".to_string());
            return errors;
        }

        if name.len() > MAX_NAME_LENGTH {
            errors.push(format!(
                "name must be at most {} characters",
                MAX_NAME_LENGTH
            ));
        }

        let name_without_scope = match name.strip_prefix('@') {
            Some(scoped) => scoped.split_once('/').map(|(_, n)| n).unwrap_or(scoped),
            None => name,
        };

        if !NAME_CHARS_REGEX.is_match(name_without_scope) {
            errors.push(
                "name may only contain lowercase letters, digits, '-', '_' and '.'".to_string(),
            );
        }

        if name_without_scope.starts_with('.') || name_without_scope.starts_with('_') {
            errors.push("name cannot start with '.' or '_'".to_string());
        }

        if !URL_SAFE_REGEX.is_match(name) {
            errors.push("name must only contain URL-safe characters".to_string());
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest(name: &str, scripts: &[(&str, &str)]) -> PackageManifest {
        PackageManifest {
            name: name.to_string(),
            version: "1.0.0-depup.0".to_string(),
            scripts: scripts
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_scoped_name() {
        assert_eq!(scoped_name("lodash", "@depup"), "@depup/lodash");
        assert_eq!(scoped_name("@types/node", "@depup"), "@depup/types__node");
        assert_eq!(scoped_name("chalk", "@mirror/"), "@mirror/chalk");
    }

    #[test]
    fn test_valid_manifest() {
        let validator = ManifestValidator::new("@depup");
        let result = validator.validate(&manifest(
            "@depup/lodash",
            &[("test", "mocha"), ("prepublishOnly", "npm test")],
        ));

        assert!(result.is_valid, "{:?}", result.errors);
        assert!(result.into_result("@depup/lodash").is_ok());
    }

    #[test]
    fn test_missing_scope_prefix() {
        let validator = ManifestValidator::new("@depup");
        let result = validator.validate(&manifest("lodash", &[]));

        assert!(!result.is_valid);
        assert!(result.errors[0].contains("reserved scope"));
    }

    #[test]
    fn test_prefix_match_requires_separator() {
        let validator = ManifestValidator::new("@depup");
        let result = validator.validate(&manifest("@depupx/lodash", &[]));
        assert!(!result.is_valid);
    }

    #[test]
    fn test_each_disallowed_hook_is_rejected() {
        let validator = ManifestValidator::new("@depup");

        for hook in DISALLOWED_SCRIPTS {
            let result = validator.validate(&manifest("@depup/pkg", &[(hook, "node x.js")]));
            assert!(!result.is_valid, "{}", hook);

            let error = result.into_result("@depup/pkg").unwrap_err();
            assert_eq!(error.code(), "PUBLISH_VALIDATION_ERROR");
            assert!(error.to_string().contains(hook));
        }
    }

    #[test]
    fn test_invalid_version_rejected() {
        let validator = ManifestValidator::new("@depup");
        let mut m = manifest("@depup/pkg", &[]);
        m.version = "1.0.0-depup_1.x".to_string();

        assert!(!validator.validate(&m).is_valid);
    }

    #[test]
    fn test_private_manifest_warns() {
        let validator = ManifestValidator::new("@depup");
        let mut m = manifest("@depup/pkg", &[]);
        m.extra.insert("private".to_string(), serde_json::Value::Bool(true));

        let result = validator.validate(&m);
        assert!(result.is_valid);
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn test_validate_name_rules() {
        let validator = ManifestValidator::new("@depup");

        assert!(validator.validate_name("@depup/my-package").is_empty());
        assert!(!validator.validate_name("@depup/MyPackage").is_empty());
        assert!(!validator.validate_name("@depup/.hidden").is_empty());
        assert!(!validator.validate_name(&format!("@depup/{}", "a".repeat(214))).is_empty());
        assert!(!validator.validate_name("").is_empty());
    }
}
