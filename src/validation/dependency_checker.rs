//! Dependency Checker - classifies declared dependency ranges
//!
//! The bumper only rewrites declarations anchored at a plain semver
//! version. Everything else (`*`, dist-tags, URLs, `workspace:` and `npm:`
//! protocols, compound ranges) is reported as an issue and left alone.
//!
//! # Example
//!
//! ```
//! use depup::core::PackageManifest;
//! use depup::validation::dependency_checker::DependencyChecker;
//!
//! let manifest = PackageManifest::from_json(
//!     r#"{"name": "x", "version": "1.0.0", "dependencies": {"a": "^1.0.0", "b": "latest"}}"#,
//! ).unwrap();
//!
//! let result = DependencyChecker::new().check_manifest(&manifest);
//! assert_eq!(result.bumpable().count(), 1);
//! assert_eq!(result.issues.len(), 1);
//! ```

use crate::core::manifest::{DependencySection, PackageManifest};
use crate::validation::version_validator::VersionValidator;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static! {
    /// git/http/file specifiers and `user/repo` shorthands
    static ref URL_SPEC_REGEX: Regex =
        Regex::new(r"^(git\+|git:|https?:|file:|link:|github:|gitlab:|bitbucket:|[\w.-]+/[\w.-]+(#.*)?$)")
            .unwrap();
    static ref DIST_TAG_REGEX: Regex = Regex::new(r"^[a-z][a-z0-9._-]*$").unwrap();
}

/// How a dependency range was declared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeclarationKind {
    /// Anchored at a semver version, optionally behind `^`, `~`, `>=`, `=`
    Semver,
    Wildcard,
    DistTag,
    Url,
    Workspace,
    Alias,
    ComplexRange,
    Empty,
}

impl DeclarationKind {
    fn describe(&self) -> &'static str {
        match self {
            Self::Semver => "semver range",
            Self::Wildcard => "wildcard range",
            Self::DistTag => "dist-tag",
            Self::Url => "URL or repository specifier",
            Self::Workspace => "workspace protocol",
            Self::Alias => "npm: alias",
            Self::ComplexRange => "compound or unrecognised range",
            Self::Empty => "empty range",
        }
    }
}

/// Information about a single dependency
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub name: String,
    pub version_requirement: String,
    pub section: DependencySection,
    pub kind: DeclarationKind,
}

impl Dependency {
    pub fn is_bumpable(&self) -> bool {
        self.kind == DeclarationKind::Semver
    }
}

/// A declaration the bumper will not touch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyIssue {
    pub dependency: String,
    pub section: DependencySection,
    pub description: String,
}

/// Result of dependency check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyCheckResult {
    pub dependencies: Vec<Dependency>,
    pub issues: Vec<DependencyIssue>,
    pub total_count: usize,
    pub dev_count: usize,
}

impl DependencyCheckResult {
    /// Dependencies the bumper may rewrite
    pub fn bumpable(&self) -> impl Iterator<Item = &Dependency> {
        self.dependencies.iter().filter(|d| d.is_bumpable())
    }
}

/// Checker for package dependencies
pub struct DependencyChecker {
    versions: VersionValidator,
}

impl Default for DependencyChecker {
    fn default() -> Self {
        Self::new()
    }
}

impl DependencyChecker {
    pub fn new() -> Self {
        Self {
            versions: VersionValidator::new(),
        }
    }

    /// Classify every entry of the merged `dependencies` +
    /// `devDependencies` view
    pub fn check_manifest(&self, manifest: &PackageManifest) -> DependencyCheckResult {
        let mut dependencies = Vec::new();
        let mut issues = Vec::new();

        for (section, name, range) in manifest.merged_dependencies() {
            let kind = self.classify(range);
            if kind != DeclarationKind::Semver {
                issues.push(DependencyIssue {
                    dependency: name.to_string(),
                    section,
                    description: format!("skipped {} \"{}\"", kind.describe(), range),
                });
            }
            dependencies.push(Dependency {
                name: name.to_string(),
                version_requirement: range.to_string(),
                section,
                kind,
            });
        }

        let dev_count = dependencies
            .iter()
            .filter(|d| d.section == DependencySection::DevDependencies)
            .count();

        DependencyCheckResult {
            total_count: dependencies.len(),
            dev_count,
            dependencies,
            issues,
        }
    }

    /// Classify one declared range
    pub fn classify(&self, declared: &str) -> DeclarationKind {
        let s = declared.trim();

        if s.is_empty() {
            return DeclarationKind::Empty;
        }
        if matches!(s, "*" | "x" | "X") {
            return DeclarationKind::Wildcard;
        }
        if s.starts_with("workspace:") {
            return DeclarationKind::Workspace;
        }
        if s.starts_with("npm:") {
            return DeclarationKind::Alias;
        }
        if self.versions.strip_range(s).is_some() {
            return DeclarationKind::Semver;
        }
        if URL_SPEC_REGEX.is_match(s) {
            return DeclarationKind::Url;
        }
        if DIST_TAG_REGEX.is_match(s) {
            return DeclarationKind::DistTag;
        }
        DeclarationKind::ComplexRange
    }
}
