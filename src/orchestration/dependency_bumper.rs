//! Dependency Bumper - rewrites declared ranges to the registry's latest
//!
//! For every entry of the merged `dependencies` + `devDependencies` view
//! the `latest` dist-tag is resolved through the [`ManifestFetcher`] and
//! compared with the version the
//! declared range is anchored at. Only a strictly newer version is written
//! back (as `^{latest}`), in the section that declared it. Lookup failures
//! and non-semver declarations become warnings; they never abort the pass.

use crate::core::error::DepupError;
use crate::core::manifest::{DependencySection, PackageManifest};
use crate::orchestration::manifest_fetcher::ManifestFetcher;
use crate::validation::dependency_checker::DependencyChecker;
use crate::validation::version_validator::VersionValidator;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// One rewritten dependency
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyEdge {
    pub name: String,
    pub section: DependencySection,
    pub declared_range: String,
    pub resolved_latest: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WarningKind {
    /// Declaration is not a plain semver range and was left as is
    Skipped,
    /// `latest` could not be resolved or compared
    ResolutionFailed,
}

/// Dependency left unchanged, with the reason
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyWarning {
    pub dependency: String,
    pub section: DependencySection,
    pub kind: WarningKind,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BumpResult {
    pub updated_count: usize,
    pub updates: Vec<DependencyEdge>,
    pub warnings: Vec<DependencyWarning>,
}

impl BumpResult {
    pub fn has_updates(&self) -> bool {
        self.updated_count > 0
    }
}

pub struct DependencyBumper {
    fetcher: Arc<ManifestFetcher>,
    lookup_timeout: Duration,
    checker: DependencyChecker,
    versions: VersionValidator,
}

impl DependencyBumper {
    pub fn new(fetcher: Arc<ManifestFetcher>, lookup_timeout: Duration) -> Self {
        Self {
            fetcher,
            lookup_timeout,
            checker: DependencyChecker::new(),
            versions: VersionValidator::new(),
        }
    }

    /// Bump `manifest` in place
    pub async fn bump(&self, manifest: &mut PackageManifest) -> BumpResult {
        let check = self.checker.check_manifest(manifest);
        let mut result = BumpResult {
            warnings: check
                .issues
                .iter()
                .map(|issue| DependencyWarning {
                    dependency: issue.dependency.clone(),
                    section: issue.section,
                    kind: WarningKind::Skipped,
                    message: issue.description.clone(),
                })
                .collect(),
            ..Default::default()
        };

        for dependency in check.bumpable() {
            let resolution_warning = |message: String| {
                let error = DepupError::DependencyResolution {
                    dependency: dependency.name.clone(),
                    message,
                };
                warn!("{}", error);
                DependencyWarning {
                    dependency: dependency.name.clone(),
                    section: dependency.section,
                    kind: WarningKind::ResolutionFailed,
                    message: error.to_string(),
                }
            };

            let latest = match self
                .fetcher
                .latest(&dependency.name, self.lookup_timeout)
                .await
            {
                Ok(latest) => latest,
                Err(e) => {
                    result.warnings.push(resolution_warning(e.to_string()));
                    continue;
                }
            };

            match self
                .versions
                .is_newer(&latest, &dependency.version_requirement)
            {
                Some(true) => {
                    manifest
                        .section_mut(dependency.section)
                        .insert(dependency.name.clone(), format!("^{}", latest));
                    info!(
                        "{}: {} -> ^{}",
                        dependency.name, dependency.version_requirement, latest
                    );
                    result.updates.push(DependencyEdge {
                        name: dependency.name.clone(),
                        section: dependency.section,
                        declared_range: dependency.version_requirement.clone(),
                        resolved_latest: latest,
                    });
                    result.updated_count += 1;
                }
                Some(false) => {
                    debug!(
                        "{}: {} already covers {}",
                        dependency.name, dependency.version_requirement, latest
                    );
                }
                None => {
                    result.warnings.push(resolution_warning(format!(
                        "registry returned non-semver version \"{}\"",
                        latest
                    )));
                }
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::retry::RetryOptions;
    use crate::test_support::FakeRegistry;

    fn manifest(deps: &[(&str, &str)], dev: &[(&str, &str)]) -> PackageManifest {
        let mut manifest = PackageManifest {
            name: "fixture".to_string(),
            version: "1.0.0".to_string(),
            ..Default::default()
        };
        for (name, range) in deps {
            manifest
                .dependencies
                .insert(name.to_string(), range.to_string());
        }
        for (name, range) in dev {
            manifest
                .dev_dependencies
                .insert(name.to_string(), range.to_string());
        }
        manifest
    }

    fn bumper_with_timeout(registry: FakeRegistry, lookup_timeout: Duration) -> DependencyBumper {
        let fetcher = ManifestFetcher::new(
            Arc::new(registry),
            RetryOptions::default(),
            Duration::from_secs(1),
        );
        DependencyBumper::new(Arc::new(fetcher), lookup_timeout)
    }

    fn bumper(registry: FakeRegistry) -> DependencyBumper {
        bumper_with_timeout(registry, Duration::from_secs(1))
    }

    #[tokio::test]
    async fn test_newer_versions_are_rewritten_in_place() {
        let registry = FakeRegistry::new()
            .with_version("ms", "2.1.3", &[])
            .with_version("mocha", "10.4.0", &[]);
        let mut manifest = manifest(&[("ms", "2.1.2")], &[("mocha", "~9.2.0")]);

        let result = bumper(registry).bump(&mut manifest).await;

        assert_eq!(result.updated_count, 2);
        assert_eq!(manifest.dependencies["ms"], "^2.1.3");
        assert_eq!(manifest.dev_dependencies["mocha"], "^10.4.0");
        assert!(!manifest.dependencies.contains_key("mocha"));
        assert_eq!(result.updates[0].declared_range, "2.1.2");
        assert!(result.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_never_downgrades_or_rewrites_equal() {
        let registry = FakeRegistry::new()
            .with_version("ms", "2.1.3", &[])
            .with_version("debug", "4.3.4", &[]);
        let mut manifest = manifest(&[("ms", "^3.0.0-canary.1"), ("debug", "^4.3.4")], &[]);

        let result = bumper(registry).bump(&mut manifest).await;

        assert_eq!(result.updated_count, 0);
        assert!(!result.has_updates());
        assert_eq!(manifest.dependencies["ms"], "^3.0.0-canary.1");
        assert_eq!(manifest.dependencies["debug"], "^4.3.4");
    }

    #[tokio::test]
    async fn test_lookup_failures_become_warnings() {
        let registry = FakeRegistry::new().with_version("ms", "2.1.3", &[]);
        let mut manifest = manifest(&[("ms", "^2.0.0"), ("left-pad-gone", "^1.0.0")], &[]);

        let result = bumper(registry).bump(&mut manifest).await;

        assert_eq!(result.updated_count, 1);
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.warnings[0].dependency, "left-pad-gone");
        assert_eq!(result.warnings[0].kind, WarningKind::ResolutionFailed);
        assert!(
            result.warnings[0]
                .message
                .starts_with("[left-pad-gone] latest version could not be checked")
        );
        assert_eq!(manifest.dependencies["left-pad-gone"], "^1.0.0");
    }

    #[tokio::test]
    async fn test_slow_lookup_times_out_per_dependency() {
        let registry = FakeRegistry::new()
            .with_version("ms", "2.1.3", &[])
            .with_delay(Duration::from_millis(200));
        let bumper = bumper_with_timeout(registry, Duration::from_millis(20));
        let mut manifest = manifest(&[("ms", "^2.0.0")], &[]);

        let result = bumper.bump(&mut manifest).await;

        assert_eq!(result.updated_count, 0);
        assert_eq!(result.warnings[0].kind, WarningKind::ResolutionFailed);
        assert!(result.warnings[0].message.contains("timed out"));
    }

    #[tokio::test]
    async fn test_non_semver_declarations_are_skipped() {
        let registry = FakeRegistry::new()
            .with_version("a", "9.0.0", &[])
            .with_version("b", "9.0.0", &[])
            .with_version("c", "9.0.0", &[]);
        let mut manifest = manifest(
            &[
                ("a", "*"),
                ("b", "github:user/b"),
                ("c", ">=1.0.0 <2.0.0"),
            ],
            &[],
        );

        let result = bumper(registry).bump(&mut manifest).await;

        assert_eq!(result.updated_count, 0);
        assert_eq!(result.warnings.len(), 3);
        assert!(result.warnings.iter().all(|w| w.kind == WarningKind::Skipped));
        assert_eq!(manifest.dependencies["a"], "*");
    }

    #[tokio::test]
    async fn test_partial_versions_are_padded() {
        let registry = FakeRegistry::new()
            .with_version("semver", "7.6.0", &[])
            .with_version("glob", "7.2.3", &[]);
        let mut manifest = manifest(&[("semver", "^7"), ("glob", "7.2.3")], &[]);

        let result = bumper(registry).bump(&mut manifest).await;

        assert_eq!(result.updated_count, 1);
        assert_eq!(manifest.dependencies["semver"], "^7.6.0");
        assert_eq!(manifest.dependencies["glob"], "7.2.3");
    }
}
