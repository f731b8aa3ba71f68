//! Installer/Tester - install and import checks of a prepared revision
//!
//! Phase 1 installs the revision's own dependencies inside its directory.
//! Phase 2 installs the revision into a throwaway harness project and loads
//! it with a bare `require`/`import`. Both phases walk the
//! [`InstallStrategy::CHAIN`]; the first strategy that succeeds wins. An
//! attempt that runs past the install timeout fails like any other and the
//! chain moves on. A failing install only lowers confidence, the run goes on.

use crate::core::error::{DepupError, Result};
use crate::core::retry::with_timeout;
use crate::core::manifest::{MANIFEST_FILE, PackageManifest};
use crate::core::traits::{ImportReport, InstallStrategy, Installer};
use crate::core::config::Timeouts;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::fs;
use tracing::{debug, info, warn};

/// Result of one strategy chain walk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallOutcome {
    /// Strategy that succeeded, `None` when all failed
    pub strategy: Option<InstallStrategy>,
    /// One entry per failed attempt
    pub failures: Vec<String>,
}

impl InstallOutcome {
    pub fn succeeded(&self) -> bool {
        self.strategy.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestReport {
    pub install: InstallOutcome,
    pub harness_install: Option<InstallOutcome>,
    pub import: Option<ImportReport>,
    pub import_error: Option<String>,
}

impl TestReport {
    /// Whether the import test ran and loaded the package
    pub fn import_ok(&self) -> bool {
        self.import.is_some()
    }

    /// The flag a failed install chain sets on the run
    pub fn install_failure(&self, package: &str) -> Option<DepupError> {
        (!self.install.succeeded()).then(|| DepupError::InstallFailure {
            package: package.to_string(),
        })
    }
}

pub struct PackageTester {
    installer: Arc<dyn Installer>,
    install_timeout: std::time::Duration,
    import_timeout: std::time::Duration,
}

impl PackageTester {
    pub fn new(installer: Arc<dyn Installer>, timeouts: &Timeouts) -> Self {
        Self {
            installer,
            install_timeout: timeouts.install,
            import_timeout: timeouts.import,
        }
    }

    /// Run both phases against the revision in `revision_dir`
    ///
    /// Returns `Ok` even when checks fail; `Err` is reserved for local I/O
    /// problems such as the harness directory not being creatable.
    pub async fn test(&self, revision_dir: &Path, manifest: &PackageManifest) -> Result<TestReport> {
        let install = self
            .walk_chain(&manifest.name, "install", |strategy| {
                self.installer
                    .install(revision_dir, strategy, self.install_timeout)
            })
            .await;
        if !install.succeeded() {
            warn!("{}: every install strategy failed, continuing", manifest.name);
        }

        let harness = TempDir::new().map_err(|e| DepupError::store(Path::new("tmp"), e))?;
        Self::write_harness_manifest(harness.path()).await?;

        let harness_install = self
            .walk_chain(&manifest.name, "harness install", |strategy| {
                self.installer.install_dependency(
                    harness.path(),
                    revision_dir,
                    strategy,
                    self.install_timeout,
                )
            })
            .await;

        if !harness_install.succeeded() {
            return Ok(TestReport {
                install,
                import: None,
                import_error: Some(format!(
                    "revision could not be installed into the harness: {}",
                    harness_install.failures.join("; ")
                )),
                harness_install: Some(harness_install),
            });
        }

        let (import, import_error) = match with_timeout(
            || format!("import {}", manifest.name),
            self.import_timeout,
            self.installer
                .run_import_test(harness.path(), &manifest.name, self.import_timeout),
        )
        .await
        {
            Ok(report) => {
                info!("{}: import ok, {}", manifest.name, report.summary());
                (Some(report), None)
            }
            Err(e) => {
                warn!("{}: {}", manifest.name, e);
                (None, Some(e.to_string()))
            }
        };

        Ok(TestReport {
            install,
            harness_install: Some(harness_install),
            import,
            import_error,
        })
    }

    async fn walk_chain<F, Fut>(&self, package: &str, phase: &str, mut attempt: F) -> InstallOutcome
    where
        F: FnMut(InstallStrategy) -> Fut,
        Fut: std::future::Future<Output = Result<()>>,
    {
        let mut failures = Vec::new();
        for strategy in InstallStrategy::CHAIN {
            let bounded = with_timeout(
                || format!("{} {} ({})", phase, package, strategy.as_str()),
                self.install_timeout,
                attempt(strategy),
            );
            match bounded.await {
                Ok(()) => {
                    debug!("{}: install succeeded with {}", package, strategy.as_str());
                    return InstallOutcome {
                        strategy: Some(strategy),
                        failures,
                    };
                }
                Err(e) => {
                    debug!("{}: {} failed: {}", package, strategy.as_str(), e);
                    failures.push(format!("{}: {}", strategy.as_str(), e));
                }
            }
        }
        InstallOutcome {
            strategy: None,
            failures,
        }
    }

    async fn write_harness_manifest(dir: &Path) -> Result<()> {
        let path = dir.join(MANIFEST_FILE);
        let manifest = serde_json::json!({
            "name": "depup-import-harness",
            "version": "0.0.0",
            "private": true
        });
        fs::write(&path, manifest.to_string())
            .await
            .map_err(|e| DepupError::store(&path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeInstaller;
    use std::time::Duration;

    fn manifest() -> PackageManifest {
        PackageManifest {
            name: "@depup/chalk".to_string(),
            version: "5.3.0-depup.0".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_first_strategy_wins() {
        let dir = TempDir::new().unwrap();
        let installer = Arc::new(FakeInstaller::new());
        let tester = PackageTester::new(installer.clone(), &Timeouts::default());

        let report = tester.test(dir.path(), &manifest()).await.unwrap();

        assert_eq!(report.install.strategy, Some(InstallStrategy::Plain));
        assert!(report.install.failures.is_empty());
        assert!(report.import_ok());
        assert!(report.install_failure("@depup/chalk").is_none());
        assert_eq!(installer.import_calls(), 1);
    }

    #[tokio::test]
    async fn test_falls_back_along_the_chain() {
        let dir = TempDir::new().unwrap();
        let installer = Arc::new(FakeInstaller::new().failing_strategies(&[InstallStrategy::Plain]));
        let tester = PackageTester::new(installer, &Timeouts::default());

        let report = tester.test(dir.path(), &manifest()).await.unwrap();

        assert_eq!(report.install.strategy, Some(InstallStrategy::LegacyPeerDeps));
        assert_eq!(report.install.failures.len(), 1);
        assert_eq!(
            report.harness_install.unwrap().strategy,
            Some(InstallStrategy::LegacyPeerDeps)
        );
    }

    #[tokio::test]
    async fn test_stalled_attempt_times_out_and_chain_moves_on() {
        let dir = TempDir::new().unwrap();
        let installer = Arc::new(
            FakeInstaller::new().stalling_strategy(InstallStrategy::Plain, Duration::from_secs(5)),
        );
        let timeouts = Timeouts {
            install: Duration::from_millis(50),
            ..Timeouts::default()
        };
        let tester = PackageTester::new(installer.clone(), &timeouts);

        let report = tester.test(dir.path(), &manifest()).await.unwrap();

        assert_eq!(report.install.strategy, Some(InstallStrategy::LegacyPeerDeps));
        assert_eq!(report.install.failures.len(), 1);
        assert!(report.install.failures[0].contains("timed out"));
        assert_eq!(
            report.harness_install.as_ref().unwrap().strategy,
            Some(InstallStrategy::LegacyPeerDeps)
        );
        assert!(report.import_ok());
    }

    #[tokio::test]
    async fn test_all_strategies_failing_sets_flag_and_continues() {
        let dir = TempDir::new().unwrap();
        let installer = Arc::new(FakeInstaller::new().failing_strategies(&InstallStrategy::CHAIN));
        let tester = PackageTester::new(installer.clone(), &Timeouts::default());

        let report = tester.test(dir.path(), &manifest()).await.unwrap();

        assert!(!report.install.succeeded());
        assert_eq!(report.install.failures.len(), 3);
        let flag = report.install_failure("@depup/chalk").unwrap();
        assert_eq!(flag.code(), "INSTALL_FAILURE");
        assert!(!report.import_ok());
        assert!(report.import_error.is_some());
        assert_eq!(installer.import_calls(), 0);
    }

    #[tokio::test]
    async fn test_import_failure_is_reported() {
        let dir = TempDir::new().unwrap();
        let installer = Arc::new(FakeInstaller::new().failing_import("Cannot find module"));
        let tester = PackageTester::new(installer, &Timeouts::default());

        let report = tester.test(dir.path(), &manifest()).await.unwrap();

        assert!(report.install.succeeded());
        assert!(!report.import_ok());
        assert!(report.import_error.unwrap().contains("Cannot find module"));
    }

    #[tokio::test]
    async fn test_harness_directory_is_removed() {
        let dir = TempDir::new().unwrap();
        let installer = Arc::new(FakeInstaller::new());
        let tester = PackageTester::new(installer.clone(), &Timeouts::default());

        tester.test(dir.path(), &manifest()).await.unwrap();

        let harness = installer.last_harness_dir().unwrap();
        assert!(!harness.exists());
    }
}
