//! In-memory fakes for the capability traits

use crate::core::error::{DepupError, Result};
use crate::core::manifest::PackageManifest;
use crate::core::traits::{
    ImportReport, InstallStrategy, Installer, PublishReceipt, PublishRequest, Publisher, Registry,
    ResolvedManifest,
};
use crate::core::types::PackageSpec;
use async_trait::async_trait;
use semver::Version;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug, Clone)]
struct FakeVersion {
    dependencies: BTreeMap<String, String>,
    scripts: BTreeMap<String, String>,
}

fn pairs(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Registry serving versions registered up front; `latest` is the highest
#[derive(Default)]
pub struct FakeRegistry {
    packages: Mutex<BTreeMap<String, BTreeMap<String, FakeVersion>>>,
    delay: Option<Duration>,
    extract_delay: Option<Duration>,
    transient_failures: AtomicUsize,
    resolve_calls: AtomicUsize,
}

impl FakeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_version(self, name: &str, version: &str, dependencies: &[(&str, &str)]) -> Self {
        self.insert(name, version, pairs(dependencies), BTreeMap::new());
        self
    }

    pub fn with_scripted_version(self, name: &str, version: &str, scripts: &[(&str, &str)]) -> Self {
        self.insert(name, version, BTreeMap::new(), pairs(scripts));
        self
    }

    /// Every resolve sleeps this long first
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_extract_delay(mut self, delay: Duration) -> Self {
        self.extract_delay = Some(delay);
        self
    }

    /// The next `count` resolves fail with a network error
    pub fn failing_first(self, count: usize) -> Self {
        self.transient_failures.store(count, Ordering::SeqCst);
        self
    }

    /// Add a version after construction
    pub fn publish_version(&self, name: &str, version: &str) {
        self.insert(name, version, BTreeMap::new(), BTreeMap::new());
    }

    pub fn resolve_calls(&self) -> usize {
        self.resolve_calls.load(Ordering::SeqCst)
    }

    fn insert(
        &self,
        name: &str,
        version: &str,
        dependencies: BTreeMap<String, String>,
        scripts: BTreeMap<String, String>,
    ) {
        self.packages
            .lock()
            .unwrap()
            .entry(name.to_string())
            .or_default()
            .insert(
                version.to_string(),
                FakeVersion {
                    dependencies,
                    scripts,
                },
            );
    }

    fn lookup(&self, spec: &PackageSpec) -> Result<(String, FakeVersion)> {
        let packages = self.packages.lock().unwrap();
        let not_found = || DepupError::Resolution {
            spec: spec.to_string(),
            message: "not found on the registry".to_string(),
        };
        let versions = packages.get(&spec.name).ok_or_else(not_found)?;

        let version = match &spec.version {
            Some(version) => version.clone(),
            None => versions
                .keys()
                .filter_map(|v| Version::parse(v).ok())
                .max()
                .map(|v| v.to_string())
                .ok_or_else(not_found)?,
        };
        let entry = versions.get(&version).cloned().ok_or_else(not_found)?;
        Ok((version, entry))
    }
}

#[async_trait]
impl Registry for FakeRegistry {
    fn name(&self) -> &str {
        "fake"
    }

    async fn resolve_manifest(&self, spec: &PackageSpec, _timeout: Duration) -> Result<ResolvedManifest> {
        self.resolve_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let failing = self
            .transient_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(DepupError::Network {
                spec: spec.to_string(),
                message: "ECONNRESET".to_string(),
            });
        }

        let (version, entry) = self.lookup(spec)?;
        Ok(ResolvedManifest {
            name: spec.name.clone(),
            version,
            dependencies: entry.dependencies,
            dev_dependencies: BTreeMap::new(),
        })
    }

    async fn extract(&self, spec: &PackageSpec, target_dir: &Path, _timeout: Duration) -> Result<()> {
        if let Some(delay) = self.extract_delay {
            tokio::time::sleep(delay).await;
        }
        let (version, entry) = self.lookup(spec)?;
        let manifest = PackageManifest {
            name: spec.name.clone(),
            version,
            scripts: entry.scripts,
            dependencies: entry.dependencies,
            ..Default::default()
        };
        manifest.save(target_dir).await?;
        tokio::fs::write(target_dir.join("index.js"), "module.exports = {};\n")
            .await
            .map_err(|e| DepupError::store(target_dir, e))
    }
}

/// Installer whose outcome per strategy is scripted
#[derive(Default)]
pub struct FakeInstaller {
    failing: Vec<InstallStrategy>,
    stalling: Option<(InstallStrategy, Duration)>,
    import_error: Option<String>,
    import_calls: AtomicUsize,
    last_harness: Mutex<Option<PathBuf>>,
}

impl FakeInstaller {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_strategies(mut self, strategies: &[InstallStrategy]) -> Self {
        self.failing = strategies.to_vec();
        self
    }

    /// Attempts with `strategy` sleep `delay` before succeeding
    pub fn stalling_strategy(mut self, strategy: InstallStrategy, delay: Duration) -> Self {
        self.stalling = Some((strategy, delay));
        self
    }

    pub fn failing_import(mut self, message: &str) -> Self {
        self.import_error = Some(message.to_string());
        self
    }

    pub fn import_calls(&self) -> usize {
        self.import_calls.load(Ordering::SeqCst)
    }

    pub fn last_harness_dir(&self) -> Option<PathBuf> {
        self.last_harness.lock().unwrap().clone()
    }

    async fn attempt(&self, strategy: InstallStrategy) -> Result<()> {
        if let Some((stalled, delay)) = self.stalling
            && stalled == strategy
        {
            tokio::time::sleep(delay).await;
        }
        if self.failing.contains(&strategy) {
            Err(DepupError::Command {
                command: format!("npm install ({})", strategy.as_str()),
                message: "ERESOLVE unable to resolve dependency tree".to_string(),
            })
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Installer for FakeInstaller {
    async fn install(&self, _dir: &Path, strategy: InstallStrategy, _timeout: Duration) -> Result<()> {
        self.attempt(strategy).await
    }

    async fn install_dependency(
        &self,
        harness_dir: &Path,
        _package_dir: &Path,
        strategy: InstallStrategy,
        _timeout: Duration,
    ) -> Result<()> {
        *self.last_harness.lock().unwrap() = Some(harness_dir.to_path_buf());
        self.attempt(strategy).await
    }

    async fn run_import_test(
        &self,
        _harness_dir: &Path,
        package_name: &str,
        _timeout: Duration,
    ) -> Result<ImportReport> {
        self.import_calls.fetch_add(1, Ordering::SeqCst);
        match &self.import_error {
            Some(message) => Err(DepupError::ImportTestFailure {
                package: package_name.to_string(),
                message: message.clone(),
            }),
            None => Ok(ImportReport {
                export_kind: "object".to_string(),
                export_keys: vec!["default".to_string()],
            }),
        }
    }
}

enum PublishFailure {
    MissingScope,
    Transport(String),
}

type PublishHook = Box<dyn FnOnce() + Send>;

/// Publisher recording `(name, version)` of every request
#[derive(Default)]
pub struct FakePublisher {
    failure: Option<PublishFailure>,
    requests: Mutex<Vec<(String, String)>>,
    after_publish: Mutex<Option<PublishHook>>,
}

impl FakePublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_with_missing_scope(mut self) -> Self {
        self.failure = Some(PublishFailure::MissingScope);
        self
    }

    pub fn failing_with_transport(mut self, message: &str) -> Self {
        self.failure = Some(PublishFailure::Transport(message.to_string()));
        self
    }

    pub fn requests(&self) -> Vec<(String, String)> {
        self.requests.lock().unwrap().clone()
    }

    /// Run `hook` once, right before the next successful publish returns
    pub fn after_publish(&self, hook: impl FnOnce() + Send + 'static) {
        *self.after_publish.lock().unwrap() = Some(Box::new(hook));
    }
}

#[async_trait]
impl Publisher for FakePublisher {
    async fn publish(&self, request: &PublishRequest, _timeout: Duration) -> Result<PublishReceipt> {
        match &self.failure {
            Some(PublishFailure::MissingScope) => Err(DepupError::ScopeNotFound {
                package: request.scoped_name.clone(),
                scope: "@depup".to_string(),
            }),
            Some(PublishFailure::Transport(message)) => Err(DepupError::PublishTransport {
                package: request.scoped_name.clone(),
                message: message.clone(),
            }),
            None => {
                self.requests
                    .lock()
                    .unwrap()
                    .push((request.scoped_name.clone(), request.version.clone()));
                if let Some(hook) = self.after_publish.lock().unwrap().take() {
                    hook();
                }
                Ok(PublishReceipt {
                    package_url: format!(
                        "https://www.npmjs.com/package/{}/v/{}",
                        request.scoped_name, request.version
                    ),
                    output: None,
                })
            }
        }
    }
}
