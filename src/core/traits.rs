//! Core traits and types for the revision pipeline
//!
//! This module defines the capability interfaces the pipeline talks to:
//! the package registry, the installer used for the install/import checks
//! and the publisher. Each call carries its own timeout so an
//! implementation can never stall a pipeline run indefinitely, and each can
//! be replaced by a fake in tests without spawning processes.

use crate::core::error::Result;
use crate::core::types::PackageSpec;
use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

// ============================================================================
// Registry
// ============================================================================

/// Manifest data resolved from the registry for one concrete version
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResolvedManifest {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,
    #[serde(rename = "devDependencies", default)]
    pub dev_dependencies: BTreeMap<String, String>,
}

/// Read access to an upstream package registry
#[async_trait]
pub trait Registry: Send + Sync {
    /// Registry name for logs (e.g., "npm")
    fn name(&self) -> &str;

    /// Resolve a specifier (exact version or dist-tag) to a manifest
    async fn resolve_manifest(
        &self,
        spec: &PackageSpec,
        timeout: Duration,
    ) -> Result<ResolvedManifest>;

    /// Version behind the `latest` dist-tag
    ///
    /// Default implementation resolves the full manifest.
    async fn latest_version(&self, name: &str, timeout: Duration) -> Result<String> {
        let manifest = self
            .resolve_manifest(&PackageSpec::latest(name), timeout)
            .await?;
        Ok(manifest.version)
    }

    /// Download the package tarball and unpack its contents into
    /// `target_dir` (so `target_dir/package.json` exists afterwards)
    async fn extract(&self, spec: &PackageSpec, target_dir: &Path, timeout: Duration)
    -> Result<()>;
}

// ============================================================================
// Installer
// ============================================================================

/// One step of the install fallback chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstallStrategy {
    Plain,
    LegacyPeerDeps,
    ForceIgnoreScripts,
}

impl InstallStrategy {
    /// Fallback chain, tried in order
    pub const CHAIN: [InstallStrategy; 3] = [
        InstallStrategy::Plain,
        InstallStrategy::LegacyPeerDeps,
        InstallStrategy::ForceIgnoreScripts,
    ];

    /// Extra npm flags for this strategy
    pub fn npm_flags(&self) -> &'static [&'static str] {
        match self {
            Self::Plain => &[],
            Self::LegacyPeerDeps => &["--legacy-peer-deps"],
            Self::ForceIgnoreScripts => &["--force", "--ignore-scripts"],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::LegacyPeerDeps => "legacy-peer-deps",
            Self::ForceIgnoreScripts => "force-ignore-scripts",
        }
    }
}

/// What a bare import of the package exposed
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ImportReport {
    /// `typeof` of the loaded module ("object", "function", ...)
    pub export_kind: String,
    /// Top-level export names (truncated by the implementation)
    pub export_keys: Vec<String>,
}

impl ImportReport {
    /// One-line summary of the exported surface
    pub fn summary(&self) -> String {
        if self.export_keys.is_empty() {
            format!("{} export", self.export_kind)
        } else {
            format!(
                "{} export with {} key(s): {}",
                self.export_kind,
                self.export_keys.len(),
                self.export_keys.join(", ")
            )
        }
    }
}

/// Installs packages into directories and runs the import harness
#[async_trait]
pub trait Installer: Send + Sync {
    /// Install the dependencies declared by the manifest in `dir`
    async fn install(
        &self,
        dir: &Path,
        strategy: InstallStrategy,
        timeout: Duration,
    ) -> Result<()>;

    /// Install the package located at `package_dir` as a dependency of the
    /// harness project in `harness_dir`
    async fn install_dependency(
        &self,
        harness_dir: &Path,
        package_dir: &Path,
        strategy: InstallStrategy,
        timeout: Duration,
    ) -> Result<()>;

    /// Require/import `package_name` from inside `harness_dir`
    async fn run_import_test(
        &self,
        harness_dir: &Path,
        package_name: &str,
        timeout: Duration,
    ) -> Result<ImportReport>;
}

// ============================================================================
// Publisher
// ============================================================================

/// Everything the publisher needs for one publish
#[derive(Debug, Clone)]
pub struct PublishRequest {
    pub directory: PathBuf,
    pub scoped_name: String,
    pub version: String,
    pub token: SecretString,
    /// "public" | "restricted"
    pub access: String,
    pub tag: Option<String>,
}

/// Result of a successful publish
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishReceipt {
    pub package_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

/// Pushes a prepared revision to the target registry
///
/// Implementations must report a missing scope as
/// [`DepupError::ScopeNotFound`](crate::core::error::DepupError::ScopeNotFound)
/// and any other rejection as
/// [`DepupError::PublishTransport`](crate::core::error::DepupError::PublishTransport).
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, request: &PublishRequest, timeout: Duration)
    -> Result<PublishReceipt>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_chain_order() {
        assert_eq!(
            InstallStrategy::CHAIN,
            [
                InstallStrategy::Plain,
                InstallStrategy::LegacyPeerDeps,
                InstallStrategy::ForceIgnoreScripts
            ]
        );
        assert!(InstallStrategy::Plain.npm_flags().is_empty());
        assert_eq!(
            InstallStrategy::ForceIgnoreScripts.npm_flags(),
            &["--force", "--ignore-scripts"]
        );
    }

    #[test]
    fn test_strategy_serialization() {
        let json = serde_json::to_string(&InstallStrategy::LegacyPeerDeps).unwrap();
        assert_eq!(json, r#""legacy-peer-deps""#);
    }

    #[test]
    fn test_import_report_summary() {
        let report = ImportReport {
            export_kind: "object".to_string(),
            export_keys: vec!["red".to_string(), "green".to_string()],
        };
        assert_eq!(report.summary(), "object export with 2 key(s): red, green");

        let report = ImportReport {
            export_kind: "function".to_string(),
            export_keys: vec![],
        };
        assert_eq!(report.summary(), "function export");
    }

    #[test]
    fn test_resolved_manifest_deserialization() {
        let manifest: ResolvedManifest = serde_json::from_str(
            r#"{"name": "debug", "version": "4.3.4", "dependencies": {"ms": "2.1.2"}}"#,
        )
        .unwrap();

        assert_eq!(manifest.version, "4.3.4");
        assert_eq!(manifest.dependencies.get("ms").unwrap(), "2.1.2");
        assert!(manifest.dev_dependencies.is_empty());
    }
}
