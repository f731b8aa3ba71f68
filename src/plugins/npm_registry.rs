//! NPM Registry - manifest resolution and tarball extraction
//!
//! Talks to the registry's JSON API with reqwest:
//! - `GET {registry}/{name}/{version|tag}` for one version document
//! - the document's `dist.tarball` for the package contents
//!
//! Tarballs are unpacked with `tar` into a scratch directory and the
//! `package/` tree is copied into the target directory.

use crate::core::error::{DepupError, Result};
use crate::core::traits::{Registry, ResolvedManifest};
use crate::core::types::PackageSpec;
use crate::security::command_executor::SafeCommandExecutor;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::fs;
use tracing::debug;
use walkdir::WalkDir;

/// Version document returned by the registry
#[derive(Debug, Deserialize)]
struct NpmVersionDoc {
    name: String,
    version: String,
    #[serde(default)]
    dependencies: BTreeMap<String, String>,
    #[serde(rename = "devDependencies", default)]
    dev_dependencies: BTreeMap<String, String>,
    #[serde(default)]
    dist: Option<NpmDist>,
}

#[derive(Debug, Deserialize)]
struct NpmDist {
    tarball: String,
}

/// Percent-encode the `/` of a scoped name for the registry path
fn encode_package_name(name: &str) -> String {
    name.replace('/', "%2F")
}

/// Read-only npm registry client
pub struct NpmRegistry {
    client: reqwest::Client,
    base_url: String,
}

impl NpmRegistry {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn version_url(&self, spec: &PackageSpec) -> String {
        format!(
            "{}/{}/{}",
            self.base_url,
            encode_package_name(&spec.name),
            spec.version_or_tag()
        )
    }

    fn request_error(spec: &PackageSpec, timeout: Duration, error: reqwest::Error) -> DepupError {
        if error.is_timeout() {
            DepupError::Timeout {
                operation: format!("GET {}", spec),
                after: timeout,
            }
        } else {
            DepupError::Network {
                spec: spec.to_string(),
                message: error.to_string(),
            }
        }
    }

    async fn fetch_version_doc(&self, spec: &PackageSpec, timeout: Duration) -> Result<NpmVersionDoc> {
        let url = self.version_url(spec);
        debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| Self::request_error(spec, timeout, e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(DepupError::Resolution {
                spec: spec.to_string(),
                message: "not found on the registry".to_string(),
            });
        }
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(DepupError::Network {
                spec: spec.to_string(),
                message: format!("HTTP {}", status),
            });
        }
        if !status.is_success() {
            return Err(DepupError::Resolution {
                spec: spec.to_string(),
                message: format!("HTTP {}", status),
            });
        }

        response
            .json::<NpmVersionDoc>()
            .await
            .map_err(|e| DepupError::Resolution {
                spec: spec.to_string(),
                message: format!("unexpected registry response: {}", e),
            })
    }

    async fn download(&self, spec: &PackageSpec, url: &str, timeout: Duration) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| Self::request_error(spec, timeout, e))?;

        if !response.status().is_success() {
            return Err(DepupError::Network {
                spec: spec.to_string(),
                message: format!("tarball download failed: HTTP {}", response.status()),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Self::request_error(spec, timeout, e))?;
        Ok(bytes.to_vec())
    }
}

/// Copy every file below `from` into `to`, keeping relative paths
pub(crate) fn copy_tree(from: &Path, to: &Path) -> std::io::Result<usize> {
    let mut copied = 0;
    for entry in WalkDir::new(from).follow_links(false) {
        let entry = entry.map_err(std::io::Error::other)?;
        let relative = entry
            .path()
            .strip_prefix(from)
            .map_err(std::io::Error::other)?;
        let destination = to.join(relative);

        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&destination)?;
        } else if entry.file_type().is_file() {
            if let Some(parent) = destination.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(entry.path(), &destination)?;
            copied += 1;
        }
    }
    Ok(copied)
}

#[async_trait]
impl Registry for NpmRegistry {
    fn name(&self) -> &str {
        "npm"
    }

    async fn resolve_manifest(&self, spec: &PackageSpec, timeout: Duration) -> Result<ResolvedManifest> {
        let doc = self.fetch_version_doc(spec, timeout).await?;
        Ok(ResolvedManifest {
            name: doc.name,
            version: doc.version,
            dependencies: doc.dependencies,
            dev_dependencies: doc.dev_dependencies,
        })
    }

    async fn extract(&self, spec: &PackageSpec, target_dir: &Path, timeout: Duration) -> Result<()> {
        let started = Instant::now();
        let remaining = |operation: &str| {
            timeout
                .checked_sub(started.elapsed())
                .filter(|d| !d.is_zero())
                .ok_or_else(|| DepupError::Timeout {
                    operation: format!("{} {}", operation, spec),
                    after: timeout,
                })
        };

        let doc = self.fetch_version_doc(spec, remaining("resolve")?).await?;
        let tarball_url = doc.dist.map(|d| d.tarball).ok_or_else(|| DepupError::Resolution {
            spec: spec.to_string(),
            message: "registry document has no dist.tarball".to_string(),
        })?;
        let bytes = self.download(spec, &tarball_url, remaining("download")?).await?;

        let scratch = TempDir::new().map_err(|e| DepupError::store(Path::new("tmp"), e))?;
        let archive = scratch.path().join("package.tgz");
        fs::write(&archive, &bytes)
            .await
            .map_err(|e| DepupError::store(&archive, e))?;

        let output = SafeCommandExecutor::new(scratch.path())?
            .with_timeout(remaining("unpack")?)
            .execute("tar", &["-xzf", "package.tgz"])
            .await?;
        if !output.success() {
            return Err(DepupError::Command {
                command: "tar -xzf".to_string(),
                message: output.failure_summary(),
            });
        }

        // npm tarballs keep everything under a single top-level directory,
        // usually `package/`
        let top_level = std::fs::read_dir(scratch.path())
            .map_err(|e| DepupError::store(scratch.path(), e))?
            .filter_map(|e| e.ok())
            .find(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .map(|e| e.path())
            .ok_or_else(|| DepupError::Resolution {
                spec: spec.to_string(),
                message: "tarball did not contain a package directory".to_string(),
            })?;

        let copied = copy_tree(&top_level, target_dir).map_err(|e| DepupError::store(target_dir, e))?;
        debug!("extracted {} file(s) of {} into {}", copied, spec, target_dir.display());
        Ok(())
    }
}
