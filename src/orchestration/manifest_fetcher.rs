//! Manifest Fetcher - resolves a specifier to its registry manifest
//!
//! Each attempt is bounded by the registry timeout; transient failures
//! (network errors, timeouts) are retried by [`RetryManager`], a missing
//! version is reported at once.

use crate::core::error::{DepupError, Result};
use crate::core::retry::{RetryManager, RetryOptions, with_timeout};
use crate::core::traits::{Registry, ResolvedManifest};
use crate::core::types::PackageSpec;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub struct ManifestFetcher {
    registry: Arc<dyn Registry>,
    retry: RetryManager,
    timeout: Duration,
}

impl ManifestFetcher {
    pub fn new(registry: Arc<dyn Registry>, retry: RetryOptions, timeout: Duration) -> Self {
        Self {
            registry,
            retry: RetryManager::new(retry),
            timeout,
        }
    }

    pub fn registry(&self) -> &Arc<dyn Registry> {
        &self.registry
    }

    /// `name` or `name@version` to `{name, version, dependencies, devDependencies}`
    pub async fn fetch(&self, spec: &PackageSpec) -> Result<ResolvedManifest> {
        let label = format!("resolve {}", spec);
        let manifest = self
            .retry
            .retry(&label, || self.attempt(spec))
            .await
            .map_err(|e| Self::into_resolution_error(spec, e))?;

        debug!(
            "{} resolved to {} ({} dependencies, {} devDependencies)",
            spec,
            manifest.version,
            manifest.dependencies.len(),
            manifest.dev_dependencies.len()
        );
        Ok(manifest)
    }

    /// Version behind `latest`, without retries
    pub async fn latest(&self, name: &str, timeout: Duration) -> Result<String> {
        with_timeout(
            || format!("resolve {}@latest", name),
            timeout,
            self.registry.latest_version(name, timeout),
        )
        .await
    }

    async fn attempt(&self, spec: &PackageSpec) -> Result<ResolvedManifest> {
        debug!("resolving {} on {}", spec, self.registry.name());
        with_timeout(
            || format!("resolve {}", spec),
            self.timeout,
            self.registry.resolve_manifest(spec, self.timeout),
        )
        .await
    }

    /// Exhausted transient failures surface as a resolution error
    fn into_resolution_error(spec: &PackageSpec, error: DepupError) -> DepupError {
        match error {
            DepupError::Network { message, .. } => DepupError::Resolution {
                spec: spec.to_string(),
                message: format!("registry unreachable: {}", message),
            },
            DepupError::Timeout { after, .. } => DepupError::Resolution {
                spec: spec.to_string(),
                message: format!("registry did not answer within {:?}", after),
            },
            other => other,
        }
    }
}
