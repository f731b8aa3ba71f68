//! NPM Publisher - `npm publish` of a prepared revision directory
//!
//! The token reaches npm through `NODE_AUTH_TOKEN` and a temporary user
//! config (`--userconfig`) that references it, so it never appears on a
//! command line and the package's own `.npmrc` is left alone.

use crate::core::error::{DepupError, Result};
use crate::core::traits::{PublishReceipt, PublishRequest, Publisher};
use crate::security::command_executor::SafeCommandExecutor;
use crate::security::token_manager::SecureTokenManager;
use async_trait::async_trait;
use secrecy::ExposeSecret;
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use tempfile::NamedTempFile;
use tracing::{info, warn};

/// Text npm prints only when the scope (organisation) is missing; a bare
/// E404 is also what a token without publish rights gets back
const SCOPE_NOT_FOUND_MARKERS: &[&str] = &["scope not found"];

/// Map a failed publish to the distinct error kinds
pub(crate) fn classify_publish_failure(scoped_name: &str, output: &str) -> DepupError {
    let lower = output.to_lowercase();
    if SCOPE_NOT_FOUND_MARKERS.iter().any(|m| lower.contains(m)) {
        let scope = scoped_name
            .split_once('/')
            .map(|(scope, _)| scope)
            .unwrap_or(scoped_name);
        return DepupError::ScopeNotFound {
            package: scoped_name.to_string(),
            scope: scope.to_string(),
        };
    }

    let message = output
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("npm publish failed")
        .to_string();
    DepupError::PublishTransport {
        package: scoped_name.to_string(),
        message,
    }
}

/// Publisher backed by the npm CLI
pub struct NpmPublisher {
    registry_url: String,
}

impl NpmPublisher {
    pub fn new(registry_url: impl Into<String>) -> Self {
        Self {
            registry_url: registry_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// `//host/path/:_authToken=${NODE_AUTH_TOKEN}`
    fn npmrc_line(&self) -> String {
        let without_scheme = self
            .registry_url
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(&self.registry_url);
        format!("//{}/:_authToken=${{NODE_AUTH_TOKEN}}\n", without_scheme)
    }

    /// Auth config outside the package directory, deleted when dropped
    fn write_userconfig(&self) -> Result<NamedTempFile> {
        let mut file =
            NamedTempFile::new().map_err(|e| DepupError::store(Path::new("npm userconfig"), e))?;
        file.write_all(self.npmrc_line().as_bytes())
            .map_err(|e| DepupError::store(file.path(), e))?;
        Ok(file)
    }

    fn publish_args<'a>(&'a self, request: &'a PublishRequest, userconfig: &'a str) -> Vec<&'a str> {
        let mut args = vec![
            "publish",
            "--access",
            request.access.as_str(),
            "--registry",
            self.registry_url.as_str(),
            "--userconfig",
            userconfig,
            "--ignore-scripts",
        ];
        if let Some(tag) = &request.tag {
            args.push("--tag");
            args.push(tag.as_str());
        }
        args
    }

    fn package_url(&self, scoped_name: &str, version: &str) -> String {
        if self.registry_url.contains("registry.npmjs.org") {
            format!("https://www.npmjs.com/package/{}/v/{}", scoped_name, version)
        } else {
            format!("{}/{}", self.registry_url, scoped_name)
        }
    }
}

#[async_trait]
impl Publisher for NpmPublisher {
    async fn publish(&self, request: &PublishRequest, timeout: Duration) -> Result<PublishReceipt> {
        let userconfig = self.write_userconfig()?;
        let userconfig_path = userconfig.path().to_string_lossy().into_owned();
        let args = self.publish_args(request, &userconfig_path);

        let output = SafeCommandExecutor::new(&request.directory)?
            .with_timeout(timeout)
            .with_env("NODE_AUTH_TOKEN", request.token.expose_secret())
            .execute("npm", &args)
            .await;
        if let Err(e) = userconfig.close() {
            warn!("temporary npm config could not be removed: {}", e);
        }

        let masker = SecureTokenManager::with_token(request.token.clone());
        let output = output?;
        let combined = masker.mask_tokens_in_string(&format!("{}{}", output.stdout, output.stderr));

        if !output.success() {
            return Err(classify_publish_failure(&request.scoped_name, &combined));
        }

        info!("published {}@{}", request.scoped_name, request.version);
        Ok(PublishReceipt {
            package_url: self.package_url(&request.scoped_name, &request.version),
            output: Some(combined),
        })
    }
}
