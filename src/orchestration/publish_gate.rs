//! Publish Gate - decides whether a revision goes out, then publishes it
//!
//! The first revision of a base version is always worth publishing; later
//! ones only when they actually changed a dependency.

use crate::core::config::Settings;
use crate::core::error::Result;
use crate::core::manifest::PackageManifest;
use crate::core::traits::{PublishReceipt, PublishRequest, Publisher};
use crate::security::token_manager::SecureTokenManager;
use crate::validation::manifest_validator::ManifestValidator;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Outcome of the decision rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GateDecision {
    Publish,
    /// Publishing was not requested
    NotRequested,
    /// A later revision that changed nothing
    NothingChanged,
}

impl GateDecision {
    /// `requested && (index == 0 || dependencies_updated > 0)`
    pub fn decide(index: u64, dependencies_updated: usize, requested: bool) -> Self {
        if !requested {
            Self::NotRequested
        } else if index == 0 || dependencies_updated > 0 {
            Self::Publish
        } else {
            Self::NothingChanged
        }
    }

    pub fn should_publish(&self) -> bool {
        *self == Self::Publish
    }

    pub fn reason(&self) -> &'static str {
        match self {
            Self::Publish => "first revision or dependencies updated",
            Self::NotRequested => "publishing not requested",
            Self::NothingChanged => "no dependency was updated since revision 0",
        }
    }
}

pub struct PublishGate {
    publisher: Arc<dyn Publisher>,
    tokens: Arc<SecureTokenManager>,
    validator: ManifestValidator,
    access: String,
    tag: Option<String>,
    timeout: Duration,
}

impl PublishGate {
    pub fn new(
        publisher: Arc<dyn Publisher>,
        tokens: Arc<SecureTokenManager>,
        settings: &Settings,
    ) -> Self {
        Self {
            publisher,
            tokens,
            validator: ManifestValidator::new(settings.scope.clone()),
            access: settings.access.as_str().to_string(),
            tag: settings.tag.clone(),
            timeout: settings.timeouts.publish,
        }
    }

    /// Validate the rewritten manifest and publish `directory`
    ///
    /// Validation happens before the token is looked at, so an invalid
    /// manifest is reported as such even without credentials.
    pub async fn publish(&self, directory: &Path, manifest: &PackageManifest) -> Result<PublishReceipt> {
        let warnings = self
            .validator
            .validate(manifest)
            .into_result(&manifest.name)?;
        for warning in warnings {
            warn!("{}: {}", manifest.name, warning);
        }

        let token = self.tokens.require_token()?;
        let request = PublishRequest {
            directory: directory.to_path_buf(),
            scoped_name: manifest.name.clone(),
            version: manifest.version.clone(),
            token,
            access: self.access.clone(),
            tag: self.tag.clone(),
        };

        let receipt = self.publisher.publish(&request, self.timeout).await?;
        info!("{}@{} is live at {}", manifest.name, manifest.version, receipt.package_url);
        Ok(receipt)
    }
}
