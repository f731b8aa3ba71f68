//! Configuration structures and types for depup
//!
//! `DepupConfig` is the file/env/CLI layer: every field is optional so
//! layers can be merged. `Settings` is the resolved view the pipeline reads,
//! with defaults applied.

use crate::core::retry::RetryOptions;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_SCOPE: &str = "@depup";
pub const DEFAULT_STORE_DIR: &str = ".depup";
pub const DEFAULT_REGISTRY_URL: &str = "https://registry.npmjs.org";
pub const DEFAULT_CONCURRENCY: usize = 5;
pub const DEFAULT_BATCH_DELAY_MS: u64 = 1_000;

/// Root configuration object
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DepupConfig {
    /// Schema version
    #[serde(default = "default_schema_version")]
    pub version: String,

    /// Base configuration file to extend (relative to this file)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extends: Option<String>,

    /// Reserved scope republished packages are placed under (e.g. "@depup")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    /// Root directory of the revision store
    #[serde(skip_serializing_if = "Option::is_none", rename = "storeDir")]
    pub store_dir: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub registry: Option<RegistryConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch: Option<BatchConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeouts: Option<TimeoutsConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryConfig>,

    /// Ordered package list used by `sync`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub packages: Option<Vec<String>>,
}

fn default_schema_version() -> String {
    "1.0".to_string()
}

/// npm package access level
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum NpmAccess {
    #[default]
    Public,
    Restricted,
}

impl NpmAccess {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Restricted => "restricted",
        }
    }
}

/// Target registry configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct RegistryConfig {
    /// Registry base URL (default: https://registry.npmjs.org)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Access level for published packages (default: public)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access: Option<NpmAccess>,

    /// dist-tag for published revisions (default: npm's own default)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

/// Batch orchestration settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct BatchConfig {
    /// Items processed concurrently within one group (default: 5)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,

    /// Pause between groups in milliseconds (default: 1000)
    #[serde(skip_serializing_if = "Option::is_none", rename = "delayMs")]
    pub delay_ms: Option<u64>,
}

/// Per-operation timeouts, in seconds
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TimeoutsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registry_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dependency_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extract_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub install_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub import_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publish_secs: Option<u64>,
    /// Whole pipeline run for one package
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_secs: Option<u64>,
}

/// Retry budget for registry lookups
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct RetryConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_delay_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_delay_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backoff_multiplier: Option<f64>,
}

/// Default configuration values
impl Default for DepupConfig {
    fn default() -> Self {
        Self {
            version: default_schema_version(),
            extends: None,
            scope: None,
            store_dir: None,
            registry: None,
            batch: None,
            timeouts: None,
            retry: None,
            packages: None,
        }
    }
}

/// Resolved timeouts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timeouts {
    pub registry: Duration,
    pub dependency: Duration,
    pub extract: Duration,
    pub install: Duration,
    pub import: Duration,
    pub publish: Duration,
    pub operation: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            registry: Duration::from_secs(30),
            dependency: Duration::from_secs(10),
            extract: Duration::from_secs(120),
            install: Duration::from_secs(300),
            import: Duration::from_secs(60),
            publish: Duration::from_secs(120),
            operation: Duration::from_secs(900),
        }
    }
}

/// Fully resolved settings read by the pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub scope: String,
    pub store_dir: PathBuf,
    pub registry_url: String,
    pub access: NpmAccess,
    pub tag: Option<String>,
    pub concurrency: usize,
    pub batch_delay: Duration,
    pub timeouts: Timeouts,
    pub retry: RetryOptions,
    pub packages: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings::from_config(&DepupConfig::default())
    }
}

impl Settings {
    pub fn from_config(config: &DepupConfig) -> Self {
        let defaults = Timeouts::default();
        let t = config.timeouts.clone().unwrap_or_default();
        let secs = |value: Option<u64>, fallback: Duration| {
            value.map(Duration::from_secs).unwrap_or(fallback)
        };

        let retry_defaults = RetryOptions::default();
        let r = config.retry.clone().unwrap_or_default();
        let registry = config.registry.clone().unwrap_or_default();
        let batch = config.batch.clone().unwrap_or_default();

        Self {
            scope: config
                .scope
                .clone()
                .unwrap_or_else(|| DEFAULT_SCOPE.to_string()),
            store_dir: PathBuf::from(
                config
                    .store_dir
                    .clone()
                    .unwrap_or_else(|| DEFAULT_STORE_DIR.to_string()),
            ),
            registry_url: registry
                .url
                .unwrap_or_else(|| DEFAULT_REGISTRY_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            access: registry.access.unwrap_or_default(),
            tag: registry.tag,
            concurrency: batch.concurrency.unwrap_or(DEFAULT_CONCURRENCY),
            batch_delay: Duration::from_millis(batch.delay_ms.unwrap_or(DEFAULT_BATCH_DELAY_MS)),
            timeouts: Timeouts {
                registry: secs(t.registry_secs, defaults.registry),
                dependency: secs(t.dependency_secs, defaults.dependency),
                extract: secs(t.extract_secs, defaults.extract),
                install: secs(t.install_secs, defaults.install),
                import: secs(t.import_secs, defaults.import),
                publish: secs(t.publish_secs, defaults.publish),
                operation: secs(t.operation_secs, defaults.operation),
            },
            retry: RetryOptions {
                max_attempts: r.max_attempts.unwrap_or(retry_defaults.max_attempts),
                initial_delay: r
                    .initial_delay_ms
                    .map(Duration::from_millis)
                    .unwrap_or(retry_defaults.initial_delay),
                max_delay: r
                    .max_delay_ms
                    .map(Duration::from_millis)
                    .unwrap_or(retry_defaults.max_delay),
                backoff_multiplier: r
                    .backoff_multiplier
                    .unwrap_or(retry_defaults.backoff_multiplier),
            },
            packages: config.packages.clone().unwrap_or_default(),
        }
    }
}
