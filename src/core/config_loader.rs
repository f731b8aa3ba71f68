//! Configuration file loader for depup
//!
//! This module provides configuration loading, validation, and merging capabilities.

use super::config::*;
use crate::core::error::DepupError;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

/// Configuration file names, checked in order
const CONFIG_FILENAMES: &[&str] = &[".depup.yaml", ".depup.yml", ".depup.toml"];

lazy_static! {
    /// Environment variable pattern (${VAR_NAME})
    static ref ENV_VAR_REGEX: Regex = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").unwrap();
}

/// Configuration load options
#[derive(Debug, Clone, Default)]
pub struct ConfigLoadOptions {
    /// Project path to load config from
    pub project_path: PathBuf,

    /// Home directory for the global config (skipped when `None`)
    pub home_dir: Option<PathBuf>,

    /// CLI arguments (highest priority)
    pub cli_args: Option<DepupConfig>,

    /// Environment variables
    pub env: HashMap<String, String>,
}

impl ConfigLoadOptions {
    /// Options reading the real process environment
    pub fn from_process(project_path: impl Into<PathBuf>, cli_args: Option<DepupConfig>) -> Self {
        Self {
            project_path: project_path.into(),
            home_dir: std::env::var_os("HOME").map(PathBuf::from),
            cli_args,
            env: std::env::vars().collect(),
        }
    }
}

/// Configuration validation result
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigValidationResult {
    pub valid: bool,
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationWarning>,
}

/// Configuration validation error
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigValidationError {
    /// Field path (e.g., "batch.concurrency")
    pub field: String,
    pub message: String,
}

/// Configuration validation warning
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

/// Configuration file loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from multiple sources with priority
    ///
    /// Priority (high to low):
    /// 1. CLI arguments
    /// 2. Environment variables (DEPUP_*)
    /// 3. Project config (./.depup.yaml, ./.depup.yml or ./.depup.toml)
    /// 4. Global config (~/.depup.yaml)
    /// 5. Default values
    pub async fn load(options: ConfigLoadOptions) -> Result<DepupConfig, DepupError> {
        let mut configs: Vec<DepupConfig> = vec![DepupConfig::default()];

        if let Some(home) = &options.home_dir
            && let Some(global_config) = Self::load_from_dir(home).await?
        {
            configs.push(global_config);
        }

        if let Some(project_config) = Self::load_from_dir(&options.project_path).await? {
            configs.push(project_config);
        }

        if let Some(env_config) = Self::load_env_config(&options.env)? {
            configs.push(env_config);
        }

        if let Some(cli_config) = options.cli_args {
            configs.push(cli_config);
        }

        let merged = Self::merge_configs(configs);
        let expanded = Self::expand_env_vars(merged, &options.env);

        let validation = Self::validate(&expanded);
        for warning in &validation.warnings {
            warn!("config [{}] {}", warning.field, warning.message);
        }
        if !validation.valid {
            return Err(DepupError::Config(Self::format_validation_result(
                &validation,
            )));
        }

        Ok(expanded)
    }

    /// Load the first config file found in `dir`
    async fn load_from_dir(dir: &Path) -> Result<Option<DepupConfig>, DepupError> {
        for name in CONFIG_FILENAMES {
            let path = dir.join(name);
            if let Some(config) = Self::load_config_file(&path).await? {
                debug!("loaded configuration from {}", path.display());
                return Ok(Some(config));
            }
        }
        Ok(None)
    }

    /// Load configuration from a YAML or TOML file
    fn load_config_file(
        file_path: &Path,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Option<DepupConfig>, DepupError>> + Send + '_>,
    > {
        Box::pin(async move {
            if !file_path.exists() {
                return Ok(None);
            }

            let content = fs::read_to_string(file_path).await.map_err(|e| {
                DepupError::Config(format!("failed to read {}: {}", file_path.display(), e))
            })?;

            let config = Self::parse(file_path, &content)?;

            // Handle extends if present
            if let Some(extends_path) = &config.extends {
                let base_path = file_path
                    .parent()
                    .ok_or_else(|| DepupError::Config("invalid config file path".to_string()))?
                    .join(extends_path);

                if let Some(base_config) = Self::load_config_file(&base_path).await? {
                    return Ok(Some(Self::merge_configs(vec![base_config, config])));
                }
            }

            Ok(Some(config))
        })
    }

    fn parse(file_path: &Path, content: &str) -> Result<DepupConfig, DepupError> {
        let is_toml = file_path.extension().and_then(|e| e.to_str()) == Some("toml");
        if is_toml {
            toml::from_str(content).map_err(|e| {
                DepupError::Config(format!("failed to parse {}: {}", file_path.display(), e))
            })
        } else {
            serde_yaml::from_str(content).map_err(|e| {
                DepupError::Config(format!("failed to parse {}: {}", file_path.display(), e))
            })
        }
    }

    /// Load configuration from environment variables
    fn load_env_config(env: &HashMap<String, String>) -> Result<Option<DepupConfig>, DepupError> {
        let mut config = DepupConfig::default();
        let mut has_changes = false;

        if let Some(scope) = env.get("DEPUP_SCOPE") {
            config.scope = Some(scope.clone());
            has_changes = true;
        }

        if let Some(store_dir) = env.get("DEPUP_STORE_DIR") {
            config.store_dir = Some(store_dir.clone());
            has_changes = true;
        }

        if let Some(url) = env.get("DEPUP_REGISTRY_URL") {
            config.registry = Some(RegistryConfig {
                url: Some(url.clone()),
                ..Default::default()
            });
            has_changes = true;
        }

        let mut batch = BatchConfig::default();
        if let Some(concurrency) = env.get("DEPUP_CONCURRENCY") {
            batch.concurrency = Some(concurrency.parse().map_err(|_| {
                DepupError::Config(format!("DEPUP_CONCURRENCY is not a number: {}", concurrency))
            })?);
        }
        if let Some(delay) = env.get("DEPUP_BATCH_DELAY_MS") {
            batch.delay_ms = Some(delay.parse().map_err(|_| {
                DepupError::Config(format!("DEPUP_BATCH_DELAY_MS is not a number: {}", delay))
            })?);
        }
        if batch != BatchConfig::default() {
            config.batch = Some(batch);
            has_changes = true;
        }

        if let Some(packages) = env.get("DEPUP_PACKAGES") {
            config.packages = Some(
                packages
                    .split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(str::to_string)
                    .collect(),
            );
            has_changes = true;
        }

        Ok(if has_changes { Some(config) } else { None })
    }

    /// Merge multiple configurations with priority
    fn merge_configs(configs: Vec<DepupConfig>) -> DepupConfig {
        let mut result = DepupConfig::default();

        for config in configs {
            Self::merge_into(&mut result, config);
        }

        result
    }

    /// Merge source config into target
    fn merge_into(target: &mut DepupConfig, source: DepupConfig) {
        if !source.version.is_empty() {
            target.version = source.version;
        }
        if source.extends.is_some() {
            target.extends = source.extends;
        }
        if source.scope.is_some() {
            target.scope = source.scope;
        }
        if source.store_dir.is_some() {
            target.store_dir = source.store_dir;
        }

        if let Some(source_registry) = source.registry {
            let target_registry = target.registry.get_or_insert_with(RegistryConfig::default);
            if source_registry.url.is_some() {
                target_registry.url = source_registry.url;
            }
            if source_registry.access.is_some() {
                target_registry.access = source_registry.access;
            }
            if source_registry.tag.is_some() {
                target_registry.tag = source_registry.tag;
            }
        }

        if let Some(source_batch) = source.batch {
            let target_batch = target.batch.get_or_insert_with(BatchConfig::default);
            if source_batch.concurrency.is_some() {
                target_batch.concurrency = source_batch.concurrency;
            }
            if source_batch.delay_ms.is_some() {
                target_batch.delay_ms = source_batch.delay_ms;
            }
        }

        if let Some(source_timeouts) = source.timeouts {
            let target_timeouts = target.timeouts.get_or_insert_with(TimeoutsConfig::default);
            let pairs = [
                (&mut target_timeouts.registry_secs, source_timeouts.registry_secs),
                (&mut target_timeouts.dependency_secs, source_timeouts.dependency_secs),
                (&mut target_timeouts.extract_secs, source_timeouts.extract_secs),
                (&mut target_timeouts.install_secs, source_timeouts.install_secs),
                (&mut target_timeouts.import_secs, source_timeouts.import_secs),
                (&mut target_timeouts.publish_secs, source_timeouts.publish_secs),
                (&mut target_timeouts.operation_secs, source_timeouts.operation_secs),
            ];
            for (slot, value) in pairs {
                if value.is_some() {
                    *slot = value;
                }
            }
        }

        // Retry budget is replaced as a whole
        if source.retry.is_some() {
            target.retry = source.retry;
        }

        if source.packages.is_some() {
            target.packages = source.packages;
        }
    }

    /// Expand ${VAR} references in path-like settings
    fn expand_env_vars(mut config: DepupConfig, env: &HashMap<String, String>) -> DepupConfig {
        if let Some(store_dir) = &config.store_dir {
            config.store_dir = Some(Self::expand_string(store_dir, env));
        }
        if let Some(registry) = &mut config.registry
            && let Some(url) = &registry.url
        {
            registry.url = Some(Self::expand_string(url, env));
        }
        config
    }

    /// Expand environment variables in a single string
    ///
    /// Unknown variables are left as-is.
    fn expand_string(input: &str, env: &HashMap<String, String>) -> String {
        ENV_VAR_REGEX
            .replace_all(input, |caps: &regex::Captures| match env.get(&caps[1]) {
                Some(value) => value.clone(),
                None => {
                    warn!("environment variable {} not found", &caps[1]);
                    caps[0].to_string()
                }
            })
            .into_owned()
    }

    /// Validate configuration
    pub fn validate(config: &DepupConfig) -> ConfigValidationResult {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if config.version.is_empty() {
            errors.push(ConfigValidationError {
                field: "version".to_string(),
                message: "version is required".to_string(),
            });
        } else if config.version != "1.0" {
            warnings.push(ConfigValidationWarning {
                field: "version".to_string(),
                message: format!("unknown version: {}", config.version),
                suggestion: Some("currently supported version is \"1.0\" only".to_string()),
            });
        }

        if let Some(scope) = &config.scope {
            let well_formed = scope.len() > 1
                && scope.starts_with('@')
                && !scope.contains('/')
                && scope[1..]
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || "-_.".contains(c));
            if !well_formed {
                errors.push(ConfigValidationError {
                    field: "scope".to_string(),
                    message: format!("scope must look like \"@name\", got \"{}\"", scope),
                });
            }
        }

        if let Some(batch) = &config.batch
            && batch.concurrency == Some(0)
        {
            errors.push(ConfigValidationError {
                field: "batch.concurrency".to_string(),
                message: "concurrency must be at least 1".to_string(),
            });
        }

        if let Some(timeouts) = &config.timeouts {
            let fields = [
                ("registrySecs", timeouts.registry_secs),
                ("dependencySecs", timeouts.dependency_secs),
                ("extractSecs", timeouts.extract_secs),
                ("installSecs", timeouts.install_secs),
                ("importSecs", timeouts.import_secs),
                ("publishSecs", timeouts.publish_secs),
                ("operationSecs", timeouts.operation_secs),
            ];
            for (field, value) in fields {
                if value == Some(0) {
                    errors.push(ConfigValidationError {
                        field: format!("timeouts.{}", field),
                        message: "timeouts must be greater than zero".to_string(),
                    });
                }
            }
        }

        if let Some(retry) = &config.retry
            && let Some(multiplier) = retry.backoff_multiplier
            && multiplier < 1.0
        {
            warnings.push(ConfigValidationWarning {
                field: "retry.backoffMultiplier".to_string(),
                message: format!("multiplier {} shrinks the delay between attempts", multiplier),
                suggestion: Some("use a value >= 1.0".to_string()),
            });
        }

        ConfigValidationResult {
            valid: errors.is_empty(),
            errors,
            warnings,
        }
    }

    /// Format validation result as human-readable string
    pub fn format_validation_result(result: &ConfigValidationResult) -> String {
        let mut lines = Vec::new();

        if result.valid {
            lines.push("✅ Configuration validation succeeded".to_string());
        } else {
            lines.push("❌ Configuration has errors".to_string());
        }

        for error in &result.errors {
            lines.push(format!("  - [{}] {}", error.field, error.message));
        }

        for warning in &result.warnings {
            lines.push(format!("  ⚠️  [{}] {}", warning.field, warning.message));
            if let Some(suggestion) = &warning.suggestion {
                lines.push(format!("    Suggestion: {}", suggestion));
            }
        }

        lines.join("\n")
    }
}
