//! Error handling for the revision pipeline
//!
//! This module provides the error taxonomy used across the pipeline, with
//! stable error codes and recovery guidance, using the thiserror crate.

use std::time::Duration;
use thiserror::Error;

/// Main error type for pipeline operations
#[derive(Error, Debug)]
pub enum DepupError {
    // Resolution errors
    #[error("[{spec}] could not be resolved: {message}")]
    Resolution { spec: String, message: String },

    #[error("[{spec}] registry request failed: {message}")]
    Network { spec: String, message: String },

    #[error("[{operation}] timed out after {after:?}")]
    Timeout { operation: String, after: Duration },

    // Dependency bump, rendered into a warning of BumpResult
    #[error("[{dependency}] latest version could not be checked: {message}")]
    DependencyResolution { dependency: String, message: String },

    // Installer / tester
    #[error("[{package}] all install strategies failed")]
    InstallFailure { package: String },

    #[error("[{package}] import test failed: {message}")]
    ImportTestFailure { package: String, message: String },

    // Publish gate
    #[error("[{package}] manifest rejected before publish: {message}")]
    PublishValidation { package: String, message: String },

    #[error("[{package}] scope {scope} does not exist on the registry")]
    ScopeNotFound { package: String, scope: String },

    #[error("[{package}] publish was rejected by the registry: {message}")]
    PublishTransport { package: String, message: String },

    #[error("publish token is not configured (set {env_var})")]
    TokenMissing { env_var: String },

    // Configuration
    #[error("configuration error: {0}")]
    Config(String),

    // Persistence
    #[error("[{path}] revision store error: {message}")]
    Store { path: String, message: String },

    #[error("[{path}] store file is corrupted: {message}")]
    StoreCorrupted { path: String, message: String },

    // Command execution
    #[error("[{command}] command failed: {message}")]
    Command { command: String, message: String },

    #[error("run was cancelled: {0}")]
    Cancelled(String),
}

impl DepupError {
    /// Build a store error from an io error and the path it concerns
    pub fn store(path: &std::path::Path, error: impl std::fmt::Display) -> Self {
        Self::Store {
            path: path.display().to_string(),
            message: error.to_string(),
        }
    }

    /// Check if this error is transient and worth retrying
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network { .. } | Self::Timeout { .. })
    }

    /// Check if this error can be recovered from by the caller without
    /// operator action
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            Self::ScopeNotFound { .. }
                | Self::TokenMissing { .. }
                | Self::Config(_)
                | Self::StoreCorrupted { .. }
                | Self::PublishValidation { .. }
        )
    }

    /// Get suggested actions for this error
    pub fn suggested_actions(&self) -> Vec<&'static str> {
        match self {
            Self::Resolution { .. } => vec![
                "Check the package name and version",
                "Confirm the version is published on the registry",
            ],
            Self::Network { .. } => vec![
                "Check the network connection",
                "Retry later, the registry may be degraded",
            ],
            Self::Timeout { .. } => vec![
                "Increase the timeout with --timeout",
                "Retry later, the registry may be slow",
            ],
            Self::DependencyResolution { .. } => {
                vec!["The dependency was left unchanged; review the warning list"]
            }
            Self::InstallFailure { .. } => vec![
                "Inspect the install output in debug mode",
                "The revision is still usable but was not verified",
            ],
            Self::ImportTestFailure { .. } => {
                vec!["Check the package entry point (main/exports)"]
            }
            Self::PublishValidation { .. } => vec![
                "Remove install/uninstall lifecycle scripts from the manifest",
                "Make sure the manifest name carries the reserved scope",
            ],
            Self::ScopeNotFound { .. } => vec![
                "Create the organisation for the scope on the registry",
                "Check the configured scope name",
            ],
            Self::PublishTransport { .. } => vec![
                "Check the registry status page",
                "Verify the token has publish rights",
            ],
            Self::TokenMissing { .. } => {
                vec!["Export DEPUP_NPM_TOKEN (or NPM_TOKEN) before publishing"]
            }
            Self::Config(_) => vec!["Check .depup.yaml and DEPUP_* environment variables"],
            Self::Store { .. } => vec!["Check permissions of the store directory"],
            Self::StoreCorrupted { .. } => vec![
                "Inspect the JSON file by hand",
                "Restore it from a backup; it is never overwritten destructively",
            ],
            Self::Command { .. } => vec![
                "Check that npm, node and tar are installed",
                "Re-run with --debug to see the command output",
            ],
            Self::Cancelled(_) => vec!["Re-run the package on its own"],
        }
    }

    /// Get error code for this error
    pub fn code(&self) -> &'static str {
        match self {
            Self::Resolution { .. } => "RESOLUTION_ERROR",
            Self::Network { .. } => "NETWORK_ERROR",
            Self::Timeout { .. } => "TIMEOUT_ERROR",
            Self::DependencyResolution { .. } => "DEPENDENCY_RESOLUTION_WARNING",
            Self::InstallFailure { .. } => "INSTALL_FAILURE",
            Self::ImportTestFailure { .. } => "IMPORT_TEST_FAILURE",
            Self::PublishValidation { .. } => "PUBLISH_VALIDATION_ERROR",
            Self::ScopeNotFound { .. } => "SCOPE_NOT_FOUND",
            Self::PublishTransport { .. } => "PUBLISH_TRANSPORT_ERROR",
            Self::TokenMissing { .. } => "TOKEN_MISSING",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Store { .. } => "STORE_ERROR",
            Self::StoreCorrupted { .. } => "STORE_CORRUPTED",
            Self::Command { .. } => "COMMAND_ERROR",
            Self::Cancelled(_) => "CANCELLED",
        }
    }
}

/// Result alias used throughout the library
pub type Result<T> = std::result::Result<T, DepupError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_error() {
        let error = DepupError::Resolution {
            spec: "left-pad@9.9.9".to_string(),
            message: "version not found".to_string(),
        };

        assert_eq!(error.code(), "RESOLUTION_ERROR");
        assert!(!error.is_transient());
        assert!(error.is_recoverable());
        assert!(error.to_string().contains("left-pad@9.9.9"));
    }

    #[test]
    fn test_transient_errors() {
        let network = DepupError::Network {
            spec: "react".to_string(),
            message: "connection reset".to_string(),
        };
        let timeout = DepupError::Timeout {
            operation: "resolve react".to_string(),
            after: Duration::from_secs(5),
        };

        assert!(network.is_transient());
        assert!(timeout.is_transient());
        assert_eq!(timeout.code(), "TIMEOUT_ERROR");
    }

    #[test]
    fn test_scope_not_found_is_distinct_from_transport() {
        let scope = DepupError::ScopeNotFound {
            package: "@depup/lodash".to_string(),
            scope: "@depup".to_string(),
        };
        let transport = DepupError::PublishTransport {
            package: "@depup/lodash".to_string(),
            message: "E500".to_string(),
        };

        assert_ne!(scope.code(), transport.code());
        assert!(!scope.is_recoverable());
        assert!(transport.is_recoverable());
    }

    #[test]
    fn test_validation_needs_operator() {
        let install = DepupError::InstallFailure {
            package: "chalk".to_string(),
        };
        let validation = DepupError::PublishValidation {
            package: "@depup/chalk".to_string(),
            message: "postinstall script".to_string(),
        };

        assert!(install.is_recoverable());
        assert!(!validation.is_recoverable());
    }

    #[test]
    fn test_token_missing_suggests_env_var() {
        let error = DepupError::TokenMissing {
            env_var: "DEPUP_NPM_TOKEN".to_string(),
        };

        let actions = error.suggested_actions();
        assert!(actions.iter().any(|a| a.contains("DEPUP_NPM_TOKEN")));
        assert!(error.to_string().contains("DEPUP_NPM_TOKEN"));
    }

    #[test]
    fn test_every_error_has_actions() {
        let errors = vec![
            DepupError::Config("bad".to_string()),
            DepupError::Cancelled("panic".to_string()),
            DepupError::Command {
                command: "npm".to_string(),
                message: "not found".to_string(),
            },
        ];

        for error in errors {
            assert!(!error.suggested_actions().is_empty(), "{}", error.code());
        }
    }
}
