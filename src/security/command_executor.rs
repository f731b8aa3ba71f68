//! SafeCommandExecutor: whitelisted, timeout-bounded child processes
//!
//! # Security Features
//!
//! - **Whitelist-based validation**: only `npm`, `node` and `tar` can run
//! - **Injection prevention**: arguments are passed as a vector, never
//!   interpolated into a shell string
//! - **Working directory validation**: checked before spawning
//! - **Timeout control**: the child is killed when its deadline passes
//!
//! # Example
//!
//! ```rust,no_run
//! use depup::security::SafeCommandExecutor;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), depup::security::CommandError> {
//! let executor = SafeCommandExecutor::new(std::env::temp_dir())?
//!     .with_timeout(Duration::from_secs(30));
//!
//! let output = executor.execute("npm", &["--version"]).await?;
//! println!("{}", output.stdout);
//! # Ok(())
//! # }
//! ```

use crate::core::error::DepupError;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

/// Allowed commands whitelist
const ALLOWED_COMMANDS: &[&str] = &["npm", "node", "tar"];

/// Applied when no timeout was configured
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(300);

/// Errors that can occur during command execution
#[derive(Error, Debug)]
pub enum CommandError {
    /// Command is not in the allowed whitelist
    #[error("Command '{0}' is not in the allowed whitelist")]
    CommandNotAllowed(String),

    /// Working directory does not exist or is not accessible
    #[error("Working directory does not exist: {0}")]
    InvalidWorkingDirectory(PathBuf),

    /// Command could not be started (binary not found, permission denied)
    #[error("Command '{command}' could not be executed: {message}")]
    ExecutionFailed { command: String, message: String },

    /// Command exceeded the timeout duration and was killed
    #[error("Command '{command}' timed out after {after:?}")]
    Timeout { command: String, after: Duration },
}

impl From<CommandError> for DepupError {
    fn from(error: CommandError) -> Self {
        match error {
            CommandError::Timeout { command, after } => DepupError::Timeout {
                operation: command,
                after,
            },
            CommandError::CommandNotAllowed(command) => DepupError::Command {
                message: "not in the allowed whitelist".to_string(),
                command,
            },
            CommandError::InvalidWorkingDirectory(dir) => DepupError::Command {
                command: dir.display().to_string(),
                message: "working directory does not exist".to_string(),
            },
            CommandError::ExecutionFailed { command, message } => {
                DepupError::Command { command, message }
            }
        }
    }
}

/// Captured result of a finished command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the process was terminated by a signal
    pub status_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status_code == Some(0)
    }

    /// Last non-empty stderr line, falling back to stdout
    pub fn failure_summary(&self) -> String {
        let last_line = |s: &str| {
            s.lines()
                .rev()
                .map(str::trim)
                .find(|l| !l.is_empty())
                .map(str::to_string)
        };
        last_line(&self.stderr)
            .or_else(|| last_line(&self.stdout))
            .unwrap_or_else(|| match self.status_code {
                Some(code) => format!("exited with status {}", code),
                None => "terminated by signal".to_string(),
            })
    }
}

/// Safe command executor with security controls
#[derive(Debug, Clone)]
pub struct SafeCommandExecutor {
    working_dir: PathBuf,
    timeout: Duration,
    envs: Vec<(String, String)>,
}

impl SafeCommandExecutor {
    /// Create an executor bound to an existing working directory
    pub fn new<P: AsRef<Path>>(working_dir: P) -> Result<Self, CommandError> {
        let working_dir = working_dir.as_ref().to_path_buf();

        if !working_dir.is_dir() {
            return Err(CommandError::InvalidWorkingDirectory(working_dir));
        }

        Ok(Self {
            working_dir,
            timeout: DEFAULT_COMMAND_TIMEOUT,
            envs: Vec::new(),
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Add an environment variable for the child process
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn check_allowed(command: &str) -> Result<(), CommandError> {
        if ALLOWED_COMMANDS.contains(&command) {
            Ok(())
        } else {
            Err(CommandError::CommandNotAllowed(command.to_string()))
        }
    }

    /// Execute a whitelisted command and capture its output
    ///
    /// A non-zero exit status is not an error here; inspect
    /// [`CommandOutput::success`].
    pub async fn execute(&self, command: &str, args: &[&str]) -> Result<CommandOutput, CommandError> {
        Self::check_allowed(command)?;

        // npm is a .cmd shim on Windows
        #[cfg(target_os = "windows")]
        let command_name = if command == "npm" {
            format!("{}.cmd", command)
        } else {
            command.to_string()
        };

        #[cfg(not(target_os = "windows"))]
        let command_name = command.to_string();

        let command_line = format!("{} {}", command, args.join(" "));
        debug!(
            "running `{}` in {} (timeout {:?})",
            command_line,
            self.working_dir.display(),
            self.timeout
        );

        let mut child = Command::new(&command_name);
        child
            .args(args)
            .current_dir(&self.working_dir)
            .stdin(std::process::Stdio::null())
            .kill_on_drop(true);
        for (key, value) in &self.envs {
            child.env(key, value);
        }

        let output = match tokio::time::timeout(self.timeout, child.output()).await {
            Ok(result) => result.map_err(|e| CommandError::ExecutionFailed {
                command: command_line.clone(),
                message: e.to_string(),
            })?,
            Err(_) => {
                return Err(CommandError::Timeout {
                    command: command_line,
                    after: self.timeout,
                });
            }
        };

        Ok(CommandOutput {
            status_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_rejected_command_rm() {
        let temp_dir = TempDir::new().unwrap();
        let executor = SafeCommandExecutor::new(temp_dir.path()).unwrap();

        let result = executor.execute("rm", &["-rf", "/"]).await;
        assert!(matches!(result, Err(CommandError::CommandNotAllowed(_))));
    }

    #[tokio::test]
    async fn test_rejected_command_sh() {
        let temp_dir = TempDir::new().unwrap();
        let executor = SafeCommandExecutor::new(temp_dir.path()).unwrap();

        let result = executor.execute("sh", &["-c", "npm publish"]).await;
        assert!(matches!(result, Err(CommandError::CommandNotAllowed(_))));
    }

    #[test]
    fn test_invalid_working_directory() {
        let result = SafeCommandExecutor::new("/nonexistent/directory/that/does/not/exist");
        assert!(matches!(result, Err(CommandError::InvalidWorkingDirectory(_))));
    }

    #[test]
    fn test_builder() {
        let temp_dir = TempDir::new().unwrap();
        let executor = SafeCommandExecutor::new(temp_dir.path())
            .unwrap()
            .with_timeout(Duration::from_secs(5))
            .with_env("NODE_AUTH_TOKEN", "x");

        assert_eq!(executor.timeout(), Duration::from_secs(5));
        assert_eq!(executor.working_dir(), temp_dir.path());
    }

    #[test]
    fn test_timeout_maps_to_timeout_error() {
        let error: DepupError = CommandError::Timeout {
            command: "npm install".to_string(),
            after: Duration::from_secs(1),
        }
        .into();

        assert!(error.is_transient());
        assert_eq!(error.code(), "TIMEOUT_ERROR");
    }

    #[test]
    fn test_not_allowed_maps_to_command_error() {
        let error: DepupError = CommandError::CommandNotAllowed("curl".to_string()).into();
        assert_eq!(error.code(), "COMMAND_ERROR");
        assert!(error.to_string().contains("curl"));
    }

    #[test]
    fn test_failure_summary() {
        let output = CommandOutput {
            status_code: Some(1),
            stdout: "added 3 packages\n".to_string(),
            stderr: "npm ERR! code E404\nnpm ERR! 404 Not Found\n\n".to_string(),
        };
        assert!(!output.success());
        assert_eq!(output.failure_summary(), "npm ERR! 404 Not Found");

        let silent = CommandOutput {
            status_code: Some(2),
            stdout: String::new(),
            stderr: String::new(),
        };
        assert_eq!(silent.failure_summary(), "exited with status 2");
    }
}
