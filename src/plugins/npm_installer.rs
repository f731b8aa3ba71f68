//! NPM Installer - `npm install` runs and the node import harness

use crate::core::error::{DepupError, Result};
use crate::core::traits::{ImportReport, InstallStrategy, Installer};
use crate::security::command_executor::{CommandOutput, SafeCommandExecutor};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tracing::debug;

/// Script file written into the harness directory
const IMPORT_SCRIPT: &str = "depup-import-test.cjs";

/// Loads the package by name and prints `{kind, keys}` as one JSON line.
/// ESM-only packages fall back to a dynamic import.
const IMPORT_SCRIPT_SOURCE: &str = r#"'use strict';
const name = process.argv[2];
function report(mod) {
  const kind = typeof mod;
  const keys = mod !== null && (kind === 'object' || kind === 'function')
    ? Object.keys(mod).slice(0, 20)
    : [];
  console.log(JSON.stringify({ kind, keys }));
}
function fail(err) {
  console.error(String((err && err.message) || err));
  process.exit(1);
}
try {
  report(require(name));
} catch (err) {
  if (err && (err.code === 'ERR_REQUIRE_ESM' || err.code === 'ERR_PACKAGE_PATH_NOT_EXPORTED')) {
    import(name).then(report).catch(fail);
  } else {
    fail(err);
  }
}
"#;

#[derive(Debug, Deserialize)]
struct HarnessLine {
    kind: String,
    #[serde(default)]
    keys: Vec<String>,
}

/// `npm pack --json` output entry
#[derive(Debug, Deserialize)]
struct PackEntry {
    filename: String,
}

/// Parse the last JSON line the harness script printed
fn parse_harness_output(stdout: &str) -> Option<ImportReport> {
    stdout
        .lines()
        .rev()
        .find_map(|line| serde_json::from_str::<HarnessLine>(line.trim()).ok())
        .map(|line| ImportReport {
            export_kind: line.kind,
            export_keys: line.keys,
        })
}

/// Installer backed by the npm and node CLIs
#[derive(Debug, Default)]
pub struct NpmInstaller;

impl NpmInstaller {
    pub fn new() -> Self {
        Self
    }

    fn check(command: &str, output: CommandOutput) -> Result<CommandOutput> {
        if output.success() {
            Ok(output)
        } else {
            Err(DepupError::Command {
                command: command.to_string(),
                message: output.failure_summary(),
            })
        }
    }

    async fn npm_install(
        &self,
        dir: &Path,
        target: Option<&str>,
        strategy: InstallStrategy,
        timeout: Duration,
    ) -> Result<()> {
        let mut args = vec!["install", "--no-audit", "--no-fund"];
        if let Some(target) = target {
            args.push(target);
        }
        args.extend_from_slice(strategy.npm_flags());

        let output = SafeCommandExecutor::new(dir)?
            .with_timeout(timeout)
            .execute("npm", &args)
            .await?;
        Self::check(&format!("npm {}", args.join(" ")), output)?;
        Ok(())
    }
}

#[async_trait]
impl Installer for NpmInstaller {
    async fn install(&self, dir: &Path, strategy: InstallStrategy, timeout: Duration) -> Result<()> {
        self.npm_install(dir, None, strategy, timeout).await
    }

    async fn install_dependency(
        &self,
        harness_dir: &Path,
        package_dir: &Path,
        strategy: InstallStrategy,
        timeout: Duration,
    ) -> Result<()> {
        // Installing a directory would only symlink it; pack it first so
        // the harness sees what a registry consumer would get
        let package_path = package_dir.to_string_lossy().into_owned();
        let destination = harness_dir.to_string_lossy().into_owned();
        let output = SafeCommandExecutor::new(harness_dir)?
            .with_timeout(timeout)
            .execute(
                "npm",
                &[
                    "pack",
                    package_path.as_str(),
                    "--pack-destination",
                    destination.as_str(),
                    "--json",
                    "--ignore-scripts",
                ],
            )
            .await?;
        let output = Self::check("npm pack", output)?;

        let entries: Vec<PackEntry> =
            serde_json::from_str(&output.stdout).map_err(|e| DepupError::Command {
                command: "npm pack".to_string(),
                message: format!("unexpected output: {}", e),
            })?;
        let tarball = entries.into_iter().next().ok_or_else(|| DepupError::Command {
            command: "npm pack".to_string(),
            message: "no tarball was produced".to_string(),
        })?;
        debug!("packed {} for the harness", tarball.filename);

        let target = format!("./{}", tarball.filename);
        self.npm_install(harness_dir, Some(&target), strategy, timeout)
            .await
    }

    async fn run_import_test(
        &self,
        harness_dir: &Path,
        package_name: &str,
        timeout: Duration,
    ) -> Result<ImportReport> {
        let script = harness_dir.join(IMPORT_SCRIPT);
        fs::write(&script, IMPORT_SCRIPT_SOURCE)
            .await
            .map_err(|e| DepupError::store(&script, e))?;

        let output = SafeCommandExecutor::new(harness_dir)?
            .with_timeout(timeout)
            .execute("node", &[IMPORT_SCRIPT, package_name])
            .await?;

        if !output.success() {
            return Err(DepupError::ImportTestFailure {
                package: package_name.to_string(),
                message: output.failure_summary(),
            });
        }

        parse_harness_output(&output.stdout).ok_or_else(|| DepupError::ImportTestFailure {
            package: package_name.to_string(),
            message: "import harness printed no report".to_string(),
        })
    }
}
