//! Identity types shared by the pipeline, the ledger and the orchestrator

use crate::core::error::{DepupError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Dist-tag used when a specifier carries no version
pub const LATEST_TAG: &str = "latest";

/// A package specifier as typed by a user: `name`, `name@version`,
/// `@org/name` or `@org/name@version`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PackageSpec {
    pub name: String,
    /// `None` means the `latest` dist-tag
    pub version: Option<String>,
}

impl PackageSpec {
    pub fn new(name: impl Into<String>, version: Option<String>) -> Self {
        Self {
            name: name.into(),
            version,
        }
    }

    /// Specifier restricted to the `latest` dist-tag
    pub fn latest(name: impl Into<String>) -> Self {
        Self::new(name, None)
    }

    /// Version or dist-tag to query the registry with
    pub fn version_or_tag(&self) -> &str {
        self.version.as_deref().unwrap_or(LATEST_TAG)
    }
}

impl FromStr for PackageSpec {
    type Err = DepupError;

    fn from_str(input: &str) -> Result<Self> {
        let input = input.trim();
        let invalid = |message: &str| DepupError::Resolution {
            spec: input.to_string(),
            message: message.to_string(),
        };

        if input.is_empty() {
            return Err(invalid("empty package specifier"));
        }

        // A leading '@' belongs to the scope, so the version separator is the
        // last '@' after position 0
        let split_at = input
            .char_indices()
            .skip(1)
            .filter(|(_, c)| *c == '@')
            .last()
            .map(|(i, _)| i);
        let (name, version) = match split_at {
            Some(i) => (&input[..i], Some(&input[i + 1..])),
            None => (input, None),
        };

        if name.starts_with('@') && !name.contains('/') {
            return Err(invalid("scoped name is missing '/'"));
        }
        if name.is_empty() || name.ends_with('/') {
            return Err(invalid("missing package name"));
        }

        let version = version
            .map(str::trim)
            .filter(|v| !v.is_empty() && *v != LATEST_TAG)
            .map(str::to_string);

        Ok(Self::new(name, version))
    }
}

impl fmt::Display for PackageSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.version_or_tag())
    }
}

/// An upstream package pinned at the base version being cloned
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PackageRef {
    pub name: String,
    #[serde(rename = "baseVersion")]
    pub base_version: String,
}

impl PackageRef {
    pub fn new(name: impl Into<String>, base_version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_version: base_version.into(),
        }
    }

    /// Directory name used for this package in the store
    ///
    /// `lodash` stays `lodash`, `@org/pkg` becomes `org__pkg`.
    pub fn package_dir(&self) -> String {
        package_dir_name(&self.name)
    }

    pub fn revision(&self, index: u64) -> RevisionKey {
        RevisionKey {
            name: self.name.clone(),
            base_version: self.base_version.clone(),
            index,
        }
    }
}

impl fmt::Display for PackageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.base_version)
    }
}

/// Flatten a possibly scoped package name into a single path segment
pub fn package_dir_name(name: &str) -> String {
    name.trim_start_matches('@').replace('/', "__")
}

/// Ledger key of one revision
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RevisionKey {
    pub name: String,
    #[serde(rename = "baseVersion")]
    pub base_version: String,
    pub index: u64,
}

impl RevisionKey {
    pub fn new(name: impl Into<String>, base_version: impl Into<String>, index: u64) -> Self {
        Self {
            name: name.into(),
            base_version: base_version.into(),
            index,
        }
    }

    pub fn package_ref(&self) -> PackageRef {
        PackageRef::new(self.name.clone(), self.base_version.clone())
    }
}

impl fmt::Display for RevisionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}#{}", self.name, self.base_version, self.index)
    }
}

/// Processing status of a revision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RevisionStatus {
    Prepared,
    Skipped,
    Published,
    Failed,
}

impl RevisionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Prepared => "prepared",
            Self::Skipped => "skipped",
            Self::Published => "published",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for RevisionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of a community vote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteDirection {
    Up,
    Down,
    Neutral,
}

impl FromStr for VoteDirection {
    type Err = DepupError;

    fn from_str(input: &str) -> Result<Self> {
        match input.trim().to_lowercase().as_str() {
            "up" | "+1" | "👍" => Ok(Self::Up),
            "down" | "-1" | "👎" => Ok(Self::Down),
            "neutral" | "0" => Ok(Self::Neutral),
            other => Err(DepupError::Config(format!(
                "unknown vote direction '{}' (expected up, down or neutral)",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_name() {
        let spec: PackageSpec = "lodash".parse().unwrap();
        assert_eq!(spec.name, "lodash");
        assert_eq!(spec.version, None);
        assert_eq!(spec.version_or_tag(), "latest");
    }

    #[test]
    fn test_parse_name_with_version() {
        let spec: PackageSpec = "lodash@4.17.21".parse().unwrap();
        assert_eq!(spec.name, "lodash");
        assert_eq!(spec.version.as_deref(), Some("4.17.21"));
    }

    #[test]
    fn test_parse_scoped_name() {
        let spec: PackageSpec = "@babel/core@7.24.0".parse().unwrap();
        assert_eq!(spec.name, "@babel/core");
        assert_eq!(spec.version.as_deref(), Some("7.24.0"));

        let spec: PackageSpec = "@babel/core".parse().unwrap();
        assert_eq!(spec.name, "@babel/core");
        assert_eq!(spec.version, None);
    }

    #[test]
    fn test_parse_latest_tag_is_none() {
        let spec: PackageSpec = "react@latest".parse().unwrap();
        assert_eq!(spec.version, None);
        assert_eq!(spec.to_string(), "react@latest");
    }

    #[test]
    fn test_parse_invalid_specs() {
        assert!("".parse::<PackageSpec>().is_err());
        assert!("@babel".parse::<PackageSpec>().is_err());
        assert!("@babel/".parse::<PackageSpec>().is_err());
    }

    #[test]
    fn test_package_dir_name() {
        assert_eq!(package_dir_name("lodash"), "lodash");
        assert_eq!(package_dir_name("@babel/core"), "babel__core");
        assert_eq!(PackageRef::new("@types/node", "20.0.0").package_dir(), "types__node");
    }

    #[test]
    fn test_revision_key_display() {
        let key = PackageRef::new("chalk", "5.3.0").revision(2);
        assert_eq!(key.to_string(), "chalk@5.3.0#2");
        assert_eq!(key.package_ref(), PackageRef::new("chalk", "5.3.0"));
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&RevisionStatus::Published).unwrap();
        assert_eq!(json, r#""published""#);

        let status: RevisionStatus = serde_json::from_str(r#""skipped""#).unwrap();
        assert_eq!(status, RevisionStatus::Skipped);
    }

    #[test]
    fn test_vote_direction_parse() {
        assert_eq!("UP".parse::<VoteDirection>().unwrap(), VoteDirection::Up);
        assert_eq!("-1".parse::<VoteDirection>().unwrap(), VoteDirection::Down);
        assert_eq!("neutral".parse::<VoteDirection>().unwrap(), VoteDirection::Neutral);
        assert!("sideways".parse::<VoteDirection>().is_err());
    }
}
