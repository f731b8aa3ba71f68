//! Per-package revision status file and revision directories
//!
//! `revisions.json` maps `baseVersion -> index -> {version, timestamp, status}`.
//! Writes merge a single entry into whatever is on disk; nothing else in the
//! file is touched.

use super::json_file::{FileLocks, read_json, write_json_atomic};
use crate::core::error::{DepupError, Result};
use crate::core::types::{PackageRef, RevisionKey, RevisionStatus, package_dir_name};
use crate::validation::version_validator::{produce_version, repair_legacy_version};
use chrono::{DateTime, Utc};
use semver::Version;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;
use tracing::debug;

pub const REVISIONS_FILE: &str = "revisions.json";
pub const REVISION_DIR_PREFIX: &str = "rev-";

/// Stored state of one revision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionRecord {
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub status: RevisionStatus,
}

/// On-disk shape of `revisions.json`
pub type RevisionFile = BTreeMap<String, BTreeMap<String, RevisionRecord>>;

/// A record together with the key it is stored under
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RevisionEntry {
    pub key: RevisionKey,
    pub record: RevisionRecord,
}

/// Parse a stored revision index; anything but plain digits is ignored
pub(crate) fn parse_index(raw: &str) -> Option<u64> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse().ok()
}

/// Order base versions by semver, unparsable ones first by name
pub(crate) fn base_version_order(base: &str) -> (Option<Version>, String) {
    (Version::parse(base).ok(), base.to_string())
}

#[derive(Debug, Clone)]
pub struct RevisionStore {
    root: PathBuf,
    locks: Arc<FileLocks>,
}

impl RevisionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: Arc::new(FileLocks::default()),
        }
    }

    pub(crate) fn locks(&self) -> &FileLocks {
        &self.locks
    }

    pub fn package_dir(&self, name: &str) -> PathBuf {
        self.root.join(package_dir_name(name))
    }

    pub fn revisions_file(&self, name: &str) -> PathBuf {
        self.package_dir(name).join(REVISIONS_FILE)
    }

    /// `{store}/{packageDir}/{baseVersion}`
    pub fn base_dir(&self, package: &PackageRef) -> PathBuf {
        self.package_dir(&package.name).join(&package.base_version)
    }

    /// `{store}/{packageDir}/{baseVersion}/rev-{N}`
    pub fn revision_dir(&self, key: &RevisionKey) -> PathBuf {
        self.base_dir(&key.package_ref())
            .join(format!("{}{}", REVISION_DIR_PREFIX, key.index))
    }

    /// Create the directory a revision is prepared in
    pub async fn create_revision_dir(&self, key: &RevisionKey) -> Result<PathBuf> {
        let dir = self.revision_dir(key);
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| DepupError::store(&dir, e))?;
        Ok(dir)
    }

    /// Load the whole status file of a package, legacy versions repaired
    pub async fn load(&self, name: &str) -> Result<RevisionFile> {
        let mut file: RevisionFile = read_json(&self.revisions_file(name)).await?;
        for revisions in file.values_mut() {
            for record in revisions.values_mut() {
                record.version = repair_legacy_version(&record.version);
            }
        }
        Ok(file)
    }

    pub async fn get(&self, key: &RevisionKey) -> Result<Option<RevisionRecord>> {
        let file = self.load(&key.name).await?;
        Ok(file
            .get(&key.base_version)
            .and_then(|revisions| revisions.get(&key.index.to_string()))
            .cloned())
    }

    /// Merge one revision entry into the package's status file
    pub async fn record(
        &self,
        key: &RevisionKey,
        status: RevisionStatus,
        timestamp: DateTime<Utc>,
    ) -> Result<RevisionRecord> {
        let path = self.revisions_file(&key.name);
        let lock = self.locks.lock_for(&path);
        let _guard = lock.lock().await;

        let mut file = self.load(&key.name).await?;
        let record = RevisionRecord {
            version: produce_version(&key.base_version, key.index),
            timestamp,
            status,
        };
        file.entry(key.base_version.clone())
            .or_default()
            .insert(key.index.to_string(), record.clone());

        write_json_atomic(&path, &file).await?;
        debug!("recorded {} as {}", key, status);
        Ok(record)
    }

    /// Every well-formed entry of a package, ordered by base version then index
    pub async fn history(&self, name: &str) -> Result<Vec<RevisionEntry>> {
        let file = self.load(name).await?;
        let mut entries: Vec<RevisionEntry> = file
            .into_iter()
            .flat_map(|(base_version, revisions)| {
                let name = name.to_string();
                revisions.into_iter().filter_map(move |(index, record)| {
                    Some(RevisionEntry {
                        key: RevisionKey::new(name.clone(), base_version.clone(), parse_index(&index)?),
                        record,
                    })
                })
            })
            .collect();

        entries.sort_by(|a, b| {
            base_version_order(&a.key.base_version)
                .cmp(&base_version_order(&b.key.base_version))
                .then(a.key.index.cmp(&b.key.index))
        });
        Ok(entries)
    }

    /// Indices already taken under a base version
    ///
    /// Union of the `rev-{N}` directories on disk and the keys of the status
    /// file. Malformed names are ignored.
    pub async fn existing_indices(&self, package: &PackageRef) -> Result<BTreeSet<u64>> {
        let mut indices = BTreeSet::new();

        let base_dir = self.base_dir(package);
        match fs::read_dir(&base_dir).await {
            Ok(mut entries) => {
                while let Some(entry) = entries
                    .next_entry()
                    .await
                    .map_err(|e| DepupError::store(&base_dir, e))?
                {
                    let is_dir = entry
                        .file_type()
                        .await
                        .map(|t| t.is_dir())
                        .unwrap_or(false);
                    if !is_dir {
                        continue;
                    }
                    if let Some(index) = entry
                        .file_name()
                        .to_str()
                        .and_then(|n| n.strip_prefix(REVISION_DIR_PREFIX))
                        .and_then(parse_index)
                    {
                        indices.insert(index);
                    }
                }
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(DepupError::store(&base_dir, e)),
        }

        let file = self.load(&package.name).await?;
        if let Some(revisions) = file.get(&package.base_version) {
            indices.extend(revisions.keys().filter_map(|k| parse_index(k)));
        }

        Ok(indices)
    }
}
