//! Community votes and the integrity score derived from them
//!
//! `integrity.json` maps `baseVersion -> index -> {up, down, neutral, details}`.
//! `details` is append-only; the counters are rewritten from it on every
//! append and the score is always recomputed from the vote list.

use super::json_file::{read_json, write_json_atomic};
use super::revision_store::{
    RevisionRecord, RevisionStore, base_version_order, parse_index,
};
use crate::core::error::{DepupError, Result};
use crate::core::types::{RevisionKey, RevisionStatus, VoteDirection};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use tracing::info;

pub const INTEGRITY_FILE: &str = "integrity.json";

/// One community vote
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteDetail {
    pub id: String,
    pub vote: VoteDirection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub voter: String,
}

/// Stored votes of one revision
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteTally {
    #[serde(default)]
    pub up: u64,
    #[serde(default)]
    pub down: u64,
    #[serde(default)]
    pub neutral: u64,
    #[serde(default)]
    pub details: Vec<VoteDetail>,
}

/// On-disk shape of `integrity.json`
pub type VoteFile = BTreeMap<String, BTreeMap<String, VoteTally>>;

/// Display bucket for a score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntegrityStatus {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl IntegrityStatus {
    pub fn from_score(score: i64) -> Self {
        match score {
            80.. => Self::Excellent,
            60..=79 => Self::Good,
            40..=59 => Self::Fair,
            _ => Self::Poor,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Excellent => "excellent",
            Self::Good => "good",
            Self::Fair => "fair",
            Self::Poor => "poor",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            Self::Excellent => "🟢",
            Self::Good => "🔵",
            Self::Fair => "🟡",
            Self::Poor => "🔴",
        }
    }
}

impl fmt::Display for IntegrityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `round(((up - down) / total) * 100)`, or 0 without votes
///
/// Halves round toward +∞. Integer arithmetic, so replaying the same votes
/// always gives the same score.
pub fn integrity_score(up: u64, down: u64, neutral: u64) -> i64 {
    let total = (up + down + neutral) as i64;
    if total == 0 {
        return 0;
    }
    let diff = up as i64 - down as i64;
    (200 * diff + total).div_euclid(2 * total)
}

/// Vote counts and score of one revision, derived from its votes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegritySnapshot {
    pub up_count: u64,
    pub down_count: u64,
    pub neutral_count: u64,
    pub score: i64,
    pub last_updated: Option<DateTime<Utc>>,
}

impl IntegritySnapshot {
    pub fn from_votes(votes: &[VoteDetail]) -> Self {
        let count = |direction: VoteDirection| votes.iter().filter(|v| v.vote == direction).count() as u64;
        let (up, down, neutral) = (
            count(VoteDirection::Up),
            count(VoteDirection::Down),
            count(VoteDirection::Neutral),
        );

        Self {
            up_count: up,
            down_count: down,
            neutral_count: neutral,
            score: integrity_score(up, down, neutral),
            last_updated: votes.iter().map(|v| v.timestamp).max(),
        }
    }

    pub fn total(&self) -> u64 {
        self.up_count + self.down_count + self.neutral_count
    }

    pub fn status(&self) -> IntegrityStatus {
        IntegrityStatus::from_score(self.score)
    }
}

/// Stored status and integrity of one revision
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RevisionIntegrity {
    pub key: RevisionKey,
    /// `None` when votes exist for a revision the status file does not know
    pub record: Option<RevisionRecord>,
    pub snapshot: IntegritySnapshot,
}

/// Reads and writes the vote file; outcome writes go to the revision store
#[derive(Debug, Clone)]
pub struct IntegrityLedger {
    store: RevisionStore,
}

impl IntegrityLedger {
    pub fn new(store: RevisionStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &RevisionStore {
        &self.store
    }

    pub fn integrity_file(&self, name: &str) -> PathBuf {
        self.store.package_dir(name).join(INTEGRITY_FILE)
    }

    /// Append a vote and return the recomputed snapshot
    pub async fn record_vote(
        &self,
        key: &RevisionKey,
        direction: VoteDirection,
        description: Option<String>,
        voter: &str,
    ) -> Result<IntegritySnapshot> {
        let voter = voter.trim();
        if voter.is_empty() {
            return Err(DepupError::Config("voter id must not be empty".to_string()));
        }

        let path = self.integrity_file(&key.name);
        let lock = self.store.locks().lock_for(&path);
        let _guard = lock.lock().await;

        let mut file: VoteFile = read_json(&path).await?;
        let tally = file
            .entry(key.base_version.clone())
            .or_default()
            .entry(key.index.to_string())
            .or_default();

        tally.details.push(VoteDetail {
            id: uuid::Uuid::new_v4().to_string(),
            vote: direction,
            description: description
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty()),
            timestamp: Utc::now(),
            voter: voter.to_string(),
        });

        let snapshot = IntegritySnapshot::from_votes(&tally.details);
        tally.up = snapshot.up_count;
        tally.down = snapshot.down_count;
        tally.neutral = snapshot.neutral_count;

        write_json_atomic(&path, &file).await?;
        info!(
            "vote recorded for {}: score {} ({})",
            key,
            snapshot.score,
            snapshot.status()
        );
        Ok(snapshot)
    }

    /// Current snapshot of one revision (zero votes when none were cast)
    pub async fn snapshot(&self, key: &RevisionKey) -> Result<IntegritySnapshot> {
        let file: VoteFile = read_json(&self.integrity_file(&key.name)).await?;
        let votes = file
            .get(&key.base_version)
            .and_then(|revisions| revisions.get(&key.index.to_string()))
            .map(|tally| tally.details.as_slice())
            .unwrap_or_default();
        Ok(IntegritySnapshot::from_votes(votes))
    }

    /// Record the outcome of a pipeline run; votes are not touched
    pub async fn record_outcome(
        &self,
        key: &RevisionKey,
        status: RevisionStatus,
        timestamp: DateTime<Utc>,
    ) -> Result<RevisionRecord> {
        self.store.record(key, status, timestamp).await
    }

    /// Every known revision of a package with its integrity
    pub async fn history(&self, name: &str) -> Result<Vec<RevisionIntegrity>> {
        let mut records: BTreeMap<(String, u64), RevisionRecord> = self
            .store
            .history(name)
            .await?
            .into_iter()
            .map(|e| ((e.key.base_version, e.key.index), e.record))
            .collect();

        let votes: VoteFile = read_json(&self.integrity_file(name)).await?;
        let mut keys: BTreeSet<(String, u64)> = records.keys().cloned().collect();
        for (base, revisions) in &votes {
            keys.extend(
                revisions
                    .keys()
                    .filter_map(|k| parse_index(k))
                    .map(|index| (base.clone(), index)),
            );
        }

        let mut history: Vec<RevisionIntegrity> = keys
            .into_iter()
            .map(|(base, index)| {
                let details = votes
                    .get(&base)
                    .and_then(|revisions| revisions.get(&index.to_string()))
                    .map(|tally| tally.details.as_slice())
                    .unwrap_or_default();
                RevisionIntegrity {
                    record: records.remove(&(base.clone(), index)),
                    snapshot: IntegritySnapshot::from_votes(details),
                    key: RevisionKey::new(name, base, index),
                }
            })
            .collect();

        history.sort_by(|a, b| {
            base_version_order(&a.key.base_version)
                .cmp(&base_version_order(&b.key.base_version))
                .then(a.key.index.cmp(&b.key.index))
        });
        Ok(history)
    }
}
