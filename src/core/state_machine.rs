//! Stage tracking for a single pipeline run
//!
//! A run moves through its steps in one fixed order. The tracker rejects
//! any transition that would go backwards or skip past a terminal state,
//! and keeps a timestamped history for the run report.

use crate::core::error::DepupError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Pipeline stage
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineStage {
    Pending,
    Fetching,
    Allocating,
    Bumping,
    Testing,
    Gating,
    Recording,
    Succeeded,
    Failed,
}

impl PipelineStage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// State transition
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StageTransition {
    pub from: PipelineStage,
    pub to: PipelineStage,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid stage transition {from:?} -> {to:?}")]
pub struct InvalidTransition {
    pub from: PipelineStage,
    pub to: PipelineStage,
}

impl From<InvalidTransition> for DepupError {
    fn from(error: InvalidTransition) -> Self {
        DepupError::Cancelled(error.to_string())
    }
}

/// Forward-only stage tracker for one run
#[derive(Debug, Clone)]
pub struct StageTracker {
    current: PipelineStage,
    transitions: Vec<StageTransition>,
}

impl Default for StageTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl StageTracker {
    pub fn new() -> Self {
        Self {
            current: PipelineStage::Pending,
            transitions: Vec::new(),
        }
    }

    /// Move to `to`; optional steps may be skipped but never revisited
    pub fn advance(&mut self, to: PipelineStage) -> Result<(), InvalidTransition> {
        self.advance_with_note(to, None)
    }

    pub fn advance_with_note(
        &mut self,
        to: PipelineStage,
        note: Option<String>,
    ) -> Result<(), InvalidTransition> {
        let from = self.current;
        let allowed = !from.is_terminal() && (to > from || to == PipelineStage::Failed);
        if !allowed {
            return Err(InvalidTransition { from, to });
        }

        self.transitions.push(StageTransition {
            from,
            to,
            timestamp: Utc::now(),
            note,
        });
        self.current = to;
        Ok(())
    }

    /// Mark the run failed from whatever stage it reached
    ///
    /// No-op once the run is terminal.
    pub fn fail(&mut self, reason: impl Into<String>) {
        let _ = self.advance_with_note(PipelineStage::Failed, Some(reason.into()));
    }

    pub fn stage(&self) -> PipelineStage {
        self.current
    }

    pub fn transitions(&self) -> &[StageTransition] {
        &self.transitions
    }

    /// Last non-terminal stage reached (where a failure happened)
    pub fn last_active_stage(&self) -> PipelineStage {
        self.transitions
            .iter()
            .rev()
            .map(|t| t.to)
            .find(|s| !s.is_terminal())
            .unwrap_or(PipelineStage::Pending)
    }

    /// Transition history as human-readable lines
    pub fn history(&self) -> String {
        self.transitions
            .iter()
            .map(|t| {
                let note = t
                    .note
                    .as_ref()
                    .map(|n| format!(" ({})", n))
                    .unwrap_or_default();
                format!("{}: {:?} → {:?}{}", t.timestamp.to_rfc3339(), t.from, t.to, note)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
