//! Per-item outcomes and the run summary.

use bridge_traits::error::ErrorReport;
use serde::{Deserialize, Serialize};

/// Terminal action taken (or simulated) for one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncAction {
    Created,
    Updated,
    Skipped,
    Failed,
    WouldCreate,
    WouldUpdate,
    WouldSkip,
}

impl SyncAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
            Self::WouldCreate => "would_create",
            Self::WouldUpdate => "would_update",
            Self::WouldSkip => "would_skip",
        }
    }

    /// Whether this action is a dry-run simulation.
    pub fn is_simulated(&self) -> bool {
        matches!(self, Self::WouldCreate | Self::WouldUpdate | Self::WouldSkip)
    }
}

impl std::str::FromStr for SyncAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(Self::Created),
            "updated" => Ok(Self::Updated),
            "skipped" => Ok(Self::Skipped),
            "failed" => Ok(Self::Failed),
            "would_create" => Ok(Self::WouldCreate),
            "would_update" => Ok(Self::WouldUpdate),
            "would_skip" => Ok(Self::WouldSkip),
            other => Err(format!("unknown sync action: {other}")),
        }
    }
}

/// Why an item ended the way it did, when the action alone is ambiguous.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeReason {
    /// Remote state already matched; nothing written
    Noop,
    Conflict,
    Error,
    Partial,
    /// Skipped by the backpressure monitor before execution
    Backpressure,
}

/// Stage timings in milliseconds, each measured independently.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTimings {
    pub total_ms: u64,
    pub lookup_ms: u64,
    pub taxonomy_ms: u64,
    pub media_ms: u64,
    pub post_ms: u64,
}

/// Terminal result of processing one item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemOutcome {
    pub sku: String,
    pub action: SyncAction,
    pub remote_id: Option<i64>,
    pub reason: Option<OutcomeReason>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub errors: Vec<ErrorReport>,
    pub timings: StageTimings,
}

impl ItemOutcome {
    pub fn new(sku: impl Into<String>, action: SyncAction) -> Self {
        Self {
            sku: sku.into(),
            action,
            remote_id: None,
            reason: None,
            warnings: Vec::new(),
            errors: Vec::new(),
            timings: StageTimings::default(),
        }
    }

    pub fn with_remote_id(mut self, remote_id: i64) -> Self {
        self.remote_id = Some(remote_id);
        self
    }

    pub fn with_reason(mut self, reason: OutcomeReason) -> Self {
        self.reason = Some(reason);
        self
    }

    pub fn is_failure(&self) -> bool {
        self.action == SyncAction::Failed
    }
}

/// Aggregated counts for a finished run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
    pub would_create: usize,
    pub would_update: usize,
    pub would_skip: usize,
    pub total_time_ms: u64,
    pub dry_run: bool,
}

impl RunSummary {
    pub fn from_outcomes(outcomes: &[ItemOutcome], dry_run: bool) -> Self {
        let mut summary = Self {
            total: outcomes.len(),
            dry_run,
            ..Self::default()
        };

        for outcome in outcomes {
            match outcome.action {
                SyncAction::Created => summary.created += 1,
                SyncAction::Updated => summary.updated += 1,
                SyncAction::Skipped => summary.skipped += 1,
                SyncAction::Failed => summary.failed += 1,
                SyncAction::WouldCreate => summary.would_create += 1,
                SyncAction::WouldUpdate => summary.would_update += 1,
                SyncAction::WouldSkip => summary.would_skip += 1,
            }
            summary.total_time_ms += outcome.timings.total_ms;
        }

        summary
    }

    /// Whether the run-level exit condition should report failure.
    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_round_trips_through_str() {
        for action in [
            SyncAction::Created,
            SyncAction::Updated,
            SyncAction::Skipped,
            SyncAction::Failed,
            SyncAction::WouldCreate,
            SyncAction::WouldUpdate,
            SyncAction::WouldSkip,
        ] {
            let parsed: SyncAction = action.as_str().parse().unwrap();
            assert_eq!(parsed, action);
        }
        assert!("exploded".parse::<SyncAction>().is_err());
    }

    #[test]
    fn summary_counts_per_action() {
        let outcomes = vec![
            ItemOutcome::new("A", SyncAction::Created),
            ItemOutcome::new("B", SyncAction::Created),
            ItemOutcome::new("C", SyncAction::Skipped).with_reason(OutcomeReason::Noop),
            ItemOutcome::new("D", SyncAction::Failed).with_reason(OutcomeReason::Error),
        ];

        let summary = RunSummary::from_outcomes(&outcomes, false);
        assert_eq!(summary.total, 4);
        assert_eq!(summary.created, 2);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.failed, 1);
        assert!(summary.has_failures());
    }

    #[test]
    fn simulated_actions_are_flagged() {
        assert!(SyncAction::WouldSkip.is_simulated());
        assert!(!SyncAction::Skipped.is_simulated());
    }
}
