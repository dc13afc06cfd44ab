//! # Sync Reports
//!
//! The result record every pipeline returns to the scheduler, plus the
//! stage and failure taxonomy shared across the engine.
//!
//! ## Result Shape
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  SyncReport                                                             │
//! │                                                                         │
//! │  success     did the pipeline reach 100 %?                              │
//! │  processed   records taken from the snapshot                            │
//! │  inserted    rows newly written                                         │
//! │  updated     rows rewritten after a hash mismatch                       │
//! │  skipped     rows with equal hash (last_sync refresh only) or records   │
//! │              dropped by a per-record invariant failure                  │
//! │  deleted     rows pruned because they left the snapshot                 │
//! │  duration_ms wall-clock of the whole run                                │
//! │  error       failure kind + message when success=false                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `processed = inserted + updated + skipped` holds on every successful
//! run; a stopped or aborted run reports whatever was counted before the
//! abort, and rows already committed stand.

use serde::{Deserialize, Serialize};

// =============================================================================
// Stages
// =============================================================================

/// The stage a pipeline was in when it observed a stop request or failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncStage {
    Start,
    Download,
    Parse,
    DbLoop,
    Prune,
}

impl SyncStage {
    pub const fn as_str(&self) -> &'static str {
        match self {
            SyncStage::Start => "start",
            SyncStage::Download => "download",
            SyncStage::Parse => "parse",
            SyncStage::DbLoop => "db-loop",
            SyncStage::Prune => "prune",
        }
    }
}

impl std::fmt::Display for SyncStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Failure Taxonomy
// =============================================================================

/// The error categories a pipeline surfaces to the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncFailureKind {
    /// Cooperative cancellation; never logged as a failure.
    Stopped,
    /// Snapshot acquisition failed; retried at the next tick.
    Network,
    /// Snapshot structurally invalid; pruning was skipped.
    Parse,
    /// The store layer failed; committed records stand.
    Store,
}

/// A pipeline failure as recorded on the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncFailure {
    pub kind: SyncFailureKind,
    pub message: String,
}

// =============================================================================
// Order Number Tracking
// =============================================================================

/// An order whose number changed while its content hash did not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderNumberChange {
    pub order_id: String,
    pub from: String,
    pub to: String,
}

// =============================================================================
// Sync Report
// =============================================================================

/// Outcome of one pipeline run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncReport {
    pub success: bool,
    pub processed: u64,
    pub inserted: u64,
    pub updated: u64,
    pub skipped: u64,
    pub deleted: u64,
    pub duration_ms: u64,

    /// Set when `success` is false.
    pub error: Option<SyncFailure>,

    /// Orders whose number was tracked out-of-band (order pipeline only).
    pub order_number_changes: Vec<OrderNumberChange>,
}

impl SyncReport {
    pub fn new() -> Self {
        SyncReport::default()
    }

    /// True when the run ended on a cooperative stop.
    pub fn was_stopped(&self) -> bool {
        matches!(
            self.error,
            Some(SyncFailure {
                kind: SyncFailureKind::Stopped,
                ..
            })
        )
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_tokens_are_stable() {
        assert_eq!(SyncStage::DbLoop.to_string(), "db-loop");
        assert_eq!(SyncStage::Start.to_string(), "start");
        assert_eq!(SyncStage::Prune.to_string(), "prune");
    }

    #[test]
    fn stopped_reports_are_recognized() {
        let mut report = SyncReport::new();
        assert!(!report.was_stopped());

        report.error = Some(SyncFailure {
            kind: SyncFailureKind::Stopped,
            message: "stop requested during db-loop".into(),
        });
        assert!(report.was_stopped());

        report.error = Some(SyncFailure {
            kind: SyncFailureKind::Network,
            message: "download failed".into(),
        });
        assert!(!report.was_stopped());
    }
}
