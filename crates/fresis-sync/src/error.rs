//! # Sync Error Types
//!
//! The pipeline-level error taxonomy surfaced to the scheduler.
//!
//! ## Error Categories
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  Stopped     cooperative cancellation; never logged as failure          │
//! │  Network     snapshot acquisition failed; retried next tick             │
//! │  Parse       snapshot structurally invalid; pruning skipped             │
//! │  Store       database failure; committed records stand                  │
//! │  Invariant   one record missed a required field; counted as skipped,    │
//! │              surfaces as an error only if a caller chooses to           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The "stopped" signal never leaks across the API surface as an unwound
//! panic: it is an ordinary `Err(SyncError::Stopped { .. })` that the
//! pipeline wrapper converts into a tagged report.

use thiserror::Error;

use fresis_core::{SyncFailure, SyncFailureKind, SyncStage};

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Pipeline-level errors.
#[derive(Debug, Clone, Error)]
pub enum SyncError {
    /// Cooperative cancellation observed at a checkpoint.
    #[error("stop requested during {stage}")]
    Stopped { stage: SyncStage },

    /// Snapshot acquisition failed.
    #[error("snapshot download failed: {0}")]
    Network(String),

    /// Snapshot structurally invalid.
    #[error("snapshot parse failed: {0}")]
    Parse(String),

    /// The store layer failed.
    #[error("store error: {0}")]
    Store(String),

    /// A snapshot record produced inconsistent data.
    #[error("invariant violation: {0}")]
    Invariant(String),
}

impl SyncError {
    /// Shorthand for a stop observed at `stage`.
    pub fn stopped(stage: SyncStage) -> Self {
        SyncError::Stopped { stage }
    }

    /// True for cooperative cancellation.
    pub fn is_stopped(&self) -> bool {
        matches!(self, SyncError::Stopped { .. })
    }

    /// True when the next scheduled tick may simply retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Network(_) | SyncError::Parse(_) | SyncError::Store(_))
    }

    /// The coarse category recorded on the sync report.
    pub fn failure_kind(&self) -> SyncFailureKind {
        match self {
            SyncError::Stopped { .. } => SyncFailureKind::Stopped,
            SyncError::Network(_) => SyncFailureKind::Network,
            SyncError::Parse(_) => SyncFailureKind::Parse,
            // Invariant failures only abort a run when a caller promotes
            // them; on the report they read as a store-side fault.
            SyncError::Store(_) | SyncError::Invariant(_) => SyncFailureKind::Store,
        }
    }

    /// The failure record placed on a report.
    pub fn as_failure(&self) -> SyncFailure {
        SyncFailure {
            kind: self.failure_kind(),
            message: self.to_string(),
        }
    }
}

impl From<fresis_db::DbError> for SyncError {
    fn from(err: fresis_db::DbError) -> Self {
        SyncError::Store(err.to_string())
    }
}
