//! # Reconciliation Pipelines
//!
//! The six pipelines, one per sync kind, and their shared scaffolding.
//!
//! ## Generic Pipeline Contract
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  run(deps, user?, progress, stop) → SyncReport                          │
//! │                                                                         │
//! │   5 %  download snapshot          checkpoint: start, post-download      │
//! │  20 %  parse snapshot             checkpoint: post-parse                │
//! │  40 %  reconcile N records        checkpoint: every 10th record         │
//! │  80 %  prune                      (customers, orders, products)         │
//! │ 100 %  done                       exactly once, on success              │
//! │                                                                         │
//! │  cleanup(path) runs on EVERY exit path once a path was acquired.        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Per-record decision (hash-based change detection):
//! - row absent            → INSERT, count `inserted`
//! - row present, hash =   → refresh `last_sync` only, count `skipped`
//! - row present, hash ≠   → UPDATE mutable columns, count `updated`
//!
//! An empty snapshot is NOT "everything was deleted": the run skips the
//! prune phase and succeeds with `processed = 0`. A record that fails its
//! required-field validation is skipped and counted, never fatal.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use fresis_core::{SyncKind, SyncReport, SyncStage};

use crate::cancel::StopSignal;
use crate::error::SyncResult;
use crate::progress::ProgressSender;
use crate::snapshot::{SnapshotParser, SnapshotSource};

pub mod customers;
pub mod ddt;
pub mod invoices;
pub mod orders;
pub mod prices;
pub mod products;

pub use customers::sync_customers;
pub use ddt::sync_ddt;
pub use invoices::sync_invoices;
pub use orders::sync_orders;
pub use prices::sync_prices;
pub use products::sync_products;

// =============================================================================
// Progress Labels (host application UI strings)
// =============================================================================

pub(crate) const LABEL_DOWNLOAD: &str = "scaricamento snapshot";
pub(crate) const LABEL_PARSE: &str = "analisi snapshot";
pub(crate) const LABEL_PRUNE: &str = "pulizia record obsoleti";
pub(crate) const LABEL_DONE: &str = "completato";

pub(crate) fn label_reconcile(count: usize) -> String {
    format!("sincronizzazione di {count} record")
}

// =============================================================================
// Dependencies
// =============================================================================

/// The capability set a pipeline runs against: a store handle, the
/// snapshot source and the parser for its record type. Pure pipelines
/// consume only these.
pub struct SyncDeps<S, R> {
    pub store: Arc<S>,
    pub source: Arc<dyn SnapshotSource>,
    pub parser: Arc<dyn SnapshotParser<R>>,
}

impl<S, R> SyncDeps<S, R> {
    pub fn new(
        store: Arc<S>,
        source: Arc<dyn SnapshotSource>,
        parser: Arc<dyn SnapshotParser<R>>,
    ) -> Self {
        SyncDeps { store, source, parser }
    }
}

impl<S, R> Clone for SyncDeps<S, R> {
    fn clone(&self) -> Self {
        SyncDeps {
            store: self.store.clone(),
            source: self.source.clone(),
            parser: self.parser.clone(),
        }
    }
}

// =============================================================================
// Shared Scaffolding
// =============================================================================

/// Polls the stop signal at a mandatory checkpoint.
pub(crate) fn checkpoint(stop: &dyn StopSignal, stage: SyncStage) -> SyncResult<()> {
    if stop.is_tripped() {
        Err(crate::error::SyncError::stopped(stage))
    } else {
        Ok(())
    }
}

/// The reconciliation-loop checkpoint: every tenth record, skipping the
/// first so a stop request always leaves at least the already-reconciled
/// prefix committed.
pub(crate) fn loop_checkpoint(stop: &dyn StopSignal, index: usize) -> SyncResult<()> {
    if index > 0 && index % 10 == 0 {
        checkpoint(stop, SyncStage::DbLoop)
    } else {
        Ok(())
    }
}

/// Downloads and parses the snapshot for one scope, driving the progress
/// and checkpoint sequence up to the reconciliation loop. The acquired
/// path is stored in `path_slot` BEFORE any fallible step so the caller's
/// cleanup sees it on every exit path.
pub(crate) async fn fetch_records<S, R>(
    deps: &SyncDeps<S, R>,
    kind: SyncKind,
    user_id: Option<&str>,
    progress: &ProgressSender,
    stop: &dyn StopSignal,
    path_slot: &mut Option<PathBuf>,
) -> SyncResult<Vec<R>> {
    checkpoint(stop, SyncStage::Start)?;
    progress.report(5, LABEL_DOWNLOAD);

    let path = deps.source.download(kind, user_id).await?;
    *path_slot = Some(path.clone());

    checkpoint(stop, SyncStage::Download)?;
    progress.report(20, LABEL_PARSE);

    let records = deps.parser.parse(&path)?;

    checkpoint(stop, SyncStage::Parse)?;
    progress.report(40, label_reconcile(records.len()));

    Ok(records)
}

/// Seals a report: stamps the duration, converts the outcome into the
/// success flag / failure record, and emits the final progress event.
pub(crate) fn finish(
    kind: SyncKind,
    user_id: Option<&str>,
    mut report: SyncReport,
    outcome: SyncResult<()>,
    started: Instant,
    progress: &ProgressSender,
) -> SyncReport {
    report.duration_ms = started.elapsed().as_millis() as u64;

    match outcome {
        Ok(()) => {
            report.success = true;
            progress.report(100, LABEL_DONE);
            info!(
                kind = %kind,
                user_id = user_id.unwrap_or("-"),
                processed = report.processed,
                inserted = report.inserted,
                updated = report.updated,
                skipped = report.skipped,
                deleted = report.deleted,
                duration_ms = report.duration_ms,
                "Sync complete"
            );
        }
        Err(err) => {
            report.success = false;
            report.error = Some(err.as_failure());
            if err.is_stopped() {
                info!(kind = %kind, user_id = user_id.unwrap_or("-"), %err, "Sync stopped");
            } else {
                warn!(kind = %kind, user_id = user_id.unwrap_or("-"), %err, "Sync failed");
            }
        }
    }

    report
}
