//! # DDT Pipeline
//!
//! Tenant-scoped enrichment pass: the snapshot yields delivery notes keyed
//! by `order_number`; each one resolves to an order id and rewrites the
//! DDT fields of that row. Notes whose number matches no order are counted
//! as skipped and never fail the sync. No insertions, no deletions, no
//! prune phase.

use std::time::Instant;

use tracing::{debug, info, warn};

use fresis_core::{DdtUpdate, SyncKind, SyncReport};

use crate::cancel::StopSignal;
use crate::error::SyncResult;
use crate::pipeline::{fetch_records, finish, loop_checkpoint, SyncDeps};
use crate::progress::ProgressSender;
use crate::snapshot::DdtRecord;
use crate::store::OrderStore;

/// Runs one DDT enrichment pass for `user_id`.
pub async fn sync_ddt<S>(
    deps: &SyncDeps<S, DdtRecord>,
    user_id: &str,
    progress: &ProgressSender,
    stop: &dyn StopSignal,
) -> SyncReport
where
    S: OrderStore,
{
    let started = Instant::now();
    info!(user_id, "DDT sync started");

    let mut report = SyncReport::new();
    let mut snapshot_path = None;

    let outcome = run(deps, user_id, progress, stop, &mut report, &mut snapshot_path).await;

    if let Some(path) = snapshot_path {
        deps.source.cleanup(&path).await;
    }

    finish(
        SyncKind::Ddt,
        Some(user_id),
        report,
        outcome,
        started,
        progress,
    )
}

async fn run<S>(
    deps: &SyncDeps<S, DdtRecord>,
    user_id: &str,
    progress: &ProgressSender,
    stop: &dyn StopSignal,
    report: &mut SyncReport,
    snapshot_path: &mut Option<std::path::PathBuf>,
) -> SyncResult<()>
where
    S: OrderStore,
{
    let records = fetch_records(
        deps,
        SyncKind::Ddt,
        Some(user_id),
        progress,
        stop,
        snapshot_path,
    )
    .await?;

    if records.is_empty() {
        debug!(user_id, "Empty DDT snapshot");
        return Ok(());
    }

    for (index, record) in records.iter().enumerate() {
        loop_checkpoint(stop, index)?;
        report.processed += 1;

        if let Err(reason) = record.validate() {
            warn!(user_id, %reason, "Skipping invalid DDT record");
            report.skipped += 1;
            continue;
        }

        match deps
            .store
            .order_id_for_number(user_id, &record.order_number)
            .await?
        {
            Some(order_id) => {
                let update = DdtUpdate {
                    ddt_number: record.ddt_number.clone(),
                    ddt_date: record.ddt_date,
                    ddt_status: record.ddt_status.clone(),
                };
                deps.store.apply_ddt(user_id, &order_id, &update).await?;
                report.updated += 1;
            }
            None => {
                // The order may simply not have been imported yet; the
                // next order sync plus the next DDT pass will close the gap.
                debug!(
                    user_id,
                    order_number = %record.order_number,
                    "DDT without matching order"
                );
                report.skipped += 1;
            }
        }
    }

    Ok(())
}
