//! # Invoice Pipeline
//!
//! Tenant-scoped enrichment pass, the twin of the DDT pass: snapshot
//! records keyed by `order_number` resolve to an order id and rewrite the
//! invoice fields of that row. Unmatched records count as skipped; no
//! insertions, no deletions, no prune phase.

use std::time::Instant;

use tracing::{debug, info, warn};

use fresis_core::{InvoiceUpdate, SyncKind, SyncReport};

use crate::cancel::StopSignal;
use crate::error::SyncResult;
use crate::pipeline::{fetch_records, finish, loop_checkpoint, SyncDeps};
use crate::progress::ProgressSender;
use crate::snapshot::InvoiceRecord;
use crate::store::OrderStore;

/// Runs one invoice enrichment pass for `user_id`.
pub async fn sync_invoices<S>(
    deps: &SyncDeps<S, InvoiceRecord>,
    user_id: &str,
    progress: &ProgressSender,
    stop: &dyn StopSignal,
) -> SyncReport
where
    S: OrderStore,
{
    let started = Instant::now();
    info!(user_id, "Invoice sync started");

    let mut report = SyncReport::new();
    let mut snapshot_path = None;

    let outcome = run(deps, user_id, progress, stop, &mut report, &mut snapshot_path).await;

    if let Some(path) = snapshot_path {
        deps.source.cleanup(&path).await;
    }

    finish(
        SyncKind::Invoices,
        Some(user_id),
        report,
        outcome,
        started,
        progress,
    )
}

async fn run<S>(
    deps: &SyncDeps<S, InvoiceRecord>,
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
        SyncKind::Invoices,
        Some(user_id),
        progress,
        stop,
        snapshot_path,
    )
    .await?;

    if records.is_empty() {
        debug!(user_id, "Empty invoice snapshot");
        return Ok(());
    }

    for (index, record) in records.iter().enumerate() {
        loop_checkpoint(stop, index)?;
        report.processed += 1;

        if let Err(reason) = record.validate() {
            warn!(user_id, %reason, "Skipping invalid invoice record");
            report.skipped += 1;
            continue;
        }

        match deps
            .store
            .order_id_for_number(user_id, &record.order_number)
            .await?
        {
            Some(order_id) => {
                let update = InvoiceUpdate {
                    invoice_number: record.invoice_number.clone(),
                    invoice_date: record.invoice_date,
                };
                deps.store.apply_invoice(user_id, &order_id, &update).await?;
                report.updated += 1;
            }
            None => {
                debug!(
                    user_id,
                    order_number = %record.order_number,
                    "Invoice without matching order"
                );
                report.skipped += 1;
            }
        }
    }

    Ok(())
}
