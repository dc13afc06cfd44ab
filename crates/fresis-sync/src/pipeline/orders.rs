//! # Order Pipeline
//!
//! Tenant-scoped reconciliation of orders and their article lines.
//!
//! ## Out-of-Band Order Numbers
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  The content hash covers {id, order_number, sales_status,               │
//! │  document_status, transfer_status, total_amount}.                       │
//! │                                                                         │
//! │  stored.hash == incoming.hash                → touch, skipped           │
//! │  hashes differ, but recomputing the incoming                            │
//! │  hash with the STORED number reproduces the                             │
//! │  stored hash                                 → the number is the only   │
//! │                                                semantic change: rewrite │
//! │                                                order_number + last_sync │
//! │                                                only, still skipped,     │
//! │                                                reported on the result   │
//! │  hashes differ otherwise                     → full update              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Pruning cascades: article lines first, then state history, then the
//! order rows, in one transaction (the store contract).

use std::collections::HashMap;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info, warn};

use fresis_core::{
    Order, OrderArticle, OrderNumberChange, SyncKind, SyncReport, SyncStage, INITIAL_ORDER_STATE,
};

use crate::cancel::StopSignal;
use crate::error::SyncResult;
use crate::pipeline::{
    checkpoint, fetch_records, finish, loop_checkpoint, SyncDeps, LABEL_PRUNE,
};
use crate::progress::ProgressSender;
use crate::snapshot::OrderRecord;
use crate::store::{OrderStore, UserDirectory};

/// Runs one order sync for `user_id`.
pub async fn sync_orders<S>(
    deps: &SyncDeps<S, OrderRecord>,
    user_id: &str,
    progress: &ProgressSender,
    stop: &dyn StopSignal,
) -> SyncReport
where
    S: OrderStore + UserDirectory,
{
    let started = Instant::now();
    info!(user_id, "Order sync started");

    let mut report = SyncReport::new();
    let mut snapshot_path = None;

    let outcome = run(deps, user_id, progress, stop, &mut report, &mut snapshot_path).await;

    if let Some(path) = snapshot_path {
        deps.source.cleanup(&path).await;
    }

    finish(
        SyncKind::Orders,
        Some(user_id),
        report,
        outcome,
        started,
        progress,
    )
}

async fn run<S>(
    deps: &SyncDeps<S, OrderRecord>,
    user_id: &str,
    progress: &ProgressSender,
    stop: &dyn StopSignal,
    report: &mut SyncReport,
    snapshot_path: &mut Option<std::path::PathBuf>,
) -> SyncResult<()>
where
    S: OrderStore + UserDirectory,
{
    let records = fetch_records(
        deps,
        SyncKind::Orders,
        Some(user_id),
        progress,
        stop,
        snapshot_path,
    )
    .await?;

    if records.is_empty() {
        debug!(user_id, "Empty order snapshot, skipping reconciliation");
        return Ok(());
    }

    let heads = deps.store.order_heads(user_id).await?;
    let existing: HashMap<String, (String, String)> = heads
        .into_iter()
        .map(|head| (head.id, (head.order_number, head.hash)))
        .collect();

    let now = Utc::now().timestamp();
    let mut seen: Vec<String> = Vec::with_capacity(records.len());

    for (index, record) in records.iter().enumerate() {
        loop_checkpoint(stop, index)?;
        report.processed += 1;

        if let Err(reason) = record.validate() {
            warn!(user_id, %reason, "Skipping invalid order record");
            report.skipped += 1;
            continue;
        }

        let (order, articles) = order_from_record(user_id, record, now);
        seen.push(order.id.clone());

        match existing.get(&order.id) {
            None => {
                deps.store.insert_order(&order, &articles).await?;
                report.inserted += 1;
            }
            Some((_, stored_hash)) if *stored_hash == order.hash => {
                deps.store.touch_order(user_id, &order.id, now).await?;
                report.skipped += 1;
            }
            Some((stored_number, stored_hash))
                if order.content_hash_with_number(stored_number) == *stored_hash =>
            {
                // Only the number moved; no content change.
                deps.store
                    .rename_order(user_id, &order.id, &order.order_number, now)
                    .await?;
                report.order_number_changes.push(OrderNumberChange {
                    order_id: order.id.clone(),
                    from: stored_number.clone(),
                    to: order.order_number.clone(),
                });
                report.skipped += 1;
            }
            Some(_) => {
                deps.store.update_order(&order, &articles).await?;
                report.updated += 1;
            }
        }
    }

    checkpoint(stop, SyncStage::Prune)?;
    progress.report(80, LABEL_PRUNE);

    if !seen.is_empty() {
        report.deleted += deps.store.prune_orders(user_id, &seen).await?;
    }

    deps.store.stamp_order_sync(user_id, now).await?;

    Ok(())
}

/// Maps a snapshot record onto the domain row and its article lines,
/// computing the content hash. Lifecycle state and enrichment fields start
/// empty; they belong to other writers.
fn order_from_record(user_id: &str, record: &OrderRecord, now: i64) -> (Order, Vec<OrderArticle>) {
    let mut order = Order {
        id: record.id.clone(),
        user_id: user_id.to_string(),
        order_number: record.order_number.clone(),
        customer_profile: record.customer_profile.clone(),
        customer_name: record.customer_name.clone(),
        order_date: record.order_date,
        delivery_date: record.delivery_date,
        sales_status: record.sales_status.clone(),
        document_status: record.document_status.clone(),
        transfer_status: record.transfer_status.clone(),
        taxable_amount: record.taxable_amount.clone(),
        vat_amount: record.vat_amount.clone(),
        total_amount: record.total_amount.clone(),
        ddt_number: None,
        ddt_date: None,
        ddt_status: None,
        invoice_number: None,
        invoice_date: None,
        current_state: INITIAL_ORDER_STATE.to_string(),
        hash: String::new(),
        last_sync: now,
        created_at: now,
    };
    order.hash = order.content_hash();

    let articles = record
        .articles
        .iter()
        .enumerate()
        .map(|(index, line)| OrderArticle {
            order_id: record.id.clone(),
            user_id: user_id.to_string(),
            line_number: (index + 1) as i32,
            article_code: line.article_code.clone(),
            description: line.description.clone(),
            quantity: line.quantity,
            unit_price: line.unit_price.clone(),
            discount: line.discount.clone(),
            line_total: line.line_total.clone(),
        })
        .collect();

    (order, articles)
}
