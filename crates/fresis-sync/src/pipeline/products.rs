//! # Product Pipeline
//!
//! Shared-scope reconciliation of the product catalog.
//!
//! Snapshot records arrive content-addressed: the parser supplies the hash
//! and the engine never recomputes it. Upserts clear the soft-delete
//! marker, so a reappearing product undeletes atomically; a stored row
//! that is soft-deleted is always taken down the update path, even on an
//! equal hash, so the undelete is audited.
//!
//! Every mutating decision appends a row to `shared.product_changes` with
//! the session id of the run.

use std::collections::HashMap;
use std::time::Instant;

use tracing::{debug, info, warn};

use fresis_core::{ChangeType, Product, ProductChange, SyncKind, SyncReport, SyncStage};

use crate::cancel::StopSignal;
use crate::error::SyncResult;
use crate::pipeline::{
    checkpoint, fetch_records, finish, loop_checkpoint, SyncDeps, LABEL_PRUNE,
};
use crate::progress::ProgressSender;
use crate::session::SyncSession;
use crate::snapshot::ProductRecord;
use crate::store::ProductStore;

/// Runs one product sync (shared scope, no tenant).
pub async fn sync_products<S>(
    deps: &SyncDeps<S, ProductRecord>,
    progress: &ProgressSender,
    stop: &dyn StopSignal,
) -> SyncReport
where
    S: ProductStore,
{
    let started = Instant::now();
    info!("Product sync started");

    let mut report = SyncReport::new();
    let mut snapshot_path = None;

    let outcome = run(deps, progress, stop, &mut report, &mut snapshot_path).await;

    if let Some(path) = snapshot_path {
        deps.source.cleanup(&path).await;
    }

    finish(SyncKind::Products, None, report, outcome, started, progress)
}

async fn run<S>(
    deps: &SyncDeps<S, ProductRecord>,
    progress: &ProgressSender,
    stop: &dyn StopSignal,
    report: &mut SyncReport,
    snapshot_path: &mut Option<std::path::PathBuf>,
) -> SyncResult<()>
where
    S: ProductStore,
{
    let records = fetch_records(
        deps,
        SyncKind::Products,
        None,
        progress,
        stop,
        snapshot_path,
    )
    .await?;

    if records.is_empty() {
        debug!("Empty product snapshot, skipping reconciliation");
        return Ok(());
    }

    let session = SyncSession::begin();
    let heads = deps.store.product_heads().await?;
    let existing: HashMap<String, (String, bool)> = heads
        .into_iter()
        .map(|head| (head.id, (head.hash, head.deleted)))
        .collect();

    let mut seen: Vec<String> = Vec::with_capacity(records.len());

    for (index, record) in records.iter().enumerate() {
        loop_checkpoint(stop, index)?;
        report.processed += 1;

        if let Err(reason) = record.validate() {
            warn!(%reason, "Skipping invalid product record");
            report.skipped += 1;
            continue;
        }

        let product = product_from_record(record, session.started_at);
        seen.push(product.id.clone());

        match existing.get(&product.id) {
            None => {
                deps.store.upsert_product(&product).await?;
                log_change(deps, &session, &product.id, ChangeType::Created).await?;
                report.inserted += 1;
            }
            Some((stored_hash, deleted)) if !deleted && *stored_hash == product.hash => {
                deps.store
                    .touch_product(&product.id, session.started_at)
                    .await?;
                report.skipped += 1;
            }
            Some(_) => {
                // Content changed, or the row is soft-deleted and must be
                // brought back atomically with the rewrite.
                deps.store.upsert_product(&product).await?;
                log_change(deps, &session, &product.id, ChangeType::Updated).await?;
                report.updated += 1;
            }
        }
    }

    checkpoint(stop, SyncStage::Prune)?;
    progress.report(80, LABEL_PRUNE);

    if !seen.is_empty() {
        let marked = deps
            .store
            .soft_delete_missing(&seen, session.started_at)
            .await?;
        for id in &marked {
            log_change(deps, &session, id, ChangeType::Deleted).await?;
        }
        report.deleted += marked.len() as u64;
    }

    Ok(())
}

async fn log_change<S>(
    deps: &SyncDeps<S, ProductRecord>,
    session: &SyncSession,
    product_id: &str,
    change_type: ChangeType,
) -> SyncResult<()>
where
    S: ProductStore,
{
    deps.store
        .log_product_change(&ProductChange {
            product_id: product_id.to_string(),
            change_type,
            changed_at: session.started_at,
            sync_session_id: session.id.clone(),
        })
        .await?;
    Ok(())
}

/// Maps a snapshot record onto the domain row. The hash is carried over
/// from the content-addressed export; `image_local_path` belongs to the
/// image downloader and stays untouched.
fn product_from_record(record: &ProductRecord, now: i64) -> Product {
    Product {
        id: record.id.clone(),
        name: record.name.clone(),
        description: record.description.clone(),
        category: record.category.clone(),
        unit_of_measure: record.unit_of_measure.clone(),
        price: record.price,
        vat_rate: record.vat_rate,
        image_url: record.image_url.clone(),
        image_local_path: None,
        deleted_at: None,
        hash: record.hash.clone(),
        last_sync: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mapping_carries_the_parser_hash_verbatim() {
        let record = ProductRecord {
            id: "PROD-040".into(),
            name: "Vite 4x40".into(),
            hash: "precomputed-by-the-export".into(),
            ..Default::default()
        };

        let product = product_from_record(&record, 1_700_000_000);
        assert_eq!(product.hash, "precomputed-by-the-export");
        assert_eq!(product.deleted_at, None);
        assert_eq!(product.image_local_path, None);
    }
}
