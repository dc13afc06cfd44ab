//! # Price Pipeline
//!
//! Shared-scope reconciliation of the price list.
//!
//! Rows are addressed by `(product_id, price_valid_from,
//! COALESCE(price_qty_from, 0))` with `item_selection` matched under
//! null-equality, so prices with distinct validity windows never overwrite
//! each other. There is no prune phase: prices are append-forever and only
//! ever overwritten on their own key.
//!
//! Every unit-price movement appends a `shared.price_history` row; the
//! initial insert is recorded as `new` with `old_price = NULL`.

use std::time::Instant;

use tracing::{debug, info, warn};

use fresis_core::{Price, PriceChangeType, PriceHistoryEntry, SyncKind, SyncReport};

use crate::cancel::StopSignal;
use crate::error::SyncResult;
use crate::pipeline::{fetch_records, finish, loop_checkpoint, SyncDeps};
use crate::progress::ProgressSender;
use crate::session::SyncSession;
use crate::snapshot::PriceRecord;
use crate::store::PriceStore;

/// Origin label recorded on history rows written by the periodic sync.
const HISTORY_SOURCE: &str = "sync";

/// Runs one price sync (shared scope, no tenant).
pub async fn sync_prices<S>(
    deps: &SyncDeps<S, PriceRecord>,
    progress: &ProgressSender,
    stop: &dyn StopSignal,
) -> SyncReport
where
    S: PriceStore,
{
    let started = Instant::now();
    info!("Price sync started");

    let mut report = SyncReport::new();
    let mut snapshot_path = None;

    let outcome = run(deps, progress, stop, &mut report, &mut snapshot_path).await;

    if let Some(path) = snapshot_path {
        deps.source.cleanup(&path).await;
    }

    finish(SyncKind::Prices, None, report, outcome, started, progress)
}

async fn run<S>(
    deps: &SyncDeps<S, PriceRecord>,
    progress: &ProgressSender,
    stop: &dyn StopSignal,
    report: &mut SyncReport,
    snapshot_path: &mut Option<std::path::PathBuf>,
) -> SyncResult<()>
where
    S: PriceStore,
{
    let records =
        fetch_records(deps, SyncKind::Prices, None, progress, stop, snapshot_path).await?;

    if records.is_empty() {
        debug!("Empty price snapshot, skipping reconciliation");
        return Ok(());
    }

    let session = SyncSession::begin();

    for (index, record) in records.iter().enumerate() {
        loop_checkpoint(stop, index)?;
        report.processed += 1;

        if let Err(reason) = record.validate() {
            warn!(%reason, "Skipping invalid price record");
            report.skipped += 1;
            continue;
        }

        let price = price_from_record(record, session.started_at);
        let key = price.key();

        match deps.store.find_price(&key).await? {
            None => {
                deps.store.insert_price(&price).await?;
                deps.store
                    .log_price_change(&history_entry(&session, &price, None))
                    .await?;
                report.inserted += 1;
            }
            Some(stored) if stored.hash == price.hash => {
                deps.store.touch_price(&key, session.started_at).await?;
                report.skipped += 1;
            }
            Some(stored) => {
                deps.store.update_price(&price).await?;
                if stored.unit_price != price.unit_price {
                    deps.store
                        .log_price_change(&history_entry(&session, &price, stored.unit_price))
                        .await?;
                }
                report.updated += 1;
            }
        }
    }

    Ok(())
}

/// Maps a snapshot record onto the domain row, computing the content hash.
fn price_from_record(record: &PriceRecord, now: i64) -> Price {
    let mut price = Price {
        product_id: record.product_id.clone(),
        item_selection: record.item_selection.clone(),
        unit_price: record.unit_price,
        price_valid_from: record.price_valid_from,
        price_valid_to: record.price_valid_to,
        price_qty_from: record.price_qty_from,
        price_qty_to: record.price_qty_to,
        hash: String::new(),
        last_sync: now,
    };
    price.hash = price.content_hash();
    price
}

/// Builds the history row for a price movement. `old_price = None` marks
/// both the initial insert and a repopulation after a forced blank; both
/// are recorded as `new`.
fn history_entry(session: &SyncSession, price: &Price, old_price: Option<f64>) -> PriceHistoryEntry {
    let change_type = match (old_price, price.unit_price) {
        (None, _) => PriceChangeType::New,
        (Some(old), Some(new)) if new > old => PriceChangeType::Increase,
        (Some(_), Some(_)) => PriceChangeType::Decrease,
        // The value disappeared; record the movement as a decrease to NULL.
        (Some(_), None) => PriceChangeType::Decrease,
    };

    let percentage_change = match (old_price, price.unit_price) {
        (Some(old), Some(new)) if old != 0.0 => Some((new - old) / old * 100.0),
        _ => None,
    };

    PriceHistoryEntry {
        product_id: price.product_id.clone(),
        variant_id: price.item_selection.clone(),
        old_price,
        new_price: price.unit_price,
        percentage_change,
        change_type,
        sync_date: session.started_at,
        source: HISTORY_SOURCE.to_string(),
        sync_session_id: session.id.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn price(unit: Option<f64>) -> Price {
        let mut price = Price {
            product_id: "PROD-050".into(),
            unit_price: unit,
            price_valid_from: 1_767_225_600,
            ..Default::default()
        };
        price.hash = price.content_hash();
        price
    }

    #[test]
    fn initial_insert_is_recorded_as_new() {
        let session = SyncSession::begin();
        let entry = history_entry(&session, &price(Some(10.0)), None);

        assert_eq!(entry.change_type, PriceChangeType::New);
        assert_eq!(entry.old_price, None);
        assert_eq!(entry.new_price, Some(10.0));
        assert_eq!(entry.percentage_change, None);
        assert_eq!(entry.source, "sync");
    }

    #[test]
    fn movements_carry_direction_and_percentage() {
        let session = SyncSession::begin();

        let up = history_entry(&session, &price(Some(12.0)), Some(10.0));
        assert_eq!(up.change_type, PriceChangeType::Increase);
        assert!((up.percentage_change.unwrap() - 20.0).abs() < 1e-9);

        let down = history_entry(&session, &price(Some(8.0)), Some(10.0));
        assert_eq!(down.change_type, PriceChangeType::Decrease);
        assert!((down.percentage_change.unwrap() + 20.0).abs() < 1e-9);
    }

    #[test]
    fn zero_old_price_yields_no_percentage() {
        let session = SyncSession::begin();
        let entry = history_entry(&session, &price(Some(5.0)), Some(0.0));
        assert_eq!(entry.percentage_change, None);
    }
}
