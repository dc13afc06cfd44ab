//! # Change-Log Repository
//!
//! Append-only audit tables fed by the product and price pipelines:
//! `shared.product_changes` and `shared.price_history`. Downstream search
//! and display read them newest-first per entity; nothing ever updates or
//! deletes a row.

use sqlx::PgPool;

use crate::error::DbResult;
use fresis_core::{PriceHistoryEntry, ProductChange};

/// Repository for the shared audit tables.
#[derive(Debug, Clone)]
pub struct ChangeLogRepository {
    pool: PgPool,
}

impl ChangeLogRepository {
    pub fn new(pool: PgPool) -> Self {
        ChangeLogRepository { pool }
    }

    /// Appends one product change row.
    pub async fn record_product_change(&self, change: &ProductChange) -> DbResult<()> {
        sqlx::query(
            "INSERT INTO shared.product_changes \
             (product_id, change_type, changed_at, sync_session_id) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(&change.product_id)
        .bind(change.change_type)
        .bind(change.changed_at)
        .bind(&change.sync_session_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Appends one price movement row.
    pub async fn record_price_change(&self, entry: &PriceHistoryEntry) -> DbResult<()> {
        sqlx::query(
            "INSERT INTO shared.price_history \
             (product_id, variant_id, old_price, new_price, percentage_change, \
              change_type, sync_date, source, sync_session_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(&entry.product_id)
        .bind(&entry.variant_id)
        .bind(entry.old_price)
        .bind(entry.new_price)
        .bind(entry.percentage_change)
        .bind(entry.change_type)
        .bind(entry.sync_date)
        .bind(&entry.source)
        .bind(&entry.sync_session_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Change rows of one product, oldest first.
    pub async fn product_changes_for(&self, product_id: &str) -> DbResult<Vec<ProductChange>> {
        let changes = sqlx::query_as::<_, ProductChange>(
            "SELECT product_id, change_type, changed_at, sync_session_id \
             FROM shared.product_changes WHERE product_id = $1 ORDER BY changed_at, id",
        )
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(changes)
    }

    /// Price movements of one product, oldest first.
    pub async fn price_history_for(&self, product_id: &str) -> DbResult<Vec<PriceHistoryEntry>> {
        let entries = sqlx::query_as::<_, PriceHistoryEntry>(
            "SELECT product_id, variant_id, old_price, new_price, percentage_change, \
             change_type, sync_date, source, sync_session_id \
             FROM shared.price_history WHERE product_id = $1 ORDER BY sync_date, id",
        )
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }
}
