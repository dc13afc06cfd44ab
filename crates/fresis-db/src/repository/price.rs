//! # Price Repository
//!
//! Database operations for the shared price list.
//!
//! ## Temporal Identity
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Two prices of one product with distinct validity starts are distinct   │
//! │  rows; the update key is                                                │
//! │                                                                         │
//! │    (product_id, price_valid_from, COALESCE(price_qty_from, 0))          │
//! │                                                                         │
//! │  with item_selection matched via IS NOT DISTINCT FROM so that           │
//! │  NULL = NULL holds. Prices are append-forever: reconciliation never     │
//! │  deletes a row, it only overwrites on the key above.                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `hash` is selected as `COALESCE(hash, '')`: a forced sync blanks the
//! column, and the empty digest compares unequal to every real one, which
//! is what forces the repopulating run down the update path.

use sqlx::PgPool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use fresis_core::{Price, PriceKey};

const PRICE_COLUMNS: &str = "product_id, item_selection, unit_price, price_valid_from, \
     price_valid_to, price_qty_from, price_qty_to, COALESCE(hash, '') AS hash, last_sync";

/// Repository for the `shared.prices` table.
#[derive(Debug, Clone)]
pub struct PriceRepository {
    pool: PgPool,
}

impl PriceRepository {
    pub fn new(pool: PgPool) -> Self {
        PriceRepository { pool }
    }

    /// Finds the row addressed by the reconciliation key, if any.
    pub async fn find_by_key(&self, key: &PriceKey) -> DbResult<Option<Price>> {
        let price = sqlx::query_as::<_, Price>(&format!(
            "SELECT {PRICE_COLUMNS} FROM shared.prices \
             WHERE product_id = $1 \
               AND price_valid_from = $2 \
               AND COALESCE(price_qty_from, 0) = COALESCE($3, 0) \
               AND item_selection IS NOT DISTINCT FROM $4"
        ))
        .bind(&key.product_id)
        .bind(key.price_valid_from)
        .bind(key.price_qty_from)
        .bind(&key.item_selection)
        .fetch_optional(&self.pool)
        .await?;

        Ok(price)
    }

    /// All price rows of one product, by validity start.
    pub async fn list_for_product(&self, product_id: &str) -> DbResult<Vec<Price>> {
        let prices = sqlx::query_as::<_, Price>(&format!(
            "SELECT {PRICE_COLUMNS} FROM shared.prices \
             WHERE product_id = $1 \
             ORDER BY price_valid_from, COALESCE(price_qty_from, 0)"
        ))
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(prices)
    }

    /// Inserts a new price row.
    pub async fn insert(&self, price: &Price) -> DbResult<()> {
        debug!(
            product_id = %price.product_id,
            valid_from = price.price_valid_from,
            "Inserting price"
        );

        sqlx::query(
            r#"
            INSERT INTO shared.prices (
                product_id, item_selection, unit_price, price_valid_from,
                price_valid_to, price_qty_from, price_qty_to, hash, last_sync
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(&price.product_id)
        .bind(&price.item_selection)
        .bind(price.unit_price)
        .bind(price.price_valid_from)
        .bind(price.price_valid_to)
        .bind(price.price_qty_from)
        .bind(price.price_qty_to)
        .bind(&price.hash)
        .bind(price.last_sync)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Rewrites the value columns of the row addressed by the key.
    pub async fn update(&self, price: &Price) -> DbResult<()> {
        debug!(
            product_id = %price.product_id,
            valid_from = price.price_valid_from,
            "Updating price"
        );

        let result = sqlx::query(
            r#"
            UPDATE shared.prices SET
                unit_price = $5,
                price_valid_to = $6,
                price_qty_to = $7,
                hash = $8,
                last_sync = $9
            WHERE product_id = $1
              AND price_valid_from = $2
              AND COALESCE(price_qty_from, 0) = COALESCE($3, 0)
              AND item_selection IS NOT DISTINCT FROM $4
            "#,
        )
        .bind(&price.product_id)
        .bind(price.price_valid_from)
        .bind(price.price_qty_from)
        .bind(&price.item_selection)
        .bind(price.unit_price)
        .bind(price.price_valid_to)
        .bind(price.price_qty_to)
        .bind(&price.hash)
        .bind(price.last_sync)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Price", &price.product_id));
        }

        Ok(())
    }

    /// Refreshes `last_sync` on a row whose hash matched the snapshot.
    pub async fn touch(&self, key: &PriceKey, last_sync: i64) -> DbResult<()> {
        sqlx::query(
            r#"
            UPDATE shared.prices SET last_sync = $5
            WHERE product_id = $1
              AND price_valid_from = $2
              AND COALESCE(price_qty_from, 0) = COALESCE($3, 0)
              AND item_selection IS NOT DISTINCT FROM $4
            "#,
        )
        .bind(&key.product_id)
        .bind(key.price_valid_from)
        .bind(key.price_qty_from)
        .bind(&key.item_selection)
        .bind(last_sync)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Blanks every price value and its digest. Only the forced sync calls
    /// this; no history rows are emitted for the pre-null state.
    pub async fn blank_all(&self) -> DbResult<u64> {
        let result = sqlx::query("UPDATE shared.prices SET unit_price = NULL, hash = NULL")
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
