//! # Product Repository
//!
//! Database operations for the shared product catalog.
//!
//! ## Soft Delete
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                   Product lifecycle in the store                        │
//! │                                                                         │
//! │  snapshot contains id      →  upsert, deleted_at = NULL                 │
//! │  snapshot misses id        →  deleted_at = now  (row kept)              │
//! │  id reappears later        →  upsert clears deleted_at atomically       │
//! │                                                                         │
//! │  Historical order lines keep resolving against soft-deleted rows.       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `image_local_path` belongs to the image downloader and is never written
//! by the sync paths here.

use sqlx::PgPool;
use tracing::debug;

use crate::error::DbResult;
use crate::filter::QueryFilter;
use fresis_core::Product;

const PRODUCT_COLUMNS: &str = "id, name, description, category, unit_of_measure, price, \
     vat_rate, image_url, image_local_path, deleted_at, hash, last_sync";

/// The projection the product pipeline reconciles against.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProductHead {
    pub id: String,
    pub hash: String,
    pub deleted: bool,
}

/// Optional read criteria for the sales application.
#[derive(Debug, Default, Clone)]
pub struct ProductFilter {
    /// Substring match on the product name.
    pub name: Option<String>,
    pub category: Option<String>,
    /// Include soft-deleted rows (default: live only).
    pub include_deleted: bool,
}

/// Repository for the `shared.products` table.
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: PgPool,
}

impl ProductRepository {
    pub fn new(pool: PgPool) -> Self {
        ProductRepository { pool }
    }

    /// Loads `(id, hash, deleted)` for the whole catalog.
    pub async fn heads(&self) -> DbResult<Vec<ProductHead>> {
        let heads = sqlx::query_as::<_, ProductHead>(
            "SELECT id, hash, (deleted_at IS NOT NULL) AS deleted FROM shared.products",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(heads)
    }

    /// Gets one product (live or soft-deleted).
    pub async fn get(&self, id: &str) -> DbResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM shared.products WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(product)
    }

    /// Lists products matching the optional criteria.
    pub async fn find(&self, criteria: &ProductFilter) -> DbResult<Vec<Product>> {
        let mut filter = QueryFilter::new();
        if !criteria.include_deleted {
            filter.is_null("deleted_at");
        }
        if let Some(ref name) = criteria.name {
            filter.contains("name", name);
        }
        if let Some(ref category) = criteria.category {
            filter.eq_text("category", category.clone());
        }

        let sql = format!(
            "SELECT {PRODUCT_COLUMNS} FROM shared.products {} ORDER BY name",
            filter.where_clause()
        );

        let products = filter
            .bind_all(sqlx::query_as::<_, Product>(&sql))
            .fetch_all(&self.pool)
            .await?;

        Ok(products)
    }

    /// Inserts or rewrites a product, clearing the soft-delete marker.
    ///
    /// A reappearing product undeletes atomically with the upsert;
    /// `image_local_path` is preserved across rewrites.
    pub async fn upsert(&self, product: &Product) -> DbResult<()> {
        debug!(id = %product.id, "Upserting product");

        sqlx::query(
            r#"
            INSERT INTO shared.products (
                id, name, description, category, unit_of_measure, price,
                vat_rate, image_url, image_local_path, deleted_at, hash, last_sync
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NULL, $10, $11)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                description = EXCLUDED.description,
                category = EXCLUDED.category,
                unit_of_measure = EXCLUDED.unit_of_measure,
                price = EXCLUDED.price,
                vat_rate = EXCLUDED.vat_rate,
                image_url = EXCLUDED.image_url,
                deleted_at = NULL,
                hash = EXCLUDED.hash,
                last_sync = EXCLUDED.last_sync
            "#,
        )
        .bind(&product.id)
        .bind(&product.name)
        .bind(&product.description)
        .bind(&product.category)
        .bind(&product.unit_of_measure)
        .bind(product.price)
        .bind(product.vat_rate)
        .bind(&product.image_url)
        .bind(&product.image_local_path)
        .bind(&product.hash)
        .bind(product.last_sync)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Refreshes `last_sync` on a live row whose hash matched the snapshot.
    pub async fn touch(&self, id: &str, last_sync: i64) -> DbResult<()> {
        sqlx::query("UPDATE shared.products SET last_sync = $2 WHERE id = $1")
            .bind(id)
            .bind(last_sync)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Soft-deletes every live product not in `keep` and returns the ids
    /// that were marked, for the change log.
    ///
    /// Callers must not invoke this for an empty snapshot.
    pub async fn soft_delete_missing(&self, keep: &[String], deleted_at: i64) -> DbResult<Vec<String>> {
        let marked = sqlx::query_as::<_, (String,)>(
            "UPDATE shared.products SET deleted_at = $2 \
             WHERE deleted_at IS NULL AND NOT (id = ANY($1)) \
             RETURNING id",
        )
        .bind(keep)
        .bind(deleted_at)
        .fetch_all(&self.pool)
        .await?;

        let ids: Vec<String> = marked.into_iter().map(|row| row.0).collect();
        if !ids.is_empty() {
            debug!(deleted = ids.len(), "Soft-deleted products");
        }

        Ok(ids)
    }

    /// Hard-deletes the whole catalog. Only the forced sync calls this,
    /// immediately before repopulating from a fresh snapshot.
    pub async fn purge_all(&self) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM shared.products")
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    /// Counts live products (diagnostics).
    pub async fn count_live(&self) -> DbResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM shared.products WHERE deleted_at IS NULL")
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }
}
