//! # Order Repository
//!
//! Database operations for tenant-scoped orders, their article lines and
//! their state history.
//!
//! ## Cascade Contract
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                  Deleting an order (one transaction)                    │
//! │                                                                         │
//! │  1. DELETE agents.order_articles       (children first)                 │
//! │  2. DELETE agents.order_state_history                                   │
//! │  3. DELETE agents.order_records        (parent last)                    │
//! │                                                                         │
//! │  The delete order is part of the engine's contract, which is why the    │
//! │  schema carries plain foreign keys instead of ON DELETE CASCADE.        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The content-update path rewrites the snapshot-owned columns only: the
//! lifecycle state and the DDT/invoice enrichment belong to other writers
//! and survive an order resync.

use chrono::Utc;
use sqlx::PgPool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use crate::filter::QueryFilter;
use fresis_core::{DdtUpdate, InvoiceUpdate, Order, OrderArticle, OrderStateHistory};

const ORDER_COLUMNS: &str = "id, user_id, order_number, customer_profile, customer_name, \
     order_date, delivery_date, sales_status, document_status, transfer_status, \
     taxable_amount, vat_amount, total_amount, ddt_number, ddt_date, ddt_status, \
     invoice_number, invoice_date, current_state, hash, last_sync, created_at";

const ARTICLE_COLUMNS: &str = "order_id, user_id, line_number, article_code, description, \
     quantity, unit_price, discount, line_total";

/// The projection the order pipeline reconciles against.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OrderHead {
    pub id: String,
    pub order_number: String,
    pub hash: String,
}

/// One historical sale of an article, for the "last sales" lookup.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ArticleSale {
    pub order_id: String,
    pub order_number: String,
    pub customer_name: Option<String>,
    pub order_date: Option<i64>,
    pub article_code: String,
    pub description: Option<String>,
    pub quantity: f64,
    pub unit_price: Option<String>,
    pub discount: Option<String>,
    pub created_at: i64,
}

/// Optional read criteria for the sales application.
#[derive(Debug, Default, Clone)]
pub struct OrderFilter {
    pub sales_status: Option<String>,
    pub document_status: Option<String>,
    pub order_number: Option<String>,
    /// Inclusive unix-seconds bounds on `order_date`.
    pub from_date: Option<i64>,
    pub to_date: Option<i64>,
}

/// Repository for the `agents.order_records` family of tables.
#[derive(Debug, Clone)]
pub struct OrderRepository {
    pool: PgPool,
}

impl OrderRepository {
    pub fn new(pool: PgPool) -> Self {
        OrderRepository { pool }
    }

    // =========================================================================
    // Reconciliation reads
    // =========================================================================

    /// Loads `(id, order_number, hash)` for the whole tenant.
    pub async fn heads(&self, user_id: &str) -> DbResult<Vec<OrderHead>> {
        let heads = sqlx::query_as::<_, OrderHead>(
            "SELECT id, order_number, hash FROM agents.order_records WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(heads)
    }

    /// Gets one order.
    pub async fn get(&self, user_id: &str, id: &str) -> DbResult<Option<Order>> {
        let order = sqlx::query_as::<_, Order>(&format!(
            "SELECT {ORDER_COLUMNS} FROM agents.order_records WHERE user_id = $1 AND id = $2"
        ))
        .bind(user_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(order)
    }

    /// Article lines of one order, in line order.
    pub async fn articles_for(&self, user_id: &str, order_id: &str) -> DbResult<Vec<OrderArticle>> {
        let articles = sqlx::query_as::<_, OrderArticle>(&format!(
            "SELECT {ARTICLE_COLUMNS} FROM agents.order_articles \
             WHERE user_id = $1 AND order_id = $2 ORDER BY line_number"
        ))
        .bind(user_id)
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(articles)
    }

    /// State log of one order, oldest first.
    pub async fn state_history_for(
        &self,
        user_id: &str,
        order_id: &str,
    ) -> DbResult<Vec<OrderStateHistory>> {
        let history = sqlx::query_as::<_, OrderStateHistory>(
            "SELECT id, order_id, user_id, old_state, new_state, actor, notes, confidence, \
             source, created_at FROM agents.order_state_history \
             WHERE user_id = $1 AND order_id = $2 ORDER BY id",
        )
        .bind(user_id)
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(history)
    }

    /// Resolves an order id from its (mutable) order number.
    pub async fn id_for_number(&self, user_id: &str, order_number: &str) -> DbResult<Option<String>> {
        let id = sqlx::query_as::<_, (String,)>(
            "SELECT id FROM agents.order_records WHERE user_id = $1 AND order_number = $2",
        )
        .bind(user_id)
        .bind(order_number)
        .fetch_optional(&self.pool)
        .await?;

        Ok(id.map(|row| row.0))
    }

    /// Lists orders of a tenant matching the optional criteria.
    pub async fn find(&self, user_id: &str, criteria: &OrderFilter) -> DbResult<Vec<Order>> {
        let mut filter = QueryFilter::new();
        filter.eq_text("user_id", user_id);
        if let Some(ref status) = criteria.sales_status {
            filter.eq_text("sales_status", status.clone());
        }
        if let Some(ref status) = criteria.document_status {
            filter.eq_text("document_status", status.clone());
        }
        if let Some(ref number) = criteria.order_number {
            filter.contains("order_number", number);
        }
        if let Some(from) = criteria.from_date {
            filter.gte_int("order_date", from);
        }
        if let Some(to) = criteria.to_date {
            filter.lte_int("order_date", to);
        }

        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM agents.order_records {} \
             ORDER BY order_date DESC NULLS LAST, id",
            filter.where_clause()
        );

        let orders = filter
            .bind_all(sqlx::query_as::<_, Order>(&sql))
            .fetch_all(&self.pool)
            .await?;

        Ok(orders)
    }

    /// Last sales of an article across the tenant's orders, newest first.
    ///
    /// Read-only join used by the sales application when quoting.
    pub async fn last_sales_for_article(
        &self,
        user_id: &str,
        article_code: &str,
        limit: i64,
    ) -> DbResult<Vec<ArticleSale>> {
        let sales = sqlx::query_as::<_, ArticleSale>(
            r#"
            SELECT
                o.id AS order_id,
                o.order_number,
                o.customer_name,
                o.order_date,
                a.article_code,
                a.description,
                a.quantity,
                a.unit_price,
                a.discount,
                o.created_at
            FROM agents.order_articles a
            JOIN agents.order_records o
              ON o.id = a.order_id AND o.user_id = a.user_id
            WHERE a.user_id = $1 AND a.article_code = $2
            ORDER BY o.created_at DESC
            LIMIT $3
            "#,
        )
        .bind(user_id)
        .bind(article_code)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(sales)
    }

    // =========================================================================
    // Reconciliation writes
    // =========================================================================

    /// Inserts an order together with its article lines, atomically.
    pub async fn insert_with_articles(
        &self,
        order: &Order,
        articles: &[OrderArticle],
    ) -> DbResult<()> {
        debug!(
            user_id = %order.user_id,
            id = %order.id,
            articles = articles.len(),
            "Inserting order"
        );

        let mut tx = self.pool.begin().await?;

        sqlx::query(&format!(
            "INSERT INTO agents.order_records ({ORDER_COLUMNS}) VALUES \
             ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, \
              $16, $17, $18, $19, $20, $21, $22)"
        ))
        .bind(&order.id)
        .bind(&order.user_id)
        .bind(&order.order_number)
        .bind(&order.customer_profile)
        .bind(&order.customer_name)
        .bind(order.order_date)
        .bind(order.delivery_date)
        .bind(&order.sales_status)
        .bind(&order.document_status)
        .bind(&order.transfer_status)
        .bind(&order.taxable_amount)
        .bind(&order.vat_amount)
        .bind(&order.total_amount)
        .bind(&order.ddt_number)
        .bind(order.ddt_date)
        .bind(&order.ddt_status)
        .bind(&order.invoice_number)
        .bind(order.invoice_date)
        .bind(&order.current_state)
        .bind(&order.hash)
        .bind(order.last_sync)
        .bind(order.created_at)
        .execute(&mut *tx)
        .await?;

        for article in articles {
            insert_article(&mut tx, article).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Rewrites the snapshot-owned columns and replaces the article lines
    /// after a hash mismatch. Lifecycle state and DDT/invoice enrichment
    /// are left untouched.
    pub async fn update_with_articles(
        &self,
        order: &Order,
        articles: &[OrderArticle],
    ) -> DbResult<()> {
        debug!(
            user_id = %order.user_id,
            id = %order.id,
            articles = articles.len(),
            "Updating order"
        );

        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE agents.order_records SET
                order_number = $3,
                customer_profile = $4,
                customer_name = $5,
                order_date = $6,
                delivery_date = $7,
                sales_status = $8,
                document_status = $9,
                transfer_status = $10,
                taxable_amount = $11,
                vat_amount = $12,
                total_amount = $13,
                hash = $14,
                last_sync = $15
            WHERE id = $1 AND user_id = $2
            "#,
        )
        .bind(&order.id)
        .bind(&order.user_id)
        .bind(&order.order_number)
        .bind(&order.customer_profile)
        .bind(&order.customer_name)
        .bind(order.order_date)
        .bind(order.delivery_date)
        .bind(&order.sales_status)
        .bind(&order.document_status)
        .bind(&order.transfer_status)
        .bind(&order.taxable_amount)
        .bind(&order.vat_amount)
        .bind(&order.total_amount)
        .bind(&order.hash)
        .bind(order.last_sync)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Order", &order.id));
        }

        sqlx::query("DELETE FROM agents.order_articles WHERE order_id = $1 AND user_id = $2")
            .bind(&order.id)
            .bind(&order.user_id)
            .execute(&mut *tx)
            .await?;

        for article in articles {
            insert_article(&mut tx, article).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Rewrites only the order number and `last_sync` (content hash
    /// unchanged, the number is tracked out-of-band).
    pub async fn rename(
        &self,
        user_id: &str,
        id: &str,
        order_number: &str,
        last_sync: i64,
    ) -> DbResult<()> {
        debug!(user_id = %user_id, id = %id, order_number = %order_number, "Renaming order");

        sqlx::query(
            "UPDATE agents.order_records SET order_number = $3, last_sync = $4 \
             WHERE id = $1 AND user_id = $2",
        )
        .bind(id)
        .bind(user_id)
        .bind(order_number)
        .bind(last_sync)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Refreshes `last_sync` on a row whose hash matched the snapshot.
    pub async fn touch(&self, user_id: &str, id: &str, last_sync: i64) -> DbResult<()> {
        sqlx::query(
            "UPDATE agents.order_records SET last_sync = $3 WHERE id = $1 AND user_id = $2",
        )
        .bind(id)
        .bind(user_id)
        .bind(last_sync)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Deletes every order of the tenant not in `keep`, cascading to the
    /// article lines and the state history first, in one transaction.
    ///
    /// Callers must not invoke this for an empty snapshot.
    pub async fn delete_missing(&self, user_id: &str, keep: &[String]) -> DbResult<u64> {
        let mut tx = self.pool.begin().await?;

        let doomed = sqlx::query_as::<_, (String,)>(
            "SELECT id FROM agents.order_records WHERE user_id = $1 AND NOT (id = ANY($2))",
        )
        .bind(user_id)
        .bind(keep)
        .fetch_all(&mut *tx)
        .await?;

        if doomed.is_empty() {
            tx.commit().await?;
            return Ok(0);
        }

        let ids: Vec<String> = doomed.into_iter().map(|row| row.0).collect();

        sqlx::query("DELETE FROM agents.order_articles WHERE user_id = $1 AND order_id = ANY($2)")
            .bind(user_id)
            .bind(&ids)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "DELETE FROM agents.order_state_history WHERE user_id = $1 AND order_id = ANY($2)",
        )
        .bind(user_id)
        .bind(&ids)
        .execute(&mut *tx)
        .await?;

        let result =
            sqlx::query("DELETE FROM agents.order_records WHERE user_id = $1 AND id = ANY($2)")
                .bind(user_id)
                .bind(&ids)
                .execute(&mut *tx)
                .await?;

        tx.commit().await?;

        let deleted = result.rows_affected();
        debug!(user_id = %user_id, deleted, "Pruned orders with cascade");

        Ok(deleted)
    }

    // =========================================================================
    // Collaborator operations (off the reconciliation hot path)
    // =========================================================================

    /// Moves an order to a new lifecycle state and appends the transition
    /// to the state log, with matching timestamps, atomically.
    pub async fn update_state(
        &self,
        user_id: &str,
        order_id: &str,
        new_state: &str,
        actor: &str,
        notes: Option<&str>,
        confidence: Option<f64>,
        source: Option<&str>,
    ) -> DbResult<()> {
        let now = Utc::now().timestamp();

        let mut tx = self.pool.begin().await?;

        let current = sqlx::query_as::<_, (String,)>(
            "SELECT current_state FROM agents.order_records \
             WHERE id = $1 AND user_id = $2 FOR UPDATE",
        )
        .bind(order_id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| DbError::not_found("Order", order_id))?;

        sqlx::query(
            "UPDATE agents.order_records SET current_state = $3 WHERE id = $1 AND user_id = $2",
        )
        .bind(order_id)
        .bind(user_id)
        .bind(new_state)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO agents.order_state_history (
                order_id, user_id, old_state, new_state, actor, notes,
                confidence, source, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(order_id)
        .bind(user_id)
        .bind(current.0)
        .bind(new_state)
        .bind(actor)
        .bind(notes)
        .bind(confidence)
        .bind(source)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(user_id = %user_id, order_id = %order_id, new_state = %new_state, "Order state updated");
        Ok(())
    }

    /// Applies DDT enrichment to one order. Used by the DDT pipeline.
    pub async fn apply_ddt(&self, user_id: &str, order_id: &str, ddt: &DdtUpdate) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE agents.order_records \
             SET ddt_number = $3, ddt_date = $4, ddt_status = $5 \
             WHERE id = $1 AND user_id = $2",
        )
        .bind(order_id)
        .bind(user_id)
        .bind(&ddt.ddt_number)
        .bind(ddt.ddt_date)
        .bind(&ddt.ddt_status)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Order", order_id));
        }

        Ok(())
    }

    /// Applies invoice enrichment to one order. Used by the invoice
    /// pipeline.
    pub async fn apply_invoice(
        &self,
        user_id: &str,
        order_id: &str,
        invoice: &InvoiceUpdate,
    ) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE agents.order_records \
             SET invoice_number = $3, invoice_date = $4 \
             WHERE id = $1 AND user_id = $2",
        )
        .bind(order_id)
        .bind(user_id)
        .bind(&invoice.invoice_number)
        .bind(invoice.invoice_date)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Order", order_id));
        }

        Ok(())
    }
}

/// Inserts one article line inside an open transaction.
async fn insert_article(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    article: &OrderArticle,
) -> DbResult<()> {
    sqlx::query(&format!(
        "INSERT INTO agents.order_articles ({ARTICLE_COLUMNS}) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"
    ))
    .bind(&article.order_id)
    .bind(&article.user_id)
    .bind(article.line_number)
    .bind(&article.article_code)
    .bind(&article.description)
    .bind(article.quantity)
    .bind(&article.unit_price)
    .bind(&article.discount)
    .bind(&article.line_total)
    .execute(&mut **tx)
    .await?;

    Ok(())
}
