//! # Pipeline Store Traits
//!
//! The store as the pipelines see it: one narrow trait per entity family,
//! implemented by [`fresis_db::Database`] through the repositories.
//!
//! ## Why a Seam Here
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │   pipelines ──▶ store traits (this module) ──▶ Database ──▶ PostgreSQL  │
//! │                        │                                                │
//! │                        └──────────▶ MemoryStore (tests)                 │
//! │                                                                         │
//! │  The reconciliation decisions (insert/update/skip/delete) and the       │
//! │  cancellation and idempotence properties are exercised against an      │
//! │  in-memory fake; the SQL behind each method is owned by fresis-db.      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;

use async_trait::async_trait;

use fresis_core::{
    Customer, DdtUpdate, InvoiceUpdate, Order, OrderArticle, Price, PriceHistoryEntry, PriceKey,
    Product, ProductChange, SyncKind, SyncSetting, User,
};
use fresis_db::{Database, DbResult, OrderHead, ProductHead};

// =============================================================================
// Per-Family Traits
// =============================================================================

/// Store operations of the customer pipeline.
#[async_trait]
pub trait CustomerStore: Send + Sync {
    /// `customer_profile → hash` for the whole tenant.
    async fn customer_hashes(&self, user_id: &str) -> DbResult<HashMap<String, String>>;
    async fn insert_customer(&self, customer: &Customer) -> DbResult<()>;
    async fn update_customer(&self, customer: &Customer) -> DbResult<()>;
    async fn touch_customer(&self, user_id: &str, profile: &str, last_sync: i64) -> DbResult<()>;
    /// One DELETE pruning every profile of the tenant not in `keep`.
    async fn prune_customers(&self, user_id: &str, keep: &[String]) -> DbResult<u64>;
}

/// Store operations of the order pipeline (and of the DDT/invoice
/// enrichment passes).
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// `(id, order_number, hash)` for the whole tenant.
    async fn order_heads(&self, user_id: &str) -> DbResult<Vec<OrderHead>>;
    async fn insert_order(&self, order: &Order, articles: &[OrderArticle]) -> DbResult<()>;
    async fn update_order(&self, order: &Order, articles: &[OrderArticle]) -> DbResult<()>;
    /// Order-number-only rewrite (content hash unchanged).
    async fn rename_order(
        &self,
        user_id: &str,
        id: &str,
        order_number: &str,
        last_sync: i64,
    ) -> DbResult<()>;
    async fn touch_order(&self, user_id: &str, id: &str, last_sync: i64) -> DbResult<()>;
    /// Cascade delete of every order not in `keep`: articles, then state
    /// history, then the order rows, in one transaction.
    async fn prune_orders(&self, user_id: &str, keep: &[String]) -> DbResult<u64>;
    async fn order_id_for_number(
        &self,
        user_id: &str,
        order_number: &str,
    ) -> DbResult<Option<String>>;
    async fn apply_ddt(&self, user_id: &str, order_id: &str, ddt: &DdtUpdate) -> DbResult<()>;
    async fn apply_invoice(
        &self,
        user_id: &str,
        order_id: &str,
        invoice: &InvoiceUpdate,
    ) -> DbResult<()>;
}

/// Store operations of the product pipeline.
#[async_trait]
pub trait ProductStore: Send + Sync {
    /// `(id, hash, deleted)` for the whole catalog.
    async fn product_heads(&self) -> DbResult<Vec<ProductHead>>;
    /// `INSERT … ON CONFLICT DO UPDATE`, clearing the soft-delete marker.
    async fn upsert_product(&self, product: &Product) -> DbResult<()>;
    async fn touch_product(&self, id: &str, last_sync: i64) -> DbResult<()>;
    /// Soft-deletes live rows not in `keep`; returns the marked ids.
    async fn soft_delete_missing(&self, keep: &[String], deleted_at: i64) -> DbResult<Vec<String>>;
    async fn log_product_change(&self, change: &ProductChange) -> DbResult<()>;
    /// Forced sync only: hard-delete the catalog before repopulating.
    async fn purge_products(&self) -> DbResult<u64>;
}

/// Store operations of the price pipeline.
#[async_trait]
pub trait PriceStore: Send + Sync {
    async fn find_price(&self, key: &PriceKey) -> DbResult<Option<Price>>;
    async fn insert_price(&self, price: &Price) -> DbResult<()>;
    async fn update_price(&self, price: &Price) -> DbResult<()>;
    async fn touch_price(&self, key: &PriceKey, last_sync: i64) -> DbResult<()>;
    async fn log_price_change(&self, entry: &PriceHistoryEntry) -> DbResult<()>;
    /// Forced sync only: blank every price value and digest. Emits no
    /// history rows for the pre-null state.
    async fn blank_prices(&self) -> DbResult<u64>;
}

/// The user directory as the scheduler and pipelines see it.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn whitelisted_users(&self) -> DbResult<Vec<User>>;
    async fn stamp_customer_sync(&self, user_id: &str, at: i64) -> DbResult<()>;
    async fn stamp_order_sync(&self, user_id: &str, at: i64) -> DbResult<()>;
}

/// The persisted scheduling configuration.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn all_settings(&self) -> DbResult<Vec<SyncSetting>>;
    async fn setting(&self, kind: SyncKind) -> DbResult<Option<SyncSetting>>;
    async fn seed_default_settings(&self) -> DbResult<()>;
    async fn set_interval(&self, kind: SyncKind, interval_minutes: i64) -> DbResult<()>;
    async fn set_enabled(&self, kind: SyncKind, enabled: bool) -> DbResult<()>;
}

/// Everything the scheduler needs from one store handle.
pub trait SyncStore:
    CustomerStore + OrderStore + ProductStore + PriceStore + UserDirectory + SettingsStore + 'static
{
}

impl<T> SyncStore for T where
    T: CustomerStore
        + OrderStore
        + ProductStore
        + PriceStore
        + UserDirectory
        + SettingsStore
        + 'static
{
}

// =============================================================================
// Database Implementation
// =============================================================================

#[async_trait]
impl CustomerStore for Database {
    async fn customer_hashes(&self, user_id: &str) -> DbResult<HashMap<String, String>> {
        Ok(self
            .customers()
            .hashes_for_user(user_id)
            .await?
            .into_iter()
            .collect())
    }

    async fn insert_customer(&self, customer: &Customer) -> DbResult<()> {
        self.customers().insert(customer).await
    }

    async fn update_customer(&self, customer: &Customer) -> DbResult<()> {
        self.customers().update(customer).await
    }

    async fn touch_customer(&self, user_id: &str, profile: &str, last_sync: i64) -> DbResult<()> {
        self.customers().touch(user_id, profile, last_sync).await
    }

    async fn prune_customers(&self, user_id: &str, keep: &[String]) -> DbResult<u64> {
        self.customers().delete_missing(user_id, keep).await
    }
}

#[async_trait]
impl OrderStore for Database {
    async fn order_heads(&self, user_id: &str) -> DbResult<Vec<OrderHead>> {
        self.orders().heads(user_id).await
    }

    async fn insert_order(&self, order: &Order, articles: &[OrderArticle]) -> DbResult<()> {
        self.orders().insert_with_articles(order, articles).await
    }

    async fn update_order(&self, order: &Order, articles: &[OrderArticle]) -> DbResult<()> {
        self.orders().update_with_articles(order, articles).await
    }

    async fn rename_order(
        &self,
        user_id: &str,
        id: &str,
        order_number: &str,
        last_sync: i64,
    ) -> DbResult<()> {
        self.orders().rename(user_id, id, order_number, last_sync).await
    }

    async fn touch_order(&self, user_id: &str, id: &str, last_sync: i64) -> DbResult<()> {
        self.orders().touch(user_id, id, last_sync).await
    }

    async fn prune_orders(&self, user_id: &str, keep: &[String]) -> DbResult<u64> {
        self.orders().delete_missing(user_id, keep).await
    }

    async fn order_id_for_number(
        &self,
        user_id: &str,
        order_number: &str,
    ) -> DbResult<Option<String>> {
        self.orders().id_for_number(user_id, order_number).await
    }

    async fn apply_ddt(&self, user_id: &str, order_id: &str, ddt: &DdtUpdate) -> DbResult<()> {
        self.orders().apply_ddt(user_id, order_id, ddt).await
    }

    async fn apply_invoice(
        &self,
        user_id: &str,
        order_id: &str,
        invoice: &InvoiceUpdate,
    ) -> DbResult<()> {
        self.orders().apply_invoice(user_id, order_id, invoice).await
    }
}

#[async_trait]
impl ProductStore for Database {
    async fn product_heads(&self) -> DbResult<Vec<ProductHead>> {
        self.products().heads().await
    }

    async fn upsert_product(&self, product: &Product) -> DbResult<()> {
        self.products().upsert(product).await
    }

    async fn touch_product(&self, id: &str, last_sync: i64) -> DbResult<()> {
        self.products().touch(id, last_sync).await
    }

    async fn soft_delete_missing(&self, keep: &[String], deleted_at: i64) -> DbResult<Vec<String>> {
        self.products().soft_delete_missing(keep, deleted_at).await
    }

    async fn log_product_change(&self, change: &ProductChange) -> DbResult<()> {
        self.change_log().record_product_change(change).await
    }

    async fn purge_products(&self) -> DbResult<u64> {
        self.products().purge_all().await
    }
}

#[async_trait]
impl PriceStore for Database {
    async fn find_price(&self, key: &PriceKey) -> DbResult<Option<Price>> {
        self.prices().find_by_key(key).await
    }

    async fn insert_price(&self, price: &Price) -> DbResult<()> {
        self.prices().insert(price).await
    }

    async fn update_price(&self, price: &Price) -> DbResult<()> {
        self.prices().update(price).await
    }

    async fn touch_price(&self, key: &PriceKey, last_sync: i64) -> DbResult<()> {
        self.prices().touch(key, last_sync).await
    }

    async fn log_price_change(&self, entry: &PriceHistoryEntry) -> DbResult<()> {
        self.change_log().record_price_change(entry).await
    }

    async fn blank_prices(&self) -> DbResult<u64> {
        self.prices().blank_all().await
    }
}

#[async_trait]
impl UserDirectory for Database {
    async fn whitelisted_users(&self) -> DbResult<Vec<User>> {
        self.users().whitelisted().await
    }

    async fn stamp_customer_sync(&self, user_id: &str, at: i64) -> DbResult<()> {
        self.users().stamp_last_customer_sync(user_id, at).await
    }

    async fn stamp_order_sync(&self, user_id: &str, at: i64) -> DbResult<()> {
        self.users().stamp_last_order_sync(user_id, at).await
    }
}

#[async_trait]
impl SettingsStore for Database {
    async fn all_settings(&self) -> DbResult<Vec<SyncSetting>> {
        self.sync_settings().get_all().await
    }

    async fn setting(&self, kind: SyncKind) -> DbResult<Option<SyncSetting>> {
        self.sync_settings().get(kind).await
    }

    async fn seed_default_settings(&self) -> DbResult<()> {
        self.sync_settings().seed_defaults().await
    }

    async fn set_interval(&self, kind: SyncKind, interval_minutes: i64) -> DbResult<()> {
        self.sync_settings().update_interval(kind, interval_minutes).await
    }

    async fn set_enabled(&self, kind: SyncKind, enabled: bool) -> DbResult<()> {
        self.sync_settings().set_enabled(kind, enabled).await
    }
}
