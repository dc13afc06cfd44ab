//! Shared test doubles for the pipeline and scheduler suites: an
//! in-memory store implementing the pipeline store traits with the same
//! semantics as the SQL layer, a snapshot source serving JSON fixtures,
//! and a counting stop signal.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::Serialize;
use tempfile::TempDir;

use fresis_core::{
    Customer, DdtUpdate, InvoiceUpdate, Order, OrderArticle, Price, PriceHistoryEntry, PriceKey,
    Product, ProductChange, SyncKind, SyncSetting, User, UserRole,
};
use fresis_db::{DbError, DbResult, OrderHead, ProductHead};
use fresis_sync::snapshot::{
    CustomerRecord, DdtRecord, InvoiceRecord, OrderArticleRecord, OrderRecord, PriceRecord,
    ProductRecord,
};
use fresis_sync::{
    CustomerStore, JsonSnapshotParser, OrderStore, PriceStore, ProductStore, SettingsStore,
    SnapshotSource, StopSignal, SyncDeps, SyncError, SyncResult, UserDirectory,
};

// =============================================================================
// In-Memory Store
// =============================================================================

/// In-memory stand-in for the PostgreSQL store. Every mutating call is
/// appended to `ops` so tests can assert which statements a run executed.
#[derive(Default)]
pub struct MemoryStore {
    pub customers: Mutex<HashMap<(String, String), Customer>>,
    pub orders: Mutex<HashMap<(String, String), Order>>,
    pub articles: Mutex<Vec<OrderArticle>>,
    /// `(user_id, order_id)` pairs standing in for state-history rows.
    pub state_history: Mutex<Vec<(String, String)>>,
    pub products: Mutex<HashMap<String, Product>>,
    pub prices: Mutex<Vec<Price>>,
    pub product_changes: Mutex<Vec<ProductChange>>,
    pub price_history: Mutex<Vec<PriceHistoryEntry>>,
    pub users: Mutex<HashMap<String, User>>,
    pub settings: Mutex<HashMap<SyncKind, SyncSetting>>,
    pub ops: Mutex<Vec<String>>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(MemoryStore::default())
    }

    /// Registers a whitelisted agent so per-tenant runs have a tenant.
    pub fn with_user(self: Arc<Self>, user_id: &str) -> Arc<Self> {
        self.users.lock().unwrap().insert(
            user_id.to_string(),
            User {
                id: user_id.to_string(),
                username: format!("{user_id}-login"),
                role: UserRole::Agent,
                whitelisted: true,
                last_login: None,
                last_customer_sync: None,
                last_order_sync: None,
            },
        );
        self
    }

    fn log(&self, op: impl Into<String>) {
        self.ops.lock().unwrap().push(op.into());
    }

    /// Count of logged operations whose name starts with `prefix`.
    pub fn ops_matching(&self, prefix: &str) -> usize {
        self.ops
            .lock()
            .unwrap()
            .iter()
            .filter(|op| op.starts_with(prefix))
            .count()
    }

    pub fn clear_ops(&self) {
        self.ops.lock().unwrap().clear();
    }

    /// Test helper standing in for an application-written state log row.
    pub fn push_state_history(&self, user_id: &str, order_id: &str) {
        self.state_history
            .lock()
            .unwrap()
            .push((user_id.to_string(), order_id.to_string()));
    }

    pub fn product_change_kinds(&self, product_id: &str) -> Vec<String> {
        self.product_changes
            .lock()
            .unwrap()
            .iter()
            .filter(|change| change.product_id == product_id)
            .map(|change| change.change_type.to_string())
            .collect()
    }
}

fn price_key_matches(price: &Price, key: &PriceKey) -> bool {
    price.product_id == key.product_id
        && price.price_valid_from == key.price_valid_from
        && price.price_qty_from.unwrap_or(0.0) == key.price_qty_from.unwrap_or(0.0)
        && price.item_selection == key.item_selection
}

#[async_trait]
impl CustomerStore for MemoryStore {
    async fn customer_hashes(&self, user_id: &str) -> DbResult<HashMap<String, String>> {
        Ok(self
            .customers
            .lock()
            .unwrap()
            .values()
            .filter(|c| c.user_id == user_id)
            .map(|c| (c.customer_profile.clone(), c.hash.clone()))
            .collect())
    }

    async fn insert_customer(&self, customer: &Customer) -> DbResult<()> {
        self.log(format!("insert_customer:{}", customer.customer_profile));
        self.customers.lock().unwrap().insert(
            (customer.user_id.clone(), customer.customer_profile.clone()),
            customer.clone(),
        );
        Ok(())
    }

    async fn update_customer(&self, customer: &Customer) -> DbResult<()> {
        self.log(format!("update_customer:{}", customer.customer_profile));
        let key = (customer.user_id.clone(), customer.customer_profile.clone());
        let mut customers = self.customers.lock().unwrap();
        if !customers.contains_key(&key) {
            return Err(DbError::not_found("Customer", &customer.customer_profile));
        }
        customers.insert(key, customer.clone());
        Ok(())
    }

    async fn touch_customer(&self, user_id: &str, profile: &str, last_sync: i64) -> DbResult<()> {
        self.log(format!("touch_customer:{profile}"));
        let key = (user_id.to_string(), profile.to_string());
        if let Some(customer) = self.customers.lock().unwrap().get_mut(&key) {
            customer.last_sync = last_sync;
        }
        Ok(())
    }

    async fn prune_customers(&self, user_id: &str, keep: &[String]) -> DbResult<u64> {
        self.log("prune_customers");
        let mut customers = self.customers.lock().unwrap();
        let before = customers.len();
        customers.retain(|(owner, profile), _| {
            owner != user_id || keep.contains(profile)
        });
        Ok((before - customers.len()) as u64)
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn order_heads(&self, user_id: &str) -> DbResult<Vec<OrderHead>> {
        Ok(self
            .orders
            .lock()
            .unwrap()
            .values()
            .filter(|order| order.user_id == user_id)
            .map(|order| OrderHead {
                id: order.id.clone(),
                order_number: order.order_number.clone(),
                hash: order.hash.clone(),
            })
            .collect())
    }

    async fn insert_order(&self, order: &Order, articles: &[OrderArticle]) -> DbResult<()> {
        self.log(format!("insert_order:{}", order.id));
        self.orders
            .lock()
            .unwrap()
            .insert((order.user_id.clone(), order.id.clone()), order.clone());
        self.articles.lock().unwrap().extend(articles.iter().cloned());
        Ok(())
    }

    async fn update_order(&self, order: &Order, articles: &[OrderArticle]) -> DbResult<()> {
        self.log(format!("update_order:{}", order.id));
        let key = (order.user_id.clone(), order.id.clone());
        let mut orders = self.orders.lock().unwrap();
        let Some(stored) = orders.get_mut(&key) else {
            return Err(DbError::not_found("Order", &order.id));
        };

        // Snapshot-owned columns only; lifecycle state and enrichment
        // survive, exactly like the SQL update.
        stored.order_number = order.order_number.clone();
        stored.customer_profile = order.customer_profile.clone();
        stored.customer_name = order.customer_name.clone();
        stored.order_date = order.order_date;
        stored.delivery_date = order.delivery_date;
        stored.sales_status = order.sales_status.clone();
        stored.document_status = order.document_status.clone();
        stored.transfer_status = order.transfer_status.clone();
        stored.taxable_amount = order.taxable_amount.clone();
        stored.vat_amount = order.vat_amount.clone();
        stored.total_amount = order.total_amount.clone();
        stored.hash = order.hash.clone();
        stored.last_sync = order.last_sync;
        drop(orders);

        let mut stored_articles = self.articles.lock().unwrap();
        stored_articles.retain(|a| !(a.user_id == order.user_id && a.order_id == order.id));
        stored_articles.extend(articles.iter().cloned());
        Ok(())
    }

    async fn rename_order(
        &self,
        user_id: &str,
        id: &str,
        order_number: &str,
        last_sync: i64,
    ) -> DbResult<()> {
        self.log(format!("rename_order:{id}"));
        let key = (user_id.to_string(), id.to_string());
        if let Some(order) = self.orders.lock().unwrap().get_mut(&key) {
            order.order_number = order_number.to_string();
            order.last_sync = last_sync;
        }
        Ok(())
    }

    async fn touch_order(&self, user_id: &str, id: &str, last_sync: i64) -> DbResult<()> {
        self.log(format!("touch_order:{id}"));
        let key = (user_id.to_string(), id.to_string());
        if let Some(order) = self.orders.lock().unwrap().get_mut(&key) {
            order.last_sync = last_sync;
        }
        Ok(())
    }

    async fn prune_orders(&self, user_id: &str, keep: &[String]) -> DbResult<u64> {
        self.log("prune_orders");

        let doomed: Vec<String> = self
            .orders
            .lock()
            .unwrap()
            .values()
            .filter(|order| order.user_id == user_id && !keep.contains(&order.id))
            .map(|order| order.id.clone())
            .collect();

        // Children first, parents last, like the SQL transaction.
        self.articles
            .lock()
            .unwrap()
            .retain(|a| !(a.user_id == user_id && doomed.contains(&a.order_id)));
        self.state_history
            .lock()
            .unwrap()
            .retain(|(owner, order_id)| !(owner == user_id && doomed.contains(order_id)));
        self.orders
            .lock()
            .unwrap()
            .retain(|(owner, id), _| !(owner == user_id && doomed.contains(id)));

        Ok(doomed.len() as u64)
    }

    async fn order_id_for_number(
        &self,
        user_id: &str,
        order_number: &str,
    ) -> DbResult<Option<String>> {
        Ok(self
            .orders
            .lock()
            .unwrap()
            .values()
            .find(|order| order.user_id == user_id && order.order_number == order_number)
            .map(|order| order.id.clone()))
    }

    async fn apply_ddt(&self, user_id: &str, order_id: &str, ddt: &DdtUpdate) -> DbResult<()> {
        self.log(format!("apply_ddt:{order_id}"));
        let key = (user_id.to_string(), order_id.to_string());
        let mut orders = self.orders.lock().unwrap();
        let Some(order) = orders.get_mut(&key) else {
            return Err(DbError::not_found("Order", order_id));
        };
        order.ddt_number = Some(ddt.ddt_number.clone());
        order.ddt_date = ddt.ddt_date;
        order.ddt_status = ddt.ddt_status.clone();
        Ok(())
    }

    async fn apply_invoice(
        &self,
        user_id: &str,
        order_id: &str,
        invoice: &InvoiceUpdate,
    ) -> DbResult<()> {
        self.log(format!("apply_invoice:{order_id}"));
        let key = (user_id.to_string(), order_id.to_string());
        let mut orders = self.orders.lock().unwrap();
        let Some(order) = orders.get_mut(&key) else {
            return Err(DbError::not_found("Order", order_id));
        };
        order.invoice_number = Some(invoice.invoice_number.clone());
        order.invoice_date = invoice.invoice_date;
        Ok(())
    }
}

#[async_trait]
impl ProductStore for MemoryStore {
    async fn product_heads(&self) -> DbResult<Vec<ProductHead>> {
        Ok(self
            .products
            .lock()
            .unwrap()
            .values()
            .map(|product| ProductHead {
                id: product.id.clone(),
                hash: product.hash.clone(),
                deleted: product.deleted_at.is_some(),
            })
            .collect())
    }

    async fn upsert_product(&self, product: &Product) -> DbResult<()> {
        self.log(format!("upsert_product:{}", product.id));
        let mut products = self.products.lock().unwrap();
        let image_local_path = products
            .get(&product.id)
            .and_then(|stored| stored.image_local_path.clone());

        let mut row = product.clone();
        row.deleted_at = None;
        row.image_local_path = image_local_path;
        products.insert(row.id.clone(), row);
        Ok(())
    }

    async fn touch_product(&self, id: &str, last_sync: i64) -> DbResult<()> {
        self.log(format!("touch_product:{id}"));
        if let Some(product) = self.products.lock().unwrap().get_mut(id) {
            product.last_sync = last_sync;
        }
        Ok(())
    }

    async fn soft_delete_missing(&self, keep: &[String], deleted_at: i64) -> DbResult<Vec<String>> {
        self.log("soft_delete_missing");
        let mut marked = Vec::new();
        for product in self.products.lock().unwrap().values_mut() {
            if product.deleted_at.is_none() && !keep.contains(&product.id) {
                product.deleted_at = Some(deleted_at);
                marked.push(product.id.clone());
            }
        }
        Ok(marked)
    }

    async fn log_product_change(&self, change: &ProductChange) -> DbResult<()> {
        self.product_changes.lock().unwrap().push(change.clone());
        Ok(())
    }

    async fn purge_products(&self) -> DbResult<u64> {
        self.log("purge_products");
        let mut products = self.products.lock().unwrap();
        let purged = products.len() as u64;
        products.clear();
        Ok(purged)
    }
}

#[async_trait]
impl PriceStore for MemoryStore {
    async fn find_price(&self, key: &PriceKey) -> DbResult<Option<Price>> {
        Ok(self
            .prices
            .lock()
            .unwrap()
            .iter()
            .find(|price| price_key_matches(price, key))
            .cloned())
    }

    async fn insert_price(&self, price: &Price) -> DbResult<()> {
        self.log(format!("insert_price:{}", price.product_id));
        self.prices.lock().unwrap().push(price.clone());
        Ok(())
    }

    async fn update_price(&self, price: &Price) -> DbResult<()> {
        self.log(format!("update_price:{}", price.product_id));
        let key = price.key();
        let mut prices = self.prices.lock().unwrap();
        let Some(stored) = prices.iter_mut().find(|p| price_key_matches(p, &key)) else {
            return Err(DbError::not_found("Price", &price.product_id));
        };
        stored.unit_price = price.unit_price;
        stored.price_valid_to = price.price_valid_to;
        stored.price_qty_to = price.price_qty_to;
        stored.hash = price.hash.clone();
        stored.last_sync = price.last_sync;
        Ok(())
    }

    async fn touch_price(&self, key: &PriceKey, last_sync: i64) -> DbResult<()> {
        self.log(format!("touch_price:{}", key.product_id));
        let mut prices = self.prices.lock().unwrap();
        if let Some(stored) = prices.iter_mut().find(|p| price_key_matches(p, key)) {
            stored.last_sync = last_sync;
        }
        Ok(())
    }

    async fn log_price_change(&self, entry: &PriceHistoryEntry) -> DbResult<()> {
        self.price_history.lock().unwrap().push(entry.clone());
        Ok(())
    }

    async fn blank_prices(&self) -> DbResult<u64> {
        self.log("blank_prices");
        let mut prices = self.prices.lock().unwrap();
        for price in prices.iter_mut() {
            price.unit_price = None;
            price.hash = String::new();
        }
        Ok(prices.len() as u64)
    }
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn whitelisted_users(&self) -> DbResult<Vec<User>> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .values()
            .filter(|user| user.whitelisted)
            .cloned()
            .collect())
    }

    async fn stamp_customer_sync(&self, user_id: &str, at: i64) -> DbResult<()> {
        self.log(format!("stamp_customer_sync:{user_id}"));
        if let Some(user) = self.users.lock().unwrap().get_mut(user_id) {
            user.last_customer_sync = Some(at);
        }
        Ok(())
    }

    async fn stamp_order_sync(&self, user_id: &str, at: i64) -> DbResult<()> {
        self.log(format!("stamp_order_sync:{user_id}"));
        if let Some(user) = self.users.lock().unwrap().get_mut(user_id) {
            user.last_order_sync = Some(at);
        }
        Ok(())
    }
}

#[async_trait]
impl SettingsStore for MemoryStore {
    async fn all_settings(&self) -> DbResult<Vec<SyncSetting>> {
        Ok(self.settings.lock().unwrap().values().cloned().collect())
    }

    async fn setting(&self, kind: SyncKind) -> DbResult<Option<SyncSetting>> {
        Ok(self.settings.lock().unwrap().get(&kind).cloned())
    }

    async fn seed_default_settings(&self) -> DbResult<()> {
        let mut settings = self.settings.lock().unwrap();
        for kind in SyncKind::ALL {
            settings
                .entry(kind)
                .or_insert_with(|| SyncSetting::default_for(kind, 1_700_000_000));
        }
        Ok(())
    }

    async fn set_interval(&self, kind: SyncKind, interval_minutes: i64) -> DbResult<()> {
        let mut settings = self.settings.lock().unwrap();
        let Some(setting) = settings.get_mut(&kind) else {
            return Err(DbError::not_found("SyncSetting", kind.as_str()));
        };
        setting.interval_minutes = interval_minutes;
        Ok(())
    }

    async fn set_enabled(&self, kind: SyncKind, enabled: bool) -> DbResult<()> {
        let mut settings = self.settings.lock().unwrap();
        let Some(setting) = settings.get_mut(&kind) else {
            return Err(DbError::not_found("SyncSetting", kind.as_str()));
        };
        setting.enabled = enabled;
        Ok(())
    }
}

// =============================================================================
// JSON Fixture Source
// =============================================================================

/// Snapshot source serving registered JSON payloads. Every download
/// materializes a fresh file, so one fixture drives repeated runs.
pub struct JsonFixtureSource {
    dir: TempDir,
    payloads: Mutex<HashMap<(SyncKind, Option<String>), String>>,
    downloads: AtomicU64,
    delay_ms: AtomicU64,
    pub cleaned: Mutex<Vec<PathBuf>>,
}

impl JsonFixtureSource {
    pub fn new() -> Arc<Self> {
        Arc::new(JsonFixtureSource {
            dir: TempDir::new().expect("temp dir"),
            payloads: Mutex::new(HashMap::new()),
            downloads: AtomicU64::new(0),
            delay_ms: AtomicU64::new(0),
            cleaned: Mutex::new(Vec::new()),
        })
    }

    /// Registers the snapshot served for one scope.
    pub fn set<R: Serialize>(&self, kind: SyncKind, user_id: Option<&str>, records: &[R]) {
        let payload = serde_json::to_string(records).expect("serialize fixture");
        self.payloads
            .lock()
            .unwrap()
            .insert((kind, user_id.map(str::to_string)), payload);
    }

    /// Registers a structurally invalid snapshot.
    pub fn set_raw(&self, kind: SyncKind, user_id: Option<&str>, payload: &str) {
        self.payloads
            .lock()
            .unwrap()
            .insert((kind, user_id.map(str::to_string)), payload.to_string());
    }

    /// Removes the snapshot of one scope, simulating a network failure.
    pub fn unset(&self, kind: SyncKind, user_id: Option<&str>) {
        self.payloads
            .lock()
            .unwrap()
            .remove(&(kind, user_id.map(str::to_string)));
    }

    /// Slows every download down, for overlap tests.
    pub fn set_delay_ms(&self, delay: u64) {
        self.delay_ms.store(delay, Ordering::SeqCst);
    }

    pub fn cleaned_count(&self) -> usize {
        self.cleaned.lock().unwrap().len()
    }
}

#[async_trait]
impl SnapshotSource for JsonFixtureSource {
    async fn download(&self, kind: SyncKind, user_id: Option<&str>) -> SyncResult<PathBuf> {
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
        }

        let payload = self
            .payloads
            .lock()
            .unwrap()
            .get(&(kind, user_id.map(str::to_string)))
            .cloned()
            .ok_or_else(|| SyncError::Network(format!("no snapshot registered for {kind}")))?;

        let seq = self.downloads.fetch_add(1, Ordering::SeqCst);
        let path = self.dir.path().join(format!("{kind}-{seq}.json"));
        std::fs::write(&path, payload)
            .map_err(|e| SyncError::Network(format!("fixture write failed: {e}")))?;
        Ok(path)
    }

    async fn cleanup(&self, path: &Path) {
        self.cleaned.lock().unwrap().push(path.to_path_buf());
        let _ = std::fs::remove_file(path);
    }
}

// =============================================================================
// Stop Signals
// =============================================================================

/// Returns true from its Nth invocation onwards.
pub struct StopAfter {
    calls: AtomicU64,
    trip_at: u64,
}

impl StopAfter {
    pub fn nth_invocation(trip_at: u64) -> Self {
        StopAfter {
            calls: AtomicU64::new(0),
            trip_at,
        }
    }
}

impl StopSignal for StopAfter {
    fn is_tripped(&self) -> bool {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        call >= self.trip_at
    }
}

// =============================================================================
// Fixture Bundle
// =============================================================================

/// A memory store plus a fixture source, wired into per-kind deps.
pub struct Fixture {
    pub store: Arc<MemoryStore>,
    pub source: Arc<JsonFixtureSource>,
}

impl Fixture {
    pub fn new() -> Self {
        Fixture {
            store: MemoryStore::new().with_user("U1"),
            source: JsonFixtureSource::new(),
        }
    }

    pub fn customer_deps(&self) -> SyncDeps<MemoryStore, CustomerRecord> {
        SyncDeps::new(
            self.store.clone(),
            self.source.clone(),
            Arc::new(JsonSnapshotParser::new()),
        )
    }

    pub fn order_deps(&self) -> SyncDeps<MemoryStore, OrderRecord> {
        SyncDeps::new(
            self.store.clone(),
            self.source.clone(),
            Arc::new(JsonSnapshotParser::new()),
        )
    }

    pub fn product_deps(&self) -> SyncDeps<MemoryStore, ProductRecord> {
        SyncDeps::new(
            self.store.clone(),
            self.source.clone(),
            Arc::new(JsonSnapshotParser::new()),
        )
    }

    pub fn price_deps(&self) -> SyncDeps<MemoryStore, PriceRecord> {
        SyncDeps::new(
            self.store.clone(),
            self.source.clone(),
            Arc::new(JsonSnapshotParser::new()),
        )
    }

    pub fn ddt_deps(&self) -> SyncDeps<MemoryStore, DdtRecord> {
        SyncDeps::new(
            self.store.clone(),
            self.source.clone(),
            Arc::new(JsonSnapshotParser::new()),
        )
    }

    pub fn invoice_deps(&self) -> SyncDeps<MemoryStore, InvoiceRecord> {
        SyncDeps::new(
            self.store.clone(),
            self.source.clone(),
            Arc::new(JsonSnapshotParser::new()),
        )
    }
}

// =============================================================================
// Record Builders
// =============================================================================

pub fn customer_record(profile: &str, name: &str, vat: &str, city: &str) -> CustomerRecord {
    CustomerRecord {
        customer_profile: profile.to_string(),
        business_name: name.to_string(),
        vat_number: Some(vat.to_string()),
        city: Some(city.to_string()),
        ..Default::default()
    }
}

pub fn order_record(
    id: &str,
    order_number: &str,
    sales_status: &str,
    document_status: &str,
    total_amount: &str,
) -> OrderRecord {
    OrderRecord {
        id: id.to_string(),
        order_number: order_number.to_string(),
        sales_status: sales_status.to_string(),
        document_status: Some(document_status.to_string()),
        total_amount: total_amount.to_string(),
        ..Default::default()
    }
}

pub fn order_record_with_article(
    id: &str,
    order_number: &str,
    sales_status: &str,
    document_status: &str,
    total_amount: &str,
    article_code: &str,
) -> OrderRecord {
    let mut record = order_record(id, order_number, sales_status, document_status, total_amount);
    record.articles.push(OrderArticleRecord {
        article_code: article_code.to_string(),
        quantity: 1.0,
        ..Default::default()
    });
    record
}

pub fn product_record(id: &str, name: &str, hash: &str) -> ProductRecord {
    ProductRecord {
        id: id.to_string(),
        name: name.to_string(),
        hash: hash.to_string(),
        ..Default::default()
    }
}

pub fn price_record(product_id: &str, unit_price: f64, price_valid_from: i64) -> PriceRecord {
    PriceRecord {
        product_id: product_id.to_string(),
        unit_price: Some(unit_price),
        price_valid_from,
        ..Default::default()
    }
}
