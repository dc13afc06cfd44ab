//! # Domain Types
//!
//! Core entity types for the Fresis sync engine.
//!
//! ## Store Layout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Synchronized Entities                             │
//! │                                                                         │
//! │  Per-tenant (agents.*)              Shared (shared.*)                   │
//! │  ────────────────────               ─────────────────                   │
//! │  User        (directory)            Product   (soft delete)             │
//! │  Customer    (hash diff)            Price     (temporal identity)       │
//! │  Order       (hash diff)            ProductChange  (audit log)          │
//! │  OrderArticle     (child)           PriceHistoryEntry (audit log)       │
//! │  OrderStateHistory (log)                                                │
//! │                                     System (system.*)                   │
//! │                                     ─────────────────                   │
//! │                                     SyncSetting (per kind)              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Identity Conventions
//! - Per-tenant entities are keyed by `(business id, user_id)`; no query on
//!   a per-tenant table may omit `user_id`.
//! - Shared entities are keyed by the upstream identifier alone.
//! - All timestamps are unix seconds (`i64`).
//! - Order monetary amounts are decimal-as-string, exactly as exported by
//!   the upstream application.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// Parse Errors
// =============================================================================

/// Error returned when parsing a stored enum token fails.
#[derive(Debug, Clone, Error)]
#[error("unknown {what}: '{value}'")]
pub struct UnknownVariant {
    pub what: &'static str,
    pub value: String,
}

// =============================================================================
// TEXT-backed enum codecs (database feature)
// =============================================================================

/// Implements the sqlx TEXT codec for an enum with `as_str`/`FromStr`.
///
/// The store keeps these enums as plain TEXT columns, so the codec
/// delegates to the string impls instead of declaring a PostgreSQL enum
/// type.
#[cfg(feature = "db")]
macro_rules! text_codec {
    ($ty:ty) => {
        impl sqlx::Type<sqlx::Postgres> for $ty {
            fn type_info() -> sqlx::postgres::PgTypeInfo {
                <&str as sqlx::Type<sqlx::Postgres>>::type_info()
            }

            fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
                <&str as sqlx::Type<sqlx::Postgres>>::compatible(ty)
            }
        }

        impl<'q> sqlx::Encode<'q, sqlx::Postgres> for $ty {
            fn encode_by_ref(
                &self,
                buf: &mut sqlx::postgres::PgArgumentBuffer,
            ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
                <&str as sqlx::Encode<'q, sqlx::Postgres>>::encode_by_ref(&self.as_str(), buf)
            }
        }

        impl<'r> sqlx::Decode<'r, sqlx::Postgres> for $ty {
            fn decode(
                value: sqlx::postgres::PgValueRef<'r>,
            ) -> Result<Self, sqlx::error::BoxDynError> {
                let raw = <&str as sqlx::Decode<'r, sqlx::Postgres>>::decode(value)?;
                Ok(raw.parse::<$ty>()?)
            }
        }
    };
}

// =============================================================================
// Sync Kind
// =============================================================================

/// The six synchronized datasets.
///
/// Replaces the upstream's string-keyed configuration map: every sync kind
/// is enumerated here and admin mutations go through typed functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncKind {
    Customers,
    Orders,
    Products,
    Prices,
    Ddt,
    Invoices,
}

impl SyncKind {
    /// Every kind, in scheduler installation order.
    pub const ALL: [SyncKind; 6] = [
        SyncKind::Customers,
        SyncKind::Orders,
        SyncKind::Products,
        SyncKind::Prices,
        SyncKind::Ddt,
        SyncKind::Invoices,
    ];

    /// The stable token persisted in `system.sync_settings`.
    pub const fn as_str(&self) -> &'static str {
        match self {
            SyncKind::Customers => "customers",
            SyncKind::Orders => "orders",
            SyncKind::Products => "products",
            SyncKind::Prices => "prices",
            SyncKind::Ddt => "ddt",
            SyncKind::Invoices => "invoices",
        }
    }

    /// Shared kinds own a single scheduler slot; per-tenant kinds own one
    /// slot per whitelisted user.
    pub const fn is_shared(&self) -> bool {
        matches!(self, SyncKind::Products | SyncKind::Prices)
    }

    /// True when the pipeline requires a tenant (`user_id`).
    pub const fn is_per_user(&self) -> bool {
        !self.is_shared()
    }

    /// Default interval seeded into `sync_settings` on first start.
    pub const fn default_interval_minutes(&self) -> i64 {
        match self {
            SyncKind::Orders => 30,
            SyncKind::Customers => 60,
            SyncKind::Products => 360,
            SyncKind::Prices => 360,
            SyncKind::Ddt => 60,
            SyncKind::Invoices => 60,
        }
    }
}

impl std::fmt::Display for SyncKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SyncKind {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customers" => Ok(SyncKind::Customers),
            "orders" => Ok(SyncKind::Orders),
            "products" => Ok(SyncKind::Products),
            "prices" => Ok(SyncKind::Prices),
            "ddt" => Ok(SyncKind::Ddt),
            "invoices" => Ok(SyncKind::Invoices),
            other => Err(UnknownVariant {
                what: "sync kind",
                value: other.to_string(),
            }),
        }
    }
}

#[cfg(feature = "db")]
text_codec!(SyncKind);

// =============================================================================
// User
// =============================================================================

/// Role of an identified upstream user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    /// Sales agent; sees only their own tenant data.
    Agent,
    /// Administrator; may trigger forced syncs.
    Admin,
}

impl UserRole {
    pub const fn as_str(&self) -> &'static str {
        match self {
            UserRole::Agent => "agent",
            UserRole::Admin => "admin",
        }
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for UserRole {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "agent" => Ok(UserRole::Agent),
            "admin" => Ok(UserRole::Admin),
            other => Err(UnknownVariant {
                what: "user role",
                value: other.to_string(),
            }),
        }
    }
}

#[cfg(feature = "db")]
text_codec!(UserRole);

/// An upstream-identified user of the sales application.
///
/// Created at first identification; never deleted by the sync engine.
/// Whitelisted users get per-tenant scheduler slots.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct User {
    /// Upstream user identifier.
    pub id: String,

    /// Upstream login name.
    pub username: String,

    pub role: UserRole,

    /// Only whitelisted users participate in per-tenant syncs.
    pub whitelisted: bool,

    pub last_login: Option<i64>,

    /// Stamped by the customer pipeline on success.
    pub last_customer_sync: Option<i64>,

    /// Stamped by the order pipeline on success.
    pub last_order_sync: Option<i64>,
}

// =============================================================================
// Customer
// =============================================================================

/// A tenant-scoped customer record, keyed by `(customer_profile, user_id)`.
///
/// Every descriptive field participates in the content hash; any change
/// re-serializes the whole row. Inserted, updated and deleted only by the
/// customer pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Customer {
    /// Upstream customer profile code (business identifier).
    pub customer_profile: String,

    /// Owning tenant.
    pub user_id: String,

    pub business_name: String,
    pub vat_number: Option<String>,
    pub fiscal_code: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub province: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
    pub phone: Option<String>,
    pub mobile: Option<String>,
    pub email: Option<String>,
    pub pec_email: Option<String>,
    pub sdi_code: Option<String>,
    pub contact_person: Option<String>,
    pub payment_terms: Option<String>,
    pub payment_method: Option<String>,
    pub iban: Option<String>,
    pub bank_name: Option<String>,
    pub price_list: Option<String>,
    pub discount_class: Option<String>,
    pub sales_agent: Option<String>,
    pub delivery_address: Option<String>,
    pub delivery_city: Option<String>,
    pub delivery_province: Option<String>,
    pub delivery_postal_code: Option<String>,
    pub notes: Option<String>,

    /// Content digest over the descriptive fields (see `hash` module).
    pub hash: String,

    /// Unix seconds of the last pipeline pass that saw this row.
    pub last_sync: i64,
}

// =============================================================================
// Order
// =============================================================================

/// Lifecycle state assigned to freshly imported orders.
pub const INITIAL_ORDER_STATE: &str = "new";

/// A tenant-scoped order, keyed by `(id, user_id)`.
///
/// `order_number` is a secondary, mutable identifier tracked out-of-band
/// of the content hash decision (see the order pipeline). Monetary amounts
/// are decimal-as-string. DDT and invoice fields are enriched by their own
/// pipelines after the order exists.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Order {
    /// Upstream order identifier.
    pub id: String,

    /// Owning tenant.
    pub user_id: String,

    /// Human-facing order number; may be reassigned upstream.
    pub order_number: String,

    pub customer_profile: Option<String>,
    pub customer_name: Option<String>,
    pub order_date: Option<i64>,
    pub delivery_date: Option<i64>,

    pub sales_status: String,
    pub document_status: Option<String>,
    pub transfer_status: Option<String>,

    pub taxable_amount: Option<String>,
    pub vat_amount: Option<String>,
    pub total_amount: String,

    pub ddt_number: Option<String>,
    pub ddt_date: Option<i64>,
    pub ddt_status: Option<String>,

    pub invoice_number: Option<String>,
    pub invoice_date: Option<i64>,

    /// Application-side lifecycle state; never overwritten by the order
    /// pipeline once the row exists.
    pub current_state: String,

    pub hash: String,
    pub last_sync: i64,
    pub created_at: i64,
}

/// A line item of an order. Deleted in cascade with the parent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct OrderArticle {
    pub order_id: String,
    pub user_id: String,

    /// Position within the order (1-based surrogate).
    pub line_number: i32,

    pub article_code: String,
    pub description: Option<String>,
    pub quantity: f64,
    pub unit_price: Option<String>,
    pub discount: Option<String>,
    pub line_total: Option<String>,
}

/// One append-only entry of an order's state log. Cascaded with the parent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct OrderStateHistory {
    pub id: i64,
    pub order_id: String,
    pub user_id: String,
    pub old_state: Option<String>,
    pub new_state: String,
    pub actor: String,
    pub notes: Option<String>,
    pub confidence: Option<f64>,
    pub source: Option<String>,
    pub created_at: i64,
}

/// DDT enrichment applied to an existing order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DdtUpdate {
    pub ddt_number: String,
    pub ddt_date: Option<i64>,
    pub ddt_status: Option<String>,
}

/// Invoice enrichment applied to an existing order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceUpdate {
    pub invoice_number: String,
    pub invoice_date: Option<i64>,
}

// =============================================================================
// Product
// =============================================================================

/// A shared product, keyed by the upstream identifier.
///
/// Soft-deletes via `deleted_at`; a reappearance in a later snapshot clears
/// the marker atomically with the upsert. The content hash is supplied by
/// the snapshot parser (content-addressed export).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Product {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub unit_of_measure: Option<String>,
    pub price: Option<f64>,
    pub vat_rate: Option<f64>,
    pub image_url: Option<String>,

    /// Filled by the image downloader, outside this engine.
    pub image_local_path: Option<String>,

    /// Soft-delete marker (unix seconds); NULL means live.
    pub deleted_at: Option<i64>,

    pub hash: String,
    pub last_sync: i64,
}

// =============================================================================
// Price
// =============================================================================

/// A shared price row.
///
/// Identity is `(product_id, item_selection)` with a nullable selection;
/// updates are keyed on `(product_id, price_valid_from,
/// COALESCE(price_qty_from, 0))` so prices with distinct validity windows
/// are distinct rows.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Price {
    pub product_id: String,

    /// Variant/selection code; NULL matches NULL (`IS NOT DISTINCT FROM`).
    pub item_selection: Option<String>,

    /// NULL only after a forced sync blanked the table.
    pub unit_price: Option<f64>,

    pub price_valid_from: i64,
    pub price_valid_to: Option<i64>,
    pub price_qty_from: Option<f64>,
    pub price_qty_to: Option<f64>,

    pub hash: String,
    pub last_sync: i64,
}

/// The update key of a price row (see `Price`).
#[derive(Debug, Clone, PartialEq)]
pub struct PriceKey {
    pub product_id: String,
    pub item_selection: Option<String>,
    pub price_valid_from: i64,
    pub price_qty_from: Option<f64>,
}

impl Price {
    /// The key this row is addressed by during reconciliation.
    pub fn key(&self) -> PriceKey {
        PriceKey {
            product_id: self.product_id.clone(),
            item_selection: self.item_selection.clone(),
            price_valid_from: self.price_valid_from,
            price_qty_from: self.price_qty_from,
        }
    }
}

// =============================================================================
// Change Logs
// =============================================================================

/// What happened to a product during a sync session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Created,
    Updated,
    Deleted,
}

impl ChangeType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Created => "created",
            ChangeType::Updated => "updated",
            ChangeType::Deleted => "deleted",
        }
    }
}

impl std::fmt::Display for ChangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ChangeType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(ChangeType::Created),
            "updated" => Ok(ChangeType::Updated),
            "deleted" => Ok(ChangeType::Deleted),
            other => Err(UnknownVariant {
                what: "change type",
                value: other.to_string(),
            }),
        }
    }
}

#[cfg(feature = "db")]
text_codec!(ChangeType);

/// One row of the `shared.product_changes` audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct ProductChange {
    pub product_id: String,
    pub change_type: ChangeType,
    pub changed_at: i64,
    pub sync_session_id: String,
}

/// Direction of a recorded price movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceChangeType {
    Increase,
    Decrease,
    New,
}

impl PriceChangeType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            PriceChangeType::Increase => "increase",
            PriceChangeType::Decrease => "decrease",
            PriceChangeType::New => "new",
        }
    }
}

impl std::fmt::Display for PriceChangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PriceChangeType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "increase" => Ok(PriceChangeType::Increase),
            "decrease" => Ok(PriceChangeType::Decrease),
            "new" => Ok(PriceChangeType::New),
            other => Err(UnknownVariant {
                what: "price change type",
                value: other.to_string(),
            }),
        }
    }
}

#[cfg(feature = "db")]
text_codec!(PriceChangeType);

/// One row of the `shared.price_history` audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct PriceHistoryEntry {
    pub product_id: String,
    pub variant_id: Option<String>,
    pub old_price: Option<f64>,
    pub new_price: Option<f64>,
    pub percentage_change: Option<f64>,
    pub change_type: PriceChangeType,
    pub sync_date: i64,
    pub source: String,
    pub sync_session_id: String,
}

// =============================================================================
// Sync Settings
// =============================================================================

/// Scheduling configuration for one sync kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct SyncSetting {
    pub sync_type: SyncKind,
    pub interval_minutes: i64,
    pub enabled: bool,
    pub updated_at: i64,
}

impl SyncSetting {
    /// The setting seeded for a kind that has no persisted row yet.
    pub fn default_for(kind: SyncKind, now: i64) -> Self {
        SyncSetting {
            sync_type: kind,
            interval_minutes: kind.default_interval_minutes(),
            enabled: true,
            updated_at: now,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
