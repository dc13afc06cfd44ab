//! # fresis-db: Database Layer for the Fresis Sync Engine
//!
//! All PostgreSQL access lives in this crate.
//!
//! ## Responsibility
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          fresis-db                                      │
//! │                                                                         │
//! │  ✅ RESPONSIBILITIES                   ❌ NOT RESPONSIBLE FOR           │
//! │  ──────────────────────                ─────────────────────────        │
//! │  • Connection pool management          • Reconciliation decisions       │
//! │  • Every SQL statement                 • Scheduling and cancellation    │
//! │  • Schema migrations                   • Snapshot download/parsing      │
//! │  • Column ↔ field mapping              • Progress reporting             │
//! │  • Cascade ordering for deletes                                         │
//! │  • Filter composition                                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Key Decisions
//! - Runtime query API (`sqlx::query`, `query_as` + `FromRow`), positional
//!   `$n` binds, PostgreSQL dialect (`ON CONFLICT DO UPDATE`,
//!   `IS NOT DISTINCT FROM`, `= ANY($n)` array binds).
//! - Embedded migrations from `migrations/postgres/`.
//! - Repositories are stateless `Clone` structs over the shared `PgPool`;
//!   multi-statement operations that must be atomic compose a transaction
//!   via `pool.begin()`.

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod filter;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use filter::QueryFilter;
pub use pool::{Database, DbConfig};
pub use repository::customer::{CustomerFilter, CustomerRepository};
pub use repository::order::{ArticleSale, OrderFilter, OrderHead, OrderRepository};
pub use repository::price::PriceRepository;
pub use repository::product::{ProductFilter, ProductHead, ProductRepository};
pub use repository::sync_settings::SyncSettingsRepository;
pub use repository::users::UserRepository;
pub use repository::changelog::ChangeLogRepository;
