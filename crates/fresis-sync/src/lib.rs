//! # fresis-sync: Sync Engine for Fresis
//!
//! Keeps six derived datasets - customers, orders, products, prices,
//! delivery notes (DDT), invoices - continuously synchronized from the
//! upstream enterprise application into the shared PostgreSQL store.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Sync Engine Architecture                         │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                      Scheduler                                   │  │
//! │  │                                                                  │  │
//! │  │  one timer per kind · one token per (kind, user|∅)               │  │
//! │  │  manual + forced entry points · graceful stop                    │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │         ┌─────────────────────┼──────────────────────┐                  │
//! │         ▼                     ▼                      ▼                  │
//! │  ┌────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐  │
//! │  │ per-tenant     │  │ shared          │  │ enrichment              │  │
//! │  │ customers      │  │ products        │  │ ddt                     │  │
//! │  │ orders         │  │ prices          │  │ invoices                │  │
//! │  └────────────────┘  └─────────────────┘  └─────────────────────────┘  │
//! │                                                                         │
//! │  Every pipeline: download → parse → hash-diff reconcile → prune,        │
//! │  with cooperative stop checkpoints and cleanup on every exit path.      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`scheduler`] - timers, slot tokens, manual/forced runs, shutdown
//! - [`pipeline`] - the six reconciliation pipelines and their deps
//! - [`store`] - the store traits the pipelines run against
//! - [`snapshot`] - snapshot source/parser seams and concrete adapters
//! - [`cancel`] - cooperative cancellation
//! - [`progress`] - typed progress event channel
//! - [`session`] - per-run session ids for the change logs
//! - [`error`] - the pipeline error taxonomy
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use fresis_db::{Database, DbConfig};
//! use fresis_sync::{Scheduler, SnapshotParsers, SpoolDirSource};
//!
//! let db = Arc::new(Database::connect(DbConfig::new(url)).await?);
//! let source = Arc::new(SpoolDirSource::new("/var/spool/fresis"));
//! let scheduler = Scheduler::new(db, source, SnapshotParsers::json());
//! scheduler.start().await?;
//! // …
//! scheduler.stop().await;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod cancel;
pub mod error;
pub mod pipeline;
pub mod progress;
pub mod scheduler;
pub mod session;
pub mod snapshot;
pub mod store;

// =============================================================================
// Re-exports
// =============================================================================

pub use cancel::{NeverStop, StopSignal, StopToken};
pub use error::{SyncError, SyncResult};
pub use pipeline::{
    sync_customers, sync_ddt, sync_invoices, sync_orders, sync_prices, sync_products, SyncDeps,
};
pub use progress::{ProgressEvent, ProgressSender};
pub use scheduler::{LastRun, Scheduler, SchedulerError, Slot, SnapshotParsers};
pub use session::SyncSession;
pub use snapshot::{
    CustomerRecord, DdtRecord, InvoiceRecord, JsonSnapshotParser, OrderArticleRecord, OrderRecord,
    PriceRecord, ProductRecord, SnapshotParser, SnapshotSource, SpoolDirSource, SERVICE_ACCOUNT,
};
pub use store::{
    CustomerStore, OrderStore, PriceStore, ProductStore, SettingsStore, SyncStore, UserDirectory,
};
