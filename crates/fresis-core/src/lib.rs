//! # fresis-core: Pure Domain Logic for the Fresis Sync Engine
//!
//! The **heart** of the sync engine: entity types, the frozen hash rules
//! for change detection, sync kinds and sync reports. Everything here is
//! deterministic and free of I/O.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Fresis Sync Architecture                           │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     apps/syncd (daemon)                         │   │
//! │  │        config, tracing init, scheduler lifecycle                │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                     fresis-sync (engine)                        │   │
//! │  │       scheduler, six pipelines, cancellation, snapshots         │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ fresis-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐      ┌───────────┐      ┌───────────┐           │   │
//! │  │   │   types   │      │   hash    │      │  report   │           │   │
//! │  │   │ Customer  │      │ HashInput │      │ SyncReport│           │   │
//! │  │   │ Order …   │      │ rules     │      │ SyncStage │           │   │
//! │  │   └───────────┘      └───────────┘      └───────────┘           │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS            │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                  fresis-db (PostgreSQL layer)                   │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain entities, [`SyncKind`], settings
//! - [`hash`] - Canonical serialization and change-detection digests
//! - [`report`] - [`SyncReport`], stages and the failure taxonomy

// =============================================================================
// Module Declarations
// =============================================================================

pub mod hash;
pub mod report;
pub mod types;

// =============================================================================
// Re-exports
// =============================================================================

pub use report::{OrderNumberChange, SyncFailure, SyncFailureKind, SyncReport, SyncStage};
pub use types::{
    ChangeType, Customer, DdtUpdate, InvoiceUpdate, Order, OrderArticle, OrderStateHistory,
    Price, PriceChangeType, PriceHistoryEntry, PriceKey, Product, ProductChange, SyncKind,
    SyncSetting, UnknownVariant, User, UserRole, INITIAL_ORDER_STATE,
};
