//! # Repositories
//!
//! One repository per entity family. Every SQL statement of the workspace
//! lives in these modules; callers deal in domain types only.
//!
//! - [`users`] - user directory, whitelist, sync stamps
//! - [`customer`] - tenant-scoped customers
//! - [`order`] - orders, article lines, state history, cascade deletes
//! - [`product`] - shared catalog with soft delete
//! - [`price`] - shared price list with temporal identity
//! - [`changelog`] - append-only audit tables
//! - [`sync_settings`] - scheduling configuration

pub mod changelog;
pub mod customer;
pub mod order;
pub mod price;
pub mod product;
pub mod sync_settings;
pub mod users;
