//! # Database Migrations
//!
//! Embedded SQL migrations for the Fresis store.
//!
//! ## Adding New Migrations
//!
//! 1. Create a new file in `migrations/postgres/` with the next sequence
//!    number (`NNN_description.sql`).
//! 2. Write idempotent SQL (`IF NOT EXISTS` where possible).
//! 3. **NEVER** modify an applied migration - always add a new one.

use sqlx::PgPool;
use tracing::info;

use crate::error::DbResult;

/// Embedded migrations from `migrations/postgres`.
///
/// `sqlx::migrate!()` embeds the SQL files into the binary at compile
/// time; no runtime file access is needed.
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations/postgres");

/// Runs all pending database migrations, in filename order, each in its
/// own transaction. Idempotent: applied migrations are tracked in
/// `_sqlx_migrations`.
pub async fn run_migrations(pool: &PgPool) -> DbResult<()> {
    info!("Checking for pending migrations");

    MIGRATOR.run(pool).await?;

    info!("All migrations applied");
    Ok(())
}
