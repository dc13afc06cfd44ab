//! # Sync-Settings Repository
//!
//! Reads and writes the six `{interval_minutes, enabled}` tuples in
//! `system.sync_settings`. The scheduler re-reads a kind's row on every
//! tick, so admin mutations written here take effect without a restart.

use chrono::Utc;
use sqlx::PgPool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use fresis_core::{SyncKind, SyncSetting};

const SETTING_COLUMNS: &str = "sync_type, interval_minutes, enabled, updated_at";

/// Repository for the `system.sync_settings` table.
#[derive(Debug, Clone)]
pub struct SyncSettingsRepository {
    pool: PgPool,
}

impl SyncSettingsRepository {
    pub fn new(pool: PgPool) -> Self {
        SyncSettingsRepository { pool }
    }

    /// All persisted settings.
    pub async fn get_all(&self) -> DbResult<Vec<SyncSetting>> {
        let settings = sqlx::query_as::<_, SyncSetting>(&format!(
            "SELECT {SETTING_COLUMNS} FROM system.sync_settings ORDER BY sync_type"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(settings)
    }

    /// The setting of one kind, if persisted.
    pub async fn get(&self, kind: SyncKind) -> DbResult<Option<SyncSetting>> {
        let setting = sqlx::query_as::<_, SyncSetting>(&format!(
            "SELECT {SETTING_COLUMNS} FROM system.sync_settings WHERE sync_type = $1"
        ))
        .bind(kind)
        .fetch_optional(&self.pool)
        .await?;

        Ok(setting)
    }

    /// Seeds a default row for every kind that has none yet. Idempotent;
    /// the scheduler calls this once on start.
    pub async fn seed_defaults(&self) -> DbResult<()> {
        let now = Utc::now().timestamp();

        for kind in SyncKind::ALL {
            let default = SyncSetting::default_for(kind, now);

            sqlx::query(
                "INSERT INTO system.sync_settings \
                 (sync_type, interval_minutes, enabled, updated_at) \
                 VALUES ($1, $2, $3, $4) \
                 ON CONFLICT (sync_type) DO NOTHING",
            )
            .bind(default.sync_type)
            .bind(default.interval_minutes)
            .bind(default.enabled)
            .bind(default.updated_at)
            .execute(&self.pool)
            .await?;
        }

        debug!("Sync settings seeded");
        Ok(())
    }

    /// Changes the interval of one kind. Takes effect at the next tick.
    pub async fn update_interval(&self, kind: SyncKind, interval_minutes: i64) -> DbResult<()> {
        if interval_minutes < 1 {
            return Err(DbError::QueryFailed(format!(
                "interval must be positive, got {interval_minutes}"
            )));
        }

        let now = Utc::now().timestamp();

        let result = sqlx::query(
            "UPDATE system.sync_settings \
             SET interval_minutes = $2, updated_at = $3 WHERE sync_type = $1",
        )
        .bind(kind)
        .bind(interval_minutes)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("SyncSetting", kind.as_str()));
        }

        debug!(kind = %kind, interval_minutes, "Sync interval updated");
        Ok(())
    }

    /// Enables or disables one kind. Takes effect at the next tick.
    pub async fn set_enabled(&self, kind: SyncKind, enabled: bool) -> DbResult<()> {
        let now = Utc::now().timestamp();

        let result = sqlx::query(
            "UPDATE system.sync_settings \
             SET enabled = $2, updated_at = $3 WHERE sync_type = $1",
        )
        .bind(kind)
        .bind(enabled)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("SyncSetting", kind.as_str()));
        }

        debug!(kind = %kind, enabled, "Sync kind toggled");
        Ok(())
    }
}
