//! # User Repository
//!
//! Directory of upstream-identified users. The scheduler fans per-tenant
//! pipelines out over the whitelisted set; the customer and order
//! pipelines stamp their last successful pass here.

use sqlx::PgPool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use fresis_core::User;

const USER_COLUMNS: &str =
    "id, username, role, whitelisted, last_login, last_customer_sync, last_order_sync";

/// Repository for the `agents.users` table.
#[derive(Debug, Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    pub fn new(pool: PgPool) -> Self {
        UserRepository { pool }
    }

    /// Inserts a user at first upstream identification, or refreshes the
    /// mutable identification fields on a later login. Never deletes.
    pub async fn upsert(&self, user: &User) -> DbResult<()> {
        debug!(id = %user.id, username = %user.username, "Upserting user");

        sqlx::query(
            r#"
            INSERT INTO agents.users (
                id, username, role, whitelisted,
                last_login, last_customer_sync, last_order_sync
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE SET
                username = EXCLUDED.username,
                role = EXCLUDED.role,
                last_login = EXCLUDED.last_login
            "#,
        )
        .bind(&user.id)
        .bind(&user.username)
        .bind(user.role)
        .bind(user.whitelisted)
        .bind(user.last_login)
        .bind(user.last_customer_sync)
        .bind(user.last_order_sync)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Gets a user by id.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM agents.users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    /// Users participating in per-tenant syncs.
    pub async fn whitelisted(&self) -> DbResult<Vec<User>> {
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM agents.users WHERE whitelisted ORDER BY username"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(users)
    }

    /// Adds a user to, or removes it from, the sync whitelist.
    pub async fn set_whitelisted(&self, id: &str, whitelisted: bool) -> DbResult<()> {
        let result = sqlx::query("UPDATE agents.users SET whitelisted = $2 WHERE id = $1")
            .bind(id)
            .bind(whitelisted)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("User", id));
        }

        Ok(())
    }

    /// Stamps the last successful customer pipeline pass.
    pub async fn stamp_last_customer_sync(&self, id: &str, at: i64) -> DbResult<()> {
        sqlx::query("UPDATE agents.users SET last_customer_sync = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Stamps the last successful order pipeline pass.
    pub async fn stamp_last_order_sync(&self, id: &str, at: i64) -> DbResult<()> {
        sqlx::query("UPDATE agents.users SET last_order_sync = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
