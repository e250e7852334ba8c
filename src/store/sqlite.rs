//! SQLite-backed [`ExchangeStore`].
//!
//! One row per answered question in the `queries` table created by
//! [`crate::migrate`]. `created_at` is stored as unix seconds.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;
use crate::migrate;
use crate::models::{NewExchange, PersistedExchange};
use crate::traits::ExchangeStore;

use super::from_unix_seconds;

/// SQLite implementation of the [`ExchangeStore`] trait.
pub struct SqliteExchangeStore {
    pool: SqlitePool,
}

impl SqliteExchangeStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to `db.path` and make sure the schema exists.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::migrate_pool(&pool).await?;
        Ok(Self::new(pool))
    }
}

#[async_trait]
impl ExchangeStore for SqliteExchangeStore {
    fn backend(&self) -> &str {
        "sqlite"
    }

    async fn insert(&self, exchange: &NewExchange) -> Result<()> {
        sqlx::query(
            "INSERT INTO queries (question, response, user_email, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&exchange.question)
        .bind(&exchange.response)
        .bind(&exchange.owner)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_by_owner(&self, owner: &str) -> Result<Vec<PersistedExchange>> {
        let rows = sqlx::query(
            r#"
            SELECT id, question, response, user_email, created_at
            FROM queries
            WHERE user_email = ?
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(owner)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| PersistedExchange {
                id: row.get("id"),
                question: row.get("question"),
                response: row.get("response"),
                owner: row.get("user_email"),
                created_at: from_unix_seconds(row.get("created_at")),
            })
            .collect())
    }
}
