//! Exchange storage backends.
//!
//! The [`ExchangeStore`] trait lives in [`crate::traits`]; this module holds
//! its implementations and the factory that picks one from configuration:
//!
//! | `store.backend` | Implementation | Notes |
//! |-----------------|----------------|-------|
//! | `"sqlite"` | [`SqliteExchangeStore`] | Local file at `db.path` (default) |
//! | `"memory"` | [`InMemoryExchangeStore`] | Lost on exit; tests and demos |
//! | `"rest"` | [`RestExchangeStore`] | Hosted PostgREST/Supabase table |

pub mod memory;
pub mod rest;
pub mod sqlite;

use anyhow::{bail, Result};
use std::sync::Arc;

use crate::config::Config;
use crate::traits::ExchangeStore;

pub use memory::InMemoryExchangeStore;
pub use rest::RestExchangeStore;
pub use sqlite::SqliteExchangeStore;

/// Open the store named by `store.backend`.
///
/// The SQLite backend connects and runs migrations, so a fresh database
/// file works without a separate `qbx init`.
pub async fn open_store(config: &Config) -> Result<Arc<dyn ExchangeStore>> {
    match config.store.backend.as_str() {
        "sqlite" => Ok(Arc::new(SqliteExchangeStore::open(config).await?)),
        "memory" => Ok(Arc::new(InMemoryExchangeStore::new())),
        "rest" => Ok(Arc::new(RestExchangeStore::new(&config.store)?)),
        other => bail!("Unknown store backend: {}", other),
    }
}

pub(crate) fn from_unix_seconds(ts: i64) -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::from_timestamp(ts, 0).unwrap_or_default()
}
