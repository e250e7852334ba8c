//! In-memory [`ExchangeStore`] for tests and throwaway sessions.
//!
//! Records live in a `Vec` behind `std::sync::RwLock`; ids are assigned
//! sequentially and `created_at` is the insert time.

use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{NewExchange, PersistedExchange};
use crate::traits::ExchangeStore;

#[derive(Default)]
struct Inner {
    next_id: i64,
    rows: Vec<PersistedExchange>,
}

/// In-memory exchange store.
pub struct InMemoryExchangeStore {
    inner: RwLock<Inner>,
}

impl InMemoryExchangeStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Insert with an explicit timestamp, for seeding history.
    pub fn insert_at(&self, exchange: &NewExchange, created_at: DateTime<Utc>) -> i64 {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner.next_id += 1;
        let id = inner.next_id;
        inner.rows.push(PersistedExchange {
            id,
            question: exchange.question.clone(),
            response: exchange.response.clone(),
            owner: exchange.owner.clone(),
            created_at,
        });
        id
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|i| i.rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryExchangeStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExchangeStore for InMemoryExchangeStore {
    fn backend(&self) -> &str {
        "memory"
    }

    async fn insert(&self, exchange: &NewExchange) -> Result<()> {
        self.insert_at(exchange, Utc::now());
        Ok(())
    }

    async fn list_by_owner(&self, owner: &str) -> Result<Vec<PersistedExchange>> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        let mut rows: Vec<PersistedExchange> = inner
            .rows
            .iter()
            .filter(|r| r.owner == owner)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn exchange(question: &str, owner: &str) -> NewExchange {
        NewExchange {
            question: question.to_string(),
            response: format!("answer to {}", question),
            owner: owner.to_string(),
        }
    }

    #[tokio::test]
    async fn lists_newest_first_for_owner_only() {
        let store = InMemoryExchangeStore::new();
        let t0 = Utc::now();
        store.insert_at(&exchange("first", "a@example.com"), t0);
        store.insert_at(&exchange("other", "b@example.com"), t0 + Duration::seconds(5));
        store.insert_at(&exchange("second", "a@example.com"), t0 + Duration::seconds(10));

        let rows = store.list_by_owner("a@example.com").await.unwrap();
        let questions: Vec<&str> = rows.iter().map(|r| r.question.as_str()).collect();
        assert_eq!(questions, vec!["second", "first"]);
    }

    #[tokio::test]
    async fn same_timestamp_breaks_ties_by_id() {
        let store = InMemoryExchangeStore::new();
        let t0 = Utc::now();
        store.insert_at(&exchange("older", "a@example.com"), t0);
        store.insert_at(&exchange("newer", "a@example.com"), t0);

        let rows = store.list_by_owner("a@example.com").await.unwrap();
        assert_eq!(rows[0].question, "newer");
        assert_eq!(rows[1].question, "older");
    }

    #[tokio::test]
    async fn unknown_owner_gets_nothing() {
        let store = InMemoryExchangeStore::new();
        store.insert(&exchange("q", "a@example.com")).await.unwrap();
        assert!(store.list_by_owner("nobody@example.com").await.unwrap().is_empty());
        assert_eq!(store.len(), 1);
    }
}
