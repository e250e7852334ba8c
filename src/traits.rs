//! Capability traits for the hosted collaborators.
//!
//! QueryBox owns none of the hard parts. Inference, persistence and identity
//! are each reached through one of the traits below, injected as
//! `Arc<dyn Trait>` so the flow logic can be driven by fakes in tests.
//!
//! ```text
//! ┌────────────────┐   complete()     ┌───────────────────┐
//! │   QueryFlow    │─────────────────▶│ CompletionService │
//! │   (session)    │   insert()       ├───────────────────┤
//! │                │─────────────────▶│   ExchangeStore   │
//! └────────────────┘                  └───────────────────┘
//! ┌────────────────┐  list_by_owner()           ▲
//! │ HistoryBrowser │────────────────────────────┘
//! └────────────────┘
//! ┌────────────────┐  authenticate()  ┌───────────────────┐
//! │  Session Gate  │─────────────────▶│ IdentityProvider  │
//! └────────────────┘                  └───────────────────┘
//! ```

use anyhow::Result;
use async_trait::async_trait;
use axum::http::HeaderMap;
use serde::Serialize;

use crate::models::{NewExchange, PersistedExchange};

// ═══════════════════════════════════════════════════════════════════════
// Completion
// ═══════════════════════════════════════════════════════════════════════

/// A language-model completion endpoint.
///
/// One call per user turn, with the question as the whole prompt.
///
/// # Returns
///
/// - `Ok(Some(text))`: the first completion's content.
/// - `Ok(None)`: the endpoint answered but carried no usable content.
/// - `Err(_)`: network error, non-success status, or a malformed body.
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Model identifier, for logging.
    fn model_name(&self) -> &str;

    async fn complete(&self, prompt: &str) -> Result<Option<String>>;
}

// ═══════════════════════════════════════════════════════════════════════
// Store
// ═══════════════════════════════════════════════════════════════════════

/// Durable storage for answered questions.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`insert`](ExchangeStore::insert) | Persist one exchange; the store assigns `id` and `created_at` |
/// | [`list_by_owner`](ExchangeStore::list_by_owner) | All exchanges for an owner, newest first |
#[async_trait]
pub trait ExchangeStore: Send + Sync {
    /// Short backend label (`"sqlite"`, `"memory"`, `"rest"`).
    fn backend(&self) -> &str;

    async fn insert(&self, exchange: &NewExchange) -> Result<()>;

    /// Ordered by `created_at` descending; ties broken by `id` descending.
    async fn list_by_owner(&self, owner: &str) -> Result<Vec<PersistedExchange>>;
}

// ═══════════════════════════════════════════════════════════════════════
// Identity
// ═══════════════════════════════════════════════════════════════════════

/// The signed-in user as far as QueryBox cares: a primary email address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub email: String,
}

impl Identity {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
        }
    }

    /// First character of the address, upper-cased, for the avatar badge.
    pub fn initial(&self) -> char {
        self.email
            .chars()
            .next()
            .map(|c| c.to_ascii_uppercase())
            .unwrap_or('?')
    }
}

/// Resolves the current user of a request.
///
/// Terminal callers pass an empty [`HeaderMap`].
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Returns `None` for an unauthenticated request.
    async fn authenticate(&self, headers: &HeaderMap) -> Result<Option<Identity>>;

    /// Provider-owned sign-in surface, if any.
    fn sign_in_url(&self) -> Option<&str> {
        None
    }

    fn sign_up_url(&self) -> Option<&str> {
        None
    }

    fn profile_url(&self) -> Option<&str> {
        None
    }
}
