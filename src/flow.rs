//! Query/answer orchestration around a [`QuerySession`].
//!
//! [`QueryFlow`] wires one session to its collaborators: it runs the
//! completion call between `begin` and `settle`, then hands an answered
//! exchange to [`spawn_persist`]. Persistence is fire-and-forget from the
//! view's point of view; failures are logged and recorded in a
//! [`PersistenceHealth`] so the view can show a degraded notice.
//!
//! The web server drives `begin`/`settle` itself (it must release its lock
//! during the call) but shares [`spawn_persist`] and [`PersistenceHealth`].

use std::sync::{Arc, Mutex};

use anyhow::Result;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::models::NewExchange;
use crate::session::{QuerySession, Settlement, SubmitRejection};
use crate::traits::{CompletionService, ExchangeStore, Identity};

/// Last persistence failure for a session, if any.
///
/// Cloning shares the underlying state.
#[derive(Debug, Clone, Default)]
pub struct PersistenceHealth {
    last_failure: Arc<Mutex<Option<String>>>,
}

impl PersistenceHealth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_degraded(&self) -> bool {
        self.last_failure().is_some()
    }

    pub fn last_failure(&self) -> Option<String> {
        self.last_failure
            .lock()
            .map(|g| g.clone())
            .unwrap_or_else(|e| e.into_inner().clone())
    }

    fn record(&self, outcome: &Result<()>) {
        let mut slot = self.last_failure.lock().unwrap_or_else(|e| e.into_inner());
        *slot = outcome.as_ref().err().map(|e| format!("{:#}", e));
    }

    /// Forget the last failure (a new thread starts healthy).
    pub fn clear(&self) {
        let mut slot = self.last_failure.lock().unwrap_or_else(|e| e.into_inner());
        *slot = None;
    }
}

/// A spawned persistence task.
pub struct PersistHandle {
    handle: JoinHandle<Result<()>>,
}

impl PersistHandle {
    /// Wait for the insert to finish.
    pub async fn wait(self) -> Result<()> {
        self.handle.await?
    }
}

/// Insert `exchange` on a background task.
///
/// The outcome is written to `health`; failures are logged, never raised.
pub fn spawn_persist(
    store: Arc<dyn ExchangeStore>,
    exchange: NewExchange,
    health: PersistenceHealth,
) -> PersistHandle {
    let handle = tokio::spawn(async move {
        let outcome = store.insert(&exchange).await;
        match &outcome {
            Ok(()) => debug!(backend = store.backend(), owner = %exchange.owner, "exchange saved"),
            Err(e) => warn!(
                backend = store.backend(),
                owner = %exchange.owner,
                error = %format!("{:#}", e),
                "failed to save exchange"
            ),
        }
        health.record(&outcome);
        outcome
    });
    PersistHandle { handle }
}

/// Run the completion call for one prompt, logging failures.
pub async fn request_answer(
    completion: &dyn CompletionService,
    prompt: &str,
) -> Result<Option<String>> {
    let outcome = completion.complete(prompt).await;
    match &outcome {
        Ok(Some(_)) => debug!(model = completion.model_name(), "completion answered"),
        Ok(None) => info!(model = completion.model_name(), "completion carried no content"),
        Err(e) => warn!(
            model = completion.model_name(),
            error = %format!("{:#}", e),
            "completion request failed"
        ),
    }
    outcome
}

/// What one [`QueryFlow::submit`] call did.
pub enum SubmitOutcome {
    /// Draft refused; nothing changed.
    Rejected(SubmitRejection),
    /// Answer appended; the exchange is being saved.
    Answered { answer: String, persist: PersistHandle },
    /// Apology appended; nothing saved.
    Failed,
}

/// One user's live session bound to its collaborators.
pub struct QueryFlow {
    completion: Arc<dyn CompletionService>,
    store: Arc<dyn ExchangeStore>,
    owner: Identity,
    session: QuerySession,
    health: PersistenceHealth,
}

impl QueryFlow {
    pub fn new(
        completion: Arc<dyn CompletionService>,
        store: Arc<dyn ExchangeStore>,
        owner: Identity,
    ) -> Self {
        Self {
            completion,
            store,
            owner,
            session: QuerySession::new(),
            health: PersistenceHealth::new(),
        }
    }

    pub fn session(&self) -> &QuerySession {
        &self.session
    }

    pub fn health(&self) -> &PersistenceHealth {
        &self.health
    }

    pub fn owner(&self) -> &Identity {
        &self.owner
    }

    pub fn model_name(&self) -> &str {
        self.completion.model_name()
    }

    /// Ask one question.
    ///
    /// Blank drafts are a silent no-op ([`SubmitOutcome::Rejected`]).
    pub async fn submit(&mut self, draft: &str) -> SubmitOutcome {
        let ticket = match self.session.begin(draft) {
            Ok(ticket) => ticket,
            Err(rejection) => return SubmitOutcome::Rejected(rejection),
        };

        let outcome = request_answer(self.completion.as_ref(), ticket.prompt()).await;
        let settlement = self.session.settle(&ticket, outcome);

        match settlement.exchange_for(&self.owner.email) {
            Some(exchange) => {
                let answer = exchange.response.clone();
                let persist = spawn_persist(self.store.clone(), exchange, self.health.clone());
                SubmitOutcome::Answered { answer, persist }
            }
            None => match settlement {
                Settlement::Stale => SubmitOutcome::Rejected(SubmitRejection::InFlight),
                _ => SubmitOutcome::Failed,
            },
        }
    }

    /// Start a new thread.
    pub fn reset(&mut self) {
        self.session.reset();
        self.health.clear();
    }
}
