//! The query/answer session state machine.
//!
//! A [`QuerySession`] owns one live transcript. A submission is split in two
//! so callers never hold a lock across the network call:
//!
//! ```text
//!            begin(draft)                 settle(ticket, outcome)
//!  Idle ─────────────────────▶ InFlight ─────────────────────────▶ Settled
//!   ▲        (user turn)          │          (assistant turn)          │
//!   │                             │ begin() → Err(InFlight)            │
//!   └──────────── reset() ◀───────┴────────────────────────────────────┘
//! ```
//!
//! Only one request can be in flight. A settle whose ticket is not the
//! current in-flight one (for example after a reset) leaves the transcript
//! alone; a late answer is still handed back so it can be saved.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use thiserror::Error;

use crate::models::{NewExchange, Turn};

/// Assistant text when the endpoint answered without content.
pub const NO_ANSWER: &str = "No answer.";

/// Assistant text when the completion request failed.
pub const FETCH_FAILED: &str = "Sorry, I couldn't fetch a response. Please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    /// No question asked since the last reset.
    Landing,
    Session,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Idle,
    InFlight { ticket: u64 },
    Settled,
}

/// Why [`QuerySession::begin`] refused a draft. State is unchanged in both cases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SubmitRejection {
    #[error("question is empty")]
    EmptyDraft,
    #[error("a question is already being answered")]
    InFlight,
}

/// Handle for one outstanding completion request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    id: u64,
    prompt: String,
}

impl Ticket {
    /// The raw draft, sent as the entire prompt.
    pub fn prompt(&self) -> &str {
        &self.prompt
    }
}

/// Result of [`QuerySession::settle`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    /// The endpoint answered; the exchange should be persisted.
    Answered { question: String, answer: String },
    /// The request failed; the apology turn was appended.
    Failed,
    /// The thread moved on before the answer arrived. Nothing was appended,
    /// but the exchange should still be persisted.
    Detached { question: String, answer: String },
    /// The thread moved on and the request failed; nothing to do.
    Stale,
}

impl Settlement {
    /// The record to persist, if this settlement produced one.
    pub fn exchange_for(&self, owner: &str) -> Option<NewExchange> {
        match self {
            Settlement::Answered { question, answer }
            | Settlement::Detached { question, answer } => Some(NewExchange {
                question: question.clone(),
                response: answer.clone(),
                owner: owner.to_string(),
            }),
            Settlement::Failed | Settlement::Stale => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct QuerySession {
    transcript: Vec<Turn>,
    draft: String,
    mode: ViewMode,
    state: RequestState,
}

/// Ticket ids are unique per process, so a session rebuilt after eviction
/// never mistakes an old ticket for its own.
static NEXT_TICKET: AtomicU64 = AtomicU64::new(1);

impl Default for QuerySession {
    fn default() -> Self {
        Self::new()
    }
}

impl QuerySession {
    pub fn new() -> Self {
        Self {
            transcript: Vec::new(),
            draft: String::new(),
            mode: ViewMode::Landing,
            state: RequestState::Idle,
        }
    }

    pub fn transcript(&self) -> &[Turn] {
        &self.transcript
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn mode(&self) -> ViewMode {
        self.mode
    }

    pub fn state(&self) -> RequestState {
        self.state
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.state, RequestState::InFlight { .. })
    }

    pub fn is_landing(&self) -> bool {
        self.mode == ViewMode::Landing && self.transcript.is_empty()
    }

    /// Replace the draft without submitting (input edits, suggestion chips).
    pub fn set_draft(&mut self, text: impl Into<String>) {
        self.draft = text.into();
    }

    /// Start a turn: append the user turn and mark the request in flight.
    pub fn begin(&mut self, draft: &str) -> Result<Ticket, SubmitRejection> {
        if draft.trim().is_empty() {
            return Err(SubmitRejection::EmptyDraft);
        }
        if self.is_pending() {
            return Err(SubmitRejection::InFlight);
        }

        let id = NEXT_TICKET.fetch_add(1, Ordering::Relaxed);

        self.draft = draft.to_string();
        self.transcript.push(Turn::user(draft));
        self.mode = ViewMode::Session;
        self.state = RequestState::InFlight { ticket: id };

        Ok(Ticket {
            id,
            prompt: draft.to_string(),
        })
    }

    /// Finish a turn with the completion outcome.
    ///
    /// `Ok(None)` (an answer without content) becomes [`NO_ANSWER`]; any
    /// error becomes [`FETCH_FAILED`]. Either way the request settles and
    /// the draft is cleared.
    pub fn settle<E>(&mut self, ticket: &Ticket, outcome: Result<Option<String>, E>) -> Settlement {
        let current = matches!(
            self.state,
            RequestState::InFlight { ticket: id } if id == ticket.id
        );
        if !current {
            return match outcome {
                Ok(answer) => Settlement::Detached {
                    question: ticket.prompt.clone(),
                    answer: answer_text(answer),
                },
                Err(_) => Settlement::Stale,
            };
        }

        let settlement = match outcome {
            Ok(answer) => {
                let answer = answer_text(answer);
                self.transcript.push(Turn::assistant(answer.clone()));
                Settlement::Answered {
                    question: ticket.prompt.clone(),
                    answer,
                }
            }
            Err(_) => {
                self.transcript.push(Turn::assistant(FETCH_FAILED));
                Settlement::Failed
            }
        };

        self.state = RequestState::Settled;
        self.draft.clear();
        settlement
    }

    /// Back to the landing view with an empty transcript. Idempotent.
    pub fn reset(&mut self) {
        self.transcript.clear();
        self.draft.clear();
        self.mode = ViewMode::Landing;
        self.state = RequestState::Idle;
    }
}

fn answer_text(answer: Option<String>) -> String {
    answer
        .filter(|a| !a.is_empty())
        .unwrap_or_else(|| NO_ANSWER.to_string())
}

/// Landing-page suggestion chips.
pub const SUGGESTIONS: [&str; 5] = ["Troubleshoot", "Learn", "Summarize", "Analyze", "Sports"];

/// Draft text for a suggestion chip: `"Help me <label>"`.
pub fn suggestion_prompt(label: &str) -> Option<String> {
    SUGGESTIONS
        .iter()
        .find(|s| s.eq_ignore_ascii_case(label.trim()))
        .map(|s| format!("Help me {}", s.to_lowercase()))
}
