//! Core data models shared by the query flow and the history browser.
//!
//! A [`Turn`] lives only in memory for one session; a [`PersistedExchange`]
//! is the durable question/answer record read back by the library view.
//! The two share a shape but are never linked.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who produced a [`Turn`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One message in the live session transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
        }
    }
}

/// Insert payload for the store: one answered question.
///
/// Serialized with the store's column names (`user_email` for the owner).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewExchange {
    pub question: String,
    pub response: String,
    #[serde(rename = "user_email")]
    pub owner: String,
}

/// A durable question/answer record keyed by its owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedExchange {
    #[serde(default)]
    pub id: i64,
    pub question: String,
    pub response: String,
    #[serde(rename = "user_email")]
    pub owner: String,
    pub created_at: DateTime<Utc>,
}
