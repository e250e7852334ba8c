//! The history browser behind `/library` and `qbx history`.
//!
//! Loads every exchange the signed-in user owns once, newest first, then
//! filters client-side on each keystroke without re-fetching. A failed load
//! is kept distinct from an empty history ([`LoadState::Degraded`]).

use chrono::{DateTime, FixedOffset, Local, TimeZone, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use crate::models::PersistedExchange;
use crate::traits::ExchangeStore;

/// Responses longer than this many characters are cut for display.
pub const DEFAULT_TRUNCATE_CHARS: usize = 300;

const ELLIPSIS: &str = "...";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadState {
    /// Identity not resolved yet; nothing requested.
    NotLoaded,
    Loaded(Vec<PersistedExchange>),
    /// The store read failed; carries the logged error.
    Degraded(String),
}

#[derive(Debug, Clone)]
pub struct HistoryBrowser {
    state: LoadState,
}

impl Default for HistoryBrowser {
    fn default() -> Self {
        Self::new()
    }
}

impl HistoryBrowser {
    pub fn new() -> Self {
        Self {
            state: LoadState::NotLoaded,
        }
    }

    pub fn state(&self) -> &LoadState {
        &self.state
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self.state, LoadState::Degraded(_))
    }

    /// All fetched exchanges, newest first. Empty unless loaded.
    pub fn exchanges(&self) -> &[PersistedExchange] {
        match &self.state {
            LoadState::Loaded(rows) => rows,
            LoadState::NotLoaded | LoadState::Degraded(_) => &[],
        }
    }

    pub fn total(&self) -> usize {
        self.exchanges().len()
    }

    /// Fetch every exchange owned by `owner`.
    pub async fn load(&mut self, store: &dyn ExchangeStore, owner: &str) {
        self.state = match store.list_by_owner(owner).await {
            Ok(rows) => {
                debug!(backend = store.backend(), owner, count = rows.len(), "history loaded");
                LoadState::Loaded(rows)
            }
            Err(e) => {
                let message = format!("{:#}", e);
                warn!(backend = store.backend(), owner, error = %message, "failed to load history");
                LoadState::Degraded(message)
            }
        };
    }

    /// Case-insensitive substring match on question or response.
    pub fn filter(&self, term: &str) -> Vec<&PersistedExchange> {
        filter_exchanges(self.exchanges(), term)
    }
}

pub fn filter_exchanges<'a>(rows: &'a [PersistedExchange], term: &str) -> Vec<&'a PersistedExchange> {
    let needle = term.to_lowercase();
    if needle.is_empty() {
        return rows.iter().collect();
    }
    rows.iter()
        .filter(|r| {
            r.question.to_lowercase().contains(&needle)
                || r.response.to_lowercase().contains(&needle)
        })
        .collect()
}

/// Cut `text` to `max_chars` characters plus `...` when it is longer.
pub fn truncate_response(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}{}", &text[..byte_idx], ELLIPSIS),
        None => text.to_string(),
    }
}

/// `"Oct 17, 2026, 03:05 PM"` in the given zone.
pub fn format_timestamp_in<Tz: TimeZone>(ts: &DateTime<Utc>, tz: &Tz) -> String
where
    Tz::Offset: std::fmt::Display,
{
    ts.with_timezone(tz).format("%b %-d, %Y, %I:%M %p").to_string()
}

/// Format in a fixed offset, or the local zone when `offset_minutes` is `None`.
pub fn format_timestamp(ts: &DateTime<Utc>, offset_minutes: Option<i32>) -> String {
    match offset_minutes.and_then(|m| FixedOffset::east_opt(m * 60)) {
        Some(offset) => format_timestamp_in(ts, &offset),
        None => format_timestamp_in(ts, &Local),
    }
}

/// `"Showing X of Y conversations"`.
pub fn summary_line(shown: usize, total: usize) -> String {
    format!("Showing {} of {} conversations", shown, total)
}

/// Display-ready row for the library views.
#[derive(Debug, Clone, Serialize)]
pub struct ExchangeView {
    pub id: i64,
    pub question: String,
    pub asked_at: String,
    pub created_at: DateTime<Utc>,
    pub response: String,
    pub truncated: bool,
}

impl ExchangeView {
    pub fn from_exchange(row: &PersistedExchange, truncate_chars: usize, offset_minutes: Option<i32>) -> Self {
        let response = truncate_response(&row.response, truncate_chars);
        Self {
            id: row.id,
            question: row.question.clone(),
            asked_at: format_timestamp(&row.created_at, offset_minutes),
            created_at: row.created_at,
            truncated: response.len() != row.response.len(),
            response,
        }
    }
}

/// A filtered page of the library.
#[derive(Debug, Clone, Serialize)]
pub struct LibraryPage {
    pub term: String,
    pub total: usize,
    pub shown: usize,
    pub degraded: bool,
    pub exchanges: Vec<ExchangeView>,
}

impl LibraryPage {
    pub fn build(
        browser: &HistoryBrowser,
        term: &str,
        truncate_chars: usize,
        offset_minutes: Option<i32>,
    ) -> Self {
        let exchanges: Vec<ExchangeView> = browser
            .filter(term)
            .into_iter()
            .map(|row| ExchangeView::from_exchange(row, truncate_chars, offset_minutes))
            .collect();
        Self {
            term: term.to_string(),
            total: browser.total(),
            shown: exchanges.len(),
            degraded: browser.is_degraded(),
            exchanges,
        }
    }

    pub fn summary(&self) -> String {
        summary_line(self.shown, self.total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewExchange;
    use crate::store::InMemoryExchangeStore;
    use anyhow::Result;
    use async_trait::async_trait;

    fn row(id: i64, question: &str, response: &str) -> PersistedExchange {
        PersistedExchange {
            id,
            question: question.to_string(),
            response: response.to_string(),
            owner: "me@example.com".to_string(),
            created_at: Utc.with_ymd_and_hms(2026, 10, 17, 15, 5, 0).unwrap(),
        }
    }

    fn loaded(rows: Vec<PersistedExchange>) -> HistoryBrowser {
        HistoryBrowser {
            state: LoadState::Loaded(rows),
        }
    }

    #[test]
    fn filter_matches_question_substring() {
        let browser = loaded(vec![row(2, "apple pie", "bake it"), row(1, "banana split", "scoop it")]);
        let hits = browser.filter("ban");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].question, "banana split");
    }

    #[test]
    fn empty_filter_keeps_order() {
        let browser = loaded(vec![row(2, "apple pie", "x"), row(1, "banana split", "y")]);
        let all: Vec<&str> = browser.filter("").iter().map(|r| r.question.as_str()).collect();
        assert_eq!(all, vec!["apple pie", "banana split"]);
    }

    #[test]
    fn filter_is_case_insensitive_and_checks_response() {
        let browser = loaded(vec![row(1, "dessert?", "Try a BANANA split")]);
        assert_eq!(browser.filter("banana").len(), 1);
        assert_eq!(browser.filter("DESSERT").len(), 1);
        assert!(browser.filter("cherry").is_empty());
    }

    #[test]
    fn truncation_at_three_hundred() {
        let long = "a".repeat(350);
        let cut = truncate_response(&long, DEFAULT_TRUNCATE_CHARS);
        assert_eq!(cut, format!("{}...", "a".repeat(300)));

        let exact = "b".repeat(300);
        assert_eq!(truncate_response(&exact, DEFAULT_TRUNCATE_CHARS), exact);
        assert_eq!(truncate_response("short", DEFAULT_TRUNCATE_CHARS), "short");
    }

    #[test]
    fn truncation_counts_characters_not_bytes() {
        let text = "é".repeat(301);
        let cut = truncate_response(&text, 300);
        assert_eq!(cut.chars().count(), 303);
        assert!(cut.starts_with(&"é".repeat(300)));
    }

    #[test]
    fn timestamp_format() {
        let ts = Utc.with_ymd_and_hms(2026, 10, 17, 15, 5, 0).unwrap();
        assert_eq!(format_timestamp_in(&ts, &Utc), "Oct 17, 2026, 03:05 PM");
        assert_eq!(format_timestamp(&ts, Some(-4 * 60)), "Oct 17, 2026, 11:05 AM");
    }

    #[test]
    fn page_summary_counts_filtered_and_total() {
        let browser = loaded(vec![row(2, "apple pie", "x"), row(1, "banana split", "y")]);
        let page = LibraryPage::build(&browser, "ban", 300, Some(0));
        assert_eq!(page.summary(), "Showing 1 of 2 conversations");
        assert!(!page.exchanges[0].truncated);
    }

    #[tokio::test]
    async fn load_reads_owner_history() {
        let store = InMemoryExchangeStore::new();
        store
            .insert(&NewExchange {
                question: "q".into(),
                response: "r".into(),
                owner: "me@example.com".into(),
            })
            .await
            .unwrap();
        let mut browser = HistoryBrowser::new();
        assert_eq!(browser.state(), &LoadState::NotLoaded);
        browser.load(&store, "me@example.com").await;
        assert_eq!(browser.total(), 1);
        assert!(!browser.is_degraded());
    }

    struct BrokenStore;

    #[async_trait]
    impl ExchangeStore for BrokenStore {
        fn backend(&self) -> &str {
            "broken"
        }
        async fn insert(&self, _exchange: &NewExchange) -> Result<()> {
            anyhow::bail!("unreachable")
        }
        async fn list_by_owner(&self, _owner: &str) -> Result<Vec<PersistedExchange>> {
            anyhow::bail!("connection reset")
        }
    }

    #[tokio::test]
    async fn failed_load_is_degraded_not_empty() {
        let mut browser = HistoryBrowser::new();
        browser.load(&BrokenStore, "me@example.com").await;
        assert!(browser.is_degraded());
        assert!(browser.exchanges().is_empty());
        let page = LibraryPage::build(&browser, "", 300, None);
        assert!(page.degraded);
        assert_eq!(page.total, 0);
    }
}
