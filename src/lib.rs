//! # QueryBox
//!
//! A chat-search client: ask a question, get an answer from a chat-completion
//! endpoint, and browse a searchable library of everything you have asked.
//!
//! QueryBox is served as server-rendered HTML by `qbx serve` and is also
//! usable straight from the terminal (`qbx ask`, `qbx chat`, `qbx history`).
//!
//! ## Architecture
//!
//! ```text
//!  ┌──────────┐  question  ┌──────────────┐  prompt   ┌────────────────┐
//!  │  Web/CLI │───────────▶│ QuerySession │──────────▶│ Completion API │
//!  └────┬─────┘            │ + QueryFlow  │◀──────────│ (chat/complete)│
//!       │                  └──────┬───────┘  answer   └────────────────┘
//!       │ browse                  │ spawn_persist
//!       ▼                         ▼
//!  ┌──────────────┐  list  ┌──────────────┐
//!  │HistoryBrowser│◀───────│ExchangeStore │  sqlite / memory / rest
//!  └──────────────┘        └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! qbx init                                  # create database
//! qbx ask "how do I bake bread?"            # one question
//! qbx history --filter bread                # browse the library
//! qbx serve                                 # web UI on [server].bind
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Turns and persisted exchanges |
//! | [`traits`] | Completion, store, and identity capabilities |
//! | [`session`] | Per-thread transcript and request state machine |
//! | [`flow`] | Completion call and fire-and-forget persistence |
//! | [`library`] | History loading, filtering, and formatting |
//! | [`nav`] | Navigation panel model |
//! | [`identity`] | Session gate providers |
//! | [`completion`] | Chat-completion client |
//! | [`store`] | Exchange store backends |
//! | [`web`] | HTML rendering |
//! | [`server`] | HTTP server |
//! | [`progress`] | Terminal turn progress |
//! | [`logging`] | Tracing subscriber setup |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod completion;
pub mod config;
pub mod db;
pub mod flow;
pub mod identity;
pub mod library;
pub mod logging;
pub mod migrate;
pub mod models;
pub mod nav;
pub mod progress;
pub mod server;
pub mod session;
pub mod store;
pub mod traits;
pub mod web;
