//! Server-rendered HTML for the home, session and library views.
//!
//! Everything interpolated goes through maud, so user text is escaped.

use maud::{html, Markup, PreEscaped, DOCTYPE};

use crate::library::LibraryPage;
use crate::models::Role;
use crate::nav::{is_active, NavWidth, NAV_ITEMS, NEW_THREAD};
use crate::session::{QuerySession, SUGGESTIONS};
use crate::traits::Identity;

/// Per-request chrome shared by every signed-in page.
#[derive(Debug, Clone, Copy)]
pub struct Shell<'a> {
    pub path: &'a str,
    pub identity: &'a Identity,
    pub nav: NavWidth,
    pub profile_url: Option<&'a str>,
}

/// A banner above the main content.
#[derive(Debug, Clone, Copy)]
pub struct Notice<'a> {
    pub text: &'a str,
    pub is_error: bool,
}

fn layout(title: &str, shell: &Shell<'_>, main: Markup) -> String {
    let markup = html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="utf-8";
                meta name="viewport" content="width=device-width, initial-scale=1";
                title { (title) " | QueryBox" }
                style { (PreEscaped(STYLES)) }
            }
            body {
                div class="qb-app" {
                    (sidebar(shell))
                    main class="qb-main" { (main) }
                }
            }
        }
    };
    markup.into_string()
}

fn sidebar(shell: &Shell<'_>) -> Markup {
    let expanded = shell.nav.is_expanded();
    html! {
        aside class=(if expanded { "qb-nav" } else { "qb-nav collapsed" }) {
            div class="qb-brand" { @if expanded { "querybox" } @else { "q" } }
            a class="qb-new" href=(NEW_THREAD.href) title=(NEW_THREAD.label) {
                "+" @if expanded { " " (NEW_THREAD.label) }
            }
            nav {
                ul {
                    @for item in NAV_ITEMS {
                        li {
                            @if item.live {
                                a class=(if is_active(&item, shell.path) { "qb-link active" } else { "qb-link" })
                                  href=(item.href)
                                  title=(item.label) {
                                    @if expanded { (item.label) } @else { (item.label.chars().next().unwrap_or(' ')) }
                                }
                            } @else {
                                span class="qb-link inert" aria-disabled="true" title=(item.label) {
                                    @if expanded { (item.label) } @else { (item.label.chars().next().unwrap_or(' ')) }
                                }
                            }
                        }
                    }
                }
            }
            div class="qb-account" {
                span class="qb-avatar" { (shell.identity.initial()) }
                @if expanded {
                    @if let Some(url) = shell.profile_url {
                        a href=(url) { (shell.identity.email) }
                    } @else {
                        span { (shell.identity.email) }
                    }
                }
            }
            form method="post" action="/nav/toggle" {
                input type="hidden" name="return_to" value=(shell.path);
                button type="submit" class="qb-toggle" {
                    @if expanded { "« Collapse" } @else { "»" }
                }
            }
        }
    }
}

fn notice_slot(notice: Option<Notice<'_>>) -> Markup {
    html! {
        @if let Some(notice) = notice {
            div class=(if notice.is_error { "qb-notice error" } else { "qb-notice" }) role="status" {
                (notice.text)
            }
        }
    }
}

fn ask_form(draft: &str, placeholder: &str) -> Markup {
    html! {
        form class="qb-ask" method="post" action="/ask" {
            textarea name="question" rows="1" placeholder=(placeholder) required { (draft) }
            button type="submit" class="qb-send" { "↑" }
        }
    }
}

/// `/`: landing view before the first question, transcript afterwards.
pub fn render_home(shell: &Shell<'_>, session: &QuerySession, notice: Option<Notice<'_>>) -> String {
    let main = if session.is_landing() {
        html! {
            section class="qb-landing" {
                h1 { "querybox" }
                (notice_slot(notice))
                (ask_form(session.draft(), "Ask anything..."))
                div class="qb-suggestions" {
                    @for label in SUGGESTIONS {
                        a class="qb-chip" href=(format!("/?suggest={}", label.to_lowercase())) { (label) }
                    }
                }
            }
        }
    } else {
        html! {
            section class="qb-session" {
                (notice_slot(notice))
                div class="qb-transcript" {
                    @for turn in session.transcript() {
                        @match turn.role {
                            Role::User => {
                                div class="qb-turn user" { (turn.text) }
                            }
                            Role::Assistant => {
                                div class="qb-turn assistant" {
                                    h2 { "Answer" }
                                    p class="qb-answer" { (turn.text) }
                                    div class="qb-actions" {
                                        button type="button" disabled { "Share" }
                                        button type="button" disabled { "Export" }
                                        button type="button" disabled { "Rewrite" }
                                    }
                                }
                            }
                        }
                    }
                    @if session.is_pending() {
                        div class="qb-thinking" { "Thinking..." }
                    }
                }
                (ask_form(session.draft(), "Ask a follow-up..."))
            }
        }
    };
    layout("Home", shell, main)
}

/// `/library`: filtered history, newest first.
pub fn render_library(shell: &Shell<'_>, page: &LibraryPage) -> String {
    let main = html! {
        section class="qb-library" {
            h1 { "Your Library" }
            p class="qb-muted" { "Browse your search history and past conversations" }
            form method="get" action="/library" class="qb-search" {
                input type="search" name="q" value=(page.term) placeholder="Search your conversations...";
                button type="submit" { "Search" }
            }
            @if page.degraded {
                div class="qb-notice error" role="status" {
                    h3 { "We couldn't load your library" }
                    p { "Your history is temporarily unavailable. Please try again later." }
                }
            } @else if page.exchanges.is_empty() {
                div class="qb-empty" {
                    @if page.term.is_empty() {
                        h3 { "No conversations yet" }
                        p { "Start a new conversation to see it here" }
                    } @else {
                        h3 { "No results found" }
                        p { "Try adjusting your search terms" }
                    }
                }
            } @else {
                div class="qb-cards" {
                    @for row in &page.exchanges {
                        article class="qb-card" {
                            h3 { (row.question) }
                            time datetime=(row.created_at.to_rfc3339()) { (row.asked_at) }
                            div class="qb-card-answer" {
                                span class="qb-muted" { "Answer" }
                                p { (row.response) }
                            }
                        }
                    }
                }
                p class="qb-count" { (page.summary()) }
            }
        }
    };
    layout("Library", shell, main)
}

/// Shown at `/sign-in` and friends when no provider URL is configured.
pub fn render_provider_notice(heading: &str, redirect_url: Option<&str>) -> String {
    let markup = html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="utf-8";
                title { (heading) " | QueryBox" }
                style { (PreEscaped(STYLES)) }
            }
            body {
                main class="qb-main qb-signin" {
                    h1 { (heading) }
                    p {
                        "Sign-in is handled by your identity provider. "
                        "Access QueryBox through it to continue."
                    }
                    @if let Some(url) = redirect_url {
                        p class="qb-muted" { "You will return to " code { (url) } " afterwards." }
                    }
                }
            }
        }
    };
    markup.into_string()
}

const STYLES: &str = r#"
*{box-sizing:border-box}
body{margin:0;font-family:"Helvetica Neue",sans-serif;background:#FBFBFA;color:#1f2937}
.qb-app{display:flex;min-height:100vh}
.qb-nav{width:16rem;background:#F0F0EB;border-right:1px solid #e5e7eb;padding:1rem;display:flex;flex-direction:column;gap:1rem}
.qb-nav.collapsed{width:5rem;align-items:center}
.qb-nav ul{list-style:none;margin:0;padding:0}
.qb-link{display:block;padding:.75rem;border-radius:.5rem;color:inherit;text-decoration:none}
.qb-link.active{background:#e5e7eb;font-weight:600}
.qb-link.inert{color:#9ca3af;cursor:default}
.qb-new{display:block;text-align:center;background:#fff;border:1px solid #d1d5db;border-radius:.5rem;padding:.5rem;color:inherit;text-decoration:none}
.qb-account{margin-top:auto;display:flex;align-items:center;gap:.5rem}
.qb-avatar{width:2rem;height:2rem;border-radius:50%;background:#14b8a6;color:#fff;display:flex;align-items:center;justify-content:center;font-weight:700}
.qb-toggle{background:none;border:0;cursor:pointer;padding:.75rem}
.qb-main{flex:1;padding:2rem;max-width:48rem;margin:0 auto}
.qb-landing{text-align:center;padding-top:20vh}
.qb-landing h1{font-size:3.5rem;font-weight:300;color:#4b5563}
.qb-ask{display:flex;gap:.5rem;margin-top:1rem}
.qb-ask textarea{flex:1;padding:1rem;border:1px solid #d1d5db;border-radius:.75rem;resize:none;font:inherit}
.qb-send{background:#14b8a6;color:#fff;border:0;border-radius:.5rem;padding:0 1rem;cursor:pointer}
.qb-suggestions{display:flex;gap:.75rem;justify-content:center;margin-top:1.5rem}
.qb-chip{border:1px solid #e5e7eb;border-radius:999px;padding:.5rem 1rem;background:#fff;color:inherit;text-decoration:none}
.qb-turn.user{font-size:1.25rem;font-weight:600;margin:2rem 0 1rem}
.qb-answer{white-space:pre-wrap;line-height:1.6}
.qb-actions button{background:none;border:0;color:#6b7280;margin-right:1rem}
.qb-thinking{color:#0d9488}
.qb-notice{padding:.75rem 1rem;border-radius:.5rem;background:#ecfeff;margin:1rem 0}
.qb-notice.error{background:#fef2f2;color:#991b1b}
.qb-card{background:#fff;border:1px solid #e5e7eb;border-radius:.5rem;padding:1.5rem;margin-bottom:1rem}
.qb-card-answer p{white-space:pre-line;font-size:.875rem}
.qb-muted,.qb-card time{color:#6b7280;font-size:.875rem}
.qb-count{text-align:center;color:#6b7280;font-size:.875rem;margin-top:2rem}
.qb-empty{text-align:center;padding:3rem 0;color:#4b5563}
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::{HistoryBrowser, LibraryPage};

    fn shell<'a>(identity: &'a Identity, path: &'a str) -> Shell<'a> {
        Shell {
            path,
            identity,
            nav: NavWidth::Expanded,
            profile_url: None,
        }
    }

    #[test]
    fn sidebar_lists_unbuilt_sections_without_links() {
        let me = Identity::new("me@example.com");
        let html = render_home(&shell(&me, "/"), &QuerySession::new(), None);
        assert!(html.contains("href=\"/library\""));
        assert!(html.contains("<span class=\"qb-link inert\" aria-disabled=\"true\" title=\"Discover\">Discover</span>"));
        assert!(html.contains(">Spaces</span>"));
        assert!(!html.contains("href=\"/discover\""));
        assert!(!html.contains("href=\"/spaces\""));
    }

    #[test]
    fn landing_shows_suggestions_and_no_transcript() {
        let me = Identity::new("me@example.com");
        let html = render_home(&shell(&me, "/"), &QuerySession::new(), None);
        assert!(html.contains("qb-landing"));
        assert!(html.contains("/?suggest=troubleshoot"));
        assert!(!html.contains("qb-transcript"));
    }

    #[test]
    fn session_view_renders_turns_and_inert_actions() {
        let me = Identity::new("me@example.com");
        let mut session = QuerySession::new();
        let ticket = session.begin("life?").unwrap();
        session.settle(&ticket, Ok::<_, anyhow::Error>(Some("42".to_string())));

        let html = render_home(&shell(&me, "/"), &session, None);
        assert!(html.contains("qb-turn user"));
        assert!(html.contains("life?"));
        assert!(html.contains("42"));
        assert!(html.contains("<button type=\"button\" disabled>Share</button>"));
        assert!(!html.contains("Thinking..."));
    }

    #[test]
    fn pending_session_shows_thinking() {
        let me = Identity::new("me@example.com");
        let mut session = QuerySession::new();
        session.begin("slow").unwrap();
        let html = render_home(&shell(&me, "/"), &session, None);
        assert!(html.contains("Thinking..."));
    }

    #[test]
    fn user_text_is_escaped() {
        let me = Identity::new("me@example.com");
        let mut session = QuerySession::new();
        session.begin("<script>alert(1)</script>").unwrap();
        let html = render_home(&shell(&me, "/"), &session, None);
        assert!(!html.contains("<script>alert(1)</script>"));
        assert!(html.contains("&lt;script&gt;"));
    }

    #[test]
    fn empty_library_says_no_conversations() {
        let me = Identity::new("me@example.com");
        let page = LibraryPage::build(&HistoryBrowser::new(), "", 300, Some(0));
        let html = render_library(&shell(&me, "/library"), &page);
        assert!(html.contains("No conversations yet"));
        assert!(!html.contains("Showing"));
    }

    #[test]
    fn collapsed_nav_hides_labels() {
        let me = Identity::new("me@example.com");
        let mut s = shell(&me, "/");
        s.nav = NavWidth::Collapsed;
        let html = render_home(&s, &QuerySession::new(), None);
        assert!(html.contains("qb-nav collapsed"));
        assert!(!html.contains("« Collapse"));
    }
}
