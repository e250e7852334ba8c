//! The QueryBox web server.
//!
//! Serves the home/session view and the library as server-rendered HTML,
//! plus a small JSON API over the same flow.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/` | Landing or session view (`?new=true` resets, `?suggest=<label>` prefills) |
//! | `POST` | `/ask` | Submit the `question` form field |
//! | `GET`  | `/library` | History browser (`?q=` filters) |
//! | `POST` | `/nav/toggle` | Flip the sidebar width |
//! | `POST` | `/api/ask` | `{ "question": ... }` → answer and transcript |
//! | `GET`  | `/api/library` | Filtered history as JSON |
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/sign-in`, `/sign-up`, `/user` | Identity-provider surfaces |
//!
//! # Session Gate
//!
//! Page routes redirect unauthenticated requests to
//! `/sign-in?redirect_url=<path>`; API routes answer `401`.
//!
//! # Threads
//!
//! Each browser gets a `qbx_thread` cookie. The live transcript for a
//! thread is kept in memory, scoped by the signed-in address, and is lost
//! when the server stops. Only answered exchanges reach the store.
//!
//! # Error Contract
//!
//! API errors use the shape
//! `{ "error": { "code": "bad_request", "message": "question must not be empty" } }`
//! with codes `bad_request` (400), `unauthorized` (401), `busy` (409) and
//! `internal` (500).

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use anyhow::Result;
use axum::{
    extract::{Query, State},
    http::{
        header::{COOKIE, SET_COOKIE},
        HeaderMap, HeaderValue, StatusCode,
    },
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::completion::create_completion_service;
use crate::config::Config;
use crate::flow::{request_answer, spawn_persist, PersistenceHealth};
use crate::identity::create_identity_provider;
use crate::library::{HistoryBrowser, LibraryPage};
use crate::models::Turn;
use crate::nav::{NavWidth, NAV_COOKIE};
use crate::session::{suggestion_prompt, QuerySession, Settlement, SubmitRejection};
use crate::store::open_store;
use crate::traits::{CompletionService, ExchangeStore, Identity, IdentityProvider};
use crate::web::{render_home, render_library, render_provider_notice, Notice, Shell};

const THREAD_COOKIE: &str = "qbx_thread";
const PERSIST_DEGRADED: &str =
    "Your last answer couldn't be saved to your library. It is still shown here.";
const STILL_ANSWERING: &str = "Still working on your previous question.";

/// The three collaborators the server is built from.
#[derive(Clone)]
pub struct Services {
    pub completion: Arc<dyn CompletionService>,
    pub store: Arc<dyn ExchangeStore>,
    pub identity: Arc<dyn IdentityProvider>,
}

impl Services {
    /// Build every collaborator from configuration.
    pub async fn from_config(config: &Config, user_override: Option<&str>) -> Result<Self> {
        Ok(Self {
            completion: create_completion_service(&config.completion)?,
            store: open_store(config).await?,
            identity: create_identity_provider(&config.identity, user_override)?,
        })
    }
}

// ============ Thread registry ============

struct SessionSlot {
    session: QuerySession,
    health: PersistenceHealth,
    last_used: Instant,
}

impl SessionSlot {
    fn new() -> Self {
        Self {
            session: QuerySession::new(),
            health: PersistenceHealth::default(),
            last_used: Instant::now(),
        }
    }
}

/// Live sessions keyed by `(owner, thread id)`.
///
/// Only a submission creates a slot. Idle slots expire after `ttl` and the
/// map never holds more than `cap` of them; slots with a request in flight
/// are never evicted.
struct SessionRegistry {
    slots: Mutex<HashMap<(String, String), SessionSlot>>,
    ttl: Duration,
    cap: usize,
}

impl SessionRegistry {
    fn new(ttl: Duration, cap: usize) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            ttl,
            cap,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<(String, String), SessionSlot>> {
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// A copy of the thread for rendering. Unknown threads read as fresh.
    fn snapshot(&self, owner: &str, thread: &str) -> (QuerySession, bool) {
        let slots = self.lock();
        match slots.get(&(owner.to_string(), thread.to_string())) {
            Some(slot) => (slot.session.clone(), slot.health.is_degraded()),
            None => (QuerySession::new(), false),
        }
    }

    /// Run `f` on the slot only if it exists.
    fn with_existing<R>(&self, owner: &str, thread: &str, f: impl FnOnce(&mut SessionSlot) -> R) -> Option<R> {
        let mut slots = self.lock();
        let slot = slots.get_mut(&(owner.to_string(), thread.to_string()))?;
        slot.last_used = Instant::now();
        Some(f(slot))
    }

    /// Run `f` on the slot, creating it if needed. Never held across an await.
    fn with_slot<R>(&self, owner: &str, thread: &str, f: impl FnOnce(&mut SessionSlot) -> R) -> R {
        let mut slots = self.lock();
        let key = (owner.to_string(), thread.to_string());
        if !slots.contains_key(&key) {
            self.evict(&mut slots);
        }
        let slot = slots.entry(key).or_insert_with(SessionSlot::new);
        slot.last_used = Instant::now();
        f(slot)
    }

    /// Drop expired slots, then the least recently used until one more fits.
    fn evict(&self, slots: &mut HashMap<(String, String), SessionSlot>) {
        let now = Instant::now();
        slots.retain(|_, slot| slot.session.is_pending() || now.duration_since(slot.last_used) < self.ttl);

        while slots.len() >= self.cap {
            let oldest = slots
                .iter()
                .filter(|(_, slot)| !slot.session.is_pending())
                .min_by_key(|(_, slot)| slot.last_used)
                .map(|(key, _)| key.clone());
            match oldest {
                Some(key) => {
                    debug!(owner = %key.0, thread = %key.1, "evicting idle thread");
                    slots.remove(&key);
                }
                None => break,
            }
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.lock().len()
    }
}

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    services: Services,
    sessions: Arc<SessionRegistry>,
}

/// Starts the server with collaborators built from `config`.
///
/// `user_override` forces a single static identity (the CLI `--user` flag).
pub async fn run_server(config: &Config, user_override: Option<&str>) -> Result<()> {
    let services = Services::from_config(config, user_override).await?;
    run_server_with_services(config, services).await
}

/// Starts the server with injected collaborators.
///
/// Binds to `[server].bind` and runs until the process is terminated.
pub async fn run_server_with_services(config: &Config, services: Services) -> Result<()> {
    let bind_addr = config.server.bind.clone();
    let app = router(config, services);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(address = %bind_addr, "QueryBox listening on http://{}", bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

/// The full application router.
pub fn router(config: &Config, services: Services) -> Router {
    let state = AppState {
        config: Arc::new(config.clone()),
        services,
        sessions: Arc::new(SessionRegistry::new(
            Duration::from_secs(config.server.session_ttl_secs),
            config.server.max_sessions,
        )),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api = Router::new()
        .route("/api/ask", post(handle_api_ask))
        .route("/api/library", get(handle_api_library))
        .layer(cors);

    Router::new()
        .route("/", get(handle_home))
        .route("/ask", post(handle_ask))
        .route("/library", get(handle_library))
        .route("/nav/toggle", post(handle_nav_toggle))
        .route("/sign-in", get(handle_sign_in))
        .route("/sign-up", get(handle_sign_up))
        .route("/user", get(handle_profile))
        .route("/health", get(handle_health))
        .merge(api)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into a JSON HTTP response.
struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn unauthorized() -> AppError {
    AppError {
        status: StatusCode::UNAUTHORIZED,
        code: "unauthorized",
        message: "sign in required".to_string(),
    }
}

fn busy() -> AppError {
    AppError {
        status: StatusCode::CONFLICT,
        code: "busy",
        message: SubmitRejection::InFlight.to_string(),
    }
}

fn internal(err: anyhow::Error) -> AppError {
    warn!(error = %format!("{:#}", err), "request failed");
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal",
        message: "internal error".to_string(),
    }
}

// ============ Request helpers ============

fn extract_cookie_value(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    let raw = headers.get(COOKIE)?.to_str().ok()?;
    for part in raw.split(';') {
        let mut pieces = part.trim().splitn(2, '=');
        let key = pieces.next()?.trim();
        let value = pieces.next().unwrap_or("").trim();
        if key == cookie_name && !value.is_empty() {
            return Some(value.to_string());
        }
    }
    None
}

fn session_cookie(name: &str, value: &str) -> String {
    format!("{name}={value}; Path=/; HttpOnly; SameSite=Lax")
}

fn append_set_cookie(response: &mut Response, cookie: &str) {
    if let Ok(value) = HeaderValue::from_str(cookie) {
        response.headers_mut().append(SET_COOKIE, value);
    }
}

/// The caller's thread id, and the cookie to set when it is new.
fn thread_id(headers: &HeaderMap) -> (String, Option<String>) {
    match extract_cookie_value(headers, THREAD_COOKIE) {
        Some(id) => (id, None),
        None => {
            let id = uuid::Uuid::new_v4().simple().to_string();
            let cookie = session_cookie(THREAD_COOKIE, &id);
            (id, Some(cookie))
        }
    }
}

fn nav_width(headers: &HeaderMap) -> NavWidth {
    NavWidth::from_cookie_value(extract_cookie_value(headers, NAV_COOKIE).as_deref())
}

/// Only same-site absolute paths are accepted as redirect targets.
fn safe_return_path(path: Option<&str>) -> &str {
    match path {
        Some(p) if p.starts_with('/') && !p.starts_with("//") && !p.contains('\\') => p,
        _ => "/",
    }
}

fn sign_in_redirect(path: &str) -> Response {
    let target = format!("/sign-in?redirect_url={}", urlencoding::encode(path));
    Redirect::to(&target).into_response()
}

/// Session gate for page routes.
async fn require_identity(state: &AppState, headers: &HeaderMap, path: &str) -> Result<Identity, Response> {
    match state.services.identity.authenticate(headers).await {
        Ok(Some(identity)) => Ok(identity),
        Ok(None) => Err(sign_in_redirect(path)),
        Err(e) => Err(internal(e).into_response()),
    }
}

/// Session gate for API routes.
async fn require_api_identity(state: &AppState, headers: &HeaderMap) -> Result<Identity, AppError> {
    match state.services.identity.authenticate(headers).await {
        Ok(Some(identity)) => Ok(identity),
        Ok(None) => Err(unauthorized()),
        Err(e) => Err(internal(e)),
    }
}

/// Run one turn for `(owner, thread)`: begin under the lock, call the
/// completion endpoint without it, settle under the lock, then persist.
async fn submit_turn(
    state: &AppState,
    owner: &Identity,
    thread: &str,
    question: &str,
) -> Result<Settlement, SubmitRejection> {
    if question.trim().is_empty() {
        return Err(SubmitRejection::EmptyDraft);
    }
    let ticket = state
        .sessions
        .with_slot(&owner.email, thread, |slot| slot.session.begin(question))?;

    let outcome = request_answer(state.services.completion.as_ref(), ticket.prompt()).await;

    let (settlement, health) = state.sessions.with_slot(&owner.email, thread, |slot| {
        (slot.session.settle(&ticket, outcome), slot.health.clone())
    });

    if let Some(exchange) = settlement.exchange_for(&owner.email) {
        spawn_persist(state.services.store.clone(), exchange, health);
    }
    Ok(settlement)
}

fn render_thread(
    state: &AppState,
    headers: &HeaderMap,
    identity: &Identity,
    thread: &str,
    draft: Option<&str>,
    notice: Option<Notice<'_>>,
) -> String {
    let (mut session, degraded) = state.sessions.snapshot(&identity.email, thread);
    if let Some(draft) = draft {
        session.set_draft(draft);
    }
    let notice = notice.or(if degraded {
        Some(Notice {
            text: PERSIST_DEGRADED,
            is_error: true,
        })
    } else {
        None
    });
    let shell = Shell {
        path: "/",
        identity,
        nav: nav_width(headers),
        profile_url: state.services.identity.profile_url(),
    };
    render_home(&shell, &session, notice)
}

// ============ GET / ============

#[derive(Debug, Deserialize)]
struct HomeParams {
    new: Option<String>,
    suggest: Option<String>,
}

async fn handle_home(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<HomeParams>,
) -> Response {
    let identity = match require_identity(&state, &headers, "/").await {
        Ok(identity) => identity,
        Err(redirect) => return redirect,
    };
    let (thread, new_cookie) = thread_id(&headers);

    if params.new.as_deref() == Some("true") {
        state.sessions.with_existing(&identity.email, &thread, |slot| {
            slot.session.reset();
            slot.health.clear();
        });
    }
    let prefill = params.suggest.as_deref().and_then(suggestion_prompt);

    let body = render_thread(&state, &headers, &identity, &thread, prefill.as_deref(), None);
    let mut response = Html(body).into_response();
    if let Some(cookie) = new_cookie {
        append_set_cookie(&mut response, &cookie);
    }
    response
}

// ============ POST /ask ============

#[derive(Debug, Deserialize)]
struct AskForm {
    #[serde(default)]
    question: String,
}

async fn handle_ask(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<AskForm>,
) -> Response {
    let identity = match require_identity(&state, &headers, "/").await {
        Ok(identity) => identity,
        Err(redirect) => return redirect,
    };
    let (thread, new_cookie) = thread_id(&headers);

    let (status, notice) = match submit_turn(&state, &identity, &thread, &form.question).await {
        Ok(_) | Err(SubmitRejection::EmptyDraft) => (StatusCode::OK, None),
        Err(SubmitRejection::InFlight) => (
            StatusCode::CONFLICT,
            Some(Notice {
                text: STILL_ANSWERING,
                is_error: false,
            }),
        ),
    };

    let body = render_thread(&state, &headers, &identity, &thread, None, notice);
    let mut response = (status, Html(body)).into_response();
    if let Some(cookie) = new_cookie {
        append_set_cookie(&mut response, &cookie);
    }
    response
}

// ============ POST /api/ask ============

#[derive(Debug, Deserialize)]
struct ApiAskRequest {
    question: String,
}

#[derive(Debug, Serialize)]
struct ApiAskResponse {
    /// `None` when the request failed and the apology was shown instead.
    answer: Option<String>,
    transcript: Vec<Turn>,
}

async fn handle_api_ask(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ApiAskRequest>,
) -> Result<Response, AppError> {
    let identity = require_api_identity(&state, &headers).await?;
    let (thread, new_cookie) = thread_id(&headers);

    let settlement = match submit_turn(&state, &identity, &thread, &request.question).await {
        Ok(settlement) => settlement,
        Err(SubmitRejection::EmptyDraft) => return Err(bad_request("question must not be empty")),
        Err(SubmitRejection::InFlight) => return Err(busy()),
    };

    let answer = match settlement {
        Settlement::Answered { answer, .. } | Settlement::Detached { answer, .. } => Some(answer),
        Settlement::Failed | Settlement::Stale => None,
    };
    let (session, _) = state.sessions.snapshot(&identity.email, &thread);
    let transcript = session.transcript().to_vec();

    let mut response = Json(ApiAskResponse { answer, transcript }).into_response();
    if let Some(cookie) = new_cookie {
        append_set_cookie(&mut response, &cookie);
    }
    Ok(response)
}

// ============ GET /library ============

#[derive(Debug, Deserialize)]
struct LibraryParams {
    #[serde(default)]
    q: String,
}

async fn load_page(state: &AppState, identity: &Identity, term: &str) -> LibraryPage {
    let mut browser = HistoryBrowser::new();
    browser
        .load(state.services.store.as_ref(), &identity.email)
        .await;
    LibraryPage::build(
        &browser,
        term,
        state.config.library.truncate_chars,
        state.config.library.utc_offset_minutes,
    )
}

async fn handle_library(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<LibraryParams>,
) -> Response {
    let identity = match require_identity(&state, &headers, "/library").await {
        Ok(identity) => identity,
        Err(redirect) => return redirect,
    };
    let page = load_page(&state, &identity, &params.q).await;
    let shell = Shell {
        path: "/library",
        identity: &identity,
        nav: nav_width(&headers),
        profile_url: state.services.identity.profile_url(),
    };
    Html(render_library(&shell, &page)).into_response()
}

async fn handle_api_library(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<LibraryParams>,
) -> Result<Json<LibraryPage>, AppError> {
    let identity = require_api_identity(&state, &headers).await?;
    Ok(Json(load_page(&state, &identity, &params.q).await))
}

// ============ POST /nav/toggle ============

#[derive(Debug, Deserialize)]
struct ToggleForm {
    return_to: Option<String>,
}

async fn handle_nav_toggle(headers: HeaderMap, Form(form): Form<ToggleForm>) -> Response {
    let width = nav_width(&headers).toggled();
    let mut response = Redirect::to(safe_return_path(form.return_to.as_deref())).into_response();
    append_set_cookie(
        &mut response,
        &session_cookie(NAV_COOKIE, width.as_cookie_value()),
    );
    response
}

// ============ Identity-provider surfaces ============

#[derive(Debug, Deserialize)]
struct RedirectParams {
    redirect_url: Option<String>,
}

fn provider_surface(url: Option<&str>, heading: &str, redirect_url: Option<&str>) -> Response {
    match url {
        Some(url) => Redirect::to(url).into_response(),
        None => Html(render_provider_notice(heading, redirect_url)).into_response(),
    }
}

async fn handle_sign_in(
    State(state): State<AppState>,
    Query(params): Query<RedirectParams>,
) -> Response {
    let redirect_url = params.redirect_url.as_deref().map(|p| safe_return_path(Some(p)));
    provider_surface(state.services.identity.sign_in_url(), "Sign in", redirect_url)
}

async fn handle_sign_up(State(state): State<AppState>) -> Response {
    provider_surface(state.services.identity.sign_up_url(), "Sign up", None)
}

async fn handle_profile(State(state): State<AppState>) -> Response {
    provider_surface(state.services.identity.profile_url(), "Your profile", None)
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
