//! HTTP surface.
//!
//! All routes live under `/v2` and share one [`AppState`]. A per-IP rate
//! limiter runs as middleware in front of every route; admin routes check a
//! bearer token on top. Error bodies come from [`ApiError`].

use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::body::Body;
use axum::extract::{ConnectInfo, Query, State};
use axum::http::{HeaderMap, HeaderValue, Method, Request};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use subtle::ConstantTimeEq;
use tower_http::cors::CorsLayer;

use crate::auth::normalize::normalize_name;
use crate::chat::guardrails::policy_excerpt;
use crate::chat::ChatEngine;
use crate::config::CairnConfig;
use crate::error::ApiError;
use crate::lit::{index, search};
use crate::profile;
use crate::providers::Embedder;
use crate::rate_limit;
use crate::session::{self, Mode, Session};
use crate::store::KvStore;
use crate::users::{self, UserUpsert};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn KvStore>,
    pub engine: Arc<ChatEngine>,
    pub embedder: Option<Arc<dyn Embedder>>,
    pub config: Arc<CairnConfig>,
}

/// Shared setup: open the store, build providers, load the guardrail policy,
/// and assemble the chat engine.
pub fn build_state(config: CairnConfig) -> Result<AppState> {
    let store = crate::store::open(&config.store, &config.resolved_db_path())?;
    tracing::info!(backend = %config.store.backend, "store ready");

    let model = crate::providers::create_chat_model(&config.model)?;
    let embedder = crate::providers::create_embedder(&config)?;

    let policy_path = if config.session.policy_path.is_empty() {
        None
    } else {
        Some(crate::config::expand_tilde(&config.session.policy_path))
    };
    let policy = crate::chat::guardrails::load_policy(policy_path.as_deref())?;

    let config = Arc::new(config);
    let engine = Arc::new(ChatEngine {
        store: store.clone(),
        model,
        embedder: embedder.clone(),
        policy,
        session_cfg: config.session.clone(),
        retrieval_cfg: config.retrieval.clone(),
    });

    Ok(AppState {
        store,
        engine,
        embedder,
        config,
    })
}

/// Build the `/v2` router over a prepared state. Split out so integration
/// tests can serve an in-memory instance.
pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config);

    Router::new()
        .route("/v2/auth/call", post(auth_call))
        .route("/v2/auth/verify-name", post(auth_verify_name))
        .route("/v2/session/mode", post(session_mode))
        .route("/v2/chat/send", post(chat_send))
        .route("/v2/chat/history", get(chat_history))
        .route("/v2/chat/voice/start", post(voice_start))
        .route("/v2/chat/voice/stop", post(voice_stop))
        .route(
            "/v2/memory/profile",
            get(memory_profile_get).patch(memory_profile_patch),
        )
        .route("/v2/memory/notes", get(memory_notes_get).post(memory_notes_add))
        .route("/v2/lit/docs", get(lit_docs))
        .route("/v2/lit/search", get(lit_search))
        .route("/v2/admin/lit/reindex", post(admin_reindex))
        .route("/v2/admin/user", post(admin_user))
        .route("/v2/health", get(health))
        .route("/v2/config", get(config_info))
        .route("/v2/guardrails", get(guardrails_info))
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit_mw))
        .layer(cors)
        .with_state(state)
}

fn cors_layer(config: &CairnConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .server
        .allowed_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::OPTIONS])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::AUTHORIZATION,
        ])
        .max_age(std::time::Duration::from_secs(600))
}

/// Start serving until ctrl-c.
pub async fn run(config: CairnConfig, state: AppState) -> Result<()> {
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let router = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding {bind_addr}"))?;
    tracing::info!(addr = %bind_addr, "cairn listening");

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "ctrl-c handler failed");
        }
        tracing::info!("shutting down");
    })
    .await?;

    Ok(())
}

async fn rate_limit_mw(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let ip = rate_limit::client_ip(request.headers(), peer);
    let limit = state.config.server.rate_limit_per_minute as i64;
    match rate_limit::check(state.store.as_ref(), &ip, limit, 60) {
        Ok(()) => next.run(request).await,
        Err(e) => e.into_response(),
    }
}

fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let expected = state.config.server.admin_token.as_bytes();
    if expected.is_empty() {
        return Err(ApiError::AdminDisabled);
    }
    let presented = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or("");
    if presented.len() != expected.len()
        || !bool::from(presented.as_bytes().ct_eq(expected))
    {
        return Err(ApiError::Unauthorised);
    }
    Ok(())
}

// ── auth ─────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct CallRequest {
    number: String,
}

async fn auth_call(
    State(state): State<AppState>,
    Json(body): Json<CallRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    match users::lookup_by_number(state.store.as_ref(), &body.number)? {
        Some(user_id) => Ok(Json(json!({
            "user_id": user_id,
            "need_name_verification": true,
        }))),
        None => Ok(Json(json!({ "need_name_registration": true }))),
    }
}

#[derive(Deserialize)]
struct VerifyNameRequest {
    number: String,
    name: String,
}

async fn auth_verify_name(
    State(state): State<AppState>,
    Json(body): Json<VerifyNameRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let store = state.store.as_ref();
    if let Some(user_id) = users::lookup_by_number(store, &body.number)? {
        let stored = users::get_profile(store, &user_id)?;
        if let Some(name) = stored.get("name") {
            if normalize_name(name) != normalize_name(&body.name) {
                return Err(ApiError::Mismatch);
            }
        }
    }
    // Rewrites the profile hash on every verify, so legacy records missing
    // fields heal themselves.
    let user_id = users::register_contact(store, &body.number, &body.name)?;

    let session_id = session::new_session_id();
    let sess = Session::new(user_id.clone(), state.config.session.ttl_secs);
    session::save_session(store, &session_id, &sess, state.config.session.ttl_secs)?;

    Ok(Json(json!({
        "user_id": user_id,
        "session_id": session_id,
        "mode": sess.mode.as_str(),
    })))
}

// ── session ──────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct ModeRequest {
    session_id: String,
    mode: String,
}

async fn session_mode(
    State(state): State<AppState>,
    Json(body): Json<ModeRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let store = state.store.as_ref();
    let mode = Mode::from_str(&body.mode).map_err(ApiError::BadRequest)?;
    let mut sess =
        session::load_session(store, &body.session_id)?.ok_or(ApiError::BadSession)?;
    sess.mode = mode;
    session::save_session(store, &body.session_id, &sess, state.config.session.ttl_secs)?;
    Ok(Json(json!({
        "session_id": body.session_id,
        "mode": mode.as_str(),
    })))
}

// ── chat ─────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct SendRequest {
    session_id: String,
    message: String,
}

async fn chat_send(
    State(state): State<AppState>,
    Json(body): Json<SendRequest>,
) -> Result<Json<crate::chat::TurnReply>, ApiError> {
    let reply = state.engine.handle_turn(&body.session_id, &body.message).await?;
    Ok(Json(reply))
}

#[derive(Deserialize)]
struct SessionQuery {
    session_id: String,
}

/// Newest history entries served to clients; storage keeps up to 50.
const HISTORY_VIEW_CAP: usize = 25;

async fn chat_history(
    State(state): State<AppState>,
    Query(q): Query<SessionQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let sess = session::load_session(state.store.as_ref(), &q.session_id)?
        .ok_or(ApiError::BadSession)?;
    let start = sess.history.len().saturating_sub(HISTORY_VIEW_CAP);
    Ok(Json(json!({
        "session_id": q.session_id,
        "history": &sess.history[start..],
    })))
}

#[derive(Deserialize)]
struct VoiceStartRequest {
    session_id: String,
    voice: String,
}

async fn voice_start(
    State(state): State<AppState>,
    Json(body): Json<VoiceStartRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if !state.config.server.allowed_voices.contains(&body.voice) {
        return Err(ApiError::BadVoice);
    }
    let store = state.store.as_ref();
    let mut sess =
        session::load_session(store, &body.session_id)?.ok_or(ApiError::BadSession)?;
    sess.mode = Mode::Voice;
    session::save_session(store, &body.session_id, &sess, state.config.session.ttl_secs)?;
    // The realtime broker is external; this token is only a correlation handle.
    Ok(Json(json!({
        "voice": body.voice,
        "voice_token": format!("{}-voice", body.session_id),
    })))
}

async fn voice_stop(
    State(state): State<AppState>,
    Json(body): Json<SessionQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let store = state.store.as_ref();
    // An expired session here is fine; the caller is hanging up anyway.
    if let Some(mut sess) = session::load_session(store, &body.session_id)? {
        sess.mode = Mode::Text;
        session::save_session(store, &body.session_id, &sess, state.config.session.ttl_secs)?;
    }
    Ok(Json(json!({ "mode": "text" })))
}

// ── memory ───────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct UserQuery {
    user_id: String,
}

fn require_user(state: &AppState, user_id: &str) -> Result<(), ApiError> {
    if users::get_profile(state.store.as_ref(), user_id)?.is_empty() {
        return Err(ApiError::NoSuchUser);
    }
    Ok(())
}

async fn memory_profile_get(
    State(state): State<AppState>,
    Query(q): Query<UserQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_user(&state, &q.user_id)?;
    let memory = profile::load_memory(state.store.as_ref(), &q.user_id)?;
    Ok(Json(json!({
        "user_id": q.user_id,
        "profile": memory.profile,
        "last_topics": memory.last_topics,
        "last_contact": memory.last_contact,
    })))
}

#[derive(Deserialize)]
struct ProfilePatchRequest {
    user_id: String,
    patch: std::collections::BTreeMap<String, String>,
}

async fn memory_profile_patch(
    State(state): State<AppState>,
    Json(body): Json<ProfilePatchRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_user(&state, &body.user_id)?;
    let store = state.store.as_ref();
    let mut memory = profile::load_memory(store, &body.user_id)?;
    memory.apply_patch(&body.patch);
    profile::save_memory(store, &body.user_id, &memory)?;
    Ok(Json(json!({
        "user_id": body.user_id,
        "profile": memory.profile,
    })))
}

async fn memory_notes_get(
    State(state): State<AppState>,
    Query(q): Query<UserQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_user(&state, &q.user_id)?;
    let memory = profile::load_memory(state.store.as_ref(), &q.user_id)?;
    Ok(Json(json!({
        "user_id": q.user_id,
        "notes": memory.notes,
    })))
}

#[derive(Deserialize)]
struct NoteRequest {
    user_id: String,
    note: String,
}

async fn memory_notes_add(
    State(state): State<AppState>,
    Json(body): Json<NoteRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_user(&state, &body.user_id)?;
    let store = state.store.as_ref();
    let mut memory = profile::load_memory(store, &body.user_id)?;
    memory.add_note(&body.note, state.config.session.notes_cap);
    profile::save_memory(store, &body.user_id, &memory)?;
    Ok(Json(json!({
        "user_id": body.user_id,
        "count": memory.notes.len(),
    })))
}

// ── literature ───────────────────────────────────────────────────────────

async fn lit_docs(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let docs = index::list_documents(state.store.as_ref())?;
    Ok(Json(json!({ "documents": docs })))
}

#[derive(Deserialize)]
struct SearchQuery {
    q: String,
    k: Option<usize>,
}

async fn lit_search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let k = query.k.unwrap_or(state.config.retrieval.top_k);
    let results = search::search(
        state.store.as_ref(),
        state.embedder.as_deref(),
        &query.q,
        k,
    )
    .await?;
    Ok(Json(json!({ "results": results })))
}

// ── admin ────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct ReindexQuery {
    #[serde(default)]
    overwrite: bool,
}

async fn admin_reindex(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(q): Query<ReindexQuery>,
) -> Result<Json<index::IngestStats>, ApiError> {
    require_admin(&state, &headers)?;
    let dir = crate::config::expand_tilde(&state.config.retrieval.lit_dir);
    let stats = index::ingest_dir(
        state.store.as_ref(),
        state.embedder.as_deref(),
        &dir,
        q.overwrite,
        state.config.retrieval.chunk_words,
    )
    .await?;
    Ok(Json(stats))
}

async fn admin_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<UserUpsert>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_admin(&state, &headers)?;
    if body.name.trim().is_empty() {
        return Err(ApiError::BadRequest("name must not be empty".into()));
    }
    let (user_id, status) = users::upsert_user(state.store.as_ref(), &body)?;
    Ok(Json(json!({
        "user_id": user_id,
        "status": status.as_str(),
    })))
}

// ── introspection ────────────────────────────────────────────────────────

async fn health(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    state.store.ping()?;
    Ok(Json(json!({ "status": "ok" })))
}

async fn config_info(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "voices": state.config.server.allowed_voices,
    }))
}

async fn guardrails_info(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "policy": policy_excerpt(&state.engine.policy),
    }))
}
