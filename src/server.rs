//! JSON HTTP API.
//!
//! The contract surface a chat UI calls. Rendering, cookies, and login all
//! live in that external layer; this server only speaks JSON and trusts
//! the identity it is handed.
//!
//! # Endpoints
//!
//! | Method   | Path            | Description                                |
//! |----------|-----------------|--------------------------------------------|
//! | `GET`    | `/health`       | Health check (returns version)             |
//! | `POST`   | `/process`      | Ingest the knowledge base, build the index |
//! | `POST`   | `/ask`          | Answer a question, returns updated session |
//! | `GET`    | `/chats`        | List saved conversations for the owner     |
//! | `GET`    | `/chats/{name}` | Load a saved conversation                  |
//! | `POST`   | `/chats/{name}` | Save the supplied session under `name`     |
//! | `DELETE` | `/chats/{name}` | Delete a saved conversation                |
//!
//! # Headers
//!
//! - `x-api-key` — the caller's Gemini key, required for `/process` and
//!   `/ask`. Forwarded to the external services, never persisted.
//! - `x-owner` — conversation namespace, defaults to `local`. Supplied by
//!   the authenticating layer in front of this server.
//!
//! # Session threading
//!
//! `/ask` and the conversation endpoints carry the full session context in
//! the request and response bodies — the server holds no per-user state
//! between requests.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "no conversation named 'x'" } }
//! ```
//!
//! Codes: `bad_request` (400), `missing_api_key` (400), `not_found` (404),
//! `upstream_error` (502), `internal` (500).

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::chat::{ChatError, ChatStore};
use crate::config::Config;
use crate::models::ChatSession;
use crate::session::{self, ProcessOutcome};

#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    store: Arc<ChatStore>,
}

/// Start the HTTP server on `[server].bind`. Runs until the process is
/// terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let state = AppState {
        store: Arc::new(ChatStore::new(&config.conversations.root)),
        config: Arc::new(config.clone()),
    };

    let app = Router::new()
        .route("/health", get(health))
        .route("/process", axum::routing::post(process))
        .route("/ask", axum::routing::post(ask))
        .route("/chats", get(list_chats))
        .route(
            "/chats/{name}",
            get(load_chat).post(save_chat).delete(delete_chat),
        )
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    println!("Listening on http://{}", bind_addr);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn process(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let api_key = match require_api_key(&headers) {
        Ok(key) => key,
        Err(resp) => return resp,
    };

    match session::process_knowledge_base(&state.config, &api_key).await {
        Ok(ProcessOutcome::NoDocuments) => Json(json!({
            "status": "no_documents",
            "message": "No PDF files found in the knowledge base directory.",
        }))
        .into_response(),
        Ok(ProcessOutcome::NoText) => Json(json!({
            "status": "no_text",
            "message": "Could not extract text from the PDF files.",
        }))
        .into_response(),
        Ok(ProcessOutcome::Indexed {
            documents,
            chunks,
            skipped,
        }) => Json(json!({
            "status": "indexed",
            "documents": documents,
            "chunks": chunks,
            "skipped": skipped,
        }))
        .into_response(),
        Err(e) => error_response(
            StatusCode::BAD_GATEWAY,
            "upstream_error",
            &format!("{e:#}"),
        ),
    }
}

#[derive(Deserialize)]
struct AskRequest {
    question: String,
    #[serde(default)]
    session: ChatSession,
}

async fn ask(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<AskRequest>,
) -> Response {
    let api_key = match require_api_key(&headers) {
        Ok(key) => key,
        Err(resp) => return resp,
    };
    let owner = owner_from(&headers);

    if req.question.trim().is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            "bad_request",
            "question must not be empty",
        );
    }

    let mut session = req.session;
    match session::ask(
        &state.config,
        &state.store,
        &mut session,
        &owner,
        &api_key,
        &req.question,
    )
    .await
    {
        Ok(reply) => Json(json!({ "reply": reply, "session": session })).into_response(),
        Err(e) => map_chat_error_or_internal(e),
    }
}

async fn list_chats(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let owner = owner_from(&headers);
    match state.store.list(&owner) {
        Ok(names) => Json(json!({ "conversations": names })).into_response(),
        Err(e) => chat_error_response(e),
    }
}

async fn load_chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> Response {
    let owner = owner_from(&headers);
    match session::load_conversation(&state.store, &owner, &name) {
        Ok(session) => Json(json!({ "session": session })).into_response(),
        Err(e) => chat_error_response(e),
    }
}

#[derive(Deserialize)]
struct SaveChatRequest {
    #[serde(default)]
    session: ChatSession,
}

async fn save_chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(name): Path<String>,
    Json(req): Json<SaveChatRequest>,
) -> Response {
    let owner = owner_from(&headers);
    let mut session = req.session;
    match session::save_conversation(&state.store, &mut session, &owner, &name) {
        Ok(()) => Json(json!({ "session": session })).into_response(),
        Err(e) => chat_error_response(e),
    }
}

async fn delete_chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> Response {
    let owner = owner_from(&headers);
    let mut session = ChatSession::default();
    match session::delete_conversation(&state.store, &mut session, &owner, &name) {
        Ok(()) => Json(json!({ "deleted": name })).into_response(),
        Err(e) => chat_error_response(e),
    }
}

/// Owner namespace from the `x-owner` header; the authenticating layer in
/// front of this server sets it. Absent header means the single-operator
/// default.
fn owner_from(headers: &HeaderMap) -> String {
    headers
        .get("x-owner")
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .unwrap_or("local")
        .to_string()
}

fn require_api_key(headers: &HeaderMap) -> Result<String, Response> {
    headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .ok_or_else(|| {
            error_response(
                StatusCode::BAD_REQUEST,
                "missing_api_key",
                "supply your Gemini API key in the x-api-key header",
            )
        })
}

fn chat_error_response(e: ChatError) -> Response {
    match &e {
        ChatError::NotFound { .. } => {
            error_response(StatusCode::NOT_FOUND, "not_found", &e.to_string())
        }
        ChatError::InvalidName(_) => {
            error_response(StatusCode::BAD_REQUEST, "bad_request", &e.to_string())
        }
        _ => error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal", &e.to_string()),
    }
}

fn map_chat_error_or_internal(e: anyhow::Error) -> Response {
    match e.downcast::<ChatError>() {
        Ok(chat_err) => chat_error_response(chat_err),
        Err(other) => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal",
            &format!("{other:#}"),
        ),
    }
}

fn error_response(status: StatusCode, code: &str, message: &str) -> Response {
    (
        status,
        Json(json!({ "error": { "code": code, "message": message } })),
    )
        .into_response()
}
