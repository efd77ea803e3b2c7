use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Context;
use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, Request, State},
    http::{HeaderValue, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Serialize;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

use tdee_core::db::Database;
use tdee_core::identity::validate_user_id;
use tdee_core::models::{StateDocument, validate_document};

const BODY_LIMIT: usize = 50 * 1024 * 1024; // 50 MB

#[derive(Clone)]
pub(crate) struct AppState {
    db: Arc<Mutex<Database>>,
    api_key: Option<String>,
}

impl AppState {
    pub(crate) fn new(db: Database, api_key: Option<String>) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
            api_key,
        }
    }
}

fn document_key(uid: &str) -> String {
    format!("user:{uid}")
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// --- Error handling ---

enum ApiError {
    NotFound(String),
    BadRequest(String),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Internal(err) => {
                tracing::error!(error = %format!("{err:#}"), "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

// --- Middleware ---

async fn require_auth(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if let Some(ref expected_key) = state.api_key {
        let authorized = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .is_some_and(|token| token == expected_key);

        if !authorized {
            return (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse {
                    error: "Invalid or missing API key".to_string(),
                }),
            )
                .into_response();
        }
    }
    next.run(request).await
}

async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        "content-security-policy",
        HeaderValue::from_static("default-src 'none'"),
    );
    response
}

// --- Handlers ---

fn checked_uid(uid: &str) -> Result<(), ApiError> {
    validate_user_id(uid).map_err(|e| ApiError::BadRequest(format!("{e}")))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn get_document(
    State(state): State<AppState>,
    Path(uid): Path<String>,
) -> Result<Json<StateDocument>, ApiError> {
    checked_uid(&uid)?;

    let raw = {
        let db = state.db.lock().unwrap_or_else(PoisonError::into_inner);
        db.get_value(&document_key(&uid)).context("database error")?
    };
    let raw = raw.ok_or_else(|| ApiError::NotFound(format!("No document for user '{uid}'")))?;

    let doc: StateDocument =
        serde_json::from_str(&raw).context("stored document is corrupt")?;
    Ok(Json(doc))
}

/// Whole-document overwrite. The last write wins.
async fn put_document(
    State(state): State<AppState>,
    Path(uid): Path<String>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    checked_uid(&uid)?;

    let doc: StateDocument = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid document: {e}")))?;
    validate_document(&doc).map_err(|e| ApiError::BadRequest(format!("{e}")))?;

    let json = serde_json::to_string(&doc).context("failed to serialize document")?;
    {
        let db = state.db.lock().unwrap_or_else(PoisonError::into_inner);
        db.put_value(&document_key(&uid), &json)
            .context("failed to store document")?;
    }
    tracing::info!(uid, weeks = doc.week_data.len(), "stored document");
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) fn build_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/users/{uid}/document",
            get(get_document).put(put_document),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .route("/api/health", get(health))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(middleware::from_fn(security_headers))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// --- Server startup ---

pub async fn start_server(
    db: Database,
    port: u16,
    bind: &str,
    api_key: Option<String>,
) -> anyhow::Result<()> {
    let app = build_router(AppState::new(db, api_key.clone()));

    if let Some(ref key) = api_key {
        eprintln!(
            "API key: {}...{} (see api_key file in data directory)",
            &key[..4.min(key.len())],
            &key[key.len().saturating_sub(4)..],
        );
    } else {
        eprintln!("Warning: Authentication disabled (--no-auth). API is open to anyone.");
    }

    if bind != "127.0.0.1" && bind != "localhost" && api_key.is_none() {
        eprintln!(
            "Warning: Listening on {bind} with no authentication. Any device on your network can access this API."
        );
    }

    let listener = tokio::net::TcpListener::bind(format!("{bind}:{port}"))
        .await
        .with_context(|| format!("failed to bind {bind}:{port}"))?;
    eprintln!("Listening on http://{bind}:{port}");
    tracing::info!(bind, port, "document server started");
    axum::serve(listener, app).await?;

    Ok(())
}
