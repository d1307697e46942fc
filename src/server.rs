//! Axum router construction and protocol route mapping.
//!
//! Terraform drives the backend with the non-standard LOCK and UNLOCK
//! methods alongside GET/POST/DELETE, all on `/states/{name}`.  Axum's
//! method routers only cover the standard verbs, so a single `any` route
//! per path dispatches internally on the method name.

use axum::{
    body::Body,
    extract::{DefaultBodyLimit, Path, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{any, get},
    Router,
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::errors::ApiError;
use crate::AppState;

/// Largest accepted LOCK/UNLOCK body.  Lock info is a small metadata
/// document; state blobs themselves stream and are not limited.
const MAX_LOCK_INFO_BYTES: usize = 64 * 1024;

/// Build the axum [`Router`] with all backend routes.
///
/// The returned router is ready to be passed to `axum::serve`.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check endpoint (not part of the Terraform protocol).
        .route("/health", get(health_check))
        // Collection listing.
        .route("/states", get(handle_list))
        // Per-state operations, including the non-standard methods.
        .route("/states/:name", any(handle_state))
        .with_state(state.clone())
        // Layer ordering: inner layers run first, outer layers wrap them.
        .layer(middleware::from_fn_with_state(state, basic_auth_middleware))
        .layer(TraceLayer::new_for_http())
        // State files can be arbitrarily large; the pipeline streams them.
        .layer(DefaultBodyLimit::disable())
}

// -- Basic auth middleware -----------------------------------------------------

/// Paths that bypass authentication.
const AUTH_SKIP_PATHS: &[&str] = &["/health"];

/// Constant-time string comparison to prevent timing attacks on
/// credential checks.
fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Optional HTTP basic authentication, enabled by configuring
/// `auth.username`.
async fn basic_auth_middleware(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    let auth = &state.config.auth;
    if auth.username.is_empty() || AUTH_SKIP_PATHS.contains(&req.uri().path()) {
        return next.run(req).await;
    }

    let expected = format!(
        "Basic {}",
        STANDARD.encode(format!("{}:{}", auth.username, auth.password))
    );
    let provided = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    if provided.is_some_and(|header| constant_time_eq(header, &expected)) {
        next.run(req).await
    } else {
        warn!(path = req.uri().path(), "rejected unauthenticated request");
        (
            StatusCode::UNAUTHORIZED,
            [(header::WWW_AUTHENTICATE, "Basic realm=\"statevault\"")],
        )
            .into_response()
    }
}

// -- Health check --------------------------------------------------------------

/// `GET /health` -- returns `{"status":"ok"}` with 200 OK.
async fn health_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "application/json")],
        r#"{"status":"ok"}"#,
    )
}

// -- Dispatch ------------------------------------------------------------------

/// `GET /states` -- list all known states.
async fn handle_list(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    crate::handlers::state::list(state).await
}

/// Dispatch `/states/{name}` on the request method:
/// - `POST` -> store
/// - `GET` -> retrieve
/// - `DELETE` -> delete
/// - `LOCK` -> lock
/// - `UNLOCK` -> unlock
async fn handle_state(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    req: Request,
) -> Result<Response, ApiError> {
    match req.method().as_str() {
        "POST" => crate::handlers::state::store(state, &name, req.into_body()).await,
        "GET" => crate::handlers::state::retrieve(state, &name).await,
        "DELETE" => crate::handlers::state::delete(state, &name).await,
        "LOCK" => {
            let body = read_lock_body(req.into_body()).await?;
            crate::handlers::lock::lock(state, &name, body).await
        }
        "UNLOCK" => {
            let body = read_lock_body(req.into_body()).await?;
            crate::handlers::lock::unlock(state, &name, body).await
        }
        method => Ok((
            StatusCode::METHOD_NOT_ALLOWED,
            format!("method {method} is not part of the state backend protocol"),
        )
            .into_response()),
    }
}

async fn read_lock_body(body: Body) -> Result<axum::body::Bytes, ApiError> {
    axum::body::to_bytes(body, MAX_LOCK_INFO_BYTES)
        .await
        .map_err(|e| ApiError::BadRequest(format!("unreadable lock info body: {e}")))
}

// -- Tests ---------------------------------------------------------------------
