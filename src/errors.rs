//! Protocol-level error types.
//!
//! Every variant maps to a Terraform-backend status code.  The enum
//! implements [`axum::response::IntoResponse`] so handlers can simply
//! return `Err(ApiError::AlreadyLocked(..))`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use thiserror::Error;

use crate::models::LockInfo;

/// Errors surfaced by the protocol handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    /// LOCK was requested but the state is already locked by another holder.
    #[error("state is locked by {}", .0.id)]
    AlreadyLocked(LockInfo),

    /// UNLOCK carried a lock ID that does not match the current holder.
    #[error("lock is held by {}", .0.id)]
    LockConflict(LockInfo),

    /// The request body could not be parsed.
    #[error("{0}")]
    BadRequest(String),

    /// Any other collaborator or pipeline failure.
    #[error("internal error")]
    Internal {
        #[source]
        source: anyhow::Error,
        /// When true, the response body echoes the error details.
        verbose: bool,
    },
}

impl ApiError {
    /// Return the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::AlreadyLocked(_) => StatusCode::LOCKED,
            ApiError::LockConflict(_) => StatusCode::CONFLICT,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// JSON body of a 500 response.  `details` is only present when the
/// `show_error` config flag is set.
#[derive(serde::Serialize)]
struct ErrorBody {
    status: u16,
    title: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match self {
            // Lock conflicts answer with the current holder's info so the
            // client can report who owns the lock.
            ApiError::AlreadyLocked(info) | ApiError::LockConflict(info) => {
                (status, Json(info)).into_response()
            }
            ApiError::BadRequest(message) => (
                status,
                Json(ErrorBody {
                    status: status.as_u16(),
                    title: "Bad Request",
                    details: Some(message),
                }),
            )
                .into_response(),
            ApiError::Internal { source, verbose } => {
                tracing::error!("request failed: {source:#}");
                (
                    status,
                    Json(ErrorBody {
                        status: status.as_u16(),
                        title: "Internal Server Error",
                        details: verbose.then(|| format!("{source:#}")),
                    }),
                )
                    .into_response()
            }
        }
    }
}
