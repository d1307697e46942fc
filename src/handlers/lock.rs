//! LOCK / UNLOCK handlers.

use axum::body::Bytes;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::sync::Arc;
use tracing::debug;

use crate::errors::ApiError;
use crate::handlers::state::internal;
use crate::lock::{LockOutcome, UnlockOutcome};
use crate::models::LockInfo;
use crate::AppState;

fn parse_lock_info(body: &Bytes) -> Result<LockInfo, ApiError> {
    serde_json::from_slice(body)
        .map_err(|e| ApiError::BadRequest(format!("invalid lock info: {e}")))
}

/// `LOCK /states/{name}` -- take the lock; 423 with the holder's info when
/// already locked.
pub async fn lock(state: Arc<AppState>, name: &str, body: Bytes) -> Result<Response, ApiError> {
    let path = state.config.resource_path(name);

    // Lock state is checked before the body is parsed, so a conflicting
    // request answers 423 even when its lock info is malformed.
    if let Some(current) = state
        .locks
        .is_locked(&path)
        .await
        .map_err(|e| internal(&state, e))?
    {
        debug!(name, holder = %current.id, "already locked");
        return Err(ApiError::AlreadyLocked(current));
    }

    let info = parse_lock_info(&body)?;
    debug!(name, id = %info.id, "locking state");

    match state
        .locks
        .try_lock(&path, &info)
        .await
        .map_err(|e| internal(&state, e))?
    {
        LockOutcome::Acquired => Ok(StatusCode::OK.into_response()),
        LockOutcome::Held(current) => {
            debug!(name, holder = %current.id, "already locked");
            Err(ApiError::AlreadyLocked(current))
        }
    }
}

/// `UNLOCK /states/{name}` -- release the lock; 409 with the holder's info
/// on an ownership mismatch.  Unlocking an unlocked state succeeds.
pub async fn unlock(state: Arc<AppState>, name: &str, body: Bytes) -> Result<Response, ApiError> {
    let info = parse_lock_info(&body)?;
    debug!(name, id = %info.id, "unlocking state");

    match state
        .locks
        .unlock(&state.config.resource_path(name), &info)
        .await
        .map_err(|e| internal(&state, e))?
    {
        UnlockOutcome::Released => Ok(StatusCode::OK.into_response()),
        UnlockOutcome::Conflict(current) => Err(ApiError::LockConflict(current)),
    }
}
