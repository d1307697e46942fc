//! State storage handlers: store, retrieve, delete and list.
//!
//! Terraform status-code mapping: GET answers 200 with the stored document
//! or 204 when absent; POST and DELETE answer 200.  Note that POST and
//! DELETE deliberately do not check lock ownership -- Terraform relies on
//! its own LOCK/UNLOCK discipline, and the unconditional behavior doubles
//! as an administrative override.

use axum::body::Body;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use futures::TryStreamExt;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::io::{ReaderStream, StreamReader};
use tracing::debug;

use crate::errors::ApiError;
use crate::lock::LOCK_SUFFIX;
use crate::models::StateSummary;
use crate::storer::StorerError;
use crate::AppState;

/// `POST /states/{name}` -- store (overwrite) one state blob.
///
/// The request body streams straight into the pipeline; the blob is never
/// buffered whole.
pub async fn store(
    state: Arc<AppState>,
    name: &str,
    body: Body,
) -> Result<Response, ApiError> {
    debug!(name, "storing state");
    let reader = StreamReader::new(body.into_data_stream().map_err(std::io::Error::other));
    state
        .storer
        .store(&state.config.resource_path(name), Box::pin(reader))
        .await
        .map_err(|e| internal(&state, e))?;
    Ok(StatusCode::OK.into_response())
}

/// `GET /states/{name}` -- stream the stored state back; 204 when absent.
pub async fn retrieve(state: Arc<AppState>, name: &str) -> Result<Response, ApiError> {
    debug!(name, "retrieving state");
    match state
        .storer
        .retrieve(&state.config.resource_path(name))
        .await
    {
        Ok(stream) => Ok((
            StatusCode::OK,
            [("content-type", "application/json")],
            Body::from_stream(ReaderStream::new(stream)),
        )
            .into_response()),
        Err(StorerError::NotFound) => Ok(StatusCode::NO_CONTENT.into_response()),
        Err(e) => Err(internal(&state, e)),
    }
}

/// `DELETE /states/{name}` -- remove the state and cascade its lock record.
pub async fn delete(state: Arc<AppState>, name: &str) -> Result<Response, ApiError> {
    debug!(name, "deleting state");
    let path = state.config.resource_path(name);
    state
        .storer
        .delete(&path)
        .await
        .map_err(|e| internal(&state, e))?;
    state
        .locks
        .delete_lock(&path)
        .await
        .map_err(|e| internal(&state, e))?;
    Ok(StatusCode::OK.into_response())
}

/// `GET /states` -- list every known state with its lock status.
///
/// One logical state is backed by several entries (chunk records, the
/// index record, possibly a lock record); they collapse into a single row
/// keyed by the first path segment under the base namespace, and lock
/// companion entries never appear as rows of their own.
pub async fn list(state: Arc<AppState>) -> Result<Response, ApiError> {
    debug!("listing states");
    let base = state.config.base_path();
    let prefix = format!("{base}/");

    let entries = state
        .secrets
        .find_by_path(&base)
        .await
        .map_err(|e| internal(&state, e))?;

    // state name -> latest version_created_at across its entries.
    let mut versions: BTreeMap<String, String> = BTreeMap::new();
    for entry in entries {
        let Some(relative) = entry.name.strip_prefix(&prefix) else {
            continue;
        };
        let segment = relative.split('/').next().unwrap_or(relative);
        if segment.is_empty() || segment.ends_with(LOCK_SUFFIX) {
            continue;
        }
        let version = versions.entry(segment.to_string()).or_default();
        if entry.version_created_at > *version {
            *version = entry.version_created_at;
        }
    }

    let mut rows = Vec::with_capacity(versions.len());
    for (name, version_created_at) in versions {
        let backing_name = format!("{base}/{name}");
        let current = state
            .locks
            .is_locked(&backing_name)
            .await
            .map_err(|e| internal(&state, e))?;
        rows.push(StateSummary {
            backing_name,
            name,
            version_created_at,
            is_locked: current.is_some(),
            current_lock_id: current.map(|info| info.id).unwrap_or_default(),
        });
    }

    Ok((StatusCode::OK, Json(rows)).into_response())
}

pub(crate) fn internal(state: &AppState, err: impl Into<anyhow::Error>) -> ApiError {
    ApiError::Internal {
        source: err.into(),
        verbose: state.config.backend.show_error,
    }
}
