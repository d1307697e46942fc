//! Statevault library -- Terraform remote-state backend over a secrets store.
//!
//! This crate provides the core components for running a Terraform
//! HTTP remote-state backend: the protocol handlers, the lock
//! coordinator, and the streaming storage pipeline that adapts state
//! blobs onto a size- and content-constrained key-value secrets store.

use std::sync::Arc;

pub mod config;
pub mod errors;
pub mod handlers;
pub mod lock;
pub mod models;
pub mod secrets;
pub mod server;
pub mod storer;

use crate::config::Config;
use crate::lock::LockStore;
use crate::secrets::SecretsClient;
use crate::storer::Storer;

/// Shared application state passed to all handlers via `axum::extract::State`.
pub struct AppState {
    /// Server configuration.
    pub config: Config,
    /// Composed storage pipeline (gzip -> base64 -> cutter -> secrets).
    pub storer: Arc<dyn Storer>,
    /// Lock coordinator for per-state mutual exclusion.
    pub locks: LockStore,
    /// Secrets client, used directly for listing known states.
    pub secrets: Arc<dyn SecretsClient>,
}
