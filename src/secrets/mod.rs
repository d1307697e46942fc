//! Collaborator contract for the secrets-management key-value store.
//!
//! The store holds two kinds of entries: JSON documents (state chunks and
//! index records) and scalar string values (lock records).  Every
//! implementation must signal a missing entry with the typed
//! [`SecretsError::NotFound`] sentinel -- callers never match on error text.

use serde_json::{Map, Value};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

pub mod memory;

/// A JSON document as stored by the secrets service.
pub type JsonDoc = Map<String, Value>;

/// Errors from the secrets store collaborator.
#[derive(Debug, Error)]
pub enum SecretsError {
    /// The named entry does not exist.
    #[error("secret not found")]
    NotFound,

    /// Any other failure talking to the store.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Listing metadata for one entry under a base path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretMetadata {
    /// Full entry name.
    pub name: String,
    /// Creation timestamp of the latest version.
    pub version_created_at: String,
}

/// Async secrets store contract.
///
/// `set_json` and `set_value` have overwrite semantics: a subsequent write
/// to the same name replaces the previous value.
pub trait SecretsClient: Send + Sync + 'static {
    /// Write `value` as a JSON document under `name`, overwriting.
    fn set_json(
        &self,
        name: &str,
        value: JsonDoc,
    ) -> Pin<Box<dyn Future<Output = Result<(), SecretsError>> + Send + '_>>;

    /// Fetch the latest JSON document at `name`.
    fn get_latest_json(
        &self,
        name: &str,
    ) -> Pin<Box<dyn Future<Output = Result<JsonDoc, SecretsError>> + Send + '_>>;

    /// Write `value` as a scalar string under `name`, overwriting.
    fn set_value(
        &self,
        name: &str,
        value: &str,
    ) -> Pin<Box<dyn Future<Output = Result<(), SecretsError>> + Send + '_>>;

    /// Fetch the latest scalar value at `name`.
    fn get_latest_value(
        &self,
        name: &str,
    ) -> Pin<Box<dyn Future<Output = Result<String, SecretsError>> + Send + '_>>;

    /// Delete the entry at `name`.  Absent entries yield `NotFound`.
    fn delete(
        &self,
        name: &str,
    ) -> Pin<Box<dyn Future<Output = Result<(), SecretsError>> + Send + '_>>;

    /// List all entries whose name lives under `base_path`.
    fn find_by_path(
        &self,
        base_path: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<SecretMetadata>, SecretsError>> + Send + '_>>;
}
