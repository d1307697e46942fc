//! In-memory secrets store.
//!
//! Entries are held in a `tokio::sync::RwLock<HashMap<...>>`.  Used by the
//! test suites and by dry-run deployments (`secrets.engine: memory`), where
//! the server runs the full protocol without a real secrets service.

use chrono::{SecondsFormat, Utc};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use super::{JsonDoc, SecretMetadata, SecretsClient, SecretsError};

/// One stored entry: either a JSON document or a scalar value.
#[derive(Debug, Clone)]
enum Entry {
    Json(JsonDoc),
    Value(String),
}

#[derive(Debug, Clone)]
struct StoredSecret {
    entry: Entry,
    version_created_at: String,
}

/// In-memory implementation of [`SecretsClient`].
#[derive(Default)]
pub struct MemorySecretsClient {
    entries: tokio::sync::RwLock<HashMap<String, StoredSecret>>,
}

impl MemorySecretsClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn now() -> String {
        Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
    }
}

impl SecretsClient for MemorySecretsClient {
    fn set_json(
        &self,
        name: &str,
        value: JsonDoc,
    ) -> Pin<Box<dyn Future<Output = Result<(), SecretsError>> + Send + '_>> {
        let name = name.to_string();
        Box::pin(async move {
            let mut entries = self.entries.write().await;
            entries.insert(
                name,
                StoredSecret {
                    entry: Entry::Json(value),
                    version_created_at: Self::now(),
                },
            );
            Ok(())
        })
    }

    fn get_latest_json(
        &self,
        name: &str,
    ) -> Pin<Box<dyn Future<Output = Result<JsonDoc, SecretsError>> + Send + '_>> {
        let name = name.to_string();
        Box::pin(async move {
            let entries = self.entries.read().await;
            match entries.get(&name).map(|s| &s.entry) {
                Some(Entry::Json(doc)) => Ok(doc.clone()),
                Some(Entry::Value(_)) => Err(SecretsError::Other(anyhow::anyhow!(
                    "entry at {name} is a scalar value, not a JSON document"
                ))),
                None => Err(SecretsError::NotFound),
            }
        })
    }

    fn set_value(
        &self,
        name: &str,
        value: &str,
    ) -> Pin<Box<dyn Future<Output = Result<(), SecretsError>> + Send + '_>> {
        let name = name.to_string();
        let value = value.to_string();
        Box::pin(async move {
            let mut entries = self.entries.write().await;
            entries.insert(
                name,
                StoredSecret {
                    entry: Entry::Value(value),
                    version_created_at: Self::now(),
                },
            );
            Ok(())
        })
    }

    fn get_latest_value(
        &self,
        name: &str,
    ) -> Pin<Box<dyn Future<Output = Result<String, SecretsError>> + Send + '_>> {
        let name = name.to_string();
        Box::pin(async move {
            let entries = self.entries.read().await;
            match entries.get(&name).map(|s| &s.entry) {
                Some(Entry::Value(value)) => Ok(value.clone()),
                Some(Entry::Json(_)) => Err(SecretsError::Other(anyhow::anyhow!(
                    "entry at {name} is a JSON document, not a scalar value"
                ))),
                None => Err(SecretsError::NotFound),
            }
        })
    }

    fn delete(
        &self,
        name: &str,
    ) -> Pin<Box<dyn Future<Output = Result<(), SecretsError>> + Send + '_>> {
        let name = name.to_string();
        Box::pin(async move {
            let mut entries = self.entries.write().await;
            match entries.remove(&name) {
                Some(_) => Ok(()),
                None => Err(SecretsError::NotFound),
            }
        })
    }

    fn find_by_path(
        &self,
        base_path: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<SecretMetadata>, SecretsError>> + Send + '_>> {
        let prefix = format!("{}/", base_path.trim_end_matches('/'));
        Box::pin(async move {
            let entries = self.entries.read().await;
            let mut found: Vec<SecretMetadata> = entries
                .iter()
                .filter(|(name, _)| name.starts_with(&prefix))
                .map(|(name, stored)| SecretMetadata {
                    name: name.clone(),
                    version_created_at: stored.version_created_at.clone(),
                })
                .collect();
            found.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(found)
        })
    }
}
