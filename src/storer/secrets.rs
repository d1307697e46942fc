//! Backing adapter: bridges the byte-stream contract onto the secrets
//! store's JSON-document API.
//!
//! This is the terminal stage.  Incoming streams are complete JSON
//! documents produced by the cutter (part and index records), small by
//! construction, so buffering one document here is bounded by the chunk
//! size rather than the blob size.

use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::io::AsyncReadExt;

use super::{ByteStream, Storer, StorerError};
use crate::secrets::{SecretsClient, SecretsError};

const STAGE: &str = "secrets";

pub struct SecretsStorer {
    client: Arc<dyn SecretsClient>,
}

impl SecretsStorer {
    pub fn new(client: Arc<dyn SecretsClient>) -> Self {
        Self { client }
    }
}

/// Map a collaborator error into the pipeline taxonomy, preserving the
/// typed NotFound sentinel.
fn map_err(err: SecretsError) -> StorerError {
    match err {
        SecretsError::NotFound => StorerError::NotFound,
        SecretsError::Other(e) => StorerError::stage(STAGE, e),
    }
}

impl Storer for SecretsStorer {
    fn store(
        &self,
        path: &str,
        mut stream: ByteStream,
    ) -> Pin<Box<dyn Future<Output = Result<(), StorerError>> + Send + '_>> {
        let path = path.to_string();
        Box::pin(async move {
            let mut raw = Vec::new();
            stream
                .read_to_end(&mut raw)
                .await
                .map_err(|e| StorerError::stage(STAGE, e))?;

            let doc: Value =
                serde_json::from_slice(&raw).map_err(|e| StorerError::stage(STAGE, e))?;
            let doc = match doc {
                Value::Object(map) => map,
                _ => {
                    return Err(StorerError::stage(
                        STAGE,
                        anyhow::anyhow!("stored content must be a JSON object"),
                    ))
                }
            };

            self.client.set_json(&path, doc).await.map_err(map_err)
        })
    }

    fn retrieve(
        &self,
        path: &str,
    ) -> Pin<Box<dyn Future<Output = Result<ByteStream, StorerError>> + Send + '_>> {
        let path = path.to_string();
        Box::pin(async move {
            let doc = self.client.get_latest_json(&path).await.map_err(map_err)?;
            let raw = serde_json::to_vec(&doc).map_err(|e| StorerError::stage(STAGE, e))?;
            Ok(Box::pin(std::io::Cursor::new(raw)) as ByteStream)
        })
    }

    fn delete(
        &self,
        path: &str,
    ) -> Pin<Box<dyn Future<Output = Result<(), StorerError>> + Send + '_>> {
        let path = path.to_string();
        Box::pin(async move {
            match self.client.delete(&path).await {
                // Absent entries count as deleted.
                Ok(()) | Err(SecretsError::NotFound) => Ok(()),
                Err(e) => Err(map_err(e)),
            }
        })
    }
}
