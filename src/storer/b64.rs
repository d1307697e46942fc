//! Text-safe encoding stage.
//!
//! Base64-encodes outgoing bytes so arbitrary binary content can travel
//! through a JSON-document-oriented backing store, and decodes them on the
//! way back.  Both directions stream: bytes are carried over in 3-byte
//! (encode) / 4-byte (decode) groups so chunk boundaries never split an
//! encoding unit.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::io::AsyncReadExt;

use super::{pipe, stage_io_error, ByteStream, Storer, StorerError};

const STAGE: &str = "b64";

const READ_BUF: usize = 24 * 1024; // multiple of 3 and 4

pub struct Base64Storer {
    next: Arc<dyn Storer>,
}

impl Base64Storer {
    pub fn new(next: Arc<dyn Storer>) -> Self {
        Self { next }
    }
}

impl Storer for Base64Storer {
    fn store(
        &self,
        path: &str,
        mut stream: ByteStream,
    ) -> Pin<Box<dyn Future<Output = Result<(), StorerError>> + Send + '_>> {
        let path = path.to_string();
        Box::pin(async move {
            let encoded = pipe(move |writer| async move {
                // Carry the sub-3-byte remainder between reads; encoding
                // whole 3-byte groups keeps intermediate output free of
                // padding, so concatenated groups decode as one stream.
                let mut carry: Vec<u8> = Vec::new();
                let mut buf = vec![0u8; READ_BUF];
                loop {
                    let n = stream.read(&mut buf).await?;
                    if n == 0 {
                        break;
                    }
                    carry.extend_from_slice(&buf[..n]);
                    let whole = carry.len() - carry.len() % 3;
                    if whole > 0 {
                        let group: Vec<u8> = carry.drain(..whole).collect();
                        writer
                            .write(Bytes::from(STANDARD.encode(group).into_bytes()))
                            .await?;
                    }
                }
                if !carry.is_empty() {
                    writer
                        .write(Bytes::from(STANDARD.encode(carry).into_bytes()))
                        .await?;
                }
                Ok(())
            });

            self.next
                .store(&path, encoded)
                .await
                .map_err(|e| StorerError::wrap(STAGE, e))
        })
    }

    fn retrieve(
        &self,
        path: &str,
    ) -> Pin<Box<dyn Future<Output = Result<ByteStream, StorerError>> + Send + '_>> {
        let path = path.to_string();
        Box::pin(async move {
            let mut inner = self
                .next
                .retrieve(&path)
                .await
                .map_err(|e| StorerError::wrap(STAGE, e))?;

            Ok(pipe(move |writer| async move {
                let mut carry: Vec<u8> = Vec::new();
                let mut buf = vec![0u8; READ_BUF];
                loop {
                    let n = inner.read(&mut buf).await?;
                    if n == 0 {
                        break;
                    }
                    carry.extend_from_slice(&buf[..n]);
                    let whole = carry.len() - carry.len() % 4;
                    if whole > 0 {
                        let group: Vec<u8> = carry.drain(..whole).collect();
                        let decoded = STANDARD
                            .decode(group)
                            .map_err(|e| stage_io_error(STAGE, e))?;
                        writer.write(Bytes::from(decoded)).await?;
                    }
                }
                if !carry.is_empty() {
                    // A base64 stream must end on a 4-byte boundary; a
                    // leftover group means truncated upstream content.
                    let decoded = STANDARD
                        .decode(carry)
                        .map_err(|e| stage_io_error(STAGE, e))?;
                    writer.write(Bytes::from(decoded)).await?;
                }
                Ok(())
            }))
        })
    }

    fn delete(
        &self,
        path: &str,
    ) -> Pin<Box<dyn Future<Output = Result<(), StorerError>> + Send + '_>> {
        let path = path.to_string();
        Box::pin(async move {
            self.next
                .delete(&path)
                .await
                .map_err(|e| StorerError::wrap(STAGE, e))
        })
    }
}
