//! Chunking stage ("cutter").
//!
//! Bounds the per-entry size presented to the backing store: the incoming
//! text stream is cut into records of at most `chunk_size` bytes, stored
//! as `{"part": "..."}` documents at `<path>/<i>`, followed by an
//! `{"num_parts": N}` index document at `<path>/index`.  Retrieval reads
//! the index first and streams the parts back in order.
//!
//! This stage expects text-safe input (the encoding stage runs above it),
//! since part content travels inside a JSON string field.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::io::AsyncReadExt;

use super::{pipe, stage_io_error, ByteStream, Storer, StorerError};

const STAGE: &str = "cutter";

/// One fixed-size slice of the stored stream.
#[derive(Debug, Serialize, Deserialize)]
struct PartRecord {
    part: String,
}

/// Count of part records belonging to one resource path.
#[derive(Debug, Serialize, Deserialize)]
struct IndexRecord {
    num_parts: usize,
}

pub struct Cutter {
    next: Arc<dyn Storer>,
    chunk_size: usize,
}

impl Cutter {
    pub fn new(next: Arc<dyn Storer>, chunk_size: usize) -> Self {
        assert!(chunk_size > 0, "chunk size must be positive");
        Self { next, chunk_size }
    }

    fn part_path(path: &str, index: usize) -> String {
        format!("{path}/{index}")
    }

    fn index_path(path: &str) -> String {
        format!("{path}/index")
    }

    /// Read until `buf` is full or the stream ends; returns the filled length.
    async fn read_chunk(stream: &mut ByteStream, buf: &mut [u8]) -> std::io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = stream.read(&mut buf[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        Ok(filled)
    }

    /// Fetch and parse the index record, letting `NotFound` pass through.
    async fn read_index(&self, path: &str) -> Result<IndexRecord, StorerError> {
        let mut stream = self
            .next
            .retrieve(&Self::index_path(path))
            .await
            .map_err(|e| StorerError::wrap(STAGE, e))?;
        let mut doc = Vec::new();
        stream
            .read_to_end(&mut doc)
            .await
            .map_err(|e| StorerError::stage(STAGE, e))?;
        serde_json::from_slice(&doc).map_err(|e| StorerError::stage(STAGE, e))
    }

    /// Delete one record, treating an already-absent entry as success.
    async fn delete_record(&self, path: String) -> Result<(), StorerError> {
        match self.next.delete(&path).await {
            Ok(()) | Err(StorerError::NotFound) => Ok(()),
            Err(e) => Err(StorerError::wrap(STAGE, e)),
        }
    }
}

impl Storer for Cutter {
    fn store(
        &self,
        path: &str,
        mut stream: ByteStream,
    ) -> Pin<Box<dyn Future<Output = Result<(), StorerError>> + Send + '_>> {
        let path = path.to_string();
        Box::pin(async move {
            let mut buf = vec![0u8; self.chunk_size];
            let mut num_parts = 0usize;
            loop {
                // A read error here includes failures from upstream
                // producer tasks, which abort the whole store.
                let filled = Self::read_chunk(&mut stream, &mut buf)
                    .await
                    .map_err(|e| StorerError::stage(STAGE, e))?;
                if filled == 0 {
                    // Empty input yields zero parts and num_parts = 0.
                    break;
                }
                let part = String::from_utf8(buf[..filled].to_vec())
                    .map_err(|e| StorerError::stage(STAGE, e))?;
                let doc = serde_json::to_vec(&PartRecord { part })
                    .map_err(|e| StorerError::stage(STAGE, e))?;
                self.next
                    .store(
                        &Self::part_path(&path, num_parts),
                        Box::pin(std::io::Cursor::new(doc)),
                    )
                    .await
                    .map_err(|e| StorerError::wrap(STAGE, e))?;
                num_parts += 1;
                if filled < self.chunk_size {
                    break;
                }
            }

            let doc = serde_json::to_vec(&IndexRecord { num_parts })
                .map_err(|e| StorerError::stage(STAGE, e))?;
            self.next
                .store(&Self::index_path(&path), Box::pin(std::io::Cursor::new(doc)))
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
            // Missing index means the resource does not exist.
            let index = self.read_index(&path).await?;
            let next = self.next.clone();

            Ok(pipe(move |writer| async move {
                for i in 0..index.num_parts {
                    let mut stream =
                        next.retrieve(&Cutter::part_path(&path, i)).await.map_err(|e| {
                            // A chunk missing mid-sequence must abort the
                            // output, never silently truncate it.
                            stage_io_error(
                                STAGE,
                                format!("chunk {i} of {}: {e}", index.num_parts),
                            )
                        })?;
                    let mut doc = Vec::new();
                    stream.read_to_end(&mut doc).await?;
                    let record: PartRecord = serde_json::from_slice(&doc)
                        .map_err(|e| stage_io_error(STAGE, e))?;
                    writer.write(Bytes::from(record.part.into_bytes())).await?;
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
            let index = match self.read_index(&path).await {
                Ok(index) => index,
                // Nothing stored here; deleting an absent resource succeeds
                // and no chunk deletions are attempted.
                Err(StorerError::NotFound) => return Ok(()),
                Err(e) => return Err(e),
            };

            self.delete_record(Self::index_path(&path)).await?;
            for i in 0..index.num_parts {
                self.delete_record(Self::part_path(&path, i)).await?;
            }
            Ok(())
        })
    }
}
