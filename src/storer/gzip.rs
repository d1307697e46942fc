//! Compression stage.
//!
//! Wraps outgoing streams with a maximum-level gzip compressor and
//! incoming streams with the matching decompressor.  Corrupt or
//! incompatible stored content surfaces as a stage-tagged error.

use bytes::Bytes;
use flate2::write::{GzDecoder, GzEncoder};
use flate2::Compression;
use std::future::Future;
use std::io::Write;
use std::pin::Pin;
use std::sync::Arc;
use tokio::io::AsyncReadExt;

use super::{pipe, stage_io_error, ByteStream, Storer, StorerError};

const STAGE: &str = "gzip";

/// Read buffer size for the streaming producers.
const READ_BUF: usize = 32 * 1024;

pub struct GzipStorer {
    next: Arc<dyn Storer>,
}

impl GzipStorer {
    pub fn new(next: Arc<dyn Storer>) -> Self {
        Self { next }
    }
}

impl Storer for GzipStorer {
    fn store(
        &self,
        path: &str,
        mut stream: ByteStream,
    ) -> Pin<Box<dyn Future<Output = Result<(), StorerError>> + Send + '_>> {
        let path = path.to_string();
        Box::pin(async move {
            let compressed = pipe(move |writer| async move {
                let mut encoder = GzEncoder::new(Vec::new(), Compression::best());
                let mut buf = vec![0u8; READ_BUF];
                loop {
                    let n = stream.read(&mut buf).await?;
                    if n == 0 {
                        break;
                    }
                    encoder
                        .write_all(&buf[..n])
                        .map_err(|e| stage_io_error(STAGE, e))?;
                    if !encoder.get_ref().is_empty() {
                        let out = std::mem::take(encoder.get_mut());
                        writer.write(Bytes::from(out)).await?;
                    }
                }
                let out = encoder.finish().map_err(|e| stage_io_error(STAGE, e))?;
                writer.write(Bytes::from(out)).await
            });

            self.next
                .store(&path, compressed)
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
                let mut decoder = GzDecoder::new(Vec::new());
                let mut buf = vec![0u8; READ_BUF];
                loop {
                    let n = inner.read(&mut buf).await?;
                    if n == 0 {
                        break;
                    }
                    decoder
                        .write_all(&buf[..n])
                        .map_err(|e| stage_io_error(STAGE, e))?;
                    if !decoder.get_ref().is_empty() {
                        let out = std::mem::take(decoder.get_mut());
                        writer.write(Bytes::from(out)).await?;
                    }
                }
                let out = decoder.finish().map_err(|e| stage_io_error(STAGE, e))?;
                writer.write(Bytes::from(out)).await
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

#[cfg(test)]
mod tests {
    use super::super::testutil::{input, read_all, MemoryStorer};
    use super::*;

    fn stage() -> (Arc<MemoryStorer>, GzipStorer) {
        let mem = Arc::new(MemoryStorer::default());
        let gz = GzipStorer::new(mem.clone());
        (mem, gz)
    }

    #[tokio::test]
    async fn stores_compressed_and_round_trips() {
        let (mem, gz) = stage();
        let data = vec![b'a'; 50_000];

        gz.store("/p", input(data.clone())).await.unwrap();

        // Highly repetitive input must come out smaller than it went in.
        let stored = mem.record("/p").await.unwrap();
        assert!(stored.len() < data.len());
        assert_eq!(&stored[..2], &[0x1f, 0x8b]); // gzip magic

        let out = read_all(gz.retrieve("/p").await.unwrap()).await.unwrap();
        assert_eq!(out, data);
    }

    #[tokio::test]
    async fn round_trips_empty_stream() {
        let (_, gz) = stage();
        gz.store("/p", input(Vec::new())).await.unwrap();
        let out = read_all(gz.retrieve("/p").await.unwrap()).await.unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn corrupt_content_fails_with_stage_error() {
        let (mem, gz) = stage();
        mem.insert("/p", b"definitely not gzip".to_vec()).await;

        let stream = gz.retrieve("/p").await.unwrap();
        let err = read_all(stream).await.unwrap_err();
        assert!(err.to_string().contains("storer/gzip"));
    }

    #[tokio::test]
    async fn missing_entry_passes_not_found_through() {
        let (_, gz) = stage();
        assert!(matches!(
            gz.retrieve("/missing").await,
            Err(StorerError::NotFound)
        ));
    }
}
