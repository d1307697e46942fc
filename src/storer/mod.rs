//! Streaming storage pipeline.
//!
//! A [`Storer`] persists, retrieves and deletes arbitrary byte streams
//! under a path.  Stages compose by wrapping a `next` storer: each
//! decorator transforms the stream on the way down (`store`) and back up
//! (`retrieve`), so the pipeline never buffers a whole state blob.
//!
//! Stage order, from the API surface down to the backing store:
//!
//! ```text
//! GzipStorer -> Base64Storer -> Cutter -> SecretsStorer
//! ```
//!
//! Bytes are compressed first, made text-safe second, and cut into
//! bounded-size records last; the cutter is the stage that forms the
//! `{"part": ...}` / `{"num_parts": ...}` JSON documents the backing
//! adapter writes to the secrets store.

use bytes::Bytes;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::io::StreamReader;

use crate::secrets::SecretsClient;

pub mod b64;
pub mod chunk;
pub mod gzip;
pub mod secrets;

/// An in-flight byte stream moving through the pipeline.
pub type ByteStream = Pin<Box<dyn AsyncRead + Send + 'static>>;

/// Errors surfaced by pipeline stages.
#[derive(Debug, Error)]
pub enum StorerError {
    /// No entry exists at the requested path.  This sentinel crosses stage
    /// boundaries untouched so callers can test for it.
    #[error("entry not found")]
    NotFound,

    /// A failure inside one stage, tagged with the stage's identity.
    #[error("storer/{stage}: {source}")]
    Stage {
        stage: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl StorerError {
    /// Wrap an arbitrary error with a stage identity.
    pub fn stage(stage: &'static str, err: impl Into<anyhow::Error>) -> Self {
        StorerError::Stage {
            stage,
            source: err.into(),
        }
    }

    /// Tag an error from a lower stage with this stage's identity,
    /// letting the `NotFound` sentinel pass through unchanged.
    pub fn wrap(stage: &'static str, err: StorerError) -> Self {
        match err {
            StorerError::NotFound => StorerError::NotFound,
            other => StorerError::Stage {
                stage,
                source: other.into(),
            },
        }
    }
}

/// Async storage stage contract.
pub trait Storer: Send + Sync + 'static {
    /// Persist `stream` under `path`, consuming it to the end.
    fn store(
        &self,
        path: &str,
        stream: ByteStream,
    ) -> Pin<Box<dyn Future<Output = Result<(), StorerError>> + Send + '_>>;

    /// Open a stream of the content stored under `path`.
    fn retrieve(
        &self,
        path: &str,
    ) -> Pin<Box<dyn Future<Output = Result<ByteStream, StorerError>> + Send + '_>>;

    /// Delete the content stored under `path`.  Idempotent: deleting an
    /// absent path succeeds.
    fn delete(
        &self,
        path: &str,
    ) -> Pin<Box<dyn Future<Output = Result<(), StorerError>> + Send + '_>>;
}

/// Build the full pipeline over a secrets client.
///
/// Assembled here as one explicit ordered composition so stage ordering is
/// visible in a single place and each stage stays independently testable.
pub fn pipeline(client: Arc<dyn SecretsClient>, chunk_size: usize) -> Arc<dyn Storer> {
    let backing: Arc<dyn Storer> = Arc::new(secrets::SecretsStorer::new(client));
    let cutter: Arc<dyn Storer> = Arc::new(chunk::Cutter::new(backing, chunk_size));
    let encoder: Arc<dyn Storer> = Arc::new(b64::Base64Storer::new(cutter));
    Arc::new(gzip::GzipStorer::new(encoder))
}

// -- Producer/consumer pipe ----------------------------------------------------

/// Write half of a [`pipe`].  Each chunk waits for channel capacity, so a
/// slow consumer stalls the producer and in-flight memory stays bounded to
/// roughly one buffer per stage.
pub(crate) struct PipeWriter {
    tx: mpsc::Sender<std::io::Result<Bytes>>,
}

impl PipeWriter {
    /// Push one chunk to the consumer.  Errors when the read side has gone
    /// away (e.g. a cancelled request), which terminates the producer task.
    pub(crate) async fn write(&self, chunk: Bytes) -> std::io::Result<()> {
        if chunk.is_empty() {
            return Ok(());
        }
        self.tx.send(Ok(chunk)).await.map_err(|_| {
            std::io::Error::new(std::io::ErrorKind::BrokenPipe, "stream consumer dropped")
        })
    }
}

/// Spawn `producer` on its own task and return the read half as a
/// [`ByteStream`].
///
/// A failure inside the producer is delivered to the consumer as a
/// terminating read error rather than a silent early end-of-stream, and
/// never aborts the process.
pub(crate) fn pipe<F, Fut>(producer: F) -> ByteStream
where
    F: FnOnce(PipeWriter) -> Fut + Send + 'static,
    Fut: Future<Output = std::io::Result<()>> + Send,
{
    let (tx, rx) = mpsc::channel::<std::io::Result<Bytes>>(1);
    let writer = PipeWriter { tx: tx.clone() };
    tokio::spawn(async move {
        if let Err(err) = producer(writer).await {
            // The receiver may already be gone if the request was cancelled.
            let _ = tx.send(Err(err)).await;
        }
    });
    Box::pin(StreamReader::new(ReceiverStream::new(rx)))
}

/// Tag an io error carried through a pipe with a stage identity, so stream
/// read failures stay diagnosable across layers.
pub(crate) fn stage_io_error(
    stage: &'static str,
    err: impl std::fmt::Display,
) -> std::io::Error {
    std::io::Error::other(format!("storer/{stage}: {err}"))
}

// -- Test support ---------------------------------------------------------------


// -- Full pipeline tests ---------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::testutil::{input, read_all};
    use super::*;
    use crate::secrets::memory::MemorySecretsClient;

    fn full_pipeline(chunk_size: usize) -> (Arc<MemorySecretsClient>, Arc<dyn Storer>) {
        let client = Arc::new(MemorySecretsClient::new());
        let storer = pipeline(client.clone(), chunk_size);
        (client, storer)
    }

    #[tokio::test]
    async fn round_trips_json_state() {
        let (_, storer) = full_pipeline(64);
        let data = br#"{"version":4,"resources":[{"name":"vm"}]}"#.to_vec();

        storer.store("/base/app", input(data.clone())).await.unwrap();
        let out = read_all(storer.retrieve("/base/app").await.unwrap())
            .await
            .unwrap();
        assert_eq!(out, data);
    }

    #[tokio::test]
    async fn round_trips_arbitrary_binary_content() {
        // State blobs are opaque to the pipeline; non-text bytes must
        // survive compression, encoding and chunking unchanged.
        let (_, storer) = full_pipeline(17);
        let data: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();

        storer.store("/base/bin", input(data.clone())).await.unwrap();
        let out = read_all(storer.retrieve("/base/bin").await.unwrap())
            .await
            .unwrap();
        assert_eq!(out, data);
    }

    #[tokio::test]
    async fn round_trips_empty_blob() {
        let (_, storer) = full_pipeline(32);

        storer.store("/base/empty", input(Vec::new())).await.unwrap();
        let out = read_all(storer.retrieve("/base/empty").await.unwrap())
            .await
            .unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn overwrite_replaces_previous_content() {
        let (_, storer) = full_pipeline(8);

        storer
            .store("/base/app", input(b"first version, long enough for chunks".to_vec()))
            .await
            .unwrap();
        storer.store("/base/app", input(b"second".to_vec())).await.unwrap();

        let out = read_all(storer.retrieve("/base/app").await.unwrap())
            .await
            .unwrap();
        assert_eq!(out, b"second");
    }

    #[tokio::test]
    async fn retrieve_missing_is_not_found() {
        let (_, storer) = full_pipeline(32);
        assert!(matches!(
            storer.retrieve("/base/missing").await,
            Err(StorerError::NotFound)
        ));
    }

    #[tokio::test]
    async fn dropping_the_consumer_stops_the_producer() {
        use tokio::io::AsyncReadExt;

        let (done_tx, done_rx) = tokio::sync::oneshot::channel();
        let mut stream = pipe(move |writer| async move {
            let mut stopped = false;
            for _ in 0..10_000 {
                if writer.write(Bytes::from(vec![b'x'; 1024])).await.is_err() {
                    stopped = true;
                    break;
                }
            }
            let _ = done_tx.send(stopped);
            Ok(())
        });

        let mut buf = [0u8; 64];
        stream.read(&mut buf).await.unwrap();
        drop(stream);

        // With the read side gone (a cancelled request), the producer's
        // next write fails with a broken pipe and the task terminates
        // instead of running to completion.
        assert!(done_rx.await.unwrap());
    }

    #[tokio::test]
    async fn delete_is_idempotent_and_removes_every_record() {
        let (client, storer) = full_pipeline(4);
        let data: Vec<u8> = b"enough bytes to span several chunk records".to_vec();

        storer.store("/base/app", input(data)).await.unwrap();
        assert!(!client.find_by_path("/base").await.unwrap().is_empty());

        storer.delete("/base/app").await.unwrap();
        assert!(client.find_by_path("/base").await.unwrap().is_empty());
        assert!(matches!(
            storer.retrieve("/base/app").await,
            Err(StorerError::NotFound)
        ));

        // Second delete of an already-absent resource succeeds.
        storer.delete("/base/app").await.unwrap();
    }
}
