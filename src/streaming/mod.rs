//! Streaming ingestion pipeline
//!
//! For corpora whose documents are produced lazily from an object store, a
//! single producer ranges over the configured objects and writes
//! line-aligned chunk files into a local data directory; ingestion clients
//! consume those chunks in arrival order. Backpressure is a bounded channel
//! of chunk ids sized at the plimsoll mark: the producer blocks on send
//! when consumers fall behind and closes the channel when the stream ends.
//!
//! At all times `0 <= rd_index <= wr_count`, both monotonically increasing,
//! and every chunk file except the final zero-length terminator contains a
//! whole number of newline-terminated documents.

pub mod producer;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crossbeam::channel::{bounded, Receiver, Sender};
use tracing::info;

use crate::error::{BenchError, BenchResult};

/// Default chunk size in megabytes.
pub const DEFAULT_CHUNK_SIZE_MB: u64 = 50;

/// Shared state of the streaming pipeline. One per process; the single
/// producer and any number of interchangeable consumers hang off it.
#[derive(Debug)]
pub struct IngestionContext {
    data_dir: PathBuf,
    chunk_size_bytes: u64,
    plimsoll: usize,
    ballast: usize,
    rd_index: AtomicU64,
    pub(crate) wr_count: AtomicU64,
    producer_started: AtomicBool,
    pub(crate) sender: Mutex<Option<Sender<u64>>>,
    receiver: Receiver<u64>,
}

impl IngestionContext {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self::with_chunk_size_bytes(data_dir, DEFAULT_CHUNK_SIZE_MB * 1024 * 1024)
    }

    pub fn with_chunk_size_bytes(data_dir: impl Into<PathBuf>, chunk_size_bytes: u64) -> Self {
        let plimsoll = 4 * num_cpus::get();
        let (sender, receiver) = bounded(plimsoll);
        Self {
            data_dir: data_dir.into(),
            chunk_size_bytes,
            plimsoll,
            ballast: plimsoll / 2,
            rd_index: AtomicU64::new(0),
            wr_count: AtomicU64::new(0),
            producer_started: AtomicBool::new(false),
            sender: Mutex::new(Some(sender)),
            receiver,
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn chunk_size_bytes(&self) -> u64 {
        self.chunk_size_bytes
    }

    /// High-water mark of pending chunks on disk.
    pub fn plimsoll(&self) -> usize {
        self.plimsoll
    }

    /// Low-water mark at which a lagging producer catches up again.
    pub fn ballast(&self) -> usize {
        self.ballast
    }

    /// Index of the next chunk to be consumed.
    pub fn rd_index(&self) -> u64 {
        self.rd_index.load(Ordering::SeqCst)
    }

    /// Number of chunks produced so far.
    pub fn wr_count(&self) -> u64 {
        self.wr_count.load(Ordering::SeqCst)
    }

    /// Approximate number of bytes already handed to consumers, for
    /// progress reporting.
    pub fn consumed_bytes(&self) -> u64 {
        self.rd_index() * self.chunk_size_bytes
    }

    pub fn chunk_path(&self, chunk_id: u64) -> PathBuf {
        self.data_dir.join(format!("chunk-{chunk_id:05}"))
    }

    /// Start the producer for the given object-storage location.
    ///
    /// At most one producer may run per process; a second start is an
    /// internal error.
    pub fn start_producer(
        self: &Arc<Self>,
        base_url: &str,
        keys: Vec<String>,
    ) -> BenchResult<std::thread::JoinHandle<BenchResult<()>>> {
        if self.producer_started.swap(true, Ordering::SeqCst) {
            return Err(BenchError::assertion(
                "streaming producer was started twice in the same process",
            ));
        }
        let sender = self
            .sender
            .lock()
            .map_err(|_| BenchError::assertion("ingestion context lock poisoned"))?
            .take()
            .ok_or_else(|| BenchError::assertion("streaming producer channel already taken"))?;

        std::fs::create_dir_all(&self.data_dir)
            .map_err(|e| BenchError::Data(format!("cannot create data dir [{}]: {e}", self.data_dir.display())))?;

        info!(base_url, ?keys, "starting streaming ingestion producer");
        let ctx = Arc::clone(self);
        let base_url = base_url.to_string();
        let handle = std::thread::Builder::new()
            .name("chunk-producer".to_string())
            .spawn(move || {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .map_err(|e| BenchError::SystemSetup(format!("cannot start producer runtime: {e}")))?;
                runtime.block_on(async move {
                    let producer = producer::ChunkProducer::for_url(&base_url, keys, ctx, sender)?;
                    producer.run().await
                })
            })
            .map_err(|e| BenchError::SystemSetup(format!("cannot spawn producer thread: {e}")))?;
        Ok(handle)
    }

    /// Start the producer unless one is already running. Used by consumers
    /// that race on first open.
    pub fn ensure_producer(
        self: &Arc<Self>,
        base_url: &str,
        keys: Vec<String>,
    ) -> BenchResult<Option<std::thread::JoinHandle<BenchResult<()>>>> {
        if self.producer_started.load(Ordering::SeqCst) {
            return Ok(None);
        }
        match self.start_producer(base_url, keys) {
            Ok(handle) => Ok(Some(handle)),
            // lost the race against another consumer
            Err(BenchError::Assertion(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Block until the next chunk is available and return its path, or
    /// `None` on orderly end-of-stream (producer closed the channel or the
    /// terminator chunk was received).
    pub fn next_chunk(&self) -> BenchResult<Option<PathBuf>> {
        match self.receiver.recv() {
            Ok(chunk_id) => {
                // chunks arrive in production order; track the furthest
                // consumed index for progress reporting and invariants
                self.rd_index.fetch_max(chunk_id + 1, Ordering::SeqCst);
                let path = self.chunk_path(chunk_id);
                let size = crate::util::io::file_size(&path).ok_or_else(|| {
                    BenchError::Data(format!("streamed chunk [{}] disappeared", path.display()))
                })?;
                if size == 0 {
                    Ok(None)
                } else {
                    Ok(Some(path))
                }
            }
            Err(_) => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_water_marks() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = IngestionContext::new(dir.path());
        assert_eq!(ctx.plimsoll(), 4 * num_cpus::get());
        assert_eq!(ctx.ballast(), ctx.plimsoll() / 2);
        assert_eq!(ctx.chunk_size_bytes(), DEFAULT_CHUNK_SIZE_MB * 1024 * 1024);
        assert_eq!(ctx.rd_index(), 0);
        assert_eq!(ctx.wr_count(), 0);
    }

    #[test]
    fn test_chunk_path_format() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = IngestionContext::new(dir.path());
        assert!(ctx.chunk_path(7).ends_with("chunk-00007"));
        assert!(ctx.chunk_path(12345).ends_with("chunk-12345"));
    }

    #[test]
    fn test_second_producer_start_is_an_assertion() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = Arc::new(IngestionContext::new(dir.path().join("data")));
        // an invalid scheme fails fast inside the thread but the guard
        // trips on the caller side for the second start
        let first = ctx.start_producer("http://127.0.0.1:1/corpus", vec!["docs.json".to_string()]);
        assert!(first.is_ok());
        let second = ctx.start_producer("http://127.0.0.1:1/corpus", vec!["docs.json".to_string()]);
        assert!(matches!(second, Err(BenchError::Assertion(_))));
        // the producer thread itself will fail to connect; that is expected
        let _ = first.unwrap().join();
    }
}
