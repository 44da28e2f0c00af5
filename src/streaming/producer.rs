//! Chunk producer
//!
//! Ranges over the configured object keys, fetches `chunk_size` byte
//! partitions with a bounded number of concurrent range-GETs and rewrites
//! the byte stream into line-aligned chunk files. The partial line at the
//! tail of each partition is carried into the next chunk so that every
//! chunk holds complete documents; the final partition of a key is flushed
//! verbatim so the stream ends at the true end of the object.

use std::ops::Range;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crossbeam::channel::Sender;
use futures::StreamExt;
use object_store::aws::AmazonS3Builder;
use object_store::gcp::GoogleCloudStorageBuilder;
use object_store::http::HttpBuilder;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use tracing::{debug, info};
use url::Url;

use crate::error::{BenchError, BenchResult};
use crate::streaming::IngestionContext;

pub struct ChunkProducer {
    store: Arc<dyn ObjectStore>,
    keys: Vec<String>,
    ctx: Arc<IngestionContext>,
    sender: Sender<u64>,
    num_workers: usize,
}

impl ChunkProducer {
    /// Build a producer for an object-storage base URL (`s3://`, `gs://`,
    /// `http://` or `https://`) and a list of keys relative to it. Keys may
    /// contain glob patterns.
    pub fn for_url(
        base_url: &str,
        keys: Vec<String>,
        ctx: Arc<IngestionContext>,
        sender: Sender<u64>,
    ) -> BenchResult<Self> {
        let (store, prefix) = store_for_url(base_url)?;
        let keys = keys
            .into_iter()
            .map(|k| match &prefix {
                Some(prefix) => format!("{prefix}/{k}"),
                None => k,
            })
            .collect();
        Ok(Self {
            store,
            keys,
            ctx,
            sender,
            num_workers: 2 * num_cpus::get(),
        })
    }

    #[cfg(test)]
    pub fn with_store(
        store: Arc<dyn ObjectStore>,
        keys: Vec<String>,
        ctx: Arc<IngestionContext>,
        sender: Sender<u64>,
    ) -> Self {
        Self {
            store,
            keys,
            ctx,
            sender,
            num_workers: 2,
        }
    }

    pub async fn run(self) -> BenchResult<()> {
        let chunk_size = self.ctx.chunk_size_bytes() as usize;
        let mut chunk_id: u64 = 0;
        let mut partial = String::new();

        for key in self.resolve_keys().await? {
            let meta = self
                .store
                .head(&key)
                .await
                .map_err(|e| BenchError::Data(format!("cannot stat object [{key}]: {e}")))?;
            info!(key = %key, size = meta.size, "streaming object");

            let ranges = partition_ranges(meta.size, chunk_size);
            let last_part = ranges.len().saturating_sub(1);
            let store = Arc::clone(&self.store);
            let key_for_parts = key.clone();
            let mut parts = futures::stream::iter(ranges.into_iter().map(move |range| {
                let store = Arc::clone(&store);
                let key = key_for_parts.clone();
                async move { store.get_range(&key, range).await }
            }))
            .buffered(self.num_workers)
            .enumerate();

            while let Some((part_idx, part)) = parts.next().await {
                let bytes =
                    part.map_err(|e| BenchError::Data(format!("range request for [{key}] failed: {e}")))?;
                let text = std::str::from_utf8(&bytes).map_err(|e| {
                    BenchError::DataStreaming(format!("object [{key}] is not valid UTF-8: {e}"))
                })?;

                let (head, tail) = if part_idx == last_part {
                    // flush the key's tail so the stream ends at the true
                    // end of the object even without a final newline
                    (text, "")
                } else {
                    match split_at_last_newline(text) {
                        Some(split) => split,
                        None => {
                            return Err(BenchError::DataStreaming(format!(
                                "could not locate document end in chunk {chunk_id}"
                            )))
                        }
                    }
                };

                let content = format!("{partial}{head}");
                if !content.is_empty() {
                    self.emit_chunk(chunk_id, &content)?;
                    chunk_id += 1;
                }
                partial = tail.to_string();
            }
        }

        // the zero-length terminator signals orderly end-of-stream to the
        // consumer that receives it; later consumers see the closed channel
        self.emit_chunk(chunk_id, "")?;
        Ok(())
    }

    fn emit_chunk(&self, chunk_id: u64, content: &str) -> BenchResult<()> {
        let path = self.ctx.chunk_path(chunk_id);
        std::fs::write(&path, content)
            .map_err(|e| BenchError::Data(format!("cannot write chunk [{}]: {e}", path.display())))?;
        debug!(chunk = chunk_id, bytes = content.len(), "wrote chunk");
        self.ctx.wr_count.fetch_add(1, Ordering::SeqCst);
        // blocks while plimsoll chunks are pending
        self.sender
            .send(chunk_id)
            .map_err(|_| BenchError::assertion("all chunk consumers vanished before end-of-stream"))?;
        Ok(())
    }

    /// Expand glob keys against the store listing; plain keys pass through.
    async fn resolve_keys(&self) -> BenchResult<Vec<ObjectPath>> {
        let mut resolved = Vec::new();
        for key in &self.keys {
            if key.contains(['*', '?', '[']) {
                let matcher = globset::Glob::new(key)
                    .map_err(|e| BenchError::SystemSetup(format!("invalid object key glob [{key}]: {e}")))?
                    .compile_matcher();
                let prefix = key
                    .split(['*', '?', '['])
                    .next()
                    .and_then(|p| p.rsplit_once('/'))
                    .map(|(dir, _)| ObjectPath::from(dir));
                let mut listing = self.store.list(prefix.as_ref());
                let mut matched = Vec::new();
                while let Some(meta) = listing.next().await {
                    let meta = meta
                        .map_err(|e| BenchError::Data(format!("cannot list objects for [{key}]: {e}")))?;
                    if matcher.is_match(meta.location.as_ref()) {
                        matched.push(meta.location);
                    }
                }
                matched.sort();
                if matched.is_empty() {
                    return Err(BenchError::Data(format!("no objects match key glob [{key}]")));
                }
                resolved.extend(matched);
            } else {
                resolved.push(ObjectPath::from(key.as_str()));
            }
        }
        Ok(resolved)
    }
}

/// Split `text` after its last newline; `None` if it has no newline.
pub(crate) fn split_at_last_newline(text: &str) -> Option<(&str, &str)> {
    text.rfind('\n').map(|idx| text.split_at(idx + 1))
}

/// Partition `[0, size)` into `chunk_size` ranges; the last range is short.
pub(crate) fn partition_ranges(size: usize, chunk_size: usize) -> Vec<Range<usize>> {
    if size == 0 || chunk_size == 0 {
        return Vec::new();
    }
    let n = size.div_ceil(chunk_size);
    (0..n)
        .map(|i| (i * chunk_size)..((i + 1) * chunk_size).min(size))
        .collect()
}

/// Build an object store for the base URL and return it together with the
/// key prefix encoded in the URL path, if any.
fn store_for_url(base_url: &str) -> BenchResult<(Arc<dyn ObjectStore>, Option<String>)> {
    let url = Url::parse(base_url)
        .map_err(|e| BenchError::SystemSetup(format!("invalid streaming base URL [{base_url}]: {e}")))?;
    let prefix = match url.path().trim_matches('/') {
        "" => None,
        path => Some(path.to_string()),
    };
    match url.scheme() {
        "s3" => {
            let store = AmazonS3Builder::from_env()
                .with_url(base_url)
                .build()
                .map_err(|e| BenchError::SystemSetup(format!("cannot configure S3 store for [{base_url}]: {e}")))?;
            Ok((Arc::new(store), prefix))
        }
        "gs" => {
            let store = GoogleCloudStorageBuilder::from_env()
                .with_url(base_url)
                .build()
                .map_err(|e| BenchError::SystemSetup(format!("cannot configure GCS store for [{base_url}]: {e}")))?;
            Ok((Arc::new(store), prefix))
        }
        "http" | "https" => {
            let store = HttpBuilder::new()
                .with_url(base_url)
                .build()
                .map_err(|e| BenchError::SystemSetup(format!("cannot configure HTTP store for [{base_url}]: {e}")))?;
            // the URL path is part of the endpoint for plain HTTP stores
            Ok((Arc::new(store), None))
        }
        scheme => Err(BenchError::SystemSetup(format!(
            "unsupported streaming scheme [{scheme}] in [{base_url}]"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use object_store::memory::InMemory;
    use object_store::PutPayload;

    /// Runs the producer on its own thread so consumer-side backpressure
    /// behaves as in production; the handle carries the producer result.
    fn spawn_producer(
        ctx: &Arc<IngestionContext>,
        objects: Vec<(&'static str, String)>,
    ) -> std::thread::JoinHandle<BenchResult<()>> {
        std::fs::create_dir_all(ctx.data_dir()).unwrap();
        let sender = ctx
            .sender
            .lock()
            .unwrap()
            .take()
            .expect("producer channel already taken");
        let ctx = Arc::clone(ctx);
        std::thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            runtime.block_on(async {
                let store = Arc::new(InMemory::new());
                for (key, content) in &objects {
                    store
                        .put(&ObjectPath::from(*key), PutPayload::from(content.clone().into_bytes()))
                        .await
                        .unwrap();
                }
                let keys = objects.iter().map(|(k, _)| k.to_string()).collect();
                let producer = ChunkProducer::with_store(store, keys, ctx, sender);
                producer.run().await
            })
        })
    }

    fn drain_chunks(ctx: &Arc<IngestionContext>) -> Vec<String> {
        let mut chunks = Vec::new();
        while let Some(path) = ctx.next_chunk().unwrap() {
            chunks.push(std::fs::read_to_string(&path).unwrap());
            std::fs::remove_file(&path).unwrap();
        }
        chunks
    }

    #[test]
    fn test_split_at_last_newline() {
        assert_eq!(split_at_last_newline("a\nb\nc"), Some(("a\nb\n", "c")));
        assert_eq!(split_at_last_newline("a\n"), Some(("a\n", "")));
        assert_eq!(split_at_last_newline("abc"), None);
    }

    #[test]
    fn test_partition_ranges_cover_size_exactly() {
        assert_eq!(partition_ranges(100, 40), vec![0..40, 40..80, 80..100]);
        assert_eq!(partition_ranges(80, 40), vec![0..40, 40..80]);
        assert!(partition_ranges(0, 40).is_empty());
    }

    #[test]
    fn test_chunks_are_line_aligned_and_terminated() {
        let dir = tempfile::tempdir().unwrap();
        // chunk size 32: documents straddle the partition boundary
        let ctx = Arc::new(IngestionContext::with_chunk_size_bytes(dir.path().join("data"), 32));
        let mut body = String::new();
        for i in 0..12 {
            body.push_str(&format!("{{\"id\": {i:04}}}\n"));
        }
        let producer = spawn_producer(&ctx, vec![("docs.json", body.clone())]);

        let chunks = drain_chunks(&ctx);
        producer.join().unwrap().unwrap();
        assert!(chunks.len() > 1);
        for chunk in &chunks[..chunks.len() - 1] {
            assert!(chunk.ends_with('\n'), "chunk not line aligned: {chunk:?}");
        }
        assert_eq!(chunks.concat(), body);
        // terminator accounted for in wr_count, all chunks consumed
        assert_eq!(ctx.wr_count(), chunks.len() as u64 + 1);
        assert_eq!(ctx.rd_index(), ctx.wr_count());
    }

    #[test]
    fn test_stream_without_trailing_newline_ends_at_object_end() {
        let dir = tempfile::tempdir().unwrap();
        let chunk_size = 32;
        let ctx =
            Arc::new(IngestionContext::with_chunk_size_bytes(dir.path().join("data"), chunk_size));
        // 1.5 chunks worth of data whose last byte is not a newline
        let mut body = String::new();
        while body.len() < (chunk_size + chunk_size / 2) as usize {
            body.push_str("{\"id\": 1}\n");
        }
        body.truncate((chunk_size + chunk_size / 2) as usize);
        assert!(!body.ends_with('\n'));

        let producer = spawn_producer(&ctx, vec![("docs.json", body.clone())]);

        let chunks = drain_chunks(&ctx);
        producer.join().unwrap().unwrap();
        assert_eq!(chunks.len(), 2);
        // first chunk ends at the last newline within the first partition
        assert!(chunks[0].ends_with('\n'));
        assert!(chunks[0].len() <= chunk_size as usize);
        // second chunk ends at the true end of the object
        assert_eq!(chunks.concat(), body);
        // the terminator chunk is the zero-length file after the data chunks
        let terminator = ctx.chunk_path(2);
        assert_eq!(crate::util::io::file_size(&terminator), Some(0));
    }

    #[test]
    fn test_oversized_document_is_a_streaming_error() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = Arc::new(IngestionContext::with_chunk_size_bytes(dir.path().join("data"), 16));
        // one document larger than two chunks and no newline in the first
        let body = format!("{{\"padding\": \"{}\"}}\n", "x".repeat(64));
        let producer = spawn_producer(&ctx, vec![("docs.json", body)]);
        let chunks = drain_chunks(&ctx);
        assert!(chunks.is_empty());
        let err = producer.join().unwrap().unwrap_err();
        assert!(matches!(err, BenchError::DataStreaming(_)), "{err}");
    }

    #[test]
    fn test_multiple_keys_are_streamed_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = Arc::new(IngestionContext::with_chunk_size_bytes(dir.path().join("data"), 1024));
        let first = "{\"key\": \"a\"}\n".to_string();
        let second = "{\"key\": \"b\"}\n".to_string();
        let producer = spawn_producer(
            &ctx,
            vec![("part-00", first.clone()), ("part-01", second.clone())],
        );

        let chunks = drain_chunks(&ctx);
        producer.join().unwrap().unwrap();
        assert_eq!(chunks, vec![first, second]);
    }
}
