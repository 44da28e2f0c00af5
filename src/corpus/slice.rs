//! Per-client line windows over corpus data
//!
//! A `Slice` is the window of lines one client reads from a document file.
//! In file mode it seeks to the client's offset through the offset table
//! and serves a fixed number of lines per iteration. In streaming mode it
//! pulls whole chunk files from the ingestion pipeline, concatenating and
//! splitting across chunk boundaries so that every iteration still yields
//! the requested number of lines; the final partial chunk ends the stream.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::corpus::offsets;
use crate::error::{BenchError, BenchResult};
use crate::streaming::IngestionContext;

pub struct Slice {
    lines_per_iteration: usize,
    inner: SliceInner,
}

enum SliceInner {
    File {
        path: PathBuf,
        reader: BufReader<File>,
        number_of_lines: u64,
        current_line: u64,
    },
    Streaming {
        ctx: Arc<IngestionContext>,
        current: Option<(PathBuf, BufReader<File>)>,
        exhausted: bool,
    },
}

impl Slice {
    /// Open a file-backed slice serving `number_of_lines` lines starting at
    /// line `offset_lines`, `lines_per_iteration` at a time.
    pub fn open_file(
        path: &Path,
        offset_lines: u64,
        number_of_lines: u64,
        lines_per_iteration: usize,
    ) -> BenchResult<Slice> {
        let file = File::open(path)
            .map_err(|e| BenchError::Data(format!("cannot open [{}]: {e}", path.display())))?;
        let mut reader = BufReader::new(file);
        debug!(
            file = %path.display(),
            offset_lines,
            number_of_lines,
            "opening corpus slice"
        );
        offsets::skip_lines(path, &mut reader, offset_lines)?;
        Ok(Slice {
            lines_per_iteration,
            inner: SliceInner::File {
                path: path.to_path_buf(),
                reader,
                number_of_lines,
                current_line: 0,
            },
        })
    }

    /// Open a streaming slice fed by the ingestion pipeline. The first
    /// iteration blocks until the producer has published a chunk.
    pub fn open_streaming(ctx: Arc<IngestionContext>, lines_per_iteration: usize) -> Slice {
        Slice {
            lines_per_iteration,
            inner: SliceInner::Streaming {
                ctx,
                current: None,
                exhausted: false,
            },
        }
    }

    /// The next window of lines (each including its terminating newline),
    /// or `None` when the slice is exhausted.
    pub fn next_lines(&mut self) -> BenchResult<Option<Vec<Vec<u8>>>> {
        let want = self.lines_per_iteration;
        match &mut self.inner {
            SliceInner::File {
                path,
                reader,
                number_of_lines,
                current_line,
            } => {
                if *current_line >= *number_of_lines {
                    return Ok(None);
                }
                let remaining = (*number_of_lines - *current_line) as usize;
                let lines = read_lines(reader, want.min(remaining), path)?;
                if lines.is_empty() {
                    return Ok(None);
                }
                *current_line += lines.len() as u64;
                Ok(Some(lines))
            }
            SliceInner::Streaming {
                ctx,
                current,
                exhausted,
            } => {
                let mut result: Vec<Vec<u8>> = Vec::with_capacity(want);
                while result.len() < want {
                    if current.is_none() {
                        if *exhausted {
                            break;
                        }
                        match ctx.next_chunk()? {
                            Some(path) => {
                                let file = File::open(&path).map_err(|e| {
                                    BenchError::Data(format!("cannot open chunk [{}]: {e}", path.display()))
                                })?;
                                *current = Some((path, BufReader::new(file)));
                            }
                            None => {
                                *exhausted = true;
                                break;
                            }
                        }
                    }
                    let drained = {
                        let (path, reader) = current.as_mut().unwrap();
                        let lines = read_lines(reader, want - result.len(), path)?;
                        let drained = lines.len() < want - result.len();
                        if drained {
                            // chunk fully consumed; remove it from disk
                            let _ = std::fs::remove_file(path.as_path());
                        }
                        result.extend(lines);
                        drained
                    };
                    if drained {
                        *current = None;
                    }
                }
                if result.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(result))
                }
            }
        }
    }
}

fn read_lines<R: BufRead>(reader: &mut R, count: usize, path: &Path) -> BenchResult<Vec<Vec<u8>>> {
    let mut lines = Vec::with_capacity(count);
    for _ in 0..count {
        let mut line = Vec::new();
        let read = reader
            .read_until(b'\n', &mut line)
            .map_err(|e| BenchError::Data(format!("cannot read [{}]: {e}", path.display())))?;
        if read == 0 {
            break;
        }
        lines.push(line);
    }
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus_file(dir: &Path, count: usize) -> PathBuf {
        let path = dir.join("docs.json");
        let mut content = String::new();
        for i in 0..count {
            content.push_str(&format!("{{\"id\": {i}}}\n"));
        }
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_file_slice_respects_offset_and_window() {
        let dir = tempfile::tempdir().unwrap();
        let path = corpus_file(dir.path(), 10);

        let mut slice = Slice::open_file(&path, 3, 4, 2).unwrap();
        let first = slice.next_lines().unwrap().unwrap();
        assert_eq!(first, vec![b"{\"id\": 3}\n".to_vec(), b"{\"id\": 4}\n".to_vec()]);
        let second = slice.next_lines().unwrap().unwrap();
        assert_eq!(second, vec![b"{\"id\": 5}\n".to_vec(), b"{\"id\": 6}\n".to_vec()]);
        assert!(slice.next_lines().unwrap().is_none());
    }

    #[test]
    fn test_file_slice_short_final_window() {
        let dir = tempfile::tempdir().unwrap();
        let path = corpus_file(dir.path(), 5);

        let mut slice = Slice::open_file(&path, 0, 5, 3).unwrap();
        assert_eq!(slice.next_lines().unwrap().unwrap().len(), 3);
        assert_eq!(slice.next_lines().unwrap().unwrap().len(), 2);
        assert!(slice.next_lines().unwrap().is_none());
    }

    #[test]
    fn test_streaming_slice_crosses_chunk_boundaries() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join("data");
        std::fs::create_dir_all(&data_dir).unwrap();
        let ctx = Arc::new(IngestionContext::new(&data_dir));

        // simulate the producer: two data chunks of three lines each plus
        // the zero-length terminator
        let sender = ctx.sender.lock().unwrap().take().unwrap();
        for (id, lines) in [(0u64, 0..3), (1, 3..6)] {
            let content: String = lines.map(|i| format!("{{\"id\": {i}}}\n")).collect();
            std::fs::write(ctx.chunk_path(id), content).unwrap();
            ctx.wr_count.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            sender.send(id).unwrap();
        }
        std::fs::write(ctx.chunk_path(2), "").unwrap();
        ctx.wr_count.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        sender.send(2).unwrap();
        drop(sender);

        let mut slice = Slice::open_streaming(Arc::clone(&ctx), 4);
        // four lines straddle the first chunk boundary
        let first = slice.next_lines().unwrap().unwrap();
        assert_eq!(first.len(), 4);
        assert_eq!(first[3], b"{\"id\": 3}\n".to_vec());
        // the remaining two lines come back as a short window
        let second = slice.next_lines().unwrap().unwrap();
        assert_eq!(second.len(), 2);
        assert!(slice.next_lines().unwrap().is_none());
        // consumed data chunks are deleted
        assert!(!ctx.chunk_path(0).exists());
        assert!(!ctx.chunk_path(1).exists());
    }
}
