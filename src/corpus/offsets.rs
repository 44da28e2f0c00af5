//! File-offset sidecar tables
//!
//! A corpus file can hold hundreds of millions of lines; a client assigned
//! a partition deep inside it must not scan the whole file to find its
//! starting line. The offset table is a text sidecar (`<docs>.offset`)
//! listing `line_no;byte_offset` pairs at a fixed line stride, where
//! `byte_offset` is the position right after `line_no` lines have been
//! consumed. The final entry always records the total line count and file
//! size, which doubles as the consistency check when a table is reused.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{BenchError, BenchResult};

/// Stride between entries. Exposed so test fixtures can build dense tables.
pub const DEFAULT_LINE_STRIDE: u64 = 50_000;

/// In-memory form of the sidecar table.
#[derive(Debug, Clone)]
pub struct OffsetTable {
    entries: Vec<(u64, u64)>,
}

impl OffsetTable {
    /// Path of the sidecar for a document file.
    pub fn table_path(document_path: &Path) -> PathBuf {
        let mut name = document_path.as_os_str().to_os_string();
        name.push(".offset");
        PathBuf::from(name)
    }

    /// Build the table for `document_path` and persist the sidecar.
    pub fn build(document_path: &Path) -> BenchResult<OffsetTable> {
        Self::build_with_stride(document_path, DEFAULT_LINE_STRIDE)
    }

    pub fn build_with_stride(document_path: &Path, stride: u64) -> BenchResult<OffsetTable> {
        if stride == 0 {
            return Err(BenchError::assertion("offset table stride must be positive"));
        }
        info!(file = %document_path.display(), "building file offset table");
        let file = File::open(document_path)
            .map_err(|e| BenchError::Data(format!("cannot open [{}]: {e}", document_path.display())))?;
        let mut reader = BufReader::new(file);

        let mut entries = Vec::new();
        let mut line_no: u64 = 0;
        let mut byte_offset: u64 = 0;
        let mut line = Vec::new();
        loop {
            line.clear();
            let read = reader
                .read_until(b'\n', &mut line)
                .map_err(|e| BenchError::Data(format!("cannot read [{}]: {e}", document_path.display())))?;
            if read == 0 {
                break;
            }
            line_no += 1;
            byte_offset += read as u64;
            if line_no % stride == 0 {
                entries.push((line_no, byte_offset));
            }
        }
        // record the tail so the table always ends at (total_lines, file_size)
        if line_no % stride != 0 || entries.is_empty() {
            entries.push((line_no, byte_offset));
        }

        let table = OffsetTable { entries };
        table.persist(document_path)?;
        Ok(table)
    }

    fn persist(&self, document_path: &Path) -> BenchResult<()> {
        let path = Self::table_path(document_path);
        let file = File::create(&path)
            .map_err(|e| BenchError::Data(format!("cannot create offset table [{}]: {e}", path.display())))?;
        let mut writer = BufWriter::new(file);
        for (line_no, byte_offset) in &self.entries {
            writeln!(writer, "{line_no};{byte_offset}")
                .map_err(|e| BenchError::Data(format!("cannot write offset table [{}]: {e}", path.display())))?;
        }
        writer
            .flush()
            .map_err(|e| BenchError::Data(format!("cannot write offset table [{}]: {e}", path.display())))
    }

    /// Load an existing sidecar, if any.
    pub fn load(document_path: &Path) -> BenchResult<Option<OffsetTable>> {
        let path = Self::table_path(document_path);
        if !path.is_file() {
            return Ok(None);
        }
        let file = File::open(&path)
            .map_err(|e| BenchError::Data(format!("cannot open offset table [{}]: {e}", path.display())))?;
        let mut entries = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line
                .map_err(|e| BenchError::Data(format!("cannot read offset table [{}]: {e}", path.display())))?;
            if line.trim().is_empty() {
                continue;
            }
            let (line_no, byte_offset) = line.split_once(';').ok_or_else(|| {
                BenchError::Data(format!("offset table [{}] is corrupt: [{line}]", path.display()))
            })?;
            let parse = |s: &str| {
                s.trim().parse::<u64>().map_err(|_| {
                    BenchError::Data(format!("offset table [{}] is corrupt: [{line}]", path.display()))
                })
            };
            entries.push((parse(line_no)?, parse(byte_offset)?));
        }
        if entries.is_empty() {
            return Ok(None);
        }
        Ok(Some(OffsetTable { entries }))
    }

    pub fn remove(document_path: &Path) {
        let _ = std::fs::remove_file(Self::table_path(document_path));
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Total number of lines in the underlying file.
    pub fn total_lines(&self) -> u64 {
        self.entries.last().map(|(l, _)| *l).unwrap_or(0)
    }

    /// Total byte size of the underlying file.
    pub fn total_bytes(&self) -> u64 {
        self.entries.last().map(|(_, b)| *b).unwrap_or(0)
    }

    /// Byte position to seek to and number of lines still to skip in order
    /// to stand at the start of `line` (0-based).
    pub fn seek_position(&self, line: u64) -> (u64, u64) {
        let mut best = (0, 0);
        for (line_no, byte_offset) in &self.entries {
            if *line_no <= line {
                best = (*byte_offset, *line_no);
            } else {
                break;
            }
        }
        (best.0, line - best.1)
    }
}

/// Make sure a consistent offset table exists for `document_path` and
/// return the total number of lines it records.
///
/// A pre-existing table is reused only when it agrees with the expected
/// line count and with the current file size; a stale one is discarded and
/// rebuilt. If the rebuilt table still disagrees with the expected count the
/// data file itself is wrong.
pub fn prepare_file_offset_table(
    document_path: &Path,
    expected_lines: Option<u64>,
    workload_name: &str,
) -> BenchResult<u64> {
    let file_size = crate::util::io::file_size(document_path).ok_or_else(|| {
        BenchError::Data(format!("cannot stat [{}]", document_path.display()))
    })?;

    if let Some(existing) = OffsetTable::load(document_path)? {
        let consistent = existing.total_bytes() == file_size
            && expected_lines.map(|e| e == existing.total_lines()).unwrap_or(true);
        if consistent {
            debug!(file = %document_path.display(), "reusing existing file offset table");
            return Ok(existing.total_lines());
        }
        OffsetTable::remove(document_path);
    }

    let table = OffsetTable::build(document_path)?;
    let lines_read = table.total_lines();
    if let Some(expected) = expected_lines {
        if lines_read != expected {
            OffsetTable::remove(document_path);
            return Err(BenchError::Data(format!(
                "Data in [{}] for workload [{workload_name}] are invalid. Expected [{expected}] lines \
                 but got [{lines_read}].",
                document_path.display()
            )));
        }
    }
    Ok(lines_read)
}

/// Position `reader` at the start of line `offset` (0-based) using the
/// sidecar table when present.
pub fn skip_lines<R: BufRead + Seek>(
    document_path: &Path,
    reader: &mut R,
    offset: u64,
) -> BenchResult<()> {
    if offset == 0 {
        return Ok(());
    }
    let mut remaining = offset;
    if let Some(table) = OffsetTable::load(document_path)? {
        let (byte_offset, lines_to_skip) = table.seek_position(offset);
        reader
            .seek(SeekFrom::Start(byte_offset))
            .map_err(|e| BenchError::Data(format!("cannot seek in [{}]: {e}", document_path.display())))?;
        remaining = lines_to_skip;
    }
    let mut buf = Vec::new();
    for _ in 0..remaining {
        buf.clear();
        let read = reader
            .read_until(b'\n', &mut buf)
            .map_err(|e| BenchError::Data(format!("cannot read [{}]: {e}", document_path.display())))?;
        if read == 0 {
            return Err(BenchError::Data(format!(
                "cannot skip [{offset}] lines in [{}]: file is shorter",
                document_path.display()
            )));
        }
    }
    Ok(())
}
