//! BigANN binary dataset family
//!
//! Layout: a 4-byte little-endian row count, a 4-byte little-endian row
//! length, then `rows * row_length` values whose width the extension
//! implies (`.fbin` float32, `.u8bin` unsigned byte). Ground-truth files
//! (`.bin`) carry two full blocks after the header: neighbor ids followed
//! by the corresponding distances, so their expected size doubles.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::dataset::{VectorBatch, VectorDataSet};
use crate::error::{BenchError, BenchResult};

const HEADER_LENGTH: u64 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ElementKind {
    Float32,
    UInt8,
    /// Unsigned 32-bit neighbor ids with a trailing distances block.
    GroundTruthIds,
}

impl ElementKind {
    fn from_extension(path: &Path) -> BenchResult<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("fbin") => Ok(ElementKind::Float32),
            Some("u8bin") => Ok(ElementKind::UInt8),
            Some("bin") => Ok(ElementKind::GroundTruthIds),
            other => Err(BenchError::Data(format!(
                "Unknown extension [{}], supported extensions are: fbin, u8bin, bin",
                other.unwrap_or("<none>")
            ))),
        }
    }

    fn bytes_per_value(self) -> u64 {
        match self {
            ElementKind::Float32 => 4,
            ElementKind::UInt8 => 1,
            ElementKind::GroundTruthIds => 4,
        }
    }

    /// Ground-truth files store ids plus a companion distances block.
    fn payload_blocks(self) -> u64 {
        match self {
            ElementKind::GroundTruthIds => 2,
            _ => 1,
        }
    }
}

/// Reader over one BigANN file. The header is parsed lazily on first use.
#[derive(Debug)]
pub struct BigAnnDataSet {
    path: PathBuf,
    kind: ElementKind,
    state: Option<OpenState>,
    current: u64,
}

#[derive(Debug)]
struct OpenState {
    reader: BufReader<File>,
    rows: u64,
    row_length: u64,
}

impl BigAnnDataSet {
    pub fn open(path: &Path) -> BenchResult<Self> {
        Ok(Self {
            path: path.to_path_buf(),
            kind: ElementKind::from_extension(path)?,
            state: None,
            current: 0,
        })
    }

    fn ensure_open(&mut self) -> BenchResult<()> {
        if self.state.is_none() {
            let file = File::open(&self.path)
                .map_err(|e| BenchError::Data(format!("cannot open dataset [{}]: {e}", self.path.display())))?;
            let num_bytes = file
                .metadata()
                .map_err(|e| BenchError::Data(format!("cannot stat dataset [{}]: {e}", self.path.display())))?
                .len();
            if num_bytes < HEADER_LENGTH {
                return Err(BenchError::Data(format!(
                    "Invalid file [{}]: file size cannot be less than {HEADER_LENGTH} bytes",
                    self.path.display()
                )));
            }
            let mut reader = BufReader::new(file);
            let mut header = [0u8; 8];
            reader
                .read_exact(&mut header)
                .map_err(|e| BenchError::Data(format!("cannot read dataset header [{}]: {e}", self.path.display())))?;
            let rows = u32::from_le_bytes(header[0..4].try_into().unwrap()) as u64;
            let row_length = u32::from_le_bytes(header[4..8].try_into().unwrap()) as u64;

            let expected =
                HEADER_LENGTH + self.kind.payload_blocks() * rows * row_length * self.kind.bytes_per_value();
            if num_bytes != expected {
                return Err(BenchError::Data(format!(
                    "Invalid file [{}]. File size [{num_bytes}] does not match the expected [{expected}] \
                     bytes derived from [{rows}] rows of length [{row_length}]",
                    self.path.display()
                )));
            }
            self.state = Some(OpenState {
                reader,
                rows,
                row_length,
            });
        }
        Ok(())
    }

    fn dims(&self) -> (u64, u64) {
        let state = self.state.as_ref().expect("dataset opened");
        (state.rows, state.row_length)
    }
}

impl VectorDataSet for BigAnnDataSet {
    fn read(&mut self, chunk_size: usize) -> BenchResult<VectorBatch> {
        self.ensure_open()?;
        let kind = self.kind;
        let (rows, row_length) = self.dims();
        let remaining = rows.saturating_sub(self.current);
        let to_read = remaining.min(chunk_size as u64);
        let row_length = row_length as usize;
        let path = self.path.clone();

        let mut raw = vec![0u8; to_read as usize * row_length * kind.bytes_per_value() as usize];
        self.state
            .as_mut()
            .expect("dataset opened")
            .reader
            .read_exact(&mut raw)
            .map_err(|e| BenchError::Data(format!("cannot read dataset [{}]: {e}", path.display())))?;
        self.current += to_read;

        let batch = match kind {
            ElementKind::Float32 => VectorBatch::Float(
                raw.chunks_exact(4)
                    .map(|c| f32::from_le_bytes(c.try_into().unwrap()))
                    .collect::<Vec<f32>>()
                    .chunks(row_length)
                    .map(|row| row.to_vec())
                    .collect(),
            ),
            ElementKind::UInt8 => VectorBatch::Float(
                raw.iter()
                    .map(|&b| b as f32)
                    .collect::<Vec<f32>>()
                    .chunks(row_length)
                    .map(|row| row.to_vec())
                    .collect(),
            ),
            ElementKind::GroundTruthIds => VectorBatch::Int(
                raw.chunks_exact(4)
                    .map(|c| u32::from_le_bytes(c.try_into().unwrap()) as i64)
                    .collect::<Vec<i64>>()
                    .chunks(row_length)
                    .map(|row| row.to_vec())
                    .collect(),
            ),
        };
        Ok(batch)
    }

    fn seek(&mut self, offset: u64) -> BenchResult<()> {
        self.ensure_open()?;
        let kind = self.kind;
        let (rows, row_length) = self.dims();
        if offset >= rows {
            return Err(BenchError::Data(format!(
                "Offset [{offset}] must be less than the data set size [{rows}]"
            )));
        }
        let byte_offset = HEADER_LENGTH + offset * row_length * kind.bytes_per_value();
        let path = self.path.clone();
        self.state
            .as_mut()
            .expect("dataset opened")
            .reader
            .seek(SeekFrom::Start(byte_offset))
            .map_err(|e| BenchError::Data(format!("cannot seek in dataset [{}]: {e}", path.display())))?;
        self.current = offset;
        Ok(())
    }

    fn size(&mut self) -> BenchResult<u64> {
        self.ensure_open()?;
        Ok(self.dims().0)
    }

    fn reset(&mut self) -> BenchResult<()> {
        let path = self.path.clone();
        if let Some(state) = self.state.as_mut() {
            state
                .reader
                .seek(SeekFrom::Start(HEADER_LENGTH))
                .map_err(|e| BenchError::Data(format!("cannot seek in dataset [{}]: {e}", path.display())))?;
        }
        self.current = 0;
        Ok(())
    }
}
