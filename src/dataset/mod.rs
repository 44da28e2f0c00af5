//! Vector dataset readers
//!
//! Vector workloads read their ingest vectors, query vectors and ground
//! truth from dedicated dataset files. Two families are supported: the
//! self-describing HDF5 layout (`train`/`test`/`neighbors` groups, plus
//! `parents` and `attributes` for the nested and attribute-annotated
//! variants) and the binary "bigann" family (`.fbin`, `.u8bin`, `.bin`)
//! with an 8-byte little-endian `(rows, row_length)` header followed by a
//! flat array.

pub mod bigann;
#[cfg(feature = "hdf5")]
pub mod hdf5;

use crate::error::{BenchError, BenchResult};

pub const FORMAT_HDF5: &str = "hdf5";
pub const FORMAT_BIGANN: &str = "bigann";

/// How a dataset is used; selects the HDF5 group and the expected element
/// type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSetContext {
    /// Vectors to ingest.
    Index,
    /// Query vectors.
    Query,
    /// Ground-truth neighbor ids, row per query.
    Neighbors,
    /// Parent ids for nested ingestion.
    Parents,
    /// String/int attribute columns for filtered search.
    Attributes,
}

impl DataSetContext {
    #[cfg(feature = "hdf5")]
    pub(crate) fn hdf5_group(self) -> &'static str {
        match self {
            DataSetContext::Index => "train",
            DataSetContext::Query => "test",
            DataSetContext::Neighbors => "neighbors",
            DataSetContext::Parents => "parents",
            DataSetContext::Attributes => "attributes",
        }
    }
}

/// A batch of rows read from a dataset.
#[derive(Debug, Clone, PartialEq)]
pub enum VectorBatch {
    Float(Vec<Vec<f32>>),
    Int(Vec<Vec<i64>>),
    Str(Vec<Vec<String>>),
}

impl VectorBatch {
    pub fn len(&self) -> usize {
        match self {
            VectorBatch::Float(rows) => rows.len(),
            VectorBatch::Int(rows) => rows.len(),
            VectorBatch::Str(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_floats(self) -> BenchResult<Vec<Vec<f32>>> {
        match self {
            VectorBatch::Float(rows) => Ok(rows),
            _ => Err(BenchError::assertion("expected a float dataset batch")),
        }
    }

    pub fn into_ints(self) -> BenchResult<Vec<Vec<i64>>> {
        match self {
            VectorBatch::Int(rows) => Ok(rows),
            VectorBatch::Float(rows) => Ok(rows
                .into_iter()
                .map(|row| row.into_iter().map(|v| v as i64).collect())
                .collect()),
            _ => Err(BenchError::assertion("expected an integer dataset batch")),
        }
    }

    pub fn into_strings(self) -> BenchResult<Vec<Vec<String>>> {
        match self {
            VectorBatch::Str(rows) => Ok(rows),
            VectorBatch::Int(rows) => Ok(rows
                .into_iter()
                .map(|row| row.into_iter().map(|v| v.to_string()).collect())
                .collect()),
            _ => Err(BenchError::assertion("expected a string dataset batch")),
        }
    }
}

/// Random-access reader over one dataset file.
pub trait VectorDataSet: Send + std::fmt::Debug {
    /// Read up to `chunk_size` rows from the current position. An empty
    /// batch signals the end of the dataset.
    fn read(&mut self, chunk_size: usize) -> BenchResult<VectorBatch>;

    /// Move the reader to the given row offset.
    fn seek(&mut self, offset: u64) -> BenchResult<()>;

    /// Number of rows in the dataset.
    fn size(&mut self) -> BenchResult<u64>;

    /// Move the reader back to the beginning.
    fn reset(&mut self) -> BenchResult<()>;
}

/// Open a dataset of the given format.
pub fn get_data_set(
    data_set_format: &str,
    path: &std::path::Path,
    context: DataSetContext,
) -> BenchResult<Box<dyn VectorDataSet>> {
    match data_set_format {
        FORMAT_BIGANN => Ok(Box::new(bigann::BigAnnDataSet::open(path)?)),
        #[cfg(feature = "hdf5")]
        FORMAT_HDF5 => Ok(Box::new(hdf5::Hdf5DataSet::open(path, context)?)),
        #[cfg(not(feature = "hdf5"))]
        FORMAT_HDF5 => {
            let _ = context;
            Err(BenchError::SystemSetup(
                "hdf5 datasets require this driver to be built with the 'hdf5' feature".to_string(),
            ))
        }
        other => Err(BenchError::WorkloadSyntax(format!(
            "Invalid data set format [{other}]"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_format_is_rejected() {
        let err = get_data_set("parquet", std::path::Path::new("vectors.parquet"), DataSetContext::Index)
            .unwrap_err();
        assert!(matches!(err, BenchError::WorkloadSyntax(_)), "{err}");
    }

    #[cfg(not(feature = "hdf5"))]
    #[test]
    fn test_hdf5_without_feature_is_a_setup_error() {
        let err = get_data_set(FORMAT_HDF5, std::path::Path::new("vectors.hdf5"), DataSetContext::Query)
            .unwrap_err();
        assert!(matches!(err, BenchError::SystemSetup(_)), "{err}");
    }

    #[test]
    fn test_batch_conversions() {
        let ints = VectorBatch::Int(vec![vec![3, 1, 4]]);
        assert_eq!(ints.clone().into_strings().unwrap(), vec![vec!["3", "1", "4"]]);
        assert!(ints.into_floats().is_err());

        let floats = VectorBatch::Float(vec![vec![1.0, 2.0]]);
        assert_eq!(floats.into_ints().unwrap(), vec![vec![1, 2]]);
    }
}
