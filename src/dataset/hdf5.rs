//! HDF5 dataset support (ann-benchmarks layout)
//!
//! Available behind the `hdf5` cargo feature because it links against the
//! system HDF5 library. The file exposes `train` (ingest vectors), `test`
//! (query vectors) and `neighbors` (ground-truth ids) groups plus the
//! optional `parents` and `attributes` datasets for nested and
//! attribute-annotated variants.

use std::path::Path;

use hdf5::types::VarLenUnicode;

use crate::dataset::{DataSetContext, VectorBatch, VectorDataSet};
use crate::error::{BenchError, BenchResult};

#[derive(Debug)]
pub struct Hdf5DataSet {
    dataset: hdf5::Dataset,
    context: DataSetContext,
    current: u64,
}

impl Hdf5DataSet {
    pub fn open(path: &Path, context: DataSetContext) -> BenchResult<Self> {
        let file = hdf5::File::open(path)
            .map_err(|e| BenchError::Data(format!("cannot open dataset [{}]: {e}", path.display())))?;
        let dataset = file.dataset(context.hdf5_group()).map_err(|e| {
            BenchError::Data(format!(
                "dataset [{}] has no [{}] group: {e}",
                path.display(),
                context.hdf5_group()
            ))
        })?;
        Ok(Self {
            dataset,
            context,
            current: 0,
        })
    }

    fn rows(&self) -> u64 {
        self.dataset.shape().first().copied().unwrap_or(0) as u64
    }
}

impl VectorDataSet for Hdf5DataSet {
    fn read(&mut self, chunk_size: usize) -> BenchResult<VectorBatch> {
        let start = self.current as usize;
        let end = (self.current + chunk_size as u64).min(self.rows()) as usize;
        if start >= end {
            return Ok(match self.context {
                DataSetContext::Neighbors | DataSetContext::Parents => VectorBatch::Int(Vec::new()),
                DataSetContext::Attributes => VectorBatch::Str(Vec::new()),
                _ => VectorBatch::Float(Vec::new()),
            });
        }
        let batch = match self.context {
            DataSetContext::Neighbors | DataSetContext::Parents => {
                let rows = self
                    .dataset
                    .read_slice_2d::<i64, _>((start..end, ..))
                    .map_err(|e| BenchError::Data(format!("cannot read hdf5 rows: {e}")))?;
                VectorBatch::Int(rows.rows().into_iter().map(|r| r.to_vec()).collect())
            }
            DataSetContext::Attributes => {
                let rows = self
                    .dataset
                    .read_slice_2d::<VarLenUnicode, _>((start..end, ..))
                    .map_err(|e| BenchError::Data(format!("cannot read hdf5 rows: {e}")))?;
                VectorBatch::Str(
                    rows.rows()
                        .into_iter()
                        .map(|r| r.iter().map(|v| v.as_str().to_string()).collect())
                        .collect(),
                )
            }
            _ => {
                let rows = self
                    .dataset
                    .read_slice_2d::<f32, _>((start..end, ..))
                    .map_err(|e| BenchError::Data(format!("cannot read hdf5 rows: {e}")))?;
                VectorBatch::Float(rows.rows().into_iter().map(|r| r.to_vec()).collect())
            }
        };
        self.current = end as u64;
        Ok(batch)
    }

    fn seek(&mut self, offset: u64) -> BenchResult<()> {
        if offset >= self.rows() {
            return Err(BenchError::Data(format!(
                "Offset [{offset}] must be less than the data set size [{}]",
                self.rows()
            )));
        }
        self.current = offset;
        Ok(())
    }

    fn size(&mut self) -> BenchResult<u64> {
        Ok(self.rows())
    }

    fn reset(&mut self) -> BenchResult<()> {
        self.current = 0;
        Ok(())
    }
}
