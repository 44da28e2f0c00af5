//! Parameter-source framework
//!
//! A parameter source turns a task's static parameters into a stream of
//! per-invocation parameter records. One global source is constructed per
//! task; the load-generation layer calls [`ParamSource::partition`] once
//! per client and then loops on [`ClientParamSource::params`] until the
//! runner budget or the source is exhausted. Exhaustion is an ordinary
//! terminator (`Ok(None)`), never an error, and `params()` never blocks.

pub mod admin;
pub mod bulk;
pub mod search;
pub mod vector;

use std::path::PathBuf;
use std::sync::Arc;

use crate::error::BenchResult;
use crate::registry::Registry;
use crate::streaming::IngestionContext;
use crate::workload::Params;

/// Progress of a finite task, e.g. `(42.0, "%")` or `(1.2, "GB")`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TaskProgress {
    pub value: f64,
    pub unit: &'static str,
}

/// Everything a parameter source may need besides the workload itself.
/// Passed explicitly into every factory so sources hold no global state.
pub struct ParamSourceContext {
    /// Per-corpus dataset cache directory root.
    pub dataset_cache: PathBuf,
    /// Directory of the workload definition, tried first for bundled data.
    pub workload_dir: Option<PathBuf>,
    pub ingestion: Arc<IngestionContext>,
    pub registry: Arc<Registry>,
    /// Base RNG seed; partitions derive per-client seeds from it.
    pub seed: u64,
}

impl ParamSourceContext {
    /// Resolve a corpus file against the workload directory and the
    /// per-corpus cache directory. Falls back to the cache location when
    /// the file exists nowhere yet.
    pub fn resolve_document_file(&self, corpus_name: &str, file_name: &str) -> PathBuf {
        let mut candidates = Vec::new();
        if let Some(workload_dir) = &self.workload_dir {
            candidates.push(workload_dir.join(file_name));
        }
        candidates.push(self.dataset_cache.join(corpus_name).join(file_name));
        candidates
            .iter()
            .find(|p| p.is_file())
            .cloned()
            .unwrap_or_else(|| self.dataset_cache.join(corpus_name).join(file_name))
    }
}

/// The per-task, pre-partition half of a parameter source.
pub trait ParamSource: Send + Sync {
    /// Create the per-client instance for `partition_index` out of
    /// `total_partitions`. Calling this twice with the same arguments
    /// yields sources producing equal parameter streams.
    fn partition(
        &self,
        partition_index: u32,
        total_partitions: u32,
    ) -> BenchResult<Box<dyn ClientParamSource>>;
}

/// The per-client half: a stateful generator of invocation parameters.
pub trait ClientParamSource: Send {
    /// The next parameter record, or `None` when this client is done.
    fn params(&mut self) -> BenchResult<Option<Params>>;

    /// Number of records this source will produce, when finite.
    fn size(&self) -> Option<u64> {
        None
    }

    fn infinite(&self) -> bool {
        self.size().is_none()
    }

    fn task_progress(&self) -> Option<TaskProgress> {
        None
    }
}

/// A source that returns the same parameters on every call; used for
/// idempotent operations and as the fallback for user-defined operation
/// types.
#[derive(Clone)]
pub struct ConstantParamSource {
    params: Params,
}

impl ConstantParamSource {
    pub fn new(params: Params) -> Self {
        Self {
            params,
        }
    }
}

impl ParamSource for ConstantParamSource {
    fn partition(&self, _: u32, _: u32) -> BenchResult<Box<dyn ClientParamSource>> {
        Ok(Box::new(self.clone()))
    }
}

impl ClientParamSource for ConstantParamSource {
    fn params(&mut self) -> BenchResult<Option<Params>> {
        Ok(Some(self.params.clone()))
    }
}

/// Copy the driver-global client parameters into a derived record.
pub(crate) fn client_params(original: &Params) -> Params {
    let mut passthrough = Params::new();
    for key in ["request-timeout", "headers", "opaque-id"] {
        passthrough.insert(
            key.to_string(),
            original.get(key).cloned().unwrap_or(serde_json::Value::Null),
        );
    }
    passthrough
}

/// Register the built-in parameter sources for all core operation types.
pub fn register_default_param_sources(registry: &mut Registry) -> BenchResult<()> {
    use crate::workload::OperationType as Op;

    let bulk = bulk::factory();
    for op in [Op::Bulk, Op::ProtoBulk, Op::ProduceStreamMessage] {
        registry.register_param_source_for_operation(op.to_hyphenated_string(), bulk.clone())?;
    }
    // workloads may also name the bulk source explicitly
    registry.register_param_source_for_name("file-reader", bulk)?;

    registry.register_param_source_for_operation(Op::Search.to_hyphenated_string(), search::factory())?;
    registry.register_param_source_for_operation(
        Op::OpenPointInTime.to_hyphenated_string(),
        search::open_pit_factory(),
    )?;
    registry.register_param_source_for_operation(
        Op::ClosePointInTime.to_hyphenated_string(),
        search::close_pit_factory(),
    )?;

    let vector_search = vector::search_factory();
    for op in [Op::VectorSearch, Op::ProtoVectorSearch] {
        registry.register_param_source_for_operation(op.to_hyphenated_string(), vector_search.clone())?;
    }
    registry.register_param_source_for_operation(
        Op::BulkVectorDataSet.to_hyphenated_string(),
        vector::bulk_factory(),
    )?;

    registry.register_param_source_for_operation(Op::Sleep.to_hyphenated_string(), admin::sleep_factory())?;
    registry
        .register_param_source_for_operation(Op::ForceMerge.to_hyphenated_string(), admin::force_merge_factory())?;
    registry
        .register_param_source_for_operation(Op::CreateIndex.to_hyphenated_string(), admin::create_index_factory())?;
    registry
        .register_param_source_for_operation(Op::DeleteIndex.to_hyphenated_string(), admin::delete_index_factory())?;
    registry.register_param_source_for_operation(
        Op::CreateDataStream.to_hyphenated_string(),
        admin::create_data_stream_factory(),
    )?;
    registry.register_param_source_for_operation(
        Op::DeleteDataStream.to_hyphenated_string(),
        admin::delete_data_stream_factory(),
    )?;
    registry.register_param_source_for_operation(
        Op::CreateIndexTemplate.to_hyphenated_string(),
        admin::create_index_template_factory(),
    )?;
    registry.register_param_source_for_operation(
        Op::DeleteIndexTemplate.to_hyphenated_string(),
        admin::delete_index_template_factory(),
    )?;
    registry.register_param_source_for_operation(
        Op::CreateComposableTemplate.to_hyphenated_string(),
        admin::create_composable_template_factory(),
    )?;
    registry.register_param_source_for_operation(
        Op::DeleteComposableTemplate.to_hyphenated_string(),
        admin::delete_index_template_factory(),
    )?;
    registry.register_param_source_for_operation(
        Op::CreateComponentTemplate.to_hyphenated_string(),
        admin::create_component_template_factory(),
    )?;
    registry.register_param_source_for_operation(
        Op::DeleteComponentTemplate.to_hyphenated_string(),
        admin::delete_component_template_factory(),
    )?;
    Ok(())
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// A context backed by temp directories, suitable for unit tests.
    pub fn context(dir: &std::path::Path) -> ParamSourceContext {
        let mut registry = Registry::new();
        register_default_param_sources(&mut registry).unwrap();
        registry.freeze();
        ParamSourceContext {
            dataset_cache: dir.join("data"),
            workload_dir: Some(dir.to_path_buf()),
            ingestion: Arc::new(IngestionContext::new(dir.join("chunks"))),
            registry: Arc::new(registry),
            seed: 42,
        }
    }
}
