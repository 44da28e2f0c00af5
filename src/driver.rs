//! Benchmark driver orchestration
//!
//! Wires configuration, workload loading, post-load processors and the
//! parameter-source registry together. Scheduling and operation execution
//! live outside this crate; the driver hands each task a partitioned
//! parameter source and the registry's runner binding.

use std::sync::Arc;

use tracing::info;

use crate::config::DriverConfig;
use crate::error::BenchResult;
use crate::params::{self, ParamSourceContext};
use crate::registry::Registry;
use crate::streaming::IngestionContext;
use crate::workload::processor::{
    DefaultCorpusPreparator, ProcessorPipeline, QueryRandomizerProcessor, TaskFilterProcessor,
    TestModeProcessor, WorkloadProcessor,
};
use crate::workload::reader::WorkloadFileReader;
use crate::workload::{Task, Workload};

/// Load the configured workload and run all post-load processors over it.
pub fn load_workload(config: &DriverConfig) -> BenchResult<Workload> {
    let reader = WorkloadFileReader::new(config.workload_params.clone(), config.test_procedure.clone());
    let mut workload = reader.read(&config.workload_name, &config.workload_file)?;

    let processors: Vec<Box<dyn WorkloadProcessor>> = vec![
        Box::new(TaskFilterProcessor::new(&config.include_tasks, &config.exclude_tasks)?),
        Box::new(TestModeProcessor::new(config.test_mode)),
        Box::new(QueryRandomizerProcessor::new(
            config.randomization.enabled,
            config.randomization.repeat_frequency,
            config.randomization.pool_size,
        )),
    ];
    ProcessorPipeline::new(processors).apply(&mut workload)?;
    info!(workload = %workload.name, "workload loaded");
    Ok(workload)
}

/// Prepare all corpora referenced by the selected test procedure.
pub fn prepare_corpora(config: &DriverConfig, workload: &Workload) -> BenchResult<()> {
    DefaultCorpusPreparator::new(config.dataset_cache.clone(), config.offline, config.test_mode)
        .prepare(workload)
}

/// Build the frozen registry and shared context used by all parameter
/// sources of one benchmark run.
pub fn build_param_source_context(config: &DriverConfig) -> BenchResult<ParamSourceContext> {
    let mut registry = Registry::new();
    params::register_default_param_sources(&mut registry)?;
    registry.freeze();
    Ok(ParamSourceContext {
        dataset_cache: config.dataset_cache.clone(),
        workload_dir: config.workload_file.parent().map(|p| p.to_path_buf()),
        ingestion: Arc::new(IngestionContext::new(config.chunk_dir.clone())),
        registry: Arc::new(registry),
        seed: config.seed,
    })
}

/// Resolve the parameter source for one task and create its per-client
/// partitions.
pub fn partition_task(
    ctx: &ParamSourceContext,
    workload: &Workload,
    task: &Task,
) -> BenchResult<Vec<Box<dyn params::ClientParamSource>>> {
    let source = ctx
        .registry
        .param_source_for_operation(ctx, workload, &task.operation, &task.name)?;
    (0..task.clients)
        .map(|client| source.partition(client, task.clients))
        .collect()
}
