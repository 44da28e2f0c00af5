//! Post-load workload processors
//!
//! Processors rewrite the loaded workload in a fixed order before the
//! benchmark starts: the task filter prunes the schedules, the test-mode
//! processor shrinks corpora and budgets, the query randomizer marks
//! search operations for per-call bound substitution, and the corpus
//! preparator makes document sets locally available.

use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde_json::json;
use tracing::{debug, info};

use crate::corpus::{Decompressor, DocumentSetPreparator, Downloader};
use crate::error::{BenchError, BenchResult};
use crate::params::search::RANDOMIZATION_KEY;
use crate::util;
use crate::workload::{OperationType, ScheduleNode, TaskFilter, Workload};

/// A transform applied to the workload right after loading.
pub trait WorkloadProcessor {
    fn on_after_load_workload(&self, workload: &mut Workload) -> BenchResult<()>;
}

/// Applies the required processors in their fixed order.
pub struct ProcessorPipeline {
    processors: Vec<Box<dyn WorkloadProcessor>>,
}

impl ProcessorPipeline {
    pub fn new(processors: Vec<Box<dyn WorkloadProcessor>>) -> Self {
        Self {
            processors,
        }
    }

    pub fn apply(&self, workload: &mut Workload) -> BenchResult<()> {
        for processor in &self.processors {
            processor.on_after_load_workload(workload)?;
        }
        Ok(())
    }
}

/// Keeps or drops tasks based on include or exclude filter expressions.
pub struct TaskFilterProcessor {
    filters: Vec<TaskFilter>,
    exclude: bool,
}

impl TaskFilterProcessor {
    /// Build from the configured include and exclude lists; an include
    /// list takes precedence.
    pub fn new(include: &[String], exclude: &[String]) -> BenchResult<Self> {
        let (specs, exclude) = if !include.is_empty() {
            (include, false)
        } else {
            (exclude, true)
        };
        let filters = specs
            .iter()
            .map(|spec| TaskFilter::parse(spec))
            .collect::<BenchResult<Vec<_>>>()?;
        Ok(Self {
            filters,
            exclude,
        })
    }

    fn matches_any(&self, node_matches: impl Fn(&TaskFilter) -> bool) -> bool {
        self.filters.iter().any(node_matches)
    }
}

impl WorkloadProcessor for TaskFilterProcessor {
    fn on_after_load_workload(&self, workload: &mut Workload) -> BenchResult<()> {
        if self.filters.is_empty() {
            return Ok(());
        }
        for procedure in &mut workload.test_procedures {
            let mut kept = Vec::new();
            for node in procedure.schedule.drain(..) {
                let matched = self.matches_any(|f| node.matches(f));
                match node {
                    ScheduleNode::Leaf(task) => {
                        if matched != self.exclude {
                            kept.push(ScheduleNode::Leaf(task));
                        } else {
                            info!(task = %task.name, procedure = %procedure.name, "removing task due to task filter");
                        }
                    }
                    ScheduleNode::Parallel(mut parallel) => {
                        if self.exclude {
                            // children are filtered individually; the group
                            // survives as long as any child does
                            parallel
                                .tasks
                                .retain(|task| !self.matches_any(|f| task.matches(f)));
                            if !parallel.tasks.is_empty() {
                                kept.push(ScheduleNode::Parallel(parallel));
                            }
                        } else if matched {
                            // an include match at the group level keeps the
                            // group's children intact
                            kept.push(ScheduleNode::Parallel(parallel));
                        }
                    }
                }
            }
            procedure.schedule = kept;
        }
        Ok(())
    }
}

/// Shrinks the workload so a full run finishes within seconds: corpora are
/// reduced to their 1k-document variants and every task's budget is capped.
pub struct TestModeProcessor {
    enabled: bool,
}

impl TestModeProcessor {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
        }
    }

    fn shrunk_name(file_name: &str) -> String {
        let (stem, ext) = util::io::split_extension(file_name);
        match ext {
            Some(ext) => format!("{stem}-1k.{ext}"),
            None => format!("{stem}-1k"),
        }
    }
}

impl WorkloadProcessor for TestModeProcessor {
    fn on_after_load_workload(&self, workload: &mut Workload) -> BenchResult<()> {
        if !self.enabled {
            return Ok(());
        }
        info!(workload = %workload.name, "preparing workload for test mode");
        for corpus in &mut workload.corpora {
            for document_set in &mut corpus.documents {
                if !document_set.is_bulk() {
                    continue;
                }
                document_set.number_of_documents = 1000;

                if let Some(archive) = &document_set.document_archive {
                    // insert the suffix before the inner extension and
                    // keep the compression extension
                    let (inner, compression_ext) = util::io::split_extension(archive);
                    let shrunk_inner = Self::shrunk_name(&inner);
                    document_set.document_archive = Some(match compression_ext {
                        Some(ext) => format!("{shrunk_inner}.{ext}"),
                        None => shrunk_inner.clone(),
                    });
                    document_set.document_file = Some(shrunk_inner);
                } else if let Some(file) = &document_set.document_file {
                    document_set.document_file = Some(Self::shrunk_name(file));
                } else {
                    return Err(BenchError::assertion(format!(
                        "Document corpus [{}] has neither compressed nor uncompressed corpus.",
                        corpus.name
                    )));
                }

                // sizes of the shrunk variants are unknown and unchecked
                document_set.compressed_size_in_bytes = None;
                document_set.uncompressed_size_in_bytes = None;
            }
        }

        for procedure in &mut workload.test_procedures {
            for node in &mut procedure.schedule {
                for task in node.leaf_tasks_mut() {
                    // iteration budgets are split across clients; leave at
                    // least one iteration per client
                    let clients = task.clients as u64;
                    if task.warmup_iterations.map(|w| w > clients).unwrap_or(false) {
                        debug!(task = %task.name, "capping warmup iterations for test mode");
                        task.warmup_iterations = Some(clients);
                    }
                    if task.iterations.map(|i| i > clients).unwrap_or(false) {
                        task.iterations = Some(clients);
                    }
                    if task.warmup_time_period.map(|p| p > 0).unwrap_or(false) {
                        task.warmup_time_period = Some(0);
                    }
                    if task.time_period.map(|p| p > 10).unwrap_or(false) {
                        task.time_period = Some(10);
                    }

                    // keep throttling code paths exercised without slowing
                    // down the run
                    if let Some(throughput) = task.target_throughput()? {
                        task.params.remove("target-throughput");
                        task.params.remove("target-interval");
                        task.params.insert(
                            "target-throughput".to_string(),
                            json!(format!("{} {}", i64::MAX, throughput.unit)),
                        );
                    }
                }
            }
        }
        Ok(())
    }
}

/// Marks every search operation for per-call randomization of its range
/// query bounds.
pub struct QueryRandomizerProcessor {
    enabled: bool,
    /// Probability of reusing a value from the pre-saved pool.
    repeat_frequency: f64,
    /// Size of the pre-saved pool.
    pool_size: u64,
}

impl QueryRandomizerProcessor {
    pub const DEFAULT_REPEAT_FREQUENCY: f64 = 0.3;
    pub const DEFAULT_POOL_SIZE: u64 = 5000;

    pub fn new(enabled: bool, repeat_frequency: Option<f64>, pool_size: Option<u64>) -> Self {
        Self {
            enabled,
            repeat_frequency: repeat_frequency.unwrap_or(Self::DEFAULT_REPEAT_FREQUENCY),
            pool_size: pool_size.unwrap_or(Self::DEFAULT_POOL_SIZE),
        }
    }
}

impl WorkloadProcessor for QueryRandomizerProcessor {
    fn on_after_load_workload(&self, workload: &mut Workload) -> BenchResult<()> {
        if !self.enabled {
            return Ok(());
        }
        for procedure in &mut workload.test_procedures {
            for node in &mut procedure.schedule {
                for task in node.leaf_tasks_mut() {
                    if task.operation.op_type() == Some(OperationType::Search) {
                        task.operation.params.insert(
                            RANDOMIZATION_KEY.to_string(),
                            json!({"rf": self.repeat_frequency, "n": self.pool_size}),
                        );
                    }
                }
            }
        }
        Ok(())
    }
}

/// Makes every corpus referenced by the selected procedure locally
/// available before any client starts.
pub struct DefaultCorpusPreparator {
    dataset_cache: PathBuf,
    offline: bool,
    test_mode: bool,
}

impl DefaultCorpusPreparator {
    pub fn new(dataset_cache: impl Into<PathBuf>, offline: bool, test_mode: bool) -> Self {
        Self {
            dataset_cache: dataset_cache.into(),
            offline,
            test_mode,
        }
    }

    /// Names of the corpora actually used by bulk tasks of the selected
    /// procedure; falls back to every corpus when no task names any.
    fn used_corpora(&self, workload: &Workload) -> BenchResult<Vec<String>> {
        let Some(procedure) = workload.selected_test_procedure() else {
            return Ok(Vec::new());
        };
        let mut names = Vec::new();
        for task in procedure.leaf_tasks() {
            let is_bulk = matches!(
                task.operation.op_type(),
                Some(OperationType::Bulk) | Some(OperationType::ProtoBulk) | Some(OperationType::ProduceStreamMessage)
            );
            if !is_bulk {
                continue;
            }
            for corpus in crate::params::bulk::used_corpora(workload, &task.operation.params)? {
                if !names.contains(&corpus.name) {
                    names.push(corpus.name.clone());
                }
            }
        }
        Ok(names)
    }

    /// Download, decompress and verify all referenced document sets.
    /// Blocking; runs once during the prepare phase.
    pub fn prepare(&self, workload: &Workload) -> BenchResult<()> {
        let used = self.used_corpora(workload)?;
        for corpus in workload.corpora.iter().filter(|c| used.contains(&c.name)) {
            if corpus.streaming_ingestion {
                // streamed corpora are produced at run time
                continue;
            }
            let preparator = DocumentSetPreparator::new(
                workload.name.clone(),
                Downloader::new(self.offline, self.test_mode),
                Decompressor,
            );
            let corpus_cache = self.dataset_cache.join(&corpus.name);
            let workload_dir: &Path = &workload.root_dir;
            corpus
                .documents
                .par_iter()
                .filter(|d| d.is_bulk())
                .map(|document_set| {
                    // data bundled next to the workload wins over the cache
                    if preparator.prepare_bundled_document_set(document_set, workload_dir)? {
                        return Ok(());
                    }
                    preparator.prepare_document_set(document_set, &corpus_cache)
                })
                .collect::<BenchResult<Vec<()>>>()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workload::{test_support as wl, DocumentCorpus, Parallel, Params, Task, TestProcedure};
    use serde_json::json;

    fn task_with(name: &str, op_type: &str, tags: &[&str]) -> Task {
        let op = wl::operation(name, op_type, Params::new());
        let mut task = wl::task(name, op);
        task.tags = tags.iter().map(|t| t.to_string()).collect();
        task
    }

    fn procedure_with(schedule: Vec<ScheduleNode>) -> TestProcedure {
        TestProcedure {
            name: "default".to_string(),
            description: None,
            user_info: None,
            meta: None,
            default: true,
            selected: true,
            auto_generated: false,
            parameters: Params::new(),
            schedule,
        }
    }

    fn schedule_names(workload: &Workload) -> Vec<String> {
        workload.test_procedures[0]
            .leaf_tasks()
            .map(|t| t.name.clone())
            .collect()
    }

    #[test]
    fn test_include_filter_with_tags_and_types() {
        let schedule = vec![
            ScheduleNode::Leaf(task_with("idx-1", "bulk", &["a"])),
            ScheduleNode::Leaf(task_with("idx-2", "bulk", &["b"])),
            ScheduleNode::Leaf(task_with("search-1", "search", &[])),
        ];
        let mut workload = wl::workload_with(Vec::new(), Vec::new(), vec![procedure_with(schedule)]);

        let filter =
            TaskFilterProcessor::new(&["tag:a".to_string(), "type:search".to_string()], &[]).unwrap();
        filter.on_after_load_workload(&mut workload).unwrap();
        assert_eq!(schedule_names(&workload), vec!["idx-1", "search-1"]);
    }

    #[test]
    fn test_exclude_filter_prunes_parallel_children() {
        let parallel = Parallel {
            tasks: vec![
                task_with("index-a", "bulk", &[]),
                task_with("cleanup", "delete-index", &[]),
            ],
            clients: None,
        };
        let schedule = vec![
            ScheduleNode::Parallel(parallel),
            ScheduleNode::Leaf(task_with("cleanup-2", "delete-index", &[])),
        ];
        let mut workload = wl::workload_with(Vec::new(), Vec::new(), vec![procedure_with(schedule)]);

        let filter = TaskFilterProcessor::new(&[], &["type:delete-index".to_string()]).unwrap();
        filter.on_after_load_workload(&mut workload).unwrap();
        assert_eq!(schedule_names(&workload), vec!["index-a"]);
    }

    #[test]
    fn test_include_filter_keeps_matching_parallel_intact() {
        let parallel = Parallel {
            tasks: vec![
                task_with("index-a", "bulk", &["keep"]),
                task_with("index-b", "bulk", &[]),
            ],
            clients: None,
        };
        let schedule = vec![
            ScheduleNode::Parallel(parallel),
            ScheduleNode::Leaf(task_with("other", "search", &[])),
        ];
        let mut workload = wl::workload_with(Vec::new(), Vec::new(), vec![procedure_with(schedule)]);

        let filter = TaskFilterProcessor::new(&["tag:keep".to_string()], &[]).unwrap();
        filter.on_after_load_workload(&mut workload).unwrap();
        assert_eq!(schedule_names(&workload), vec!["index-a", "index-b"]);
    }

    #[test]
    fn test_include_filter_is_monotone() {
        let make_workload = || {
            let schedule = vec![
                ScheduleNode::Leaf(task_with("idx-1", "bulk", &["a"])),
                ScheduleNode::Leaf(task_with("idx-2", "bulk", &["b"])),
                ScheduleNode::Leaf(task_with("search-1", "search", &[])),
            ];
            wl::workload_with(Vec::new(), Vec::new(), vec![procedure_with(schedule)])
        };

        let mut small = make_workload();
        TaskFilterProcessor::new(&["tag:a".to_string()], &[])
            .unwrap()
            .on_after_load_workload(&mut small)
            .unwrap();
        let mut large = make_workload();
        TaskFilterProcessor::new(&["tag:a".to_string(), "tag:b".to_string()], &[])
            .unwrap()
            .on_after_load_workload(&mut large)
            .unwrap();

        // the smaller include set yields a subsequence of the larger one
        let small_names = schedule_names(&small);
        let large_names = schedule_names(&large);
        let mut it = large_names.iter();
        assert!(small_names.iter().all(|name| it.any(|l| l == name)));
    }

    #[test]
    fn test_test_mode_shrinks_corpus_and_budgets() {
        let mut corpus = DocumentCorpus::new("taxis", None);
        let mut docs = wl::documents(10_000_000, Some("logs"));
        docs.document_archive = Some("documents-201998.json.bz2".to_string());
        docs.document_file = Some("documents-201998.json".to_string());
        docs.compressed_size_in_bytes = Some(1_000_000);
        docs.uncompressed_size_in_bytes = Some(10_000_000);
        corpus.documents.push(docs);

        let mut task = task_with("index", "bulk", &[]);
        task.clients = 2;
        task.warmup_iterations = Some(100);
        task.iterations = Some(500);
        task.params
            .insert("target-throughput".to_string(), json!("1000 docs/s"));
        let mut timed = task_with("search", "search", &[]);
        timed.warmup_time_period = Some(120);
        timed.time_period = Some(60);

        let schedule = vec![ScheduleNode::Leaf(task), ScheduleNode::Leaf(timed)];
        let mut workload = wl::workload_with(Vec::new(), vec![corpus], vec![procedure_with(schedule)]);

        TestModeProcessor::new(true)
            .on_after_load_workload(&mut workload)
            .unwrap();

        let docs = &workload.corpora[0].documents[0];
        assert_eq!(docs.number_of_documents, 1000);
        assert_eq!(docs.document_archive.as_deref(), Some("documents-201998-1k.json.bz2"));
        assert_eq!(docs.document_file.as_deref(), Some("documents-201998-1k.json"));
        assert_eq!(docs.compressed_size_in_bytes, None);
        assert_eq!(docs.uncompressed_size_in_bytes, None);

        let tasks: Vec<&Task> = workload.test_procedures[0].leaf_tasks().collect();
        assert_eq!(tasks[0].warmup_iterations, Some(2));
        assert_eq!(tasks[0].iterations, Some(2));
        let throughput = tasks[0].target_throughput().unwrap().unwrap();
        assert_eq!(throughput.value, i64::MAX as f64);
        assert_eq!(throughput.unit, "docs/s");
        assert_eq!(tasks[1].warmup_time_period, Some(0));
        assert_eq!(tasks[1].time_period, Some(10));
    }

    #[test]
    fn test_test_mode_disabled_is_a_no_op() {
        let mut corpus = DocumentCorpus::new("taxis", None);
        corpus.documents.push(wl::documents(10_000_000, Some("logs")));
        let mut workload = wl::workload_with(Vec::new(), vec![corpus], Vec::new());

        TestModeProcessor::new(false)
            .on_after_load_workload(&mut workload)
            .unwrap();
        assert_eq!(workload.corpora[0].documents[0].number_of_documents, 10_000_000);
    }

    #[test]
    fn test_query_randomizer_marks_search_operations() {
        let schedule = vec![
            ScheduleNode::Leaf(task_with("search-1", "search", &[])),
            ScheduleNode::Leaf(task_with("index", "bulk", &[])),
        ];
        let mut workload = wl::workload_with(Vec::new(), Vec::new(), vec![procedure_with(schedule)]);

        QueryRandomizerProcessor::new(true, Some(0.5), None)
            .on_after_load_workload(&mut workload)
            .unwrap();

        let tasks: Vec<&Task> = workload.test_procedures[0].leaf_tasks().collect();
        let marker = &tasks[0].operation.params[RANDOMIZATION_KEY];
        assert_eq!(marker["rf"], json!(0.5));
        assert_eq!(marker["n"], json!(QueryRandomizerProcessor::DEFAULT_POOL_SIZE));
        assert!(!tasks[1].operation.params.contains_key(RANDOMIZATION_KEY));
    }

    #[test]
    fn test_preparator_uses_bundled_data() {
        let dir = tempfile::tempdir().unwrap();
        let workload_dir = dir.path().join("workload");
        std::fs::create_dir_all(&workload_dir).unwrap();
        let payload = b"{\"a\":1}\n{\"a\":2}\n";
        std::fs::write(workload_dir.join("docs.json"), payload).unwrap();

        let mut corpus = DocumentCorpus::new("logs", None);
        let mut docs = wl::documents(2, Some("logs"));
        docs.uncompressed_size_in_bytes = Some(payload.len() as u64);
        corpus.documents.push(docs);

        let mut op_params = Params::new();
        op_params.insert("bulk-size".to_string(), json!(100));
        let task = wl::task("index", wl::operation("index", "bulk", op_params));
        let mut workload = wl::workload_with(
            Vec::new(),
            vec![corpus],
            vec![procedure_with(vec![ScheduleNode::Leaf(task)])],
        );
        workload.root_dir = workload_dir.clone();

        DefaultCorpusPreparator::new(dir.path().join("cache"), true, false)
            .prepare(&workload)
            .unwrap();
        // the offset table lands next to the bundled file
        assert!(workload_dir.join("docs.json.offset").is_file());
    }
}
