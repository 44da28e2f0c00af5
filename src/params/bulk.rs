//! Bulk-ingest parameter source
//!
//! Assigns each client a contiguous line range per document set, reads the
//! range through a [`DocsReader`] and emits one bulk request per `params()`
//! call. Rounding at the partition boundaries covers the corpus exactly:
//! no gaps, no overlap, and client 0 always starts at line 0.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;

use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::corpus::reader::{build_conflicting_ids, IdConflictKind, OnConflict};
use crate::corpus::{DocsReader, GenerateActionMetaData, Slice};
use crate::error::{BenchError, BenchResult};
use crate::params::{ClientParamSource, ParamSource, ParamSourceContext, TaskProgress};
use crate::registry::ParamSourceFactory;
use crate::streaming::IngestionContext;
use crate::util::parse;
use crate::workload::{DocumentCorpus, Documents, Params, Workload, SOURCE_FORMAT_BULK};

/// Start offset (in lines), number of documents and number of lines for
/// one client's share of a document set.
pub fn bounds(
    total_docs: u64,
    start_client_index: u32,
    end_client_index: u32,
    num_clients: u32,
    includes_action_and_meta_data: bool,
) -> (u64, u64, u64) {
    let lines_per_doc = if includes_action_and_meta_data {
        2
    } else {
        1
    };
    let docs_per_client = total_docs as f64 / num_clients as f64;
    let start_offset_docs = (docs_per_client * start_client_index as f64).round() as u64;
    let end_offset_docs = (docs_per_client * (end_client_index + 1) as f64).round() as u64;

    let offset_lines = start_offset_docs * lines_per_doc;
    let docs = end_offset_docs - start_offset_docs;
    let lines = docs * lines_per_doc;
    (offset_lines, docs, lines)
}

/// Number of bulk operations the given client range will issue.
pub fn number_of_bulks(
    corpora: &[DocumentCorpus],
    start_client_index: u32,
    end_client_index: u32,
    num_clients: u32,
    bulk_size: u64,
) -> u64 {
    let mut bulks = 0;
    for corpus in corpora {
        for docs in &corpus.documents {
            let (_, num_docs, _) = bounds(
                docs.number_of_documents,
                start_client_index,
                end_client_index,
                num_clients,
                docs.includes_action_and_meta_data,
            );
            bulks += num_docs / bulk_size;
            if num_docs % bulk_size > 0 {
                bulks += 1;
            }
        }
    }
    bulks
}

/// The corpora participating in a bulk task, filtered by the optional
/// `corpora` / `indices` / `data-streams` parameters.
pub(crate) fn used_corpora(workload: &Workload, params: &Params) -> BenchResult<Vec<DocumentCorpus>> {
    let workload_corpora_names: Vec<String> = workload.corpora.iter().map(|c| c.name.clone()).collect();
    let corpora_names: Vec<String> = match params.get("corpora") {
        None => workload_corpora_names.clone(),
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        Some(_) => {
            return Err(BenchError::WorkloadSyntax(
                "'corpora' must be a string or a list of strings".to_string(),
            ))
        }
    };
    let target_indices: Option<Vec<String>> = match params.get("indices") {
        Some(Value::String(s)) => Some(vec![s.clone()]),
        Some(Value::Array(items)) => Some(
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
        ),
        _ => None,
    };
    let target_data_streams: Option<Vec<String>> = match params.get("data-streams") {
        Some(Value::String(s)) => Some(vec![s.clone()]),
        Some(Value::Array(items)) => Some(
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
        ),
        _ => None,
    };

    let mut corpora = Vec::new();
    for corpus in &workload.corpora {
        if !corpora_names.contains(&corpus.name) {
            continue;
        }
        let filtered = corpus.filter(
            SOURCE_FORMAT_BULK,
            target_indices.as_deref(),
            target_data_streams.as_deref(),
        );
        if filtered.streaming_ingestion || filtered.number_of_documents(SOURCE_FORMAT_BULK) > 0 {
            corpora.push(filtered);
        }
    }
    if !workload.corpora.is_empty() && corpora.is_empty() {
        return Err(BenchError::assertion(format!(
            "The provided corpus {corpora_names:?} does not match any of the corpora \
             {workload_corpora_names:?}."
        )));
    }
    Ok(corpora)
}

#[derive(Debug)]
struct BulkConfig {
    corpora: Vec<DocumentCorpus>,
    bulk_size: u64,
    batch_size: u64,
    ingest_percentage: f64,
    id_conflicts: IdConflictKind,
    conflict_probability: f64,
    on_conflict: OnConflict,
    recency: f64,
    pipeline: Option<String>,
    looped: bool,
    original_params: Params,
    dataset_cache: PathBuf,
    workload_dir: Option<PathBuf>,
    ingestion: Arc<IngestionContext>,
    seed: u64,
}

#[derive(Debug)]
pub struct BulkParamSource {
    config: Arc<BulkConfig>,
}

impl BulkParamSource {
    pub fn new(ctx: &ParamSourceContext, workload: &Workload, params: &Params) -> BenchResult<Self> {
        let id_conflicts = IdConflictKind::parse(params.get("conflicts").and_then(Value::as_str))?;
        if params.contains_key("data-streams") && id_conflicts != IdConflictKind::NoConflicts {
            return Err(BenchError::WorkloadSyntax(
                "'conflicts' cannot be used with 'data-streams'".to_string(),
            ));
        }
        let (conflict_probability, on_conflict, recency) = if id_conflicts != IdConflictKind::NoConflicts {
            (
                parse::float_param_in_range(params, "conflict-probability", 25.0, 0.0, 100.0, false)?,
                OnConflict::parse(params.get("on-conflict").and_then(Value::as_str))?,
                parse::float_param_in_range(params, "recency", 0.0, 0.0, 1.0, false)?,
            )
        } else {
            (0.0, OnConflict::Index, 0.0)
        };

        let corpora = used_corpora(workload, params)?;
        if corpora.is_empty() {
            return Err(BenchError::WorkloadSyntax(format!(
                "There is no document corpus definition for workload {}. You must add at least one \
                 before making bulk requests.",
                workload.name
            )));
        }
        for corpus in &corpora {
            for document_set in &corpus.documents {
                if document_set.includes_action_and_meta_data && id_conflicts != IdConflictKind::NoConflicts {
                    let file_name = document_set
                        .document_archive
                        .as_deref()
                        .or(document_set.document_file.as_deref())
                        .unwrap_or("<unknown>");
                    return Err(BenchError::WorkloadSyntax(format!(
                        "Cannot generate id conflicts as [{file_name}] in document corpus [{}] already \
                         contains an action and meta-data line.",
                        corpus.name
                    )));
                }
            }
        }

        let bulk_size = parse::int_param(params, "bulk-size")
            .map_err(|_| BenchError::WorkloadSyntax("Mandatory parameter 'bulk-size' is missing".to_string()))?;
        if bulk_size <= 0 {
            return Err(BenchError::WorkloadSyntax(format!(
                "'bulk-size' must be positive but was {bulk_size}"
            )));
        }
        let bulk_size = bulk_size as u64;
        let batch_size = parse::int_param_or(params, "batch-size", bulk_size as i64)?;
        if batch_size <= 0 {
            return Err(BenchError::WorkloadSyntax(format!(
                "'batch-size' must be positive but was {batch_size}"
            )));
        }
        let batch_size = batch_size as u64;
        if batch_size < bulk_size {
            return Err(BenchError::WorkloadSyntax(
                "'batch-size' must be greater than or equal to 'bulk-size'".to_string(),
            ));
        }
        if batch_size % bulk_size != 0 {
            return Err(BenchError::WorkloadSyntax(
                "'batch-size' must be a multiple of 'bulk-size'".to_string(),
            ));
        }
        let ingest_percentage =
            parse::float_param_in_range(params, "ingest-percentage", 100.0, 0.0, 100.0, true)?;
        let looped = parse::bool_param_or(params, "looped", false)?;
        let pipeline = params.get("pipeline").and_then(Value::as_str).map(str::to_string);

        Ok(Self {
            config: Arc::new(BulkConfig {
                corpora,
                bulk_size,
                batch_size,
                ingest_percentage,
                id_conflicts,
                conflict_probability,
                on_conflict,
                recency,
                pipeline,
                looped,
                original_params: params.clone(),
                dataset_cache: ctx.dataset_cache.clone(),
                workload_dir: ctx.workload_dir.clone(),
                ingestion: Arc::clone(&ctx.ingestion),
                seed: ctx.seed,
            }),
        })
    }
}

impl ParamSource for BulkParamSource {
    fn partition(
        &self,
        partition_index: u32,
        total_partitions: u32,
    ) -> BenchResult<Box<dyn ClientParamSource>> {
        let config = Arc::clone(&self.config);
        let streaming = config.corpora[0].streaming_ingestion;
        let total_bulks = if streaming {
            None
        } else {
            let all_bulks = number_of_bulks(
                &config.corpora,
                partition_index,
                partition_index,
                total_partitions,
                config.bulk_size,
            );
            Some(((all_bulks as f64 * config.ingest_percentage) / 100.0).ceil() as u64)
        };
        Ok(Box::new(PartitionBulkClient {
            config,
            partition_index,
            total_partitions,
            streaming,
            total_bulks,
            current_bulk: 0,
            readers: None,
            current_reader: 0,
            pending: VecDeque::new(),
        }))
    }
}

struct PendingBulk {
    index: Option<String>,
    doc_type: Option<String>,
    docs: u64,
    body: Vec<u8>,
}

struct PartitionBulkClient {
    config: Arc<BulkConfig>,
    partition_index: u32,
    total_partitions: u32,
    streaming: bool,
    total_bulks: Option<u64>,
    current_bulk: u64,
    readers: Option<Vec<DocsReader>>,
    current_reader: usize,
    pending: VecDeque<PendingBulk>,
}

impl PartitionBulkClient {
    fn resolve_document_file(&self, corpus: &DocumentCorpus, docs: &Documents) -> BenchResult<PathBuf> {
        let file_name = docs.document_file.as_deref().ok_or_else(|| {
            BenchError::Data(format!(
                "document set in corpus [{}] has no uncompressed file",
                corpus.name
            ))
        })?;
        let mut candidates = Vec::new();
        if let Some(workload_dir) = &self.config.workload_dir {
            candidates.push(workload_dir.join(file_name));
        }
        candidates.push(self.config.dataset_cache.join(&corpus.name).join(file_name));
        Ok(candidates
            .iter()
            .find(|p| p.is_file())
            .cloned()
            .unwrap_or_else(|| self.config.dataset_cache.join(&corpus.name).join(file_name)))
    }

    fn create_reader(
        &self,
        corpus: &DocumentCorpus,
        docs: &Documents,
        offset_lines: u64,
        num_docs: u64,
        num_lines: u64,
    ) -> BenchResult<DocsReader> {
        let config = &self.config;
        let (target, use_create) = if let Some(index) = &docs.target_index {
            (Some(index.clone()), false)
        } else if let Some(data_stream) = &docs.target_data_stream {
            if config.id_conflicts != IdConflictKind::NoConflicts {
                // documents can only be created, never updated, in a
                // data stream
                return Err(BenchError::WorkloadSyntax(
                    "Conflicts cannot be generated with append only data streams".to_string(),
                ));
            }
            (Some(data_stream.clone()), true)
        } else {
            (None, false)
        };

        let lines_per_doc = docs.lines_per_document() as usize;
        let lines_per_iteration = config.bulk_size as usize * lines_per_doc;
        let slice = if corpus.streaming_ingestion {
            let base_url = docs.base_url.as_deref().ok_or_else(|| {
                BenchError::WorkloadSyntax(format!(
                    "streaming corpus [{}] declares no base-url",
                    corpus.name
                ))
            })?;
            let key = docs.document_file.clone().ok_or_else(|| {
                BenchError::WorkloadSyntax(format!(
                    "streaming corpus [{}] declares no source file",
                    corpus.name
                ))
            })?;
            config.ingestion.ensure_producer(base_url, vec![key])?;
            Slice::open_streaming(Arc::clone(&config.ingestion), lines_per_iteration)
        } else {
            let path = self.resolve_document_file(corpus, docs)?;
            info!(
                client = self.partition_index,
                docs = num_docs,
                offset = offset_lines,
                file = %path.display(),
                "client will bulk index documents"
            );
            Slice::open_file(&path, offset_lines, num_lines, lines_per_iteration)?
        };

        if docs.includes_action_and_meta_data {
            Ok(DocsReader::source_only(
                slice,
                config.batch_size,
                target,
                docs.target_type.clone(),
            ))
        } else {
            let mut rng = Xoshiro256PlusPlus::seed_from_u64(
                config.seed.wrapping_add(self.partition_index as u64),
            );
            let conflicting_ids = build_conflicting_ids(
                config.id_conflicts,
                num_docs,
                offset_lines / docs.lines_per_document(),
                &mut rng,
            );
            let generator = GenerateActionMetaData::new(
                target.as_deref(),
                docs.target_type.as_deref(),
                conflicting_ids,
                config.conflict_probability,
                config.on_conflict,
                config.recency,
                use_create,
                config.seed.wrapping_add(self.partition_index as u64),
            )?;
            Ok(DocsReader::with_metadata(
                slice,
                config.batch_size,
                generator,
                target,
                docs.target_type.clone(),
            ))
        }
    }

    fn init_readers(&mut self) -> BenchResult<()> {
        let mut readers = Vec::new();
        let corpora = self.config.corpora.clone();
        for corpus in &corpora {
            for docs in &corpus.documents {
                if corpus.streaming_ingestion {
                    readers.push(self.create_reader(corpus, docs, 0, 0, 0)?);
                } else {
                    let (offset_lines, num_docs, num_lines) = bounds(
                        docs.number_of_documents,
                        self.partition_index,
                        self.partition_index,
                        self.total_partitions,
                        docs.includes_action_and_meta_data,
                    );
                    if num_docs > 0 {
                        readers.push(self.create_reader(corpus, docs, offset_lines, num_docs, num_lines)?);
                    } else {
                        debug!(
                            client = self.partition_index,
                            corpus = %corpus.name,
                            "client skips corpus (no documents to read)"
                        );
                    }
                }
            }
        }
        self.readers = Some(readers);
        self.current_reader = 0;
        self.pending.clear();
        Ok(())
    }

    fn next_pending(&mut self) -> BenchResult<Option<PendingBulk>> {
        loop {
            if let Some(bulk) = self.pending.pop_front() {
                return Ok(Some(bulk));
            }
            let readers = self.readers.as_mut().expect("readers initialized");
            let Some(reader) = readers.get_mut(self.current_reader) else {
                return Ok(None);
            };
            match reader.next_batch()? {
                Some(batch) => {
                    for (docs, body) in batch.bulks {
                        self.pending.push_back(PendingBulk {
                            index: batch.index.clone(),
                            doc_type: batch.doc_type.clone(),
                            docs,
                            body,
                        });
                    }
                }
                None => {
                    self.current_reader += 1;
                }
            }
        }
    }
}

impl ClientParamSource for PartitionBulkClient {
    fn params(&mut self) -> BenchResult<Option<Params>> {
        if self.readers.is_none() {
            self.init_readers()?;
        }
        if let Some(total) = self.total_bulks {
            // always derived from all files so ingest-percentage can stop
            // the client early
            if self.current_bulk >= total {
                if self.config.looped {
                    self.current_bulk = 0;
                    self.init_readers()?;
                } else {
                    return Ok(None);
                }
            }
        }
        let Some(bulk) = self.next_pending()? else {
            return Ok(None);
        };
        self.current_bulk += 1;

        let mut params = self.config.original_params.clone();
        params.insert("index".to_string(), bulk.index.map(Value::from).unwrap_or(Value::Null));
        params.insert(
            "type".to_string(),
            bulk.doc_type.map(Value::from).unwrap_or(Value::Null),
        );
        // the body always interleaves meta-data lines: either the source
        // file carried them or the generator added them
        params.insert("action-metadata-present".to_string(), json!(true));
        let body = String::from_utf8(bulk.body)
            .map_err(|e| BenchError::Data(format!("bulk body is not valid UTF-8: {e}")))?;
        params.insert("body".to_string(), Value::String(body));
        // the final bulk of a partition may hold fewer documents
        params.insert("bulk-size".to_string(), json!(bulk.docs));
        params.insert("unit".to_string(), json!("docs"));
        if let Some(pipeline) = &self.config.pipeline {
            params.insert("pipeline".to_string(), json!(pipeline));
        }
        Ok(Some(params))
    }

    fn size(&self) -> Option<u64> {
        if self.config.looped {
            return None;
        }
        self.total_bulks
    }

    fn task_progress(&self) -> Option<TaskProgress> {
        if self.streaming {
            let gb = self.config.ingestion.consumed_bytes() as f64 / 1_000_000_000.0;
            Some(TaskProgress {
                value: gb,
                unit: "GB",
            })
        } else {
            self.total_bulks.filter(|total| *total > 0).map(|total| TaskProgress {
                value: self.current_bulk as f64 / total as f64,
                unit: "%",
            })
        }
    }
}

pub fn factory() -> ParamSourceFactory {
    Arc::new(|ctx, workload, params, _operation_name| {
        Ok(Box::new(BulkParamSource::new(ctx, workload, params)?) as Box<dyn ParamSource>)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::test_support;
    use crate::workload::test_support as wl;

    fn params(value: Value) -> Params {
        value.as_object().unwrap().clone()
    }

    fn corpus_with_docs(num_docs: u64) -> DocumentCorpus {
        let mut corpus = DocumentCorpus::new("logs", None);
        corpus.documents.push(wl::documents(num_docs, Some("logs")));
        corpus
    }

    fn write_corpus_file(dir: &std::path::Path, num_docs: usize) {
        let mut content = String::new();
        for i in 0..num_docs {
            content.push_str(&format!("{{\"id\": {i}}}\n"));
        }
        std::fs::write(dir.join("docs.json"), content).unwrap();
    }

    #[test]
    fn test_bounds_cover_corpus_exactly() {
        // 10 documents over 4 clients: 3/2/3/2 with adjacent offsets
        let expected = [(0, 3, 3), (3, 2, 2), (5, 3, 3), (8, 2, 2)];
        for (client, want) in expected.iter().enumerate() {
            assert_eq!(bounds(10, client as u32, client as u32, 4, false), *want);
        }
        // action-and-meta-data doubles the line numbers
        assert_eq!(bounds(10, 1, 1, 4, true), (6, 2, 4));
    }

    #[test]
    fn test_bounds_edges() {
        for num_clients in [1u32, 2, 3, 7, 16] {
            let total: u64 = 1000;
            let mut covered = 0;
            let mut next_offset = 0;
            for client in 0..num_clients {
                let (offset, docs, _) = bounds(total, client, client, num_clients, false);
                assert_eq!(offset, next_offset, "gap before client {client}");
                next_offset = offset + docs;
                covered += docs;
            }
            assert_eq!(covered, total);
        }
    }

    #[test]
    fn test_number_of_bulks_counts_partial_bulks() {
        let corpora = vec![corpus_with_docs(10)];
        // ceil(3/5) + ceil(2/5) + ceil(3/5) + ceil(2/5) = 4
        let total: u64 = (0..4).map(|c| number_of_bulks(&corpora, c, c, 4, 5)).sum();
        assert_eq!(total, 4);
    }

    fn bulk_workload(num_docs: u64) -> Workload {
        wl::workload_with(
            vec![crate::workload::Index::new("logs", None)],
            vec![corpus_with_docs(num_docs)],
            Vec::new(),
        )
    }

    fn collect_stream(
        source: &dyn ParamSource,
        partition: u32,
        total: u32,
    ) -> Vec<Params> {
        let mut client = source.partition(partition, total).unwrap();
        let mut records = Vec::new();
        while let Some(record) = client.params().unwrap() {
            records.push(record);
            if records.len() > 100 {
                break;
            }
        }
        records
    }

    #[test]
    fn test_partitioned_clients_cover_corpus_without_overlap() {
        let dir = tempfile::tempdir().unwrap();
        write_corpus_file(dir.path(), 10);
        let ctx = test_support::context(dir.path());
        let workload = bulk_workload(10);
        let source = BulkParamSource::new(&ctx, &workload, &params(json!({"bulk-size": 5}))).unwrap();

        let mut all_docs = Vec::new();
        let expected_docs = [3u64, 2, 3, 2];
        for client in 0..4 {
            let records = collect_stream(&source, client, 4);
            assert_eq!(records.len(), 1, "client {client} should send one bulk");
            let record = &records[0];
            assert_eq!(record["index"], json!("logs"));
            assert_eq!(record["unit"], json!("docs"));
            assert_eq!(record["action-metadata-present"], json!(true));
            assert_eq!(record["bulk-size"], json!(expected_docs[client as usize]));
            let body = record["body"].as_str().unwrap();
            for line in body.lines().skip(1).step_by(2) {
                all_docs.push(line.to_string());
            }
        }
        let expected: Vec<String> = (0..10).map(|i| format!("{{\"id\": {i}}}")).collect();
        assert_eq!(all_docs, expected);
    }

    #[test]
    fn test_partition_streams_are_reproducible() {
        let dir = tempfile::tempdir().unwrap();
        write_corpus_file(dir.path(), 10);
        let ctx = test_support::context(dir.path());
        let workload = bulk_workload(10);
        let source = BulkParamSource::new(
            &ctx,
            &workload,
            &params(json!({"bulk-size": 2, "conflicts": "random", "conflict-probability": 50})),
        )
        .unwrap();

        let first = collect_stream(&source, 1, 2);
        let second = collect_stream(&source, 1, 2);
        assert!(!first.is_empty());
        assert_eq!(first, second);
    }

    #[test]
    fn test_ingest_percentage_caps_total_bulks() {
        let dir = tempfile::tempdir().unwrap();
        write_corpus_file(dir.path(), 10);
        let ctx = test_support::context(dir.path());
        let workload = bulk_workload(10);
        let source = BulkParamSource::new(
            &ctx,
            &workload,
            &params(json!({"bulk-size": 2, "ingest-percentage": 50})),
        )
        .unwrap();

        // a single client has 5 bulks; 50% caps at ceil(2.5) = 3
        let records = collect_stream(&source, 0, 1);
        assert_eq!(records.len(), 3);
        let client = source.partition(0, 1).unwrap();
        assert_eq!(client.size(), Some(3));
    }

    #[test]
    fn test_looped_source_restarts_from_the_beginning() {
        let dir = tempfile::tempdir().unwrap();
        write_corpus_file(dir.path(), 4);
        let ctx = test_support::context(dir.path());
        let workload = bulk_workload(4);
        let source = BulkParamSource::new(
            &ctx,
            &workload,
            &params(json!({"bulk-size": 2, "looped": true})),
        )
        .unwrap();

        let mut client = source.partition(0, 1).unwrap();
        assert!(client.infinite());
        let first = client.params().unwrap().unwrap();
        let _second = client.params().unwrap().unwrap();
        // the third call wraps around to the first bulk
        let third = client.params().unwrap().unwrap();
        assert_eq!(first["body"], third["body"]);
    }

    #[test]
    fn test_progress_is_fraction_of_total_bulks() {
        let dir = tempfile::tempdir().unwrap();
        write_corpus_file(dir.path(), 10);
        let ctx = test_support::context(dir.path());
        let workload = bulk_workload(10);
        let source =
            BulkParamSource::new(&ctx, &workload, &params(json!({"bulk-size": 5}))).unwrap();

        let mut client = source.partition(0, 1).unwrap();
        client.params().unwrap().unwrap();
        let progress = client.task_progress().unwrap();
        assert_eq!(progress.unit, "%");
        assert!((progress.value - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_validation_errors() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_support::context(dir.path());
        let workload = bulk_workload(10);

        // missing bulk size
        assert!(BulkParamSource::new(&ctx, &workload, &params(json!({}))).is_err());
        // non-positive bulk size
        assert!(BulkParamSource::new(&ctx, &workload, &params(json!({"bulk-size": 0}))).is_err());
        // batch size must be a multiple of bulk size
        assert!(BulkParamSource::new(
            &ctx,
            &workload,
            &params(json!({"bulk-size": 4, "batch-size": 6}))
        )
        .is_err());
        // unknown conflicts value
        assert!(BulkParamSource::new(
            &ctx,
            &workload,
            &params(json!({"bulk-size": 4, "conflicts": "always"}))
        )
        .is_err());
        // conflicts cannot be combined with data streams
        assert!(BulkParamSource::new(
            &ctx,
            &workload,
            &params(json!({"bulk-size": 4, "conflicts": "random", "data-streams": "logs-ds"}))
        )
        .is_err());
        // ingest percentage is exclusive at zero
        assert!(BulkParamSource::new(
            &ctx,
            &workload,
            &params(json!({"bulk-size": 4, "ingest-percentage": 0}))
        )
        .is_err());
    }

    #[test]
    fn test_conflicts_with_embedded_meta_data_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_support::context(dir.path());
        let mut corpus = DocumentCorpus::new("logs", None);
        let mut docs = wl::documents(10, Some("logs"));
        docs.includes_action_and_meta_data = true;
        docs.target_index = None;
        corpus.documents.push(docs);
        let workload = wl::workload_with(
            vec![crate::workload::Index::new("logs", None)],
            vec![corpus],
            Vec::new(),
        );

        let err = BulkParamSource::new(
            &ctx,
            &workload,
            &params(json!({"bulk-size": 4, "conflicts": "random"})),
        )
        .unwrap_err();
        assert!(err.to_string().contains("already contains an action"), "{err}");
    }

    #[test]
    fn test_unknown_corpus_filter_is_an_assertion() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_support::context(dir.path());
        let workload = bulk_workload(10);
        let err = BulkParamSource::new(
            &ctx,
            &workload,
            &params(json!({"bulk-size": 4, "corpora": "missing"})),
        )
        .unwrap_err();
        assert!(matches!(err, BenchError::Assertion(_)), "{err}");
    }
}
