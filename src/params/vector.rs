//! Vector dataset parameter sources
//!
//! The vector search source emits one k-NN query per call, pairing each
//! query vector with its ground-truth neighbors; the bulk source reads
//! vectors in `bulk_size` batches and emits ready-made bulk payloads,
//! optionally grouped into nested documents by a parallel parent-id
//! dataset or annotated with attribute columns for filtered search.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::{json, Value};

use crate::dataset::{get_data_set, DataSetContext, VectorDataSet};
use crate::error::{BenchError, BenchResult};
use crate::params::{ClientParamSource, ParamSource, ParamSourceContext, TaskProgress};
use crate::registry::ParamSourceFactory;
use crate::util::parse;
use crate::workload::{Params, Workload};

const NESTED_FIELD_SEPARATOR: char = '.';

/// A dot-path field (e.g. `parent.embedding`) wraps queries in a `nested`
/// clause and groups bulk documents by parent.
fn split_nested_field(field: &str) -> BenchResult<(String, String)> {
    let parts: Vec<&str> = field.split(NESTED_FIELD_SEPARATOR).collect();
    if parts.len() != 2 {
        return Err(BenchError::WorkloadSyntax(format!(
            "Field name {field} is not a nested field name. Only one level of nesting is supported."
        )));
    }
    Ok((parts[0].to_string(), parts[1].to_string()))
}

/// Shared dataset configuration: format, location (file path or corpus)
/// and the vector budget.
struct DataSetSpec {
    field: String,
    format: String,
    path: Option<String>,
    corpus: Option<String>,
    total_num_vectors: Option<u64>,
}

impl DataSetSpec {
    fn from_params(params: &Params) -> BenchResult<Self> {
        let field = parse::string_param(params, "field")?;
        let format = parse::string_param(params, "data_set_format")?;
        let path = parse::opt_string_param(params, "data_set_path")?;
        let corpus = parse::opt_string_param(params, "data_set_corpus")?;
        if path.is_none() && corpus.is_none() {
            return Err(BenchError::WorkloadSyntax(
                "Dataset is missing. Provide either dataset file path or valid corpus.".to_string(),
            ));
        }
        if path.is_some() && corpus.is_some() {
            return Err(BenchError::WorkloadSyntax(
                "Provide either dataset file path or corpus, but not both.".to_string(),
            ));
        }
        let total_num_vectors = match parse::int_param_or(params, "num_vectors", -1)? {
            n if n < 0 => None,
            n => Some(n as u64),
        };
        Ok(Self {
            field,
            format,
            path,
            corpus,
            total_num_vectors,
        })
    }

    fn is_nested(&self) -> bool {
        self.field.contains(NESTED_FIELD_SEPARATOR)
    }
}

/// Resolve a corpus name to the single document file backing a dataset.
fn corpus_file_path(
    ctx: &ParamSourceContext,
    workload: &Workload,
    corpus_name: &str,
    source_format: &str,
) -> BenchResult<PathBuf> {
    let corpus = workload
        .corpora
        .iter()
        .find(|c| c.name == corpus_name)
        .ok_or_else(|| {
            let known: Vec<&str> = workload.corpora.iter().map(|c| c.name.as_str()).collect();
            BenchError::WorkloadSyntax(format!(
                "The provided corpus {corpus_name} does not match any of the corpora {known:?}."
            ))
        })?;
    let files: Vec<String> = corpus
        .documents
        .iter()
        .filter(|d| d.source_format == source_format)
        .filter_map(|d| d.document_file.clone())
        .collect();
    if files.is_empty() {
        return Err(BenchError::WorkloadSyntax(
            "Dataset is missing. Provide either dataset file path or valid corpus.".to_string(),
        ));
    }
    if files.len() > 1 {
        return Err(BenchError::WorkloadSyntax(format!(
            "Vector search does not support more than one document file path {files:?}."
        )));
    }
    Ok(ctx.resolve_document_file(corpus_name, &files[0]))
}

fn resolve_data_set_path(
    ctx: &ParamSourceContext,
    workload: &Workload,
    spec_path: &Option<String>,
    spec_corpus: &Option<String>,
    format: &str,
) -> BenchResult<PathBuf> {
    match (spec_path, spec_corpus) {
        (Some(path), _) => Ok(PathBuf::from(path)),
        (None, Some(corpus)) => corpus_file_path(ctx, workload, corpus, format),
        (None, None) => Err(BenchError::WorkloadSyntax(
            "Dataset is missing. Provide either dataset file path or valid corpus.".to_string(),
        )),
    }
}

/// The contiguous vector range assigned to one partition: equal shares,
/// with the remainder going to the last client.
fn partition_range(total_vectors: u64, partition_index: u32, total_partitions: u32) -> (u64, u64) {
    let min_per_partition = total_vectors / total_partitions as u64;
    let offset = partition_index as u64 * min_per_partition;
    let mut num_vectors = min_per_partition;
    if partition_index == total_partitions - 1 {
        num_vectors += total_vectors - min_per_partition * total_partitions as u64;
    }
    (offset, num_vectors)
}

// ---------------------------------------------------------------------------
// vector search
// ---------------------------------------------------------------------------

struct VectorSearchParamSource {
    query_params: Params,
    spec_field: String,
    data_format: String,
    data_path_spec: Option<String>,
    data_corpus: Option<String>,
    total_num_vectors: Option<u64>,
    k: usize,
    repetitions: u64,
    neighbors_format: String,
    neighbors_path_spec: Option<String>,
    neighbors_corpus: Option<String>,
    filter_type: Option<String>,
    filter_body: Option<Value>,
    is_nested: bool,
    dataset_cache: PathBuf,
    workload_dir: Option<PathBuf>,
    workload: Workload,
    registry: Arc<crate::registry::Registry>,
    ingestion: Arc<crate::streaming::IngestionContext>,
    seed: u64,
}

impl VectorSearchParamSource {
    fn new(ctx: &ParamSourceContext, workload: &Workload, params: &Params, op_name: &str) -> BenchResult<Self> {
        let mut query_params = super::search::build_query_params(workload, params, op_name)?;
        let spec = DataSetSpec::from_params(params)?;
        let k = parse::int_param(params, "k")?;
        if k <= 0 {
            return Err(BenchError::WorkloadSyntax(format!(
                "'k' must be positive but was {k}"
            )));
        }
        let repetitions = parse::int_param_or(params, "repetitions", 1)?.max(1) as u64;
        let neighbors_format = parse::string_param_or(params, "neighbors_data_set_format", &spec.format)?;
        let neighbors_path_spec = parse::opt_string_param(params, "neighbors_data_set_path")?;
        let neighbors_corpus = parse::opt_string_param(params, "neighbors_data_set_corpus")?;
        if neighbors_path_spec.is_some() && neighbors_corpus.is_some() {
            return Err(BenchError::WorkloadSyntax(
                "Provide either neighbor's dataset file path or corpus, but not both.".to_string(),
            ));
        }

        query_params.insert("k".to_string(), json!(k));
        query_params.insert(
            "operation-type".to_string(),
            params
                .get("operation-type")
                .cloned()
                .unwrap_or_else(|| json!("vector-search")),
        );
        query_params.insert(
            "id-field-name".to_string(),
            params.get("id-field-name").cloned().unwrap_or(Value::Null),
        );

        Ok(Self {
            query_params,
            is_nested: spec.is_nested(),
            spec_field: spec.field.clone(),
            data_format: spec.format.clone(),
            data_path_spec: spec.path.clone(),
            data_corpus: spec.corpus.clone(),
            total_num_vectors: spec.total_num_vectors,
            k: k as usize,
            repetitions,
            neighbors_format,
            neighbors_path_spec,
            neighbors_corpus,
            filter_type: parse::opt_string_param(params, "filter_type")?,
            filter_body: params.get("filter_body").cloned(),
            dataset_cache: ctx.dataset_cache.clone(),
            workload_dir: ctx.workload_dir.clone(),
            workload: workload.clone(),
            registry: Arc::clone(&ctx.registry),
            ingestion: Arc::clone(&ctx.ingestion),
            seed: ctx.seed,
        })
    }

    fn context(&self) -> ParamSourceContext {
        ParamSourceContext {
            dataset_cache: self.dataset_cache.clone(),
            workload_dir: self.workload_dir.clone(),
            ingestion: Arc::clone(&self.ingestion),
            registry: Arc::clone(&self.registry),
            seed: self.seed,
        }
    }
}

impl ParamSource for VectorSearchParamSource {
    fn partition(
        &self,
        partition_index: u32,
        total_partitions: u32,
    ) -> BenchResult<Box<dyn ClientParamSource>> {
        let ctx = self.context();
        let data_path = resolve_data_set_path(
            &ctx,
            &self.workload,
            &self.data_path_spec,
            &self.data_corpus,
            &self.data_format,
        )?;
        let mut data_set = get_data_set(&self.data_format, &data_path, DataSetContext::Query)?;
        let available = data_set.size()?;
        let total = self
            .total_num_vectors
            .filter(|n| *n <= available)
            .unwrap_or(available);
        let (offset, num_vectors) = partition_range(total, partition_index, total_partitions);
        if offset > 0 {
            data_set.seek(offset)?;
        }

        let neighbors_path = match (&self.neighbors_path_spec, &self.neighbors_corpus) {
            (Some(path), _) => PathBuf::from(path),
            (None, Some(corpus)) => {
                corpus_file_path(&ctx, &self.workload, corpus, &self.neighbors_format)?
            }
            (None, None) => data_path.clone(),
        };
        let mut neighbors = get_data_set(&self.neighbors_format, &neighbors_path, DataSetContext::Neighbors)?;
        if offset > 0 {
            neighbors.seek(offset)?;
        }

        Ok(Box::new(VectorSearchClient {
            query_params: self.query_params.clone(),
            field: self.spec_field.clone(),
            k: self.k,
            repetitions: self.repetitions,
            current_rep: 1,
            filter_type: self.filter_type.clone(),
            filter_body: self.filter_body.clone(),
            is_nested: self.is_nested,
            data_set,
            neighbors,
            offset,
            num_vectors,
            total,
            current: offset,
        }))
    }
}

struct VectorSearchClient {
    query_params: Params,
    field: String,
    k: usize,
    repetitions: u64,
    current_rep: u64,
    filter_type: Option<String>,
    filter_body: Option<Value>,
    is_nested: bool,
    data_set: Box<dyn VectorDataSet>,
    neighbors: Box<dyn VectorDataSet>,
    offset: u64,
    num_vectors: u64,
    total: u64,
    current: u64,
}

impl VectorSearchClient {
    fn build_query_body(&self, vector: &[f32]) -> BenchResult<Value> {
        let filter_type = self.filter_type.as_deref();
        let efficient_filter = if filter_type == Some("efficient") {
            self.filter_body.clone()
        } else {
            None
        };

        let mut knn_spec = json!({
            "vector": vector,
            "k": self.k,
        });
        if let Some(filter) = &efficient_filter {
            knn_spec["filter"] = filter.clone();
        }
        let mut knn_fields = serde_json::Map::new();
        knn_fields.insert(self.field.clone(), knn_spec);
        let knn_query = json!({ "knn": knn_fields });

        if self.is_nested {
            let (outer, _inner) = split_nested_field(&self.field)?;
            return Ok(json!({
                "nested": {
                    "path": outer,
                    "query": knn_query
                }
            }));
        }

        match filter_type {
            None | Some("efficient") | Some("post_filter") => Ok(knn_query),
            Some("script") => Ok(json!({
                "script_score": {
                    "query": {"bool": {"filter": self.filter_body}},
                    "script": {
                        "source": "knn_score",
                        "lang": "knn",
                        "params": {
                            "field": self.field,
                            "query_value": vector,
                            "space_type": "l2"
                        }
                    }
                }
            })),
            Some("boolean") => Ok(json!({
                "bool": {
                    "filter": self.filter_body,
                    "must": [knn_query]
                }
            })),
            Some(other) => Err(BenchError::WorkloadSyntax(format!(
                "Unsupported filter type: {other}"
            ))),
        }
    }
}

impl ClientParamSource for VectorSearchClient {
    fn params(&mut self) -> BenchResult<Option<Params>> {
        if self.current >= self.num_vectors + self.offset {
            if self.current_rep >= self.repetitions {
                return Ok(None);
            }
            // re-run the query set from the top of this partition
            self.current_rep += 1;
            self.data_set.seek(self.offset)?;
            self.neighbors.seek(self.offset)?;
            self.current = self.offset;
        }

        let vectors = self.data_set.read(1)?.into_floats()?;
        let neighbors = self.neighbors.read(1)?.into_ints()?;
        let (Some(vector), Some(neighbor_row)) = (vectors.first(), neighbors.first()) else {
            return Ok(None);
        };
        let true_neighbors: Vec<String> = neighbor_row
            .iter()
            .take(self.k)
            .map(|id| id.to_string())
            .collect();

        let mut record = self.query_params.clone();
        record.insert("neighbors".to_string(), json!(true_neighbors));

        // the cluster does not need to return sources or tolerate partial
        // results for recall measurements
        let mut request_params = record
            .get("request-params")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        request_params
            .entry("_source".to_string())
            .or_insert(json!("false"));
        request_params
            .entry("allow_partial_search_results".to_string())
            .or_insert(json!("false"));
        record.insert("request-params".to_string(), Value::Object(request_params));

        let mut body = record
            .get("body")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        body.entry("size".to_string()).or_insert(json!(self.k));
        body.insert("query".to_string(), self.build_query_body(vector)?);
        if self.filter_type.as_deref() == Some("post_filter") {
            if let Some(filter_body) = &self.filter_body {
                body.insert("post_filter".to_string(), filter_body.clone());
            }
        }
        record.insert("body".to_string(), Value::Object(body));

        self.current += 1;
        Ok(Some(record))
    }

    fn size(&self) -> Option<u64> {
        Some(self.num_vectors * self.repetitions)
    }

    fn task_progress(&self) -> Option<TaskProgress> {
        if self.total == 0 {
            return None;
        }
        Some(TaskProgress {
            value: self.current as f64 / self.total as f64,
            unit: "%",
        })
    }
}

// ---------------------------------------------------------------------------
// bulk ingestion from a vector dataset
// ---------------------------------------------------------------------------

const DEFAULT_RETRIES: i64 = 10;
const DEFAULT_ID_FIELD: &str = "_id";

struct BulkVectorsParamSource {
    spec_field: String,
    data_format: String,
    data_path_spec: Option<String>,
    data_corpus: Option<String>,
    total_num_vectors: Option<u64>,
    bulk_size: u64,
    retries: i64,
    index_name: String,
    id_field_name: String,
    filter_attributes: Vec<String>,
    parents_path_spec: Option<String>,
    is_nested: bool,
    dataset_cache: PathBuf,
    workload_dir: Option<PathBuf>,
    workload: Workload,
    registry: Arc<crate::registry::Registry>,
    ingestion: Arc<crate::streaming::IngestionContext>,
    seed: u64,
}

impl BulkVectorsParamSource {
    fn new(ctx: &ParamSourceContext, workload: &Workload, params: &Params) -> BenchResult<Self> {
        let spec = DataSetSpec::from_params(params)?;
        let bulk_size = parse::int_param(params, "bulk_size")?;
        if bulk_size <= 0 {
            return Err(BenchError::WorkloadSyntax(format!(
                "'bulk_size' must be positive but was {bulk_size}"
            )));
        }
        let filter_attributes = match params.get("filter_attributes") {
            None => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            Some(Value::String(s)) => vec![s.clone()],
            Some(_) => {
                return Err(BenchError::WorkloadSyntax(
                    "'filter_attributes' must be a list of attribute names".to_string(),
                ))
            }
        };
        Ok(Self {
            is_nested: spec.is_nested(),
            spec_field: spec.field.clone(),
            data_format: spec.format.clone(),
            data_path_spec: spec.path.clone(),
            data_corpus: spec.corpus.clone(),
            total_num_vectors: spec.total_num_vectors,
            bulk_size: bulk_size as u64,
            retries: parse::int_param_or(params, "retries", DEFAULT_RETRIES)?,
            index_name: parse::string_param(params, "index")?,
            id_field_name: parse::string_param_or(params, "id-field-name", DEFAULT_ID_FIELD)?,
            filter_attributes,
            parents_path_spec: parse::opt_string_param(params, "parents_data_set_path")?,
            dataset_cache: ctx.dataset_cache.clone(),
            workload_dir: ctx.workload_dir.clone(),
            workload: workload.clone(),
            registry: Arc::clone(&ctx.registry),
            ingestion: Arc::clone(&ctx.ingestion),
            seed: ctx.seed,
        })
    }

    fn context(&self) -> ParamSourceContext {
        ParamSourceContext {
            dataset_cache: self.dataset_cache.clone(),
            workload_dir: self.workload_dir.clone(),
            ingestion: Arc::clone(&self.ingestion),
            registry: Arc::clone(&self.registry),
            seed: self.seed,
        }
    }
}

impl ParamSource for BulkVectorsParamSource {
    fn partition(
        &self,
        partition_index: u32,
        total_partitions: u32,
    ) -> BenchResult<Box<dyn ClientParamSource>> {
        let ctx = self.context();
        let data_path = resolve_data_set_path(
            &ctx,
            &self.workload,
            &self.data_path_spec,
            &self.data_corpus,
            &self.data_format,
        )?;
        let mut data_set = get_data_set(&self.data_format, &data_path, DataSetContext::Index)?;
        let available = data_set.size()?;
        let total = self
            .total_num_vectors
            .filter(|n| *n <= available)
            .unwrap_or(available);
        let (offset, num_vectors) = partition_range(total, partition_index, total_partitions);
        if offset > 0 {
            data_set.seek(offset)?;
        }

        let companion_path = self
            .parents_path_spec
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| data_path.clone());
        let parents = if self.is_nested {
            let mut ds = get_data_set(&self.data_format, &companion_path, DataSetContext::Parents)?;
            if offset > 0 {
                ds.seek(offset)?;
            }
            Some(ds)
        } else {
            None
        };
        let attributes = if !self.filter_attributes.is_empty() {
            let mut ds = get_data_set(&self.data_format, &companion_path, DataSetContext::Attributes)?;
            if offset > 0 {
                ds.seek(offset)?;
            }
            Some(ds)
        } else {
            None
        };

        Ok(Box::new(BulkVectorsClient {
            field: self.spec_field.clone(),
            bulk_size: self.bulk_size,
            retries: self.retries,
            index_name: self.index_name.clone(),
            id_field_name: self.id_field_name.clone(),
            filter_attributes: self.filter_attributes.clone(),
            is_nested: self.is_nested,
            data_set,
            parents,
            attributes,
            offset,
            num_vectors,
            total,
            current: offset,
            nested_buffer: None,
        }))
    }
}

struct BulkVectorsClient {
    field: String,
    bulk_size: u64,
    retries: i64,
    index_name: String,
    id_field_name: String,
    filter_attributes: Vec<String>,
    is_nested: bool,
    data_set: Box<dyn VectorDataSet>,
    parents: Option<Box<dyn VectorDataSet>>,
    attributes: Option<Box<dyn VectorDataSet>>,
    offset: u64,
    num_vectors: u64,
    total: u64,
    current: u64,
    /// Vectors of the parent document currently being assembled.
    nested_buffer: Option<(i64, Vec<Value>)>,
}

impl BulkVectorsClient {
    fn action(&self, doc_id: i64) -> Value {
        // a custom id field lives in the document body instead of the
        // bulk meta-data line
        if self.id_field_name == DEFAULT_ID_FIELD {
            json!({"index": {"_index": self.index_name, "_id": doc_id.to_string()}})
        } else {
            json!({"index": {"_index": self.index_name}})
        }
    }

    fn transform_plain(&self, vectors: &[Vec<f32>]) -> Vec<Value> {
        let mut actions = Vec::with_capacity(vectors.len() * 2);
        for (i, vector) in vectors.iter().enumerate() {
            let identifier = self.current as i64 + i as i64;
            actions.push(self.action(identifier));
            let mut row = serde_json::Map::new();
            row.insert(self.field.clone(), json!(vector));
            if self.id_field_name != DEFAULT_ID_FIELD {
                row.insert(self.id_field_name.clone(), json!(identifier));
            }
            actions.push(Value::Object(row));
        }
        actions
    }

    fn transform_with_attributes(
        &self,
        vectors: &[Vec<f32>],
        attributes: &[Vec<String>],
    ) -> Vec<Value> {
        let mut actions = Vec::with_capacity(vectors.len() * 2);
        for (i, vector) in vectors.iter().enumerate() {
            let identifier = self.current as i64 + i as i64;
            actions.push(self.action(identifier));
            let mut row = serde_json::Map::new();
            row.insert(self.field.clone(), json!(vector));
            if let Some(attribute_row) = attributes.get(i) {
                for (name, value) in self.filter_attributes.iter().zip(attribute_row) {
                    if value != "None" {
                        row.insert(name.clone(), json!(value));
                    }
                }
            }
            if self.id_field_name != DEFAULT_ID_FIELD {
                row.insert(self.id_field_name.clone(), json!(identifier));
            }
            actions.push(Value::Object(row));
        }
        actions
    }

    fn transform_nested(
        &mut self,
        vectors: Vec<Vec<f32>>,
        parent_ids: Vec<i64>,
        outer_field: &str,
        inner_field: &str,
    ) -> BenchResult<Vec<Value>> {
        let mut actions = Vec::new();
        for (vector, parent_id) in vectors.into_iter().zip(parent_ids) {
            let mut nested_fields = serde_json::Map::new();
            nested_fields.insert(inner_field.to_string(), json!(vector));
            let nested = Value::Object(nested_fields);
            match &mut self.nested_buffer {
                Some((current_parent, rows)) if *current_parent == parent_id => {
                    rows.push(nested);
                }
                Some((current_parent, rows)) => {
                    // parent changed: flush the assembled document
                    let current_parent = *current_parent;
                    let flushed = std::mem::take(rows);
                    self.current += flushed.len() as u64;
                    actions.push(self.action(current_parent));
                    actions.push(self.nested_document(outer_field, current_parent, flushed));
                    self.nested_buffer = Some((parent_id, vec![nested]));
                }
                None => {
                    self.nested_buffer = Some((parent_id, vec![nested]));
                }
            }
        }

        // flush the trailing parent when the partition is nearly done, so
        // the last document is not lost
        let buffered = self
            .nested_buffer
            .as_ref()
            .map(|(_, rows)| rows.len() as u64)
            .unwrap_or(0);
        if buffered > 0 && self.current + buffered + self.bulk_size >= self.offset + self.num_vectors {
            let (parent_id, rows) = self.nested_buffer.take().expect("buffer present");
            self.current += rows.len() as u64;
            actions.push(self.action(parent_id));
            actions.push(self.nested_document(outer_field, parent_id, rows));
        }
        Ok(actions)
    }

    fn nested_document(&self, outer_field: &str, parent_id: i64, rows: Vec<Value>) -> Value {
        let mut doc = serde_json::Map::new();
        doc.insert(outer_field.to_string(), Value::Array(rows));
        if self.id_field_name != DEFAULT_ID_FIELD {
            doc.insert(self.id_field_name.clone(), json!(parent_id));
        }
        Value::Object(doc)
    }
}

impl ClientParamSource for BulkVectorsClient {
    fn params(&mut self) -> BenchResult<Option<Params>> {
        if self.current >= self.num_vectors + self.offset {
            return Ok(None);
        }
        let remaining = self.num_vectors + self.offset - self.current;
        let bulk_size = self.bulk_size.min(remaining) as usize;
        let vectors = self.data_set.read(bulk_size)?.into_floats()?;
        if vectors.is_empty() {
            return Ok(None);
        }

        let actions = if self.is_nested {
            let parents = self
                .parents
                .as_mut()
                .expect("parents dataset opened for nested ingestion")
                .read(bulk_size)?
                .into_ints()?
                .into_iter()
                .map(|row| row.first().copied().unwrap_or_default())
                .collect();
            let (outer, inner) = split_nested_field(&self.field.clone())?;
            self.transform_nested(vectors, parents, &outer, &inner)?
        } else if !self.filter_attributes.is_empty() {
            let attributes = self
                .attributes
                .as_mut()
                .expect("attributes dataset opened for filtered ingestion")
                .read(bulk_size)?
                .into_strings()?;
            let actions = self.transform_with_attributes(&vectors, &attributes);
            self.current += vectors.len() as u64;
            actions
        } else {
            let actions = self.transform_plain(&vectors);
            self.current += vectors.len() as u64;
            actions
        };

        let size = actions.len() as u64 / 2;
        let mut record = Params::new();
        record.insert("body".to_string(), Value::Array(actions));
        record.insert("retries".to_string(), json!(self.retries));
        record.insert("size".to_string(), json!(size));
        record.insert("with-action-metadata".to_string(), json!(true));
        Ok(Some(record))
    }

    fn size(&self) -> Option<u64> {
        Some(self.num_vectors.div_ceil(self.bulk_size))
    }

    fn task_progress(&self) -> Option<TaskProgress> {
        if self.total == 0 {
            return None;
        }
        Some(TaskProgress {
            value: self.current as f64 / self.total as f64,
            unit: "%",
        })
    }
}

pub fn search_factory() -> ParamSourceFactory {
    Arc::new(|ctx, workload, params, op_name| {
        Ok(Box::new(VectorSearchParamSource::new(ctx, workload, params, op_name)?)
            as Box<dyn ParamSource>)
    })
}

pub fn bulk_factory() -> ParamSourceFactory {
    Arc::new(|ctx, workload, params, _op_name| {
        Ok(Box::new(BulkVectorsParamSource::new(ctx, workload, params)?) as Box<dyn ParamSource>)
    })
}
