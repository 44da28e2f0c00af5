//! Workload definition structures
//!
//! The typed in-memory representation of a benchmark workload: indices or
//! data streams, templates, document corpora and one or more test procedures
//! holding an ordered schedule of tasks. A workload is constructed once by
//! the reader, mutated only by the post-load processors and treated as
//! immutable afterwards.

pub mod processor;
pub mod reader;

use std::fmt;
use std::path::PathBuf;

use serde_json::Value;

use crate::error::{BenchError, BenchResult};

/// Free-form parameter bag attached to operations, tasks and procedures.
pub type Params = serde_json::Map<String, Value>;

macro_rules! fmt_name {
    () => {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", self.name)
        }
    };
}

/// Source format of a document set. Only line-oriented bulk JSON is
/// supported today.
pub const SOURCE_FORMAT_BULK: &str = "bulk";

/// Operation types with built-in parameter sources. Workloads may also use
/// arbitrary user-defined operation type strings; those resolve to custom
/// parameter sources by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationType {
    Bulk,
    ProtoBulk,
    BulkVectorDataSet,
    Search,
    VectorSearch,
    ProtoVectorSearch,
    CreateIndex,
    DeleteIndex,
    CreateDataStream,
    DeleteDataStream,
    CreateIndexTemplate,
    DeleteIndexTemplate,
    CreateComponentTemplate,
    DeleteComponentTemplate,
    CreateComposableTemplate,
    DeleteComposableTemplate,
    OpenPointInTime,
    ClosePointInTime,
    Sleep,
    ForceMerge,
    ProduceStreamMessage,
}

impl OperationType {
    pub fn from_hyphenated_string(s: &str) -> Option<Self> {
        match s {
            "bulk" => Some(Self::Bulk),
            "proto-bulk" => Some(Self::ProtoBulk),
            "bulk-vector-data-set" => Some(Self::BulkVectorDataSet),
            "search" | "paginated-search" => Some(Self::Search),
            "vector-search" => Some(Self::VectorSearch),
            "proto-vector-search" => Some(Self::ProtoVectorSearch),
            "create-index" => Some(Self::CreateIndex),
            "delete-index" => Some(Self::DeleteIndex),
            "create-data-stream" => Some(Self::CreateDataStream),
            "delete-data-stream" => Some(Self::DeleteDataStream),
            "create-index-template" => Some(Self::CreateIndexTemplate),
            "delete-index-template" => Some(Self::DeleteIndexTemplate),
            "create-component-template" => Some(Self::CreateComponentTemplate),
            "delete-component-template" => Some(Self::DeleteComponentTemplate),
            "create-composable-template" => Some(Self::CreateComposableTemplate),
            "delete-composable-template" => Some(Self::DeleteComposableTemplate),
            "open-point-in-time" => Some(Self::OpenPointInTime),
            "close-point-in-time" => Some(Self::ClosePointInTime),
            "sleep" => Some(Self::Sleep),
            "force-merge" => Some(Self::ForceMerge),
            "produce-stream-message" => Some(Self::ProduceStreamMessage),
            _ => None,
        }
    }

    pub fn to_hyphenated_string(self) -> &'static str {
        match self {
            Self::Bulk => "bulk",
            Self::ProtoBulk => "proto-bulk",
            Self::BulkVectorDataSet => "bulk-vector-data-set",
            Self::Search => "search",
            Self::VectorSearch => "vector-search",
            Self::ProtoVectorSearch => "proto-vector-search",
            Self::CreateIndex => "create-index",
            Self::DeleteIndex => "delete-index",
            Self::CreateDataStream => "create-data-stream",
            Self::DeleteDataStream => "delete-data-stream",
            Self::CreateIndexTemplate => "create-index-template",
            Self::DeleteIndexTemplate => "delete-index-template",
            Self::CreateComponentTemplate => "create-component-template",
            Self::DeleteComponentTemplate => "delete-component-template",
            Self::CreateComposableTemplate => "create-composable-template",
            Self::DeleteComposableTemplate => "delete-composable-template",
            Self::OpenPointInTime => "open-point-in-time",
            Self::ClosePointInTime => "close-point-in-time",
            Self::Sleep => "sleep",
            Self::ForceMerge => "force-merge",
            Self::ProduceStreamMessage => "produce-stream-message",
        }
    }

    /// Administrative operations are excluded from results publishing unless
    /// the workload opts back in.
    pub fn is_admin(self) -> bool {
        !matches!(
            self,
            Self::Bulk
                | Self::ProtoBulk
                | Self::BulkVectorDataSet
                | Self::Search
                | Self::VectorSearch
                | Self::ProtoVectorSearch
                | Self::ProduceStreamMessage
        )
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hyphenated_string())
    }
}

/// An index declared by the workload, with an optional rendered body.
#[derive(Debug, Clone)]
pub struct Index {
    pub name: String,
    pub body: Option<Value>,
    pub types: Vec<String>,
}

impl Index {
    pub fn new(name: impl Into<String>, body: Option<Value>) -> Self {
        Self {
            name: name.into(),
            body,
            types: Vec::new(),
        }
    }
}

impl fmt::Display for Index {
    fmt_name!();
}

/// A data stream declared by the workload. Mutually exclusive with indices.
#[derive(Debug, Clone)]
pub struct DataStream {
    pub name: String,
}

impl fmt::Display for DataStream {
    fmt_name!();
}

/// An index template (also used for composable templates).
#[derive(Debug, Clone)]
pub struct IndexTemplate {
    pub name: String,
    pub index_pattern: String,
    pub content: Option<Value>,
    pub delete_matching_indices: bool,
}

impl fmt::Display for IndexTemplate {
    fmt_name!();
}

/// A component template referenced by composable templates.
#[derive(Debug, Clone)]
pub struct ComponentTemplate {
    pub name: String,
    pub content: Option<Value>,
}

impl fmt::Display for ComponentTemplate {
    fmt_name!();
}

/// One `(compressed?, uncompressed)` file pair within a corpus.
#[derive(Debug, Clone)]
pub struct Documents {
    pub source_format: String,
    pub document_file: Option<String>,
    pub document_archive: Option<String>,
    pub base_url: Option<String>,
    pub source_url: Option<String>,
    pub includes_action_and_meta_data: bool,
    pub number_of_documents: u64,
    pub compressed_size_in_bytes: Option<u64>,
    pub uncompressed_size_in_bytes: Option<u64>,
    pub target_index: Option<String>,
    pub target_type: Option<String>,
    pub target_data_stream: Option<String>,
    pub meta: Option<Value>,
}

impl Documents {
    pub fn is_bulk(&self) -> bool {
        self.source_format == SOURCE_FORMAT_BULK
    }

    pub fn has_compressed_corpus(&self) -> bool {
        self.document_archive.is_some()
    }

    pub fn has_uncompressed_corpus(&self) -> bool {
        self.document_file.is_some()
    }

    /// Number of lines in the source file: two per document when each
    /// document carries its own action and meta-data line.
    pub fn number_of_lines(&self) -> u64 {
        self.number_of_documents * self.lines_per_document()
    }

    pub fn lines_per_document(&self) -> u64 {
        if self.includes_action_and_meta_data {
            2
        } else {
            1
        }
    }
}

impl fmt::Display for Documents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let file = self
            .document_file
            .as_deref()
            .or(self.document_archive.as_deref())
            .unwrap_or("<no file>");
        write!(f, "{}[{}]", self.source_format, file)
    }
}

/// A named collection of document sets.
#[derive(Debug, Clone)]
pub struct DocumentCorpus {
    pub name: String,
    pub meta: Option<Value>,
    pub documents: Vec<Documents>,
    /// Set when the corpus is produced at run time by ranging over an
    /// object-storage blob. Document counts are unusable in that case.
    pub streaming_ingestion: bool,
}

impl DocumentCorpus {
    pub fn new(name: impl Into<String>, meta: Option<Value>) -> Self {
        Self {
            name: name.into(),
            meta,
            documents: Vec::new(),
            streaming_ingestion: false,
        }
    }

    pub fn number_of_documents(&self, source_format: &str) -> u64 {
        self.documents
            .iter()
            .filter(|d| d.source_format == source_format)
            .map(|d| d.number_of_documents)
            .sum()
    }

    pub fn compressed_size_in_bytes(&self) -> Option<u64> {
        self.documents
            .iter()
            .map(|d| d.compressed_size_in_bytes)
            .try_fold(0, |acc, s| s.map(|s| acc + s))
    }

    pub fn uncompressed_size_in_bytes(&self) -> Option<u64> {
        self.documents
            .iter()
            .map(|d| d.uncompressed_size_in_bytes)
            .try_fold(0, |acc, s| s.map(|s| acc + s))
    }

    /// A copy of this corpus reduced to document sets matching the given
    /// source format and, when provided, the given target indices or data
    /// streams.
    pub fn filter(
        &self,
        source_format: &str,
        target_indices: Option<&[String]>,
        target_data_streams: Option<&[String]>,
    ) -> DocumentCorpus {
        let documents = self
            .documents
            .iter()
            .filter(|d| d.source_format == source_format)
            .filter(|d| match target_indices {
                Some(indices) => d
                    .target_index
                    .as_ref()
                    .map(|t| indices.contains(t))
                    .unwrap_or(false),
                None => true,
            })
            .filter(|d| match target_data_streams {
                Some(streams) => d
                    .target_data_stream
                    .as_ref()
                    .map(|t| streams.contains(t))
                    .unwrap_or(false),
                None => true,
            })
            .cloned()
            .collect();
        DocumentCorpus {
            name: self.name.clone(),
            meta: self.meta.clone(),
            documents,
            streaming_ingestion: self.streaming_ingestion,
        }
    }

    /// Union of two instances of the same corpus, deduplicating document
    /// sets by their file references.
    pub fn union(&self, other: &DocumentCorpus) -> BenchResult<DocumentCorpus> {
        if self.name != other.name {
            return Err(BenchError::assertion(format!(
                "cannot union corpora [{}] and [{}]",
                self.name, other.name
            )));
        }
        let mut merged = self.clone();
        for doc in &other.documents {
            let seen = merged.documents.iter().any(|d| {
                d.document_file == doc.document_file && d.document_archive == doc.document_archive
            });
            if !seen {
                merged.documents.push(doc.clone());
            }
        }
        Ok(merged)
    }
}

impl fmt::Display for DocumentCorpus {
    fmt_name!();
}

/// A named kind of request plus its static parameters.
#[derive(Debug, Clone)]
pub struct Operation {
    pub name: String,
    pub operation_type: String,
    pub meta: Option<Value>,
    pub params: Params,
    pub param_source: Option<String>,
}

impl Operation {
    pub fn op_type(&self) -> Option<OperationType> {
        OperationType::from_hyphenated_string(&self.operation_type)
    }

    /// True for operations excluded from results publishing by default.
    pub fn is_admin(&self) -> bool {
        self.op_type().map(OperationType::is_admin).unwrap_or(false)
    }
}

impl fmt::Display for Operation {
    fmt_name!();
}

/// Target throughput of a task, e.g. `1000 docs/s`.
#[derive(Debug, Clone, PartialEq)]
pub struct Throughput {
    pub value: f64,
    pub unit: String,
}

impl fmt::Display for Throughput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.value, self.unit)
    }
}

/// A filter expression matched against tasks by the task-filter processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskFilter {
    Name(String),
    OpType(String),
    Tag(String),
}

impl TaskFilter {
    /// Parse `<name>`, `type:<op-type>` or `tag:<tag>`.
    pub fn parse(spec: &str) -> BenchResult<TaskFilter> {
        let parts: Vec<&str> = spec.split(':').collect();
        match parts.as_slice() {
            [name] => Ok(TaskFilter::Name((*name).to_string())),
            ["type", op_type] => Ok(TaskFilter::OpType((*op_type).to_string())),
            ["tag", tag] => Ok(TaskFilter::Tag((*tag).to_string())),
            [kind, _] => Err(BenchError::SystemSetup(format!(
                "Invalid format for filtered tasks: [{spec}]. Expected [type] but got [{kind}]."
            ))),
            _ => Err(BenchError::SystemSetup(format!(
                "Invalid format for filtered tasks: [{spec}]"
            ))),
        }
    }
}

/// One schedule element: binds an operation to a client count and a timing
/// or iteration budget.
#[derive(Debug, Clone)]
pub struct Task {
    pub name: String,
    pub operation: Operation,
    pub tags: Vec<String>,
    pub meta: Option<Value>,
    pub warmup_iterations: Option<u64>,
    pub iterations: Option<u64>,
    pub warmup_time_period: Option<u64>,
    pub time_period: Option<u64>,
    pub clients: u32,
    pub completes_parent: bool,
    pub schedule: Option<String>,
    /// The raw task specification, kept for scheduler-specific extras.
    pub params: Params,
}

impl Task {
    pub fn matches(&self, filter: &TaskFilter) -> bool {
        match filter {
            TaskFilter::Name(name) => &self.name == name,
            TaskFilter::OpType(op_type) => &self.operation.operation_type == op_type,
            TaskFilter::Tag(tag) => self.tags.contains(tag),
        }
    }

    /// The configured throughput limit, from either `target-throughput` or
    /// `target-interval` (seconds per operation). Setting both is an error.
    pub fn target_throughput(&self) -> BenchResult<Option<Throughput>> {
        let throughput = self.params.get("target-throughput");
        let interval = self.params.get("target-interval");
        if throughput.is_some() && interval.is_some() {
            return Err(BenchError::WorkloadSyntax(format!(
                "Task [{}] specifies target-interval and target-throughput but only one of them is allowed.",
                self.name
            )));
        }
        if let Some(value) = throughput {
            return match value {
                Value::Number(n) => Ok(Some(Throughput {
                    value: n.as_f64().unwrap_or(0.0),
                    unit: "ops/s".to_string(),
                })),
                Value::String(s) => {
                    let (value, unit) = s.rsplit_once(' ').ok_or_else(|| {
                        BenchError::WorkloadSyntax(format!(
                            "Task [{}] specifies invalid target throughput [{s}].",
                            self.name
                        ))
                    })?;
                    let value: f64 = value.trim().parse().map_err(|_| {
                        BenchError::WorkloadSyntax(format!(
                            "Task [{}] specifies invalid target throughput [{s}].",
                            self.name
                        ))
                    })?;
                    Ok(Some(Throughput {
                        value,
                        unit: unit.to_string(),
                    }))
                }
                _ => Err(BenchError::WorkloadSyntax(format!(
                    "Task [{}] specifies invalid target throughput.",
                    self.name
                ))),
            };
        }
        if let Some(Value::Number(n)) = interval {
            let secs = n.as_f64().unwrap_or(0.0);
            if secs > 0.0 {
                return Ok(Some(Throughput {
                    value: 1.0 / secs,
                    unit: "ops/s".to_string(),
                }));
            }
        }
        Ok(None)
    }
}

impl fmt::Display for Task {
    fmt_name!();
}

/// A group of tasks whose clients run concurrently.
#[derive(Debug, Clone)]
pub struct Parallel {
    pub tasks: Vec<Task>,
    /// When set, an explicit cap on concurrently running clients; otherwise
    /// the sum of the children's client counts.
    pub clients: Option<u32>,
}

impl Parallel {
    pub fn clients(&self) -> u32 {
        self.clients
            .unwrap_or_else(|| self.tasks.iter().map(|t| t.clients).sum())
    }
}

impl fmt::Display for Parallel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} parallel tasks", self.tasks.len())
    }
}

/// One ordered element of a schedule.
#[derive(Debug, Clone)]
pub enum ScheduleNode {
    Leaf(Task),
    Parallel(Parallel),
}

impl ScheduleNode {
    /// Leaf tasks of this node (one for a plain task, the children of a
    /// parallel group).
    pub fn leaf_tasks(&self) -> Box<dyn Iterator<Item = &Task> + '_> {
        match self {
            ScheduleNode::Leaf(task) => Box::new(std::iter::once(task)),
            ScheduleNode::Parallel(parallel) => Box::new(parallel.tasks.iter()),
        }
    }

    pub fn leaf_tasks_mut(&mut self) -> Box<dyn Iterator<Item = &mut Task> + '_> {
        match self {
            ScheduleNode::Leaf(task) => Box::new(std::iter::once(task)),
            ScheduleNode::Parallel(parallel) => Box::new(parallel.tasks.iter_mut()),
        }
    }

    pub fn matches(&self, filter: &TaskFilter) -> bool {
        match self {
            ScheduleNode::Leaf(task) => task.matches(filter),
            // a parallel group matches if any child does
            ScheduleNode::Parallel(parallel) => parallel.tasks.iter().any(|t| t.matches(filter)),
        }
    }
}

/// A named, ordered schedule of tasks.
#[derive(Debug, Clone)]
pub struct TestProcedure {
    pub name: String,
    pub description: Option<String>,
    pub user_info: Option<String>,
    pub meta: Option<Value>,
    pub default: bool,
    pub selected: bool,
    pub auto_generated: bool,
    /// Workload-level parameters overridden by procedure-level ones.
    pub parameters: Params,
    pub schedule: Vec<ScheduleNode>,
}

impl TestProcedure {
    pub fn leaf_tasks(&self) -> impl Iterator<Item = &Task> {
        self.schedule.iter().flat_map(|node| node.leaf_tasks())
    }
}

impl fmt::Display for TestProcedure {
    fmt_name!();
}

/// The complete benchmark description for one run.
#[derive(Debug, Clone)]
pub struct Workload {
    pub name: String,
    pub description: String,
    pub meta: Option<Value>,
    pub indices: Vec<Index>,
    pub data_streams: Vec<DataStream>,
    pub templates: Vec<IndexTemplate>,
    pub composable_templates: Vec<IndexTemplate>,
    pub component_templates: Vec<ComponentTemplate>,
    pub corpora: Vec<DocumentCorpus>,
    pub test_procedures: Vec<TestProcedure>,
    /// Root directory of the workload definition; corpus files and template
    /// bodies are resolved relative to it.
    pub root_dir: PathBuf,
}

impl Workload {
    pub fn default_test_procedure(&self) -> Option<&TestProcedure> {
        self.test_procedures.iter().find(|tp| tp.default)
    }

    /// The procedure that will run: the explicitly selected one, or the
    /// default.
    pub fn selected_test_procedure(&self) -> Option<&TestProcedure> {
        self.test_procedures
            .iter()
            .find(|tp| tp.selected)
            .or_else(|| self.default_test_procedure())
    }

    pub fn find_test_procedure(&self, name: &str) -> Option<&TestProcedure> {
        self.test_procedures.iter().find(|tp| tp.name == name)
    }

    pub fn uses_indices(&self) -> bool {
        !self.indices.is_empty()
    }

    pub fn uses_data_streams(&self) -> bool {
        !self.data_streams.is_empty()
    }

    pub fn number_of_documents(&self) -> u64 {
        self.corpora
            .iter()
            .map(|c| c.number_of_documents(SOURCE_FORMAT_BULK))
            .sum()
    }

    pub fn compressed_size_in_bytes(&self) -> Option<u64> {
        self.corpora
            .iter()
            .map(|c| c.compressed_size_in_bytes())
            .try_fold(0, |acc, s| s.map(|s| acc + s))
    }

    pub fn uncompressed_size_in_bytes(&self) -> Option<u64> {
        self.corpora
            .iter()
            .map(|c| c.uncompressed_size_in_bytes())
            .try_fold(0, |acc, s| s.map(|s| acc + s))
    }
}

impl fmt::Display for Workload {
    fmt_name!();
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub fn operation(name: &str, operation_type: &str, params: Params) -> Operation {
        Operation {
            name: name.to_string(),
            operation_type: operation_type.to_string(),
            meta: None,
            params,
            param_source: None,
        }
    }

    pub fn task(name: &str, op: Operation) -> Task {
        Task {
            name: name.to_string(),
            operation: op,
            tags: Vec::new(),
            meta: None,
            warmup_iterations: None,
            iterations: None,
            warmup_time_period: None,
            time_period: None,
            clients: 1,
            completes_parent: false,
            schedule: None,
            params: Params::new(),
        }
    }

    pub fn documents(num_docs: u64, target_index: Option<&str>) -> Documents {
        Documents {
            source_format: SOURCE_FORMAT_BULK.to_string(),
            document_file: Some("docs.json".to_string()),
            document_archive: None,
            base_url: None,
            source_url: None,
            includes_action_and_meta_data: false,
            number_of_documents: num_docs,
            compressed_size_in_bytes: None,
            uncompressed_size_in_bytes: None,
            target_index: target_index.map(str::to_string),
            target_type: None,
            target_data_stream: None,
            meta: None,
        }
    }

    pub fn workload_with(
        indices: Vec<Index>,
        corpora: Vec<DocumentCorpus>,
        test_procedures: Vec<TestProcedure>,
    ) -> Workload {
        Workload {
            name: "unittest".to_string(),
            description: String::new(),
            meta: None,
            indices,
            data_streams: Vec::new(),
            templates: Vec::new(),
            composable_templates: Vec::new(),
            component_templates: Vec::new(),
            corpora,
            test_procedures,
            root_dir: PathBuf::new(),
        }
    }
}
