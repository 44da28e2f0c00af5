//! Workload file reading
//!
//! Turns an assembled and rendered workload JSON document into the typed
//! model. Validation happens in three stages: the version gate, JSON Schema
//! validation and the cross-field invariants the schema cannot express
//! (mutually exclusive indices/data-streams, unique procedure and task
//! names, exactly one default procedure, consistent corpus targets).

use std::io::Write;
use std::path::{Path, PathBuf};

use jsonschema::JSONSchema;
use serde_json::Value;
use tracing::info;

use crate::error::{BenchError, BenchResult};
use crate::template::{self, CompleteWorkloadParams, TemplateSource};
use crate::util;
use crate::workload::{
    ComponentTemplate, DataStream, DocumentCorpus, Documents, Index, IndexTemplate, Operation,
    OperationType, Parallel, Params, ScheduleNode, Task, TestProcedure, Workload,
    SOURCE_FORMAT_BULK,
};

pub const MIN_SUPPORTED_VERSION: i64 = 2;
pub const MAX_SUPPORTED_VERSION: i64 = 2;

const WORKLOAD_SCHEMA: &str = include_str!("../../resources/workload-schema.json");

/// Reads and validates a workload file.
pub struct WorkloadFileReader {
    workload_params: Params,
    selected_test_procedure: Option<String>,
}

impl WorkloadFileReader {
    pub fn new(workload_params: Params, selected_test_procedure: Option<String>) -> Self {
        Self {
            workload_params,
            selected_test_procedure,
        }
    }

    /// Read `workload_file`, render it with the user parameters and build
    /// the workload model. Fails if any user parameter goes unused.
    pub fn read(&self, workload_name: &str, workload_file: &Path) -> BenchResult<Workload> {
        info!(workload = workload_name, file = %workload_file.display(), "reading workload specification");
        let mut complete_params = CompleteWorkloadParams::new(self.workload_params.clone());

        let source = TemplateSource::from_file(workload_file)?;
        template::register_template_variables(source.assembled_source(), &mut complete_params)?;
        let rendered = template::render_template(&source, &self.workload_params)?;

        let spec: Value = match serde_json::from_str(&rendered) {
            Ok(spec) => spec,
            Err(e) => return Err(json_error_with_context(workload_file, &rendered, &e)),
        };

        // check the version before schema validation to avoid bogus errors
        // against a schema the workload was never written for
        let version = match spec.get("version") {
            None => MAX_SUPPORTED_VERSION,
            Some(v) => v.as_i64().ok_or_else(|| {
                BenchError::WorkloadSyntax(format!(
                    "version identifier for workload {workload_name} must be numeric but was [{v}]"
                ))
            })?,
        };
        if version < MIN_SUPPORTED_VERSION {
            return Err(BenchError::SystemSetup(format!(
                "Workload {workload_name} is on version {version} but needs to be updated at least to \
                 version {MIN_SUPPORTED_VERSION} to work with this driver."
            )));
        }
        if version > MAX_SUPPORTED_VERSION {
            return Err(BenchError::SystemSetup(format!(
                "Workload {workload_name} requires a newer driver version (supported workload version: \
                 {MAX_SUPPORTED_VERSION}, required workload version: {version}). Please upgrade."
            )));
        }

        validate_against_schema(workload_name, &spec)?;

        let root_dir = workload_file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let spec_reader = WorkloadSpecReader {
            name: workload_name.to_string(),
            workload_params: self.workload_params.clone(),
            selected_test_procedure: self.selected_test_procedure.clone(),
            root_dir,
        };
        let workload = spec_reader.read(&spec, &mut complete_params)?;

        if let Some(selected) = &self.selected_test_procedure {
            if workload.find_test_procedure(selected).is_none() {
                return Err(BenchError::SystemSetup(format!(
                    "Unknown test procedure [{selected}] for workload [{workload_name}]"
                )));
            }
        }

        let unused = complete_params.unused_user_defined();
        if !unused.is_empty() {
            let suggestions = complete_params.close_matches(&unused);
            return Err(BenchError::WorkloadConfig(format!(
                "Some of your workload parameter(s) {:?} are not used by this workload; perhaps you intend \
                 to use {:?} instead.\n\nAll parameters exposed by this workload:\n{}",
                unused,
                suggestions,
                complete_params
                    .sorted_workload_defined()
                    .iter()
                    .map(|p| format!("- {p}"))
                    .collect::<Vec<_>>()
                    .join("\n")
            )));
        }
        Ok(workload)
    }
}

fn validate_against_schema(workload_name: &str, spec: &Value) -> BenchResult<()> {
    let schema: Value = serde_json::from_str(WORKLOAD_SCHEMA)
        .map_err(|e| BenchError::assertion(format!("embedded workload schema is invalid: {e}")))?;
    let compiled = JSONSchema::compile(&schema)
        .map_err(|e| BenchError::assertion(format!("embedded workload schema does not compile: {e}")))?;
    if let Err(errors) = compiled.validate(spec) {
        let details: Vec<String> = errors
            .map(|e| format!("{} (at {})", e, e.instance_path))
            .collect();
        return Err(BenchError::WorkloadSyntax(format!(
            "Workload '{}' is invalid.\n\nError details:\n{}",
            workload_name,
            details.join("\n")
        )));
    }
    Ok(())
}

/// Dump the rendered workload for diagnosis and point at the offending line
/// of a JSON parse failure.
fn json_error_with_context(workload_file: &Path, rendered: &str, e: &serde_json::Error) -> BenchError {
    let mut msg = format!("Could not load '{}': {e}.", workload_file.display());
    let line_idx = e.line().saturating_sub(1);
    let lines: Vec<&str> = rendered.split('\n').collect();
    if !lines.is_empty() && e.line() > 0 && e.column() > 0 {
        let ctx_start = line_idx.saturating_sub(3);
        let ctx_end = (line_idx + 3).min(lines.len());
        let mut context: Vec<String> = lines[ctx_start..ctx_end].iter().map(|s| s.to_string()).collect();
        let insert_at = (line_idx - ctx_start + 1).min(context.len());
        context.insert(insert_at, format!("{}^ Error is here", "-".repeat(e.column() - 1)));
        msg.push_str(&format!(" Lines containing the error:\n\n{}\n\n", context.join("\n")));
    }
    if let Ok(mut tmp) = tempfile::Builder::new().suffix(".json").tempfile() {
        if tmp.write_all(rendered.as_bytes()).is_ok() {
            if let Ok((_, path)) = tmp.keep() {
                msg.push_str(&format!(
                    "The complete workload has been written to '{}' for diagnosis.",
                    path.display()
                ));
            }
        }
    }
    BenchError::WorkloadSyntax(msg)
}

struct WorkloadSpecReader {
    name: String,
    workload_params: Params,
    selected_test_procedure: Option<String>,
    root_dir: PathBuf,
}

impl WorkloadSpecReader {
    fn read(&self, spec: &Value, complete_params: &mut CompleteWorkloadParams) -> BenchResult<Workload> {
        let description = opt_str(spec, "description").unwrap_or_default();
        let meta = spec.get("meta").cloned();

        let indices = self.read_indices(spec, complete_params)?;
        let data_streams = self.read_data_streams(spec)?;
        if !indices.is_empty() && !data_streams.is_empty() {
            return Err(self.error("indices and data-streams cannot both be specified"));
        }

        let templates = self.read_index_templates(spec, "templates", complete_params)?;
        let composable_templates = self.read_index_templates(spec, "composable-templates", complete_params)?;
        let component_templates = self.read_component_templates(spec, complete_params)?;
        let corpora = self.read_corpora(spec, &indices, &data_streams)?;
        let test_procedures = self.read_test_procedures(spec)?;

        Ok(Workload {
            name: self.name.clone(),
            description,
            meta,
            indices,
            data_streams,
            templates,
            composable_templates,
            component_templates,
            corpora,
            test_procedures,
            root_dir: self.root_dir.clone(),
        })
    }

    fn error(&self, msg: impl std::fmt::Display) -> BenchError {
        BenchError::WorkloadSyntax(format!("Workload '{}' is invalid. {msg}", self.name))
    }

    fn read_indices(
        &self,
        spec: &Value,
        complete_params: &mut CompleteWorkloadParams,
    ) -> BenchResult<Vec<Index>> {
        let mut indices = Vec::new();
        for index_spec in array(spec, "indices") {
            let name = require_str(index_spec, "name").map_err(|m| self.error(m))?;
            let body = match opt_str(index_spec, "body") {
                Some(body_file) => Some(template::load_json_template(
                    &self.root_dir.join(&body_file),
                    &self.workload_params,
                    complete_params,
                    &format!("definition for index {name} in {body_file}"),
                )?),
                None => None,
            };
            let types = array(index_spec, "types")
                .iter()
                .filter_map(|t| t.as_str().map(str::to_string))
                .collect();
            indices.push(Index {
                name,
                body,
                types,
            });
        }
        Ok(indices)
    }

    fn read_data_streams(&self, spec: &Value) -> BenchResult<Vec<DataStream>> {
        array(spec, "data-streams")
            .iter()
            .map(|ds| {
                require_str(ds, "name")
                    .map(|name| DataStream { name })
                    .map_err(|m| self.error(m))
            })
            .collect()
    }

    fn read_index_templates(
        &self,
        spec: &Value,
        key: &str,
        complete_params: &mut CompleteWorkloadParams,
    ) -> BenchResult<Vec<IndexTemplate>> {
        let mut templates = Vec::new();
        for tpl_spec in array(spec, key) {
            let name = require_str(tpl_spec, "name").map_err(|m| self.error(m))?;
            let template_file = require_str(tpl_spec, "template").map_err(|m| self.error(m))?;
            let index_pattern = require_str(tpl_spec, "index-pattern").map_err(|m| self.error(m))?;
            let delete_matching_indices = tpl_spec
                .get("delete-matching-indices")
                .and_then(Value::as_bool)
                .unwrap_or(true);
            let content = template::load_json_template(
                &self.root_dir.join(&template_file),
                &self.workload_params,
                complete_params,
                &format!("definition for index template {name} in {template_file}"),
            )?;
            templates.push(IndexTemplate {
                name,
                index_pattern,
                content: Some(content),
                delete_matching_indices,
            });
        }
        Ok(templates)
    }

    fn read_component_templates(
        &self,
        spec: &Value,
        complete_params: &mut CompleteWorkloadParams,
    ) -> BenchResult<Vec<ComponentTemplate>> {
        let mut templates = Vec::new();
        for tpl_spec in array(spec, "component-templates") {
            let name = require_str(tpl_spec, "name").map_err(|m| self.error(m))?;
            let template_file = require_str(tpl_spec, "template").map_err(|m| self.error(m))?;
            let content = template::load_json_template(
                &self.root_dir.join(&template_file),
                &self.workload_params,
                complete_params,
                &format!("definition for component template {name} in {template_file}"),
            )?;
            templates.push(ComponentTemplate {
                name,
                content: Some(content),
            });
        }
        Ok(templates)
    }

    fn read_corpora(
        &self,
        spec: &Value,
        indices: &[Index],
        data_streams: &[DataStream],
    ) -> BenchResult<Vec<DocumentCorpus>> {
        let mut corpora = Vec::new();
        let mut known_names = std::collections::HashSet::new();
        for corpus_spec in array(spec, "corpora") {
            let name = require_str(corpus_spec, "name").map_err(|m| self.error(m))?;
            if !known_names.insert(name.clone()) {
                return Err(self.error(format!("Duplicate document corpus name [{name}].")));
            }
            let mut corpus = DocumentCorpus::new(&name, corpus_spec.get("meta").cloned());
            corpus.streaming_ingestion = corpus_spec
                .get("streaming-ingestion")
                .and_then(Value::as_bool)
                .unwrap_or(false);

            // corpus-level defaults
            let default_base_url = opt_str(corpus_spec, "base-url");
            let default_source_format =
                opt_str(corpus_spec, "source-format").unwrap_or_else(|| SOURCE_FORMAT_BULK.to_string());
            let default_action_and_meta = corpus_spec
                .get("includes-action-and-meta-data")
                .and_then(Value::as_bool)
                .unwrap_or(false);

            let corpus_target_idx = if indices.len() == 1 {
                Some(opt_str(corpus_spec, "target-index").unwrap_or_else(|| indices[0].name.clone()))
            } else {
                opt_str(corpus_spec, "target-index")
            };
            let corpus_target_ds = if data_streams.len() == 1 {
                Some(
                    opt_str(corpus_spec, "target-data-stream")
                        .unwrap_or_else(|| data_streams[0].name.clone()),
                )
            } else {
                opt_str(corpus_spec, "target-data-stream")
            };
            let corpus_target_type = if indices.len() == 1 && indices[0].types.len() == 1 {
                Some(opt_str(corpus_spec, "target-type").unwrap_or_else(|| indices[0].types[0].clone()))
            } else {
                opt_str(corpus_spec, "target-type")
            };

            for doc_spec in array(corpus_spec, "documents") {
                let source_format =
                    opt_str(doc_spec, "source-format").unwrap_or_else(|| default_source_format.clone());
                if source_format != SOURCE_FORMAT_BULK {
                    return Err(self.error(format!(
                        "Unknown source-format [{source_format}] in document corpus [{name}]."
                    )));
                }
                let source_file = require_str(doc_spec, "source-file").map_err(|m| self.error(m))?;
                let (document_archive, document_file) = if util::io::is_archive(&source_file) {
                    (
                        Some(source_file.clone()),
                        Some(util::io::strip_archive_extension(&source_file)),
                    )
                } else {
                    (None, Some(source_file.clone()))
                };

                let number_of_documents = doc_spec.get("document-count").and_then(Value::as_u64);
                if number_of_documents.is_none() && !corpus.streaming_ingestion {
                    return Err(self.error(format!(
                        "Mandatory element 'document-count' is missing in '{source_file}'."
                    )));
                }

                let includes_action_and_meta_data = doc_spec
                    .get("includes-action-and-meta-data")
                    .and_then(Value::as_bool)
                    .unwrap_or(default_action_and_meta);

                let (target_index, target_type, target_data_stream) = if includes_action_and_meta_data {
                    (None, None, None)
                } else {
                    let target_type = opt_str(doc_spec, "target-type").or_else(|| corpus_target_type.clone());
                    let target_ds =
                        opt_str(doc_spec, "target-data-stream").or_else(|| corpus_target_ds.clone());
                    if target_ds.is_none() && !data_streams.is_empty() {
                        return Err(self.error(format!("a target-data-stream is required for {source_file}")));
                    }
                    if target_ds.is_some() && !indices.is_empty() {
                        return Err(self.error("target-data-stream cannot be used when using indices"));
                    }
                    if target_ds.is_some() && target_type.is_some() {
                        return Err(self.error("target-type cannot be used when using data-streams"));
                    }
                    let target_idx = opt_str(doc_spec, "target-index").or_else(|| corpus_target_idx.clone());
                    if target_idx.is_some() && !data_streams.is_empty() {
                        return Err(self.error("target-index cannot be used when using data-streams"));
                    }
                    if target_idx.is_none() && target_ds.is_none() {
                        let wanted = if !indices.is_empty() {
                            "target-index"
                        } else {
                            "target-data-stream"
                        };
                        return Err(self.error(format!("a {wanted} is required for {source_file}")));
                    }
                    (target_idx, target_type, target_ds)
                };

                corpus.documents.push(Documents {
                    source_format,
                    document_file,
                    document_archive,
                    base_url: opt_str(doc_spec, "base-url").or_else(|| default_base_url.clone()),
                    source_url: opt_str(doc_spec, "source-url"),
                    includes_action_and_meta_data,
                    number_of_documents: number_of_documents.unwrap_or(0),
                    compressed_size_in_bytes: doc_spec.get("compressed-bytes").and_then(Value::as_u64),
                    uncompressed_size_in_bytes: doc_spec.get("uncompressed-bytes").and_then(Value::as_u64),
                    target_index,
                    target_type,
                    target_data_stream,
                    meta: doc_spec.get("meta").cloned(),
                });
            }
            corpora.push(corpus);
        }
        Ok(corpora)
    }

    fn read_test_procedures(&self, spec: &Value) -> BenchResult<Vec<TestProcedure>> {
        let operations = self.parse_operations(spec)?;
        let workload_params = spec
            .get("parameters")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        let (procedure_specs, auto_generated) = self.test_procedure_specs(spec)?;
        let number_of_procedures = procedure_specs.len();

        let mut procedures: Vec<TestProcedure> = Vec::new();
        let mut known_names = std::collections::HashSet::new();
        let mut default_name: Option<String> = None;
        for procedure_spec in &procedure_specs {
            let name = require_str(procedure_spec, "name").map_err(|m| self.error(m))?;
            if !known_names.insert(name.clone()) {
                return Err(self.error(format!("Duplicate test_procedure with name '{name}'.")));
            }
            // a sole procedure is the default no matter what the workload says
            let default = number_of_procedures == 1
                || procedure_spec.get("default").and_then(Value::as_bool).unwrap_or(false);
            let selected =
                number_of_procedures == 1 || self.selected_test_procedure.as_deref() == Some(name.as_str());
            if default {
                if let Some(previous) = &default_name {
                    return Err(self.error(format!(
                        "Both '{previous}' and '{name}' are defined as default test_procedures. \
                         Please define only one of them as default."
                    )));
                }
                default_name = Some(name.clone());
            }

            let mut schedule = Vec::new();
            for node_spec in array(procedure_spec, "schedule") {
                if let Some(parallel_spec) = node_spec.get("parallel") {
                    schedule.push(ScheduleNode::Parallel(self.parse_parallel(
                        parallel_spec,
                        &operations,
                        &name,
                    )?));
                } else {
                    schedule.push(ScheduleNode::Leaf(self.parse_task(
                        node_spec,
                        &operations,
                        &name,
                        &TaskDefaults::default(),
                        None,
                    )?));
                }
            }

            // duplicate task names are confusing in published results
            let mut known_task_names = std::collections::HashSet::new();
            for node in &schedule {
                for task in node.leaf_tasks() {
                    if !known_task_names.insert(task.name.clone()) {
                        return Err(self.error(format!(
                            "TestProcedure '{name}' contains multiple tasks with the name '{}'. Please use \
                             the task's name property to assign a unique name for each task.",
                            task.name
                        )));
                    }
                }
            }

            let mut parameters = workload_params.clone();
            if let Some(proc_params) = procedure_spec.get("parameters").and_then(Value::as_object) {
                for (k, v) in proc_params {
                    parameters.insert(k.clone(), v.clone());
                }
            }

            procedures.push(TestProcedure {
                name,
                description: opt_str(procedure_spec, "description"),
                user_info: opt_str(procedure_spec, "user-info"),
                meta: procedure_spec.get("meta").cloned(),
                default,
                selected,
                auto_generated,
                parameters,
                schedule,
            });
        }

        if !procedures.is_empty() && default_name.is_none() {
            return Err(self.error(format!(
                "No default test_procedure specified. Please edit the workload and add \"default\": true \
                 to one of the test_procedures {}.",
                procedures
                    .iter()
                    .map(|p| p.name.clone())
                    .collect::<Vec<_>>()
                    .join(", ")
            )));
        }
        Ok(procedures)
    }

    /// Exactly one of `test_procedure`, `test_procedures` or a top-level
    /// `schedule` must be present. A bare schedule auto-generates a single
    /// default procedure.
    fn test_procedure_specs(&self, spec: &Value) -> BenchResult<(Vec<Value>, bool)> {
        let single = spec.get("test_procedure");
        let many = spec.get("test_procedures");
        let schedule = spec.get("schedule");

        let count = [single, many, schedule].iter().filter(|v| v.is_some()).count();
        match count {
            0 => Err(self.error(
                "You must define 'test_procedure', 'test_procedures' or 'schedule' but none is specified.",
            )),
            1 => {
                if let Some(single) = single {
                    Ok((vec![single.clone()], false))
                } else if let Some(many) = many {
                    Ok((many.as_array().cloned().unwrap_or_default(), false))
                } else {
                    Ok((
                        vec![serde_json::json!({
                            "name": "default",
                            "schedule": schedule.cloned().unwrap_or_else(|| Value::Array(Vec::new()))
                        })],
                        true,
                    ))
                }
            }
            _ => Err(self.error(
                "Multiple out of 'test_procedure', 'test_procedures' or 'schedule' are defined but only \
                 one of them is allowed.",
            )),
        }
    }

    fn parse_parallel(
        &self,
        parallel_spec: &Value,
        operations: &std::collections::HashMap<String, Operation>,
        procedure_name: &str,
    ) -> BenchResult<Parallel> {
        let defaults = TaskDefaults {
            warmup_iterations: parallel_spec.get("warmup-iterations").and_then(Value::as_u64),
            iterations: parallel_spec.get("iterations").and_then(Value::as_u64),
            warmup_time_period: parallel_spec.get("warmup-time-period").and_then(Value::as_u64),
            time_period: parallel_spec.get("time-period").and_then(Value::as_u64),
        };
        let clients = parallel_spec
            .get("clients")
            .and_then(Value::as_u64)
            .map(|c| c as u32);
        let completed_by = opt_str(parallel_spec, "completed-by");

        let mut tasks = Vec::new();
        for task_spec in array(parallel_spec, "tasks") {
            tasks.push(self.parse_task(
                task_spec,
                operations,
                procedure_name,
                &defaults,
                completed_by.as_deref(),
            )?);
        }
        if let Some(completed_by) = &completed_by {
            let matches = tasks.iter().filter(|t| t.completes_parent).count();
            if matches > 1 {
                return Err(self.error(format!(
                    "'parallel' element for test_procedure '{procedure_name}' contains multiple tasks with \
                     the name '{completed_by}' which are marked with 'completed-by' but only one task is \
                     allowed to match."
                )));
            }
            if matches == 0 {
                return Err(self.error(format!(
                    "'parallel' element for test_procedure '{procedure_name}' is marked with 'completed-by' \
                     with task name '{completed_by}' but no task with this name exists."
                )));
            }
        }
        Ok(Parallel {
            tasks,
            clients,
        })
    }

    fn parse_task(
        &self,
        task_spec: &Value,
        operations: &std::collections::HashMap<String, Operation>,
        procedure_name: &str,
        defaults: &TaskDefaults,
        completed_by_name: Option<&str>,
    ) -> BenchResult<Task> {
        let op_spec = task_spec
            .get("operation")
            .ok_or_else(|| self.error(format!("Mandatory element 'operation' is missing in '{procedure_name}'.")))?;
        let operation = match op_spec.as_str() {
            Some(op_name) if operations.contains_key(op_name) => operations[op_name].clone(),
            // may as well be an inline operation
            _ => self.parse_operation(op_spec)?,
        };

        let name = opt_str(task_spec, "name").unwrap_or_else(|| operation.name.clone());
        let tags = array(task_spec, "tags")
            .iter()
            .filter_map(|t| t.as_str().map(str::to_string))
            .collect();

        let task = Task {
            name: name.clone(),
            tags,
            meta: task_spec.get("meta").cloned(),
            warmup_iterations: task_spec
                .get("warmup-iterations")
                .and_then(Value::as_u64)
                .or(defaults.warmup_iterations),
            iterations: task_spec.get("iterations").and_then(Value::as_u64).or(defaults.iterations),
            warmup_time_period: task_spec
                .get("warmup-time-period")
                .and_then(Value::as_u64)
                .or(defaults.warmup_time_period),
            time_period: task_spec.get("time-period").and_then(Value::as_u64).or(defaults.time_period),
            clients: task_spec.get("clients").and_then(Value::as_u64).unwrap_or(1) as u32,
            completes_parent: completed_by_name == Some(name.as_str()),
            schedule: opt_str(task_spec, "schedule"),
            params: task_spec.as_object().cloned().unwrap_or_default(),
            operation,
        };

        if task.warmup_iterations.is_some() && task.time_period.is_some() {
            return Err(self.error(format!(
                "Operation '{}' in test_procedure '{procedure_name}' defines {} warmup iterations and a \
                 time period of {} seconds. Please do not mix time periods and iterations.",
                task.operation.name,
                task.warmup_iterations.unwrap(),
                task.time_period.unwrap()
            )));
        }
        if task.warmup_time_period.is_some() && task.iterations.is_some() {
            return Err(self.error(format!(
                "Operation '{}' in test_procedure '{procedure_name}' defines a warmup time period of {} \
                 seconds and {} iterations. Please do not mix time periods and iterations.",
                task.operation.name,
                task.warmup_time_period.unwrap(),
                task.iterations.unwrap()
            )));
        }
        Ok(task)
    }

    fn parse_operations(&self, spec: &Value) -> BenchResult<std::collections::HashMap<String, Operation>> {
        let mut ops = std::collections::HashMap::new();
        for op_spec in array(spec, "operations") {
            let op = self.parse_operation(op_spec)?;
            if ops.contains_key(&op.name) {
                return Err(self.error(format!("Duplicate operation with name '{}'.", op.name)));
            }
            ops.insert(op.name.clone(), op);
        }
        Ok(ops)
    }

    fn parse_operation(&self, op_spec: &Value) -> BenchResult<Operation> {
        let (name, operation_type, meta, param_source, mut params) = match op_spec {
            // just a name, e.g. a bare "force-merge" in a schedule
            Value::String(name) => (name.clone(), name.clone(), None, None, Params::new()),
            Value::Object(map) => {
                let operation_type = require_str(op_spec, "operation-type").map_err(|m| self.error(m))?;
                let name = opt_str(op_spec, "name").unwrap_or_else(|| operation_type.clone());
                (
                    name,
                    operation_type,
                    map.get("meta").cloned(),
                    opt_str(op_spec, "param-source"),
                    map.clone(),
                )
            }
            _ => return Err(self.error("operations must be strings or objects")),
        };

        // admin operations stay out of published results unless the
        // workload opts back in
        if let Some(op_type) = OperationType::from_hyphenated_string(&operation_type) {
            params
                .entry("include-in-results-publishing".to_string())
                .or_insert(Value::Bool(!op_type.is_admin()));
        }

        Ok(Operation {
            name,
            operation_type,
            meta,
            params,
            param_source,
        })
    }
}

#[derive(Default)]
struct TaskDefaults {
    warmup_iterations: Option<u64>,
    iterations: Option<u64>,
    warmup_time_period: Option<u64>,
    time_period: Option<u64>,
}

fn array<'a>(value: &'a Value, key: &str) -> &'a [Value] {
    value.get(key).and_then(Value::as_array).map(Vec::as_slice).unwrap_or(&[])
}

fn opt_str(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}

fn require_str(value: &Value, key: &str) -> Result<String, String> {
    opt_str(value, key).ok_or_else(|| format!("Mandatory element '{key}' is missing."))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn write_workload(spec: &Value) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("workload.json");
        std::fs::write(&path, serde_json::to_string_pretty(spec).unwrap()).unwrap();
        (dir, path)
    }

    fn read(spec: &Value) -> BenchResult<Workload> {
        read_with(spec, Params::new(), None)
    }

    fn read_with(
        spec: &Value,
        params: Params,
        selected: Option<&str>,
    ) -> BenchResult<Workload> {
        let (_dir, path) = write_workload(spec);
        WorkloadFileReader::new(params, selected.map(str::to_string)).read("unittest", &path)
    }

    fn minimal_spec() -> Value {
        json!({
            "version": 2,
            "indices": [{"name": "logs"}],
            "corpora": [{
                "name": "logs",
                "documents": [{"source-file": "docs.json", "document-count": 10}]
            }],
            "operations": [
                {"name": "index-docs", "operation-type": "bulk", "bulk-size": 100}
            ],
            "schedule": [
                {"operation": "index-docs", "clients": 2}
            ]
        })
    }

    #[test]
    fn test_reads_minimal_workload() {
        let workload = read(&minimal_spec()).unwrap();
        assert_eq!(workload.name, "unittest");
        assert_eq!(workload.indices.len(), 1);
        assert_eq!(workload.corpora.len(), 1);
        // the singleton index is the default target
        assert_eq!(
            workload.corpora[0].documents[0].target_index.as_deref(),
            Some("logs")
        );
        assert_eq!(workload.test_procedures.len(), 1);
        let procedure = &workload.test_procedures[0];
        assert_eq!(procedure.name, "default");
        assert!(procedure.auto_generated);
        assert!(procedure.default);
        assert!(procedure.selected);
    }

    #[test]
    fn test_rejects_unsupported_versions() {
        let mut spec = minimal_spec();
        spec["version"] = json!(1);
        let err = read(&spec).unwrap_err();
        assert!(matches!(err, BenchError::SystemSetup(_)), "{err}");

        spec["version"] = json!(3);
        let err = read(&spec).unwrap_err();
        assert!(matches!(err, BenchError::SystemSetup(_)), "{err}");
    }

    #[test]
    fn test_rejects_indices_and_data_streams_together() {
        let mut spec = minimal_spec();
        spec["data-streams"] = json!([{"name": "logs-ds"}]);
        let err = read(&spec).unwrap_err();
        assert!(err.to_string().contains("cannot both be specified"), "{err}");
    }

    #[test]
    fn test_rejects_multiple_schedule_styles() {
        let mut spec = minimal_spec();
        spec["test_procedures"] = json!([{"name": "p", "schedule": []}]);
        let err = read(&spec).unwrap_err();
        assert!(err.to_string().contains("only one of them is allowed"), "{err}");
    }

    #[test]
    fn test_duplicate_task_names_rejected() {
        let mut spec = minimal_spec();
        spec["schedule"] = json!([
            {"operation": "index-docs"},
            {"operation": "index-docs"}
        ]);
        let err = read(&spec).unwrap_err();
        assert!(err.to_string().contains("multiple tasks with the name"), "{err}");
    }

    #[test]
    fn test_sole_procedure_is_default_and_selected() {
        let mut spec = minimal_spec();
        spec.as_object_mut().unwrap().remove("schedule");
        spec["test_procedure"] = json!({
            "name": "append",
            "schedule": [{"operation": "index-docs"}]
        });
        let workload = read(&spec).unwrap();
        let procedure = &workload.test_procedures[0];
        assert!(procedure.default);
        assert!(procedure.selected);
        assert!(!procedure.auto_generated);
    }

    #[test]
    fn test_explicit_selection_and_default_rules() {
        let mut spec = minimal_spec();
        spec.as_object_mut().unwrap().remove("schedule");
        spec["test_procedures"] = json!([
            {"name": "append", "default": true, "schedule": [{"operation": "index-docs"}]},
            {"name": "query", "schedule": [{"operation": "index-docs"}]}
        ]);

        let workload = read_with(&spec, Params::new(), Some("query")).unwrap();
        assert_eq!(workload.selected_test_procedure().unwrap().name, "query");
        assert_eq!(workload.default_test_procedure().unwrap().name, "append");

        // without a selection the default wins
        let workload = read(&spec).unwrap();
        assert_eq!(workload.selected_test_procedure().unwrap().name, "append");

        // an unknown selection is a setup error
        let err = read_with(&spec, Params::new(), Some("nope")).unwrap_err();
        assert!(matches!(err, BenchError::SystemSetup(_)), "{err}");
    }

    #[test]
    fn test_two_defaults_rejected() {
        let mut spec = minimal_spec();
        spec.as_object_mut().unwrap().remove("schedule");
        spec["test_procedures"] = json!([
            {"name": "a", "default": true, "schedule": [{"operation": "index-docs"}]},
            {"name": "b", "default": true, "schedule": [{"operation": "index-docs", "name": "other"}]}
        ]);
        let err = read(&spec).unwrap_err();
        assert!(err.to_string().contains("only one of them as default"), "{err}");
    }

    #[test]
    fn test_no_default_rejected() {
        let mut spec = minimal_spec();
        spec.as_object_mut().unwrap().remove("schedule");
        spec["test_procedures"] = json!([
            {"name": "a", "schedule": [{"operation": "index-docs"}]},
            {"name": "b", "schedule": [{"operation": "index-docs", "name": "other"}]}
        ]);
        let err = read(&spec).unwrap_err();
        assert!(err.to_string().contains("No default test_procedure"), "{err}");
    }

    #[test]
    fn test_parallel_completed_by_multiple_matches_rejected() {
        let mut spec = minimal_spec();
        spec["schedule"] = json!([{
            "parallel": {
                "completed-by": "index-2",
                "tasks": [
                    {"operation": "index-docs", "name": "index-1"},
                    {"operation": "index-docs", "name": "index-2"},
                    {"operation": "index-docs", "name": "index-2"}
                ]
            }
        }]);
        let err = read(&spec).unwrap_err();
        assert!(err.to_string().contains("only one task is allowed to match"), "{err}");
    }

    #[test]
    fn test_parallel_completed_by_single_match() {
        let mut spec = minimal_spec();
        spec["schedule"] = json!([{
            "parallel": {
                "completed-by": "index-2",
                "tasks": [
                    {"operation": "index-docs", "name": "index-1"},
                    {"operation": "index-docs", "name": "index-2"},
                    {"operation": "index-docs", "name": "index-3"}
                ]
            }
        }]);
        let workload = read(&spec).unwrap();
        let completing: Vec<&str> = workload.test_procedures[0]
            .leaf_tasks()
            .filter(|t| t.completes_parent)
            .map(|t| t.name.as_str())
            .collect();
        assert_eq!(completing, vec!["index-2"]);
    }

    #[test]
    fn test_parallel_completed_by_unknown_rejected() {
        let mut spec = minimal_spec();
        spec["schedule"] = json!([{
            "parallel": {
                "completed-by": "missing",
                "tasks": [{"operation": "index-docs", "name": "index-1"}]
            }
        }]);
        let err = read(&spec).unwrap_err();
        assert!(err.to_string().contains("no task with this name exists"), "{err}");
    }

    #[test]
    fn test_mixing_iterations_and_time_period_rejected() {
        let mut spec = minimal_spec();
        spec["schedule"] = json!([
            {"operation": "index-docs", "warmup-iterations": 5, "time-period": 10}
        ]);
        let err = read(&spec).unwrap_err();
        assert!(err.to_string().contains("do not mix time periods and iterations"), "{err}");
    }

    #[test]
    fn test_archive_source_file_splits_into_archive_and_file() {
        let mut spec = minimal_spec();
        spec["corpora"] = json!([{
            "name": "logs",
            "documents": [{"source-file": "docs.json.bz2", "document-count": 10}]
        }]);
        let workload = read(&spec).unwrap();
        let docs = &workload.corpora[0].documents[0];
        assert_eq!(docs.document_archive.as_deref(), Some("docs.json.bz2"));
        assert_eq!(docs.document_file.as_deref(), Some("docs.json"));
    }

    #[test]
    fn test_unused_user_params_fail_with_suggestion() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("workload.json");
        std::fs::write(
            &path,
            r#"{
              "version": 2,
              "indices": [{"name": "logs"}],
              "operations": [{"name": "s", "operation-type": "search",
                              "index": "logs",
                              "body": {"size": {{ search_size | default(10) }}}}],
              "schedule": [{"operation": "s"}]
            }"#,
        )
        .unwrap();

        let mut params = Params::new();
        params.insert("search_sizes".to_string(), json!(50));
        let err = WorkloadFileReader::new(params, None)
            .read("unittest", &path)
            .unwrap_err();
        assert!(matches!(err, BenchError::WorkloadConfig(_)), "{err}");
        assert!(err.to_string().contains("search_size"), "{err}");
    }

    #[test]
    fn test_admin_operation_defaults_out_of_results_publishing() {
        let mut spec = minimal_spec();
        spec["operations"] = json!([
            {"name": "index-docs", "operation-type": "bulk", "bulk-size": 100},
            {"name": "merge", "operation-type": "force-merge"}
        ]);
        spec["schedule"] = json!([{"operation": "index-docs"}, {"operation": "merge"}]);
        let workload = read(&spec).unwrap();
        let procedure = &workload.test_procedures[0];
        let tasks: Vec<&Task> = procedure.leaf_tasks().collect();
        assert_eq!(
            tasks[0].operation.params["include-in-results-publishing"],
            json!(true)
        );
        assert_eq!(
            tasks[1].operation.params["include-in-results-publishing"],
            json!(false)
        );
    }
}
