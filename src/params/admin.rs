//! Parameter sources for administrative operations
//!
//! Create/delete operations accept an explicit target or default to every
//! matching entity declared in the workload. They are all idempotent:
//! every client receives the same parameter record on every call.

use serde_json::{json, Value};

use crate::error::{BenchError, BenchResult};
use crate::params::{client_params, ConstantParamSource, ParamSource};
use crate::registry::ParamSourceFactory;
use crate::util::parse;
use crate::workload::{Params, Workload};

/// The default query/ingest target: the sole declared index or data
/// stream, overridable through `index` / `data-stream` parameters.
pub(crate) fn get_target(workload: &Workload, params: &Params) -> Option<String> {
    let default_target = if workload.indices.len() == 1 {
        Some(workload.indices[0].name.clone())
    } else if workload.data_streams.len() == 1 {
        Some(workload.data_streams[0].name.clone())
    } else {
        None
    };
    params
        .get("index")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| {
            params
                .get("data-stream")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .or(default_target)
}

fn string_or_list(value: Option<&Value>) -> Option<Vec<String>> {
    match value {
        Some(Value::String(s)) => Some(vec![s.clone()]),
        Some(Value::Array(items)) => Some(
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
        ),
        _ => None,
    }
}

fn request_params(params: &Params) -> Value {
    params
        .get("request-params")
        .cloned()
        .unwrap_or_else(|| json!({}))
}

fn deep_merge(dst: &mut Value, src: &Value) {
    match (dst, src) {
        (Value::Object(dst), Value::Object(src)) => {
            for (k, v) in src {
                match dst.get_mut(k) {
                    Some(existing) if existing.is_object() && v.is_object() => deep_merge(existing, v),
                    _ => {
                        dst.insert(k.clone(), v.clone());
                    }
                }
            }
        }
        (dst, src) => *dst = src.clone(),
    }
}

fn constant(params: Params) -> BenchResult<Box<dyn ParamSource>> {
    Ok(Box::new(ConstantParamSource::new(params)))
}

pub fn sleep_factory() -> ParamSourceFactory {
    std::sync::Arc::new(|_ctx, _workload, params, _name| {
        let duration = params.get("duration").ok_or_else(|| {
            BenchError::WorkloadSyntax("parameter 'duration' is mandatory for sleep operation".to_string())
        })?;
        let duration = duration.as_f64().ok_or_else(|| {
            BenchError::WorkloadSyntax("parameter 'duration' for sleep operation must be a number".to_string())
        })?;
        if duration < 0.0 {
            return Err(BenchError::WorkloadSyntax(format!(
                "parameter 'duration' must be non-negative but was {duration}"
            )));
        }
        constant(params.clone())
    })
}

pub fn force_merge_factory() -> ParamSourceFactory {
    std::sync::Arc::new(|_ctx, workload, params, _name| {
        let default_target = if !workload.indices.is_empty() || !workload.data_streams.is_empty() {
            // the force-merge API treats indices and data streams alike
            workload
                .indices
                .iter()
                .map(|i| i.name.clone())
                .chain(workload.data_streams.iter().map(|ds| ds.name.clone()))
                .collect::<Vec<_>>()
                .join(",")
        } else {
            "_all".to_string()
        };
        let target = params
            .get("index")
            .or_else(|| params.get("data-stream"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or(default_target);

        let mode = parse::string_param_or(params, "mode", "blocking")?;
        if mode != "blocking" && mode != "polling" {
            return Err(BenchError::WorkloadSyntax(format!(
                "force-merge 'mode' must be 'blocking' or 'polling' but was [{mode}]"
            )));
        }

        let mut p = params.clone();
        p.insert("index".to_string(), json!(target));
        p.insert(
            "max-num-segments".to_string(),
            params.get("max-num-segments").cloned().unwrap_or(Value::Null),
        );
        p.insert("mode".to_string(), json!(mode));
        p.insert(
            "poll-period".to_string(),
            params.get("poll-period").cloned().unwrap_or(json!(10)),
        );
        for (k, v) in client_params(params) {
            p.insert(k, v);
        }
        constant(p)
    })
}

pub fn create_index_factory() -> ParamSourceFactory {
    std::sync::Arc::new(|_ctx, workload, params, _name| {
        let settings = params.get("settings").cloned();
        let mut definitions: Vec<Value> = Vec::new();
        if !workload.indices.is_empty() {
            let filter = string_or_list(params.get("index"));
            for index in &workload.indices {
                if let Some(filter) = &filter {
                    if !filter.contains(&index.name) {
                        continue;
                    }
                }
                let mut body = index.body.clone().unwrap_or(Value::Null);
                if let Some(settings) = &settings {
                    if body.is_null() {
                        body = json!({ "settings": settings });
                    } else if let Some(obj) = body.as_object_mut() {
                        match obj.get_mut("settings") {
                            Some(existing) => deep_merge(existing, settings),
                            None => {
                                obj.insert("settings".to_string(), settings.clone());
                            }
                        }
                    }
                }
                definitions.push(json!([index.name, body]));
            }
        } else {
            let indices = string_or_list(params.get("index")).ok_or_else(|| {
                BenchError::WorkloadSyntax(
                    "Please set the property 'index' for the create-index operation".to_string(),
                )
            })?;
            let body = params.get("body").cloned().unwrap_or(Value::Null);
            for index in indices {
                definitions.push(json!([index, body]));
            }
        }
        let mut p = params.clone();
        p.insert("indices".to_string(), Value::Array(definitions));
        p.insert("request-params".to_string(), request_params(params));
        constant(p)
    })
}

pub fn delete_index_factory() -> ParamSourceFactory {
    std::sync::Arc::new(|_ctx, workload, params, _name| {
        let targets = string_or_list(params.get("index")).unwrap_or_else(|| {
            workload.indices.iter().map(|i| i.name.clone()).collect()
        });
        if targets.is_empty() {
            return Err(BenchError::WorkloadSyntax(
                "delete-index operation targets no index".to_string(),
            ));
        }
        let mut p = params.clone();
        p.insert("indices".to_string(), json!(targets));
        p.insert("request-params".to_string(), request_params(params));
        p.insert(
            "only-if-exists".to_string(),
            json!(parse::bool_param_or(params, "only-if-exists", true)?),
        );
        constant(p)
    })
}

pub fn create_data_stream_factory() -> ParamSourceFactory {
    std::sync::Arc::new(|_ctx, workload, params, _name| {
        let targets = if !workload.data_streams.is_empty() {
            let filter = string_or_list(params.get("data-stream"));
            workload
                .data_streams
                .iter()
                .map(|ds| ds.name.clone())
                .filter(|name| filter.as_ref().map(|f| f.contains(name)).unwrap_or(true))
                .collect()
        } else {
            string_or_list(params.get("data-stream")).ok_or_else(|| {
                BenchError::WorkloadSyntax(
                    "Please set the property 'data-stream' for the create-data-stream operation".to_string(),
                )
            })?
        };
        let mut p = params.clone();
        p.insert("data-streams".to_string(), json!(targets));
        p.insert("request-params".to_string(), request_params(params));
        constant(p)
    })
}

pub fn delete_data_stream_factory() -> ParamSourceFactory {
    std::sync::Arc::new(|_ctx, workload, params, _name| {
        let targets = string_or_list(params.get("data-stream")).unwrap_or_else(|| {
            workload.data_streams.iter().map(|ds| ds.name.clone()).collect()
        });
        if targets.is_empty() {
            return Err(BenchError::WorkloadSyntax(
                "delete-data-stream operation targets no data stream".to_string(),
            ));
        }
        let mut p = params.clone();
        p.insert("data-streams".to_string(), json!(targets));
        p.insert("request-params".to_string(), request_params(params));
        p.insert(
            "only-if-exists".to_string(),
            json!(parse::bool_param_or(params, "only-if-exists", true)?),
        );
        constant(p)
    })
}

pub fn create_index_template_factory() -> ParamSourceFactory {
    std::sync::Arc::new(|_ctx, workload, params, _name| {
        let settings = params.get("settings").cloned();
        let mut definitions: Vec<Value> = Vec::new();
        if !workload.templates.is_empty() {
            let filter = params.get("template").and_then(Value::as_str);
            for template in &workload.templates {
                if let Some(filter) = filter {
                    if template.name != filter {
                        continue;
                    }
                }
                let mut body = template.content.clone().unwrap_or(Value::Null);
                if let (Some(settings), Some(obj)) = (&settings, body.as_object_mut()) {
                    match obj.get_mut("settings") {
                        Some(existing) => deep_merge(existing, settings),
                        None => {
                            obj.insert("settings".to_string(), settings.clone());
                        }
                    }
                }
                definitions.push(json!([template.name, body]));
            }
        } else {
            let name = params.get("template").and_then(Value::as_str);
            let body = params.get("body");
            match (name, body) {
                (Some(name), Some(body)) => definitions.push(json!([name, body])),
                _ => {
                    return Err(BenchError::WorkloadSyntax(
                        "Please set the properties 'template' and 'body' for the create-index-template \
                         operation"
                            .to_string(),
                    ))
                }
            }
        }
        let mut p = params.clone();
        p.insert("templates".to_string(), Value::Array(definitions));
        p.insert("request-params".to_string(), request_params(params));
        constant(p)
    })
}

pub fn delete_index_template_factory() -> ParamSourceFactory {
    std::sync::Arc::new(|_ctx, workload, params, _name| {
        let mut definitions: Vec<Value> = Vec::new();
        if !workload.templates.is_empty() {
            let filter = params.get("template").and_then(Value::as_str);
            for template in &workload.templates {
                if let Some(filter) = filter {
                    if template.name != filter {
                        continue;
                    }
                }
                definitions.push(json!([
                    template.name,
                    template.delete_matching_indices,
                    template.index_pattern
                ]));
            }
        } else {
            let name = parse::string_param(params, "template").map_err(|_| {
                BenchError::WorkloadSyntax(
                    "Please set the property 'template' for the delete-index-template operation".to_string(),
                )
            })?;
            let delete_matching = parse::bool_param_or(params, "delete-matching-indices", false)?;
            let index_pattern = if delete_matching {
                Some(parse::string_param(params, "index-pattern").map_err(|_| {
                    BenchError::WorkloadSyntax(
                        "The property 'index-pattern' is required for delete-index-template if \
                         'delete-matching-indices' is true."
                            .to_string(),
                    )
                })?)
            } else {
                None
            };
            definitions.push(json!([name, delete_matching, index_pattern]));
        }
        let mut p = params.clone();
        p.insert("templates".to_string(), Value::Array(definitions));
        p.insert(
            "only-if-exists".to_string(),
            json!(parse::bool_param_or(params, "only-if-exists", true)?),
        );
        p.insert("request-params".to_string(), request_params(params));
        constant(p)
    })
}

fn create_template_definitions(
    templates: Vec<(String, Option<Value>)>,
    params: &Params,
    operation: &str,
) -> BenchResult<Vec<Value>> {
    let mut definitions: Vec<Value> = Vec::new();
    if let (Some(name), Some(body)) = (
        params.get("template").and_then(Value::as_str),
        params.get("body"),
    ) {
        definitions.push(json!([name, body]));
        return Ok(definitions);
    }
    if templates.is_empty() {
        return Err(BenchError::WorkloadSyntax(format!(
            "Please set the properties 'template' and 'body' for the {operation} operation or declare \
             composable and/or component templates in the workload"
        )));
    }
    let settings = params.get("settings").cloned();
    let filter = params.get("template").and_then(Value::as_str);
    for (name, content) in templates {
        if let Some(filter) = filter {
            if name != filter {
                continue;
            }
        }
        let mut body = content.unwrap_or(Value::Null);
        // template-level settings live under template.settings
        if let Some(settings) = &settings {
            if let Some(template) = body.get_mut("template").and_then(Value::as_object_mut) {
                match template.get_mut("settings") {
                    Some(existing) => deep_merge(existing, settings),
                    None => {
                        template.insert("settings".to_string(), settings.clone());
                    }
                }
            }
        }
        definitions.push(json!([name, body]));
    }
    Ok(definitions)
}

pub fn create_composable_template_factory() -> ParamSourceFactory {
    std::sync::Arc::new(|_ctx, workload, params, _name| {
        let templates = workload
            .composable_templates
            .iter()
            .map(|t| (t.name.clone(), t.content.clone()))
            .collect();
        let definitions =
            create_template_definitions(templates, params, "create-composable-template")?;
        let mut p = params.clone();
        p.insert("templates".to_string(), Value::Array(definitions));
        p.insert("request-params".to_string(), request_params(params));
        constant(p)
    })
}

pub fn create_component_template_factory() -> ParamSourceFactory {
    std::sync::Arc::new(|_ctx, workload, params, _name| {
        let templates = workload
            .component_templates
            .iter()
            .map(|t| (t.name.clone(), t.content.clone()))
            .collect();
        let definitions = create_template_definitions(templates, params, "create-component-template")?;
        let mut p = params.clone();
        p.insert("templates".to_string(), Value::Array(definitions));
        p.insert("request-params".to_string(), request_params(params));
        constant(p)
    })
}

pub fn delete_component_template_factory() -> ParamSourceFactory {
    std::sync::Arc::new(|_ctx, workload, params, _name| {
        let mut definitions: Vec<Value> = Vec::new();
        if !workload.component_templates.is_empty() {
            let filter = params.get("template").and_then(Value::as_str);
            for template in &workload.component_templates {
                if let Some(filter) = filter {
                    if template.name != filter {
                        continue;
                    }
                }
                definitions.push(json!(template.name));
            }
        } else {
            let name = parse::string_param(params, "template").map_err(|_| {
                BenchError::WorkloadSyntax(
                    "Please set the property 'template' for the delete-component-template operation"
                        .to_string(),
                )
            })?;
            definitions.push(json!(name));
        }
        let mut p = Params::new();
        p.insert("templates".to_string(), Value::Array(definitions));
        p.insert(
            "only-if-exists".to_string(),
            json!(parse::bool_param_or(params, "only-if-exists", true)?),
        );
        p.insert("request-params".to_string(), request_params(params));
        constant(p)
    })
}
