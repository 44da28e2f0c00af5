//! Search parameter sources
//!
//! Search sources are infinite and idempotent across partitions: every
//! `params()` call returns the same record, unless query randomization is
//! active, in which case the bounds of every `range` clause are replaced
//! per call, either from the pre-generated standard-value pool or from a
//! freshly drawn value.

use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use serde_json::{json, Value};

use crate::error::{BenchError, BenchResult};
use crate::params::{client_params, ClientParamSource, ConstantParamSource, ParamSource};
use crate::registry::{ParamSourceFactory, QueryRandomizationInfo, Registry};
use crate::workload::{Params, Workload};

/// Marker parameter written by the query-randomizer processor.
pub const RANDOMIZATION_KEY: &str = "query-randomization";

/// Assemble the query parameter record shared by plain and vector search.
pub(crate) fn build_query_params(
    workload: &Workload,
    params: &Params,
    operation_name: &str,
) -> BenchResult<Params> {
    let target = super::admin::get_target(workload, params);
    let type_name = params.get("type").cloned();
    if params.get("data-stream").is_some() && type_name.as_ref().map(|t| !t.is_null()).unwrap_or(false) {
        return Err(BenchError::WorkloadSyntax(format!(
            "'type' not supported with 'data-stream' for operation '{operation_name}'"
        )));
    }
    let Some(target) = target else {
        return Err(BenchError::WorkloadSyntax(format!(
            "'index' or 'data-stream' is mandatory and is missing for operation '{operation_name}'"
        )));
    };

    let detailed_results = params
        .get("detailed-results")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let pages = params.get("pages").cloned();

    let mut query_params = Params::new();
    query_params.insert("index".to_string(), json!(target));
    query_params.insert("type".to_string(), type_name.unwrap_or(Value::Null));
    query_params.insert(
        "cache".to_string(),
        params.get("cache").cloned().unwrap_or(Value::Null),
    );
    query_params.insert("detailed-results".to_string(), json!(detailed_results));
    query_params.insert(
        "calculate-recall".to_string(),
        params.get("calculate-recall").cloned().unwrap_or(json!(true)),
    );
    query_params.insert(
        "request-params".to_string(),
        params.get("request-params").cloned().unwrap_or_else(|| json!({})),
    );
    query_params.insert(
        "response-compression-enabled".to_string(),
        params
            .get("response-compression-enabled")
            .cloned()
            .unwrap_or(json!(true)),
    );
    query_params.insert(
        "body".to_string(),
        params.get("body").cloned().unwrap_or(Value::Null),
    );

    if let Some(pages) = &pages {
        query_params.insert("pages".to_string(), pages.clone());
    }
    if let Some(results_per_page) = params.get("results-per-page") {
        query_params.insert("results-per-page".to_string(), results_per_page.clone());
    }
    if let Some(pit) = params.get("with-point-in-time-from") {
        query_params.insert("with-point-in-time-from".to_string(), pit.clone());
    }
    if let Some(profile_metrics) = params.get("profile-metrics") {
        query_params.insert("profile-metrics".to_string(), profile_metrics.clone());
        query_params.insert(
            "profile-metrics-sample-size".to_string(),
            params.get("profile-metrics-sample-size").cloned().unwrap_or(json!(0)),
        );
    }
    if let Some(assertions) = params.get("assertions") {
        // paginated queries always retrieve detailed results
        let is_paginated = pages.map(|p| !p.is_null()).unwrap_or(false);
        if !detailed_results && !is_paginated {
            return Err(BenchError::WorkloadSyntax(
                "The property [detailed-results] must be [true] if assertions are defined".to_string(),
            ));
        }
        query_params.insert("assertions".to_string(), assertions.clone());
    }

    for (k, v) in client_params(params) {
        query_params.insert(k, v);
    }
    Ok(query_params)
}

/// Per-call randomization settings carried on the operation parameters.
#[derive(Debug, Clone, Copy)]
struct RandomizationConfig {
    /// Probability of reusing a value from the pre-saved pool.
    rf: f64,
    /// Pool size.
    n: usize,
}

fn randomization_config(params: &Params) -> Option<RandomizationConfig> {
    let marker = params.get(RANDOMIZATION_KEY)?;
    Some(RandomizationConfig {
        rf: marker.get("rf").and_then(Value::as_f64)?,
        n: marker.get("n").and_then(Value::as_u64)? as usize,
    })
}

struct SearchParamSource {
    query_params: Params,
    operation_name: String,
    randomization: Option<RandomizationConfig>,
    registry: Arc<Registry>,
    seed: u64,
}

impl ParamSource for SearchParamSource {
    fn partition(&self, partition_index: u32, _: u32) -> BenchResult<Box<dyn ClientParamSource>> {
        Ok(Box::new(SearchClient {
            query_params: self.query_params.clone(),
            operation_name: self.operation_name.clone(),
            randomization: self.randomization,
            info: self.registry.query_randomization_info(&self.operation_name),
            registry: Arc::clone(&self.registry),
            rng: Xoshiro256PlusPlus::seed_from_u64(self.seed.wrapping_add(partition_index as u64)),
        }))
    }
}

struct SearchClient {
    query_params: Params,
    operation_name: String,
    randomization: Option<RandomizationConfig>,
    info: QueryRandomizationInfo,
    registry: Arc<Registry>,
    rng: Xoshiro256PlusPlus,
}

impl ClientParamSource for SearchClient {
    fn params(&mut self) -> BenchResult<Option<Params>> {
        let mut record = self.query_params.clone();
        if let Some(config) = self.randomization {
            if let Some(body) = record.get("body") {
                let mut body = body.clone();
                randomize_clauses(
                    &mut body,
                    &self.info,
                    &self.operation_name,
                    config,
                    &self.registry,
                    &mut self.rng,
                )?;
                record.insert("body".to_string(), body);
            }
        }
        Ok(Some(record))
    }
}

/// Walk the query body and substitute the bounds of every matching clause.
fn randomize_clauses(
    value: &mut Value,
    info: &QueryRandomizationInfo,
    operation_name: &str,
    config: RandomizationConfig,
    registry: &Registry,
    rng: &mut Xoshiro256PlusPlus,
) -> BenchResult<()> {
    match value {
        Value::Object(map) => {
            for (key, child) in map.iter_mut() {
                if key == &info.query_name {
                    if let Value::Object(fields) = child {
                        for (field, clause) in fields.iter_mut() {
                            substitute_bounds(field, clause, info, operation_name, config, registry, rng)?;
                        }
                        continue;
                    }
                }
                randomize_clauses(child, info, operation_name, config, registry, rng)?;
            }
        }
        Value::Array(items) => {
            for item in items {
                randomize_clauses(item, info, operation_name, config, registry, rng)?;
            }
        }
        _ => {}
    }
    Ok(())
}

fn substitute_bounds(
    field: &str,
    clause: &mut Value,
    info: &QueryRandomizationInfo,
    operation_name: &str,
    config: RandomizationConfig,
    registry: &Registry,
    rng: &mut Xoshiro256PlusPlus,
) -> BenchResult<()> {
    let saved = if rng.gen::<f64>() < config.rf {
        registry.generate_standard_values_if_absent(operation_name, field, config.n)?;
        registry.standard_value(operation_name, field, rng.gen_range(0..config.n))?
    } else {
        let source = registry.standard_value_source(operation_name, field)?;
        source()
    };
    let Value::Object(clause) = clause else {
        return Ok(());
    };
    for group in &info.parameter_name_options {
        let used = group.iter().find(|name| clause.contains_key(*name)).cloned();
        if let Some(used) = used {
            if let Some(replacement) = group.iter().find_map(|name| saved.get(name)) {
                clause.insert(used, replacement.clone());
            }
        }
    }
    for optional in &info.optional_parameters {
        if let Some(value) = saved.get(optional) {
            clause.insert(optional.clone(), value.clone());
        }
    }
    Ok(())
}

pub fn factory() -> ParamSourceFactory {
    Arc::new(|ctx, workload, params, operation_name| {
        let query_params = build_query_params(workload, params, operation_name)?;
        Ok(Box::new(SearchParamSource {
            query_params,
            operation_name: operation_name.to_string(),
            randomization: randomization_config(params),
            registry: Arc::clone(&ctx.registry),
            seed: ctx.seed,
        }) as Box<dyn ParamSource>)
    })
}

pub fn open_pit_factory() -> ParamSourceFactory {
    Arc::new(|_ctx, workload, params, operation_name| {
        let Some(target) = super::admin::get_target(workload, params) else {
            return Err(BenchError::WorkloadSyntax(format!(
                "'index' or 'data-stream' is mandatory and is missing for operation '{operation_name}'"
            )));
        };
        let mut p = Params::new();
        p.insert("index".to_string(), json!(target));
        p.insert(
            "keep-alive".to_string(),
            params.get("keep-alive").cloned().unwrap_or(Value::Null),
        );
        for (k, v) in client_params(params) {
            p.insert(k, v);
        }
        Ok(Box::new(ConstantParamSource::new(p)) as Box<dyn ParamSource>)
    })
}

pub fn close_pit_factory() -> ParamSourceFactory {
    Arc::new(|_ctx, _workload, params, _operation_name| {
        let mut p = Params::new();
        p.insert(
            "with-point-in-time-from".to_string(),
            params.get("with-point-in-time-from").cloned().unwrap_or(Value::Null),
        );
        for (k, v) in client_params(params) {
            p.insert(k, v);
        }
        Ok(Box::new(ConstantParamSource::new(p)) as Box<dyn ParamSource>)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::ParamSourceContext;
    use crate::streaming::IngestionContext;
    use crate::workload::{test_support as wl, Index};

    fn params(value: Value) -> Params {
        value.as_object().unwrap().clone()
    }

    fn workload() -> Workload {
        wl::workload_with(vec![Index::new("logs", None)], Vec::new(), Vec::new())
    }

    fn context_with_registry(registry: Registry) -> ParamSourceContext {
        ParamSourceContext {
            dataset_cache: std::path::PathBuf::from("/tmp/searchbench-test"),
            workload_dir: None,
            ingestion: Arc::new(IngestionContext::new("/tmp/searchbench-test/chunks")),
            registry: Arc::new(registry),
            seed: 7,
        }
    }

    #[test]
    fn test_defaults_and_target_resolution() {
        let q = build_query_params(&workload(), &params(json!({"body": {"query": {}}})), "s").unwrap();
        assert_eq!(q["index"], json!("logs"));
        assert_eq!(q["detailed-results"], json!(false));
        assert_eq!(q["calculate-recall"], json!(true));
        assert_eq!(q["response-compression-enabled"], json!(true));
        assert!(!q.contains_key("pages"));
    }

    #[test]
    fn test_missing_target_is_rejected() {
        let empty = wl::workload_with(Vec::new(), Vec::new(), Vec::new());
        let err = build_query_params(&empty, &params(json!({})), "s").unwrap_err();
        assert!(err.to_string().contains("mandatory"), "{err}");
    }

    #[test]
    fn test_type_with_data_stream_is_rejected() {
        let err = build_query_params(
            &workload(),
            &params(json!({"data-stream": "logs-ds", "type": "docs"})),
            "s",
        )
        .unwrap_err();
        assert!(err.to_string().contains("'type' not supported"), "{err}");
    }

    #[test]
    fn test_assertions_require_detailed_results_unless_paginated() {
        let base = json!({"body": {}, "assertions": [{"property": "hits"}]});
        assert!(build_query_params(&workload(), &params(base.clone()), "s").is_err());

        let mut detailed = base.clone();
        detailed["detailed-results"] = json!(true);
        assert!(build_query_params(&workload(), &params(detailed), "s").is_ok());

        let mut paginated = base;
        paginated["pages"] = json!(5);
        assert!(build_query_params(&workload(), &params(paginated), "s").is_ok());
    }

    #[test]
    fn test_search_source_is_constant_without_randomization() {
        let registry = Registry::new();
        let ctx = context_with_registry(registry);
        let source = factory()(&ctx, &workload(), &params(json!({"body": {"size": 10}})), "s").unwrap();
        let mut client = source.partition(0, 2).unwrap();
        let first = client.params().unwrap().unwrap();
        let second = client.params().unwrap().unwrap();
        assert_eq!(first, second);
        assert!(client.infinite());
    }

    #[test]
    fn test_randomization_rewrites_range_bounds_per_call() {
        let mut registry = Registry::new();
        let counter = Arc::new(std::sync::atomic::AtomicI64::new(0));
        let source_counter = Arc::clone(&counter);
        registry
            .register_standard_value_source(
                "s",
                "price",
                Arc::new(move || {
                    let i = source_counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    json!({"gte": 100 + i, "lte": 200 + i, "format": "float"})
                }),
            )
            .unwrap();
        let ctx = context_with_registry(registry);

        let body = json!({
            "query": {"bool": {"filter": [
                {"range": {"price": {"gte": 1, "lte": 2}}},
                {"term": {"status": "active"}}
            ]}}
        });
        let op_params = params(json!({
            "body": body.clone(),
            RANDOMIZATION_KEY: {"rf": 0.5, "n": 10}
        }));
        let source = factory()(&ctx, &workload(), &op_params, "s").unwrap();
        let mut client = source.partition(0, 1).unwrap();

        let record = client.params().unwrap().unwrap();
        let clause = &record["body"]["query"]["bool"]["filter"][0]["range"]["price"];
        let gte = clause["gte"].as_i64().unwrap();
        let lte = clause["lte"].as_i64().unwrap();
        assert!(gte >= 100, "bounds not substituted: {clause}");
        assert_eq!(lte - gte, 100);
        assert_eq!(clause["format"], json!("float"));
        // the untouched clause survives
        assert_eq!(
            record["body"]["query"]["bool"]["filter"][1],
            json!({"term": {"status": "active"}})
        );
        // the operation template itself is never mutated
        assert_eq!(op_params["body"], body);
    }
}
