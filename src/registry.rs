//! Builder registries
//!
//! Name-to-factory mappings for parameter sources, pre-generated standard
//! value pools for query randomization, runner bindings and install hooks.
//! All registration happens at startup; the registry is frozen before the
//! first partition is created and further registration attempts are
//! internal errors.

use std::collections::HashMap;
use std::sync::Mutex;

use serde_json::Value;

use crate::error::{BenchError, BenchResult};
use crate::params::{ParamSource, ParamSourceContext};
use crate::workload::{Operation, Params, Workload};

/// Builds the global (pre-partition) parameter source for one operation.
pub type ParamSourceFactory = std::sync::Arc<
    dyn Fn(&ParamSourceContext, &Workload, &Params, &str) -> BenchResult<Box<dyn ParamSource>>
        + Send
        + Sync,
>;

/// Produces one fresh standard value for an operation/field pair.
pub type StandardValueSource = std::sync::Arc<dyn Fn() -> Value + Send + Sync>;

/// A runner bound by name. Execution happens outside the core; the
/// registry only keeps the binding.
pub type RunnerFn = std::sync::Arc<dyn Fn(&Params) -> BenchResult<Value> + Send + Sync>;

pub struct RunnerRegistration {
    pub runner: RunnerFn,
    pub async_runner: bool,
}

/// Phases at which install hooks run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPhase {
    PostInstall,
}

pub type HookFn = std::sync::Arc<dyn Fn() -> BenchResult<()> + Send + Sync>;

/// Describes how the bounds of one query type may be randomized.
#[derive(Debug, Clone)]
pub struct QueryRandomizationInfo {
    /// The clause to rewrite, e.g. `range`.
    pub query_name: String,
    /// Groups of interchangeable parameter names; the saved value supplies
    /// whichever name the original clause uses.
    pub parameter_name_options: Vec<Vec<String>>,
    /// Parameters copied over verbatim when present in the saved value.
    pub optional_parameters: Vec<String>,
}

impl QueryRandomizationInfo {
    pub fn default_range() -> Self {
        QueryRandomizationInfo {
            query_name: "range".to_string(),
            parameter_name_options: vec![
                vec!["gte".to_string(), "gt".to_string()],
                vec!["lte".to_string(), "lt".to_string()],
            ],
            optional_parameters: vec!["format".to_string()],
        }
    }
}

#[derive(Default)]
pub struct Registry {
    sources_by_op: HashMap<String, ParamSourceFactory>,
    sources_by_name: HashMap<String, ParamSourceFactory>,
    standard_value_sources: HashMap<(String, String), StandardValueSource>,
    standard_values: Mutex<HashMap<(String, String), Vec<Value>>>,
    randomization_infos: HashMap<String, QueryRandomizationInfo>,
    runners: HashMap<String, RunnerRegistration>,
    hooks: HashMap<HookPhase, Vec<HookFn>>,
    frozen: bool,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_mutable(&self) -> BenchResult<()> {
        if self.frozen {
            return Err(BenchError::assertion(
                "registry is frozen; registration is only allowed at startup",
            ));
        }
        Ok(())
    }

    /// Freeze the registry. Call once before the first partition is
    /// created.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn register_param_source_for_operation(
        &mut self,
        op_type: &str,
        factory: ParamSourceFactory,
    ) -> BenchResult<()> {
        self.ensure_mutable()?;
        self.sources_by_op.insert(op_type.to_string(), factory);
        Ok(())
    }

    pub fn register_param_source_for_name(
        &mut self,
        name: &str,
        factory: ParamSourceFactory,
    ) -> BenchResult<()> {
        self.ensure_mutable()?;
        self.sources_by_name.insert(name.to_string(), factory);
        Ok(())
    }

    /// Resolve the parameter source for a task's operation: an explicit
    /// `param-source` name wins, then the operation type, then the
    /// pass-through default.
    pub fn param_source_for_operation(
        &self,
        ctx: &ParamSourceContext,
        workload: &Workload,
        operation: &Operation,
        task_name: &str,
    ) -> BenchResult<Box<dyn ParamSource>> {
        if let Some(name) = &operation.param_source {
            let factory = self.sources_by_name.get(name).ok_or_else(|| {
                BenchError::SystemSetup(format!("Unknown param source [{name}]"))
            })?;
            return factory(ctx, workload, &operation.params, task_name);
        }
        match self.sources_by_op.get(&operation.operation_type) {
            Some(factory) => factory(ctx, workload, &operation.params, task_name),
            None => Ok(Box::new(crate::params::ConstantParamSource::new(
                operation.params.clone(),
            ))),
        }
    }

    pub fn register_standard_value_source(
        &mut self,
        op_name: &str,
        field_name: &str,
        source: StandardValueSource,
    ) -> BenchResult<()> {
        self.ensure_mutable()?;
        // re-registration for the same op/field is allowed; workload
        // plugins load more than once per run
        self.standard_value_sources
            .insert((op_name.to_string(), field_name.to_string()), source);
        Ok(())
    }

    pub fn standard_value_source(
        &self,
        op_name: &str,
        field_name: &str,
    ) -> BenchResult<StandardValueSource> {
        self.standard_value_sources
            .get(&(op_name.to_string(), field_name.to_string()))
            .cloned()
            .ok_or_else(|| {
                BenchError::SystemSetup(format!(
                    "Could not find standard value source for operation {op_name}, field {field_name}! \
                     Make sure this is registered in the workload plugin."
                ))
            })
    }

    /// Generate the pool of `n` standard values for an operation/field
    /// pair unless it exists already. The pool is generated at most once
    /// per process.
    pub fn generate_standard_values_if_absent(
        &self,
        op_name: &str,
        field_name: &str,
        n: usize,
    ) -> BenchResult<()> {
        let key = (op_name.to_string(), field_name.to_string());
        let mut pools = self
            .standard_values
            .lock()
            .map_err(|_| BenchError::assertion("standard value pool lock poisoned"))?;
        if pools.contains_key(&key) {
            return Ok(());
        }
        let source = self.standard_value_source(op_name, field_name).map_err(|_| {
            BenchError::SystemSetup(format!(
                "Cannot generate standard values for operation {op_name}, field {field_name}. \
                 Standard value source is missing"
            ))
        })?;
        let pool: Vec<Value> = (0..n).map(|_| source()).collect();
        pools.insert(key, pool);
        Ok(())
    }

    pub fn standard_value(&self, op_name: &str, field_name: &str, i: usize) -> BenchResult<Value> {
        let pools = self
            .standard_values
            .lock()
            .map_err(|_| BenchError::assertion("standard value pool lock poisoned"))?;
        let pool = pools
            .get(&(op_name.to_string(), field_name.to_string()))
            .ok_or_else(|| {
                BenchError::SystemSetup(format!(
                    "No standard values generated for operation {op_name}, field {field_name}"
                ))
            })?;
        pool.get(i).cloned().ok_or_else(|| {
            BenchError::SystemSetup(format!(
                "Standard value index {i} out of range for operation {op_name}, field {field_name} \
                 ({} values total)",
                pool.len()
            ))
        })
    }

    pub fn register_query_randomization_info(
        &mut self,
        op_name: &str,
        info: QueryRandomizationInfo,
    ) -> BenchResult<()> {
        self.ensure_mutable()?;
        self.randomization_infos.insert(op_name.to_string(), info);
        Ok(())
    }

    /// The randomization shape for an operation, falling back to the
    /// default `range` rewrite.
    pub fn query_randomization_info(&self, op_name: &str) -> QueryRandomizationInfo {
        self.randomization_infos
            .get(op_name)
            .cloned()
            .unwrap_or_else(QueryRandomizationInfo::default_range)
    }

    /// Bind a named operation to an executable runner.
    pub fn register_runner(&mut self, name: &str, runner: RunnerFn, async_runner: bool) -> BenchResult<()> {
        self.ensure_mutable()?;
        self.runners.insert(
            name.to_string(),
            RunnerRegistration {
                runner,
                async_runner,
            },
        );
        Ok(())
    }

    pub fn runner(&self, name: &str) -> Option<&RunnerRegistration> {
        self.runners.get(name)
    }

    pub fn register_hook(&mut self, phase: HookPhase, hook: HookFn) -> BenchResult<()> {
        self.ensure_mutable()?;
        self.hooks.entry(phase).or_default().push(hook);
        Ok(())
    }

    pub fn hooks(&self, phase: HookPhase) -> &[HookFn] {
        self.hooks.get(&phase).map(Vec::as_slice).unwrap_or(&[])
    }
}
