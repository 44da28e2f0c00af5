//! Workload template assembly and rendering
//!
//! A workload file is a JSON document with templating on top. Assembly runs
//! in two phases: `collect(parts="<glob>")` directives are expanded inline
//! (recursively, each fragment resolving globs against its own directory)
//! and the assembled source is then rendered with the user-supplied
//! parameters plus a small set of internal helpers.
//!
//! While rendering, the set of variables referenced by the template is
//! recorded; user parameters that reference none of them fail the load with
//! close-match suggestions.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use minijinja::Environment;
use regex::Regex;
use serde_json::Value;

use crate::error::{BenchError, BenchResult};
use crate::workload::Params;

/// Helper macros available to every workload under the `benchmark`
/// namespace. `collect` is a no-op at render time because fragment globs
/// are expanded before rendering; `exists_set_param` emits a JSON field only
/// when the given variable is defined (or a default is supplied).
const HELPERS_TEMPLATE: &str = r#"
{% macro collect(parts) -%}
{%- endmacro %}
{% macro exists_set_param(setting_name, value, default_value=none, comma=true) -%}
    {%- if value is defined or default_value is not none -%}
        {%- if comma %} , {% endif -%}
        {%- if value is defined -%}
            "{{ setting_name }}": {{ value | tojson }}
        {%- else -%}
            "{{ setting_name }}": {{ default_value | tojson }}
        {%- endif -%}
    {%- endif -%}
{%- endmacro %}
"#;

/// Names injected by the rendering environment itself. These are never
/// workload-defined parameters.
const INTERNAL_NAMES: &[&str] = &["now", "glob", "benchmark"];

fn collect_directive_re() -> Regex {
    // `{{ benchmark.collect(parts="queries/*.json") }}`
    Regex::new(r#"\{\{\s*benchmark\.collect\(parts="([^"]+)"\)\s*\}\}"#).unwrap()
}

/// Tracks which variables the workload references and which the user
/// supplied, so unused user parameters can be rejected after rendering.
#[derive(Debug, Default)]
pub struct CompleteWorkloadParams {
    workload_defined: BTreeSet<String>,
    user_specified: Params,
}

impl CompleteWorkloadParams {
    pub fn new(user_specified: Params) -> Self {
        Self {
            workload_defined: BTreeSet::new(),
            user_specified,
        }
    }

    pub fn populate_workload_defined(&mut self, vars: impl IntoIterator<Item = String>) {
        self.workload_defined.extend(vars);
    }

    pub fn sorted_workload_defined(&self) -> Vec<String> {
        self.workload_defined.iter().cloned().collect()
    }

    pub fn user_specified(&self) -> &Params {
        &self.user_specified
    }

    /// User-supplied parameter names that no template referenced.
    pub fn unused_user_defined(&self) -> Vec<String> {
        let mut unused: Vec<String> = self
            .user_specified
            .keys()
            .filter(|k| !self.workload_defined.contains(*k))
            .cloned()
            .collect();
        unused.sort();
        unused
    }

    /// Workload-defined parameters that closely resemble the given unused
    /// names, used to suggest likely typos.
    pub fn close_matches(&self, unused: &[String]) -> Vec<String> {
        let mut matches = BTreeSet::new();
        for candidate in unused {
            let mut scored: Vec<(f64, &String)> = self
                .workload_defined
                .iter()
                .map(|known| (strsim::jaro_winkler(candidate, known), known))
                .filter(|(score, _)| *score >= 0.7)
                .collect();
            scored.sort_by(|a, b| b.0.total_cmp(&a.0));
            matches.extend(scored.into_iter().take(3).map(|(_, name)| name.clone()));
        }
        matches.into_iter().collect()
    }
}

/// Assembles the full template source by inlining fragment globs referenced
/// with `benchmark.collect(parts=...)`.
pub struct TemplateSource {
    base_path: PathBuf,
    assembled: String,
}

impl TemplateSource {
    pub fn from_file(template_file: &Path) -> BenchResult<Self> {
        let base_path = template_file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let source = std::fs::read_to_string(template_file).map_err(|_| {
            BenchError::WorkloadSyntax(format!(
                "Could not load workload from '{}'",
                template_file.display()
            ))
        })?;
        Self::from_string(&base_path, &source)
    }

    pub fn from_string(base_path: &Path, source: &str) -> BenchResult<Self> {
        let assembled = replace_includes(base_path, source)?;
        Ok(Self {
            base_path: base_path.to_path_buf(),
            assembled,
        })
    }

    pub fn assembled_source(&self) -> &str {
        &self.assembled
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }
}

fn replace_includes(base_path: &Path, fragment: &str) -> BenchResult<String> {
    let re = collect_directive_re();
    let mut result = String::with_capacity(fragment.len());
    let mut last_end = 0;
    for caps in re.captures_iter(fragment) {
        let whole = caps.get(0).unwrap();
        let glob_pattern = caps.get(1).unwrap().as_str();
        result.push_str(&fragment[last_end..whole.start()]);

        let full_glob = base_path.join(glob_pattern);
        let sub_source = read_glob_files(&full_glob)?;
        // fragments may themselves collect further fragments, resolved
        // against their own directory
        let sub_base = full_glob
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| base_path.to_path_buf());
        result.push_str(&replace_includes(&sub_base, &sub_source)?);
        last_end = whole.end();
    }
    result.push_str(&fragment[last_end..]);
    Ok(result)
}

fn read_glob_files(pattern: &Path) -> BenchResult<String> {
    let pattern_str = pattern.to_string_lossy();
    let paths = glob::glob(&pattern_str)
        .map_err(|e| BenchError::WorkloadSyntax(format!("invalid fragment glob [{pattern_str}]: {e}")))?;
    let mut sources = Vec::new();
    let mut files: Vec<PathBuf> = paths.filter_map(Result::ok).collect();
    files.sort();
    for file in files {
        let content = std::fs::read_to_string(&file).map_err(|e| {
            BenchError::WorkloadSyntax(format!("cannot read workload fragment [{}]: {e}", file.display()))
        })?;
        sources.push(content);
    }
    Ok(sources.join(",\n"))
}

fn build_environment(base_path: &Path) -> BenchResult<Environment<'static>> {
    let mut env = Environment::new();
    env.add_template("benchmark.helpers", HELPERS_TEMPLATE)
        .map_err(|e| BenchError::WorkloadSyntax(format!("cannot register template helpers: {e}")))?;

    env.add_global("now", chrono::Utc::now().timestamp());

    let glob_base = base_path.to_path_buf();
    env.add_function("glob", move |pattern: String| -> Vec<String> {
        let full = glob_base.join(&pattern);
        match glob::glob(&full.to_string_lossy()) {
            Ok(paths) => {
                let mut result: Vec<String> = paths
                    .filter_map(Result::ok)
                    .filter_map(|p| {
                        p.strip_prefix(&glob_base)
                            .map(|rel| rel.to_string_lossy().into_owned())
                            .ok()
                    })
                    .collect();
                result.sort();
                result
            }
            Err(_) => Vec::new(),
        }
    });

    env.add_filter("days_ago", |now_epoch_secs: i64, days: i64| -> String {
        let then = now_epoch_secs - days * 86_400;
        chrono::DateTime::from_timestamp(then, 0)
            .map(|dt| dt.format("%Y-%m-%d").to_string())
            .unwrap_or_default()
    });

    Ok(env)
}

/// Record every variable the assembled source references. These form the
/// workload-defined parameters.
pub fn register_template_variables(
    assembled_source: &str,
    complete_params: &mut CompleteWorkloadParams,
) -> BenchResult<()> {
    let env = build_environment(Path::new("."))?;
    let template = env
        .template_from_str(assembled_source)
        .map_err(|e| BenchError::WorkloadSyntax(format!("cannot parse workload template: {e}")))?;
    let variables = template
        .undeclared_variables(true)
        .into_iter()
        .map(|v| {
            // nested lookups report dotted paths; the parameter is the root
            v.split('.').next().unwrap_or(&v).to_string()
        })
        .filter(|v| !INTERNAL_NAMES.contains(&v.as_str()));
    complete_params.populate_workload_defined(variables);
    Ok(())
}

/// Render an assembled template with the user-supplied parameters.
pub fn render_template(source: &TemplateSource, user_params: &Params) -> BenchResult<String> {
    let env = build_environment(source.base_path())?;
    let ctx = minijinja::Value::from_serialize(user_params);
    env.render_str(source.assembled_source(), ctx)
        .map_err(|e| BenchError::WorkloadSyntax(format!("cannot render workload template: {e}")))
}

/// Assemble, track and render a template file in one step. Index and
/// template bodies referenced by file name go through this path so that
/// their variables are tracked identically to the workload file itself.
pub fn render_template_from_file(
    template_file: &Path,
    user_params: &Params,
    complete_params: &mut CompleteWorkloadParams,
) -> BenchResult<String> {
    let source = TemplateSource::from_file(template_file)?;
    register_template_variables(source.assembled_source(), complete_params)?;
    render_template(&source, user_params)
}

/// Render a template file and parse the result as JSON (used for index and
/// template bodies).
pub fn load_json_template(
    template_file: &Path,
    user_params: &Params,
    complete_params: &mut CompleteWorkloadParams,
    description: &str,
) -> BenchResult<Value> {
    let rendered = render_template_from_file(template_file, user_params, complete_params)
        .map_err(|e| BenchError::WorkloadSyntax(format!("Could not load file template for '{description}': {e}")))?;
    serde_json::from_str(&rendered).map_err(|e| {
        BenchError::WorkloadSyntax(format!("Could not load file template for '{description}': {e}"))
    })
}
