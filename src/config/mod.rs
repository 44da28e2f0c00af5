//! Driver configuration
//!
//! Merges the command line with an optional TOML configuration file into
//! one `DriverConfig`. Command-line values win over file values, which win
//! over the built-in defaults.

pub mod cli;

use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;

use crate::error::{BenchError, BenchResult};
use crate::workload::Params;

/// Query randomization settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RandomizationConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Probability of reusing a pre-saved standard value.
    pub repeat_frequency: Option<f64>,
    /// Size of the standard value pool.
    pub pool_size: Option<u64>,
}

/// Optional TOML configuration file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    dataset_cache: Option<PathBuf>,
    chunk_dir: Option<PathBuf>,
    offline: Option<bool>,
    seed: Option<u64>,
    #[serde(default)]
    randomization: RandomizationConfig,
}

impl FileConfig {
    fn load(path: &Path) -> BenchResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| BenchError::SystemSetup(format!("cannot read config file [{}]: {e}", path.display())))?;
        toml::from_str(&content)
            .map_err(|e| BenchError::SystemSetup(format!("invalid config file [{}]: {e}", path.display())))
    }
}

/// Fully resolved driver configuration.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// The workload file (a directory resolves to its `workload.json`).
    pub workload_file: PathBuf,
    pub workload_name: String,
    pub test_procedure: Option<String>,
    pub workload_params: Params,
    pub include_tasks: Vec<String>,
    pub exclude_tasks: Vec<String>,
    pub test_mode: bool,
    pub offline: bool,
    pub dataset_cache: PathBuf,
    /// Scratch directory for streamed ingestion chunks.
    pub chunk_dir: PathBuf,
    pub randomization: RandomizationConfig,
    pub seed: u64,
}

impl DriverConfig {
    pub fn from_args(args: &cli::WorkloadArgs) -> BenchResult<Self> {
        let file_config = match &args.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };

        let (workload_file, workload_name) = resolve_workload_path(&args.workload)?;
        let workload_params = parse_workload_params(&args.workload_params)?;

        let dataset_cache = args
            .dataset_cache
            .clone()
            .or(file_config.dataset_cache)
            .unwrap_or_else(|| PathBuf::from("benchmarks/data"));
        let chunk_dir = file_config
            .chunk_dir
            .unwrap_or_else(|| std::env::temp_dir().join("searchbench-chunks"));

        let mut randomization = file_config.randomization;
        randomization.enabled = randomization.enabled || args.randomize_queries;

        Ok(Self {
            workload_file,
            workload_name,
            test_procedure: args.test_procedure.clone(),
            workload_params,
            include_tasks: args.include_tasks.clone(),
            exclude_tasks: args.exclude_tasks.clone(),
            test_mode: args.test_mode,
            offline: args.offline || file_config.offline.unwrap_or(false),
            dataset_cache,
            chunk_dir,
            randomization,
            seed: args.seed.or(file_config.seed).unwrap_or(0),
        })
    }
}

/// Accepts either a workload file or a directory holding `workload.json`.
fn resolve_workload_path(path: &Path) -> BenchResult<(PathBuf, String)> {
    if path.is_dir() {
        let file = path.join("workload.json");
        if !file.is_file() {
            return Err(BenchError::SystemSetup(format!(
                "Could not find workload.json in {}",
                path.display()
            )));
        }
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("workload")
            .to_string();
        Ok((file, name))
    } else if path.is_file() {
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            return Err(BenchError::SystemSetup(format!(
                "{} has to be a JSON file",
                path.display()
            )));
        }
        let name = path
            .file_stem()
            .and_then(|n| n.to_str())
            .unwrap_or("workload")
            .to_string();
        Ok((path.to_path_buf(), name))
    } else {
        Err(BenchError::SystemSetup(format!(
            "{} is neither a file nor a directory",
            path.display()
        )))
    }
}

/// Parse `key=value` pairs; values that parse as JSON keep their type,
/// everything else stays a string.
fn parse_workload_params(pairs: &[String]) -> BenchResult<Params> {
    let mut params = Params::new();
    for pair in pairs {
        let (key, value) = pair.split_once('=').ok_or_else(|| {
            BenchError::SystemSetup(format!(
                "invalid workload parameter [{pair}]; expected KEY=VALUE"
            ))
        })?;
        let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
        params.insert(key.to_string(), value);
    }
    Ok(params)
}
