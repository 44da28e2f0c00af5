//! Command-line interface definitions

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "searchbench",
    version,
    about = "Distributed benchmark driver for search and analytics clusters"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show details about a workload: description, corpora and schedule
    Info(WorkloadArgs),
    /// Load a workload, apply all processors and report problems
    Validate(WorkloadArgs),
    /// Download, decompress and verify the corpora of a workload
    Prepare(WorkloadArgs),
}

#[derive(Debug, Args)]
pub struct WorkloadArgs {
    /// Path to a workload file or a directory containing workload.json
    pub workload: PathBuf,

    /// Optional TOML configuration file
    #[arg(long, env = "SEARCHBENCH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Test procedure to select (defaults to the workload's default)
    #[arg(long)]
    pub test_procedure: Option<String>,

    /// Workload template parameter, e.g. --workload-param bulk_size=5000
    #[arg(long = "workload-param", value_name = "KEY=VALUE")]
    pub workload_params: Vec<String>,

    /// Only run tasks matching these filters (name, type:<op>, tag:<tag>)
    #[arg(long, value_delimiter = ',')]
    pub include_tasks: Vec<String>,

    /// Skip tasks matching these filters
    #[arg(long, value_delimiter = ',')]
    pub exclude_tasks: Vec<String>,

    /// Shrink corpora and budgets for a quick smoke run
    #[arg(long)]
    pub test_mode: bool,

    /// Never touch the network; fail if local data is missing
    #[arg(long)]
    pub offline: bool,

    /// Directory for downloaded corpus data
    #[arg(long, env = "SEARCHBENCH_DATA_DIR")]
    pub dataset_cache: Option<PathBuf>,

    /// Randomize the bounds of range queries
    #[arg(long)]
    pub randomize_queries: bool,

    /// RNG seed for reproducible runs
    #[arg(long)]
    pub seed: Option<u64>,
}
