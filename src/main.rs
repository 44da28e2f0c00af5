//! searchbench CLI entry point

use anyhow::Result;
use clap::Parser;
use searchbench::config::cli::{Cli, Command, WorkloadArgs};
use searchbench::config::DriverConfig;
use searchbench::util::{format_bytes, format_count};
use searchbench::workload::{ScheduleNode, Task, Workload};
use searchbench::{driver, BenchError};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Info(args) => info(&args),
        Command::Validate(args) => validate(&args),
        Command::Prepare(args) => prepare(&args),
    }
}

fn load(args: &WorkloadArgs) -> Result<(DriverConfig, Workload)> {
    let config = DriverConfig::from_args(args)?;
    let workload = driver::load_workload(&config)?;
    Ok((config, workload))
}

fn info(args: &WorkloadArgs) -> Result<()> {
    let (_, workload) = load(args)?;

    println!("Showing details for workload [{}]:", workload.name);
    println!();
    println!("* Description: {}", workload.description);
    let documents = workload.number_of_documents();
    if documents > 0 {
        println!("* Documents: {}", format_count(documents));
        if let Some(size) = workload.compressed_size_in_bytes() {
            println!("* Compressed Size: {}", format_bytes(size));
        }
        if let Some(size) = workload.uncompressed_size_in_bytes() {
            println!("* Uncompressed Size: {}", format_bytes(size));
        }
    }
    println!();

    for procedure in &workload.test_procedures {
        if !procedure.auto_generated {
            let mut heading = format!("TestProcedure [{}]", procedure.name);
            if procedure.default {
                heading.push_str(" (run by default)");
            }
            println!("{heading}");
            if let Some(description) = &procedure.description {
                println!("{description}");
            }
        }
        println!();
        println!("Schedule:");
        for (num, node) in procedure.schedule.iter().enumerate() {
            match node {
                ScheduleNode::Leaf(task) => println!("{}. {}", num + 1, format_task(task)),
                ScheduleNode::Parallel(parallel) => {
                    println!("{}. {} in parallel:", num + 1, parallel.tasks.len());
                    for (leaf_num, task) in parallel.tasks.iter().enumerate() {
                        println!("\t{}.{} {}", num + 1, leaf_num + 1, format_task(task));
                    }
                }
            }
        }
        println!();
    }
    Ok(())
}

fn format_task(task: &Task) -> String {
    let mut msg = task.name.clone();
    if task.clients > 1 {
        msg.push_str(&format!(" ({} clients)", task.clients));
    }
    msg
}

fn validate(args: &WorkloadArgs) -> Result<()> {
    let (config, workload) = load(args)?;
    // touching every task's parameter source surfaces bad parameters that
    // the schema cannot catch
    let ctx = driver::build_param_source_context(&config)?;
    for procedure in &workload.test_procedures {
        for task in procedure.leaf_tasks() {
            ctx.registry
                .param_source_for_operation(&ctx, &workload, &task.operation, &task.name)
                .map_err(|e| match e {
                    BenchError::WorkloadSyntax(msg) => BenchError::WorkloadSyntax(format!(
                        "task [{}] in test_procedure [{}]: {msg}",
                        task.name, procedure.name
                    )),
                    other => other,
                })?;
        }
    }
    println!("Workload [{}] is valid.", workload.name);
    Ok(())
}

fn prepare(args: &WorkloadArgs) -> Result<()> {
    let (config, workload) = load(args)?;
    driver::prepare_corpora(&config, &workload)?;
    println!(
        "Corpora for workload [{}] are available in [{}].",
        workload.name,
        config.dataset_cache.display()
    );
    Ok(())
}
