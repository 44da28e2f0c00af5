//! searchbench - Distributed benchmark driver for search/analytics clusters
//!
//! searchbench turns a declarative *workload* (indices, templates, document
//! corpora, operations and test procedures) into a controlled stream of
//! per-invocation operation parameters, measured and executed by runners
//! registered from outside this crate.
//!
//! # Architecture
//!
//! - **Workload model**: typed representation built by a schema-validated
//!   reader, rewritten by post-load processors (task filter, test mode,
//!   query randomization)
//! - **Template assembler**: fragment-glob expansion and variable
//!   substitution over the workload JSON, with unused-parameter detection
//! - **Parameter sources**: per-operation generators partitioned across
//!   clients, including stable bulk partitioning and id-conflict simulation
//! - **Streaming ingestion**: a single producer turns object-storage blobs
//!   into line-aligned chunks consumed by clients under backpressure
//! - **Vector datasets**: HDF5 and BigANN readers feeding k-NN search and
//!   bulk-ingest sources

pub mod config;
pub mod corpus;
pub mod dataset;
pub mod driver;
pub mod error;
pub mod params;
pub mod registry;
pub mod streaming;
pub mod template;
pub mod util;
pub mod workload;

// Re-export commonly used types
pub use config::DriverConfig;
pub use error::{BenchError, BenchResult};

/// Result type used throughout searchbench
pub type Result<T> = anyhow::Result<T>;
