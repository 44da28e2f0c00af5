//! Error taxonomy for the benchmark driver
//!
//! The core never retries and never swallows these errors; they surface
//! unchanged to the caller. Parameter-source exhaustion is *not* an error
//! and is modelled separately (see [`crate::params::ParamsResult`]).

use thiserror::Error;

/// All fatal error kinds produced by the load-generation core.
#[derive(Debug, Error)]
pub enum BenchError {
    /// The workload JSON is structurally or semantically invalid: schema
    /// violation, cross-field invariant violation, or an unknown filter type.
    #[error("workload syntax error: {0}")]
    WorkloadSyntax(String),

    /// Environment problem: offline while a download is needed, unknown
    /// workload, unsupported workload version, invalid filter expression.
    #[error("system setup error: {0}")]
    SystemSetup(String),

    /// Local or remote data does not match expectations: size mismatch,
    /// missing decompressed output, failed download, corrupt offset table.
    #[error("data error: {0}")]
    Data(String),

    /// The streaming producer could not turn the object stream into
    /// line-aligned chunks (e.g. a document larger than the chunk size).
    #[error("data streaming error: {0}")]
    DataStreaming(String),

    /// User-supplied workload parameters reference variables the workload
    /// never uses.
    #[error("workload config error: {0}")]
    WorkloadConfig(String),

    /// Internal invariant violation. Indicates a bug in the driver itself.
    #[error("assertion violated: {0}")]
    Assertion(String),
}

impl BenchError {
    pub fn workload_syntax(msg: impl Into<String>) -> Self {
        BenchError::WorkloadSyntax(msg.into())
    }

    pub fn system_setup(msg: impl Into<String>) -> Self {
        BenchError::SystemSetup(msg.into())
    }

    pub fn data(msg: impl Into<String>) -> Self {
        BenchError::Data(msg.into())
    }

    pub fn assertion(msg: impl Into<String>) -> Self {
        BenchError::Assertion(msg.into())
    }
}

/// Result alias used by all core modules.
pub type BenchResult<T> = std::result::Result<T, BenchError>;
