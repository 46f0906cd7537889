//! Error types for pipeline setup and execution

use crate::instances::InstanceError;
use crate::ranges::RangeError;
use thiserror::Error;

/// Errors that stop a pipeline run.
///
/// Per-hostname problems never show up here; they are reported through
/// the skip lists of [`crate::pipeline::PipelineOutcome`].
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Neither an IPv4 nor an IPv6 range file was supplied
    #[error("at least one of the IPv4 or IPv6 range files is required")]
    NoRangeTables,

    /// A range file could not be loaded
    #[error(transparent)]
    Ranges(#[from] RangeError),

    /// The instance list could not be loaded
    #[error(transparent)]
    Instances(#[from] InstanceError),

    /// Invalid configuration provided
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// A worker task panicked or was cancelled
    #[error("worker task failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}
