//! Agent-level errors.

use sentinel_chain::ChainError;
use sentinel_storage::StorageError;
use sentinel_types::ConfigError;
use thiserror::Error;

/// An error surfaced by the run loop, scheduler or composition root.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Configuration rejected at startup.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Durable store failure; fatal-grade variants halt the scheduler.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// Chain read failure after retry exhaustion.
    #[error(transparent)]
    Chain(#[from] ChainError),
    /// The cron expression did not parse.
    #[error("invalid cron expression {expr:?}: {reason}")]
    Cron {
        /// The offending expression.
        expr: String,
        /// Parser message.
        reason: String,
    },
    /// The payer key could not be loaded.
    #[error("payment submitter unavailable: {0}")]
    Submitter(String),
    /// Replay referenced an unknown run.
    #[error("run {0} not found")]
    RunNotFound(u64),
    /// Replay referenced a run without recorded metrics.
    #[error("run {0} has no recorded metrics")]
    MissingMetrics(u64),
    /// The per-run deadline expired.
    #[error("run deadline exceeded")]
    Deadline,
}
