//! Storage errors.

use thiserror::Error;

/// An error surfaced by the [`SentinelStore`](crate::SentinelStore).
#[derive(Debug, Error)]
pub enum StorageError {
    /// The database could not be opened.
    #[error("failed to open store: {0}")]
    Open(String),
    /// A transient database failure; the operation was retried once.
    #[error("store operation failed: {0}")]
    Db(String),
    /// A persisted row could not be decoded.
    #[error("corrupt row in {table}: {reason}")]
    Corrupt {
        /// Table the row lives in.
        table: &'static str,
        /// Decode failure.
        reason: String,
    },
    /// A write failed twice. The scheduler halts after the current tick.
    #[error("store write failed after retry: {0}")]
    Fatal(String),
}

impl StorageError {
    /// Whether the scheduler must halt on this error.
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_) | Self::Open(_))
    }
}
