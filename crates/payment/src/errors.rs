//! Payment pipeline errors.

use thiserror::Error;

/// An error returned by [`PaymentPipeline::fetch`](crate::PaymentPipeline::fetch).
///
/// None of these are retryable within the same invoice; the next scheduled
/// run is the retry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    /// The ledger could not cover the invoice. The state machine redirects
    /// to BUDGET_BLOCKED on this.
    #[error("budget blocked: invoice exceeds remaining budget")]
    BudgetBlocked,
    /// The invoice TTL elapsed before any matching transfer appeared.
    #[error("invoice expired before settlement")]
    InvoiceExpired,
    /// A matching transfer appeared but never verified before the deadline.
    #[error("settlement verification timed out")]
    VerificationTimeout,
    /// Submission or verification failed outright.
    #[error("settlement failed: {0}")]
    SettlementFailed(String),
    /// The gateway misbehaved: transport error, malformed invoice, or a
    /// rejected retry with proof.
    #[error("upstream error: {0}")]
    Upstream(String),
}
