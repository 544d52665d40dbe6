//! Persisted run and payment rows.

use crate::{Level, MicroUsdc};
use alloy_primitives::B256;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Terminal and non-terminal states of a scheduled run.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display,
)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Row created at the tick; work not started.
    #[display("PENDING")]
    Pending,
    /// The tick pipeline is executing.
    #[display("RUNNING")]
    Running,
    /// All stages finished and persisted.
    #[display("COMPLETED")]
    Completed,
    /// A stage failed or the deadline expired.
    #[display("FAILED")]
    Failed,
    /// The tick was dropped because a previous run was still in flight.
    #[display("SKIPPED")]
    Skipped,
}

impl RunStatus {
    /// Whether the run can no longer change.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped)
    }
}

/// One row in the `runs` table. Append-only once terminal; the in-progress
/// row is updated in place until then.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    /// Storage-issued id.
    pub id: u64,
    /// Monotonic run number across the agent's lifetime.
    pub run_number: u64,
    /// When the cron tick fired.
    pub scheduled_at: DateTime<Utc>,
    /// When the pipeline actually started.
    pub started_at: Option<DateTime<Utc>>,
    /// When the run reached a terminal status.
    pub completed_at: Option<DateTime<Utc>>,
    /// Current status.
    pub status: RunStatus,
    /// Machine level when the run started.
    pub level_before: Level,
    /// Machine level when the run committed.
    pub level_after: Option<Level>,
    /// Budget committed during this run.
    pub spend_delta: MicroUsdc,
    /// Invoices minted during this run.
    pub invoice_count: u32,
    /// Snapshot batch taken by this run.
    pub snapshot_id: Option<u64>,
    /// Failure message for FAILED and SKIPPED rows.
    pub error: Option<String>,
    /// Free-form metadata (skip reasons, replay provenance).
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Lifecycle of a payment row.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display,
)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Invoice minted; settlement in flight.
    #[display("PENDING")]
    Pending,
    /// Settled and verified on-chain.
    #[display("CONFIRMED")]
    Confirmed,
    /// Settlement failed, expired, or was rejected.
    #[display("FAILED")]
    Failed,
}

/// One row in the `payments` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecord {
    /// Storage-issued id.
    pub id: u64,
    /// The run that spent the money, when scheduler-driven.
    pub run_id: Option<u64>,
    /// Gateway invoice id.
    pub invoice_id: String,
    /// Metered endpoint name.
    pub endpoint: String,
    /// Invoice amount.
    pub amount: MicroUsdc,
    /// Settling transaction, once submitted.
    pub tx_hash: Option<B256>,
    /// Current status.
    pub status: PaymentStatus,
    /// When the invoice was minted.
    pub created_at: DateTime<Utc>,
    /// When settlement was verified.
    pub settled_at: Option<DateTime<Utc>>,
    /// Block of the settling transfer.
    pub block_number: Option<u64>,
    /// Confirmations at verification time.
    pub confirmations: Option<u64>,
}
