//! Transition records and the triggers and guards that produce them.

use crate::{Level, MicroUsdc};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The event that asked the state machine to move.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display,
)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    /// A fresh metrics snapshot arrived (L0 → L1).
    #[display("metric-tick")]
    MetricTick,
    /// Local risk signals crossed the alert threshold (L1 → L2).
    #[display("risk-threshold")]
    RiskThreshold,
    /// Local signals justify paying for market data (L2 → L3).
    #[display("need-market-data")]
    NeedMarketData,
    /// Liquidity coverage fell below the critical line (L3 → L4).
    #[display("critical-metric")]
    CriticalMetric,
    /// Order-book depth crisis (L4 → L5).
    #[display("emergency")]
    Emergency,
    /// Dwell time elapsed; step one rung down (Lk → Lk-1).
    #[display("cooldown-ok")]
    CooldownOk,
    /// Remaining budget below the operational minimum (Lk → BUDGET_BLOCKED).
    #[display("budget-exhausted")]
    BudgetExhausted,
    /// Budget replenished or reset (BUDGET_BLOCKED → L1).
    #[display("budget-restored")]
    BudgetRestored,
    /// Operator-requested jump to an explicit level; may skip rungs.
    #[display("manual-override")]
    ManualOverride(Level),
}

/// Identity of a guard predicate, as recorded on transition rows.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display,
)]
#[serde(rename_all = "snake_case")]
pub enum GuardKind {
    /// The agent is not administratively paused.
    #[display("system_not_paused")]
    SystemNotPaused,
    /// Volatility or LCR crossed the alert threshold.
    #[display("risk_threshold")]
    RiskThreshold,
    /// Minimum dwell time at the current level has elapsed.
    #[display("cooldown_ok")]
    CooldownOk,
    /// The ledger can reserve the transition cost.
    #[display("budget")]
    BudgetAvailable,
    /// LCR below the critical threshold.
    #[display("lcr_critical")]
    LcrCritical,
    /// Order-book depth below the crisis floor.
    #[display("depth_crisis")]
    DepthCrisis,
    /// De-escalation dwell time elapsed.
    #[display("cooldown_elapsed")]
    CooldownElapsed,
    /// Remaining budget below the operational minimum.
    #[display("budget_exhausted")]
    BudgetExhausted,
    /// Remaining budget back above the warning threshold.
    #[display("budget_restored")]
    BudgetRestored,
}

/// An immutable record of one transition attempt, successful or not.
///
/// Appended to the transition ledger by the state machine and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    /// Monotonic ledger id.
    pub id: u64,
    /// The run this attempt happened in, when driven by the scheduler.
    pub run_id: Option<u64>,
    /// Level before the attempt.
    pub from: Level,
    /// Target level of the attempt.
    pub to: Level,
    /// What asked for the move.
    pub trigger: Trigger,
    /// Whether the attempt changed the level.
    pub successful: bool,
    /// Wall-clock time of the attempt.
    pub at: DateTime<Utc>,
    /// Milliseconds since machine start; immune to wall-clock jumps.
    pub monotonic_ms: u64,
    /// Committed cost. Zero for failed attempts, de-escalations and free
    /// transitions.
    pub cost: MicroUsdc,
    /// Guards that passed during evaluation.
    pub guards_passed: Vec<GuardKind>,
    /// Guards that failed during evaluation.
    pub guards_failed: Vec<GuardKind>,
    /// Invoice id of the payment carried by this transition, if any.
    pub payment_id: Option<String>,
    /// Snapshot batch the metrics were computed from, if any.
    pub snapshot_id: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trigger_serde_round_trip() {
        let triggers = [
            Trigger::MetricTick,
            Trigger::NeedMarketData,
            Trigger::ManualOverride(Level::Critical),
        ];
        for trigger in triggers {
            let json = serde_json::to_string(&trigger).unwrap();
            let back: Trigger = serde_json::from_str(&json).unwrap();
            assert_eq!(back, trigger);
        }
    }

    #[test]
    fn guard_names_match_ledger_rows() {
        assert_eq!(GuardKind::BudgetAvailable.to_string(), "budget");
        assert_eq!(GuardKind::CooldownOk.to_string(), "cooldown_ok");
        assert_eq!(GuardKind::DepthCrisis.to_string(), "depth_crisis");
    }
}
