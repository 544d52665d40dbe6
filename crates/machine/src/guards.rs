//! Guard predicates: pure functions of the context view and metrics.

use sentinel_budget::BudgetStatus;
use sentinel_types::{GuardKind, MicroUsdc, RiskMetrics, RiskThresholds};
use std::time::Duration;

/// Read-only view the guards evaluate against.
#[derive(Debug, Clone, Copy)]
pub struct GuardCtx<'a> {
    /// Administrative pause flag.
    pub paused: bool,
    /// Time at the current level.
    pub dwell: Duration,
    /// Time since the last upward transition, if any.
    pub since_last_escalation: Option<Duration>,
    /// Configured per-level cooldown.
    pub cooldown: Duration,
    /// Ledger state at evaluation time.
    pub budget: BudgetStatus,
    /// Remaining budget at or above this exits BUDGET_BLOCKED.
    pub warning_threshold: MicroUsdc,
    /// Metrics for the current tick, when available.
    pub metrics: Option<&'a RiskMetrics>,
    /// Guard thresholds.
    pub thresholds: &'a RiskThresholds,
}

/// Whether local signals justify the alert level: volatility at or above
/// the configured regime, or LCR under the warning line.
pub fn risk_signal(metrics: &RiskMetrics, thresholds: &RiskThresholds) -> bool {
    let volatile = metrics
        .volatility
        .is_some_and(|v| v.regime >= thresholds.escalate_volatility);
    let lcr_warning = metrics.lcr.ratio_or_inf() < thresholds.lcr_warning;
    volatile || lcr_warning
}

/// Evaluates one guard. `cost` is the table cost of the attempted
/// transition, used by the budget guard.
pub fn evaluate_guard(kind: GuardKind, ctx: &GuardCtx<'_>, cost: MicroUsdc) -> bool {
    match kind {
        GuardKind::SystemNotPaused => !ctx.paused,
        GuardKind::RiskThreshold => {
            ctx.metrics.is_some_and(|m| risk_signal(m, ctx.thresholds))
        }
        GuardKind::CooldownOk => {
            ctx.since_last_escalation.is_none_or(|elapsed| elapsed >= ctx.cooldown)
        }
        GuardKind::BudgetAvailable => ctx.budget.remaining >= cost,
        GuardKind::LcrCritical => {
            ctx.metrics.is_some_and(|m| m.lcr.ratio_or_inf() < ctx.thresholds.lcr_critical)
        }
        GuardKind::DepthCrisis => ctx.metrics.is_some_and(|m| depth_crisis(m, ctx.thresholds)),
        GuardKind::CooldownElapsed => ctx.dwell >= ctx.cooldown,
        GuardKind::BudgetExhausted => ctx.budget.blocked,
        GuardKind::BudgetRestored => ctx.budget.remaining >= ctx.warning_threshold,
    }
}

/// Depth crisis: the half-percent band holds less total notional than the
/// configured floor. Absent depth data is not a crisis.
fn depth_crisis(metrics: &RiskMetrics, thresholds: &RiskThresholds) -> bool {
    let Some(bands) = &metrics.depth else { return false };
    bands
        .iter()
        .find(|band| band.pct_from_mid == 0.5)
        .is_some_and(|band| band.bid_notional + band.ask_notional < thresholds.depth_crisis_usd)
}
