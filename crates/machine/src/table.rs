//! The transition definition table.

use sentinel_types::{GuardKind, Level, MicroUsdc, Trigger};

/// One admissible transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionSpec {
    /// Target level.
    pub to: Level,
    /// Guards evaluated after the budget reservation.
    pub guards: &'static [GuardKind],
    /// Estimated cost reserved up front. The committed cost is whatever
    /// the payment pipeline actually settles.
    pub cost: MicroUsdc,
    /// Endpoint purchased when the transition executes.
    pub paid_endpoint: Option<&'static str>,
}

/// Resolves a trigger at a level into its admissible transition, or `None`
/// when the move is not in the table (no implicit multi-hop transitions).
pub fn resolve(from: Level, trigger: &Trigger) -> Option<TransitionSpec> {
    use GuardKind::*;
    use Level::*;
    match (from, trigger) {
        (Idle, Trigger::MetricTick) => Some(TransitionSpec {
            to: Monitor,
            guards: &[SystemNotPaused],
            cost: 0,
            paid_endpoint: None,
        }),
        (Monitor, Trigger::RiskThreshold) => Some(TransitionSpec {
            to: Alert,
            guards: &[RiskThreshold],
            cost: 0,
            paid_endpoint: None,
        }),
        (Alert, Trigger::NeedMarketData) => Some(TransitionSpec {
            to: MarketData,
            guards: &[CooldownOk],
            cost: 500_000,
            paid_endpoint: Some("liquidity_depth"),
        }),
        (MarketData, Trigger::CriticalMetric) => Some(TransitionSpec {
            to: Critical,
            guards: &[LcrCritical],
            cost: 1_000_000,
            paid_endpoint: Some("order_book"),
        }),
        (Critical, Trigger::Emergency) => Some(TransitionSpec {
            to: Emergency,
            guards: &[DepthCrisis],
            cost: 2_000_000,
            paid_endpoint: Some("trades"),
        }),
        (from, Trigger::CooldownOk) if from.rank().is_some_and(|r| r >= 1) => {
            Some(TransitionSpec {
                to: from.below().expect("rank >= 1 has a level below"),
                guards: &[CooldownElapsed],
                cost: 0,
                paid_endpoint: None,
            })
        }
        (from, Trigger::BudgetExhausted) if from.rank().is_some_and(|r| r >= 2) => {
            Some(TransitionSpec {
                to: BudgetBlocked,
                guards: &[BudgetExhausted],
                cost: 0,
                paid_endpoint: None,
            })
        }
        (BudgetBlocked, Trigger::BudgetRestored) => Some(TransitionSpec {
            to: Monitor,
            guards: &[BudgetRestored],
            cost: 0,
            paid_endpoint: None,
        }),
        // Operator overrides may skip rungs, but never into or out of the
        // budget sink.
        (from, Trigger::ManualOverride(target))
            if from.on_ladder() && target.on_ladder() && *target != from =>
        {
            Some(TransitionSpec {
                to: *target,
                guards: &[SystemNotPaused],
                cost: 0,
                paid_endpoint: None,
            })
        }
        _ => None,
    }
}

/// The level a trigger is aiming for, used to label rejected attempts.
pub fn natural_target(from: Level, trigger: &Trigger) -> Level {
    match trigger {
        Trigger::MetricTick => Level::Monitor,
        Trigger::RiskThreshold => Level::Alert,
        Trigger::NeedMarketData => Level::MarketData,
        Trigger::CriticalMetric => Level::Critical,
        Trigger::Emergency => Level::Emergency,
        Trigger::CooldownOk => from.below().unwrap_or(Level::Idle),
        Trigger::BudgetExhausted => Level::BudgetBlocked,
        Trigger::BudgetRestored => Level::Monitor,
        Trigger::ManualOverride(target) => *target,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upward_moves_are_single_step() {
        for (from, trigger) in [
            (Level::Idle, Trigger::MetricTick),
            (Level::Monitor, Trigger::RiskThreshold),
            (Level::Alert, Trigger::NeedMarketData),
            (Level::MarketData, Trigger::CriticalMetric),
            (Level::Critical, Trigger::Emergency),
        ] {
            let spec = resolve(from, &trigger).unwrap();
            assert_eq!(spec.to.rank(), from.rank().map(|r| r + 1));
        }
    }

    #[test]
    fn skipping_levels_is_rejected() {
        assert_eq!(resolve(Level::Idle, &Trigger::NeedMarketData), None);
        assert_eq!(resolve(Level::Monitor, &Trigger::Emergency), None);
        assert_eq!(resolve(Level::Alert, &Trigger::CriticalMetric), None);
    }

    #[test]
    fn paid_transitions_carry_costs_and_endpoints() {
        let spec = resolve(Level::Alert, &Trigger::NeedMarketData).unwrap();
        assert_eq!(spec.cost, 500_000);
        assert_eq!(spec.paid_endpoint, Some("liquidity_depth"));
        let spec = resolve(Level::MarketData, &Trigger::CriticalMetric).unwrap();
        assert_eq!(spec.cost, 1_000_000);
        let spec = resolve(Level::Critical, &Trigger::Emergency).unwrap();
        assert_eq!(spec.cost, 2_000_000);
    }

    #[test]
    fn de_escalation_is_free_from_any_rung() {
        for from in [Level::Monitor, Level::Alert, Level::Emergency] {
            let spec = resolve(from, &Trigger::CooldownOk).unwrap();
            assert_eq!(spec.cost, 0);
            assert_eq!(Some(spec.to), from.below());
        }
        assert_eq!(resolve(Level::Idle, &Trigger::CooldownOk), None);
    }

    #[test]
    fn budget_sink_is_reachable_from_paid_levels_only() {
        assert!(resolve(Level::Alert, &Trigger::BudgetExhausted).is_some());
        assert!(resolve(Level::Emergency, &Trigger::BudgetExhausted).is_some());
        assert_eq!(resolve(Level::Monitor, &Trigger::BudgetExhausted), None);
        assert_eq!(resolve(Level::Idle, &Trigger::BudgetExhausted), None);
    }

    #[test]
    fn budget_sink_exits_to_monitor() {
        let spec = resolve(Level::BudgetBlocked, &Trigger::BudgetRestored).unwrap();
        assert_eq!(spec.to, Level::Monitor);
    }

    #[test]
    fn manual_override_skips_rungs_but_not_the_sink() {
        let spec = resolve(Level::Idle, &Trigger::ManualOverride(Level::Critical)).unwrap();
        assert_eq!(spec.to, Level::Critical);
        assert_eq!(
            resolve(Level::BudgetBlocked, &Trigger::ManualOverride(Level::Critical)),
            None
        );
        assert_eq!(
            resolve(Level::Alert, &Trigger::ManualOverride(Level::BudgetBlocked)),
            None
        );
    }
}
