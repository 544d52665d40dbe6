//! The escalation state machine.

use crate::{
    EscalationContext, GuardCtx, MarketData, MarketDataError, MarketPurchase, TransitionLedger,
    TransitionObserver, TransitionSink, evaluate_guard, natural_target, resolve, risk_signal,
};
use chrono::Utc;
use sentinel_budget::{BudgetStatus, ReserveBudget};
use sentinel_types::{
    GuardKind, Level, MicroUsdc, RiskMetrics, RiskThresholds, Transition, Trigger,
};
use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::Mutex;

/// Tunables for the machine.
#[derive(Debug, Clone)]
pub struct MachineConfig {
    /// Minimum dwell per level, and minimum gap between paid escalations.
    pub cooldown: Duration,
    /// Remaining budget at or above this exits BUDGET_BLOCKED.
    pub warning_threshold: MicroUsdc,
    /// Guard thresholds.
    pub thresholds: RiskThresholds,
    /// In-memory transition ledger cap.
    pub ledger_cap: usize,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_secs(300),
            warning_threshold: 500_000,
            thresholds: RiskThresholds::default(),
            ledger_cap: TransitionLedger::DEFAULT_CAP,
        }
    }
}

/// What one tick of the machine produced.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StepOutcome {
    /// The executed or rejected transition, when a trigger fired.
    pub transition: Option<Transition>,
    /// Market data bought by a paid transition.
    pub purchased: Option<MarketPurchase>,
}

#[derive(Debug)]
struct MachineState {
    context: EscalationContext,
    ledger: TransitionLedger,
}

/// Owns the current level and mediates every transition.
///
/// A single async mutex serializes all context reads and writes, including
/// across the payment suspension point, so guards always see a consistent
/// snapshot. State is never lost on guard failure: only successful
/// transitions change the level.
pub struct EscalationStateMachine {
    state: Mutex<MachineState>,
    budget: Arc<dyn ReserveBudget>,
    config: MachineConfig,
    observers: Vec<Arc<dyn TransitionObserver>>,
    started: Instant,
}

impl core::fmt::Debug for EscalationStateMachine {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EscalationStateMachine")
            .field("config", &self.config)
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl EscalationStateMachine {
    /// Creates a machine at L0 with the given budget capability and
    /// optional durable transition sink.
    pub fn new(
        budget: Arc<dyn ReserveBudget>,
        config: MachineConfig,
        sink: Option<Arc<dyn TransitionSink>>,
    ) -> Self {
        let ledger = TransitionLedger::new(config.ledger_cap, sink);
        Self {
            state: Mutex::new(MachineState { context: EscalationContext::new(), ledger }),
            budget,
            config,
            observers: Vec::new(),
            started: Instant::now(),
        }
    }

    /// Registers a transition observer. Composition-time only.
    pub fn register_observer(&mut self, observer: Arc<dyn TransitionObserver>) {
        self.observers.push(observer);
    }

    /// The current level.
    pub async fn current_level(&self) -> Level {
        self.state.lock().await.context.level
    }

    /// Sets the administrative pause flag.
    pub async fn set_paused(&self, paused: bool) {
        self.state.lock().await.context.paused = paused;
    }

    /// Restores a persisted level without recording a transition, used at
    /// startup and by replay.
    pub async fn restore_level(&self, level: Level) {
        let mut state = self.state.lock().await;
        state.context.enter(level, false);
        // Restored levels owe no dwell; allow immediate movement.
        state.context.last_escalation = None;
    }

    /// Seeds the transition id counter above persisted rows.
    pub async fn seed_transition_ids(&self, next_id: u64) {
        self.state.lock().await.ledger.seed_ids(next_id);
    }

    /// The in-memory transition window, oldest first.
    pub async fn recent_transitions(&self) -> Vec<Transition> {
        self.state.lock().await.ledger.entries().cloned().collect()
    }

    /// Evaluates one tick: selects the highest-priority feasible trigger
    /// and executes at most one transition.
    pub async fn step(
        &self,
        metrics: &RiskMetrics,
        market: &dyn MarketData,
        run_id: Option<u64>,
        snapshot_id: Option<u64>,
    ) -> StepOutcome {
        let mut state = self.state.lock().await;
        if state.context.paused {
            debug!(target: "machine", "paused; skipping tick");
            return StepOutcome::default();
        }
        let status = self.budget.status();
        let Some(trigger) = self.select_trigger(&state.context, metrics, &status) else {
            trace!(target: "machine", level = %state.context.level, "no trigger fired");
            return StepOutcome::default();
        };
        let (transition, purchased) = self
            .execute(&mut state, trigger, Some(metrics), Some(market), run_id, snapshot_id)
            .await;
        StepOutcome { transition: Some(transition), purchased }
    }

    /// Applies one explicit trigger, for manual overrides and replay.
    pub async fn apply(
        &self,
        trigger: Trigger,
        metrics: Option<&RiskMetrics>,
        market: Option<&dyn MarketData>,
        run_id: Option<u64>,
        snapshot_id: Option<u64>,
    ) -> (Transition, Option<MarketPurchase>) {
        let mut state = self.state.lock().await;
        self.execute(&mut state, trigger, metrics, market, run_id, snapshot_id).await
    }

    /// Trigger priority: the budget sink outranks every escalation, then
    /// higher target levels outrank lower ones; de-escalation fires only
    /// when nothing else does.
    fn select_trigger(
        &self,
        context: &EscalationContext,
        metrics: &RiskMetrics,
        status: &BudgetStatus,
    ) -> Option<Trigger> {
        let level = context.level;
        if level == Level::BudgetBlocked {
            return (status.remaining >= self.config.warning_threshold)
                .then_some(Trigger::BudgetRestored);
        }
        let rank = level.rank().expect("regular level has a rank");
        if status.blocked && rank >= 2 {
            return Some(Trigger::BudgetExhausted);
        }

        let ctx = self.guard_ctx(context, *status, Some(metrics));
        let escalation = match level {
            Level::Critical if evaluate_guard(GuardKind::DepthCrisis, &ctx, 0) => {
                Some(Trigger::Emergency)
            }
            Level::MarketData if evaluate_guard(GuardKind::LcrCritical, &ctx, 0) => {
                Some(Trigger::CriticalMetric)
            }
            Level::Alert if risk_signal(metrics, &self.config.thresholds) => {
                Some(Trigger::NeedMarketData)
            }
            Level::Monitor if risk_signal(metrics, &self.config.thresholds) => {
                Some(Trigger::RiskThreshold)
            }
            Level::Idle => Some(Trigger::MetricTick),
            _ => None,
        };
        if escalation.is_some() {
            return escalation;
        }
        // Quiet signals: step one rung down once the dwell allows it.
        (rank >= 1 && !risk_signal(metrics, &self.config.thresholds))
            .then_some(Trigger::CooldownOk)
    }

    async fn execute(
        &self,
        state: &mut MachineState,
        trigger: Trigger,
        metrics: Option<&RiskMetrics>,
        market: Option<&dyn MarketData>,
        run_id: Option<u64>,
        snapshot_id: Option<u64>,
    ) -> (Transition, Option<MarketPurchase>) {
        let from = state.context.level;
        let Some(spec) = resolve(from, &trigger) else {
            warn!(target: "machine", %from, %trigger, "trigger not admissible at this level");
            let transition = self.record(
                state,
                from,
                natural_target(from, &trigger),
                trigger,
                false,
                0,
                vec![],
                vec![],
                None,
                run_id,
                snapshot_id,
            );
            return (transition, None);
        };

        let status = self.budget.status();
        let mut guards_passed = Vec::new();
        let mut guards_failed = Vec::new();

        // The budget guard is the reservation itself: checking and
        // reserving in one step leaves no gap for a concurrent spender.
        let mut reservation = None;
        if spec.cost > 0 {
            match self.budget.reserve(spec.cost) {
                Ok(handle) => {
                    guards_passed.push(GuardKind::BudgetAvailable);
                    reservation = Some(handle);
                }
                Err(err) => {
                    debug!(target: "machine", %from, %trigger, %err, "budget guard failed");
                    guards_failed.push(GuardKind::BudgetAvailable);
                    let transition = self.enter_blocked(
                        state,
                        from,
                        trigger,
                        guards_passed,
                        guards_failed,
                        run_id,
                        snapshot_id,
                    );
                    return (transition, None);
                }
            }
        }

        let ctx = self.guard_ctx(&state.context, status, metrics);
        for kind in spec.guards {
            if evaluate_guard(*kind, &ctx, spec.cost) {
                guards_passed.push(*kind);
            } else {
                guards_failed.push(*kind);
            }
        }
        if !guards_failed.is_empty() {
            if let Some(handle) = &reservation {
                self.budget.release(handle);
            }
            debug!(target: "machine", %from, to = %spec.to, ?guards_failed, "guards rejected transition");
            let transition = self.record(
                state,
                from,
                spec.to,
                trigger,
                false,
                0,
                guards_passed,
                guards_failed,
                None,
                run_id,
                snapshot_id,
            );
            return (transition, None);
        }

        // Paid transitions buy their data before the level changes.
        let mut cost = 0;
        let mut payment_id = None;
        let mut purchased = None;
        if let Some(endpoint) = spec.paid_endpoint {
            let fetched = match market {
                Some(market) => market.fetch(endpoint, run_id).await,
                None => Err(MarketDataError::Failed("no market data source wired".to_string())),
            };
            match fetched {
                Ok(purchase) => {
                    cost = purchase.cost;
                    payment_id = purchase.invoice_id.clone();
                    purchased = Some(purchase);
                }
                Err(MarketDataError::BudgetBlocked) => {
                    if let Some(handle) = &reservation {
                        self.budget.release(handle);
                    }
                    guards_failed.push(GuardKind::BudgetAvailable);
                    let transition = self.enter_blocked(
                        state,
                        from,
                        trigger,
                        guards_passed,
                        guards_failed,
                        run_id,
                        snapshot_id,
                    );
                    return (transition, None);
                }
                Err(MarketDataError::Failed(err)) => {
                    if let Some(handle) = &reservation {
                        self.budget.release(handle);
                    }
                    warn!(target: "machine", %from, to = %spec.to, %err, "paid transition failed");
                    let transition = self.record(
                        state,
                        from,
                        spec.to,
                        trigger,
                        false,
                        0,
                        guards_passed,
                        guards_failed,
                        None,
                        run_id,
                        snapshot_id,
                    );
                    return (transition, None);
                }
            }
        }

        // The table cost was an estimate held while the purchase ran; the
        // pipeline committed the actual invoice amount. Release the
        // estimate so only delivered data counts as spend.
        if let Some(handle) = &reservation {
            self.budget.release(handle);
        }

        let escalated = match (from.rank(), spec.to.rank()) {
            (Some(a), Some(b)) => b > a,
            _ => false,
        };
        state.context.enter(spec.to, escalated);
        info!(target: "machine", %from, to = %spec.to, %trigger, cost, "transition executed");
        let transition = self.record(
            state,
            from,
            spec.to,
            trigger,
            true,
            cost,
            guards_passed,
            guards_failed,
            payment_id,
            run_id,
            snapshot_id,
        );
        (transition, purchased)
    }

    fn enter_blocked(
        &self,
        state: &mut MachineState,
        from: Level,
        trigger: Trigger,
        guards_passed: Vec<GuardKind>,
        guards_failed: Vec<GuardKind>,
        run_id: Option<u64>,
        snapshot_id: Option<u64>,
    ) -> Transition {
        warn!(target: "machine", %from, %trigger, "redirecting to BUDGET_BLOCKED");
        state.context.enter(Level::BudgetBlocked, false);
        self.record(
            state,
            from,
            Level::BudgetBlocked,
            trigger,
            true,
            0,
            guards_passed,
            guards_failed,
            None,
            run_id,
            snapshot_id,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn record(
        &self,
        state: &mut MachineState,
        from: Level,
        to: Level,
        trigger: Trigger,
        successful: bool,
        cost: MicroUsdc,
        guards_passed: Vec<GuardKind>,
        guards_failed: Vec<GuardKind>,
        payment_id: Option<String>,
        run_id: Option<u64>,
        snapshot_id: Option<u64>,
    ) -> Transition {
        let transition = Transition {
            id: state.ledger.next_id(),
            run_id,
            from,
            to,
            trigger,
            successful,
            at: Utc::now(),
            monotonic_ms: self.started.elapsed().as_millis() as u64,
            cost,
            guards_passed,
            guards_failed,
            payment_id,
            snapshot_id,
        };
        state.ledger.append(transition.clone());
        for observer in &self.observers {
            observer.on_transition(&transition);
        }
        transition
    }

    fn guard_ctx<'a>(
        &'a self,
        context: &EscalationContext,
        budget: BudgetStatus,
        metrics: Option<&'a RiskMetrics>,
    ) -> GuardCtx<'a> {
        GuardCtx {
            paused: context.paused,
            dwell: context.dwell(),
            since_last_escalation: context.last_escalation.map(|at| at.elapsed()),
            cooldown: self.config.cooldown,
            budget,
            warning_threshold: self.config.warning_threshold,
            metrics,
            thresholds: &self.config.thresholds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{TestMarketData, calm_metrics, metrics_with, with_depth};
    use sentinel_budget::BudgetLedger;
    use sentinel_types::VolatilityRegime;
    use std::sync::Mutex as StdMutex;

    fn machine_with(
        limit: MicroUsdc,
        cooldown: Duration,
    ) -> (EscalationStateMachine, Arc<BudgetLedger>, TestMarketData) {
        let ledger = Arc::new(BudgetLedger::new(limit, 50_000));
        let config = MachineConfig { cooldown, ..MachineConfig::default() };
        let machine = EscalationStateMachine::new(ledger.clone(), config, None);
        let market = TestMarketData::with_ledger(ledger.clone());
        (machine, ledger, market)
    }

    #[tokio::test]
    async fn metric_tick_lifts_idle_to_monitor() {
        let (machine, _, market) = machine_with(10_000_000, Duration::ZERO);
        let outcome = machine.step(&metrics_with(Some(1.0), None), &market, Some(1), None).await;
        let transition = outcome.transition.unwrap();
        assert!(transition.successful);
        assert_eq!((transition.from, transition.to), (Level::Idle, Level::Monitor));
        assert_eq!(transition.trigger, Trigger::MetricTick);
        assert_eq!(transition.cost, 0);
        assert_eq!(machine.current_level().await, Level::Monitor);
    }

    #[tokio::test]
    async fn risk_signal_climbs_one_rung_per_tick() {
        let (machine, _, market) = machine_with(10_000_000, Duration::ZERO);
        let risky = metrics_with(Some(1.0), Some(VolatilityRegime::Elevated));
        machine.step(&risky, &market, None, None).await;
        assert_eq!(machine.current_level().await, Level::Monitor);
        machine.step(&risky, &market, None, None).await;
        assert_eq!(machine.current_level().await, Level::Alert);
    }

    #[tokio::test]
    async fn paid_transition_records_actual_cost() {
        let (machine, ledger, market) = machine_with(10_000_000, Duration::ZERO);
        machine.restore_level(Level::Alert).await;
        market.push_purchase("liquidity_depth", 250_000, "inv-1");

        let risky = metrics_with(Some(1.3), Some(VolatilityRegime::Elevated));
        let outcome = machine.step(&risky, &market, Some(7), Some(3)).await;
        let transition = outcome.transition.unwrap();
        assert!(transition.successful);
        assert_eq!((transition.from, transition.to), (Level::Alert, Level::MarketData));
        assert_eq!(transition.cost, 250_000);
        assert_eq!(transition.payment_id.as_deref(), Some("inv-1"));
        assert!(transition.guards_passed.contains(&GuardKind::BudgetAvailable));
        assert!(transition.guards_passed.contains(&GuardKind::CooldownOk));
        assert!(outcome.purchased.is_some());

        // The estimate reservation is gone; only the settled invoice
        // amount counts as spend.
        let status = ledger.status();
        assert_eq!(status.spent, 250_000);
        assert_eq!(status.reserved, 0);
        assert_eq!(status.remaining, 9_750_000);
    }

    #[tokio::test]
    async fn budget_exhaustion_redirects_to_the_sink() {
        let (machine, ledger, market) = machine_with(10_000_000, Duration::ZERO);
        // Consume most of the budget so the 1 USDC estimate cannot fit.
        let handle = ledger.reserve(9_900_000).unwrap();
        ledger.commit(&handle).unwrap();
        machine.restore_level(Level::MarketData).await;

        let critical = metrics_with(Some(0.8), Some(VolatilityRegime::High));
        let outcome = machine.step(&critical, &market, None, None).await;
        let transition = outcome.transition.unwrap();
        assert!(transition.successful);
        assert_eq!((transition.from, transition.to), (Level::MarketData, Level::BudgetBlocked));
        assert_eq!(transition.cost, 0);
        assert_eq!(transition.guards_failed, vec![GuardKind::BudgetAvailable]);
        assert_eq!(machine.current_level().await, Level::BudgetBlocked);
        assert_eq!(ledger.status().spent, 9_900_000);

        // Blocked and still under the warning line: nothing moves.
        let outcome = machine.step(&critical, &market, None, None).await;
        assert_eq!(outcome.transition, None);

        // Administrative reset restores monitoring on the next tick.
        ledger.reset();
        let outcome = machine.step(&calm_metrics(), &market, None, None).await;
        let transition = outcome.transition.unwrap();
        assert_eq!(transition.trigger, Trigger::BudgetRestored);
        assert_eq!(machine.current_level().await, Level::Monitor);
    }

    #[tokio::test]
    async fn pipeline_budget_block_redirects_too() {
        let (machine, ledger, market) = machine_with(10_000_000, Duration::ZERO);
        machine.restore_level(Level::Alert).await;
        market.push_err(MarketDataError::BudgetBlocked);

        let risky = metrics_with(Some(1.0), None);
        let outcome = machine.step(&risky, &market, None, None).await;
        let transition = outcome.transition.unwrap();
        assert_eq!(transition.to, Level::BudgetBlocked);
        assert!(transition.guards_failed.contains(&GuardKind::BudgetAvailable));
        assert_eq!(ledger.status().reserved, 0);
    }

    #[tokio::test]
    async fn failed_purchase_keeps_the_level_and_releases_the_estimate() {
        let (machine, ledger, market) = machine_with(10_000_000, Duration::ZERO);
        machine.restore_level(Level::Alert).await;
        market.push_err(MarketDataError::Failed("gateway 500".to_string()));

        let risky = metrics_with(Some(1.0), None);
        let outcome = machine.step(&risky, &market, None, None).await;
        let transition = outcome.transition.unwrap();
        assert!(!transition.successful);
        assert_eq!(transition.cost, 0);
        assert_eq!(machine.current_level().await, Level::Alert);
        let status = ledger.status();
        assert_eq!(status.spent, 0);
        assert_eq!(status.reserved, 0);
    }

    #[tokio::test]
    async fn cooldown_rejects_rapid_paid_escalation() {
        let (machine, ledger, market) = machine_with(10_000_000, Duration::from_secs(300));
        let risky = metrics_with(Some(1.0), None);
        machine.step(&risky, &market, None, None).await; // L0 -> L1
        machine.step(&risky, &market, None, None).await; // L1 -> L2

        // Seconds after escalating, the paid rung is still cooling down.
        let outcome = machine.step(&risky, &market, None, None).await;
        let transition = outcome.transition.unwrap();
        assert!(!transition.successful);
        assert_eq!(transition.guards_failed, vec![GuardKind::CooldownOk]);
        assert_eq!(machine.current_level().await, Level::Alert);
        assert_eq!(ledger.status().reserved, 0);
    }

    #[tokio::test]
    async fn calm_metrics_step_down_one_rung() {
        let (machine, _, market) = machine_with(10_000_000, Duration::ZERO);
        machine.restore_level(Level::Alert).await;
        let outcome = machine.step(&calm_metrics(), &market, None, None).await;
        let transition = outcome.transition.unwrap();
        assert!(transition.successful);
        assert_eq!((transition.from, transition.to), (Level::Alert, Level::Monitor));
        assert_eq!(transition.trigger, Trigger::CooldownOk);
    }

    #[tokio::test]
    async fn de_escalation_waits_for_dwell() {
        let (machine, _, market) = machine_with(10_000_000, Duration::from_secs(300));
        let risky = metrics_with(Some(1.0), None);
        machine.step(&risky, &market, None, None).await; // L0 -> L1
        let outcome = machine.step(&calm_metrics(), &market, None, None).await;
        let transition = outcome.transition.unwrap();
        assert!(!transition.successful);
        assert_eq!(transition.guards_failed, vec![GuardKind::CooldownElapsed]);
        assert_eq!(machine.current_level().await, Level::Monitor);
    }

    #[tokio::test]
    async fn depth_crisis_reaches_emergency() {
        let (machine, _, market) = machine_with(10_000_000, Duration::ZERO);
        machine.restore_level(Level::Critical).await;
        market.push_purchase("trades", 50_000, "inv-t");
        let crisis = with_depth(metrics_with(Some(0.8), Some(VolatilityRegime::High)), 100_000.0);
        let outcome = machine.step(&crisis, &market, None, None).await;
        let transition = outcome.transition.unwrap();
        assert!(transition.successful);
        assert_eq!(transition.to, Level::Emergency);
        assert_eq!(market.calls(), vec!["trades".to_string()]);
    }

    #[tokio::test]
    async fn inadmissible_trigger_is_recorded_and_rejected() {
        let (machine, _, market) = machine_with(10_000_000, Duration::ZERO);
        let (transition, _) = machine
            .apply(Trigger::NeedMarketData, Some(&calm_metrics()), Some(&market), None, None)
            .await;
        assert!(!transition.successful);
        assert_eq!((transition.from, transition.to), (Level::Idle, Level::MarketData));
        assert_eq!(machine.current_level().await, Level::Idle);
    }

    #[tokio::test]
    async fn manual_override_skips_rungs() {
        let (machine, _, market) = machine_with(10_000_000, Duration::ZERO);
        let (transition, _) = machine
            .apply(
                Trigger::ManualOverride(Level::Critical),
                None,
                Some(&market),
                None,
                None,
            )
            .await;
        assert!(transition.successful);
        assert_eq!(machine.current_level().await, Level::Critical);
    }

    #[tokio::test]
    async fn paused_machine_does_nothing() {
        let (machine, _, market) = machine_with(10_000_000, Duration::ZERO);
        machine.set_paused(true).await;
        let outcome = machine.step(&calm_metrics(), &market, None, None).await;
        assert_eq!(outcome, StepOutcome::default());
        assert_eq!(machine.current_level().await, Level::Idle);
    }

    #[tokio::test]
    async fn observers_see_every_attempt() {
        struct Recorder(StdMutex<Vec<(Level, Level, bool)>>);
        impl TransitionObserver for Recorder {
            fn on_transition(&self, transition: &Transition) {
                self.0
                    .lock()
                    .unwrap()
                    .push((transition.from, transition.to, transition.successful));
            }
        }

        let ledger = Arc::new(BudgetLedger::new(10_000_000, 50_000));
        let mut machine =
            EscalationStateMachine::new(ledger, MachineConfig::default(), None);
        let recorder = Arc::new(Recorder(StdMutex::new(Vec::new())));
        machine.register_observer(recorder.clone());
        let market = TestMarketData::default();

        machine.step(&calm_metrics(), &market, None, None).await;
        let seen = recorder.0.lock().unwrap().clone();
        assert_eq!(seen, vec![(Level::Idle, Level::Monitor, true)]);
    }

    #[tokio::test]
    async fn ledger_ids_are_strictly_ordered() {
        let (machine, _, market) = machine_with(10_000_000, Duration::ZERO);
        let risky = metrics_with(Some(1.0), None);
        for _ in 0..4 {
            machine.step(&risky, &market, None, None).await;
        }
        let transitions = machine.recent_transitions().await;
        for pair in transitions.windows(2) {
            assert!(pair[1].id > pair[0].id);
            assert!(pair[1].monotonic_ms >= pair[0].monotonic_ms);
        }
    }
}
