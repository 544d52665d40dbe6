//! One scheduled tick of the agent.

use crate::AgentError;
use chrono::{DateTime, Utc};
use sentinel_budget::BudgetLedger;
use sentinel_chain::{ChainProvider, TreasuryReader};
use sentinel_machine::{EscalationStateMachine, MarketData, StepOutcome};
use sentinel_risk::{MarketObservations, MetricEngine, OrderBook};
use sentinel_storage::SentinelStore;
use sentinel_types::{RiskMetrics, RunRecord, RunStatus};
use std::{sync::Arc, time::Duration};

/// Executes the tick pipeline: snapshot → metrics → state machine →
/// persistence, all under the run deadline.
pub struct AgentRun<P> {
    store: Arc<SentinelStore>,
    reader: TreasuryReader<P>,
    engine: MetricEngine,
    machine: Arc<EscalationStateMachine>,
    market: Arc<dyn MarketData>,
    ledger: Arc<BudgetLedger>,
    run_timeout: Duration,
}

impl<P: core::fmt::Debug> core::fmt::Debug for AgentRun<P> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AgentRun")
            .field("reader", &self.reader)
            .field("run_timeout", &self.run_timeout)
            .finish()
    }
}

impl<P> AgentRun<P>
where
    P: ChainProvider + Send + Sync,
{
    /// Wires a run executor from its collaborators.
    pub fn new(
        store: Arc<SentinelStore>,
        reader: TreasuryReader<P>,
        engine: MetricEngine,
        machine: Arc<EscalationStateMachine>,
        market: Arc<dyn MarketData>,
        ledger: Arc<BudgetLedger>,
        run_timeout: Duration,
    ) -> Self {
        Self { store, reader, engine, machine, market, ledger, run_timeout }
    }

    /// The durable store, for shutdown flushes.
    pub fn store(&self) -> &Arc<SentinelStore> {
        &self.store
    }

    /// The state machine, for startup restore and administration.
    pub fn machine(&self) -> &Arc<EscalationStateMachine> {
        &self.machine
    }

    /// Persists a SKIPPED run row for a tick that was not executed.
    pub async fn record_skip(
        &self,
        scheduled_at: DateTime<Utc>,
        reason: &str,
    ) -> Result<RunRecord, AgentError> {
        let level = self.machine.current_level().await;
        let mut run = self.store.create_run(scheduled_at, level)?;
        run.status = RunStatus::Skipped;
        run.level_after = Some(level);
        run.error = Some(reason.to_string());
        run.metadata = serde_json::json!({ "reason": reason });
        run.completed_at = Some(Utc::now());
        self.store.update_run(&run)?;
        warn!(target: "scheduler", run_id = run.id, reason, "tick skipped");
        Ok(run)
    }

    /// Executes one tick and persists the outcome. The run row reaches a
    /// terminal status in every path; an `Err` is fatal-grade only.
    pub async fn execute_tick(
        &self,
        scheduled_at: DateTime<Utc>,
    ) -> Result<RunRecord, AgentError> {
        let level_before = self.machine.current_level().await;
        let mut run = self.store.create_run(scheduled_at, level_before)?;
        run.status = RunStatus::Running;
        run.started_at = Some(Utc::now());
        self.store.update_run(&run)?;
        info!(target: "agent", run_id = run.id, level = %level_before, "run started");

        let spent_before = self.ledger.status().spent;
        let result =
            tokio::time::timeout(self.run_timeout, self.pipeline(&mut run)).await;
        match result {
            Ok(Ok(())) => {
                run.status = RunStatus::Completed;
            }
            Ok(Err(err)) => {
                // Level is durable: a failed run keeps whatever the
                // machine committed before the failure.
                error!(target: "agent", run_id = run.id, %err, "run failed");
                run.status = RunStatus::Failed;
                run.error = Some(err.to_string());
                self.ledger.release_outstanding();
            }
            Err(_) => {
                error!(target: "agent", run_id = run.id, "run deadline exceeded");
                run.status = RunStatus::Failed;
                run.error = Some(AgentError::Deadline.to_string());
                self.ledger.release_outstanding();
            }
        }
        let level_after = self.machine.current_level().await;
        run.level_after = Some(level_after);
        run.spend_delta = self.ledger.status().spent.saturating_sub(spent_before);
        run.invoice_count = self.store.payments_for_run(run.id)?.len() as u32;
        run.completed_at = Some(Utc::now());
        self.store.update_run(&run)?;
        info!(
            target: "agent",
            run_id = run.id,
            status = %run.status,
            %level_after,
            spend_delta = run.spend_delta,
            "run finished"
        );
        Ok(run)
    }

    async fn pipeline(&self, run: &mut RunRecord) -> Result<(), AgentError> {
        // Snapshot every chain.
        let snapshot_id = self.store.next_snapshot_id()?;
        let snapshots = self.reader.snapshot_all(snapshot_id, Some(run.id)).await?;
        for snapshot in &snapshots {
            self.store.put_snapshot(snapshot)?;
        }
        run.snapshot_id = Some(snapshot_id);

        // Local metrics feed the guards.
        let guard_metrics = self.engine.compute(&snapshots, None);

        // The machine decides; paid transitions buy data inline.
        let outcome = self
            .machine
            .step(&guard_metrics, self.market.as_ref(), Some(run.id), Some(snapshot_id))
            .await;

        // A purchased order book upgrades the metrics attached to the run;
        // the guard inputs are recorded separately so replay sees exactly
        // what the machine saw.
        let enriched = purchased_book(&outcome).map(|book| {
            let observations =
                MarketObservations { order_book: Some(book), ..Default::default() };
            self.engine.compute(&snapshots, Some(&observations))
        });

        run.metadata = run_metadata(&guard_metrics, enriched.as_ref(), &outcome);
        Ok(())
    }
}

fn purchased_book(outcome: &StepOutcome) -> Option<OrderBook> {
    let purchase = outcome.purchased.as_ref()?;
    match OrderBook::from_json(&purchase.body) {
        Ok(book) => Some(book),
        Err(err) => {
            debug!(target: "agent", endpoint = purchase.endpoint, %err, "payload is not an order book");
            None
        }
    }
}

/// Everything replay needs: the metrics the guards saw, the post-purchase
/// metrics when data was bought, and the executed transition id.
fn run_metadata(
    guard_metrics: &RiskMetrics,
    enriched: Option<&RiskMetrics>,
    outcome: &StepOutcome,
) -> serde_json::Value {
    serde_json::json!({
        "metrics": guard_metrics,
        "enriched_metrics": enriched,
        "transition_id": outcome.transition.as_ref().map(|t| t.id),
    })
}

/// Extracts the recorded metrics from a run row.
pub(crate) fn recorded_metrics(run: &RunRecord) -> Option<RiskMetrics> {
    serde_json::from_value(run.metadata.get("metrics")?.clone()).ok()
}
