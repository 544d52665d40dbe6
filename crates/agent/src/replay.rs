//! Deterministic dry-run replay of a recorded run.
//!
//! Replay reconstructs the machine's inputs from the persisted run row —
//! the recorded guard metrics, the starting level, the budget position at
//! run start, and the confirmed payments — and re-executes the
//! state-machine pass on a scratch machine. Nothing is paid and nothing is
//! written.

use crate::AgentError;
use crate::run::recorded_metrics;
use async_trait::async_trait;
use sentinel_budget::BudgetLedger;
use sentinel_machine::{
    EscalationStateMachine, MachineConfig, MarketData, MarketDataError, MarketPurchase,
};
use sentinel_storage::SentinelStore;
use sentinel_types::{MicroUsdc, PaymentStatus, SentinelConfig, Transition};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

/// The original and replayed transition sequences for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayReport {
    /// The replayed run id.
    pub run_id: u64,
    /// Transitions persisted by the original run, id order.
    pub original: Vec<Transition>,
    /// Transitions produced by the replay, in order.
    pub replayed: Vec<Transition>,
}

impl ReplayReport {
    /// Whether the sequences match, ignoring ids and timestamps.
    pub fn matches(&self) -> bool {
        self.original.len() == self.replayed.len()
            && self.original.iter().zip(&self.replayed).all(|(a, b)| {
                a.from == b.from
                    && a.to == b.to
                    && a.trigger == b.trigger
                    && a.successful == b.successful
                    && a.cost == b.cost
                    && a.guards_passed == b.guards_passed
                    && a.guards_failed == b.guards_failed
            })
    }
}

/// Serves the run's recorded purchases instead of the live gateway,
/// mirroring their costs on the scratch ledger.
#[derive(Debug)]
struct RecordedMarketData {
    purchases: Mutex<HashMap<String, (MicroUsdc, Option<String>)>>,
    ledger: Arc<BudgetLedger>,
}

#[async_trait]
impl MarketData for RecordedMarketData {
    async fn fetch(
        &self,
        endpoint: &str,
        _run_id: Option<u64>,
    ) -> Result<MarketPurchase, MarketDataError> {
        let Some((cost, invoice_id)) = self
            .purchases
            .lock()
            .expect("recorded purchases lock poisoned")
            .remove(endpoint)
        else {
            return Err(MarketDataError::Failed(format!(
                "original run bought nothing from {endpoint}"
            )));
        };
        if cost > 0 {
            let handle = self
                .ledger
                .reserve(cost)
                .map_err(|_| MarketDataError::BudgetBlocked)?;
            self.ledger.commit(&handle).map_err(|e| MarketDataError::Failed(e.to_string()))?;
        }
        Ok(MarketPurchase {
            endpoint: endpoint.to_string(),
            body: b"{}".to_vec().into(),
            invoice_id,
            cost,
        })
    }
}

/// Replays `run_id` against its recorded snapshot and metrics.
///
/// `dry_run` is the only supported mode: no payments are made and no rows
/// are written. The scratch ledger is seeded with the budget position the
/// run started from, reconstructed from prior spend deltas.
pub async fn replay_run(
    store: &SentinelStore,
    config: &SentinelConfig,
    run_id: u64,
) -> Result<ReplayReport, AgentError> {
    let run = store.run(run_id)?.ok_or(AgentError::RunNotFound(run_id))?;
    let metrics = recorded_metrics(&run).ok_or(AgentError::MissingMetrics(run_id))?;
    let original = store.transitions_for_run(run_id)?;

    // Budget position at run start.
    let spent_before: MicroUsdc = store
        .runs()?
        .iter()
        .filter(|prior| prior.id < run_id)
        .map(|prior| prior.spend_delta)
        .sum();
    let ledger = Arc::new(BudgetLedger::new(
        config.budget_limit_micro(),
        config.minimum_operational_micro(),
    ));
    if spent_before > 0 {
        let seed = ledger
            .reserve(spent_before)
            .map_err(|e| AgentError::Submitter(format!("replay budget seed failed: {e}")))?;
        ledger.commit(&seed).map_err(|e| {
            AgentError::Submitter(format!("replay budget seed failed: {e}"))
        })?;
    }

    let machine = EscalationStateMachine::new(
        ledger.clone(),
        MachineConfig {
            cooldown: config.cooldown(),
            warning_threshold: config.budget_warning_micro(),
            thresholds: config.thresholds,
            ..MachineConfig::default()
        },
        None,
    );
    machine.restore_level(run.level_before).await;

    let purchases = store
        .payments_for_run(run_id)?
        .into_iter()
        .filter(|payment| payment.status == PaymentStatus::Confirmed)
        .map(|payment| (payment.endpoint.clone(), (payment.amount, Some(payment.invoice_id))))
        .collect();
    let market = RecordedMarketData { purchases: Mutex::new(purchases), ledger };

    let outcome = machine.step(&metrics, &market, Some(run_id), run.snapshot_id).await;
    let replayed: Vec<Transition> = outcome.transition.into_iter().collect();
    info!(
        target: "replay",
        run_id,
        original = original.len(),
        replayed = replayed.len(),
        "replay complete"
    );
    Ok(ReplayReport { run_id, original, replayed })
}
