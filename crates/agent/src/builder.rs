//! The composition root: every dependency wired explicitly, no registry.

use crate::{
    AgentError, AgentRun, GatewayMarketData, Scheduler, UnfundedSubmitter, parse_cron,
};
use sentinel_budget::BudgetLedger;
use sentinel_chain::{ChainTarget, OnlineChainProvider, TreasuryReader};
use sentinel_machine::{
    EscalationStateMachine, MachineConfig, MarketData, TransitionSink,
};
use sentinel_payment::{
    HttpGateway, MarketDataGateway, PaymentPipeline, PaymentSubmitter, WalletSubmitter,
};
use sentinel_risk::MetricEngine;
use sentinel_settlement::SettlementVerifier;
use sentinel_storage::SentinelStore;
use sentinel_types::{BASE_CHAIN_ID, ConfigError, MicroUsdc, SentinelConfig};
use std::sync::Arc;
use url::Url;

/// The online payment pipeline, concretely typed.
pub type OnlinePaymentPipeline = PaymentPipeline<
    HttpGateway,
    OnlineChainProvider,
    Arc<SentinelStore>,
    Arc<dyn PaymentSubmitter>,
    Arc<SentinelStore>,
>;

/// The online market-data gateway, concretely typed.
pub type OnlineGateway = MarketDataGateway<
    HttpGateway,
    OnlineChainProvider,
    Arc<SentinelStore>,
    Arc<dyn PaymentSubmitter>,
    Arc<SentinelStore>,
>;

/// A fully wired agent.
#[derive(Debug)]
pub struct Agent {
    /// The scheduler driving ticks.
    pub scheduler: Scheduler<OnlineChainProvider>,
    /// The durable store.
    pub store: Arc<SentinelStore>,
    /// The budget ledger, for administrative resets.
    pub ledger: Arc<BudgetLedger>,
    /// The state machine, for pause and manual overrides.
    pub machine: Arc<EscalationStateMachine>,
}

/// Builds the full object graph from a validated configuration, restoring
/// level, budget position and counters from the store.
pub async fn build_agent(config: &SentinelConfig) -> Result<Agent, AgentError> {
    config.validate()?;
    let store = Arc::new(SentinelStore::open(&config.data_dir)?);

    // Budget resumes where previous runs left it.
    let ledger = Arc::new(BudgetLedger::new(
        config.budget_limit_micro(),
        config.minimum_operational_micro(),
    ));
    let prior_runs = store.runs()?;
    let spent: MicroUsdc = prior_runs.iter().map(|run| run.spend_delta).sum();
    if spent > 0 {
        let seed = ledger.reserve(spent).map_err(|e| {
            AgentError::Config(ConfigError::Invalid(format!(
                "persisted spend {spent} µUSDC does not fit the configured budget: {e}"
            )))
        })?;
        ledger.commit(&seed).map_err(|e| {
            AgentError::Config(ConfigError::Invalid(format!("budget seed failed: {e}")))
        })?;
        info!(target: "agent", spent, "restored budget position");
    }

    let sink: Arc<dyn TransitionSink> = store.clone();
    let machine = Arc::new(EscalationStateMachine::new(
        ledger.clone(),
        MachineConfig {
            cooldown: config.cooldown(),
            warning_threshold: config.budget_warning_micro(),
            thresholds: config.thresholds,
            ..MachineConfig::default()
        },
        Some(sink),
    ));
    machine.seed_transition_ids(store.next_transition_id()?).await;
    if let Some(level) = prior_runs.iter().rev().find_map(|run| run.level_after) {
        info!(target: "agent", %level, "restored escalation level");
        machine.restore_level(level).await;
    }

    // Settlement always verifies on Base; fall back to the first chain if
    // Base is not monitored.
    let settlement_chain = config
        .chains
        .iter()
        .find(|chain| chain.chain_id == BASE_CHAIN_ID)
        .unwrap_or(&config.chains[0]);
    let settlement_rpc = parse_url(&settlement_chain.rpc_url)?;
    let verifier = Arc::new(SettlementVerifier::new(
        OnlineChainProvider::new_http(settlement_rpc.clone()),
        store.clone(),
        config.usdc_base_address,
        config.gateway_recipient_address,
        config.confirmation_blocks,
        config.settlement_poll_interval(),
    ));

    let (submitter, payer): (Arc<dyn PaymentSubmitter>, _) = match &config.payer_private_key {
        Some(key) => {
            let wallet =
                WalletSubmitter::new(settlement_rpc, key, config.usdc_base_address)
                    .map_err(AgentError::Submitter)?;
            let payer = wallet.payer();
            (Arc::new(wallet), Some(payer))
        }
        None => {
            warn!(target: "agent", "no payer key configured; running advisory-only");
            (Arc::new(UnfundedSubmitter), None)
        }
    };

    let gateway_url = parse_url(&config.gateway_url)?;
    let pipeline: OnlinePaymentPipeline = PaymentPipeline::new(
        HttpGateway::new(gateway_url),
        verifier,
        submitter,
        ledger.clone(),
        store.clone(),
        payer,
        config.invoice_ttl(),
    );
    let gateway: OnlineGateway = MarketDataGateway::new(pipeline);
    let market: Arc<dyn MarketData> =
        Arc::new(GatewayMarketData::new(gateway, &config.market_pair));

    let mut targets = Vec::with_capacity(config.chains.len());
    for chain in &config.chains {
        let provider = OnlineChainProvider::new_http(parse_url(&chain.rpc_url)?);
        targets.push(ChainTarget::from_config(chain, provider));
    }
    let reader = TreasuryReader::new(targets);
    let engine = MetricEngine::new(config.thresholds);

    let run = Arc::new(AgentRun::new(
        store.clone(),
        reader,
        engine,
        machine.clone(),
        market,
        ledger.clone(),
        config.run_timeout(),
    ));
    let schedule = parse_cron(&config.cron_expression)?;
    let scheduler = Scheduler::new(run, schedule, config.grace_period());
    Ok(Agent { scheduler, store, ledger, machine })
}

fn parse_url(raw: &str) -> Result<Url, AgentError> {
    Url::parse(raw)
        .map_err(|e| AgentError::Config(ConfigError::Invalid(format!("bad url {raw:?}: {e}"))))
}
