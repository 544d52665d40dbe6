//! Adapters wiring the payment stack into the machine's market-data seam.

use alloy_primitives::{Address, B256};
use async_trait::async_trait;
use sentinel_chain::ChainProvider;
use sentinel_machine::{MarketData, MarketDataError, MarketPurchase};
use sentinel_payment::{
    Gateway402, MarketDataEndpoint, MarketDataGateway, PaymentSink, PaymentSubmitter,
    PipelineError,
};
use sentinel_settlement::ConsumedTxStore;
use sentinel_types::MicroUsdc;
use std::collections::BTreeMap;

/// Implements the machine's [`MarketData`] capability over the typed
/// gateway, with the request parameters fixed at composition time.
#[derive(Debug)]
pub struct GatewayMarketData<G, P, C, Sub, K> {
    gateway: MarketDataGateway<G, P, C, Sub, K>,
    params: BTreeMap<String, String>,
}

impl<G, P, C, Sub, K> GatewayMarketData<G, P, C, Sub, K> {
    /// Wraps a gateway, requesting `pair` from every endpoint.
    pub fn new(gateway: MarketDataGateway<G, P, C, Sub, K>, pair: &str) -> Self {
        let params = BTreeMap::from([("pair".to_string(), pair.to_string())]);
        Self { gateway, params }
    }
}

#[async_trait]
impl<G, P, C, Sub, K> MarketData for GatewayMarketData<G, P, C, Sub, K>
where
    G: Gateway402,
    P: ChainProvider + Send + Sync,
    C: ConsumedTxStore,
    Sub: PaymentSubmitter,
    K: PaymentSink,
{
    async fn fetch(
        &self,
        endpoint: &str,
        run_id: Option<u64>,
    ) -> Result<MarketPurchase, MarketDataError> {
        let Some(endpoint_kind) = MarketDataEndpoint::from_name(endpoint) else {
            return Err(MarketDataError::Failed(format!("unknown endpoint {endpoint}")));
        };
        match self.gateway.fetch(endpoint_kind, &self.params, run_id).await {
            Ok(outcome) => Ok(MarketPurchase {
                endpoint: endpoint.to_string(),
                body: outcome.body,
                invoice_id: outcome.invoice_id,
                cost: outcome.cost,
            }),
            Err(PipelineError::BudgetBlocked) => Err(MarketDataError::BudgetBlocked),
            Err(err) => Err(MarketDataError::Failed(err.to_string())),
        }
    }
}

/// Stands in for the wallet when no payer key is configured: the agent
/// stays advisory-only and paid transitions fail at submission.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnfundedSubmitter;

#[async_trait]
impl PaymentSubmitter for UnfundedSubmitter {
    async fn submit_usdc_transfer(
        &self,
        _to: Address,
        _amount: MicroUsdc,
    ) -> Result<B256, String> {
        Err("no payer key configured".to_string())
    }
}
