//! Fakes and metric fixtures for machine and agent tests.

use crate::{MarketData, MarketDataError, MarketPurchase};
use async_trait::async_trait;
use sentinel_budget::BudgetLedger;
use sentinel_types::{
    DepthBand, LcrMetric, MicroUsdc, RiskLevel, RiskMetrics, RiskScore, VolatilityMetric,
    VolatilityRegime,
};
use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

/// A scripted [`MarketData`] source. When given a ledger it mirrors the
/// real pipeline's accounting: the delivered cost is reserved and
/// committed on the shared budget.
#[derive(Debug, Default)]
pub struct TestMarketData {
    ledger: Option<Arc<BudgetLedger>>,
    script: Mutex<VecDeque<Result<MarketPurchase, MarketDataError>>>,
    calls: Mutex<Vec<String>>,
}

impl TestMarketData {
    /// A source that commits delivered costs on `ledger`.
    pub fn with_ledger(ledger: Arc<BudgetLedger>) -> Self {
        Self { ledger: Some(ledger), ..Self::default() }
    }

    /// Queues a delivered purchase.
    pub fn push_purchase(&self, endpoint: &str, cost: MicroUsdc, invoice_id: &str) {
        self.script.lock().expect("market script lock poisoned").push_back(Ok(MarketPurchase {
            endpoint: endpoint.to_string(),
            body: b"{}".to_vec().into(),
            invoice_id: Some(invoice_id.to_string()),
            cost,
        }));
    }

    /// Queues a failure.
    pub fn push_err(&self, err: MarketDataError) {
        self.script.lock().expect("market script lock poisoned").push_back(Err(err));
    }

    /// Endpoints fetched so far.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("market calls lock poisoned").clone()
    }
}

#[async_trait]
impl MarketData for TestMarketData {
    async fn fetch(
        &self,
        endpoint: &str,
        _run_id: Option<u64>,
    ) -> Result<MarketPurchase, MarketDataError> {
        self.calls.lock().expect("market calls lock poisoned").push(endpoint.to_string());
        let scripted = self
            .script
            .lock()
            .expect("market script lock poisoned")
            .pop_front()
            .unwrap_or_else(|| {
                Ok(MarketPurchase {
                    endpoint: endpoint.to_string(),
                    body: b"{}".to_vec().into(),
                    invoice_id: None,
                    cost: 0,
                })
            });
        let purchase = scripted?;
        if purchase.cost > 0 {
            if let Some(ledger) = &self.ledger {
                let handle =
                    ledger.reserve(purchase.cost).map_err(|_| MarketDataError::BudgetBlocked)?;
                ledger.commit(&handle).map_err(|e| MarketDataError::Failed(e.to_string()))?;
            }
        }
        Ok(purchase)
    }
}

/// Metrics with nothing of interest: infinite LCR, no market data.
pub fn calm_metrics() -> RiskMetrics {
    RiskMetrics {
        lcr: LcrMetric { ratio: None, hqla_usd: 0.0, net_outflows_usd: 0.0, compliant: true },
        exits: vec![],
        volatility: None,
        depth: None,
        impact: None,
        score: RiskScore { score: 0, level: RiskLevel::Low },
    }
}

/// Metrics with the given LCR ratio and volatility regime.
pub fn metrics_with(lcr_ratio: Option<f64>, regime: Option<VolatilityRegime>) -> RiskMetrics {
    let mut metrics = calm_metrics();
    metrics.lcr.ratio = lcr_ratio;
    metrics.lcr.compliant = lcr_ratio.is_none_or(|r| r >= 1.0);
    metrics.volatility =
        regime.map(|regime| VolatilityMetric { annualized: 0.4, regime });
    metrics
}

/// Adds a half-percent depth band with the given total notional.
pub fn with_depth(mut metrics: RiskMetrics, half_pct_notional: f64) -> RiskMetrics {
    metrics.depth = Some(vec![DepthBand {
        pct_from_mid: 0.5,
        bid_notional: half_pct_notional / 2.0,
        ask_notional: half_pct_notional / 2.0,
    }]);
    metrics
}
