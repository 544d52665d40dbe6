//! The metric engine: assembles the full [`RiskMetrics`] set for a run.

use crate::{
    OrderBook, annualized_volatility, depth_bands, exit_half_life, impact_curve,
    liquidity_coverage, regime_for, risk_score,
};
use sentinel_types::{RiskMetrics, RiskThresholds, TreasurySnapshot, VolatilityMetric};
use std::collections::BTreeMap;

/// Market data purchased for (or carried into) a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarketObservations {
    /// Daily closes, oldest first.
    pub price_series: Vec<f64>,
    /// Daily traded volume per symbol, USD.
    pub daily_volume_usd: BTreeMap<String, f64>,
    /// Purchased order book.
    pub order_book: Option<OrderBook>,
}

/// Computes risk metrics as a pure function of snapshots plus optional
/// market observations.
#[derive(Debug, Clone)]
pub struct MetricEngine {
    thresholds: RiskThresholds,
}

impl MetricEngine {
    /// Creates an engine with the given guard thresholds.
    pub const fn new(thresholds: RiskThresholds) -> Self {
        Self { thresholds }
    }

    /// The full metric set for one run.
    pub fn compute(
        &self,
        snapshots: &[TreasurySnapshot],
        market: Option<&MarketObservations>,
    ) -> RiskMetrics {
        let total_usd: f64 = snapshots.iter().map(TreasurySnapshot::total_usd).sum();

        let hqla_usd: f64 = snapshots
            .iter()
            .flat_map(|snapshot| &snapshot.balances)
            .filter_map(|balance| {
                let usd = balance.usd_value?;
                Some(if is_stable(&balance.symbol) {
                    usd
                } else {
                    usd * self.thresholds.hqla_haircut
                })
            })
            .sum();
        let lcr = liquidity_coverage(
            hqla_usd,
            total_usd * self.thresholds.outflow_rate,
            total_usd * self.thresholds.inflow_rate,
            self.thresholds.lcr_critical,
        );

        // Exit estimates only for positions whose venue volume is known;
        // an unobserved venue says nothing about exit speed.
        let exits = snapshots
            .iter()
            .flat_map(|snapshot| &snapshot.balances)
            .filter(|balance| !is_stable(&balance.symbol))
            .filter_map(|balance| {
                let usd = balance.usd_value?;
                let volume =
                    *market?.daily_volume_usd.get(&balance.symbol)?;
                Some(exit_half_life(
                    &balance.symbol,
                    usd,
                    volume,
                    self.thresholds.participation_rate,
                ))
            })
            .collect::<Vec<_>>();

        let volatility = market
            .and_then(|m| annualized_volatility(&m.price_series))
            .map(|annualized| VolatilityMetric { annualized, regime: regime_for(annualized) });

        let book = market.and_then(|m| m.order_book.as_ref());
        let depth = book.and_then(depth_bands);
        let impact = book.and_then(impact_curve);

        let score = risk_score(&lcr, &exits, volatility.as_ref());
        RiskMetrics { lcr, exits, volatility, depth, impact, score }
    }
}

fn is_stable(symbol: &str) -> bool {
    matches!(symbol, "USDC" | "USDbC" | "USDT" | "DAI")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BookLevel;
    use sentinel_types::TokenBalance;

    fn snapshot_fixture(balances: Vec<(&str, f64, bool)>) -> TreasurySnapshot {
        TreasurySnapshot {
            id: 1,
            run_id: None,
            chain_id: 8453,
            wallet: Default::default(),
            block_number: 100,
            taken_at: chrono::Utc::now(),
            balances: balances
                .into_iter()
                .map(|(symbol, usd, priced)| TokenBalance {
                    token: Default::default(),
                    symbol: symbol.to_string(),
                    decimals: 18,
                    raw_balance: Default::default(),
                    usd_value: priced.then_some(usd),
                })
                .collect(),
        }
    }

    fn engine() -> MetricEngine {
        MetricEngine::new(RiskThresholds::default())
    }

    #[test]
    fn stable_only_treasury_is_comfortably_covered() {
        let snapshot = snapshot_fixture(vec![("USDC", 1_000_000.0, true)]);
        let metrics = engine().compute(&[snapshot], None);
        // HQLA 1M against 25% projected outflows: ratio 4.0.
        assert_eq!(metrics.lcr.ratio, Some(4.0));
        assert!(metrics.lcr.compliant);
        assert!(metrics.exits.is_empty());
        assert_eq!(metrics.volatility, None);
        assert_eq!(metrics.depth, None);
    }

    #[test]
    fn haircut_applies_to_non_stables() {
        let snapshot =
            snapshot_fixture(vec![("USDC", 100.0, true), ("ETH", 100.0, true)]);
        let metrics = engine().compute(&[snapshot], None);
        assert_eq!(metrics.lcr.hqla_usd, 185.0);
    }

    #[test]
    fn unpriced_positions_are_excluded() {
        let snapshot =
            snapshot_fixture(vec![("USDC", 100.0, true), ("XYZ", 999.0, false)]);
        let metrics = engine().compute(&[snapshot], None);
        assert_eq!(metrics.lcr.hqla_usd, 100.0);
    }

    #[test]
    fn market_data_fills_in_the_paid_metrics() {
        let snapshot =
            snapshot_fixture(vec![("USDC", 500_000.0, true), ("ETH", 500_000.0, true)]);
        let market = MarketObservations {
            price_series: vec![100.0, 102.0, 99.0, 103.0, 98.0, 104.0],
            daily_volume_usd: BTreeMap::from([("ETH".to_string(), 1_000_000.0)]),
            order_book: Some(OrderBook {
                bids: vec![BookLevel { price: 99.0, amount: 1000.0 }],
                asks: vec![BookLevel { price: 101.0, amount: 1000.0 }],
            }),
        };
        let metrics = engine().compute(&[snapshot], Some(&market));
        assert!(metrics.volatility.is_some());
        assert_eq!(metrics.depth.as_ref().map(Vec::len), Some(6));
        assert!(metrics.impact.is_some());
        assert_eq!(metrics.exits.len(), 1);
        // 500k position at 10% of 1M daily volume: 60-hour half-life.
        assert_eq!(metrics.exits[0].half_life_hours, Some(60.0));
    }

    #[test]
    fn empty_snapshot_set_is_infinite_lcr() {
        let metrics = engine().compute(&[], None);
        assert_eq!(metrics.lcr.ratio, None);
        assert!(metrics.lcr.compliant);
        assert_eq!(metrics.score.score, 0);
    }
}
