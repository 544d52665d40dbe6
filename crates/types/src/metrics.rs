//! Risk metric structures attached to runs.
//!
//! All values here are produced by the metric engine as pure functions of a
//! snapshot plus optional market data; `None` consistently means "the input
//! needed to compute this was not available".

use serde::{Deserialize, Serialize};

/// Annualized-volatility regime buckets.
///
/// Ordered; boundary values classify downward (an annualized volatility of
/// exactly 0.30 is `Normal`).
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    derive_more::Display,
)]
#[serde(rename_all = "snake_case")]
pub enum VolatilityRegime {
    /// Annualized volatility ≤ 0.15.
    #[display("LOW")]
    Low,
    /// ≤ 0.30.
    #[display("NORMAL")]
    Normal,
    /// ≤ 0.50.
    #[display("ELEVATED")]
    Elevated,
    /// ≤ 0.80.
    #[display("HIGH")]
    High,
    /// Above 0.80.
    #[display("EXTREME")]
    Extreme,
}

/// Liquidity coverage ratio.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LcrMetric {
    /// HQLA over net 30-day outflows. `None` when outflows are zero (the
    /// ratio is infinite).
    pub ratio: Option<f64>,
    /// High-quality liquid assets, USD.
    pub hqla_usd: f64,
    /// Net projected outflows, USD.
    pub net_outflows_usd: f64,
    /// Whether the ratio meets the compliance threshold.
    pub compliant: bool,
}

impl LcrMetric {
    /// Ratio with infinity restored for comparisons.
    pub fn ratio_or_inf(&self) -> f64 {
        self.ratio.unwrap_or(f64::INFINITY)
    }
}

/// Time to unwind one position at a bounded participation rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitMetric {
    /// Token symbol the position is denominated in.
    pub symbol: String,
    /// Hours to liquidate half the position. `None` when daily volume is
    /// zero (no exit is possible).
    pub half_life_hours: Option<f64>,
    /// Hours to liquidate the full position.
    pub full_exit_hours: Option<f64>,
}

/// Realized volatility and its regime bucket.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolatilityMetric {
    /// Annualized standard deviation of log returns.
    pub annualized: f64,
    /// Bucketed regime.
    pub regime: VolatilityRegime,
}

/// Aggregate notional liquidity within a band around mid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DepthBand {
    /// Band width as a percentage from mid price.
    pub pct_from_mid: f64,
    /// Bid-side notional inside the band, USD.
    pub bid_notional: f64,
    /// Ask-side notional inside the band, USD.
    pub ask_notional: f64,
}

/// One point on the impact curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImpactPoint {
    /// Target trade notional, USD.
    pub notional: f64,
    /// Volume-weighted execution price over the walked book.
    pub execution_price: f64,
    /// `(execution - mid) / mid`.
    pub slippage: f64,
    /// Whether the book fully absorbed the target size.
    pub filled: bool,
}

/// Slippage as a function of trade size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpactCurve {
    /// One point per target size.
    pub points: Vec<ImpactPoint>,
    /// Largest target size the book fully filled, USD.
    pub max_tradeable: f64,
}

/// Composite risk bucket.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    derive_more::Display,
)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    /// Score ≤ 25.
    #[display("LOW")]
    Low,
    /// ≤ 50.
    #[display("MEDIUM")]
    Medium,
    /// ≤ 75.
    #[display("HIGH")]
    High,
    /// Above 75.
    #[display("CRITICAL")]
    Critical,
}

/// The 0–100 composite score and its bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskScore {
    /// 40 points from LCR, 30 from exit half-life, 30 from volatility.
    pub score: u8,
    /// Bucketed level.
    pub level: RiskLevel,
}

/// The full metric set computed for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskMetrics {
    /// Liquidity coverage.
    pub lcr: LcrMetric,
    /// Per-position exit estimates.
    pub exits: Vec<ExitMetric>,
    /// Volatility regime, when a return series was available.
    pub volatility: Option<VolatilityMetric>,
    /// Depth bands, when an order book was purchased.
    pub depth: Option<Vec<DepthBand>>,
    /// Impact curve, when an order book was purchased.
    pub impact: Option<ImpactCurve>,
    /// Composite score.
    pub score: RiskScore,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regimes_are_ordered() {
        assert!(VolatilityRegime::Low < VolatilityRegime::Normal);
        assert!(VolatilityRegime::High < VolatilityRegime::Extreme);
    }

    #[test]
    fn infinite_lcr_serializes_as_null() {
        let lcr = LcrMetric { ratio: None, hqla_usd: 10.0, net_outflows_usd: 0.0, compliant: true };
        let json = serde_json::to_string(&lcr).unwrap();
        assert!(json.contains("\"ratio\":null"));
        let back: LcrMetric = serde_json::from_str(&json).unwrap();
        assert_eq!(back.ratio_or_inf(), f64::INFINITY);
    }
}
