//! Liquidity coverage ratio.

use sentinel_types::LcrMetric;

/// `HQLA / max(outflows - min(inflows, 0.75 * outflows), 0)`.
///
/// Inflows are capped at 75% of outflows, per the Basel-style formulation.
/// A zero denominator yields an infinite ratio (`ratio: None`), which is
/// always compliant.
pub fn liquidity_coverage(
    hqla_usd: f64,
    projected_outflows_usd: f64,
    projected_inflows_usd: f64,
    compliance_threshold: f64,
) -> LcrMetric {
    let capped_inflows = projected_inflows_usd.min(0.75 * projected_outflows_usd);
    let net_outflows_usd = (projected_outflows_usd - capped_inflows).max(0.0);
    if net_outflows_usd <= 0.0 {
        return LcrMetric { ratio: None, hqla_usd, net_outflows_usd: 0.0, compliant: true };
    }
    let ratio = hqla_usd / net_outflows_usd;
    LcrMetric { ratio: Some(ratio), hqla_usd, net_outflows_usd, compliant: ratio >= compliance_threshold }
}
