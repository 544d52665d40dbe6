//! Realized volatility and regime bucketing.

use sentinel_types::VolatilityRegime;

/// Days used to annualize crypto return series.
const ANNUALIZATION_DAYS: f64 = 365.0;

/// Annualized standard deviation of log returns over a daily price series,
/// oldest first. `None` with fewer than three samples or any non-positive
/// price.
pub fn annualized_volatility(prices: &[f64]) -> Option<f64> {
    if prices.len() < 3 || prices.iter().any(|p| *p <= 0.0) {
        return None;
    }
    let returns: Vec<f64> = prices.windows(2).map(|w| (w[1] / w[0]).ln()).collect();
    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    // Sample variance.
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
    Some(variance.sqrt() * ANNUALIZATION_DAYS.sqrt())
}

/// Buckets an annualized volatility. Boundary values classify downward: an
/// annualized volatility of exactly 0.30 is `Normal`.
pub fn regime_for(annualized: f64) -> VolatilityRegime {
    if annualized <= 0.15 {
        VolatilityRegime::Low
    } else if annualized <= 0.30 {
        VolatilityRegime::Normal
    } else if annualized <= 0.50 {
        VolatilityRegime::Elevated
    } else if annualized <= 0.80 {
        VolatilityRegime::High
    } else {
        VolatilityRegime::Extreme
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_series_has_zero_volatility() {
        let vol = annualized_volatility(&[100.0, 100.0, 100.0, 100.0]).unwrap();
        assert_eq!(vol, 0.0);
        assert_eq!(regime_for(vol), VolatilityRegime::Low);
    }

    #[test]
    fn short_or_invalid_series_is_rejected() {
        assert_eq!(annualized_volatility(&[100.0, 101.0]), None);
        assert_eq!(annualized_volatility(&[100.0, -1.0, 101.0]), None);
        assert_eq!(annualized_volatility(&[]), None);
    }

    #[test]
    fn volatile_series_annualizes() {
        // Alternating ±5% daily moves annualize well into EXTREME.
        let prices = [100.0, 105.0, 99.75, 104.7375, 99.5006, 104.4757];
        let vol = annualized_volatility(&prices).unwrap();
        assert!(vol > 0.8, "expected extreme volatility, got {vol}");
        assert_eq!(regime_for(vol), VolatilityRegime::Extreme);
    }

    #[test]
    fn boundaries_classify_downward() {
        assert_eq!(regime_for(0.15), VolatilityRegime::Low);
        assert_eq!(regime_for(0.30), VolatilityRegime::Normal);
        assert_eq!(regime_for(0.50), VolatilityRegime::Elevated);
        assert_eq!(regime_for(0.80), VolatilityRegime::High);
        assert_eq!(regime_for(0.800001), VolatilityRegime::Extreme);
    }
}
