//! Composite risk scoring.

use sentinel_types::{ExitMetric, LcrMetric, RiskLevel, RiskScore, VolatilityMetric};

/// 40 points from the LCR bucket, 30 from the average exit half-life
/// bucket, 30 from the volatility regime bucket.
pub fn risk_score(
    lcr: &LcrMetric,
    exits: &[ExitMetric],
    volatility: Option<&VolatilityMetric>,
) -> RiskScore {
    let score = lcr_points(lcr) + exit_points(exits) + volatility_points(volatility);
    RiskScore { score, level: level_for(score) }
}

fn lcr_points(lcr: &LcrMetric) -> u8 {
    let ratio = lcr.ratio_or_inf();
    if ratio >= 1.5 {
        0
    } else if ratio >= 1.25 {
        10
    } else if ratio >= 1.0 {
        20
    } else if ratio >= 0.75 {
        30
    } else {
        40
    }
}

fn exit_points(exits: &[ExitMetric]) -> u8 {
    if exits.is_empty() {
        return 0;
    }
    // An infinite half-life dominates the average.
    if exits.iter().any(|e| e.half_life_hours.is_none()) {
        return 30;
    }
    let sum: f64 = exits.iter().filter_map(|e| e.half_life_hours).sum();
    let average = sum / exits.len() as f64;
    if average <= 24.0 {
        0
    } else if average <= 72.0 {
        10
    } else if average <= 168.0 {
        20
    } else {
        30
    }
}

fn volatility_points(volatility: Option<&VolatilityMetric>) -> u8 {
    use sentinel_types::VolatilityRegime::*;
    match volatility.map(|v| v.regime) {
        None | Some(Low) => 0,
        Some(Normal) => 7,
        Some(Elevated) => 15,
        Some(High) => 22,
        Some(Extreme) => 30,
    }
}

const fn level_for(score: u8) -> RiskLevel {
    if score <= 25 {
        RiskLevel::Low
    } else if score <= 50 {
        RiskLevel::Medium
    } else if score <= 75 {
        RiskLevel::High
    } else {
        RiskLevel::Critical
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_types::VolatilityRegime;

    fn lcr(ratio: Option<f64>) -> LcrMetric {
        LcrMetric {
            ratio,
            hqla_usd: 0.0,
            net_outflows_usd: 0.0,
            compliant: ratio.is_none_or(|r| r >= 1.0),
        }
    }

    fn exit(hours: Option<f64>) -> ExitMetric {
        ExitMetric {
            symbol: "ETH".into(),
            half_life_hours: hours,
            full_exit_hours: hours.map(|h| h * 2.0),
        }
    }

    fn vol(regime: VolatilityRegime) -> VolatilityMetric {
        VolatilityMetric { annualized: 0.0, regime }
    }

    #[test]
    fn healthy_treasury_scores_low() {
        let score = risk_score(&lcr(None), &[exit(Some(2.0))], Some(&vol(VolatilityRegime::Low)));
        assert_eq!(score.score, 0);
        assert_eq!(score.level, RiskLevel::Low);
    }

    #[test]
    fn worst_case_scores_hundred() {
        let score = risk_score(
            &lcr(Some(0.3)),
            &[exit(None)],
            Some(&vol(VolatilityRegime::Extreme)),
        );
        assert_eq!(score.score, 100);
        assert_eq!(score.level, RiskLevel::Critical);
    }

    #[test]
    fn level_boundaries_classify_downward() {
        assert_eq!(level_for(25), RiskLevel::Low);
        assert_eq!(level_for(26), RiskLevel::Medium);
        assert_eq!(level_for(50), RiskLevel::Medium);
        assert_eq!(level_for(51), RiskLevel::High);
        assert_eq!(level_for(75), RiskLevel::High);
        assert_eq!(level_for(76), RiskLevel::Critical);
    }

    #[test]
    fn infinite_half_life_takes_the_full_exit_bucket() {
        let score = risk_score(&lcr(None), &[exit(Some(1.0)), exit(None)], None);
        assert_eq!(score.score, 30);
    }

    #[test]
    fn missing_market_data_contributes_no_volatility_points() {
        let score = risk_score(&lcr(Some(1.3)), &[], None);
        assert_eq!(score.score, 10);
        assert_eq!(score.level, RiskLevel::Low);
    }
}
