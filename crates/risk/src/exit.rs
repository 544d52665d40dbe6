//! Exit half-life at a bounded participation rate.

use sentinel_types::ExitMetric;

/// Hours to liquidate half (and all) of a position of `position_usd`
/// against `daily_volume_usd`, trading at most `participation_rate` of the
/// daily volume.
///
/// `half_life = (P/2) / (V * r) * 24`; infinite (`None`) when the venue has
/// no volume.
pub fn exit_half_life(
    symbol: &str,
    position_usd: f64,
    daily_volume_usd: f64,
    participation_rate: f64,
) -> ExitMetric {
    let sellable_per_day = daily_volume_usd * participation_rate;
    if sellable_per_day <= 0.0 {
        return ExitMetric {
            symbol: symbol.to_string(),
            half_life_hours: None,
            full_exit_hours: None,
        };
    }
    let half_life_hours = (position_usd / 2.0) / sellable_per_day * 24.0;
    ExitMetric {
        symbol: symbol.to_string(),
        half_life_hours: Some(half_life_hours),
        full_exit_hours: Some(half_life_hours * 2.0),
    }
}
