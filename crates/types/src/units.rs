//! Integer micro-USDC units used for all budget arithmetic.
//!
//! Budget-affecting quantities are always integer µUSDC so that repeated
//! additions never drift. Prices and ratios stay [`f64`].

/// Integer micro-USDC. 1 USDC = 1_000_000 µUSDC.
pub type MicroUsdc = u64;

/// Number of µUSDC in one USDC (USDC has 6 decimals on Base).
pub const MICRO_PER_USDC: MicroUsdc = 1_000_000;

/// Converts a USDC amount into µUSDC, rounding to the nearest unit.
///
/// Negative and non-finite inputs clamp to zero.
pub fn micro_from_usdc(usdc: f64) -> MicroUsdc {
    if !usdc.is_finite() || usdc <= 0.0 {
        return 0;
    }
    (usdc * MICRO_PER_USDC as f64).round() as MicroUsdc
}

/// Converts µUSDC back into a USDC amount for display and pricing math.
pub fn usdc_from_micro(micro: MicroUsdc) -> f64 {
    micro as f64 / MICRO_PER_USDC as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_whole_usdc() {
        assert_eq!(micro_from_usdc(10.0), 10_000_000);
        assert_eq!(usdc_from_micro(10_000_000), 10.0);
    }

    #[test]
    fn rounds_fractional_units() {
        assert_eq!(micro_from_usdc(0.05), 50_000);
        assert_eq!(micro_from_usdc(0.25), 250_000);
        // Sub-µUSDC fractions round to the nearest unit.
        assert_eq!(micro_from_usdc(0.000_000_4), 0);
        assert_eq!(micro_from_usdc(0.000_000_6), 1);
    }

    #[test]
    fn clamps_invalid_inputs() {
        assert_eq!(micro_from_usdc(-1.0), 0);
        assert_eq!(micro_from_usdc(f64::NAN), 0);
        assert_eq!(micro_from_usdc(f64::INFINITY), 0);
    }
}
