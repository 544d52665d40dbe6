//! Treasury balance snapshots.

use alloy_primitives::{Address, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One token position inside a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenBalance {
    /// Token contract; [`Address::ZERO`] for the chain's native asset.
    pub token: Address,
    /// Token symbol as reported by the contract.
    pub symbol: String,
    /// Token decimals.
    pub decimals: u8,
    /// Raw on-chain balance.
    pub raw_balance: U256,
    /// USD value, when a price was available.
    pub usd_value: Option<f64>,
}

impl TokenBalance {
    /// Balance scaled by the token's decimals.
    pub fn units(&self) -> f64 {
        // f64 loses precision past 2^53 raw units; acceptable for display
        // and risk math, never used for budget arithmetic.
        let raw: f64 = self.raw_balance.to_string().parse().unwrap_or(f64::INFINITY);
        raw / 10f64.powi(self.decimals as i32)
    }
}

/// Balances of one treasury wallet on one chain at one block.
///
/// Append-only. `id` is the snapshot batch shared by every chain read in the
/// same run; rows are keyed by `(id, chain_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreasurySnapshot {
    /// Snapshot batch id.
    pub id: u64,
    /// The run that took this snapshot, when scheduler-driven.
    pub run_id: Option<u64>,
    /// EVM chain id.
    pub chain_id: u64,
    /// Treasury wallet address.
    pub wallet: Address,
    /// Block the balances were read at.
    pub block_number: u64,
    /// Wall-clock read time.
    pub taken_at: DateTime<Utc>,
    /// Native and tracked-token balances.
    pub balances: Vec<TokenBalance>,
}

impl TreasurySnapshot {
    /// Total USD value of the priced positions.
    pub fn total_usd(&self) -> f64 {
        self.balances.iter().filter_map(|b| b.usd_value).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn units_scale_by_decimals() {
        let balance = TokenBalance {
            token: Address::ZERO,
            symbol: "USDC".into(),
            decimals: 6,
            raw_balance: U256::from(2_500_000u64),
            usd_value: Some(2.5),
        };
        assert_eq!(balance.units(), 2.5);
    }

    #[test]
    fn total_usd_skips_unpriced() {
        let snapshot = TreasurySnapshot {
            id: 1,
            run_id: None,
            chain_id: 8453,
            wallet: Address::ZERO,
            block_number: 100,
            taken_at: Utc::now(),
            balances: vec![
                TokenBalance {
                    token: Address::ZERO,
                    symbol: "ETH".into(),
                    decimals: 18,
                    raw_balance: U256::from(10u64).pow(U256::from(18u64)),
                    usd_value: Some(3000.0),
                },
                TokenBalance {
                    token: Address::repeat_byte(0x11),
                    symbol: "XYZ".into(),
                    decimals: 18,
                    raw_balance: U256::from(5u64),
                    usd_value: None,
                },
            ],
        };
        assert_eq!(snapshot.total_usd(), 3000.0);
    }
}
