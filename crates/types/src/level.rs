//! The escalation ladder.

use serde::{Deserialize, Serialize};

/// A rung on the escalation ladder, or the off-ladder budget sink.
///
/// The six regular levels form a total order given by [`Level::rank`].
/// [`Level::BudgetBlocked`] sits outside the ladder: it is reachable from any
/// paid level when the remaining budget falls below the operational minimum,
/// and exits only back to [`Level::Monitor`] once budget is restored.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display,
)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    /// L0: nothing of interest observed; balances only.
    #[display("L0_IDLE")]
    Idle,
    /// L1: normal periodic monitoring.
    #[display("L1_MONITOR")]
    Monitor,
    /// L2: local risk signals crossed a threshold.
    #[display("L2_ALERT")]
    Alert,
    /// L3: paid market data justified and fetched.
    #[display("L3_MARKET_DATA")]
    MarketData,
    /// L4: liquidity coverage below the critical line.
    #[display("L4_CRITICAL")]
    Critical,
    /// L5: order-book depth crisis.
    #[display("L5_EMERGENCY")]
    Emergency,
    /// Off-ladder sink: remaining budget below the operational minimum.
    #[display("BUDGET_BLOCKED")]
    BudgetBlocked,
}

impl Level {
    /// The regular ladder, lowest first.
    pub const LADDER: [Self; 6] = [
        Self::Idle,
        Self::Monitor,
        Self::Alert,
        Self::MarketData,
        Self::Critical,
        Self::Emergency,
    ];

    /// Position on the 0..=5 ladder; `None` for [`Self::BudgetBlocked`].
    pub const fn rank(&self) -> Option<u8> {
        match self {
            Self::Idle => Some(0),
            Self::Monitor => Some(1),
            Self::Alert => Some(2),
            Self::MarketData => Some(3),
            Self::Critical => Some(4),
            Self::Emergency => Some(5),
            Self::BudgetBlocked => None,
        }
    }

    /// The level at a given ladder position.
    pub const fn from_rank(rank: u8) -> Option<Self> {
        match rank {
            0 => Some(Self::Idle),
            1 => Some(Self::Monitor),
            2 => Some(Self::Alert),
            3 => Some(Self::MarketData),
            4 => Some(Self::Critical),
            5 => Some(Self::Emergency),
            _ => None,
        }
    }

    /// Whether this is one of the six regular ladder levels.
    pub const fn on_ladder(&self) -> bool {
        !matches!(self, Self::BudgetBlocked)
    }

    /// The next rung up, if any.
    pub const fn above(&self) -> Option<Self> {
        match self.rank() {
            Some(r) => Self::from_rank(r + 1),
            None => None,
        }
    }

    /// The next rung down, if any.
    pub const fn below(&self) -> Option<Self> {
        match self.rank() {
            Some(0) | None => None,
            Some(r) => Self::from_rank(r - 1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ladder_is_totally_ordered() {
        for (i, level) in Level::LADDER.iter().enumerate() {
            assert_eq!(level.rank(), Some(i as u8));
            assert_eq!(Level::from_rank(i as u8), Some(*level));
        }
        assert_eq!(Level::BudgetBlocked.rank(), None);
        assert_eq!(Level::from_rank(6), None);
    }

    #[test]
    fn neighbours() {
        assert_eq!(Level::Idle.above(), Some(Level::Monitor));
        assert_eq!(Level::Emergency.above(), None);
        assert_eq!(Level::Idle.below(), None);
        assert_eq!(Level::Emergency.below(), Some(Level::Critical));
        assert_eq!(Level::BudgetBlocked.above(), None);
        assert_eq!(Level::BudgetBlocked.below(), None);
    }

    #[test]
    fn serde_names_are_stable() {
        let json = serde_json::to_string(&Level::MarketData).unwrap();
        assert_eq!(json, "\"market_data\"");
        let back: Level = serde_json::from_str("\"budget_blocked\"").unwrap();
        assert_eq!(back, Level::BudgetBlocked);
    }

    #[test]
    fn display_uses_ladder_names() {
        assert_eq!(Level::Alert.to_string(), "L2_ALERT");
        assert_eq!(Level::BudgetBlocked.to_string(), "BUDGET_BLOCKED");
    }
}
