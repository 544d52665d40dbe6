//! The market-data capability the machine consumes for paid transitions.
//!
//! Defined here and implemented by the composition root over the payment
//! gateway, so the machine never depends on the payment stack.

use alloy_primitives::Bytes;
use async_trait::async_trait;
use sentinel_types::MicroUsdc;
use thiserror::Error;

/// A delivered, settled market-data purchase.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketPurchase {
    /// Endpoint that was bought.
    pub endpoint: String,
    /// The data payload.
    pub body: Bytes,
    /// Invoice settled for this purchase; `None` for cached or free
    /// responses.
    pub invoice_id: Option<String>,
    /// Spend committed, µUSDC.
    pub cost: MicroUsdc,
}

/// Why a purchase failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MarketDataError {
    /// The budget cannot cover the invoice; the machine redirects to
    /// BUDGET_BLOCKED.
    #[error("budget blocked")]
    BudgetBlocked,
    /// Any other pipeline failure; the transition fails and the
    /// reservation is released.
    #[error("market data fetch failed: {0}")]
    Failed(String),
}

/// Paid market-data access.
#[async_trait]
pub trait MarketData: Send + Sync {
    /// Buys `endpoint`, attributing spend to `run_id`.
    async fn fetch(
        &self,
        endpoint: &str,
        run_id: Option<u64>,
    ) -> Result<MarketPurchase, MarketDataError>;
}
