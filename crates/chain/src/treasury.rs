//! Multi-chain treasury snapshots.

use crate::{ChainError, ChainProvider};
use alloy_primitives::Address;
use chrono::Utc;
use futures::future::try_join_all;
use sentinel_types::{ChainConfig, TokenBalance, TreasurySnapshot};

/// One chain the reader snapshots.
#[derive(Debug, Clone)]
pub struct ChainTarget<P> {
    /// EVM chain id.
    pub chain_id: u64,
    /// Treasury wallet.
    pub wallet: Address,
    /// Tracked ERC-20 contracts.
    pub tokens: Vec<Address>,
    /// Chain access.
    pub provider: P,
}

impl<P> ChainTarget<P> {
    /// Builds a target from its config entry and a provider for its RPC.
    pub fn from_config(cfg: &ChainConfig, provider: P) -> Self {
        Self {
            chain_id: cfg.chain_id,
            wallet: cfg.treasury_address,
            tokens: cfg.tracked_tokens.clone(),
            provider,
        }
    }
}

/// Reads balances across every configured chain.
#[derive(Debug)]
pub struct TreasuryReader<P> {
    targets: Vec<ChainTarget<P>>,
}

impl<P> TreasuryReader<P>
where
    P: ChainProvider + Send + Sync,
{
    /// Creates a reader over the given targets.
    pub fn new(targets: Vec<ChainTarget<P>>) -> Self {
        Self { targets }
    }

    /// Number of monitored chains.
    pub fn chain_count(&self) -> usize {
        self.targets.len()
    }

    /// Snapshots every chain concurrently, one snapshot row per chain
    /// sharing `snapshot_id`. Any chain failing fails the whole read; the
    /// next scheduled tick is the retry.
    pub async fn snapshot_all(
        &self,
        snapshot_id: u64,
        run_id: Option<u64>,
    ) -> Result<Vec<TreasurySnapshot>, ChainError> {
        // Fan-out bounded by the chain count.
        try_join_all(self.targets.iter().map(|t| snapshot_target(t, snapshot_id, run_id))).await
    }
}

async fn snapshot_target<P: ChainProvider>(
    target: &ChainTarget<P>,
    snapshot_id: u64,
    run_id: Option<u64>,
) -> Result<TreasurySnapshot, ChainError> {
    let block_number = target.provider.block_number().await.map_err(ChainError::rpc)?;
    let native =
        target.provider.native_balance(target.wallet).await.map_err(ChainError::rpc)?;

    let mut balances = vec![TokenBalance {
        token: Address::ZERO,
        symbol: "ETH".to_string(),
        decimals: 18,
        raw_balance: native,
        usd_value: None,
    }];
    for token in &target.tokens {
        let (symbol, decimals) =
            target.provider.erc20_metadata(*token).await.map_err(ChainError::rpc)?;
        let raw_balance =
            target.provider.erc20_balance(*token, target.wallet).await.map_err(ChainError::rpc)?;
        let mut balance =
            TokenBalance { token: *token, symbol, decimals, raw_balance, usd_value: None };
        balance.usd_value = stable_usd(&balance.symbol, balance.units());
        balances.push(balance);
    }

    debug!(
        target: "treasury",
        chain_id = target.chain_id,
        block_number,
        positions = balances.len(),
        "snapshot taken"
    );
    Ok(TreasurySnapshot {
        id: snapshot_id,
        run_id,
        chain_id: target.chain_id,
        wallet: target.wallet,
        block_number,
        taken_at: Utc::now(),
        balances,
    })
}

/// Dollar-pegged stables are priced 1:1 without market data; everything
/// else waits for a purchased spot price.
fn stable_usd(symbol: &str, units: f64) -> Option<f64> {
    matches!(symbol, "USDC" | "USDbC" | "USDT" | "DAI").then_some(units)
}
