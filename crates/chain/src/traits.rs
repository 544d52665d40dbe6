//! The chain access seam consumed by the treasury reader and the
//! settlement verifier.

use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;

/// A decoded ERC-20 Transfer observed on chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferLog {
    /// Transaction that emitted the event.
    pub tx_hash: B256,
    /// Block the transaction landed in.
    pub block_number: u64,
    /// Token contract that emitted the event.
    pub token: Address,
    /// Transfer sender.
    pub from: Address,
    /// Transfer recipient.
    pub to: Address,
    /// Raw transfer amount.
    pub value: U256,
}

/// A transaction receipt reduced to what settlement verification needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptInfo {
    /// The transaction hash.
    pub tx_hash: B256,
    /// Whether execution succeeded.
    pub success: bool,
    /// Block the transaction landed in.
    pub block_number: u64,
    /// Transfer events of the settlement token emitted by this transaction.
    pub transfers: Vec<TransferLog>,
}

/// Read access to one EVM chain.
///
/// Implementations retry transient transport failures internally; an `Err`
/// means retries are exhausted and the caller should fail the current
/// operation (the next scheduled tick is the retry).
#[async_trait]
pub trait ChainProvider {
    /// Provider error type.
    type Error: core::fmt::Display + Send + Sync;

    /// Latest block number.
    async fn block_number(&self) -> Result<u64, Self::Error>;

    /// Native asset balance of `owner`.
    async fn native_balance(&self, owner: Address) -> Result<U256, Self::Error>;

    /// ERC-20 balance of `owner` on `token`.
    async fn erc20_balance(&self, token: Address, owner: Address) -> Result<U256, Self::Error>;

    /// `(symbol, decimals)` of `token`.
    async fn erc20_metadata(&self, token: Address) -> Result<(String, u8), Self::Error>;

    /// Receipt for `tx_hash` with Transfer events of `token` decoded, or
    /// `None` when the transaction is unknown.
    async fn transaction_receipt(
        &self,
        tx_hash: B256,
        token: Address,
    ) -> Result<Option<ReceiptInfo>, Self::Error>;

    /// Transfer events of `token` in the inclusive block range.
    async fn transfer_logs(
        &self,
        token: Address,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<TransferLog>, Self::Error>;
}
