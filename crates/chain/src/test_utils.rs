//! In-memory chain fake shared by settlement, payment, and agent tests.

use crate::{ChainError, ChainProvider, ReceiptInfo, TransferLog};
use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

#[derive(Debug, Default)]
struct State {
    block_number: u64,
    native: HashMap<Address, U256>,
    erc20_meta: HashMap<Address, (String, u8)>,
    erc20_balances: HashMap<(Address, Address), U256>,
    receipts: HashMap<B256, ReceiptInfo>,
    transfers: Vec<TransferLog>,
    fail_with: Option<String>,
    latency: Option<Duration>,
}

/// A programmable [`ChainProvider`].
#[derive(Debug, Default, Clone)]
pub struct TestChainProvider {
    inner: Arc<Mutex<State>>,
}

impl TestChainProvider {
    /// Sets the latest block number.
    pub fn set_block_number(&self, block_number: u64) {
        self.inner.lock().unwrap().block_number = block_number;
    }

    /// Advances the latest block number.
    pub fn advance_blocks(&self, blocks: u64) {
        self.inner.lock().unwrap().block_number += blocks;
    }

    /// Sets a native balance.
    pub fn set_native_balance(&self, owner: Address, balance: U256) {
        self.inner.lock().unwrap().native.insert(owner, balance);
    }

    /// Registers an ERC-20 token's metadata.
    pub fn set_erc20(&self, token: Address, symbol: &str, decimals: u8) {
        self.inner.lock().unwrap().erc20_meta.insert(token, (symbol.to_string(), decimals));
    }

    /// Sets an ERC-20 balance.
    pub fn set_erc20_balance(&self, token: Address, owner: Address, balance: U256) {
        self.inner.lock().unwrap().erc20_balances.insert((token, owner), balance);
    }

    /// Inserts a receipt retrievable by hash.
    pub fn insert_receipt(&self, receipt: ReceiptInfo) {
        self.inner.lock().unwrap().receipts.insert(receipt.tx_hash, receipt);
    }

    /// Records a Transfer event and a matching successful receipt.
    pub fn push_transfer(&self, transfer: TransferLog) {
        let mut state = self.inner.lock().unwrap();
        state.receipts.insert(
            transfer.tx_hash,
            ReceiptInfo {
                tx_hash: transfer.tx_hash,
                success: true,
                block_number: transfer.block_number,
                transfers: vec![transfer.clone()],
            },
        );
        state.transfers.push(transfer);
    }

    /// Makes every call fail with the given message.
    pub fn fail_with(&self, message: &str) {
        self.inner.lock().unwrap().fail_with = Some(message.to_string());
    }

    /// Delays every `block_number` read, for overlap and deadline tests.
    pub fn set_latency(&self, latency: Duration) {
        self.inner.lock().unwrap().latency = Some(latency);
    }

    /// Clears a previous [`Self::fail_with`].
    pub fn heal(&self) {
        self.inner.lock().unwrap().fail_with = None;
    }

    fn check(&self) -> Result<(), ChainError> {
        match &self.inner.lock().unwrap().fail_with {
            Some(message) => Err(ChainError::Rpc(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ChainProvider for TestChainProvider {
    type Error = ChainError;

    async fn block_number(&self) -> Result<u64, Self::Error> {
        let latency = self.inner.lock().unwrap().latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        self.check()?;
        Ok(self.inner.lock().unwrap().block_number)
    }

    async fn native_balance(&self, owner: Address) -> Result<U256, Self::Error> {
        self.check()?;
        Ok(self.inner.lock().unwrap().native.get(&owner).copied().unwrap_or_default())
    }

    async fn erc20_balance(&self, token: Address, owner: Address) -> Result<U256, Self::Error> {
        self.check()?;
        Ok(self
            .inner
            .lock()
            .unwrap()
            .erc20_balances
            .get(&(token, owner))
            .copied()
            .unwrap_or_default())
    }

    async fn erc20_metadata(&self, token: Address) -> Result<(String, u8), Self::Error> {
        self.check()?;
        self.inner
            .lock()
            .unwrap()
            .erc20_meta
            .get(&token)
            .cloned()
            .ok_or_else(|| ChainError::Rpc(format!("unknown token {token}")))
    }

    async fn transaction_receipt(
        &self,
        tx_hash: B256,
        token: Address,
    ) -> Result<Option<ReceiptInfo>, Self::Error> {
        self.check()?;
        let state = self.inner.lock().unwrap();
        Ok(state.receipts.get(&tx_hash).map(|receipt| ReceiptInfo {
            transfers: receipt.transfers.iter().filter(|t| t.token == token).cloned().collect(),
            ..receipt.clone()
        }))
    }

    async fn transfer_logs(
        &self,
        token: Address,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<TransferLog>, Self::Error> {
        self.check()?;
        let state = self.inner.lock().unwrap();
        Ok(state
            .transfers
            .iter()
            .filter(|t| {
                t.token == token && t.block_number >= from_block && t.block_number <= to_block
            })
            .cloned()
            .collect())
    }
}
