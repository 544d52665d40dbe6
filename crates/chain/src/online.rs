//! Alloy-backed online implementation of [`ChainProvider`].

use crate::{ChainError, ChainProvider, Erc20, ReceiptInfo, TRANSFER_TOPIC, TransferLog};
use alloy_consensus::TxReceipt;
use alloy_primitives::{Address, B256, Bytes, TxKind, U256};
use alloy_provider::{DynProvider, Provider, ProviderBuilder};
use alloy_rpc_types_eth::{Filter, Log, TransactionInput, TransactionRequest};
use alloy_sol_types::SolCall;
use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use std::time::Duration;
use url::Url;

/// Retry policy for chain RPC calls: 1s base delay, factor 2, 30s cap,
/// five attempts in total.
pub fn rpc_backoff() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_secs(1))
        .with_factor(2.0)
        .with_max_delay(Duration::from_secs(30))
        .with_max_times(4)
}

/// [`ChainProvider`] over an HTTP JSON-RPC endpoint.
#[derive(Debug, Clone)]
pub struct OnlineChainProvider {
    provider: DynProvider,
    backoff: ExponentialBuilder,
}

impl OnlineChainProvider {
    /// Creates a provider for the given HTTP endpoint with the default
    /// retry policy.
    pub fn new_http(url: Url) -> Self {
        let provider = ProviderBuilder::new().connect_http(url).erased();
        Self { provider, backoff: rpc_backoff() }
    }

    /// Wraps an existing alloy provider; used by the payment submitter to
    /// share a wallet-filled provider.
    pub fn new(provider: DynProvider) -> Self {
        Self { provider, backoff: rpc_backoff() }
    }

    /// Overrides the retry policy.
    pub const fn with_backoff(mut self, backoff: ExponentialBuilder) -> Self {
        self.backoff = backoff;
        self
    }

    async fn call_erc20(&self, token: Address, data: Vec<u8>) -> Result<Bytes, ChainError> {
        let provider = self.provider.clone();
        let tx = TransactionRequest {
            to: Some(TxKind::Call(token)),
            input: TransactionInput::new(Bytes::from(data)),
            ..Default::default()
        };
        (move || {
            let provider = provider.clone();
            let tx = tx.clone();
            async move { provider.call(tx).await }
        })
        .retry(self.backoff)
        .notify(|err, delay| warn!(target: "chain", %err, ?delay, "eth_call retry"))
        .await
        .map_err(ChainError::rpc)
    }

    fn decode_transfer(log: &Log, token: Address) -> Result<Option<TransferLog>, ChainError> {
        if log.address() != token || log.topic0() != Some(&TRANSFER_TOPIC) {
            return Ok(None);
        }
        let decoded = log
            .log_decode::<Erc20::Transfer>()
            .map_err(|e| ChainError::MalformedLog(e.to_string()))?;
        let event = decoded.inner.data;
        Ok(Some(TransferLog {
            tx_hash: log.transaction_hash.unwrap_or_default(),
            block_number: log.block_number.unwrap_or_default(),
            token,
            from: event.from,
            to: event.to,
            value: event.value,
        }))
    }
}

#[async_trait]
impl ChainProvider for OnlineChainProvider {
    type Error = ChainError;

    async fn block_number(&self) -> Result<u64, Self::Error> {
        let provider = self.provider.clone();
        (move || {
            let provider = provider.clone();
            async move { provider.get_block_number().await }
        })
        .retry(self.backoff)
        .notify(|err, delay| warn!(target: "chain", %err, ?delay, "eth_blockNumber retry"))
        .await
        .map_err(ChainError::rpc)
    }

    async fn native_balance(&self, owner: Address) -> Result<U256, Self::Error> {
        let provider = self.provider.clone();
        (move || {
            let provider = provider.clone();
            async move { provider.get_balance(owner).await }
        })
        .retry(self.backoff)
        .notify(|err, delay| warn!(target: "chain", %err, ?delay, "eth_getBalance retry"))
        .await
        .map_err(ChainError::rpc)
    }

    async fn erc20_balance(&self, token: Address, owner: Address) -> Result<U256, Self::Error> {
        let data = Erc20::balanceOfCall { owner }.abi_encode();
        let bytes = self.call_erc20(token, data).await?;
        Erc20::balanceOfCall::abi_decode_returns(&bytes).map_err(ChainError::rpc)
    }

    async fn erc20_metadata(&self, token: Address) -> Result<(String, u8), Self::Error> {
        let bytes = self.call_erc20(token, Erc20::symbolCall {}.abi_encode()).await?;
        let symbol = Erc20::symbolCall::abi_decode_returns(&bytes).map_err(ChainError::rpc)?;
        let bytes = self.call_erc20(token, Erc20::decimalsCall {}.abi_encode()).await?;
        let decimals = Erc20::decimalsCall::abi_decode_returns(&bytes).map_err(ChainError::rpc)?;
        Ok((symbol, decimals))
    }

    async fn transaction_receipt(
        &self,
        tx_hash: B256,
        token: Address,
    ) -> Result<Option<ReceiptInfo>, Self::Error> {
        let provider = self.provider.clone();
        let receipt = (move || {
            let provider = provider.clone();
            async move { provider.get_transaction_receipt(tx_hash).await }
        })
        .retry(self.backoff)
        .notify(|err, delay| warn!(target: "chain", %err, ?delay, "eth_getTransactionReceipt retry"))
        .await
        .map_err(ChainError::rpc)?;

        let Some(receipt) = receipt else { return Ok(None) };
        let mut transfers = Vec::new();
        for log in receipt.inner.logs() {
            if let Some(transfer) = Self::decode_transfer(log, token)? {
                transfers.push(TransferLog {
                    tx_hash,
                    block_number: receipt.block_number.unwrap_or_default(),
                    ..transfer
                });
            }
        }
        Ok(Some(ReceiptInfo {
            tx_hash,
            success: receipt.status(),
            block_number: receipt.block_number.unwrap_or_default(),
            transfers,
        }))
    }

    async fn transfer_logs(
        &self,
        token: Address,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<TransferLog>, Self::Error> {
        let provider = self.provider.clone();
        let filter = Filter::new()
            .address(token)
            .event_signature(TRANSFER_TOPIC)
            .from_block(from_block)
            .to_block(to_block);
        let logs = (move || {
            let provider = provider.clone();
            let filter = filter.clone();
            async move { provider.get_logs(&filter).await }
        })
        .retry(self.backoff)
        .notify(|err, delay| warn!(target: "chain", %err, ?delay, "eth_getLogs retry"))
        .await
        .map_err(ChainError::rpc)?;

        let mut transfers = Vec::with_capacity(logs.len());
        for log in &logs {
            if let Some(transfer) = Self::decode_transfer(log, token)? {
                transfers.push(transfer);
            }
        }
        Ok(transfers)
    }
}
