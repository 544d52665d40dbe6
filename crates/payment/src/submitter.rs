//! Emitting the USDC transfer that settles an invoice.

use alloy_network::EthereumWallet;
use alloy_primitives::{Address, B256, Bytes, TxKind, U256};
use alloy_provider::{DynProvider, Provider, ProviderBuilder};
use alloy_rpc_types_eth::{TransactionInput, TransactionRequest};
use alloy_signer_local::PrivateKeySigner;
use alloy_sol_types::SolCall;
use async_trait::async_trait;
use sentinel_chain::Erc20;
use sentinel_types::MicroUsdc;
use url::Url;

/// Broadcasts USDC transfers on the settlement chain.
#[async_trait]
pub trait PaymentSubmitter: Send + Sync {
    /// Sends `amount` µUSDC to `to` and returns the transaction hash once
    /// the transaction is included.
    async fn submit_usdc_transfer(&self, to: Address, amount: MicroUsdc)
    -> Result<B256, String>;
}

#[async_trait]
impl<T: PaymentSubmitter + ?Sized> PaymentSubmitter for std::sync::Arc<T> {
    async fn submit_usdc_transfer(
        &self,
        to: Address,
        amount: MicroUsdc,
    ) -> Result<B256, String> {
        self.as_ref().submit_usdc_transfer(to, amount).await
    }
}

/// [`PaymentSubmitter`] backed by a locally held key.
#[derive(Debug, Clone)]
pub struct WalletSubmitter {
    provider: DynProvider,
    token: Address,
    payer: Address,
}

impl WalletSubmitter {
    /// Builds a wallet-filled provider for the settlement chain.
    pub fn new(rpc_url: Url, private_key: &str, token: Address) -> Result<Self, String> {
        let signer: PrivateKeySigner =
            private_key.parse().map_err(|e| format!("invalid payer key: {e}"))?;
        let payer = signer.address();
        let wallet = EthereumWallet::from(signer);
        let provider = ProviderBuilder::new().wallet(wallet).connect_http(rpc_url).erased();
        Ok(Self { provider, token, payer })
    }

    /// The paying address, for `expected_sender` checks.
    pub const fn payer(&self) -> Address {
        self.payer
    }
}

#[async_trait]
impl PaymentSubmitter for WalletSubmitter {
    async fn submit_usdc_transfer(
        &self,
        to: Address,
        amount: MicroUsdc,
    ) -> Result<B256, String> {
        let call = Erc20::transferCall { to, amount: U256::from(amount) };
        let tx = TransactionRequest {
            to: Some(TxKind::Call(self.token)),
            input: TransactionInput::new(Bytes::from(call.abi_encode())),
            ..Default::default()
        };
        let pending = self
            .provider
            .send_transaction(tx)
            .await
            .map_err(|e| format!("transfer submission failed: {e}"))?;
        let tx_hash =
            pending.watch().await.map_err(|e| format!("transfer inclusion failed: {e}"))?;
        info!(target: "payment", %tx_hash, %to, amount, "usdc transfer submitted");
        Ok(tx_hash)
    }
}
