//! The settlement verifier.

use crate::ConsumedTxStore;
use alloy_primitives::{Address, B256};
use sentinel_types::{Invoice, MicroUsdc};
use sentinel_chain::ChainProvider;
use std::{
    collections::HashMap,
    sync::Mutex,
    time::Duration,
};
use thiserror::Error;
use tokio::time::Instant;

/// Why a verification did not pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum VerifyFailure {
    /// The RPC endpoint stayed unreachable through retries.
    #[error("rpc_unavailable")]
    RpcUnavailable,
    /// No receipt exists for the hash.
    #[error("receipt_not_found")]
    ReceiptNotFound,
    /// The transaction reverted.
    #[error("tx_reverted")]
    TxReverted,
    /// No USDC Transfer to the gateway recipient in the receipt.
    #[error("no_matching_transfer")]
    NoMatchingTransfer,
    /// The observed amount is below the invoice amount.
    #[error("amount_below_invoice")]
    AmountBelowInvoice,
    /// The transfer sender is not the expected payer.
    #[error("sender_mismatch")]
    SenderMismatch,
    /// Not enough confirmations yet; retry later.
    #[error("insufficient_confirmations")]
    InsufficientConfirmations,
    /// The hash already settled a different invoice.
    #[error("tx_already_used")]
    TxAlreadyUsed,
}

/// Outcome of one verification attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerificationResult {
    /// Whether every check passed and the hash is now bound to the invoice.
    pub verified: bool,
    /// Observed transfer amount, saturating at [`u64::MAX`] µUSDC.
    pub amount: MicroUsdc,
    /// Observed transfer sender.
    pub sender: Address,
    /// Block the transfer landed in.
    pub block_number: u64,
    /// `current_block - receipt_block` at check time.
    pub confirmations: u64,
    /// Set when `verified` is false.
    pub reason: Option<VerifyFailure>,
}

impl VerificationResult {
    fn failure(reason: VerifyFailure) -> Self {
        Self {
            verified: false,
            amount: 0,
            sender: Address::ZERO,
            block_number: 0,
            confirmations: 0,
            reason: Some(reason),
        }
    }
}

/// Outcome of a settlement watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchOutcome {
    /// A matching inbound transfer settled and verified.
    Verified {
        /// The settling transaction.
        tx_hash: B256,
        /// Details of the verification.
        result: VerificationResult,
    },
    /// The deadline passed without a verified transfer.
    TimedOut {
        /// Whether a matching transfer was seen but never verified (for
        /// example it never reached the confirmation threshold).
        saw_candidate: bool,
    },
}

/// Number of recent blocks a watch scans per poll.
const WATCH_WINDOW_BLOCKS: u64 = 50;

/// Verifies that Base transactions settle invoices.
///
/// Holds the consumed-tx set: a hash that settled one invoice can never
/// settle another, across restarts via the [`ConsumedTxStore`].
#[derive(Debug)]
pub struct SettlementVerifier<P, S> {
    provider: P,
    store: S,
    token: Address,
    recipient: Address,
    confirmation_threshold: u64,
    poll_interval: Duration,
    consumed: Mutex<HashMap<B256, String>>,
}

impl<P, S> SettlementVerifier<P, S>
where
    P: ChainProvider + Send + Sync,
    S: ConsumedTxStore,
{
    /// Creates a verifier for `token` transfers into `recipient`, loading
    /// previously consumed hashes from the store.
    pub fn new(
        provider: P,
        store: S,
        token: Address,
        recipient: Address,
        confirmation_threshold: u64,
        poll_interval: Duration,
    ) -> Self {
        let consumed = match store.load() {
            Ok(rows) => rows.into_iter().collect(),
            Err(err) => {
                error!(target: "settlement", %err, "failed to load consumed tx set");
                HashMap::new()
            }
        };
        Self {
            provider,
            store,
            token,
            recipient,
            confirmation_threshold,
            poll_interval,
            consumed: Mutex::new(consumed),
        }
    }

    /// Checks whether `tx_hash` settles at least `min_amount` to the
    /// configured recipient with enough confirmations, and binds it to
    /// `invoice_id` on success.
    ///
    /// Never panics and never surfaces transport errors; persistent RPC
    /// failure reports [`VerifyFailure::RpcUnavailable`].
    pub async fn verify(
        &self,
        invoice_id: &str,
        tx_hash: B256,
        min_amount: MicroUsdc,
        expected_sender: Option<Address>,
    ) -> VerificationResult {
        if let Some(owner) = self.consumed_by(tx_hash) {
            if owner != invoice_id {
                debug!(target: "settlement", %tx_hash, owner, "tx already consumed");
                return VerificationResult::failure(VerifyFailure::TxAlreadyUsed);
            }
        }

        let receipt = match self.provider.transaction_receipt(tx_hash, self.token).await {
            Ok(Some(receipt)) => receipt,
            Ok(None) => return VerificationResult::failure(VerifyFailure::ReceiptNotFound),
            Err(err) => {
                warn!(target: "settlement", %tx_hash, %err, "receipt fetch failed");
                return VerificationResult::failure(VerifyFailure::RpcUnavailable);
            }
        };
        if !receipt.success {
            return VerificationResult::failure(VerifyFailure::TxReverted);
        }

        let Some(transfer) = receipt.transfers.iter().find(|t| t.to == self.recipient) else {
            return VerificationResult::failure(VerifyFailure::NoMatchingTransfer);
        };
        let amount = u64::try_from(transfer.value).unwrap_or(u64::MAX);
        let sender = transfer.from;
        let block_number = receipt.block_number;

        let fail = |reason| VerificationResult {
            verified: false,
            amount,
            sender,
            block_number,
            confirmations: 0,
            reason: Some(reason),
        };
        if amount < min_amount {
            return fail(VerifyFailure::AmountBelowInvoice);
        }
        if let Some(expected) = expected_sender {
            if sender != expected {
                return fail(VerifyFailure::SenderMismatch);
            }
        }

        let current_block = match self.provider.block_number().await {
            Ok(block) => block,
            Err(err) => {
                warn!(target: "settlement", %err, "block number fetch failed");
                return fail(VerifyFailure::RpcUnavailable);
            }
        };
        let confirmations = current_block.saturating_sub(block_number);
        if confirmations < self.confirmation_threshold {
            return VerificationResult {
                verified: false,
                amount,
                sender,
                block_number,
                confirmations,
                reason: Some(VerifyFailure::InsufficientConfirmations),
            };
        }

        // Bind under the lock so two invoices racing on one hash cannot
        // both verify.
        {
            let mut consumed = self.consumed.lock().expect("consumed set lock poisoned");
            if let Some(owner) = consumed.get(&tx_hash) {
                if owner != invoice_id {
                    return VerificationResult {
                        verified: false,
                        amount,
                        sender,
                        block_number,
                        confirmations,
                        reason: Some(VerifyFailure::TxAlreadyUsed),
                    };
                }
            } else {
                consumed.insert(tx_hash, invoice_id.to_string());
                if let Err(err) = self.store.record(tx_hash, invoice_id) {
                    error!(target: "settlement", %tx_hash, %err, "failed to persist consumed tx");
                }
            }
        }

        info!(
            target: "settlement",
            %tx_hash,
            invoice_id,
            amount,
            confirmations,
            "settlement verified"
        );
        VerificationResult { verified: true, amount, sender, block_number, confirmations, reason: None }
    }

    /// Long-poll mode: scans the last [`WATCH_WINDOW_BLOCKS`] blocks for an
    /// inbound transfer covering the invoice, then verifies it, until the
    /// deadline.
    pub async fn watch(
        &self,
        invoice: &Invoice,
        expected_sender: Option<Address>,
        deadline: Instant,
    ) -> WatchOutcome {
        let mut saw_candidate = false;
        loop {
            if Instant::now() >= deadline {
                debug!(target: "settlement", invoice_id = invoice.id, "watch deadline reached");
                return WatchOutcome::TimedOut { saw_candidate };
            }

            match self.scan_candidates(invoice).await {
                Ok(candidates) => {
                    for tx_hash in candidates {
                        saw_candidate = true;
                        let result = self
                            .verify(&invoice.id, tx_hash, invoice.amount, expected_sender)
                            .await;
                        if result.verified {
                            return WatchOutcome::Verified { tx_hash, result };
                        }
                        // Not yet confirmed or consumed elsewhere; keep
                        // polling until the deadline.
                    }
                }
                Err(err) => {
                    warn!(target: "settlement", invoice_id = invoice.id, %err, "watch scan failed");
                }
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            tokio::time::sleep(self.poll_interval.min(remaining)).await;
        }
    }

    async fn scan_candidates(&self, invoice: &Invoice) -> Result<Vec<B256>, String> {
        let tip = self.provider.block_number().await.map_err(|e| e.to_string())?;
        let from_block = tip.saturating_sub(WATCH_WINDOW_BLOCKS);
        let logs = self
            .provider
            .transfer_logs(self.token, from_block, tip)
            .await
            .map_err(|e| e.to_string())?;
        Ok(logs
            .into_iter()
            .filter(|log| {
                log.to == self.recipient
                    && u64::try_from(log.value).unwrap_or(u64::MAX) >= invoice.amount
                    && self.consumed_by(log.tx_hash).as_deref().unwrap_or(&invoice.id)
                        == invoice.id
            })
            .map(|log| log.tx_hash)
            .collect())
    }

    fn consumed_by(&self, tx_hash: B256) -> Option<String> {
        self.consumed.lock().expect("consumed set lock poisoned").get(&tx_hash).cloned()
    }
}
