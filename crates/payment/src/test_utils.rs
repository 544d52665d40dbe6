//! Programmable fakes for the 402 flow, shared with the agent tests.

use crate::{Gateway402, GatewayReply, InvoiceBody, PaymentSubmitter};
use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use sentinel_chain::{TransferLog, test_utils::TestChainProvider};
use sentinel_types::MicroUsdc;
use std::{
    collections::{BTreeMap, VecDeque},
    sync::{
        Mutex,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

/// A scripted [`Gateway402`]: replies are consumed in push order, and every
/// call is recorded. Accepts proof via the header argument, matching the
/// real gateway's `X-Payment-Receipt` handling.
#[derive(Debug, Default)]
pub struct TestGateway {
    script: Mutex<VecDeque<Result<GatewayReply, String>>>,
    calls: Mutex<Vec<(String, Option<B256>)>>,
}

impl TestGateway {
    /// Queues a raw reply.
    pub fn push(&self, reply: Result<GatewayReply, String>) {
        self.script.lock().expect("gateway script lock poisoned").push_back(reply);
    }

    /// Queues a 402 demanding payment.
    pub fn push_invoice(&self, body: InvoiceBody) {
        self.push(Ok(GatewayReply::PaymentRequired(body)));
    }

    /// Queues a 200 with the given payload.
    pub fn push_ok(&self, body: &[u8]) {
        self.push(Ok(GatewayReply::Ok(body.to_vec().into())));
    }

    /// `(endpoint, receipt)` pairs for every call made so far.
    pub fn calls(&self) -> Vec<(String, Option<B256>)> {
        self.calls.lock().expect("gateway calls lock poisoned").clone()
    }
}

#[async_trait]
impl Gateway402 for TestGateway {
    async fn request(
        &self,
        endpoint: &str,
        _params: &BTreeMap<String, String>,
        receipt: Option<B256>,
    ) -> Result<GatewayReply, String> {
        self.calls
            .lock()
            .expect("gateway calls lock poisoned")
            .push((endpoint.to_string(), receipt));
        self.script
            .lock()
            .expect("gateway script lock poisoned")
            .pop_front()
            .unwrap_or_else(|| Err("no scripted reply".to_string()))
    }
}

/// A wire invoice with sane defaults for tests.
pub fn invoice_body(
    invoice_id: &str,
    amount: MicroUsdc,
    recipient: Address,
    endpoint: &str,
) -> InvoiceBody {
    InvoiceBody {
        invoice_id: invoice_id.to_string(),
        amount_usdc: amount as f64 / 1_000_000.0,
        payment_address: recipient,
        expires_at: Utc::now() + TimeDelta::seconds(900),
        endpoint: endpoint.to_string(),
    }
}

/// A [`PaymentSubmitter`] that lands transfers straight onto a
/// [`TestChainProvider`], already confirmed.
#[derive(Debug)]
pub struct TestSubmitter {
    chain: TestChainProvider,
    token: Address,
    payer: Address,
    next: AtomicU64,
    silent: AtomicBool,
    fail: Mutex<Option<String>>,
}

impl TestSubmitter {
    /// Creates a submitter emitting `token` transfers from `payer`.
    pub fn new(chain: TestChainProvider, token: Address, payer: Address) -> Self {
        Self {
            chain,
            token,
            payer,
            next: AtomicU64::new(1),
            silent: AtomicBool::new(false),
            fail: Mutex::new(None),
        }
    }

    /// Stops emitting transfers; submissions succeed but nothing lands on
    /// chain. Used for settlement-timeout tests.
    pub fn go_silent(&self) {
        self.silent.store(true, Ordering::SeqCst);
    }

    /// Makes submissions fail outright.
    pub fn fail_with(&self, message: &str) {
        *self.fail.lock().expect("submitter lock poisoned") = Some(message.to_string());
    }

    /// The paying address.
    pub const fn payer(&self) -> Address {
        self.payer
    }
}

#[async_trait]
impl PaymentSubmitter for TestSubmitter {
    async fn submit_usdc_transfer(
        &self,
        to: Address,
        amount: MicroUsdc,
    ) -> Result<B256, String> {
        if let Some(message) = self.fail.lock().expect("submitter lock poisoned").clone() {
            return Err(message);
        }
        let n = self.next.fetch_add(1, Ordering::SeqCst);
        let tx_hash = B256::from(U256::from(0xab00_0000u64 + n));
        if !self.silent.load(Ordering::SeqCst) {
            let tip = self.chain.block_number().await.map_err(|e| e.to_string())?;
            self.chain.push_transfer(TransferLog {
                tx_hash,
                block_number: tip + 1,
                token: self.token,
                from: self.payer,
                to,
                value: U256::from(amount),
            });
            // Leave the transfer comfortably past the confirmation
            // threshold.
            self.chain.advance_blocks(5);
        }
        Ok(tx_hash)
    }
}
