//! The 402 client state machine.
//!
//! One request attempt runs SEND → PARSE_INVOICE → RESERVE_BUDGET →
//! SUBMIT_PAYMENT → WAIT_SETTLEMENT → RETRY_REQUEST in strict order; no
//! step is skipped. Spend commits only after the gateway delivers the data
//! against the settlement proof, so a failed attempt never contributes to
//! the ledger.

use crate::{
    Gateway402, GatewayReply, PaymentSink, PaymentSubmitter, PipelineError,
};
use alloy_primitives::{Address, B256, Bytes};
use chrono::Utc;
use sentinel_budget::ReserveBudget;
use sentinel_chain::ChainProvider;
use sentinel_settlement::{ConsumedTxStore, SettlementVerifier, WatchOutcome};
use sentinel_types::{
    Invoice, MicroUsdc, PaymentRecord, PaymentStatus, Receipt,
};
use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::time::Instant;

/// Result of a successful fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentOutcome {
    /// The data payload.
    pub body: Bytes,
    /// Invoice settled for this fetch; `None` for free or replayed
    /// responses.
    pub invoice_id: Option<String>,
    /// Spend committed by this fetch. Zero when no new money moved.
    pub cost: MicroUsdc,
    /// The settling transaction.
    pub tx_hash: Option<B256>,
    /// Verification receipt.
    pub receipt: Option<Receipt>,
}

impl PaymentOutcome {
    fn free(body: Bytes) -> Self {
        Self { body, invoice_id: None, cost: 0, tx_hash: None, receipt: None }
    }
}

/// Client of one metered gateway.
pub struct PaymentPipeline<G, P, C, Sub, K> {
    gateway: G,
    verifier: Arc<SettlementVerifier<P, C>>,
    submitter: Sub,
    budget: Arc<dyn ReserveBudget>,
    sink: K,
    /// Expected transfer sender, when the payer address is known.
    payer: Option<Address>,
    /// Hard ceiling on the settlement wait, whatever expiry the gateway
    /// grants.
    invoice_ttl: Duration,
    /// Invoices already verified this process, for idempotent replays.
    verified: Mutex<HashMap<String, Receipt>>,
}

impl<G, P, C, Sub, K> core::fmt::Debug for PaymentPipeline<G, P, C, Sub, K> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PaymentPipeline").field("payer", &self.payer).finish()
    }
}

impl<G, P, C, Sub, K> PaymentPipeline<G, P, C, Sub, K>
where
    G: Gateway402,
    P: ChainProvider + Send + Sync,
    C: ConsumedTxStore,
    Sub: PaymentSubmitter,
    K: PaymentSink,
{
    /// Wires a pipeline from its collaborators.
    pub fn new(
        gateway: G,
        verifier: Arc<SettlementVerifier<P, C>>,
        submitter: Sub,
        budget: Arc<dyn ReserveBudget>,
        sink: K,
        payer: Option<Address>,
        invoice_ttl: Duration,
    ) -> Self {
        Self {
            gateway,
            verifier,
            submitter,
            budget,
            sink,
            payer,
            invoice_ttl,
            verified: Mutex::new(HashMap::new()),
        }
    }

    /// Fetches `endpoint`, paying through the 402 flow when demanded.
    pub async fn fetch(
        &self,
        endpoint: &str,
        params: &BTreeMap<String, String>,
        run_id: Option<u64>,
    ) -> Result<PaymentOutcome, PipelineError> {
        // SEND.
        let wire = match self.gateway.request(endpoint, params, None).await {
            Ok(GatewayReply::Ok(body)) => return Ok(PaymentOutcome::free(body)),
            Ok(GatewayReply::PaymentRequired(wire)) => wire,
            Ok(GatewayReply::Error { status, body }) => {
                return Err(PipelineError::Upstream(format!("status {status}: {body}")));
            }
            Err(err) => return Err(PipelineError::Upstream(err)),
        };

        // Replay of an invoice we already settled: retry with the recorded
        // proof, no reservation, no new spend.
        if let Some(receipt) = self.verified_receipt(&wire.invoice_id) {
            debug!(target: "payment", invoice_id = wire.invoice_id, "replaying verified invoice");
            let body = self.retry_with_proof(endpoint, params, receipt.tx_hash).await?;
            return Ok(PaymentOutcome {
                body,
                invoice_id: Some(receipt.invoice_id.clone()),
                cost: 0,
                tx_hash: Some(receipt.tx_hash),
                receipt: Some(receipt),
            });
        }

        // PARSE_INVOICE. A malformed invoice fails upstream with no
        // reservation taken.
        let invoice = wire
            .into_invoice(Utc::now())
            .map_err(|err| PipelineError::Upstream(format!("bad invoice: {err}")))?;
        info!(
            target: "payment",
            invoice_id = invoice.id,
            endpoint,
            amount = invoice.amount,
            "402 invoice received"
        );

        // RESERVE_BUDGET.
        let handle = match self.budget.reserve(invoice.amount) {
            Ok(handle) => handle,
            Err(err) => {
                warn!(target: "payment", invoice_id = invoice.id, %err, "budget rejected invoice");
                self.append_row(run_id, &invoice, PaymentStatus::Failed, None, None);
                return Err(PipelineError::BudgetBlocked);
            }
        };

        // SUBMIT_PAYMENT.
        let tx_hash =
            match self.submitter.submit_usdc_transfer(invoice.recipient, invoice.amount).await {
                Ok(tx_hash) => tx_hash,
                Err(err) => {
                    self.budget.release(&handle);
                    self.append_row(run_id, &invoice, PaymentStatus::Failed, None, None);
                    return Err(PipelineError::SettlementFailed(err));
                }
            };

        // WAIT_SETTLEMENT, bounded by the server expiry and the local TTL.
        let remaining =
            (invoice.expires_at - Utc::now()).to_std().unwrap_or_default();
        let deadline = Instant::now() + remaining.min(self.invoice_ttl);
        let (tx_hash, result) = match self.verifier.watch(&invoice, self.payer, deadline).await {
            WatchOutcome::Verified { tx_hash, result } => (tx_hash, result),
            WatchOutcome::TimedOut { saw_candidate } => {
                self.budget.release(&handle);
                self.append_row(run_id, &invoice, PaymentStatus::Failed, Some(tx_hash), None);
                return Err(if saw_candidate {
                    PipelineError::VerificationTimeout
                } else {
                    PipelineError::InvoiceExpired
                });
            }
        };
        let receipt = Receipt {
            invoice_id: invoice.id.clone(),
            tx_hash,
            sender: result.sender,
            amount_observed: result.amount,
            block_number: result.block_number,
            confirmations: result.confirmations,
            verified_at: Utc::now(),
        };

        // RETRY_REQUEST with proof. Spend commits only once the data is
        // delivered.
        match self.retry_with_proof(endpoint, params, tx_hash).await {
            Ok(body) => {
                let cost = self
                    .budget
                    .commit(&handle)
                    .map_err(|err| PipelineError::SettlementFailed(err.to_string()))?;
                self.verified
                    .lock()
                    .expect("verified invoice lock poisoned")
                    .insert(invoice.id.clone(), receipt.clone());
                self.append_row(
                    run_id,
                    &invoice,
                    PaymentStatus::Confirmed,
                    Some(tx_hash),
                    Some(&receipt),
                );
                info!(
                    target: "payment",
                    invoice_id = invoice.id,
                    cost,
                    %tx_hash,
                    "payment confirmed and data delivered"
                );
                Ok(PaymentOutcome {
                    body,
                    invoice_id: Some(invoice.id),
                    cost,
                    tx_hash: Some(tx_hash),
                    receipt: Some(receipt),
                })
            }
            Err(err) => {
                self.budget.release(&handle);
                self.append_row(
                    run_id,
                    &invoice,
                    PaymentStatus::Failed,
                    Some(tx_hash),
                    Some(&receipt),
                );
                Err(err)
            }
        }
    }

    /// Whether an invoice id already verified this process.
    pub fn is_verified(&self, invoice_id: &str) -> bool {
        self.verified.lock().expect("verified invoice lock poisoned").contains_key(invoice_id)
    }

    fn verified_receipt(&self, invoice_id: &str) -> Option<Receipt> {
        self.verified.lock().expect("verified invoice lock poisoned").get(invoice_id).cloned()
    }

    async fn retry_with_proof(
        &self,
        endpoint: &str,
        params: &BTreeMap<String, String>,
        tx_hash: B256,
    ) -> Result<Bytes, PipelineError> {
        match self.gateway.request(endpoint, params, Some(tx_hash)).await {
            Ok(GatewayReply::Ok(body)) => Ok(body),
            Ok(GatewayReply::PaymentRequired(_)) => Err(PipelineError::Upstream(
                "gateway re-demanded payment against a settled receipt".to_string(),
            )),
            Ok(GatewayReply::Error { status, body }) => Err(PipelineError::Upstream(format!(
                "retry with proof rejected: status {status}: {body}"
            ))),
            Err(err) => Err(PipelineError::Upstream(err)),
        }
    }

    fn append_row(
        &self,
        run_id: Option<u64>,
        invoice: &Invoice,
        status: PaymentStatus,
        tx_hash: Option<B256>,
        receipt: Option<&Receipt>,
    ) {
        let row = PaymentRecord {
            id: 0,
            run_id,
            invoice_id: invoice.id.clone(),
            endpoint: invoice.endpoint.clone(),
            amount: invoice.amount,
            tx_hash,
            status,
            created_at: invoice.created_at,
            settled_at: receipt.map(|r| r.verified_at),
            block_number: receipt.map(|r| r.block_number),
            confirmations: receipt.map(|r| r.confirmations),
        };
        if let Err(err) = self.sink.append_payment(&row) {
            error!(target: "payment", invoice_id = invoice.id, %err, "failed to persist payment row");
        }
    }

    /// The configured payer address.
    pub const fn payer(&self) -> Option<Address> {
        self.payer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        MemoryPaymentSink,
        test_utils::{TestGateway, TestSubmitter, invoice_body},
    };
    use chrono::TimeDelta;
    use sentinel_budget::BudgetLedger;
    use sentinel_chain::test_utils::TestChainProvider;
    use sentinel_settlement::MemoryConsumedTxStore;

    fn token() -> Address {
        Address::repeat_byte(0x01)
    }

    fn recipient() -> Address {
        Address::repeat_byte(0x02)
    }

    fn payer() -> Address {
        Address::repeat_byte(0x03)
    }

    struct Fixture {
        pipeline: PaymentPipeline<
            Arc<TestGateway>,
            TestChainProvider,
            MemoryConsumedTxStore,
            Arc<TestSubmitter>,
            Arc<MemoryPaymentSink>,
        >,
        gateway: Arc<TestGateway>,
        submitter: Arc<TestSubmitter>,
        ledger: Arc<BudgetLedger>,
        sink: Arc<MemoryPaymentSink>,
    }

    fn fixture(limit: MicroUsdc) -> Fixture {
        let chain = TestChainProvider::default();
        chain.set_block_number(100);
        let gateway = Arc::new(TestGateway::default());
        let submitter = Arc::new(TestSubmitter::new(chain.clone(), token(), payer()));
        let verifier = Arc::new(SettlementVerifier::new(
            chain,
            MemoryConsumedTxStore::default(),
            token(),
            recipient(),
            3,
            Duration::from_millis(5),
        ));
        let ledger = Arc::new(BudgetLedger::new(limit, 50_000));
        let sink = Arc::new(MemoryPaymentSink::default());
        let pipeline = PaymentPipeline::new(
            gateway.clone(),
            verifier,
            submitter.clone(),
            ledger.clone(),
            sink.clone(),
            Some(payer()),
            Duration::from_secs(900),
        );
        Fixture { pipeline, gateway, submitter, ledger, sink }
    }

    fn params() -> BTreeMap<String, String> {
        BTreeMap::from([("pair".to_string(), "eth-usd".to_string())])
    }

    #[tokio::test]
    async fn free_response_spends_nothing() {
        let fx = fixture(10_000_000);
        fx.gateway.push_ok(b"free data");
        let outcome = fx.pipeline.fetch("spot_price", &params(), None).await.unwrap();
        assert_eq!(outcome.body.as_ref(), b"free data");
        assert_eq!(outcome.cost, 0);
        assert_eq!(fx.ledger.status().spent, 0);
        assert!(fx.sink.rows().is_empty());
    }

    #[tokio::test]
    async fn paid_flow_commits_the_invoice_amount() {
        let fx = fixture(10_000_000);
        fx.gateway.push_invoice(invoice_body("inv-1", 250_000, recipient(), "liquidity_depth"));
        fx.gateway.push_ok(b"depth data");

        let outcome =
            fx.pipeline.fetch("liquidity_depth", &params(), Some(42)).await.unwrap();
        assert_eq!(outcome.cost, 250_000);
        assert_eq!(outcome.invoice_id.as_deref(), Some("inv-1"));
        let receipt = outcome.receipt.unwrap();
        assert_eq!(receipt.amount_observed, 250_000);
        assert_eq!(receipt.sender, payer());

        let status = fx.ledger.status();
        assert_eq!(status.spent, 250_000);
        assert_eq!(status.reserved, 0);
        assert_eq!(status.remaining, 9_750_000);

        let rows = fx.sink.rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, PaymentStatus::Confirmed);
        assert_eq!(rows[0].run_id, Some(42));
        assert_eq!(rows[0].tx_hash, outcome.tx_hash);

        // The retried request carried the settlement proof.
        let calls = fx.gateway.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].1.is_none());
        assert_eq!(calls[1].1, outcome.tx_hash);
    }

    #[tokio::test]
    async fn budget_blocked_appends_failed_row() {
        let fx = fixture(200_000);
        fx.gateway.push_invoice(invoice_body("inv-1", 250_000, recipient(), "liquidity_depth"));

        let err = fx.pipeline.fetch("liquidity_depth", &params(), None).await.unwrap_err();
        assert_eq!(err, PipelineError::BudgetBlocked);

        let status = fx.ledger.status();
        assert_eq!(status.spent, 0);
        assert_eq!(status.reserved, 0);
        let rows = fx.sink.rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, PaymentStatus::Failed);
        assert!(rows[0].tx_hash.is_none());
    }

    #[tokio::test]
    async fn malformed_invoice_takes_no_reservation() {
        let fx = fixture(10_000_000);
        fx.gateway.push(Err("malformed 402 invoice body: missing amount".to_string()));
        let err = fx.pipeline.fetch("trades", &params(), None).await.unwrap_err();
        assert!(matches!(err, PipelineError::Upstream(_)));
        assert_eq!(fx.ledger.status().reserved, 0);
        assert!(fx.sink.rows().is_empty());
    }

    #[tokio::test]
    async fn settlement_timeout_releases_the_reservation() {
        let fx = fixture(10_000_000);
        let mut wire = invoice_body("inv-1", 250_000, recipient(), "order_book");
        wire.expires_at = Utc::now() + TimeDelta::milliseconds(150);
        fx.gateway.push_invoice(wire);
        fx.submitter.go_silent();

        let err = fx.pipeline.fetch("order_book", &params(), None).await.unwrap_err();
        assert_eq!(err, PipelineError::InvoiceExpired);

        let status = fx.ledger.status();
        assert_eq!(status.spent, 0);
        assert_eq!(status.reserved, 0);
        let rows = fx.sink.rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, PaymentStatus::Failed);
        // The transfer was broadcast before the watch timed out.
        assert!(rows[0].tx_hash.is_some());
    }

    #[tokio::test]
    async fn submit_failure_releases_the_reservation() {
        let fx = fixture(10_000_000);
        fx.gateway.push_invoice(invoice_body("inv-1", 250_000, recipient(), "order_book"));
        fx.submitter.fail_with("nonce too low");

        let err = fx.pipeline.fetch("order_book", &params(), None).await.unwrap_err();
        assert!(matches!(err, PipelineError::SettlementFailed(_)));
        assert_eq!(fx.ledger.status().reserved, 0);
        assert_eq!(fx.sink.rows()[0].status, PaymentStatus::Failed);
    }

    #[tokio::test]
    async fn rejected_retry_releases_the_reservation() {
        let fx = fixture(10_000_000);
        fx.gateway.push_invoice(invoice_body("inv-1", 250_000, recipient(), "order_book"));
        fx.gateway.push(Ok(GatewayReply::Error { status: 500, body: "oops".to_string() }));

        let err = fx.pipeline.fetch("order_book", &params(), None).await.unwrap_err();
        assert!(matches!(err, PipelineError::Upstream(_)));

        let status = fx.ledger.status();
        assert_eq!(status.spent, 0);
        assert_eq!(status.reserved, 0);
        let rows = fx.sink.rows();
        assert_eq!(rows[0].status, PaymentStatus::Failed);
        assert!(rows[0].tx_hash.is_some());
    }

    #[tokio::test]
    async fn replayed_invoice_is_idempotent() {
        let fx = fixture(10_000_000);
        fx.gateway.push_invoice(invoice_body("inv-1", 250_000, recipient(), "liquidity_depth"));
        fx.gateway.push_ok(b"depth data");
        let first = fx.pipeline.fetch("liquidity_depth", &params(), None).await.unwrap();
        assert_eq!(fx.ledger.status().spent, 250_000);

        // The gateway presents the same invoice again.
        fx.gateway.push_invoice(invoice_body("inv-1", 250_000, recipient(), "liquidity_depth"));
        fx.gateway.push_ok(b"depth data");
        let second = fx.pipeline.fetch("liquidity_depth", &params(), None).await.unwrap();

        assert_eq!(second.cost, 0);
        assert_eq!(second.tx_hash, first.tx_hash);
        assert_eq!(second.receipt, first.receipt);
        // No additional spend.
        assert_eq!(fx.ledger.status().spent, 250_000);
        assert_eq!(fx.sink.rows().len(), 1);
    }
}
