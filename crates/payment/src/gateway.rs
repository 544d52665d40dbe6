//! Typed facade over the metered market-data endpoints.

use crate::{
    Gateway402, PaymentOutcome, PaymentPipeline, PaymentSink, PaymentSubmitter, PipelineError,
};
use alloy_primitives::Bytes;
use lru::LruCache;
use sentinel_chain::ChainProvider;
use sentinel_settlement::ConsumedTxStore;
use sentinel_types::MicroUsdc;
use std::{
    collections::{BTreeMap, HashMap},
    num::NonZeroUsize,
    sync::Mutex,
    time::{Duration, Instant},
};

/// Entries kept per endpoint cache.
const CACHE_CAPACITY: usize = 64;

/// The metered endpoints and their pricing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub enum MarketDataEndpoint {
    /// Latest spot price for an instrument.
    #[display("spot_price")]
    SpotPrice,
    /// Candlestick series.
    #[display("ohlcv")]
    Ohlcv,
    /// Volume-weighted average price.
    #[display("vwap")]
    Vwap,
    /// Recent trades.
    #[display("trades")]
    Trades,
    /// Full order book.
    #[display("order_book")]
    OrderBook,
    /// Aggregated liquidity depth.
    #[display("liquidity_depth")]
    LiquidityDepth,
}

impl MarketDataEndpoint {
    /// Every endpoint.
    pub const ALL: [Self; 6] = [
        Self::SpotPrice,
        Self::Ohlcv,
        Self::Vwap,
        Self::Trades,
        Self::OrderBook,
        Self::LiquidityDepth,
    ];

    /// Path segment on the gateway.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::SpotPrice => "spot_price",
            Self::Ohlcv => "ohlcv",
            Self::Vwap => "vwap",
            Self::Trades => "trades",
            Self::OrderBook => "order_book",
            Self::LiquidityDepth => "liquidity_depth",
        }
    }

    /// Endpoint for a path segment.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|endpoint| endpoint.name() == name)
    }

    /// Estimated cost per request.
    pub const fn cost(&self) -> MicroUsdc {
        match self {
            Self::SpotPrice => 10_000,
            Self::Ohlcv | Self::Vwap => 20_000,
            Self::Trades => 50_000,
            Self::OrderBook => 100_000,
            Self::LiquidityDepth => 250_000,
        }
    }

    /// Cache TTL; `None` means never cached.
    pub const fn cache_ttl(&self) -> Option<Duration> {
        match self {
            Self::SpotPrice | Self::OrderBook => Some(Duration::from_secs(60)),
            Self::Ohlcv | Self::Vwap | Self::LiquidityDepth => Some(Duration::from_secs(300)),
            Self::Trades => None,
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    body: Bytes,
    inserted_at: Instant,
}

/// Typed, cached access to the metered endpoints.
///
/// Cache hits bypass the pipeline entirely and spend nothing; keys are the
/// canonicalized request tuple.
pub struct MarketDataGateway<G, P, C, Sub, K> {
    pipeline: PaymentPipeline<G, P, C, Sub, K>,
    caches: Mutex<HashMap<MarketDataEndpoint, LruCache<String, CacheEntry>>>,
}

impl<G, P, C, Sub, K> core::fmt::Debug for MarketDataGateway<G, P, C, Sub, K> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MarketDataGateway").field("pipeline", &self.pipeline).finish()
    }
}

impl<G, P, C, Sub, K> MarketDataGateway<G, P, C, Sub, K>
where
    G: Gateway402,
    P: ChainProvider + Send + Sync,
    C: ConsumedTxStore,
    Sub: PaymentSubmitter,
    K: PaymentSink,
{
    /// Wraps a payment pipeline.
    pub fn new(pipeline: PaymentPipeline<G, P, C, Sub, K>) -> Self {
        Self { pipeline, caches: Mutex::new(HashMap::new()) }
    }

    /// Fetches an endpoint, serving fresh cache entries for free.
    pub async fn fetch(
        &self,
        endpoint: MarketDataEndpoint,
        params: &BTreeMap<String, String>,
        run_id: Option<u64>,
    ) -> Result<PaymentOutcome, PipelineError> {
        let key = canonical_key(params);

        if let Some(ttl) = endpoint.cache_ttl() {
            if let Some(body) = self.cache_hit(endpoint, &key, ttl) {
                debug!(target: "gateway", %endpoint, key, "cache hit");
                return Ok(PaymentOutcome {
                    body,
                    invoice_id: None,
                    cost: 0,
                    tx_hash: None,
                    receipt: None,
                });
            }
        }

        let outcome = self.pipeline.fetch(endpoint.name(), params, run_id).await?;
        if endpoint.cache_ttl().is_some() {
            let mut caches = self.caches.lock().expect("gateway cache lock poisoned");
            caches
                .entry(endpoint)
                .or_insert_with(|| {
                    LruCache::new(NonZeroUsize::new(CACHE_CAPACITY).expect("nonzero capacity"))
                })
                .put(key, CacheEntry { body: outcome.body.clone(), inserted_at: Instant::now() });
        }
        Ok(outcome)
    }

    fn cache_hit(&self, endpoint: MarketDataEndpoint, key: &str, ttl: Duration) -> Option<Bytes> {
        let mut caches = self.caches.lock().expect("gateway cache lock poisoned");
        let cache = caches.get_mut(&endpoint)?;
        match cache.get(key) {
            Some(entry) if entry.inserted_at.elapsed() < ttl => Some(entry.body.clone()),
            Some(_) => {
                cache.pop(key);
                None
            }
            None => None,
        }
    }
}

fn canonical_key(params: &BTreeMap<String, String>) -> String {
    // BTreeMap iteration is already key-sorted.
    let mut key = String::new();
    for (name, value) in params {
        if !key.is_empty() {
            key.push('&');
        }
        key.push_str(name);
        key.push('=');
        key.push_str(value);
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        MemoryPaymentSink, PaymentPipeline,
        test_utils::{TestGateway, TestSubmitter, invoice_body},
    };
    use alloy_primitives::Address;
    use sentinel_budget::BudgetLedger;
    use sentinel_chain::test_utils::TestChainProvider;
    use sentinel_settlement::{MemoryConsumedTxStore, SettlementVerifier};
    use std::sync::Arc;

    #[tokio::test]
    async fn cache_hits_bypass_the_pipeline() {
        let token = Address::repeat_byte(0x01);
        let recipient = Address::repeat_byte(0x02);
        let payer = Address::repeat_byte(0x03);
        let chain = TestChainProvider::default();
        chain.set_block_number(100);
        let wire_gateway = Arc::new(TestGateway::default());
        let submitter = Arc::new(TestSubmitter::new(chain.clone(), token, payer));
        let verifier = Arc::new(SettlementVerifier::new(
            chain,
            MemoryConsumedTxStore::default(),
            token,
            recipient,
            3,
            Duration::from_millis(5),
        ));
        let ledger = Arc::new(BudgetLedger::new(10_000_000, 50_000));
        let sink = Arc::new(MemoryPaymentSink::default());
        let pipeline = PaymentPipeline::new(
            wire_gateway.clone(),
            verifier,
            submitter,
            ledger.clone(),
            sink,
            Some(payer),
            Duration::from_secs(900),
        );
        let gateway = MarketDataGateway::new(pipeline);

        let params = BTreeMap::from([("pair".to_string(), "eth-usd".to_string())]);
        wire_gateway.push_invoice(invoice_body("inv-1", 250_000, recipient, "liquidity_depth"));
        wire_gateway.push_ok(b"depth data");
        let first =
            gateway.fetch(MarketDataEndpoint::LiquidityDepth, &params, None).await.unwrap();
        assert_eq!(first.cost, 250_000);

        // Nothing scripted: a second fetch must come from the cache.
        let second =
            gateway.fetch(MarketDataEndpoint::LiquidityDepth, &params, None).await.unwrap();
        assert_eq!(second.cost, 0);
        assert_eq!(second.body, first.body);
        assert_eq!(ledger.status().spent, 250_000);
        assert_eq!(wire_gateway.calls().len(), 2);
    }

    #[test]
    fn cost_table_matches_pricing() {
        assert_eq!(MarketDataEndpoint::SpotPrice.cost(), 10_000);
        assert_eq!(MarketDataEndpoint::Ohlcv.cost(), 20_000);
        assert_eq!(MarketDataEndpoint::Vwap.cost(), 20_000);
        assert_eq!(MarketDataEndpoint::Trades.cost(), 50_000);
        assert_eq!(MarketDataEndpoint::OrderBook.cost(), 100_000);
        assert_eq!(MarketDataEndpoint::LiquidityDepth.cost(), 250_000);
    }

    #[test]
    fn trades_are_never_cached() {
        assert_eq!(MarketDataEndpoint::Trades.cache_ttl(), None);
        assert!(MarketDataEndpoint::SpotPrice.cache_ttl().is_some());
    }

    #[test]
    fn names_round_trip() {
        for endpoint in MarketDataEndpoint::ALL {
            assert_eq!(MarketDataEndpoint::from_name(endpoint.name()), Some(endpoint));
        }
        assert_eq!(MarketDataEndpoint::from_name("nope"), None);
    }

    #[test]
    fn canonical_keys_are_order_independent() {
        let mut a = BTreeMap::new();
        a.insert("pair".to_string(), "eth-usd".to_string());
        a.insert("depth".to_string(), "50".to_string());
        assert_eq!(canonical_key(&a), "depth=50&pair=eth-usd");
    }
}
