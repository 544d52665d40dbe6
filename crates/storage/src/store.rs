//! The RocksDB-backed store.

use crate::StorageError;
use alloy_primitives::B256;
use chrono::{DateTime, Utc};
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, IteratorMode, Options};
use sentinel_machine::TransitionSink;
use sentinel_payment::PaymentSink;
use sentinel_settlement::ConsumedTxStore;
use sentinel_types::{
    Level, PaymentRecord, RunRecord, RunStatus, Transition, TreasurySnapshot,
};
use serde::{Serialize, de::DeserializeOwned};
use std::{path::Path, sync::Mutex};

const CF_RUNS: &str = "runs";
const CF_PAYMENTS: &str = "payments";
const CF_TRANSITIONS: &str = "transitions";
const CF_SNAPSHOTS: &str = "snapshots";
const CF_CONSUMED_TX: &str = "consumed_tx";
const CF_META: &str = "meta";

const META_NEXT_RUN: &[u8] = b"next_run";
const META_NEXT_PAYMENT: &[u8] = b"next_payment";
const META_NEXT_SNAPSHOT: &[u8] = b"next_snapshot";
const META_NEXT_TRANSITION: &[u8] = b"next_transition";

#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct ConsumedTxRow {
    invoice_id: String,
    consumed_at: DateTime<Utc>,
}

/// Durable single-process store with WAL journaling.
///
/// Writers are serialized by RocksDB; id counters are issued under a local
/// mutex and written through to the `meta` column family so they survive
/// restarts.
pub struct SentinelStore {
    db: DB,
    counters: Mutex<()>,
}

impl core::fmt::Debug for SentinelStore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SentinelStore").field("path", &self.db.path()).finish()
    }
}

impl SentinelStore {
    /// Opens (or creates) the store at `path`.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);
        let descriptors = [
            CF_RUNS,
            CF_PAYMENTS,
            CF_TRANSITIONS,
            CF_SNAPSHOTS,
            CF_CONSUMED_TX,
            CF_META,
        ]
        .into_iter()
        .map(|name| ColumnFamilyDescriptor::new(name, Options::default()));
        let db = DB::open_cf_descriptors(&opts, path, descriptors)
            .map_err(|e| StorageError::Open(e.to_string()))?;
        info!(target: "storage", path = %path.display(), "store opened");
        Ok(Self { db, counters: Mutex::new(()) })
    }

    // ---- runs -----------------------------------------------------------

    /// Creates a PENDING run row at the tick time.
    pub fn create_run(
        &self,
        scheduled_at: DateTime<Utc>,
        level_before: Level,
    ) -> Result<RunRecord, StorageError> {
        let id = self.next_id(META_NEXT_RUN)?;
        let run = RunRecord {
            id,
            run_number: id,
            scheduled_at,
            started_at: None,
            completed_at: None,
            status: RunStatus::Pending,
            level_before,
            level_after: None,
            spend_delta: 0,
            invoice_count: 0,
            snapshot_id: None,
            error: None,
            metadata: serde_json::Value::Null,
        };
        self.put_row(CF_RUNS, &id.to_be_bytes(), &run)?;
        Ok(run)
    }

    /// Updates the in-progress run row in place.
    pub fn update_run(&self, run: &RunRecord) -> Result<(), StorageError> {
        self.put_row(CF_RUNS, &run.id.to_be_bytes(), run)
    }

    /// Loads one run.
    pub fn run(&self, id: u64) -> Result<Option<RunRecord>, StorageError> {
        self.get_row(CF_RUNS, &id.to_be_bytes())
    }

    /// All runs, id order.
    pub fn runs(&self) -> Result<Vec<RunRecord>, StorageError> {
        self.scan(CF_RUNS)
    }

    /// Whether any run row is currently RUNNING.
    pub fn has_running_run(&self) -> Result<bool, StorageError> {
        Ok(self.runs()?.iter().any(|run| run.status == RunStatus::Running))
    }

    // ---- payments -------------------------------------------------------

    /// Payments attributed to a run, id order.
    pub fn payments_for_run(&self, run_id: u64) -> Result<Vec<PaymentRecord>, StorageError> {
        Ok(self
            .scan::<PaymentRecord>(CF_PAYMENTS)?
            .into_iter()
            .filter(|payment| payment.run_id == Some(run_id))
            .collect())
    }

    /// All payments, id order.
    pub fn payments(&self) -> Result<Vec<PaymentRecord>, StorageError> {
        self.scan(CF_PAYMENTS)
    }

    // ---- transitions ----------------------------------------------------

    /// Transitions attributed to a run, id order.
    pub fn transitions_for_run(&self, run_id: u64) -> Result<Vec<Transition>, StorageError> {
        Ok(self
            .scan::<Transition>(CF_TRANSITIONS)?
            .into_iter()
            .filter(|transition| transition.run_id == Some(run_id))
            .collect())
    }

    /// All transitions, id order.
    pub fn transitions(&self) -> Result<Vec<Transition>, StorageError> {
        self.scan(CF_TRANSITIONS)
    }

    /// First unissued transition id, for seeding the in-memory ledger.
    pub fn next_transition_id(&self) -> Result<u64, StorageError> {
        self.peek_id(META_NEXT_TRANSITION)
    }

    // ---- snapshots ------------------------------------------------------

    /// Issues a snapshot batch id.
    pub fn next_snapshot_id(&self) -> Result<u64, StorageError> {
        self.next_id(META_NEXT_SNAPSHOT)
    }

    /// Persists one per-chain snapshot row, keyed `(batch id, chain id)`.
    pub fn put_snapshot(&self, snapshot: &TreasurySnapshot) -> Result<(), StorageError> {
        let mut key = [0u8; 16];
        key[..8].copy_from_slice(&snapshot.id.to_be_bytes());
        key[8..].copy_from_slice(&snapshot.chain_id.to_be_bytes());
        self.put_row(CF_SNAPSHOTS, &key, snapshot)
    }

    /// All rows of a snapshot batch, chain order.
    pub fn snapshot_batch(&self, batch_id: u64) -> Result<Vec<TreasurySnapshot>, StorageError> {
        Ok(self
            .scan::<TreasurySnapshot>(CF_SNAPSHOTS)?
            .into_iter()
            .filter(|snapshot| snapshot.id == batch_id)
            .collect())
    }

    // ---- maintenance ----------------------------------------------------

    /// Forces the WAL and memtables to disk, used on shutdown.
    pub fn flush(&self) -> Result<(), StorageError> {
        self.db.flush().map_err(|e| StorageError::Db(e.to_string()))
    }

    // ---- internals ------------------------------------------------------

    fn cf(&self, name: &str) -> &ColumnFamily {
        self.db.cf_handle(name).expect("column family created at open")
    }

    fn put_row<T: Serialize>(
        &self,
        cf_name: &str,
        key: &[u8],
        row: &T,
    ) -> Result<(), StorageError> {
        let value = serde_json::to_vec(row).map_err(|e| StorageError::Db(e.to_string()))?;
        self.put_retry(cf_name, key, &value)
    }

    /// One retry; a second failure is fatal-grade (the scheduler halts
    /// after the current tick).
    fn put_retry(&self, cf_name: &str, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        if let Err(first) = self.db.put_cf(self.cf(cf_name), key, value) {
            warn!(target: "storage", cf = cf_name, %first, "write failed; retrying once");
            self.db
                .put_cf(self.cf(cf_name), key, value)
                .map_err(|second| StorageError::Fatal(second.to_string()))?;
        }
        Ok(())
    }

    fn get_row<T: DeserializeOwned>(
        &self,
        cf_name: &'static str,
        key: &[u8],
    ) -> Result<Option<T>, StorageError> {
        let Some(bytes) = self
            .db
            .get_cf(self.cf(cf_name), key)
            .map_err(|e| StorageError::Db(e.to_string()))?
        else {
            return Ok(None);
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| StorageError::Corrupt { table: cf_name, reason: e.to_string() })
    }

    fn scan<T: DeserializeOwned>(&self, cf_name: &'static str) -> Result<Vec<T>, StorageError> {
        let mut rows = Vec::new();
        for entry in self.db.iterator_cf(self.cf(cf_name), IteratorMode::Start) {
            let (_, value) = entry.map_err(|e| StorageError::Db(e.to_string()))?;
            rows.push(serde_json::from_slice(&value).map_err(|e| StorageError::Corrupt {
                table: cf_name,
                reason: e.to_string(),
            })?);
        }
        Ok(rows)
    }

    fn next_id(&self, counter: &[u8]) -> Result<u64, StorageError> {
        let _guard = self.counters.lock().expect("counter lock poisoned");
        let next = self.read_counter(counter)?;
        self.put_retry(CF_META, counter, &(next + 1).to_be_bytes())?;
        Ok(next)
    }

    fn peek_id(&self, counter: &[u8]) -> Result<u64, StorageError> {
        let _guard = self.counters.lock().expect("counter lock poisoned");
        self.read_counter(counter)
    }

    fn bump_id_to(&self, counter: &[u8], at_least: u64) -> Result<(), StorageError> {
        let _guard = self.counters.lock().expect("counter lock poisoned");
        let current = self.read_counter(counter)?;
        if at_least > current {
            self.put_retry(CF_META, counter, &at_least.to_be_bytes())?;
        }
        Ok(())
    }

    fn read_counter(&self, counter: &[u8]) -> Result<u64, StorageError> {
        let bytes = self
            .db
            .get_cf(self.cf(CF_META), counter)
            .map_err(|e| StorageError::Db(e.to_string()))?;
        Ok(bytes
            .map(|b| u64::from_be_bytes(b.as_slice().try_into().unwrap_or_default()))
            .unwrap_or(0))
    }
}

impl ConsumedTxStore for SentinelStore {
    fn load(&self) -> Result<Vec<(B256, String)>, String> {
        let mut rows = Vec::new();
        for entry in self.db.iterator_cf(self.cf(CF_CONSUMED_TX), IteratorMode::Start) {
            let (key, value) = entry.map_err(|e| e.to_string())?;
            if key.len() != 32 {
                return Err(format!("consumed_tx key of length {}", key.len()));
            }
            let row: ConsumedTxRow = serde_json::from_slice(&value).map_err(|e| e.to_string())?;
            rows.push((B256::from_slice(&key), row.invoice_id));
        }
        Ok(rows)
    }

    fn record(&self, tx_hash: B256, invoice_id: &str) -> Result<(), String> {
        let row =
            ConsumedTxRow { invoice_id: invoice_id.to_string(), consumed_at: Utc::now() };
        self.put_row(CF_CONSUMED_TX, tx_hash.as_slice(), &row).map_err(|e| e.to_string())
    }
}

impl PaymentSink for SentinelStore {
    fn append_payment(&self, record: &PaymentRecord) -> Result<u64, String> {
        let id = self.next_id(META_NEXT_PAYMENT).map_err(|e| e.to_string())?;
        let mut row = record.clone();
        row.id = id;
        self.put_row(CF_PAYMENTS, &id.to_be_bytes(), &row).map_err(|e| e.to_string())?;
        Ok(id)
    }
}

impl TransitionSink for SentinelStore {
    fn append_transition(&self, transition: &Transition) -> Result<(), String> {
        self.put_row(CF_TRANSITIONS, &transition.id.to_be_bytes(), transition)
            .map_err(|e| e.to_string())?;
        self.bump_id_to(META_NEXT_TRANSITION, transition.id + 1).map_err(|e| e.to_string())
    }
}
