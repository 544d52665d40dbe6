//! Durable backing for the consumed-tx double-spend set.

use alloy_primitives::B256;
use std::sync::{Arc, Mutex};

/// Persists tx-hash → invoice bindings so double-spend prevention survives
/// restarts.
///
/// Record failures must be handled internally where possible; the verifier
/// logs a returned error and keeps the in-memory binding.
pub trait ConsumedTxStore: Send + Sync {
    /// All previously recorded bindings.
    fn load(&self) -> Result<Vec<(B256, String)>, String>;

    /// Durably binds a tx hash to the invoice that consumed it.
    fn record(&self, tx_hash: B256, invoice_id: &str) -> Result<(), String>;
}

impl<T: ConsumedTxStore> ConsumedTxStore for Arc<T> {
    fn load(&self) -> Result<Vec<(B256, String)>, String> {
        self.as_ref().load()
    }

    fn record(&self, tx_hash: B256, invoice_id: &str) -> Result<(), String> {
        self.as_ref().record(tx_hash, invoice_id)
    }
}

/// In-memory store for tests and ephemeral runs.
#[derive(Debug, Default)]
pub struct MemoryConsumedTxStore {
    rows: Mutex<Vec<(B256, String)>>,
}

impl ConsumedTxStore for MemoryConsumedTxStore {
    fn load(&self) -> Result<Vec<(B256, String)>, String> {
        Ok(self.rows.lock().expect("consumed tx store lock poisoned").clone())
    }

    fn record(&self, tx_hash: B256, invoice_id: &str) -> Result<(), String> {
        self.rows
            .lock()
            .expect("consumed tx store lock poisoned")
            .push((tx_hash, invoice_id.to_string()));
        Ok(())
    }
}
