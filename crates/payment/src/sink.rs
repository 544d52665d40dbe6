//! Where confirmed and failed payment rows go.

use sentinel_types::PaymentRecord;
use std::sync::{Arc, Mutex};

/// Durable sink for payment rows, implemented by the store.
pub trait PaymentSink: Send + Sync {
    /// Appends a row, returning its assigned id.
    fn append_payment(&self, record: &PaymentRecord) -> Result<u64, String>;
}

impl<T: PaymentSink> PaymentSink for Arc<T> {
    fn append_payment(&self, record: &PaymentRecord) -> Result<u64, String> {
        self.as_ref().append_payment(record)
    }
}

/// In-memory sink for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryPaymentSink {
    rows: Mutex<Vec<PaymentRecord>>,
}

impl MemoryPaymentSink {
    /// Rows appended so far.
    pub fn rows(&self) -> Vec<PaymentRecord> {
        self.rows.lock().expect("payment sink lock poisoned").clone()
    }
}

impl PaymentSink for MemoryPaymentSink {
    fn append_payment(&self, record: &PaymentRecord) -> Result<u64, String> {
        let mut rows = self.rows.lock().expect("payment sink lock poisoned");
        let id = rows.len() as u64 + 1;
        let mut row = record.clone();
        row.id = id;
        rows.push(row);
        Ok(id)
    }
}
