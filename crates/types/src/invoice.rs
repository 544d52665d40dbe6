//! Invoices minted by 402 responses and the receipts that settle them.

use crate::MicroUsdc;
use alloy_primitives::{Address, B256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of an invoice held by the payment pipeline.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display,
)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    /// Parsed from a 402 body; no payment submitted yet.
    #[display("PENDING")]
    Pending,
    /// A USDC transfer has been broadcast.
    #[display("SUBMITTED")]
    Submitted,
    /// Settlement verified on-chain.
    #[display("VERIFIED")]
    Verified,
    /// The TTL elapsed before settlement.
    #[display("EXPIRED")]
    Expired,
    /// Payment or verification failed.
    #[display("FAILED")]
    Failed,
}

/// A payment demand embedded in a 402 response.
///
/// Ids are unique for the process lifetime; the pipeline holds at most one
/// invoice per in-flight market-data request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    /// Gateway-issued invoice id.
    pub id: String,
    /// Demanded amount.
    pub amount: MicroUsdc,
    /// Where the USDC must arrive on Base.
    pub recipient: Address,
    /// The data endpoint this invoice meters.
    pub endpoint: String,
    /// When the invoice was minted.
    pub created_at: DateTime<Utc>,
    /// Hard deadline for settlement.
    pub expires_at: DateTime<Utc>,
    /// Current lifecycle state.
    pub status: InvoiceStatus,
}

impl Invoice {
    /// Whether the settlement deadline has passed.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// The client-side record of a verified on-chain settlement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    /// The invoice this settles.
    pub invoice_id: String,
    /// Hash of the settling transaction.
    pub tx_hash: B256,
    /// Observed sender of the transfer.
    pub sender: Address,
    /// Observed amount. May exceed the invoice amount; the excess is not
    /// refunded.
    pub amount_observed: MicroUsdc,
    /// Block the transfer landed in.
    pub block_number: u64,
    /// Confirmations at verification time.
    pub confirmations: u64,
    /// When verification completed.
    pub verified_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    #[test]
    fn expiry_is_inclusive() {
        let now = Utc::now();
        let invoice = Invoice {
            id: "inv-1".into(),
            amount: 250_000,
            recipient: Address::ZERO,
            endpoint: "liquidity_depth".into(),
            created_at: now,
            expires_at: now + TimeDelta::seconds(900),
            status: InvoiceStatus::Pending,
        };
        assert!(!invoice.is_expired(now));
        assert!(!invoice.is_expired(now + TimeDelta::seconds(899)));
        assert!(invoice.is_expired(now + TimeDelta::seconds(900)));
    }
}
