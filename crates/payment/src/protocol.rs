//! The 402 wire protocol, client side.

use alloy_primitives::{Address, B256, Bytes};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sentinel_types::{Invoice, InvoiceStatus, micro_from_usdc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Header carrying the settlement proof on a retried request.
pub const PAYMENT_RECEIPT_HEADER: &str = "X-Payment-Receipt";

/// JSON body of a 402 response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceBody {
    /// Gateway-issued invoice id.
    pub invoice_id: String,
    /// Demanded amount, USDC.
    pub amount_usdc: f64,
    /// Where the USDC must arrive.
    pub payment_address: Address,
    /// RFC3339 settlement deadline.
    pub expires_at: DateTime<Utc>,
    /// The metered endpoint.
    pub endpoint: String,
}

impl InvoiceBody {
    /// Validates the wire body into an [`Invoice`].
    pub fn into_invoice(self, now: DateTime<Utc>) -> Result<Invoice, String> {
        if self.invoice_id.is_empty() {
            return Err("invoice id is empty".to_string());
        }
        if self.payment_address == Address::ZERO {
            return Err("payment address is zero".to_string());
        }
        let amount = micro_from_usdc(self.amount_usdc);
        if amount == 0 {
            return Err(format!("invoice amount {} is not payable", self.amount_usdc));
        }
        if self.expires_at <= now {
            return Err("invoice is already expired".to_string());
        }
        Ok(Invoice {
            id: self.invoice_id,
            amount,
            recipient: self.payment_address,
            endpoint: self.endpoint,
            created_at: now,
            expires_at: self.expires_at,
            status: InvoiceStatus::Pending,
        })
    }
}

/// What the gateway answered.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayReply {
    /// 200 with the data payload.
    Ok(Bytes),
    /// 402 with a parsed invoice.
    PaymentRequired(InvoiceBody),
    /// Any other status.
    Error {
        /// HTTP status code.
        status: u16,
        /// Response body, truncated.
        body: String,
    },
}

/// Transport seam for the 402 flow, so tests stub HTTP.
///
/// An `Err` is a transport-level failure (connect, timeout, malformed 402
/// body); status-level failures come back as [`GatewayReply::Error`].
#[async_trait]
pub trait Gateway402: Send + Sync {
    /// Issues the request, optionally carrying a settlement proof.
    async fn request(
        &self,
        endpoint: &str,
        params: &BTreeMap<String, String>,
        receipt: Option<B256>,
    ) -> Result<GatewayReply, String>;
}

#[async_trait]
impl<T: Gateway402 + ?Sized> Gateway402 for std::sync::Arc<T> {
    async fn request(
        &self,
        endpoint: &str,
        params: &BTreeMap<String, String>,
        receipt: Option<B256>,
    ) -> Result<GatewayReply, String> {
        self.as_ref().request(endpoint, params, receipt).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn body() -> InvoiceBody {
        InvoiceBody {
            invoice_id: "inv-7".into(),
            amount_usdc: 0.25,
            payment_address: Address::repeat_byte(0x02),
            expires_at: Utc::now() + TimeDelta::seconds(900),
            endpoint: "liquidity_depth".into(),
        }
    }

    #[test]
    fn parses_the_documented_wire_shape() {
        let json = format!(
            r#"{{
                "invoice_id": "inv-7",
                "amount_usdc": 0.25,
                "payment_address": "0x0202020202020202020202020202020202020202",
                "expires_at": "{}",
                "endpoint": "liquidity_depth"
            }}"#,
            (Utc::now() + TimeDelta::seconds(900)).to_rfc3339()
        );
        let parsed: InvoiceBody = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.invoice_id, "inv-7");
        assert_eq!(parsed.payment_address, Address::repeat_byte(0x02));
    }

    #[test]
    fn converts_to_micro_usdc() {
        let invoice = body().into_invoice(Utc::now()).unwrap();
        assert_eq!(invoice.amount, 250_000);
        assert_eq!(invoice.status, InvoiceStatus::Pending);
    }

    #[test]
    fn rejects_zero_amount() {
        let wire = InvoiceBody { amount_usdc: 0.0, ..body() };
        assert!(wire.into_invoice(Utc::now()).is_err());
    }

    #[test]
    fn rejects_zero_address() {
        let wire = InvoiceBody { payment_address: Address::ZERO, ..body() };
        assert!(wire.into_invoice(Utc::now()).is_err());
    }

    #[test]
    fn rejects_pre_expired_invoice() {
        let wire = InvoiceBody { expires_at: Utc::now() - TimeDelta::seconds(1), ..body() };
        assert!(wire.into_invoice(Utc::now()).is_err());
    }
}
