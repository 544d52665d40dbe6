//! Reqwest-backed [`Gateway402`] transport.

use crate::{Gateway402, GatewayReply, InvoiceBody, PAYMENT_RECEIPT_HEADER};
use alloy_primitives::B256;
use async_trait::async_trait;
use std::{collections::BTreeMap, time::Duration};
use url::Url;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const ERROR_BODY_CAP: usize = 512;

/// HTTP client for the market-data gateway.
#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpGateway {
    /// Creates a client rooted at the gateway base URL.
    pub fn new(base_url: Url) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("gateway client builder failed");
        Self { client, base_url }
    }
}

#[async_trait]
impl Gateway402 for HttpGateway {
    async fn request(
        &self,
        endpoint: &str,
        params: &BTreeMap<String, String>,
        receipt: Option<B256>,
    ) -> Result<GatewayReply, String> {
        let url = self.base_url.join(endpoint).map_err(|e| e.to_string())?;
        let query: Vec<(&String, &String)> = params.iter().collect();
        let mut request = self.client.get(url).query(&query);
        if let Some(tx_hash) = receipt {
            request = request.header(PAYMENT_RECEIPT_HEADER, tx_hash.to_string());
        }

        let response = request.send().await.map_err(|e| e.to_string())?;
        match response.status().as_u16() {
            200 => {
                let body = response.bytes().await.map_err(|e| e.to_string())?;
                Ok(GatewayReply::Ok(body.to_vec().into()))
            }
            402 => {
                let body: InvoiceBody = response
                    .json()
                    .await
                    .map_err(|e| format!("malformed 402 invoice body: {e}"))?;
                Ok(GatewayReply::PaymentRequired(body))
            }
            status => {
                let mut body = response.text().await.unwrap_or_default();
                body.truncate(ERROR_BODY_CAP);
                Ok(GatewayReply::Error { status, body })
            }
        }
    }
}
