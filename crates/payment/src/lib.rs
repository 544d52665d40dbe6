#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]

#[macro_use]
extern crate tracing;

mod errors;
pub use errors::PipelineError;

mod protocol;
pub use protocol::{Gateway402, GatewayReply, InvoiceBody, PAYMENT_RECEIPT_HEADER};

mod http;
pub use http::HttpGateway;

mod submitter;
pub use submitter::{PaymentSubmitter, WalletSubmitter};

mod sink;
pub use sink::{MemoryPaymentSink, PaymentSink};

mod pipeline;
pub use pipeline::{PaymentOutcome, PaymentPipeline};

mod gateway;
pub use gateway::{MarketDataEndpoint, MarketDataGateway};

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
