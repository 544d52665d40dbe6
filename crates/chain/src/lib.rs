#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]

#[macro_use]
extern crate tracing;

mod errors;
pub use errors::ChainError;

mod erc20;
pub use erc20::{Erc20, TRANSFER_TOPIC};

mod traits;
pub use traits::{ChainProvider, ReceiptInfo, TransferLog};

mod online;
pub use online::{OnlineChainProvider, rpc_backoff};

mod treasury;
pub use treasury::{ChainTarget, TreasuryReader};

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
