#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]

#[macro_use]
extern crate tracing;

mod store;
pub use store::{ConsumedTxStore, MemoryConsumedTxStore};

mod verifier;
pub use verifier::{SettlementVerifier, VerificationResult, VerifyFailure, WatchOutcome};
