#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]

#[macro_use]
extern crate tracing;

mod context;
pub use context::EscalationContext;

mod guards;
pub use guards::{GuardCtx, evaluate_guard, risk_signal};

mod table;
pub use table::{TransitionSpec, natural_target, resolve};

mod market;
pub use market::{MarketData, MarketDataError, MarketPurchase};

mod ledger;
pub use ledger::{TransitionLedger, TransitionSink};

mod observers;
pub use observers::TransitionObserver;

mod machine;
pub use machine::{EscalationStateMachine, MachineConfig, StepOutcome};

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
