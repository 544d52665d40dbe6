#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]

#[macro_use]
extern crate tracing;

mod errors;
pub use errors::BudgetError;

mod ledger;
pub use ledger::{BudgetLedger, BudgetStatus, ReservationHandle};

mod traits;
pub use traits::ReserveBudget;
