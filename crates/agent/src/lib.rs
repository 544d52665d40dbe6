#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]

#[macro_use]
extern crate tracing;

mod errors;
pub use errors::AgentError;

mod market;
pub use market::{GatewayMarketData, UnfundedSubmitter};

mod run;
pub use run::AgentRun;

mod replay;
pub use replay::{ReplayReport, replay_run};

mod scheduler;
pub use scheduler::{Scheduler, parse_cron};

mod builder;
pub use builder::{Agent, OnlineGateway, OnlinePaymentPipeline, build_agent};
