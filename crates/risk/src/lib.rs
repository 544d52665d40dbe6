#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]

mod book;
pub use book::{BookLevel, OrderBook};

mod lcr;
pub use lcr::liquidity_coverage;

mod exit;
pub use exit::exit_half_life;

mod volatility;
pub use volatility::{annualized_volatility, regime_for};

mod depth;
pub use depth::{DEPTH_BAND_TARGETS, depth_bands};

mod impact;
pub use impact::{IMPACT_TARGETS_USD, impact_curve};

mod score;
pub use score::risk_score;

mod engine;
pub use engine::{MarketObservations, MetricEngine};
