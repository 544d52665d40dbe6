#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]

mod units;
pub use units::{MICRO_PER_USDC, MicroUsdc, micro_from_usdc, usdc_from_micro};

mod constants;
pub use constants::{BASE_CHAIN_ID, USDC_BASE_ADDRESS, USDC_DECIMALS};

mod level;
pub use level::Level;

mod transition;
pub use transition::{GuardKind, Transition, Trigger};

mod invoice;
pub use invoice::{Invoice, InvoiceStatus, Receipt};

mod run;
pub use run::{PaymentRecord, PaymentStatus, RunRecord, RunStatus};

mod snapshot;
pub use snapshot::{TokenBalance, TreasurySnapshot};

mod metrics;
pub use metrics::{
    DepthBand, ExitMetric, ImpactCurve, ImpactPoint, LcrMetric, RiskLevel, RiskMetrics, RiskScore,
    VolatilityMetric, VolatilityRegime,
};

mod config;
pub use config::{ChainConfig, ConfigError, RiskThresholds, SentinelConfig};
