//! Agent configuration, loaded from TOML and validated fail-fast at startup.

use crate::{MicroUsdc, USDC_BASE_ADDRESS, VolatilityRegime, micro_from_usdc};
use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};
use thiserror::Error;

/// A configuration the agent refuses to start with.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The config file is not valid TOML for [`SentinelConfig`].
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    /// A value is present but unusable.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// One monitored chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChainConfig {
    /// EVM chain id.
    pub chain_id: u64,
    /// JSON-RPC endpoint.
    pub rpc_url: String,
    /// Treasury wallet to snapshot.
    pub treasury_address: Address,
    /// ERC-20 contracts to track in addition to the native balance.
    #[serde(default)]
    pub tracked_tokens: Vec<Address>,
}

/// Thresholds feeding the escalation guards.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RiskThresholds {
    /// LCR below this raises the alert guard.
    pub lcr_warning: f64,
    /// LCR below this satisfies the critical guard.
    pub lcr_critical: f64,
    /// Tightest-band depth below this notional satisfies the crisis guard.
    pub depth_crisis_usd: f64,
    /// Maximum participation rate used for exit half-life.
    pub participation_rate: f64,
    /// Volatility regime at or above which the alert guard fires.
    pub escalate_volatility: VolatilityRegime,
    /// Haircut applied to non-stable priced positions when counting HQLA.
    pub hqla_haircut: f64,
    /// Projected 30-day outflows as a fraction of portfolio value.
    pub outflow_rate: f64,
    /// Projected 30-day inflows as a fraction of portfolio value.
    pub inflow_rate: f64,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            lcr_warning: 1.2,
            lcr_critical: 1.0,
            depth_crisis_usd: 250_000.0,
            participation_rate: 0.1,
            escalate_volatility: VolatilityRegime::Elevated,
            hqla_haircut: 0.85,
            outflow_rate: 0.25,
            inflow_rate: 0.0,
        }
    }
}

/// Top-level agent configuration.
///
/// Every field has a default except `chains` and
/// `gateway_recipient_address`, which [`SentinelConfig::validate`] requires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SentinelConfig {
    /// Hard budget cap, USDC.
    pub budget_limit_usdc: f64,
    /// Scheduler cadence, standard five-field cron in UTC.
    pub cron_expression: String,
    /// Minimum Base confirmations before a settlement verifies.
    pub confirmation_blocks: u64,
    /// Invoice TTL, seconds.
    pub invoice_ttl_seconds: u64,
    /// Settlement watch poll interval, milliseconds.
    pub settlement_poll_interval_ms: u64,
    /// Per-run deadline, milliseconds.
    pub run_timeout_ms: u64,
    /// Minimum dwell time per level, minutes.
    pub cooldown_minutes: u64,
    /// Below this remaining budget the machine is budget-blocked, USDC.
    pub minimum_operational_usdc: f64,
    /// Remaining budget at or above this exits BUDGET_BLOCKED, USDC.
    pub budget_warning_usdc: f64,
    /// Monitored chains.
    pub chains: Vec<ChainConfig>,
    /// USDC contract on Base.
    pub usdc_base_address: Address,
    /// Where market-data payments must arrive.
    pub gateway_recipient_address: Address,
    /// Base URL of the market-data gateway.
    pub gateway_url: String,
    /// Instrument pair used for market-data requests.
    pub market_pair: String,
    /// Hex private key funding USDC payments. Absent keys leave the agent
    /// advisory-only: paid transitions fail at submission.
    pub payer_private_key: Option<String>,
    /// Directory for the durable store.
    pub data_dir: PathBuf,
    /// Scheduler shutdown grace period, seconds.
    pub grace_period_seconds: u64,
    /// Guard thresholds.
    pub thresholds: RiskThresholds,
}

impl Default for SentinelConfig {
    fn default() -> Self {
        Self {
            budget_limit_usdc: 10.0,
            cron_expression: "*/15 * * * *".to_string(),
            confirmation_blocks: 3,
            invoice_ttl_seconds: 900,
            settlement_poll_interval_ms: 5_000,
            run_timeout_ms: 300_000,
            cooldown_minutes: 5,
            minimum_operational_usdc: 0.05,
            budget_warning_usdc: 0.5,
            chains: Vec::new(),
            usdc_base_address: USDC_BASE_ADDRESS,
            gateway_recipient_address: Address::ZERO,
            gateway_url: "http://127.0.0.1:8402".to_string(),
            market_pair: "eth-usd".to_string(),
            payer_private_key: None,
            data_dir: PathBuf::from("./sentinel-data"),
            grace_period_seconds: 30,
            thresholds: RiskThresholds::default(),
        }
    }
}

impl SentinelConfig {
    /// Reads and parses a TOML config file. Does not validate.
    pub fn from_toml_path(path: &std::path::Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        Ok(toml::from_str(&raw)?)
    }

    /// Rejects configurations the agent cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chains.is_empty() {
            return Err(ConfigError::Invalid("at least one chain must be configured".into()));
        }
        for chain in &self.chains {
            if chain.rpc_url.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "chain {} has an empty rpc_url",
                    chain.chain_id
                )));
            }
        }
        if self.gateway_recipient_address == Address::ZERO {
            return Err(ConfigError::Invalid("gateway_recipient_address must be set".into()));
        }
        if self.budget_limit_usdc <= 0.0 {
            return Err(ConfigError::Invalid("budget_limit_usdc must be positive".into()));
        }
        if self.minimum_operational_usdc >= self.budget_limit_usdc {
            return Err(ConfigError::Invalid(
                "minimum_operational_usdc must be below budget_limit_usdc".into(),
            ));
        }
        if self.confirmation_blocks == 0 {
            return Err(ConfigError::Invalid("confirmation_blocks must be at least 1".into()));
        }
        if self.cron_expression.trim().is_empty() {
            return Err(ConfigError::Invalid("cron_expression must not be empty".into()));
        }
        let rate = self.thresholds.participation_rate;
        if !(rate > 0.0 && rate <= 1.0) {
            return Err(ConfigError::Invalid(
                "thresholds.participation_rate must be in (0, 1]".into(),
            ));
        }
        Ok(())
    }

    /// Budget cap in µUSDC.
    pub fn budget_limit_micro(&self) -> MicroUsdc {
        micro_from_usdc(self.budget_limit_usdc)
    }

    /// Operational minimum in µUSDC.
    pub fn minimum_operational_micro(&self) -> MicroUsdc {
        micro_from_usdc(self.minimum_operational_usdc)
    }

    /// Budget-restored threshold in µUSDC.
    pub fn budget_warning_micro(&self) -> MicroUsdc {
        micro_from_usdc(self.budget_warning_usdc)
    }

    /// Invoice TTL as a [`Duration`].
    pub const fn invoice_ttl(&self) -> Duration {
        Duration::from_secs(self.invoice_ttl_seconds)
    }

    /// Settlement poll interval as a [`Duration`].
    pub const fn settlement_poll_interval(&self) -> Duration {
        Duration::from_millis(self.settlement_poll_interval_ms)
    }

    /// Per-run deadline as a [`Duration`].
    pub const fn run_timeout(&self) -> Duration {
        Duration::from_millis(self.run_timeout_ms)
    }

    /// Per-level cooldown as a [`Duration`].
    pub const fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_minutes * 60)
    }

    /// Shutdown grace period as a [`Duration`].
    pub const fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_seconds)
    }
}
