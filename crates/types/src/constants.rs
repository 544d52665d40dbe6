//! Protocol constants for the Base chain settlement rail.

use alloy_primitives::{Address, address};

/// Chain id of the Base network, where market-data payments settle.
pub const BASE_CHAIN_ID: u64 = 8453;

/// The USD Coin ERC-20 contract on Base.
pub const USDC_BASE_ADDRESS: Address = address!("833589fCD6eDb6E08f4c7C32D4f71b54bdA02913");

/// USDC token decimals; raw transfer amounts are already µUSDC.
pub const USDC_DECIMALS: u8 = 6;
