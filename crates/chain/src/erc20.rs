//! The minimal ERC-20 surface the sentinel touches.

use alloy_primitives::B256;
use alloy_sol_types::{SolEvent, sol};

sol! {
    /// Balance reads, metadata reads, transfers and the Transfer event.
    #[derive(Debug, PartialEq, Eq)]
    interface Erc20 {
        function balanceOf(address owner) external view returns (uint256);
        function decimals() external view returns (uint8);
        function symbol() external view returns (string);
        function transfer(address to, uint256 amount) external returns (bool);
        event Transfer(address indexed from, address indexed to, uint256 value);
    }
}

/// `keccak256("Transfer(address,address,uint256)")`, the topic settlement
/// log scans filter on.
pub const TRANSFER_TOPIC: B256 = Erc20::Transfer::SIGNATURE_HASH;
