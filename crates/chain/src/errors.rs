//! Chain access errors.

use thiserror::Error;

/// An error surfaced by a [`ChainProvider`](crate::ChainProvider).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    /// The RPC endpoint failed after retry exhaustion.
    #[error("rpc error: {0}")]
    Rpc(String),
    /// A log could not be decoded as an ERC-20 Transfer.
    #[error("malformed log: {0}")]
    MalformedLog(String),
}

impl ChainError {
    /// Wraps any displayable transport failure.
    pub fn rpc(err: impl core::fmt::Display) -> Self {
        Self::Rpc(err.to_string())
    }
}
