//! Ledger error types.

use sentinel_types::MicroUsdc;
use thiserror::Error;

/// An error returned by the [`BudgetLedger`](crate::BudgetLedger).
///
/// A rejected operation never modifies ledger state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BudgetError {
    /// The requested reservation does not fit under the cap.
    #[error("insufficient funds: requested {requested} µUSDC with {remaining} µUSDC remaining")]
    InsufficientFunds {
        /// Amount that was asked for.
        requested: MicroUsdc,
        /// Uncommitted, unreserved budget at rejection time.
        remaining: MicroUsdc,
    },
    /// The handle does not refer to a live reservation.
    #[error("unknown reservation {0}")]
    UnknownReservation(u64),
    /// The reservation was already released and cannot be committed.
    #[error("reservation {0} was already released")]
    ReservationReleased(u64),
}
