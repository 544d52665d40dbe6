//! Narrow reservation capability consumed by the state machine and the
//! payment pipeline, so neither needs the full ledger surface.

use crate::{BudgetError, BudgetLedger, BudgetStatus, ReservationHandle};
use sentinel_types::MicroUsdc;

/// Reserve/commit/release capability over the budget.
pub trait ReserveBudget: Send + Sync {
    /// Atomically checks and records a reservation.
    fn reserve(&self, amount: MicroUsdc) -> Result<ReservationHandle, BudgetError>;

    /// Turns a reservation into committed spend.
    fn commit(&self, handle: &ReservationHandle) -> Result<MicroUsdc, BudgetError>;

    /// Cancels a reservation.
    fn release(&self, handle: &ReservationHandle);

    /// Current ledger state.
    fn status(&self) -> BudgetStatus;
}

impl ReserveBudget for BudgetLedger {
    fn reserve(&self, amount: MicroUsdc) -> Result<ReservationHandle, BudgetError> {
        Self::reserve(self, amount)
    }

    fn commit(&self, handle: &ReservationHandle) -> Result<MicroUsdc, BudgetError> {
        Self::commit(self, handle)
    }

    fn release(&self, handle: &ReservationHandle) {
        Self::release(self, handle);
    }

    fn status(&self) -> BudgetStatus {
        Self::status(self)
    }
}
