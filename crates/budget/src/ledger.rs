//! The budget ledger.

use crate::BudgetError;
use sentinel_types::MicroUsdc;
use std::{collections::HashMap, sync::Mutex};

/// Opaque handle to a live reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReservationHandle {
    id: u64,
    amount: MicroUsdc,
}

impl ReservationHandle {
    /// The reserved amount.
    pub const fn amount(&self) -> MicroUsdc {
        self.amount
    }
}

/// Point-in-time view of the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BudgetStatus {
    /// Hard cap.
    pub limit: MicroUsdc,
    /// Committed spend.
    pub spent: MicroUsdc,
    /// Outstanding reservations.
    pub reserved: MicroUsdc,
    /// `limit - spent - reserved`.
    pub remaining: MicroUsdc,
    /// Whether `remaining` is below the operational minimum.
    pub blocked: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReservationState {
    Outstanding,
    Committed,
    Released,
}

#[derive(Debug)]
struct Inner {
    spent: MicroUsdc,
    reserved: MicroUsdc,
    next_id: u64,
    reservations: HashMap<u64, (MicroUsdc, ReservationState)>,
}

/// The single source of truth for budget spend.
///
/// Invariants, enforced inside one critical section:
/// `spent + reserved <= limit` at every observable point, and `spent` is
/// monotonically non-decreasing between [`BudgetLedger::reset`] calls.
#[derive(Debug)]
pub struct BudgetLedger {
    limit: MicroUsdc,
    minimum_operational: MicroUsdc,
    inner: Mutex<Inner>,
}

impl BudgetLedger {
    /// Creates a ledger with a hard cap and the operational minimum below
    /// which [`BudgetStatus::blocked`] reports true.
    pub fn new(limit: MicroUsdc, minimum_operational: MicroUsdc) -> Self {
        Self {
            limit,
            minimum_operational,
            inner: Mutex::new(Inner {
                spent: 0,
                reserved: 0,
                next_id: 0,
                reservations: HashMap::new(),
            }),
        }
    }

    /// Atomically checks and records a reservation.
    ///
    /// Fails without modifying state when `spent + reserved + amount`
    /// would exceed the cap.
    pub fn reserve(&self, amount: MicroUsdc) -> Result<ReservationHandle, BudgetError> {
        let mut inner = self.inner.lock().expect("budget ledger lock poisoned");
        let in_use = inner.spent.saturating_add(inner.reserved);
        let remaining = self.limit.saturating_sub(in_use);
        if amount > remaining {
            debug!(target: "budget", requested = amount, remaining, "reservation rejected");
            return Err(BudgetError::InsufficientFunds { requested: amount, remaining });
        }
        let id = inner.next_id;
        inner.next_id += 1;
        inner.reserved += amount;
        inner.reservations.insert(id, (amount, ReservationState::Outstanding));
        trace!(target: "budget", id, amount, "reserved");
        Ok(ReservationHandle { id, amount })
    }

    /// Turns a reservation into committed spend. Idempotent on the handle.
    ///
    /// Returns the committed amount.
    pub fn commit(&self, handle: &ReservationHandle) -> Result<MicroUsdc, BudgetError> {
        let mut inner = self.inner.lock().expect("budget ledger lock poisoned");
        let (amount, state) = *inner
            .reservations
            .get(&handle.id)
            .ok_or(BudgetError::UnknownReservation(handle.id))?;
        match state {
            ReservationState::Committed => Ok(amount),
            ReservationState::Released => Err(BudgetError::ReservationReleased(handle.id)),
            ReservationState::Outstanding => {
                inner.reserved -= amount;
                inner.spent += amount;
                inner.reservations.insert(handle.id, (amount, ReservationState::Committed));
                debug!(target: "budget", id = handle.id, amount, spent = inner.spent, "committed");
                Ok(amount)
            }
        }
    }

    /// Cancels a reservation. Idempotent; committed reservations are left
    /// untouched.
    pub fn release(&self, handle: &ReservationHandle) {
        let mut inner = self.inner.lock().expect("budget ledger lock poisoned");
        let Some((amount, state)) = inner.reservations.get(&handle.id).copied() else {
            return;
        };
        if state == ReservationState::Outstanding {
            inner.reserved -= amount;
            inner.reservations.insert(handle.id, (amount, ReservationState::Released));
            trace!(target: "budget", id = handle.id, amount, "released");
        }
    }

    /// Current ledger state.
    pub fn status(&self) -> BudgetStatus {
        let inner = self.inner.lock().expect("budget ledger lock poisoned");
        let remaining = self.limit.saturating_sub(inner.spent).saturating_sub(inner.reserved);
        BudgetStatus {
            limit: self.limit,
            spent: inner.spent,
            reserved: inner.reserved,
            remaining,
            blocked: remaining < self.minimum_operational,
        }
    }

    /// Releases every outstanding reservation. Used after an aborted run;
    /// with single-flight runs no other holder can exist.
    pub fn release_outstanding(&self) {
        let mut inner = self.inner.lock().expect("budget ledger lock poisoned");
        let open: Vec<(u64, MicroUsdc)> = inner
            .reservations
            .iter()
            .filter(|(_, (_, state))| *state == ReservationState::Outstanding)
            .map(|(id, (amount, _))| (*id, *amount))
            .collect();
        for (id, amount) in open {
            inner.reservations.insert(id, (amount, ReservationState::Released));
            inner.reserved -= amount;
            debug!(target: "budget", id, amount, "released outstanding reservation");
        }
    }

    /// Administrative reset: zeroes spend and drops every reservation.
    pub fn reset(&self) {
        let mut inner = self.inner.lock().expect("budget ledger lock poisoned");
        inner.spent = 0;
        inner.reserved = 0;
        inner.reservations.clear();
        info!(target: "budget", limit = self.limit, "ledger reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn ledger() -> BudgetLedger {
        // 10 USDC cap, 0.05 USDC operational minimum.
        BudgetLedger::new(10_000_000, 50_000)
    }

    #[test]
    fn reserve_commit_accumulates_spend() {
        let ledger = ledger();
        let handle = ledger.reserve(250_000).unwrap();
        assert_eq!(ledger.status().reserved, 250_000);
        assert_eq!(ledger.commit(&handle).unwrap(), 250_000);
        let status = ledger.status();
        assert_eq!(status.spent, 250_000);
        assert_eq!(status.reserved, 0);
        assert_eq!(status.remaining, 9_750_000);
        assert!(!status.blocked);
    }

    #[test]
    fn rejected_reserve_leaves_state_untouched() {
        let ledger = BudgetLedger::new(1_000_000, 50_000);
        let handle = ledger.reserve(900_000).unwrap();
        let err = ledger.reserve(200_000).unwrap_err();
        assert_eq!(err, BudgetError::InsufficientFunds { requested: 200_000, remaining: 100_000 });
        let status = ledger.status();
        assert_eq!(status.reserved, 900_000);
        assert_eq!(status.spent, 0);
        ledger.release(&handle);
        assert_eq!(ledger.status().reserved, 0);
    }

    #[test]
    fn reservations_count_against_the_cap() {
        let ledger = BudgetLedger::new(1_000_000, 50_000);
        let _a = ledger.reserve(600_000).unwrap();
        assert!(ledger.reserve(600_000).is_err());
    }

    #[test]
    fn commit_is_idempotent() {
        let ledger = ledger();
        let handle = ledger.reserve(100_000).unwrap();
        assert_eq!(ledger.commit(&handle).unwrap(), 100_000);
        assert_eq!(ledger.commit(&handle).unwrap(), 100_000);
        assert_eq!(ledger.status().spent, 100_000);
    }

    #[test]
    fn release_is_idempotent_and_respects_commits() {
        let ledger = ledger();
        let committed = ledger.reserve(100_000).unwrap();
        ledger.commit(&committed).unwrap();
        ledger.release(&committed);
        assert_eq!(ledger.status().spent, 100_000);

        let cancelled = ledger.reserve(200_000).unwrap();
        ledger.release(&cancelled);
        ledger.release(&cancelled);
        assert_eq!(ledger.status().reserved, 0);
        assert!(matches!(
            ledger.commit(&cancelled),
            Err(BudgetError::ReservationReleased(_))
        ));
    }

    #[test]
    fn blocked_below_operational_minimum() {
        let ledger = ledger();
        let handle = ledger.reserve(9_960_000).unwrap();
        ledger.commit(&handle).unwrap();
        let status = ledger.status();
        assert_eq!(status.remaining, 40_000);
        assert!(status.blocked);
    }

    #[test]
    fn reset_clears_everything() {
        let ledger = ledger();
        let handle = ledger.reserve(5_000_000).unwrap();
        ledger.commit(&handle).unwrap();
        let _open = ledger.reserve(1_000_000).unwrap();
        ledger.reset();
        let status = ledger.status();
        assert_eq!(status.spent, 0);
        assert_eq!(status.reserved, 0);
        assert_eq!(status.remaining, 10_000_000);
    }

    #[test]
    fn concurrent_reserves_never_exceed_limit() {
        let ledger = Arc::new(BudgetLedger::new(8_000_000, 50_000));
        let mut handles = Vec::new();
        // 20 threads each try to reserve 0.5 USDC under an 8 USDC cap.
        for _ in 0..20 {
            let ledger = Arc::clone(&ledger);
            handles.push(std::thread::spawn(move || ledger.reserve(500_000).is_ok()));
        }
        let granted = handles.into_iter().filter(|h| h.join().unwrap()).count();
        assert_eq!(granted, 16);
        let status = ledger.status();
        assert_eq!(status.reserved, 8_000_000);
        assert_eq!(status.remaining, 0);
    }
}
