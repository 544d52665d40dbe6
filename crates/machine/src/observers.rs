//! Typed transition observers, registered at composition time.

use sentinel_types::Transition;

/// Receives every appended transition record.
pub trait TransitionObserver: Send + Sync {
    /// Called after the record is appended to the ledger.
    fn on_transition(&self, transition: &Transition);
}
