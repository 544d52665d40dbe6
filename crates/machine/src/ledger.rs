//! The transition ledger: every attempt, successful or not.

use sentinel_types::Transition;
use std::{collections::VecDeque, sync::Arc};

/// Durable sink for transition rows, implemented by the store.
pub trait TransitionSink: Send + Sync {
    /// Appends one row.
    fn append_transition(&self, transition: &Transition) -> Result<(), String>;
}

impl<T: TransitionSink> TransitionSink for Arc<T> {
    fn append_transition(&self, transition: &Transition) -> Result<(), String> {
        self.as_ref().append_transition(transition)
    }
}

/// Append-only in-memory ledger, write-through to the sink, capped at
/// `cap` entries with the oldest evicted first.
pub struct TransitionLedger {
    cap: usize,
    next_id: u64,
    entries: VecDeque<Transition>,
    sink: Option<Arc<dyn TransitionSink>>,
}

impl core::fmt::Debug for TransitionLedger {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TransitionLedger")
            .field("cap", &self.cap)
            .field("next_id", &self.next_id)
            .field("entries", &self.entries.len())
            .finish()
    }
}

impl TransitionLedger {
    /// Default in-memory cap.
    pub const DEFAULT_CAP: usize = 1000;

    /// Creates a ledger with the given cap and optional durable sink.
    pub fn new(cap: usize, sink: Option<Arc<dyn TransitionSink>>) -> Self {
        Self { cap: cap.max(1), next_id: 0, entries: VecDeque::new(), sink }
    }

    /// Assigns the next monotonic id.
    pub fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Seeds the id counter, used when resuming over persisted rows.
    pub fn seed_ids(&mut self, next_id: u64) {
        self.next_id = self.next_id.max(next_id);
    }

    /// Appends a record, writes it through to the sink, and evicts beyond
    /// the cap.
    pub fn append(&mut self, transition: Transition) {
        if let Some(sink) = &self.sink {
            if let Err(err) = sink.append_transition(&transition) {
                error!(
                    target: "machine",
                    id = transition.id,
                    %err,
                    "failed to persist transition"
                );
            }
        }
        self.entries.push_back(transition);
        while self.entries.len() > self.cap {
            self.entries.pop_front();
        }
    }

    /// In-memory entries, oldest first.
    pub fn entries(&self) -> impl Iterator<Item = &Transition> {
        self.entries.iter()
    }

    /// Number of entries held in memory.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the in-memory window is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
