//! The mutable carrier the machine owns.

use chrono::{DateTime, Utc};
use sentinel_types::Level;
use std::time::{Duration, Instant};

/// Level, dwell timing and pause flag. Owned exclusively by the machine;
/// guards see read-only views.
#[derive(Debug, Clone)]
pub struct EscalationContext {
    /// Current level.
    pub level: Level,
    /// Monotonic time the current level was entered.
    pub entered_at: Instant,
    /// Wall-clock time the current level was entered.
    pub entered_at_wall: DateTime<Utc>,
    /// Monotonic time of the last upward transition.
    pub last_escalation: Option<Instant>,
    /// Administrative pause; no transitions while set.
    pub paused: bool,
}

impl EscalationContext {
    /// A fresh context at L0.
    pub fn new() -> Self {
        Self {
            level: Level::Idle,
            entered_at: Instant::now(),
            entered_at_wall: Utc::now(),
            last_escalation: None,
            paused: false,
        }
    }

    /// Time spent at the current level.
    pub fn dwell(&self) -> Duration {
        self.entered_at.elapsed()
    }

    /// Moves to `level`, stamping entry times. `escalated` marks upward
    /// moves for cooldown accounting.
    pub fn enter(&mut self, level: Level, escalated: bool) {
        self.level = level;
        self.entered_at = Instant::now();
        self.entered_at_wall = Utc::now();
        if escalated {
            self.last_escalation = Some(self.entered_at);
        }
    }
}

impl Default for EscalationContext {
    fn default() -> Self {
        Self::new()
    }
}
