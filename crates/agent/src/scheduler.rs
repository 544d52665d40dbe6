//! The cron scheduler: single-flight ticks and cooperative shutdown.

use crate::{AgentError, AgentRun};
use chrono::Utc;
use cron::Schedule;
use sentinel_chain::ChainProvider;
use sentinel_types::RunRecord;
use std::{str::FromStr, sync::Arc, time::Duration};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Parses a cron expression, accepting the standard five-field form by
/// prepending a zero seconds field.
pub fn parse_cron(expr: &str) -> Result<Schedule, AgentError> {
    let normalized = if expr.split_whitespace().count() == 5 {
        format!("0 {expr}")
    } else {
        expr.to_string()
    };
    Schedule::from_str(&normalized)
        .map_err(|e| AgentError::Cron { expr: expr.to_string(), reason: e.to_string() })
}

/// Fires runs on the cron schedule. One agent, one in-flight run: a tick
/// arriving while the previous run is still executing is persisted as
/// SKIPPED with reason "overlap".
#[derive(Debug)]
pub struct Scheduler<P> {
    run: Arc<AgentRun<P>>,
    schedule: Schedule,
    grace_period: Duration,
}

impl<P> Scheduler<P>
where
    P: ChainProvider + Send + Sync + 'static,
{
    /// Creates a scheduler over a run executor.
    pub fn new(
        run: Arc<AgentRun<P>>,
        schedule: Schedule,
        grace_period: Duration,
    ) -> Self {
        Self { run, schedule, grace_period }
    }

    /// Runs until cancelled. Stops accepting ticks on cancellation, gives
    /// the in-flight run the grace period, then flushes the store.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), AgentError> {
        let mut in_flight: Option<JoinHandle<Result<RunRecord, AgentError>>> = None;
        let mut last_fired = None;
        loop {
            let Some(next) = self.schedule.upcoming(Utc).next() else {
                warn!(target: "scheduler", "schedule has no future fire times");
                break;
            };
            if last_fired == Some(next) {
                // The timer undershot the slot; let the clock pass it.
                tokio::time::sleep(Duration::from_millis(50)).await;
                continue;
            }
            let wait = (next - Utc::now()).to_std().unwrap_or_default();
            debug!(target: "scheduler", next = %next, "sleeping until next tick");
            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(wait) => {}
            }
            last_fired = Some(next);

            match in_flight.take() {
                Some(handle) if !handle.is_finished() => {
                    // Single-flight: drop this tick, keep the running run.
                    self.run.record_skip(next, "overlap").await?;
                    in_flight = Some(handle);
                    continue;
                }
                Some(handle) => {
                    // Surface fatal-grade failures before the next tick.
                    self.reap(handle).await?;
                }
                None => {}
            }

            let run = Arc::clone(&self.run);
            in_flight = Some(tokio::spawn(async move { run.execute_tick(next).await }));
        }

        info!(target: "scheduler", "shutting down");
        if let Some(handle) = in_flight {
            match tokio::time::timeout(self.grace_period, handle).await {
                Ok(joined) => {
                    if let Ok(Err(err)) = joined {
                        error!(target: "scheduler", %err, "final run failed during shutdown");
                    }
                }
                Err(_) => {
                    warn!(target: "scheduler", "in-flight run outlived the grace period");
                }
            }
        }
        self.run.store().flush()?;
        Ok(())
    }

    async fn reap(
        &self,
        handle: JoinHandle<Result<RunRecord, AgentError>>,
    ) -> Result<(), AgentError> {
        match handle.await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(err)) => {
                if matches!(&err, AgentError::Storage(storage) if storage.is_fatal()) {
                    error!(target: "scheduler", %err, "fatal storage failure; halting");
                    return Err(err);
                }
                error!(target: "scheduler", %err, "run failed");
                Ok(())
            }
            Err(join_err) => {
                error!(target: "scheduler", %join_err, "run task panicked");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn five_field_expressions_are_accepted() {
        let schedule = parse_cron("*/15 * * * *").unwrap();
        let next = schedule.upcoming(Utc).next().unwrap();
        assert_eq!(next.timestamp() % 60, 0);
    }

    #[test]
    fn six_field_expressions_pass_through() {
        assert!(parse_cron("*/5 * * * * *").is_ok());
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(parse_cron("every quarter hour").is_err());
    }
}
