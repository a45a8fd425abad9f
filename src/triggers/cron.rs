//! # Cron trigger.
//!
//! Thin wrapper over [`cron::Schedule`] that turns a crontab pattern into
//! awaitable fire times. The owning process wires one trigger for its
//! start pattern and one for its terminate pattern; the loops themselves
//! live in [`Process::init`](crate::process::Process::init).
//!
//! Patterns use the `cron` crate dialect (seconds-resolution crontab).
//! A malformed pattern is a setup error for that trigger only — it is
//! logged and the feature is disabled, never escalated.

use std::str::FromStr;

use chrono::{DateTime, Local};
use cron::Schedule;
use tokio_util::sync::CancellationToken;

use crate::error::ProcessError;

/// A parsed cron pattern that can be awaited repeatedly.
#[derive(Clone, Debug)]
pub struct CronTrigger {
    pattern: String,
    schedule: Schedule,
}

impl CronTrigger {
    /// Parses `pattern`; a parse failure disables the trigger.
    pub fn new(pattern: &str) -> Result<Self, ProcessError> {
        let schedule = Schedule::from_str(pattern).map_err(|e| ProcessError::CronPattern {
            pattern: pattern.to_string(),
            error: e.to_string(),
        })?;
        Ok(Self {
            pattern: pattern.to_string(),
            schedule,
        })
    }

    /// The original pattern, for log lines.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Next scheduled fire time, if the pattern has one.
    pub fn next_fire(&self) -> Option<DateTime<Local>> {
        self.schedule.upcoming(Local).next()
    }

    /// Sleeps until the next fire time and returns it.
    ///
    /// Returns `None` when the pattern has no upcoming fire or `token` is
    /// cancelled first; either way the caller's loop ends.
    pub async fn wait_next(&self, token: &CancellationToken) -> Option<DateTime<Local>> {
        let next = self.next_fire()?;
        let delay = (next - Local::now()).to_std().unwrap_or_default();
        tokio::select! {
            _ = tokio::time::sleep(delay) => Some(next),
            _ = token.cancelled() => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_pattern_is_contained() {
        let err = CronTrigger::new("not a pattern").unwrap_err();
        assert_eq!(err.as_label(), "process_cron_invalid");
    }

    #[test]
    fn test_next_fire_is_in_the_future() {
        let trigger = CronTrigger::new("0 * * * * *").expect("every minute");
        let next = trigger.next_fire().expect("has upcoming");
        assert!(next > Local::now());
    }

    #[tokio::test]
    async fn test_cancelled_wait_returns_none() {
        let trigger = CronTrigger::new("0 0 0 1 1 * 2099").expect("far future");
        let token = CancellationToken::new();
        token.cancel();
        assert!(trigger.wait_next(&token).await.is_none());
    }
}
