//! Schedule and filesystem triggers.
//!
//! Triggers re-enter the process lifecycle from the outside world:
//! - [`CronTrigger`] — crontab patterns for scheduled starts and stops
//! - [`spawn_watcher`] / [`WatchConfig`] / [`WatchBatch`] — debounced,
//!   glob-filtered filesystem change batches
//!
//! Both are wired by [`Process::init`](crate::process::Process::init) and
//! cancelled through the process's own token; a pending trigger never
//! keeps the supervisor alive on shutdown.

mod cron;
mod watch;

pub use cron::CronTrigger;
pub use watch::{spawn_watcher, WatchBatch, WatchConfig, WatcherHandle};
