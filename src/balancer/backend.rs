//! # Backend bookkeeping for the load balancer.
//!
//! A [`Backend`] is one network endpoint connections may be routed to. It
//! tracks an up/down flag, the number of currently open proxied
//! connections (feeds the least-connections strategy) and a consecutive
//! failure counter (feeds health marking).
//!
//! ## Rules
//! - `max_failures` consecutive connection failures flip the backend down.
//! - A down backend becomes eligible again once `probe_cooldown` has
//!   elapsed — recovery is re-probed, not permanent exclusion.
//! - One successful connection resets the failure counter and the flag.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::{info, warn};

/// One endpoint the balancer may route a connection to.
#[derive(Debug)]
pub struct Backend {
    host: String,
    port: u16,
    up: AtomicBool,
    connections: AtomicUsize,
    failures: AtomicU32,
    down_since: Mutex<Option<Instant>>,
}

impl Backend {
    /// Creates a backend, initially up with no connections.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            up: AtomicBool::new(true),
            connections: AtomicUsize::new(0),
            failures: AtomicU32::new(0),
            down_since: Mutex::new(None),
        }
    }

    /// `host:port`, for connecting and for log lines.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Listen port of this backend.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Current health flag.
    pub fn is_up(&self) -> bool {
        self.up.load(Ordering::SeqCst)
    }

    /// Number of currently open proxied connections.
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Whether this backend may be handed a connection.
    ///
    /// Up backends always qualify; a down backend qualifies again once
    /// `probe_cooldown` has elapsed since it went down, so that the next
    /// connection re-probes it.
    pub fn eligible(&self, probe_cooldown: Duration) -> bool {
        if self.is_up() {
            return true;
        }
        let down_since = self.down_since.lock().unwrap_or_else(|e| e.into_inner());
        match *down_since {
            Some(at) => at.elapsed() >= probe_cooldown,
            None => true,
        }
    }

    /// Records a successful connection: clears failures, restores `up`.
    pub(crate) fn note_success(&self) {
        self.failures.store(0, Ordering::SeqCst);
        if !self.up.swap(true, Ordering::SeqCst) {
            let mut down_since = self.down_since.lock().unwrap_or_else(|e| e.into_inner());
            *down_since = None;
            info!(backend = %self.addr(), "backend back up");
        }
    }

    /// Records a failed connection; flips the backend down after a run of
    /// `max_failures` consecutive failures.
    pub(crate) fn note_failure(&self, max_failures: u32) {
        let failures = self.failures.fetch_add(1, Ordering::SeqCst) + 1;
        if failures >= max_failures && self.up.swap(false, Ordering::SeqCst) {
            let mut down_since = self.down_since.lock().unwrap_or_else(|e| e.into_inner());
            *down_since = Some(Instant::now());
            warn!(backend = %self.addr(), failures, "backend marked down");
        }
    }

    /// Opens a connection lease; the count drops when the lease drops.
    pub(crate) fn lease(self: &Arc<Self>) -> ConnectionLease {
        self.connections.fetch_add(1, Ordering::SeqCst);
        ConnectionLease(Arc::clone(self))
    }
}

/// RAII guard for one open proxied connection.
pub(crate) struct ConnectionLease(Arc<Backend>);

impl Drop for ConnectionLease {
    fn drop(&mut self) {
        self.0.connections.fetch_sub(1, Ordering::SeqCst);
    }
}
