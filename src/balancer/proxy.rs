//! # TCP reverse proxy.
//!
//! [`LoadBalancer`] accepts client connections on a common port and pipes
//! each one byte-for-byte to a backend chosen by the configured
//! [`Strategy`]. It has no awareness of the proxied protocol.
//!
//! ```text
//! client ──► accept ──► select_backend(peer) ──► connect ──► copy both ways
//!                          │                        │
//!                          │                        ├─ ok  → note_success, lease++
//!                          │                        └─ err → note_failure (may mark down)
//!                          └─ skips down backends; falls back to the
//!                             strategy's normal choice when all are down
//! ```

use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::balancer::backend::Backend;
use crate::balancer::strategy::{hash_slot, Strategy};
use crate::error::BalancerError;

/// TCP reverse proxy with pluggable backend selection.
pub struct LoadBalancer {
    backends: Vec<Arc<Backend>>,
    strategy: Strategy,
    cursor: AtomicUsize,
    max_failures: u32,
    probe_cooldown: Duration,
}

impl LoadBalancer {
    /// Creates a balancer over `backends` with the given strategy.
    pub fn new(backends: Vec<Backend>, strategy: Strategy) -> Self {
        Self {
            backends: backends.into_iter().map(Arc::new).collect(),
            strategy,
            cursor: AtomicUsize::new(0),
            max_failures: 3,
            probe_cooldown: Duration::from_secs(10),
        }
    }

    /// Overrides the consecutive-failure threshold that marks a backend down.
    pub fn with_max_failures(mut self, max_failures: u32) -> Self {
        self.max_failures = max_failures.max(1);
        self
    }

    /// Overrides how long a down backend stays out of rotation.
    pub fn with_probe_cooldown(mut self, cooldown: Duration) -> Self {
        self.probe_cooldown = cooldown;
        self
    }

    /// The configured backends, in declaration order.
    pub fn backends(&self) -> &[Arc<Backend>] {
        &self.backends
    }

    /// Chooses a backend for a connection from `peer`.
    ///
    /// Down backends are skipped while any eligible backend exists; when
    /// every backend is down the strategy's normal choice over the full
    /// set is used instead (graceful degradation over hard failure).
    /// Returns `None` only when zero backends are configured.
    pub fn select_backend(&self, peer: Option<IpAddr>) -> Option<Arc<Backend>> {
        if self.backends.is_empty() {
            return None;
        }

        let eligible: Vec<usize> = (0..self.backends.len())
            .filter(|&i| self.backends[i].eligible(self.probe_cooldown))
            .collect();
        let all: Vec<usize> = (0..self.backends.len()).collect();
        let pool: &[usize] = if eligible.is_empty() { &all } else { &eligible };

        let slot = match self.strategy {
            Strategy::RoundRobin => self.cursor.fetch_add(1, Ordering::SeqCst) % pool.len(),
            Strategy::IpHash => hash_slot(peer, pool.len()),
            Strategy::LeastConnections => {
                // Lowest open-connection count; ties keep list order.
                let mut best = 0;
                for (k, &i) in pool.iter().enumerate().skip(1) {
                    if self.backends[i].connections()
                        < self.backends[pool[best]].connections()
                    {
                        best = k;
                    }
                }
                best
            }
        };

        Some(Arc::clone(&self.backends[pool[slot]]))
    }

    /// Listens on `port` and proxies until `token` is cancelled.
    ///
    /// Fails up front with [`BalancerError::NoBackends`] when the backend
    /// list is empty.
    pub async fn start(
        self: Arc<Self>,
        port: u16,
        token: CancellationToken,
    ) -> Result<(), BalancerError> {
        if self.backends.is_empty() {
            return Err(BalancerError::NoBackends);
        }

        let listener = TcpListener::bind(("0.0.0.0", port))
            .await
            .map_err(|e| BalancerError::Bind {
                port,
                error: e.to_string(),
            })?;
        info!(port, backends = self.backends.len(), "load balancer listening");

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((client, peer)) => {
                        let Some(backend) = self.select_backend(Some(peer.ip())) else {
                            continue;
                        };
                        let max_failures = self.max_failures;
                        tokio::spawn(proxy(client, backend, max_failures));
                    }
                    Err(e) => {
                        warn!("accept failed: {e}");
                        tokio::time::sleep(Duration::from_millis(200)).await;
                    }
                },
            }
        }
        Ok(())
    }
}

/// Pipes bytes both ways until either side closes or errors.
async fn proxy(mut client: TcpStream, backend: Arc<Backend>, max_failures: u32) {
    let mut upstream = match TcpStream::connect(backend.addr()).await {
        Ok(stream) => stream,
        Err(e) => {
            backend.note_failure(max_failures);
            warn!(backend = %backend.addr(), "connect failed: {e}");
            return;
        }
    };
    backend.note_success();
    let _lease = backend.lease();

    if let Err(e) = tokio::io::copy_bidirectional(&mut client, &mut upstream).await {
        debug!(backend = %backend.addr(), "pipe closed: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn three_backends() -> Vec<Backend> {
        vec![
            Backend::new("127.0.0.1", 9100),
            Backend::new("127.0.0.1", 9101),
            Backend::new("127.0.0.1", 9102),
        ]
    }

    #[test]
    fn test_round_robin_wraps() {
        let lb = LoadBalancer::new(three_backends(), Strategy::RoundRobin);
        let mut counts = [0usize; 3];
        for _ in 0..4 {
            let picked = lb.select_backend(None).expect("backend");
            let idx = lb
                .backends()
                .iter()
                .position(|b| b.addr() == picked.addr())
                .expect("known backend");
            counts[idx] += 1;
        }
        assert_eq!(counts, [2, 1, 1], "N+1 selections: first backend twice");
    }

    #[test]
    fn test_ip_hash_affinity() {
        let lb = LoadBalancer::new(three_backends(), Strategy::IpHash);
        let peer: IpAddr = "192.168.1.50".parse().expect("ip");
        let first = lb.select_backend(Some(peer)).expect("backend").addr();
        for _ in 0..16 {
            assert_eq!(lb.select_backend(Some(peer)).expect("backend").addr(), first);
        }
    }

    #[test]
    fn test_least_connections_prefers_idle_and_breaks_ties_in_order() {
        let lb = LoadBalancer::new(three_backends(), Strategy::LeastConnections);
        // Tie: everything idle → first in list order.
        assert_eq!(
            lb.select_backend(None).expect("backend").addr(),
            lb.backends()[0].addr()
        );
        let _busy0 = lb.backends()[0].lease();
        let _busy1 = lb.backends()[1].lease();
        assert_eq!(
            lb.select_backend(None).expect("backend").addr(),
            lb.backends()[2].addr()
        );
    }

    #[test]
    fn test_down_backend_is_skipped_until_all_down() {
        let lb = LoadBalancer::new(three_backends(), Strategy::RoundRobin).with_max_failures(1);
        lb.backends()[1].note_failure(1);
        for _ in 0..8 {
            let picked = lb.select_backend(None).expect("backend");
            assert_ne!(picked.addr(), lb.backends()[1].addr(), "down backend selected");
        }
        // All down → fall back to the normal choice over the full set.
        lb.backends()[0].note_failure(1);
        lb.backends()[2].note_failure(1);
        assert!(lb.select_backend(None).is_some());
    }

    #[tokio::test]
    async fn test_start_refuses_zero_backends() {
        let lb = Arc::new(LoadBalancer::new(Vec::new(), Strategy::RoundRobin));
        let err = lb.start(0, CancellationToken::new()).await.unwrap_err();
        assert_eq!(err.as_label(), "balancer_no_backends");
    }

    #[tokio::test]
    async fn test_proxies_bytes_to_backend() {
        // Echo backend on an ephemeral port.
        let echo = TcpListener::bind("127.0.0.1:0").await.expect("bind echo");
        let echo_port = echo.local_addr().expect("addr").port();
        tokio::spawn(async move {
            while let Ok((mut sock, _)) = echo.accept().await {
                tokio::spawn(async move {
                    let mut buf = [0u8; 256];
                    while let Ok(n) = sock.read(&mut buf).await {
                        if n == 0 || sock.write_all(&buf[..n]).await.is_err() {
                            break;
                        }
                    }
                });
            }
        });

        // Grab a free port for the balancer itself.
        let probe = TcpListener::bind("127.0.0.1:0").await.expect("probe");
        let lb_port = probe.local_addr().expect("addr").port();
        drop(probe);

        let lb = Arc::new(LoadBalancer::new(
            vec![Backend::new("127.0.0.1", echo_port)],
            Strategy::RoundRobin,
        ));
        let token = CancellationToken::new();
        tokio::spawn(Arc::clone(&lb).start(lb_port, token.clone()));
        tokio::time::sleep(Duration::from_millis(100)).await;

        let mut client = TcpStream::connect(("127.0.0.1", lb_port)).await.expect("connect");
        client.write_all(b"ping").await.expect("write");
        let mut buf = [0u8; 4];
        client.read_exact(&mut buf).await.expect("read");
        assert_eq!(&buf, b"ping");
        token.cancel();
    }
}
