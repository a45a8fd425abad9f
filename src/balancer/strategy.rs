//! # Connection-distribution strategies.
//!
//! - [`Strategy::RoundRobin`] — stateful rotating index, wraps modulo the
//!   candidate count.
//! - [`Strategy::IpHash`] — deterministic hash of the client address; the
//!   same client is always routed to the same backend (session affinity).
//! - [`Strategy::LeastConnections`] — lowest open-connection count wins,
//!   ties broken by list order.

use std::net::IpAddr;
use std::str::FromStr;

/// Backend selection strategy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Strategy {
    /// Rotate through candidates in order (default).
    #[default]
    RoundRobin,
    /// Hash the client address onto a candidate.
    IpHash,
    /// Pick the candidate with the fewest open connections.
    LeastConnections,
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "round-robin" => Ok(Strategy::RoundRobin),
            "ip-hash" => Ok(Strategy::IpHash),
            "least-connections" => Ok(Strategy::LeastConnections),
            other => Err(format!("unknown strategy {other:?}")),
        }
    }
}

/// Deterministic hash of a client address onto `len` candidates.
///
/// `None` (peer address unavailable) pins to slot 0 rather than
/// scattering across backends.
pub(crate) fn hash_slot(peer: Option<IpAddr>, len: usize) -> usize {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    debug_assert!(len > 0);
    match peer {
        Some(ip) => {
            let mut hasher = DefaultHasher::new();
            ip.hash(&mut hasher);
            (hasher.finish() % len as u64) as usize
        }
        None => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_strategies() {
        assert_eq!("round-robin".parse::<Strategy>().unwrap(), Strategy::RoundRobin);
        assert_eq!("ip-hash".parse::<Strategy>().unwrap(), Strategy::IpHash);
        assert_eq!(
            "least-connections".parse::<Strategy>().unwrap(),
            Strategy::LeastConnections
        );
        assert!("weighted".parse::<Strategy>().is_err());
    }

    #[test]
    fn test_hash_slot_is_deterministic() {
        let ip: IpAddr = "10.0.0.7".parse().expect("ip");
        let first = hash_slot(Some(ip), 5);
        for _ in 0..32 {
            assert_eq!(hash_slot(Some(ip), 5), first);
        }
        assert!(first < 5);
    }
}
