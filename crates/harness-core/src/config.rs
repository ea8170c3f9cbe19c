use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use crate::error::{HarnessError, Result};

/// Identities the request handler accepts in `X-Client-Name`.
pub const ALLOWED_CLIENTS: [&str; 2] = ["client1", "client2"];

/// Header carrying the caller identity.
pub const CLIENT_HEADER: &str = "X-Client-Name";

#[derive(Debug, Clone)]
pub struct Config {
    /// Address the server binds and the clients target
    pub addr: SocketAddr,
    pub topology: Topology,
}

impl Config {
    pub fn new(host: IpAddr, port: u16) -> Self {
        Self {
            addr: SocketAddr::new(host, port),
            topology: Topology::default(),
        }
    }

    /// Localhost on `port`, fixed topology.
    pub fn local(port: u16) -> Self {
        Self::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)
    }
}

/// Token bucket parameters: sustained rate and banked burst.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimiterConfig {
    /// Tokens per second
    pub rate: u64,
    /// Maximum tokens that can accumulate
    pub burst: u64,
}

/// Fixed shape of a harness run. Counts are not user-configurable; the
/// durations are only shortened by tests.
#[derive(Debug, Clone)]
pub struct Topology {
    pub clients: Vec<String>,
    pub workers_per_client: usize,
    pub requests_per_worker: usize,
    pub batch_size: usize,
    pub server_limiter: LimiterConfig,
    pub client_limiter: LimiterConfig,
    pub health_interval: Duration,
    /// Polls performed after every client finished, before the supervisor stops
    pub drain_ticks: u32,
}

impl Default for Topology {
    fn default() -> Self {
        Self {
            clients: ALLOWED_CLIENTS.iter().map(|c| c.to_string()).collect(),
            workers_per_client: 2,
            requests_per_worker: 50,
            batch_size: 5,
            server_limiter: LimiterConfig { rate: 5, burst: 5 },
            client_limiter: LimiterConfig { rate: 5, burst: 5 },
            health_interval: Duration::from_secs(5),
            drain_ticks: 6,
        }
    }
}

impl Topology {
    pub fn validate(&self) -> Result<()> {
        if self.clients.is_empty() {
            return Err(HarnessError::InvalidConfig("no clients configured".to_string()));
        }
        if let Some(unknown) = self
            .clients
            .iter()
            .find(|c| !ALLOWED_CLIENTS.contains(&c.as_str()))
        {
            return Err(HarnessError::InvalidConfig(format!(
                "client {unknown} is not on the allow-list"
            )));
        }
        if self.workers_per_client == 0 || self.batch_size == 0 {
            return Err(HarnessError::InvalidConfig(
                "workers_per_client and batch_size must be non-zero".to_string(),
            ));
        }
        for (which, limiter) in [
            ("server_limiter", self.server_limiter),
            ("client_limiter", self.client_limiter),
        ] {
            if limiter.rate == 0 || limiter.burst == 0 {
                return Err(HarnessError::InvalidConfig(format!(
                    "{which} rate and burst must be non-zero"
                )));
            }
        }
        if self.health_interval.is_zero() {
            return Err(HarnessError::InvalidConfig(
                "health_interval must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}
