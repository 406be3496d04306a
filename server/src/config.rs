//! Server configuration and fixed transport constants

use crate::error::ServerError;
use std::net::SocketAddr;
use std::time::Duration;

/// How long a single receive waits before the listener re-checks the running flag.
pub const RECV_TIMEOUT: Duration = Duration::from_millis(100);
pub const DEFAULT_TICK_RATE: u32 = 120;
/// Silent ticks tolerated per unit of tick rate before a peer is evicted.
pub const DEFAULT_EVICTION_MULTIPLIER: u32 = 5;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the datagram socket binds to
    pub bind_addr: SocketAddr,
    /// Broadcast cycles per second
    pub tick_rate: u32,
    /// A peer is evicted after `tick_rate * eviction_multiplier` silent cycles
    pub eviction_multiplier: u32,
}

impl ServerConfig {
    pub fn new(bind_addr: SocketAddr, tick_rate: u32) -> Self {
        Self {
            bind_addr,
            tick_rate,
            eviction_multiplier: DEFAULT_EVICTION_MULTIPLIER,
        }
    }

    pub fn with_eviction_multiplier(mut self, eviction_multiplier: u32) -> Self {
        self.eviction_multiplier = eviction_multiplier;
        self
    }

    /// Time between two broadcast cycles.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.tick_rate.max(1)))
    }

    /// Number of silent cycles after which a peer is evicted.
    pub fn eviction_threshold(&self) -> u64 {
        u64::from(self.tick_rate) * u64::from(self.eviction_multiplier)
    }

    /// Upper bound on how long the loops take to notice `stop`.
    pub fn shutdown_grace(&self) -> Duration {
        self.tick_interval().max(RECV_TIMEOUT)
    }

    pub fn validate(&self) -> Result<(), ServerError> {
        if self.tick_rate == 0 {
            return Err(ServerError::InvalidConfig(
                "tick rate must be greater than zero".to_string(),
            ));
        }
        if self.eviction_multiplier == 0 {
            return Err(ServerError::InvalidConfig(
                "eviction multiplier must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(
            SocketAddr::from(([127, 0, 0, 1], 8080)),
            DEFAULT_TICK_RATE,
        )
    }
}
