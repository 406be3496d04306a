//! Peer liveness tracking for the session server
//!
//! Peers are identified purely by the source address of their datagrams.
//! There is no connect or disconnect message: a peer joins the registry the
//! first time it is heard from and is evicted once it has been silent for a
//! configured number of broadcast cycles.
//!
//! The registry itself is not synchronized. The server wraps it in a lock and
//! every operation below is performed while holding that lock, which is what
//! makes `advance_and_collect_expired` atomic with respect to `touch`.

use log::{debug, info};
use std::collections::HashMap;
use std::net::SocketAddr;

/// Liveness state of a single peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PeerState {
    /// Broadcast cycles since the last datagram from this peer
    pub idle_ticks: u64,
}

/// Outcome of a [`ClientRegistry::touch`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Touch {
    Joined,
    Refreshed,
}

#[derive(Debug, Default)]
pub struct ClientRegistry {
    peers: HashMap<SocketAddr, PeerState>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records activity from `addr`.
    ///
    /// Unknown addresses are inserted with an idle counter of zero, known
    /// ones have their counter reset to zero.
    pub fn touch(&mut self, addr: SocketAddr) -> Touch {
        match self.peers.insert(addr, PeerState::default()) {
            Some(_) => Touch::Refreshed,
            None => {
                info!("Peer {} joined", addr);
                Touch::Joined
            }
        }
    }

    /// Advances every idle counter by one cycle, then removes and returns the
    /// peers whose counter reached `threshold_ticks`.
    pub fn advance_and_collect_expired(&mut self, threshold_ticks: u64) -> Vec<SocketAddr> {
        let mut expired = Vec::new();
        for (addr, state) in self.peers.iter_mut() {
            state.idle_ticks += 1;
            if state.idle_ticks >= threshold_ticks {
                expired.push(*addr);
            }
        }

        for addr in &expired {
            self.peers.remove(addr);
            info!("Peer {} evicted after {} silent ticks", addr, threshold_ticks);
        }

        if !expired.is_empty() {
            debug!("{} peers remain after eviction pass", self.peers.len());
        }

        expired
    }

    /// Addresses of every tracked peer, in no particular order
    pub fn peers(&self) -> Vec<SocketAddr> {
        self.peers.keys().copied().collect()
    }

    pub fn get(&self, addr: &SocketAddr) -> Option<PeerState> {
        self.peers.get(addr).copied()
    }

    pub fn contains(&self, addr: &SocketAddr) -> bool {
        self.peers.contains_key(addr)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}
