//! Periodic outbound loop: ages the registry, evicts silent peers and fans
//! the send hook's payloads out to every remaining peer.

use crate::hooks::invoke_send;
use crate::network::Session;
use log::{debug, error, info, warn};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::time::{interval, MissedTickBehavior};

/// What a single broadcast cycle did
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct CycleReport {
    pub evicted: Vec<SocketAddr>,
    pub sent: usize,
    pub failed: usize,
}

/// Runs broadcast cycles every tick interval until the session stops running.
pub(crate) async fn run<M>(session: Arc<Session<M>>)
where
    M: Serialize,
{
    let mut ticker = interval(session.config.tick_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    // Skip the first tick since it fires immediately
    ticker.tick().await;

    info!(
        "Broadcaster started at {}Hz, evicting after {} silent ticks",
        session.config.tick_rate,
        session.config.eviction_threshold()
    );

    while session.is_running() {
        ticker.tick().await;
        if !session.is_running() {
            break;
        }

        let tick = session.cycles.fetch_add(1, Ordering::Relaxed) + 1;
        let report = broadcast_cycle(&session).await;
        if report.failed > 0 || !report.evicted.is_empty() {
            debug!(
                "Tick {}: evicted {}, sent {} payloads, {} failed",
                tick,
                report.evicted.len(),
                report.sent,
                report.failed
            );
        }
    }

    info!(
        "Broadcaster stopped after {} ticks",
        session.cycles.load(Ordering::Relaxed)
    );
}

/// One tick: eviction first, then fan-out to the peers that survived it.
pub(crate) async fn broadcast_cycle<M>(session: &Session<M>) -> CycleReport
where
    M: Serialize,
{
    let threshold = session.config.eviction_threshold();

    // Evict and snapshot under one lock so a peer evicted this tick is never sent to
    let (evicted, peers) = {
        let mut registry = session.registry.write().await;
        let evicted = registry.advance_and_collect_expired(threshold);
        (evicted, registry.peers())
    };

    let mut report = CycleReport {
        evicted,
        ..CycleReport::default()
    };

    let hook = match session.hooks.send_hook().await {
        Some(hook) => hook,
        None => return report,
    };

    for addr in peers {
        let payload = match invoke_send(&hook, addr) {
            Some(payload) => payload,
            None => {
                report.failed += 1;
                continue;
            }
        };

        let frame = match shared::encode(&payload) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Failed to encode payload for {}: {}", addr, e);
                report.failed += 1;
                continue;
            }
        };

        match session.socket.send_to(&frame, addr).await {
            Ok(_) => report.sent += 1,
            Err(e) => {
                error!("Failed to send to {}: {}", addr, e);
                report.failed += 1;
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use shared::Message;
    use std::time::Duration;
    use tokio::net::UdpSocket;
    use tokio::time::timeout;

    async fn test_session(tick_rate: u32, multiplier: u32) -> Session<Message> {
        let config = ServerConfig::new("127.0.0.1:0".parse().unwrap(), tick_rate)
            .with_eviction_multiplier(multiplier);
        let socket = UdpSocket::bind(config.bind_addr).await.unwrap();
        Session::new(socket, config)
    }

    async fn recv_message(socket: &UdpSocket) -> Option<Message> {
        let mut buf = [0u8; shared::MAX_DATAGRAM_SIZE];
        match timeout(Duration::from_millis(200), socket.recv_from(&mut buf)).await {
            Ok(Ok((len, _))) => shared::decode(&buf[..len]).ok(),
            _ => None,
        }
    }

    #[tokio::test]
    async fn test_cycle_without_hook_sends_nothing() {
        let session = test_session(10, 1).await;
        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        session.registry.write().await.touch(peer.local_addr().unwrap());

        let report = broadcast_cycle(&session).await;
        assert_eq!(report, CycleReport::default());
        assert!(recv_message(&peer).await.is_none());
    }

    #[tokio::test]
    async fn test_cycle_sends_one_payload_per_peer() {
        let session = test_session(10, 1).await;
        let peer_a = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let peer_b = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        {
            let mut registry = session.registry.write().await;
            registry.touch(peer_a.local_addr().unwrap());
            registry.touch(peer_b.local_addr().unwrap());
        }

        session
            .hooks
            .set_send(Arc::new(|addr: SocketAddr| {
                Message::Text(format!("hello {}", addr.port()))
            }))
            .await;

        let report = broadcast_cycle(&session).await;
        assert_eq!(report.sent, 2);
        assert_eq!(report.failed, 0);

        let port_a = peer_a.local_addr().unwrap().port();
        assert_eq!(
            recv_message(&peer_a).await,
            Some(Message::Text(format!("hello {}", port_a)))
        );
        assert!(recv_message(&peer_b).await.is_some());
    }

    #[tokio::test]
    async fn test_evicted_peer_gets_nothing_that_cycle() {
        // Threshold of one tick: every untouched peer expires on the next cycle
        let session = test_session(1, 1).await;
        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = peer.local_addr().unwrap();
        session.registry.write().await.touch(addr);
        session
            .hooks
            .set_send(Arc::new(|_| Message::Heartbeat { timestamp: 0 }))
            .await;

        let report = broadcast_cycle(&session).await;
        assert_eq!(report.evicted, vec![addr]);
        assert_eq!(report.sent, 0);
        assert!(recv_message(&peer).await.is_none());
        assert!(session.registry.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_failing_peer_does_not_abort_cycle() {
        let session = test_session(10, 1).await;
        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let good = peer.local_addr().unwrap();
        let bad: SocketAddr = "127.0.0.1:9".parse().unwrap();
        {
            let mut registry = session.registry.write().await;
            registry.touch(good);
            registry.touch(bad);
        }

        session
            .hooks
            .set_send(Arc::new(move |addr: SocketAddr| {
                if addr == bad {
                    panic!("no payload for this peer");
                }
                Message::Snapshot { tick: 1, peers: 2 }
            }))
            .await;

        let report = broadcast_cycle(&session).await;
        assert_eq!(report.sent, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(
            recv_message(&peer).await,
            Some(Message::Snapshot { tick: 1, peers: 2 })
        );
    }

    #[tokio::test]
    async fn test_oversized_payload_is_counted_as_failure() {
        let session = test_session(10, 1).await;
        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        session.registry.write().await.touch(peer.local_addr().unwrap());
        session
            .hooks
            .set_send(Arc::new(|_| Message::Text("z".repeat(shared::MAX_DATAGRAM_SIZE))))
            .await;

        let report = broadcast_cycle(&session).await;
        assert_eq!(report.sent, 0);
        assert_eq!(report.failed, 1);
        assert!(session.registry.read().await.contains(&peer.local_addr().unwrap()));
    }
}
