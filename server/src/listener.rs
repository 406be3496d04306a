//! Inbound loop: receives datagrams with a short timeout, refreshes the
//! sender's liveness and hands decoded payloads to the receive hook.

use crate::config::RECV_TIMEOUT;
use crate::hooks::invoke_receive;
use crate::network::Session;
use crate::registry::Touch;
use log::{info, trace, warn};
use serde::de::DeserializeOwned;
use shared::MAX_DATAGRAM_SIZE;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::time::timeout;

/// What happened to a single received datagram
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DatagramOutcome {
    Delivered,
    NoHook,
    Undecodable,
    HookPanicked,
}

/// Receives until the session stops running.
///
/// Each receive waits at most [`RECV_TIMEOUT`], which bounds how long it
/// takes this loop to notice a stop request.
pub(crate) async fn run<M>(session: Arc<Session<M>>)
where
    M: DeserializeOwned,
{
    let mut buffer = [0u8; MAX_DATAGRAM_SIZE];
    let mut received: u64 = 0;

    info!("Listener started on {:?}", session.socket.local_addr().ok());

    while session.is_running() {
        match timeout(RECV_TIMEOUT, session.socket.recv_from(&mut buffer)).await {
            // Timed out, go round and re-check the running flag
            Err(_) => continue,
            Ok(Ok((len, addr))) => {
                received += 1;
                handle_datagram(&session, &buffer[..len], addr).await;
            }
            Ok(Err(e)) => {
                warn!("Error receiving datagram: {}", e);
            }
        }
    }

    info!("Listener stopped after {} datagrams", received);
}

/// Refreshes `addr` in the registry, then decodes and dispatches `data`.
///
/// Liveness is refreshed even when the payload cannot be decoded.
pub(crate) async fn handle_datagram<M>(
    session: &Session<M>,
    data: &[u8],
    addr: SocketAddr,
) -> DatagramOutcome
where
    M: DeserializeOwned,
{
    let touch = session.registry.write().await.touch(addr);
    if touch == Touch::Refreshed {
        trace!("Refreshed peer {} ({} bytes)", addr, data.len());
    }

    let message: M = match shared::decode(data) {
        Ok(message) => message,
        Err(e) => {
            warn!("Dropping undecodable datagram from {}: {}", addr, e);
            return DatagramOutcome::Undecodable;
        }
    };

    match session.hooks.receive_hook().await {
        Some(hook) => {
            if invoke_receive(&hook, message, addr) {
                DatagramOutcome::Delivered
            } else {
                DatagramOutcome::HookPanicked
            }
        }
        None => DatagramOutcome::NoHook,
    }
}
