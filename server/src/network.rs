//! Server network layer owning the socket, the peer registry and the hook slots

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::hooks::{HookDirection, HookSlots};
use crate::registry::ClientRegistry;
use crate::{broadcaster, listener};
use log::{error, info};
use serde::de::DeserializeOwned;
use serde::Serialize;
use shared::Message;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

/// State shared between the server handle and its two loops
pub(crate) struct Session<M> {
    pub(crate) socket: UdpSocket,
    pub(crate) registry: RwLock<ClientRegistry>,
    pub(crate) hooks: HookSlots<M>,
    pub(crate) config: ServerConfig,
    pub(crate) cycles: AtomicU64,
    running: AtomicBool,
}

impl<M> Session<M> {
    pub(crate) fn new(socket: UdpSocket, config: ServerConfig) -> Self {
        Self {
            socket,
            registry: RwLock::new(ClientRegistry::new()),
            hooks: HookSlots::new(),
            config,
            cycles: AtomicU64::new(0),
            running: AtomicBool::new(true),
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn request_stop(&self) {
        self.running.store(false, Ordering::Release);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Running,
    /// Stop was requested but at least one loop has not exited yet
    Stopping,
    Stopped,
}

/// UDP session server
///
/// Tracks peers by source address, broadcasts the send hook's payload to
/// every live peer once per tick and delivers inbound datagrams to the
/// receive hook. The host owns the value; there is no global instance.
pub struct Server<M = Message> {
    session: Arc<Session<M>>,
    local_addr: SocketAddr,
    broadcaster: Option<JoinHandle<()>>,
    listener: Option<JoinHandle<()>>,
}

impl<M> Server<M>
where
    M: Serialize + DeserializeOwned + Send + 'static,
{
    /// Binds the socket and launches the broadcaster and listener tasks.
    pub async fn start(config: ServerConfig) -> Result<Self, ServerError> {
        config.validate()?;

        let socket = UdpSocket::bind(config.bind_addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: config.bind_addr,
                source,
            })?;
        let local_addr = socket.local_addr()?;
        info!(
            "Server listening on {} at {}Hz",
            local_addr, config.tick_rate
        );

        let session = Arc::new(Session::new(socket, config));
        let broadcaster = tokio::spawn(broadcaster::run(Arc::clone(&session)));
        let listener = tokio::spawn(listener::run(Arc::clone(&session)));

        Ok(Server {
            session,
            local_addr,
            broadcaster: Some(broadcaster),
            listener: Some(listener),
        })
    }

    /// Installs the hook producing each peer's payload, replacing any previous one.
    pub async fn set_send_hook<F>(&self, hook: F)
    where
        F: Fn(SocketAddr) -> M + Send + Sync + 'static,
    {
        self.session.hooks.set_send(Arc::new(hook)).await;
    }

    /// Installs the hook receiving each decoded datagram, replacing any previous one.
    pub async fn set_receive_hook<F>(&self, hook: F)
    where
        F: Fn(M, SocketAddr) + Send + Sync + 'static,
    {
        self.session.hooks.set_receive(Arc::new(hook)).await;
    }

    pub async fn clear_hook(&self, direction: HookDirection) {
        self.session.hooks.clear(direction).await;
    }

    /// Like [`Server::clear_hook`], but takes the direction by name.
    pub async fn clear_hook_named(&self, direction: &str) -> Result<(), ServerError> {
        let direction: HookDirection = direction.parse()?;
        self.clear_hook(direction).await;
        Ok(())
    }

    /// Asks both loops to exit. Returns immediately.
    ///
    /// The loops notice within [`ServerConfig::shutdown_grace`]. Use
    /// [`Server::shutdown`] to wait for them.
    pub fn stop(&self) {
        if self.session.is_running() {
            info!("Server on {} stopping", self.local_addr);
        }
        self.session.request_stop();
    }

    /// Stops the server and waits until both loops have exited.
    pub async fn shutdown(mut self) {
        self.stop();

        for (name, handle) in [
            ("broadcaster", self.broadcaster.take()),
            ("listener", self.listener.take()),
        ] {
            if let Some(handle) = handle {
                if let Err(e) = handle.await {
                    error!("The {} task failed: {}", name, e);
                }
            }
        }

        info!("Server on {} stopped", self.local_addr);
    }
}

impl<M> Server<M> {
    pub fn state(&self) -> ServerState {
        let finished = |handle: &Option<JoinHandle<()>>| {
            handle.as_ref().map_or(true, |handle| handle.is_finished())
        };

        if self.session.is_running() {
            ServerState::Running
        } else if finished(&self.broadcaster) && finished(&self.listener) {
            ServerState::Stopped
        } else {
            ServerState::Stopping
        }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn config(&self) -> &ServerConfig {
        &self.session.config
    }

    /// Addresses of every peer currently considered live
    pub async fn peers(&self) -> Vec<SocketAddr> {
        self.session.registry.read().await.peers()
    }

    pub async fn peer_count(&self) -> usize {
        self.session.registry.read().await.len()
    }

    /// Broadcast cycles completed since start
    pub fn cycles(&self) -> u64 {
        self.session.cycles.load(Ordering::Relaxed)
    }
}

impl<M> Drop for Server<M> {
    fn drop(&mut self) {
        self.session.request_stop();
    }
}
