use log::{debug, error, info, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use shared::{Message, MAX_DATAGRAM_SIZE};
use std::any::Any;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::{Notify, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

pub type PayloadHook<M> = Arc<dyn Fn() -> M + Send + Sync>;
pub type ReceiveHook<M> = Arc<dyn Fn(M) + Send + Sync>;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to bind local socket: {0}")]
    Bind(#[source] std::io::Error),

    #[error("send interval must be greater than zero")]
    InvalidInterval,

    #[error(transparent)]
    Codec(#[from] shared::CodecError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ClientStats {
    pub sent: u64,
    pub received: u64,
}

struct Connection<M> {
    socket: UdpSocket,
    server_addr: SocketAddr,
    payload: RwLock<Option<PayloadHook<M>>>,
    on_receive: RwLock<Option<ReceiveHook<M>>>,
    running: AtomicBool,
    wake: Notify,
    sent: AtomicU64,
    received: AtomicU64,
}

impl<M> Connection<M> {
    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn terminate(&self) {
        self.running.store(false, Ordering::Release);
        self.wake.notify_one();
    }
}

/// Peer side of a session: keeps itself alive on the server by sending on a
/// fixed interval and hands the server's broadcasts to a callback.
pub struct Client<M = Message> {
    connection: Arc<Connection<M>>,
    local_addr: SocketAddr,
    task: Option<JoinHandle<()>>,
}

impl<M> Client<M>
where
    M: Serialize + DeserializeOwned + Send + 'static,
{
    pub async fn connect(server_addr: SocketAddr, send_interval: Duration) -> Result<Self, ClientError> {
        if send_interval.is_zero() {
            return Err(ClientError::InvalidInterval);
        }

        let bind_addr = if server_addr.is_ipv4() {
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
        } else {
            SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))
        };
        let socket = UdpSocket::bind(bind_addr).await.map_err(ClientError::Bind)?;
        let local_addr = socket.local_addr()?;
        info!("Client {} talking to {}", local_addr, server_addr);

        let connection = Arc::new(Connection {
            socket,
            server_addr,
            payload: RwLock::new(None),
            on_receive: RwLock::new(None),
            running: AtomicBool::new(true),
            wake: Notify::new(),
            sent: AtomicU64::new(0),
            received: AtomicU64::new(0),
        });

        let task = tokio::spawn(run(Arc::clone(&connection), send_interval));

        Ok(Client {
            connection,
            local_addr,
            task: Some(task),
        })
    }

    /// Sets the function producing the message sent every interval.
    pub async fn set_payload<F>(&self, payload: F)
    where
        F: Fn() -> M + Send + Sync + 'static,
    {
        *self.connection.payload.write().await = Some(Arc::new(payload));
    }

    pub async fn set_receive_hook<F>(&self, hook: F)
    where
        F: Fn(M) + Send + Sync + 'static,
    {
        *self.connection.on_receive.write().await = Some(Arc::new(hook));
    }

    /// Sends one message right away, outside the regular interval.
    pub async fn send(&self, message: &M) -> Result<(), ClientError> {
        let frame = shared::encode(message)?;
        send_frame(&self.connection, &frame).await
    }

    /// Waits for the background task to exit after [`Client::terminate`].
    pub async fn join(mut self) {
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!("Client task failed: {}", e);
            }
        }
    }
}

impl<M> Client<M> {
    /// Stops sending and receiving. The background task exits promptly.
    pub fn terminate(&self) {
        if self.connection.is_running() {
            info!("Client {} terminating", self.local_addr);
        }
        self.connection.terminate();
    }

    pub fn is_running(&self) -> bool {
        self.connection.is_running()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn server_addr(&self) -> SocketAddr {
        self.connection.server_addr
    }

    pub fn stats(&self) -> ClientStats {
        ClientStats {
            sent: self.connection.sent.load(Ordering::Relaxed),
            received: self.connection.received.load(Ordering::Relaxed),
        }
    }
}

impl<M> Drop for Client<M> {
    fn drop(&mut self) {
        self.connection.terminate();
    }
}

async fn send_frame<M>(connection: &Connection<M>, frame: &[u8]) -> Result<(), ClientError> {
    connection.socket.send_to(frame, connection.server_addr).await?;
    connection.sent.fetch_add(1, Ordering::Relaxed);
    Ok(())
}

/// Runs a host callback, logging and swallowing a panic instead of letting it
/// take the client task down.
fn call_hook<T>(name: &str, hook: impl FnOnce() -> T) -> Option<T> {
    match catch_unwind(AssertUnwindSafe(hook)) {
        Ok(value) => Some(value),
        Err(panic) => {
            error!("Client {} hook panicked: {}", name, panic_message(&*panic));
            None
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic payload"
    }
}

/// Produces the next interval's frame. The message is dropped before the
/// caller awaits the send.
fn next_frame<M: Serialize>(payload: &PayloadHook<M>) -> Option<Vec<u8>> {
    let message = call_hook("payload", || payload())?;
    match shared::encode(&message) {
        Ok(frame) => Some(frame),
        Err(e) => {
            warn!("Failed to encode payload: {}", e);
            None
        }
    }
}

async fn run<M>(connection: Arc<Connection<M>>, send_interval: Duration)
where
    M: Serialize + DeserializeOwned,
{
    let mut ticker = interval(send_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut buffer = [0u8; MAX_DATAGRAM_SIZE];

    while connection.is_running() {
        tokio::select! {
            _ = connection.wake.notified() => {},

            _ = ticker.tick() => {
                let payload = connection.payload.read().await.clone();
                if let Some(frame) = payload.as_ref().and_then(next_frame) {
                    if let Err(e) = send_frame(&connection, &frame).await {
                        error!("Error sending to {}: {}", connection.server_addr, e);
                    }
                }
            },

            result = connection.socket.recv_from(&mut buffer) => {
                match result {
                    Ok((len, addr)) => {
                        if addr != connection.server_addr {
                            debug!("Ignoring datagram from unknown sender {}", addr);
                            continue;
                        }
                        connection.received.fetch_add(1, Ordering::Relaxed);

                        match shared::decode::<M>(&buffer[..len]) {
                            Ok(message) => {
                                let hook = connection.on_receive.read().await.clone();
                                if let Some(hook) = hook {
                                    call_hook("receive", || hook(message));
                                }
                            }
                            Err(e) => warn!("Dropping undecodable datagram: {}", e),
                        }
                    }
                    Err(e) => warn!("Error receiving datagram: {}", e),
                }
            },
        }
    }

    debug!("Client task exiting");
}
