//! Host supplied callbacks invoked by the broadcast and receive loops
//!
//! Arguments the host wants bound to a hook are captured by the closure.
//! Hooks run synchronously on the loop that invokes them, so a slow hook
//! delays that loop's next tick or receive.

use crate::error::ServerError;
use log::error;
use std::any::Any;
use std::fmt;
use std::net::SocketAddr;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Produces the payload for one peer in one broadcast cycle.
pub type SendHook<M> = Arc<dyn Fn(SocketAddr) -> M + Send + Sync>;
/// Consumes one decoded datagram together with its sender.
pub type ReceiveHook<M> = Arc<dyn Fn(M, SocketAddr) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookDirection {
    Send,
    Receive,
}

impl FromStr for HookDirection {
    type Err = ServerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "send" | "s" => Ok(HookDirection::Send),
            "receive" | "recv" | "r" => Ok(HookDirection::Receive),
            _ => Err(ServerError::InvalidHookDirection(s.to_string())),
        }
    }
}

impl fmt::Display for HookDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookDirection::Send => write!(f, "send"),
            HookDirection::Receive => write!(f, "receive"),
        }
    }
}

/// One optional hook per direction. Installing a hook replaces the previous one.
pub struct HookSlots<M> {
    send: RwLock<Option<SendHook<M>>>,
    receive: RwLock<Option<ReceiveHook<M>>>,
}

impl<M> HookSlots<M> {
    pub fn new() -> Self {
        Self {
            send: RwLock::new(None),
            receive: RwLock::new(None),
        }
    }

    pub async fn set_send(&self, hook: SendHook<M>) {
        *self.send.write().await = Some(hook);
    }

    pub async fn set_receive(&self, hook: ReceiveHook<M>) {
        *self.receive.write().await = Some(hook);
    }

    pub async fn clear(&self, direction: HookDirection) {
        match direction {
            HookDirection::Send => *self.send.write().await = None,
            HookDirection::Receive => *self.receive.write().await = None,
        }
    }

    /// Snapshot of the send hook. The lock is released before the hook runs.
    pub async fn send_hook(&self) -> Option<SendHook<M>> {
        self.send.read().await.clone()
    }

    pub async fn receive_hook(&self) -> Option<ReceiveHook<M>> {
        self.receive.read().await.clone()
    }
}

impl<M> Default for HookSlots<M> {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs the send hook for `addr`, returning `None` if it panicked.
pub fn invoke_send<M>(hook: &SendHook<M>, addr: SocketAddr) -> Option<M> {
    match catch_unwind(AssertUnwindSafe(|| hook(addr))) {
        Ok(payload) => Some(payload),
        Err(panic) => {
            error!("Send hook panicked for {}: {}", addr, panic_message(&*panic));
            None
        }
    }
}

/// Runs the receive hook, returning `false` if it panicked.
pub fn invoke_receive<M>(hook: &ReceiveHook<M>, message: M, addr: SocketAddr) -> bool {
    match catch_unwind(AssertUnwindSafe(|| hook(message, addr))) {
        Ok(()) => true,
        Err(panic) => {
            error!(
                "Receive hook panicked for datagram from {}: {}",
                addr,
                panic_message(&*panic)
            );
            false
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn test_addr() -> SocketAddr {
        "127.0.0.1:9000".parse().unwrap()
    }

    #[test]
    fn test_direction_parsing() {
        assert_eq!("send".parse::<HookDirection>().unwrap(), HookDirection::Send);
        assert_eq!("s".parse::<HookDirection>().unwrap(), HookDirection::Send);
        assert_eq!("Receive".parse::<HookDirection>().unwrap(), HookDirection::Receive);
        assert_eq!("r".parse::<HookDirection>().unwrap(), HookDirection::Receive);
    }

    #[test]
    fn test_invalid_direction() {
        for bad in ["", "x", "both", "sr"] {
            match bad.parse::<HookDirection>() {
                Err(ServerError::InvalidHookDirection(value)) => assert_eq!(value, bad),
                other => panic!("expected InvalidHookDirection for {:?}, got {:?}", bad, other),
            }
        }
    }

    #[tokio::test]
    async fn test_slots_start_empty() {
        let slots: HookSlots<u32> = HookSlots::new();
        assert!(slots.send_hook().await.is_none());
        assert!(slots.receive_hook().await.is_none());
    }

    #[tokio::test]
    async fn test_set_send_overwrites() {
        let slots: HookSlots<u32> = HookSlots::new();
        slots.set_send(Arc::new(|_| 1)).await;
        slots.set_send(Arc::new(|_| 2)).await;

        let hook = slots.send_hook().await.unwrap();
        assert_eq!(invoke_send(&hook, test_addr()), Some(2));
    }

    #[tokio::test]
    async fn test_bound_arguments_are_captured() {
        let slots: HookSlots<String> = HookSlots::new();
        let prefix = String::from("tick");
        slots
            .set_send(Arc::new(move |addr| format!("{}:{}", prefix, addr.port())))
            .await;

        let hook = slots.send_hook().await.unwrap();
        assert_eq!(invoke_send(&hook, test_addr()).unwrap(), "tick:9000");
    }

    #[tokio::test]
    async fn test_clear_only_affects_one_direction() {
        let slots: HookSlots<u32> = HookSlots::new();
        slots.set_send(Arc::new(|_| 1)).await;
        slots.set_receive(Arc::new(|_, _| {})).await;

        slots.clear(HookDirection::Send).await;
        assert!(slots.send_hook().await.is_none());
        assert!(slots.receive_hook().await.is_some());

        slots.clear(HookDirection::Receive).await;
        assert!(slots.receive_hook().await.is_none());
    }

    #[test]
    fn test_panicking_send_hook_is_contained() {
        let hook: SendHook<u32> = Arc::new(|_| panic!("boom"));
        assert_eq!(invoke_send(&hook, test_addr()), None);
    }

    #[test]
    fn test_receive_hook_invocation() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let hook: ReceiveHook<u32> = Arc::new(move |value, _| {
            counter.fetch_add(value as usize, Ordering::SeqCst);
        });

        assert!(invoke_receive(&hook, 3, test_addr()));
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let failing: ReceiveHook<u32> = Arc::new(|_, _| panic!("bad payload"));
        assert!(!invoke_receive(&failing, 1, test_addr()));
    }
}
