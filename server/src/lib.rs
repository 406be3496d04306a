//! # UDP Session Server
//!
//! A small server that keeps a set of peers alive over plain UDP and talks to
//! them on a fixed tick. It does not do reliable or ordered delivery,
//! encryption or authentication. It only answers two questions: who is
//! currently talking to us, and what should each of them receive this tick.
//!
//! ## Peers and liveness
//!
//! A peer is nothing more than the source address of the datagrams we
//! receive. The first datagram from an address registers it; every later one
//! resets its idle counter. Each broadcast cycle ages every peer by one tick,
//! and a peer that stays silent for `tick_rate * eviction_multiplier` cycles
//! is evicted without any notification. At the default 120Hz and a
//! multiplier of five, that is five seconds of silence.
//!
//! ## Concurrency
//!
//! Two tokio tasks run for the lifetime of a server:
//! - **Broadcaster**: wakes once per tick, evicts silent peers, then sends
//!   the send hook's payload to every peer that survived eviction
//! - **Listener**: receives with a 100ms timeout, refreshes the sender and
//!   passes the decoded payload to the receive hook
//!
//! The registry and the hook slots are the only state they share, each
//! behind its own lock. Both loops poll a running flag, so after
//! [`Server::stop`] they exit within `max(tick interval, 100ms)`.
//! [`Server::shutdown`] waits for that to happen.
//!
//! ## Hooks
//!
//! Hooks are plain closures run on the loop that calls them. Capture any
//! extra arguments in the closure. A panicking hook is caught and logged and
//! the loop carries on, but a slow hook will delay its loop.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::{Server, ServerConfig};
//! use shared::Message;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::new("127.0.0.1:8080".parse()?, 120);
//!     let server: Server<Message> = Server::start(config).await?;
//!
//!     server
//!         .set_receive_hook(|message, addr| println!("{} sent {:?}", addr, message))
//!         .await;
//!     server
//!         .set_send_hook(|addr| Message::Text(format!("hello {}", addr)))
//!         .await;
//!
//!     tokio::signal::ctrl_c().await?;
//!     server.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod broadcaster;
pub mod config;
pub mod error;
pub mod hooks;
pub mod listener;
pub mod network;
pub mod registry;

pub use config::ServerConfig;
pub use error::ServerError;
pub use hooks::HookDirection;
pub use network::{Server, ServerState};
pub use registry::{ClientRegistry, PeerState};
