//! # Session Client Library
//!
//! The peer side of a UDP session. The server knows nothing about a peer
//! except the address its datagrams come from, so staying connected simply
//! means sending something on a regular interval. Stop sending for long
//! enough and the server evicts the peer without telling it.
//!
//! A [`Client`] runs one background task that:
//! - calls the payload hook and sends the result every send interval
//! - decodes datagrams from the server and passes them to the receive hook
//! - exits when the host calls [`Client::terminate`], typically at shutdown
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::Client;
//! use shared::{timestamp_millis, Message};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client: Client<Message> =
//!         Client::connect("127.0.0.1:8080".parse()?, Duration::from_millis(50)).await?;
//!
//!     client
//!         .set_payload(|| Message::Heartbeat { timestamp: timestamp_millis() })
//!         .await;
//!     client.set_receive_hook(|message| println!("{:?}", message)).await;
//!
//!     tokio::signal::ctrl_c().await?;
//!     client.terminate();
//!     client.join().await;
//!     Ok(())
//! }
//! ```

pub mod network;

pub use network::{Client, ClientError, ClientStats};
