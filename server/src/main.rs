use clap::Parser;
use log::info;
use server::{Server, ServerConfig};
use shared::Message;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Broadcast cycles per second
    #[arg(short, long, default_value = "120")]
    tick_rate: u32,

    /// Evict peers after tick_rate * this many silent cycles
    #[arg(short, long, default_value = "5")]
    eviction_multiplier: u32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let bind_addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let config = ServerConfig::new(bind_addr, args.tick_rate)
        .with_eviction_multiplier(args.eviction_multiplier);

    let server: Server<Message> = Server::start(config).await?;
    let server = Arc::new(server);

    // Peer count as seen by the send hook, refreshed once per tick
    let peer_count = Arc::new(AtomicU32::new(0));

    server
        .set_receive_hook(|message, addr| match message {
            Message::Hello { name } => info!("{} introduced itself as {}", addr, name),
            Message::Text(text) => info!("{} says: {}", addr, text),
            Message::Heartbeat { .. } | Message::Snapshot { .. } => {}
        })
        .await;

    {
        // The server owns its hooks, so this one only holds a weak handle
        let handle = Arc::downgrade(&server);
        let peer_count = Arc::clone(&peer_count);
        server
            .set_send_hook(move |_addr| Message::Snapshot {
                tick: handle.upgrade().map_or(0, |server| server.cycles()),
                peers: peer_count.load(Ordering::Relaxed),
            })
            .await;
    }

    let monitor = {
        let server = Arc::clone(&server);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(server.config().tick_interval());
            loop {
                interval.tick().await;
                let peers = u32::try_from(server.peer_count().await).unwrap_or(u32::MAX);
                peer_count.store(peers, Ordering::Relaxed);
            }
        })
    };

    tokio::signal::ctrl_c().await?;
    info!("Received Ctrl+C, shutting down gracefully...");

    monitor.abort();
    let _ = monitor.await;

    match Arc::try_unwrap(server) {
        Ok(server) => server.shutdown().await,
        Err(server) => server.stop(),
    }

    Ok(())
}
