use clap::Parser;
use client::Client;
use log::info;
use rand::Rng;
use shared::{timestamp_millis, Message};
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: SocketAddr,

    /// Heartbeats sent per second
    #[arg(short = 'r', long, default_value = "20")]
    rate: u32,

    /// Name announced to the server, random if not given
    #[arg(short = 'n', long)]
    name: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let name = args
        .name
        .unwrap_or_else(|| format!("peer-{:04x}", rand::thread_rng().gen::<u16>()));
    let send_interval = Duration::from_secs_f64(1.0 / f64::from(args.rate.max(1)));

    info!("Starting client {}...", name);
    info!("Connecting to: {}", args.server);

    let client: Client<Message> = Client::connect(args.server, send_interval).await?;
    client.send(&Message::Hello { name }).await?;

    client
        .set_payload(|| Message::Heartbeat {
            timestamp: timestamp_millis(),
        })
        .await;

    client
        .set_receive_hook(|message| match message {
            Message::Snapshot { tick, peers } => {
                if tick % 120 == 0 {
                    info!("Server tick {}: {} peers online", tick, peers);
                }
            }
            Message::Text(text) => info!("Server says: {}", text),
            other => info!("Received {:?}", other),
        })
        .await;

    tokio::signal::ctrl_c().await?;
    info!("Received Ctrl+C, terminating...");

    let stats = client.stats();
    client.terminate();
    client.join().await;
    info!("Sent {} datagrams, received {}", stats.sent, stats.received);

    Ok(())
}
