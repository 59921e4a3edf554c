use clap::Parser;
use client::input::WanderInput;
use client::network::{ClientConfig, ClientSession};
use log::info;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server host name or address
    #[arg(short = 's', long, default_value = "localhost")]
    server: String,

    /// Server port
    #[arg(short, long, default_value_t = shared::NET_DEFAULT_PORT)]
    port: u16,

    /// Frame loop poll interval in milliseconds
    #[arg(short = 'f', long, default_value = "2")]
    frame_ms: u64,

    /// Seed for the wandering input; random when omitted
    #[arg(long)]
    seed: Option<u64>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let config = ClientConfig {
        server_host: args.server,
        port: args.port,
        frame: Duration::from_millis(args.frame_ms.max(1)),
        seed: args.seed,
    };

    let seed = config.seed.unwrap_or_else(rand::random);
    info!("Starting client...");
    info!("Connecting to: {}:{}", config.server_host, config.port);
    info!("Wander seed: {}", seed);

    let mut session = ClientSession::connect(&config, Box::new(WanderInput::new(seed))).await;
    tokio::select! {
        _ = session.run(config.frame) => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
