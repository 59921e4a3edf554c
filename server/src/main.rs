use clap::Parser;
use log::info;
use server::network::{Server, ServerConfig};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to bind the UDP socket to
    #[arg(short = 'H', long, default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = shared::NET_DEFAULT_PORT)]
    port: u16,

    /// Maximum number of connected users
    #[arg(short = 'm', long, default_value = "16")]
    max_users: usize,

    /// Drop users silent for this many milliseconds
    #[arg(short = 't', long, default_value = "5000")]
    user_timeout_ms: u64,

    /// Send each user a cell of a tiled desktop layout
    #[arg(short = 'w', long)]
    window_layout: bool,

    /// Frame loop poll interval in milliseconds
    #[arg(short = 'f', long, default_value = "2")]
    frame_ms: u64,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let config = ServerConfig {
        host: args.host,
        port: args.port,
        max_users: args.max_users,
        user_timeout: Duration::from_millis(args.user_timeout_ms),
        window_layout: args.window_layout,
        frame: Duration::from_millis(args.frame_ms.max(1)),
    };

    info!("Starting server...");
    info!(
        "Max users: {}, timeout: {:?}",
        config.max_users, config.user_timeout
    );

    let mut server = Server::bind(config).await;
    tokio::select! {
        _ = server.run() => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
