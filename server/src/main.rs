use clap::Parser;
use log::{error, info};
use server::lobby::LobbyConfig;
use server::network::LobbyServer;
use shared::GameMode;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Players seated per round
    #[arg(short = 'n', long, default_value = "2")]
    players: usize,

    /// Most clients connected at once
    #[arg(long, default_value = "16")]
    max_clients: usize,

    /// Game mode: chill, rising-tide, fast-track or boomer
    #[arg(short, long, default_value = "rising-tide")]
    mode: GameMode,

    /// Lines to clear to win a fast-track round
    #[arg(long, default_value = "40")]
    winlines: u32,

    /// Boomer round length in minutes
    #[arg(long, default_value = "3")]
    time_limit: u32,

    /// Garbage rows every board starts with
    #[arg(long, default_value = "0")]
    baselines: u32,

    /// First port handed to clients for peer listeners
    #[arg(long, default_value = "9100")]
    peer_base_port: u16,

    /// Pause between rounds in seconds
    #[arg(long, default_value = "5")]
    round_delay_secs: u64,
}

impl Args {
    fn into_config(self) -> LobbyConfig {
        LobbyConfig {
            addr: format!("{}:{}", self.host, self.port),
            players: self.players,
            max_clients: self.max_clients,
            mode: self.mode,
            n_winlines: self.winlines,
            time_limit_minutes: self.time_limit,
            n_baselines: self.baselines,
            peer_base_port: self.peer_base_port,
            round_delay: Duration::from_secs(self.round_delay_secs),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let config = Args::parse().into_config();
    info!("Starting lobby server...");

    let mut server = LobbyServer::bind(config).await?;

    tokio::select! {
        result = server.run() => {
            if let Err(e) = &result {
                error!("Lobby stopped with error: {}", e);
            }
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
    }

    Ok(())
}
