use clap::Parser;
use client::config::ClientConfig;
use client::input::TerminalInput;
use client::network::{Client, Frontend};
use client::session::GameSession;
use client::simulation::{HeadlessSimulation, Simulation};
use client::ui::ConsoleUi;
use log::{error, info};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Simulation tick interval in milliseconds
    #[arg(long, default_value = "50")]
    tick_ms: u64,

    /// Score report interval in milliseconds
    #[arg(long, default_value = "1000")]
    score_interval_ms: u64,

    /// Treat the server as gone after this much silence (0 = wait forever)
    #[arg(long, default_value = "0")]
    read_timeout_ms: u64,

    /// Give up waiting for peers after this long (0 = wait forever)
    #[arg(long, default_value = "0")]
    peer_timeout_ms: u64,

    /// Address the peer listener binds
    #[arg(long, default_value = "0.0.0.0")]
    peer_host: String,

    /// Connection attempts before giving up
    #[arg(short = 'c', long, default_value = "3")]
    connect_attempts: u32,
}

fn optional_millis(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

impl Args {
    fn into_config(self) -> ClientConfig {
        ClientConfig {
            server_addr: self.server,
            connect_attempts: self.connect_attempts,
            read_timeout: optional_millis(self.read_timeout_ms),
            tick_interval: Duration::from_millis(self.tick_ms.max(1)),
            score_interval: Duration::from_millis(self.score_interval_ms.max(1)),
            peer_host: self.peer_host,
            peer_timeout: optional_millis(self.peer_timeout_ms),
            ..ClientConfig::default()
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let config = Args::parse().into_config();

    info!("Starting client...");
    info!("Connecting to: {}", config.server_addr);
    info!("Controls: type to chat, Enter to send, Esc or Ctrl-C to quit");
    info!("In game: A/D move, W rotate, S soft drop, Space hard drop, Q leave");

    let client = Client::connect(config)?;
    let input = TerminalInput::new()?;

    let summary = client.run(Frontend {
        input: Box::new(input),
        chat: Box::new(ConsoleUi),
        chat_status: Box::new(ConsoleUi),
        game_status: Box::new(ConsoleUi),
        simulations: Box::new(|game: &GameSession| -> Box<dyn Simulation> {
            Box::new(HeadlessSimulation::new(game.params.n_baselines))
        }),
    });

    match summary {
        Ok(summary) if summary.connection_lost() => {
            error!("Lost connection to server");
            eprintln!(
                "\r\nConnection to server lost after {} sessions",
                summary.sessions.len()
            );
            std::process::exit(2);
        }
        Ok(summary) => {
            info!("Disconnected after {} sessions", summary.sessions.len());
            Ok(())
        }
        Err(e) => {
            error!("Client failed: {}", e);
            Err(e.into())
        }
    }
}
