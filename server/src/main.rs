use clap::Parser;
use env_logger::Env;
use log::{error, info};
use server::config::GameConfig;
use server::network::Server;
use std::time::Duration;

/// Command line arguments
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server IP address to bind to
    #[clap(short = 'H', long, env = "CRASH_HOST", default_value = "127.0.0.1")]
    host: String,
    /// Server port to listen on
    #[clap(short, long, env = "CRASH_PORT", default_value = "3000")]
    port: u16,
    /// Seconds counted down before a round starts
    #[clap(long, env = "CRASH_COUNTDOWN_SECS", default_value = "5")]
    countdown_secs: u32,
    /// Length of one countdown second in milliseconds
    #[clap(long, env = "CRASH_COUNTDOWN_TICK_MS", default_value = "1000")]
    countdown_tick_ms: u64,
    /// Milliseconds between multiplier updates
    #[clap(short, long, env = "CRASH_TICK_MS", default_value = "100")]
    tick_ms: u64,
    /// Pause after a crash in milliseconds
    #[clap(long, env = "CRASH_COOLDOWN_MS", default_value = "3000")]
    cooldown_ms: u64,
    /// Credits given to each newly registered player
    #[clap(long, env = "CRASH_STARTING_BALANCE", default_value = "1000")]
    starting_balance: u64,
}

impl Args {
    fn game_config(&self) -> GameConfig {
        GameConfig {
            countdown_secs: self.countdown_secs,
            countdown_tick: Duration::from_millis(self.countdown_tick_ms),
            multiplier_tick: Duration::from_millis(self.tick_ms.max(1)),
            cooldown: Duration::from_millis(self.cooldown_ms),
            starting_balance: self.starting_balance,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = args.game_config();
    info!("Starting crash server with {:?}", config);

    let address = format!("{}:{}", args.host, args.port);
    let server = Server::new(&address, config).await?;

    // Handle shutdown gracefully
    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server stopped: {}", e);
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    Ok(())
}
