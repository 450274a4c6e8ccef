use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use log::{info, warn};
use serde_json::json;
use shared::{ClientEvent, ServerEvent};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

/// Headless player: registers, bets every round and logs what the table does
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// WebSocket URL of the server
    #[clap(short, long, default_value = "ws://127.0.0.1:3000")]
    server: String,
    /// Display name to register
    #[clap(short, long, default_value = "bot")]
    username: String,
    /// Stake placed each round
    #[clap(short, long, default_value = "10")]
    bet: u64,
    /// Cash out automatically at this multiplier
    #[clap(short, long)]
    auto_cashout: Option<f64>,
    /// Stop after this many rounds
    #[clap(short, long, default_value = "3")]
    rounds: u32,
}

fn frame(event: &ClientEvent) -> Result<Message, serde_json::Error> {
    Ok(Message::Text(serde_json::to_string(event)?))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    info!("Connecting to {}", args.server);
    let (ws, _) = connect_async(args.server.as_str()).await?;
    let (mut sink, mut stream) = ws.split();

    sink.send(frame(&ClientEvent::RegisterPlayer {
        username: args.username.clone(),
    })?)
    .await?;
    if let Some(multiplier) = args.auto_cashout {
        sink.send(frame(&ClientEvent::SetAutoCashout {
            multiplier: json!(multiplier),
        })?)
        .await?;
    }

    let place_bet = frame(&ClientEvent::PlaceBet { bet: json!(args.bet) })?;
    let mut rounds_seen = 0;

    while let Some(message) = stream.next().await {
        let text = match message? {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };
        let event: ServerEvent = match serde_json::from_str(&text) {
            Ok(event) => event,
            Err(e) => {
                warn!("Unreadable event {}: {}", text, e);
                continue;
            }
        };

        match event {
            ServerEvent::InitState(snapshot) => {
                info!(
                    "Table is {} at {:.2}x, recent crashes {:?}",
                    snapshot.phase.as_str(),
                    snapshot.current_multiplier,
                    snapshot.recent_games
                );
            }
            ServerEvent::PlayerRegistered { balance, .. } => {
                info!("Registered as {} with {} credits", args.username, balance);
                // Rejected if a round is already under way; the next crash retries.
                sink.send(place_bet.clone()).await?;
            }
            ServerEvent::Response {
                success: false,
                error,
            } => warn!("Rejected: {}", error.unwrap_or_default()),
            ServerEvent::BetConfirmed { bet, balance } => {
                info!("Bet {} placed, balance {}", bet, balance)
            }
            ServerEvent::CountdownStart { time_left } => info!("Round starts in {}s", time_left),
            ServerEvent::GameStart { active_players } => {
                info!("Round running with {} players", active_players.len())
            }
            ServerEvent::CashOutConfirmed {
                multiplier,
                winnings,
                balance,
            } => info!(
                "Cashed out at {:.2}x for {}, balance {}",
                multiplier, winnings, balance
            ),
            ServerEvent::GameCrash {
                crash_point,
                game_result,
            } => {
                rounds_seen += 1;
                let mine = game_result
                    .players
                    .iter()
                    .find(|p| p.username == args.username);
                match mine {
                    Some(outcome) => info!("Crashed at {}x, profit {}", crash_point, outcome.profit),
                    None => info!("Crashed at {}x", crash_point),
                }
                if rounds_seen >= args.rounds {
                    break;
                }
                sink.send(place_bet.clone()).await?;
            }
            ServerEvent::ChatMessage {
                username, message, ..
            } => info!("[{}] {}", username, message),
            _ => {}
        }
    }

    let _ = sink.close().await;
    info!("Done after {} rounds", rounds_seen);
    Ok(())
}
