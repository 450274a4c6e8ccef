//! Integration tests for the crash game server
//!
//! These tests run a real listener and drive it with WebSocket clients.

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use server::config::GameConfig;
use server::network::Server;
use shared::{ClientEvent, Phase, ServerEvent};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WAIT: Duration = Duration::from_secs(10);

/// Timings short enough to play whole rounds inside a test
fn fast_config() -> GameConfig {
    GameConfig {
        countdown_secs: 2,
        countdown_tick: Duration::from_millis(20),
        multiplier_tick: Duration::from_millis(2),
        cooldown: Duration::from_millis(50),
        ..GameConfig::default()
    }
}

async fn start_server(config: GameConfig) -> String {
    let server = Server::new("127.0.0.1:0", config)
        .await
        .expect("Failed to bind server");
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.run());
    format!("ws://{}", addr)
}

async fn connect(url: &str) -> Client {
    let (client, _) = connect_async(url).await.expect("Failed to connect");
    client
}

async fn send(client: &mut Client, event: ClientEvent) {
    let text = serde_json::to_string(&event).unwrap();
    client.send(Message::Text(text)).await.unwrap();
}

async fn recv(client: &mut Client) -> ServerEvent {
    loop {
        let frame = timeout(WAIT, client.next())
            .await
            .expect("Timed out waiting for event")
            .expect("Connection closed")
            .expect("Read failed");
        if let Message::Text(text) = frame {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

/// Skips events until one with the given wire name arrives
async fn recv_until(client: &mut Client, name: &str) -> ServerEvent {
    timeout(WAIT, async {
        loop {
            let event = recv(client).await;
            if event.name() == name {
                return event;
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("Timed out waiting for {}", name))
}

async fn register(client: &mut Client, username: &str) {
    send(
        client,
        ClientEvent::RegisterPlayer {
            username: username.to_string(),
        },
    )
    .await;
    assert!(matches!(recv(client).await, ServerEvent::PlayerRegistered { .. }));
    assert_eq!(recv(client).await, ServerEvent::success());
}

/// NETWORK PROTOCOL TESTS
mod protocol_tests {
    use super::*;

    /// A new connection gets the snapshot before anything else
    #[tokio::test]
    async fn snapshot_is_first_message() {
        let url = start_server(fast_config()).await;
        let mut client = connect(&url).await;

        match recv(&mut client).await {
            ServerEvent::InitState(snapshot) => {
                assert_eq!(snapshot.phase, Phase::Idle);
                assert!(!snapshot.is_active);
                assert!(snapshot.recent_games.is_empty());
                assert!(snapshot.players.is_empty());
            }
            other => panic!("Expected init_state, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn malformed_frame_gets_error() {
        let url = start_server(fast_config()).await;
        let mut client = connect(&url).await;
        recv(&mut client).await;

        client
            .send(Message::Text("{\"event\":\"launch\"}".to_string()))
            .await
            .unwrap();
        assert!(matches!(recv(&mut client).await, ServerEvent::Error { .. }));

        // The connection stays usable
        register(&mut client, "Alice").await;
    }

    #[tokio::test]
    async fn registration_rejects_duplicate_name() {
        let url = start_server(fast_config()).await;
        let mut alice = connect(&url).await;
        let mut impostor = connect(&url).await;
        recv(&mut alice).await;
        recv(&mut impostor).await;

        register(&mut alice, "Alice").await;
        send(
            &mut impostor,
            ClientEvent::RegisterPlayer {
                username: "Alice".to_string(),
            },
        )
        .await;
        assert_eq!(
            recv(&mut impostor).await,
            ServerEvent::failure("Username is already taken")
        );
    }
}

/// ROUND FLOW TESTS
mod round_tests {
    use super::*;

    #[tokio::test]
    async fn bet_runs_a_full_round() {
        let url = start_server(fast_config()).await;
        let mut alice = connect(&url).await;
        recv(&mut alice).await;
        register(&mut alice, "Alice").await;

        send(&mut alice, ClientEvent::PlaceBet { bet: json!(100) }).await;
        assert_eq!(
            recv(&mut alice).await,
            ServerEvent::BetConfirmed {
                bet: 100,
                balance: 900
            }
        );
        assert_eq!(recv(&mut alice).await, ServerEvent::success());
        assert!(matches!(recv(&mut alice).await, ServerEvent::PlayerBet { bet: 100, .. }));
        assert_eq!(
            recv(&mut alice).await,
            ServerEvent::CountdownStart { time_left: 2 }
        );

        match recv_until(&mut alice, "game_start").await {
            ServerEvent::GameStart { active_players } => {
                assert_eq!(active_players.len(), 1);
                assert_eq!(active_players[0].username, "Alice");
            }
            other => panic!("Unexpected {:?}", other),
        }

        match recv_until(&mut alice, "game_crash").await {
            ServerEvent::GameCrash {
                crash_point,
                game_result,
            } => {
                let point: f64 = crash_point.parse().unwrap();
                assert!((1.0..=15.0).contains(&point));
                assert_eq!(game_result.players.len(), 1);
                assert_eq!(game_result.players[0].profit, -100);
            }
            other => panic!("Unexpected {:?}", other),
        }

        // A late joiner sees the finished round in its snapshot
        let mut late = connect(&url).await;
        match recv(&mut late).await {
            ServerEvent::InitState(snapshot) => {
                assert_eq!(snapshot.recent_games.len(), 1);
                assert_eq!(snapshot.game_history.len(), 1);
                assert!(snapshot.players.is_empty());
            }
            other => panic!("Unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn bets_closed_during_countdown() {
        let url = start_server(GameConfig {
            countdown_tick: Duration::from_millis(500),
            ..fast_config()
        })
        .await;
        let mut alice = connect(&url).await;
        let mut bob = connect(&url).await;
        recv(&mut alice).await;
        recv(&mut bob).await;
        register(&mut alice, "Alice").await;
        register(&mut bob, "Bob").await;

        send(&mut alice, ClientEvent::PlaceBet { bet: json!(100) }).await;
        recv_until(&mut bob, "countdown_start").await;

        send(&mut bob, ClientEvent::PlaceBet { bet: json!(50) }).await;
        assert_eq!(
            recv_until(&mut bob, "response").await,
            ServerEvent::failure("Bets for the current round are closed")
        );
    }

    #[tokio::test]
    async fn auto_cashout_over_the_wire() {
        let url = start_server(fast_config()).await;
        let mut alice = connect(&url).await;
        recv(&mut alice).await;
        register(&mut alice, "Alice").await;

        send(
            &mut alice,
            ClientEvent::SetAutoCashout {
                multiplier: json!("1.05"),
            },
        )
        .await;
        assert_eq!(
            recv(&mut alice).await,
            ServerEvent::AutoCashoutSet { multiplier: 1.05 }
        );

        send(&mut alice, ClientEvent::PlaceBet { bet: json!(100) }).await;
        recv_until(&mut alice, "game_start").await;

        // A crash below the threshold is possible, if rare
        loop {
            match recv(&mut alice).await {
                ServerEvent::CashOutConfirmed {
                    multiplier,
                    winnings,
                    balance,
                } => {
                    assert!(multiplier >= 1.05);
                    assert_eq!(winnings, shared::payout(100, multiplier));
                    assert_eq!(balance, 900 + winnings);
                    break;
                }
                ServerEvent::GameCrash { game_result, .. } => {
                    assert!(!game_result.players[0].did_cash_out);
                    break;
                }
                _ => {}
            }
        }
    }

    #[tokio::test]
    async fn bet_during_cooldown_starts_next_round() {
        let url = start_server(GameConfig {
            cooldown: Duration::from_millis(300),
            ..fast_config()
        })
        .await;
        let mut alice = connect(&url).await;
        recv(&mut alice).await;
        register(&mut alice, "Alice").await;

        send(&mut alice, ClientEvent::PlaceBet { bet: json!(10) }).await;
        recv_until(&mut alice, "game_crash").await;

        send(&mut alice, ClientEvent::PlaceBet { bet: json!(10) }).await;
        assert_eq!(
            recv(&mut alice).await,
            ServerEvent::BetConfirmed {
                bet: 10,
                balance: 980
            }
        );
        assert_eq!(
            recv_until(&mut alice, "countdown_start").await,
            ServerEvent::CountdownStart { time_left: 2 }
        );
    }
}

/// CLIENT LIFECYCLE TESTS
mod lifecycle_tests {
    use super::*;

    #[tokio::test]
    async fn disconnect_is_announced() {
        let url = start_server(fast_config()).await;
        let mut alice = connect(&url).await;
        let mut bob = connect(&url).await;
        recv(&mut alice).await;
        recv(&mut bob).await;
        register(&mut bob, "Bob").await;

        bob.close(None).await.unwrap();
        drop(bob);

        assert_eq!(
            recv_until(&mut alice, "player_disconnected").await,
            ServerEvent::PlayerDisconnected {
                id: 2,
                username: "Bob".to_string()
            }
        );
    }

    #[tokio::test]
    async fn chat_is_broadcast() {
        let url = start_server(fast_config()).await;
        let mut alice = connect(&url).await;
        let mut bob = connect(&url).await;
        recv(&mut alice).await;
        recv(&mut bob).await;
        register(&mut alice, "Alice").await;

        send(
            &mut alice,
            ClientEvent::ChatMessage {
                message: "good luck".to_string(),
            },
        )
        .await;
        match recv_until(&mut bob, "chat_message").await {
            ServerEvent::ChatMessage {
                username, message, ..
            } => {
                assert_eq!(username, "Alice");
                assert_eq!(message, "good luck");
            }
            other => panic!("Unexpected {:?}", other),
        }
    }
}
