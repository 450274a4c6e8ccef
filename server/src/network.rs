//! Server network layer: WebSocket connections and the round event loop

use crate::config::GameConfig;
use crate::game::{CrashGame, Step};
use crate::gateway::{ClientHandle, Gateway, OUTBOUND_QUEUE};
use crate::scheduler::Scheduler;
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use shared::{ClientEvent, ConnectionId, ServerEvent};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

/// Messages sent from connection tasks to the main server loop
#[derive(Debug)]
pub enum ServerMessage {
    Connected {
        id: ConnectionId,
        addr: SocketAddr,
        sender: mpsc::Sender<Message>,
    },
    Event {
        id: ConnectionId,
        event: ClientEvent,
    },
    Malformed {
        id: ConnectionId,
        reason: String,
    },
    Disconnected {
        id: ConnectionId,
    },
}

/// Main server: accepts connections and owns the only copy of the game state
pub struct Server {
    listener: Arc<TcpListener>,
    game: CrashGame,
    gateway: Gateway,
    scheduler: Scheduler,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
}

impl Server {
    pub async fn new(
        addr: &str,
        config: GameConfig,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let listener = Arc::new(TcpListener::bind(addr).await?);
        info!("Server listening on {}", listener.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();

        Ok(Server {
            listener,
            game: CrashGame::new(config),
            gateway: Gateway::new(),
            scheduler: Scheduler::new(),
            server_tx,
            server_rx,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Spawns task that accepts connections and hands each one its own task
    fn spawn_acceptor(&self) {
        let listener = Arc::clone(&self.listener);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut next_id: ConnectionId = 1;

            loop {
                match listener.accept().await {
                    Ok((stream, addr)) => {
                        let id = next_id;
                        next_id += 1;
                        tokio::spawn(handle_connection(stream, addr, id, server_tx.clone()));
                    }
                    Err(e) => {
                        error!("Error accepting connection: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Applies a step: arms its timer, then delivers its messages in order
    fn apply(&mut self, step: Step) {
        if let Some(timer) = step.timer {
            self.scheduler.arm(timer, self.game.timer_delay(timer));
        }
        self.gateway.deliver(step.dispatches);
    }

    fn handle_message(&mut self, message: ServerMessage) {
        match message {
            ServerMessage::Connected { id, addr, sender } => {
                let snapshot = self.game.connect(id);
                if self
                    .gateway
                    .attach(ClientHandle::new(id, addr, sender), &snapshot)
                {
                    info!(
                        "Client {} connected from {} ({} online)",
                        id,
                        addr,
                        self.gateway.len()
                    );
                }
            }
            ServerMessage::Event { id, event } => {
                let step = self.game.handle(id, event);
                self.apply(step);
            }
            ServerMessage::Malformed { id, reason } => {
                warn!("Malformed frame from client {}: {}", id, reason);
                self.gateway.send_to(id, &ServerEvent::Error { message: reason });
            }
            ServerMessage::Disconnected { id } => {
                self.gateway.detach(id);
                let step = self.game.disconnect(id);
                self.apply(step);
                info!("Client {} disconnected ({} online)", id, self.gateway.len());
            }
        }
    }

    /// Main server loop
    ///
    /// Client messages and timer firings are handled one at a time, so every
    /// read and write of round and player state is serialized here.
    pub async fn run(mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.spawn_acceptor();
        info!("Server started successfully");

        loop {
            tokio::select! {
                message = self.server_rx.recv() => {
                    match message {
                        Some(message) => self.handle_message(message),
                        None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                timer = self.scheduler.fired() => {
                    let step = self.game.on_timer(timer);
                    self.apply(step);
                },
            }
        }

        Ok(())
    }
}

/// Runs one WebSocket connection until either side closes it
///
/// Inbound frames are parsed here and forwarded to the main loop; outbound
/// messages arrive on a bounded queue drained by a separate writer task.
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    id: ConnectionId,
    server_tx: mpsc::UnboundedSender<ServerMessage>,
) {
    let ws = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("WebSocket handshake with {} failed: {}", addr, e);
            return;
        }
    };

    let (mut sink, mut frames) = ws.split();
    let (sender, mut outbound) = mpsc::channel::<Message>(OUTBOUND_QUEUE);

    if server_tx
        .send(ServerMessage::Connected { id, addr, sender })
        .is_err()
    {
        return;
    }

    tokio::spawn(async move {
        while let Some(message) = outbound.recv().await {
            if let Err(e) = sink.send(message).await {
                debug!("Write to client {} failed: {}", id, e);
                break;
            }
        }
        let _ = sink.close().await;
    });

    while let Some(frame) = frames.next().await {
        let message = match frame {
            Ok(Message::Text(text)) => match ClientEvent::parse(&text) {
                Ok(event) => ServerMessage::Event { id, event },
                Err(e) => ServerMessage::Malformed {
                    id,
                    reason: format!("Invalid message: {}", e),
                },
            },
            Ok(Message::Binary(_)) => ServerMessage::Malformed {
                id,
                reason: "Binary frames are not supported".to_string(),
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                debug!("Read from client {} failed: {}", id, e);
                break;
            }
        };

        if server_tx.send(message).is_err() {
            return;
        }
    }

    let _ = server_tx.send(ServerMessage::Disconnected { id });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{Dispatch, TimerKind};
    use serde_json::json;

    async fn test_server() -> Server {
        Server::new("127.0.0.1:0", GameConfig::default())
            .await
            .expect("bind")
    }

    fn connect(server: &mut Server, id: ConnectionId) -> mpsc::Receiver<Message> {
        let (sender, rx) = mpsc::channel(OUTBOUND_QUEUE);
        server.handle_message(ServerMessage::Connected {
            id,
            addr: "127.0.0.1:9000".parse().unwrap(),
            sender,
        });
        rx
    }

    fn drain(rx: &mut mpsc::Receiver<Message>) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(Message::Text(text)) = rx.try_recv() {
            events.push(serde_json::from_str(&text).unwrap());
        }
        events
    }

    #[tokio::test]
    async fn test_connect_sends_snapshot() {
        let mut server = test_server().await;
        let mut rx = connect(&mut server, 1);

        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], ServerEvent::InitState(_)));
        assert!(server.gateway.contains(1));
    }

    #[tokio::test]
    async fn test_bet_arms_countdown_and_broadcasts() {
        let mut server = test_server().await;
        let mut alice = connect(&mut server, 1);
        let mut watcher = connect(&mut server, 2);
        drain(&mut alice);
        drain(&mut watcher);

        server.handle_message(ServerMessage::Event {
            id: 1,
            event: ClientEvent::RegisterPlayer {
                username: "Alice".to_string(),
            },
        });
        server.handle_message(ServerMessage::Event {
            id: 1,
            event: ClientEvent::PlaceBet { bet: json!(100) },
        });

        assert_eq!(server.scheduler.pending(), Some(TimerKind::CountdownTick));
        let names: Vec<_> = drain(&mut watcher).iter().map(|e| e.name()).collect();
        assert_eq!(names, vec!["player_bet", "countdown_start"]);
        let names: Vec<_> = drain(&mut alice).iter().map(|e| e.name()).collect();
        assert_eq!(
            names,
            vec![
                "player_registered",
                "response",
                "bet_confirmed",
                "response",
                "player_bet",
                "countdown_start"
            ]
        );
    }

    #[tokio::test]
    async fn test_malformed_frame_gets_direct_error() {
        let mut server = test_server().await;
        let mut rx = connect(&mut server, 1);
        let mut other = connect(&mut server, 2);
        drain(&mut rx);
        drain(&mut other);

        server.handle_message(ServerMessage::Malformed {
            id: 1,
            reason: "Invalid message".to_string(),
        });
        assert_eq!(
            drain(&mut rx),
            vec![ServerEvent::Error {
                message: "Invalid message".to_string()
            }]
        );
        assert!(drain(&mut other).is_empty());
    }

    #[tokio::test]
    async fn test_disconnect_detaches_and_announces() {
        let mut server = test_server().await;
        let _alice = connect(&mut server, 1);
        let mut bob = connect(&mut server, 2);
        drain(&mut bob);
        server.handle_message(ServerMessage::Event {
            id: 1,
            event: ClientEvent::RegisterPlayer {
                username: "Alice".to_string(),
            },
        });

        server.handle_message(ServerMessage::Disconnected { id: 1 });
        assert!(!server.gateway.contains(1));
        assert!(server.game.registry().find_by_connection(1).is_none());
        assert_eq!(
            drain(&mut bob),
            vec![ServerEvent::PlayerDisconnected {
                id: 1,
                username: "Alice".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn test_apply_without_timer_keeps_pending() {
        let mut server = test_server().await;
        server.scheduler.arm(TimerKind::Cooldown, Duration::from_secs(3));
        server.apply(Step {
            dispatches: vec![Dispatch::Broadcast(ServerEvent::success())],
            timer: None,
        });
        assert_eq!(server.scheduler.pending(), Some(TimerKind::Cooldown));
    }
}
