//! Outbound delivery to connected clients
//!
//! Every connection owns a bounded queue drained by its own writer task. The
//! gateway only ever `try_send`s into those queues, so a slow or vanished
//! client can never stall the round loop: a client whose queue is closed or
//! full is detached and the remaining clients are served as usual.

use crate::game::Dispatch;
use log::{debug, error, warn};
use shared::{ConnectionId, ServerEvent};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_tungstenite::tungstenite::Message;

/// Capacity of each connection's outbound queue
pub const OUTBOUND_QUEUE: usize = 256;

/// Outbound side of one attached connection
#[derive(Debug)]
pub struct ClientHandle {
    pub id: ConnectionId,
    pub addr: SocketAddr,
    pub connected_at: Instant,
    sender: mpsc::Sender<Message>,
}

impl ClientHandle {
    pub fn new(id: ConnectionId, addr: SocketAddr, sender: mpsc::Sender<Message>) -> Self {
        ClientHandle {
            id,
            addr,
            connected_at: Instant::now(),
            sender,
        }
    }

    fn push(&self, text: &str) -> Result<(), TrySendError<Message>> {
        self.sender.try_send(Message::Text(text.to_string()))
    }
}

#[derive(Debug, Default)]
pub struct Gateway {
    clients: HashMap<ConnectionId, ClientHandle>,
}

impl Gateway {
    pub fn new() -> Self {
        Self {
            clients: HashMap::new(),
        }
    }

    /// Attaches a connection, queueing `snapshot` ahead of anything else.
    ///
    /// The client only joins the broadcast set after its snapshot is queued,
    /// so it never sees an incremental update before the full state.
    pub fn attach(&mut self, handle: ClientHandle, snapshot: &ServerEvent) -> bool {
        let text = match snapshot.to_json() {
            Ok(text) => text,
            Err(e) => {
                error!("Failed to encode snapshot for {}: {}", handle.id, e);
                return false;
            }
        };
        if let Err(e) = handle.push(&text) {
            warn!("Client {} gone before snapshot: {}", handle.id, e);
            return false;
        }

        debug!("Client {} attached from {}", handle.id, handle.addr);
        self.clients.insert(handle.id, handle);
        true
    }

    pub fn detach(&mut self, id: ConnectionId) -> bool {
        match self.clients.remove(&id) {
            Some(handle) => {
                debug!(
                    "Client {} detached after {:.1}s",
                    id,
                    handle.connected_at.elapsed().as_secs_f32()
                );
                true
            }
            None => false,
        }
    }

    pub fn send_to(&mut self, id: ConnectionId, event: &ServerEvent) {
        let Some(text) = encode(event) else { return };
        let failed = match self.clients.get(&id) {
            Some(handle) => handle.push(&text).is_err(),
            None => {
                debug!("Dropping {} for detached client {}", event.name(), id);
                false
            }
        };
        if failed {
            warn!("Failed to deliver {} to client {}", event.name(), id);
            self.detach(id);
        }
    }

    pub fn broadcast(&mut self, event: &ServerEvent) {
        let Some(text) = encode(event) else { return };
        let failed: Vec<ConnectionId> = self
            .clients
            .values()
            .filter(|handle| handle.push(&text).is_err())
            .map(|handle| handle.id)
            .collect();

        for id in failed {
            warn!("Failed to broadcast {} to client {}", event.name(), id);
            self.detach(id);
        }
    }

    /// Delivers dispatches in order
    pub fn deliver(&mut self, dispatches: Vec<Dispatch>) {
        for dispatch in dispatches {
            match dispatch {
                Dispatch::Broadcast(event) => self.broadcast(&event),
                Dispatch::Direct(id, event) => self.send_to(id, &event),
            }
        }
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.clients.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

fn encode(event: &ServerEvent) -> Option<String> {
    match event.to_json() {
        Ok(text) => Some(text),
        Err(e) => {
            error!("Failed to encode {}: {}", event.name(), e);
            None
        }
    }
}
