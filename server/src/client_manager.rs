//! Roster of connected lobby clients
//!
//! This module tracks who is connected to the lobby:
//! - Client connection lifecycle (join, leave)
//! - Outbound message channels to each client's writer task
//! - The last score each client reported
//! - Seat selection for the next round
//!
//! The roster is owned by the server event loop and never shared, so it
//! needs no locking.

use log::{debug, info};
use shared::Message;
use std::collections::BTreeMap;
use std::net::{IpAddr, SocketAddr};
use tokio::sync::mpsc;

/// A connected client as the lobby sees it
#[derive(Debug)]
pub struct LobbyClient {
    /// Unique client identifier assigned by the server
    pub id: u32,
    /// Remote address; its IP is what peers dial
    pub addr: SocketAddr,
    /// Queue feeding this client's writer task
    pub sender: mpsc::UnboundedSender<Message>,
    /// Latest SCORE_UPDATE from this client, if any
    pub last_score: Option<i64>,
}

impl LobbyClient {
    pub fn new(id: u32, addr: SocketAddr, sender: mpsc::UnboundedSender<Message>) -> Self {
        Self {
            id,
            addr,
            sender,
            last_score: None,
        }
    }

    /// Display name used in relayed chat.
    pub fn name(&self) -> String {
        format!("player{}", self.id)
    }

    /// Queues a message. Returns false if the writer task is gone.
    pub fn send(&self, msg: Message) -> bool {
        self.sender.send(msg).is_ok()
    }
}

/// Manages all connected clients
///
/// Clients are kept in join order (ids only ever grow), which is also the
/// order seats are handed out in.
pub struct ClientManager {
    /// Connected clients indexed by their unique ID
    clients: BTreeMap<u32, LobbyClient>,
    /// Next available client ID for new connections
    next_client_id: u32,
    /// Maximum number of concurrent clients allowed
    max_clients: usize,
}

impl ClientManager {
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: BTreeMap::new(),
            next_client_id: 1,
            max_clients,
        }
    }

    /// Adds a client. Returns `None` when the lobby is full.
    pub fn add_client(
        &mut self,
        addr: SocketAddr,
        sender: mpsc::UnboundedSender<Message>,
    ) -> Option<u32> {
        if self.clients.len() >= self.max_clients {
            return None;
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        info!("Client {} connected from {}", client_id, addr);
        self.clients
            .insert(client_id, LobbyClient::new(client_id, addr, sender));
        Some(client_id)
    }

    /// Removes a client and hands it back. Dropping it ends its writer task.
    pub fn remove_client(&mut self, client_id: &u32) -> Option<LobbyClient> {
        let client = self.clients.remove(client_id)?;
        info!("Client {} disconnected", client.id);
        Some(client)
    }

    pub fn name_of(&self, client_id: &u32) -> String {
        self.clients
            .get(client_id)
            .map(LobbyClient::name)
            .unwrap_or_else(|| format!("player{}", client_id))
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// The first `count` clients in join order with their IPs.
    pub fn seats(&self, count: usize) -> Vec<(u32, IpAddr)> {
        self.clients
            .values()
            .take(count)
            .map(|c| (c.id, c.addr.ip()))
            .collect()
    }

    pub fn send_to(&self, client_id: &u32, msg: Message) -> bool {
        match self.clients.get(client_id) {
            Some(client) => client.send(msg),
            None => false,
        }
    }

    /// Sends to everyone except `exclude`. Returns the number reached.
    pub fn broadcast(&self, msg: &Message, exclude: Option<u32>) -> usize {
        self.clients
            .values()
            .filter(|c| Some(c.id) != exclude)
            .filter(|c| c.send(msg.clone()))
            .count()
    }

    pub fn record_score(&mut self, client_id: &u32, score: i64) -> bool {
        match self.clients.get_mut(client_id) {
            Some(client) => {
                debug!("Client {} score {}", client_id, score);
                client.last_score = Some(score);
                true
            }
            None => false,
        }
    }

    pub fn clear_scores(&mut self) {
        for client in self.clients.values_mut() {
            client.last_score = None;
        }
    }
}
