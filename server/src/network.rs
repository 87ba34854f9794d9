//! Lobby network layer: TCP connections and the single event loop
//!
//! Every connection gets a reader task that turns frames into events and a
//! writer task fed by an unbounded channel. All lobby state (roster, round,
//! timers) is owned by the event loop in [`LobbyServer::run`]; tasks never
//! touch it directly.

use crate::client_manager::ClientManager;
use crate::lobby::{plan_round, LobbyConfig, Round};
use log::{debug, error, info, warn};
use shared::{body_len, decode, encode_frame, Decoded, Message, MessageType, ProtocolError};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::{sleep, sleep_until, Instant};

pub type ServerResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Events sent from network tasks to the lobby loop
#[derive(Debug)]
pub enum ServerEvent {
    Connected { stream: TcpStream, addr: SocketAddr },
    Frame { client_id: u32, message: Message },
    Disconnected { client_id: u32 },
}

/// Reads one framed message from an async stream.
pub async fn read_message<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Decoded, ProtocolError> {
    let mut header = [0u8; 4];
    reader.read_exact(&mut header).await?;
    let len = body_len(header)?;

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    decode(&body)
}

/// Writes one framed message to an async stream and flushes it.
pub async fn write_message<W: AsyncWrite + Unpin>(
    writer: &mut W,
    msg: &Message,
) -> Result<(), ProtocolError> {
    let frame = encode_frame(msg)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

pub struct LobbyServer {
    listener: Option<TcpListener>,
    local_addr: SocketAddr,
    config: LobbyConfig,
    clients: ClientManager,
    round: Option<Round>,
    rounds_played: u32,
    next_round_at: Option<Instant>,

    event_tx: mpsc::UnboundedSender<ServerEvent>,
    event_rx: mpsc::UnboundedReceiver<ServerEvent>,
}

impl LobbyServer {
    pub async fn bind(config: LobbyConfig) -> ServerResult<Self> {
        config.validate()?;
        let listener = TcpListener::bind(&config.addr).await?;
        let local_addr = listener.local_addr()?;
        info!("Lobby listening on {}", local_addr);

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        Ok(Self {
            listener: Some(listener),
            local_addr,
            clients: ClientManager::new(config.max_clients),
            config,
            round: None,
            rounds_played: 0,
            next_round_at: None,
            event_tx,
            event_rx,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Spawns task that accepts new connections
    fn spawn_acceptor(&mut self) {
        let Some(listener) = self.listener.take() else {
            return;
        };
        let events = self.event_tx.clone();

        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, addr)) => {
                        if events.send(ServerEvent::Connected { stream, addr }).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        error!("Error accepting connection: {}", e);
                        sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that turns incoming frames into events
    fn spawn_reader(&self, client_id: u32, read_half: OwnedReadHalf) {
        let events = self.event_tx.clone();

        tokio::spawn(async move {
            let mut reader = BufReader::new(read_half);
            loop {
                match read_message(&mut reader).await {
                    Ok(Decoded::Message(message)) => {
                        if events.send(ServerEvent::Frame { client_id, message }).is_err() {
                            return;
                        }
                    }
                    Ok(Decoded::Unrecognized(tag)) => {
                        debug!("Client {} sent unknown tag {}", client_id, tag);
                    }
                    Err(e) => {
                        if !e.is_disconnect() {
                            warn!("Dropping client {}: {}", client_id, e);
                        }
                        break;
                    }
                }
            }
            let _ = events.send(ServerEvent::Disconnected { client_id });
        });
    }

    /// Spawns task that drains a client's outgoing queue
    fn spawn_writer(
        addr: SocketAddr,
        mut write_half: OwnedWriteHalf,
        mut outgoing: mpsc::UnboundedReceiver<Message>,
    ) {
        tokio::spawn(async move {
            while let Some(message) = outgoing.recv().await {
                if let Err(e) = write_message(&mut write_half, &message).await {
                    warn!("Failed to send to {}: {}", addr, e);
                    break;
                }
            }
            let _ = write_half.shutdown().await;
        });
    }

    fn handle_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::Connected { stream, addr } => self.handle_connected(stream, addr),
            ServerEvent::Frame { client_id, message } => self.handle_message(client_id, message),
            ServerEvent::Disconnected { client_id } => self.handle_disconnected(client_id),
        }
    }

    fn handle_connected(&mut self, stream: TcpStream, addr: SocketAddr) {
        let _ = stream.set_nodelay(true);
        let (read_half, write_half) = stream.into_split();
        let (tx, rx) = mpsc::unbounded_channel();
        Self::spawn_writer(addr, write_half, rx);

        let Some(client_id) = self.clients.add_client(addr, tx.clone()) else {
            warn!("Lobby full, turning away {}", addr);
            let _ = tx.send(Message::chat("lobby is full, try again later"));
            return;
        };
        self.spawn_reader(client_id, read_half);

        let name = self.clients.name_of(&client_id);
        let _ = tx.send(Message::chat(format!(
            "welcome {}, {} of {} players here",
            name,
            self.clients.len(),
            self.config.players
        )));
        self.clients
            .broadcast(&Message::chat(format!("{} joined", name)), Some(client_id));
        self.maybe_start_round();
    }

    fn handle_message(&mut self, client_id: u32, message: Message) {
        match message.kind() {
            MessageType::Chat => {
                let line = format!("{}: {}", self.clients.name_of(&client_id), message.payload());
                self.clients.broadcast(&Message::chat(line), Some(client_id));
            }
            MessageType::ScoreUpdate => match message.parse_number::<i64>() {
                Ok(score) => {
                    self.clients.record_score(&client_id, score);
                }
                Err(e) => warn!("Bad score from client {}: {}", client_id, e),
            },
            MessageType::EndGame => match message.parse_number::<i64>() {
                Ok(score) => self.handle_end_game(client_id, score),
                Err(e) => warn!("Bad final score from client {}: {}", client_id, e),
            },
            other => warn!("Unexpected {:?} from client {}", other, client_id),
        }
    }

    fn handle_end_game(&mut self, client_id: u32, score: i64) {
        self.clients.record_score(&client_id, score);
        let Some(round) = self.round.as_mut() else {
            debug!("END_GAME from client {} outside a round", client_id);
            return;
        };
        if round.finish(client_id, score) {
            info!("Client {} finished round {} with {}", client_id, round.number, score);
            if round.is_complete() {
                self.finish_round();
            }
        }
    }

    fn handle_disconnected(&mut self, client_id: u32) {
        let Some(client) = self.clients.remove_client(&client_id) else {
            return;
        };
        self.clients
            .broadcast(&Message::chat(format!("player{} left", client_id)), None);

        if let Some(round) = self.round.as_mut() {
            // The last reported score stands in for a missing END_GAME.
            match client.last_score {
                Some(score) if round.finish(client_id, score) => {
                    info!("Client {} left round {} at {}", client_id, round.number, score);
                }
                _ => round.drop_participant(client_id),
            }
            if round.is_complete() {
                self.finish_round();
            }
        }
    }

    fn maybe_start_round(&mut self) {
        if self.round.is_some() || self.next_round_at.is_some() {
            return;
        }
        if self.clients.len() < self.config.players {
            return;
        }
        self.start_round();
    }

    fn start_round(&mut self) {
        let seed: u64 = rand::random();
        let number = self.rounds_played + 1;
        let seats = self.clients.seats(self.config.players);
        let plan = plan_round(&self.config, &seats, seed);

        info!(
            "Starting round {} ({}, seed {}) with {} players",
            number,
            self.config.mode,
            seed,
            plan.len()
        );
        for (client_id, params) in &plan {
            self.clients.send_to(client_id, Message::new_game(params));
        }
        for (client_id, _) in &plan {
            self.clients.send_to(client_id, Message::start_game());
        }

        let participants: Vec<u32> = plan.iter().map(|(id, _)| *id).collect();
        let names: Vec<String> = participants.iter().map(|id| self.clients.name_of(id)).collect();
        self.clients.broadcast(
            &Message::chat(format!(
                "round {} ({}) started: {}",
                number,
                self.config.mode,
                names.join(", ")
            )),
            None,
        );

        self.clients.clear_scores();
        self.round = Some(Round::new(number, seed, participants));
    }

    fn finish_round(&mut self) {
        let Some(round) = self.round.take() else {
            return;
        };
        self.rounds_played += 1;
        info!(
            "Round {} finished after {:.1}s",
            round.number,
            round.started_at.elapsed().as_secs_f32()
        );

        self.clients
            .broadcast(&Message::chat(format!("round {} results:", round.number)), None);
        for (place, (client_id, score)) in round.results().iter().enumerate() {
            self.clients.broadcast(
                &Message::chat(format!("{}. player{} {}", place + 1, client_id, score)),
                None,
            );
        }

        self.next_round_at = Some(Instant::now() + self.config.round_delay);
    }

    pub fn rounds_played(&self) -> u32 {
        self.rounds_played
    }

    /// Main lobby loop
    pub async fn run(&mut self) -> ServerResult<()> {
        self.spawn_acceptor();
        info!(
            "Lobby started: {} players per round, mode {}",
            self.config.players, self.config.mode
        );

        loop {
            let next_round = self.next_round_at;
            tokio::select! {
                event = self.event_rx.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => break,
                },
                _ = sleep_until(next_round.unwrap_or_else(Instant::now)), if next_round.is_some() => {
                    self.next_round_at = None;
                    self.maybe_start_round();
                }
            }
        }

        info!("Lobby stopped");
        Ok(())
    }
}
