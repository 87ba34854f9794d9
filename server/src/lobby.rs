//! Lobby configuration and round planning
//!
//! A round seats a fixed number of players, hands every seat its own
//! NEW_GAME parameters and collects final scores as players finish. The
//! peer topology is a full mesh built without any negotiation: seat `k`
//! listens on `peer_base_port + k`, dials every earlier seat and waits for
//! every later seat to dial in.

use shared::{GameMode, SessionParams, DEFAULT_TIME_LIMIT_MINUTES, DEFAULT_WINLINES};
use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};

/// Lobby server settings.
#[derive(Debug, Clone)]
pub struct LobbyConfig {
    pub addr: String,
    /// Players seated per round; a round starts once this many are connected.
    pub players: usize,
    /// Connections beyond this are turned away.
    pub max_clients: usize,
    pub mode: GameMode,
    pub n_winlines: u32,
    pub time_limit_minutes: u32,
    pub n_baselines: u32,
    pub peer_base_port: u16,
    /// Pause between the end of one round and the start of the next.
    pub round_delay: Duration,
}

impl Default for LobbyConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8080".into(),
            players: 2,
            max_clients: 16,
            mode: GameMode::RisingTide,
            n_winlines: DEFAULT_WINLINES,
            time_limit_minutes: DEFAULT_TIME_LIMIT_MINUTES,
            n_baselines: 0,
            peer_base_port: 9100,
            round_delay: Duration::from_secs(5),
        }
    }
}

impl LobbyConfig {
    /// Rejects settings that can't produce a playable round.
    pub fn validate(&self) -> Result<(), String> {
        if self.players == 0 {
            return Err("players must be at least 1".into());
        }
        if self.max_clients < self.players {
            return Err(format!(
                "max clients ({}) is below players per round ({})",
                self.max_clients, self.players
            ));
        }
        if self.mode.requires_peers() {
            let last_port = usize::from(self.peer_base_port) + self.players - 1;
            if self.peer_base_port == 0 || last_port > usize::from(u16::MAX) {
                return Err(format!(
                    "peer ports {}..={} are out of range",
                    self.peer_base_port, last_port
                ));
            }
        }
        Ok(())
    }

    fn peer_port(&self, seat: usize) -> u16 {
        u16::try_from(usize::from(self.peer_base_port) + seat).unwrap_or(0)
    }
}

/// Builds the NEW_GAME parameters for every seat, in seat order.
pub fn plan_round(
    config: &LobbyConfig,
    seats: &[(u32, IpAddr)],
    seed: u64,
) -> Vec<(u32, SessionParams)> {
    seats
        .iter()
        .enumerate()
        .map(|(seat, (client_id, _))| {
            let mut params = SessionParams::new(config.mode, seed);
            params.n_winlines = config.n_winlines;
            params.time_limit_minutes = config.time_limit_minutes;
            params.n_baselines = config.n_baselines;

            if config.mode.requires_peers() {
                params.listen_port = config.peer_port(seat);
                params.accept_peers = seats.len() - 1 - seat;
                params.dial_peers = seats[..seat]
                    .iter()
                    .enumerate()
                    .map(|(earlier, (_, ip))| {
                        SocketAddr::new(*ip, config.peer_port(earlier)).to_string()
                    })
                    .collect();
            }
            (*client_id, params)
        })
        .collect()
}

/// Bookkeeping for the round in progress.
#[derive(Debug)]
pub struct Round {
    pub number: u32,
    pub seed: u64,
    pub started_at: Instant,
    participants: Vec<u32>,
    finished: Vec<(u32, i64)>,
}

impl Round {
    pub fn new(number: u32, seed: u64, participants: Vec<u32>) -> Self {
        Self {
            number,
            seed,
            started_at: Instant::now(),
            participants,
            finished: Vec::new(),
        }
    }

    pub fn participants(&self) -> &[u32] {
        &self.participants
    }

    pub fn is_participant(&self, client_id: u32) -> bool {
        self.participants.contains(&client_id)
    }

    pub fn has_finished(&self, client_id: u32) -> bool {
        self.finished.iter().any(|(id, _)| *id == client_id)
    }

    /// Records a final score. Returns false for non-participants and
    /// repeated reports.
    pub fn finish(&mut self, client_id: u32, score: i64) -> bool {
        if !self.is_participant(client_id) || self.has_finished(client_id) {
            return false;
        }
        self.finished.push((client_id, score));
        true
    }

    /// A participant left. Their result stays if they already finished.
    pub fn drop_participant(&mut self, client_id: u32) {
        if !self.has_finished(client_id) {
            self.participants.retain(|id| *id != client_id);
        }
    }

    pub fn is_complete(&self) -> bool {
        self.participants.iter().all(|id| self.has_finished(*id))
    }

    /// Final scores, best first. Ties keep finishing order.
    pub fn results(&self) -> Vec<(u32, i64)> {
        let mut results = self.finished.clone();
        results.sort_by(|a, b| b.1.cmp(&a.1));
        results
    }
}
