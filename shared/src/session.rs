//! Session parameters carried by NEW_GAME.
//!
//! The payload is a line of space-separated `key=value` pairs, e.g.
//! `mode=rising_tide seed=7 listen=9101 accept=0 dial=127.0.0.1:9100`.
//! Keys this build does not know are skipped.

use crate::ProtocolError;
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_WINLINES: u32 = 40;
pub const DEFAULT_TIME_LIMIT_MINUTES: u32 = 3;

/// Game modes offered by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GameMode {
    /// Solo play, no peers.
    Chill,
    /// Lines cleared by opponents arrive as garbage.
    RisingTide,
    /// First to `winlines` cleared lines.
    FastTrack,
    /// Play until the time limit runs out.
    Boomer,
}

impl GameMode {
    pub fn as_str(self) -> &'static str {
        match self {
            GameMode::Chill => "chill",
            GameMode::RisingTide => "rising_tide",
            GameMode::FastTrack => "fast_track",
            GameMode::Boomer => "boomer",
        }
    }

    pub fn requires_peers(self) -> bool {
        self != GameMode::Chill
    }
}

impl fmt::Display for GameMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GameMode {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "chill" => Ok(GameMode::Chill),
            "rising_tide" => Ok(GameMode::RisingTide),
            "fast_track" => Ok(GameMode::FastTrack),
            "boomer" => Ok(GameMode::Boomer),
            other => Err(ProtocolError::Malformed(format!("unknown game mode {other:?}"))),
        }
    }
}

/// Everything a client needs to set up the next session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionParams {
    pub mode: GameMode,
    pub seed: u64,
    pub n_winlines: u32,
    pub time_limit_minutes: u32,
    pub n_baselines: u32,
    /// Port the peer listener binds (0 lets the OS choose).
    pub listen_port: u16,
    /// Inbound peers to wait for.
    pub accept_peers: usize,
    /// Peers this client dials, as `host:port`.
    pub dial_peers: Vec<String>,
}

impl SessionParams {
    pub fn new(mode: GameMode, seed: u64) -> Self {
        Self {
            mode,
            seed,
            n_winlines: DEFAULT_WINLINES,
            time_limit_minutes: DEFAULT_TIME_LIMIT_MINUTES,
            n_baselines: 0,
            listen_port: 0,
            accept_peers: 0,
            dial_peers: Vec::new(),
        }
    }

    /// Total number of opponents expected once negotiation is done.
    pub fn expected_peers(&self) -> usize {
        self.accept_peers + self.dial_peers.len()
    }

    pub fn to_payload(&self) -> String {
        let mut payload = format!(
            "mode={} seed={} winlines={} time_limit={} baselines={} listen={} accept={}",
            self.mode,
            self.seed,
            self.n_winlines,
            self.time_limit_minutes,
            self.n_baselines,
            self.listen_port,
            self.accept_peers,
        );
        if !self.dial_peers.is_empty() {
            payload.push_str(" dial=");
            payload.push_str(&self.dial_peers.join(","));
        }
        payload
    }
}

fn parse_field<T: FromStr>(key: &str, value: &str) -> Result<T, ProtocolError> {
    value
        .parse()
        .map_err(|_| ProtocolError::Malformed(format!("bad value for {key}: {value:?}")))
}

impl FromStr for SessionParams {
    type Err = ProtocolError;

    fn from_str(payload: &str) -> Result<Self, Self::Err> {
        let mut mode = None;
        let mut seed = None;
        let mut params = SessionParams::new(GameMode::Chill, 0);

        for pair in payload.split_whitespace() {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| ProtocolError::Malformed(format!("expected key=value, got {pair:?}")))?;

            match key {
                "mode" => mode = Some(value.parse::<GameMode>()?),
                "seed" => seed = Some(parse_field(key, value)?),
                "winlines" => params.n_winlines = parse_field(key, value)?,
                "time_limit" => params.time_limit_minutes = parse_field(key, value)?,
                "baselines" => params.n_baselines = parse_field(key, value)?,
                "listen" => params.listen_port = parse_field(key, value)?,
                "accept" => params.accept_peers = parse_field(key, value)?,
                "dial" => {
                    params.dial_peers = value
                        .split(',')
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .collect();
                }
                _ => {}
            }
        }

        params.mode = mode.ok_or_else(|| ProtocolError::Malformed("missing mode".into()))?;
        params.seed = seed.ok_or_else(|| ProtocolError::Malformed("missing seed".into()))?;
        Ok(params)
    }
}
