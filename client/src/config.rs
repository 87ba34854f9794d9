//! Client configuration

use std::time::Duration;

/// Tunables for one client process. The binary fills this from its
/// command line; tests build it directly.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server_addr: String,
    pub connect_attempts: u32,
    pub connect_retry_delay: Duration,
    /// Treat a silent server as broken after this long. `None` waits forever.
    pub read_timeout: Option<Duration>,
    /// Interval between simulation ticks.
    pub tick_interval: Duration,
    /// Interval between score reports to the server.
    pub score_interval: Duration,
    /// Host the peer listener binds.
    pub peer_host: String,
    /// Give up on peer negotiation after this long. `None` waits forever.
    pub peer_timeout: Option<Duration>,
    pub peer_dial_attempts: u32,
    pub peer_dial_delay: Duration,
    /// How often blocking loops re-check the shared state.
    pub poll_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:8080".into(),
            connect_attempts: 3,
            connect_retry_delay: Duration::from_millis(500),
            read_timeout: None,
            tick_interval: Duration::from_millis(50),
            score_interval: Duration::from_secs(1),
            peer_host: "0.0.0.0".into(),
            peer_timeout: None,
            peer_dial_attempts: 20,
            peer_dial_delay: Duration::from_millis(100),
            poll_interval: Duration::from_millis(50),
        }
    }
}
