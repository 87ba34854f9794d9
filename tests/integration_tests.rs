//! Integration tests for the lobby protocol, the client core and the server
//!
//! These tests run real sockets between the crates: a scripted stand-in
//! server drives the client, and the lobby server seats real clients.

use client::config::ClientConfig;
use client::input::{InputSource, KeyInput};
use client::network::{Client, ClientSummary, Frontend};
use client::session::{EndReason, GameSession};
use client::simulation::{Simulation, SimulationFactory, TickInput, TickOutcome};
use client::state::ConnectionState;
use client::ui::{ChatSink, StatusSink};
use shared::{read_frame, write_frame, Decoded, GameMode, Message, MessageType, SessionParams};
use std::io::Write;
use std::net::{TcpListener, TcpStream};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// WIRE PROTOCOL TESTS
mod protocol_tests {
    use super::*;

    /// Frames written by one side decode unchanged on the other
    #[test]
    fn frames_cross_a_real_socket() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let mut sender = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (mut receiver, _) = listener.accept().unwrap();

        let params = SessionParams::new(GameMode::Boomer, 12);
        let sent = vec![
            Message::chat("hi there"),
            Message::new_game(&params),
            Message::start_game(),
            Message::score_update(-1),
            Message::end_game(4200),
        ];
        for msg in &sent {
            write_frame(&mut sender, msg).unwrap();
        }

        for msg in sent {
            assert_eq!(read_frame(&mut receiver).unwrap(), Decoded::Message(msg));
        }
    }

    /// A frame with a tag from a newer protocol is reported, not fatal
    #[test]
    fn unknown_tag_decodes_as_unrecognized() {
        let body = bincode::serialize(&(42u8, String::from("future"))).unwrap();
        let mut frame = (body.len() as u32).to_be_bytes().to_vec();
        frame.extend_from_slice(&body);
        write_frame(&mut frame, &Message::chat("after")).unwrap();

        let mut cursor = std::io::Cursor::new(frame);
        assert_eq!(read_frame(&mut cursor).unwrap(), Decoded::Unrecognized(42));
        assert_eq!(
            read_frame(&mut cursor).unwrap(),
            Decoded::Message(Message::chat("after"))
        );
    }

    /// The INVALID sentinel never reaches the wire
    #[test]
    fn invalid_sentinel_is_not_encodable() {
        let mut out = Vec::new();
        assert!(write_frame(&mut out, &Message::invalid()).is_err());
        assert!(out.is_empty());
    }
}

/// CLIENT CORE TESTS
mod client_tests {
    use super::*;

    /// FAST_TRACK with 4, 3 and 3 lines per tick and winlines 10 ends on
    /// the third tick and reports the final score to the server
    #[test]
    fn fast_track_session_ends_on_third_tick() {
        let (listener, config) = fake_server();
        let client = Client::connect(config).unwrap();
        let state = Arc::clone(client.state());
        let (mut server, _) = listener.accept().unwrap();
        let rig = Rig::new(scripted(vec![lines(4), lines(3), lines(3)]));
        let keys = rig.keys.clone();
        let running = thread::spawn(move || client.run(rig.frontend));

        let mut params = SessionParams::new(GameMode::FastTrack, 2024);
        params.n_winlines = 10;
        write_frame(&mut server, &Message::new_game(&params)).unwrap();
        write_frame(&mut server, &Message::start_game()).unwrap();

        let final_score = read_until(&mut server, MessageType::EndGame).into_payload();
        assert_eq!(final_score, "1000");

        assert!(wait_until(|| !state.in_game()));
        keys.send(KeyInput::Quit).unwrap();

        let summary = running.join().unwrap().unwrap();
        assert_eq!(summary.connection, ConnectionState::Closed);
        assert_eq!(summary.sessions.len(), 1);
        let report = &summary.sessions[0];
        assert_eq!(report.ticks, 3);
        assert_eq!(report.total_lines_cleared, 10);
        assert_eq!(report.end_reason, EndReason::WinLinesReached);
    }

    /// Connection dropped mid-edit: the partial line is thrown away,
    /// nothing is sent and every thread winds down
    #[test]
    fn server_loss_mid_edit_sends_nothing() {
        let (listener, config) = fake_server();
        let client = Client::connect(config).unwrap();
        let state = Arc::clone(client.state());
        let (mut server, _) = listener.accept().unwrap();
        let rig = Rig::new(scripted(Vec::new()));
        let keys = rig.keys.clone();
        let edit_line = Arc::clone(&rig.edit_line);
        let running = thread::spawn(move || client.run(rig.frontend));

        for c in "hel".chars() {
            keys.send(KeyInput::Char(c)).unwrap();
        }
        assert!(wait_until(|| *edit_line.lock().unwrap() == "hel"));

        server.shutdown(std::net::Shutdown::Write).unwrap();
        assert!(wait_until(|| !state.is_open()));
        let _ = keys.send(KeyInput::Enter);

        let summary: ClientSummary = running.join().unwrap().unwrap();
        assert!(summary.connection_lost());
        assert!(summary.sessions.is_empty());

        // The client socket is closed now; everything it ever sent is here.
        server
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        let mut chats = 0;
        while let Ok(Decoded::Message(msg)) = read_frame(&mut server) {
            if msg.kind() == MessageType::Chat {
                chats += 1;
            }
        }
        assert_eq!(chats, 0);
    }

    /// Chat lines reach the UI in the order the server sent them
    #[test]
    fn inbound_chat_keeps_order() {
        let (listener, config) = fake_server();
        let client = Client::connect(config).unwrap();
        let (mut server, _) = listener.accept().unwrap();
        let rig = Rig::new(scripted(Vec::new()));
        let chat = Arc::clone(&rig.chat_lines);
        let running = thread::spawn(move || client.run(rig.frontend));

        for i in 0..50 {
            write_frame(&mut server, &Message::chat(format!("line {}", i))).unwrap();
        }
        drop(server);

        let summary = running.join().unwrap().unwrap();
        assert!(summary.connection_lost());
        let expected: Vec<String> = (0..50).map(|i| format!("line {}", i)).collect();
        assert_eq!(*chat.lock().unwrap(), expected);
    }

    /// A typed line is sent on Enter; empty lines are not
    #[test]
    fn typed_line_reaches_server() {
        let (listener, config) = fake_server();
        let client = Client::connect(config).unwrap();
        let (mut server, _) = listener.accept().unwrap();
        let rig = Rig::new(scripted(Vec::new()));
        let keys = rig.keys.clone();
        let running = thread::spawn(move || client.run(rig.frontend));

        keys.send(KeyInput::Enter).unwrap();
        for c in "gl hf".chars() {
            keys.send(KeyInput::Char(c)).unwrap();
        }
        keys.send(KeyInput::Enter).unwrap();

        let line = read_until(&mut server, MessageType::Chat);
        assert_eq!(line.payload(), "gl hf");

        keys.send(KeyInput::Quit).unwrap();
        let summary = running.join().unwrap().unwrap();
        assert_eq!(summary.connection, ConnectionState::Closed);
    }

    /// Garbage in a NEW_GAME payload is treated like a dead connection
    #[test]
    fn malformed_new_game_breaks_connection() {
        let (listener, config) = fake_server();
        let client = Client::connect(config).unwrap();
        let (mut server, _) = listener.accept().unwrap();
        let rig = Rig::new(scripted(Vec::new()));
        let running = thread::spawn(move || client.run(rig.frontend));

        write_frame(&mut server, &Message::new(MessageType::NewGame, "seed=banana")).unwrap();
        write_frame(&mut server, &Message::start_game()).unwrap();

        let summary = running.join().unwrap().unwrap();
        assert!(summary.connection_lost());
        assert!(summary.sessions.is_empty());
    }

    /// A silent server counts as lost once the read timeout passes
    #[test]
    fn read_timeout_detects_hung_server() {
        let (listener, mut config) = fake_server();
        config.read_timeout = Some(Duration::from_millis(100));
        let client = Client::connect(config).unwrap();
        let (_server, _) = listener.accept().unwrap();
        let rig = Rig::new(scripted(Vec::new()));

        let start = Instant::now();
        let summary = client.run(rig.frontend).unwrap();
        assert!(summary.connection_lost());
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    /// Raw bytes that are not a frame end the connection
    #[test]
    fn oversized_frame_breaks_connection() {
        let (listener, config) = fake_server();
        let client = Client::connect(config).unwrap();
        let (mut server, _) = listener.accept().unwrap();
        let rig = Rig::new(scripted(Vec::new()));
        let running = thread::spawn(move || client.run(rig.frontend));

        server.write_all(&u32::MAX.to_be_bytes()).unwrap();

        let summary = running.join().unwrap().unwrap();
        assert_eq!(summary.connection, ConnectionState::Errored);
    }
}

/// LOBBY SERVER TESTS
mod lobby_tests {
    use super::*;
    use server::lobby::LobbyConfig;
    use server::network::LobbyServer;

    /// Two real clients are seated, link to each other, play a fast-track
    /// round and get the results over chat
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn two_clients_play_a_round() {
        let mut lobby = LobbyServer::bind(LobbyConfig {
            addr: "127.0.0.1:0".into(),
            players: 2,
            mode: GameMode::FastTrack,
            n_winlines: 10,
            peer_base_port: 39_417,
            round_delay: Duration::from_secs(60),
            ..LobbyConfig::default()
        })
        .await
        .unwrap();
        let addr = lobby.local_addr().to_string();
        tokio::spawn(async move {
            let _ = lobby.run().await;
        });

        let mut players = Vec::new();
        for _ in 0..2 {
            let config = ClientConfig {
                server_addr: addr.clone(),
                peer_host: "127.0.0.1".into(),
                peer_timeout: Some(Duration::from_secs(10)),
                ..test_config()
            };
            let rig = Rig::new(scripted(vec![lines(4), lines(3), lines(3)]));
            let keys = rig.keys.clone();
            let chat = Arc::clone(&rig.chat_lines);
            let client = Client::connect(config).unwrap();
            let state = Arc::clone(client.state());
            let handle = tokio::task::spawn_blocking(move || client.run(rig.frontend));
            players.push((keys, chat, state, handle));
        }

        let deadline = Instant::now() + Duration::from_secs(20);
        for (_, chat, _, _) in &players {
            while !chat.lock().unwrap().iter().any(|l| l.starts_with("2. ")) {
                assert!(Instant::now() < deadline, "no results announced");
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        }

        for (keys, _, state, handle) in players {
            while state.in_game() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            keys.send(KeyInput::Quit).unwrap();
            let summary = handle.await.unwrap().unwrap();
            assert_eq!(summary.sessions.len(), 1);
            assert_eq!(summary.sessions[0].end_reason, EndReason::WinLinesReached);
        }
    }
}

/// Scripted keyboard fed from the test thread
struct ScriptedInput {
    keys: mpsc::Receiver<KeyInput>,
}

impl InputSource for ScriptedInput {
    fn poll_key(&mut self, timeout: Duration) -> client::Result<Option<KeyInput>> {
        match self.keys.recv_timeout(timeout) {
            Ok(key) => Ok(Some(key)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => {
                thread::sleep(timeout);
                Ok(None)
            }
        }
    }
}

struct CollectChat(Arc<Mutex<Vec<String>>>);

impl ChatSink for CollectChat {
    fn chat_line(&mut self, text: &str) {
        self.0.lock().unwrap().push(text.to_string());
    }
}

struct RecordStatus(Arc<Mutex<String>>);

impl StatusSink for RecordStatus {
    fn edit_line(&mut self, text: &str) {
        *self.0.lock().unwrap() = text.to_string();
    }

    fn notice(&mut self, _text: &str) {}
}

/// Replays fixed tick outcomes, then idles
struct ScriptedSimulation {
    script: Vec<TickOutcome>,
    next: usize,
    score: i64,
}

impl Simulation for ScriptedSimulation {
    fn tick(&mut self, _input: TickInput) -> TickOutcome {
        let outcome = self.script.get(self.next).copied().unwrap_or_default();
        self.next += 1;
        self.score += i64::from(outcome.lines_cleared) * 100;
        outcome
    }

    fn score(&self) -> i64 {
        self.score
    }
}

struct Rig {
    keys: mpsc::Sender<KeyInput>,
    chat_lines: Arc<Mutex<Vec<String>>>,
    edit_line: Arc<Mutex<String>>,
    frontend: Frontend,
}

impl Rig {
    fn new(simulations: SimulationFactory) -> Self {
        let (keys, rx) = mpsc::channel();
        let chat_lines = Arc::new(Mutex::new(Vec::new()));
        let edit_line = Arc::new(Mutex::new(String::new()));
        let frontend = Frontend {
            input: Box::new(ScriptedInput { keys: rx }),
            chat: Box::new(CollectChat(Arc::clone(&chat_lines))),
            chat_status: Box::new(RecordStatus(Arc::clone(&edit_line))),
            game_status: Box::new(RecordStatus(Arc::new(Mutex::new(String::new())))),
            simulations,
        };
        Self {
            keys,
            chat_lines,
            edit_line,
            frontend,
        }
    }
}

fn scripted(outcomes: Vec<TickOutcome>) -> SimulationFactory {
    Box::new(move |_: &GameSession| -> Box<dyn Simulation> {
        Box::new(ScriptedSimulation {
            script: outcomes.clone(),
            next: 0,
            score: 0,
        })
    })
}

fn lines(n: u32) -> TickOutcome {
    TickOutcome {
        lines_cleared: n,
        game_over: false,
    }
}

fn test_config() -> ClientConfig {
    ClientConfig {
        tick_interval: Duration::from_millis(5),
        score_interval: Duration::from_millis(20),
        poll_interval: Duration::from_millis(10),
        peer_dial_delay: Duration::from_millis(20),
        ..ClientConfig::default()
    }
}

fn fake_server() -> (TcpListener, ClientConfig) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let config = ClientConfig {
        server_addr: listener.local_addr().unwrap().to_string(),
        ..test_config()
    };
    (listener, config)
}

/// Reads frames until one of `kind` arrives
fn read_until(server: &mut TcpStream, kind: MessageType) -> Message {
    server
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    loop {
        match read_frame(server).unwrap() {
            Decoded::Message(msg) if msg.kind() == kind => return msg,
            _ => continue,
        }
    }
}

fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    false
}
