//! # Lobby Server Library
//!
//! This library provides the lobby server the game clients connect to. It
//! relays chat between connected players, seats them into rounds, tells
//! every seat how to reach its opponents and collects the final scores.
//!
//! ## Core Responsibilities
//!
//! ### Chat Relay
//! Every chat line a client sends is forwarded to all other clients,
//! prefixed with the sender's lobby name (`player<id>`).
//!
//! ### Round Management
//! When enough players are connected and no round is running, the server
//! picks a random seed and sends each seated player a NEW_GAME with its own
//! peer parameters, followed by START_GAME. Score updates are recorded as
//! they arrive; once every seated player has sent END_GAME the results are
//! announced over chat and the next round is scheduled.
//!
//! ### Peer Topology
//! The server never carries gameplay traffic. Clients link to each other
//! directly: seat `k` listens on `peer_base_port + k`, dials every earlier
//! seat and accepts one connection from every later seat.
//!
//! ## Architecture Design
//!
//! ### Single Event Loop
//! All lobby state lives in one task. Network tasks only forward events
//! into it over an unbounded channel, so roster and round updates never
//! race each other.
//!
//! ### Per-Connection Tasks
//! Each client gets a reader task (frames in, events out) and a writer task
//! (channel in, frames out). Dropping a client from the roster drops its
//! channel sender, which ends the writer and closes the socket.
//!
//! ## Module Organization
//!
//! - `client_manager`: the roster of connected clients
//! - `lobby`: configuration, seat planning and round bookkeeping
//! - `network`: socket tasks, frame I/O and the event loop
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::lobby::LobbyConfig;
//! use server::network::LobbyServer;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let config = LobbyConfig {
//!         addr: "0.0.0.0:8080".into(),
//!         players: 3,
//!         ..LobbyConfig::default()
//!     };
//!     let mut server = LobbyServer::bind(config).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod client_manager;
pub mod lobby;
pub mod network;
