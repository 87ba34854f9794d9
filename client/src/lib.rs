//! # Tidepool Client Library
//!
//! This library is the concurrent core of the terminal game client: it keeps
//! a chat session with the lobby server going while game sessions start,
//! run and end underneath it, and links directly to opponents for the
//! multiplayer modes.
//!
//! ## Architecture Overview
//!
//! A client process holds exactly one server connection. Around it run a
//! handful of OS threads that only talk through queues and a shared state
//! object:
//!
//! ### Permanent threads
//! - **Ingress router** (`router`): the only reader of the connection.
//!   Routes chat to the chat queue, START_GAME to the coordinator and stores
//!   NEW_GAME parameters on the session lifecycle.
//! - **Chat inbound** (`chat`): hands queued chat lines to the UI.
//! - **Chat outbound** (`chat`): the only keyboard reader. Composes chat
//!   lines outside a game and forwards keys to the gameplay queue inside
//!   one.
//!
//! ### Per-session threads
//! - **Score reporter** (`reporter`): sends the current score every
//!   interval while a session runs.
//! - **Peer listener and peer readers** (`peers`): accept and serve the
//!   direct links to opponents.
//!
//! The session coordinator (`coordinator`) runs on the caller's thread and
//! owns the simulation tick loop.
//!
//! ## Failure Model
//!
//! Any send or receive failure moves the connection into the broken state
//! exactly once. Loops notice that at their next boundary and wind down on
//! their own; the router shuts the queues down so blocked consumers wake
//! up. Peer failures only remove the affected peer.
//!
//! ## Usage Example
//!
//! ```no_run
//! use client::config::ClientConfig;
//! use client::input::TerminalInput;
//! use client::network::{Client, Frontend};
//! use client::session::GameSession;
//! use client::simulation::{HeadlessSimulation, Simulation};
//! use client::ui::ConsoleUi;
//!
//! # fn main() -> Result<(), client::error::ClientError> {
//! let client = Client::connect(ClientConfig::default())?;
//! let summary = client.run(Frontend {
//!     input: Box::new(TerminalInput::new()?),
//!     chat: Box::new(ConsoleUi),
//!     chat_status: Box::new(ConsoleUi),
//!     game_status: Box::new(ConsoleUi),
//!     simulations: Box::new(|game: &GameSession| -> Box<dyn Simulation> {
//!         Box::new(HeadlessSimulation::new(game.params.n_baselines))
//!     }),
//! })?;
//! println!("played {} sessions", summary.sessions.len());
//! # Ok(())
//! # }
//! ```

pub mod chat;
pub mod config;
pub mod connection;
pub mod coordinator;
pub mod error;
pub mod input;
pub mod network;
pub mod peers;
pub mod queue;
pub mod reporter;
pub mod router;
pub mod session;
pub mod simulation;
pub mod state;
pub mod ui;

pub use error::{ClientError, Result};
