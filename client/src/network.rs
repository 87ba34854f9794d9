//! Top-level client: owns the connection and wires up the threads
//!
//! `Client::run` starts the three permanent threads (ingress router, chat
//! inbound, chat outbound), drives the session coordinator on the calling
//! thread and joins the permanent threads once everything has wound down.

use crate::chat::{spawn_inbound, ChatOutbound};
use crate::config::ClientConfig;
use crate::connection::Connection;
use crate::coordinator::SessionCoordinator;
use crate::error::Result;
use crate::input::{InputSource, KeyInput};
use crate::queue::MessageQueue;
use crate::router::IngressRouter;
use crate::session::{SessionLifecycle, SessionReport};
use crate::simulation::SimulationFactory;
use crate::state::{join_named, ClientState, ConnectionState};
use crate::ui::{ChatSink, StatusSink};
use log::{error, info, warn};
use shared::Message;
use std::sync::Arc;
use std::thread::JoinHandle;

/// The pieces that face the user.
pub struct Frontend {
    pub input: Box<dyn InputSource>,
    pub chat: Box<dyn ChatSink>,
    /// Receives edit-line updates from the chat thread.
    pub chat_status: Box<dyn StatusSink>,
    /// Receives session progress from the coordinator.
    pub game_status: Box<dyn StatusSink>,
    pub simulations: SimulationFactory,
}

/// How the client ended.
#[derive(Debug)]
pub struct ClientSummary {
    pub connection: ConnectionState,
    pub sessions: Vec<SessionReport>,
}

impl ClientSummary {
    /// True when the server went away or the link failed, as opposed to
    /// the user quitting.
    pub fn connection_lost(&self) -> bool {
        self.connection == ConnectionState::Errored
    }
}

pub struct Client {
    config: ClientConfig,
    connection: Arc<Connection>,
    lifecycle: Arc<SessionLifecycle>,
    chat: Arc<MessageQueue<Message>>,
    control: Arc<MessageQueue<Message>>,
    game_input: Arc<MessageQueue<KeyInput>>,
}

impl Client {
    pub fn connect(config: ClientConfig) -> Result<Self> {
        let connection = Connection::connect(&config, Arc::new(ClientState::new()))?;
        Ok(Self::with_connection(config, connection))
    }

    pub fn with_connection(config: ClientConfig, connection: Connection) -> Self {
        Self {
            config,
            connection: Arc::new(connection),
            lifecycle: Arc::new(SessionLifecycle::new()),
            chat: Arc::new(MessageQueue::new()),
            control: Arc::new(MessageQueue::new()),
            game_input: Arc::new(MessageQueue::new()),
        }
    }

    pub fn state(&self) -> &Arc<ClientState> {
        self.connection.state()
    }

    /// Handle for closing the connection from elsewhere.
    pub fn connection(&self) -> Arc<Connection> {
        Arc::clone(&self.connection)
    }

    /// Runs until the connection is closed or lost.
    pub fn run(self, frontend: Frontend) -> Result<ClientSummary> {
        let Frontend {
            input,
            chat,
            chat_status,
            game_status,
            simulations,
        } = frontend;

        let mut permanent: Vec<(&'static str, JoinHandle<()>)> = Vec::new();

        let spawned = self.spawn_permanent(&mut permanent, input, chat, chat_status);
        if let Err(e) = spawned {
            error!("Client startup failed: {}", e);
            self.shutdown_queues();
            self.connection.close();
            self.join_all(permanent)?;
            return Err(e);
        }
        info!("Client running");

        let mut coordinator = SessionCoordinator::new(
            self.config.clone(),
            Arc::clone(&self.connection),
            Arc::clone(&self.lifecycle),
            Arc::clone(&self.control),
            Arc::clone(&self.game_input),
            simulations,
            game_status,
        );
        let outcome = coordinator.run();
        if outcome.is_err() {
            self.shutdown_queues();
        }

        let joined = self.join_all(permanent);
        let sessions = outcome?;
        joined?;

        let connection = self.state().connection_state();
        match connection {
            ConnectionState::Errored => warn!("Connection to server lost"),
            _ => info!("Connection closed"),
        }
        Ok(ClientSummary {
            connection,
            sessions,
        })
    }

    fn spawn_permanent(
        &self,
        permanent: &mut Vec<(&'static str, JoinHandle<()>)>,
        input: Box<dyn InputSource>,
        chat: Box<dyn ChatSink>,
        chat_status: Box<dyn StatusSink>,
    ) -> Result<()> {
        let router = IngressRouter {
            connection: Arc::clone(&self.connection),
            chat: Arc::clone(&self.chat),
            control: Arc::clone(&self.control),
            lifecycle: Arc::clone(&self.lifecycle),
        };
        permanent.push(("ingress-router", router.spawn()?));
        permanent.push(("chat-inbound", spawn_inbound(Arc::clone(&self.chat), chat)?));

        let outbound = ChatOutbound {
            connection: Arc::clone(&self.connection),
            input,
            game_input: Arc::clone(&self.game_input),
            status: chat_status,
            poll_interval: self.config.poll_interval,
        };
        permanent.push(("chat-outbound", outbound.spawn()?));
        Ok(())
    }

    fn shutdown_queues(&self) {
        self.chat.shutdown();
        self.control.shutdown();
    }

    fn join_all(&self, handles: Vec<(&'static str, JoinHandle<()>)>) -> Result<()> {
        let mut result = Ok(());
        for (name, handle) in handles {
            if let Err(e) = join_named(name, handle) {
                error!("{}", e);
                result = Err(e);
            }
        }
        result
    }
}
