//! Ingress router: the only reader of the server connection
//!
//! Every frame from the server passes through here and is dispatched by
//! type. Chat goes to the chat queue, START_GAME to the coordinator's
//! control queue, and NEW_GAME parameters are stored on the session
//! lifecycle directly. When the connection goes away the router shuts both
//! queues down, which is how the consumer threads learn they are done.

use crate::connection::Connection;
use crate::error::Result;
use crate::queue::MessageQueue;
use crate::session::{EndReason, SessionLifecycle};
use crate::state::spawn_named;
use log::{debug, info, warn};
use shared::{Message, MessageType, SessionParams};
use std::sync::Arc;
use std::thread::JoinHandle;

pub struct IngressRouter {
    pub connection: Arc<Connection>,
    pub chat: Arc<MessageQueue<Message>>,
    pub control: Arc<MessageQueue<Message>>,
    pub lifecycle: Arc<SessionLifecycle>,
}

impl IngressRouter {
    pub fn spawn(self) -> Result<JoinHandle<()>> {
        spawn_named("ingress-router", move || self.run())
    }

    /// Dispatches frames until the connection breaks or is closed.
    pub fn run(self) {
        loop {
            let msg = self.connection.receive();
            if msg.is_invalid() {
                self.connection.state().mark_broken();
                break;
            }
            if !self.dispatch(msg) {
                self.connection.state().mark_broken();
                break;
            }
        }

        self.chat.shutdown();
        self.control.shutdown();
        self.lifecycle.request_end(EndReason::ConnectionLost);
        info!(
            "Ingress router stopped ({:?})",
            self.connection.state().connection_state()
        );
    }

    /// Returns false when the message means the stream can't be trusted.
    fn dispatch(&self, msg: Message) -> bool {
        match msg.kind() {
            MessageType::Chat => {
                self.chat.push(msg);
            }
            MessageType::NewGame => match msg.payload().parse::<SessionParams>() {
                Ok(params) => self.lifecycle.absorb_params(params),
                Err(e) => {
                    warn!("Malformed NEW_GAME payload {:?}: {}", msg.payload(), e);
                    return false;
                }
            },
            MessageType::StartGame => {
                debug!("START_GAME received");
                self.control.push(msg);
            }
            MessageType::ScoreUpdate | MessageType::LinesAdded | MessageType::EndGame => {
                debug!("Ignoring {:?} from server", msg.kind());
            }
            MessageType::Invalid => return false,
        }
        true
    }
}
