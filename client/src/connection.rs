//! Framed TCP connection to the lobby server
//!
//! The connection is the single place where socket errors are observed. Any
//! failure is folded into the shared [`ClientState`] so that every loop sees
//! the same terminal state, instead of each call site handling its own error.

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::state::{lock, ClientState, ConnectionState};
use log::{debug, info, warn};
use shared::{encode_frame, read_frame, Decoded, Message, ProtocolError};
use std::io::{BufReader, BufWriter, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;

pub struct Connection {
    addr: String,
    stream: TcpStream,
    reader: Mutex<BufReader<TcpStream>>,
    writer: Mutex<BufWriter<TcpStream>>,
    state: Arc<ClientState>,
}

impl Connection {
    /// Connects to the configured server, retrying a few times.
    pub fn connect(config: &ClientConfig, state: Arc<ClientState>) -> Result<Self> {
        let attempts = config.connect_attempts.max(1);
        let mut attempt = 1;

        let stream = loop {
            match TcpStream::connect(&config.server_addr) {
                Ok(stream) => break stream,
                Err(e) if attempt < attempts => {
                    warn!(
                        "Connect to {} failed (attempt {}/{}): {}",
                        config.server_addr, attempt, attempts, e
                    );
                    attempt += 1;
                    thread::sleep(config.connect_retry_delay);
                }
                Err(source) => {
                    return Err(ClientError::ConnectFailed {
                        addr: config.server_addr.clone(),
                        source,
                    })
                }
            }
        };

        stream
            .set_read_timeout(config.read_timeout)
            .map_err(|source| ClientError::ConnectFailed {
                addr: config.server_addr.clone(),
                source,
            })?;

        info!("Connected to {}", config.server_addr);
        Self::from_stream(stream, state)
    }

    /// Wraps an already connected stream.
    pub fn from_stream(stream: TcpStream, state: Arc<ClientState>) -> Result<Self> {
        let addr = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "<unknown>".to_string());
        let _ = stream.set_nodelay(true);

        let clone = |stream: &TcpStream| {
            stream.try_clone().map_err(|source| ClientError::ConnectFailed {
                addr: addr.clone(),
                source,
            })
        };
        let reader = BufReader::new(clone(&stream)?);
        let writer = BufWriter::new(clone(&stream)?);

        Ok(Self {
            addr,
            stream,
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            state,
        })
    }

    pub fn state(&self) -> &Arc<ClientState> {
        &self.state
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.stream.peer_addr().ok()
    }

    /// Sends one message. Fails immediately, without touching the socket,
    /// once the connection has left the `Open` state.
    pub fn send(&self, msg: &Message) -> Result<()> {
        if !self.state.is_open() {
            return Err(ClientError::SendFailed(format!(
                "connection to {} is {:?}",
                self.addr,
                self.state.connection_state()
            )));
        }

        let frame = encode_frame(msg)?;
        let written = {
            let mut writer = lock(&self.writer);
            writer.write_all(&frame).and_then(|_| writer.flush())
        };

        written.map_err(|e| {
            if self.state.mark_broken() {
                warn!("Lost connection to {} while sending: {}", self.addr, e);
            }
            ClientError::SendFailed(e.to_string())
        })
    }

    /// Blocks for the next message. Returns the `Invalid` sentinel when the
    /// server closed the socket, a read failed or a frame was malformed.
    /// Frames with an unknown tag are skipped.
    pub fn receive(&self) -> Message {
        loop {
            if !self.state.is_open() {
                return Message::invalid();
            }

            let result = {
                let mut reader = lock(&self.reader);
                read_frame(&mut *reader)
            };

            match result {
                Ok(Decoded::Message(msg)) => return msg,
                Ok(Decoded::Unrecognized(tag)) => {
                    debug!("Ignoring frame with unknown tag {}", tag);
                }
                Err(e) => {
                    self.note_receive_failure(&e);
                    return Message::invalid();
                }
            }
        }
    }

    fn note_receive_failure(&self, e: &ProtocolError) {
        if self.state.mark_broken() {
            if e.is_disconnect() {
                warn!("Server {} closed the connection", self.addr);
            } else {
                warn!("Dropping connection to {}: {}", self.addr, e);
            }
        } else if self.state.connection_state() == ConnectionState::Closed {
            debug!("Receive ended after local close: {}", e);
        }
    }

    /// Closes the socket. Safe to call any number of times; a blocked
    /// `receive` on another thread returns `Invalid`.
    pub fn close(&self) {
        if self.state.mark_closed() {
            info!("Closing connection to {}", self.addr);
        }
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}
