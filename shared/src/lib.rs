//! # Shared Protocol Library
//!
//! Wire types used by both the lobby server and the game client. Everything
//! that crosses a socket is a [`Message`]: a type tag plus a text payload.
//!
//! ## Envelope
//!
//! Each frame on the wire is a 4-byte big-endian length prefix followed by a
//! bincode-encoded `{ tag: u8, payload: String }`. The same envelope carries
//! chat text, decimal numbers and session parameters; the payload meaning
//! depends only on the tag.
//!
//! Decoding is fail-closed: a bad length, undecodable body, invalid UTF-8 or
//! a NUL byte in the payload is a [`ProtocolError`]. A well-formed frame with
//! a tag this build does not know decodes as [`Decoded::Unrecognized`] so
//! newer peers can add message types without breaking older clients.

pub mod session;

pub use session::{GameMode, SessionParams, DEFAULT_TIME_LIMIT_MINUTES, DEFAULT_WINLINES};

use serde::{Deserialize, Serialize};
use std::io::{self, Read, Write};
use std::str::FromStr;
use thiserror::Error;

/// Largest accepted frame body in bytes.
pub const MAX_FRAME_SIZE: u32 = 64 * 1024;

/// Longest chat line a client composes before it is sent implicitly.
pub const MAX_CHAT_LEN: usize = 512;

/// Errors produced while encoding, decoding or parsing protocol data.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("frame too large: {len} bytes (max {MAX_FRAME_SIZE})")]
    FrameTooLarge { len: usize },

    #[error("the INVALID sentinel is never sent on the wire")]
    InvalidSentinel,

    #[error("payload contains a NUL byte")]
    NulInPayload,

    #[error("malformed payload: {0}")]
    Malformed(String),
}

impl ProtocolError {
    /// True when the error means the other side went away rather than sent
    /// something bad.
    pub fn is_disconnect(&self) -> bool {
        match self {
            ProtocolError::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
            ),
            _ => false,
        }
    }
}

/// Message classes multiplexed over one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Chat,
    NewGame,
    StartGame,
    ScoreUpdate,
    LinesAdded,
    EndGame,
    /// Closed connection or malformed frame. Never transmitted.
    Invalid,
}

impl MessageType {
    /// Wire tag, or `None` for the internal sentinel.
    pub fn tag(self) -> Option<u8> {
        match self {
            MessageType::Chat => Some(1),
            MessageType::NewGame => Some(2),
            MessageType::StartGame => Some(3),
            MessageType::ScoreUpdate => Some(4),
            MessageType::LinesAdded => Some(5),
            MessageType::EndGame => Some(6),
            MessageType::Invalid => None,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(MessageType::Chat),
            2 => Some(MessageType::NewGame),
            3 => Some(MessageType::StartGame),
            4 => Some(MessageType::ScoreUpdate),
            5 => Some(MessageType::LinesAdded),
            6 => Some(MessageType::EndGame),
            _ => None,
        }
    }
}

/// One unit of communication. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    kind: MessageType,
    payload: String,
}

impl Message {
    pub fn new(kind: MessageType, payload: impl Into<String>) -> Self {
        Self {
            kind,
            payload: payload.into(),
        }
    }

    /// The "connection broken" sentinel.
    pub fn invalid() -> Self {
        Self::new(MessageType::Invalid, String::new())
    }

    pub fn chat(text: impl Into<String>) -> Self {
        Self::new(MessageType::Chat, text)
    }

    pub fn new_game(params: &SessionParams) -> Self {
        Self::new(MessageType::NewGame, params.to_payload())
    }

    pub fn start_game() -> Self {
        Self::new(MessageType::StartGame, String::new())
    }

    pub fn score_update(score: i64) -> Self {
        Self::new(MessageType::ScoreUpdate, score.to_string())
    }

    pub fn lines_added(lines: u32) -> Self {
        Self::new(MessageType::LinesAdded, lines.to_string())
    }

    pub fn end_game(final_score: i64) -> Self {
        Self::new(MessageType::EndGame, final_score.to_string())
    }

    pub fn kind(&self) -> MessageType {
        self.kind
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn into_payload(self) -> String {
        self.payload
    }

    pub fn is_invalid(&self) -> bool {
        self.kind == MessageType::Invalid
    }

    /// Parses a decimal payload (scores, line counts).
    pub fn parse_number<T: FromStr>(&self) -> Result<T, ProtocolError> {
        self.payload.trim().parse().map_err(|_| {
            ProtocolError::Malformed(format!(
                "{:?} payload is not a number: {:?}",
                self.kind, self.payload
            ))
        })
    }
}

/// Result of decoding one frame body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    Message(Message),
    /// Well-formed frame carrying a tag this build does not know.
    Unrecognized(u8),
}

#[derive(Serialize)]
struct WireFrameRef<'a> {
    tag: u8,
    payload: &'a str,
}

#[derive(Deserialize)]
struct WireFrame {
    tag: u8,
    payload: String,
}

/// Encodes a message body (no length prefix).
pub fn encode(msg: &Message) -> Result<Vec<u8>, ProtocolError> {
    let tag = msg.kind.tag().ok_or(ProtocolError::InvalidSentinel)?;
    if msg.payload.contains('\0') {
        return Err(ProtocolError::NulInPayload);
    }

    let body = bincode::serialize(&WireFrameRef {
        tag,
        payload: &msg.payload,
    })?;

    if body.len() > MAX_FRAME_SIZE as usize {
        return Err(ProtocolError::FrameTooLarge { len: body.len() });
    }
    Ok(body)
}

/// Decodes a message body (no length prefix).
pub fn decode(body: &[u8]) -> Result<Decoded, ProtocolError> {
    let frame: WireFrame = bincode::deserialize(body)?;
    if frame.payload.contains('\0') {
        return Err(ProtocolError::NulInPayload);
    }

    Ok(match MessageType::from_tag(frame.tag) {
        Some(kind) => Decoded::Message(Message::new(kind, frame.payload)),
        None => Decoded::Unrecognized(frame.tag),
    })
}

/// Encodes a message with its length prefix, ready to write to a socket.
pub fn encode_frame(msg: &Message) -> Result<Vec<u8>, ProtocolError> {
    let body = encode(msg)?;
    let mut frame = Vec::with_capacity(4 + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Validates a length prefix and returns the body size it announces.
pub fn body_len(header: [u8; 4]) -> Result<usize, ProtocolError> {
    let len = u32::from_be_bytes(header);
    if len > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge { len: len as usize });
    }
    Ok(len as usize)
}

/// Writes one framed message and flushes.
pub fn write_frame<W: Write>(writer: &mut W, msg: &Message) -> Result<(), ProtocolError> {
    let frame = encode_frame(msg)?;
    writer.write_all(&frame)?;
    writer.flush()?;
    Ok(())
}

/// Reads one framed message. Blocks until a whole frame arrived.
pub fn read_frame<R: Read>(reader: &mut R) -> Result<Decoded, ProtocolError> {
    let mut header = [0u8; 4];
    reader.read_exact(&mut header)?;
    let len = body_len(header)?;

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body)?;
    decode(&body)
}
