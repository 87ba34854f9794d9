//! Chat subsystem: inbound consumer and outbound composer threads
//!
//! The two loops share nothing but the inbound chat queue and the
//! connection's send path. While a game is running the outbound loop stops
//! composing and forwards every key to the gameplay input queue instead.

use crate::connection::Connection;
use crate::error::{ClientError, Result};
use crate::input::{InputSource, KeyInput};
use crate::queue::MessageQueue;
use crate::state::spawn_named;
use crate::ui::{ChatSink, StatusSink};
use log::{debug, error, info, warn};
use shared::{Message, MAX_CHAT_LEN};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Single-line edit buffer, allocated once at full size.
#[derive(Debug, Clone)]
pub struct EditBuffer {
    chars: Vec<char>,
    cursor: usize,
    cap: usize,
}

impl EditBuffer {
    pub fn new(cap: usize) -> Self {
        Self {
            chars: Vec::with_capacity(cap),
            cursor: 0,
            cap,
        }
    }

    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn text(&self) -> String {
        self.chars.iter().collect()
    }

    pub fn clear(&mut self) {
        self.chars.clear();
        self.cursor = 0;
    }

    /// Empties the buffer and returns what it held.
    pub fn take(&mut self) -> String {
        let text = self.text();
        self.clear();
        text
    }

    /// Applies one key. Returns a finished line on Enter, or when the
    /// buffer just reached its cap.
    pub fn apply(&mut self, key: KeyInput) -> Option<String> {
        match key {
            KeyInput::Char(c) if !c.is_control() => {
                self.chars.insert(self.cursor, c);
                self.cursor += 1;
                if self.chars.len() >= self.cap {
                    return Some(self.take());
                }
            }
            KeyInput::Backspace if self.cursor > 0 => {
                self.cursor -= 1;
                self.chars.remove(self.cursor);
            }
            KeyInput::Delete if self.cursor < self.chars.len() => {
                self.chars.remove(self.cursor);
            }
            KeyInput::Left => self.cursor = self.cursor.saturating_sub(1),
            KeyInput::Right => self.cursor = (self.cursor + 1).min(self.chars.len()),
            KeyInput::Enter => return Some(self.take()),
            _ => {}
        }
        None
    }
}

impl Default for EditBuffer {
    fn default() -> Self {
        Self::new(MAX_CHAT_LEN)
    }
}

/// Drains the inbound chat queue into the UI until the queue shuts down.
pub fn spawn_inbound(
    queue: Arc<MessageQueue<Message>>,
    mut sink: Box<dyn ChatSink>,
) -> Result<JoinHandle<()>> {
    spawn_named("chat-inbound", move || {
        while let Some(msg) = queue.pop() {
            sink.chat_line(msg.payload());
        }
        debug!("Chat inbound loop finished");
    })
}

/// Everything the outbound chat loop needs.
pub struct ChatOutbound {
    pub connection: Arc<Connection>,
    pub input: Box<dyn InputSource>,
    pub game_input: Arc<MessageQueue<KeyInput>>,
    pub status: Box<dyn StatusSink>,
    pub poll_interval: Duration,
}

impl ChatOutbound {
    pub fn spawn(self) -> Result<JoinHandle<()>> {
        spawn_named("chat-outbound", move || self.run())
    }

    /// Reads keys until the connection leaves the open state.
    pub fn run(mut self) {
        let state = Arc::clone(self.connection.state());
        let mut buffer = EditBuffer::default();

        loop {
            if !state.is_open() {
                break;
            }

            let key = match self.input.poll_key(self.poll_interval) {
                Ok(Some(key)) => key,
                Ok(None) => continue,
                Err(e) => {
                    error!("Keyboard input failed: {}", e);
                    self.connection.close();
                    break;
                }
            };

            if !state.is_open() {
                break;
            }

            if state.in_game() {
                self.game_input.push(key);
                continue;
            }

            if key == KeyInput::Quit {
                info!("Quit requested");
                self.connection.close();
                break;
            }

            if let Some(line) = buffer.apply(key) {
                if !line.trim().is_empty() {
                    match self.connection.send(&Message::chat(line)) {
                        Ok(()) => {}
                        Err(ClientError::Protocol(e)) => warn!("Chat line not sent: {}", e),
                        Err(e) => {
                            warn!("Chat send failed: {}", e);
                            state.mark_broken();
                            break;
                        }
                    }
                }
            }
            self.status.edit_line(&buffer.text());
        }

        if !buffer.is_empty() {
            debug!("Discarding {} unsent chat characters", buffer.len());
        }
        debug!("Chat outbound loop finished");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn type_str(buffer: &mut EditBuffer, text: &str) -> Option<String> {
        let mut done = None;
        for c in text.chars() {
            if let Some(line) = buffer.apply(KeyInput::Char(c)) {
                done = Some(line);
            }
        }
        done
    }

    #[test]
    fn test_enter_submits_and_clears() {
        let mut buffer = EditBuffer::new(16);
        assert_eq!(type_str(&mut buffer, "hello"), None);
        assert_eq!(buffer.apply(KeyInput::Enter), Some("hello".to_string()));
        assert!(buffer.is_empty());
        assert_eq!(buffer.cursor(), 0);
    }

    #[test]
    fn test_backspace_and_delete_edit_at_cursor() {
        let mut buffer = EditBuffer::new(16);
        type_str(&mut buffer, "abcd");
        buffer.apply(KeyInput::Backspace);
        assert_eq!(buffer.text(), "abc");

        buffer.apply(KeyInput::Left);
        buffer.apply(KeyInput::Left);
        buffer.apply(KeyInput::Delete);
        assert_eq!(buffer.text(), "ac");

        buffer.apply(KeyInput::Char('X'));
        assert_eq!(buffer.text(), "aXc");
    }

    #[test]
    fn test_editing_at_edges_is_harmless() {
        let mut buffer = EditBuffer::new(16);
        buffer.apply(KeyInput::Backspace);
        buffer.apply(KeyInput::Delete);
        buffer.apply(KeyInput::Left);
        buffer.apply(KeyInput::Right);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_cap_forces_implicit_send() {
        let mut buffer = EditBuffer::default();
        let long: String = "x".repeat(MAX_CHAT_LEN + 3);
        let mut sent = Vec::new();
        for c in long.chars() {
            if let Some(line) = buffer.apply(KeyInput::Char(c)) {
                sent.push(line);
            }
        }
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].chars().count(), MAX_CHAT_LEN);
        assert_eq!(buffer.len(), 3);
    }

    #[test]
    fn test_inbound_drains_queue_before_exiting() {
        use std::sync::Mutex;

        struct Collect(Arc<Mutex<Vec<String>>>);
        impl ChatSink for Collect {
            fn chat_line(&mut self, text: &str) {
                self.0.lock().unwrap().push(text.to_string());
            }
        }

        let lines = Arc::new(Mutex::new(Vec::new()));
        let queue = Arc::new(MessageQueue::new());
        for i in 0..5 {
            queue.push(Message::chat(format!("line {i}")));
        }
        queue.shutdown();

        let handle = spawn_inbound(Arc::clone(&queue), Box::new(Collect(Arc::clone(&lines)))).unwrap();
        handle.join().unwrap();

        let lines = lines.lock().unwrap();
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0], "line 0");
        assert_eq!(lines[4], "line 4");
    }
}
