//! Keyboard input: terminal key events and their gameplay meaning

use crate::error::{ClientError, Result};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal;
use std::time::Duration;

/// A key press, independent of the terminal backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyInput {
    Char(char),
    Backspace,
    Delete,
    Left,
    Right,
    Up,
    Down,
    Enter,
    Quit,
}

/// A move handed to the simulation on the next tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerMove {
    Left,
    Right,
    RotateCw,
    RotateCcw,
    SoftDrop,
    HardDrop,
    Hold,
}

/// Anything that produces key presses: the terminal, or a script in tests.
pub trait InputSource: Send {
    /// Waits up to `timeout` for the next key press.
    fn poll_key(&mut self, timeout: Duration) -> Result<Option<KeyInput>>;
}

/// Map a key to a gameplay move.
pub fn player_move(key: KeyInput) -> Option<PlayerMove> {
    match key {
        KeyInput::Left | KeyInput::Char('h' | 'H' | 'a' | 'A') => Some(PlayerMove::Left),
        KeyInput::Right | KeyInput::Char('l' | 'L' | 'd' | 'D') => Some(PlayerMove::Right),
        KeyInput::Down | KeyInput::Char('j' | 'J' | 's' | 'S') => Some(PlayerMove::SoftDrop),
        KeyInput::Up | KeyInput::Char('k' | 'K' | 'w' | 'W') => Some(PlayerMove::RotateCw),
        KeyInput::Char('z' | 'Z' | 'y' | 'Y') => Some(PlayerMove::RotateCcw),
        KeyInput::Char(' ') => Some(PlayerMove::HardDrop),
        KeyInput::Char('c' | 'C') => Some(PlayerMove::Hold),
        _ => None,
    }
}

/// Keys that leave a running game.
pub fn quits_game(key: KeyInput) -> bool {
    matches!(key, KeyInput::Quit | KeyInput::Char('q' | 'Q'))
}

/// Map a crossterm key event. Only presses count.
pub fn map_key_event(key: KeyEvent) -> Option<KeyInput> {
    if key.kind != KeyEventKind::Press {
        return None;
    }
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        return match key.code {
            KeyCode::Char('c' | 'd') => Some(KeyInput::Quit),
            _ => None,
        };
    }

    match key.code {
        KeyCode::Char(c) => Some(KeyInput::Char(c)),
        KeyCode::Backspace => Some(KeyInput::Backspace),
        KeyCode::Delete => Some(KeyInput::Delete),
        KeyCode::Left => Some(KeyInput::Left),
        KeyCode::Right => Some(KeyInput::Right),
        KeyCode::Up => Some(KeyInput::Up),
        KeyCode::Down => Some(KeyInput::Down),
        KeyCode::Enter => Some(KeyInput::Enter),
        KeyCode::Esc => Some(KeyInput::Quit),
        _ => None,
    }
}

/// Raw-mode terminal keyboard. Restores the terminal when dropped.
pub struct TerminalInput {
    _private: (),
}

impl TerminalInput {
    pub fn new() -> Result<Self> {
        terminal::enable_raw_mode().map_err(ClientError::Terminal)?;
        Ok(Self { _private: () })
    }
}

impl Drop for TerminalInput {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}

impl InputSource for TerminalInput {
    fn poll_key(&mut self, timeout: Duration) -> Result<Option<KeyInput>> {
        if !event::poll(timeout).map_err(ClientError::Terminal)? {
            return Ok(None);
        }
        match event::read().map_err(ClientError::Terminal)? {
            Event::Key(key) => Ok(map_key_event(key)),
            _ => Ok(None),
        }
    }
}
