//! Interface to the puzzle simulation
//!
//! The coordinator only needs lines cleared, a game-over flag and a score
//! from the engine. `HeadlessSimulation` is a small stand-in that keeps the
//! binary playable without a board renderer; a real engine plugs in through
//! the same trait.

use crate::input::PlayerMove;
use crate::session::GameSession;

/// Inputs for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickInput {
    pub player_move: Option<PlayerMove>,
    /// Garbage rows received from opponents since the last tick.
    pub garbage_lines: u32,
    /// Next value of the session's shared random sequence.
    pub random: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickOutcome {
    pub lines_cleared: u32,
    pub game_over: bool,
}

pub trait Simulation: Send {
    fn tick(&mut self, input: TickInput) -> TickOutcome;
    fn score(&self) -> i64;
}

/// Builds a fresh simulation for each session.
pub type SimulationFactory = Box<dyn Fn(&GameSession) -> Box<dyn Simulation> + Send>;

const STACK_LIMIT: u32 = 20;

/// Stack-height model of the game: hard drops add a piece and may clear
/// lines (decided by the shared random value), garbage raises the stack,
/// and the game ends when the stack overflows.
#[derive(Debug, Clone)]
pub struct HeadlessSimulation {
    stack_height: u32,
    pieces: u32,
    score: i64,
}

impl HeadlessSimulation {
    pub fn new(baselines: u32) -> Self {
        Self {
            stack_height: baselines,
            pieces: 0,
            score: 0,
        }
    }

    pub fn stack_height(&self) -> u32 {
        self.stack_height
    }
}

impl Simulation for HeadlessSimulation {
    fn tick(&mut self, input: TickInput) -> TickOutcome {
        self.stack_height = self.stack_height.saturating_add(input.garbage_lines);

        let mut lines_cleared = 0;
        if input.player_move == Some(PlayerMove::HardDrop) {
            self.pieces = self.pieces.saturating_add(1);
            // Four cells per piece, ten cells per row: a row every 2.5 pieces
            // on average, biased by the shared random value.
            lines_cleared = match input.random % 10 {
                0..=4 => 0,
                5..=7 => 1,
                8 => 2,
                _ => 4,
            }
            .min(self.stack_height.saturating_add(1));
            self.stack_height = self
                .stack_height
                .saturating_add(1)
                .saturating_sub(lines_cleared);
            self.score += match lines_cleared {
                0 => 1,
                1 => 100,
                2 => 300,
                3 => 500,
                _ => 800,
            };
        }

        TickOutcome {
            lines_cleared,
            game_over: self.stack_height > STACK_LIMIT,
        }
    }

    fn score(&self) -> i64 {
        self.score
    }
}
