//! Game session data and the session lifecycle state machine
//!
//! The lifecycle cycles `Idle -> SettingUp -> InSession -> TearingDown ->
//! Idle`. The one extra edge is `SettingUp -> TearingDown`, taken when setup
//! fails before gameplay starts. The phase and the parameters received by
//! NEW_GAME live behind the same lock, so parameters can never change under a
//! session that is being set up or torn down.

use crate::error::{ClientError, Result};
use crate::state::lock;
use log::{debug, info};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use shared::{GameMode, SessionParams};
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    SettingUp,
    InSession,
    TearingDown,
}

impl SessionPhase {
    fn can_advance_to(self, next: SessionPhase) -> bool {
        use SessionPhase::*;
        matches!(
            (self, next),
            (Idle, SettingUp)
                | (SettingUp, InSession)
                | (SettingUp, TearingDown)
                | (InSession, TearingDown)
                | (TearingDown, Idle)
        )
    }
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    GameOver,
    WinLinesReached,
    TimeLimit,
    PlayerQuit,
    ConnectionLost,
    ScoreReportFailed,
    SetupFailed,
}

#[derive(Debug)]
struct LifecycleInner {
    phase: SessionPhase,
    params: Option<SessionParams>,
}

#[derive(Debug)]
pub struct SessionLifecycle {
    inner: Mutex<LifecycleInner>,
    end_request: Mutex<Option<EndReason>>,
}

impl SessionLifecycle {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(LifecycleInner {
                phase: SessionPhase::Idle,
                params: None,
            }),
            end_request: Mutex::new(None),
        }
    }

    pub fn phase(&self) -> SessionPhase {
        lock(&self.inner).phase
    }

    /// Stores NEW_GAME parameters for the next session.
    pub fn absorb_params(&self, params: SessionParams) {
        let mut inner = lock(&self.inner);
        if inner.phase != SessionPhase::Idle {
            info!(
                "New game parameters arrived during {:?}; they apply to the next session",
                inner.phase
            );
        }
        debug!("Session parameters: {}", params.to_payload());
        inner.params = Some(params);
    }

    pub fn params(&self) -> Option<SessionParams> {
        lock(&self.inner).params.clone()
    }

    /// Moves to `next` if that edge is legal from the current phase.
    pub fn advance(&self, next: SessionPhase) -> Result<SessionPhase> {
        let mut inner = lock(&self.inner);
        let from = inner.phase;
        if !from.can_advance_to(next) {
            return Err(ClientError::InvalidTransition { from, to: next });
        }
        inner.phase = next;
        debug!("Session {:?} -> {:?}", from, next);
        Ok(from)
    }

    /// `Idle -> SettingUp`, returning the parameters to build the session
    /// from. `None` when not idle or when no NEW_GAME arrived yet.
    pub fn begin_setup(&self) -> Option<SessionParams> {
        let mut inner = lock(&self.inner);
        if inner.phase != SessionPhase::Idle {
            return None;
        }
        let params = inner.params.clone()?;
        inner.phase = SessionPhase::SettingUp;
        Some(params)
    }

    /// Claims the teardown. Only the first of any number of concurrent
    /// callers gets `true`.
    pub fn try_begin_teardown(&self) -> bool {
        self.advance(SessionPhase::TearingDown).is_ok()
    }

    /// Asks the running session to end. The first reason sticks.
    pub fn request_end(&self, reason: EndReason) {
        let mut request = lock(&self.end_request);
        if request.is_none() {
            *request = Some(reason);
        }
    }

    pub fn end_requested(&self) -> Option<EndReason> {
        *lock(&self.end_request)
    }

    pub fn clear_end_request(&self) {
        *lock(&self.end_request) = None;
    }
}

impl Default for SessionLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

/// State of one running match.
#[derive(Debug)]
pub struct GameSession {
    pub params: SessionParams,
    pub total_lines_cleared: u32,
    pub start_time: Instant,
    pub ticks: u64,
    rng: Option<StdRng>,
}

impl GameSession {
    pub fn new(params: SessionParams) -> Self {
        let rng = StdRng::seed_from_u64(params.seed);
        Self {
            params,
            total_lines_cleared: 0,
            start_time: Instant::now(),
            ticks: 0,
            rng: Some(rng),
        }
    }

    pub fn mode(&self) -> GameMode {
        self.params.mode
    }

    pub fn seed(&self) -> u64 {
        self.params.seed
    }

    /// Next value of the shared random sequence. Every participant seeded
    /// with the same value sees the same sequence.
    pub fn next_random(&mut self) -> u32 {
        self.rng.as_mut().map_or(0, |rng| rng.next_u32())
    }

    pub fn reset_rng(&mut self) {
        self.rng = None;
    }

    pub fn record_tick(&mut self, lines_cleared: u32) {
        self.ticks = self.ticks.saturating_add(1);
        self.total_lines_cleared = self.total_lines_cleared.saturating_add(lines_cleared);
    }

    pub fn time_limit(&self) -> Duration {
        Duration::from_secs(u64::from(self.params.time_limit_minutes) * 60)
    }

    /// Mode-specific end conditions evaluated after each tick.
    pub fn end_condition(&self, game_over: bool, now: Instant) -> Option<EndReason> {
        if game_over {
            return Some(EndReason::GameOver);
        }
        match self.params.mode {
            GameMode::FastTrack if self.total_lines_cleared >= self.params.n_winlines => {
                Some(EndReason::WinLinesReached)
            }
            GameMode::Boomer if now.duration_since(self.start_time) >= self.time_limit() => {
                Some(EndReason::TimeLimit)
            }
            _ => None,
        }
    }
}

/// Summary handed back when a session is over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub mode: GameMode,
    pub ticks: u64,
    pub total_lines_cleared: u32,
    pub final_score: i64,
    pub end_reason: EndReason,
    pub elapsed: Duration,
}
