//! Cross-thread client state and cooperative stop signals
//!
//! `ClientState` replaces process-wide globals: every component receives an
//! `Arc<ClientState>` and goes through its accessors. Each field sits behind
//! its own lock and no accessor ever holds two of them.

use crate::error::{ClientError, Result};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Locks a mutex, recovering the data if a panicking thread poisoned it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Spawns a named OS thread.
pub(crate) fn spawn_named<F, T>(name: &'static str, f: F) -> Result<JoinHandle<T>>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    thread::Builder::new()
        .name(name.to_string())
        .spawn(f)
        .map_err(|source| ClientError::ThreadSpawnFailed { name, source })
}

/// Joins a thread, turning a panic into an error.
pub(crate) fn join_named<T>(name: &'static str, handle: JoinHandle<T>) -> Result<T> {
    handle
        .join()
        .map_err(|_| ClientError::ThreadJoinFailed(name))
}

/// Lifecycle of the server connection. Never returns to `Open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Open,
    /// Closed on purpose (quit, shutdown).
    Closed,
    /// Broken by an I/O or protocol failure.
    Errored,
}

#[derive(Debug)]
pub struct ClientState {
    connection: Mutex<ConnectionState>,
    in_game: Mutex<bool>,
    score: Mutex<i64>,
}

impl ClientState {
    pub fn new() -> Self {
        Self {
            connection: Mutex::new(ConnectionState::Open),
            in_game: Mutex::new(false),
            score: Mutex::new(-1),
        }
    }

    pub fn connection_state(&self) -> ConnectionState {
        *lock(&self.connection)
    }

    pub fn is_open(&self) -> bool {
        self.connection_state() == ConnectionState::Open
    }

    /// Records a connection failure. Returns true for the first caller only.
    pub fn mark_broken(&self) -> bool {
        self.leave_open(ConnectionState::Errored)
    }

    /// Records a deliberate close. Returns true for the first caller only.
    pub fn mark_closed(&self) -> bool {
        self.leave_open(ConnectionState::Closed)
    }

    fn leave_open(&self, next: ConnectionState) -> bool {
        let mut state = lock(&self.connection);
        if *state == ConnectionState::Open {
            *state = next;
            true
        } else {
            false
        }
    }

    pub fn in_game(&self) -> bool {
        *lock(&self.in_game)
    }

    pub fn set_in_game(&self, in_game: bool) {
        *lock(&self.in_game) = in_game;
    }

    /// Current score; negative means "no valid score".
    pub fn score(&self) -> i64 {
        *lock(&self.score)
    }

    pub fn set_score(&self, score: i64) {
        *lock(&self.score) = score;
    }
}

impl Default for ClientState {
    fn default() -> Self {
        Self::new()
    }
}

/// Cancellation token shared between a worker and whoever owns it.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        let (flag, cvar) = &*self.inner;
        *lock(flag) = true;
        cvar.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        *lock(&self.inner.0)
    }

    /// Sleeps for `timeout` unless stopped first. Returns true if stopped.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let (flag, cvar) = &*self.inner;
        let guard = lock(flag);
        let (guard, _) = cvar
            .wait_timeout_while(guard, timeout, |stopped| !*stopped)
            .unwrap_or_else(PoisonError::into_inner);
        *guard
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn test_first_failure_wins() {
        let state = ClientState::new();
        assert!(state.is_open());
        assert!(state.mark_broken());
        assert!(!state.mark_broken());
        assert!(!state.mark_closed());
        assert_eq!(state.connection_state(), ConnectionState::Errored);
    }

    #[test]
    fn test_clean_close_is_distinct() {
        let state = ClientState::new();
        assert!(state.mark_closed());
        assert!(!state.mark_broken());
        assert_eq!(state.connection_state(), ConnectionState::Closed);
    }

    #[test]
    fn test_concurrent_breakers_only_one_wins() {
        let state = Arc::new(ClientState::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let state = Arc::clone(&state);
                thread::spawn(move || state.mark_broken())
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }

    #[test]
    fn test_score_starts_invalid() {
        let state = ClientState::new();
        assert!(state.score() < 0);
        state.set_score(42);
        assert_eq!(state.score(), 42);
    }

    #[test]
    fn test_stop_signal_wakes_waiter() {
        let signal = StopSignal::new();
        let waiter = {
            let signal = signal.clone();
            thread::spawn(move || {
                let start = Instant::now();
                let stopped = signal.wait_timeout(Duration::from_secs(10));
                (stopped, start.elapsed())
            })
        };

        thread::sleep(Duration::from_millis(20));
        signal.stop();

        let (stopped, waited) = waiter.join().unwrap();
        assert!(stopped);
        assert!(waited < Duration::from_secs(5));
    }

    #[test]
    fn test_stop_signal_times_out() {
        let signal = StopSignal::new();
        assert!(!signal.wait_timeout(Duration::from_millis(5)));
        assert!(!signal.is_stopped());
    }
}
