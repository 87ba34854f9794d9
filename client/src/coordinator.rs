//! Session coordinator: drives one game session at a time
//!
//! The coordinator runs on the main thread. It waits for START_GAME on the
//! control queue, builds the session from the last NEW_GAME parameters,
//! brings up the per-session workers (peer links, score reporter), ticks
//! the simulation until an end condition hits and then tears everything
//! down again before waiting for the next START_GAME.
//!
//! Per-session worker handles live in [`SessionWorkers`]. Teardown takes
//! them out under its lock after winning the lifecycle transition, so no
//! worker is ever joined twice even if teardown is raced.

use crate::config::ClientConfig;
use crate::connection::Connection;
use crate::error::{ClientError, Result};
use crate::input::{player_move, quits_game, KeyInput};
use crate::peers::{dial, PeerListener, PeerSet};
use crate::queue::MessageQueue;
use crate::reporter::ScoreReporter;
use crate::session::{EndReason, GameSession, SessionLifecycle, SessionPhase, SessionReport};
use crate::simulation::{Simulation, SimulationFactory, TickInput};
use crate::state::{lock, StopSignal};
use crate::ui::StatusSink;
use log::{debug, error, info, warn};
use shared::{GameMode, Message, MessageType, SessionParams};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Instant;

#[derive(Default)]
struct WorkerSlots {
    reporter: Option<ScoreReporter>,
    listener: Option<PeerListener>,
    peers: Option<Arc<PeerSet>>,
}

/// Per-session workers and the teardown that releases them.
pub struct SessionWorkers {
    connection: Arc<Connection>,
    lifecycle: Arc<SessionLifecycle>,
    game_input: Arc<MessageQueue<KeyInput>>,
    slots: Mutex<WorkerSlots>,
}

impl SessionWorkers {
    pub fn new(
        connection: Arc<Connection>,
        lifecycle: Arc<SessionLifecycle>,
        game_input: Arc<MessageQueue<KeyInput>>,
    ) -> Self {
        Self {
            connection,
            lifecycle,
            game_input,
            slots: Mutex::new(WorkerSlots::default()),
        }
    }

    pub fn set_reporter(&self, reporter: ScoreReporter) {
        lock(&self.slots).reporter = Some(reporter);
    }

    pub fn set_listener(&self, listener: PeerListener) {
        lock(&self.slots).listener = Some(listener);
    }

    pub fn set_peers(&self, peers: Arc<PeerSet>) {
        lock(&self.slots).peers = Some(peers);
    }

    pub fn peers(&self) -> Option<Arc<PeerSet>> {
        lock(&self.slots).peers.clone()
    }

    /// Releases the session. Only the caller that wins the move into
    /// `TearingDown` does any work; everyone else gets `Ok(false)`.
    pub fn teardown(&self, final_score: i64) -> Result<bool> {
        if !self.lifecycle.try_begin_teardown() {
            return Ok(false);
        }
        let state = self.connection.state();

        // Publish "no score" first so a reporter mid-interval exits quietly.
        state.set_score(-1);

        let WorkerSlots {
            reporter,
            listener,
            peers,
        } = std::mem::take(&mut *lock(&self.slots));

        let mut result = Ok(());
        if let Some(mut reporter) = reporter {
            if let Err(e) = reporter.stop_and_join() {
                result = Err(e);
            }
        }

        if state.is_open() {
            if let Err(e) = self.connection.send(&Message::end_game(final_score)) {
                warn!("Could not report final score: {}", e);
                state.mark_broken();
            }
        }

        if let Some(mut listener) = listener {
            if let Err(e) = listener.stop_and_join() {
                result = Err(e);
            }
        }
        if let Some(peers) = peers {
            if let Err(e) = peers.close() {
                result = Err(e);
            }
        }

        state.set_in_game(false);
        self.game_input.clear();
        self.lifecycle.advance(SessionPhase::Idle)?;
        result.map(|_| true)
    }
}

pub struct SessionCoordinator {
    config: ClientConfig,
    connection: Arc<Connection>,
    lifecycle: Arc<SessionLifecycle>,
    control: Arc<MessageQueue<Message>>,
    game_input: Arc<MessageQueue<KeyInput>>,
    simulations: SimulationFactory,
    status: Box<dyn StatusSink>,
    workers: SessionWorkers,
}

impl SessionCoordinator {
    pub fn new(
        config: ClientConfig,
        connection: Arc<Connection>,
        lifecycle: Arc<SessionLifecycle>,
        control: Arc<MessageQueue<Message>>,
        game_input: Arc<MessageQueue<KeyInput>>,
        simulations: SimulationFactory,
        status: Box<dyn StatusSink>,
    ) -> Self {
        let workers = SessionWorkers::new(
            Arc::clone(&connection),
            Arc::clone(&lifecycle),
            Arc::clone(&game_input),
        );
        Self {
            config,
            connection,
            lifecycle,
            control,
            game_input,
            simulations,
            status,
            workers,
        }
    }

    /// Serves START_GAME requests until the control queue shuts down.
    /// A worker failure closes the connection and is returned.
    pub fn run(&mut self) -> Result<Vec<SessionReport>> {
        let mut reports = Vec::new();
        while let Some(msg) = self.control.pop() {
            if msg.kind() != MessageType::StartGame {
                debug!("Coordinator ignoring {:?}", msg.kind());
                continue;
            }
            if !self.connection.state().is_open() {
                debug!("Connection gone, not starting a session");
                continue;
            }

            match self.run_session() {
                Ok(Some(report)) => {
                    self.status.session_ended(&report);
                    reports.push(report);
                }
                Ok(None) => {}
                Err(e) => {
                    error!("Session failed: {}", e);
                    self.connection.state().mark_broken();
                    self.connection.close();
                    return Err(e);
                }
            }
        }
        Ok(reports)
    }

    /// Runs one session from setup to teardown. `Ok(None)` when START_GAME
    /// could not be honoured.
    pub fn run_session(&mut self) -> Result<Option<SessionReport>> {
        let Some(params) = self.lifecycle.begin_setup() else {
            warn!("START_GAME without usable parameters, ignoring");
            return Ok(None);
        };
        self.lifecycle.clear_end_request();

        let mut game = GameSession::new(params);
        let mut sim = (self.simulations)(&game);
        let state = Arc::clone(self.connection.state());

        info!(
            "Starting {} session (seed {}, {} peers expected)",
            game.mode(),
            game.seed(),
            if game.mode().requires_peers() {
                game.params.expected_peers()
            } else {
                0
            }
        );
        self.game_input.clear();
        state.set_in_game(true);
        state.set_score(sim.score());
        self.status
            .session_started(&format!("{} session, seed {}", game.mode(), game.seed()));

        let (end_reason, setup_error) = match self.setup(&game.params) {
            Ok(()) => (self.play(&mut game, sim.as_mut()), None),
            Err(e) => {
                self.status.notice(&format!("session setup failed: {}", e));
                (EndReason::SetupFailed, Some(e))
            }
        };

        let final_score = sim.score();
        let torn_down = self.workers.teardown(final_score);
        game.reset_rng();
        if let Some(e) = setup_error {
            return Err(e);
        }
        torn_down?;

        let report = SessionReport {
            mode: game.mode(),
            ticks: game.ticks,
            total_lines_cleared: game.total_lines_cleared,
            final_score,
            end_reason,
            elapsed: game.start_time.elapsed(),
        };
        info!(
            "Session over: {:?} after {} ticks, {} lines, score {}",
            report.end_reason, report.ticks, report.total_lines_cleared, report.final_score
        );
        Ok(Some(report))
    }

    fn setup(&mut self, params: &SessionParams) -> Result<()> {
        if params.mode.requires_peers() {
            self.connect_peers(params)?;
        }

        let reporter = ScoreReporter::spawn(
            Arc::clone(&self.connection),
            Arc::clone(&self.lifecycle),
            self.config.score_interval,
        )?;
        self.workers.set_reporter(reporter);
        self.lifecycle.advance(SessionPhase::InSession)?;
        Ok(())
    }

    /// Listens for `accept` peers, dials the rest and waits until every
    /// link is up. Individual peer failures only shrink the match.
    fn connect_peers(&mut self, params: &SessionParams) -> Result<()> {
        let peers = PeerSet::new();
        self.workers.set_peers(Arc::clone(&peers));
        let state = Arc::clone(self.connection.state());

        let mut inbound = 0;
        if params.accept_peers > 0 {
            match PeerListener::spawn(
                &self.config.peer_host,
                params.listen_port,
                params.accept_peers,
                Arc::clone(&peers),
                self.config.poll_interval,
            ) {
                Ok(listener) => {
                    self.workers.set_listener(listener);
                    inbound = params.accept_peers;
                }
                Err(e @ ClientError::ThreadSpawnFailed { .. }) => return Err(e),
                Err(e) => warn!("Peer listener unavailable, no inbound peers: {}", e),
            }
        }

        let stop = StopSignal::new();
        let mut outbound = 0;
        for addr in &params.dial_peers {
            if !state.is_open() || quit_requested(&self.game_input, &self.lifecycle) {
                break;
            }
            let linked = dial(
                addr,
                self.config.peer_dial_attempts,
                self.config.peer_dial_delay,
                &stop,
            )
            .and_then(|stream| peers.register(stream));
            match linked {
                Ok(_) => outbound += 1,
                Err(e @ ClientError::ThreadSpawnFailed { .. }) => return Err(e),
                Err(e) => warn!("Skipping peer {}: {}", addr, e),
            }
        }

        let target = inbound + outbound;
        let lifecycle = Arc::clone(&self.lifecycle);
        let game_input = Arc::clone(&self.game_input);
        let complete = peers.wait_for(target, self.config.peer_timeout, || {
            !state.is_open() || quit_requested(&game_input, &lifecycle)
        });
        if complete {
            info!("Peer negotiation complete with {} peers", target);
        } else {
            warn!(
                "Peer negotiation incomplete: {} of {} peers",
                peers.registered(),
                target
            );
        }
        Ok(())
    }

    fn play(&mut self, game: &mut GameSession, sim: &mut dyn Simulation) -> EndReason {
        let state = Arc::clone(self.connection.state());
        let peers = self.workers.peers();
        let rising_tide = game.mode() == GameMode::RisingTide;
        let mut next_tick = Instant::now();

        loop {
            if let Some(reason) = self.lifecycle.end_requested() {
                return reason;
            }
            if !state.is_open() {
                return EndReason::ConnectionLost;
            }

            let mut latest = None;
            while let Some(key) = self.game_input.try_pop() {
                if quits_game(key) {
                    info!("Player left the session");
                    return EndReason::PlayerQuit;
                }
                if let Some(m) = player_move(key) {
                    latest = Some(m);
                }
            }

            let garbage_lines = match (&peers, rising_tide) {
                (Some(peers), true) => peers.take_pending_garbage(),
                _ => 0,
            };
            let outcome = sim.tick(TickInput {
                player_move: latest,
                garbage_lines,
                random: game.next_random(),
            });

            state.set_score(sim.score());
            game.record_tick(outcome.lines_cleared);
            if let (Some(peers), true) = (&peers, rising_tide) {
                if outcome.lines_cleared > 0 {
                    let reached = peers.broadcast_lines(outcome.lines_cleared);
                    debug!("Sent {} lines to {} peers", outcome.lines_cleared, reached);
                }
            }
            self.status.score(sim.score(), game.total_lines_cleared);

            if let Some(reason) = game.end_condition(outcome.game_over, Instant::now()) {
                return reason;
            }

            next_tick += self.config.tick_interval;
            let now = Instant::now();
            if next_tick > now {
                thread::sleep(next_tick - now);
            } else {
                next_tick = now;
            }
        }
    }
}

/// Drains keys that arrive before play starts. A quit key ends the session;
/// moves are dropped. True once any end was requested.
fn quit_requested(game_input: &MessageQueue<KeyInput>, lifecycle: &SessionLifecycle) -> bool {
    while let Some(key) = game_input.try_pop() {
        if quits_game(key) {
            info!("Player left before the session started");
            lifecycle.request_end(EndReason::PlayerQuit);
        }
    }
    lifecycle.end_requested().is_some()
}
