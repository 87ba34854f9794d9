//! Periodic score reports to the server while a session runs

use crate::connection::Connection;
use crate::error::Result;
use crate::session::{EndReason, SessionLifecycle};
use crate::state::{join_named, spawn_named, StopSignal};
use log::{debug, warn};
use shared::Message;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Handle to a running reporter thread.
pub struct ScoreReporter {
    stop: StopSignal,
    handle: Option<JoinHandle<u32>>,
}

impl ScoreReporter {
    pub fn spawn(
        connection: Arc<Connection>,
        lifecycle: Arc<SessionLifecycle>,
        interval: Duration,
    ) -> Result<Self> {
        let stop = StopSignal::new();
        let thread_stop = stop.clone();
        let handle = spawn_named("score-reporter", move || {
            report_loop(&connection, &lifecycle, &thread_stop, interval)
        })?;
        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    /// Stops the reporter and waits for it. Returns the number of reports
    /// sent; a second call returns 0.
    pub fn stop_and_join(&mut self) -> Result<u32> {
        self.stop.stop();
        match self.handle.take() {
            Some(handle) => join_named("score-reporter", handle),
            None => Ok(0),
        }
    }
}

impl Drop for ScoreReporter {
    fn drop(&mut self) {
        self.stop.stop();
    }
}

fn report_loop(
    connection: &Connection,
    lifecycle: &SessionLifecycle,
    stop: &StopSignal,
    interval: Duration,
) -> u32 {
    let mut sent = 0;
    loop {
        if stop.wait_timeout(interval) {
            break;
        }

        let score = connection.state().score();
        if score < 0 {
            debug!("No valid score, reporter exiting");
            break;
        }

        if let Err(e) = connection.send(&Message::score_update(score)) {
            warn!("Score report failed: {}", e);
            lifecycle.request_end(EndReason::ScoreReportFailed);
            connection.state().mark_broken();
            break;
        }
        sent += 1;
    }
    sent
}
