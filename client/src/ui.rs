//! Output seams for whatever draws the screen
//!
//! The core never knows about layout; it hands chat lines and status
//! changes to these traits. `ConsoleUi` is a line-oriented implementation
//! that works in a raw-mode terminal.

use crate::session::SessionReport;
use std::io::{self, Write};

pub trait ChatSink: Send {
    fn chat_line(&mut self, text: &str);
}

pub trait StatusSink: Send {
    /// Local edit buffer changed.
    fn edit_line(&mut self, _text: &str) {}
    fn session_started(&mut self, _description: &str) {}
    fn score(&mut self, _score: i64, _lines: u32) {}
    fn session_ended(&mut self, _report: &SessionReport) {}
    fn notice(&mut self, text: &str);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleUi;

impl ConsoleUi {
    fn line(&self, text: &str) {
        let mut out = io::stdout().lock();
        // Raw mode does not translate \n.
        let _ = write!(out, "\r\x1b[2K{}\r\n", text);
        let _ = out.flush();
    }
}

impl ChatSink for ConsoleUi {
    fn chat_line(&mut self, text: &str) {
        self.line(text);
    }
}

impl StatusSink for ConsoleUi {
    fn edit_line(&mut self, text: &str) {
        let mut out = io::stdout().lock();
        let _ = write!(out, "\r\x1b[2K> {}", text);
        let _ = out.flush();
    }

    fn session_started(&mut self, description: &str) {
        self.line(&format!("*** {} ***", description));
    }

    fn score(&mut self, score: i64, lines: u32) {
        let mut out = io::stdout().lock();
        let _ = write!(out, "\r\x1b[2Kscore {:>7}  lines {:>4}", score, lines);
        let _ = out.flush();
    }

    fn session_ended(&mut self, report: &SessionReport) {
        self.line(&format!(
            "*** {} over ({:?}): {} lines, score {}, {:.1}s ***",
            report.mode,
            report.end_reason,
            report.total_lines_cleared,
            report.final_score,
            report.elapsed.as_secs_f32()
        ));
    }

    fn notice(&mut self, text: &str) {
        self.line(&format!("-- {}", text));
    }
}
