//! Test and helper sinks for plotter_core.

use crate::command::{Command, CommandSink};
use crate::error::{PlotterError, Result};

/// Records every command; optionally fails from the `fail_at`-th send on
/// (0-based), like a link that dropped mid-run.
#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    pub sent: Vec<Command>,
    pub fail_at: Option<usize>,
}

impl RecordingSink {
    pub fn failing_at(n: usize) -> Self {
        Self {
            sent: Vec::new(),
            fail_at: Some(n),
        }
    }

    /// Sent commands as protocol tokens.
    pub fn tokens(&self) -> Vec<String> {
        self.sent.iter().map(ToString::to_string).collect()
    }
}

impl CommandSink for RecordingSink {
    fn send(&mut self, cmd: Command) -> Result<()> {
        if self.fail_at.is_some_and(|n| self.sent.len() >= n) {
            return Err(PlotterError::Transport("recording sink closed".into()));
        }
        self.sent.push(cmd);
        Ok(())
    }
}
