//! Link backends for the plotter: a real serial port (feature `hardware`) and
//! an in-process simulated controller that speaks the same line protocol.
pub mod error;
#[cfg(feature = "hardware")]
pub mod serial;
pub mod util;

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use plotter_traits::{BoxError, Connector, LineSink, LineSource, LinkPair};

use crate::error::HwError;

#[cfg(feature = "hardware")]
pub use serial::{SerialConnector, available_ports};

/// One enumerated serial endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    pub name: String,
    pub description: String,
}

/// Observable state of the simulated controller.
#[derive(Debug, Default, Clone)]
pub struct SimState {
    pub x_steps: i64,
    pub y_steps: i64,
    pub pen_down: bool,
    /// Every line received, in order.
    pub received: Vec<String>,
    /// Lines queued for the reader half.
    pub outbox: VecDeque<String>,
    /// Fail writes once this many lines have been accepted.
    pub fail_after: Option<usize>,
    pub disconnected: bool,
}

/// Simulated two-axis pen plotter controller.
///
/// Clones share the same device. It tracks position and pen state from `X`,
/// `Y`, `H`, `U` and `B` lines and answers `P` (position) and `I` (telemetry)
/// with a reply line. Probe commands are acknowledged with a text line only.
#[derive(Debug, Clone, Default)]
pub struct SimulatedPlotter {
    state: Arc<Mutex<SimState>>,
    unavailable: bool,
}

impl SimulatedPlotter {
    pub fn new() -> Self {
        Self::default()
    }

    /// A device whose port can never be opened.
    pub fn unavailable() -> Self {
        Self {
            state: Arc::default(),
            unavailable: true,
        }
    }

    /// Make writes fail after `n` more accepted lines.
    pub fn fail_after(&self, n: usize) {
        let mut st = self.lock();
        let already = st.received.len();
        st.fail_after = Some(already + n);
    }

    /// Drop the link: subsequent writes and reads fail.
    pub fn disconnect(&self) {
        self.lock().disconnected = true;
    }

    /// Queue an unsolicited line from the device.
    pub fn inject(&self, line: &str) {
        self.lock().outbox.push_back(line.to_string());
    }

    pub fn snapshot(&self) -> SimState {
        self.lock().clone()
    }

    pub fn received(&self) -> Vec<String> {
        self.lock().received.clone()
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        // A panic while holding the lock only happens in a failing test; keep going.
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl Connector for SimulatedPlotter {
    fn connect(&self, port_id: &str) -> Result<LinkPair, BoxError> {
        if self.unavailable {
            return Err(Box::new(HwError::PortUnavailable {
                port: port_id.to_string(),
                reason: "simulated port missing".to_string(),
            }));
        }
        self.lock().disconnected = false;
        tracing::debug!(port = port_id, "simulated plotter connected");
        Ok(LinkPair {
            sink: Box::new(SimSink(self.clone())),
            source: Box::new(SimSource(self.clone())),
        })
    }
}

struct SimSink(SimulatedPlotter);

impl LineSink for SimSink {
    fn send_line(&mut self, line: &str) -> Result<(), BoxError> {
        let mut st = self.0.lock();
        if st.disconnected {
            return Err(Box::new(HwError::Disconnected));
        }
        if st.fail_after.is_some_and(|limit| st.received.len() >= limit) {
            st.disconnected = true;
            return Err(Box::new(HwError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "simulated write failure",
            ))));
        }
        st.received.push(line.to_string());
        apply_line(&mut st, line);
        Ok(())
    }
}

struct SimSource(SimulatedPlotter);

impl LineSource for SimSource {
    fn poll_line(&mut self) -> Result<Option<String>, BoxError> {
        let mut st = self.0.lock();
        if st.disconnected && st.outbox.is_empty() {
            return Err(Box::new(HwError::Disconnected));
        }
        Ok(st.outbox.pop_front())
    }
}

fn apply_line(st: &mut SimState, line: &str) {
    let mut chars = line.chars();
    let Some(op) = chars.next() else {
        return;
    };
    let arg = chars.as_str();
    match op {
        'X' | 'Y' => match arg.parse::<i64>() {
            Ok(d) if op == 'X' => st.x_steps += d,
            Ok(d) => st.y_steps += d,
            Err(_) => st.outbox.push_back(format!("ERR bad move {line}")),
        },
        'H' => {
            st.x_steps = 0;
            st.y_steps = 0;
            st.outbox.push_back("HOME OK".to_string());
        }
        'U' => st.pen_down = false,
        'B' => st.pen_down = true,
        'P' => {
            let reply = format!("POS {} {}", st.x_steps, st.y_steps);
            st.outbox.push_back(reply);
        }
        'I' => {
            let pen = if st.pen_down { "down" } else { "up" };
            let reply = format!("TEL x={} y={} pen={pen}", st.x_steps, st.y_steps);
            st.outbox.push_back(reply);
        }
        'C' => st.outbox.push_back("CAL X DONE".to_string()),
        'D' => st.outbox.push_back("CAL Y DONE".to_string()),
        'A' => st.outbox.push_back("TEST DONE".to_string()),
        _ => st.outbox.push_back(format!("ERR unknown {line}")),
    }
}
