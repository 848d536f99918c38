//! Hardware seams for the plotter stack.
//!
//! The core never talks to a serial port directly: it writes lines through a
//! [`LineSink`], polls replies from a [`LineSource`] and obtains both halves
//! from a [`Connector`]. Timing goes through [`Clock`] so pacing can be
//! simulated in tests.
pub mod clock;

pub use clock::{Clock, MonotonicClock};
#[cfg(any(test, feature = "test-util"))]
pub use clock::ManualClock;

/// Error type used at trait boundaries; the core maps it to its typed error.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Outbound half of a line-oriented link.
pub trait LineSink {
    /// Write one command line. The implementation appends the terminator.
    fn send_line(&mut self, line: &str) -> Result<(), BoxError>;
}

/// Inbound half of a line-oriented link.
pub trait LineSource {
    /// Return the next complete line (terminator stripped) if one is available.
    ///
    /// `Ok(None)` means nothing complete arrived within the link's read timeout;
    /// partial data stays buffered for the next call.
    fn poll_line(&mut self) -> Result<Option<String>, BoxError>;
}

/// Both halves of an opened link.
pub struct LinkPair {
    pub sink: Box<dyn LineSink + Send>,
    pub source: Box<dyn LineSource + Send>,
}

/// Opens links by endpoint name (e.g. `/dev/ttyUSB0`, `COM3`).
pub trait Connector {
    fn connect(&self, port_id: &str) -> Result<LinkPair, BoxError>;
}

impl<F> Connector for F
where
    F: Fn(&str) -> Result<LinkPair, BoxError>,
{
    fn connect(&self, port_id: &str) -> Result<LinkPair, BoxError> {
        self(port_id)
    }
}
