//! Transport session over an opened line link.
//!
//! A [`Session`] owns the reader thread; [`SessionHandle`] is the cloneable
//! write side shared with whichever worker is running. There is no automatic
//! reconnection: once a read or write fails the session stays disconnected
//! until the operator opens a new one.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use plotter_traits::{Clock, Connector, LineSink, LineSource, MonotonicClock};

use crate::command::{Command, CommandSink};
use crate::error::{PlotterError, Result};
use crate::hw_error::{map_link_error, map_open_error};
use crate::log::{LogEvent, LogSink};
use crate::status::StatusFlags;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    /// Wait after opening; the controller resets when the port opens.
    pub open_settle: Duration,
    /// Reader sleep between empty polls.
    pub poll_interval: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            open_settle: Duration::from_secs(2),
            poll_interval: Duration::from_millis(100),
        }
    }
}

type SharedSink = Arc<Mutex<Box<dyn LineSink + Send>>>;

/// Cloneable sending half of a session.
#[derive(Clone)]
pub struct SessionHandle {
    sink: SharedSink,
    closed: Arc<AtomicBool>,
    flags: Arc<StatusFlags>,
    log: LogSink,
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl SessionHandle {
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Write one command line.
    pub fn send(&self, cmd: Command) -> Result<()> {
        self.send_text(&cmd.to_string())?;
        self.log.emit(LogEvent::Sent(cmd));
        Ok(())
    }

    /// Write a raw line. Used for operator-typed text; prefer [`send`](Self::send).
    pub fn send_text(&self, line: &str) -> Result<()> {
        if self.is_closed() {
            return Err(PlotterError::Transport("link is closed".into()));
        }
        let written = match self.sink.lock() {
            Ok(mut sink) => sink.send_line(line).map_err(|e| map_link_error(&*e)),
            Err(_) => Err(PlotterError::Transport("sink lock poisoned".into())),
        };
        if let Err(e) = &written {
            self.mark_disconnected();
            self.log.error(format!("write of '{line}' failed: {e}"));
        }
        written
    }

    fn mark_disconnected(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.flags.set_connected(false);
    }
}

impl CommandSink for SessionHandle {
    fn send(&mut self, cmd: Command) -> Result<()> {
        SessionHandle::send(self, cmd)
    }
}

/// An open link plus its reader thread. Dropping it closes the link.
pub struct Session {
    port: String,
    handle: SessionHandle,
    shutdown: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("port", &self.port)
            .field("closed", &self.handle.is_closed())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Open `port_id` through `connector`, wait out the settle period and
    /// start the reader.
    pub fn open<C: Connector + ?Sized>(
        connector: &C,
        port_id: &str,
        options: &SessionOptions,
        log: LogSink,
        flags: Arc<StatusFlags>,
    ) -> Result<Self> {
        Self::open_with_clock(connector, port_id, options, log, flags, MonotonicClock)
    }

    pub fn open_with_clock<C, K>(
        connector: &C,
        port_id: &str,
        options: &SessionOptions,
        log: LogSink,
        flags: Arc<StatusFlags>,
        clock: K,
    ) -> Result<Self>
    where
        C: Connector + ?Sized,
        K: Clock + Send + 'static,
    {
        let pair = connector
            .connect(port_id)
            .map_err(|e| map_open_error(port_id, &*e))?;
        tracing::info!(port = port_id, settle_ms = options.open_settle.as_millis(), "link opened");
        clock.sleep(options.open_settle);

        let closed = Arc::new(AtomicBool::new(false));
        let shutdown = Arc::new(AtomicBool::new(false));
        flags.set_connected(true);
        let reader = spawn_reader(
            pair.source,
            Arc::clone(&shutdown),
            Arc::clone(&closed),
            Arc::clone(&flags),
            log.clone(),
            options.poll_interval,
            clock,
        );
        log.info(format!("connected to {port_id}"));

        Ok(Self {
            port: port_id.to_string(),
            handle: SessionHandle {
                sink: Arc::new(Mutex::new(pair.sink)),
                closed,
                flags,
                log,
            },
            shutdown,
            reader: Some(reader),
        })
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    pub fn send(&self, cmd: Command) -> Result<()> {
        self.handle.send(cmd)
    }

    /// False once a read or write has failed or the session was closed.
    pub fn is_connected(&self) -> bool {
        !self.handle.is_closed()
    }

    /// Stop the reader and mark the link closed. Idempotent.
    pub fn close(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.handle.mark_disconnected();
        if let Some(reader) = self.reader.take() {
            if reader.join().is_err() {
                tracing::warn!(port = %self.port, "reader thread panicked");
            } else {
                tracing::debug!(port = %self.port, "reader thread joined");
            }
            self.handle.log.info(format!("disconnected from {}", self.port));
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

fn spawn_reader<K: Clock + Send + 'static>(
    mut source: Box<dyn LineSource + Send>,
    shutdown: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
    flags: Arc<StatusFlags>,
    log: LogSink,
    poll_interval: Duration,
    clock: K,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        loop {
            if shutdown.load(Ordering::SeqCst) {
                tracing::debug!("reader received shutdown signal");
                break;
            }
            match source.poll_line() {
                Ok(Some(line)) => log.emit(LogEvent::Received(line)),
                Ok(None) => clock.sleep(poll_interval),
                Err(e) => {
                    let err = map_link_error(&*e);
                    closed.store(true, Ordering::SeqCst);
                    flags.set_connected(false);
                    log.error(format!("link lost: {err}"));
                    break;
                }
            }
        }
        tracing::trace!("reader thread exiting cleanly");
    })
}
