//! Operator-facing event stream.
//!
//! Workers and the session reader report through a [`LogSink`]: a bounded
//! channel that never blocks the sender. When the consumer falls behind,
//! events are dropped and counted. Every event is also mirrored to `tracing`.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_channel as xch;

use crate::command::Command;
use crate::mapper::Corner;

#[derive(Debug, Clone, PartialEq)]
pub enum LogEvent {
    /// A command written to the link.
    Sent(Command),
    /// A line read from the link.
    Received(String),
    Info(String),
    Warn(String),
    Error(String),
    /// The origin changed; anything derived from physical coordinates is stale.
    OriginDetected(Corner),
    /// Playback progress after each command.
    Progress {
        stroke: usize,
        strokes: usize,
        sent: usize,
        total: usize,
    },
}

impl fmt::Display for LogEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogEvent::Sent(cmd) => write!(f, "→ {cmd}"),
            LogEvent::Received(line) => write!(f, "← {line}"),
            LogEvent::Info(msg) => f.write_str(msg),
            LogEvent::Warn(msg) => write!(f, "warning: {msg}"),
            LogEvent::Error(msg) => write!(f, "error: {msg}"),
            LogEvent::OriginDetected(c) => write!(f, "origin detected at {c}"),
            LogEvent::Progress {
                stroke,
                strokes,
                sent,
                total,
            } => write!(f, "stroke {}/{strokes}, command {sent}/{total}", stroke + 1),
        }
    }
}

/// Cloneable, non-blocking event sender.
#[derive(Debug, Clone)]
pub struct LogSink {
    tx: Option<xch::Sender<LogEvent>>,
    dropped: Arc<AtomicU64>,
}

impl LogSink {
    /// A sink plus the receiving end, holding at most `capacity` events.
    pub fn channel(capacity: usize) -> (Self, xch::Receiver<LogEvent>) {
        let (tx, rx) = xch::bounded(capacity.max(1));
        (
            Self {
                tx: Some(tx),
                dropped: Arc::new(AtomicU64::new(0)),
            },
            rx,
        )
    }

    /// A sink that only mirrors to `tracing`.
    pub fn disabled() -> Self {
        Self {
            tx: None,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn emit(&self, event: LogEvent) {
        mirror(&event);
        if let Some(tx) = &self.tx
            && tx.try_send(event).is_err()
        {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn info(&self, msg: impl Into<String>) {
        self.emit(LogEvent::Info(msg.into()));
    }

    pub fn warn(&self, msg: impl Into<String>) {
        self.emit(LogEvent::Warn(msg.into()));
    }

    pub fn error(&self, msg: impl Into<String>) {
        self.emit(LogEvent::Error(msg.into()));
    }

    /// Events discarded because the queue was full or the receiver was gone.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Default for LogSink {
    fn default() -> Self {
        Self::disabled()
    }
}

fn mirror(event: &LogEvent) {
    match event {
        LogEvent::Sent(cmd) => tracing::debug!(command = %cmd, "sent"),
        LogEvent::Received(line) => tracing::debug!(line = %line, "received"),
        LogEvent::Info(msg) => tracing::info!("{msg}"),
        LogEvent::Warn(msg) => tracing::warn!("{msg}"),
        LogEvent::Error(msg) => tracing::error!("{msg}"),
        LogEvent::OriginDetected(c) => tracing::info!(corner = %c, "origin detected"),
        LogEvent::Progress {
            stroke,
            strokes,
            sent,
            total,
        } => tracing::trace!(stroke, strokes, sent, total, "playback progress"),
    }
}
