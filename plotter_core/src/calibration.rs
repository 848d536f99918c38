//! Origin corner detection.
//!
//! The controller has no acknowledgement protocol, so each probing phase is a
//! command followed by a fixed settle wait. After the probes the operator
//! watches where the head ended up and names the corner.
//!
//! ```text
//! Idle → ProbingAxisX → ProbingAxisY → DirectionTest → AwaitingOperatorCorner → Detected
//!   \_____________________________________________________________________/
//!                     → Cancelled | Failed   (from any non-terminal phase)
//! ```
//!
//! [`CalibrationRun`] holds the transitions and nothing else. [`run_auto_detect`]
//! drives one run against a [`CommandSink`], and [`CalibrationHandle`] runs that
//! on a worker thread.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel as xch;
use plotter_traits::Clock;

use crate::command::{Command, CommandSink};
use crate::encoder::PacingConfig;
use crate::error::{PlotterError, Result};
use crate::log::{LogEvent, LogSink};
use crate::mapper::{Corner, OriginState, SharedOrigin};
use crate::session::SessionHandle;
use crate::status::{Activity, StatusFlags};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    ProbingAxisX,
    ProbingAxisY,
    DirectionTest,
    AwaitingOperatorCorner,
    Detected(Corner),
    Cancelled,
    Failed(String),
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Detected(_) | Phase::Cancelled | Phase::Failed(_))
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Idle => f.write_str("idle"),
            Phase::ProbingAxisX => f.write_str("probing X axis"),
            Phase::ProbingAxisY => f.write_str("probing Y axis"),
            Phase::DirectionTest => f.write_str("direction test"),
            Phase::AwaitingOperatorCorner => f.write_str("awaiting operator corner"),
            Phase::Detected(c) => write!(f, "detected ({c})"),
            Phase::Cancelled => f.write_str("cancelled"),
            Phase::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// Settle waits for each probing phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalibrationTiming {
    pub probe_x_settle: Duration,
    pub probe_y_settle: Duration,
    pub direction_test_settle: Duration,
    /// Length of each round-trip probe move after the direction test.
    pub round_trip_steps: u32,
}

impl Default for CalibrationTiming {
    fn default() -> Self {
        Self {
            probe_x_settle: Duration::from_secs(8),
            probe_y_settle: Duration::from_secs(8),
            direction_test_settle: Duration::from_secs(6),
            round_trip_steps: 200,
        }
    }
}

/// What to send on entering a phase, and how long to wait afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseStep {
    pub commands: Vec<Command>,
    pub settle: Duration,
}

/// Read-only view of a run's current phase, for other threads.
#[derive(Debug, Clone, Default)]
pub struct PhaseWatch(Arc<Mutex<Phase>>);

impl PhaseWatch {
    pub fn get(&self) -> Phase {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn set(&self, phase: &Phase) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = phase.clone();
    }
}

/// One auto-detect sequence.
#[derive(Debug)]
pub struct CalibrationRun {
    phase: Phase,
    started_at: Instant,
    cancelled: bool,
    watch: PhaseWatch,
}

impl CalibrationRun {
    pub fn new(started_at: Instant) -> Self {
        Self {
            phase: Phase::Idle,
            started_at,
            cancelled: false,
            watch: PhaseWatch::default(),
        }
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn watch(&self) -> PhaseWatch {
        self.watch.clone()
    }

    fn enter(&mut self, phase: Phase) {
        tracing::debug!(from = %self.phase, to = %phase, "calibration phase");
        self.watch.set(&phase);
        self.phase = phase;
    }

    /// Enter the next probing phase.
    ///
    /// Valid from `Idle` through `DirectionTest`; the last step lands in
    /// `AwaitingOperatorCorner` with the round-trip probe moves.
    pub fn advance(&mut self, timing: &CalibrationTiming) -> Result<PhaseStep> {
        let (next, step) = match self.phase {
            Phase::Idle => (
                Phase::ProbingAxisX,
                PhaseStep {
                    commands: vec![Command::ProbeX],
                    settle: timing.probe_x_settle,
                },
            ),
            Phase::ProbingAxisX => (
                Phase::ProbingAxisY,
                PhaseStep {
                    commands: vec![Command::ProbeY],
                    settle: timing.probe_y_settle,
                },
            ),
            Phase::ProbingAxisY => (
                Phase::DirectionTest,
                PhaseStep {
                    commands: vec![Command::DirectionTest],
                    settle: timing.direction_test_settle,
                },
            ),
            Phase::DirectionTest => (
                Phase::AwaitingOperatorCorner,
                PhaseStep {
                    commands: round_trip(timing.round_trip_steps),
                    settle: Duration::ZERO,
                },
            ),
            ref other => {
                return Err(PlotterError::InvalidState(format!(
                    "cannot advance calibration from {other}"
                )));
            }
        };
        self.enter(next);
        Ok(step)
    }

    /// Accept the operator's corner. Only valid while awaiting one.
    pub fn confirm(&mut self, corner: Corner) -> Result<OriginState> {
        if self.phase != Phase::AwaitingOperatorCorner {
            return Err(PlotterError::InvalidState(format!(
                "no corner expected while {}",
                self.phase
            )));
        }
        if corner == Corner::Unknown {
            return Err(PlotterError::InvalidState("corner must be one of the four corners".into()));
        }
        self.enter(Phase::Detected(corner));
        Ok(OriginState::detected(corner))
    }

    pub fn cancel(&mut self) {
        if !self.phase.is_terminal() {
            self.cancelled = true;
            self.enter(Phase::Cancelled);
        }
    }

    pub fn fail(&mut self, reason: impl Into<String>) {
        if !self.phase.is_terminal() {
            self.enter(Phase::Failed(reason.into()));
        }
    }
}

fn round_trip(n: u32) -> Vec<Command> {
    let Ok(n) = i32::try_from(n) else {
        return Vec::new();
    };
    if n == 0 {
        return Vec::new();
    }
    vec![
        Command::MoveX(n),
        Command::MoveX(-n),
        Command::MoveY(n),
        Command::MoveY(-n),
    ]
}

/// Operator input for a run in progress.
#[derive(Debug)]
pub struct CalibrationControl {
    pub cancel: Arc<AtomicBool>,
    pub corners: xch::Receiver<Corner>,
    /// How often to look at `cancel` while waiting for the operator.
    pub poll: Duration,
}

/// Drive `run` to a terminal phase.
///
/// Cancellation is observed between phases and while waiting for the
/// operator, never during a settle wait. The origin is written only on
/// `Detected`; every other outcome leaves it as it was.
#[allow(clippy::too_many_arguments)]
pub fn run_auto_detect<S: CommandSink, K: Clock>(
    run: &mut CalibrationRun,
    sink: &mut S,
    clock: &K,
    timing: &CalibrationTiming,
    pacing: &PacingConfig,
    control: &CalibrationControl,
    origin: &SharedOrigin,
    log: &LogSink,
) -> Result<Corner> {
    log.info("calibration started");
    while run.phase != Phase::AwaitingOperatorCorner {
        if control.cancel.load(Ordering::SeqCst) {
            return Err(cancelled(run, log));
        }
        let step = run.advance(timing)?;
        log.info(format!("calibration: {}", run.phase));
        for cmd in step.commands {
            if let Err(e) = sink.send(cmd) {
                run.fail(e.to_string());
                log.error(format!("calibration failed: {e}"));
                return Err(e);
            }
            clock.sleep(pacing.estimate(cmd));
        }
        clock.sleep(step.settle);
    }

    log.info(format!(
        "select the origin corner ({})",
        Corner::ALL.map(Corner::label).join(", ")
    ));
    let corner = loop {
        if control.cancel.load(Ordering::SeqCst) {
            return Err(cancelled(run, log));
        }
        match control.corners.recv_timeout(control.poll) {
            Ok(Corner::Unknown) => log.warn("ignoring 'unknown' corner"),
            Ok(c) => break c,
            Err(xch::RecvTimeoutError::Timeout) => {}
            Err(xch::RecvTimeoutError::Disconnected) => return Err(cancelled(run, log)),
        }
    };

    let state = run.confirm(corner)?;
    *origin.write().unwrap_or_else(PoisonError::into_inner) = state;
    tracing::info!(
        %corner,
        elapsed_ms = clock.ms_since(run.started_at),
        "calibration complete"
    );
    log.emit(LogEvent::OriginDetected(corner));
    Ok(corner)
}

fn cancelled(run: &mut CalibrationRun, log: &LogSink) -> PlotterError {
    let during = run.phase.to_string();
    run.cancel();
    log.warn(format!("calibration cancelled during {during}"));
    PlotterError::Cancelled
}

/// Pass-through commands the operator can issue outside a run.
///
/// None of these alter the origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManualCommand {
    Home,
    PenUp,
    PenDown,
    ProbeX,
    ProbeY,
    DirectionTest,
    Telemetry,
    Position,
}

impl From<ManualCommand> for Command {
    fn from(m: ManualCommand) -> Self {
        match m {
            ManualCommand::Home => Command::Home,
            ManualCommand::PenUp => Command::PenUp,
            ManualCommand::PenDown => Command::PenDown,
            ManualCommand::ProbeX => Command::ProbeX,
            ManualCommand::ProbeY => Command::ProbeY,
            ManualCommand::DirectionTest => Command::DirectionTest,
            ManualCommand::Telemetry => Command::Telemetry,
            ManualCommand::Position => Command::Position,
        }
    }
}

impl FromStr for ManualCommand {
    type Err = PlotterError;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "home" => Self::Home,
            "up" | "pen-up" => Self::PenUp,
            "down" | "pen-down" => Self::PenDown,
            "x" | "probe-x" => Self::ProbeX,
            "y" | "probe-y" => Self::ProbeY,
            "test" | "direction-test" => Self::DirectionTest,
            "telemetry" => Self::Telemetry,
            "position" => Self::Position,
            _ => return Err(PlotterError::Format(format!("unknown manual command '{s}'"))),
        })
    }
}

/// A calibration run on its own thread.
///
/// Dropping the handle cancels the run and joins the worker.
pub struct CalibrationHandle {
    cancel: Arc<AtomicBool>,
    corner_tx: Option<xch::Sender<Corner>>,
    phase: PhaseWatch,
    join: Option<JoinHandle<Result<Corner>>>,
}

impl fmt::Debug for CalibrationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CalibrationHandle")
            .field("phase", &self.phase.get())
            .finish_non_exhaustive()
    }
}

impl CalibrationHandle {
    /// Claim the worker slot and start a run.
    #[allow(clippy::too_many_arguments)]
    pub fn spawn<K: Clock + Send + 'static>(
        session: SessionHandle,
        clock: K,
        timing: CalibrationTiming,
        pacing: PacingConfig,
        origin: SharedOrigin,
        flags: &Arc<StatusFlags>,
        log: LogSink,
    ) -> Result<Self> {
        let guard = flags.try_claim(Activity::Calibrating)?;
        let cancel = Arc::new(AtomicBool::new(false));
        let (corner_tx, corners) = xch::bounded(1);
        let control = CalibrationControl {
            cancel: Arc::clone(&cancel),
            corners,
            poll: Duration::from_millis(50),
        };
        let mut run = CalibrationRun::new(clock.now());
        let phase = run.watch();

        let join = std::thread::spawn(move || {
            let _guard = guard;
            let mut sink = session;
            let result = run_auto_detect(
                &mut run, &mut sink, &clock, &timing, &pacing, &control, &origin, &log,
            );
            tracing::debug!(phase = %run.phase(), "calibration worker exiting");
            result
        });

        Ok(Self {
            cancel,
            corner_tx: Some(corner_tx),
            phase,
            join: Some(join),
        })
    }

    pub fn phase(&self) -> Phase {
        self.phase.get()
    }

    pub fn is_awaiting_corner(&self) -> bool {
        self.phase() == Phase::AwaitingOperatorCorner
    }

    pub fn is_finished(&self) -> bool {
        self.join.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Hand the operator's corner to the worker.
    pub fn confirm_corner(&self, corner: Corner) -> Result<()> {
        if corner == Corner::Unknown {
            return Err(PlotterError::InvalidState("corner must be one of the four corners".into()));
        }
        let tx = self
            .corner_tx
            .as_ref()
            .ok_or_else(|| PlotterError::InvalidState("calibration already finished".into()))?;
        tx.try_send(corner).map_err(|e| match e {
            xch::TrySendError::Full(_) => PlotterError::Busy("a corner is already pending"),
            xch::TrySendError::Disconnected(_) => {
                PlotterError::InvalidState("calibration already finished".into())
            }
        })
    }

    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    /// Wait for the run to finish.
    pub fn join(mut self) -> Result<Corner> {
        self.join_inner()
    }

    fn join_inner(&mut self) -> Result<Corner> {
        let Some(join) = self.join.take() else {
            return Err(PlotterError::InvalidState("calibration already joined".into()));
        };
        join.join()
            .unwrap_or_else(|_| Err(PlotterError::InvalidState("calibration worker panicked".into())))
    }
}

impl Drop for CalibrationHandle {
    fn drop(&mut self) {
        if self.join.is_some() {
            self.cancel();
            self.corner_tx.take();
            let _ = self.join_inner();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::RecordingSink;
    use plotter_traits::ManualClock;

    fn control() -> (CalibrationControl, xch::Sender<Corner>) {
        let (tx, rx) = xch::bounded(1);
        (
            CalibrationControl {
                cancel: Arc::new(AtomicBool::new(false)),
                corners: rx,
                poll: Duration::from_millis(1),
            },
            tx,
        )
    }

    #[test]
    fn advance_walks_the_probe_sequence() {
        let timing = CalibrationTiming::default();
        let mut run = CalibrationRun::new(Instant::now());
        assert_eq!(run.advance(&timing).unwrap().commands, [Command::ProbeX]);
        assert_eq!(run.advance(&timing).unwrap().commands, [Command::ProbeY]);
        let step = run.advance(&timing).unwrap();
        assert_eq!(step.commands, [Command::DirectionTest]);
        assert_eq!(step.settle, Duration::from_secs(6));
        assert_eq!(
            run.advance(&timing).unwrap().commands,
            [
                Command::MoveX(200),
                Command::MoveX(-200),
                Command::MoveY(200),
                Command::MoveY(-200)
            ]
        );
        assert_eq!(run.phase(), &Phase::AwaitingOperatorCorner);
        assert!(run.advance(&timing).is_err());
    }

    #[test]
    fn confirm_only_while_awaiting() {
        let mut run = CalibrationRun::new(Instant::now());
        assert!(run.confirm(Corner::TopLeft).is_err());
        let timing = CalibrationTiming::default();
        for _ in 0..4 {
            run.advance(&timing).unwrap();
        }
        assert!(run.confirm(Corner::Unknown).is_err());
        assert_eq!(
            run.confirm(Corner::BottomLeft).unwrap(),
            OriginState::detected(Corner::BottomLeft)
        );
        run.cancel();
        assert_eq!(run.phase(), &Phase::Detected(Corner::BottomLeft));
        assert!(!run.is_cancelled());
    }

    #[test]
    fn full_run_sets_origin_and_paces_round_trip() {
        let clock = ManualClock::new();
        let mut run = CalibrationRun::new(clock.now());
        let mut sink = RecordingSink::default();
        let origin = SharedOrigin::default();
        let (ctl, tx) = control();
        tx.send(Corner::TopRight).unwrap();
        let timing = CalibrationTiming {
            round_trip_steps: 10,
            ..CalibrationTiming::default()
        };
        let corner = run_auto_detect(
            &mut run,
            &mut sink,
            &clock,
            &timing,
            &PacingConfig::default(),
            &ctl,
            &origin,
            &LogSink::disabled(),
        )
        .unwrap();
        assert_eq!(corner, Corner::TopRight);
        assert_eq!(sink.tokens(), ["C", "D", "A", "X10", "X-10", "Y10", "Y-10"]);
        assert_eq!(*origin.read().unwrap(), OriginState::detected(Corner::TopRight));
        // 8 s + 8 s + 6 s settles plus four 10-step moves at 2 ms/step.
        assert_eq!(clock.elapsed(), Duration::from_millis(22_080));
    }

    #[test]
    fn dropped_corner_channel_cancels() {
        let clock = ManualClock::new();
        let mut run = CalibrationRun::new(clock.now());
        let origin = SharedOrigin::default();
        let (ctl, tx) = control();
        drop(tx);
        let err = run_auto_detect(
            &mut run,
            &mut RecordingSink::default(),
            &clock,
            &CalibrationTiming::default(),
            &PacingConfig::default(),
            &ctl,
            &origin,
            &LogSink::disabled(),
        )
        .unwrap_err();
        assert_eq!(err, PlotterError::Cancelled);
        assert_eq!(run.phase(), &Phase::Cancelled);
        assert!(!origin.read().unwrap().detected);
    }

    #[test]
    fn manual_command_names() {
        assert_eq!("x".parse::<ManualCommand>().unwrap(), ManualCommand::ProbeX);
        assert_eq!("Test".parse::<ManualCommand>().unwrap(), ManualCommand::DirectionTest);
        assert_eq!(Command::from(ManualCommand::Position), Command::Position);
        assert!("sideways".parse::<ManualCommand>().is_err());
    }
}
