//! Sending a drawing to the plotter.
//!
//! The whole drawing is encoded up front, so a drawing that cannot be mapped
//! is rejected before anything moves. Commands are then sent one by one,
//! each followed by its estimated duration; the controller never acknowledges
//! moves, so this open-loop pacing is all there is.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

use plotter_traits::Clock;

use crate::command::{Command, CommandSink};
use crate::drawing::Drawing;
use crate::encoder::{MotionState, PacingConfig, TimedCommand, encode};
use crate::error::{PlotterError, Result};
use crate::log::{LogEvent, LogSink};
use crate::mapper::{MachineConfig, OriginState};
use crate::session::SessionHandle;
use crate::status::{Activity, StatusFlags};

#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackOutcome {
    Completed,
    Cancelled,
    Failed(PlotterError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackReport {
    pub outcome: PlaybackOutcome,
    /// Strokes whose closing pen-up was sent.
    pub strokes_done: usize,
    pub commands_sent: usize,
    /// Host-side position after the last command that was sent.
    pub final_state: MotionState,
}

impl PlaybackReport {
    /// `Ok` only for a completed run.
    pub fn into_result(self) -> Result<Self> {
        match &self.outcome {
            PlaybackOutcome::Completed => Ok(self),
            PlaybackOutcome::Cancelled => Err(PlotterError::Cancelled),
            PlaybackOutcome::Failed(e) => Err(e.clone()),
        }
    }
}

/// Everything a playback run needs, captured at request time.
#[derive(Debug, Clone)]
pub struct PlaybackJob {
    pub drawing: Drawing,
    pub origin: OriginState,
    pub config: MachineConfig,
    pub pacing: PacingConfig,
    /// Where the host believes the tool is before the run.
    pub start: MotionState,
}

impl PlaybackJob {
    fn start_after_home(&self) -> MotionState {
        let mut s = self.start;
        if self.pacing.home_before_draw {
            // The pen is lifted before the return travel.
            s.apply(Command::PenUp);
            s.apply(Command::Home);
        }
        s
    }

    /// Encode the drawing without sending anything.
    pub fn plan(&self) -> Result<Vec<TimedCommand>> {
        let mut end = self.start_after_home();
        encode(&self.drawing, &self.origin, &self.config, &self.pacing, &mut end)
    }
}

/// Run `job` to completion, cancellation or the first transport error.
pub fn run_playback<S: CommandSink, K: Clock>(
    job: &PlaybackJob,
    sink: &mut S,
    clock: &K,
    cancel: &AtomicBool,
    log: &LogSink,
) -> PlaybackReport {
    let mut report = PlaybackReport {
        outcome: PlaybackOutcome::Completed,
        strokes_done: 0,
        commands_sent: 0,
        final_state: job.start,
    };
    let plan = match job.plan() {
        Ok(plan) => plan,
        Err(e) => {
            log.error(format!("cannot send drawing: {e}"));
            report.outcome = PlaybackOutcome::Failed(e);
            return report;
        }
    };

    if job.pacing.home_before_draw {
        if report.final_state.pen_down {
            if let Err(e) = sink.send(Command::PenUp) {
                log.error(format!("could not lift pen before homing: {e}"));
                report.outcome = PlaybackOutcome::Failed(e);
                return report;
            }
            report.commands_sent += 1;
            report.final_state.apply(Command::PenUp);
            clock.sleep(job.pacing.pen_settle);
        }
        if let Err(e) = sink.send(Command::Home) {
            log.error(format!("homing failed: {e}"));
            report.outcome = PlaybackOutcome::Failed(e);
            return report;
        }
        report.commands_sent += 1;
        report.final_state.apply(Command::Home);
        clock.sleep(job.pacing.home_settle);
    }

    let strokes = job.drawing.len();
    let total = plan.len();
    log.info(format!("sending {strokes} strokes ({total} commands)"));
    for (i, step) in plan.iter().enumerate() {
        if cancel.load(Ordering::SeqCst) {
            report.outcome = PlaybackOutcome::Cancelled;
            break;
        }
        if let Err(e) = sink.send(step.command) {
            log.error(format!("drawing aborted after {} commands: {e}", report.commands_sent));
            report.outcome = PlaybackOutcome::Failed(e);
            return report;
        }
        report.commands_sent += 1;
        report.final_state.apply(step.command);
        if plan.get(i + 1).is_none_or(|next| next.stroke != step.stroke) {
            report.strokes_done = step.stroke + 1;
        }
        log.emit(LogEvent::Progress {
            stroke: step.stroke,
            strokes,
            sent: i + 1,
            total,
        });
        clock.sleep(step.duration);
    }

    if report.outcome == PlaybackOutcome::Cancelled {
        if report.final_state.pen_down {
            match sink.send(Command::PenUp) {
                Ok(()) => {
                    report.commands_sent += 1;
                    report.final_state.apply(Command::PenUp);
                }
                Err(e) => log.warn(format!("could not lift pen after cancel: {e}")),
            }
        }
        log.warn(format!(
            "drawing cancelled after {} of {strokes} strokes",
            report.strokes_done
        ));
    } else {
        log.info(format!("drawing sent ({strokes} strokes)"));
    }
    report
}

/// A playback run on its own thread. Dropping the handle cancels and joins it.
#[derive(Debug)]
pub struct PlaybackHandle {
    cancel: Arc<AtomicBool>,
    join: Option<JoinHandle<PlaybackReport>>,
}

impl PlaybackHandle {
    /// Validate `job` on the calling thread, claim the worker slot and start.
    pub fn spawn<K: Clock + Send + 'static>(
        session: SessionHandle,
        job: PlaybackJob,
        clock: K,
        flags: &Arc<StatusFlags>,
        log: LogSink,
    ) -> Result<Self> {
        if job.drawing.is_empty() {
            return Err(PlotterError::EmptyDrawing);
        }
        job.plan()?;
        let guard = flags.try_claim(Activity::Drawing)?;
        let cancel = Arc::new(AtomicBool::new(false));
        let worker_cancel = Arc::clone(&cancel);

        let join = std::thread::spawn(move || {
            let _guard = guard;
            let mut sink = session;
            let report = run_playback(&job, &mut sink, &clock, &worker_cancel, &log);
            tracing::debug!(
                outcome = ?report.outcome,
                sent = report.commands_sent,
                "playback worker exiting"
            );
            report
        });
        Ok(Self {
            cancel,
            join: Some(join),
        })
    }

    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    pub fn is_finished(&self) -> bool {
        self.join.as_ref().is_none_or(JoinHandle::is_finished)
    }

    pub fn join(mut self) -> PlaybackReport {
        self.join_inner()
    }

    fn join_inner(&mut self) -> PlaybackReport {
        let panicked = || PlaybackReport {
            outcome: PlaybackOutcome::Failed(PlotterError::InvalidState(
                "playback worker panicked".into(),
            )),
            strokes_done: 0,
            commands_sent: 0,
            final_state: MotionState::default(),
        };
        match self.join.take() {
            Some(join) => join.join().unwrap_or_else(|_| panicked()),
            None => panicked(),
        }
    }
}

impl Drop for PlaybackHandle {
    fn drop(&mut self) {
        if self.join.is_some() {
            self.cancel();
            let _ = self.join_inner();
        }
    }
}
