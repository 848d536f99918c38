//! Application state: one owner for everything the operator can touch.
//!
//! `App` holds the machine settings, the shared origin, the drawing being
//! captured, the open session and at most one background worker. Workers get
//! copies of what they need at start, so later edits here never affect a run
//! in flight.

use std::path::Path;
use std::sync::{Arc, PoisonError};

use plotter_traits::{Clock, Connector, MonotonicClock};

use crate::calibration::{CalibrationHandle, CalibrationTiming, ManualCommand, Phase};
use crate::command::Command;
use crate::drawing::{Drawing, Sample, StrokeBuilder};
use crate::encoder::{MotionState, PacingConfig, TimedCommand};
use crate::error::{PlotterError, Result};
use crate::log::{LogEvent, LogSink};
use crate::mapper::{Corner, MachineConfig, OriginState, SharedOrigin};
use crate::playback::{PlaybackHandle, PlaybackJob, PlaybackReport};
use crate::session::{Session, SessionOptions};
use crate::status::{StatusFlags, StatusSnapshot};

/// Everything configurable about a run, already validated.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Settings {
    pub machine: MachineConfig,
    pub pacing: PacingConfig,
    pub timing: CalibrationTiming,
    pub session: SessionOptions,
    pub origin: OriginState,
}

/// Operator edit of the machine geometry. `None` keeps the current value.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ConfigUpdate {
    pub steps_per_mm: Option<f64>,
    pub work_area_width_mm: Option<f64>,
    pub work_area_height_mm: Option<f64>,
    pub input_width: Option<f64>,
    pub input_height: Option<f64>,
}

pub struct App<K = MonotonicClock> {
    // Workers are declared before the session so they stop before it closes.
    playback: Option<PlaybackHandle>,
    calibration: Option<CalibrationHandle>,
    session: Option<Session>,
    machine: MachineConfig,
    pacing: PacingConfig,
    timing: CalibrationTiming,
    session_options: SessionOptions,
    origin: SharedOrigin,
    drawing: Drawing,
    stroke: Option<StrokeBuilder>,
    motion: MotionState,
    last_report: Option<PlaybackReport>,
    flags: Arc<StatusFlags>,
    log: LogSink,
    clock: K,
}

impl<K> std::fmt::Debug for App<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("machine", &self.machine)
            .field("origin", &self.origin())
            .field("strokes", &self.drawing.len())
            .field("status", &self.flags.snapshot())
            .finish_non_exhaustive()
    }
}

impl App<MonotonicClock> {
    pub fn new(settings: Settings, log: LogSink) -> Self {
        Self::with_clock(settings, log, MonotonicClock)
    }
}

impl<K> App<K> {
    pub fn origin(&self) -> OriginState {
        *self.origin.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<K: Clock + Clone + Send + 'static> App<K> {
    pub fn with_clock(settings: Settings, log: LogSink, clock: K) -> Self {
        Self {
            playback: None,
            calibration: None,
            session: None,
            machine: settings.machine,
            pacing: settings.pacing,
            timing: settings.timing,
            session_options: settings.session,
            origin: Arc::new(std::sync::RwLock::new(settings.origin)),
            drawing: Drawing::new(),
            stroke: None,
            motion: MotionState::default(),
            last_report: None,
            flags: StatusFlags::new(),
            log,
            clock,
        }
    }

    // ── Link ─────────────────────────────────────────────────────────────────

    /// Open `port_id`, replacing any open session.
    pub fn connect<C: Connector + ?Sized>(&mut self, connector: &C, port_id: &str) -> Result<()> {
        self.disconnect();
        match Session::open(
            connector,
            port_id,
            &self.session_options,
            self.log.clone(),
            Arc::clone(&self.flags),
        ) {
            Ok(session) => {
                self.session = Some(session);
                self.motion = MotionState::default();
                Ok(())
            }
            Err(e) => {
                self.log.error(format!("cannot open {port_id}: {e}"));
                Err(e)
            }
        }
    }

    /// Stop any worker and close the session. No-op when not connected.
    pub fn disconnect(&mut self) {
        self.stop_workers();
        if let Some(mut session) = self.session.take() {
            session.close();
        }
    }

    pub fn is_connected(&self) -> bool {
        self.session.as_ref().is_some_and(Session::is_connected)
    }

    pub fn port(&self) -> Option<&str> {
        self.session.as_ref().map(Session::port)
    }

    fn session(&self) -> Result<&Session> {
        match &self.session {
            Some(s) if s.is_connected() => Ok(s),
            _ => Err(PlotterError::Transport("not connected".into())),
        }
    }

    // ── Capture ──────────────────────────────────────────────────────────────

    /// Start a new stroke at an input-space point. An unfinished stroke is
    /// ended first.
    pub fn begin_stroke(&mut self, px: f64, py: f64) {
        self.end_stroke();
        let sample = Sample::capture(px, py, &self.origin(), &self.machine);
        self.stroke = Some(StrokeBuilder::begin(sample));
    }

    pub fn extend_stroke(&mut self, px: f64, py: f64) -> Result<()> {
        let sample = Sample::capture(px, py, &self.origin(), &self.machine);
        let builder = self
            .stroke
            .as_mut()
            .ok_or_else(|| PlotterError::InvalidState("no stroke in progress".into()))?;
        builder.extend(sample);
        Ok(())
    }

    /// Commit the stroke in progress. Returns false if there was none.
    pub fn end_stroke(&mut self) -> bool {
        match self.stroke.take() {
            Some(builder) => {
                self.drawing.push(builder.finish());
                true
            }
            None => false,
        }
    }

    pub fn clear_drawing(&mut self) {
        self.stroke = None;
        self.drawing.clear();
        self.log.info("drawing cleared");
    }

    pub fn drawing(&self) -> &Drawing {
        &self.drawing
    }

    pub fn set_drawing(&mut self, drawing: Drawing) {
        self.stroke = None;
        self.drawing = drawing;
    }

    // ── Configuration ────────────────────────────────────────────────────────

    pub fn machine(&self) -> &MachineConfig {
        &self.machine
    }

    pub fn pacing(&self) -> &PacingConfig {
        &self.pacing
    }

    pub fn set_pacing(&mut self, pacing: PacingConfig) {
        self.pacing = pacing;
    }

    pub fn set_timing(&mut self, timing: CalibrationTiming) {
        self.timing = timing;
    }

    /// Apply an operator edit. An invalid result is rejected whole and the
    /// current geometry is kept.
    pub fn update_config(&mut self, update: &ConfigUpdate) -> Result<()> {
        let m = &self.machine;
        let next = MachineConfig::new(
            update.steps_per_mm.unwrap_or(m.steps_per_mm()),
            update.work_area_width_mm.unwrap_or(m.work_area_width_mm()),
            update.work_area_height_mm.unwrap_or(m.work_area_height_mm()),
            update.input_width.unwrap_or(m.input_width()),
            update.input_height.unwrap_or(m.input_height()),
        );
        match next {
            Ok(cfg) => {
                self.machine = cfg;
                tracing::info!(steps_per_mm = cfg.steps_per_mm(), "machine config updated");
                Ok(())
            }
            Err(e) => {
                self.log.warn(format!("config update rejected: {e}"));
                Err(e)
            }
        }
    }

    /// Steps-per-mm as typed by the operator.
    pub fn set_steps_per_mm_text(&mut self, text: &str) -> Result<()> {
        let v: f64 = text.trim().parse().map_err(|_| {
            let e = PlotterError::InvalidConfig(format!("steps_per_mm '{text}' is not a number"));
            self.log.warn(format!("config update rejected: {e}"));
            e
        })?;
        self.update_config(&ConfigUpdate {
            steps_per_mm: Some(v),
            ..ConfigUpdate::default()
        })
    }

    // ── Origin ───────────────────────────────────────────────────────────────

    /// Record an origin found elsewhere (e.g. persisted from an earlier run).
    pub fn set_origin(&mut self, origin: OriginState) {
        *self.origin.write().unwrap_or_else(PoisonError::into_inner) = origin;
        if origin.detected {
            self.log.emit(LogEvent::OriginDetected(origin.corner));
        }
    }

    /// Recompute the physical coordinates of every captured sample.
    pub fn remap_drawing(&mut self) -> Result<()> {
        self.drawing.remap(&self.origin(), &self.machine)?;
        self.log.info(format!("drawing remapped to {}", self.origin().corner));
        Ok(())
    }

    // ── Workers ──────────────────────────────────────────────────────────────

    fn job(&self) -> PlaybackJob {
        PlaybackJob {
            drawing: self.drawing.clone(),
            origin: self.origin(),
            config: self.machine,
            pacing: self.pacing,
            start: self.motion,
        }
    }

    /// Encode the current drawing without sending it.
    pub fn plan(&self) -> Result<Vec<TimedCommand>> {
        self.job().plan()
    }

    /// Start sending the drawing on a worker thread.
    pub fn send_drawing(&mut self) -> Result<()> {
        self.reap();
        if self.drawing.is_empty() {
            self.log.warn("nothing to send: drawing is empty");
            return Err(PlotterError::EmptyDrawing);
        }
        let handle = self.session()?.handle();
        let playback = PlaybackHandle::spawn(
            handle,
            self.job(),
            self.clock.clone(),
            &self.flags,
            self.log.clone(),
        )
        .inspect_err(|e| self.log.error(format!("cannot send drawing: {e}")))?;
        self.playback = Some(playback);
        Ok(())
    }

    /// Block until the current playback ends and return its report.
    pub fn wait_playback(&mut self) -> Option<PlaybackReport> {
        let report = self.playback.take()?.join();
        self.motion = report.final_state;
        self.last_report = Some(report.clone());
        Some(report)
    }

    pub fn last_report(&self) -> Option<&PlaybackReport> {
        self.last_report.as_ref()
    }

    /// Start corner detection on a worker thread.
    pub fn start_calibration(&mut self) -> Result<()> {
        self.reap();
        let handle = self.session()?.handle();
        let cal = CalibrationHandle::spawn(
            handle,
            self.clock.clone(),
            self.timing,
            self.pacing,
            Arc::clone(&self.origin),
            &self.flags,
            self.log.clone(),
        )?;
        self.calibration = Some(cal);
        Ok(())
    }

    pub fn calibration_phase(&self) -> Option<Phase> {
        self.calibration.as_ref().map(CalibrationHandle::phase)
    }

    pub fn confirm_corner(&self, corner: Corner) -> Result<()> {
        self.calibration
            .as_ref()
            .ok_or_else(|| PlotterError::InvalidState("no calibration running".into()))?
            .confirm_corner(corner)
    }

    /// Block until the calibration run ends.
    pub fn wait_calibration(&mut self) -> Option<Result<Corner>> {
        let result = self.calibration.take()?.join();
        if result.is_ok() {
            // The probes moved the head; position is whatever the device reports.
            self.motion = MotionState::default();
        }
        Some(result)
    }

    /// Ask the running worker, if any, to stop.
    pub fn cancel(&self) {
        if let Some(p) = &self.playback {
            p.cancel();
        }
        if let Some(c) = &self.calibration {
            c.cancel();
        }
    }

    fn stop_workers(&mut self) {
        self.cancel();
        if self.playback.is_some() {
            let _ = self.wait_playback();
        }
        if let Some(c) = self.calibration.take() {
            let _ = c.join();
        }
    }

    /// Collect finished workers.
    fn reap(&mut self) {
        if self.playback.as_ref().is_some_and(PlaybackHandle::is_finished) {
            let _ = self.wait_playback();
        }
        if self.calibration.as_ref().is_some_and(CalibrationHandle::is_finished) {
            let _ = self.wait_calibration();
        }
    }

    /// Send one pass-through command. Refused while a worker runs.
    pub fn manual(&mut self, cmd: ManualCommand) -> Result<()> {
        self.reap();
        if self.flags.is_busy() {
            return Err(PlotterError::Busy("a worker is using the link"));
        }
        let cmd = Command::from(cmd);
        self.session()?.send(cmd)?;
        self.motion.apply(cmd);
        Ok(())
    }

    // ── Files ────────────────────────────────────────────────────────────────

    pub fn save_drawing(&self, path: &Path) -> Result<()> {
        if self.drawing.is_empty() {
            self.log.warn("nothing to save: drawing is empty");
            return Err(PlotterError::EmptyDrawing);
        }
        self.drawing.save(path)?;
        self.log.info(format!("saved {} strokes to {}", self.drawing.len(), path.display()));
        Ok(())
    }

    /// Replace the drawing with one read from `path`. Physical coordinates
    /// are taken as stored; see [`remap_drawing`](Self::remap_drawing).
    pub fn load_drawing(&mut self, path: &Path) -> Result<()> {
        let drawing = Drawing::load(path)?;
        let unmapped = drawing.unmapped_count();
        if unmapped > 0 {
            self.log.warn(format!(
                "{unmapped} samples have no physical coordinates; remap before sending"
            ));
        }
        self.log.info(format!("loaded {} strokes from {}", drawing.len(), path.display()));
        self.set_drawing(drawing);
        Ok(())
    }

    // ── Status ───────────────────────────────────────────────────────────────

    pub fn status(&self) -> StatusSnapshot {
        self.flags.snapshot()
    }

    pub fn motion(&self) -> MotionState {
        self.motion
    }

    pub fn log(&self) -> &LogSink {
        &self.log
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plotter_hardware::SimulatedPlotter;
    use std::time::Duration;

    fn settings() -> Settings {
        Settings {
            pacing: PacingConfig::immediate(),
            session: SessionOptions {
                open_settle: Duration::ZERO,
                poll_interval: Duration::from_millis(1),
            },
            ..Settings::default()
        }
    }

    #[test]
    fn strokes_capture_under_current_origin() {
        let mut app = App::new(settings(), LogSink::disabled());
        app.begin_stroke(0.0, 0.0);
        app.extend_stroke(40.0, 0.0).unwrap();
        assert!(app.end_stroke());
        assert!(!app.end_stroke());
        assert!(app.extend_stroke(1.0, 1.0).is_err());
        assert_eq!(app.drawing().unmapped_count(), 2);

        app.set_origin(OriginState::detected(Corner::TopLeft));
        app.begin_stroke(4.0, 4.0);
        app.begin_stroke(8.0, 8.0);
        app.end_stroke();
        assert_eq!(app.drawing().len(), 3);
        assert_eq!(app.drawing().unmapped_count(), 2);
        app.remap_drawing().unwrap();
        assert_eq!(app.drawing().unmapped_count(), 0);
    }

    #[test]
    fn rejected_update_keeps_previous_config() {
        let mut app = App::new(settings(), LogSink::disabled());
        let before = *app.machine();
        assert!(app.set_steps_per_mm_text("fast").is_err());
        assert!(app
            .update_config(&ConfigUpdate {
                steps_per_mm: Some(-3.0),
                ..ConfigUpdate::default()
            })
            .is_err());
        assert_eq!(*app.machine(), before);
        app.set_steps_per_mm_text(" 80 ").unwrap();
        assert_eq!(app.machine().steps_per_mm(), 80.0);
    }

    #[test]
    fn operations_need_a_link() {
        let mut app = App::new(settings(), LogSink::disabled());
        app.set_origin(OriginState::detected(Corner::TopLeft));
        assert!(matches!(app.manual(ManualCommand::Home), Err(PlotterError::Transport(_))));
        assert!(matches!(app.start_calibration(), Err(PlotterError::Transport(_))));
        assert_eq!(app.send_drawing(), Err(PlotterError::EmptyDrawing));
        app.begin_stroke(1.0, 1.0);
        app.end_stroke();
        assert!(matches!(app.send_drawing(), Err(PlotterError::Transport(_))));
    }

    #[test]
    fn manual_commands_pass_through() {
        let sim = SimulatedPlotter::new();
        let mut app = App::new(settings(), LogSink::disabled());
        app.connect(&sim, "sim").unwrap();
        assert!(app.status().connected);
        app.manual(ManualCommand::ProbeX).unwrap();
        app.manual(ManualCommand::PenDown).unwrap();
        assert!(app.motion().pen_down);
        assert_eq!(sim.received(), ["C", "B"]);
        assert!(!app.origin().detected);
        app.disconnect();
        assert!(!app.status().connected);
    }
}
