//! Drawing → controller command stream.
//!
//! Per stroke: travel to the first sample with the pen up, lower the pen,
//! visit each following sample, lift the pen. Axis moves are relative, X
//! before Y, and zero deltas are never emitted.

use std::time::Duration;

use crate::command::Command;
use crate::drawing::Drawing;
use crate::error::{PlotterError, Result};
use crate::mapper::{MachineConfig, OriginState};
use crate::quantize::{delta, to_steps};
use crate::util::{scale_duration, total};

/// Fixed timing assumptions about the controller; it never acknowledges moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacingConfig {
    pub step_duration: Duration,
    pub pen_settle: Duration,
    pub home_settle: Duration,
    /// Send `H` and wait `home_settle` before each playback.
    pub home_before_draw: bool,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            step_duration: Duration::from_millis(2),
            pen_settle: Duration::from_millis(300),
            home_settle: Duration::from_secs(2),
            home_before_draw: true,
        }
    }
}

impl PacingConfig {
    /// Pacing with every wait set to zero. Useful for simulations.
    pub fn immediate() -> Self {
        Self {
            step_duration: Duration::ZERO,
            pen_settle: Duration::ZERO,
            home_settle: Duration::ZERO,
            home_before_draw: false,
        }
    }

    /// How long the controller is assumed to be busy after `cmd`.
    pub fn estimate(&self, cmd: Command) -> Duration {
        match cmd {
            Command::MoveX(n) | Command::MoveY(n) => {
                scale_duration(self.step_duration, u64::from(n.unsigned_abs()))
            }
            Command::PenUp | Command::PenDown => self.pen_settle,
            Command::Home => self.home_settle,
            Command::ProbeX
            | Command::ProbeY
            | Command::DirectionTest
            | Command::Telemetry
            | Command::Position => Duration::ZERO,
        }
    }
}

/// Where the host believes the tool is. Updated as commands are issued, not
/// as the device confirms them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MotionState {
    pub x_steps: i32,
    pub y_steps: i32,
    pub pen_down: bool,
}

impl MotionState {
    pub fn at(x_steps: i32, y_steps: i32) -> Self {
        Self {
            x_steps,
            y_steps,
            pen_down: false,
        }
    }

    /// Track the effect of a sent command.
    pub fn apply(&mut self, cmd: Command) {
        match cmd {
            Command::MoveX(n) => self.x_steps = self.x_steps.saturating_add(n),
            Command::MoveY(n) => self.y_steps = self.y_steps.saturating_add(n),
            Command::PenDown => self.pen_down = true,
            Command::PenUp => self.pen_down = false,
            Command::Home => {
                self.x_steps = 0;
                self.y_steps = 0;
            }
            _ => {}
        }
    }
}

/// A command plus the time to wait after sending it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimedCommand {
    pub command: Command,
    pub duration: Duration,
    /// Index of the stroke this command belongs to.
    pub stroke: usize,
}

struct Emitter<'a> {
    out: Vec<TimedCommand>,
    state: MotionState,
    pacing: &'a PacingConfig,
    stroke: usize,
}

impl Emitter<'_> {
    fn push(&mut self, command: Command) {
        self.state.apply(command);
        self.out.push(TimedCommand {
            command,
            duration: self.pacing.estimate(command),
            stroke: self.stroke,
        });
    }

    fn move_to(&mut self, x: i32, y: i32) {
        let dx = delta(x, self.state.x_steps);
        if dx != 0 {
            self.push(Command::MoveX(dx));
        }
        let dy = delta(y, self.state.y_steps);
        if dy != 0 {
            self.push(Command::MoveY(dy));
        }
    }
}

/// Encode every stroke of `drawing` into timed commands.
///
/// Nothing is produced and `state` is left untouched unless the origin is
/// detected and every sample carries physical coordinates. On success `state`
/// holds the planned final position.
pub fn encode(
    drawing: &Drawing,
    origin: &OriginState,
    config: &MachineConfig,
    pacing: &PacingConfig,
    state: &mut MotionState,
) -> Result<Vec<TimedCommand>> {
    if drawing.is_empty() {
        return Ok(Vec::new());
    }
    origin.require()?;

    let spm = config.steps_per_mm();
    let mut targets = Vec::with_capacity(drawing.len());
    for stroke in drawing.strokes() {
        let steps = stroke
            .samples()
            .iter()
            .map(|s| {
                s.physical()
                    .map(|(x, y)| (to_steps(x, spm), to_steps(y, spm)))
                    .ok_or(PlotterError::OriginNotCalibrated)
            })
            .collect::<Result<Vec<_>>>()?;
        targets.push(steps);
    }

    let mut em = Emitter {
        out: Vec::with_capacity(drawing.sample_count() * 2 + drawing.len() * 3),
        state: *state,
        pacing,
        stroke: 0,
    };
    for (index, points) in targets.iter().enumerate() {
        em.stroke = index;
        let Some((&(x0, y0), rest)) = points.split_first() else {
            continue;
        };
        if em.state.pen_down {
            em.push(Command::PenUp);
        }
        em.move_to(x0, y0);
        em.push(Command::PenDown);
        for &(x, y) in rest {
            em.move_to(x, y);
        }
        em.push(Command::PenUp);
    }

    tracing::debug!(
        strokes = drawing.len(),
        commands = em.out.len(),
        end_x = em.state.x_steps,
        end_y = em.state.y_steps,
        "drawing encoded"
    );
    *state = em.state;
    Ok(em.out)
}

/// Total estimated run time of an encoded plan.
pub fn estimated_duration(plan: &[TimedCommand]) -> Duration {
    total(plan.iter().map(|c| c.duration))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drawing::{Sample, Stroke};
    use crate::mapper::Corner;

    fn stroke(points: &[(f64, f64)]) -> Stroke {
        let samples: Vec<Sample> = points
            .iter()
            .map(|&(x, y)| Sample::with_physical(x, y, x, y))
            .collect();
        Stroke::try_from(samples).unwrap()
    }

    fn tokens(plan: &[TimedCommand]) -> Vec<String> {
        plan.iter().map(|c| c.command.to_string()).collect()
    }

    fn origin() -> OriginState {
        OriginState::detected(Corner::TopLeft)
    }

    #[test]
    fn zero_delta_still_lowers_pen() {
        let cfg = MachineConfig::new(10.0, 150.0, 150.0, 600.0, 600.0).unwrap();
        let d = Drawing::from(vec![stroke(&[(12.0, -4.0)])]);
        let mut st = MotionState::at(120, -40);
        let plan = encode(&d, &origin(), &cfg, &PacingConfig::default(), &mut st).unwrap();
        assert_eq!(tokens(&plan), ["B", "U"]);
        assert_eq!(st, MotionState::at(120, -40));
    }

    #[test]
    fn travel_lifts_a_lowered_pen_first() {
        let cfg = MachineConfig::new(10.0, 150.0, 150.0, 600.0, 600.0).unwrap();
        let d = Drawing::from(vec![stroke(&[(1.0, 2.0), (1.0, 3.0)])]);
        let mut st = MotionState {
            x_steps: 0,
            y_steps: 0,
            pen_down: true,
        };
        let plan = encode(&d, &origin(), &cfg, &PacingConfig::default(), &mut st).unwrap();
        assert_eq!(tokens(&plan), ["U", "X10", "Y20", "B", "Y10", "U"]);
        assert_eq!(st, MotionState::at(10, 30));
    }

    #[test]
    fn durations_and_stroke_indices() {
        let cfg = MachineConfig::new(10.0, 150.0, 150.0, 600.0, 600.0).unwrap();
        let d = Drawing::from(vec![stroke(&[(0.0, 0.0)]), stroke(&[(-1.0, 0.0)])]);
        let pacing = PacingConfig::default();
        let mut st = MotionState::default();
        let plan = encode(&d, &origin(), &cfg, &pacing, &mut st).unwrap();
        assert_eq!(tokens(&plan), ["B", "U", "X-10", "B", "U"]);
        assert_eq!(plan[2].duration, Duration::from_millis(20));
        assert_eq!(plan[0].duration, pacing.pen_settle);
        assert_eq!(
            plan.iter().map(|c| c.stroke).collect::<Vec<_>>(),
            [0, 0, 1, 1, 1]
        );
        assert_eq!(estimated_duration(&plan), Duration::from_millis(1220));
    }

    #[test]
    fn unmapped_sample_fails_without_touching_state() {
        let cfg = MachineConfig::default();
        let mixed = Stroke::try_from(vec![
            Sample::with_physical(0.0, 0.0, 0.0, 0.0),
            Sample::new(5.0, 5.0),
        ])
        .unwrap();
        let d = Drawing::from(vec![mixed]);
        let mut st = MotionState::at(7, 7);
        assert_eq!(
            encode(&d, &origin(), &cfg, &PacingConfig::default(), &mut st),
            Err(PlotterError::OriginNotCalibrated)
        );
        assert_eq!(
            encode(
                &Drawing::from(vec![stroke(&[(1.0, 1.0)])]),
                &OriginState::unknown(),
                &cfg,
                &PacingConfig::default(),
                &mut st
            ),
            Err(PlotterError::OriginNotCalibrated)
        );
        assert_eq!(st, MotionState::at(7, 7));
    }

    #[test]
    fn empty_drawing_yields_no_commands() {
        let mut st = MotionState::default();
        let plan = encode(
            &Drawing::new(),
            &OriginState::unknown(),
            &MachineConfig::default(),
            &PacingConfig::default(),
            &mut st,
        )
        .unwrap();
        assert!(plan.is_empty());
    }

    #[test]
    fn home_resets_position_but_not_pen() {
        let mut st = MotionState {
            x_steps: 5,
            y_steps: -3,
            pen_down: true,
        };
        st.apply(Command::Home);
        assert_eq!((st.x_steps, st.y_steps, st.pen_down), (0, 0, true));
        st.apply(Command::Telemetry);
        st.apply(Command::PenUp);
        assert!(!st.pen_down);
    }
}
