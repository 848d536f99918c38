//! `From`/`TryFrom` implementations bridging `plotter_config` types to
//! `plotter_core` types.

use std::time::Duration;

use crate::app::Settings;
use crate::calibration::CalibrationTiming;
use crate::encoder::PacingConfig;
use crate::error::PlotterError;
use crate::mapper::{Corner, MachineConfig, OriginState};
use crate::session::SessionOptions;

// ── MachineCfg ───────────────────────────────────────────────────────────────

impl TryFrom<&plotter_config::MachineCfg> for MachineConfig {
    type Error = PlotterError;

    fn try_from(c: &plotter_config::MachineCfg) -> Result<Self, Self::Error> {
        MachineConfig::new(
            c.steps_per_mm,
            c.work_area_width_mm,
            c.work_area_height_mm,
            c.input_width,
            c.input_height,
        )
    }
}

// ── PacingCfg ────────────────────────────────────────────────────────────────

impl From<&plotter_config::PacingCfg> for PacingConfig {
    fn from(c: &plotter_config::PacingCfg) -> Self {
        Self {
            step_duration: Duration::from_micros(c.step_us),
            pen_settle: Duration::from_millis(c.pen_settle_ms),
            home_settle: Duration::from_millis(c.home_settle_ms),
            home_before_draw: c.home_before_draw,
        }
    }
}

// ── CalibrationCfg ───────────────────────────────────────────────────────────

impl From<&plotter_config::CalibrationCfg> for CalibrationTiming {
    fn from(c: &plotter_config::CalibrationCfg) -> Self {
        Self {
            probe_x_settle: Duration::from_millis(c.probe_x_settle_ms),
            probe_y_settle: Duration::from_millis(c.probe_y_settle_ms),
            direction_test_settle: Duration::from_millis(c.direction_test_settle_ms),
            round_trip_steps: c.round_trip_steps,
        }
    }
}

// ── SerialCfg ────────────────────────────────────────────────────────────────

impl From<&plotter_config::SerialCfg> for SessionOptions {
    fn from(c: &plotter_config::SerialCfg) -> Self {
        Self {
            open_settle: Duration::from_millis(c.open_settle_ms),
            poll_interval: Duration::from_millis(c.poll_ms.max(1)),
        }
    }
}

// ── Origin ───────────────────────────────────────────────────────────────────

impl From<plotter_config::CornerCfg> for Corner {
    fn from(c: plotter_config::CornerCfg) -> Self {
        match c {
            plotter_config::CornerCfg::TopLeft => Corner::TopLeft,
            plotter_config::CornerCfg::TopRight => Corner::TopRight,
            plotter_config::CornerCfg::BottomLeft => Corner::BottomLeft,
            plotter_config::CornerCfg::BottomRight => Corner::BottomRight,
        }
    }
}

impl TryFrom<Corner> for plotter_config::CornerCfg {
    type Error = PlotterError;

    fn try_from(c: Corner) -> Result<Self, Self::Error> {
        match c {
            Corner::TopLeft => Ok(Self::TopLeft),
            Corner::TopRight => Ok(Self::TopRight),
            Corner::BottomLeft => Ok(Self::BottomLeft),
            Corner::BottomRight => Ok(Self::BottomRight),
            Corner::Unknown => Err(PlotterError::OriginNotCalibrated),
        }
    }
}

impl From<&plotter_config::OriginCfg> for OriginState {
    fn from(c: &plotter_config::OriginCfg) -> Self {
        c.corner
            .map_or_else(OriginState::unknown, |corner| OriginState::detected(corner.into()))
    }
}

// ── Config ───────────────────────────────────────────────────────────────────

impl TryFrom<&plotter_config::Config> for Settings {
    type Error = PlotterError;

    fn try_from(c: &plotter_config::Config) -> Result<Self, Self::Error> {
        Ok(Self {
            machine: MachineConfig::try_from(&c.machine)?,
            pacing: PacingConfig::from(&c.pacing),
            timing: CalibrationTiming::from(&c.calibration),
            session: SessionOptions::from(&c.serial),
            origin: OriginState::from(&c.origin),
        })
    }
}
