#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema for the plotter control stack.
//!
//! - `Config` and its sections are deserialized from TOML; every section is
//!   optional and falls back to the defaults of the reference machine
//!   (51.2 steps/mm, 150 x 150 mm work area, 600 x 600 input surface).
//! - `Config::validate` rejects values the core cannot work with.
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MachineCfg {
    /// Motor resolution. 4096 steps over 80 mm on the reference machine.
    pub steps_per_mm: f64,
    pub work_area_width_mm: f64,
    pub work_area_height_mm: f64,
    /// Size of the input surface strokes are captured on (pixels or any unit).
    pub input_width: f64,
    pub input_height: f64,
}

impl Default for MachineCfg {
    fn default() -> Self {
        Self {
            steps_per_mm: 51.2,
            work_area_width_mm: 150.0,
            work_area_height_mm: 150.0,
            input_width: 600.0,
            input_height: 600.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SerialCfg {
    /// Default endpoint; the CLI `--port` flag takes precedence.
    pub port: Option<String>,
    pub baud: u32,
    /// Wait after opening the port; the controller resets on connect.
    pub open_settle_ms: u64,
    /// Reader sleep between empty polls.
    pub poll_ms: u64,
    /// Per-read timeout of the serial handle.
    pub read_timeout_ms: u64,
}

impl Default for SerialCfg {
    fn default() -> Self {
        Self {
            port: None,
            baud: 115_200,
            open_settle_ms: 2000,
            poll_ms: 100,
            read_timeout_ms: 100,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PacingCfg {
    /// Estimated time per motor step (microseconds).
    pub step_us: u64,
    /// Wait after a pen up/down command.
    pub pen_settle_ms: u64,
    /// Wait after a return-to-origin command.
    pub home_settle_ms: u64,
    /// Send `H` before streaming a drawing.
    pub home_before_draw: bool,
}

impl Default for PacingCfg {
    fn default() -> Self {
        Self {
            step_us: 2000,
            pen_settle_ms: 300,
            home_settle_ms: 2000,
            home_before_draw: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CalibrationCfg {
    pub probe_x_settle_ms: u64,
    pub probe_y_settle_ms: u64,
    pub direction_test_settle_ms: u64,
    /// Length of the round-trip moves shown to the operator before the corner prompt.
    pub round_trip_steps: u32,
}

impl Default for CalibrationCfg {
    fn default() -> Self {
        Self {
            probe_x_settle_ms: 8000,
            probe_y_settle_ms: 8000,
            direction_test_settle_ms: 6000,
            round_trip_steps: 200,
        }
    }
}

/// Corner of the work area the controller treats as (0, 0).
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum CornerCfg {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

impl CornerCfg {
    /// The spelling used in the `[origin] corner` key.
    pub const fn as_str(self) -> &'static str {
        match self {
            CornerCfg::TopLeft => "top-left",
            CornerCfg::TopRight => "top-right",
            CornerCfg::BottomLeft => "bottom-left",
            CornerCfg::BottomRight => "bottom-right",
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct OriginCfg {
    /// Result of an earlier auto-detect run; absent means "not calibrated".
    pub corner: Option<CornerCfg>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub machine: MachineCfg,
    pub serial: SerialCfg,
    pub pacing: PacingCfg,
    pub calibration: CalibrationCfg,
    pub origin: OriginCfg,
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Read, parse and validate a config file.
pub fn load_file(path: &Path) -> eyre::Result<Config> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| eyre::eyre!("read config {:?}: {}", path, e))?;
    let cfg = load_toml(&text).map_err(|e| eyre::eyre!("parse config {:?}: {}", path, e))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Return `text` with `[origin] corner` set to `corner`, keeping every other
/// key. Comments and layout are not preserved. The result is re-parsed and
/// validated, so an invalid document is never produced.
pub fn with_origin_corner(text: &str, corner: CornerCfg) -> eyre::Result<String> {
    let mut doc: toml::Table =
        toml::from_str(text).map_err(|e| eyre::eyre!("parse config: {e}"))?;
    let origin = doc
        .entry("origin")
        .or_insert_with(|| toml::Value::Table(toml::Table::new()));
    let Some(origin) = origin.as_table_mut() else {
        eyre::bail!("[origin] is not a table");
    };
    origin.insert("corner".into(), toml::Value::String(corner.as_str().into()));

    let out = toml::to_string(&doc).map_err(|e| eyre::eyre!("serialize config: {e}"))?;
    let cfg = load_toml(&out).map_err(|e| eyre::eyre!("parse updated config: {e}"))?;
    cfg.validate()?;
    Ok(out)
}

fn positive(name: &str, v: f64) -> eyre::Result<()> {
    if !(v.is_finite() && v > 0.0) {
        eyre::bail!("{name} must be a finite number > 0");
    }
    Ok(())
}

impl Config {
    pub fn origin_corner(&self) -> Option<CornerCfg> {
        self.origin.corner
    }

    pub fn validate(&self) -> eyre::Result<()> {
        // Machine
        positive("machine.steps_per_mm", self.machine.steps_per_mm)?;
        positive("machine.work_area_width_mm", self.machine.work_area_width_mm)?;
        positive("machine.work_area_height_mm", self.machine.work_area_height_mm)?;
        positive("machine.input_width", self.machine.input_width)?;
        positive("machine.input_height", self.machine.input_height)?;

        // Serial
        if self.serial.baud == 0 {
            eyre::bail!("serial.baud must be > 0");
        }
        if self.serial.poll_ms == 0 {
            eyre::bail!("serial.poll_ms must be >= 1");
        }
        if self.serial.read_timeout_ms == 0 {
            eyre::bail!("serial.read_timeout_ms must be >= 1");
        }
        if self.serial.open_settle_ms > 60_000 {
            eyre::bail!("serial.open_settle_ms is unreasonably large (>60s)");
        }

        // Pacing
        if self.pacing.step_us > 1_000_000 {
            eyre::bail!("pacing.step_us is unreasonably large (>1s per step)");
        }

        // Calibration
        if self.calibration.round_trip_steps > 100_000 {
            eyre::bail!("calibration.round_trip_steps is unreasonably large (>100000)");
        }

        // Logging
        if let Some(rot) = self.logging.rotation.as_deref()
            && !matches!(rot, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never, daily, hourly (got {rot})");
        }

        Ok(())
    }
}
