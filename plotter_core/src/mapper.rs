//! Input-space to machine-space coordinate mapping.
//!
//! The input surface has its origin at the top-left with Y growing downward.
//! Where the machine's (0, 0) sits depends on its home switches and is only
//! known after corner detection, so every conversion is keyed by the detected
//! [`Corner`]. Scale is uniform: `input_width / work_area_width_mm` units per
//! millimeter on both axes.

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, RwLock};

use crate::error::{PlotterError, Result};

/// Corner of the work area the controller treats as (0, 0).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Corner {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
    #[default]
    Unknown,
}

impl Corner {
    /// The four physical corners, in prompt order.
    pub const ALL: [Corner; 4] = [
        Corner::TopLeft,
        Corner::TopRight,
        Corner::BottomLeft,
        Corner::BottomRight,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Corner::TopLeft => "top-left",
            Corner::TopRight => "top-right",
            Corner::BottomLeft => "bottom-left",
            Corner::BottomRight => "bottom-right",
            Corner::Unknown => "unknown",
        }
    }

    /// X runs right-to-left on the input surface.
    fn mirrors_x(self) -> bool {
        matches!(self, Corner::TopRight | Corner::BottomRight)
    }

    /// Y runs bottom-to-top on the input surface.
    fn mirrors_y(self) -> bool {
        matches!(self, Corner::BottomLeft | Corner::BottomRight)
    }
}

impl fmt::Display for Corner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Corner {
    type Err = PlotterError;

    /// Accepts `top-left`, `top_left`, `topleft` and the short forms `tl`,
    /// `tr`, `bl`, `br`, case-insensitively.
    fn from_str(s: &str) -> Result<Self> {
        let norm: String = s
            .trim()
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | ' '))
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match norm.as_str() {
            "topleft" | "tl" => Ok(Corner::TopLeft),
            "topright" | "tr" => Ok(Corner::TopRight),
            "bottomleft" | "bl" => Ok(Corner::BottomLeft),
            "bottomright" | "br" => Ok(Corner::BottomRight),
            _ => Err(PlotterError::Format(format!("unknown corner '{s}'"))),
        }
    }
}

/// Whether, and where, the machine origin has been discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OriginState {
    pub detected: bool,
    pub corner: Corner,
}

impl OriginState {
    pub fn unknown() -> Self {
        Self::default()
    }

    pub fn detected(corner: Corner) -> Self {
        Self {
            detected: corner != Corner::Unknown,
            corner,
        }
    }

    /// The corner to map against, or `OriginNotCalibrated`.
    pub fn require(&self) -> Result<Corner> {
        if self.detected && self.corner != Corner::Unknown {
            Ok(self.corner)
        } else {
            Err(PlotterError::OriginNotCalibrated)
        }
    }
}

/// Origin shared between the foreground and a calibration worker.
pub type SharedOrigin = Arc<RwLock<OriginState>>;

/// Machine geometry and resolution. Every field is finite and > 0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MachineConfig {
    steps_per_mm: f64,
    work_area_width_mm: f64,
    work_area_height_mm: f64,
    input_width: f64,
    input_height: f64,
}

impl Default for MachineConfig {
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

fn check_positive(name: &str, v: f64) -> Result<f64> {
    if v.is_finite() && v > 0.0 {
        Ok(v)
    } else {
        Err(PlotterError::InvalidConfig(format!(
            "{name} must be a finite number > 0 (got {v})"
        )))
    }
}

impl MachineConfig {
    pub fn new(
        steps_per_mm: f64,
        work_area_width_mm: f64,
        work_area_height_mm: f64,
        input_width: f64,
        input_height: f64,
    ) -> Result<Self> {
        Ok(Self {
            steps_per_mm: check_positive("steps_per_mm", steps_per_mm)?,
            work_area_width_mm: check_positive("work_area_width_mm", work_area_width_mm)?,
            work_area_height_mm: check_positive("work_area_height_mm", work_area_height_mm)?,
            input_width: check_positive("input_width", input_width)?,
            input_height: check_positive("input_height", input_height)?,
        })
    }

    pub fn steps_per_mm(&self) -> f64 {
        self.steps_per_mm
    }
    pub fn work_area_width_mm(&self) -> f64 {
        self.work_area_width_mm
    }
    pub fn work_area_height_mm(&self) -> f64 {
        self.work_area_height_mm
    }
    pub fn input_width(&self) -> f64 {
        self.input_width
    }
    pub fn input_height(&self) -> f64 {
        self.input_height
    }

    /// Input units per millimeter, taken from the X axis and applied to both.
    pub fn scale(&self) -> f64 {
        self.input_width / self.work_area_width_mm
    }
}

/// Convert an input-space point to machine millimeters.
pub fn to_physical(
    px: f64,
    py: f64,
    origin: &OriginState,
    config: &MachineConfig,
) -> Result<(f64, f64)> {
    let corner = origin.require()?;
    let scale = config.scale();
    let ix = if corner.mirrors_x() {
        config.input_width - px
    } else {
        px
    };
    let iy = if corner.mirrors_y() {
        config.input_height - py
    } else {
        py
    };
    Ok((ix / scale, iy / scale))
}

/// Inverse of [`to_physical`] for the same origin and config.
pub fn to_input(
    x_mm: f64,
    y_mm: f64,
    origin: &OriginState,
    config: &MachineConfig,
) -> Result<(f64, f64)> {
    let corner = origin.require()?;
    let scale = config.scale();
    let (sx, sy) = (x_mm * scale, y_mm * scale);
    let px = if corner.mirrors_x() {
        config.input_width - sx
    } else {
        sx
    };
    let py = if corner.mirrors_y() {
        config.input_height - sy
    } else {
        sy
    };
    Ok((px, py))
}
