//! Captured strokes and their JSON persistence.
//!
//! A [`Sample`] keeps the input-space point exactly as captured and, when the
//! origin was known at capture time, the physical millimeters derived from it.
//! Physical coordinates are never refreshed behind the caller's back; use
//! [`Drawing::remap`] after a calibration run.
//!
//! On disk a drawing is a JSON array of strokes, each an array of
//! `[input_x, input_y, physical_x_mm, physical_y_mm]` with `null` standing in
//! for a physical pair that was never derived.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{PlotterError, Result};
use crate::mapper::{MachineConfig, OriginState, to_physical};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SampleRepr", into = "SampleRepr")]
pub struct Sample {
    input: (f64, f64),
    physical: Option<(f64, f64)>,
}

#[derive(Serialize, Deserialize)]
struct SampleRepr(f64, f64, Option<f64>, Option<f64>);

impl TryFrom<SampleRepr> for Sample {
    type Error = PlotterError;

    /// The physical pair is all-or-nothing.
    fn try_from(r: SampleRepr) -> Result<Self> {
        let physical = match (r.2, r.3) {
            (Some(x), Some(y)) => Some((x, y)),
            (None, None) => None,
            _ => {
                return Err(PlotterError::Format(format!(
                    "sample ({}, {}) has only one physical coordinate",
                    r.0, r.1
                )));
            }
        };
        Ok(Self {
            input: (r.0, r.1),
            physical,
        })
    }
}

impl From<Sample> for SampleRepr {
    fn from(s: Sample) -> Self {
        let (px, py) = s.physical.unzip();
        SampleRepr(s.input.0, s.input.1, px, py)
    }
}

impl Sample {
    /// A sample whose physical pair has not been derived.
    pub fn new(input_x: f64, input_y: f64) -> Self {
        Self {
            input: (input_x, input_y),
            physical: None,
        }
    }

    pub fn with_physical(input_x: f64, input_y: f64, x_mm: f64, y_mm: f64) -> Self {
        Self {
            input: (input_x, input_y),
            physical: Some((x_mm, y_mm)),
        }
    }

    /// Capture a point under the current origin. An undetected origin yields
    /// a sample without physical coordinates rather than an error.
    pub fn capture(
        input_x: f64,
        input_y: f64,
        origin: &OriginState,
        config: &MachineConfig,
    ) -> Self {
        Self {
            input: (input_x, input_y),
            physical: to_physical(input_x, input_y, origin, config).ok(),
        }
    }

    pub fn input(&self) -> (f64, f64) {
        self.input
    }

    pub fn physical(&self) -> Option<(f64, f64)> {
        self.physical
    }
}

/// Non-empty, immutable run of samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Sample>", into = "Vec<Sample>")]
pub struct Stroke {
    samples: Vec<Sample>,
}

impl TryFrom<Vec<Sample>> for Stroke {
    type Error = PlotterError;

    fn try_from(samples: Vec<Sample>) -> Result<Self> {
        if samples.is_empty() {
            return Err(PlotterError::Format("stroke has no samples".into()));
        }
        Ok(Self { samples })
    }
}

impl From<Stroke> for Vec<Sample> {
    fn from(s: Stroke) -> Self {
        s.samples
    }
}

impl Stroke {
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

}

/// Stroke under construction while a gesture is in progress.
#[derive(Debug, Clone, PartialEq)]
pub struct StrokeBuilder {
    samples: Vec<Sample>,
}

impl StrokeBuilder {
    pub fn begin(first: Sample) -> Self {
        Self {
            samples: vec![first],
        }
    }

    pub fn extend(&mut self, sample: Sample) {
        self.samples.push(sample);
    }

    pub fn finish(self) -> Stroke {
        Stroke {
            samples: self.samples,
        }
    }
}

/// Ordered strokes; insertion order is draw order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Drawing {
    strokes: Vec<Stroke>,
}

impl Drawing {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn strokes(&self) -> &[Stroke] {
        &self.strokes
    }

    pub fn len(&self) -> usize {
        self.strokes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strokes.is_empty()
    }

    pub fn push(&mut self, stroke: Stroke) {
        self.strokes.push(stroke);
    }

    pub fn clear(&mut self) {
        self.strokes.clear();
    }

    pub fn sample_count(&self) -> usize {
        self.strokes.iter().map(|s| s.samples.len()).sum()
    }

    /// Samples still missing their physical pair.
    pub fn unmapped_count(&self) -> usize {
        self.strokes
            .iter()
            .flat_map(|s| s.samples.iter())
            .filter(|s| s.physical.is_none())
            .count()
    }

    /// Recompute every physical pair from the stored input points.
    ///
    /// All-or-nothing: if the origin is not detected the drawing is left as is.
    pub fn remap(&mut self, origin: &OriginState, config: &MachineConfig) -> Result<()> {
        origin.require()?;
        for stroke in &mut self.strokes {
            for sample in &mut stroke.samples {
                let (px, py) = sample.input;
                sample.physical = Some(to_physical(px, py, origin, config)?);
            }
        }
        Ok(())
    }

    pub fn to_json_vec(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| PlotterError::Format(e.to_string()))
    }

    pub fn from_json_slice(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| PlotterError::Format(e.to_string()))
    }

    /// Persist to `path` atomically. An empty drawing is refused.
    pub fn save(&self, path: &Path) -> Result<()> {
        if self.is_empty() {
            return Err(PlotterError::EmptyDrawing);
        }
        let bytes = self.to_json_vec()?;
        crate::atomic::write_atomic(path, &bytes)?;
        tracing::info!(path = %path.display(), strokes = self.len(), "drawing saved");
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let drawing = Self::from_json_slice(&bytes)?;
        tracing::info!(
            path = %path.display(),
            strokes = drawing.len(),
            unmapped = drawing.unmapped_count(),
            "drawing loaded"
        );
        Ok(drawing)
    }
}

impl From<Vec<Stroke>> for Drawing {
    fn from(strokes: Vec<Stroke>) -> Self {
        Self { strokes }
    }
}
