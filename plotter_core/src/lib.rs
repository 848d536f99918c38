#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Pen-plotter control core (hardware-agnostic).
//!
//! Turns strokes captured on a flat input surface into the line protocol of a
//! two-axis plotter controller, and runs the corner-detection routine that
//! tells the host where the machine origin is. All device I/O goes through the
//! `plotter_traits` link seams.
//!
//! ## Architecture
//!
//! - **Mapping**: input space → millimeters for the detected corner (`mapper`)
//! - **Quantization**: millimeters → whole motor steps, truncating (`quantize`)
//! - **Encoding**: drawings → paced relative moves and pen toggles (`encoder`)
//! - **Calibration**: probe sequence plus operator corner choice (`calibration`)
//! - **Transport**: open link, background reader, cloneable sender (`session`)
//! - **Playback**: paced, cancellable drawing worker (`playback`)
//! - **Application**: one owner for settings, drawing, session, workers (`app`)
//!
//! ## Units
//!
//! Input points are in surface units (600 × 600 on the reference machine),
//! physical points in millimeters, and motion in signed `i32` steps. Moves are
//! relative; the host tracks position itself because the controller never
//! reports it unprompted.

pub mod app;
pub mod atomic;
pub mod calibration;
pub mod command;
pub mod conversions;
pub mod drawing;
pub mod encoder;
pub mod error;
pub mod hw_error;
pub mod log;
pub mod mapper;
pub mod mocks;
pub mod playback;
pub mod quantize;
pub mod session;
pub mod status;
pub mod util;

pub use app::{App, ConfigUpdate, Settings};
pub use calibration::{
    CalibrationHandle, CalibrationRun, CalibrationTiming, ManualCommand, Phase, run_auto_detect,
};
pub use command::{Command, CommandSink};
pub use drawing::{Drawing, Sample, Stroke, StrokeBuilder};
pub use encoder::{MotionState, PacingConfig, TimedCommand, encode, estimated_duration};
pub use error::{PlotterError, Result};
pub use log::{LogEvent, LogSink};
pub use mapper::{Corner, MachineConfig, OriginState, SharedOrigin, to_input, to_physical};
pub use playback::{PlaybackHandle, PlaybackJob, PlaybackOutcome, PlaybackReport};
pub use quantize::{delta, to_steps};
pub use session::{Session, SessionHandle, SessionOptions};
pub use status::{StatusFlags, StatusSnapshot};
