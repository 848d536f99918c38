//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use plotter_core::{Corner, ManualCommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

/// Config path used when `--config` is not given. A missing file here means
/// "use built-in defaults"; a missing explicit path is an error.
pub const DEFAULT_CONFIG: &str = "etc/plotter.toml";

fn parse_corner(s: &str) -> Result<Corner, String> {
    s.parse::<Corner>().map_err(|e| e.to_string())
}

#[derive(Parser, Debug)]
#[command(name = "plotter", version, about = "Pen plotter control CLI")]
pub struct Cli {
    /// Path to config TOML
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Serial port (overrides [serial] port)
    #[arg(long, value_name = "PORT")]
    pub port: Option<String>,

    /// Use the built-in simulated controller instead of a serial port
    #[arg(long, action = ArgAction::SetTrue)]
    pub sim: bool,

    /// Assume this origin corner instead of the persisted one
    /// (top-left, top-right, bottom-left, bottom-right)
    #[arg(long, value_name = "CORNER", value_parser = parse_corner)]
    pub corner: Option<Corner>,

    /// Recompute physical coordinates of a loaded drawing for the current origin
    #[arg(long, action = ArgAction::SetTrue)]
    pub remap: bool,

    /// Output JSON instead of text
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum ProbeKind {
    /// Probe X-axis limits (C)
    X,
    /// Probe Y-axis limits (D)
    Y,
    /// Four-direction self-test (A)
    Test,
    /// Telemetry snapshot (I)
    Telemetry,
    /// Position snapshot (P)
    Position,
}

impl From<ProbeKind> for ManualCommand {
    fn from(p: ProbeKind) -> Self {
        match p {
            ProbeKind::X => ManualCommand::ProbeX,
            ProbeKind::Y => ManualCommand::ProbeY,
            ProbeKind::Test => ManualCommand::DirectionTest,
            ProbeKind::Telemetry => ManualCommand::Telemetry,
            ProbeKind::Position => ManualCommand::Position,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum PenState {
    Up,
    Down,
}

impl From<PenState> for ManualCommand {
    fn from(p: PenState) -> Self {
        match p {
            PenState::Up => ManualCommand::PenUp,
            PenState::Down => ManualCommand::PenDown,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List serial ports
    Ports,
    /// Encode a drawing and print the command stream without sending it
    Plan {
        /// Drawing JSON file
        #[arg(long, value_name = "FILE")]
        drawing: PathBuf,
    },
    /// Send a drawing to the plotter
    Draw {
        /// Drawing JSON file
        #[arg(long, value_name = "FILE")]
        drawing: PathBuf,
        /// Skip homing before the first stroke
        #[arg(long, action = ArgAction::SetTrue)]
        no_home: bool,
    },
    /// Run origin corner detection
    Calibrate {
        /// Answer the corner prompt up front instead of reading stdin
        #[arg(long, value_name = "CORNER", value_parser = parse_corner)]
        corner: Option<Corner>,
        /// Write the detected corner to `[origin] corner` in the config file
        #[arg(long, action = ArgAction::SetTrue)]
        save: bool,
    },
    /// Send one probe or query command
    Probe {
        #[arg(value_enum)]
        what: ProbeKind,
    },
    /// Return to origin
    Home,
    /// Raise or lower the pen
    Pen {
        #[arg(value_enum)]
        state: PenState,
    },
    /// Check config and, if a link is available, that the controller answers
    SelfCheck,
}
