//! Controller command tokens.
//!
//! One command per line: single-letter tokens, with a signed step count for
//! the two relative axis moves (`X-120`, `Y512`).

use std::fmt;
use std::str::FromStr;

use crate::error::{PlotterError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// `H`: return to origin.
    Home,
    /// `U`
    PenUp,
    /// `B`
    PenDown,
    /// `X<n>`: relative X move in steps.
    MoveX(i32),
    /// `Y<n>`: relative Y move in steps.
    MoveY(i32),
    /// `C`: probe X-axis limits.
    ProbeX,
    /// `D`: probe Y-axis limits.
    ProbeY,
    /// `A`: four-direction self-test.
    DirectionTest,
    /// `I`: telemetry snapshot.
    Telemetry,
    /// `P`: position snapshot.
    Position,
}

impl Command {
    /// Step count of an axis move, if this is one.
    pub fn steps(self) -> Option<i32> {
        match self {
            Command::MoveX(n) | Command::MoveY(n) => Some(n),
            _ => None,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Home => f.write_str("H"),
            Command::PenUp => f.write_str("U"),
            Command::PenDown => f.write_str("B"),
            Command::MoveX(n) => write!(f, "X{n}"),
            Command::MoveY(n) => write!(f, "Y{n}"),
            Command::ProbeX => f.write_str("C"),
            Command::ProbeY => f.write_str("D"),
            Command::DirectionTest => f.write_str("A"),
            Command::Telemetry => f.write_str("I"),
            Command::Position => f.write_str("P"),
        }
    }
}

impl FromStr for Command {
    type Err = PlotterError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let bad = || PlotterError::Format(format!("unknown command '{s}'"));
        let mut chars = s.chars();
        let op = chars.next().ok_or_else(bad)?;
        let arg = chars.as_str();
        let cmd = match op {
            'X' | 'Y' => {
                let n: i32 = arg.parse().map_err(|_| bad())?;
                if op == 'X' {
                    Command::MoveX(n)
                } else {
                    Command::MoveY(n)
                }
            }
            _ if !arg.is_empty() => return Err(bad()),
            'H' => Command::Home,
            'U' => Command::PenUp,
            'B' => Command::PenDown,
            'C' => Command::ProbeX,
            'D' => Command::ProbeY,
            'A' => Command::DirectionTest,
            'I' => Command::Telemetry,
            'P' => Command::Position,
            _ => return Err(bad()),
        };
        Ok(cmd)
    }
}

/// Anything commands can be issued to: an open session, or a recorder in tests.
pub trait CommandSink {
    fn send(&mut self, cmd: Command) -> Result<()>;
}

impl<T: CommandSink + ?Sized> CommandSink for &mut T {
    fn send(&mut self, cmd: Command) -> Result<()> {
        (**self).send(cmd)
    }
}
