use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PlotterError {
    #[error("port {port} unavailable: {reason}")]
    PortUnavailable { port: String, reason: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("origin not calibrated; run corner detection first")]
    OriginNotCalibrated,
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("drawing is empty")]
    EmptyDrawing,
    #[error("cancelled by operator")]
    Cancelled,
    #[error("busy: {0}")]
    Busy(&'static str),
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("io error: {0}")]
    Io(String),
    #[error("format error: {0}")]
    Format(String),
}

impl From<std::io::Error> for PlotterError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PlotterError>;
