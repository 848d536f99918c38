use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("port {port} unavailable: {reason}")]
    PortUnavailable { port: String, reason: String },
    #[error("link disconnected")]
    Disconnected,
    #[error("serial: {0}")]
    Serial(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HwError>;
