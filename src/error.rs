use std::io;
use thiserror::Error;

/// Fatal errors. Anything that reaches `main` ends the process.
#[derive(Debug, Error)]
pub enum Error {
    #[error("interface '{0}' not found")]
    InterfaceNotFound(String),

    #[error("invalid interface name '{0}'")]
    InvalidInterfaceName(String),

    #[error("failed to open capture on {interface}: {source}")]
    CaptureOpen { interface: String, source: io::Error },

    #[error("capture failed: {0}")]
    Capture(#[source] io::Error),

    #[error("capture already released, the listener has stopped")]
    CaptureReleased,

    #[error("failed to send router solicitation: {0}")]
    Solicit(#[source] io::Error),

    #[error("failed to install signal handler: {0}")]
    Signal(#[source] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
