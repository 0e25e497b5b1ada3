//! Error types for serve.

use thiserror::Error;

use crate::supervisor::worker::LINE_BUFFER_MAX;

/// Main error type for serve.
#[derive(Error, Debug)]
pub enum ServeError {
    #[error("invalid listen address: {0}")]
    Address(String),

    #[error("{0}")]
    Sys(#[from] nix::errno::Errno),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("worker stderr line exceeds {max} bytes", max = LINE_BUFFER_MAX)]
    LineOverflow,

    #[error("connection from an unsupported address family")]
    UnsupportedFamily,

    #[error("command contains an interior NUL byte")]
    NulInCommand,
}

/// Result type alias for serve operations.
pub type Result<T> = std::result::Result<T, ServeError>;
