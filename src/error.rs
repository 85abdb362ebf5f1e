//! Error types for gcrootd.
//!
//! Failures fall into three tiers: per-path filesystem errors are logged
//! and skipped inside the scanners and never surface here; per-request
//! errors (`Scan`, `Io`, `Protocol`) close one connection; everything
//! else is fatal at startup.

use std::path::PathBuf;

use thiserror::Error;

use crate::daemon::protocol::ProtocolError;

/// Top-level error type for the tracer daemon.
#[derive(Error, Debug)]
pub enum TracerError {
    /// Creating the listening socket failed
    #[error("cannot create Unix domain socket: {0}")]
    CreateSocket(#[source] nix::errno::Errno),

    /// Binding the listening socket failed
    #[error("cannot bind to socket '{path}': {reason}")]
    Bind { path: PathBuf, reason: String },

    /// Restricting the socket file mode failed
    #[error("cannot change permissions on '{path}': {source}")]
    Chmod {
        path: PathBuf,
        source: std::io::Error,
    },

    /// listen(2) on the bound socket failed
    #[error("cannot listen on socket '{path}': {source}")]
    Listen {
        path: PathBuf,
        source: nix::errno::Errno,
    },

    /// Installing a signal handler failed
    #[error("cannot install handler for {signal}: {source}")]
    Signal {
        signal: nix::sys::signal::Signal,
        source: nix::errno::Errno,
    },

    /// accept(2) failed with something other than EINTR
    #[error("error accepting connection: {0}")]
    Accept(#[source] std::io::Error),

    /// Unexpected I/O error while scanning /proc
    #[error("failed to scan '{path}': {source}")]
    Scan {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A root report that could not be parsed
    #[error("invalid root report: {0}")]
    Protocol(#[from] ProtocolError),

    /// I/O errors with no more specific context
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, TracerError>;
