//! Error types shared by the capture core.
//!
//! Only [`MonitorError::InvalidArgument`] and [`MonitorError::NotFound`] are ever
//! returned synchronously to callers of the façade. The remaining variants are
//! produced inside detached tasks and reported through the log.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Main error type for the DNS watcher core.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("capture source unavailable on {interface:?}: {source}")]
    SourceUnavailable {
        interface: String,
        #[source]
        source: SourceError,
    },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("snapshot {path:?} could not be {action}: {reason}")]
    Persistence {
        path: PathBuf,
        action: &'static str,
        reason: String,
    },

    #[error("capture loop on {interface:?} did not stop within {timeout:?}")]
    CancellationTimeout { interface: String, timeout: Duration },

    #[error("configuration error: {0}")]
    Config(String),
}

impl From<config::ConfigError> for MonitorError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

/// Failures raised by a packet source while opening or reading an interface.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("no interface named {0:?}")]
    InterfaceNotFound(String),

    #[error("unsupported datalink channel type")]
    UnsupportedChannel,

    #[error("failed to open datalink channel: {0}")]
    Open(#[source] io::Error),

    #[error("failed to receive packet: {0}")]
    Receive(#[source] io::Error),
}

impl SourceError {
    /// Maps an open failure to a clearer message when privileges are missing.
    pub fn from_open(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::PermissionDenied {
            return Self::Open(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "permission denied; packet capture requires elevated privileges (sudo/CAP_NET_RAW)",
            ));
        }
        Self::Open(err)
    }
}

pub type Result<T> = std::result::Result<T, MonitorError>;
