use std::io;
use thiserror::Error;

/// Error type for probe detection and sampling.
///
/// Every variant is non-fatal at the probe boundary: the sampler collapses
/// them into an `Unavailable` sample plus a log entry. The only fatal-class
/// condition in the program is the baseline counter check at startup, which
/// goes through `anyhow` in `main`.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("tool unavailable: {0}")]
    ToolUnavailable(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("parse failure: {0}")]
    ParseFailure(String),

    #[error("probe timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("no matching device: {0}")]
    DeviceAbsent(String),
}

/// Result type alias for probe operations
pub type Result<T> = std::result::Result<T, ProbeError>;

impl ProbeError {
    pub fn tool_unavailable<S: Into<String>>(msg: S) -> Self {
        ProbeError::ToolUnavailable(msg.into())
    }

    pub fn permission_denied<S: Into<String>>(msg: S) -> Self {
        ProbeError::PermissionDenied(msg.into())
    }

    pub fn parse_failure<S: Into<String>>(msg: S) -> Self {
        ProbeError::ParseFailure(msg.into())
    }

    pub fn device_absent<S: Into<String>>(msg: S) -> Self {
        ProbeError::DeviceAbsent(msg.into())
    }

    /// Classify an IO error from a sysfs read, keeping permission problems
    /// distinguishable from missing paths.
    pub fn from_sysfs(path: &std::path::Path, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::PermissionDenied => {
                ProbeError::PermissionDenied(path.display().to_string())
            }
            io::ErrorKind::NotFound => ProbeError::DeviceAbsent(path.display().to_string()),
            _ => ProbeError::Io(err),
        }
    }
}
