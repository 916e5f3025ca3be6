use std::path::PathBuf;

/// Failures raised while configuring or driving a recording run.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Invalid construction parameters. Raised before any device I/O.
    #[error("configuration error: {message}")]
    Configuration { message: String },

    #[error("channel mismatch: expected {expected} channels, device produced {actual}")]
    ChannelMismatch { expected: usize, actual: usize },

    /// A sink refused a write. Aborts the run since the file would be corrupt.
    #[error("schedule violation: {message}")]
    ScheduleViolation { message: String },

    #[error("device error: {message}")]
    Device { message: String },

    #[error("invalid time value: {message}")]
    InvalidTime { message: String },

    #[error("malformed event log {path}: {message}")]
    EventLog { path: PathBuf, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("pattern error: {0}")]
    Pattern(#[from] regex::Error),
}

impl Error {
    pub fn configuration(message: impl Into<String>) -> Self {
        Error::Configuration {
            message: message.into(),
        }
    }

    pub fn schedule(message: impl Into<String>) -> Self {
        Error::ScheduleViolation {
            message: message.into(),
        }
    }

    pub fn device(message: impl Into<String>) -> Self {
        Error::Device {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
