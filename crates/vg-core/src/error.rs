use std::path::PathBuf;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("API key not found. Set TOGETHER_API_KEY in your environment or .env file.")]
    MissingCredential,

    #[error("Upstream error{}: {message}", .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    Upstream {
        status: Option<u16>,
        message: String,
    },

    #[error("Input file not found or empty: {}", .0.display())]
    InputNotFound(PathBuf),

    #[error("{0} is not installed or not in the system's PATH")]
    ToolUnavailable(String),

    #[error("Conversion failed: {0}")]
    Conversion(String),

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration for {key}: {message}")]
    Config {
        key: String,
        message: String,
    },

    #[error("Job was cancelled")]
    Cancelled,

    #[error("A job is already running on this runner")]
    RunnerBusy,
}

/// Coarse classification of an [`Error`], suitable for shipping across
/// threads and matching in callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    InvalidInput,
    MissingCredential,
    UpstreamError,
    InputNotFound,
    ToolUnavailable,
    ConversionError,
    Io,
    Config,
    Cancelled,
    RunnerBusy,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::MissingCredential => ErrorKind::MissingCredential,
            Self::Upstream { .. } => ErrorKind::UpstreamError,
            Self::InputNotFound(_) => ErrorKind::InputNotFound,
            Self::ToolUnavailable(_) => ErrorKind::ToolUnavailable,
            Self::Conversion(_) => ErrorKind::ConversionError,
            Self::Io { .. } => ErrorKind::Io,
            Self::Config { .. } => ErrorKind::Config,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::RunnerBusy => ErrorKind::RunnerBusy,
        }
    }

    pub(crate) fn upstream(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Upstream {
            status,
            message: message.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn config(key: &str, message: impl Into<String>) -> Self {
        Self::Config {
            key: key.to_string(),
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Self::Upstream {
            status: e.status().map(|s| s.as_u16()),
            message: e.to_string(),
        }
    }
}
