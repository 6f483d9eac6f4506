use thiserror::Error;

use crate::events::Operation;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Library error type for panoramer operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Another workflow operation holds the busy flag.
    #[error("{0} rejected: another operation is in progress")]
    Busy(Operation),

    /// The request could not be sent or no response arrived.
    #[error("transport failure: {0}")]
    Transport(#[source] reqwest::Error),

    /// The request exceeded the configured timeout.
    #[error("request timed out")]
    TimedOut,

    /// The operation was cancelled before the service answered.
    #[error("operation cancelled")]
    Cancelled,

    /// The service answered with an unsuccessful HTTP status.
    #[error("service returned {status}")]
    Status { status: u16, message: Option<String> },

    /// The transport succeeded but the body carries a failure status.
    #[error("service reported status {status} in its response body")]
    Rejected { status: u16, message: Option<String> },

    /// The response body does not have the expected shape.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// The selection is frozen while an operation is in flight.
    #[error("selection cannot change while an operation is in progress")]
    SelectionLocked,

    /// Selection index outside the current list.
    #[error("no selected image at index {index} (selection has {len})")]
    SelectionIndex { index: usize, len: usize },

    /// A request location could not be built from the base URL.
    #[error("invalid request URL: {0}")]
    InvalidUrl(String),

    /// Reading a selected file for upload failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Message supplied by the service alongside a failure, if any.
    pub fn service_message(&self) -> Option<&str> {
        match self {
            Self::Status { message, .. } | Self::Rejected { message, .. } => message.as_deref(),
            _ => None,
        }
    }

    /// Service message worth showing to the user: only from responses the
    /// transport accepted (2xx), or from a failure status embedded in a body.
    pub fn reported_message(&self) -> Option<&str> {
        match self {
            Self::Rejected { message, .. } => message.as_deref(),
            Self::Status { status, message } if (200..300).contains(status) => message.as_deref(),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::TimedOut
        } else if err.is_decode() {
            Self::Malformed(err.to_string())
        } else {
            Self::Transport(err)
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Malformed(err.to_string())
    }
}
