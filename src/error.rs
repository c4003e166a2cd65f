//! Errors this crate can emit.
use crate::parts::PartNumber;
use crate::state::UploadId;
use crate::transport::TaskHandle;
use crate::uri::ObjectUri;

use std::fmt::{self, Display, Formatter};

/// A specialized `Result` type for this crate.
pub type Result<T, E = Error> = ::std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The value returned in this crate when an error occurs.
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct Error(pub(crate) ErrorRepr);

impl Error {
    /// The category of this error.
    pub fn kind(&self) -> ErrorKind {
        match &self.0 {
            ErrorRepr::InvalidFileSize(_) | ErrorRepr::Missing(_, _) => ErrorKind::Validation,
            ErrorRepr::PartNotFound(_)
            | ErrorRepr::InvalidStateTransition { .. }
            | ErrorRepr::InvalidParts { .. } => ErrorKind::State,
            ErrorRepr::PartsUploadRetryLimitExceeded { .. } => ErrorKind::RetryBudget,
            ErrorRepr::Cancelled => ErrorKind::Cancelled,
            ErrorRepr::Create { .. }
            | ErrorRepr::Complete { .. }
            | ErrorRepr::Abort { .. }
            | ErrorRepr::Presign { .. } => ErrorKind::Service,
            ErrorRepr::Transport { .. } => ErrorKind::Transport,
            ErrorRepr::Io { .. } => ErrorKind::Io,
            ErrorRepr::Persist(_) => ErrorKind::Persistence,
            ErrorRepr::StdDyn(_) => ErrorKind::Unknown,
            ErrorRepr::Any { kind, .. } => *kind,
        }
    }

    /// Wrap any foreign error value.
    pub fn from_dyn<E>(e: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        let err = Box::new(e);
        Self(ErrorRepr::StdDyn(err))
    }

    /// Construct an error from a category and a message.
    pub fn from_kind(kind: ErrorKind, msg: impl Into<String>) -> Self {
        Self(ErrorRepr::Any {
            kind,
            msg: msg.into(),
        })
    }

    /// True when the retry budget for a part upload was exhausted.
    pub fn is_retry_limit_exceeded(&self) -> bool {
        matches!(self.0, ErrorRepr::PartsUploadRetryLimitExceeded { .. })
    }

    pub(crate) fn invalid_transition(state: &'static str, event: impl Display) -> Self {
        Self(ErrorRepr::InvalidStateTransition {
            state,
            event: event.to_string(),
        })
    }

    pub(crate) fn invalid_parts(reason: impl Into<String>) -> Self {
        Self(ErrorRepr::InvalidParts {
            reason: reason.into(),
        })
    }

    pub(crate) fn retry_limit_exceeded(limit: u32, source: Option<BoxError>) -> Self {
        Self(ErrorRepr::PartsUploadRetryLimitExceeded { limit, source })
    }

    pub(crate) fn cancelled() -> Self {
        Self(ErrorRepr::Cancelled)
    }

    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self(ErrorRepr::Io {
            context: context.into(),
            source,
        })
    }
}

impl From<ErrorRepr> for Error {
    fn from(value: ErrorRepr) -> Self {
        Self(value)
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Self(ErrorRepr::Persist(value))
    }
}

/// The category of the error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Malformed request input, rejected before any network call.
    Validation,
    /// State machine contract violation; fatal to the owning session.
    State,
    /// Connectivity-level failure reported by the transport.
    Transport,
    /// A backend call (create/part/complete/abort/presign) failed.
    Service,
    /// The per-part retry budget was exhausted.
    RetryBudget,
    /// The transfer was cancelled by the caller.
    Cancelled,
    /// Local file I/O failure.
    Io,
    /// Reading or writing a persisted transfer record failed.
    Persistence,
    Unknown,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation => write!(f, "validation"),
            Self::State => write!(f, "state"),
            Self::Transport => write!(f, "transport"),
            Self::Service => write!(f, "service"),
            Self::RetryBudget => write!(f, "retry-budget"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Io => write!(f, "io"),
            Self::Persistence => write!(f, "persistence"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Internal error type that we are free to change at will.
#[derive(Debug, thiserror::Error)]
pub(crate) enum ErrorRepr {
    #[error("invalid file size: {0} bytes")]
    InvalidFileSize(u64),
    #[error("{0} not found in this upload")]
    PartNotFound(PartNumber),
    #[error("invalid state transition: {state} cannot handle event {event}")]
    InvalidStateTransition { state: &'static str, event: String },
    #[error("upload is not valid for completion: {reason}")]
    InvalidParts { reason: String },
    #[error("parts upload retry limit of {limit} exceeded")]
    PartsUploadRetryLimitExceeded {
        limit: u32,
        #[source]
        source: Option<BoxError>,
    },
    #[error("transfer was cancelled")]
    Cancelled,
    #[error("creating multipart upload for {uri} failed: {source}")]
    Create { uri: ObjectUri, source: BoxError },
    #[error("completing upload {id} failed: {source}")]
    Complete { id: UploadId, source: BoxError },
    #[error("aborting upload {id} failed: {source}")]
    Abort { id: UploadId, source: BoxError },
    #[error("presigning {part} for upload {id} failed: {source}")]
    Presign {
        id: UploadId,
        part: PartNumber,
        source: BoxError,
    },
    #[error("transport task {handle} failed: {message}")]
    Transport { handle: TaskHandle, message: String },
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
    #[error("reading or writing a transfer record failed: {0}")]
    Persist(#[from] serde_json::Error),
    #[error("{0} missing required field: {1}")]
    Missing(&'static str, &'static str),
    #[error("{kind} error: {msg}")]
    Any { kind: ErrorKind, msg: String },
    #[error(transparent)]
    StdDyn(BoxError),
}
