//! The transfer task, the unit of work the host application tracks.
//!
//! A task wraps one logical storage operation with a status, a retry
//! counter, and the handle of the underlying network operation.  The session
//! owns its task, but the task is also read from outside the session (for
//! lookup during recovery and cancellation), so its mutable pieces sit
//! behind their own lock.
use crate::error::{Error, ErrorKind, Result};
use crate::parts::PartNumber;
use crate::state::UploadId;
use crate::transport::TaskHandle;
use crate::uri::ObjectUri;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::{self, Display, Formatter};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Opaque identifier of one transfer task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransferId(uuid::Uuid);

impl TransferId {
    /// A fresh, time-ordered identifier.
    pub fn new() -> Self {
        Self(uuid::Uuid::now_v7())
    }
}

impl Default for TransferId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for TransferId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The kind of storage operation a task performs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum TransferKind {
    /// Whole-file upload in one request.
    Upload,
    /// Whole-file download in one request.
    Download,
    /// The top-level multipart upload.
    MultipartUpload,
    /// One part of a multipart upload, tracked separately so its progress
    /// survives a restart.
    #[serde(rename_all = "camelCase")]
    MultipartUploadPart {
        upload_id: UploadId,
        part_number: PartNumber,
    },
    /// Object listing.
    List,
    /// Object removal.
    Remove,
    /// Pre-signed URL issuance.
    Presign,
}

impl Display for TransferKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Upload => f.write_str("upload"),
            Self::Download => f.write_str("download"),
            Self::MultipartUpload => f.write_str("multipartUpload"),
            Self::MultipartUploadPart {
                upload_id,
                part_number,
            } => write!(f, "multipartUploadPart({upload_id}, {part_number})"),
            Self::List => f.write_str("list"),
            Self::Remove => f.write_str("remove"),
            Self::Presign => f.write_str("presign"),
        }
    }
}

/// Lifecycle status of a transfer task.
///
/// `Completed` and `Cancelled` are terminal; no further status change is
/// permitted once either is reached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TransferStatus {
    #[default]
    Unknown,
    InProgress,
    Paused,
    Completed,
    Waiting,
    Error,
    Cancelled,
}

impl TransferStatus {
    /// True once the task permits no further status change.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

impl Display for TransferStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unknown => "unknown",
            Self::InProgress => "inProgress",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Waiting => "waiting",
            Self::Error => "error",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Default)]
struct TaskInner {
    status: TransferStatus,
    retry_count: u32,
    handle: Option<TaskHandle>,
}

/// One tracked storage operation.
#[derive(Debug)]
pub struct TransferTask {
    id: TransferId,
    kind: TransferKind,
    uri: ObjectUri,
    content_type: Option<String>,
    headers: HashMap<String, String>,
    location: Option<PathBuf>,
    inner: Mutex<TaskInner>,
}

impl TransferTask {
    /// A new task in the `Unknown` status with a zero retry count.
    pub fn new(kind: TransferKind, uri: ObjectUri) -> Self {
        Self {
            id: TransferId::new(),
            kind,
            uri,
            content_type: None,
            headers: HashMap::new(),
            location: None,
            inner: Mutex::new(TaskInner::default()),
        }
    }

    /// Set the content type sent with the object.
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Set additional request headers.
    pub fn headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    /// Set the local file this task reads from or writes to.
    pub fn location(mut self, location: impl Into<PathBuf>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Rebuild a task from its persisted projection.
    pub(crate) fn with_recovered(
        id: TransferId,
        kind: TransferKind,
        uri: ObjectUri,
        content_type: Option<String>,
        headers: HashMap<String, String>,
        location: Option<PathBuf>,
        status: TransferStatus,
        retry_count: u32,
        handle: Option<TaskHandle>,
    ) -> Self {
        Self {
            id,
            kind,
            uri,
            content_type,
            headers,
            location,
            inner: Mutex::new(TaskInner {
                status,
                retry_count,
                handle,
            }),
        }
    }

    pub fn id(&self) -> TransferId {
        self.id
    }

    pub fn kind(&self) -> &TransferKind {
        &self.kind
    }

    pub fn uri(&self) -> &ObjectUri {
        &self.uri
    }

    pub fn content_type_value(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn header_values(&self) -> &HashMap<String, String> {
        &self.headers
    }

    pub fn location_value(&self) -> Option<&PathBuf> {
        self.location.as_ref()
    }

    /// Current lifecycle status.
    pub fn status(&self) -> TransferStatus {
        self.lock().status
    }

    /// Move the task to a new status.
    ///
    /// Fails once the task is terminal; setting the current status again is
    /// a no-op.
    pub fn set_status(&self, status: TransferStatus) -> Result<()> {
        let mut inner = self.lock();
        if inner.status == status {
            return Ok(());
        }
        if inner.status.is_terminal() {
            return Err(Error::from_kind(
                ErrorKind::State,
                format!("task {} is {} and cannot become {}", self.id, inner.status, status),
            ));
        }
        inner.status = status;
        Ok(())
    }

    /// Number of retries consumed so far.
    pub fn retry_count(&self) -> u32 {
        self.lock().retry_count
    }

    /// True while another retry fits in the budget.
    pub fn is_below_retry_limit(&self, retry_limit: u32) -> bool {
        self.lock().retry_count < retry_limit
    }

    /// Consume one retry, returning the new count.
    pub fn increment_retry_count(&self) -> u32 {
        let mut inner = self.lock();
        inner.retry_count += 1;
        inner.retry_count
    }

    /// Handle of the live network operation, when one exists.
    pub fn handle(&self) -> Option<TaskHandle> {
        self.lock().handle
    }

    pub fn set_handle(&self, handle: Option<TaskHandle>) {
        self.lock().handle = handle;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TaskInner> {
        // The inner lock guards plain data; a poisoned lock means a panic
        // mid-assignment, which cannot leave these fields torn.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Progress and outcome notifications delivered to the caller.
#[derive(Debug, Clone)]
pub enum TransferUpdate {
    /// The operation started and can be controlled through the reference
    /// handed back alongside this update.
    Initiated { id: TransferId },
    /// Aggregate progress, `bytes_transferred / total_bytes`.
    Progress {
        id: TransferId,
        bytes_transferred: u64,
        total_bytes: u64,
    },
    /// Terminal success.
    Completed { id: TransferId },
    /// Terminal failure, reported exactly once.
    Failed { id: TransferId, error: Arc<Error> },
}

/// Channel the session reports [`TransferUpdate`]s on.
pub type TransferUpdateSender = tokio::sync::mpsc::UnboundedSender<TransferUpdate>;

/// Receiver half for the caller.
pub type TransferUpdateReceiver = tokio::sync::mpsc::UnboundedReceiver<TransferUpdate>;

/// Caller-facing control surface of a running transfer.
///
/// Object safe so callers can hold transfers of different client types
/// behind one reference; hence the boxed futures.
pub trait TransferControl: Send + Sync {
    /// The task's identifier.
    fn transfer_id(&self) -> TransferId;

    /// The task's current status.
    fn transfer_status(&self) -> TransferStatus;

    /// Pause the transfer, cancelling in-flight part operations.
    fn pause(&self) -> BoxFuture<'_, Result<()>>;

    /// Resume a paused transfer.
    fn resume(&self) -> BoxFuture<'_, Result<()>>;

    /// Cancel the transfer, aborting it on the backend.
    fn cancel(&self) -> BoxFuture<'_, Result<()>>;
}

/// Shared reference to a controllable transfer.
pub type TaskReference = Arc<dyn TransferControl>;

#[cfg(test)]
mod tests {
    use super::*;

    fn task() -> TransferTask {
        TransferTask::new(
            TransferKind::MultipartUpload,
            ObjectUri::new("bucket", "key"),
        )
    }

    #[test]
    fn status_flows_until_terminal() {
        let task = task();
        assert_eq!(task.status(), TransferStatus::Unknown);
        task.set_status(TransferStatus::InProgress).unwrap();
        task.set_status(TransferStatus::Paused).unwrap();
        task.set_status(TransferStatus::InProgress).unwrap();
        task.set_status(TransferStatus::Completed).unwrap();

        // Terminal status admits no further change.
        assert!(task.set_status(TransferStatus::InProgress).is_err());
        assert!(task.set_status(TransferStatus::Cancelled).is_err());
        // Re-setting the terminal status itself is a no-op.
        task.set_status(TransferStatus::Completed).unwrap();
        assert_eq!(task.status(), TransferStatus::Completed);
    }

    #[test]
    fn retry_counter_is_monotonic() {
        let task = task();
        assert!(task.is_below_retry_limit(3));
        assert_eq!(task.increment_retry_count(), 1);
        assert_eq!(task.increment_retry_count(), 2);
        assert_eq!(task.increment_retry_count(), 3);
        assert!(!task.is_below_retry_limit(3));
        assert_eq!(task.retry_count(), 3);
    }

    #[test]
    fn handle_round_trips() {
        let task = task();
        assert!(task.handle().is_none());
        task.set_handle(Some(TaskHandle::new(7)));
        assert_eq!(task.handle(), Some(TaskHandle::new(7)));
        task.set_handle(None);
        assert!(task.handle().is_none());
    }
}
