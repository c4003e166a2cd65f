//! Seam to the platform background-transport subsystem.
//!
//! The engine never performs the part HTTP PUTs itself.  It hands each
//! presigned request to a [`TransportSession`], receives a numeric
//! [`TaskHandle`] for it, and is notified of progress and completion through
//! [`TransportEvent`]s delivered on the channel carried by the request.
//! Handles are the only link between a persisted transfer record and a
//! still-running network operation across a process restart.
use crate::error::Result;
use crate::parts::EntityTag;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::{self, Display, Formatter};
use std::path::PathBuf;
use tokio::sync::mpsc;

/// Numeric identifier of one network operation owned by the transport.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct TaskHandle(u64);

impl TaskHandle {
    /// Create a handle from the transport's numeric identifier.
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl Display for TaskHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "handle_{}", self.0)
    }
}

/// Sender half of a session's transport event channel.
pub type TransportEventSender = mpsc::UnboundedSender<TransportEvent>;

/// Receiver half of a session's transport event channel.
pub type TransportEventReceiver = mpsc::UnboundedReceiver<TransportEvent>;

/// Callback events the transport delivers for a running operation.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// Bytes written to the network so far.
    Progress {
        handle: TaskHandle,
        bytes_transferred: u64,
    },
    /// The operation finished and the backend returned an entity tag.
    Completed {
        handle: TaskHandle,
        etag: EntityTag,
    },
    /// The operation failed at the connectivity level.
    Failed { handle: TaskHandle, message: String },
}

impl TransportEvent {
    /// The handle of the operation this event belongs to.
    pub fn handle(&self) -> TaskHandle {
        match self {
            Self::Progress { handle, .. }
            | Self::Completed { handle, .. }
            | Self::Failed { handle, .. } => *handle,
        }
    }
}

/// A presigned PUT for the transport to execute in the background.
#[derive(Debug)]
pub struct TransportUploadRequest {
    /// Pre-signed URL authorizing the PUT.
    pub url: String,
    /// Additional request headers.
    pub headers: HashMap<String, String>,
    /// Path of the partial file holding this part's bytes.
    pub body: PathBuf,
    /// Where progress and completion events for this operation go.
    pub events: TransportEventSender,
}

/// Interface of the platform background-transport session.
///
/// Implementations create network operations suspended, begin them on
/// resume, cancel them by handle, and can enumerate the handles still
/// alive, which recovery uses to re-associate persisted records after a
/// restart.  The create/resume split lets the caller record the handle
/// before any event can be delivered for it.
pub trait TransportSession: Send + Sync {
    /// Create a suspended background upload, returning the handle
    /// identifying it.  No I/O happens and no event is delivered until the
    /// operation is resumed.
    fn create_upload(
        &self,
        req: TransportUploadRequest,
    ) -> impl Future<Output = Result<TaskHandle>> + Send;

    /// Begin a created upload.
    fn resume_upload(&self, handle: TaskHandle) -> impl Future<Output = Result<()>> + Send;

    /// Cancel the named operations.  Resolves once cancellation is
    /// confirmed and no further events will be delivered for them.
    fn cancel_tasks(&self, handles: Vec<TaskHandle>) -> impl Future<Output = ()> + Send;

    /// Handles of the operations still alive in this transport session.
    fn active_handles(&self) -> impl Future<Output = Vec<TaskHandle>> + Send;
}
