//! This module contains `MultipartUploadClient`, which defines the
//! operations a session needs during a multipart upload, and the default
//! implementation composing the SDK, the file system, and the background
//! transport.
use crate::error::Result;
use crate::fs::FileSystem;
use crate::parts::PartNumber;
use crate::state::UploadId;
use crate::transport::{
    TaskHandle, TransportEventSender, TransportSession, TransportUploadRequest,
};
use crate::uri::ObjectUri;

use futures::future::Future;
use std::ops::Deref;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

mod request;
pub use request::{AbortRequest, CompleteRequest, CreateRequest, UploadPartRequest};

mod sdk;
pub use sdk::{PresignedUploadPart, SdkClient, ServiceErrorKind};

/// Everything the client needs to start one part's upload.
#[derive(Debug)]
pub struct PartUpload {
    /// The upload this part belongs to.
    pub id: UploadId,
    /// The destination object.
    pub uri: ObjectUri,
    /// The 1-based part number.
    pub part_number: PartNumber,
    /// The source file being uploaded.
    pub source: PathBuf,
    /// Byte offset of this part within the source file.
    pub offset: u64,
    /// Byte length of this part.
    pub bytes: u64,
    /// Where the transport delivers progress and completion events.
    pub events: TransportEventSender,
}

/// A part upload created suspended in the transport.
#[derive(Debug)]
pub struct CreatedPartUpload {
    /// Handle of the suspended transport operation.
    pub handle: TaskHandle,
    /// The partial file backing the part body.  The session removes it once
    /// the part reaches a terminal outcome or its operation is cancelled.
    pub body: PathBuf,
}

/// `MultipartUploadClient` represents the atomic operations in a multipart
/// upload, executed on the session's behalf.
pub trait MultipartUploadClient: Send + Sync {
    /// Issue the backend create call, returning the assigned upload id.
    fn create_multipart_upload(
        &self,
        req: CreateRequest,
    ) -> impl Future<Output = Result<UploadId>> + Send;

    /// Partition the source file for one part, pre-sign its PUT, and create
    /// the background transport operation suspended, returning its handle
    /// and the partial file behind it.
    ///
    /// The session records the handle before resuming the operation, so no
    /// event can arrive for a handle it does not know.
    fn upload_part(&self, req: PartUpload)
    -> impl Future<Output = Result<CreatedPartUpload>> + Send;

    /// Begin a part upload created by [`upload_part`](Self::upload_part).
    fn resume_part_upload(&self, handle: TaskHandle) -> impl Future<Output = Result<()>> + Send;

    /// Issue the backend complete call with the ordered part list.
    fn complete_multipart_upload(
        &self,
        req: CompleteRequest,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Issue the backend abort call.
    fn abort_multipart_upload(&self, req: AbortRequest) -> impl Future<Output = Result<()>> + Send;

    /// Cancel the named in-flight part operations.  Resolves once the
    /// transport confirms no further events will be delivered for them;
    /// pause blocks on this.
    fn cancel_upload_tasks(&self, handles: Vec<TaskHandle>) -> impl Future<Output = ()> + Send;
}

impl<D, T> MultipartUploadClient for T
where
    D: MultipartUploadClient,
    T: Deref<Target = D> + Send + Sync,
{
    async fn create_multipart_upload(&self, req: CreateRequest) -> Result<UploadId> {
        self.deref().create_multipart_upload(req).await
    }

    async fn upload_part(&self, req: PartUpload) -> Result<CreatedPartUpload> {
        self.deref().upload_part(req).await
    }

    async fn resume_part_upload(&self, handle: TaskHandle) -> Result<()> {
        self.deref().resume_part_upload(handle).await
    }

    async fn complete_multipart_upload(&self, req: CompleteRequest) -> Result<()> {
        self.deref().complete_multipart_upload(req).await
    }

    async fn abort_multipart_upload(&self, req: AbortRequest) -> Result<()> {
        self.deref().abort_multipart_upload(req).await
    }

    async fn cancel_upload_tasks(&self, handles: Vec<TaskHandle>) {
        self.deref().cancel_upload_tasks(handles).await
    }
}

/// The default client: SDK calls for the protocol operations, local
/// partial files for part bodies, and a [`TransportSession`] for the
/// part PUTs themselves.
#[derive(Debug, Clone)]
pub struct DefaultMultipartUploadClient<T> {
    sdk: SdkClient,
    fs: FileSystem,
    transport: Arc<T>,
    presign_expiry: Duration,
}

impl<T: TransportSession> DefaultMultipartUploadClient<T> {
    /// Compose a client from its collaborators.
    pub fn new(sdk: SdkClient, fs: FileSystem, transport: Arc<T>, presign_expiry: Duration) -> Self {
        Self {
            sdk,
            fs,
            transport,
            presign_expiry,
        }
    }
}

impl<T: TransportSession> MultipartUploadClient for DefaultMultipartUploadClient<T> {
    async fn create_multipart_upload(&self, req: CreateRequest) -> Result<UploadId> {
        let uri = req.uri().clone();
        let id = self.sdk.create_upload(req).await?;
        debug!(%uri, %id, "created multipart upload");
        Ok(id)
    }

    async fn upload_part(&self, req: PartUpload) -> Result<CreatedPartUpload> {
        let partial = self
            .fs
            .create_partial_file(&req.source, req.offset, req.bytes)
            .await?;

        let presigned = match self
            .sdk
            .presign_upload_part(
                UploadPartRequest::new(
                    req.id.clone(),
                    req.uri.clone(),
                    req.part_number,
                    req.bytes,
                ),
                self.presign_expiry,
            )
            .await
        {
            Ok(presigned) => presigned,
            Err(e) => {
                let _ = self.fs.remove_file_if_exists(&partial).await;
                return Err(e);
            }
        };

        let handle = match self
            .transport
            .create_upload(TransportUploadRequest {
                url: presigned.url,
                headers: presigned.headers,
                body: partial.clone(),
                events: req.events,
            })
            .await
        {
            Ok(handle) => handle,
            Err(e) => {
                let _ = self.fs.remove_file_if_exists(&partial).await;
                return Err(e);
            }
        };
        debug!(id = %req.id, part = %req.part_number, %handle, "created part upload");
        Ok(CreatedPartUpload {
            handle,
            body: partial,
        })
    }

    async fn resume_part_upload(&self, handle: TaskHandle) -> Result<()> {
        self.transport.resume_upload(handle).await
    }

    async fn complete_multipart_upload(&self, req: CompleteRequest) -> Result<()> {
        let id = req.id().clone();
        self.sdk.complete_upload(req).await?;
        debug!(%id, "completed multipart upload");
        Ok(())
    }

    async fn abort_multipart_upload(&self, req: AbortRequest) -> Result<()> {
        let id = req.id().clone();
        self.sdk.abort_upload(req).await?;
        debug!(%id, "aborted multipart upload");
        Ok(())
    }

    async fn cancel_upload_tasks(&self, handles: Vec<TaskHandle>) {
        debug!(count = handles.len(), "cancelling in-flight part uploads");
        self.transport.cancel_tasks(handles).await;
    }
}
