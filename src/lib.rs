//! # Description
//!
//! A client-side engine for large-file uploads to S3 using the multipart
//! upload protocol of the official [SDK] for Rust.
//!
//! The engine splits a source file into parts, uploads the parts
//! concurrently through a pluggable background [`TransportSession`], tracks
//! per-part and whole-upload progress, and drives the backend through the
//! create, upload-parts, and complete (or abort) lifecycle exactly once.
//! Uploads can be paused and resumed, failed parts are retried against a
//! bounded budget, and every outstanding transfer is mirrored to a
//! [`TransferDatabase`] so an in-flight upload survives a process restart.
//!
//! The moving pieces:
//!
//! - [`MultipartUploadSession`] orchestrates one upload: it owns the
//!   [`MultipartUpload`] state machine, runs the concurrency-limited part
//!   scheduler, and enforces the retry budget.
//! - [`MultipartUploadClient`] executes the backend calls on the session's
//!   behalf; [`DefaultMultipartUploadClient`] composes the SDK client, the
//!   local [`FileSystem`], and the transport.
//! - [`TransportSession`] is the seam to the platform subsystem that
//!   performs the part PUTs and delivers progress callbacks by numeric
//!   handle.
//! - [`TransferDatabase`] persists one JSON record per transfer and pairs
//!   the records with still-live transport handles at recovery time.
//!
//! # Examples
//!
//! ```no_run
//! # use s3_multipart_transfer::error::Result;
//! # use s3_multipart_transfer::{TaskHandle, TransportSession, TransportUploadRequest};
//! # struct BackgroundTransport;
//! # impl TransportSession for BackgroundTransport {
//! #     async fn create_upload(&self, _req: TransportUploadRequest) -> Result<TaskHandle> {
//! #         Ok(TaskHandle::new(1))
//! #     }
//! #     async fn resume_upload(&self, _handle: TaskHandle) -> Result<()> {
//! #         Ok(())
//! #     }
//! #     async fn cancel_tasks(&self, _handles: Vec<TaskHandle>) {}
//! #     async fn active_handles(&self) -> Vec<TaskHandle> {
//! #         Vec::new()
//! #     }
//! # }
//! # async fn f() -> anyhow::Result<()> {
//! use s3_multipart_transfer::{
//!     DefaultMultipartUploadClient, FileSystem, MultipartUploadSession, ObjectUri, SdkClient,
//!     TransferConfig, TransferDatabase, TransferKind, TransferTask, TransferUpdate, UploadFile,
//! };
//! use std::sync::Arc;
//!
//! // `aws_config` is re-exported for convenience, as is `aws_sdk_s3` under
//! // the symbol `aws_sdk`.
//! let shared = s3_multipart_transfer::aws_config::load_defaults(
//!     s3_multipart_transfer::aws_config::BehaviorVersion::latest(),
//! )
//! .await;
//!
//! // The default client: SDK protocol calls, presigned part PUTs executed
//! // by the platform's background transport.
//! let config = TransferConfig::default();
//! let client = DefaultMultipartUploadClient::new(
//!     SdkClient::from_sdk_config(shared),
//!     FileSystem::default(),
//!     Arc::new(BackgroundTransport),
//!     config.presign_expiry,
//! );
//!
//! let database = Arc::new(TransferDatabase::open("/var/lib/transfers").await?);
//! let task = TransferTask::new(
//!     TransferKind::MultipartUpload,
//!     ObjectUri::new("a-bucket-us-east-1", "an/object/key.bin"),
//! );
//! let (updates, mut events) = tokio::sync::mpsc::unbounded_channel();
//!
//! let session = MultipartUploadSession::new(client, config, database, task, updates);
//! session
//!     .start_upload(UploadFile::new("/data/large-file.bin", 500 * 1024 * 1024))
//!     .await?;
//!
//! while let Some(update) = events.recv().await {
//!     match update {
//!         TransferUpdate::Completed { id } => {
//!             println!("upload {id} finished");
//!             break;
//!         }
//!         TransferUpdate::Failed { id, error } => anyhow::bail!("upload {id} failed: {error}"),
//!         _ => {}
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! [SDK]: https://awslabs.github.io/aws-sdk-rust/

#[doc(hidden)]
pub extern crate aws_config;
#[doc(hidden)]
pub extern crate aws_sdk_s3 as aws_sdk;

mod client;
pub use client::{
    AbortRequest, CompleteRequest, CreateRequest, CreatedPartUpload,
    DefaultMultipartUploadClient, MultipartUploadClient, PartUpload, PresignedUploadPart,
    SdkClient, ServiceErrorKind, UploadPartRequest,
};

mod config;
pub use config::TransferConfig;

pub mod error;

mod fs;
pub use fs::FileSystem;

mod part_size;
pub use part_size::PartSize;

mod parts;
pub use parts::{CompletedPart, CompletedParts, EntityTag, PartNumber, UploadPart, UploadParts};

mod persist;
pub use persist::{
    PersistableMultipartUpload, PersistableSubTask, PersistableTransferTask, TransferDatabase,
    TransferPair,
};

mod session;
pub use session::MultipartUploadSession;

mod state;
pub use state::{MultipartUpload, MultipartUploadEvent, UploadFile, UploadId, UploadPartEvent};

mod task;
pub use task::{
    TaskReference, TransferControl, TransferId, TransferKind, TransferStatus, TransferTask,
    TransferUpdate, TransferUpdateReceiver, TransferUpdateSender,
};

mod transport;
pub use transport::{
    TaskHandle, TransportEvent, TransportEventReceiver, TransportEventSender, TransportSession,
    TransportUploadRequest,
};

mod uri;
#[doc(inline)]
pub use uri::{Bucket, Key, ObjectUri};

// https://docs.aws.amazon.com/AmazonS3/latest/userguide/qfacts.html
/// Smallest permitted part size, except for the final part of an upload.
pub const MIN_PART_SIZE: u64 = 5 * 1024 * 1024;
/// Largest permitted part size.
pub const MAX_PART_SIZE: u64 = 5 * 1024 * 1024 * 1024;
/// Largest permitted object size.
pub const MAX_OBJECT_SIZE: u64 = 5 * 1024 * 1024 * 1024 * 1024;
/// Largest permitted number of parts in one upload.
pub const MAX_PART_COUNT: u64 = 10_000;
