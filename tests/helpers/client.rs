use s3_multipart_transfer::error::{Error, ErrorKind, Result};
use s3_multipart_transfer::{
    AbortRequest, CompleteRequest, CompletedPart, CreateRequest, CreatedPartUpload, EntityTag,
    MultipartUploadClient, ObjectUri, PartNumber, PartUpload, TaskHandle, TransportEvent,
    TransportEventSender, TransportSession, TransportUploadRequest, UploadId,
};

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use tempfile::TempDir;

/// What the mock transport does with a part once it is resumed.
#[derive(Debug, Clone)]
pub enum PartOutcome {
    /// Report completion immediately.
    Complete,
    /// Report a connectivity failure.
    Fail,
    /// Stay in flight until finished, failed, or cancelled by the test.
    Hold,
    /// Refuse to create the operation at all.
    StartError,
}

#[derive(Debug)]
struct ScriptedUpload {
    events: TransportEventSender,
    outcome: PartOutcome,
    etag: EntityTag,
}

#[derive(Debug, Default)]
struct TransportInner {
    next_handle: u64,
    created: HashMap<TaskHandle, ScriptedUpload>,
    active: HashMap<TaskHandle, ScriptedUpload>,
    cancelled: Vec<TaskHandle>,
    seeded: Vec<TaskHandle>,
}

/// In-memory stand-in for the platform background transport.
///
/// Operations are created suspended with a scripted outcome that plays out
/// when they are resumed; held operations can be finished or failed from
/// the test body.
#[derive(Debug, Default)]
pub struct MockTransport {
    inner: Mutex<TransportInner>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, TransportInner> {
        self.inner.lock().unwrap()
    }

    fn create_scripted(
        &self,
        events: TransportEventSender,
        outcome: PartOutcome,
        etag: EntityTag,
    ) -> Result<TaskHandle> {
        let mut inner = self.lock();
        if matches!(outcome, PartOutcome::StartError) {
            return Err(Error::from_kind(
                ErrorKind::Transport,
                "transport refused to create the operation",
            ));
        }
        inner.next_handle += 1;
        let handle = TaskHandle::new(inner.next_handle);
        inner.created.insert(
            handle,
            ScriptedUpload {
                events,
                outcome,
                etag,
            },
        );
        Ok(handle)
    }

    /// Handles currently in flight.
    pub fn active(&self) -> Vec<TaskHandle> {
        self.lock().active.keys().copied().collect()
    }

    /// Handles the session asked to cancel, in order.
    pub fn cancelled(&self) -> Vec<TaskHandle> {
        self.lock().cancelled.clone()
    }

    /// Complete a held operation from the test body.
    pub fn finish(&self, handle: TaskHandle) {
        let upload = self.lock().active.remove(&handle);
        if let Some(upload) = upload {
            let _ = upload.events.send(TransportEvent::Completed {
                handle,
                etag: upload.etag,
            });
        }
    }

    /// Fail a held operation from the test body.
    pub fn fail(&self, handle: TaskHandle, message: &str) {
        let upload = self.lock().active.remove(&handle);
        if let Some(upload) = upload {
            let _ = upload.events.send(TransportEvent::Failed {
                handle,
                message: message.to_string(),
            });
        }
    }

    /// Report transferred bytes for a held operation.
    pub fn progress(&self, handle: TaskHandle, bytes_transferred: u64) {
        let inner = self.lock();
        if let Some(upload) = inner.active.get(&handle) {
            let _ = upload.events.send(TransportEvent::Progress {
                handle,
                bytes_transferred,
            });
        }
    }

    /// Pretend `handle` survived a process restart, for recovery tests.
    pub fn seed_live_handle(&self, handle: TaskHandle) {
        self.lock().seeded.push(handle);
    }
}

impl TransportSession for MockTransport {
    async fn create_upload(&self, req: TransportUploadRequest) -> Result<TaskHandle> {
        self.create_scripted(req.events, PartOutcome::Complete, EntityTag::from("etag"))
    }

    async fn resume_upload(&self, handle: TaskHandle) -> Result<()> {
        let outcome = {
            let mut inner = self.lock();
            let Some(upload) = inner.created.remove(&handle) else {
                return Err(Error::from_kind(ErrorKind::Transport, "unknown handle"));
            };
            let outcome = upload.outcome.clone();
            inner.active.insert(handle, upload);
            outcome
        };
        match outcome {
            PartOutcome::Complete => self.finish(handle),
            PartOutcome::Fail => self.fail(handle, "connection reset"),
            PartOutcome::Hold | PartOutcome::StartError => {}
        }
        Ok(())
    }

    async fn cancel_tasks(&self, handles: Vec<TaskHandle>) {
        let mut inner = self.lock();
        for handle in handles {
            inner.created.remove(&handle);
            inner.active.remove(&handle);
            inner.cancelled.push(handle);
        }
    }

    async fn active_handles(&self) -> Vec<TaskHandle> {
        let inner = self.lock();
        inner
            .seeded
            .iter()
            .copied()
            .chain(inner.active.keys().copied())
            .collect()
    }
}

#[derive(Debug, Default)]
struct ClientInner {
    fail_create: bool,
    fail_complete: bool,
    fail_abort: bool,
    outcomes: HashMap<PartNumber, VecDeque<PartOutcome>>,
    upload_counter: u64,
    part_starts: HashMap<PartNumber, u32>,
    created: Vec<ObjectUri>,
    completed: Vec<(UploadId, Vec<CompletedPart>)>,
    aborted: Vec<UploadId>,
}

/// Scriptable in-memory client.
///
/// Protocol calls succeed and are recorded unless told otherwise; part
/// uploads play out the outcome scripted for their part number, one entry
/// per attempt, defaulting to immediate completion.
#[derive(Debug)]
pub struct TestClient {
    transport: Arc<MockTransport>,
    /// Holds a real file per started part, standing in for the partial
    /// files a production client partitions the source into.
    work_dir: TempDir,
    inner: Mutex<ClientInner>,
}

impl TestClient {
    pub fn new(transport: Arc<MockTransport>) -> Self {
        Self {
            transport,
            work_dir: tempfile::tempdir().unwrap(),
            inner: Mutex::new(ClientInner::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ClientInner> {
        self.inner.lock().unwrap()
    }

    pub fn fail_create(self) -> Self {
        self.lock().fail_create = true;
        self
    }

    pub fn fail_complete(self) -> Self {
        self.lock().fail_complete = true;
        self
    }

    pub fn fail_abort(self) -> Self {
        self.lock().fail_abort = true;
        self
    }

    /// Script the outcome of each successive attempt of one part.
    pub fn part_outcomes(self, part_number: i32, outcomes: Vec<PartOutcome>) -> Self {
        self.lock()
            .outcomes
            .insert(PartNumber::new(part_number), outcomes.into());
        self
    }

    /// Hold every part of the given numbers in flight.
    pub fn hold_parts(self, part_numbers: impl IntoIterator<Item = i32>) -> Self {
        {
            let mut inner = self.lock();
            for n in part_numbers {
                inner
                    .outcomes
                    .entry(PartNumber::new(n))
                    .or_default()
                    .push_back(PartOutcome::Hold);
            }
        }
        self
    }

    /// Number of times the given part's upload was started.
    pub fn part_start_count(&self, part_number: i32) -> u32 {
        self.lock()
            .part_starts
            .get(&PartNumber::new(part_number))
            .copied()
            .unwrap_or(0)
    }

    /// The complete calls received, with their ordered part lists.
    pub fn completed(&self) -> Vec<(UploadId, Vec<CompletedPart>)> {
        self.lock().completed.clone()
    }

    /// The upload ids aborted so far.
    pub fn aborted(&self) -> Vec<UploadId> {
        self.lock().aborted.clone()
    }

    /// The object uris created so far.
    pub fn created(&self) -> Vec<ObjectUri> {
        self.lock().created.clone()
    }

    /// Number of part body files still on disk.
    pub fn part_files(&self) -> usize {
        std::fs::read_dir(self.work_dir.path()).unwrap().count()
    }
}

impl MultipartUploadClient for TestClient {
    async fn create_multipart_upload(&self, req: CreateRequest) -> Result<UploadId> {
        let mut inner = self.lock();
        if inner.fail_create {
            return Err(Error::from_kind(ErrorKind::Service, "create refused"));
        }
        inner.upload_counter += 1;
        inner.created.push(req.uri().clone());
        Ok(UploadId::from(format!(
            "test-upload-{}",
            inner.upload_counter
        )))
    }

    async fn upload_part(&self, req: PartUpload) -> Result<CreatedPartUpload> {
        let outcome = {
            let mut inner = self.lock();
            *inner.part_starts.entry(req.part_number).or_insert(0) += 1;
            inner
                .outcomes
                .get_mut(&req.part_number)
                .and_then(VecDeque::pop_front)
                .unwrap_or(PartOutcome::Complete)
        };
        let etag = EntityTag::from(format!("etag-{}", *req.part_number));
        let handle = self.transport.create_scripted(req.events, outcome, etag)?;
        let body = self.work_dir.path().join(format!("part-{handle}.bin"));
        tokio::fs::write(&body, b"").await.unwrap();
        Ok(CreatedPartUpload { handle, body })
    }

    async fn resume_part_upload(&self, handle: TaskHandle) -> Result<()> {
        self.transport.resume_upload(handle).await
    }

    async fn complete_multipart_upload(&self, req: CompleteRequest) -> Result<()> {
        let mut inner = self.lock();
        if inner.fail_complete {
            return Err(Error::from_kind(ErrorKind::Service, "complete refused"));
        }
        inner
            .completed
            .push((req.id().clone(), req.completed_parts().to_vec()));
        Ok(())
    }

    async fn abort_multipart_upload(&self, req: AbortRequest) -> Result<()> {
        let mut inner = self.lock();
        if inner.fail_abort {
            return Err(Error::from_kind(ErrorKind::Service, "abort refused"));
        }
        inner.aborted.push(req.id().clone());
        Ok(())
    }

    async fn cancel_upload_tasks(&self, handles: Vec<TaskHandle>) {
        self.transport.cancel_tasks(handles).await;
    }
}
