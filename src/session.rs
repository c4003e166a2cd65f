//! The multipart-upload session, the orchestrator of one upload.
//!
//! The session is the only component that mutates its state machine.  All
//! mutation happens under one async mutex, never held across client I/O, so
//! concurrent transport callbacks cannot interleave half-applied
//! transitions.  Transport events arrive on an unbounded channel pumped by a
//! task the session spawns; the pump holds a weak reference and stops when
//! the session is dropped.
use crate::client::{
    AbortRequest, CompleteRequest, CreateRequest, MultipartUploadClient, PartUpload,
};
use crate::config::TransferConfig;
use crate::error::{Error, ErrorRepr, Result};
use crate::fs::FileSystem;
use crate::persist::{PersistableSubTask, PersistableTransferTask, TransferDatabase, TransferPair};
use crate::parts::PartNumber;
use crate::state::{MultipartUpload, MultipartUploadEvent, UploadFile, UploadPartEvent};
use crate::task::{
    TransferControl, TransferId, TransferStatus, TransferTask, TransferUpdate,
    TransferUpdateSender,
};
use crate::transport::{TaskHandle, TransportEvent, TransportEventSender};

use futures::future::BoxFuture;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Weak};
use tracing::{debug, info, trace, warn};

/// What the session does next after applying an event, decided under the
/// state lock and executed after releasing it.
enum FollowUp {
    None,
    Schedule,
    Complete,
    Retry {
        part_number: PartNumber,
        error: Arc<Error>,
    },
}

struct SessionState {
    upload: MultipartUpload,
    /// Transfer ids of the persisted per-part records, by part number.
    /// A restarted part reuses its id so each part keeps one record.
    part_records: HashMap<PartNumber, TransferId>,
    /// Partial files backing the in-flight part bodies, by handle.
    part_bodies: HashMap<TaskHandle, PathBuf>,
    /// Whether the caller has been told the terminal outcome.
    reported: bool,
}

/// Orchestrates one multipart upload end to end.
///
/// Owns the state machine and the transfer task, runs the
/// concurrency-limited part scheduler, enforces the per-part retry budget,
/// and writes every lifecycle transition through to the transfer database.
pub struct MultipartUploadSession<C> {
    client: C,
    config: TransferConfig,
    database: Arc<TransferDatabase>,
    fs: FileSystem,
    task: TransferTask,
    updates: TransferUpdateSender,
    transport_events: TransportEventSender,
    state: tokio::sync::Mutex<SessionState>,
}

impl<C> MultipartUploadSession<C>
where
    C: MultipartUploadClient + 'static,
{
    /// Create a session for a new upload.
    ///
    /// The task should be of the multipart-upload kind; progress and the
    /// terminal outcome are delivered on `updates`.
    pub fn new(
        client: C,
        config: TransferConfig,
        database: Arc<TransferDatabase>,
        task: TransferTask,
        updates: TransferUpdateSender,
    ) -> Arc<Self> {
        Self::build(client, config, database, task, updates, MultipartUpload::None, HashMap::new())
    }

    /// Rebuild a session from a recovered record pair.
    ///
    /// Fails when the pair carries no multipart-upload state.  Call
    /// [`restart`](Self::restart) afterwards to put the upload back in
    /// motion.
    pub fn from_recovered(
        client: C,
        config: TransferConfig,
        database: Arc<TransferDatabase>,
        pair: TransferPair,
        updates: TransferUpdateSender,
    ) -> Result<Arc<Self>> {
        let upload = pair
            .upload
            .ok_or(ErrorRepr::Missing("TransferPair", "multipart upload state"))?;
        let part_records = upload
            .upload_id()
            .map(|id| database.part_record_ids(id))
            .unwrap_or_default();
        let task = pair.task.rebuild_task();
        Ok(Self::build(
            client,
            config,
            database,
            task,
            updates,
            upload,
            part_records,
        ))
    }

    fn build(
        client: C,
        config: TransferConfig,
        database: Arc<TransferDatabase>,
        task: TransferTask,
        updates: TransferUpdateSender,
        upload: MultipartUpload,
        part_records: HashMap<PartNumber, TransferId>,
    ) -> Arc<Self> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let session = Arc::new(Self {
            client,
            config,
            database,
            fs: FileSystem::default(),
            task,
            updates,
            transport_events: tx,
            state: tokio::sync::Mutex::new(SessionState {
                upload,
                part_records,
                part_bodies: HashMap::new(),
                reported: false,
            }),
        });
        Self::spawn_event_pump(&session, rx);
        session
    }

    fn spawn_event_pump(
        session: &Arc<Self>,
        mut rx: tokio::sync::mpsc::UnboundedReceiver<TransportEvent>,
    ) {
        let weak: Weak<Self> = Arc::downgrade(session);
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let Some(session) = weak.upgrade() else {
                    break;
                };
                session.handle_transport_event(event).await;
            }
        });
    }

    /// The session's transfer id.
    pub fn id(&self) -> TransferId {
        self.task.id()
    }

    /// The session's transfer task.
    pub fn task(&self) -> &TransferTask {
        &self.task
    }

    /// Start the upload: issue the backend create call, build the part
    /// collection, and schedule the first batch of parts.
    ///
    /// Errors from this initiation phase are returned directly and are not
    /// repeated on the update channel.
    pub async fn start_upload(&self, file: UploadFile) -> Result<()> {
        {
            let mut guard = self.state.lock().await;
            guard.upload.transition(MultipartUploadEvent::Creating)?;
        }
        self.task.set_status(TransferStatus::InProgress)?;
        self.persist_snapshot().await?;
        self.notify(TransferUpdate::Initiated { id: self.task.id() });
        info!(id = %self.task.id(), uri = %self.task.uri(), size = file.size, "starting multipart upload");

        let mut req = CreateRequest::new(self.task.uri().clone());
        if let Some(content_type) = self.task.content_type_value() {
            req = req.content_type(content_type);
        }

        let result = async {
            let upload_id = self.client.create_multipart_upload(req).await?;
            {
                let mut guard = self.state.lock().await;
                guard.upload.transition(MultipartUploadEvent::Created {
                    file: file.clone(),
                    upload_id,
                })?;
                guard
                    .upload
                    .create_parts(self.config.min_part_size, self.config.max_part_count)?;
            }
            self.persist_snapshot().await?;
            self.run_scheduler().await
        }
        .await;

        match result {
            Ok(()) => Ok(()),
            Err(e) => Err(self.fail_and_return(e).await),
        }
    }

    /// Put a recovered session back in motion.
    ///
    /// A session recovered in the created phase regenerates its parts; a
    /// paused one stays paused until [`resume`](Self::resume) is called.
    pub async fn restart(&self) -> Result<()> {
        let schedule = {
            let mut guard = self.state.lock().await;
            if matches!(guard.upload, MultipartUpload::Created { .. }) {
                guard
                    .upload
                    .create_parts(self.config.min_part_size, self.config.max_part_count)?;
            }
            guard.upload.is_uploading_parts()
        };
        self.persist_snapshot().await?;
        if schedule {
            self.task.set_status(TransferStatus::InProgress)?;
            info!(id = %self.task.id(), "restarting recovered multipart upload");
            self.run_scheduler().await?;
        }
        Ok(())
    }

    /// Pause the upload.
    ///
    /// Resets every claimed and in-flight part to pending, then waits,
    /// bounded by the configured cancel timeout, for the transport to
    /// confirm cancellation of the collected handles so no stray completion
    /// races the pause.  Pausing an already paused session is a no-op.
    pub async fn pause(&self) -> Result<()> {
        let (was_paused, handles, progress) = {
            let mut guard = self.state.lock().await;
            let was_paused = guard.upload.is_paused();
            let handles = guard
                .upload
                .parts()
                .map(|p| p.in_progress_handles())
                .unwrap_or_default();
            guard.upload.transition(MultipartUploadEvent::Pausing)?;
            let progress = guard
                .upload
                .parts()
                .map(|p| (p.bytes_transferred(), p.total_bytes()));
            (was_paused, handles, progress)
        };
        if was_paused {
            return Ok(());
        }
        self.task.set_status(TransferStatus::Paused)?;
        self.persist_snapshot().await?;
        info!(id = %self.task.id(), in_flight = handles.len(), "pausing multipart upload");

        if !handles.is_empty() {
            let cancelled = tokio::time::timeout(
                self.config.cancel_timeout,
                self.client.cancel_upload_tasks(handles.clone()),
            )
            .await;
            if cancelled.is_err() {
                warn!(id = %self.task.id(), "transport did not confirm cancellation before the timeout");
            }
            self.remove_part_bodies(&handles).await;
        }
        if let Some((bytes_transferred, total_bytes)) = progress {
            self.notify(TransferUpdate::Progress {
                id: self.task.id(),
                bytes_transferred,
                total_bytes,
            });
        }
        Ok(())
    }

    /// Resume a paused upload and reschedule its pending parts.
    pub async fn resume(&self) -> Result<()> {
        {
            let mut guard = self.state.lock().await;
            guard.upload.transition(MultipartUploadEvent::Resuming)?;
        }
        self.task.set_status(TransferStatus::InProgress)?;
        self.persist_snapshot().await?;
        info!(id = %self.task.id(), "resuming multipart upload");
        self.run_scheduler().await
    }

    /// Cancel the upload: abort it on the backend and report a cancelled
    /// failure to the caller.
    pub async fn cancel(&self) -> Result<()> {
        self.abort(None).await
    }

    /// Abort the upload, optionally because of `error`.
    async fn abort(&self, error: Option<Arc<Error>>) -> Result<()> {
        let (upload_id, handles) = {
            let mut guard = self.state.lock().await;
            let Some(upload_id) = guard.upload.upload_id().cloned() else {
                // Nothing was allocated server-side yet; cancelling is a
                // plain failure.
                drop(guard);
                self.fail_session(Error::cancelled()).await;
                return Ok(());
            };
            let handles = guard
                .upload
                .parts()
                .map(|p| p.in_progress_handles())
                .unwrap_or_default();
            guard.upload.transition(MultipartUploadEvent::Aborting {
                error: error.clone(),
            })?;
            (upload_id, handles)
        };
        info!(id = %self.task.id(), %upload_id, "aborting multipart upload");

        if !handles.is_empty() {
            let cancelled = tokio::time::timeout(
                self.config.cancel_timeout,
                self.client.cancel_upload_tasks(handles.clone()),
            )
            .await;
            if cancelled.is_err() {
                warn!(id = %self.task.id(), "transport did not confirm cancellation before the timeout");
            }
            self.remove_part_bodies(&handles).await;
        }

        let req = AbortRequest::new(upload_id.clone(), self.task.uri().clone());
        match self.client.abort_multipart_upload(req).await {
            Ok(()) => {
                {
                    let mut guard = self.state.lock().await;
                    guard.upload.transition(MultipartUploadEvent::Aborted {
                        upload_id,
                        error: error.clone(),
                    })?;
                }
                let _ = self.task.set_status(TransferStatus::Cancelled);
                self.cleanup_terminal().await;
                self.report_failed(error.unwrap_or_else(|| Arc::new(Error::cancelled())))
                    .await;
                Ok(())
            }
            Err(e) => {
                self.fail_session(e).await;
                Ok(())
            }
        }
    }

    /// Route one transport callback onto the state machine.  Errors here
    /// fail the whole session.
    async fn handle_transport_event(&self, event: TransportEvent) {
        if let Err(e) = self.dispatch_transport_event(event).await {
            self.fail_session(e).await;
        }
    }

    async fn dispatch_transport_event(&self, event: TransportEvent) -> Result<()> {
        let handle = event.handle();
        let part_event = {
            let guard = self.state.lock().await;
            // Part events are ignored unless parts are uploading; a stale
            // completion arriving after a pause or failure lands here.
            if !guard.upload.is_uploading_parts() {
                trace!(%handle, state = %guard.upload, "dropping transport event");
                return Ok(());
            }
            let Some(part_number) = guard
                .upload
                .parts()
                .and_then(|p| p.find_by_handle(handle))
            else {
                trace!(%handle, "dropping transport event for unknown handle");
                return Ok(());
            };
            match event {
                TransportEvent::Progress {
                    bytes_transferred, ..
                } => UploadPartEvent::ProgressUpdated {
                    part_number,
                    bytes_transferred,
                },
                TransportEvent::Completed { etag, .. } => UploadPartEvent::Completed {
                    part_number,
                    etag,
                },
                TransportEvent::Failed { message, .. } => UploadPartEvent::Failed {
                    part_number,
                    error: Arc::new(Error::from(ErrorRepr::Transport { handle, message })),
                },
            }
        };
        // Completion or failure means the transport is done with the part's
        // body file.
        if matches!(
            part_event,
            UploadPartEvent::Completed { .. } | UploadPartEvent::Failed { .. }
        ) {
            self.remove_part_body(handle).await;
        }
        self.dispatch_part_event(part_event).await
    }

    /// Apply a part event and run whatever it unlocks: more scheduling,
    /// the completion call, or a retry.
    async fn dispatch_part_event(&self, event: UploadPartEvent) -> Result<()> {
        let part_number = event.part_number();
        let completed = event.is_completed();
        let (follow_up, progress) = {
            let mut guard = self.state.lock().await;
            if !guard.upload.is_uploading_parts() {
                return Ok(());
            }
            match &event {
                UploadPartEvent::Failed { error, .. } => {
                    let error = error.clone();
                    guard.upload.transition_part(event.clone())?;
                    (
                        FollowUp::Retry { part_number, error },
                        None,
                    )
                }
                _ => {
                    guard.upload.transition_part(event.clone())?;
                    if completed {
                        let progress = guard
                            .upload
                            .parts()
                            .map(|p| (p.bytes_transferred(), p.total_bytes()));
                        let follow_up = if guard.upload.parts_completed() {
                            FollowUp::Complete
                        } else {
                            FollowUp::Schedule
                        };
                        (follow_up, progress)
                    } else {
                        (FollowUp::None, None)
                    }
                }
            }
        };

        if let Some((bytes_transferred, total_bytes)) = progress {
            trace!(id = %self.task.id(), %part_number, bytes_transferred, total_bytes, "part completed");
            self.notify(TransferUpdate::Progress {
                id: self.task.id(),
                bytes_transferred,
                total_bytes,
            });
        }
        if completed {
            self.persist_part_completed(part_number, &event).await?;
        }

        match follow_up {
            FollowUp::None => Ok(()),
            FollowUp::Schedule => self.run_scheduler().await,
            FollowUp::Complete => self.complete_upload().await,
            FollowUp::Retry { part_number, error } => {
                if self.retry_part_upload(part_number, error).await? {
                    self.run_scheduler().await?;
                }
                Ok(())
            }
        }
    }

    /// Claim and start pending parts while below the concurrency limit.
    ///
    /// Idempotent: with no pending parts or at the ceiling this is a no-op.
    /// Re-checks the machine is still uploading parts between part starts,
    /// since a pause or abort can interleave at the I/O awaits.
    async fn run_scheduler(&self) -> Result<()> {
        let mut stray: Vec<(TaskHandle, PathBuf)> = Vec::new();
        loop {
            let batch: Vec<PartUpload> = {
                let mut guard = self.state.lock().await;
                let Some(parts) = guard.upload.parts() else {
                    break;
                };
                if !guard.upload.is_uploading_parts() {
                    break;
                }
                let active = parts.iter().filter(|p| !p.is_pending() && !p.is_completed() && !p.is_failed()).count();
                if active >= self.config.concurrency_limit {
                    break;
                }
                let pending = parts.pending_part_numbers();
                if pending.is_empty() {
                    break;
                }
                let take = std::cmp::min(self.config.concurrency_limit - active, pending.len());

                let (Some(upload_id), Some(file), Some(part_size)) = (
                    guard.upload.upload_id().cloned(),
                    guard.upload.file().cloned(),
                    guard.upload.part_size(),
                ) else {
                    break;
                };
                let mut batch = Vec::with_capacity(take);
                for part_number in pending.into_iter().take(take) {
                    guard
                        .upload
                        .transition_part(UploadPartEvent::Queued { part_number })?;
                    batch.push(PartUpload {
                        id: upload_id.clone(),
                        uri: self.task.uri().clone(),
                        part_number,
                        source: file.path.clone(),
                        offset: part_size.offset(part_number),
                        bytes: part_size.bytes(part_number, file.size),
                        events: self.transport_events.clone(),
                    });
                }
                batch
            };
            if batch.is_empty() {
                break;
            }
            debug!(id = %self.task.id(), batch = batch.len(), "scheduling part uploads");

            for req in batch {
                let part_number = req.part_number;
                let upload_id = req.id.clone();
                let bytes = req.bytes;
                match self.client.upload_part(req).await {
                    Ok(created) => {
                        let handle = created.handle;
                        let started = {
                            let mut guard = self.state.lock().await;
                            if guard.upload.is_uploading_parts() {
                                guard.upload.transition_part(UploadPartEvent::Started {
                                    part_number,
                                    handle,
                                })?;
                                guard.part_bodies.insert(handle, created.body);
                                true
                            } else {
                                // Paused or aborted while the start was in
                                // flight; the transport must drop this one.
                                stray.push((handle, created.body));
                                false
                            }
                        };
                        if started {
                            self.persist_part_started(part_number, upload_id, bytes, handle)
                                .await?;
                            // The handle is recorded; events for it can now
                            // be routed, so the PUT may begin.
                            if let Err(e) = self.client.resume_part_upload(handle).await {
                                let error = Arc::new(e);
                                {
                                    let mut guard = self.state.lock().await;
                                    if guard.upload.is_uploading_parts() {
                                        guard.upload.transition_part(UploadPartEvent::Failed {
                                            part_number,
                                            error: error.clone(),
                                        })?;
                                    }
                                }
                                self.remove_part_body(handle).await;
                                self.retry_part_upload(part_number, error).await?;
                            }
                        }
                    }
                    Err(e) => {
                        // The part is queued; record the failure and let the
                        // retry budget decide.  A granted retry resets it to
                        // pending, which the next loop pass picks up.
                        let error = Arc::new(e);
                        {
                            let mut guard = self.state.lock().await;
                            if guard.upload.is_uploading_parts() {
                                guard.upload.transition_part(UploadPartEvent::Failed {
                                    part_number,
                                    error: error.clone(),
                                })?;
                            }
                        }
                        self.retry_part_upload(part_number, error).await?;
                    }
                }
            }
        }
        if !stray.is_empty() {
            let handles = stray.iter().map(|(handle, _)| *handle).collect();
            self.client.cancel_upload_tasks(handles).await;
            for (handle, body) in stray {
                if let Err(e) = self.fs.remove_file_if_exists(&body).await {
                    warn!(%handle, error = %e, "failed to remove part body");
                }
            }
        }
        Ok(())
    }

    /// Decide a failed part's fate against the retry budget.
    ///
    /// Returns whether the part went back to pending; over budget the whole
    /// upload aborts instead, since an upload id is already allocated
    /// server-side and must be cleaned up.
    async fn retry_part_upload(&self, part_number: PartNumber, error: Arc<Error>) -> Result<bool> {
        if self.task.is_below_retry_limit(self.config.retry_limit) {
            let attempt = self.task.increment_retry_count();
            debug!(id = %self.task.id(), %part_number, attempt, error = %error, "retrying part upload");
            {
                let mut guard = self.state.lock().await;
                if !guard.upload.is_uploading_parts() {
                    return Ok(false);
                }
                guard.upload.retry_part(part_number)?;
            }
            self.persist_snapshot().await?;
            Ok(true)
        } else {
            warn!(id = %self.task.id(), %part_number, limit = self.config.retry_limit, "part upload retry budget exhausted");
            let exceeded = Error::retry_limit_exceeded(
                self.config.retry_limit,
                Some(error.to_string().into()),
            );
            self.abort(Some(Arc::new(exceeded))).await?;
            Ok(false)
        }
    }

    /// Validate and issue the backend complete call, then report success.
    async fn complete_upload(&self) -> Result<()> {
        let (req, file) = {
            let mut guard = self.state.lock().await;
            guard
                .upload
                .validate_for_completion(self.config.min_part_size)?;
            let (Some(upload_id), Some(parts)) =
                (guard.upload.upload_id().cloned(), guard.upload.parts())
            else {
                return Err(Error::invalid_parts("upload has no parts to complete"));
            };
            let completed = parts.completed_parts();
            let file = guard.upload.file().cloned();
            guard.upload.transition(MultipartUploadEvent::Completing)?;
            (
                CompleteRequest::new(upload_id, self.task.uri().clone(), completed),
                file,
            )
        };
        self.persist_snapshot().await?;

        let upload_id = req.id().clone();
        self.client.complete_multipart_upload(req).await?;
        {
            let mut guard = self.state.lock().await;
            guard
                .upload
                .transition(MultipartUploadEvent::Completed { upload_id })?;
        }
        self.task.set_status(TransferStatus::Completed)?;
        if let Some(file) = file
            && file.temporary_file_created
        {
            let _ = self.fs.remove_file_if_exists(&file.path).await;
        }
        self.cleanup_terminal().await;
        info!(id = %self.task.id(), uri = %self.task.uri(), "multipart upload completed");
        self.report_completed().await;
        Ok(())
    }

    /// Force the session into the failed state and report it once.
    async fn fail_session(&self, error: Error) {
        if self.fail_internal(&error).await {
            self.report_failed(Arc::new(error)).await;
        }
    }

    /// Like [`fail_session`], but hands the error back to the synchronous
    /// caller instead of the update channel.
    async fn fail_and_return(&self, error: Error) -> Error {
        if self.fail_internal(&error).await {
            let mut guard = self.state.lock().await;
            guard.reported = true;
        }
        error
    }

    /// Returns false when the session was already terminal.
    async fn fail_internal(&self, error: &Error) -> bool {
        {
            let mut guard = self.state.lock().await;
            if guard.upload.is_terminal() {
                return false;
            }
            guard.upload.fail(error);
        }
        warn!(id = %self.task.id(), %error, "multipart upload failed");
        let _ = self.task.set_status(TransferStatus::Error);
        self.cleanup_terminal().await;
        true
    }

    /// Remove the persisted records and any leftover part bodies once the
    /// upload is terminal.
    async fn cleanup_terminal(&self) {
        let (ids, bodies) = {
            let mut guard = self.state.lock().await;
            let ids: Vec<TransferId> = guard.part_records.drain().map(|(_, id)| id).collect();
            let bodies: Vec<PathBuf> = guard.part_bodies.drain().map(|(_, body)| body).collect();
            (ids, bodies)
        };
        for body in bodies {
            if let Err(e) = self.fs.remove_file_if_exists(&body).await {
                warn!(id = %self.task.id(), error = %e, "failed to remove part body");
            }
        }
        for id in ids {
            if let Err(e) = self.database.remove(id).await {
                warn!(%id, error = %e, "failed to remove part record");
            }
        }
        if let Err(e) = self.database.remove(self.task.id()).await {
            warn!(id = %self.task.id(), error = %e, "failed to remove transfer record");
        }
    }

    /// Remove the partial file backing one part body, if still tracked.
    async fn remove_part_body(&self, handle: TaskHandle) {
        let body = {
            let mut guard = self.state.lock().await;
            guard.part_bodies.remove(&handle)
        };
        if let Some(body) = body
            && let Err(e) = self.fs.remove_file_if_exists(&body).await
        {
            warn!(%handle, error = %e, "failed to remove part body");
        }
    }

    async fn remove_part_bodies(&self, handles: &[TaskHandle]) {
        for &handle in handles {
            self.remove_part_body(handle).await;
        }
    }

    async fn persist_snapshot(&self) -> Result<()> {
        let record = {
            let guard = self.state.lock().await;
            PersistableTransferTask::snapshot(&self.task, &guard.upload)
        };
        self.database.update(&record).await
    }

    async fn persist_part_started(
        &self,
        part_number: PartNumber,
        upload_id: crate::state::UploadId,
        bytes: u64,
        handle: TaskHandle,
    ) -> Result<()> {
        // A retried or resumed part overwrites the record of its previous
        // attempt instead of orphaning it.
        let record_id = {
            let mut guard = self.state.lock().await;
            *guard
                .part_records
                .entry(part_number)
                .or_insert_with(TransferId::new)
        };
        let record = PersistableTransferTask::part_snapshot(
            &self.task,
            record_id,
            PersistableSubTask {
                upload_id,
                part_number,
                bytes,
                bytes_transferred: 0,
                handle: Some(handle),
                etag: None,
            },
        );
        self.database.insert(&record).await
    }

    async fn persist_part_completed(
        &self,
        part_number: PartNumber,
        event: &UploadPartEvent,
    ) -> Result<()> {
        let UploadPartEvent::Completed { etag, .. } = event else {
            return Ok(());
        };
        let record_id = {
            let guard = self.state.lock().await;
            guard.part_records.get(&part_number).copied()
        };
        let Some(record_id) = record_id else {
            return Ok(());
        };
        let Some(mut record) = self.database.get(record_id) else {
            return Ok(());
        };
        if let Some(sub) = record.sub_task.as_mut() {
            sub.etag = Some(etag.clone());
            sub.bytes_transferred = sub.bytes;
            sub.handle = None;
        }
        record.status = TransferStatus::Completed;
        self.database.update(&record).await
    }

    async fn report_completed(&self) {
        {
            let mut guard = self.state.lock().await;
            if guard.reported {
                return;
            }
            guard.reported = true;
        }
        self.notify(TransferUpdate::Completed { id: self.task.id() });
    }

    async fn report_failed(&self, error: Arc<Error>) {
        {
            let mut guard = self.state.lock().await;
            if guard.reported {
                return;
            }
            guard.reported = true;
        }
        self.notify(TransferUpdate::Failed {
            id: self.task.id(),
            error,
        });
    }

    fn notify(&self, update: TransferUpdate) {
        // A dropped receiver means the caller stopped listening, which is
        // not the session's problem.
        let _ = self.updates.send(update);
    }
}

impl<C> TransferControl for MultipartUploadSession<C>
where
    C: MultipartUploadClient + 'static,
{
    fn transfer_id(&self) -> TransferId {
        self.task.id()
    }

    fn transfer_status(&self) -> TransferStatus {
        self.task.status()
    }

    fn pause(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(MultipartUploadSession::pause(self))
    }

    fn resume(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(MultipartUploadSession::resume(self))
    }

    fn cancel(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(MultipartUploadSession::cancel(self))
    }
}
