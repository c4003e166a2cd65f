//! Durable transfer records and crash recovery.
//!
//! Every outstanding transfer task is mirrored to one JSON file under the
//! database directory, written through on each lifecycle transition and
//! removed when the task reaches a terminal status.  At startup
//! [`TransferDatabase::recover`] reloads the records, pairs them with the
//! network operations still alive in the transport by numeric handle, and
//! rebuilds the state machine of each interrupted multipart upload.
use crate::error::{Error, ErrorRepr, Result};
use crate::part_size::PartSize;
use crate::parts::{EntityTag, PartNumber, UploadPart, UploadParts};
use crate::state::{MultipartUpload, UploadFile, UploadId};
use crate::task::{TransferId, TransferKind, TransferStatus, TransferTask};
use crate::transport::{TaskHandle, TransportSession};
use crate::uri::ObjectUri;

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

/// Durable projection of a whole multipart upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistableMultipartUpload {
    pub upload_id: UploadId,
    pub file: UploadFile,
    /// The part size the upload was created with, so recovery tiles the
    /// file the same way regardless of the limits configured at restart.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub part_size: Option<PartSize>,
}

/// Durable projection of one started part upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistableSubTask {
    pub upload_id: UploadId,
    pub part_number: PartNumber,
    pub bytes: u64,
    pub bytes_transferred: u64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub handle: Option<TaskHandle>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub etag: Option<EntityTag>,
}

/// Durable projection of a transfer task, one JSON file per transfer id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistableTransferTask {
    pub transfer_id: TransferId,
    #[serde(flatten)]
    pub kind: TransferKind,
    pub uri: ObjectUri,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub handle: Option<TaskHandle>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "HashMap::is_empty", default)]
    pub headers: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub location: Option<PathBuf>,
    pub status: TransferStatus,
    pub retry_count: u32,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub multipart_upload: Option<PersistableMultipartUpload>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub sub_task: Option<PersistableSubTask>,
}

impl PersistableTransferTask {
    /// Project a task and the multipart upload it owns.
    pub fn snapshot(task: &TransferTask, upload: &MultipartUpload) -> Self {
        let multipart_upload = match (upload.upload_id(), upload.file()) {
            (Some(upload_id), Some(file)) => Some(PersistableMultipartUpload {
                upload_id: upload_id.clone(),
                file: file.clone(),
                part_size: upload.part_size(),
            }),
            _ => None,
        };
        Self {
            transfer_id: task.id(),
            kind: task.kind().clone(),
            uri: task.uri().clone(),
            handle: task.handle(),
            content_type: task.content_type_value().map(str::to_string),
            headers: task.header_values().clone(),
            location: task.location_value().cloned(),
            status: task.status(),
            retry_count: task.retry_count(),
            multipart_upload,
            sub_task: None,
        }
    }

    /// Project one started part as its own record, re-associated at
    /// recovery time via upload id and part number.
    ///
    /// The caller owns `transfer_id`: a restarted part passes the id of its
    /// previous attempt so each part keeps exactly one record.
    pub fn part_snapshot(
        parent: &TransferTask,
        transfer_id: TransferId,
        sub: PersistableSubTask,
    ) -> Self {
        Self {
            transfer_id,
            kind: TransferKind::MultipartUploadPart {
                upload_id: sub.upload_id.clone(),
                part_number: sub.part_number,
            },
            uri: parent.uri().clone(),
            handle: sub.handle,
            content_type: None,
            headers: HashMap::new(),
            location: None,
            status: TransferStatus::InProgress,
            retry_count: 0,
            multipart_upload: None,
            sub_task: Some(sub),
        }
    }

    /// Rebuild the in-memory task this record projects.
    pub fn rebuild_task(&self) -> TransferTask {
        TransferTask::with_recovered(
            self.transfer_id,
            self.kind.clone(),
            self.uri.clone(),
            self.content_type.clone(),
            self.headers.clone(),
            self.location.clone(),
            self.status,
            self.retry_count,
            self.handle,
        )
    }
}

/// A recovered record paired with the state machine rebuilt from it.
#[derive(Debug)]
pub struct TransferPair {
    /// The top-level record.
    pub task: PersistableTransferTask,
    /// The reconstructed multipart-upload state, when the record is one.
    pub upload: Option<MultipartUpload>,
}

/// File-backed store of transfer records, one JSON file per transfer id.
///
/// `insert`, `update`, and `remove` are idempotent; the in-memory map
/// mirrors the files.
#[derive(Debug)]
pub struct TransferDatabase {
    dir: PathBuf,
    records: Mutex<HashMap<TransferId, PersistableTransferTask>>,
}

impl TransferDatabase {
    /// Open (creating if needed) the database directory and load every
    /// record in it.  Unreadable files are skipped with a warning.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| Error::io(format!("create {}", dir.display()), e))?;

        let mut records = HashMap::new();
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| Error::io(format!("read {}", dir.display()), e))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::io(format!("read {}", dir.display()), e))?
        {
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            match Self::read_record(&path).await {
                Ok(record) => {
                    records.insert(record.transfer_id, record);
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable transfer record");
                }
            }
        }
        debug!(dir = %dir.display(), count = records.len(), "opened transfer database");

        Ok(Self {
            dir,
            records: Mutex::new(records),
        })
    }

    async fn read_record(path: &Path) -> Result<PersistableTransferTask> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| Error::io(format!("read {}", path.display()), e))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn record_path(&self, id: TransferId) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    /// Write a record, overwriting any previous value for its id.
    pub async fn insert(&self, record: &PersistableTransferTask) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(record)?;
        let path = self.record_path(record.transfer_id);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| Error::io(format!("write {}", path.display()), e))?;
        self.lock().insert(record.transfer_id, record.clone());
        Ok(())
    }

    /// Update a record; same upsert semantics as [`insert`](Self::insert).
    pub async fn update(&self, record: &PersistableTransferTask) -> Result<()> {
        self.insert(record).await
    }

    /// Remove a record.  Removing an id that is already gone is a no-op.
    pub async fn remove(&self, id: TransferId) -> Result<()> {
        self.lock().remove(&id);
        let path = self.record_path(id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::io(format!("remove {}", path.display()), e)),
        }
    }

    /// Look up a record by transfer id.
    pub fn get(&self, id: TransferId) -> Option<PersistableTransferTask> {
        self.lock().get(&id).cloned()
    }

    /// Transfer ids of the part records belonging to an upload, by part
    /// number.  A recovered session uses this to resume write-through on
    /// the records that survived recovery.
    pub fn part_record_ids(&self, upload_id: &UploadId) -> HashMap<PartNumber, TransferId> {
        self.lock()
            .values()
            .filter_map(|r| {
                let sub = r.sub_task.as_ref()?;
                (sub.upload_id == *upload_id).then_some((sub.part_number, r.transfer_id))
            })
            .collect()
    }

    /// Number of records currently stored.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Pair the stored records with the operations still alive in the
    /// transport and rebuild the interrupted uploads.
    ///
    /// Terminal top-level records, part records whose upload is gone, and
    /// unfinished part records whose network handle died with the process
    /// are discarded as orphans.  A multipart upload with only its top-level
    /// record recovers into the created phase so the next scheduler pass
    /// regenerates its parts; one with surviving part records recovers
    /// directly into the parts phase with each part's entity tag and byte
    /// count restored and in-flight parts downgraded to pending.
    pub async fn recover<T: TransportSession>(&self, transport: &T) -> Result<Vec<TransferPair>> {
        let live: HashSet<TaskHandle> = transport.active_handles().await.into_iter().collect();
        let records: Vec<PersistableTransferTask> = self.lock().values().cloned().collect();

        let mut uploads = Vec::new();
        let mut part_records = Vec::new();
        let mut simple = Vec::new();
        let mut orphans = Vec::new();
        for record in records {
            match &record.kind {
                // A finished part record is not terminal garbage; its entity
                // tag is what survives the restart.  Whether it is kept is
                // decided by its parent upload below.
                TransferKind::MultipartUploadPart { .. } if record.sub_task.is_some() => {
                    part_records.push(record);
                }
                _ if record.status.is_terminal() => {
                    orphans.push(record.transfer_id);
                }
                TransferKind::MultipartUpload if record.multipart_upload.is_some() => {
                    uploads.push(record);
                }
                TransferKind::MultipartUpload | TransferKind::MultipartUploadPart { .. } => {
                    orphans.push(record.transfer_id);
                }
                _ => match record.handle {
                    Some(handle) if live.contains(&handle) => simple.push(record),
                    _ => orphans.push(record.transfer_id),
                },
            }
        }

        let upload_ids: HashSet<UploadId> = uploads
            .iter()
            .filter_map(|u| u.multipart_upload.as_ref().map(|m| m.upload_id.clone()))
            .collect();

        let mut subs_by_upload: HashMap<UploadId, Vec<PersistableSubTask>> = HashMap::new();
        for record in part_records {
            let Some(sub) = record.sub_task.clone() else {
                continue;
            };
            let handle_alive = sub.handle.is_some_and(|h| live.contains(&h));
            if !upload_ids.contains(&sub.upload_id) || (sub.etag.is_none() && !handle_alive) {
                orphans.push(record.transfer_id);
                continue;
            }
            subs_by_upload
                .entry(sub.upload_id.clone())
                .or_default()
                .push(sub);
        }

        for id in orphans {
            warn!(%id, "discarding orphaned transfer record");
            self.remove(id).await?;
        }

        let mut pairs: Vec<TransferPair> = simple
            .into_iter()
            .map(|task| TransferPair { task, upload: None })
            .collect();
        for task in uploads {
            let Some(m) = task.multipart_upload.clone() else {
                continue;
            };
            let subs = subs_by_upload.remove(&m.upload_id).unwrap_or_default();
            let upload = rebuild_upload(&task, &m, &subs)?;
            debug!(id = %task.transfer_id, upload_id = %m.upload_id, state = %upload, "recovered multipart upload");
            pairs.push(TransferPair {
                task,
                upload: Some(upload),
            });
        }
        Ok(pairs)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<TransferId, PersistableTransferTask>> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn rebuild_upload(
    task: &PersistableTransferTask,
    m: &PersistableMultipartUpload,
    subs: &[PersistableSubTask],
) -> Result<MultipartUpload> {
    let paused = task.status == TransferStatus::Paused;
    if subs.is_empty() && !paused {
        return Ok(MultipartUpload::Created {
            file: m.file.clone(),
            upload_id: m.upload_id.clone(),
        });
    }

    let part_size = m
        .part_size
        .ok_or(ErrorRepr::Missing("PersistableMultipartUpload", "part size"))?;
    let count = part_size.part_count(m.file.size);
    let mut parts = Vec::with_capacity(count as usize);
    for n in 1..=count {
        let part_number = PartNumber::new(n as i32);
        let bytes = part_size.bytes(part_number, m.file.size);
        let etag = subs
            .iter()
            .find(|s| s.part_number == part_number)
            .and_then(|s| s.etag.clone())
            .filter(|etag| !etag.is_empty());
        // A part without an entity tag was in flight or never started; its
        // progress is not recoverable, so it goes back to pending.
        let part = match etag {
            Some(etag) => UploadPart::Completed { bytes, etag },
            None => UploadPart::Pending { bytes },
        };
        parts.push(part);
    }
    let parts = UploadParts::from_parts(parts);

    let upload = if paused {
        MultipartUpload::Paused {
            upload_id: m.upload_id.clone(),
            file: m.file.clone(),
            part_size,
            parts,
        }
    } else {
        MultipartUpload::Parts {
            upload_id: m.upload_id.clone(),
            file: m.file.clone(),
            part_size,
            parts,
        }
    };
    Ok(upload)
}
