//! The multipart-upload state machine.
//!
//! [`MultipartUpload`] is the single value describing where a whole upload
//! stands.  It changes only through [`transition`](MultipartUpload::transition)
//! (whole-upload events) and [`transition_part`](MultipartUpload::transition_part)
//! (per-part events), and every illegal pairing of state and event is an
//! [`InvalidStateTransition`] error rather than a silent no-op.  The session
//! owns the machine and is its only mutator.
use crate::error::{Error, Result};
use crate::part_size::PartSize;
use crate::parts::{EntityTag, PartNumber, UploadPart, UploadParts};
use crate::transport::TaskHandle;

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::ops::Deref;
use std::path::PathBuf;
use std::sync::Arc;

/// Identifier the backend assigns to a multipart upload at creation.
///
/// Assigned exactly once and never changed afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UploadId(String);

impl UploadId {
    /// Create an `UploadId` from the backend's string identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// True when the id carries no value.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Deref for UploadId {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl Display for UploadId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for UploadId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for UploadId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// The source file a multipart upload reads from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadFile {
    /// Location of the file on disk.
    pub path: PathBuf,
    /// Whether the file is a temporary copy the engine created and may
    /// remove when the upload reaches a terminal state.
    pub temporary_file_created: bool,
    /// Size of the file in bytes, recorded when the transfer was requested.
    pub size: u64,
}

impl UploadFile {
    /// Describe a caller-owned file of known size.
    pub fn new(path: impl Into<PathBuf>, size: u64) -> Self {
        Self {
            path: path.into(),
            temporary_file_created: false,
            size,
        }
    }
}

/// Events that drive the whole upload from one phase to the next.
#[derive(Debug, Clone)]
pub enum MultipartUploadEvent {
    /// The create call was issued.
    Creating,
    /// The backend assigned an upload id.
    Created {
        file: UploadFile,
        upload_id: UploadId,
    },
    /// The caller asked to pause.
    Pausing,
    /// The caller asked to resume a paused upload.
    Resuming,
    /// All parts are done and validated; the complete call is going out.
    Completing,
    /// The backend confirmed completion.
    Completed { upload_id: UploadId },
    /// The upload is being torn down, optionally because of an error.
    Aborting { error: Option<Arc<Error>> },
    /// The backend confirmed the abort.
    Aborted {
        upload_id: UploadId,
        error: Option<Arc<Error>>,
    },
    /// The upload failed before or during part uploads.
    Failed {
        upload_id: Option<UploadId>,
        error: Arc<Error>,
    },
}

impl MultipartUploadEvent {
    fn name(&self) -> &'static str {
        match self {
            Self::Creating => "creating",
            Self::Created { .. } => "created",
            Self::Pausing => "pausing",
            Self::Resuming => "resuming",
            Self::Completing => "completing",
            Self::Completed { .. } => "completed",
            Self::Aborting { .. } => "aborting",
            Self::Aborted { .. } => "aborted",
            Self::Failed { .. } => "failed",
        }
    }
}

impl Display for MultipartUploadEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Events that move exactly one addressed part between its variants.
#[derive(Debug, Clone)]
pub enum UploadPartEvent {
    /// The scheduler claimed the part.
    Queued { part_number: PartNumber },
    /// The transport started uploading the part.
    Started {
        part_number: PartNumber,
        handle: TaskHandle,
    },
    /// The transport reported upload progress for the part.
    ProgressUpdated {
        part_number: PartNumber,
        bytes_transferred: u64,
    },
    /// The part finished uploading.
    Completed {
        part_number: PartNumber,
        etag: EntityTag,
    },
    /// The part upload failed.
    Failed {
        part_number: PartNumber,
        error: Arc<Error>,
    },
}

impl UploadPartEvent {
    /// The part this event addresses.
    pub fn part_number(&self) -> PartNumber {
        match self {
            Self::Queued { part_number }
            | Self::Started { part_number, .. }
            | Self::ProgressUpdated { part_number, .. }
            | Self::Completed { part_number, .. }
            | Self::Failed { part_number, .. } => *part_number,
        }
    }

    /// True for the completion event, which is what unlocks progress
    /// reporting and the completion check in the session.
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Queued { .. } => "queued",
            Self::Started { .. } => "started",
            Self::ProgressUpdated { .. } => "progressUpdated",
            Self::Completed { .. } => "completed",
            Self::Failed { .. } => "failed",
        }
    }
}

impl Display for UploadPartEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), self.part_number())
    }
}

/// Phase of a whole multipart upload.
///
/// The upload id is assigned exactly once, at creation, and the parts
/// collection never changes length once computed.
#[derive(Debug, Clone, Default)]
pub enum MultipartUpload {
    /// Nothing has happened yet.
    #[default]
    None,
    /// The create call is in flight.
    Creating,
    /// The backend assigned an upload id; parts not yet generated.
    ///
    /// Recovery reconstructs into this phase when only the top-level record
    /// survived, so the next scheduler pass regenerates the parts.
    Created {
        file: UploadFile,
        upload_id: UploadId,
    },
    /// Parts are uploading.
    Parts {
        upload_id: UploadId,
        file: UploadFile,
        part_size: PartSize,
        parts: UploadParts,
    },
    /// The caller paused the upload; no part is in flight.
    Paused {
        upload_id: UploadId,
        file: UploadFile,
        part_size: PartSize,
        parts: UploadParts,
    },
    /// All parts validated; the complete call is in flight.
    Completing {
        upload_id: UploadId,
        parts: UploadParts,
    },
    /// Terminal: the backend assembled the object.
    Completed { upload_id: UploadId },
    /// The abort call is in flight.
    Aborting {
        upload_id: UploadId,
        message: Option<String>,
    },
    /// Terminal: the backend discarded the upload.
    Aborted {
        upload_id: UploadId,
        message: Option<String>,
    },
    /// Terminal: the upload failed.
    Failed {
        upload_id: Option<UploadId>,
        parts: Option<UploadParts>,
        message: String,
    },
}

impl MultipartUpload {
    /// Apply a whole-upload event.
    ///
    /// On an illegal pairing the state is left untouched and an
    /// invalid-state-transition error describes both sides.
    pub fn transition(&mut self, event: MultipartUploadEvent) -> Result<()> {
        let current = std::mem::take(self);
        match Self::apply(current, event) {
            Ok(next) => {
                *self = next;
                Ok(())
            }
            Err((prev, e)) => {
                *self = prev;
                Err(e)
            }
        }
    }

    fn apply(
        state: MultipartUpload,
        event: MultipartUploadEvent,
    ) -> Result<MultipartUpload, (MultipartUpload, Error)> {
        use MultipartUpload as S;
        use MultipartUploadEvent as E;

        let illegal = |state: S, event: &E| {
            let err = Error::invalid_transition(state.state_name(), event);
            Err((state, err))
        };

        match event {
            E::Creating => match state {
                S::None => Ok(S::Creating),
                other => illegal(other, &E::Creating),
            },
            E::Created { file, upload_id } => match state {
                S::Creating => Ok(S::Created { file, upload_id }),
                other => illegal(
                    other,
                    &E::Created {
                        file: UploadFile::new("", 0),
                        upload_id: UploadId::default(),
                    },
                ),
            },
            E::Pausing => match state {
                S::Parts {
                    upload_id,
                    file,
                    part_size,
                    parts,
                } => {
                    // Anything claimed or in flight goes back to pending so
                    // resume can reschedule it.
                    let paused = parts
                        .iter()
                        .map(|part| match part {
                            UploadPart::InProgress { bytes, .. }
                            | UploadPart::Queued { bytes } => {
                                UploadPart::Pending { bytes: *bytes }
                            }
                            other => other.clone(),
                        })
                        .collect();
                    Ok(S::Paused {
                        upload_id,
                        file,
                        part_size,
                        parts: UploadParts::from_parts(paused),
                    })
                }
                // Pausing while paused is a no-op.
                paused @ S::Paused { .. } => Ok(paused),
                other => illegal(other, &E::Pausing),
            },
            E::Resuming => match state {
                S::Paused {
                    upload_id,
                    file,
                    part_size,
                    parts,
                } => Ok(S::Parts {
                    upload_id,
                    file,
                    part_size,
                    parts,
                }),
                other => illegal(other, &E::Resuming),
            },
            E::Completing => match state {
                S::Parts {
                    upload_id, parts, ..
                } => Ok(S::Completing { upload_id, parts }),
                other => illegal(other, &E::Completing),
            },
            E::Completed { upload_id } => match state {
                S::Completing { .. } | S::Parts { .. } => Ok(S::Completed { upload_id }),
                other => illegal(other, &E::Completed { upload_id }),
            },
            E::Aborting { error } => {
                let message = error.as_ref().map(|e| e.to_string());
                match state {
                    S::Created { upload_id, .. }
                    | S::Parts { upload_id, .. }
                    | S::Paused { upload_id, .. }
                    | S::Completing { upload_id, .. } => Ok(S::Aborting { upload_id, message }),
                    other => illegal(other, &E::Aborting { error }),
                }
            }
            E::Aborted { upload_id, error } => {
                let message = error.as_ref().map(|e| e.to_string());
                match state {
                    S::Created { .. } | S::Parts { .. } | S::Aborting { .. } => {
                        Ok(S::Aborted { upload_id, message })
                    }
                    other => illegal(other, &E::Aborted { upload_id, error }),
                }
            }
            E::Failed { upload_id, error } => match state {
                S::None | S::Creating => Ok(S::Failed {
                    upload_id,
                    parts: None,
                    message: error.to_string(),
                }),
                S::Parts {
                    upload_id: id,
                    parts,
                    ..
                } => Ok(S::Failed {
                    upload_id: upload_id.or(Some(id)),
                    parts: Some(parts),
                    message: error.to_string(),
                }),
                other => illegal(other, &E::Failed { upload_id, error }),
            },
        }
    }

    /// Apply a per-part event.  Legal only while parts are uploading.
    pub fn transition_part(&mut self, event: UploadPartEvent) -> Result<()> {
        let Self::Parts { parts, .. } = self else {
            return Err(Error::invalid_transition(self.state_name(), &event));
        };

        let part_number = event.part_number();
        let part = parts.find(part_number)?.clone();
        let next = match (part, &event) {
            (UploadPart::Pending { bytes }, UploadPartEvent::Queued { .. }) => {
                UploadPart::Queued { bytes }
            }
            (UploadPart::Queued { bytes }, UploadPartEvent::Started { handle, .. }) => {
                UploadPart::InProgress {
                    bytes,
                    bytes_transferred: 0,
                    handle: *handle,
                }
            }
            (
                UploadPart::InProgress { bytes, handle, .. },
                UploadPartEvent::ProgressUpdated {
                    bytes_transferred, ..
                },
            ) => UploadPart::InProgress {
                bytes,
                bytes_transferred: *bytes_transferred,
                handle,
            },
            (UploadPart::InProgress { bytes, .. }, UploadPartEvent::Completed { etag, .. }) => {
                UploadPart::Completed {
                    bytes,
                    etag: etag.clone(),
                }
            }
            (
                UploadPart::InProgress { bytes, .. } | UploadPart::Queued { bytes },
                UploadPartEvent::Failed { error, .. },
            ) => UploadPart::Failed {
                bytes,
                message: error.to_string(),
            },
            (part, event) => {
                return Err(Error::invalid_transition(part.variant_name(), event));
            }
        };
        parts.set(part_number, next)
    }

    /// Move a failed part back to pending so the scheduler retries it.
    pub(crate) fn retry_part(&mut self, part_number: PartNumber) -> Result<()> {
        let Self::Parts { parts, .. } = self else {
            return Err(Error::invalid_transition(self.state_name(), "retry"));
        };
        let part = parts.find(part_number)?;
        let UploadPart::Failed { bytes, .. } = part else {
            return Err(Error::invalid_transition(part.variant_name(), "retry"));
        };
        let bytes = *bytes;
        parts.set(part_number, UploadPart::Pending { bytes })
    }

    /// Build the part collection from the recorded file size, sized within
    /// the given part limits.
    ///
    /// Legal only from the created phase; the normal create flow and the
    /// top-level-record-only recovery path both funnel through here.
    pub(crate) fn create_parts(&mut self, min_part_size: u64, max_part_count: u64) -> Result<()> {
        let Self::Created { file, upload_id } = self else {
            return Err(Error::invalid_transition(self.state_name(), "createParts"));
        };
        let part_size = PartSize::with_limits(file.size, min_part_size, max_part_count)?;
        let parts = UploadParts::new(file.size, part_size);
        *self = Self::Parts {
            upload_id: upload_id.clone(),
            file: file.clone(),
            part_size,
            parts,
        };
        Ok(())
    }

    /// Force the failed state from any non-terminal phase.
    ///
    /// Unlike `transition` this never errors; failing twice or failing a
    /// terminal upload leaves the state untouched.
    pub fn fail(&mut self, error: &Error) {
        if self.is_terminal() {
            return;
        }
        let upload_id = self.upload_id().cloned();
        let parts = self.parts().cloned();
        *self = Self::Failed {
            upload_id,
            parts,
            message: error.to_string(),
        };
    }

    /// Check the invariants the backend requires of a completion call.
    pub fn validate_for_completion(&self, min_part_size: u64) -> Result<()> {
        let Self::Parts {
            upload_id,
            file,
            part_size,
            parts,
        } = self
        else {
            return Err(Error::invalid_parts(format!(
                "upload is {}, not uploading parts",
                self.state_name()
            )));
        };
        if upload_id.is_empty() {
            return Err(Error::invalid_parts("upload id is empty"));
        }
        if parts.len() > 1 && part_size.size() < min_part_size {
            return Err(Error::invalid_parts(format!(
                "part size {} is below the {} byte minimum",
                part_size.size(),
                min_part_size
            )));
        }
        for (i, part) in parts.iter().enumerate() {
            match part.etag() {
                Some(etag) if !etag.is_empty() => {}
                _ => {
                    return Err(Error::invalid_parts(format!(
                        "part {} has no entity tag",
                        i + 1
                    )));
                }
            }
        }
        if parts.total_bytes() != file.size {
            return Err(Error::invalid_parts(format!(
                "part bytes sum to {} but the file has {} bytes",
                parts.total_bytes(),
                file.size
            )));
        }
        Ok(())
    }

    /// The upload id, present in every phase after creation.
    pub fn upload_id(&self) -> Option<&UploadId> {
        match self {
            Self::Created { upload_id, .. }
            | Self::Parts { upload_id, .. }
            | Self::Paused { upload_id, .. }
            | Self::Completing { upload_id, .. }
            | Self::Completed { upload_id }
            | Self::Aborting { upload_id, .. }
            | Self::Aborted { upload_id, .. } => Some(upload_id),
            Self::Failed { upload_id, .. } => upload_id.as_ref(),
            Self::None | Self::Creating => None,
        }
    }

    /// The source file, while the upload still needs it.
    pub fn file(&self) -> Option<&UploadFile> {
        match self {
            Self::Created { file, .. }
            | Self::Parts { file, .. }
            | Self::Paused { file, .. } => Some(file),
            _ => None,
        }
    }

    /// The computed part size, while parts exist.
    pub fn part_size(&self) -> Option<PartSize> {
        match self {
            Self::Parts { part_size, .. } | Self::Paused { part_size, .. } => Some(*part_size),
            _ => None,
        }
    }

    /// The part collection, in the phases that carry one.
    pub fn parts(&self) -> Option<&UploadParts> {
        match self {
            Self::Parts { parts, .. }
            | Self::Paused { parts, .. }
            | Self::Completing { parts, .. } => Some(parts),
            Self::Failed { parts, .. } => parts.as_ref(),
            _ => None,
        }
    }

    /// Numbers of parts the scheduler has not picked up yet.
    pub fn pending_part_numbers(&self) -> Vec<PartNumber> {
        self.parts()
            .map(|p| p.pending_part_numbers())
            .unwrap_or_default()
    }

    pub fn has_pending_parts(&self) -> bool {
        matches!(self, Self::Parts { parts, .. } if parts.has_pending())
    }

    /// True when every part completed.
    pub fn parts_completed(&self) -> bool {
        matches!(self, Self::Parts { parts, .. } if parts.is_done())
    }

    pub fn parts_failed(&self) -> bool {
        matches!(self, Self::Parts { parts, .. } if parts.has_failed())
    }

    /// True while parts may be scheduled or progressed.
    pub fn is_uploading_parts(&self) -> bool {
        matches!(self, Self::Parts { .. })
    }

    pub fn is_paused(&self) -> bool {
        matches!(self, Self::Paused { .. })
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted { .. })
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// True once no further event may be applied.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed { .. } | Self::Aborted { .. } | Self::Failed { .. }
        )
    }

    pub(crate) fn state_name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Creating => "creating",
            Self::Created { .. } => "created",
            Self::Parts { .. } => "parts",
            Self::Paused { .. } => "paused",
            Self::Completing { .. } => "completing",
            Self::Completed { .. } => "completed",
            Self::Aborting { .. } => "aborting",
            Self::Aborted { .. } => "aborted",
            Self::Failed { .. } => "failed",
        }
    }
}

impl Display for MultipartUpload {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.state_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    const MIB: u64 = 1024 * 1024;

    fn upload_file(size: u64) -> UploadFile {
        UploadFile::new("/tmp/source.bin", size)
    }

    fn arc_err() -> Arc<Error> {
        Arc::new(Error::from_kind(ErrorKind::Transport, "connection reset"))
    }

    fn machine_in_parts(file_size: u64) -> MultipartUpload {
        let mut upload = MultipartUpload::None;
        upload.transition(MultipartUploadEvent::Creating).unwrap();
        upload
            .transition(MultipartUploadEvent::Created {
                file: upload_file(file_size),
                upload_id: UploadId::from("upload-1"),
            })
            .unwrap();
        upload
            .create_parts(crate::MIN_PART_SIZE, crate::MAX_PART_COUNT)
            .unwrap();
        upload
    }

    fn complete_all_parts(upload: &mut MultipartUpload) {
        let count = upload.parts().unwrap().len();
        for n in 1..=count {
            let part_number = PartNumber::new(n as i32);
            upload
                .transition_part(UploadPartEvent::Queued { part_number })
                .unwrap();
            upload
                .transition_part(UploadPartEvent::Started {
                    part_number,
                    handle: TaskHandle::new(n as u64),
                })
                .unwrap();
            upload
                .transition_part(UploadPartEvent::Completed {
                    part_number,
                    etag: EntityTag::from(format!("etag{n}")),
                })
                .unwrap();
        }
    }

    #[test]
    fn create_parts_tiles_the_file() {
        let upload = machine_in_parts(12 * MIB);
        assert!(upload.is_uploading_parts());
        assert_eq!(upload.upload_id(), Some(&UploadId::from("upload-1")));
        let parts = upload.parts().unwrap();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts.total_bytes(), 12 * MIB);
    }

    #[test]
    fn create_parts_honors_the_part_limits() {
        let mut upload = MultipartUpload::None;
        upload.transition(MultipartUploadEvent::Creating).unwrap();
        upload
            .transition(MultipartUploadEvent::Created {
                file: upload_file(12 * MIB),
                upload_id: UploadId::from("upload-1"),
            })
            .unwrap();
        assert!(!upload.is_uploading_parts());

        // A two-part ceiling doubles the part size for a 12MiB file.
        upload.create_parts(crate::MIN_PART_SIZE, 2).unwrap();
        let parts = upload.parts().unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(upload.part_size().unwrap().size(), 10 * MIB);
        assert_eq!(parts.total_bytes(), 12 * MIB);

        // Building parts twice is illegal.
        assert!(
            upload
                .create_parts(crate::MIN_PART_SIZE, crate::MAX_PART_COUNT)
                .is_err()
        );
    }

    #[test]
    fn illegal_whole_upload_events_are_rejected() {
        let mut upload = MultipartUpload::None;
        let illegal = [
            MultipartUploadEvent::Created {
                file: upload_file(MIB),
                upload_id: UploadId::from("u"),
            },
            MultipartUploadEvent::Pausing,
            MultipartUploadEvent::Resuming,
            MultipartUploadEvent::Completing,
            MultipartUploadEvent::Completed {
                upload_id: UploadId::from("u"),
            },
            MultipartUploadEvent::Aborting { error: None },
            MultipartUploadEvent::Aborted {
                upload_id: UploadId::from("u"),
                error: None,
            },
        ];
        for event in illegal {
            let err = upload.transition(event).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::State);
            assert!(matches!(upload, MultipartUpload::None));
        }
        // `failed` is legal from none.
        upload
            .transition(MultipartUploadEvent::Failed {
                upload_id: None,
                error: arc_err(),
            })
            .unwrap();
        assert!(upload.is_failed());
    }

    #[test]
    fn terminal_states_accept_no_events() {
        let mut upload = machine_in_parts(12 * MIB);
        complete_all_parts(&mut upload);
        upload.transition(MultipartUploadEvent::Completing).unwrap();
        upload
            .transition(MultipartUploadEvent::Completed {
                upload_id: UploadId::from("upload-1"),
            })
            .unwrap();
        assert!(upload.is_terminal());

        for event in [
            MultipartUploadEvent::Creating,
            MultipartUploadEvent::Pausing,
            MultipartUploadEvent::Resuming,
            MultipartUploadEvent::Completing,
            MultipartUploadEvent::Aborting { error: None },
            MultipartUploadEvent::Failed {
                upload_id: None,
                error: arc_err(),
            },
        ] {
            assert!(upload.transition(event).is_err());
            assert!(upload.is_completed());
        }
    }

    #[test]
    fn pause_resets_claimed_parts_and_resume_restores() {
        let mut upload = machine_in_parts(12 * MIB);
        let p1 = PartNumber::new(1);
        upload
            .transition_part(UploadPartEvent::Queued { part_number: p1 })
            .unwrap();
        upload
            .transition_part(UploadPartEvent::Started {
                part_number: p1,
                handle: TaskHandle::new(1),
            })
            .unwrap();
        upload
            .transition_part(UploadPartEvent::Completed {
                part_number: p1,
                etag: EntityTag::from("etag1"),
            })
            .unwrap();
        upload
            .transition_part(UploadPartEvent::Queued {
                part_number: PartNumber::new(2),
            })
            .unwrap();
        upload
            .transition_part(UploadPartEvent::Started {
                part_number: PartNumber::new(2),
                handle: TaskHandle::new(2),
            })
            .unwrap();

        upload.transition(MultipartUploadEvent::Pausing).unwrap();
        assert!(upload.is_paused());
        let parts = upload.parts().unwrap();
        assert!(parts.in_progress().is_empty());
        assert_eq!(parts.completed().len(), 1);
        assert_eq!(
            parts.pending_part_numbers(),
            vec![PartNumber::new(2), PartNumber::new(3)]
        );

        // Pausing again is a no-op.
        upload.transition(MultipartUploadEvent::Pausing).unwrap();
        assert!(upload.is_paused());

        upload.transition(MultipartUploadEvent::Resuming).unwrap();
        assert!(upload.is_uploading_parts());
        assert_eq!(upload.parts().unwrap().completed().len(), 1);
    }

    #[test]
    fn part_events_require_uploading_phase() {
        let mut upload = machine_in_parts(12 * MIB);
        upload.transition(MultipartUploadEvent::Pausing).unwrap();
        let err = upload
            .transition_part(UploadPartEvent::Queued {
                part_number: PartNumber::new(1),
            })
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::State);
    }

    #[test]
    fn part_event_ordering_is_enforced() {
        let mut upload = machine_in_parts(12 * MIB);
        let part_number = PartNumber::new(1);

        // Completing a part that was never in progress is illegal.
        assert!(
            upload
                .transition_part(UploadPartEvent::Completed {
                    part_number,
                    etag: EntityTag::from("etag"),
                })
                .is_err()
        );
        // Starting a part that was never queued is illegal.
        assert!(
            upload
                .transition_part(UploadPartEvent::Started {
                    part_number,
                    handle: TaskHandle::new(1),
                })
                .is_err()
        );

        upload
            .transition_part(UploadPartEvent::Queued { part_number })
            .unwrap();
        // Queueing twice is illegal.
        assert!(
            upload
                .transition_part(UploadPartEvent::Queued { part_number })
                .is_err()
        );
        upload
            .transition_part(UploadPartEvent::Started {
                part_number,
                handle: TaskHandle::new(1),
            })
            .unwrap();
        upload
            .transition_part(UploadPartEvent::ProgressUpdated {
                part_number,
                bytes_transferred: MIB,
            })
            .unwrap();
        assert_eq!(upload.parts().unwrap().bytes_transferred(), MIB);

        upload
            .transition_part(UploadPartEvent::Completed {
                part_number,
                etag: EntityTag::from("etag1"),
            })
            .unwrap();
        // No event is legal on a completed part.
        assert!(
            upload
                .transition_part(UploadPartEvent::Failed {
                    part_number,
                    error: arc_err(),
                })
                .is_err()
        );
    }

    #[test]
    fn failed_part_can_be_retried() {
        let mut upload = machine_in_parts(12 * MIB);
        let part_number = PartNumber::new(2);
        upload
            .transition_part(UploadPartEvent::Queued { part_number })
            .unwrap();
        upload
            .transition_part(UploadPartEvent::Failed {
                part_number,
                error: arc_err(),
            })
            .unwrap();
        assert!(upload.parts_failed());

        upload.retry_part(part_number).unwrap();
        assert!(!upload.parts_failed());
        assert!(
            upload
                .pending_part_numbers()
                .contains(&PartNumber::new(2))
        );
        // Retrying a part that did not fail is illegal.
        assert!(upload.retry_part(PartNumber::new(1)).is_err());
    }

    #[test]
    fn validate_for_completion_checks_all_invariants() {
        let mut upload = machine_in_parts(12 * MIB);
        // Not all parts have entity tags yet.
        assert!(upload.validate_for_completion(5 * MIB).is_err());

        complete_all_parts(&mut upload);
        upload.validate_for_completion(5 * MIB).unwrap();

        // An empty entity tag invalidates the upload.
        let mut tampered = upload.clone();
        if let MultipartUpload::Parts { parts, .. } = &mut tampered {
            parts
                .set(
                    PartNumber::new(2),
                    UploadPart::Completed {
                        bytes: 5 * MIB,
                        etag: EntityTag::from(""),
                    },
                )
                .unwrap();
        }
        assert!(tampered.validate_for_completion(5 * MIB).is_err());

        // A byte-count mismatch invalidates the upload.
        let mut short = upload.clone();
        if let MultipartUpload::Parts { parts, .. } = &mut short {
            parts
                .set(
                    PartNumber::new(3),
                    UploadPart::Completed {
                        bytes: MIB,
                        etag: EntityTag::from("etag3"),
                    },
                )
                .unwrap();
        }
        assert!(short.validate_for_completion(5 * MIB).is_err());

        // Wrong phase invalidates the upload.
        upload.transition(MultipartUploadEvent::Pausing).unwrap();
        assert!(upload.validate_for_completion(5 * MIB).is_err());
    }

    #[test]
    fn fail_is_unconditional_but_keeps_terminal_states() {
        let mut upload = machine_in_parts(12 * MIB);
        let err = Error::from_kind(ErrorKind::Service, "backend rejected create");
        upload.fail(&err);
        assert!(upload.is_failed());
        assert!(upload.parts().is_some());
        assert_eq!(upload.upload_id(), Some(&UploadId::from("upload-1")));

        let mut done = MultipartUpload::Completed {
            upload_id: UploadId::from("u"),
        };
        done.fail(&err);
        assert!(done.is_completed());
    }

    #[test]
    fn abort_flow_from_parts() {
        let mut upload = machine_in_parts(12 * MIB);
        upload
            .transition(MultipartUploadEvent::Aborting {
                error: Some(arc_err()),
            })
            .unwrap();
        assert!(matches!(upload, MultipartUpload::Aborting { .. }));
        upload
            .transition(MultipartUploadEvent::Aborted {
                upload_id: UploadId::from("upload-1"),
                error: None,
            })
            .unwrap();
        assert!(upload.is_aborted());
    }
}
