//! Per-part state for a multipart upload.
//!
//! [`UploadParts`] is the ordered collection the state machine owns: one
//! [`UploadPart`] per 1-based part number, each tracking its byte count and
//! lifecycle.  [`CompletedParts`] is the ordered `(part number, entity tag)`
//! list the complete-upload request requires.
use crate::error::{ErrorRepr, Result};
use crate::part_size::PartSize;
use crate::transport::TaskHandle;

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt::{self, Display, Formatter};
use std::ops::Deref;

/// Number assigned to a part of an upload.
///
/// This, along with the entity tag found in the part upload response, is
/// required in the request to complete a multipart upload because it
/// identifies where the part goes when assembling the full object.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct PartNumber(i32);

impl Default for PartNumber {
    fn default() -> Self {
        Self(1)
    }
}

impl PartNumber {
    /// Create a new `PartNumber` from a plain integer.
    ///
    /// Part numbers are 1-based.
    pub fn new(n: i32) -> Self {
        Self(n)
    }

    /// The zero-based position of this part in the part collection.
    pub fn index(&self) -> usize {
        (self.0 - 1).max(0) as usize
    }
}

impl Deref for PartNumber {
    type Target = i32;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Display for PartNumber {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "part_{}", self.0)
    }
}

impl From<i32> for PartNumber {
    fn from(value: i32) -> Self {
        Self::new(value)
    }
}

/// AWS entity tag.
///
/// An opaque integrity token assigned by the backend to a successfully
/// uploaded part, required to reference that part in the completion call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityTag(Cow<'static, str>);

impl EntityTag {
    /// Create a new `EntityTag`.
    pub fn new<T: Into<Cow<'static, str>>>(etag: T) -> Self {
        Self(etag.into())
    }

    /// True when the tag carries no value.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Deref for EntityTag {
    type Target = str;

    fn deref(&self) -> &str {
        self.0.deref()
    }
}

impl AsRef<str> for EntityTag {
    fn as_ref(&self) -> &str {
        self.deref()
    }
}

impl Display for EntityTag {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for EntityTag {
    fn from(value: &str) -> Self {
        Self::new(value.to_string())
    }
}

impl From<String> for EntityTag {
    fn from(value: String) -> Self {
        Self(Cow::Owned(value))
    }
}

/// The state of one part of a multipart upload.
///
/// The byte count is fixed when the collection is built and never changes;
/// only the lifecycle around it does.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadPart {
    /// Not yet picked up by the scheduler.
    Pending { bytes: u64 },
    /// Claimed by the scheduler, upload not yet started.
    Queued { bytes: u64 },
    /// Upload running on the transport task identified by `handle`.
    InProgress {
        bytes: u64,
        bytes_transferred: u64,
        handle: TaskHandle,
    },
    /// Uploaded; `etag` references this part in the completion call.
    Completed { bytes: u64, etag: EntityTag },
    /// The transport reported a failure; awaiting the retry decision.
    Failed { bytes: u64, message: String },
}

impl UploadPart {
    /// The byte length of this part.
    pub fn bytes(&self) -> u64 {
        match self {
            Self::Pending { bytes }
            | Self::Queued { bytes }
            | Self::InProgress { bytes, .. }
            | Self::Completed { bytes, .. }
            | Self::Failed { bytes, .. } => *bytes,
        }
    }

    /// Bytes transferred so far for this part.
    pub fn bytes_transferred(&self) -> u64 {
        match self {
            Self::InProgress {
                bytes_transferred, ..
            } => *bytes_transferred,
            Self::Completed { bytes, .. } => *bytes,
            _ => 0,
        }
    }

    /// The entity tag, present exactly when the part is completed.
    pub fn etag(&self) -> Option<&EntityTag> {
        match self {
            Self::Completed { etag, .. } => Some(etag),
            _ => None,
        }
    }

    /// The transport task handle, present while the part is in progress.
    pub fn handle(&self) -> Option<TaskHandle> {
        match self {
            Self::InProgress { handle, .. } => Some(*handle),
            _ => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending { .. })
    }

    pub fn is_queued(&self) -> bool {
        matches!(self, Self::Queued { .. })
    }

    pub fn is_in_progress(&self) -> bool {
        matches!(self, Self::InProgress { .. })
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    pub(crate) fn variant_name(&self) -> &'static str {
        match self {
            Self::Pending { .. } => "pending",
            Self::Queued { .. } => "queued",
            Self::InProgress { .. } => "inProgress",
            Self::Completed { .. } => "completed",
            Self::Failed { .. } => "failed",
        }
    }
}

/// The ordered parts of a multipart upload, one per 1-based part number.
///
/// The length is fixed once computed.  Mutation happens only by index
/// assignment from the owning state machine.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UploadParts(Vec<UploadPart>);

impl UploadParts {
    /// Split a file of `file_size` bytes into pending parts of `part_size`.
    pub fn new(file_size: u64, part_size: PartSize) -> Self {
        let count = part_size.part_count(file_size);
        let parts = (1..=count)
            .map(|n| UploadPart::Pending {
                bytes: part_size.bytes(PartNumber::new(n as i32), file_size),
            })
            .collect();
        Self(parts)
    }

    pub(crate) fn from_parts(parts: Vec<UploadPart>) -> Self {
        Self(parts)
    }

    /// Look up a part by its 1-based number.
    pub fn find(&self, part_number: PartNumber) -> Result<&UploadPart> {
        self.0
            .get(part_number.index())
            .filter(|_| *part_number >= 1)
            .ok_or_else(|| ErrorRepr::PartNotFound(part_number).into())
    }

    /// Replace the part at `part_number`.  The byte count must not change.
    pub(crate) fn set(&mut self, part_number: PartNumber, part: UploadPart) -> Result<()> {
        let slot = self
            .0
            .get_mut(part_number.index())
            .filter(|_| *part_number >= 1)
            .ok_or(ErrorRepr::PartNotFound(part_number))?;
        *slot = part;
        Ok(())
    }

    /// Numbers of the parts not yet picked up by the scheduler, in order.
    pub fn pending_part_numbers(&self) -> Vec<PartNumber> {
        self.0
            .iter()
            .enumerate()
            .filter(|(_, part)| part.is_pending())
            .map(|(i, _)| PartNumber::new(i as i32 + 1))
            .collect()
    }

    /// The parts currently uploading.
    pub fn in_progress(&self) -> Vec<&UploadPart> {
        self.0.iter().filter(|p| p.is_in_progress()).collect()
    }

    /// The parts that finished uploading.
    pub fn completed(&self) -> Vec<&UploadPart> {
        self.0.iter().filter(|p| p.is_completed()).collect()
    }

    /// The parts whose last attempt failed.
    pub fn failed(&self) -> Vec<&UploadPart> {
        self.0.iter().filter(|p| p.is_failed()).collect()
    }

    /// Handles of the transport tasks uploading parts right now.
    pub fn in_progress_handles(&self) -> Vec<TaskHandle> {
        self.0.iter().filter_map(|p| p.handle()).collect()
    }

    /// The part a transport task handle belongs to, if any.
    pub fn find_by_handle(&self, handle: TaskHandle) -> Option<PartNumber> {
        self.0
            .iter()
            .position(|p| p.handle() == Some(handle))
            .map(|i| PartNumber::new(i as i32 + 1))
    }

    /// Sum of the byte lengths of all parts.
    ///
    /// Must equal the source file size; this is checked before the upload is
    /// completed.
    pub fn total_bytes(&self) -> u64 {
        self.0.iter().map(|p| p.bytes()).sum()
    }

    /// Sum of bytes transferred across all parts.
    pub fn bytes_transferred(&self) -> u64 {
        self.0.iter().map(|p| p.bytes_transferred()).sum()
    }

    pub fn has_pending(&self) -> bool {
        self.0.iter().any(|p| p.is_pending())
    }

    pub fn has_failed(&self) -> bool {
        self.0.iter().any(|p| p.is_failed())
    }

    /// True when every part has completed.
    pub fn is_done(&self) -> bool {
        self.0.iter().all(|p| p.is_completed())
    }

    /// The ordered `(part number, entity tag)` list for the completion call.
    ///
    /// Parts without an entity tag are skipped; callers validate completion
    /// first.
    pub fn completed_parts(&self) -> CompletedParts {
        let mut out = CompletedParts::default();
        for (i, part) in self.0.iter().enumerate() {
            if let UploadPart::Completed { bytes, etag } = part {
                out.push(CompletedPart {
                    part_number: PartNumber::new(i as i32 + 1),
                    etag: etag.clone(),
                    bytes: *bytes,
                });
            }
        }
        out
    }
}

impl Deref for UploadParts {
    type Target = [UploadPart];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// The record of a successful part upload.
///
/// All `CompletedPart`s need to be retained in order to construct a valid
/// complete upload request.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedPart {
    /// The 1-based number identifying where this part goes when assembling
    /// the full object.
    pub part_number: PartNumber,
    /// The entity tag the backend assigned to the uploaded part.
    pub etag: EntityTag,
    /// The size of this part in bytes.
    pub bytes: u64,
}

/// All completed part uploads for a multipart upload, ordered by part number.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletedParts(Vec<CompletedPart>);

impl CompletedParts {
    /// Add a new [`CompletedPart`] to this collection.
    pub fn push(&mut self, part: CompletedPart) {
        self.0.push(part);
        self.sort_ascending();
    }

    /// Returns the number of parts that have been successfully uploaded.
    pub fn count(&self) -> usize {
        self.0.len()
    }

    /// Returns the summed size in bytes of the completed parts.
    pub fn size(&self) -> u64 {
        self.0.iter().map(|p| p.bytes).sum()
    }

    /// Sort the `CompletedPart`s in increasing order by part number.
    ///
    /// It is an error to make a complete-upload request where the parts are
    /// not in order.
    fn sort_ascending(&mut self) {
        self.0.sort_by_key(|part| part.part_number);
    }
}

impl Deref for CompletedParts {
    type Target = [CompletedPart];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<&CompletedParts> for aws_sdk_s3::types::CompletedMultipartUpload {
    fn from(value: &CompletedParts) -> Self {
        let completed_parts = value
            .0
            .iter()
            .map(|v| {
                aws_sdk_s3::types::CompletedPart::builder()
                    .e_tag(v.etag.to_string())
                    .part_number(*v.part_number)
                    .build()
            })
            .collect();

        aws_sdk_s3::types::CompletedMultipartUpload::builder()
            .set_parts(Some(completed_parts))
            .build()
    }
}
