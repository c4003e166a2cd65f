//! Computes the size of the parts a file is split into.
use crate::error::{ErrorRepr, Result};
use crate::parts::PartNumber;
use crate::{MAX_OBJECT_SIZE, MAX_PART_COUNT, MIN_PART_SIZE};

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// The byte size of one part of a multipart upload.
///
/// The size is the smallest doubling of the 5MiB minimum for which the whole
/// file fits in the part-count ceiling.  The final part of an upload is the
/// remainder and may be shorter; a file smaller than one part yields a single
/// short part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartSize {
    size: u64,
}

impl PartSize {
    /// Compute the part size for a file using the S3 limits.
    ///
    /// Fails with an invalid-file-size error when `file_size` is zero or
    /// larger than the maximum object size.
    pub fn new(file_size: u64) -> Result<Self> {
        Self::with_limits(file_size, MIN_PART_SIZE, MAX_PART_COUNT)
    }

    /// Compute the part size with explicit limits.
    ///
    /// Used when the target backend documents limits other than the S3
    /// defaults.
    pub fn with_limits(file_size: u64, min_part_size: u64, max_part_count: u64) -> Result<Self> {
        if file_size == 0 || file_size > MAX_OBJECT_SIZE {
            return Err(ErrorRepr::InvalidFileSize(file_size).into());
        }

        let mut size = min_part_size;
        while file_size.div_ceil(size) > max_part_count {
            size *= 2;
        }
        Ok(Self { size })
    }

    /// The size of one part in bytes.
    ///
    /// Every part except the last has exactly this many bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// The number of parts a file of `file_size` bytes splits into.
    pub fn part_count(&self, file_size: u64) -> u64 {
        file_size.div_ceil(self.size)
    }

    /// Byte offset into the source file where the given part starts.
    pub fn offset(&self, part_number: PartNumber) -> u64 {
        part_number.index() as u64 * self.size
    }

    /// Byte length of the given part, accounting for the short final part.
    pub fn bytes(&self, part_number: PartNumber, file_size: u64) -> u64 {
        let offset = self.offset(part_number);
        std::cmp::min(self.size, file_size.saturating_sub(offset))
    }
}

impl Display for PartSize {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} bytes", self.size)
    }
}
