//! Local file-system collaborator.
//!
//! The client partitions the source file into per-part partial files so the
//! background transport can stream each one independently.
use crate::error::{Error, Result};

use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncReadExt as _, AsyncSeekExt as _, AsyncWriteExt as _, SeekFrom};

const COPY_BUF_SIZE: usize = 64 * 1024;

/// File-system operations the upload client needs.
#[derive(Debug, Clone)]
pub struct FileSystem {
    work_dir: PathBuf,
}

impl Default for FileSystem {
    fn default() -> Self {
        Self {
            work_dir: std::env::temp_dir(),
        }
    }
}

impl FileSystem {
    /// A `FileSystem` writing partial files under `work_dir`.
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
        }
    }

    /// Size in bytes of the file at `path`.
    pub async fn file_size(&self, path: &Path) -> Result<u64> {
        let meta = tokio::fs::metadata(path)
            .await
            .map_err(|e| Error::io(format!("stat {}", path.display()), e))?;
        Ok(meta.len())
    }

    /// Copy `length` bytes starting at `offset` of `source` into a new
    /// partial file, returning its path.
    pub async fn create_partial_file(
        &self,
        source: &Path,
        offset: u64,
        length: u64,
    ) -> Result<PathBuf> {
        let name = format!("part-{}.bin", uuid::Uuid::now_v7());
        let dest_path = self.work_dir.join(name);

        let mut src = File::open(source)
            .await
            .map_err(|e| Error::io(format!("open {}", source.display()), e))?;
        src.seek(SeekFrom::Start(offset))
            .await
            .map_err(|e| Error::io(format!("seek {}", source.display()), e))?;

        let mut dest = File::create(&dest_path)
            .await
            .map_err(|e| Error::io(format!("create {}", dest_path.display()), e))?;

        let copied = async {
            let mut remaining = length;
            let mut buf = vec![0u8; COPY_BUF_SIZE];
            while remaining > 0 {
                let want = std::cmp::min(remaining, buf.len() as u64) as usize;
                let read = src
                    .read(&mut buf[..want])
                    .await
                    .map_err(|e| Error::io(format!("read {}", source.display()), e))?;
                if read == 0 {
                    return Err(Error::io(
                        format!("partition {}", source.display()),
                        std::io::Error::new(
                            std::io::ErrorKind::UnexpectedEof,
                            "source file shorter than recorded size",
                        ),
                    ));
                }
                dest.write_all(&buf[..read])
                    .await
                    .map_err(|e| Error::io(format!("write {}", dest_path.display()), e))?;
                remaining -= read as u64;
            }
            dest.flush()
                .await
                .map_err(|e| Error::io(format!("flush {}", dest_path.display()), e))
        }
        .await;

        // A half-written partial file is useless; do not leave it behind.
        if let Err(e) = copied {
            drop(dest);
            let _ = tokio::fs::remove_file(&dest_path).await;
            return Err(e);
        }
        Ok(dest_path)
    }

    /// Remove a file, ignoring the case where it is already gone.
    pub async fn remove_file_if_exists(&self, path: &Path) -> Result<()> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::io(format!("remove {}", path.display()), e)),
        }
    }
}
