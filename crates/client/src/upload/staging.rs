use std::path::Path;

use bytes::Bytes;
use docqa_gateway::UploadFile;
use snafu::{ResultExt, ensure};

use super::error::{BatchLockedSnafu, ReadFileSnafu, UploadResult};

/// Stable identifier for one staged file; names may repeat, ids never do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StagedFileId(pub u64);

impl StagedFileId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

/// A file produced by a picker or drop source that has not been staged yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHandle {
    pub name: String,
    pub payload: Bytes,
}

impl FileHandle {
    pub fn new(name: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            payload: payload.into(),
        }
    }

    /// Reads a picked file from disk; the handle is named after the final path component.
    pub async fn from_path(path: impl AsRef<Path>) -> UploadResult<Self> {
        let path = path.as_ref();
        let payload = tokio::fs::read(path).await.context(ReadFileSnafu {
            stage: "read-picked-file",
            path: path.to_path_buf(),
        })?;

        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        Ok(Self::new(name, payload))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    pub id: StagedFileId,
    pub name: String,
    pub payload: Bytes,
}

impl StagedFile {
    pub fn to_upload_file(&self) -> UploadFile {
        UploadFile::new(self.name.clone(), self.payload.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BatchLock {
    #[default]
    Unlocked,
    Locked,
}

/// Files chosen but not yet submitted, in encounter order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StagedBatch {
    files: Vec<StagedFile>,
    lock: BatchLock,
}

impl StagedBatch {
    pub fn files(&self) -> &[StagedFile] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn lock(&self) -> BatchLock {
        self.lock
    }

    pub fn is_locked(&self) -> bool {
        self.lock == BatchLock::Locked
    }

    pub fn names(&self) -> Vec<&str> {
        self.files.iter().map(|file| file.name.as_str()).collect()
    }
}

/// Sole writer of the staged batch.
///
/// Only the submission pipeline may toggle the lock; every user-facing mutation is
/// rejected while it is held.
#[derive(Debug, Default)]
pub struct StagingManager {
    batch: StagedBatch,
    next_file_id: u64,
}

impl StagingManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batch(&self) -> &StagedBatch {
        &self.batch
    }

    pub fn stage<I>(&mut self, files: I) -> UploadResult<Vec<StagedFileId>>
    where
        I: IntoIterator<Item = FileHandle>,
    {
        ensure!(
            !self.batch.is_locked(),
            BatchLockedSnafu {
                stage: "stage-files"
            }
        );

        let mut staged = Vec::new();
        for handle in files {
            let id = self.alloc_file_id();
            self.batch.files.push(StagedFile {
                id,
                name: handle.name,
                payload: handle.payload,
            });
            staged.push(id);
        }

        if !staged.is_empty() {
            tracing::debug!(
                staged_count = staged.len(),
                batch_len = self.batch.len(),
                "staged files"
            );
        }

        Ok(staged)
    }

    /// Removes one file. Unknown ids are ignored so late UI events after a clear are harmless.
    pub fn unstage(&mut self, id: StagedFileId) -> UploadResult<Option<StagedFile>> {
        ensure!(
            !self.batch.is_locked(),
            BatchLockedSnafu {
                stage: "unstage-file"
            }
        );

        let Some(position) = self.batch.files.iter().position(|file| file.id == id) else {
            tracing::debug!(?id, "ignoring unstage for unknown file");
            return Ok(None);
        };

        Ok(Some(self.batch.files.remove(position)))
    }

    pub fn clear(&mut self) -> UploadResult<()> {
        ensure!(
            !self.batch.is_locked(),
            BatchLockedSnafu {
                stage: "clear-batch"
            }
        );

        self.batch.files.clear();
        Ok(())
    }

    pub(crate) fn acquire_lock(&mut self) {
        self.batch.lock = BatchLock::Locked;
    }

    pub(crate) fn release_lock(&mut self) {
        self.batch.lock = BatchLock::Unlocked;
    }

    /// Empties the batch and releases the lock in one step after an accepted upload.
    pub(crate) fn release_cleared(&mut self) {
        self.batch.files.clear();
        self.batch.lock = BatchLock::Unlocked;
    }

    fn alloc_file_id(&mut self) -> StagedFileId {
        self.next_file_id = self.next_file_id.saturating_add(1);
        StagedFileId::new(self.next_file_id)
    }
}
