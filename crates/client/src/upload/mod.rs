pub mod error;
/// Terminal submission signals.
pub mod events;
pub mod session;
/// Staged batch and its single writer.
pub mod staging;
pub mod submission;

pub use error::{UploadError, UploadResult};
pub use events::UploadEvent;
pub use session::{UploadHandle, UploadSession};
pub use staging::{
    BatchLock, FileHandle, StagedBatch, StagedFile, StagedFileId, StagingManager,
};
pub use submission::{Submission, submit};
