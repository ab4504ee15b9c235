use std::path::PathBuf;

use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum UploadError {
    #[snafu(display("no files are staged for upload"))]
    EmptyBatch { stage: &'static str },
    #[snafu(display("staged batch is locked by an in-flight submission on `{stage}`"))]
    BatchLocked { stage: &'static str },
    #[snafu(display("failed to read file at {path:?} on `{stage}`: {source}"))]
    ReadFile {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("upload session has shut down on `{stage}`"))]
    SessionClosed { stage: &'static str },
}

impl UploadError {
    /// Local rejections that never reach the gateway.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::EmptyBatch { .. } | Self::BatchLocked { .. })
    }
}

pub type UploadResult<T> = Result<T, UploadError>;
