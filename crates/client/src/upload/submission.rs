use docqa_gateway::{GENERIC_UPLOAD_FAILURE, Gateway, GatewayResult, UploadFile, UploadReceipt};
use snafu::ensure;

use super::error::{BatchLockedSnafu, EmptyBatchSnafu, UploadResult};
use super::events::UploadEvent;
use super::staging::StagingManager;

/// One in-flight upload attempt.
///
/// Created by [`Submission::begin`], which locks the batch, and consumed by
/// [`Submission::finish`], which always releases it. Holding the value is what
/// "a submission is in flight" means.
#[derive(Debug)]
#[must_use = "an unfinished submission leaves the batch locked"]
pub struct Submission {
    files: Vec<UploadFile>,
}

impl Submission {
    pub fn begin(staging: &mut StagingManager) -> UploadResult<Self> {
        ensure!(
            !staging.batch().is_empty(),
            EmptyBatchSnafu {
                stage: "begin-submission"
            }
        );
        ensure!(
            !staging.batch().is_locked(),
            BatchLockedSnafu {
                stage: "begin-submission"
            }
        );

        let files = staging
            .batch()
            .files()
            .iter()
            .map(|file| file.to_upload_file())
            .collect::<Vec<_>>();
        staging.acquire_lock();

        tracing::info!(file_count = files.len(), "submission started");
        Ok(Self { files })
    }

    /// Ordered payload for the gateway, captured when the batch was locked.
    pub fn files(&self) -> &[UploadFile] {
        &self.files
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn finish(
        self,
        staging: &mut StagingManager,
        result: GatewayResult<UploadReceipt>,
    ) -> UploadEvent {
        match result {
            Ok(receipt) => {
                staging.release_cleared();
                tracing::info!(file_count = self.files.len(), "submission accepted");
                UploadEvent::Succeeded {
                    file_count: self.files.len(),
                    message: receipt.message,
                }
            }
            Err(error) => {
                // Keep the files so the user can retry without selecting them again.
                staging.release_lock();
                tracing::warn!(
                    file_count = self.files.len(),
                    error = %error,
                    "submission failed"
                );
                UploadEvent::Failed {
                    message: error.user_message(GENERIC_UPLOAD_FAILURE),
                    kind: error.kind(),
                }
            }
        }
    }
}

/// Runs one complete attempt. `Err` is returned only for local validation failures;
/// gateway failures are reported through [`UploadEvent::Failed`].
pub async fn submit(staging: &mut StagingManager, gateway: &dyn Gateway) -> UploadResult<UploadEvent> {
    let submission = Submission::begin(staging)?;
    let result = gateway.upload(submission.files().to_vec()).await;
    Ok(submission.finish(staging, result))
}
