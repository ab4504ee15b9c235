use std::sync::Arc;

use docqa_gateway::{BoxFuture, Gateway, GatewayResult, UploadReceipt};
use futures::future::OptionFuture;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::error::{UploadError, UploadResult};
use super::events::UploadEvent;
use super::staging::{FileHandle, StagedBatch, StagedFile, StagedFileId, StagingManager};
use super::submission::Submission;

const COMMAND_BUFFER: usize = 32;

enum UploadCommand {
    Stage {
        files: Vec<FileHandle>,
        reply: oneshot::Sender<UploadResult<Vec<StagedFileId>>>,
    },
    Unstage {
        id: StagedFileId,
        reply: oneshot::Sender<UploadResult<Option<StagedFile>>>,
    },
    Clear {
        reply: oneshot::Sender<UploadResult<()>>,
    },
    Submit {
        reply: oneshot::Sender<UploadResult<usize>>,
    },
}

struct InFlightUpload {
    submission: Submission,
    response: BoxFuture<'static, GatewayResult<UploadReceipt>>,
}

/// Event loop that owns the staging manager and at most one in-flight submission.
///
/// Staging commands keep being serviced while the gateway call is pending; the batch
/// lock is what rejects them.
pub struct UploadSession {
    staging: StagingManager,
    gateway: Arc<dyn Gateway>,
    commands: mpsc::Receiver<UploadCommand>,
    snapshots: watch::Sender<StagedBatch>,
    events: mpsc::UnboundedSender<UploadEvent>,
    in_flight: Option<InFlightUpload>,
    shutdown: CancellationToken,
}

impl UploadSession {
    pub fn spawn(gateway: Arc<dyn Gateway>) -> (UploadHandle, mpsc::UnboundedReceiver<UploadEvent>) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (snapshot_tx, snapshot_rx) = watch::channel(StagedBatch::default());
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();

        let session = Self {
            staging: StagingManager::new(),
            gateway,
            commands: command_rx,
            snapshots: snapshot_tx,
            events: event_tx,
            in_flight: None,
            shutdown: shutdown.clone(),
        };
        let task = tokio::spawn(session.run());

        let handle = UploadHandle {
            commands: command_tx,
            snapshots: snapshot_rx,
            shutdown,
            task,
        };
        (handle, event_rx)
    }

    async fn run(mut self) {
        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                Some(result) = OptionFuture::from(
                    self.in_flight.as_mut().map(|in_flight| &mut in_flight.response)
                ) => self.handle_upload_result(result),
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
            }
        }

        if self.in_flight.is_some() {
            tracing::debug!("upload session closed with a submission in flight; result discarded");
        }
    }

    fn handle_command(&mut self, command: UploadCommand) {
        match command {
            UploadCommand::Stage { files, reply } => {
                let _ = reply.send(self.staging.stage(files));
            }
            UploadCommand::Unstage { id, reply } => {
                let _ = reply.send(self.staging.unstage(id));
            }
            UploadCommand::Clear { reply } => {
                let _ = reply.send(self.staging.clear());
            }
            UploadCommand::Submit { reply } => {
                let _ = reply.send(self.start_submission());
            }
        }
        self.publish();
    }

    fn start_submission(&mut self) -> UploadResult<usize> {
        let submission = Submission::begin(&mut self.staging)?;
        let file_count = submission.file_count();
        let files = submission.files().to_vec();
        let gateway = Arc::clone(&self.gateway);

        self.in_flight = Some(InFlightUpload {
            submission,
            response: Box::pin(async move { gateway.upload(files).await }),
        });
        Ok(file_count)
    }

    fn handle_upload_result(&mut self, result: GatewayResult<UploadReceipt>) {
        let Some(in_flight) = self.in_flight.take() else {
            return;
        };

        let event = in_flight.submission.finish(&mut self.staging, result);
        self.publish();
        let _ = self.events.send(event);
    }

    fn publish(&self) {
        self.snapshots.send_replace(self.staging.batch().clone());
    }
}

/// Caller side of an [`UploadSession`].
pub struct UploadHandle {
    commands: mpsc::Sender<UploadCommand>,
    snapshots: watch::Receiver<StagedBatch>,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl UploadHandle {
    pub async fn stage(&self, files: Vec<FileHandle>) -> UploadResult<Vec<StagedFileId>> {
        self.request("stage-files", |reply| UploadCommand::Stage { files, reply })
            .await?
    }

    pub async fn unstage(&self, id: StagedFileId) -> UploadResult<Option<StagedFile>> {
        self.request("unstage-file", |reply| UploadCommand::Unstage { id, reply })
            .await?
    }

    pub async fn clear(&self) -> UploadResult<()> {
        self.request("clear-batch", |reply| UploadCommand::Clear { reply })
            .await?
    }

    /// Starts a submission and returns the number of files sent. The outcome arrives
    /// later as an [`UploadEvent`].
    pub async fn submit(&self) -> UploadResult<usize> {
        self.request("submit-batch", |reply| UploadCommand::Submit { reply })
            .await?
    }

    pub fn snapshot(&self) -> StagedBatch {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<StagedBatch> {
        self.snapshots.clone()
    }

    /// Stops the event loop; an in-flight upload is left to finish and its result dropped.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Err(error) = self.task.await {
            tracing::warn!(%error, "upload session task ended abnormally");
        }
    }

    async fn request<T>(
        &self,
        stage: &'static str,
        command: impl FnOnce(oneshot::Sender<T>) -> UploadCommand,
    ) -> UploadResult<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.commands.send(command(reply_tx)).await.is_err() {
            return Err(UploadError::SessionClosed { stage });
        }
        reply_rx.await.map_err(|_| UploadError::SessionClosed { stage })
    }
}
