use std::collections::VecDeque;
use std::sync::Mutex;

use docqa_gateway::{
    AskRequest, AskResponse, BoxFuture, Gateway, GatewayConfig, GatewayError, GatewayResult,
    HttpGateway, UploadFile, UploadReceipt,
};
use tokio::sync::oneshot;

/// In-memory gateway that replays queued outcomes and records every call.
#[derive(Default)]
pub(crate) struct ScriptedGateway {
    uploads: Mutex<VecDeque<GatewayResult<UploadReceipt>>>,
    answers: Mutex<VecDeque<GatewayResult<AskResponse>>>,
    upload_calls: Mutex<Vec<Vec<String>>>,
    ask_calls: Mutex<Vec<String>>,
    hold: Mutex<Option<oneshot::Receiver<()>>>,
}

impl ScriptedGateway {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push_upload(&self, result: GatewayResult<UploadReceipt>) {
        self.uploads.lock().unwrap().push_back(result);
    }

    pub(crate) fn push_answer(&self, result: GatewayResult<AskResponse>) {
        self.answers.lock().unwrap().push_back(result);
    }

    /// Parks the next call until the returned sender fires or is dropped.
    pub(crate) fn hold_next_call(&self) -> oneshot::Sender<()> {
        let (release_tx, release_rx) = oneshot::channel();
        *self.hold.lock().unwrap() = Some(release_rx);
        release_tx
    }

    pub(crate) fn upload_calls(&self) -> Vec<Vec<String>> {
        self.upload_calls.lock().unwrap().clone()
    }

    pub(crate) fn ask_calls(&self) -> Vec<String> {
        self.ask_calls.lock().unwrap().clone()
    }

    /// A real transport-class error, produced the same way a misconfigured client would.
    pub(crate) fn transport_error() -> GatewayError {
        HttpGateway::new(GatewayConfig::new("not a url")).expect_err("invalid base url")
    }

    async fn wait_if_held(&self) {
        let hold = self.hold.lock().unwrap().take();
        if let Some(release_rx) = hold {
            let _ = release_rx.await;
        }
    }
}

impl Gateway for ScriptedGateway {
    fn upload<'a>(&'a self, files: Vec<UploadFile>) -> BoxFuture<'a, GatewayResult<UploadReceipt>> {
        Box::pin(async move {
            self.upload_calls
                .lock()
                .unwrap()
                .push(files.into_iter().map(|file| file.name).collect());
            self.wait_if_held().await;
            self.uploads
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(UploadReceipt::default()))
        })
    }

    fn ask<'a>(&'a self, request: AskRequest) -> BoxFuture<'a, GatewayResult<AskResponse>> {
        Box::pin(async move {
            self.ask_calls.lock().unwrap().push(request.question);
            self.wait_if_held().await;
            self.answers
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(AskResponse::new("")))
        })
    }
}
