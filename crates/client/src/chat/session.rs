use std::sync::Arc;
use std::time::Duration;

use docqa_gateway::{AskResponse, BoxFuture, Gateway, GatewayResult};
use futures::future::OptionFuture;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;

use super::controller::{ConversationController, ConversationSnapshot, PendingAsk};
use super::error::{ChatError, ChatResult};
use super::events::ChatEvent;
use super::message::MessageId;
use super::typing::{DEFAULT_THINKING_PERIOD, DEFAULT_TICK_PERIOD};

const COMMAND_BUFFER: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChatOptions {
    pub tick_period: Duration,
    pub thinking_period: Duration,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            tick_period: DEFAULT_TICK_PERIOD,
            thinking_period: DEFAULT_THINKING_PERIOD,
        }
    }
}

impl ChatOptions {
    /// Replaces zero periods with the defaults; `tokio::time::interval` rejects them.
    pub fn normalized(self) -> Self {
        Self {
            tick_period: non_zero_or(self.tick_period, DEFAULT_TICK_PERIOD),
            thinking_period: non_zero_or(self.thinking_period, DEFAULT_THINKING_PERIOD),
        }
    }
}

fn non_zero_or(period: Duration, fallback: Duration) -> Duration {
    if period.is_zero() { fallback } else { period }
}

enum ChatCommand {
    SetDraft(String),
    Ask {
        question: String,
        reply: oneshot::Sender<ChatResult<MessageId>>,
    },
    SubmitDraft {
        reply: oneshot::Sender<ChatResult<MessageId>>,
    },
    CancelReveal {
        reply: oneshot::Sender<bool>,
    },
}

struct PendingCall {
    question_id: MessageId,
    response: BoxFuture<'static, GatewayResult<AskResponse>>,
}

/// Event loop that owns one conversation.
///
/// Gateway responses, reveal ticks, thinking-indicator ticks and caller commands are
/// all handled on this single task, so every transition runs to completion before
/// the next one starts.
pub struct ChatSession {
    controller: ConversationController,
    gateway: Arc<dyn Gateway>,
    options: ChatOptions,
    commands: mpsc::Receiver<ChatCommand>,
    snapshots: watch::Sender<ConversationSnapshot>,
    events: mpsc::UnboundedSender<ChatEvent>,
    pending: Option<PendingCall>,
    reveal_timer: Option<Interval>,
    thinking_timer: Option<Interval>,
    shutdown: CancellationToken,
}

impl ChatSession {
    pub fn spawn(
        gateway: Arc<dyn Gateway>,
        options: ChatOptions,
    ) -> (ChatHandle, mpsc::UnboundedReceiver<ChatEvent>) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (snapshot_tx, snapshot_rx) = watch::channel(ConversationSnapshot::default());
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let options = options.normalized();
        let controller = ConversationController::new(options.tick_period);
        // Teardown of the session is teardown of the controller and its reveal.
        let shutdown = controller.teardown_token().clone();

        let session = Self {
            controller,
            gateway,
            options,
            commands: command_rx,
            snapshots: snapshot_tx,
            events: event_tx,
            pending: None,
            reveal_timer: None,
            thinking_timer: None,
            shutdown: shutdown.clone(),
        };
        let task = tokio::spawn(session.run());

        let handle = ChatHandle {
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
                    self.pending.as_mut().map(|call| &mut call.response)
                ) => self.handle_response(result),
                Some(_) = OptionFuture::from(
                    self.reveal_timer.as_mut().map(|timer| timer.tick())
                ) => self.handle_reveal_tick(),
                Some(_) = OptionFuture::from(
                    self.thinking_timer.as_mut().map(|timer| timer.tick())
                ) => self.handle_thinking_tick(),
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
            }
        }

        let event = self.controller.teardown();
        if self.pending.take().is_some() {
            tracing::debug!("chat session closed with a question in flight; answer discarded");
        }
        self.publish();
        if let Some(event) = event {
            self.emit(event);
        }
    }

    fn handle_command(&mut self, command: ChatCommand) {
        match command {
            ChatCommand::SetDraft(draft) => self.controller.set_draft(draft),
            ChatCommand::Ask { question, reply } => {
                let accepted = self.controller.ask(&question);
                let _ = reply.send(self.dispatch(accepted));
            }
            ChatCommand::SubmitDraft { reply } => {
                let accepted = self.controller.submit_draft();
                let _ = reply.send(self.dispatch(accepted));
            }
            ChatCommand::CancelReveal { reply } => {
                let event = self.controller.cancel_reveal();
                let _ = reply.send(event.is_some());
                if let Some(event) = event {
                    self.reveal_timer = None;
                    self.publish();
                    self.emit(event);
                }
            }
        }
        self.publish();
    }

    /// Starts the gateway call for an accepted question. The echo is published first.
    fn dispatch(&mut self, accepted: ChatResult<PendingAsk>) -> ChatResult<MessageId> {
        let pending = match accepted {
            Ok(pending) => pending,
            Err(error) => {
                tracing::warn!(error = %error, "question rejected");
                return Err(error);
            }
        };

        self.publish();
        self.emit(ChatEvent::QuestionEchoed {
            message_id: pending.question_id,
        });

        let gateway = Arc::clone(&self.gateway);
        let request = pending.request;
        self.pending = Some(PendingCall {
            question_id: pending.question_id,
            response: Box::pin(async move { gateway.ask(request).await }),
        });
        self.thinking_timer = Some(Self::timer(self.options.thinking_period));

        Ok(pending.question_id)
    }

    fn handle_response(&mut self, result: GatewayResult<AskResponse>) {
        let Some(call) = self.pending.take() else {
            return;
        };
        self.thinking_timer = None;

        let event = match self.controller.resolve(call.question_id, result) {
            Ok(event) => event,
            Err(error) => {
                tracing::warn!(error = %error, "failed to start reveal");
                Some(ChatEvent::TurnCompleted { answer: None })
            }
        };
        if matches!(event, Some(ChatEvent::RevealStarted { .. })) {
            self.reveal_timer = Some(Self::timer(self.controller.tick_period()));
        }
        self.publish();
        if let Some(event) = event {
            self.emit(event);
        }
    }

    fn handle_reveal_tick(&mut self) {
        let event = match self.controller.tick() {
            Ok(event) => event,
            Err(error) => {
                tracing::warn!(error = %error, "reveal aborted");
                Some(ChatEvent::TurnCompleted { answer: None })
            }
        };
        if !matches!(event, Some(ChatEvent::RevealProgress { .. })) {
            self.reveal_timer = None;
        }
        self.publish();
        if let Some(event) = event {
            self.emit(event);
        }
    }

    fn handle_thinking_tick(&mut self) {
        if self.controller.advance_thinking() {
            self.publish();
        } else {
            self.thinking_timer = None;
        }
    }

    fn timer(period: Duration) -> Interval {
        // The first tick fires one period from now, not immediately.
        let mut timer = interval_at(Instant::now() + period, period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        timer
    }

    fn emit(&self, event: ChatEvent) {
        let _ = self.events.send(event);
    }

    fn publish(&self) {
        self.snapshots.send_replace(self.controller.snapshot());
    }
}

/// Caller side of a [`ChatSession`].
pub struct ChatHandle {
    commands: mpsc::Sender<ChatCommand>,
    snapshots: watch::Receiver<ConversationSnapshot>,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl ChatHandle {
    pub async fn set_draft(&self, draft: impl Into<String>) -> ChatResult<()> {
        self.commands
            .send(ChatCommand::SetDraft(draft.into()))
            .await
            .map_err(|_| ChatError::SessionClosed { stage: "set-draft" })
    }

    /// Accepts `question` and returns the id of its echoed message.
    pub async fn ask(&self, question: impl Into<String>) -> ChatResult<MessageId> {
        let question = question.into();
        self.request("ask", |reply| ChatCommand::Ask { question, reply })
            .await?
    }

    pub async fn submit_draft(&self) -> ChatResult<MessageId> {
        self.request("submit-draft", |reply| ChatCommand::SubmitDraft { reply })
            .await?
    }

    /// Returns whether a reveal was active.
    pub async fn cancel_reveal(&self) -> ChatResult<bool> {
        self.request("cancel-reveal", |reply| ChatCommand::CancelReveal { reply })
            .await
    }

    pub fn snapshot(&self) -> ConversationSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConversationSnapshot> {
        self.snapshots.clone()
    }

    /// Tears the conversation down: the reveal stops and a pending answer is dropped.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Err(error) = self.task.await {
            tracing::warn!(%error, "chat session task ended abnormally");
        }
    }

    async fn request<T>(
        &self,
        stage: &'static str,
        command: impl FnOnce(oneshot::Sender<T>) -> ChatCommand,
    ) -> ChatResult<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.commands.send(command(reply_tx)).await.is_err() {
            return Err(ChatError::SessionClosed { stage });
        }
        reply_rx.await.map_err(|_| ChatError::SessionClosed { stage })
    }
}
