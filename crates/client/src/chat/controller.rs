use std::time::Duration;

use docqa_gateway::{AskRequest, AskResponse, GENERIC_ASK_FAILURE, GatewayResult};
use snafu::ensure;
use tokio_util::sync::CancellationToken;

use super::error::{ChatResult, EmptyQuestionSnafu, TornDownSnafu, TurnBusySnafu};
use super::events::ChatEvent;
use super::message::{ConversationLog, Message, MessageId, Sender};
use super::typing::{DEFAULT_TICK_PERIOD, ThinkingIndicator, TickOutcome, TypingJob, TypingScheduler};

/// Turn lifecycle: `Idle -> AwaitingResponse -> Revealing -> Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TurnState {
    #[default]
    Idle,
    AwaitingResponse {
        question: MessageId,
    },
    Revealing {
        target: MessageId,
    },
}

impl TurnState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }
}

/// Accepted question that still has to be sent to the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAsk {
    pub question_id: MessageId,
    pub request: AskRequest,
}

/// Render-ready copy of the controller state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConversationSnapshot {
    pub messages: Vec<Message>,
    pub turn: TurnState,
    pub thinking: Option<String>,
    pub draft: String,
}

/// Sole owner of the conversation log and the active reveal.
///
/// Every method is one synchronous transition; the caller dispatches the gateway call
/// returned by [`ConversationController::ask`] and feeds its result back through
/// [`ConversationController::resolve`].
#[derive(Debug)]
pub struct ConversationController {
    log: ConversationLog,
    turn: TurnState,
    scheduler: TypingScheduler,
    indicator: ThinkingIndicator,
    draft: String,
    next_message_id: u64,
    tick_period: Duration,
    teardown: CancellationToken,
}

impl Default for ConversationController {
    fn default() -> Self {
        Self::new(DEFAULT_TICK_PERIOD)
    }
}

impl ConversationController {
    pub fn new(tick_period: Duration) -> Self {
        Self {
            log: ConversationLog::new(),
            turn: TurnState::Idle,
            scheduler: TypingScheduler::new(),
            indicator: ThinkingIndicator::default(),
            draft: String::new(),
            next_message_id: 1,
            tick_period,
            teardown: CancellationToken::new(),
        }
    }

    pub fn log(&self) -> &ConversationLog {
        &self.log
    }

    pub fn turn_state(&self) -> TurnState {
        self.turn
    }

    pub fn is_busy(&self) -> bool {
        !self.turn.is_idle()
    }

    pub fn tick_period(&self) -> Duration {
        self.tick_period
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn set_draft(&mut self, draft: impl Into<String>) {
        self.draft = draft.into();
    }

    /// Visible from the moment a question is accepted until the bot placeholder lands.
    pub fn thinking_visible(&self) -> bool {
        matches!(self.turn, TurnState::AwaitingResponse { .. })
            && self
                .log
                .last()
                .is_none_or(|message| message.sender != Sender::Bot)
    }

    pub fn thinking_label(&self) -> Option<String> {
        self.thinking_visible().then(|| self.indicator.label())
    }

    /// Advances the thinking animation; returns whether it is still visible.
    pub fn advance_thinking(&mut self) -> bool {
        if !self.thinking_visible() {
            return false;
        }
        self.indicator.advance();
        true
    }

    pub fn submit_draft(&mut self) -> ChatResult<PendingAsk> {
        let question = self.draft.clone();
        self.ask(&question)
    }

    /// Echoes an accepted question into the log and returns the request to dispatch.
    pub fn ask(&mut self, question: &str) -> ChatResult<PendingAsk> {
        ensure!(!self.teardown.is_cancelled(), TornDownSnafu { stage: "ask" });
        let question = question.trim();
        ensure!(!question.is_empty(), EmptyQuestionSnafu { stage: "ask" });
        ensure!(
            self.turn.is_idle(),
            TurnBusySnafu {
                stage: "ask",
                state: self.turn,
            }
        );

        let question_id = self.alloc_message_id();
        self.log.push(Message::user(question_id, question));
        self.draft.clear();
        self.indicator.reset();
        self.turn = TurnState::AwaitingResponse {
            question: question_id,
        };

        tracing::debug!(?question_id, question_len = question.len(), "question accepted");
        Ok(PendingAsk {
            question_id,
            request: AskRequest::new(question),
        })
    }

    /// Applies the gateway outcome for `question_id`.
    ///
    /// Returns `Ok(None)` when the outcome belongs to a turn that is no longer awaited.
    pub fn resolve(
        &mut self,
        question_id: MessageId,
        result: GatewayResult<AskResponse>,
    ) -> ChatResult<Option<ChatEvent>> {
        if self.turn != (TurnState::AwaitingResponse { question: question_id }) {
            tracing::debug!(?question_id, turn = ?self.turn, "discarding stale answer");
            return Ok(None);
        }

        let response = match result {
            Ok(response) => response,
            Err(error) => {
                self.turn = TurnState::Idle;
                tracing::warn!(?question_id, error = %error, "question failed");
                return Ok(Some(ChatEvent::TurnFailed {
                    message: error.user_message(GENERIC_ASK_FAILURE),
                    kind: error.kind(),
                }));
            }
        };

        let answer = response.answer.trim();
        if answer.is_empty() {
            self.turn = TurnState::Idle;
            tracing::debug!(?question_id, "blank answer; nothing to reveal");
            return Ok(Some(ChatEvent::TurnCompleted { answer: None }));
        }

        let target = self.alloc_message_id();
        let job = TypingJob::new(target, answer, self.tick_period);
        let total_len = job.len();
        if let Err(error) = self.scheduler.start(job, &self.teardown) {
            self.turn = TurnState::Idle;
            return Err(error);
        }

        self.log.push(Message::bot_placeholder(target));
        self.turn = TurnState::Revealing { target };
        Ok(Some(ChatEvent::RevealStarted { target, total_len }))
    }

    /// Reveals one more character of the active answer.
    pub fn tick(&mut self) -> ChatResult<Option<ChatEvent>> {
        let outcome = match self.scheduler.tick(&mut self.log) {
            Ok(outcome) => outcome,
            Err(error) => {
                self.turn = TurnState::Idle;
                return Err(error);
            }
        };

        let event = match outcome {
            TickOutcome::Idle => None,
            TickOutcome::Revealed {
                target,
                revealed_len,
            } => Some(ChatEvent::RevealProgress {
                target,
                revealed_len,
            }),
            TickOutcome::Completed { target, .. } => {
                self.turn = TurnState::Idle;
                Some(ChatEvent::TurnCompleted {
                    answer: Some(target),
                })
            }
            TickOutcome::Cancelled { target } => {
                self.turn = TurnState::Idle;
                Some(ChatEvent::RevealCancelled { target })
            }
        };
        Ok(event)
    }

    /// Stops the active reveal without completing it; revealed text stays.
    pub fn cancel_reveal(&mut self) -> Option<ChatEvent> {
        let target = self.scheduler.cancel()?;
        self.turn = TurnState::Idle;
        Some(ChatEvent::RevealCancelled { target })
    }

    /// Token cancelled on teardown; every reveal runs under a child of it.
    pub fn teardown_token(&self) -> &CancellationToken {
        &self.teardown
    }

    pub fn teardown(&mut self) -> Option<ChatEvent> {
        self.teardown.cancel();
        let event = self.cancel_reveal();
        self.turn = TurnState::Idle;
        event
    }

    pub fn snapshot(&self) -> ConversationSnapshot {
        ConversationSnapshot {
            messages: self.log.messages().to_vec(),
            turn: self.turn,
            thinking: self.thinking_label(),
            draft: self.draft.clone(),
        }
    }

    fn alloc_message_id(&mut self) -> MessageId {
        let id = MessageId::new(self.next_message_id);
        self.next_message_id = self.next_message_id.saturating_add(1);
        id
    }
}
