use std::time::Duration;

use snafu::ensure;
use tokio_util::sync::CancellationToken;

use super::error::{ChatResult, RevealActiveSnafu, UnknownRevealTargetSnafu};
use super::message::{ConversationLog, MessageId};

pub const DEFAULT_TICK_PERIOD: Duration = Duration::from_millis(15);
pub const DEFAULT_THINKING_PERIOD: Duration = Duration::from_millis(500);

/// Incremental reveal of one completed answer into one bot message.
///
/// Lengths count `char`s. The job yields each prefix exactly once, in increasing
/// order, and cannot be rewound; a new reveal needs a new job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypingJob {
    target: MessageId,
    full_text: String,
    total_len: usize,
    revealed_len: usize,
    revealed_bytes: usize,
    tick_period: Duration,
}

impl TypingJob {
    pub fn new(target: MessageId, full_text: impl Into<String>, tick_period: Duration) -> Self {
        let full_text = full_text.into();
        Self {
            target,
            total_len: full_text.chars().count(),
            full_text,
            revealed_len: 0,
            revealed_bytes: 0,
            tick_period,
        }
    }

    pub fn target(&self) -> MessageId {
        self.target
    }

    pub fn full_text(&self) -> &str {
        &self.full_text
    }

    pub fn len(&self) -> usize {
        self.total_len
    }

    pub fn is_empty(&self) -> bool {
        self.total_len == 0
    }

    pub fn revealed_len(&self) -> usize {
        self.revealed_len
    }

    pub fn revealed(&self) -> &str {
        &self.full_text[..self.revealed_bytes]
    }

    pub fn tick_period(&self) -> Duration {
        self.tick_period
    }

    pub fn is_complete(&self) -> bool {
        self.revealed_len == self.total_len
    }

    /// Extends the revealed prefix by one character and returns it.
    pub fn advance(&mut self) -> Option<&str> {
        let next = self.full_text[self.revealed_bytes..].chars().next()?;
        self.revealed_bytes += next.len_utf8();
        self.revealed_len += 1;
        Some(self.revealed())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing is being revealed.
    Idle,
    Revealed {
        target: MessageId,
        revealed_len: usize,
    },
    /// The final character was written; the job is gone.
    Completed {
        target: MessageId,
        revealed_len: usize,
    },
    /// The job's token was cancelled before this tick; the job is gone.
    Cancelled { target: MessageId },
}

#[derive(Debug)]
struct ActiveReveal {
    job: TypingJob,
    token: CancellationToken,
}

/// Owner of the single active [`TypingJob`].
///
/// Each job runs under a child of the caller's teardown token, so cancelling the
/// owner stops the reveal without the scheduler being told.
#[derive(Debug, Default)]
pub struct TypingScheduler {
    active: Option<ActiveReveal>,
}

impl TypingScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn active_job(&self) -> Option<&TypingJob> {
        self.active.as_ref().map(|active| &active.job)
    }

    /// Activates `job`; the returned token stops the reveal when cancelled.
    pub fn start(
        &mut self,
        job: TypingJob,
        parent: &CancellationToken,
    ) -> ChatResult<CancellationToken> {
        if let Some(active) = &self.active {
            ensure!(
                active.token.is_cancelled(),
                RevealActiveSnafu {
                    stage: "start-reveal",
                    active: active.job.target(),
                }
            );
        }

        let token = parent.child_token();
        tracing::debug!(
            target = ?job.target(),
            total_len = job.len(),
            tick_period_ms = job.tick_period().as_millis() as u64,
            "reveal started"
        );
        self.active = Some(ActiveReveal {
            job,
            token: token.clone(),
        });
        Ok(token)
    }

    pub fn tick(&mut self, log: &mut ConversationLog) -> ChatResult<TickOutcome> {
        let Some(active) = self.active.as_mut() else {
            return Ok(TickOutcome::Idle);
        };

        let target = active.job.target();
        if active.token.is_cancelled() {
            self.active = None;
            return Ok(TickOutcome::Cancelled { target });
        }

        let prefix = active.job.advance().map(str::to_owned);
        let revealed_len = active.job.revealed_len();
        let complete = active.job.is_complete();

        if let Some(prefix) = prefix {
            let Some(message) = log.reveal_target_mut(target) else {
                self.active = None;
                return UnknownRevealTargetSnafu {
                    stage: "reveal-tick",
                    target,
                }
                .fail();
            };
            message.text = prefix;
        }

        if complete {
            self.active = None;
            tracing::debug!(target = ?target, revealed_len, "reveal completed");
            return Ok(TickOutcome::Completed {
                target,
                revealed_len,
            });
        }

        Ok(TickOutcome::Revealed {
            target,
            revealed_len,
        })
    }

    /// Stops the active reveal, leaving already revealed text in place. Safe to repeat.
    pub fn cancel(&mut self) -> Option<MessageId> {
        let active = self.active.take()?;
        active.token.cancel();
        tracing::debug!(
            target = ?active.job.target(),
            revealed_len = active.job.revealed_len(),
            "reveal cancelled"
        );
        Some(active.job.target())
    }
}

/// Animated label shown while a question awaits its answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ThinkingIndicator {
    dots: usize,
}

impl ThinkingIndicator {
    const MAX_DOTS: usize = 3;

    pub fn label(&self) -> String {
        format!("Thinking{}", ".".repeat(self.dots))
    }

    pub fn advance(&mut self) {
        self.dots = if self.dots < Self::MAX_DOTS {
            self.dots + 1
        } else {
            0
        };
    }

    pub fn reset(&mut self) {
        self.dots = 0;
    }
}
