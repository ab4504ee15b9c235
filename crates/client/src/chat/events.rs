use docqa_gateway::FailureKind;

use crate::chat::message::MessageId;

/// Observable turn lifecycle, in the order a turn produces it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// The question was echoed into the log and the gateway call dispatched.
    QuestionEchoed { message_id: MessageId },
    RevealStarted { target: MessageId, total_len: usize },
    RevealProgress {
        target: MessageId,
        revealed_len: usize,
    },
    /// The turn is back to idle. `answer` is `None` when the answer was blank.
    TurnCompleted { answer: Option<MessageId> },
    TurnFailed { message: String, kind: FailureKind },
    RevealCancelled { target: MessageId },
}

impl ChatEvent {
    /// Maps lifecycle boundaries to the busy flag the view coordinator mirrors.
    ///
    /// Progress events return `None` because they mutate message text, not turn state.
    pub fn busy_transition(&self) -> Option<bool> {
        match self {
            Self::QuestionEchoed { .. } => Some(true),
            Self::RevealStarted { .. } | Self::RevealProgress { .. } => None,
            Self::TurnCompleted { .. } | Self::TurnFailed { .. } | Self::RevealCancelled { .. } => {
                Some(false)
            }
        }
    }
}
