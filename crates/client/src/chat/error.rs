use snafu::Snafu;

use super::controller::TurnState;
use super::message::MessageId;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ChatError {
    #[snafu(display("question is empty after trimming"))]
    EmptyQuestion { stage: &'static str },
    #[snafu(display("cannot ask while the turn is {state:?}"))]
    TurnBusy {
        stage: &'static str,
        state: TurnState,
    },
    #[snafu(display("a reveal is already active for {active:?}"))]
    RevealActive {
        stage: &'static str,
        active: MessageId,
    },
    #[snafu(display("reveal target {target:?} is no longer the trailing bot message"))]
    UnknownRevealTarget {
        stage: &'static str,
        target: MessageId,
    },
    #[snafu(display("conversation was torn down before `{stage}`"))]
    TornDown { stage: &'static str },
    #[snafu(display("chat session has shut down on `{stage}`"))]
    SessionClosed { stage: &'static str },
}

impl ChatError {
    /// Local rejections that never reach the gateway.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::EmptyQuestion { .. } | Self::TurnBusy { .. } | Self::TornDown { .. }
        )
    }
}

pub type ChatResult<T> = Result<T, ChatError>;
