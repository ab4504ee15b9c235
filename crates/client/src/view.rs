use snafu::{Snafu, ensure};

use crate::chat::ChatEvent;
use crate::upload::UploadEvent;

/// Which half of the client is in front.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Surface {
    #[default]
    Upload,
    Conversation,
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ViewError {
    #[snafu(display("cannot leave the conversation while a response is pending on `{stage}`"))]
    ResponsePending { stage: &'static str },
}

/// Headless navigation state driven by session events.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewCoordinator {
    surface: Surface,
    conversation_busy: bool,
}

impl ViewCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn surface(&self) -> Surface {
        self.surface
    }

    pub fn is_conversation_busy(&self) -> bool {
        self.conversation_busy
    }

    pub fn is_back_enabled(&self) -> bool {
        self.surface == Surface::Conversation && !self.conversation_busy
    }

    /// A successful upload moves the user to the conversation; a failure keeps them on uploads.
    pub fn apply_upload_event(&mut self, event: &UploadEvent) -> Surface {
        if event.is_success() && self.surface != Surface::Conversation {
            tracing::debug!("upload succeeded; switching to conversation");
            self.surface = Surface::Conversation;
        }
        self.surface
    }

    pub fn apply_chat_event(&mut self, event: &ChatEvent) {
        if let Some(busy) = event.busy_transition() {
            self.conversation_busy = busy;
        }
    }

    pub fn back_to_uploads(&mut self) -> Result<Surface, ViewError> {
        ensure!(
            !self.conversation_busy,
            ResponsePendingSnafu {
                stage: "back-to-uploads",
            }
        );
        self.surface = Surface::Upload;
        Ok(self.surface)
    }
}

#[cfg(test)]
mod tests {
    use docqa_gateway::FailureKind;

    use super::*;
    use crate::chat::MessageId;

    #[test]
    fn upload_success_opens_the_conversation() {
        let mut view = ViewCoordinator::new();
        let failed = UploadEvent::Failed {
            message: "Error uploading files.".to_string(),
            kind: FailureKind::Transport,
        };
        assert_eq!(view.apply_upload_event(&failed), Surface::Upload);

        let succeeded = UploadEvent::Succeeded {
            file_count: 2,
            message: None,
        };
        assert_eq!(view.apply_upload_event(&succeeded), Surface::Conversation);
        assert!(view.is_back_enabled());
    }

    #[test]
    fn back_is_rejected_while_a_turn_is_in_progress() {
        let mut view = ViewCoordinator::new();
        view.apply_upload_event(&UploadEvent::Succeeded {
            file_count: 1,
            message: None,
        });

        view.apply_chat_event(&ChatEvent::QuestionEchoed {
            message_id: MessageId::new(1),
        });
        view.apply_chat_event(&ChatEvent::RevealStarted {
            target: MessageId::new(2),
            total_len: 4,
        });
        assert!(!view.is_back_enabled());
        assert!(matches!(
            view.back_to_uploads(),
            Err(ViewError::ResponsePending { .. })
        ));
        assert_eq!(view.surface(), Surface::Conversation);

        view.apply_chat_event(&ChatEvent::TurnCompleted {
            answer: Some(MessageId::new(2)),
        });
        assert_eq!(view.back_to_uploads().expect("idle"), Surface::Upload);
    }

    #[test]
    fn failed_or_cancelled_turns_release_the_busy_flag() {
        let mut view = ViewCoordinator::new();
        for terminal in [
            ChatEvent::TurnFailed {
                message: "Error fetching answer.".to_string(),
                kind: FailureKind::Rejection,
            },
            ChatEvent::RevealCancelled {
                target: MessageId::new(2),
            },
        ] {
            view.apply_chat_event(&ChatEvent::QuestionEchoed {
                message_id: MessageId::new(1),
            });
            assert!(view.is_conversation_busy());
            view.apply_chat_event(&terminal);
            assert!(!view.is_conversation_busy());
        }
    }
}
