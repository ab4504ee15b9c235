/// Stable identifier for one message; increases monotonically across a log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(pub u64);

impl MessageId {
    /// Creates a typed message identifier.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

/// Chat speaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sender {
    User,
    Bot,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub sender: Sender,
    pub text: String,
}

impl Message {
    /// Creates the optimistic echo of an accepted question.
    pub fn user(id: MessageId, text: impl Into<String>) -> Self {
        Self {
            id,
            sender: Sender::User,
            text: text.into(),
        }
    }

    /// Creates the empty bot message a reveal writes into.
    pub fn bot_placeholder(id: MessageId) -> Self {
        Self {
            id,
            sender: Sender::Bot,
            text: String::new(),
        }
    }
}

/// Ordered message history.
///
/// Append-only, except that the last message may be rewritten while it is the
/// active reveal target. User messages are never rewritten.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConversationLog {
    messages: Vec<Message>,
}

impl ConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub(crate) fn push(&mut self, message: Message) {
        debug_assert!(
            self.last().is_none_or(|last| last.id < message.id),
            "message ids must increase"
        );
        self.messages.push(message);
    }

    /// Write access to `id`, granted only when it is the trailing bot message.
    pub(crate) fn reveal_target_mut(&mut self, id: MessageId) -> Option<&mut Message> {
        self.messages
            .last_mut()
            .filter(|message| message.id == id && message.sender == Sender::Bot)
    }
}
