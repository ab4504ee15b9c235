pub mod controller;
pub mod error;
/// Turn lifecycle signals.
pub mod events;
/// Conversation log and message identity.
pub mod message;
pub mod session;
/// Typing-effect reveal and the thinking indicator.
pub mod typing;

pub use controller::{ConversationController, ConversationSnapshot, PendingAsk, TurnState};
pub use error::{ChatError, ChatResult};
pub use events::ChatEvent;
pub use message::{ConversationLog, Message, MessageId, Sender};
pub use session::{ChatHandle, ChatOptions, ChatSession};
pub use typing::{
    DEFAULT_THINKING_PERIOD, DEFAULT_TICK_PERIOD, ThinkingIndicator, TickOutcome, TypingJob,
    TypingScheduler,
};
