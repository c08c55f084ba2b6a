//! Convenience re-exports for common use.

pub use crate::bridge::{ConversationClient, SessionBridge, SessionOptions, StartOptions};
pub use crate::channel::{chat_pair, ChannelEvent, ChatChannel, ChatConnection};
pub use crate::config::BridgeConfig;
pub use crate::coordinator::{Coordinator, Hooks, LogLevel, LogSink};
pub use crate::engine::{
    Application, ChatAgent, ConsoleAgent, JobInput, JobOutput, JobQueue, LocalApplication,
    QueueEvent, Transcription,
};
pub use crate::error::{BridgeError, Result};
pub use crate::intercom::{Conversation, ConversationPart, IntercomClient};
