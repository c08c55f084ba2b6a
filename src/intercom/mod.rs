//! Intercom helpdesk gateway: REST client, message extraction and the
//! conversation watcher.

pub mod client;
pub mod extract;
pub mod http;
pub mod types;
pub mod watcher;

pub use client::IntercomClient;
pub use extract::{extract_batch, extract_paragraph, ReadBatch};
pub use types::{Author, Conversation, ConversationList, ConversationPart, Pages, Statistics};
pub use watcher::{DiscoverFn, WatchOptions};
