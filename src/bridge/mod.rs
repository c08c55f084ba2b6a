//! Per-conversation relay between an Intercom conversation and a chat
//! channel.
//!
//! A [`SessionBridge`] runs two flows while it is alive:
//! - a listener that posts every engine [`ChannelEvent::Text`] as an admin
//!   reply and flips the bridge to terminated on `Close`/`Error`;
//! - a read loop that polls the conversation for new user messages every
//!   `poll_interval` and forwards them to the engine in order.
//!
//! Termination is cooperative: the read loop checks the closed flag once per
//! poll cycle.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::channel::{ChannelEvent, ChannelSender, ChatChannel};
use crate::error::Result;
use crate::intercom::ReadBatch;

/// Helpdesk operations a bridge needs.
///
/// Implemented by [`IntercomClient`](crate::intercom::IntercomClient); tests
/// substitute in-memory doubles.
#[async_trait]
pub trait ConversationClient: Send + Sync {
    /// Post an admin comment.
    async fn reply(&self, conversation_id: &str, text: &str) -> Result<serde_json::Value>;

    /// Read user messages newer than `last_time`.
    async fn read_messages(&self, conversation_id: &str, last_time: i64) -> Result<ReadBatch>;

    async fn mark_as_read(&self, conversation_id: &str) -> Result<()>;

    async fn open_conversation(&self, conversation_id: &str) -> Result<()>;

    async fn close_conversation(&self, conversation_id: &str, message: &str) -> Result<()>;
}

/// Where reading starts in an existing conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartOptions {
    /// Ignore the latest existing user message and wait for new ones.
    pub skip_last_message: bool,
}

/// Options for starting a chat session in a conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// Close the conversation with this message when the session ends.
    pub close_after: Option<String>,
    /// `None` reads the conversation from its first message.
    pub start: Option<StartOptions>,
    /// Delay between reads of the conversation.
    pub poll_interval: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            close_after: None,
            start: None,
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// Relay between one Intercom conversation and one chat channel.
pub struct SessionBridge {
    client: Arc<dyn ConversationClient>,
    conversation_id: String,
    was_open: bool,
    close_after: Option<String>,
    poll_interval: Duration,
    last_time: AtomicI64,
    closed: Arc<AtomicBool>,
}

impl SessionBridge {
    pub fn new(
        client: Arc<dyn ConversationClient>,
        conversation_id: impl Into<String>,
        last_time: i64,
        poll_interval: Duration,
    ) -> Self {
        Self {
            client,
            conversation_id: conversation_id.into(),
            was_open: true,
            close_after: None,
            poll_interval,
            last_time: AtomicI64::new(last_time),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether the conversation is already open; a closed one is reopened
    /// before relaying starts.
    pub fn with_was_open(mut self, was_open: bool) -> Self {
        self.was_open = was_open;
        self
    }

    pub fn with_close_message(mut self, message: Option<String>) -> Self {
        self.close_after = message;
        self
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    /// Creation time of the newest message read so far.
    pub fn last_time(&self) -> i64 {
        self.last_time.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Relay until the engine closes or errors the channel.
    ///
    /// The close message, if configured, is posted on every exit path. A
    /// failure to post it is logged and does not replace the run's result.
    pub async fn run(&self, channel: ChatChannel) -> Result<()> {
        let result = self.relay(channel).await;

        if let Some(message) = &self.close_after {
            if let Err(err) = self
                .client
                .close_conversation(&self.conversation_id, message)
                .await
            {
                warn!(
                    conversation_id = %self.conversation_id,
                    error = %err,
                    "failed to close conversation after session"
                );
            }
        }

        result
    }

    async fn relay(&self, channel: ChatChannel) -> Result<()> {
        if !self.was_open {
            self.client.open_conversation(&self.conversation_id).await?;
        }

        let (sender, events) = channel.split();
        let listener = tokio::spawn(listen(
            self.client.clone(),
            self.conversation_id.clone(),
            events,
            self.closed.clone(),
        ));

        let result = self.read_loop(&sender).await;
        if result.is_err() {
            self.closed.store(true, Ordering::SeqCst);
            listener.abort();
        }
        if let Err(err) = listener.await {
            if err.is_panic() {
                warn!(conversation_id = %self.conversation_id, "chat listener panicked");
            }
        }
        result
    }

    async fn read_loop(&self, sender: &ChannelSender) -> Result<()> {
        while !self.is_closed() {
            tokio::time::sleep(self.poll_interval).await;

            let batch = self
                .client
                .read_messages(&self.conversation_id, self.last_time())
                .await?;
            self.client.mark_as_read(&self.conversation_id).await?;
            self.last_time.fetch_max(batch.last_time, Ordering::SeqCst);

            for message in batch.messages {
                if sender.send_text(message).await.is_err() {
                    debug!(
                        conversation_id = %self.conversation_id,
                        "engine stopped receiving; ending session"
                    );
                    self.closed.store(true, Ordering::SeqCst);
                    break;
                }
            }
        }
        info!(conversation_id = %self.conversation_id, "session read loop finished");
        Ok(())
    }
}

async fn listen(
    client: Arc<dyn ConversationClient>,
    conversation_id: String,
    mut events: mpsc::UnboundedReceiver<ChannelEvent>,
    closed: Arc<AtomicBool>,
) {
    let _closed = CloseOnExit(closed);
    while let Some(event) = events.recv().await {
        match event {
            ChannelEvent::Text(text) => {
                if let Err(err) = client.reply(&conversation_id, &text).await {
                    warn!(conversation_id = %conversation_id, error = %err, "failed to post reply");
                }
            }
            ChannelEvent::Close => {
                debug!(conversation_id = %conversation_id, "chat closed by engine");
                break;
            }
            ChannelEvent::Error(message) => {
                warn!(conversation_id = %conversation_id, error = %message, "chat error");
                break;
            }
        }
    }
}

/// Marks the session closed when the listener exits, including by panic.
struct CloseOnExit(Arc<AtomicBool>);

impl Drop for CloseOnExit {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}
