//! Bidirectional text channel between a session bridge and the AI engine.
//!
//! [`chat_pair`] returns the two ends: the [`ChatChannel`] the bridge owns and
//! the [`ChatConnection`] handed to the engine.

use tokio::sync::mpsc;

use crate::error::{BridgeError, Result};

/// Event delivered from the engine side to the bridge side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// Text produced by the AI, to be posted to the helpdesk.
    Text(String),
    /// The engine finished the conversation.
    Close,
    /// The engine hit an error; the session should end.
    Error(String),
}

/// Bridge-side end of a chat channel.
#[derive(Debug)]
pub struct ChatChannel {
    outbound: mpsc::UnboundedSender<String>,
    events: mpsc::UnboundedReceiver<ChannelEvent>,
}

/// Engine-side end of a chat channel.
#[derive(Debug)]
pub struct ChatConnection {
    inbound: mpsc::UnboundedReceiver<String>,
    events: mpsc::UnboundedSender<ChannelEvent>,
}

/// Create a connected channel pair.
pub fn chat_pair() -> (ChatChannel, ChatConnection) {
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    (
        ChatChannel {
            outbound: outbound_tx,
            events: events_rx,
        },
        ChatConnection {
            inbound: outbound_rx,
            events: events_tx,
        },
    )
}

impl ChatChannel {
    /// Split into a sender for user text and the engine's event stream.
    pub fn split(self) -> (ChannelSender, mpsc::UnboundedReceiver<ChannelEvent>) {
        (ChannelSender(self.outbound), self.events)
    }

    /// Forward a user message to the engine.
    pub async fn send_text(&self, text: impl Into<String>) -> Result<()> {
        send(&self.outbound, text.into())
    }

    /// Wait for the next engine event; `None` once the engine side is gone.
    pub async fn recv_event(&mut self) -> Option<ChannelEvent> {
        self.events.recv().await
    }
}

/// Cloneable sending half of a [`ChatChannel`].
#[derive(Debug, Clone)]
pub struct ChannelSender(mpsc::UnboundedSender<String>);

impl ChannelSender {
    pub async fn send_text(&self, text: impl Into<String>) -> Result<()> {
        send(&self.0, text.into())
    }
}

fn send(tx: &mpsc::UnboundedSender<String>, text: String) -> Result<()> {
    tx.send(text)
        .map_err(|_| BridgeError::Channel("engine side of the chat is closed".into()))
}

impl ChatConnection {
    /// Next user message from the helpdesk; `None` once the bridge is gone.
    pub async fn recv_text(&mut self) -> Option<String> {
        self.inbound.recv().await
    }

    /// Send AI text to the bridge.
    pub fn send_text(&self, text: impl Into<String>) -> Result<()> {
        self.emit(ChannelEvent::Text(text.into()))
    }

    /// Signal that the conversation is over.
    pub fn close(&self) -> Result<()> {
        self.emit(ChannelEvent::Close)
    }

    /// Signal an engine-side failure.
    pub fn error(&self, message: impl Into<String>) -> Result<()> {
        self.emit(ChannelEvent::Error(message.into()))
    }

    /// Whether the bridge side has dropped its event receiver.
    pub fn is_closed(&self) -> bool {
        self.events.is_closed()
    }

    fn emit(&self, event: ChannelEvent) -> Result<()> {
        self.events
            .send(event)
            .map_err(|_| BridgeError::Channel("bridge side of the chat is closed".into()))
    }
}
