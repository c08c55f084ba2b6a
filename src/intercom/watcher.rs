//! Polling watcher over the conversation listing.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tracing::{debug, error};

use crate::config::WatchConfig;
use crate::error::Result;

use super::client::IntercomClient;
use super::types::{Conversation, ConversationList};

/// Callback invoked for each conversation awaiting a reply.
///
/// The returned future runs as a detached task; the watcher never waits for
/// it.
pub type DiscoverFn =
    Arc<dyn Fn(Conversation) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Listing poll settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchOptions {
    pub per_page: u32,
    pub poll_interval: Duration,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            per_page: 20,
            poll_interval: Duration::from_millis(1000),
        }
    }
}

impl From<&WatchConfig> for WatchOptions {
    fn from(config: &WatchConfig) -> Self {
        Self {
            per_page: config.per_page,
            poll_interval: config.poll_interval(),
        }
    }
}

impl IntercomClient {
    /// Poll every listing page until `should_stop` returns true.
    ///
    /// `should_stop` is only consulted between full passes, so a stop request
    /// takes effect after the current page walk and sleep. Listing failures
    /// end the watch with that error.
    pub async fn watch_conversations(
        &self,
        options: WatchOptions,
        on_discover: DiscoverFn,
        should_stop: impl Fn() -> bool,
    ) -> Result<()> {
        while !should_stop() {
            let first = self.get_conversation_page(options.per_page, 1).await?;
            let mut total_pages = first.pages.total_pages;
            discover_awaiting(&first, &on_discover);

            let mut page = 1;
            while page < total_pages {
                page += 1;
                let listing = self.get_conversation_page(options.per_page, page).await?;
                total_pages = listing.pages.total_pages;
                discover_awaiting(&listing, &on_discover);
            }

            debug!(pages = page, "conversation listing pass complete");
            tokio::time::sleep(options.poll_interval).await;
        }
        Ok(())
    }

    /// One full pass over the listing, collecting conversations awaiting a
    /// reply.
    pub async fn awaiting_conversations(&self, per_page: u32) -> Result<Vec<Conversation>> {
        let mut awaiting = Vec::new();
        let mut page = 1;
        loop {
            let listing = self.get_conversation_page(per_page, page).await?;
            awaiting.extend(listing.conversations.into_iter().filter(|c| c.awaiting_reply()));
            if page >= listing.pages.total_pages {
                break;
            }
            page += 1;
        }
        Ok(awaiting)
    }
}

/// Fire `on_discover` for every conversation on the page awaiting a reply.
pub fn discover_awaiting(listing: &ConversationList, on_discover: &DiscoverFn) -> usize {
    let mut fired = 0;
    for conversation in listing.conversations.iter().filter(|c| c.awaiting_reply()) {
        spawn_discovery(on_discover, conversation.clone());
        fired += 1;
    }
    fired
}

fn spawn_discovery(on_discover: &DiscoverFn, conversation: Conversation) {
    let conversation_id = conversation.id.clone();
    let discovery = on_discover(conversation);
    tokio::spawn(async move {
        if AssertUnwindSafe(discovery).catch_unwind().await.is_err() {
            error!(conversation_id = %conversation_id, "discovery handler panicked");
        }
    });
}
