//! Conversation lifecycle coordinator.
//!
//! Watches the helpdesk for conversations awaiting a reply and feeds each one
//! into the engine's job queue at most once while it is in flight. When the
//! engine asks for a chat channel it builds a
//! [`SessionBridge`](crate::bridge::SessionBridge); every terminal queue
//! outcome retires the conversation.
//!
//! ```text
//! watcher ──discover──▶ handle_discovery ──push──▶ JobQueue
//!                                                    │
//!             ┌───────── Ready / Timeout / Rejected ─┘
//!             ▼
//!     handle_queue_event ──execute──▶ engine ──provider──▶ SessionBridge
//! ```

pub mod hooks;
pub mod inflight;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::bridge::{SessionOptions, StartOptions};
use crate::channel::{chat_pair, ChatConnection};
use crate::config::{BridgeConfig, SessionConfig};
use crate::engine::{
    Application, ConnectionProvider, JobContext, JobEvent, JobInput, JobQueue, QueueEvent,
    Transcription,
};
use crate::error::{BridgeError, Result};
use crate::intercom::{Conversation, DiscoverFn, IntercomClient, WatchOptions};

pub use hooks::{
    CompletedHook, ConversationHook, FailedHook, HookFuture, Hooks, LogLevel, LogSink,
    TranscriptionHook,
};
pub use inflight::InFlight;

struct Inner {
    client: Arc<IntercomClient>,
    watch: WatchOptions,
    session: SessionConfig,
    in_flight: InFlight,
    hooks: Hooks,
    connected: AtomicBool,
    shutdown: CancellationToken,
}

/// Owns the in-flight set and wires an engine application to the helpdesk.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<Inner>,
}

impl Coordinator {
    pub fn new(client: Arc<IntercomClient>, config: &BridgeConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                client,
                watch: WatchOptions::from(&config.watch),
                session: config.session.clone(),
                in_flight: InFlight::new(),
                hooks: Hooks::new(),
                connected: AtomicBool::new(false),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Lifecycle observer slots.
    pub fn hooks(&self) -> &Hooks {
        &self.inner.hooks
    }

    pub fn client(&self) -> &Arc<IntercomClient> {
        &self.inner.client
    }

    pub fn in_flight_ids(&self) -> Vec<String> {
        self.inner.in_flight.ids()
    }

    pub fn is_in_flight(&self, conversation_id: &str) -> bool {
        self.inner.in_flight.contains(conversation_id)
    }

    /// Ask [`simple_connect`](Self::simple_connect) to return after its
    /// current listing pass. Stopping is final for this coordinator.
    pub fn stop(&self) {
        self.inner.shutdown.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// Connect `app` to the helpdesk and watch for conversations until
    /// [`stop`](Self::stop) is called.
    ///
    /// A call made while another is running returns `Ok(())` immediately.
    /// Listing failures end the watch with that error. Jobs already handed
    /// to the engine keep running and are retired after this returns.
    pub async fn simple_connect(&self, app: &dyn Application) -> Result<()> {
        if self.inner.connected.swap(true, Ordering::SeqCst) {
            debug!("coordinator already connected");
            return Ok(());
        }
        let _connected = ConnectedGuard(&self.inner.connected);

        app.set_connection_provider(self.connection_provider());
        let queue = app.queue();
        let events = queue.subscribe()?;
        tokio::spawn(self.clone().dispatch(events));

        let on_discover: DiscoverFn = {
            let this = self.clone();
            let queue = queue.clone();
            Arc::new(move |conversation: Conversation| {
                let this = this.clone();
                let queue = queue.clone();
                Box::pin(async move {
                    this.handle_discovery(queue.as_ref(), conversation).await;
                })
            })
        };

        let shutdown = self.inner.shutdown.clone();
        let result = self
            .inner
            .client
            .watch_conversations(self.inner.watch, on_discover, move || {
                shutdown.is_cancelled()
            })
            .await;

        if let Err(err) = &result {
            self.log(LogLevel::Error, &format!("Conversation watcher stopped: {err}"));
        }
        result
    }

    async fn dispatch(self, mut events: mpsc::UnboundedReceiver<QueueEvent>) {
        while let Some(event) = events.recv().await {
            let this = self.clone();
            tokio::spawn(async move { this.handle_queue_event(event).await });
        }
        debug!("queue event stream ended");
    }

    /// Channel factory handed to the engine.
    ///
    /// Fails with [`BridgeError::UnknownConversation`] for ids that are not in
    /// flight. Bridge failures after the channel is returned are only logged.
    pub fn connection_provider(&self) -> ConnectionProvider {
        let this = self.clone();
        Arc::new(move |input: JobInput| {
            let this = this.clone();
            Box::pin(async move { this.open_channel(input).await })
        })
    }

    async fn open_channel(&self, input: JobInput) -> Result<ChatConnection> {
        let conversation_id = input.conversation_id;
        let snapshot = self
            .inner
            .in_flight
            .get(&conversation_id)
            .ok_or_else(|| BridgeError::UnknownConversation(conversation_id.clone()))?;

        let options = SessionOptions {
            close_after: Some(self.inner.session.close_message.clone()),
            start: Some(StartOptions {
                skip_last_message: !snapshot.open,
            }),
            poll_interval: self.inner.session.poll_interval(),
        };
        let bridge = self
            .inner
            .client
            .run_chat_in_conversation(&snapshot.id, snapshot.open, options)
            .await?;

        let (channel, connection) = chat_pair();
        let this = self.clone();
        tokio::spawn(async move {
            if let Err(err) = bridge.run(channel).await {
                let id = bridge.conversation_id();
                this.log(
                    LogLevel::Error,
                    &format!("Session for conversation ('{id}') failed: {err}"),
                );
            }
        });
        Ok(connection)
    }

    /// Put a discovered conversation in flight and enqueue it.
    ///
    /// Returns whether the queue took the id. A queue may still reject it
    /// later through [`QueueEvent::Rejected`]. Conversations already in
    /// flight are skipped; a failed push evicts the entry again so a later
    /// pass can retry it.
    pub async fn handle_discovery(&self, queue: &dyn JobQueue, conversation: Conversation) -> bool {
        let id = conversation.id.clone();
        if !self.inner.in_flight.try_insert(conversation) {
            return false;
        }
        self.log(LogLevel::Info, &format!("Got new conversation ('{id}')"));

        match queue.push(&id).await {
            Ok(()) => {
                self.log(
                    LogLevel::Info,
                    &format!("Conversation ('{id}') was handed to the queue"),
                );
                true
            }
            Err(err) => {
                self.inner.in_flight.remove(&id);
                self.log(
                    LogLevel::Error,
                    &format!("Could not enqueue conversation ('{id}'): {err}"),
                );
                false
            }
        }
    }

    /// Handle one queue notification to completion.
    pub async fn handle_queue_event(&self, event: QueueEvent) {
        match event {
            QueueEvent::Ready { job_id, job } => self.handle_ready(job_id, job).await,
            QueueEvent::Timeout { job_id } => {
                self.log(LogLevel::Info, &format!("Conversation was timed out ('{job_id}')"));
                let hook = self.inner.hooks.timed_out();
                self.retire(&job_id, hook).await;
            }
            QueueEvent::Rejected { job_id, reason } => {
                self.log(
                    LogLevel::Info,
                    &format!("Conversation was rejected ('{job_id}'): {reason}"),
                );
                let hook = self.inner.hooks.rejected();
                self.retire(&job_id, hook).await;
            }
        }
    }

    async fn retire(&self, job_id: &str, hook: Option<ConversationHook>) {
        let _release = self.inner.in_flight.release_on_drop(job_id);
        if let (Some(hook), Some(snapshot)) = (hook, self.inner.in_flight.get(job_id)) {
            hook(snapshot).await;
        }
    }

    async fn handle_ready(&self, job_id: String, mut job: Box<dyn JobContext>) {
        self.log(LogLevel::Info, &format!("Got new starting conversation ('{job_id}')"));
        let Some(snapshot) = self.inner.in_flight.get(&job_id) else {
            self.log(
                LogLevel::Info,
                &format!("Conversation ('{job_id}') is not owned by this coordinator; ignoring"),
            );
            return;
        };
        let _release = self.inner.in_flight.release_on_drop(job_id.as_str());

        job.set_input(JobInput {
            conversation_id: job_id.clone(),
            continue_conversation: snapshot.open,
        });

        let (transcripts_tx, transcripts_rx) = mpsc::unbounded_channel();
        let log_id = job_id.clone();
        job.add_event_sink(Arc::new(move |event: JobEvent| match event {
            JobEvent::Transcription(line) => {
                let _ = transcripts_tx.send(line);
            }
            JobEvent::DebugLog(entry) => {
                if entry["msg"]["msgId"] == "RecognizedSpeechMessage" {
                    debug!(
                        conversation_id = %log_id,
                        facts = %entry["msg"]["results"][0]["facts"],
                        "recognized speech"
                    );
                }
            }
        }));
        let executed = CancellationToken::new();
        let forwarder = tokio::spawn(self.clone().forward_transcriptions(
            snapshot.clone(),
            transcripts_rx,
            executed.clone(),
        ));

        self.log(LogLevel::Info, &format!("Conversation has been accepted ('{job_id}')"));
        let outcome = job.execute().await;
        executed.cancel();
        if forwarder.await.is_err() {
            warn!(conversation_id = %job_id, "transcription hook panicked");
        }

        match outcome {
            Ok(output) => {
                self.log(LogLevel::Info, &format!("Conversation finished ('{job_id}')"));
                if let Some(hook) = self.inner.hooks.completed() {
                    hook(snapshot, output).await;
                }
            }
            Err(err) => {
                self.log(LogLevel::Info, &format!("Conversation failed ('{job_id}'): {err}"));
                if let Some(hook) = self.inner.hooks.failed() {
                    hook(snapshot, err).await;
                }
            }
        }
    }

    /// Deliver transcriptions in order until the sinks are dropped or the job
    /// has executed. Engines may keep their sinks past `execute`, so lines
    /// already queued at that point are drained and later ones are dropped.
    async fn forward_transcriptions(
        self,
        conversation: Conversation,
        mut lines: mpsc::UnboundedReceiver<Transcription>,
        executed: CancellationToken,
    ) {
        loop {
            let line = tokio::select! {
                biased;
                line = lines.recv() => match line {
                    Some(line) => line,
                    None => return,
                },
                _ = executed.cancelled() => break,
            };
            self.deliver_transcription(&conversation, line).await;
        }
        while let Ok(line) = lines.try_recv() {
            self.deliver_transcription(&conversation, line).await;
        }
    }

    async fn deliver_transcription(&self, conversation: &Conversation, line: Transcription) {
        if let Some(hook) = self.inner.hooks.transcription() {
            hook(conversation.clone(), line).await;
        }
    }

    fn log(&self, level: LogLevel, message: &str) {
        self.inner.hooks.log(level, message);
    }
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("admin_id", &self.inner.client.admin_id())
            .field("in_flight", &self.inner.in_flight.len())
            .field("connected", &self.inner.connected.load(Ordering::SeqCst))
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

struct ConnectedGuard<'a>(&'a AtomicBool);

impl Drop for ConnectedGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
